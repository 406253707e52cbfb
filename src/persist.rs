//! Durable session snapshots, one JSON file per conversation mode.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::ModeSettings;
use crate::message::ConversationMessage;
use crate::session::ChatMode;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no writable data directory available")]
    NoDataDir,

    #[error("failed to access session store: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt session snapshot: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Plain-data view of one mode's session. No live handles are ever
/// persisted; a restored session is always idle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub mode: ChatMode,
    pub messages: Vec<ConversationMessage>,
    pub settings: ModeSettings,
}

impl SessionSnapshot {
    /// Clears any streaming flags left over from a snapshot taken
    /// mid-generation.
    pub fn normalized(mut self) -> Self {
        for msg in &mut self.messages {
            msg.streaming = false;
        }
        self
    }
}

/// Stores session snapshots under a directory, keyed by mode.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The platform-default location.
    pub fn default_location() -> Result<Self, StoreError> {
        let data_dir = dirs::data_local_dir().ok_or(StoreError::NoDataDir)?;
        Ok(Self::open(data_dir.join("kbchat").join("sessions")))
    }

    fn path_for(&self, mode: ChatMode) -> PathBuf {
        self.dir.join(format!("{}.json", mode.as_wire()))
    }

    pub fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let payload = serde_json::to_string(snapshot)?;
        fs::write(self.path_for(snapshot.mode), payload)?;
        Ok(())
    }

    pub fn load(&self, mode: ChatMode) -> Result<Option<SessionSnapshot>, StoreError> {
        let payload = match fs::read_to_string(self.path_for(mode)) {
            Ok(payload) => payload,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let snapshot: SessionSnapshot = serde_json::from_str(&payload)?;
        Ok(Some(snapshot.normalized()))
    }

    pub fn clear(&self, mode: ChatMode) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(mode)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
