//! Document ingestion workflow client.
//!
//! The ingestion pipeline (upload, parse, confirm chunks, vectorize) is a
//! collaborator of the streaming core: the two share the citation/chunk
//! vocabulary but nothing else. This module exposes the workflow
//! interface, its HTTP implementation, and the polling loop the upload UI
//! runs while a file moves through the pipeline.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ApiConfig;
use crate::stream::client::HTTP;
use crate::types::{ApiError, Envelope};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("ingestion service error {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("file {file_id} still {state:?} after {attempts} polls")]
    WatchExhausted {
        file_id: String,
        state: FileState,
        attempts: u32,
    },
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Pipeline states a file moves through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Pending,
    Parsing,
    PendingConfirm,
    Parsed,
    Embedding,
    Ready,
    Failed,
}

impl FileState {
    pub fn is_terminal(self) -> bool {
        matches!(self, FileState::Ready | FileState::Failed)
    }

    /// Parsing finished; the pipeline waits for the user to confirm
    /// chunks before vectorizing.
    pub fn needs_confirmation(self) -> bool {
        matches!(self, FileState::PendingConfirm)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct FileStatus {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    pub status: FileState,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ParseConfig {
    pub chunk_mode: String,
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    pub auto_vectorize: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            chunk_mode: "auto".to_string(),
            chunk_size: 500,
            chunk_overlap: 50,
            auto_vectorize: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkContentType {
    Text,
    Table,
    ImageMixed,
}

/// One parsed chunk as the preview UI shows it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub original_file_name: String,
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub content_type: ChunkContentType,
}

/// The ingestion workflow as the rest of the app sees it.
#[async_trait]
pub trait IngestionWorkflow {
    /// Triggers parsing for an uploaded file.
    async fn parse(&self, file_id: &str, config: &ParseConfig) -> IngestResult<()>;

    async fn status(&self, file_id: &str) -> IngestResult<FileStatus>;

    async fn chunks(&self, file_id: &str) -> IngestResult<Vec<Chunk>>;

    /// Submits user-confirmed chunks and starts the vectorize stage.
    async fn confirm(&self, file_id: &str, chunks: &[Chunk]) -> IngestResult<()>;

    /// Vectorizes the already-parsed chunks as they are.
    async fn vectorize(&self, file_id: &str) -> IngestResult<()>;
}

#[derive(Clone, Debug)]
pub struct IngestClient {
    config: ApiConfig,
}

impl IngestClient {
    pub fn new(config: ApiConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(ApiConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    async fn read_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> IngestResult<Envelope<T>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::Status { status, body });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl IngestionWorkflow for IngestClient {
    async fn parse(&self, file_id: &str, config: &ParseConfig) -> IngestResult<()> {
        let response = HTTP
            .post(self.url(&format!("/files/{file_id}/parse")))
            .json(config)
            .send()
            .await?;
        Ok(Self::read_envelope::<serde_json::Value>(response).await?.ok()?)
    }

    async fn status(&self, file_id: &str) -> IngestResult<FileStatus> {
        let response = HTTP.get(self.url(&format!("/files/{file_id}"))).send().await?;
        Ok(Self::read_envelope::<FileStatus>(response).await?.into_data()?)
    }

    async fn chunks(&self, file_id: &str) -> IngestResult<Vec<Chunk>> {
        let response = HTTP
            .get(self.url(&format!("/files/{file_id}/chunks")))
            .send()
            .await?;
        Ok(Self::read_envelope::<Vec<Chunk>>(response).await?.into_data()?)
    }

    async fn confirm(&self, file_id: &str, chunks: &[Chunk]) -> IngestResult<()> {
        let response = HTTP
            .post(self.url(&format!("/files/{file_id}/chunks/submit")))
            .json(&json!({ "chunks": chunks }))
            .send()
            .await?;
        Ok(Self::read_envelope::<serde_json::Value>(response).await?.ok()?)
    }

    async fn vectorize(&self, file_id: &str) -> IngestResult<()> {
        let response = HTTP
            .post(self.url(&format!("/files/{file_id}/vectorize")))
            .send()
            .await?;
        Ok(Self::read_envelope::<serde_json::Value>(response).await?.ok()?)
    }
}

/// Polls a file's status until the pipeline settles: ready, failed, or
/// waiting for chunk confirmation. Gives up after `attempts` polls.
pub async fn watch(
    workflow: &(dyn IngestionWorkflow + Sync),
    file_id: &str,
    interval: Duration,
    attempts: u32,
) -> IngestResult<FileStatus> {
    let mut last_state = FileState::Pending;
    for _ in 0..attempts {
        let status = workflow.status(file_id).await?;
        if status.status.is_terminal() || status.status.needs_confirmation() {
            return Ok(status);
        }
        last_state = status.status;
        tracing::debug!(file_id, state = ?last_state, progress = status.progress, "file still processing");
        tokio::time::sleep(interval).await;
    }
    Err(IngestError::WatchExhausted {
        file_id: file_id.to_string(),
        state: last_state,
        attempts,
    })
}
