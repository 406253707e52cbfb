/// Per-mode conversation sessions.
///
/// Each conversation mode owns one `SessionController` with its own
/// history, generation flag, and cancellation handle. The two modes never
/// share mutable state: a stream opened under one mode keeps mutating
/// that mode's history even if the UI switches modes mid-stream.
pub mod throttle;

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::citations::RetrievalPasses;
use crate::config::ModeSettings;
use crate::message::{ConversationMessage, ReasoningStep};
use crate::persist::{SessionSnapshot, SessionStore};
use crate::stream::client::{AnswerClient, AnswerRequest, EventSink};
use crate::stream::event::{DonePayload, RetrievalPayload, ThoughtPayload};
use crate::types::{Role, WireMessage};
use throttle::{CommitScheduler, RenderThrottle, TokioScheduler};

const STATE_POISONED: &str = "session state poisoned";

/// Shown when generation fails before any answer text was committed.
pub const GENERATION_FAILED: &str = "Sorry, the answer could not be generated.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Direct retrieval against the selected knowledge bases.
    Normal,
    /// Agent-guided: intent analysis, sub-question retrieval, rerank.
    Agent,
}

impl ChatMode {
    pub fn as_wire(self) -> &'static str {
        match self {
            ChatMode::Normal => "normal",
            ChatMode::Agent => "agent",
        }
    }
}

/// One mode's conversation history and generation lifecycle.
///
/// Event application is guarded by the stream sequence number captured at
/// submission time, so frames from a cancelled or superseded stream can
/// never touch the history again.
#[derive(Debug)]
pub struct SessionState {
    pub messages: Vec<ConversationMessage>,
    pub settings: ModeSettings,
    busy: bool,
    seq: u64,
    cancel: Option<oneshot::Sender<()>>,
}

impl SessionState {
    pub fn new(settings: ModeSettings) -> Self {
        Self {
            messages: Vec::new(),
            settings,
            busy: false,
            seq: 0,
            cancel: None,
        }
    }

    pub fn generation_in_progress(&self) -> bool {
        self.busy
    }

    fn accepts(&self, seq: u64) -> bool {
        self.busy && self.seq == seq
    }

    fn active_message_mut(&mut self) -> Option<&mut ConversationMessage> {
        self.messages
            .last_mut()
            .filter(|msg| msg.role == Role::Assistant)
    }

    fn append_step(&mut self, seq: u64, step: ReasoningStep) {
        if !self.accepts(seq) {
            return;
        }
        if let Some(msg) = self.active_message_mut() {
            msg.steps.push(step);
        }
    }

    /// Replaces any previously attached citations for both passes.
    fn attach_citations(&mut self, seq: u64, passes: RetrievalPasses) {
        if !self.accepts(seq) {
            return;
        }
        if let Some(msg) = self.active_message_mut() {
            msg.citations = passes.vector;
            msg.rerank_citations = passes.rerank;
        }
    }

    fn commit_content(&mut self, seq: u64, text: &str) {
        if !self.accepts(seq) {
            return;
        }
        if let Some(msg) = self.active_message_mut() {
            msg.content.clear();
            msg.content.push_str(text);
        }
    }

    fn finish(&mut self, seq: u64) {
        if !self.accepts(seq) {
            return;
        }
        if let Some(msg) = self.active_message_mut() {
            msg.streaming = false;
        }
        self.busy = false;
        self.cancel = None;
    }

    fn fail(&mut self, seq: u64, description: &str) {
        if !self.accepts(seq) {
            return;
        }
        if let Some(msg) = self.active_message_mut() {
            if msg.content.is_empty() {
                msg.content = GENERATION_FAILED.to_string();
            }
            msg.error = Some(description.to_string());
            msg.streaming = false;
        }
        self.busy = false;
        self.cancel = None;
    }
}

/// The handler set for one turn, bound to the originating mode's state
/// and stream sequence at creation. `submit` wires it to the default
/// transport; `begin_turn` hands it out for alternative transports.
pub struct TurnSink {
    state: Arc<Mutex<SessionState>>,
    seq: u64,
    throttle: Arc<RenderThrottle>,
}

impl TurnSink {
    fn new(state: Arc<Mutex<SessionState>>, seq: u64, scheduler: Arc<dyn CommitScheduler>) -> Self {
        let commit_state = Arc::clone(&state);
        let throttle = RenderThrottle::new(
            scheduler,
            Box::new(move |text| {
                commit_state
                    .lock()
                    .expect(STATE_POISONED)
                    .commit_content(seq, text);
            }),
        );
        Self {
            state,
            seq,
            throttle,
        }
    }
}

impl EventSink for TurnSink {
    fn on_thought(&mut self, thought: ThoughtPayload) {
        let step = ReasoningStep {
            kind: thought.step,
            content: thought.content,
            duration: thought.duration,
            total_elapsed: thought.cost,
        };
        self.state
            .lock()
            .expect(STATE_POISONED)
            .append_step(self.seq, step);
    }

    fn on_retrieval(&mut self, retrieval: RetrievalPayload) {
        let passes =
            RetrievalPasses::from_wire(retrieval.citations, retrieval.original_citations);
        self.state
            .lock()
            .expect(STATE_POISONED)
            .attach_citations(self.seq, passes);
    }

    fn on_delta(&mut self, delta: &str) {
        self.throttle.push(delta);
    }

    fn on_done(&mut self, _done: DonePayload) {
        self.throttle.flush();
        self.state.lock().expect(STATE_POISONED).finish(self.seq);
    }

    fn on_error(&mut self, message: &str) {
        // Only committed content survives an error; the uncommitted tail
        // is dropped with the stream.
        self.throttle.close();
        self.state
            .lock()
            .expect(STATE_POISONED)
            .fail(self.seq, message);
    }
}

/// Everything a transport needs to run one accepted submission.
pub struct TurnHandle {
    pub request: AnswerRequest,
    pub sink: TurnSink,
    pub cancel: oneshot::Receiver<()>,
}

/// Owns one mode's session and translates stream events into message
/// mutations.
pub struct SessionController {
    mode: ChatMode,
    state: Arc<Mutex<SessionState>>,
    client: AnswerClient,
    scheduler: Arc<dyn CommitScheduler>,
}

impl SessionController {
    pub fn new(mode: ChatMode, settings: ModeSettings, client: AnswerClient) -> Self {
        Self::with_scheduler(mode, settings, client, Arc::new(TokioScheduler::default()))
    }

    pub fn with_scheduler(
        mode: ChatMode,
        settings: ModeSettings,
        client: AnswerClient,
        scheduler: Arc<dyn CommitScheduler>,
    ) -> Self {
        Self {
            mode,
            state: Arc::new(Mutex::new(SessionState::new(settings))),
            client,
            scheduler,
        }
    }

    pub fn mode(&self) -> ChatMode {
        self.mode
    }

    pub fn generation_in_progress(&self) -> bool {
        self.state.lock().expect(STATE_POISONED).busy
    }

    /// Clones the history for display.
    pub fn messages(&self) -> Vec<ConversationMessage> {
        self.state.lock().expect(STATE_POISONED).messages.clone()
    }

    pub fn settings(&self) -> ModeSettings {
        self.state.lock().expect(STATE_POISONED).settings.clone()
    }

    /// Edits this mode's retrieval settings. An in-flight generation is
    /// unaffected; it captured the settings at submission time.
    pub fn update_settings(&self, edit: impl FnOnce(&mut ModeSettings)) {
        edit(&mut self.state.lock().expect(STATE_POISONED).settings);
    }

    /// Accepts a submission and prepares the turn without opening any
    /// transport. Returns `None` if the text is blank or a generation is
    /// already in progress for this mode (history stays unchanged).
    pub fn begin_turn(&self, text: &str) -> Option<TurnHandle> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let mut state = self.state.lock().expect(STATE_POISONED);
        if state.busy {
            return None;
        }

        state.messages.push(ConversationMessage::user(text));
        state.messages.push(ConversationMessage::assistant_placeholder());
        state.busy = true;
        state.seq += 1;
        let seq = state.seq;

        let (tx, cancel) = oneshot::channel();
        state.cancel = Some(tx);

        let messages: Vec<WireMessage> = state
            .messages
            .iter()
            .filter(|msg| !(msg.role == Role::Assistant && msg.streaming))
            .map(|msg| WireMessage::new(msg.role, msg.content.clone()))
            .collect();
        let settings = &state.settings;
        let request = AnswerRequest {
            messages,
            kb_ids: settings.kb_ids.clone(),
            stream: true,
            mode: self.mode.as_wire(),
            top_k: settings.top_k,
            score_threshold: settings.score_threshold,
            model_id: settings.model_id.clone(),
            rerank_enabled: settings.rerank.as_ref().map(|_| true),
            rerank_score_threshold: settings.rerank.as_ref().map(|r| r.score_threshold),
            rerank_model_id: settings.rerank.as_ref().and_then(|r| r.model_id.clone()),
        };
        drop(state);

        // The sink captures this mode's state and sequence now; switching
        // the active UI mode cannot redirect this stream's events.
        let sink = TurnSink::new(Arc::clone(&self.state), seq, Arc::clone(&self.scheduler));
        Some(TurnHandle {
            request,
            sink,
            cancel,
        })
    }

    /// Submits user text and streams the answer in the background.
    /// Returns false (a no-op) if a generation is already in progress.
    /// Must be called within a tokio runtime.
    pub fn submit(&self, text: &str) -> bool {
        let Some(turn) = self.begin_turn(text) else {
            return false;
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            let TurnHandle {
                request,
                mut sink,
                cancel,
            } = turn;
            client.stream_answer(&request, cancel, &mut sink).await;
        });
        true
    }

    /// Cancels the in-flight generation, if any. Fire-and-forget: the
    /// mode is immediately available for a new submission, whether or not
    /// the transport has released anything. Committed content stays.
    pub fn cancel(&self) {
        let mut state = self.state.lock().expect(STATE_POISONED);
        if !state.busy {
            return;
        }
        if let Some(tx) = state.cancel.take() {
            let _ = tx.send(());
        }
        state.busy = false;
        if let Some(msg) = state.active_message_mut() {
            msg.streaming = false;
        }
    }

    /// Resubmits the most recent user message, dropping the final
    /// user/assistant pair first. A no-op unless the history ends with
    /// such a pair and no generation is in progress.
    pub fn retry(&self) -> bool {
        let text = {
            let mut state = self.state.lock().expect(STATE_POISONED);
            if state.busy {
                return false;
            }
            let len = state.messages.len();
            if len < 2
                || state.messages[len - 1].role != Role::Assistant
                || state.messages[len - 2].role != Role::User
            {
                return false;
            }
            state.messages.pop();
            match state.messages.pop() {
                Some(user) => user.content,
                None => return false,
            }
        };
        self.submit(&text)
    }

    /// Drops the whole history for this mode, cancelling any in-flight
    /// generation first.
    pub fn clear_context(&self) {
        self.cancel();
        self.state.lock().expect(STATE_POISONED).messages.clear();
    }

    /// Plain-data view of the session for persistence.
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().expect(STATE_POISONED);
        SessionSnapshot {
            mode: self.mode,
            messages: state.messages.clone(),
            settings: state.settings.clone(),
        }
    }

    /// Replaces history and settings from a snapshot. Rejected while a
    /// generation is in progress.
    pub fn restore(&self, snapshot: SessionSnapshot) -> bool {
        let snapshot = snapshot.normalized();
        let mut state = self.state.lock().expect(STATE_POISONED);
        if state.busy {
            return false;
        }
        state.messages = snapshot.messages;
        state.settings = snapshot.settings;
        true
    }
}

/// The two conversation sessions, independently constructed, never
/// sharing mutable state.
pub struct ChatSessions {
    pub normal: SessionController,
    pub agent: SessionController,
}

impl ChatSessions {
    pub fn new(client: AnswerClient, normal: ModeSettings, agent: ModeSettings) -> Self {
        Self {
            normal: SessionController::new(ChatMode::Normal, normal, client.clone()),
            agent: SessionController::new(ChatMode::Agent, agent, client),
        }
    }

    pub fn controller(&self, mode: ChatMode) -> &SessionController {
        match mode {
            ChatMode::Normal => &self.normal,
            ChatMode::Agent => &self.agent,
        }
    }

    /// Builds both sessions from the environment and restores persisted
    /// snapshots, the way the embedding UI boots.
    pub fn bootstrap() -> anyhow::Result<Self> {
        let client = AnswerClient::from_env();
        let store = SessionStore::default_location()?;
        let sessions = Self::new(client, ModeSettings::default(), ModeSettings::default());
        for mode in [ChatMode::Normal, ChatMode::Agent] {
            if let Some(snapshot) = store.load(mode)? {
                sessions.controller(mode).restore(snapshot);
            }
        }
        Ok(sessions)
    }

    /// Saves both sessions to the store.
    pub fn persist_to(&self, store: &SessionStore) -> anyhow::Result<()> {
        store.save(&self.normal.snapshot())?;
        store.save(&self.agent.snapshot())?;
        Ok(())
    }
}
