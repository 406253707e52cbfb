use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Host-provided deferred-execution quantum the throttle commits on. A
/// browser would hand this a repaint callback; the default here defers by
/// one frame on the tokio timer.
pub trait CommitScheduler: Send + Sync {
    fn schedule(&self, commit: Box<dyn FnOnce() + Send>);
}

/// Runs scheduled commits one frame interval later.
pub struct TokioScheduler {
    frame: Duration,
}

impl TokioScheduler {
    pub fn new(frame: Duration) -> Self {
        Self { frame }
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new(Duration::from_millis(16))
    }
}

impl CommitScheduler for TokioScheduler {
    fn schedule(&self, commit: Box<dyn FnOnce() + Send>) {
        let frame = self.frame;
        tokio::spawn(async move {
            tokio::time::sleep(frame).await;
            commit();
        });
    }
}

/// Runs commits synchronously; collapses the quantum to zero.
pub struct InlineScheduler;

impl CommitScheduler for InlineScheduler {
    fn schedule(&self, commit: Box<dyn FnOnce() + Send>) {
        commit();
    }
}

/// Queues commits until `run_pending`; lets tests step the quantum by
/// hand.
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl ManualScheduler {
    pub fn run_pending(&self) {
        let drained: Vec<_> = {
            let mut pending = self.pending.lock().expect("scheduler poisoned");
            pending.drain(..).collect()
        };
        for commit in drained {
            commit();
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("scheduler poisoned").len()
    }
}

impl CommitScheduler for ManualScheduler {
    fn schedule(&self, commit: Box<dyn FnOnce() + Send>) {
        self.pending.lock().expect("scheduler poisoned").push(commit);
    }
}

type CommitFn = Box<dyn Fn(&str) + Send + Sync>;

struct ThrottleState {
    buffer: String,
    scheduled: bool,
    closed: bool,
}

/// Bounds visible content updates to one commit per scheduling quantum.
///
/// Deltas land in the accumulation buffer synchronously; at most one
/// commit is in flight at a time, and each commit writes the full buffer,
/// so dropped intermediate commits never lose text. `flush` performs the
/// terminal synchronous commit that makes the committed content equal the
/// complete accumulation regardless of coalescing.
pub struct RenderThrottle {
    state: Mutex<ThrottleState>,
    scheduler: Arc<dyn CommitScheduler>,
    commit: CommitFn,
}

impl RenderThrottle {
    pub fn new(scheduler: Arc<dyn CommitScheduler>, commit: CommitFn) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ThrottleState {
                buffer: String::new(),
                scheduled: false,
                closed: false,
            }),
            scheduler,
            commit,
        })
    }

    /// Appends a delta and schedules a commit if none is pending.
    pub fn push(self: &Arc<Self>, delta: &str) {
        let schedule = {
            let mut state = self.state.lock().expect("throttle poisoned");
            if state.closed {
                return;
            }
            state.buffer.push_str(delta);
            if state.scheduled {
                false
            } else {
                state.scheduled = true;
                true
            }
        };
        if schedule {
            let throttle = Arc::clone(self);
            self.scheduler
                .schedule(Box::new(move || throttle.commit_pending()));
        }
    }

    fn commit_pending(&self) {
        let text = {
            let mut state = self.state.lock().expect("throttle poisoned");
            state.scheduled = false;
            if state.closed {
                return;
            }
            state.buffer.clone()
        };
        (self.commit)(&text);
    }

    /// Terminal commit: cancels any pending scheduled commit and writes
    /// the full buffer synchronously.
    pub fn flush(&self) {
        let text = {
            let mut state = self.state.lock().expect("throttle poisoned");
            state.closed = true;
            state.buffer.clone()
        };
        (self.commit)(&text);
    }

    /// Drops the uncommitted tail without a final commit (error path).
    pub fn close(&self) {
        self.state.lock().expect("throttle poisoned").closed = true;
    }

    #[cfg(test)]
    fn contents(&self) -> String {
        self.state.lock().expect("throttle poisoned").buffer.clone()
    }
}
