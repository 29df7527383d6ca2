//! A cloneable handle for observing and cancelling one agent invocation.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Lifecycle of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not spawned yet
    Pending,
    /// Child process is running
    Running { pid: Option<u32> },
    /// The finish frame has been written
    Finished {
        exit_code: Option<i32>,
        cancelled: bool,
    },
}

/// A cloneable handle for cancelling a run from external code.
///
/// All fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Debug, Clone)]
pub struct RunHandle {
    id: Uuid,
    cancel: CancellationToken,
    state: Arc<Mutex<RunState>>,
    finished_notify: Arc<Notify>,
}

impl RunHandle {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            state: Arc::new(Mutex::new(RunState::Pending)),
            finished_notify: Arc::new(Notify::new()),
        }
    }

    /// Invocation id, used to correlate log output
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Request cancellation. The run still ends with a finish frame.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Get the cancellation token (for callers that want to tie it to another scope)
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state(), RunState::Finished { .. })
    }

    pub(crate) fn mark_running(&self, pid: Option<u32>) {
        *self.state.lock() = RunState::Running { pid };
    }

    pub(crate) fn mark_finished(&self, exit_code: Option<i32>, cancelled: bool) {
        *self.state.lock() = RunState::Finished {
            exit_code,
            cancelled,
        };
        self.finished_notify.notify_waiters();
    }

    /// Wait until the run has finished.
    pub async fn wait(&self) {
        let notified = self.finished_notify.notified();
        if self.is_finished() {
            return;
        }
        notified.await;
    }

    /// Wait until the run has finished, with a timeout.
    /// Returns `true` if the run finished, `false` on timeout.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_finished() {
            return true;
        }
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}

impl Default for RunHandle {
    fn default() -> Self {
        Self::new()
    }
}
