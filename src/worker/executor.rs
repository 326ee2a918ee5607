use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::config::ExecutorConfig;
use crate::error::{ClusterError, Result};
use crate::worker::channel::WorkUnit;
use crate::worker::identity::UserDatabase;
use crate::worker::isolation::{Collected, Isolation, Progress};
use crate::worker::operation::{Operation, Outcome};

/// Lifecycle of one privileged invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Idle,
    Spawned,
    AwaitingResult,
    Completed,
    Failed,
    TimedOut,
}

impl InvocationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InvocationState::Completed | InvocationState::Failed | InvocationState::TimedOut
        )
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InvocationState::Idle => "idle",
            InvocationState::Spawned => "spawned",
            InvocationState::AwaitingResult => "awaiting_result",
            InvocationState::Completed => "completed",
            InvocationState::Failed => "failed",
            InvocationState::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

/// A finished invocation.
#[derive(Debug)]
pub struct Invocation {
    pub id: Uuid,
    pub state: InvocationState,
    pub result: Result<Outcome>,
}

impl Invocation {
    pub fn into_result(self) -> Result<Outcome> {
        self.result
    }
}

struct Tracker {
    id: Uuid,
    state: InvocationState,
}

impl Tracker {
    fn advance(&mut self, next: InvocationState) {
        tracing::debug!(invocation = %self.id, from = %self.state, to = %next, "Invocation state");
        self.state = next;
    }
}

impl Progress for Tracker {
    fn spawned(&mut self, pid: Option<u32>) {
        tracing::debug!(invocation = %self.id, pid, "Worker spawned");
        self.advance(InvocationState::Spawned);
    }

    fn awaiting_result(&mut self) {
        self.advance(InvocationState::AwaitingResult);
    }
}

/// Runs each privileged operation in its own worker, as the acting user.
///
/// One worker per invocation, one message per worker. Nothing is retried.
#[derive(Clone)]
pub struct PrivilegedExecutor {
    users: Arc<dyn UserDatabase>,
    isolation: Isolation,
    timeout: Duration,
}

impl PrivilegedExecutor {
    pub fn new(users: Arc<dyn UserDatabase>, isolation: Isolation, timeout: Duration) -> Self {
        Self {
            users,
            isolation,
            timeout,
        }
    }

    /// Process-isolated executor using the configured worker command.
    pub fn from_config(config: &ExecutorConfig, users: Arc<dyn UserDatabase>) -> Self {
        Self::new(users, Isolation::Process(config.worker_command()), config.timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn isolation(&self) -> &Isolation {
        &self.isolation
    }

    /// Perform `operation` as `user` and report the outcome.
    pub async fn execute(&self, user: &str, operation: Operation) -> Result<Outcome> {
        self.invoke(user, operation).await.into_result()
    }

    /// Like [`execute`](Self::execute), keeping the final state.
    pub async fn invoke(&self, user: &str, operation: Operation) -> Invocation {
        let mut tracker = Tracker {
            id: Uuid::new_v4(),
            state: InvocationState::Idle,
        };
        tracing::info!(invocation = %tracker.id, user, operation = %operation, "Invocation started");

        // Looked up per call; accounts may change between requests.
        let identity = match self.users.lookup(user) {
            Ok(identity) => identity,
            Err(e) => return self.finish(tracker, InvocationState::Failed, Err(e)),
        };

        let unit = WorkUnit {
            invocation: tracker.id,
            identity,
            operation,
        };
        match self.isolation.run(unit, self.timeout, &mut tracker).await {
            Collected::Message(message) => {
                let result = message.into_result();
                let state = if result.is_ok() {
                    InvocationState::Completed
                } else {
                    InvocationState::Failed
                };
                self.finish(tracker, state, result)
            }
            Collected::Broken(e) => self.finish(tracker, InvocationState::Failed, Err(e)),
            Collected::TimedOut => {
                let err = ClusterError::cluster_interface(format!(
                    "Worker did not report a result within {} ms",
                    self.timeout.as_millis()
                ))
                .with_extra("timeout_ms", self.timeout.as_millis() as u64);
                self.finish(tracker, InvocationState::TimedOut, Err(err))
            }
        }
    }

    fn finish(
        &self,
        mut tracker: Tracker,
        state: InvocationState,
        result: Result<Outcome>,
    ) -> Invocation {
        tracker.advance(state);
        match &result {
            Ok(outcome) => {
                tracing::info!(invocation = %tracker.id, message = %outcome.message, "Invocation completed")
            }
            Err(e) => tracing::warn!(
                invocation = %tracker.id,
                state = %state,
                kind = e.kind().class_name(),
                error = %e,
                "Invocation failed"
            ),
        }
        Invocation {
            id: tracker.id,
            state,
            result,
        }
    }
}
