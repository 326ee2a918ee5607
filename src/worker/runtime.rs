use std::any::Any;
use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ClusterError, Result};
use crate::projection::Projector;
use crate::scheduler::SchedulerFactory;
use crate::worker::channel::{WorkUnit, WorkerMessage};
use crate::worker::identity::PrivilegeDrop;
use crate::worker::operation::Outcome;

/// What runs inside a worker: drop identity, connect, perform.
pub struct WorkerRuntime {
    schedulers: Arc<dyn SchedulerFactory>,
    privileges: Arc<dyn PrivilegeDrop>,
    projector: Projector,
}

impl WorkerRuntime {
    pub fn new(
        schedulers: Arc<dyn SchedulerFactory>,
        privileges: Arc<dyn PrivilegeDrop>,
        projector: Projector,
    ) -> Self {
        Self {
            schedulers,
            privileges,
            projector,
        }
    }

    /// Run one unit to completion. Panics are reported as a fault, never
    /// propagated.
    pub fn run(&self, unit: &WorkUnit) -> WorkerMessage {
        match panic::catch_unwind(AssertUnwindSafe(|| self.run_unit(unit))) {
            Ok(result) => {
                if let Err(e) = &result {
                    debug!(invocation = %unit.invocation, error = %e, "Operation failed");
                }
                WorkerMessage::from_result(result)
            }
            Err(payload) => {
                let detail = panic_detail(payload.as_ref());
                warn!(invocation = %unit.invocation, detail, "Worker panicked");
                WorkerMessage::Fault { detail }
            }
        }
    }

    fn run_unit(&self, unit: &WorkUnit) -> Result<Outcome> {
        // Nothing may reach the scheduler before this returns.
        self.privileges.drop_to(&unit.identity)?;
        let scheduler = self.schedulers.connect(Some(&unit.identity.name))?;
        unit.operation.perform(scheduler.as_ref(), &self.projector)
    }

    /// Worker process body: read one unit from `input` until EOF, write one
    /// message to `output`.
    pub fn serve_one(&self, mut input: impl Read, mut output: impl Write) -> std::io::Result<()> {
        let mut payload = Vec::new();
        input.read_to_end(&mut payload)?;
        let message = match serde_json::from_slice::<WorkUnit>(&payload) {
            Ok(unit) => self.run(&unit),
            Err(e) => WorkerMessage::Failure {
                error: ClusterError::cluster_interface(format!("Unreadable work unit: {e}")),
            },
        };
        output.write_all(&message.encode()?)?;
        output.flush()
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "panic".to_string()
    }
}
