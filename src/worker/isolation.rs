use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::time::{timeout_at, Instant};

use crate::config::WorkerCommand;
use crate::error::ClusterError;
use crate::worker::channel::{decode_single, WorkUnit, WorkerMessage};
use crate::worker::runtime::WorkerRuntime;

/// Where a worker runs.
#[derive(Clone)]
pub enum Isolation {
    /// A fresh child process per invocation. The only mode in which the
    /// identity drop is confined to the worker.
    Process(WorkerCommand),
    /// A blocking task inside this process. Only safe with an identity drop
    /// that leaves the process alone, as in tests and single-user setups.
    InProcess(Arc<WorkerRuntime>),
}

/// How a worker run ended, as seen by the executor.
pub(crate) enum Collected {
    Message(WorkerMessage),
    Broken(ClusterError),
    TimedOut,
}

/// Progress notifications from a running worker.
pub(crate) trait Progress: Send {
    fn spawned(&mut self, pid: Option<u32>);
    fn awaiting_result(&mut self);
}

impl Isolation {
    pub(crate) async fn run(
        &self,
        unit: WorkUnit,
        timeout: Duration,
        progress: &mut dyn Progress,
    ) -> Collected {
        match self {
            Isolation::Process(command) => run_process(command, &unit, timeout, progress).await,
            Isolation::InProcess(runtime) => {
                run_in_process(Arc::clone(runtime), unit, timeout, progress).await
            }
        }
    }
}

async fn run_process(
    command: &WorkerCommand,
    unit: &WorkUnit,
    timeout: Duration,
    progress: &mut dyn Progress,
) -> Collected {
    let deadline = Instant::now() + timeout;

    let payload = match serde_json::to_vec(unit) {
        Ok(payload) => payload,
        Err(e) => {
            return Collected::Broken(ClusterError::cluster_interface(format!(
                "Unable to encode work unit: {e}"
            )))
        }
    };

    let mut child = match Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            return Collected::Broken(
                ClusterError::cluster_interface(format!("Unable to start worker: {e}"))
                    .with_extra("program", command.program.display().to_string()),
            )
        }
    };
    progress.spawned(child.id());

    let (Some(mut stdin), Some(mut stdout)) = (child.stdin.take(), child.stdout.take()) else {
        return Collected::Broken(ClusterError::cluster_interface(
            "Worker started without a channel",
        ));
    };

    let hand_over = async move {
        stdin.write_all(&payload).await?;
        stdin.shutdown().await
        // stdin drops here, closing the worker's input
    };
    let handed_over = timeout_at(deadline, hand_over).await;
    match handed_over {
        Ok(Ok(())) => {}
        // A worker that dies before reading is reported through its output.
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
        Ok(Err(e)) => {
            return Collected::Broken(ClusterError::cluster_interface(format!(
                "Unable to hand work to worker: {e}"
            )))
        }
        Err(_) => {
            terminate(&mut child).await;
            return Collected::TimedOut;
        }
    }
    progress.awaiting_result();

    let mut output = Vec::new();
    let collect = async {
        stdout.read_to_end(&mut output).await?;
        child.wait().await
    };
    let collected = timeout_at(deadline, collect).await;
    let status = match collected {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            terminate(&mut child).await;
            return Collected::Broken(ClusterError::cluster_interface(format!(
                "Unable to collect worker result: {e}"
            )));
        }
        Err(_) => {
            terminate(&mut child).await;
            return Collected::TimedOut;
        }
    };

    match decode_single(&output) {
        Ok(message) => Collected::Message(message),
        Err(e) => Collected::Broken(e.with_extra("exit_status", status.to_string())),
    }
}

async fn terminate(child: &mut tokio::process::Child) {
    if let Err(e) = child.start_kill() {
        tracing::warn!(error = %e, "Failed to kill worker");
    }
    let _ = child.wait().await;
}

async fn run_in_process(
    runtime: Arc<WorkerRuntime>,
    unit: WorkUnit,
    timeout: Duration,
    progress: &mut dyn Progress,
) -> Collected {
    let (tx, rx) = oneshot::channel();
    tokio::task::spawn_blocking(move || {
        let message = runtime.run(&unit);
        let _ = tx.send(message);
    });
    progress.spawned(None);
    progress.awaiting_result();

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(message)) => Collected::Message(message),
        Ok(Err(_)) => Collected::Broken(ClusterError::cluster_interface(
            "Worker exited without reporting a result",
        )),
        // A blocking task cannot be stopped; its result is discarded.
        Err(_) => Collected::TimedOut,
    }
}
