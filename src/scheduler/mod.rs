//! Scheduler backend boundary.
//!
//! A [`Scheduler`] is a connection to the batch scheduler made on behalf of
//! one acting user. Reads return model views; mutations return nothing but
//! success or a [`ClusterError`](crate::error::ClusterError) translated from
//! the scheduler's native error codes.

pub mod memory;
pub mod native;
pub mod request;
pub mod snapshot;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Cluster, Host, Job, JobId, Queue, User};

pub use memory::{MemoryScheduler, StateFile};
pub use native::native_error;
pub use request::{JobFilter, JobState, SubmitRequest};
pub use snapshot::{
    ClusterSnapshot, ExecutionSlot, HostSnapshot, JobSnapshot, QueueSnapshot, UserSnapshot,
};

/// Signals that can be delivered to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSignal {
    Kill,
    Suspend,
    Resume,
}

impl std::fmt::Display for JobSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobSignal::Kill => write!(f, "kill"),
            JobSignal::Suspend => write!(f, "suspend"),
            JobSignal::Resume => write!(f, "resume"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueAction {
    Open,
    Close,
    Activate,
    Inactivate,
}

impl std::fmt::Display for QueueAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueAction::Open => write!(f, "open"),
            QueueAction::Close => write!(f, "close"),
            QueueAction::Activate => write!(f, "activate"),
            QueueAction::Inactivate => write!(f, "inactivate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostAction {
    Open,
    Close,
}

impl std::fmt::Display for HostAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostAction::Open => write!(f, "open"),
            HostAction::Close => write!(f, "close"),
        }
    }
}

/// A connection to the batch scheduler.
pub trait Scheduler: Send + Sync {
    fn cluster(&self) -> Result<Box<dyn Cluster>>;

    fn host(&self, name: &str) -> Result<Box<dyn Host>>;

    fn hosts(&self) -> Result<Vec<Box<dyn Host>>>;

    fn job(&self, id: JobId) -> Result<Box<dyn Job>>;

    fn jobs(&self, filter: &JobFilter) -> Result<Vec<Box<dyn Job>>>;

    fn queue(&self, name: &str) -> Result<Box<dyn Queue>>;

    fn queues(&self) -> Result<Vec<Box<dyn Queue>>>;

    fn user(&self, name: &str) -> Result<Box<dyn User>>;

    fn users(&self) -> Result<Vec<Box<dyn User>>>;

    fn signal_job(&self, id: JobId, signal: JobSignal) -> Result<()>;

    /// Put a finished or running job back in its queue, pending or held.
    fn requeue_job(&self, id: JobId, hold: bool) -> Result<()>;

    /// Submit a job. Array submissions return one id per element.
    fn submit(&self, request: &SubmitRequest) -> Result<Vec<JobId>>;

    fn control_queue(&self, name: &str, action: QueueAction) -> Result<()>;

    fn control_host(&self, name: &str, action: HostAction) -> Result<()>;

    /// Base path of the job's spooled output, if the scheduler has one.
    /// Output and error streams live at `<path>.out` and `<path>.err`.
    fn output_path(&self, id: JobId) -> Result<Option<PathBuf>>;
}

/// Opens scheduler connections for an acting user.
pub trait SchedulerFactory: Send + Sync {
    fn connect(&self, acting_user: Option<&str>) -> Result<Box<dyn Scheduler>>;
}
