use serde::{Deserialize, Serialize};

use crate::model::value::{unsupported, Attr, Record, Value};

/// One row of a scheduler status table.
struct StatusEntry {
    code: u32,
    name: &'static str,
    friendly: &'static str,
    description: &'static str,
}

fn status_field<'a>(
    entity: &'static str,
    entry: &StatusEntry,
    name: &str,
) -> Attr<Value<'a>> {
    match name {
        "name" => Ok(entry.name.into()),
        "description" => Ok(entry.description.into()),
        "status" => Ok(entry.code.into()),
        "friendly" => Ok(entry.friendly.into()),
        other => unsupported(entity, other),
    }
}

const STATUS_FIELDS: [&str; 4] = ["name", "description", "status", "friendly"];

/// Canonical job status. A job is in exactly one of these at a time; every
/// `is_*` flag exposed on a job is derived from this single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Null,
    #[default]
    Pending,
    /// Suspended while pending.
    Held,
    Running,
    SystemSuspended,
    UserSuspended,
    Exited,
    Done,
    PostDone,
    PostError,
    Waiting,
    Unknown,
}

const JOB_STATUS_TABLE: [StatusEntry; 12] = [
    StatusEntry { code: 0x00, name: "JOB_STAT_NULL", friendly: "Null", description: "State null." },
    StatusEntry { code: 0x01, name: "JOB_STAT_PEND", friendly: "Pending", description: "The job is pending, i.e., it has not been dispatched yet." },
    StatusEntry { code: 0x02, name: "JOB_STAT_PSUSP", friendly: "Held", description: "The pending job was suspended by its owner or the cluster administrator." },
    StatusEntry { code: 0x04, name: "JOB_STAT_RUN", friendly: "Running", description: "The job is running." },
    StatusEntry { code: 0x08, name: "JOB_STAT_SSUSP", friendly: "Suspended by system", description: "The running job was suspended by the system because an execution host was overloaded or the queue run window closed." },
    StatusEntry { code: 0x10, name: "JOB_STAT_USUSP", friendly: "Suspended by user", description: "The running job was suspended by its owner or the cluster administrator." },
    StatusEntry { code: 0x20, name: "JOB_STAT_EXIT", friendly: "Exited", description: "The job has terminated with a non-zero status - it may have been aborted due to an error in its execution, or killed by its owner or by the cluster administrator." },
    StatusEntry { code: 0x40, name: "JOB_STAT_DONE", friendly: "Completed", description: "The job has terminated with status 0." },
    StatusEntry { code: 0x80, name: "JOB_STAT_PDONE", friendly: "Process Completed", description: "Post job process done successfully." },
    StatusEntry { code: 0x100, name: "JOB_STAT_PERR", friendly: "Process Error", description: "Post job process has error." },
    StatusEntry { code: 0x200, name: "JOB_STAT_WAIT", friendly: "Waiting for execution", description: "Chunk job waiting its turn to exec." },
    StatusEntry { code: 0x10000, name: "JOB_STAT_UNKWN", friendly: "Unknown", description: "The execution host has lost contact with the main batch daemon." },
];

/// Exit status the scheduler records for a job terminated by a kill request.
pub const KILLED_EXIT_STATUS: i32 = 130;

impl JobStatus {
    pub const ALL: [JobStatus; 12] = [
        JobStatus::Null,
        JobStatus::Pending,
        JobStatus::Held,
        JobStatus::Running,
        JobStatus::SystemSuspended,
        JobStatus::UserSuspended,
        JobStatus::Exited,
        JobStatus::Done,
        JobStatus::PostDone,
        JobStatus::PostError,
        JobStatus::Waiting,
        JobStatus::Unknown,
    ];

    fn entry(self) -> &'static StatusEntry {
        let index = JobStatus::ALL
            .iter()
            .position(|status| *status == self)
            .unwrap_or(JobStatus::ALL.len() - 1);
        &JOB_STATUS_TABLE[index]
    }

    pub fn code(self) -> u32 {
        self.entry().code
    }

    /// Decode a scheduler status code. Codes outside the table are `Unknown`.
    pub fn from_code(code: u32) -> Self {
        JOB_STATUS_TABLE
            .iter()
            .position(|entry| entry.code == code)
            .map_or(JobStatus::Unknown, |index| JobStatus::ALL[index])
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }

    pub fn friendly(self) -> &'static str {
        self.entry().friendly
    }

    pub fn description(self) -> &'static str {
        self.entry().description
    }

    pub fn is_pending(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Held | JobStatus::Waiting)
    }

    pub fn is_running(self) -> bool {
        self == JobStatus::Running
    }

    pub fn is_suspended(self) -> bool {
        matches!(
            self,
            JobStatus::Held | JobStatus::SystemSuspended | JobStatus::UserSuspended
        )
    }

    /// Finished successfully. Post-execution states are reported separately.
    pub fn is_completed(self) -> bool {
        self == JobStatus::Done
    }

    pub fn was_killed(self, exit_status: i32) -> bool {
        self == JobStatus::Exited && exit_status == KILLED_EXIT_STATUS
    }

    pub fn is_failed(self, exit_status: i32) -> bool {
        self == JobStatus::Exited && !self.was_killed(exit_status)
    }

    /// Done or exited: the scheduler will no longer run the job.
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            JobStatus::Exited | JobStatus::Done | JobStatus::PostDone | JobStatus::PostError
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.friendly())
    }
}

impl Record for JobStatus {
    fn type_name(&self) -> &'static str {
        "JobStatus"
    }

    fn manifest(&self) -> Vec<&str> {
        STATUS_FIELDS.to_vec()
    }

    fn field(&self, name: &str) -> Attr<Value<'_>> {
        status_field("JobStatus", self.entry(), name)
    }
}

/// One condition that applies to a host. Hosts carry a set of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Ok,
    Busy,
    WindowClosed,
    Disabled,
    Locked,
    Full,
    Unreachable,
    Unavailable,
    NoLim,
    Exclusive,
    LockedMain,
}

const HOST_STATUS_TABLE: [StatusEntry; 11] = [
    StatusEntry { code: 0x00, name: "HOST_STAT_OK", friendly: "Ok", description: "Ready to accept and run jobs." },
    StatusEntry { code: 0x01, name: "HOST_STAT_BUSY", friendly: "Busy", description: "The host load is greater than a scheduling threshold." },
    StatusEntry { code: 0x02, name: "HOST_STAT_WIND", friendly: "Dispatch Window Closed", description: "The host dispatch window is closed." },
    StatusEntry { code: 0x04, name: "HOST_STAT_DISABLED", friendly: "Disabled by Administrator", description: "The host has been disabled by the cluster administrator." },
    StatusEntry { code: 0x08, name: "HOST_STAT_LOCKED", friendly: "Locked", description: "The host is locked by an exclusive task." },
    StatusEntry { code: 0x10, name: "HOST_STAT_FULL", friendly: "Full", description: "The host has reached its job limit." },
    StatusEntry { code: 0x20, name: "HOST_STAT_UNREACH", friendly: "Unreachable", description: "The batch daemon on the host is unreachable." },
    StatusEntry { code: 0x40, name: "HOST_STAT_UNAVAIL", friendly: "Unavailable", description: "The host is down or the load daemon is unavailable." },
    StatusEntry { code: 0x80, name: "HOST_STAT_NO_LIM", friendly: "No LIM", description: "The host is not running a load information manager." },
    StatusEntry { code: 0x100, name: "HOST_STAT_EXCLUSIVE", friendly: "Exclusive", description: "The host is running an exclusive job." },
    StatusEntry { code: 0x200, name: "HOST_STAT_LOCKED_MASTER", friendly: "Locked by Main LIM", description: "The host is locked by the main load information manager." },
];

impl HostStatus {
    pub const ALL: [HostStatus; 11] = [
        HostStatus::Ok,
        HostStatus::Busy,
        HostStatus::WindowClosed,
        HostStatus::Disabled,
        HostStatus::Locked,
        HostStatus::Full,
        HostStatus::Unreachable,
        HostStatus::Unavailable,
        HostStatus::NoLim,
        HostStatus::Exclusive,
        HostStatus::LockedMain,
    ];

    fn entry(self) -> &'static StatusEntry {
        let index = HostStatus::ALL
            .iter()
            .position(|status| *status == self)
            .unwrap_or(0);
        &HOST_STATUS_TABLE[index]
    }

    pub fn code(self) -> u32 {
        self.entry().code
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }

    /// Decode a status bit mask. An empty mask means the host is ok.
    pub fn from_mask(mask: u32) -> Vec<HostStatus> {
        if mask == 0 {
            return vec![HostStatus::Ok];
        }
        HostStatus::ALL
            .iter()
            .copied()
            .filter(|status| status.code() != 0 && mask & status.code() == status.code())
            .collect()
    }

    pub fn to_mask(statuses: &[HostStatus]) -> u32 {
        statuses.iter().fold(0, |mask, status| mask | status.code())
    }

    pub fn is_down(self) -> bool {
        matches!(
            self,
            HostStatus::Unreachable | HostStatus::Unavailable | HostStatus::NoLim
        )
    }

    pub fn is_busy(self) -> bool {
        matches!(
            self,
            HostStatus::Busy
                | HostStatus::Full
                | HostStatus::Locked
                | HostStatus::Exclusive
                | HostStatus::LockedMain
        )
    }

    pub fn is_closed(self) -> bool {
        matches!(self, HostStatus::WindowClosed | HostStatus::Disabled)
    }
}

impl Record for HostStatus {
    fn type_name(&self) -> &'static str {
        "HostStatus"
    }

    fn manifest(&self) -> Vec<&str> {
        STATUS_FIELDS.to_vec()
    }

    fn field(&self, name: &str) -> Attr<Value<'_>> {
        status_field("HostStatus", self.entry(), name)
    }
}

/// One condition that applies to a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Open,
    Active,
    RunWindowOpen,
    NoPermission,
    Disconnected,
    RunWindowClosed,
}

const QUEUE_STATUS_TABLE: [StatusEntry; 6] = [
    StatusEntry { code: 0x01, name: "QUEUE_STAT_OPEN", friendly: "Open", description: "The queue is open to accept newly submitted jobs." },
    StatusEntry { code: 0x02, name: "QUEUE_STAT_ACTIVE", friendly: "Active", description: "The queue is actively dispatching jobs." },
    StatusEntry { code: 0x04, name: "QUEUE_STAT_RUN", friendly: "Run windows open", description: "The queue run windows are open." },
    StatusEntry { code: 0x08, name: "QUEUE_STAT_NOPERM", friendly: "No Permission", description: "The caller has no permission to use the queue." },
    StatusEntry { code: 0x10, name: "QUEUE_STAT_DISC", friendly: "Remote Disconnected", description: "The remote queue is disconnected." },
    StatusEntry { code: 0x20, name: "QUEUE_STAT_RUNWIN_CLOSE", friendly: "Runwindow Closed", description: "The queue run window is closed." },
];

impl QueueStatus {
    pub const ALL: [QueueStatus; 6] = [
        QueueStatus::Open,
        QueueStatus::Active,
        QueueStatus::RunWindowOpen,
        QueueStatus::NoPermission,
        QueueStatus::Disconnected,
        QueueStatus::RunWindowClosed,
    ];

    fn entry(self) -> &'static StatusEntry {
        let index = QueueStatus::ALL
            .iter()
            .position(|status| *status == self)
            .unwrap_or(0);
        &QUEUE_STATUS_TABLE[index]
    }

    pub fn code(self) -> u32 {
        self.entry().code
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }

    pub fn from_mask(mask: u32) -> Vec<QueueStatus> {
        QueueStatus::ALL
            .iter()
            .copied()
            .filter(|status| mask & status.code() == status.code())
            .collect()
    }

    pub fn to_mask(statuses: &[QueueStatus]) -> u32 {
        statuses.iter().fold(0, |mask, status| mask | status.code())
    }
}

impl Record for QueueStatus {
    fn type_name(&self) -> &'static str {
        "QueueStatus"
    }

    fn manifest(&self) -> Vec<&str> {
        STATUS_FIELDS.to_vec()
    }

    fn field(&self, name: &str) -> Attr<Value<'_>> {
        status_field("QueueStatus", self.entry(), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_job_is_pending_and_suspended_only() {
        let status = JobStatus::Held;
        assert!(status.is_pending());
        assert!(status.is_suspended());
        assert!(!status.is_running());
        assert!(!status.is_completed());
        assert!(!status.is_failed(0));
    }

    #[test]
    fn only_done_is_completed() {
        assert!(JobStatus::Done.is_completed());
        assert!(!JobStatus::PostDone.is_completed());
        assert!(!JobStatus::PostError.is_completed());
        assert!(JobStatus::PostDone.is_finished());
    }

    #[test]
    fn killed_job_is_not_failed() {
        assert!(JobStatus::Exited.was_killed(KILLED_EXIT_STATUS));
        assert!(!JobStatus::Exited.is_failed(KILLED_EXIT_STATUS));
        assert!(JobStatus::Exited.is_failed(1));
        assert!(!JobStatus::Done.was_killed(KILLED_EXIT_STATUS));
    }

    #[test]
    fn job_status_codes_round_trip_through_table() {
        for status in JobStatus::ALL {
            assert_eq!(JobStatus::from_code(status.code()), status);
        }
        assert_eq!(JobStatus::from_code(0x4000), JobStatus::Unknown);
        assert_eq!(JobStatus::Held.name(), "JOB_STAT_PSUSP");
    }

    #[test]
    fn empty_host_mask_is_ok() {
        assert_eq!(HostStatus::from_mask(0), vec![HostStatus::Ok]);
    }

    #[test]
    fn host_mask_decodes_every_set_bit() {
        let statuses = HostStatus::from_mask(0x04 | 0x20);
        assert_eq!(statuses, vec![HostStatus::Disabled, HostStatus::Unreachable]);
        assert_eq!(HostStatus::to_mask(&statuses), 0x24);
        assert!(statuses.iter().any(|s| s.is_down()));
        assert!(statuses.iter().any(|s| s.is_closed()));
    }

    #[test]
    fn queue_mask_decodes_open_and_active() {
        let statuses = QueueStatus::from_mask(0x03);
        assert_eq!(statuses, vec![QueueStatus::Open, QueueStatus::Active]);
        assert!(QueueStatus::from_mask(0).is_empty());
    }
}
