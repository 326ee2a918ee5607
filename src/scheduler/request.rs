use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClusterError, Result};
use crate::model::JobStatus;

fn one() -> u32 {
    1
}

/// A flat job submission. Only `command` is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitRequest {
    pub command: String,
    /// Raw scheduler option bits, merged with the bits implied by the other fields.
    #[serde(default)]
    pub options: u32,
    #[serde(default)]
    pub options2: u32,
    #[serde(default = "one")]
    pub requested_slots: u32,
    /// `name[a-b]` submits an array job with indexes `a..=b`.
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub queue_name: Option<String>,
    /// Space separated host names.
    #[serde(default)]
    pub requested_hosts: Option<String>,
    #[serde(default)]
    pub resource_request: Option<String>,
    #[serde(default)]
    pub host_specification: Option<String>,
    #[serde(default)]
    pub dependency_conditions: Option<String>,
    #[serde(default)]
    pub signal_value: Option<i32>,
    #[serde(default)]
    pub input_file: Option<String>,
    #[serde(default)]
    pub output_file: Option<String>,
    #[serde(default)]
    pub error_file: Option<String>,
    /// Seconds between checkpoints.
    #[serde(default)]
    pub checkpoint_period: Option<i64>,
    #[serde(default)]
    pub checkpoint_directory: Option<String>,
    #[serde(default)]
    pub email_user: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub max_requested_slots: Option<u32>,
    #[serde(default)]
    pub login_shell: Option<String>,
    #[serde(default)]
    pub user_priority: Option<i64>,
}

const SUBMIT_FIELDS: [&str; 21] = [
    "options",
    "options2",
    "requested_slots",
    "command",
    "job_name",
    "queue_name",
    "requested_hosts",
    "resource_request",
    "host_specification",
    "dependency_conditions",
    "signal_value",
    "input_file",
    "output_file",
    "error_file",
    "checkpoint_period",
    "checkpoint_directory",
    "email_user",
    "project_name",
    "max_requested_slots",
    "login_shell",
    "user_priority",
];

/// Largest slot count a single submission may request.
pub const MAX_REQUESTED_SLOTS: u32 = 1 << 20;

/// `options` bits and the names jobs report them under.
const SUBMIT_OPTIONS: [(u32, &str); 29] = [
    (0x01, "SUB_JOB_NAME"),
    (0x02, "SUB_QUEUE"),
    (0x04, "SUB_HOST"),
    (0x08, "SUB_IN_FILE"),
    (0x10, "SUB_OUT_FILE"),
    (0x20, "SUB_ERR_FILE"),
    (0x40, "SUB_EXCLUSIVE"),
    (0x80, "SUB_NOTIFY_END"),
    (0x100, "SUB_NOTIFY_BEGIN"),
    (0x200, "SUB_USER_GROUP"),
    (0x400, "SUB_CHKPNT_PERIOD"),
    (0x800, "SUB_CHKPNT_DIR"),
    (0x1000, "SUB_RESTART_FORCE"),
    (0x2000, "SUB_RESTART"),
    (0x4000, "SUB_RERUNNABLE"),
    (0x8000, "SUB_WINDOW_SIG"),
    (0x10000, "SUB_HOST_SPEC"),
    (0x20000, "SUB_DEPEND_COND"),
    (0x40000, "SUB_RES_REQ"),
    (0x80000, "SUB_OTHER_FILES"),
    (0x100000, "SUB_PRE_EXEC"),
    (0x200000, "SUB_LOGIN_SHELL"),
    (0x400000, "SUB_MAIL_USER"),
    (0x800000, "SUB_MODIFY"),
    (0x1000000, "SUB_MODIFY_ONCE"),
    (0x2000000, "SUB_PROJECT_NAME"),
    (0x4000000, "SUB_INTERACTIVE"),
    (0x8000000, "SUB_PTY"),
    (0x10000000, "SUB_PTY_SHELL"),
];

/// `options2` bits and their names.
const SUBMIT_OPTIONS2: [(u32, &str); 13] = [
    (0x01, "SUB2_HOLD"),
    (0x02, "SUB2_MODIFY_CMD"),
    (0x04, "SUB2_BSUB_BLOCK"),
    (0x08, "SUB2_HOST_NT"),
    (0x10, "SUB2_HOST_UX"),
    (0x20, "SUB2_QUEUE_CHKPNT"),
    (0x40, "SUB2_QUEUE_RERUNNABLE"),
    (0x80, "SUB2_IN_FILE_SPOOL"),
    (0x100, "SUB2_JOB_CMD_SPOOL"),
    (0x200, "SUB2_JOB_PRIORITY"),
    (0x400, "SUB2_USE_DEF_PROCLIMIT"),
    (0x800, "SUB2_MODIFY_RUN_JOB"),
    (0x1000, "SUB2_MODIFY_PEND_JOB"),
];

const SUB2_HOLD: u32 = 0x01;

impl SubmitRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            requested_slots: 1,
            ..Default::default()
        }
    }

    pub fn with_job_name(mut self, name: impl Into<String>) -> Self {
        self.job_name = Some(name.into());
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue_name = Some(queue.into());
        self
    }

    pub fn with_requested_slots(mut self, slots: u32) -> Self {
        self.requested_slots = slots;
        self
    }

    pub fn with_max_requested_slots(mut self, slots: u32) -> Self {
        self.max_requested_slots = Some(slots);
        self
    }

    pub fn with_requested_hosts(mut self, hosts: impl Into<String>) -> Self {
        self.requested_hosts = Some(hosts.into());
        self
    }

    pub fn with_options(mut self, options: u32, options2: u32) -> Self {
        self.options = options;
        self.options2 = options2;
        self
    }

    pub fn with_signal_value(mut self, signal: i32) -> Self {
        self.signal_value = Some(signal);
        self
    }

    /// Build a request from a flat field mapping, rejecting names that are
    /// not submission fields.
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self> {
        if let Some(unknown) = fields
            .keys()
            .find(|name| !SUBMIT_FIELDS.contains(&name.as_str()))
        {
            return Err(ClusterError::job_submit(format!(
                "Field: {unknown} is not a valid field name"
            )));
        }
        serde_json::from_value(Value::Object(fields))
            .map_err(|e| ClusterError::job_submit(format!("Invalid submission: {e}")))
    }

    /// Reject requests the scheduler could never accept.
    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(ClusterError::job_submit("A command is required"));
        }
        if self.requested_slots == 0 {
            return Err(ClusterError::job_submit("At least one slot must be requested"));
        }
        let most = self.requested_slots.max(self.max_requested_slots.unwrap_or(0));
        if most > MAX_REQUESTED_SLOTS {
            return Err(ClusterError::job_submit(format!(
                "At most {MAX_REQUESTED_SLOTS} slots may be requested"
            )));
        }
        Ok(())
    }

    /// `options` with the bits implied by the fields that are set.
    pub fn effective_options(&self) -> u32 {
        let implied = [
            (self.job_name.is_some(), 0x01),
            (self.queue_name.is_some(), 0x02),
            (self.requested_hosts.is_some(), 0x04),
            (self.input_file.is_some(), 0x08),
            (self.output_file.is_some(), 0x10),
            (self.error_file.is_some(), 0x20),
            (self.checkpoint_period.is_some(), 0x400),
            (self.checkpoint_directory.is_some(), 0x800),
            (self.signal_value.is_some(), 0x8000),
            (self.host_specification.is_some(), 0x10000),
            (self.dependency_conditions.is_some(), 0x20000),
            (self.resource_request.is_some(), 0x40000),
            (self.login_shell.is_some(), 0x200000),
            (self.email_user.is_some(), 0x400000),
            (self.project_name.is_some(), 0x2000000),
        ];
        implied
            .iter()
            .filter(|(set, _)| *set)
            .fold(self.options, |bits, (_, bit)| bits | bit)
    }

    pub fn effective_options2(&self) -> u32 {
        if self.user_priority.is_some() {
            self.options2 | 0x200
        } else {
            self.options2
        }
    }

    /// Names of every option bit the submission carries, `options` first.
    /// Unknown bits are dropped.
    pub fn option_names(&self) -> Vec<String> {
        let named = |bits: u32, table: &[(u32, &str)]| -> Vec<String> {
            table
                .iter()
                .filter(|(bit, _)| bits & bit != 0)
                .map(|(_, name)| name.to_string())
                .collect()
        };
        let mut names = named(self.effective_options(), &SUBMIT_OPTIONS);
        names.extend(named(self.effective_options2(), &SUBMIT_OPTIONS2));
        names
    }

    /// Submitted held: the job waits in the held state until resumed.
    pub fn is_held(&self) -> bool {
        self.options2 & SUB2_HOLD != 0
    }

    /// The slot ceiling, never below the requested slot count.
    pub fn effective_max_slots(&self) -> u32 {
        self.max_requested_slots
            .unwrap_or(self.requested_slots)
            .max(self.requested_slots)
    }

    pub fn requested_host_list(&self) -> Vec<String> {
        self.requested_hosts
            .as_deref()
            .map(|hosts| hosts.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Split `name[a-b]` into the base name and the array index range.
    pub fn array_range(&self) -> Result<Option<(String, u32, u32)>> {
        let Some(name) = self.job_name.as_deref() else {
            return Ok(None);
        };
        let Some(open) = name.find('[') else {
            return Ok(None);
        };
        let bad_name = || ClusterError::job_submit(format!("Bad job name: {name}"));
        let spec = name[open + 1..].strip_suffix(']').ok_or_else(bad_name)?;
        let (first, last) = match spec.split_once('-') {
            Some((first, last)) => (first, last),
            None => (spec, spec),
        };
        let first: u32 = first.trim().parse().map_err(|_| bad_name())?;
        let last: u32 = last.trim().parse().map_err(|_| bad_name())?;
        if first == 0 || last < first {
            return Err(bad_name());
        }
        Ok(Some((name[..open].to_string(), first, last)))
    }
}

/// Which jobs a listing returns, by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Everything that has not finished.
    #[default]
    Active,
    All,
    Pending,
    Running,
    Suspended,
    Finished,
}

impl JobState {
    pub fn matches(self, status: JobStatus) -> bool {
        match self {
            JobState::Active => !status.is_finished(),
            JobState::All => true,
            JobState::Pending => status.is_pending(),
            JobState::Running => status.is_running(),
            JobState::Suspended => status.is_suspended(),
            JobState::Finished => status.is_finished(),
        }
    }
}

/// User name that matches every job owner.
pub const ALL_USERS: &str = "all";

fn all_users() -> String {
    ALL_USERS.to_string()
}

/// Criteria for a job listing. Unset criteria match everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobFilter {
    pub job_id: Option<u64>,
    pub array_index: Option<u32>,
    #[serde(default = "all_users")]
    pub user_name: String,
    pub queue_name: Option<String>,
    pub host_name: Option<String>,
    pub job_name: Option<String>,
    pub state: JobState,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            job_id: None,
            array_index: None,
            user_name: all_users(),
            queue_name: None,
            host_name: None,
            job_name: None,
            state: JobState::Active,
        }
    }
}

impl JobFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(mut self, state: JobState) -> Self {
        self.state = state;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user_name = user.into();
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue_name = Some(queue.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host_name = Some(host.into());
        self
    }

    pub fn with_job_id(mut self, job_id: u64) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn matches_user(&self, user_name: &str) -> bool {
        self.user_name == ALL_USERS || self.user_name == user_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn unknown_field_is_a_submit_error() {
        let err = SubmitRequest::from_fields(fields(json!({"command": "sleep 1", "colour": "red"})))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::JobSubmit);
        assert_eq!(err.message(), "Field: colour is not a valid field name");
    }

    #[test]
    fn requested_slots_defaults_to_one() {
        let request = SubmitRequest::from_fields(fields(json!({"command": "sleep 1"}))).unwrap();
        assert_eq!(request.requested_slots, 1);
        assert_eq!(request.effective_max_slots(), 1);
    }

    #[test]
    fn max_slots_raised_to_requested() {
        let request = SubmitRequest::new("hostname")
            .with_requested_slots(4)
            .with_max_requested_slots(2);
        assert_eq!(request.effective_max_slots(), 4);
    }

    #[test]
    fn empty_command_rejected() {
        assert!(SubmitRequest::new("  ").validate().is_err());
        assert!(SubmitRequest::new("sleep 1").validate().is_ok());
    }

    #[test]
    fn array_job_names() {
        let request = SubmitRequest::new("sleep 1").with_job_name("sweep[1-4]");
        assert_eq!(request.array_range().unwrap(), Some(("sweep".to_string(), 1, 4)));

        let plain = SubmitRequest::new("sleep 1").with_job_name("plain");
        assert_eq!(plain.array_range().unwrap(), None);

        let bad = SubmitRequest::new("sleep 1").with_job_name("bad[4-1]");
        assert!(bad.array_range().is_err());
    }

    #[test]
    fn active_state_excludes_finished_jobs() {
        assert!(JobState::Active.matches(JobStatus::Held));
        assert!(!JobState::Active.matches(JobStatus::Done));
        assert!(JobState::Finished.matches(JobStatus::Exited));
        assert!(JobFilter::new().matches_user("alice"));
        assert!(!JobFilter::new().with_user("bob").matches_user("alice"));
    }

    #[test]
    fn fields_imply_option_bits() {
        let request = SubmitRequest::from_fields(fields(json!({
            "command": "sleep 1",
            "project_name": "default",
            "user_priority": 10,
            "options": 0x40000000u32
        })))
        .unwrap();
        assert_eq!(request.effective_options(), 0x40000000 | 0x2000000);
        assert_eq!(request.effective_options2(), 0x200);
        // Bits with no name are kept in the mask but not listed.
        assert_eq!(
            request.option_names(),
            vec!["SUB_PROJECT_NAME".to_string(), "SUB2_JOB_PRIORITY".to_string()]
        );
        assert!(!request.is_held());
    }
}
