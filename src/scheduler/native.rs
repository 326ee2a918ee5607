//! Scheduler-native error codes and their mapping into [`ClusterError`].

use crate::error::{ClusterError, ErrorKind};

pub const NO_JOB: i32 = 1;
pub const JOB_FINISHED: i32 = 4;
pub const NO_USER: i32 = 15;
pub const BAD_USER: i32 = 16;
pub const PERMISSION: i32 = 17;
pub const BAD_QUEUE: i32 = 18;
pub const QUEUE_CLOSED: i32 = 20;
pub const QUEUE_USE: i32 = 22;
pub const BAD_HOST: i32 = 23;
pub const BAD_ARGUMENT: i32 = 35;
pub const EMPTY_JOB: i32 = 40;
pub const BAD_JOB_NAME: i32 = 42;
pub const TOO_FEW_PROCESSORS: i32 = 125;

const MESSAGES: [&str; 132] = [
    "No error",
    "No matching job found",
    "Job has not started yet",
    "Job has already started",
    "Job has already finished",
    "Error 5",
    "Dependency condition syntax error",
    "Queue does not accept EXCLUSIVE jobs",
    "Root job submission is disabled",
    "Job is already being migrated",
    "Job is not checkpointable",
    "No output so far",
    "No job Id can be used now",
    "Queue only accepts interactive jobs",
    "Queue does not accept interactive jobs",
    "No user is defined in the lsb.users file",
    "Unknown user",
    "User permission denied",
    "No such queue",
    "Queue name must be specified",
    "Queue has been closed",
    "Not activated because queue windows are closed",
    "User cannot use the queue",
    "Bad host name, host group name or cluster name",
    "Too many processors requested",
    "Reserved for future use",
    "Reserved for future use",
    "No user/host group defined in the system",
    "No such user/host group",
    "Host or host group is not used by the queue",
    "Queue does not have enough per-user job slots",
    "Current host is more suitable at this time",
    "Checkpoint log is not found or is corrupted",
    "Queue does not have enough per-processor job slots",
    "Request from non-LSF host rejected",
    "Bad argument",
    "Bad time specification",
    "Start time is later than termination time",
    "Bad CPU limit specification",
    "Cannot exceed queue's hard limit(s)",
    "Empty job",
    "Signal not supported",
    "Bad job name",
    "The destination queue has reached its job limit",
    "Unknown event",
    "Bad event format",
    "End of file",
    "Main batch daemon internal error",
    "Subordinate batch daemon internal error",
    "Batch library internal error",
    "Failed in an LSF library call",
    "System call failed",
    "Cannot allocate memory",
    "Batch service not registered",
    "LSB_SHAREDIR not defined",
    "Checkpoint system call failed",
    "Batch daemon cannot fork",
    "Batch protocol error",
    "XDR encode/decode error",
    "Fail to bind to an appropriate port number",
    "Contacting batch daemon: Communication timeout",
    "Timeout on connect call to server",
    "Connection refused by server",
    "Server connection already exists",
    "Server is not connected",
    "Unable to contact execution host",
    "Operation is in progress",
    "User or one of user's groups does not have enough job slots",
    "Job parameters cannot be changed now; non-repetitive job is running",
    "Modified parameters have not been used",
    "Job cannot be run more than once",
    "Unknown cluster name or cluster main",
    "Modified parameters are being used",
    "Queue does not have enough per-host job slots",
    "Mbatchd could not find the message that SBD mentions about",
    "Bad resource requirement syntax",
    "Not enough host(s) currently eligible",
    "Error 77",
    "Error 78",
    "No resource defined",
    "Bad resource name",
    "Interactive job cannot be rerunnable",
    "Input file not allowed with pseudo-terminal",
    "Cannot find restarted or newly submitted job's submission host and host type",
    "Error 109",
    "User not in the specified user group",
    "Cannot exceed queue's resource reservation",
    "Bad host specification",
    "Bad user group name",
    "Request aborted by esub",
    "Bad or invalid action specification",
    "Has dependent jobs",
    "Job group does not exist",
    "Bad/empty job group name",
    "Cannot operate on job array",
    "Operation not supported for a suspended job",
    "Operation not supported for a forwarded job",
    "Job array index error",
    "Job array index too large",
    "Job array does not exist",
    "Job exists",
    "Cannot operate on element job",
    "Bad jobId",
    "Change job name is not allowed for job array",
    "Child process died",
    "Invoker is not in specified project group",
    "No host group defined in the system",
    "No user group defined in the system",
    "Unknown jobid index file format",
    "Source file for spooling does not exist",
    "Number of failed spool hosts reached max",
    "Spool copy failed for this host",
    "Fork for spooling failed",
    "Status of spool child is not available",
    "Spool child terminated with failure",
    "Unable to find a host for spooling",
    "Cannot get $JOB_SPOOL_DIR for this host",
    "Cannot delete spool file for this host",
    "Bad user priority",
    "Job priority control undefined",
    "Job has already been requeued",
    "Multiple first execution hosts specified",
    "Host group specified as first execution host",
    "Host partition specified as first execution host",
    "\"Others\" specified as first execution host",
    "Too few processors requested",
    "Only the following parameters can be used to modify a running job: -c, -M, -W, -o, -e, -r",
    "You must set LSB_JOB_CPULIMIT in lsf.conf to modify the CPU limit of a running job",
    "You must set LSB_JOB_MEMLIMIT in lsf.conf to modify the memory limit of a running job",
    "No error file specified before job dispatch. Error file does not exist, so error file name cannot be changed",
    "The host is locked by main LIM",
    "Dependent arrays do not have the same size",
];

/// Scheduler text for a native error code.
pub fn describe(code: i32) -> String {
    usize::try_from(code)
        .ok()
        .and_then(|index| MESSAGES.get(index))
        .map_or_else(|| format!("Error {code}"), |text| (*text).to_string())
}

/// Failure kind a native error code maps to.
pub fn kind_of(code: i32) -> ErrorKind {
    match code {
        NO_JOB => ErrorKind::NoSuchJob,
        NO_USER | BAD_USER => ErrorKind::NoSuchUser,
        PERMISSION | QUEUE_USE => ErrorKind::PermissionDenied,
        BAD_QUEUE => ErrorKind::NoSuchQueue,
        BAD_HOST => ErrorKind::NoSuchHost,
        _ => ErrorKind::ClusterInterface,
    }
}

/// Translate a scheduler-reported error into the cluster vocabulary.
///
/// The message is `"<context>: <scheduler text>"` and the native code is kept
/// as the `code` extra.
pub fn native_error(code: i32, context: &str) -> ClusterError {
    ClusterError::new(kind_of(code), format!("{context}: {}", describe(code))).with_extra("code", code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_native_codes_to_kinds() {
        assert_eq!(kind_of(NO_JOB), ErrorKind::NoSuchJob);
        assert_eq!(kind_of(NO_USER), ErrorKind::NoSuchUser);
        assert_eq!(kind_of(BAD_USER), ErrorKind::NoSuchUser);
        assert_eq!(kind_of(PERMISSION), ErrorKind::PermissionDenied);
        assert_eq!(kind_of(QUEUE_USE), ErrorKind::PermissionDenied);
        assert_eq!(kind_of(BAD_QUEUE), ErrorKind::NoSuchQueue);
        assert_eq!(kind_of(BAD_HOST), ErrorKind::NoSuchHost);
        assert_eq!(kind_of(60), ErrorKind::ClusterInterface);
    }

    #[test]
    fn message_and_code_extra() {
        let err = native_error(NO_JOB, "Unable to kill job 9767[0]");
        assert_eq!(err.message(), "Unable to kill job 9767[0]: No matching job found");
        assert_eq!(err.extra("code"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn out_of_table_codes_still_describe() {
        assert_eq!(describe(500), "Error 500");
        assert_eq!(describe(-1), "Error -1");
        assert_eq!(describe(131), "Dependent arrays do not have the same size");
    }
}
