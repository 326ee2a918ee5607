use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::resource::{ConsumedResource, Process, ResourceLimit};
use crate::model::status::JobStatus;
use crate::model::value::{unsupported, Attr, EntityRef, JobRef, Value};

pub(crate) const ENTITY: &str = "Job";

/// Identity of a job: the scheduler job id plus the array element index
/// (0 for jobs that are not part of an array).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId {
    pub job_id: u64,
    #[serde(default)]
    pub array_index: u32,
}

impl JobId {
    pub fn new(job_id: u64, array_index: u32) -> Self {
        Self {
            job_id,
            array_index,
        }
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.job_id, self.array_index)
    }
}

/// Epoch seconds interpreted in the server's local time zone.
pub fn local_datetime(epoch_seconds: i64) -> NaiveDateTime {
    DateTime::<Utc>::from_timestamp(epoch_seconds, 0)
        .unwrap_or_default()
        .with_timezone(&Local)
        .naive_local()
}

/// Epoch seconds interpreted as UTC.
pub fn utc_datetime(epoch_seconds: i64) -> NaiveDateTime {
    DateTime::<Utc>::from_timestamp(epoch_seconds, 0)
        .unwrap_or_default()
        .naive_utc()
}

/// A job known to the scheduler, from submission until it is purged.
///
/// Submission-time facts (command, requested slots/resources/hosts, project
/// names, dependency condition, owner) never change; runtime facts (status,
/// execution hosts, consumed resources, timestamps, reasons, processes) are a
/// snapshot taken when the view was built.
pub trait Job: Send + Sync {
    fn job_id(&self) -> u64;

    fn array_index(&self) -> u32;

    fn id(&self) -> JobId {
        JobId::new(self.job_id(), self.array_index())
    }

    fn cluster_type(&self) -> &str {
        "undefined"
    }

    /// The queue the job currently sits in.
    fn queue(&self) -> Attr<EntityRef> {
        unsupported(ENTITY, "queue")
    }

    fn submission_host(&self) -> Attr<EntityRef> {
        unsupported(ENTITY, "submission_host")
    }

    /// Hosts the job runs on, with the slots allocated on each.
    fn execution_hosts(&self) -> Attr<Vec<EntityRef>> {
        unsupported(ENTITY, "execution_hosts")
    }

    fn requested_hosts(&self) -> Attr<Vec<EntityRef>> {
        unsupported(ENTITY, "requested_hosts")
    }

    /// Users who can manage this job.
    fn admins(&self) -> Attr<Vec<String>> {
        unsupported(ENTITY, "admins")
    }

    /// The job will not start before this time (epoch seconds).
    fn begin_time(&self) -> Attr<i64> {
        unsupported(ENTITY, "begin_time")
    }

    fn command(&self) -> Attr<String> {
        unsupported(ENTITY, "command")
    }

    fn consumed_resources(&self) -> Attr<Vec<ConsumedResource>> {
        unsupported(ENTITY, "consumed_resources")
    }

    /// CPU seconds consumed so far.
    fn cpu_time(&self) -> Attr<f64> {
        unsupported(ENTITY, "cpu_time")
    }

    fn dependency_condition(&self) -> Attr<String> {
        unsupported(ENTITY, "dependency_condition")
    }

    fn email_user(&self) -> Attr<String> {
        unsupported(ENTITY, "email_user")
    }

    fn end_time(&self) -> Attr<i64> {
        unsupported(ENTITY, "end_time")
    }

    fn error_file_name(&self) -> Attr<String> {
        unsupported(ENTITY, "error_file_name")
    }

    fn input_file_name(&self) -> Attr<String> {
        unsupported(ENTITY, "input_file_name")
    }

    fn max_requested_slots(&self) -> Attr<u32> {
        unsupported(ENTITY, "max_requested_slots")
    }

    fn name(&self) -> Attr<String> {
        unsupported(ENTITY, "name")
    }

    fn options(&self) -> Attr<Vec<String>> {
        unsupported(ENTITY, "options")
    }

    fn output_file_name(&self) -> Attr<String> {
        unsupported(ENTITY, "output_file_name")
    }

    fn pending_reasons(&self) -> Attr<String> {
        unsupported(ENTITY, "pending_reasons")
    }

    fn predicted_start_time(&self) -> Attr<i64> {
        unsupported(ENTITY, "predicted_start_time")
    }

    fn priority(&self) -> Attr<i64> {
        unsupported(ENTITY, "priority")
    }

    fn process_id(&self) -> Attr<i64> {
        unsupported(ENTITY, "process_id")
    }

    fn processes(&self) -> Attr<Vec<Process>> {
        unsupported(ENTITY, "processes")
    }

    fn project_names(&self) -> Attr<Vec<String>> {
        unsupported(ENTITY, "project_names")
    }

    fn requested_resources(&self) -> Attr<String> {
        unsupported(ENTITY, "requested_resources")
    }

    fn requested_slots(&self) -> Attr<u32> {
        unsupported(ENTITY, "requested_slots")
    }

    fn reservation_time(&self) -> Attr<i64> {
        unsupported(ENTITY, "reservation_time")
    }

    fn runtime_limits(&self) -> Attr<Vec<ResourceLimit>> {
        unsupported(ENTITY, "runtime_limits")
    }

    fn start_time(&self) -> Attr<i64> {
        unsupported(ENTITY, "start_time")
    }

    fn status(&self) -> Attr<JobStatus> {
        unsupported(ENTITY, "status")
    }

    /// Exit status reported by the scheduler; only meaningful once finished.
    fn exit_status(&self) -> Attr<i32> {
        unsupported(ENTITY, "exit_status")
    }

    fn submit_time(&self) -> Attr<i64> {
        unsupported(ENTITY, "submit_time")
    }

    fn suspension_reasons(&self) -> Attr<String> {
        unsupported(ENTITY, "suspension_reasons")
    }

    /// Termination deadline (epoch seconds).
    fn termination_time(&self) -> Attr<i64> {
        unsupported(ENTITY, "termination_time")
    }

    fn user_name(&self) -> Attr<String> {
        unsupported(ENTITY, "user_name")
    }

    fn user_priority(&self) -> Attr<i64> {
        unsupported(ENTITY, "user_priority")
    }

    fn checkpoint_directory(&self) -> Attr<String> {
        unsupported(ENTITY, "checkpoint_directory")
    }

    fn checkpoint_period(&self) -> Attr<chrono::Duration> {
        unsupported(ENTITY, "checkpoint_period")
    }

    fn cwd(&self) -> Attr<String> {
        unsupported(ENTITY, "cwd")
    }

    fn host_specification(&self) -> Attr<String> {
        unsupported(ENTITY, "host_specification")
    }

    fn login_shell(&self) -> Attr<String> {
        unsupported(ENTITY, "login_shell")
    }

    fn is_pending(&self) -> Attr<bool> {
        Ok(self.status()?.is_pending())
    }

    fn is_running(&self) -> Attr<bool> {
        Ok(self.status()?.is_running())
    }

    fn is_suspended(&self) -> Attr<bool> {
        Ok(self.status()?.is_suspended())
    }

    fn is_completed(&self) -> Attr<bool> {
        Ok(self.status()?.is_completed())
    }

    fn was_killed(&self) -> Attr<bool> {
        let status = self.status()?;
        if status != JobStatus::Exited {
            return Ok(false);
        }
        Ok(status.was_killed(self.exit_status()?))
    }

    fn is_failed(&self) -> Attr<bool> {
        let status = self.status()?;
        if status != JobStatus::Exited {
            return Ok(false);
        }
        Ok(status.is_failed(self.exit_status()?))
    }

    fn begin_time_local(&self) -> Attr<NaiveDateTime> {
        Ok(local_datetime(self.begin_time()?))
    }

    fn predicted_start_time_local(&self) -> Attr<NaiveDateTime> {
        Ok(local_datetime(self.predicted_start_time()?))
    }

    fn reservation_time_local(&self) -> Attr<NaiveDateTime> {
        Ok(local_datetime(self.reservation_time()?))
    }

    fn submit_time_local(&self) -> Attr<NaiveDateTime> {
        Ok(local_datetime(self.submit_time()?))
    }

    fn termination_time_local(&self) -> Attr<NaiveDateTime> {
        Ok(local_datetime(self.termination_time()?))
    }

    // Start and end times are reported in UTC while the other timestamps are
    // local. Callers rely on both interpretations.
    fn start_time_utc(&self) -> Attr<NaiveDateTime> {
        Ok(utc_datetime(self.start_time()?))
    }

    fn end_time_utc(&self) -> Attr<NaiveDateTime> {
        Ok(utc_datetime(self.end_time()?))
    }

    fn cpu_time_duration(&self) -> Attr<chrono::Duration> {
        Ok(chrono::Duration::milliseconds((self.cpu_time()? * 1000.0) as i64))
    }

    /// The stub used when this job is referenced from another entity.
    fn reference(&self) -> Attr<JobRef> {
        Ok(JobRef {
            id: self.id(),
            name: self.name()?,
            user_name: self.user_name()?,
            status: self.status()?,
            submit_time: self.submit_time()?,
            start_time: self.start_time()?,
            end_time: self.end_time()?,
        })
    }
}

/// Turn job views into reference values.
pub(crate) fn job_references<'a>(jobs: Vec<Box<dyn Job>>) -> Attr<Value<'a>> {
    jobs.iter()
        .map(|job| job.reference().map(Value::from))
        .collect::<Attr<Vec<_>>>()
        .map(Value::List)
}

attribute_manifest! {
    /// Projected job attributes.
    pub enum JobAttribute for "Job" {
        Queue => "queue",
        SubmissionHost => "submission_host",
        ExecutionHosts => "execution_hosts",
        RequestedHosts => "requested_hosts",
        ClusterType => "cluster_type",
        Admins => "admins",
        JobId => "job_id",
        ArrayIndex => "array_index",
        BeginTime => "begin_time",
        Command => "command",
        ConsumedResources => "consumed_resources",
        CpuTime => "cpu_time",
        DependencyCondition => "dependency_condition",
        EmailUser => "email_user",
        EndTime => "end_time",
        ErrorFileName => "error_file_name",
        InputFileName => "input_file_name",
        MaxRequestedSlots => "max_requested_slots",
        Name => "name",
        Options => "options",
        OutputFileName => "output_file_name",
        PendingReasons => "pending_reasons",
        PredictedStartTime => "predicted_start_time",
        Priority => "priority",
        ProcessId => "process_id",
        Processes => "processes",
        ProjectNames => "project_names",
        RequestedResources => "requested_resources",
        RequestedSlots => "requested_slots",
        ReservationTime => "reservation_time",
        RuntimeLimits => "runtime_limits",
        StartTime => "start_time",
        Status => "status",
        SubmitTime => "submit_time",
        SuspensionReasons => "suspension_reasons",
        TerminationTime => "termination_time",
        UserName => "user_name",
        UserPriority => "user_priority",
        IsPending => "is_pending",
        IsRunning => "is_running",
        IsSuspended => "is_suspended",
        IsFailed => "is_failed",
        WasKilled => "was_killed",
        IsCompleted => "is_completed",
        CheckpointDirectory => "checkpoint_directory",
        CheckpointPeriod => "checkpoint_period",
        Cwd => "cwd",
        HostSpecification => "host_specification",
        LoginShell => "login_shell",
    }
}

impl JobAttribute {
    /// Accessor table for jobs.
    pub fn resolve<'a>(self, job: &'a dyn Job) -> Attr<Value<'a>> {
        Ok(match self {
            JobAttribute::Queue => job.queue()?.into(),
            JobAttribute::SubmissionHost => job.submission_host()?.into(),
            JobAttribute::ExecutionHosts => Value::references(job.execution_hosts()?),
            JobAttribute::RequestedHosts => Value::references(job.requested_hosts()?),
            JobAttribute::ClusterType => job.cluster_type().into(),
            JobAttribute::Admins => job.admins()?.into(),
            JobAttribute::JobId => job.job_id().into(),
            JobAttribute::ArrayIndex => job.array_index().into(),
            JobAttribute::BeginTime => job.begin_time()?.into(),
            JobAttribute::Command => job.command()?.into(),
            JobAttribute::ConsumedResources => Value::records(job.consumed_resources()?),
            JobAttribute::CpuTime => job.cpu_time()?.into(),
            JobAttribute::DependencyCondition => job.dependency_condition()?.into(),
            JobAttribute::EmailUser => job.email_user()?.into(),
            JobAttribute::EndTime => job.end_time()?.into(),
            JobAttribute::ErrorFileName => job.error_file_name()?.into(),
            JobAttribute::InputFileName => job.input_file_name()?.into(),
            JobAttribute::MaxRequestedSlots => job.max_requested_slots()?.into(),
            JobAttribute::Name => job.name()?.into(),
            JobAttribute::Options => job.options()?.into(),
            JobAttribute::OutputFileName => job.output_file_name()?.into(),
            JobAttribute::PendingReasons => job.pending_reasons()?.into(),
            JobAttribute::PredictedStartTime => job.predicted_start_time()?.into(),
            JobAttribute::Priority => job.priority()?.into(),
            JobAttribute::ProcessId => job.process_id()?.into(),
            JobAttribute::Processes => Value::records(job.processes()?),
            JobAttribute::ProjectNames => job.project_names()?.into(),
            JobAttribute::RequestedResources => job.requested_resources()?.into(),
            JobAttribute::RequestedSlots => job.requested_slots()?.into(),
            JobAttribute::ReservationTime => job.reservation_time()?.into(),
            JobAttribute::RuntimeLimits => Value::records(job.runtime_limits()?),
            JobAttribute::StartTime => job.start_time()?.into(),
            JobAttribute::Status => Value::record(job.status()?),
            JobAttribute::SubmitTime => job.submit_time()?.into(),
            JobAttribute::SuspensionReasons => job.suspension_reasons()?.into(),
            JobAttribute::TerminationTime => job.termination_time()?.into(),
            JobAttribute::UserName => job.user_name()?.into(),
            JobAttribute::UserPriority => job.user_priority()?.into(),
            JobAttribute::IsPending => job.is_pending()?.into(),
            JobAttribute::IsRunning => job.is_running()?.into(),
            JobAttribute::IsSuspended => job.is_suspended()?.into(),
            JobAttribute::IsFailed => job.is_failed()?.into(),
            JobAttribute::WasKilled => job.was_killed()?.into(),
            JobAttribute::IsCompleted => job.is_completed()?.into(),
            JobAttribute::CheckpointDirectory => job.checkpoint_directory()?.into(),
            JobAttribute::CheckpointPeriod => job.checkpoint_period()?.into(),
            JobAttribute::Cwd => job.cwd()?.into(),
            JobAttribute::HostSpecification => job.host_specification()?.into(),
            JobAttribute::LoginShell => job.login_shell()?.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_display() {
        assert_eq!(JobId::new(9767, 0).to_string(), "9767[0]");
        assert_eq!(JobId::new(12, 3).to_string(), "12[3]");
    }

    #[test]
    fn utc_view_ignores_local_zone() {
        let view = utc_datetime(86_400);
        assert_eq!(view.to_string(), "1970-01-02 00:00:00");
    }

    #[test]
    fn local_view_matches_local_zone() {
        let expected = DateTime::<Utc>::from_timestamp(1_414_243_874, 0)
            .unwrap()
            .with_timezone(&Local)
            .naive_local();
        assert_eq!(local_datetime(1_414_243_874), expected);
    }
}
