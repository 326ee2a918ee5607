use crate::model::job::{job_references, Job};
use crate::model::resource::ResourceLimit;
use crate::model::status::QueueStatus;
use crate::model::value::{unsupported, Attr, EntityRef, Value};

pub(crate) const ENTITY: &str = "Queue";

/// A scheduler queue. Identity is the queue name.
///
/// Ceilings (`max_*`) are `None` when the queue sets no limit.
pub trait Queue: Send + Sync {
    fn name(&self) -> &str;

    fn cluster_type(&self) -> &str {
        "undefined"
    }

    fn description(&self) -> Attr<String> {
        unsupported(ENTITY, "description")
    }

    fn priority(&self) -> Attr<i64> {
        unsupported(ENTITY, "priority")
    }

    fn max_jobs_per_user(&self) -> Attr<Option<u32>> {
        unsupported(ENTITY, "max_jobs_per_user")
    }

    fn max_slots_per_user(&self) -> Attr<Option<u32>> {
        unsupported(ENTITY, "max_slots_per_user")
    }

    fn max_jobs_per_processor(&self) -> Attr<Option<f64>> {
        unsupported(ENTITY, "max_jobs_per_processor")
    }

    fn max_slots_per_processor(&self) -> Attr<Option<f64>> {
        unsupported(ENTITY, "max_slots_per_processor")
    }

    /// Users allowed to submit to this queue.
    fn allowed_users(&self) -> Attr<Vec<EntityRef>> {
        unsupported(ENTITY, "allowed_users")
    }

    /// Hosts this queue dispatches to.
    fn allowed_hosts(&self) -> Attr<Vec<EntityRef>> {
        unsupported(ENTITY, "allowed_hosts")
    }

    fn runtime_limits(&self) -> Attr<Vec<ResourceLimit>> {
        unsupported(ENTITY, "runtime_limits")
    }

    fn host_specification(&self) -> Attr<String> {
        unsupported(ENTITY, "host_specification")
    }

    /// Scheduler-specific queue flags.
    fn attributes(&self) -> Attr<Vec<String>> {
        unsupported(ENTITY, "attributes")
    }

    fn statuses(&self) -> Attr<Vec<QueueStatus>> {
        unsupported(ENTITY, "statuses")
    }

    fn max_slots(&self) -> Attr<Option<u32>> {
        unsupported(ENTITY, "max_slots")
    }

    fn num_running_slots(&self) -> Attr<u32> {
        unsupported(ENTITY, "num_running_slots")
    }

    fn num_pending_slots(&self) -> Attr<u32> {
        unsupported(ENTITY, "num_pending_slots")
    }

    fn num_suspended_slots(&self) -> Attr<u32> {
        unsupported(ENTITY, "num_suspended_slots")
    }

    fn num_reserved_slots(&self) -> Attr<u32> {
        unsupported(ENTITY, "num_reserved_slots")
    }

    fn total_slots(&self) -> Attr<u32> {
        Ok(self
            .num_running_slots()?
            .saturating_add(self.num_pending_slots()?)
            .saturating_add(self.num_suspended_slots()?)
            .saturating_add(self.num_reserved_slots()?))
    }

    fn max_jobs(&self) -> Attr<Option<u32>> {
        unsupported(ENTITY, "max_jobs")
    }

    fn num_running_jobs(&self) -> Attr<u32> {
        unsupported(ENTITY, "num_running_jobs")
    }

    fn num_pending_jobs(&self) -> Attr<u32> {
        unsupported(ENTITY, "num_pending_jobs")
    }

    fn num_suspended_jobs(&self) -> Attr<u32> {
        unsupported(ENTITY, "num_suspended_jobs")
    }

    fn total_jobs(&self) -> Attr<u32> {
        Ok(self
            .num_running_jobs()?
            .saturating_add(self.num_pending_jobs()?)
            .saturating_add(self.num_suspended_jobs()?))
    }

    fn admins(&self) -> Attr<Vec<String>> {
        unsupported(ENTITY, "admins")
    }

    fn dispatch_windows(&self) -> Attr<String> {
        unsupported(ENTITY, "dispatch_windows")
    }

    fn max_slots_per_job(&self) -> Attr<Option<u32>> {
        unsupported(ENTITY, "max_slots_per_job")
    }

    fn max_jobs_per_host(&self) -> Attr<Option<u32>> {
        unsupported(ENTITY, "max_jobs_per_host")
    }

    fn max_slots_per_host(&self) -> Attr<Option<u32>> {
        unsupported(ENTITY, "max_slots_per_host")
    }

    fn resource_requirements(&self) -> Attr<String> {
        unsupported(ENTITY, "resource_requirements")
    }

    fn min_slots_per_job(&self) -> Attr<u32> {
        unsupported(ENTITY, "min_slots_per_job")
    }

    fn default_slots_per_job(&self) -> Attr<u32> {
        unsupported(ENTITY, "default_slots_per_job")
    }

    fn checkpoint_data_directory(&self) -> Attr<String> {
        unsupported(ENTITY, "checkpoint_data_directory")
    }

    fn checkpoint_period(&self) -> Attr<chrono::Duration> {
        unsupported(ENTITY, "checkpoint_period")
    }

    fn is_accepting_jobs(&self) -> Attr<bool> {
        Ok(self.statuses()?.contains(&QueueStatus::Open))
    }

    fn is_dispatching_jobs(&self) -> Attr<bool> {
        Ok(self.statuses()?.contains(&QueueStatus::Active))
    }

    fn jobs(&self) -> Attr<Vec<Box<dyn Job>>> {
        unsupported(ENTITY, "jobs")
    }
}

attribute_manifest! {
    /// Projected queue attributes.
    pub enum QueueAttribute for "Queue" {
        Name => "name",
        Description => "description",
        Priority => "priority",
        MaxJobsPerUser => "max_jobs_per_user",
        MaxSlotsPerUser => "max_slots_per_user",
        MaxJobsPerProcessor => "max_jobs_per_processor",
        MaxSlotsPerProcessor => "max_slots_per_processor",
        AllowedUsers => "allowed_users",
        AllowedHosts => "allowed_hosts",
        RuntimeLimits => "runtime_limits",
        HostSpecification => "host_specification",
        Attributes => "attributes",
        Statuses => "statuses",
        MaxSlots => "max_slots",
        TotalSlots => "total_slots",
        NumRunningSlots => "num_running_slots",
        NumPendingSlots => "num_pending_slots",
        NumSuspendedSlots => "num_suspended_slots",
        NumReservedSlots => "num_reserved_slots",
        MaxJobs => "max_jobs",
        TotalJobs => "total_jobs",
        NumRunningJobs => "num_running_jobs",
        NumPendingJobs => "num_pending_jobs",
        NumSuspendedJobs => "num_suspended_jobs",
        Admins => "admins",
        DispatchWindows => "dispatch_windows",
        MaxSlotsPerJob => "max_slots_per_job",
        MaxJobsPerHost => "max_jobs_per_host",
        MaxSlotsPerHost => "max_slots_per_host",
        ResourceRequirements => "resource_requirements",
        MinSlotsPerJob => "min_slots_per_job",
        DefaultSlotsPerJob => "default_slots_per_job",
        CheckpointDataDirectory => "checkpoint_data_directory",
        CheckpointPeriod => "checkpoint_period",
        IsAcceptingJobs => "is_accepting_jobs",
        IsDispatchingJobs => "is_dispatching_jobs",
        Jobs => "jobs",
        ClusterType => "cluster_type",
    }
}

impl QueueAttribute {
    /// Accessor table for queues.
    pub fn resolve<'a>(self, queue: &'a dyn Queue) -> Attr<Value<'a>> {
        Ok(match self {
            QueueAttribute::Name => queue.name().into(),
            QueueAttribute::Description => queue.description()?.into(),
            QueueAttribute::Priority => queue.priority()?.into(),
            QueueAttribute::MaxJobsPerUser => queue.max_jobs_per_user()?.into(),
            QueueAttribute::MaxSlotsPerUser => queue.max_slots_per_user()?.into(),
            QueueAttribute::MaxJobsPerProcessor => queue.max_jobs_per_processor()?.into(),
            QueueAttribute::MaxSlotsPerProcessor => queue.max_slots_per_processor()?.into(),
            QueueAttribute::AllowedUsers => Value::references(queue.allowed_users()?),
            QueueAttribute::AllowedHosts => Value::references(queue.allowed_hosts()?),
            QueueAttribute::RuntimeLimits => Value::records(queue.runtime_limits()?),
            QueueAttribute::HostSpecification => queue.host_specification()?.into(),
            QueueAttribute::Attributes => queue.attributes()?.into(),
            QueueAttribute::Statuses => Value::records(queue.statuses()?),
            QueueAttribute::MaxSlots => queue.max_slots()?.into(),
            QueueAttribute::TotalSlots => queue.total_slots()?.into(),
            QueueAttribute::NumRunningSlots => queue.num_running_slots()?.into(),
            QueueAttribute::NumPendingSlots => queue.num_pending_slots()?.into(),
            QueueAttribute::NumSuspendedSlots => queue.num_suspended_slots()?.into(),
            QueueAttribute::NumReservedSlots => queue.num_reserved_slots()?.into(),
            QueueAttribute::MaxJobs => queue.max_jobs()?.into(),
            QueueAttribute::TotalJobs => queue.total_jobs()?.into(),
            QueueAttribute::NumRunningJobs => queue.num_running_jobs()?.into(),
            QueueAttribute::NumPendingJobs => queue.num_pending_jobs()?.into(),
            QueueAttribute::NumSuspendedJobs => queue.num_suspended_jobs()?.into(),
            QueueAttribute::Admins => queue.admins()?.into(),
            QueueAttribute::DispatchWindows => queue.dispatch_windows()?.into(),
            QueueAttribute::MaxSlotsPerJob => queue.max_slots_per_job()?.into(),
            QueueAttribute::MaxJobsPerHost => queue.max_jobs_per_host()?.into(),
            QueueAttribute::MaxSlotsPerHost => queue.max_slots_per_host()?.into(),
            QueueAttribute::ResourceRequirements => queue.resource_requirements()?.into(),
            QueueAttribute::MinSlotsPerJob => queue.min_slots_per_job()?.into(),
            QueueAttribute::DefaultSlotsPerJob => queue.default_slots_per_job()?.into(),
            QueueAttribute::CheckpointDataDirectory => queue.checkpoint_data_directory()?.into(),
            QueueAttribute::CheckpointPeriod => queue.checkpoint_period()?.into(),
            QueueAttribute::IsAcceptingJobs => queue.is_accepting_jobs()?.into(),
            QueueAttribute::IsDispatchingJobs => queue.is_dispatching_jobs()?.into(),
            QueueAttribute::Jobs => Value::deferred(move || job_references(queue.jobs()?)),
            QueueAttribute::ClusterType => queue.cluster_type().into(),
        })
    }
}
