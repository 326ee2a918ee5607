use crate::model::job::{job_references, Job};
use crate::model::value::{unsupported, Attr, Value};

pub(crate) const ENTITY: &str = "User";

/// A scheduler user or user group, with its job and slot usage.
pub trait User: Send + Sync {
    fn name(&self) -> &str;

    fn cluster_type(&self) -> &str {
        "undefined"
    }

    fn max_jobs_per_processor(&self) -> Attr<Option<f64>> {
        unsupported(ENTITY, "max_jobs_per_processor")
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

    fn jobs(&self) -> Attr<Vec<Box<dyn Job>>> {
        unsupported(ENTITY, "jobs")
    }
}

attribute_manifest! {
    /// Projected user attributes.
    pub enum UserAttribute for "User" {
        ClusterType => "cluster_type",
        Name => "name",
        MaxJobsPerProcessor => "max_jobs_per_processor",
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
        Jobs => "jobs",
    }
}

impl UserAttribute {
    pub fn resolve<'a>(self, user: &'a dyn User) -> Attr<Value<'a>> {
        Ok(match self {
            UserAttribute::ClusterType => user.cluster_type().into(),
            UserAttribute::Name => user.name().into(),
            UserAttribute::MaxJobsPerProcessor => user.max_jobs_per_processor()?.into(),
            UserAttribute::MaxSlots => user.max_slots()?.into(),
            UserAttribute::TotalSlots => user.total_slots()?.into(),
            UserAttribute::NumRunningSlots => user.num_running_slots()?.into(),
            UserAttribute::NumPendingSlots => user.num_pending_slots()?.into(),
            UserAttribute::NumSuspendedSlots => user.num_suspended_slots()?.into(),
            UserAttribute::NumReservedSlots => user.num_reserved_slots()?.into(),
            UserAttribute::MaxJobs => user.max_jobs()?.into(),
            UserAttribute::TotalJobs => user.total_jobs()?.into(),
            UserAttribute::NumRunningJobs => user.num_running_jobs()?.into(),
            UserAttribute::NumPendingJobs => user.num_pending_jobs()?.into(),
            UserAttribute::NumSuspendedJobs => user.num_suspended_jobs()?.into(),
            UserAttribute::Jobs => Value::deferred(move || job_references(user.jobs()?)),
        })
    }
}
