use crate::model::job::{job_references, Job};
use crate::model::resource::{LoadIndex, Resource};
use crate::model::status::HostStatus;
use crate::model::value::{unsupported, Attr, Value};

pub(crate) const ENTITY: &str = "Host";

/// A host that is part of the cluster. Identity is the host name.
///
/// Utilization counters are never negative and satisfy
/// `num_running_slots + num_suspended_slots + num_reserved_slots <= total_slots <= max_slots`.
pub trait Host: Send + Sync {
    fn name(&self) -> &str;

    fn host_name(&self) -> &str {
        self.name()
    }

    /// Name of the scheduler family this host belongs to.
    fn cluster_type(&self) -> &str {
        "undefined"
    }

    fn description(&self) -> Attr<String> {
        unsupported(ENTITY, "description")
    }

    fn admins(&self) -> Attr<Vec<String>> {
        unsupported(ENTITY, "admins")
    }

    fn has_checkpoint_support(&self) -> Attr<bool> {
        unsupported(ENTITY, "has_checkpoint_support")
    }

    fn host_model(&self) -> Attr<String> {
        unsupported(ENTITY, "host_model")
    }

    fn host_type(&self) -> Attr<String> {
        unsupported(ENTITY, "host_type")
    }

    fn resources(&self) -> Attr<Vec<Resource>> {
        unsupported(ENTITY, "resources")
    }

    fn statuses(&self) -> Attr<Vec<HostStatus>> {
        unsupported(ENTITY, "statuses")
    }

    fn is_busy(&self) -> Attr<bool> {
        Ok(self.statuses()?.iter().any(|status| status.is_busy()))
    }

    fn is_closed(&self) -> Attr<bool> {
        Ok(self.statuses()?.iter().any(|status| status.is_closed()))
    }

    fn is_down(&self) -> Attr<bool> {
        Ok(self.statuses()?.iter().any(|status| status.is_down()))
    }

    fn max_jobs(&self) -> Attr<Option<u32>> {
        unsupported(ENTITY, "max_jobs")
    }

    fn max_processors(&self) -> Attr<u32> {
        unsupported(ENTITY, "max_processors")
    }

    /// Megabytes.
    fn max_ram(&self) -> Attr<u64> {
        unsupported(ENTITY, "max_ram")
    }

    fn max_slots(&self) -> Attr<u32> {
        unsupported(ENTITY, "max_slots")
    }

    /// Megabytes.
    fn max_swap(&self) -> Attr<u64> {
        unsupported(ENTITY, "max_swap")
    }

    /// Megabytes.
    fn max_tmp(&self) -> Attr<u64> {
        unsupported(ENTITY, "max_tmp")
    }

    fn num_reserved_slots(&self) -> Attr<u32> {
        unsupported(ENTITY, "num_reserved_slots")
    }

    fn num_running_jobs(&self) -> Attr<u32> {
        unsupported(ENTITY, "num_running_jobs")
    }

    fn num_running_slots(&self) -> Attr<u32> {
        unsupported(ENTITY, "num_running_slots")
    }

    fn num_suspended_jobs(&self) -> Attr<u32> {
        unsupported(ENTITY, "num_suspended_jobs")
    }

    fn num_suspended_slots(&self) -> Attr<u32> {
        unsupported(ENTITY, "num_suspended_slots")
    }

    /// Running and suspended jobs.
    fn total_jobs(&self) -> Attr<u32> {
        Ok(self.num_running_jobs()?.saturating_add(self.num_suspended_jobs()?))
    }

    /// Running, suspended and reserved slots.
    fn total_slots(&self) -> Attr<u32> {
        Ok(self
            .num_running_slots()?
            .saturating_add(self.num_suspended_slots()?)
            .saturating_add(self.num_reserved_slots()?))
    }

    fn jobs(&self) -> Attr<Vec<Box<dyn Job>>> {
        unsupported(ENTITY, "jobs")
    }

    fn load_information(&self) -> Attr<Vec<LoadIndex>> {
        unsupported(ENTITY, "load_information")
    }
}

attribute_manifest! {
    /// Projected host attributes.
    pub enum HostAttribute for "Host" {
        Admins => "admins",
        Name => "name",
        HostName => "host_name",
        Description => "description",
        HasCheckpointSupport => "has_checkpoint_support",
        HostModel => "host_model",
        HostType => "host_type",
        Resources => "resources",
        IsBusy => "is_busy",
        IsClosed => "is_closed",
        IsDown => "is_down",
        MaxJobs => "max_jobs",
        MaxProcessors => "max_processors",
        MaxRam => "max_ram",
        MaxSlots => "max_slots",
        MaxSwap => "max_swap",
        MaxTmp => "max_tmp",
        NumReservedSlots => "num_reserved_slots",
        NumRunningJobs => "num_running_jobs",
        NumRunningSlots => "num_running_slots",
        NumSuspendedJobs => "num_suspended_jobs",
        NumSuspendedSlots => "num_suspended_slots",
        Statuses => "statuses",
        TotalJobs => "total_jobs",
        TotalSlots => "total_slots",
        Jobs => "jobs",
        LoadInformation => "load_information",
        ClusterType => "cluster_type",
    }
}

impl HostAttribute {
    /// Accessor table for hosts.
    pub fn resolve<'a>(self, host: &'a dyn Host) -> Attr<Value<'a>> {
        Ok(match self {
            HostAttribute::Admins => host.admins()?.into(),
            HostAttribute::Name => host.name().into(),
            HostAttribute::HostName => host.host_name().into(),
            HostAttribute::Description => host.description()?.into(),
            HostAttribute::HasCheckpointSupport => host.has_checkpoint_support()?.into(),
            HostAttribute::HostModel => host.host_model()?.into(),
            HostAttribute::HostType => host.host_type()?.into(),
            HostAttribute::Resources => Value::records(host.resources()?),
            HostAttribute::IsBusy => host.is_busy()?.into(),
            HostAttribute::IsClosed => host.is_closed()?.into(),
            HostAttribute::IsDown => host.is_down()?.into(),
            HostAttribute::MaxJobs => host.max_jobs()?.into(),
            HostAttribute::MaxProcessors => host.max_processors()?.into(),
            HostAttribute::MaxRam => host.max_ram()?.into(),
            HostAttribute::MaxSlots => host.max_slots()?.into(),
            HostAttribute::MaxSwap => host.max_swap()?.into(),
            HostAttribute::MaxTmp => host.max_tmp()?.into(),
            HostAttribute::NumReservedSlots => host.num_reserved_slots()?.into(),
            HostAttribute::NumRunningJobs => host.num_running_jobs()?.into(),
            HostAttribute::NumRunningSlots => host.num_running_slots()?.into(),
            HostAttribute::NumSuspendedJobs => host.num_suspended_jobs()?.into(),
            HostAttribute::NumSuspendedSlots => host.num_suspended_slots()?.into(),
            HostAttribute::Statuses => Value::records(host.statuses()?),
            HostAttribute::TotalJobs => host.total_jobs()?.into(),
            HostAttribute::TotalSlots => host.total_slots()?.into(),
            HostAttribute::Jobs => Value::deferred(move || job_references(host.jobs()?)),
            HostAttribute::LoadInformation => Value::records(host.load_information()?),
            HostAttribute::ClusterType => host.cluster_type().into(),
        })
    }
}
