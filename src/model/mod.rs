//! Resource model: capability-typed views over live scheduler state.
//!
//! Every entity (cluster, host, job, queue, user) is a trait whose accessors
//! default to [`AttributeError::Unsupported`], so a backend only implements
//! what its scheduler can answer. Each entity also carries an attribute enum
//! whose ordered `ALL` list is the external projection manifest; the enum's
//! `resolve` function is the accessor table the projection encoder calls.
//!
//! # Components
//!
//! - [`value`]: unresolved attribute values, entity references, records
//! - [`status`]: job, host and queue status code tables
//! - [`resource`]: limits, consumed resources, load indexes, processes
//! - [`Cluster`], [`Host`], [`Job`], [`Queue`], [`User`]: entity traits

/// Declares an attribute enum together with its ordered manifest.
///
/// The declaration order is the projection order.
macro_rules! attribute_manifest {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident for $entity:literal {
            $($variant:ident => $label:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant,)+
        }

        impl $name {
            /// Every attribute, in projection order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }

            /// Attribute names in projection order.
            pub fn manifest() -> Vec<&'static str> {
                Self::ALL.iter().map(|attribute| attribute.as_str()).collect()
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::model::AttributeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    other => Err($crate::model::AttributeError::Unsupported {
                        entity: $entity,
                        attribute: other.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub mod cluster;
pub mod host;
pub mod job;
pub mod queue;
pub mod resource;
pub mod status;
pub mod user;
pub mod value;

pub use cluster::{Cluster, ClusterAttribute};
pub use host::{Host, HostAttribute};
pub use job::{Job, JobAttribute, JobId};
pub use queue::{Queue, QueueAttribute};
pub use resource::{ConsumedResource, LoadIndex, Process, Resource, ResourceLimit};
pub use status::{HostStatus, JobStatus, QueueStatus};
pub use user::{User, UserAttribute};
pub use value::{unsupported, Attr, AttributeError, Deferred, EntityRef, JobRef, Record, Value};

/// A borrowed top-level entity, ready to be projected in full.
#[derive(Clone, Copy)]
pub enum Entity<'a> {
    Cluster(&'a dyn Cluster),
    Host(&'a dyn Host),
    Job(&'a dyn Job),
    Queue(&'a dyn Queue),
    User(&'a dyn User),
}

impl<'a> Entity<'a> {
    /// The entity type name emitted as `type` in projections.
    pub fn type_name(&self) -> &'static str {
        match self {
            Entity::Cluster(_) => cluster::ENTITY,
            Entity::Host(_) => host::ENTITY,
            Entity::Job(_) => job::ENTITY,
            Entity::Queue(_) => queue::ENTITY,
            Entity::User(_) => user::ENTITY,
        }
    }

    pub fn manifest(&self) -> Vec<&'static str> {
        match self {
            Entity::Cluster(_) => ClusterAttribute::manifest(),
            Entity::Host(_) => HostAttribute::manifest(),
            Entity::Job(_) => JobAttribute::manifest(),
            Entity::Queue(_) => QueueAttribute::manifest(),
            Entity::User(_) => UserAttribute::manifest(),
        }
    }

    /// Resolve one attribute through the entity's accessor table.
    pub fn resolve(&self, attribute: &str) -> Attr<Value<'a>> {
        match *self {
            Entity::Cluster(cluster) => attribute.parse::<ClusterAttribute>()?.resolve(cluster),
            Entity::Host(host) => attribute.parse::<HostAttribute>()?.resolve(host),
            Entity::Job(job) => attribute.parse::<JobAttribute>()?.resolve(job),
            Entity::Queue(queue) => attribute.parse::<QueueAttribute>()?.resolve(queue),
            Entity::User(user) => attribute.parse::<UserAttribute>()?.resolve(user),
        }
    }
}

impl<'a> From<&'a dyn Cluster> for Entity<'a> {
    fn from(cluster: &'a dyn Cluster) -> Self {
        Entity::Cluster(cluster)
    }
}

impl<'a> From<&'a dyn Host> for Entity<'a> {
    fn from(host: &'a dyn Host) -> Self {
        Entity::Host(host)
    }
}

impl<'a> From<&'a dyn Job> for Entity<'a> {
    fn from(job: &'a dyn Job) -> Self {
        Entity::Job(job)
    }
}

impl<'a> From<&'a dyn Queue> for Entity<'a> {
    fn from(queue: &'a dyn Queue) -> Self {
        Entity::Queue(queue)
    }
}

impl<'a> From<&'a dyn User> for Entity<'a> {
    fn from(user: &'a dyn User) -> Self {
        Entity::User(user)
    }
}
