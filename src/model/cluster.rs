use crate::model::host::Host;
use crate::model::job::{job_references, Job};
use crate::model::queue::Queue;
use crate::model::resource::Resource;
use crate::model::user::User;
use crate::model::value::{unsupported, Attr, EntityRef, Value};

pub(crate) const ENTITY: &str = "Cluster";

/// The cluster as a whole: its main host, members and definitions.
pub trait Cluster: Send + Sync {
    fn name(&self) -> &str;

    fn cluster_type(&self) -> &str {
        "undefined"
    }

    /// Cluster administrators.
    fn admins(&self) -> Attr<Vec<String>> {
        unsupported(ENTITY, "admins")
    }

    /// The host running the main scheduler daemon.
    fn main(&self) -> Attr<EntityRef> {
        unsupported(ENTITY, "main")
    }

    fn hosts(&self) -> Attr<Vec<Box<dyn Host>>> {
        unsupported(ENTITY, "hosts")
    }

    /// Hosts that are currently down.
    fn problem_hosts(&self) -> Attr<Vec<Box<dyn Host>>> {
        let mut down = Vec::new();
        for host in self.hosts()? {
            if host.is_down()? {
                down.push(host);
            }
        }
        Ok(down)
    }

    fn queues(&self) -> Attr<Vec<Box<dyn Queue>>> {
        unsupported(ENTITY, "queues")
    }

    fn users(&self) -> Attr<Vec<Box<dyn User>>> {
        unsupported(ENTITY, "users")
    }

    fn jobs(&self) -> Attr<Vec<Box<dyn Job>>> {
        unsupported(ENTITY, "jobs")
    }

    fn resources(&self) -> Attr<Vec<Resource>> {
        unsupported(ENTITY, "resources")
    }
}

fn host_references<'a>(hosts: Vec<Box<dyn Host>>) -> Value<'a> {
    Value::references(hosts.iter().map(|host| EntityRef::host(host.name())).collect())
}

attribute_manifest! {
    /// Projected cluster attributes.
    pub enum ClusterAttribute for "Cluster" {
        ClusterType => "cluster_type",
        Admins => "admins",
        Name => "name",
        Main => "main",
        Hosts => "hosts",
        ProblemHosts => "problem_hosts",
        Queues => "queues",
        Jobs => "jobs",
        Resources => "resources",
    }
}

impl ClusterAttribute {
    pub fn resolve<'a>(self, cluster: &'a dyn Cluster) -> Attr<Value<'a>> {
        Ok(match self {
            ClusterAttribute::ClusterType => cluster.cluster_type().into(),
            ClusterAttribute::Admins => cluster.admins()?.into(),
            ClusterAttribute::Name => cluster.name().into(),
            ClusterAttribute::Main => cluster.main()?.into(),
            ClusterAttribute::Hosts => host_references(cluster.hosts()?),
            ClusterAttribute::ProblemHosts => host_references(cluster.problem_hosts()?),
            ClusterAttribute::Queues => Value::references(
                cluster
                    .queues()?
                    .iter()
                    .map(|queue| EntityRef::queue(queue.name()))
                    .collect(),
            ),
            ClusterAttribute::Jobs => Value::deferred(move || job_references(cluster.jobs()?)),
            ClusterAttribute::Resources => Value::records(cluster.resources()?),
        })
    }
}
