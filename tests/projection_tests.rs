
use serde_json::{json, Value as Json};

use batchgate::error::{ClusterError, ErrorKind};
use batchgate::model::{
    Attr, AttributeError, Entity, Host, HostAttribute, JobAttribute, JobId, QueueAttribute,
};
use batchgate::projection::Projector;
use batchgate::scheduler::{JobFilter, JobState, Scheduler};
use test_harness::{sample_scheduler, SUBMIT_TIME};

fn keys(document: &Json) -> Vec<String> {
    document
        .as_object()
        .expect("projection is an object")
        .keys()
        .cloned()
        .collect()
}

#[test]
fn test_full_projection_follows_manifest() {
    let scheduler = sample_scheduler();
    let projector = Projector::default();

    let job = scheduler.job(JobId::new(9767, 0)).unwrap();
    let document = projector.project(Entity::Job(job.as_ref())).unwrap();

    let mut expected = vec!["type".to_string()];
    expected.extend(JobAttribute::manifest().into_iter().map(str::to_string));
    assert_eq!(keys(&document), expected);
    assert_eq!(document["type"], "Job");

    let queue = scheduler.queue("normal").unwrap();
    let document = projector.project(Entity::Queue(queue.as_ref())).unwrap();
    assert_eq!(keys(&document).len(), QueueAttribute::manifest().len() + 1);
}

#[test]
fn test_nested_entities_are_stubs() {
    let scheduler = sample_scheduler();
    let projector = Projector::default();

    let job = scheduler.job(JobId::new(9767, 0)).unwrap();
    let document = projector.project(Entity::Job(job.as_ref())).unwrap();

    assert_eq!(
        document["queue"],
        json!({"type": "Queue", "name": "normal", "url": "/olw/queues/normal/"})
    );
    assert_eq!(
        document["execution_hosts"],
        json!([{"type": "ExecutionHost", "name": "node01", "num_slots": 2, "url": "/olw/hosts/node01/"}])
    );
    assert_eq!(document["status"]["type"], "JobStatus");
    assert_eq!(document["status"]["name"], "JOB_STAT_RUN");
    assert_eq!(document["status"]["friendly"], "Running");
    assert_eq!(document["submit_time"], SUBMIT_TIME);
    assert_eq!(document["is_running"], true);
    assert_eq!(document["was_killed"], false);
}

#[test]
fn test_host_jobs_are_job_stubs() {
    let scheduler = sample_scheduler();
    let projector = Projector::with_prefix("/cluster");

    let host = scheduler.host("node01").unwrap();
    let document = projector.project(Entity::Host(host.as_ref())).unwrap();

    assert_eq!(keys(&document).len(), HostAttribute::manifest().len() + 1);
    assert_eq!(document["num_running_slots"], 2);
    assert_eq!(document["num_running_jobs"], 1);
    let jobs = document["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    let stub = &jobs[0];
    assert_eq!(
        keys(stub),
        vec![
            "type", "name", "job_id", "array_index", "url", "user_name", "user_url", "status",
            "submit_time", "start_time", "end_time"
        ]
    );
    assert_eq!(stub["url"], "/cluster/jobs/9767/0/");
    assert_eq!(stub["user_url"], "/cluster/users/alice/");
    assert_eq!(stub["start_time"], SUBMIT_TIME + 60);
}

#[test]
fn test_cluster_projection_resolves_deferred_jobs() {
    let scheduler = sample_scheduler();
    let projector = Projector::default();

    let cluster = scheduler.cluster().unwrap();
    let document = projector.project(Entity::Cluster(cluster.as_ref())).unwrap();

    assert_eq!(document["type"], "Cluster");
    assert_eq!(document["name"], "openlava");
    assert_eq!(
        document["main"],
        json!({"type": "Host", "name": "master", "url": "/olw/hosts/master/"})
    );
    assert_eq!(document["hosts"].as_array().unwrap().len(), 4);
    assert_eq!(
        document["problem_hosts"],
        json!([{"type": "Host", "name": "node02", "url": "/olw/hosts/node02/"}])
    );
    // Finished jobs are not part of the cluster's job list.
    let ids: Vec<u64> = document["jobs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|job| job["job_id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![9767, 9768, 9770]);
}

#[test]
fn test_project_all_keeps_order() {
    let scheduler = sample_scheduler();
    let projector = Projector::default();

    let jobs = scheduler
        .jobs(&JobFilter::new().with_state(JobState::All).with_user("alice"))
        .unwrap();
    let document = projector
        .project_all(jobs.iter().map(|job| Entity::Job(job.as_ref())))
        .unwrap();

    let names: Vec<&str> = document
        .as_array()
        .unwrap()
        .iter()
        .map(|job| job["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["simulation", "job9769", "sweep[1]"]);
}

/// A backend that only knows host names.
struct NameOnlyHost;

impl Host for NameOnlyHost {
    fn name(&self) -> &str {
        "bare"
    }
}

/// A backend whose description lookup fails.
struct BrokenHost;

impl Host for BrokenHost {
    fn name(&self) -> &str {
        "broken"
    }

    fn admins(&self) -> Attr<Vec<String>> {
        Ok(Vec::new())
    }

    fn description(&self) -> Attr<String> {
        Err(AttributeError::Cluster(ClusterError::cluster_interface(
            "Unable to contact master",
        )))
    }
}

#[test]
fn test_unsupported_attribute_fails_whole_projection() {
    let projector = Projector::default();

    let err = projector.project(Entity::Host(&NameOnlyHost)).unwrap_err();
    let err = ClusterError::from(err);

    assert_eq!(err.kind(), ErrorKind::ClusterInterface);
    assert_eq!(err.extra("entity"), Some(&json!("Host")));
    assert_eq!(err.extra("attribute"), Some(&json!("admins")));
}

#[test]
fn test_backend_failure_keeps_its_kind() {
    let projector = Projector::default();

    let err = ClusterError::from(projector.project(Entity::Host(&BrokenHost)).unwrap_err());

    assert_eq!(err.kind(), ErrorKind::ClusterInterface);
    assert_eq!(err.message(), "Unable to contact master");
    assert_eq!(err.extra("attribute"), Some(&json!("description")));
}

#[test]
fn test_unsupported_attributes_are_still_readable_individually() {
    let host = NameOnlyHost;

    assert_eq!(host.host_name(), "bare");
    assert!(matches!(
        host.max_slots(),
        Err(AttributeError::Unsupported { entity: "Host", .. })
    ));
}

#[test]
fn test_projecting_twice_gives_the_same_document() {
    let scheduler = sample_scheduler();
    let projector = Projector::default();

    let job = scheduler.job(JobId::new(9767, 0)).unwrap();
    let first = projector.project(Entity::Job(job.as_ref())).unwrap();
    let second = projector.project(Entity::Job(job.as_ref())).unwrap();
    assert_eq!(first, second);
    assert_eq!(keys(&first), keys(&second));

    let host = scheduler.host("node01").unwrap();
    assert_eq!(
        projector.project(Entity::Host(host.as_ref())).unwrap(),
        projector.project(Entity::Host(host.as_ref())).unwrap()
    );

    let cluster = scheduler.cluster().unwrap();
    let first = projector.project(Entity::Cluster(cluster.as_ref())).unwrap();
    let second = projector.project(Entity::Cluster(cluster.as_ref())).unwrap();
    assert_eq!(first, second);
}
