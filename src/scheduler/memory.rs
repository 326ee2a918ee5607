use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use nix::fcntl::{Flock, FlockArg};
use parking_lot::RwLock;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{ClusterError, Result};
use crate::model::status::KILLED_EXIT_STATUS;
use crate::model::{
    Attr, Cluster, ConsumedResource, EntityRef, Host, HostStatus, Job, JobId, JobStatus, LoadIndex,
    Process, Queue, QueueStatus, Resource, ResourceLimit, User,
};
use crate::scheduler::native::{
    native_error, BAD_HOST, BAD_QUEUE, JOB_FINISHED, NO_JOB, PERMISSION, QUEUE_CLOSED, QUEUE_USE,
};
use crate::scheduler::snapshot::{
    ClusterSnapshot, HostSnapshot, JobSnapshot, QueueSnapshot, Usage, UserSnapshot,
};
use crate::scheduler::{
    HostAction, JobFilter, JobSignal, QueueAction, Scheduler, SchedulerFactory, SubmitRequest,
};

/// Reported as `cluster_type` by every entity of this backend.
pub const CLUSTER_TYPE: &str = "batchgate";

struct Store {
    state: RwLock<Arc<ClusterSnapshot>>,
    path: Option<PathBuf>,
    mutation_calls: AtomicU64,
}

/// Scheduler backend over an in-memory [`ClusterSnapshot`], optionally
/// persisted to a JSON state file after every mutation.
///
/// Clones share state. Readers see a consistent snapshot; writers replace it
/// copy-on-write.
#[derive(Clone)]
pub struct MemoryScheduler {
    store: Arc<Store>,
    acting_user: Option<String>,
}

impl MemoryScheduler {
    pub fn new(snapshot: ClusterSnapshot) -> Result<Self> {
        snapshot.validate()?;
        Ok(Self::from_parts(snapshot, None))
    }

    /// Load state from a JSON file; later mutations are written back to it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let snapshot = read_state(path)?;
        debug!(path = %path.display(), jobs = snapshot.jobs.len(), "Loaded cluster state");
        Ok(Self::from_parts(snapshot, Some(path.to_path_buf())))
    }

    fn from_parts(snapshot: ClusterSnapshot, path: Option<PathBuf>) -> Self {
        Self {
            store: Arc::new(Store {
                state: RwLock::new(Arc::new(snapshot)),
                path,
                mutation_calls: AtomicU64::new(0),
            }),
            acting_user: None,
        }
    }

    /// The same backend, acting as `user`.
    pub fn acting_as(mut self, user: Option<&str>) -> Self {
        self.acting_user = user.map(str::to_string);
        self
    }

    pub fn acting_user(&self) -> Option<&str> {
        self.acting_user.as_deref()
    }

    /// Number of mutating calls made against this state, successful or not.
    pub fn mutation_calls(&self) -> u64 {
        self.store.mutation_calls.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Arc<ClusterSnapshot> {
        self.store.state.read().clone()
    }

    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        write_atomically(path.as_ref(), &self.snapshot())
    }

    /// Apply one mutation as the acting user. The new state is only
    /// published once it has been saved.
    fn mutate<T>(
        &self,
        context: &str,
        apply: impl FnOnce(&mut ClusterSnapshot, &str) -> Result<T>,
    ) -> Result<T> {
        self.store.mutation_calls.fetch_add(1, Ordering::SeqCst);
        let user = self
            .acting_user
            .as_deref()
            .ok_or_else(|| native_error(PERMISSION, context))?;
        let mut guard = self.store.state.write();
        let Some(path) = &self.store.path else {
            let mut next = Arc::clone(&*guard);
            let result = apply(Arc::make_mut(&mut next), user)?;
            *guard = next;
            return Ok(result);
        };

        // Other processes share the file; start from what is on disk now.
        let _lock = lock_state(path)?;
        let mut next = read_state(path)?;
        let result = apply(&mut next, user)?;
        write_atomically(path, &next)?;
        *guard = Arc::new(next);
        Ok(result)
    }
}

fn read_state(path: &Path) -> Result<ClusterSnapshot> {
    let unreadable = |e: &dyn std::fmt::Display| {
        ClusterError::cluster_interface(format!("Unable to load cluster state: {e}"))
            .with_extra("path", path.display().to_string())
    };
    let text = std::fs::read_to_string(path).map_err(|e| unreadable(&e))?;
    let snapshot: ClusterSnapshot = serde_json::from_str(&text).map_err(|e| unreadable(&e))?;
    snapshot.validate()?;
    Ok(snapshot)
}

/// Sibling of the state file that writers lock. The state file itself is
/// replaced on every save, so it cannot carry the lock.
fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

/// Block until this process holds the exclusive lock on `path`'s lock file.
/// Released when the returned guard drops.
fn lock_state(path: &Path) -> Result<Flock<File>> {
    let lock_path = lock_path(path);
    let failed = |e: &dyn std::fmt::Display| {
        ClusterError::cluster_interface(format!("Unable to lock cluster state: {e}"))
            .with_extra("path", lock_path.display().to_string())
    };
    // flock only needs a readable descriptor.
    let file = match File::open(&lock_path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => OpenOptions::new()
            .append(true)
            .create(true)
            .mode(0o666)
            .open(&lock_path)
            .map_err(|e| failed(&e))?,
        Err(e) => return Err(failed(&e)),
    };
    Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| failed(&errno))
}

fn write_atomically(path: &Path, snapshot: &ClusterSnapshot) -> Result<()> {
    let failed = |e: &dyn std::fmt::Display| {
        ClusterError::cluster_interface(format!("Unable to save cluster state: {e}"))
            .with_extra("path", path.display().to_string())
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir).map_err(|e| failed(&e))?;
    serde_json::to_writer_pretty(file.as_file_mut(), snapshot).map_err(|e| failed(&e))?;
    file.as_file().sync_all().map_err(|e| failed(&e))?;
    if let Ok(metadata) = std::fs::metadata(path) {
        std::fs::set_permissions(file.path(), metadata.permissions()).map_err(|e| failed(&e))?;
    }
    file.persist(path).map_err(|e| failed(&e.error))?;
    Ok(())
}

fn merge_admins<'a>(groups: impl IntoIterator<Item = &'a [String]>) -> Vec<String> {
    let mut admins: Vec<String> = Vec::new();
    for name in groups.into_iter().flatten() {
        if !admins.contains(name) {
            admins.push(name.clone());
        }
    }
    admins
}

fn job_admins(state: &ClusterSnapshot, job: &JobSnapshot) -> Vec<String> {
    let owner = std::slice::from_ref(&job.user_name);
    let queue_admins = state
        .queue_index(&job.queue)
        .map_or(&[][..], |index| state.queues[index].admins.as_slice());
    merge_admins([owner, queue_admins, state.admins.as_slice()])
}

fn authorize(admins: &[String], user: &str, context: &str) -> Result<()> {
    if admins.iter().any(|admin| admin == user) {
        Ok(())
    } else {
        Err(native_error(PERMISSION, context))
    }
}

fn job_views(state: &Arc<ClusterSnapshot>, keep: impl Fn(&JobSnapshot) -> bool) -> Vec<Box<dyn Job>> {
    state
        .jobs
        .iter()
        .enumerate()
        .filter(|(_, job)| keep(job))
        .map(|(index, _)| {
            Box::new(JobView {
                state: Arc::clone(state),
                index,
            }) as Box<dyn Job>
        })
        .collect()
}

fn host_views(state: &Arc<ClusterSnapshot>) -> Vec<Box<dyn Host>> {
    (0..state.hosts.len())
        .map(|index| {
            Box::new(HostView {
                state: Arc::clone(state),
                index,
            }) as Box<dyn Host>
        })
        .collect()
}

fn queue_views(state: &Arc<ClusterSnapshot>) -> Vec<Box<dyn Queue>> {
    (0..state.queues.len())
        .map(|index| {
            Box::new(QueueView {
                state: Arc::clone(state),
                index,
            }) as Box<dyn Queue>
        })
        .collect()
}

fn user_views(state: &Arc<ClusterSnapshot>) -> Vec<Box<dyn User>> {
    user_names(state)
        .into_iter()
        .map(|name| Box::new(UserView::new(Arc::clone(state), name)) as Box<dyn User>)
        .collect()
}

struct ClusterView {
    state: Arc<ClusterSnapshot>,
}

impl Cluster for ClusterView {
    fn name(&self) -> &str {
        &self.state.name
    }

    fn cluster_type(&self) -> &str {
        CLUSTER_TYPE
    }

    fn admins(&self) -> Attr<Vec<String>> {
        Ok(self.state.admins.clone())
    }

    fn main(&self) -> Attr<EntityRef> {
        Ok(EntityRef::host(&self.state.main_host))
    }

    fn hosts(&self) -> Attr<Vec<Box<dyn Host>>> {
        Ok(host_views(&self.state))
    }

    fn queues(&self) -> Attr<Vec<Box<dyn Queue>>> {
        Ok(queue_views(&self.state))
    }

    fn users(&self) -> Attr<Vec<Box<dyn User>>> {
        Ok(user_views(&self.state))
    }

    fn jobs(&self) -> Attr<Vec<Box<dyn Job>>> {
        Ok(job_views(&self.state, |job| !job.status.is_finished()))
    }

    fn resources(&self) -> Attr<Vec<Resource>> {
        Ok(self.state.resources.clone())
    }
}

struct HostView {
    state: Arc<ClusterSnapshot>,
    index: usize,
}

impl HostView {
    fn data(&self) -> &HostSnapshot {
        &self.state.hosts[self.index]
    }

    fn usage(&self) -> Usage {
        self.state.host_usage(&self.data().name)
    }
}

impl Host for HostView {
    fn name(&self) -> &str {
        &self.data().name
    }

    fn cluster_type(&self) -> &str {
        CLUSTER_TYPE
    }

    fn description(&self) -> Attr<String> {
        Ok(self.data().description.clone())
    }

    fn admins(&self) -> Attr<Vec<String>> {
        Ok(merge_admins([
            self.data().admins.as_slice(),
            self.state.admins.as_slice(),
        ]))
    }

    fn has_checkpoint_support(&self) -> Attr<bool> {
        Ok(self.data().has_checkpoint_support)
    }

    fn host_model(&self) -> Attr<String> {
        Ok(self.data().host_model.clone())
    }

    fn host_type(&self) -> Attr<String> {
        Ok(self.data().host_type.clone())
    }

    fn resources(&self) -> Attr<Vec<Resource>> {
        Ok(self.data().resources.clone())
    }

    fn statuses(&self) -> Attr<Vec<HostStatus>> {
        Ok(HostStatus::from_mask(self.data().status_mask))
    }

    fn max_jobs(&self) -> Attr<Option<u32>> {
        Ok(self.data().max_jobs)
    }

    fn max_processors(&self) -> Attr<u32> {
        Ok(self.data().max_processors)
    }

    fn max_ram(&self) -> Attr<u64> {
        Ok(self.data().max_ram)
    }

    fn max_slots(&self) -> Attr<u32> {
        Ok(self.data().max_slots)
    }

    fn max_swap(&self) -> Attr<u64> {
        Ok(self.data().max_swap)
    }

    fn max_tmp(&self) -> Attr<u64> {
        Ok(self.data().max_tmp)
    }

    fn num_reserved_slots(&self) -> Attr<u32> {
        Ok(self.data().num_reserved_slots)
    }

    fn num_running_jobs(&self) -> Attr<u32> {
        Ok(self.usage().running_jobs)
    }

    fn num_running_slots(&self) -> Attr<u32> {
        Ok(self.usage().running_slots)
    }

    fn num_suspended_jobs(&self) -> Attr<u32> {
        Ok(self.usage().suspended_jobs)
    }

    fn num_suspended_slots(&self) -> Attr<u32> {
        Ok(self.usage().suspended_slots)
    }

    fn jobs(&self) -> Attr<Vec<Box<dyn Job>>> {
        let name = self.data().name.as_str();
        Ok(job_views(&self.state, |job| {
            !job.status.is_finished() && job.slots_on(name) > 0
        }))
    }

    fn load_information(&self) -> Attr<Vec<LoadIndex>> {
        Ok(self.data().load_information.clone())
    }
}

struct JobView {
    state: Arc<ClusterSnapshot>,
    index: usize,
}

impl JobView {
    fn data(&self) -> &JobSnapshot {
        &self.state.jobs[self.index]
    }
}

impl Job for JobView {
    fn job_id(&self) -> u64 {
        self.data().job_id
    }

    fn array_index(&self) -> u32 {
        self.data().array_index
    }

    fn cluster_type(&self) -> &str {
        CLUSTER_TYPE
    }

    fn queue(&self) -> Attr<EntityRef> {
        Ok(EntityRef::queue(&self.data().queue))
    }

    fn submission_host(&self) -> Attr<EntityRef> {
        Ok(EntityRef::host(&self.data().submission_host))
    }

    fn execution_hosts(&self) -> Attr<Vec<EntityRef>> {
        Ok(self
            .data()
            .execution_hosts
            .iter()
            .map(|slot| EntityRef::ExecutionHost {
                name: slot.host.clone(),
                num_slots: slot.num_slots,
            })
            .collect())
    }

    fn requested_hosts(&self) -> Attr<Vec<EntityRef>> {
        Ok(self.data().requested_hosts.iter().map(EntityRef::host).collect())
    }

    fn admins(&self) -> Attr<Vec<String>> {
        Ok(job_admins(&self.state, self.data()))
    }

    fn begin_time(&self) -> Attr<i64> {
        Ok(self.data().begin_time)
    }

    fn command(&self) -> Attr<String> {
        Ok(self.data().command.clone())
    }

    fn consumed_resources(&self) -> Attr<Vec<ConsumedResource>> {
        Ok(self.data().consumed_resources.clone())
    }

    fn cpu_time(&self) -> Attr<f64> {
        Ok(self.data().cpu_time)
    }

    fn dependency_condition(&self) -> Attr<String> {
        Ok(self.data().dependency_condition.clone())
    }

    fn email_user(&self) -> Attr<String> {
        Ok(self.data().email_user.clone())
    }

    fn end_time(&self) -> Attr<i64> {
        Ok(self.data().end_time)
    }

    fn error_file_name(&self) -> Attr<String> {
        Ok(self.data().error_file_name.clone())
    }

    fn input_file_name(&self) -> Attr<String> {
        Ok(self.data().input_file_name.clone())
    }

    fn max_requested_slots(&self) -> Attr<u32> {
        Ok(self.data().max_requested_slots)
    }

    fn name(&self) -> Attr<String> {
        Ok(self.data().name.clone())
    }

    fn options(&self) -> Attr<Vec<String>> {
        Ok(self.data().options.clone())
    }

    fn output_file_name(&self) -> Attr<String> {
        Ok(self.data().output_file_name.clone())
    }

    fn pending_reasons(&self) -> Attr<String> {
        Ok(self.data().pending_reasons.clone())
    }

    fn predicted_start_time(&self) -> Attr<i64> {
        Ok(self.data().predicted_start_time)
    }

    fn priority(&self) -> Attr<i64> {
        Ok(self.data().priority)
    }

    fn process_id(&self) -> Attr<i64> {
        Ok(self.data().process_id)
    }

    fn processes(&self) -> Attr<Vec<Process>> {
        Ok(self.data().processes.clone())
    }

    fn project_names(&self) -> Attr<Vec<String>> {
        Ok(self.data().project_names.clone())
    }

    fn requested_resources(&self) -> Attr<String> {
        Ok(self.data().requested_resources.clone())
    }

    fn requested_slots(&self) -> Attr<u32> {
        Ok(self.data().requested_slots)
    }

    fn reservation_time(&self) -> Attr<i64> {
        Ok(self.data().reservation_time)
    }

    fn runtime_limits(&self) -> Attr<Vec<ResourceLimit>> {
        Ok(self.data().runtime_limits.clone())
    }

    fn start_time(&self) -> Attr<i64> {
        Ok(self.data().start_time)
    }

    fn status(&self) -> Attr<JobStatus> {
        Ok(self.data().status)
    }

    fn exit_status(&self) -> Attr<i32> {
        Ok(self.data().exit_status)
    }

    fn submit_time(&self) -> Attr<i64> {
        Ok(self.data().submit_time)
    }

    fn suspension_reasons(&self) -> Attr<String> {
        Ok(self.data().suspension_reasons.clone())
    }

    fn termination_time(&self) -> Attr<i64> {
        Ok(self.data().termination_time)
    }

    fn user_name(&self) -> Attr<String> {
        Ok(self.data().user_name.clone())
    }

    fn user_priority(&self) -> Attr<i64> {
        Ok(self.data().user_priority)
    }

    fn checkpoint_directory(&self) -> Attr<String> {
        Ok(self.data().checkpoint_directory.clone())
    }

    fn checkpoint_period(&self) -> Attr<chrono::Duration> {
        Ok(chrono::Duration::seconds(self.data().checkpoint_period))
    }

    fn cwd(&self) -> Attr<String> {
        Ok(self.data().cwd.clone())
    }

    fn host_specification(&self) -> Attr<String> {
        Ok(self.data().host_specification.clone())
    }

    fn login_shell(&self) -> Attr<String> {
        Ok(self.data().login_shell.clone())
    }
}

struct QueueView {
    state: Arc<ClusterSnapshot>,
    index: usize,
}

impl QueueView {
    fn data(&self) -> &QueueSnapshot {
        &self.state.queues[self.index]
    }

    fn usage(&self) -> Usage {
        self.state.queue_usage(&self.data().name)
    }
}

impl Queue for QueueView {
    fn name(&self) -> &str {
        &self.data().name
    }

    fn cluster_type(&self) -> &str {
        CLUSTER_TYPE
    }

    fn description(&self) -> Attr<String> {
        Ok(self.data().description.clone())
    }

    fn priority(&self) -> Attr<i64> {
        Ok(self.data().priority)
    }

    fn max_jobs_per_user(&self) -> Attr<Option<u32>> {
        Ok(self.data().max_jobs_per_user)
    }

    fn max_slots_per_user(&self) -> Attr<Option<u32>> {
        Ok(self.data().max_slots_per_user)
    }

    fn max_jobs_per_processor(&self) -> Attr<Option<f64>> {
        Ok(self.data().max_jobs_per_processor)
    }

    fn max_slots_per_processor(&self) -> Attr<Option<f64>> {
        Ok(self.data().max_slots_per_processor)
    }

    fn allowed_users(&self) -> Attr<Vec<EntityRef>> {
        let users = &self.data().allowed_users;
        if users.is_empty() {
            return Ok(user_names(&self.state).into_iter().map(EntityRef::user).collect());
        }
        Ok(users.iter().map(EntityRef::user).collect())
    }

    fn allowed_hosts(&self) -> Attr<Vec<EntityRef>> {
        let hosts = &self.data().allowed_hosts;
        if hosts.is_empty() {
            return Ok(self
                .state
                .hosts
                .iter()
                .map(|host| EntityRef::host(&host.name))
                .collect());
        }
        Ok(hosts.iter().map(EntityRef::host).collect())
    }

    fn runtime_limits(&self) -> Attr<Vec<ResourceLimit>> {
        Ok(self.data().runtime_limits.clone())
    }

    fn host_specification(&self) -> Attr<String> {
        Ok(self.data().host_specification.clone())
    }

    fn attributes(&self) -> Attr<Vec<String>> {
        Ok(self.data().attributes.clone())
    }

    fn statuses(&self) -> Attr<Vec<QueueStatus>> {
        Ok(QueueStatus::from_mask(self.data().status_mask))
    }

    fn max_slots(&self) -> Attr<Option<u32>> {
        Ok(self.data().max_slots)
    }

    fn num_running_slots(&self) -> Attr<u32> {
        Ok(self.usage().running_slots)
    }

    fn num_pending_slots(&self) -> Attr<u32> {
        Ok(self.usage().pending_slots)
    }

    fn num_suspended_slots(&self) -> Attr<u32> {
        Ok(self.usage().suspended_slots)
    }

    fn num_reserved_slots(&self) -> Attr<u32> {
        Ok(self.data().num_reserved_slots)
    }

    fn max_jobs(&self) -> Attr<Option<u32>> {
        Ok(self.data().max_jobs)
    }

    fn num_running_jobs(&self) -> Attr<u32> {
        Ok(self.usage().running_jobs)
    }

    fn num_pending_jobs(&self) -> Attr<u32> {
        Ok(self.usage().pending_jobs)
    }

    fn num_suspended_jobs(&self) -> Attr<u32> {
        Ok(self.usage().suspended_jobs)
    }

    fn admins(&self) -> Attr<Vec<String>> {
        Ok(merge_admins([
            self.data().admins.as_slice(),
            self.state.admins.as_slice(),
        ]))
    }

    fn dispatch_windows(&self) -> Attr<String> {
        Ok(self.data().dispatch_windows.clone())
    }

    fn max_slots_per_job(&self) -> Attr<Option<u32>> {
        Ok(self.data().max_slots_per_job)
    }

    fn max_jobs_per_host(&self) -> Attr<Option<u32>> {
        Ok(self.data().max_jobs_per_host)
    }

    fn max_slots_per_host(&self) -> Attr<Option<u32>> {
        Ok(self.data().max_slots_per_host)
    }

    fn resource_requirements(&self) -> Attr<String> {
        Ok(self.data().resource_requirements.clone())
    }

    fn min_slots_per_job(&self) -> Attr<u32> {
        Ok(self.data().min_slots_per_job)
    }

    fn default_slots_per_job(&self) -> Attr<u32> {
        Ok(self.data().default_slots_per_job)
    }

    fn checkpoint_data_directory(&self) -> Attr<String> {
        Ok(self.data().checkpoint_data_directory.clone())
    }

    fn checkpoint_period(&self) -> Attr<chrono::Duration> {
        Ok(chrono::Duration::seconds(self.data().checkpoint_period))
    }

    fn jobs(&self) -> Attr<Vec<Box<dyn Job>>> {
        let name = self.data().name.as_str();
        Ok(job_views(&self.state, |job| {
            !job.status.is_finished() && job.queue == name
        }))
    }
}

/// Known users: the configured ones first, then any other job owners.
fn user_names(state: &ClusterSnapshot) -> Vec<String> {
    let mut names: Vec<String> = state.users.iter().map(|user| user.name.clone()).collect();
    for job in &state.jobs {
        if !names.contains(&job.user_name) {
            names.push(job.user_name.clone());
        }
    }
    names
}

struct UserView {
    state: Arc<ClusterSnapshot>,
    name: String,
    limits: UserSnapshot,
}

impl UserView {
    fn new(state: Arc<ClusterSnapshot>, name: String) -> Self {
        let limits = state
            .user_index(&name)
            .map(|index| state.users[index].clone())
            .unwrap_or_else(|| UserSnapshot {
                name: name.clone(),
                ..Default::default()
            });
        Self {
            state,
            name,
            limits,
        }
    }

    fn usage(&self) -> Usage {
        self.state.user_usage(&self.name)
    }
}

impl User for UserView {
    fn name(&self) -> &str {
        &self.name
    }

    fn cluster_type(&self) -> &str {
        CLUSTER_TYPE
    }

    fn max_jobs_per_processor(&self) -> Attr<Option<f64>> {
        Ok(self.limits.max_jobs_per_processor)
    }

    fn max_slots(&self) -> Attr<Option<u32>> {
        Ok(self.limits.max_slots)
    }

    fn num_running_slots(&self) -> Attr<u32> {
        Ok(self.usage().running_slots)
    }

    fn num_pending_slots(&self) -> Attr<u32> {
        Ok(self.usage().pending_slots)
    }

    fn num_suspended_slots(&self) -> Attr<u32> {
        Ok(self.usage().suspended_slots)
    }

    fn num_reserved_slots(&self) -> Attr<u32> {
        Ok(self.limits.num_reserved_slots)
    }

    fn max_jobs(&self) -> Attr<Option<u32>> {
        Ok(self.limits.max_jobs)
    }

    fn num_running_jobs(&self) -> Attr<u32> {
        Ok(self.usage().running_jobs)
    }

    fn num_pending_jobs(&self) -> Attr<u32> {
        Ok(self.usage().pending_jobs)
    }

    fn num_suspended_jobs(&self) -> Attr<u32> {
        Ok(self.usage().suspended_jobs)
    }

    fn jobs(&self) -> Attr<Vec<Box<dyn Job>>> {
        let name = self.name.as_str();
        Ok(job_views(&self.state, |job| {
            !job.status.is_finished() && job.user_name == name
        }))
    }
}

fn signal_context(id: JobId, signal: JobSignal) -> String {
    format!("Unable to {signal} job: {id}")
}

impl Scheduler for MemoryScheduler {
    fn cluster(&self) -> Result<Box<dyn Cluster>> {
        Ok(Box::new(ClusterView {
            state: self.snapshot(),
        }))
    }

    fn host(&self, name: &str) -> Result<Box<dyn Host>> {
        let state = self.snapshot();
        let index = state
            .host_index(name)
            .ok_or_else(|| ClusterError::no_such_host("Host not found"))?;
        Ok(Box::new(HostView { state, index }))
    }

    fn hosts(&self) -> Result<Vec<Box<dyn Host>>> {
        Ok(host_views(&self.snapshot()))
    }

    fn job(&self, id: JobId) -> Result<Box<dyn Job>> {
        let state = self.snapshot();
        let index = state
            .job_index(id)
            .ok_or_else(|| ClusterError::no_such_job("Job not found"))?;
        Ok(Box::new(JobView { state, index }))
    }

    fn jobs(&self, filter: &JobFilter) -> Result<Vec<Box<dyn Job>>> {
        let state = self.snapshot();
        Ok(job_views(&state, |job| {
            filter.job_id.map_or(true, |id| job.job_id == id)
                && filter.array_index.map_or(true, |index| job.array_index == index)
                && filter.matches_user(&job.user_name)
                && filter.queue_name.as_deref().map_or(true, |queue| job.queue == queue)
                && filter.host_name.as_deref().map_or(true, |host| job.slots_on(host) > 0)
                && filter.job_name.as_deref().map_or(true, |name| job.name == name)
                && filter.state.matches(job.status)
        }))
    }

    fn queue(&self, name: &str) -> Result<Box<dyn Queue>> {
        let state = self.snapshot();
        let index = state
            .queue_index(name)
            .ok_or_else(|| ClusterError::no_such_queue("Queue not found"))?;
        Ok(Box::new(QueueView { state, index }))
    }

    fn queues(&self) -> Result<Vec<Box<dyn Queue>>> {
        Ok(queue_views(&self.snapshot()))
    }

    fn user(&self, name: &str) -> Result<Box<dyn User>> {
        let state = self.snapshot();
        if !user_names(&state).iter().any(|known| known == name) {
            return Err(ClusterError::no_such_user("User not found"));
        }
        Ok(Box::new(UserView::new(state, name.to_string())))
    }

    fn users(&self) -> Result<Vec<Box<dyn User>>> {
        Ok(user_views(&self.snapshot()))
    }

    fn signal_job(&self, id: JobId, signal: JobSignal) -> Result<()> {
        let context = signal_context(id, signal);
        self.mutate(&context, |state, user| {
            let index = state
                .job_index(id)
                .ok_or_else(|| native_error(NO_JOB, &context))?;
            authorize(&job_admins(state, &state.jobs[index]), user, &context)?;
            let job = &mut state.jobs[index];
            let next = match (signal, job.status) {
                (_, status) if status.is_finished() => {
                    return Err(native_error(JOB_FINISHED, &context));
                }
                (JobSignal::Kill, _) => JobStatus::Exited,
                (JobSignal::Suspend, JobStatus::Pending | JobStatus::Waiting) => JobStatus::Held,
                (JobSignal::Suspend, JobStatus::Running) => JobStatus::UserSuspended,
                (JobSignal::Resume, JobStatus::Held) => JobStatus::Pending,
                (JobSignal::Resume, JobStatus::UserSuspended | JobStatus::SystemSuspended) => {
                    JobStatus::Running
                }
                (_, status) => status,
            };
            if next == JobStatus::Exited {
                job.exit_status = KILLED_EXIT_STATUS;
                job.end_time = Utc::now().timestamp();
            }
            info!(job = %id, user, %signal, from = %job.status, to = %next, "Job signalled");
            job.status = next;
            Ok(())
        })
    }

    fn requeue_job(&self, id: JobId, hold: bool) -> Result<()> {
        let context = format!("Unable to requeue job: {id}");
        self.mutate(&context, |state, user| {
            let index = state
                .job_index(id)
                .ok_or_else(|| native_error(NO_JOB, &context))?;
            authorize(&job_admins(state, &state.jobs[index]), user, &context)?;
            let job = &mut state.jobs[index];
            if !matches!(
                job.status,
                JobStatus::Done | JobStatus::Running | JobStatus::Exited
            ) {
                return Err(ClusterError::cluster_interface(format!(
                    "Job has an invalid state for requeue: {}",
                    job.status
                ))
                .with_extra("status", job.status.name()));
            }
            job.status = if hold {
                JobStatus::Held
            } else {
                JobStatus::Pending
            };
            job.exit_status = 0;
            job.start_time = 0;
            job.end_time = 0;
            job.execution_hosts.clear();
            info!(job = %id, user, hold, "Job requeued");
            Ok(())
        })
    }

    fn submit(&self, request: &SubmitRequest) -> Result<Vec<JobId>> {
        request.validate()?;
        let array = request.array_range()?;
        let context = "Unable to submit job";
        self.mutate(context, |state, user| {
            let queue_name = request
                .queue_name
                .clone()
                .or_else(|| state.default_queue.clone())
                .or_else(|| state.queues.first().map(|queue| queue.name.clone()))
                .ok_or_else(|| native_error(BAD_QUEUE, context))?;
            let queue = state
                .queue_index(&queue_name)
                .map(|index| &state.queues[index])
                .ok_or_else(|| native_error(BAD_QUEUE, context))?;
            if queue.status_mask & QueueStatus::Open.code() == 0 {
                return Err(native_error(QUEUE_CLOSED, context));
            }
            if !queue.allowed_users.is_empty() && !queue.allowed_users.iter().any(|u| u == user) {
                return Err(native_error(QUEUE_USE, context));
            }
            let requested_hosts = request.requested_host_list();
            if requested_hosts.iter().any(|host| state.host_index(host).is_none()) {
                return Err(native_error(BAD_HOST, context));
            }

            let job_id = state.next_job_id();
            let elements: Vec<(String, u32)> = match &array {
                Some((base, first, last)) => (*first..=*last)
                    .map(|index| (format!("{base}[{index}]"), index))
                    .collect(),
                None => vec![(
                    request
                        .job_name
                        .clone()
                        .unwrap_or_else(|| request.command.clone()),
                    0,
                )],
            };
            let now = Utc::now().timestamp();
            let template = JobSnapshot {
                job_id,
                user_name: user.to_string(),
                queue: queue_name.clone(),
                submission_host: state.main_host.clone(),
                requested_hosts,
                command: request.command.clone(),
                status: if request.is_held() {
                    JobStatus::Held
                } else {
                    JobStatus::Pending
                },
                submit_time: now,
                dependency_condition: request.dependency_conditions.clone().unwrap_or_default(),
                email_user: request.email_user.clone().unwrap_or_default(),
                input_file_name: request.input_file.clone().unwrap_or_default(),
                output_file_name: request.output_file.clone().unwrap_or_default(),
                error_file_name: request.error_file.clone().unwrap_or_default(),
                requested_slots: request.requested_slots,
                max_requested_slots: request.effective_max_slots(),
                options: request.option_names(),
                signal_value: request.signal_value,
                project_names: request.project_name.iter().cloned().collect(),
                requested_resources: request.resource_request.clone().unwrap_or_default(),
                user_priority: request.user_priority.unwrap_or_default(),
                checkpoint_directory: request.checkpoint_directory.clone().unwrap_or_default(),
                checkpoint_period: request.checkpoint_period.unwrap_or_default(),
                host_specification: request.host_specification.clone().unwrap_or_default(),
                login_shell: request.login_shell.clone().unwrap_or_default(),
                ..Default::default()
            };
            let mut ids = Vec::with_capacity(elements.len());
            for (name, array_index) in elements {
                let job = JobSnapshot {
                    name,
                    array_index,
                    ..template.clone()
                };
                ids.push(job.id());
                state.jobs.push(job);
            }
            if state.user_index(user).is_none() {
                state.users.push(UserSnapshot {
                    name: user.to_string(),
                    ..Default::default()
                });
            }
            info!(job_id, user, queue = %queue_name, elements = ids.len(), "Job submitted");
            Ok(ids)
        })
    }

    fn control_queue(&self, name: &str, action: QueueAction) -> Result<()> {
        let context = format!("Unable to {action} queue: {name}");
        self.mutate(&context, |state, user| {
            let index = state
                .queue_index(name)
                .ok_or_else(|| native_error(BAD_QUEUE, &context))?;
            let admins = merge_admins([
                state.queues[index].admins.as_slice(),
                state.admins.as_slice(),
            ]);
            authorize(&admins, user, &context)?;
            let queue = &mut state.queues[index];
            match action {
                QueueAction::Open => queue.status_mask |= QueueStatus::Open.code(),
                QueueAction::Close => queue.status_mask &= !QueueStatus::Open.code(),
                QueueAction::Activate => queue.status_mask |= QueueStatus::Active.code(),
                QueueAction::Inactivate => queue.status_mask &= !QueueStatus::Active.code(),
            }
            info!(queue = name, user, %action, "Queue controlled");
            Ok(())
        })
    }

    fn control_host(&self, name: &str, action: HostAction) -> Result<()> {
        let context = format!("Unable to {action} host: {name}");
        self.mutate(&context, |state, user| {
            let index = state
                .host_index(name)
                .ok_or_else(|| native_error(BAD_HOST, &context))?;
            let admins = merge_admins([
                state.hosts[index].admins.as_slice(),
                state.admins.as_slice(),
            ]);
            authorize(&admins, user, &context)?;
            let host = &mut state.hosts[index];
            match action {
                HostAction::Open => host.status_mask &= !HostStatus::Disabled.code(),
                HostAction::Close => host.status_mask |= HostStatus::Disabled.code(),
            }
            info!(host = name, user, %action, "Host controlled");
            Ok(())
        })
    }

    fn output_path(&self, id: JobId) -> Result<Option<PathBuf>> {
        let context = format!("Unable to read output of job: {id}");
        let state = self.snapshot();
        let index = state
            .job_index(id)
            .ok_or_else(|| native_error(NO_JOB, &context))?;
        let user = self
            .acting_user
            .as_deref()
            .ok_or_else(|| native_error(PERMISSION, &context))?;
        let job = &state.jobs[index];
        authorize(&job_admins(&state, job), user, &context)?;
        Ok(job.output_path.clone())
    }
}

impl SchedulerFactory for MemoryScheduler {
    fn connect(&self, acting_user: Option<&str>) -> Result<Box<dyn Scheduler>> {
        Ok(Box::new(self.clone().acting_as(acting_user)))
    }
}

/// Connects by loading a fresh [`MemoryScheduler`] from a state file.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SchedulerFactory for StateFile {
    fn connect(&self, acting_user: Option<&str>) -> Result<Box<dyn Scheduler>> {
        Ok(Box::new(MemoryScheduler::load(&self.path)?.acting_as(acting_user)))
    }
}
