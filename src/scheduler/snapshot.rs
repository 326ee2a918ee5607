//! Serializable cluster state backing the in-memory scheduler.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, Result};
use crate::model::{
    ConsumedResource, JobId, JobStatus, LoadIndex, Process, Resource, ResourceLimit,
};

fn one() -> u32 {
    1
}

fn open_and_active() -> u32 {
    0x01 | 0x02
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSnapshot {
    pub name: String,
    pub main_host: String,
    pub admins: Vec<String>,
    /// Queue used when a submission names none.
    pub default_queue: Option<String>,
    pub hosts: Vec<HostSnapshot>,
    pub queues: Vec<QueueSnapshot>,
    pub jobs: Vec<JobSnapshot>,
    pub users: Vec<UserSnapshot>,
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSnapshot {
    pub name: String,
    pub description: String,
    pub admins: Vec<String>,
    pub has_checkpoint_support: bool,
    pub host_model: String,
    pub host_type: String,
    pub resources: Vec<Resource>,
    /// Host status bits; see [`HostStatus`](crate::model::HostStatus).
    pub status_mask: u32,
    pub max_jobs: Option<u32>,
    pub max_processors: u32,
    pub max_ram: u64,
    pub max_swap: u64,
    pub max_tmp: u64,
    pub max_slots: u32,
    pub num_reserved_slots: u32,
    pub load_information: Vec<LoadIndex>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSnapshot {
    pub name: String,
    pub description: String,
    pub priority: i64,
    pub max_jobs_per_user: Option<u32>,
    pub max_slots_per_user: Option<u32>,
    pub max_jobs_per_processor: Option<f64>,
    pub max_slots_per_processor: Option<f64>,
    /// Empty means every user may submit.
    pub allowed_users: Vec<String>,
    /// Empty means every host in the cluster.
    pub allowed_hosts: Vec<String>,
    pub runtime_limits: Vec<ResourceLimit>,
    pub host_specification: String,
    pub attributes: Vec<String>,
    /// Queue status bits; see [`QueueStatus`](crate::model::QueueStatus).
    pub status_mask: u32,
    pub max_slots: Option<u32>,
    pub num_reserved_slots: u32,
    pub max_jobs: Option<u32>,
    pub admins: Vec<String>,
    pub dispatch_windows: String,
    pub max_slots_per_job: Option<u32>,
    pub max_jobs_per_host: Option<u32>,
    pub max_slots_per_host: Option<u32>,
    pub resource_requirements: String,
    pub min_slots_per_job: u32,
    pub default_slots_per_job: u32,
    pub checkpoint_data_directory: String,
    pub checkpoint_period: i64,
}

impl Default for QueueSnapshot {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            priority: 0,
            max_jobs_per_user: None,
            max_slots_per_user: None,
            max_jobs_per_processor: None,
            max_slots_per_processor: None,
            allowed_users: Vec::new(),
            allowed_hosts: Vec::new(),
            runtime_limits: Vec::new(),
            host_specification: String::new(),
            attributes: Vec::new(),
            status_mask: open_and_active(),
            max_slots: None,
            num_reserved_slots: 0,
            max_jobs: None,
            admins: Vec::new(),
            dispatch_windows: String::new(),
            max_slots_per_job: None,
            max_jobs_per_host: None,
            max_slots_per_host: None,
            resource_requirements: String::new(),
            min_slots_per_job: one(),
            default_slots_per_job: one(),
            checkpoint_data_directory: String::new(),
            checkpoint_period: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSnapshot {
    pub name: String,
    pub max_jobs_per_processor: Option<f64>,
    pub max_slots: Option<u32>,
    pub max_jobs: Option<u32>,
    pub num_reserved_slots: u32,
}

/// Slots a job holds on one execution host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSlot {
    pub host: String,
    pub num_slots: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSnapshot {
    pub job_id: u64,
    pub array_index: u32,
    pub name: String,
    pub user_name: String,
    pub queue: String,
    pub submission_host: String,
    pub execution_hosts: Vec<ExecutionSlot>,
    pub requested_hosts: Vec<String>,
    pub command: String,
    pub status: JobStatus,
    pub exit_status: i32,
    pub begin_time: i64,
    pub predicted_start_time: i64,
    pub reservation_time: i64,
    pub submit_time: i64,
    pub start_time: i64,
    pub end_time: i64,
    pub termination_time: i64,
    pub cpu_time: f64,
    pub consumed_resources: Vec<ConsumedResource>,
    pub dependency_condition: String,
    pub email_user: String,
    pub input_file_name: String,
    pub output_file_name: String,
    pub error_file_name: String,
    pub requested_slots: u32,
    pub max_requested_slots: u32,
    pub options: Vec<String>,
    pub pending_reasons: String,
    pub suspension_reasons: String,
    pub priority: i64,
    pub user_priority: i64,
    pub process_id: i64,
    pub processes: Vec<Process>,
    pub project_names: Vec<String>,
    pub requested_resources: String,
    pub runtime_limits: Vec<ResourceLimit>,
    pub checkpoint_directory: String,
    pub checkpoint_period: i64,
    pub cwd: String,
    pub host_specification: String,
    pub login_shell: String,
    /// Signal sent ahead of a run window closing.
    pub signal_value: Option<i32>,
    /// Spool path of the job's output streams, without extension.
    pub output_path: Option<PathBuf>,
}

impl Default for JobSnapshot {
    fn default() -> Self {
        Self {
            job_id: 0,
            array_index: 0,
            name: String::new(),
            user_name: String::new(),
            queue: String::new(),
            submission_host: String::new(),
            execution_hosts: Vec::new(),
            requested_hosts: Vec::new(),
            command: String::new(),
            status: JobStatus::Pending,
            exit_status: 0,
            begin_time: 0,
            predicted_start_time: 0,
            reservation_time: 0,
            submit_time: 0,
            start_time: 0,
            end_time: 0,
            termination_time: 0,
            cpu_time: 0.0,
            consumed_resources: Vec::new(),
            dependency_condition: String::new(),
            email_user: String::new(),
            input_file_name: String::new(),
            output_file_name: String::new(),
            error_file_name: String::new(),
            requested_slots: one(),
            max_requested_slots: one(),
            options: Vec::new(),
            pending_reasons: String::new(),
            suspension_reasons: String::new(),
            priority: 0,
            user_priority: 0,
            process_id: 0,
            processes: Vec::new(),
            project_names: Vec::new(),
            requested_resources: String::new(),
            runtime_limits: Vec::new(),
            checkpoint_directory: String::new(),
            checkpoint_period: 0,
            cwd: String::new(),
            host_specification: String::new(),
            login_shell: String::new(),
            signal_value: None,
            output_path: None,
        }
    }
}

impl JobSnapshot {
    pub fn id(&self) -> JobId {
        JobId::new(self.job_id, self.array_index)
    }

    pub fn slots_on(&self, host: &str) -> u32 {
        self.execution_hosts
            .iter()
            .filter(|slot| slot.host == host)
            .fold(0u32, |total, slot| total.saturating_add(slot.num_slots))
    }
}

/// Job and slot counts by coarse state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub running_jobs: u32,
    pub running_slots: u32,
    pub pending_jobs: u32,
    pub pending_slots: u32,
    pub suspended_jobs: u32,
    pub suspended_slots: u32,
}

impl Usage {
    fn add(&mut self, status: JobStatus, slots: u32) {
        match status {
            JobStatus::Running => {
                self.running_jobs = self.running_jobs.saturating_add(1);
                self.running_slots = self.running_slots.saturating_add(slots);
            }
            JobStatus::SystemSuspended | JobStatus::UserSuspended => {
                self.suspended_jobs = self.suspended_jobs.saturating_add(1);
                self.suspended_slots = self.suspended_slots.saturating_add(slots);
            }
            JobStatus::Pending | JobStatus::Held | JobStatus::Waiting => {
                self.pending_jobs = self.pending_jobs.saturating_add(1);
                self.pending_slots = self.pending_slots.saturating_add(slots);
            }
            _ => {}
        }
    }
}

impl ClusterSnapshot {
    pub fn host_index(&self, name: &str) -> Option<usize> {
        self.hosts.iter().position(|host| host.name == name)
    }

    pub fn queue_index(&self, name: &str) -> Option<usize> {
        self.queues.iter().position(|queue| queue.name == name)
    }

    pub fn user_index(&self, name: &str) -> Option<usize> {
        self.users.iter().position(|user| user.name == name)
    }

    pub fn job_index(&self, id: JobId) -> Option<usize> {
        self.jobs.iter().position(|job| job.id() == id)
    }

    /// Usage of a host, counting only the slots placed on it.
    pub fn host_usage(&self, name: &str) -> Usage {
        let mut usage = Usage::default();
        for job in &self.jobs {
            let slots = job.slots_on(name);
            if slots > 0 {
                usage.add(job.status, slots);
            }
        }
        usage
    }

    pub fn queue_usage(&self, name: &str) -> Usage {
        let mut usage = Usage::default();
        for job in self.jobs.iter().filter(|job| job.queue == name) {
            usage.add(job.status, job.requested_slots);
        }
        usage
    }

    pub fn user_usage(&self, name: &str) -> Usage {
        let mut usage = Usage::default();
        for job in self.jobs.iter().filter(|job| job.user_name == name) {
            usage.add(job.status, job.requested_slots);
        }
        usage
    }

    /// Next free job id.
    pub fn next_job_id(&self) -> u64 {
        self.jobs.iter().map(|job| job.job_id).max().unwrap_or(0) + 1
    }

    pub fn is_cluster_admin(&self, user: &str) -> bool {
        self.admins.iter().any(|admin| admin == user)
    }

    /// Reject states a real scheduler could never report.
    pub fn validate(&self) -> Result<()> {
        for host in &self.hosts {
            let usage = self.host_usage(&host.name);
            let used = usage
                .running_slots
                .saturating_add(usage.suspended_slots)
                .saturating_add(host.num_reserved_slots);
            if used > host.max_slots {
                return Err(ClusterError::cluster_interface(format!(
                    "Host {} has {} slots in use but only {} available",
                    host.name, used, host.max_slots
                ))
                .with_extra("host", host.name.clone()));
            }
        }
        for job in &self.jobs {
            if self.queue_index(&job.queue).is_none() {
                return Err(ClusterError::cluster_interface(format!(
                    "Job {} is in unknown queue {}",
                    job.id(),
                    job.queue
                ))
                .with_extra("queue", job.queue.clone()));
            }
        }
        Ok(())
    }
}
