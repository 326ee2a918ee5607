//! Cluster-wide summaries as `[{label, value}]` series.

use serde::Serialize;

use crate::error::Result;
use crate::model::{Cluster, Host, Job};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slice {
    pub label: String,
    pub value: u64,
}

/// Host states, checked in this order; the first that applies wins.
pub const HOST_STATES: [&str; 5] = ["Down", "Full", "Closed", "In Use", "Empty"];

fn host_state(host: &dyn Host) -> Result<&'static str> {
    let state = if host.is_down()? {
        "Down"
    } else if host.is_busy()? {
        "Full"
    } else if host.is_closed()? {
        "Closed"
    } else if !host.jobs()?.is_empty() {
        "In Use"
    } else {
        "Empty"
    };
    Ok(state)
}

/// Number of hosts in each state. Every state is listed, even when empty.
pub fn host_states(cluster: &dyn Cluster) -> Result<Vec<Slice>> {
    let mut counts = [0u64; HOST_STATES.len()];
    for host in cluster.hosts()? {
        let state = host_state(host.as_ref())?;
        if let Some(slot) = HOST_STATES.iter().position(|s| *s == state) {
            counts[slot] += 1;
        }
    }
    Ok(HOST_STATES
        .iter()
        .zip(counts)
        .map(|(label, value)| Slice {
            label: label.to_string(),
            value,
        })
        .collect())
}

/// Number of jobs per status, in order of first appearance.
pub fn job_states(cluster: &dyn Cluster) -> Result<Vec<Slice>> {
    tally(cluster.jobs()?, |_| Ok(1))
}

/// Requested slots per job status, in order of first appearance.
pub fn slot_states(cluster: &dyn Cluster) -> Result<Vec<Slice>> {
    tally(cluster.jobs()?, |job| Ok(u64::from(job.requested_slots()?)))
}

fn tally(
    jobs: Vec<Box<dyn Job>>,
    weight: impl Fn(&dyn Job) -> Result<u64>,
) -> Result<Vec<Slice>> {
    let mut slices: Vec<Slice> = Vec::new();
    for job in &jobs {
        let label = job.status()?.friendly();
        let amount = weight(job.as_ref())?;
        match slices.iter_mut().find(|slice| slice.label == label) {
            Some(slice) => slice.value += amount,
            None => slices.push(Slice {
                label: label.to_string(),
                value: amount,
            }),
        }
    }
    Ok(slices)
}
