//! JSON HTTP boundary.
//!
//! Reads are answered from a scheduler connection on the blocking pool.
//! Mutations and job output reads go through the [`PrivilegedExecutor`] as the user named by the
//! identity header, which an authenticating proxy is expected to set.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::envelope::Envelope;
use crate::error::{ClusterError, Result, TransportHint};
use crate::model::{Entity, JobId};
use crate::overview::{self, Slice};
use crate::projection::Projector;
use crate::scheduler::{
    HostAction, JobFilter, JobSignal, QueueAction, Scheduler, SchedulerFactory, SubmitRequest,
};
use crate::worker::{Operation, OutputStream, PrivilegedExecutor};

#[derive(Clone)]
pub struct ApiState {
    schedulers: Arc<dyn SchedulerFactory>,
    executor: Arc<PrivilegedExecutor>,
    projector: Projector,
    identity_header: HeaderName,
}

impl ApiState {
    pub fn new(
        schedulers: Arc<dyn SchedulerFactory>,
        executor: Arc<PrivilegedExecutor>,
        config: &ApiConfig,
    ) -> Result<Self> {
        let identity_header = HeaderName::try_from(config.identity_header.as_str())
            .map_err(|e| {
                ClusterError::cluster_interface(format!("Invalid identity header: {e}"))
                    .with_extra("header", config.identity_header.as_str())
            })?;
        Ok(Self {
            schedulers,
            executor,
            projector: Projector::with_prefix(config.url_prefix.as_str()),
            identity_header,
        })
    }

    fn identity(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(&self.identity_header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }

    fn require_identity(&self, headers: &HeaderMap) -> Result<String> {
        self.identity(headers)
            .ok_or_else(|| ClusterError::permission_denied("No authenticated user"))
    }

    async fn read(
        &self,
        headers: &HeaderMap,
        read: impl FnOnce(&dyn Scheduler, &Projector) -> Result<Value> + Send + 'static,
    ) -> Response {
        let user = self.identity(headers);
        let schedulers = Arc::clone(&self.schedulers);
        let projector = self.projector.clone();
        let result = tokio::task::spawn_blocking(move || {
            let scheduler = schedulers.connect(user.as_deref())?;
            read(scheduler.as_ref(), &projector)
        })
        .await
        .unwrap_or_else(|e| {
            Err(ClusterError::cluster_interface(format!("Read did not complete: {e}")))
        });
        reply(result)
    }

    async fn execute(&self, headers: &HeaderMap, operation: Operation) -> Response {
        let result = match self.require_identity(headers) {
            Ok(user) => self.executor.execute(&user, operation).await,
            Err(e) => Err(e),
        };
        reply(result)
    }
}

/// Status code for an envelope: not-found and permission failures keep their
/// own status, any other failure is a server error.
fn status_for(error: &ClusterError) -> StatusCode {
    match error.transport_hint() {
        TransportHint::NotFound => StatusCode::NOT_FOUND,
        TransportHint::Forbidden => StatusCode::FORBIDDEN,
        TransportHint::Unspecified => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reply<T: Into<Envelope>>(result: Result<T>) -> Response {
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(kind = e.kind().class_name(), error = %e, "Request failed");
            status_for(e)
        }
    };
    (status, Json(Envelope::from_result(result))).into_response()
}

fn job_path(path: std::result::Result<Path<(u64, u32)>, PathRejection>) -> Result<JobId> {
    let Path((id, index)) = path.map_err(|rejection| {
        ClusterError::no_such_job("Job not found").with_extra("detail", rejection.body_text())
    })?;
    Ok(JobId::new(id, index))
}

fn name_path(path: std::result::Result<Path<String>, PathRejection>) -> Result<String> {
    let Path(name) =
        path.map_err(|rejection| ClusterError::resource_doesnt_exist(rejection.body_text()))?;
    Ok(name)
}

fn query<T>(extracted: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    let Query(value) = extracted.map_err(|rejection| {
        ClusterError::resource_doesnt_exist(format!("Invalid query: {}", rejection.body_text()))
    })?;
    Ok(value)
}

/// Answer with the failure envelope when an extractor rejected the request.
macro_rules! extracted {
    ($value:expr) => {
        match $value {
            Ok(value) => value,
            Err(e) => return reply::<Value>(Err(e)),
        }
    };
}

/// Build the router, with every route under `prefix`.
pub fn router(state: ApiState, prefix: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let routes = Router::new()
        .route("/cluster/", get(cluster_handler))
        .route("/hosts/", get(hosts_handler))
        .route("/hosts/{name}/", get(host_handler))
        .route("/hosts/{name}/open", post(open_host_handler))
        .route("/hosts/{name}/close", post(close_host_handler))
        .route("/queues/", get(queues_handler))
        .route("/queues/{name}/", get(queue_handler))
        .route("/queues/{name}/open", post(open_queue_handler))
        .route("/queues/{name}/close", post(close_queue_handler))
        .route("/queues/{name}/activate", post(activate_queue_handler))
        .route("/queues/{name}/inactivate", post(inactivate_queue_handler))
        .route("/users/", get(users_handler))
        .route("/users/{name}/", get(user_handler))
        .route("/jobs/", get(jobs_handler))
        .route("/jobs/submit", post(submit_handler))
        .route("/jobs/{id}/{index}/", get(job_handler))
        .route("/jobs/{id}/{index}/output", get(job_output_handler))
        .route("/jobs/{id}/{index}/error", get(job_error_handler))
        .route("/jobs/{id}/{index}/kill", post(kill_handler))
        .route("/jobs/{id}/{index}/suspend", post(suspend_handler))
        .route("/jobs/{id}/{index}/resume", post(resume_handler))
        .route("/jobs/{id}/{index}/requeue", post(requeue_handler))
        .route("/overview/hosts", get(overview_hosts_handler))
        .route("/overview/jobs", get(overview_jobs_handler))
        .route("/overview/slots", get(overview_slots_handler))
        .route("/exceptions/{class}", get(exception_handler))
        .with_state(state);

    let prefix = prefix.trim_end_matches('/');
    let app = if prefix.is_empty() {
        routes
    } else {
        Router::new().nest(prefix, routes)
    };
    app.layer(cors).layer(TraceLayer::new_for_http())
}

/// Serve the API until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    prefix: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = router(state, prefix);
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, prefix, "Starting API server");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}


// Reads

async fn cluster_handler(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    state
        .read(&headers, |scheduler, projector| {
            let cluster = scheduler.cluster()?;
            Ok(projector.project(Entity::Cluster(cluster.as_ref()))?)
        })
        .await
}

async fn hosts_handler(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    state
        .read(&headers, |scheduler, projector| {
            let hosts = scheduler.hosts()?;
            Ok(projector.project_all(hosts.iter().map(|host| Entity::Host(host.as_ref())))?)
        })
        .await
}

async fn host_handler(
    State(state): State<ApiState>,
    path: std::result::Result<Path<String>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    let name = extracted!(name_path(path));
    state
        .read(&headers, move |scheduler, projector| {
            let host = scheduler.host(&name)?;
            Ok(projector.project(Entity::Host(host.as_ref()))?)
        })
        .await
}

async fn queues_handler(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    state
        .read(&headers, |scheduler, projector| {
            let queues = scheduler.queues()?;
            Ok(projector.project_all(queues.iter().map(|queue| Entity::Queue(queue.as_ref())))?)
        })
        .await
}

async fn queue_handler(
    State(state): State<ApiState>,
    path: std::result::Result<Path<String>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    let name = extracted!(name_path(path));
    state
        .read(&headers, move |scheduler, projector| {
            let queue = scheduler.queue(&name)?;
            Ok(projector.project(Entity::Queue(queue.as_ref()))?)
        })
        .await
}

async fn users_handler(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    state
        .read(&headers, |scheduler, projector| {
            let users = scheduler.users()?;
            Ok(projector.project_all(users.iter().map(|user| Entity::User(user.as_ref())))?)
        })
        .await
}

async fn user_handler(
    State(state): State<ApiState>,
    path: std::result::Result<Path<String>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    let name = extracted!(name_path(path));
    state
        .read(&headers, move |scheduler, projector| {
            let user = scheduler.user(&name)?;
            Ok(projector.project(Entity::User(user.as_ref()))?)
        })
        .await
}

async fn jobs_handler(
    State(state): State<ApiState>,
    filter: std::result::Result<Query<JobFilter>, QueryRejection>,
    headers: HeaderMap,
) -> Response {
    let filter = extracted!(query(filter));
    state
        .read(&headers, move |scheduler, projector| {
            let jobs = scheduler.jobs(&filter)?;
            Ok(projector.project_all(jobs.iter().map(|job| Entity::Job(job.as_ref())))?)
        })
        .await
}

async fn job_handler(
    State(state): State<ApiState>,
    path: std::result::Result<Path<(u64, u32)>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    let id = extracted!(job_path(path));
    state
        .read(&headers, move |scheduler, projector| {
            let job = scheduler.job(id)?;
            Ok(projector.project(Entity::Job(job.as_ref()))?)
        })
        .await
}

fn series(slices: Vec<Slice>) -> Result<Value> {
    serde_json::to_value(slices)
        .map_err(|e| ClusterError::cluster_interface(format!("Unable to encode overview: {e}")))
}

async fn overview_hosts_handler(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    state
        .read(&headers, |scheduler, _| {
            series(overview::host_states(scheduler.cluster()?.as_ref())?)
        })
        .await
}

async fn overview_jobs_handler(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    state
        .read(&headers, |scheduler, _| {
            series(overview::job_states(scheduler.cluster()?.as_ref())?)
        })
        .await
}

async fn overview_slots_handler(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    state
        .read(&headers, |scheduler, _| {
            series(overview::slot_states(scheduler.cluster()?.as_ref())?)
        })
        .await
}

async fn exception_handler(path: std::result::Result<Path<String>, PathRejection>) -> Response {
    let class = extracted!(name_path(path));
    let error = ClusterError::exception_test(&class).unwrap_or_else(|| {
        ClusterError::resource_doesnt_exist(format!("Unknown exception class: {class}"))
            .with_extra("class", class.as_str())
    });
    reply::<Value>(Err(error))
}

// Privileged

async fn job_output_handler(
    State(state): State<ApiState>,
    path: std::result::Result<Path<(u64, u32)>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    let operation = Operation::ReadJobOutput {
        job: extracted!(job_path(path)),
        stream: OutputStream::Output,
    };
    state.execute(&headers, operation).await
}

async fn job_error_handler(
    State(state): State<ApiState>,
    path: std::result::Result<Path<(u64, u32)>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    let operation = Operation::ReadJobOutput {
        job: extracted!(job_path(path)),
        stream: OutputStream::Error,
    };
    state.execute(&headers, operation).await
}

async fn signal(
    state: &ApiState,
    headers: &HeaderMap,
    path: std::result::Result<Path<(u64, u32)>, PathRejection>,
    signal: JobSignal,
) -> Response {
    let job = extracted!(job_path(path));
    state
        .execute(headers, Operation::SignalJob { job, signal })
        .await
}

async fn kill_handler(
    State(state): State<ApiState>,
    path: std::result::Result<Path<(u64, u32)>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    signal(&state, &headers, path, JobSignal::Kill).await
}

async fn suspend_handler(
    State(state): State<ApiState>,
    path: std::result::Result<Path<(u64, u32)>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    signal(&state, &headers, path, JobSignal::Suspend).await
}

async fn resume_handler(
    State(state): State<ApiState>,
    path: std::result::Result<Path<(u64, u32)>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    signal(&state, &headers, path, JobSignal::Resume).await
}

#[derive(Debug, Default, Deserialize)]
struct RequeueQuery {
    #[serde(default)]
    hold: bool,
}

async fn requeue_handler(
    State(state): State<ApiState>,
    path: std::result::Result<Path<(u64, u32)>, PathRejection>,
    requeue: std::result::Result<Query<RequeueQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Response {
    let operation = Operation::RequeueJob {
        job: extracted!(job_path(path)),
        hold: extracted!(query(requeue)).hold,
    };
    state.execute(&headers, operation).await
}

async fn submit_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: std::result::Result<Json<serde_json::Map<String, Value>>, JsonRejection>,
) -> Response {
    let submitted = body
        .map_err(|rejection| {
            ClusterError::job_submit(format!("Invalid submission: {}", rejection.body_text()))
        })
        .and_then(|Json(fields)| SubmitRequest::from_fields(fields));
    let request = extracted!(submitted);
    state
        .execute(&headers, Operation::SubmitJob { request })
        .await
}

async fn queue_action(
    state: &ApiState,
    headers: &HeaderMap,
    path: std::result::Result<Path<String>, PathRejection>,
    action: QueueAction,
) -> Response {
    let queue = extracted!(name_path(path));
    state
        .execute(headers, Operation::ControlQueue { queue, action })
        .await
}

async fn open_queue_handler(
    State(state): State<ApiState>,
    path: std::result::Result<Path<String>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    queue_action(&state, &headers, path, QueueAction::Open).await
}

async fn close_queue_handler(
    State(state): State<ApiState>,
    path: std::result::Result<Path<String>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    queue_action(&state, &headers, path, QueueAction::Close).await
}

async fn activate_queue_handler(
    State(state): State<ApiState>,
    path: std::result::Result<Path<String>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    queue_action(&state, &headers, path, QueueAction::Activate).await
}

async fn inactivate_queue_handler(
    State(state): State<ApiState>,
    path: std::result::Result<Path<String>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    queue_action(&state, &headers, path, QueueAction::Inactivate).await
}

async fn host_action(
    state: &ApiState,
    headers: &HeaderMap,
    path: std::result::Result<Path<String>, PathRejection>,
    action: HostAction,
) -> Response {
    let host = extracted!(name_path(path));
    state
        .execute(headers, Operation::ControlHost { host, action })
        .await
}

async fn open_host_handler(
    State(state): State<ApiState>,
    path: std::result::Result<Path<String>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    host_action(&state, &headers, path, HostAction::Open).await
}

async fn close_host_handler(
    State(state): State<ApiState>,
    path: std::result::Result<Path<String>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    host_action(&state, &headers, path, HostAction::Close).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_from_transport_hint() {
        assert_eq!(
            status_for(&ClusterError::no_such_job("Job not found")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&ClusterError::permission_denied("nope")),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&ClusterError::job_submit("bad")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
