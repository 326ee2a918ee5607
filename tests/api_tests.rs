
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use batchgate::api::{router, ApiState};
use batchgate::config::ApiConfig;
use batchgate::model::{JobId, JobStatus};
use batchgate::scheduler::{MemoryScheduler, Scheduler};
use test_harness::{in_process, InProcessSetup};

const IDENTITY: &str = "x-remote-user";

fn create_test_app(setup: InProcessSetup) -> (Router, MemoryScheduler) {
    let scheduler = setup.scheduler.clone();
    let state = ApiState::new(
        Arc::new(setup.scheduler),
        Arc::new(setup.executor),
        &ApiConfig::default(),
    )
    .unwrap();
    (router(state, "/olw"), scheduler)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_as(uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(user) = user {
        builder = builder.header(IDENTITY, user);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn test_cluster_endpoint() {
    let (app, _) = create_test_app(in_process());

    let (status, body) = send(app, get("/olw/cluster/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["message"], "");
    assert_eq!(body["data"]["type"], "Cluster");
    assert_eq!(body["data"]["name"], "openlava");
}

#[tokio::test]
async fn test_unknown_host_is_not_found() {
    let (app, _) = create_test_app(in_process());

    let (status, body) = send(app, get("/olw/hosts/nope/")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({
            "status": "FAIL",
            "data": {"exception_class": "NoSuchHostError", "message": "Host not found"},
            "message": "Host not found"
        })
    );
}

#[tokio::test]
async fn test_job_detail_and_listing() {
    let (app, _) = create_test_app(in_process());

    let (status, body) = send(app.clone(), get("/olw/jobs/9767/0/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "simulation");
    assert_eq!(body["data"]["queue"]["url"], "/olw/queues/normal/");

    let (status, body) = send(app, get("/olw/jobs/?user_name=alice&state=all")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_mutation_requires_identity() {
    let setup = in_process();
    let (app, scheduler) = create_test_app(setup);

    let (status, body) = send(app, post_as("/olw/jobs/9767/0/kill", None, None)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["data"]["exception_class"], "PermissionDeniedError");
    assert_eq!(body["message"], "No authenticated user");
    assert_eq!(scheduler.mutation_calls(), 0);
}

#[tokio::test]
async fn test_kill_as_owner() {
    let (app, scheduler) = create_test_app(in_process());

    let (status, body) = send(app, post_as("/olw/jobs/9767/0/kill", Some("alice"), None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "OK", "data": null, "message": "Job Killed"}));
    let job = scheduler.job(JobId::new(9767, 0)).unwrap();
    assert_eq!(job.status().unwrap(), JobStatus::Exited);
}

#[tokio::test]
async fn test_requeue_with_hold() {
    let (app, scheduler) = create_test_app(in_process());

    let (status, body) = send(
        app,
        post_as("/olw/jobs/9769/0/requeue?hold=true", Some("alice"), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Job Requeued");
    let job = scheduler.job(JobId::new(9769, 0)).unwrap();
    assert_eq!(job.status().unwrap(), JobStatus::Held);
}

#[tokio::test]
async fn test_submit_through_api() {
    let (app, _) = create_test_app(in_process());

    let (status, body) = send(
        app.clone(),
        post_as(
            "/olw/jobs/submit",
            Some("alice"),
            Some(json!({"command": "hostname", "queue_name": "normal"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Job Submitted");
    assert_eq!(body["data"][0]["job_id"], 9771);

    let (status, body) = send(
        app,
        post_as(
            "/olw/jobs/submit",
            Some("alice"),
            Some(json!({"command": "hostname", "walltime": 10})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["data"]["exception_class"], "JobSubmitError");
}

#[tokio::test]
async fn test_host_overview() {
    let (app, _) = create_test_app(in_process());

    let (status, body) = send(app, get("/olw/overview/hosts")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!([
            {"label": "Down", "value": 1},
            {"label": "Full", "value": 0},
            {"label": "Closed", "value": 1},
            {"label": "In Use", "value": 1},
            {"label": "Empty", "value": 1}
        ])
    );
}

#[tokio::test]
async fn test_job_overview() {
    let (app, _) = create_test_app(in_process());

    let (_, body) = send(app, get("/olw/overview/jobs")).await;

    assert_eq!(
        body["data"],
        json!([{"label": "Running", "value": 1}, {"label": "Pending", "value": 2}])
    );
}

#[tokio::test]
async fn test_exception_endpoint() {
    let (app, _) = create_test_app(in_process());

    let (status, body) = send(app.clone(), get("/olw/exceptions/NoSuchJobError")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Exception Test");
    assert_eq!(body["data"]["exception_class"], "NoSuchJobError");

    let (status, body) = send(app, get("/olw/exceptions/ValueError")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"]["exception_class"], "ResourceDoesntExistError");
}

#[tokio::test]
async fn test_malformed_job_path_is_an_envelope() {
    let (app, scheduler) = create_test_app(in_process());

    let (status, body) = send(app.clone(), get("/olw/jobs/abc/0/")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "FAIL");
    assert_eq!(body["data"]["exception_class"], "NoSuchJobError");
    assert_eq!(body["message"], "Job not found");

    let (status, body) = send(app, post_as("/olw/jobs/9767/x/kill", Some("alice"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"]["exception_class"], "NoSuchJobError");
    assert_eq!(scheduler.mutation_calls(), 0);
}

#[tokio::test]
async fn test_malformed_submit_body_is_a_submit_error() {
    let (app, scheduler) = create_test_app(in_process());

    let request = Request::builder()
        .method("POST")
        .uri("/olw/jobs/submit")
        .header(IDENTITY, "alice")
        .header("content-type", "application/json")
        .body(Body::from("command=hostname"))
        .unwrap();
    let (status, body) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "FAIL");
    assert_eq!(body["data"]["exception_class"], "JobSubmitError");

    // No content type at all.
    let (status, body) = send(app, post_as("/olw/jobs/submit", Some("alice"), None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["data"]["exception_class"], "JobSubmitError");
    assert_eq!(scheduler.mutation_calls(), 0);
}

#[tokio::test]
async fn test_malformed_query_is_an_envelope() {
    let (app, _) = create_test_app(in_process());

    let (status, body) = send(app.clone(), get("/olw/jobs/?state=sideways")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"]["exception_class"], "ResourceDoesntExistError");

    let (status, body) = send(
        app,
        post_as("/olw/jobs/9769/0/requeue?hold=maybe", Some("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "FAIL");
}
