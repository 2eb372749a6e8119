//! HTTP adapter tests driven through the router with `oneshot`

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use interrogator::server::create_router;
use interrogator::testing::ScriptedGenerator;
use interrogator::{
    CeilingOnly, GenerationKind, RunId, RunRegistry, Stakeholder, StakeholderCatalog,
};
use serde_json::{json, Value};
use tower::ServiceExt;

fn registry(generator: ScriptedGenerator) -> RunRegistry {
    let catalog = StakeholderCatalog::from_stakeholders(vec![Stakeholder {
        id: "ops_manager".into(),
        title: "Warehouse operations manager".into(),
        profile: "Runs a 25-person fulfilment team".into(),
        age_demography: "35-50".into(),
        tech_savviness: "medium".into(),
        product_context: "Shift plans in spreadsheets".into(),
    }]);
    RunRegistry::new(Arc::new(generator), catalog).with_judge(Arc::new(CeilingOnly))
}

fn app(registry: &RunRegistry) -> Router {
    create_router(registry.clone(), &[])
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn wait_until_finished(registry: &RunRegistry, id: RunId) {
    let mut sub = registry.subscribe(id).unwrap();
    tokio::time::timeout(Duration::from_secs(10), async {
        while sub.next().await.is_some() {}
    })
    .await
    .unwrap();
}

// === Service Endpoints ===

#[tokio::test]
async fn test_health() {
    let registry = registry(ScriptedGenerator::new());
    let (status, body) = send_json(app(&registry), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_list_stakeholders() {
    let registry = registry(ScriptedGenerator::new());
    let (status, body) = send_json(app(&registry), get("/api/stakeholders")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stakeholders"][0]["id"], "ops_manager");
}

// === Submission ===

#[tokio::test]
async fn test_submit_and_read() {
    let registry = registry(ScriptedGenerator::new());
    let (status, body) = send_json(
        app(&registry),
        post_json(
            "/api/simulations",
            &json!({
                "user_input": "Shift planning is painful",
                "stakeholder_id": "ops_manager",
                "max_interview_messages": 2
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "running");
    let id = body["simulation_id"].as_str().unwrap().to_string();
    assert_eq!(body["events_url"], format!("/api/simulations/{id}/events"));
    assert_eq!(body["details_url"], format!("/api/simulations/{id}"));

    wait_until_finished(&registry, id.parse().unwrap()).await;

    let (status, details) = send_json(app(&registry), get(&format!("/api/simulations/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["simulation_id"], id.as_str());
    assert_eq!(details["status"], "completed");
    assert_eq!(details["phase"], "completed");
    assert!(details["completed_at"].is_number());
    assert!(details["error"].is_null());
    assert!(!details["final_answer"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_with_aliases() {
    let registry = registry(ScriptedGenerator::new());
    let (status, _) = send_json(
        app(&registry),
        post_json(
            "/api/simulations",
            &json!({
                "idea": "X",
                "customer_persona": "A clinic owner",
                "todo_list": ["Books by phone"]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_submit_with_alias_and_canonical_field() {
    let registry = registry(ScriptedGenerator::new());
    let (status, body) = send_json(
        app(&registry),
        post_json(
            "/api/simulations",
            &json!({
                "idea": "Clinic booking",
                "user_input": "Ignored",
                "customer_persona": "A clinic owner",
                "stakeholder_profile": "Ignored"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let id: RunId = body["simulation_id"].as_str().unwrap().parse().unwrap();
    let run = registry.get(id).unwrap();
    assert_eq!(run.input.user_input, "Clinic booking");
    assert_eq!(run.input.stakeholder_profile, "A clinic owner");
}

#[tokio::test]
async fn test_invalid_submission_is_bad_request() {
    let registry = registry(ScriptedGenerator::new());
    let (status, body) = send_json(
        app(&registry),
        post_json("/api/simulations", &json!({ "user_input": "X", "stakeholder_id": "nobody" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("nobody"));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_out_of_range_ceiling_is_bad_request() {
    let registry = registry(ScriptedGenerator::new());
    let (status, _) = send_json(
        app(&registry),
        post_json(
            "/api/simulations",
            &json!({ "user_input": "X", "stakeholder_profile": "p", "max_interview_messages": 41 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let registry = registry(ScriptedGenerator::new());
    let request = Request::builder()
        .method("POST")
        .uri("/api/simulations")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send_json(app(&registry), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

// === Lookup ===

#[tokio::test]
async fn test_unknown_simulation_is_not_found() {
    let registry = registry(ScriptedGenerator::new());

    let uri = format!("/api/simulations/{}", RunId::new());
    let (status, body) = send_json(app(&registry), get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) = send_json(app(&registry), get("/api/simulations/not-a-uuid")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let uri = format!("/api/simulations/{}/events", RunId::new());
    let (status, _) = send(app(&registry), get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_run_reports_error() {
    let registry = registry(ScriptedGenerator::new().fail_on(GenerationKind::Synthesize));
    let id = registry
        .create(
            &interrogator::SimulationRequest::new("X")
                .stakeholder_profile("p")
                .max_interview_messages(2),
        )
        .unwrap();
    wait_until_finished(&registry, id).await;

    let (status, details) = send_json(app(&registry), get(&format!("/api/simulations/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["status"], "failed");
    assert_eq!(details["final_answer"], "");
    assert!(details["error"].as_str().unwrap().contains("synthesize"));
}

// === Event Stream ===

fn sse_frames(body: &str) -> Vec<(Option<String>, String, Value)> {
    body.split("\n\n")
        .filter(|frame| frame.lines().any(|l| l.starts_with("data:")))
        .map(|frame| {
            let mut id = None;
            let mut event = String::new();
            let mut data = String::new();
            for line in frame.lines() {
                if let Some(v) = line.strip_prefix("id:") {
                    id = Some(v.trim().to_string());
                } else if let Some(v) = line.strip_prefix("event:") {
                    event = v.trim().to_string();
                } else if let Some(v) = line.strip_prefix("data:") {
                    data.push_str(v.trim());
                }
            }
            (id, event, serde_json::from_str(&data).unwrap())
        })
        .collect()
}

#[tokio::test]
async fn test_event_stream_replays_full_log() {
    let registry = registry(ScriptedGenerator::new());
    let id = registry
        .create(
            &interrogator::SimulationRequest::new("X")
                .stakeholder_id("ops_manager")
                .max_interview_messages(2),
        )
        .unwrap();
    wait_until_finished(&registry, id).await;

    let response = app(&registry)
        .oneshot(get(&format!("/api/simulations/{id}/events")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let frames = sse_frames(std::str::from_utf8(&body).unwrap());

    let (greeting_id, greeting_event, greeting) = &frames[0];
    assert!(greeting_id.is_none());
    assert_eq!(greeting_event, "stream.connected");
    assert_eq!(greeting["payload"]["status"], "completed");
    assert!(greeting.get("sequence_id").is_none());

    let log = &frames[1..];
    assert_eq!(log.len(), registry.handle(id).unwrap().events().len());
    for (i, (sse_id, event, data)) in log.iter().enumerate() {
        assert_eq!(sse_id.as_deref(), Some(i.to_string().as_str()));
        assert_eq!(data["sequence_id"], i as u64);
        assert_eq!(data["type"], event.as_str());
        assert_eq!(data["run_id"], id.to_string());
    }
    assert_eq!(log[0].1, "simulation.started");
    assert_eq!(log.last().unwrap().1, "simulation.completed");
}
