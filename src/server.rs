//! HTTP and SSE adapter over the run registry

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::SimulationError;
use crate::event::{SimulationEvent, StreamConnected};
use crate::model::{
    Phase, RunId, RunStatus, SimulationInput, SimulationRequest, SimulationRun, SimulationState,
};
use crate::registry::RunRegistry;
use crate::stakeholder::Stakeholder;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub registry: RunRegistry,
}

/// Errors returned to HTTP callers as `{"error": "..."}`
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<SimulationError> for ApiError {
    fn from(e: SimulationError) -> Self {
        match e {
            SimulationError::InvalidInput(_) => Self::BadRequest(e.to_string()),
            SimulationError::NotFound(_) => Self::NotFound(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Create the router with tracing and CORS layers
pub fn create_router(registry: RunRegistry, cors_allow_origins: &[String]) -> Router {
    let api_routes = Router::new()
        .route("/stakeholders", get(list_stakeholders))
        .route("/simulations", post(create_simulation))
        .route("/simulations/:id", get(get_simulation))
        .route("/simulations/:id/events", get(stream_events));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_allow_origins))
        .with_state(AppState { registry })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

/// Bind and serve until Ctrl-C or SIGTERM
pub async fn serve(addr: SocketAddr, router: Router) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, "Interrogator listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated with an error")?;

    info!("Interrogator shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received terminate signal, initiating graceful shutdown"),
    }
}

// === Handlers ===

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Serialize)]
struct StakeholderList<'a> {
    stakeholders: &'a [Stakeholder],
}

async fn list_stakeholders(State(state): State<AppState>) -> Response {
    Json(StakeholderList {
        stakeholders: state.registry.catalog().list(),
    })
    .into_response()
}

/// Body of a 202 reply to a submission
#[derive(Debug, Serialize)]
pub struct CreatedSimulation {
    pub simulation_id: RunId,
    pub status: RunStatus,
    pub events_url: String,
    pub details_url: String,
}

async fn create_simulation(
    State(state): State<AppState>,
    body: Result<Json<SimulationRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreatedSimulation>)> {
    let Json(request) = body?;
    let id = state.registry.create(&request)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CreatedSimulation {
            simulation_id: id,
            status: RunStatus::Running,
            events_url: format!("/api/simulations/{id}/events"),
            details_url: format!("/api/simulations/{id}"),
        }),
    ))
}

/// Status read of one run
#[derive(Debug, Serialize)]
pub struct SimulationView {
    pub simulation_id: RunId,
    pub status: RunStatus,
    pub phase: Phase,
    pub started_at: f64,
    pub completed_at: Option<f64>,
    pub error: Option<String>,
    pub final_answer: String,
    pub input: SimulationInput,
    pub state: SimulationState,
}

impl From<SimulationRun> for SimulationView {
    fn from(run: SimulationRun) -> Self {
        Self {
            simulation_id: run.id,
            status: run.status,
            phase: run.phase,
            started_at: run.started_at,
            completed_at: run.completed_at,
            error: run.error,
            final_answer: run.final_answer,
            input: run.input,
            state: run.state,
        }
    }
}

fn parse_run_id(raw: &str) -> ApiResult<RunId> {
    raw.parse()
        .map_err(|_| ApiError::NotFound(format!("Simulation '{raw}' was not found")))
}

async fn get_simulation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SimulationView>> {
    let id = parse_run_id(&id)?;
    Ok(Json(state.registry.get(id)?.into()))
}

fn sse_frame(event: &SimulationEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(data) => Some(
            Event::default()
                .id(event.sequence_id.to_string())
                .event(event.event_type())
                .data(data),
        ),
        Err(e) => {
            warn!(
                run_id = %event.run_id,
                sequence_id = event.sequence_id,
                error = %e,
                "Skipping event that failed to serialize"
            );
            None
        }
    }
}

/// Stream a run's events: a `stream.connected` greeting, then the full log
async fn stream_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let run = state.registry.handle(parse_run_id(&id)?)?;

    let greeting = serde_json::to_string(&StreamConnected::new(run.id(), run.status()))
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let greeting = Event::default().event(StreamConnected::TYPE).data(greeting);

    let events = run
        .subscribe()
        .into_stream()
        .filter_map(|event| std::future::ready(sse_frame(&event).map(Ok)));
    let stream = stream::once(std::future::ready(Ok::<_, Infallible>(greeting))).chain(events);

    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(15))
        .text("ping");
    Ok(Sse::new(stream).keep_alive(keep_alive))
}
