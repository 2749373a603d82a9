// Dashboard HTTP API server
//
// Provides the call log REST endpoints, SSE streaming and the voice webhooks

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Form, Query, State,
    },
    http::{header, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::call_log::{parse_call_id, CallLogRecord, NewCallLog, RawCallId};
use crate::config::CallboardConfig;
use crate::dashboard::event_stream::EventBroadcaster;
use crate::service::CallLogService;
use crate::stats::{DailyStats, LogQuery, LogSummary};
use crate::voice::{self, Twiml, TWIML_CONTENT_TYPE};
use crate::CallboardError;

/// Dashboard server state
#[derive(Clone)]
struct DashboardState {
    service: CallLogService,
    broadcaster: EventBroadcaster,
    ping_interval: Duration,
    caller_id: String,
}

/// Dashboard HTTP server
pub struct DashboardServer {
    config: CallboardConfig,
    service: CallLogService,
}

impl DashboardServer {
    pub fn new(config: CallboardConfig, service: CallLogService) -> Self {
        Self { config, service }
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        self.service.broadcaster()
    }

    pub fn router(&self) -> Router {
        let state = DashboardState {
            service: self.service.clone(),
            broadcaster: self.service.broadcaster().clone(),
            ping_interval: self.config.ping_interval,
            caller_id: self.config.caller_id.clone(),
        };

        Router::new()
            .route("/api/events", get(event_stream_handler))
            .route("/api/logs", get(list_logs_handler).post(create_log_handler))
            .route("/api/logs/hide", post(hide_log_handler))
            .route("/api/logs/note", post(note_handler))
            .route("/api/logs/delete", delete(delete_log_handler))
            .route("/api/logs/daily", get(daily_handler))
            .route("/api/logs/summary", get(summary_handler))
            .route("/api/logs/export", get(export_handler))
            .route("/api/recent-calls", get(recent_calls_handler))
            .route("/api/health", get(health_handler))
            .route("/api/voice", post(voice_handler))
            .route("/api/outgoing", post(outgoing_handler))
            .route("/api/bridge", get(bridge_handler).post(bridge_post_handler))
            .layer(TraceLayer::new_for_http())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(state)
    }

    /// Start the Dashboard server on the configured address
    pub async fn serve(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        self.serve_with_shutdown(listener, std::future::pending::<()>())
            .await?;
        Ok(())
    }

    /// Serve on `listener` until `shutdown` resolves.
    ///
    /// Open live channels are closed first so their streams end and the
    /// graceful shutdown can complete.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let broadcaster = self.broadcaster().clone();
        info!(
            target: "dashboard",
            url = %format!("http://{}", listener.local_addr()?),
            "Dashboard server ready"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!(target: "dashboard", channels = broadcaster.channel_count(), "Shutting down; closing live channels");
                broadcaster.close_all();
            })
            .await
    }
}

/// Error body for every failed request
struct ApiError(CallboardError);

impl From<CallboardError> for ApiError {
    fn from(value: CallboardError) -> Self {
        Self(value)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(CallboardError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(CallboardError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CallboardError::Validation(_) => StatusCode::BAD_REQUEST,
            CallboardError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(target: "dashboard", error = %self.0, "Request failed");
        } else {
            warn!(target: "dashboard", error = %self.0, "Request rejected");
        }
        (
            status,
            Json(json!({ "success": false, "error": self.0.to_string() })),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Deserialize)]
struct IdQuery {
    id: Option<String>,
}

#[derive(Deserialize)]
struct NoteRequest {
    id: Option<RawCallId>,
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeQuery {
    customer_number: Option<String>,
}

/// SSE endpoint for live call log updates
async fn event_stream_handler(
    State(state): State<DashboardState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let channel = state.broadcaster.subscribe(state.ping_interval);
    info!(target: "dashboard", channel_id = channel.id(), "New SSE client connected");

    let stream = channel.filter_map(|event| match serde_json::to_string(&event) {
        Ok(json) => Some(Ok(Event::default().data(json))),
        Err(e) => {
            warn!(target: "dashboard", error = %e, "Failed to serialize event");
            None
        }
    });

    Sse::new(stream)
}

async fn list_logs_handler(
    State(state): State<DashboardState>,
    query: Result<Query<LogQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<CallLogRecord>>> {
    let Query(query) = query?;
    Ok(Json(state.service.list(&query).await?))
}

async fn create_log_handler(
    State(state): State<DashboardState>,
    request: Result<Json<NewCallLog>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = request?;
    let record = state.service.create(request).await?;
    Ok(Json(json!({ "success": true, "id": record.id })))
}

async fn hide_log_handler(
    State(state): State<DashboardState>,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let id = parse_call_id(query.id.as_deref())?;
    state.service.hide(id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn note_handler(
    State(state): State<DashboardState>,
    request: Result<Json<NoteRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = request?;
    let id = RawCallId::resolve(request.id.as_ref())?;
    let text = request.text.unwrap_or_default();
    state.service.annotate(id, &text).await?;
    Ok(Json(json!({ "success": true })))
}

async fn delete_log_handler(
    State(state): State<DashboardState>,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let id = parse_call_id(query.id.as_deref())?;
    state.service.delete(id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn daily_handler(State(state): State<DashboardState>) -> ApiResult<Json<Vec<DailyStats>>> {
    Ok(Json(state.service.daily().await?))
}

async fn summary_handler(State(state): State<DashboardState>) -> ApiResult<Json<LogSummary>> {
    Ok(Json(state.service.summary().await?))
}

async fn export_handler(
    State(state): State<DashboardState>,
    query: Result<Query<LogQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query?;
    let csv = state.service.export_csv(&query).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"call_logs.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}

async fn recent_calls_handler(State(state): State<DashboardState>) -> ApiResult<Json<Value>> {
    let calls = state.service.recent().await?;
    Ok(Json(json!({ "success": true, "calls": calls })))
}

async fn health_handler(State(state): State<DashboardState>) -> ApiResult<Json<Value>> {
    let now = state.service.health_check().await?;
    Ok(Json(json!({ "success": true, "result": now })))
}

fn twiml_response(status: StatusCode, twiml: Twiml) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, TWIML_CONTENT_TYPE)],
        twiml.render(),
    )
        .into_response()
}

/// Voice webhook for calls placed from the browser softphone
async fn voice_handler(
    State(state): State<DashboardState>,
    Json(body): Json<Value>,
) -> Response {
    match voice::number_from_json(&body) {
        Some(to) => {
            info!(target: "voice", to = %to, "Dialing from softphone");
            twiml_response(StatusCode::OK, Twiml::new().dial(&state.caller_id, &to))
        }
        None => {
            warn!(target: "voice", "Voice webhook without a phone number");
            twiml_response(
                StatusCode::OK,
                Twiml::new().say("Error. No phone number received by the server. Cannot place call."),
            )
        }
    }
}

/// Form-encoded variant of the voice webhook
async fn outgoing_handler(
    State(state): State<DashboardState>,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    match params.get("To").map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(to) => {
            info!(target: "voice", to = %to, "Outgoing call");
            twiml_response(StatusCode::OK, Twiml::new().dial(&state.caller_id, to))
        }
        None => twiml_response(StatusCode::OK, Twiml::new().say("No phone number provided.")),
    }
}

/// Second leg of an office-first call: connect the office to the customer
async fn bridge_handler(
    State(state): State<DashboardState>,
    Query(query): Query<BridgeQuery>,
) -> Response {
    match query
        .customer_number
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        Some(customer) => twiml_response(
            StatusCode::OK,
            Twiml::new()
                .say("Connecting your call.")
                .dial(&state.caller_id, customer),
        ),
        None => twiml_response(
            StatusCode::BAD_REQUEST,
            Twiml::new().say("Customer number not provided.").hangup(),
        ),
    }
}

async fn bridge_post_handler() -> Response {
    twiml_response(
        StatusCode::METHOD_NOT_ALLOWED,
        Twiml::new().say("Invalid method POST. Use GET.").hangup(),
    )
}
