//! HTTP routes for the wipwatch Monitor.
//!
//! - `GET /tests`: the stored `pytest-tests` states for the project
//! - `GET /ws`: WebSocket stream of outbound records, optionally filtered by
//!   `key` and `kind`
//! - `GET /health`: liveness and observer count
//!
//! ```rust,no_run
//! use wipwatch_monitor::config::Config;
//! use wipwatch_monitor::hub::LocalHub;
//! use wipwatch_monitor::routes::{create_router, AppState};
//!
//! let config = Config::new("/srv/shop", "shop");
//! let router = create_router(AppState::new(config, LocalHub::new()));
//! ```

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocket, Query, State, WebSocketUpgrade},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::hub::{LocalHub, RecordSink, StateQuery};
use crate::tasks::TESTS_STATE_KEY;
use crate::types::{Record, RecordKind, PYTEST_PLUGIN};

/// Shared state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: LocalHub,
    pub start_time: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, hub: LocalHub) -> Self {
        Self {
            config: Arc::new(config),
            hub,
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("project", &self.config.project_name)
            .field("hub", &self.hub)
            .field("start_time", &self.start_time)
            .finish()
    }
}

/// Creates the router with all routes configured.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/tests", get(get_tests))
        .route("/ws", get(get_ws))
        .route("/health", get(get_health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /tests - latest collected test inventory.
async fn get_tests(State(state): State<AppState>) -> Json<Vec<Record>> {
    let query = StateQuery::new()
        .with_project(state.config.project_name.clone())
        .with_plugin(PYTEST_PLUGIN)
        .with_key(TESTS_STATE_KEY);

    let states = state.hub.states(&query);
    debug!(count = states.len(), "Serving collected tests");
    Json(states)
}

/// Query parameters for WebSocket subscription.
#[derive(Debug, Default, Deserialize)]
pub struct WsQueryParams {
    /// Only records with this key.
    pub key: Option<String>,

    /// Only states or only events.
    pub kind: Option<RecordKind>,
}

impl WsQueryParams {
    fn matches(&self, record: &Record) -> bool {
        self.key.as_ref().is_none_or(|key| &record.key == key)
            && self.kind.is_none_or(|kind| record.kind == kind)
    }
}

/// GET /ws - stream outbound records as JSON text messages.
async fn get_ws(
    State(state): State<AppState>,
    Query(params): Query<WsQueryParams>,
    ws: WebSocketUpgrade,
) -> Response {
    info!(key = ?params.key, kind = ?params.kind, "WebSocket client connecting");
    ws.on_upgrade(move |socket| handle_websocket(socket, state.hub, params))
}

async fn handle_websocket(socket: WebSocket, hub: LocalHub, params: WsQueryParams) {
    use axum::extract::ws::Message;
    use futures_util::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let mut records = hub.watch_records();

    info!("WebSocket client connected");

    let forward_task = tokio::spawn(async move {
        loop {
            match records.recv().await {
                Ok(record) => {
                    if !params.matches(&record) {
                        trace!(record_id = %record.id, "Record filtered out");
                        continue;
                    }

                    match serde_json::to_string(&record) {
                        Ok(json) => {
                            if let Err(err) = sender.send(Message::Text(json.into())).await {
                                debug!(error = %err, "Failed to send record to WebSocket client");
                                break;
                            }
                        }
                        Err(err) => {
                            error!(error = %err, "Failed to serialize record");
                        }
                    }
                }
                Err(RecvError::Lagged(count)) => {
                    warn!(skipped = count, "WebSocket client lagged, skipped records");
                }
                Err(RecvError::Closed) => {
                    debug!("Hub closed");
                    break;
                }
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(error = %err, "WebSocket error");
                break;
            }
        }
    }

    forward_task.abort();
    info!("WebSocket client disconnected");
}

/// Response body for the health endpoint.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,

    /// Connected record observers (WebSocket clients).
    pub subscribers: usize,

    pub uptime_seconds: u64,
}

/// GET /health
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        subscribers: state.hub.observer_count(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}
