//! `HubServer` — Axum HTTP + WebSocket front end for the hub actor.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use agora_core::ClientId;

use crate::config::HubConfig;
use crate::connection::HubConnection;
use crate::health::{self, HealthResponse};
use crate::hub::HubHandle;
use crate::metrics::{self as hub_metrics, HUB_REJECTED_UPGRADES_TOTAL};
use crate::session::run_socket_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handle into the hub actor.
    pub hub: HubHandle,
    /// Server configuration.
    pub config: Arc<HubConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Rendered by `/metrics` when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The hub's HTTP front end.
pub struct HubServer {
    config: Arc<HubConfig>,
    hub: HubHandle,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

/// A bound, running server.
pub struct RunningServer {
    /// Actual bound address (useful with port `0`).
    pub addr: SocketAddr,
    /// The serve task; completes after graceful shutdown.
    pub handle: JoinHandle<()>,
}

impl HubServer {
    /// Create a server fronting the given hub.
    #[must_use]
    pub fn new(config: HubConfig, hub: HubHandle) -> Self {
        Self {
            config: Arc::new(config),
            hub,
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Attach a Prometheus handle so `/metrics` renders the recorder.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            config: Arc::clone(&self.config),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and start serving.
    ///
    /// The listener stops accepting when `token` is cancelled; in-flight
    /// sessions are torn down by the hub.
    ///
    /// # Errors
    ///
    /// Fails when the address cannot be bound.
    pub async fn start(self, token: CancellationToken) -> std::io::Result<RunningServer> {
        let bind = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&bind).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "hub listening");

        let app = self.router();
        let handle = tokio::spawn(async move {
            let shutdown = async move { token.cancelled().await };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!(error = %e, "server exited with error");
            }
        });

        Ok(RunningServer { addr, handle })
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.hub.stats();
    Json(health::health_check(
        state.start_time,
        stats.connections(),
        stats.rooms(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => hub_metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// GET /ws?identity=<id> — WebSocket upgrade.
///
/// An upgrade without a non-empty `identity` query parameter is rejected
/// with 400 before the handshake completes.
async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let identity = match params.get("identity").map(String::as_str) {
        Some(id) if !id.is_empty() => ClientId::from(id),
        _ => {
            counter!(HUB_REJECTED_UPGRADES_TOTAL).increment(1);
            warn!("upgrade rejected: missing identity");
            return (StatusCode::BAD_REQUEST, "identity query parameter required")
                .into_response();
        }
    };

    let (tx, rx) = mpsc::channel(state.config.outbound_queue_depth);
    let conn = Arc::new(HubConnection::new(identity, tx));
    let hub = state.hub.clone();
    let ping_interval = Duration::from_secs(state.config.ping_interval_secs);
    let max_message_size = state.config.max_message_size;

    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| run_socket_session(socket, conn, rx, hub, ping_interval))
}
