//! HTTP front-end: the SOCKS5 WebSocket endpoint, health, metrics and the
//! forwarding routes, plus the optional raw TCP SOCKS5 listener

use crate::{
    channel::{tcp, websocket},
    config::BridgeConfig,
    error::Result,
    forward::{parse_body, ForwardQuery, ForwardRejection, HttpForwarder},
    manager::SessionManager,
    metrics::BridgeMetrics,
};
use axum::{
    body::Bytes,
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn};

const PROXY_PATH: &str = "/api/proxy";
const UNIVERSAL_PROXY_PATH: &str = "/api/universal-proxy";

#[derive(Clone)]
struct AppState {
    manager: SessionManager,
    forwarder: Option<HttpForwarder>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    active_sessions: usize,
}

/// Bridge server
pub struct BridgeServer {
    manager: SessionManager,
    forwarder: Option<HttpForwarder>,
}

impl BridgeServer {
    /// Create a new bridge server instance
    pub fn new(config: BridgeConfig) -> Result<Self> {
        let metrics = BridgeMetrics::new()?;
        let forwarder = if config.forward.enabled {
            Some(HttpForwarder::new(&config.forward, metrics.clone())?)
        } else {
            None
        };
        let manager = SessionManager::new(config, metrics)?;

        Ok(Self { manager, forwarder })
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Get server metrics
    pub fn metrics(&self) -> &BridgeMetrics {
        self.manager.metrics()
    }

    /// Build the HTTP router
    pub fn router(&self) -> Router {
        let config = self.manager.config();
        let state = AppState {
            manager: self.manager.clone(),
            forwarder: self.forwarder.clone(),
        };

        let mut app = Router::new()
            .route(&config.ws_path, get(socks5_handler))
            .route("/health", get(health_check));

        if config.metrics.enabled {
            app = app.route("/metrics", get(metrics_handler));
        }

        if state.forwarder.is_some() {
            app = app
                .route(PROXY_PATH, post(proxy_handler).fallback(method_not_allowed))
                .route(
                    UNIVERSAL_PROXY_PATH,
                    get(universal_get_handler)
                        .post(proxy_handler)
                        .fallback(universal_usage),
                );
        }

        app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
    }

    /// Serve on already bound listeners until `shutdown` is cancelled.
    ///
    /// Cancelling stops both listeners and tears down every live session.
    pub async fn serve(
        self,
        listener: TcpListener,
        tcp_listener: Option<TcpListener>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let app = self.router();
        let manager = self.manager.clone();

        info!(
            "SOCKS5 WebSocket endpoint on ws://{}{}",
            listener.local_addr()?,
            manager.config().ws_path
        );

        let tcp_task = match tcp_listener {
            Some(tcp_listener) => {
                info!("Raw SOCKS5 listener on {}", tcp_listener.local_addr()?);
                Some(tokio::spawn(accept_tcp(tcp_listener, manager.clone())))
            }
            None => None,
        };

        let drain = manager.clone();
        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            drain.shutdown();
        })
        .await;

        // The HTTP side may also stop on its own error
        manager.shutdown();
        if let Some(task) = tcp_task {
            if let Err(e) = task.await {
                error!("TCP listener task failed: {}", e);
            }
        }

        served?;
        info!("Bridge server stopped");
        Ok(())
    }

    /// Bind the configured addresses and serve until interrupted
    pub async fn start(self) -> Result<()> {
        let config = self.manager.config();
        let listener = TcpListener::bind(config.bind_address()).await?;
        let tcp_listener = match config.tcp_bind_address()? {
            Some(addr) => Some(TcpListener::bind(addr).await?),
            None => None,
        };

        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            trigger.cancel();
        });

        self.serve(listener, tcp_listener, shutdown).await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn accept_tcp(listener: TcpListener, manager: SessionManager) {
    let shutdown = manager.shutdown_token();

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept TCP client: {}", e);
                    continue;
                }
            },
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        let manager = manager.clone();
        tokio::spawn(async move {
            let buffer_size = manager.config().relay.buffer_size;
            let (source, sink) = tcp::split(stream, buffer_size);
            manager.run_session(peer.to_string(), "tcp", source, sink).await;
        });
    }

    debug!("TCP listener stopped");
}

async fn socks5_handler(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    upgrade: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let peer = connect_info
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match upgrade {
        Ok(upgrade) => upgrade.on_upgrade(move |socket| async move {
            let (source, sink) = websocket::split(socket);
            state
                .manager
                .run_session(peer, "websocket", source, sink)
                .await;
        }),
        Err(rejection) => {
            debug!("Plain request on SOCKS5 endpoint from {}: {}", peer, rejection);
            Json(json!({
                "message": "SOCKS5 WebSocket proxy server",
                "note": "Connect with a WebSocket client to tunnel SOCKS5 traffic",
            }))
            .into_response()
        }
    }
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_sessions: state.manager.registry().len(),
    })
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.manager.metrics().export() {
        Ok(metrics) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            metrics,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            format!("Error exporting metrics: {}", e),
        ),
    }
}

async fn proxy_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(forwarder) = state.forwarder else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match parse_body(&body) {
        Ok(request) => forwarder.forward(request).await,
        Err(rejection) => {
            forwarder.reject(&rejection);
            rejection.into_response()
        }
    }
}

async fn universal_get_handler(
    State(state): State<AppState>,
    Query(query): Query<ForwardQuery>,
) -> Response {
    let Some(forwarder) = state.forwarder else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match query.into_request() {
        Ok(request) => forwarder.forward(request).await,
        Err(rejection) => {
            forwarder.reject(&rejection);
            rejection.into_response()
        }
    }
}

async fn method_not_allowed() -> ForwardRejection {
    ForwardRejection::method_not_allowed()
}

async fn universal_usage() -> ForwardRejection {
    ForwardRejection::usage(UNIVERSAL_PROXY_PATH)
}
