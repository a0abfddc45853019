//! Session manager: owns the connector, the registry and the metrics, and
//! runs sessions on whatever transport hands it a channel

use crate::{
    channel::{MessageSink, MessageSource},
    config::BridgeConfig,
    connector::Connector,
    error::Result,
    metrics::BridgeMetrics,
    registry::SessionRegistry,
    session::Session,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

/// Central manager for bridge sessions
#[derive(Clone)]
pub struct SessionManager {
    config: Arc<BridgeConfig>,
    connector: Connector,
    registry: Arc<SessionRegistry>,
    metrics: BridgeMetrics,
    shutdown_signal: CancellationToken,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(config: BridgeConfig, metrics: BridgeMetrics) -> Result<Self> {
        config.validate()?;

        let connector = Connector::new(&config.connector);
        let registry = Arc::new(SessionRegistry::new(metrics.clone()));

        Ok(Self {
            config: Arc::new(config),
            connector,
            registry,
            metrics,
            shutdown_signal: CancellationToken::new(),
        })
    }

    /// Run a session over an already open channel until it ends
    pub async fn run_session<S, K>(
        &self,
        peer: impl Into<String>,
        transport: &'static str,
        source: S,
        mut sink: K,
    ) where
        S: MessageSource,
        K: MessageSink,
    {
        let peer = peer.into();

        if self.is_shutting_down() {
            debug!("Refusing {} session from {} during shutdown", transport, peer);
            if let Err(e) = sink.close().await {
                debug!("Channel close failed: {}", e);
            }
            return;
        }

        let handle = self.registry.register(peer.clone(), transport);
        let span = info_span!("session", id = %handle.id, %peer, transport);

        async move {
            info!("Session opened");
            Session::new(handle, sink, self.clone()).run(source).await;
            info!("Session closed");
        }
        .instrument(span)
        .await
    }

    /// Get configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Get metrics
    pub fn metrics(&self) -> &BridgeMetrics {
        &self.metrics
    }

    /// Token cancelled once shutdown starts
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_signal.clone()
    }

    /// Check if shutdown is requested
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_signal.is_cancelled()
    }

    /// Stop accepting sessions and tear down every live one
    pub fn shutdown(&self) -> usize {
        info!("Shutting down session manager");
        self.shutdown_signal.cancel();
        let closed = self.registry.shutdown();
        info!("Cancelled {} live sessions", closed);
        closed
    }
}
