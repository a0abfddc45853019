//! Prometheus metrics for the bridge

use crate::error::{BridgeError, Result};
use crate::relay::RelayStats;
use crate::socks5::Reply;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use tracing::info;

/// Bridge metrics.
///
/// Every instance owns its own registry so that several servers can live
/// in one process.
#[derive(Clone)]
pub struct BridgeMetrics {
    /// Sessions opened, by transport
    pub sessions_total: IntCounterVec,

    /// Sessions currently registered, by transport
    pub sessions_active: IntGaugeVec,

    /// SOCKS5 replies sent, by reply code
    pub replies_total: IntCounterVec,

    /// Bytes relayed, by direction
    pub relay_bytes_total: IntCounterVec,

    /// Outbound connect latency
    pub connect_duration_seconds: HistogramVec,

    /// HTTP forwarding requests, by outcome
    pub forward_requests_total: IntCounterVec,

    registry: Registry,
}

impl BridgeMetrics {
    /// Create new metrics instance
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let sessions_total = IntCounterVec::new(
            Opts::new("bridge_sessions_total", "Total number of bridge sessions"),
            &["transport"],
        )?;

        let sessions_active = IntGaugeVec::new(
            Opts::new("bridge_sessions_active", "Number of live bridge sessions"),
            &["transport"],
        )?;

        let replies_total = IntCounterVec::new(
            Opts::new("bridge_replies_total", "SOCKS5 replies sent to clients"),
            &["code"],
        )?;

        let relay_bytes_total = IntCounterVec::new(
            Opts::new("bridge_relay_bytes_total", "Bytes relayed between channel and target"),
            &["direction"],
        )?;

        let connect_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "bridge_connect_duration_seconds",
                "Outbound connect duration in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
            &["result"],
        )?;

        let forward_requests_total = IntCounterVec::new(
            Opts::new("bridge_forward_requests_total", "HTTP forwarding requests"),
            &["status"],
        )?;

        registry.register(Box::new(sessions_total.clone()))?;
        registry.register(Box::new(sessions_active.clone()))?;
        registry.register(Box::new(replies_total.clone()))?;
        registry.register(Box::new(relay_bytes_total.clone()))?;
        registry.register(Box::new(connect_duration_seconds.clone()))?;
        registry.register(Box::new(forward_requests_total.clone()))?;

        info!("Bridge metrics initialized");

        Ok(Self {
            sessions_total,
            sessions_active,
            replies_total,
            relay_bytes_total,
            connect_duration_seconds,
            forward_requests_total,
            registry,
        })
    }

    pub fn record_session_opened(&self, transport: &str) {
        self.sessions_total.with_label_values(&[transport]).inc();
        self.sessions_active.with_label_values(&[transport]).inc();
    }

    pub fn record_session_closed(&self, transport: &str) {
        self.sessions_active.with_label_values(&[transport]).dec();
    }

    pub fn record_reply(&self, reply: Reply) {
        self.replies_total.with_label_values(&[reply.as_str()]).inc();
    }

    pub fn record_connect(&self, success: bool, duration_secs: f64) {
        let result = if success { "success" } else { "failed" };
        self.connect_duration_seconds
            .with_label_values(&[result])
            .observe(duration_secs);
    }

    pub fn record_relay(&self, stats: &RelayStats) {
        self.relay_bytes_total
            .with_label_values(&["upload"])
            .inc_by(stats.sent);
        self.relay_bytes_total
            .with_label_values(&["download"])
            .inc_by(stats.received);
    }

    pub fn record_forward(&self, status: &str) {
        self.forward_requests_total.with_label_values(&[status]).inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| BridgeError::Metrics(format!("Failed to encode metrics: {}", e)))
    }
}
