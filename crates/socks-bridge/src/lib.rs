//! SOCKS5 over WebSocket bridge
//!
//! Terminates SOCKS5 on a message-framed channel (a WebSocket, a raw TCP
//! client or an in-process pair) and relays the payload to an arbitrary TCP
//! destination. The HTTP front-end also exposes a plain request forwarder,
//! a health check and Prometheus metrics.

pub mod channel;
pub mod config;
pub mod connector;
pub mod error;
pub mod forward;
pub mod manager;
pub mod metrics;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
pub mod socks5;

pub use config::BridgeConfig;
pub use error::{BridgeError, ChannelError, ConnectError, DecodeError, Result};
pub use manager::SessionManager;
pub use metrics::BridgeMetrics;
pub use registry::{Phase, SessionId, SessionRegistry};
pub use relay::RelayStats;
pub use server::BridgeServer;
