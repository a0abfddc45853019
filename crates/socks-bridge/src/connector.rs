//! Outbound TCP dialing for CONNECT requests

use crate::config::ConnectorConfig;
use crate::error::ConnectError;
use crate::socks5::Reply;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// An established outbound connection
#[derive(Debug)]
pub struct ConnectedStream {
    pub stream: TcpStream,
    /// Locally bound address, reported in the success reply
    pub local_addr: SocketAddr,
    pub peer_addr: SocketAddr,
}

/// Opens outbound connections with a single attempt per request
#[derive(Debug, Clone)]
pub struct Connector {
    timeout: Duration,
    nodelay: bool,
    detailed_replies: bool,
}

impl Connector {
    pub fn new(config: &ConnectorConfig) -> Self {
        Self {
            timeout: config.connect_timeout,
            nodelay: config.nodelay,
            detailed_replies: config.detailed_replies,
        }
    }

    /// Connect to `host:port` within the configured timeout
    pub async fn connect(&self, host: &str, port: u16) -> Result<ConnectedStream, ConnectError> {
        let target = format!("{}:{}", host, port);

        let stream = tokio::time::timeout(self.timeout, self.dial(host, port, &target))
            .await
            .map_err(|_| ConnectError::Timeout(target.clone()))??;

        if self.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                debug!("Failed to set TCP_NODELAY for {}: {}", target, e);
            }
        }

        let local_addr = stream
            .local_addr()
            .map_err(|e| ConnectError::Unreachable {
                target: target.clone(),
                source: e,
            })?;
        let peer_addr = stream
            .peer_addr()
            .map_err(|e| ConnectError::Unreachable {
                target: target.clone(),
                source: e,
            })?;

        debug!("Connected to {} ({}) from {}", target, peer_addr, local_addr);

        Ok(ConnectedStream {
            stream,
            local_addr,
            peer_addr,
        })
    }

    async fn dial(&self, host: &str, port: u16, target: &str) -> Result<TcpStream, ConnectError> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| ConnectError::ResolutionFailed {
                host: host.to_string(),
                reason: e.to_string(),
            })?
            .collect();

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(classify(target, e)),
            None => Err(ConnectError::ResolutionFailed {
                host: host.to_string(),
                reason: "no addresses returned".to_string(),
            }),
        }
    }

    /// Reply code sent to the client for a failed dial.
    ///
    /// Unless detailed replies are enabled every failure is reported as
    /// "connection refused".
    pub fn reply_for(&self, error: &ConnectError) -> Reply {
        if !self.detailed_replies {
            return Reply::ConnectionRefused;
        }
        match error {
            ConnectError::Refused(_) => Reply::ConnectionRefused,
            ConnectError::Timeout(_) => Reply::TtlExpired,
            ConnectError::ResolutionFailed { .. } | ConnectError::Unreachable { .. } => {
                Reply::HostUnreachable
            }
        }
    }
}

fn classify(target: &str, error: io::Error) -> ConnectError {
    match error.kind() {
        io::ErrorKind::ConnectionRefused => ConnectError::Refused(target.to_string()),
        io::ErrorKind::TimedOut => ConnectError::Timeout(target.to_string()),
        _ => ConnectError::Unreachable {
            target: target.to_string(),
            source: error,
        },
    }
}
