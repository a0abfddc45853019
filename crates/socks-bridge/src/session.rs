//! Per-connection SOCKS5 state machine
//!
//! A session walks `AwaitingGreeting -> AwaitingRequest -> Relaying ->
//! Closed`. The current phase alone decides how an inbound unit is parsed;
//! once relaying, every unit is payload, even one starting with 0x05.

use crate::channel::{MessageSink, MessageSource};
use crate::connector::ConnectedStream;
use crate::error::{DecodeError, Result};
use crate::manager::SessionManager;
use crate::registry::{Phase, SessionHandle, SessionId};
use crate::relay;
use crate::socks5::{
    decode_greeting, decode_request, encode_greeting_reply, encode_reply, AuthMethod, Command,
    ConnectRequest, Reply,
};
use bytes::{Bytes, BytesMut};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Bound address carried by failure replies
const UNSPECIFIED: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);

pub struct Session<K> {
    handle: SessionHandle,
    sink: K,
    manager: SessionManager,
    outbound: Option<ConnectedStream>,
    /// Units carry whole messages; see [`MessageSource::preserves_boundaries`]
    framed: bool,
    /// Start of a handshake message still waiting for its remaining bytes
    pending: BytesMut,
}

impl<K: MessageSink> Session<K> {
    pub fn new(handle: SessionHandle, sink: K, manager: SessionManager) -> Self {
        Self {
            handle,
            sink,
            manager,
            outbound: None,
            framed: true,
            pending: BytesMut::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.handle.id
    }

    pub fn phase(&self) -> Phase {
        self.handle.phase.get()
    }

    fn advance(&self, next: Phase) {
        let previous = self.handle.phase.advance(next);
        debug!("Phase {:?} -> {:?}", previous, self.phase());
    }

    /// Drive the session until it ends
    pub async fn run<S: MessageSource>(mut self, mut source: S) {
        let cancel = self.handle.cancel.clone();
        self.framed = source.preserves_boundaries();

        loop {
            match self.phase() {
                Phase::AwaitingGreeting | Phase::AwaitingRequest => {
                    let unit = tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!("Session cancelled during handshake");
                            break;
                        }
                        unit = source.recv() => unit,
                    };

                    match unit {
                        None => {
                            debug!("Channel closed during handshake");
                            break;
                        }
                        Some(Err(e)) => {
                            warn!("Channel error during handshake: {}", e);
                            break;
                        }
                        Some(Ok(unit)) => {
                            let unit = self.join_pending(unit);
                            if let Err(e) = self.handle_unit(unit).await {
                                warn!("Session failed: {}", e);
                                break;
                            }
                        }
                    }
                }
                Phase::Relaying => {
                    if let Some(outbound) = self.outbound.take() {
                        let buffer_size = self.manager.config().relay.buffer_size;
                        let target = outbound.peer_addr;
                        let stats = relay::bridge(
                            &mut source,
                            &mut self.sink,
                            outbound.stream,
                            &cancel,
                            buffer_size,
                        )
                        .await;

                        info!(
                            "Relay to {} finished ({}): {} bytes up, {} bytes down",
                            target, stats.end, stats.sent, stats.received
                        );
                        self.manager.metrics().record_relay(&stats);
                    }
                    break;
                }
                Phase::Closed => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    // The failure reply is out; keep the channel open until the client hangs up
                    self.evict();
                    let shutdown = self.manager.shutdown_token();
                    loop {
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            unit = source.recv() => match unit {
                                Some(Ok(unit)) => {
                                    debug!("Discarding {} bytes on closed session", unit.len());
                                }
                                _ => {
                                    debug!("Client left closed session");
                                    return;
                                }
                            },
                        }
                    }
                    break;
                }
            }
        }

        self.teardown().await;
    }

    /// Process one inbound unit in the handshake phases.
    ///
    /// Bytes left over after a complete message are fed to the next phase.
    async fn handle_unit(&mut self, unit: Bytes) -> Result<()> {
        let mut rest = unit;

        while !rest.is_empty() {
            if self.handle.cancel.is_cancelled() {
                return Ok(());
            }
            match self.phase() {
                Phase::AwaitingGreeting => match decode_greeting(&rest) {
                    Ok((greeting, consumed)) => {
                        debug!("Greeting offers methods {:?}", greeting.methods);
                        let reply = encode_greeting_reply(AuthMethod::NoAuth);
                        self.sink.send(Bytes::copy_from_slice(&reply)).await?;
                        self.advance(Phase::AwaitingRequest);
                        rest = rest.slice(consumed..);
                    }
                    Err(DecodeError::Truncated) if !self.framed => {
                        self.wait_for_more(&rest);
                        return Ok(());
                    }
                    Err(e) => {
                        warn!("Dropping malformed greeting ({} bytes): {}", rest.len(), e);
                        return Ok(());
                    }
                },
                Phase::AwaitingRequest => match decode_request(&rest) {
                    Ok((request, consumed)) => {
                        rest = rest.slice(consumed..);
                        self.handle_request(request).await?;
                    }
                    Err(DecodeError::Truncated) if !self.framed => {
                        self.wait_for_more(&rest);
                        return Ok(());
                    }
                    Err(e) => {
                        warn!("Rejecting malformed request: {}", e);
                        let reply = match e {
                            DecodeError::UnsupportedAddressType(_) => Reply::AddressTypeNotSupported,
                            DecodeError::UnsupportedVersion(_) | DecodeError::Truncated => {
                                Reply::GeneralFailure
                            }
                        };
                        self.send_reply(reply, UNSPECIFIED).await?;
                        self.advance(Phase::Closed);
                        return Ok(());
                    }
                },
                Phase::Relaying => {
                    if let Some(outbound) = self.outbound.as_mut() {
                        outbound.stream.write_all(&rest).await?;
                    }
                    return Ok(());
                }
                Phase::Closed => return Ok(()),
            }
        }

        Ok(())
    }

    fn join_pending(&mut self, unit: Bytes) -> Bytes {
        if self.pending.is_empty() {
            return unit;
        }
        self.pending.extend_from_slice(&unit);
        self.pending.split().freeze()
    }

    fn wait_for_more(&mut self, partial: &[u8]) {
        debug!("Buffering {} bytes of an incomplete message", partial.len());
        self.pending.extend_from_slice(partial);
    }

    async fn handle_request(&mut self, request: ConnectRequest) -> Result<()> {
        if request.command != Command::Connect {
            warn!(
                "Unsupported command {:?} for {}",
                request.command,
                request.target()
            );
            return self.send_reply(Reply::CommandNotSupported, UNSPECIFIED).await;
        }

        info!("CONNECT {}", request.target());

        let started = Instant::now();
        let cancel = self.handle.cancel.clone();
        let host = request.host();
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Session cancelled while connecting to {}", request.target());
                return Ok(());
            }
            result = self.manager.connector().connect(&host, request.port) => result,
        };
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(outbound) => {
                self.manager.metrics().record_connect(true, elapsed);
                let bound = outbound.local_addr;
                self.outbound = Some(outbound);
                self.advance(Phase::Relaying);
                self.send_reply(Reply::Success, bound).await
            }
            Err(e) => {
                warn!("CONNECT {} failed: {}", request.target(), e);
                self.manager.metrics().record_connect(false, elapsed);
                let reply = self.manager.connector().reply_for(&e);
                self.send_reply(reply, UNSPECIFIED).await?;
                self.advance(Phase::Closed);
                Ok(())
            }
        }
    }

    async fn send_reply(&mut self, reply: Reply, bound: SocketAddr) -> Result<()> {
        let frame = encode_reply(reply, bound.ip(), bound.port());
        self.sink.send(Bytes::from(frame)).await?;
        self.manager.metrics().record_reply(reply);
        Ok(())
    }

    fn evict(&self) {
        if self.manager.registry().remove(&self.handle.id) {
            debug!("Session evicted");
        }
    }

    async fn teardown(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            drop(outbound.stream);
        }
        if let Err(e) = self.sink.close().await {
            debug!("Channel close failed: {}", e);
        }
        self.advance(Phase::Closed);
        self.evict();
    }
}
