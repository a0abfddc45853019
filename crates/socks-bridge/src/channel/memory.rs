//! In-process message channel
//!
//! Used to embed the bridge behind a transport that is not a socket, and by
//! the tests to drive sessions frame by frame.

use super::{MessageSink, MessageSource};
use crate::error::ChannelError;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Create a channel. The source/sink pair is handed to the session, the
/// [`MemoryPeer`] plays the client.
pub fn pair(capacity: usize) -> (MemorySource, MemorySink, MemoryPeer) {
    let (client_tx, server_rx) = mpsc::channel(capacity);
    let (server_tx, client_rx) = mpsc::channel(capacity);

    (
        MemorySource { rx: server_rx },
        MemorySink { tx: Some(server_tx) },
        MemoryPeer {
            tx: Some(client_tx),
            rx: client_rx,
        },
    )
}

pub struct MemorySource {
    rx: mpsc::Receiver<Bytes>,
}

pub struct MemorySink {
    tx: Option<mpsc::Sender<Bytes>>,
}

/// Client end of a memory channel
pub struct MemoryPeer {
    tx: Option<mpsc::Sender<Bytes>>,
    rx: mpsc::Receiver<Bytes>,
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn recv(&mut self) -> Option<Result<Bytes, ChannelError>> {
        self.rx.recv().await.map(Ok)
    }
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn send(&mut self, frame: Bytes) -> Result<(), ChannelError> {
        let tx = self.tx.as_ref().ok_or(ChannelError::Closed)?;
        tx.send(frame).await.map_err(|_| ChannelError::Closed)
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.tx.take();
        Ok(())
    }
}

impl MemoryPeer {
    /// Send a unit to the session
    pub async fn send(&self, frame: impl Into<Bytes>) -> Result<(), ChannelError> {
        let tx = self.tx.as_ref().ok_or(ChannelError::Closed)?;
        tx.send(frame.into()).await.map_err(|_| ChannelError::Closed)
    }

    /// Next unit from the session, `None` once the session closed the channel
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Hang up the client side; the session sees end of stream
    pub fn close(&mut self) {
        self.tx.take();
    }
}
