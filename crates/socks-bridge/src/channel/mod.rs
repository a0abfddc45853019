//! Message channel abstraction
//!
//! The session core never sees a byte stream on the client side: it reads
//! discrete binary units from a [`MessageSource`] and writes discrete units
//! to a [`MessageSink`]. Each transport only has to provide the two halves.

pub mod memory;
pub mod tcp;
pub mod websocket;

use crate::error::ChannelError;
use async_trait::async_trait;
use bytes::Bytes;

/// Inbound half of a message channel
#[async_trait]
pub trait MessageSource: Send {
    /// Next inbound unit, or `None` once the peer has closed the channel
    async fn recv(&mut self) -> Option<Result<Bytes, ChannelError>>;

    /// Whether each unit holds whole messages. Byte-stream transports return
    /// `false`, and a message cut short is completed from the next units.
    fn preserves_boundaries(&self) -> bool {
        true
    }
}

/// Outbound half of a message channel
#[async_trait]
pub trait MessageSink: Send {
    /// Send one unit
    async fn send(&mut self, frame: Bytes) -> Result<(), ChannelError>;

    /// Close the channel. Closing an already closed channel is a no-op.
    async fn close(&mut self) -> Result<(), ChannelError>;
}
