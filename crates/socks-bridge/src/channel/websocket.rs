//! WebSocket message channel (axum)

use super::{MessageSink, MessageSource};
use crate::error::ChannelError;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::debug;

/// Split an upgraded socket into the halves the session consumes
pub fn split(socket: WebSocket) -> (WebSocketSource, WebSocketSink) {
    let (sink, stream) = socket.split();
    (
        WebSocketSource { inner: stream },
        WebSocketSink {
            inner: sink,
            closed: false,
        },
    )
}

pub struct WebSocketSource {
    inner: SplitStream<WebSocket>,
}

pub struct WebSocketSink {
    inner: SplitSink<WebSocket, Message>,
    closed: bool,
}

#[async_trait]
impl MessageSource for WebSocketSource {
    async fn recv(&mut self) -> Option<Result<Bytes, ChannelError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Binary(data)) => return Some(Ok(Bytes::from(data))),
                // Text frames carry the same bytes, clients are not consistent about it
                Ok(Message::Text(text)) => return Some(Ok(Bytes::from(text.into_bytes()))),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Ok(Message::Close(frame)) => {
                    debug!("WebSocket close frame received: {:?}", frame);
                    return None;
                }
                Err(e) => return Some(Err(ChannelError::ReadFailed(e.to_string()))),
            }
        }
    }
}

#[async_trait]
impl MessageSink for WebSocketSink {
    async fn send(&mut self, frame: Bytes) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.inner
            .send(Message::Binary(frame.to_vec()))
            .await
            .map_err(|e| ChannelError::WriteFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner
            .close()
            .await
            .map_err(|e| ChannelError::WriteFailed(e.to_string()))
    }
}
