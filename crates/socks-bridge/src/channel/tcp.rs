//! Raw TCP SOCKS5 clients seen as a message channel
//!
//! Every successful read becomes one unit. A single read may carry more than
//! one SOCKS5 message, or only part of one; the session hands any remainder
//! on to the next phase and buffers incomplete messages.

use super::{MessageSink, MessageSource};
use crate::error::ChannelError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

pub fn split(stream: TcpStream, buffer_size: usize) -> (TcpSource, TcpSink) {
    let (reader, writer) = stream.into_split();
    (
        TcpSource {
            inner: reader,
            buffer_size,
        },
        TcpSink {
            inner: writer,
            closed: false,
        },
    )
}

pub struct TcpSource {
    inner: OwnedReadHalf,
    buffer_size: usize,
}

pub struct TcpSink {
    inner: OwnedWriteHalf,
    closed: bool,
}

#[async_trait]
impl MessageSource for TcpSource {
    async fn recv(&mut self) -> Option<Result<Bytes, ChannelError>> {
        let mut buf = BytesMut::with_capacity(self.buffer_size);
        match self.inner.read_buf(&mut buf).await {
            Ok(0) => None,
            Ok(_) => Some(Ok(buf.freeze())),
            Err(e) => Some(Err(ChannelError::ReadFailed(e.to_string()))),
        }
    }

    fn preserves_boundaries(&self) -> bool {
        false
    }
}

#[async_trait]
impl MessageSink for TcpSink {
    async fn send(&mut self, frame: Bytes) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.inner
            .write_all(&frame)
            .await
            .map_err(|e| ChannelError::WriteFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner
            .shutdown()
            .await
            .map_err(|e| ChannelError::WriteFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_reads_become_units_and_close_shuts_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let (mut source, mut sink) = split(server, 1024);

        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let unit = source.recv().await.unwrap().unwrap();
        assert_eq!(&unit[..], &[0x05, 0x01, 0x00]);

        sink.send(Bytes::from_static(&[0x05, 0x00])).await.unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00]);

        sink.close().await.unwrap();
        sink.close().await.unwrap();
        let mut rest = Vec::new();
        assert_eq!(client.read_to_end(&mut rest).await.unwrap(), 0);

        drop(client);
        assert!(source.recv().await.is_none());
    }
}
