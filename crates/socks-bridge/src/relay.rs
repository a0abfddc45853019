//! Relay between a message channel and an outbound TCP stream
//!
//! Two one-directional pumps run concurrently. The first one to finish, or
//! the session's cancel token, ends the relay; the caller then tears the
//! session down.

use crate::channel::{MessageSink, MessageSource};
use crate::error::ChannelError;
use bytes::Bytes;
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Why a relay stopped
#[derive(Debug)]
pub enum RelayEnd {
    /// The client closed the message channel
    ChannelClosed,
    ChannelFailed(ChannelError),
    /// The target closed its side of the connection
    RemoteClosed,
    SocketFailed(io::Error),
    Cancelled,
}

impl fmt::Display for RelayEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelClosed => write!(f, "channel closed"),
            Self::ChannelFailed(e) => write!(f, "channel failed: {}", e),
            Self::RemoteClosed => write!(f, "remote closed"),
            Self::SocketFailed(e) => write!(f, "socket failed: {}", e),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of a finished relay
#[derive(Debug)]
pub struct RelayStats {
    /// Bytes written from the channel to the target
    pub sent: u64,
    /// Bytes read from the target and sent on the channel
    pub received: u64,
    pub end: RelayEnd,
}

/// Pump bytes in both directions until either side stops.
///
/// The outbound stream is shut down and dropped before returning. Closing
/// the channel is left to the caller.
pub async fn bridge<S, K>(
    source: &mut S,
    sink: &mut K,
    stream: TcpStream,
    cancel: &CancellationToken,
    buffer_size: usize,
) -> RelayStats
where
    S: MessageSource,
    K: MessageSink,
{
    let (mut reader, mut writer) = stream.into_split();
    let mut sent = 0u64;
    let mut received = 0u64;

    let end = tokio::select! {
        end = channel_to_socket(source, &mut writer, &mut sent) => end,
        end = socket_to_channel(&mut reader, sink, buffer_size, &mut received) => end,
        _ = cancel.cancelled() => RelayEnd::Cancelled,
    };

    if let Err(e) = writer.shutdown().await {
        debug!("Outbound shutdown failed: {}", e);
    }

    RelayStats {
        sent,
        received,
        end,
    }
}

/// Write every inbound unit verbatim to the target
pub async fn channel_to_socket<S, W>(source: &mut S, writer: &mut W, sent: &mut u64) -> RelayEnd
where
    S: MessageSource,
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = match source.recv().await {
            None => return RelayEnd::ChannelClosed,
            Some(Err(e)) => return RelayEnd::ChannelFailed(e),
            Some(Ok(frame)) => frame,
        };

        if let Err(e) = writer.write_all(&frame).await {
            return RelayEnd::SocketFailed(e);
        }
        if let Err(e) = writer.flush().await {
            return RelayEnd::SocketFailed(e);
        }

        *sent += frame.len() as u64;
    }
}

/// Send every chunk read from the target as one unit
pub async fn socket_to_channel<R, K>(
    reader: &mut R,
    sink: &mut K,
    buffer_size: usize,
    received: &mut u64,
) -> RelayEnd
where
    R: AsyncRead + Unpin,
    K: MessageSink,
{
    let mut buffer = vec![0u8; buffer_size];

    loop {
        let n = match reader.read(&mut buffer).await {
            Ok(0) => return RelayEnd::RemoteClosed,
            Ok(n) => n,
            Err(e) => return RelayEnd::SocketFailed(e),
        };

        if let Err(e) = sink.send(Bytes::copy_from_slice(&buffer[..n])).await {
            return RelayEnd::ChannelFailed(e);
        }

        *received += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::memory;
    use tokio::net::TcpListener;

    async fn stream_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_pumps_preserve_bytes_and_order() {
        let (outbound, mut target) = stream_pair().await;
        let (mut source, mut sink, mut peer) = memory::pair(16);
        let cancel = CancellationToken::new();

        let relay = tokio::spawn(async move {
            bridge(&mut source, &mut sink, outbound, &cancel, 4).await
        });

        peer.send(&b"hello "[..]).await.unwrap();
        peer.send(&b"world"[..]).await.unwrap();
        let mut upstream = [0u8; 11];
        target.read_exact(&mut upstream).await.unwrap();
        assert_eq!(&upstream, b"hello world");

        target.write_all(b"0123456789").await.unwrap();
        let mut downstream = Vec::new();
        while downstream.len() < 10 {
            let frame = peer.recv().await.unwrap();
            assert!(frame.len() <= 4);
            downstream.extend_from_slice(&frame);
        }
        assert_eq!(downstream, b"0123456789");

        drop(target);
        let stats = relay.await.unwrap();
        assert!(matches!(stats.end, RelayEnd::RemoteClosed));
        assert_eq!(stats.sent, 11);
        assert_eq!(stats.received, 10);
    }

    #[tokio::test]
    async fn test_channel_close_ends_relay_and_closes_target() {
        let (outbound, mut target) = stream_pair().await;
        let (mut source, mut sink, mut peer) = memory::pair(16);
        let cancel = CancellationToken::new();

        let relay = tokio::spawn(async move {
            bridge(&mut source, &mut sink, outbound, &cancel, 1024).await
        });

        peer.close();
        let stats = relay.await.unwrap();
        assert!(matches!(stats.end, RelayEnd::ChannelClosed));

        let mut rest = Vec::new();
        assert_eq!(target.read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_unblocks_both_pumps() {
        let (outbound, _target) = stream_pair().await;
        let (mut source, mut sink, _peer) = memory::pair(16);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let relay = tokio::spawn(async move {
            bridge(&mut source, &mut sink, outbound, &cancel, 1024).await
        });

        trigger.cancel();
        let stats = relay.await.unwrap();
        assert!(matches!(stats.end, RelayEnd::Cancelled));
        assert_eq!(stats.sent + stats.received, 0);
    }
}
