//! IPC transport implementations

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::trace;

use crate::codec;
use crate::error::IpcError;

/// Request/response channel carrying one payload at a time
#[async_trait]
pub trait IpcTransport: Send {
    /// Send a payload to the other end
    async fn send(&mut self, payload: &str) -> Result<(), IpcError>;

    /// Receive the next payload, `None` once the other end has closed
    async fn receive(&mut self) -> Result<Option<String>, IpcError>;

    /// Close the transport
    async fn close(&mut self) -> Result<(), IpcError>;
}

/// Framed transport over any byte stream, TCP in production
pub struct SocketTransport<S> {
    stream: S,
    idle_timeout: Option<Duration>,
}

impl<S> SocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            idle_timeout: None,
        }
    }

    /// Fail receives with [`IpcError::Timeout`] when no packet arrives within
    /// `idle_timeout`
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl SocketTransport<TcpStream> {
    /// Connect to a worker listening on the loopback interface
    pub async fn connect(port: u16) -> Result<Self, IpcError> {
        let stream = TcpStream::connect(("127.0.0.1", port)).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

#[async_trait]
impl<S> IpcTransport for SocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, payload: &str) -> Result<(), IpcError> {
        trace!("Sending {} byte payload", payload.len());
        codec::write_message(&mut self.stream, payload).await
    }

    async fn receive(&mut self) -> Result<Option<String>, IpcError> {
        let payload = codec::read_message(&mut self.stream, self.idle_timeout).await?;
        trace!(
            "Received {} byte payload",
            payload.as_ref().map_or(0, String::len)
        );
        Ok(payload)
    }

    async fn close(&mut self) -> Result<(), IpcError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_request_response_over_tcp() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut transport = SocketTransport::new(stream);
            while let Some(request) = transport.receive().await.unwrap() {
                transport.send(&request.to_uppercase()).await.unwrap();
            }
        });

        let mut client = SocketTransport::connect(port).await.unwrap();
        client.send("ping").await.unwrap();
        assert_eq!(client.receive().await.unwrap().as_deref(), Some("PING"));
        client.send("pong").await.unwrap();
        assert_eq!(client.receive().await.unwrap().as_deref(), Some("PONG"));

        client.close().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_applies_to_receive() {
        let (_client, server) = tokio::io::duplex(codec::PACKET_SIZE);
        let mut transport =
            SocketTransport::new(server).with_idle_timeout(Some(Duration::from_secs(1)));

        assert!(matches!(transport.receive().await, Err(IpcError::Timeout)));
    }
}
