//! Stream adapters: a passive output client, an accept-one-at-a-time
//! listener, and an actively-reconnecting input client.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::{Publisher, READ_CHUNK_SIZE};
use crate::endpoint::bind_host;
use crate::observability::events;

pub const DEFAULT_RETRY_LIMIT: u32 = 5;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Passive stream output client: connects once, then streams writes.
pub struct TcpClient {
    stream: Mutex<TcpStream>,
}

impl TcpClient {
    pub async fn connect(host: &str, port: u16) -> std::io::Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self {
            stream: Mutex::new(stream),
        })
    }
}

#[async_trait]
impl Publisher for TcpClient {
    async fn publish(&self, payload: &[u8], _topic: Option<&str>) -> std::io::Result<()> {
        let mut stream = self.stream.lock().await;
        stream.write_all(payload).await?;
        stream.flush().await
    }
}

/// Stream listener that accepts one connection at a time and yields
/// fixed-size reads; on peer close it returns to accepting.
pub struct TcpServer {
    listener: TcpListener,
    connection: Option<TcpStream>,
}

impl TcpServer {
    pub async fn bind(host: &str, port: u16) -> std::io::Result<Self> {
        let listener = TcpListener::bind((bind_host(host), port)).await?;
        Ok(Self {
            listener,
            connection: None,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Next chunk from the current peer, accepting a new one as needed.
    pub async fn recv(&mut self) -> std::io::Result<Vec<u8>> {
        loop {
            let stream = match self.connection.as_mut() {
                Some(stream) => stream,
                None => {
                    let (stream, peer) = self.listener.accept().await?;
                    info!(peer = %peer, "tcp peer connected");
                    self.connection.insert(stream)
                }
            };

            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            match stream.read(&mut buf).await {
                Ok(0) => {
                    info!("tcp peer closed; returning to accept");
                    self.connection = None;
                }
                Ok(len) => {
                    buf.truncate(len);
                    return Ok(buf);
                }
                Err(err) => {
                    warn!(err = %err, "tcp read failed; returning to accept");
                    self.connection = None;
                }
            }
        }
    }
}

/// Initiating stream-input client that reconnects on read failure or empty
/// read. Each successful connection resets the retry budget; exhausting it
/// is a fatal connectivity error for the owning component.
pub struct TcpReconnectClient {
    host: String,
    port: u16,
    retry_limit: u32,
    backoff: Duration,
    connection: Option<TcpStream>,
}

impl TcpReconnectClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_retry_policy(host, port, DEFAULT_RETRY_LIMIT, DEFAULT_RETRY_BACKOFF)
    }

    pub fn with_retry_policy(host: &str, port: u16, retry_limit: u32, backoff: Duration) -> Self {
        Self {
            host: host.to_string(),
            port,
            // At least one connect attempt is always made.
            retry_limit: retry_limit.max(1),
            backoff,
            connection: None,
        }
    }

    /// Next chunk from the connection, reconnecting as needed.
    pub async fn recv(&mut self) -> std::io::Result<Vec<u8>> {
        loop {
            if self.connection.is_none() {
                self.reconnect().await?;
            }
            let Some(stream) = self.connection.as_mut() else {
                continue;
            };

            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            match stream.read(&mut buf).await {
                Ok(0) => {
                    info!(host = %self.host, port = self.port, "peer closed; reconnecting");
                    self.connection = None;
                }
                Ok(len) => {
                    buf.truncate(len);
                    return Ok(buf);
                }
                Err(err) => {
                    warn!(host = %self.host, port = self.port, err = %err, "read failed; reconnecting");
                    self.connection = None;
                }
            }
        }
    }

    async fn reconnect(&mut self) -> std::io::Result<()> {
        let mut remaining = self.retry_limit;
        loop {
            match TcpStream::connect((self.host.as_str(), self.port)).await {
                Ok(stream) => {
                    info!(host = %self.host, port = self.port, "connected");
                    self.connection = Some(stream);
                    return Ok(());
                }
                Err(err) => {
                    remaining -= 1;
                    warn!(
                        event = events::RECONNECT_ATTEMPT,
                        host = %self.host,
                        port = self.port,
                        remaining,
                        err = %err,
                        "connect failed"
                    );
                    if remaining == 0 {
                        error!(
                            event = events::RECONNECT_EXHAUSTED,
                            host = %self.host,
                            port = self.port,
                            "retry budget exhausted; giving up"
                        );
                        return Err(err);
                    }
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    async fn unused_local_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("ephemeral bind should succeed");
        let port = listener
            .local_addr()
            .expect("bound listener has an address")
            .port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn client_streams_raw_writes() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("bound listener has an address");

        let client = TcpClient::connect("127.0.0.1", addr.port())
            .await
            .expect("client should connect");
        let (mut peer, _) = listener.accept().await.expect("accept should succeed");

        client
            .publish(b"abc", None)
            .await
            .expect("publish should succeed");

        let mut buf = [0u8; 3];
        peer.read_exact(&mut buf).await.expect("read should succeed");
        assert_eq!(&buf, b"abc");
    }

    #[tokio::test]
    async fn server_reads_chunks_and_returns_to_accept_on_close() {
        let mut server = TcpServer::bind("127.0.0.1", 0)
            .await
            .expect("server should bind");
        let addr = server.local_addr().expect("bound server has an address");

        let first = tokio::spawn(async move {
            let mut peer = TcpStream::connect(addr).await.expect("connect");
            peer.write_all(b"one").await.expect("write");
        });
        assert_eq!(server.recv().await.expect("first chunk"), b"one");
        first.await.expect("peer task");

        // The first peer has closed; a second connection must be accepted.
        let second = tokio::spawn(async move {
            let mut peer = TcpStream::connect(addr).await.expect("connect");
            peer.write_all(b"two").await.expect("write");
        });
        assert_eq!(server.recv().await.expect("second chunk"), b"two");
        second.await.expect("peer task");
    }

    #[tokio::test]
    async fn zero_retry_limit_still_makes_one_attempt() {
        let port = unused_local_port().await;
        let mut client =
            TcpReconnectClient::with_retry_policy("127.0.0.1", port, 0, Duration::from_millis(10));

        let err = client.recv().await.expect_err("no listener should fail");
        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionRefused);
    }

    #[tokio::test]
    async fn reconnect_client_gives_up_after_retry_budget() {
        let port = unused_local_port().await;
        let mut client =
            TcpReconnectClient::with_retry_policy("127.0.0.1", port, 3, Duration::from_millis(10));

        let err = client.recv().await.expect_err("no listener should fail");
        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionRefused);
    }

    #[tokio::test]
    async fn reconnect_client_recovers_when_listener_appears_mid_retry() {
        let port = unused_local_port().await;
        let addr: SocketAddr = format!("127.0.0.1:{port}")
            .parse()
            .expect("literal address");

        let listener_task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let listener = TcpListener::bind(addr).await.expect("late bind");
            let (mut peer, _) = listener.accept().await.expect("accept");
            peer.write_all(b"recovered").await.expect("write");
            // Hold the connection open until the client has read.
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let mut client =
            TcpReconnectClient::with_retry_policy("127.0.0.1", port, 50, Duration::from_millis(20));
        let data = tokio::time::timeout(Duration::from_secs(5), client.recv())
            .await
            .expect("recv should finish in time")
            .expect("recv should succeed once the listener appears");

        assert_eq!(data, b"recovered");
        listener_task.abort();
    }

    #[tokio::test]
    async fn retry_budget_resets_after_successful_connect() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("bound listener has an address");

        let mut client = TcpReconnectClient::with_retry_policy(
            "127.0.0.1",
            addr.port(),
            2,
            Duration::from_millis(10),
        );

        let peer_task = tokio::spawn(async move {
            let (mut peer, _) = listener.accept().await.expect("accept");
            peer.write_all(b"x").await.expect("write");
            drop(peer);
            drop(listener);
        });

        assert_eq!(client.recv().await.expect("first read"), b"x");
        peer_task.await.expect("peer task");

        // The peer and listener are gone: a fresh budget of 2 attempts is
        // spent before the client gives up.
        let err = client
            .recv()
            .await
            .expect_err("reconnect should exhaust the fresh budget");
        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionRefused);
    }
}
