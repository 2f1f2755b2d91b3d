//! Datagram adapters: one datagram in is one processing call, one publish
//! out is one datagram.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use super::Publisher;

const MAX_DATAGRAM: usize = 65_535;

/// Datagram output client.
pub struct UdpClient {
    socket: UdpSocket,
}

impl UdpClient {
    pub async fn connect(host: &str, port: u16) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect((host, port)).await?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl Publisher for UdpClient {
    async fn publish(&self, payload: &[u8], _topic: Option<&str>) -> std::io::Result<()> {
        self.socket.send(payload).await.map(|_| ())
    }
}

/// Datagram listener bound to a local port.
pub struct UdpListener {
    socket: UdpSocket,
}

impl UdpListener {
    pub async fn bind(host: &str, port: u16) -> std::io::Result<Self> {
        let socket = UdpSocket::bind((crate::endpoint::bind_host(host), port)).await?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn recv(&self) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let len = self.socket.recv(&mut buf).await?;
        buf.truncate(len);
        Ok(buf)
    }
}
