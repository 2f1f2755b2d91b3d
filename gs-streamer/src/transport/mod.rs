//! Socket transport adapters unified behind the bus abstraction.
//!
//! Composition, not inheritance: streams hold one of these adapter values
//! behind the [`Publisher`] capability or as an input driver, and every
//! variant shares the same processing contract regardless of protocol.

mod tcp;
mod udp;

pub use tcp::{TcpClient, TcpReconnectClient, TcpServer};
pub use udp::{UdpClient, UdpListener};

use async_trait::async_trait;

/// TCP reads are fixed-size chunks; no message framing is imposed at this
/// layer (reassembly is the handler chain's responsibility).
pub const READ_CHUNK_SIZE: usize = 1024;

/// Outbound capability every adapter variant provides.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Sends one unit of data, under `topic` where the transport carries
    /// topics; raw socket transports ignore it.
    async fn publish(&self, payload: &[u8], topic: Option<&str>) -> std::io::Result<()>;
}
