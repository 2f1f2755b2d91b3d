//! Component records assembled during topology loading and consumed by
//! subscription planning. Records are created once at startup and never
//! structurally mutated afterwards.

use crate::endpoint::Endpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    InboundStream,
    OutboundStream,
    Plugin,
    /// A socket-listening adapter with no bus-side subscription of its own;
    /// classified separately from streams in the topology.
    RawListener,
}

#[derive(Debug, Clone)]
pub struct ComponentRecord {
    pub name: String,
    pub kind: ComponentKind,
    pub inputs: Vec<Endpoint>,
    pub outputs: Vec<Endpoint>,
    /// Opaque pass-through of the `command-subscriber` flag; its consumer
    /// lives outside this crate.
    pub command_subscriber: bool,
}
