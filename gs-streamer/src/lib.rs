/********************************************************************************
 * Copyright (c) 2025 Contributors to the gs-streamer project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! # gs-streamer
//!
//! Ground-station data routing middleware: a configuration-driven topology of
//! streams and plugins exchanging telemetry and commands over an internal
//! pub/sub bus.
//!
//! A [`Server`] is built from a [`Config`], loads the configured inbound
//! streams, outbound streams, and plugins, then starts the bus broker and
//! every component:
//!
//! - **Inbound streams** bring data in from sockets (or the bus), thread it
//!   through an ordered handler chain, and publish the result under the
//!   stream's own name.
//! - **Outbound streams** subscribe to bus topics and push processed data out
//!   to sockets.
//! - **Plugins** are pure in-bus processors wired between streams by name.
//!
//! Every message published on the bus is addressable by topic, so any
//! component can tap any other component's output by naming it in its inputs.
//!
//! ```no_run
//! use gs_streamer::{Config, HandlerRegistry, PluginRegistry, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_json5(
//!         r#"{
//!             server: {
//!                 "inbound-streams": [ { name: "tlm_in", input: [9999] } ],
//!                 "outbound-streams": [
//!                     { name: "tlm_out", input: ["tlm_in"], output: [8888] },
//!                 ],
//!             }
//!         }"#,
//!     )?;
//!     let mut server = Server::new(config, HandlerRegistry::new(), PluginRegistry::new())?;
//!     server.load_streams();
//!     server.load_plugins();
//!     server.wait().await?;
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod bus;
pub mod component;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod handler;
#[doc(hidden)]
pub mod observability;
pub mod plugin;
pub mod plugins;
pub mod server;
pub mod stream;
pub mod transport;
pub mod wire;

pub use component::{ComponentKind, ComponentRecord};
pub use config::{BusAddresses, Config};
pub use error::TopologyError;
pub use handler::{Handler, HandlerRegistry};
pub use plugin::{Plugin, PluginRegistry};
pub use server::{RunningServer, Server};
