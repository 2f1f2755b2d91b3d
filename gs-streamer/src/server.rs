/********************************************************************************
 * Copyright (c) 2025 Contributors to the gs-streamer project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Topology loading and lifecycle: turns a parsed configuration into running
//! broker, stream, and plugin tasks.
//!
//! Loading is per-entry fault tolerant: a bad stream or plugin entry is
//! logged and skipped, never taking the server down. Only broker bind
//! failures are fatal at startup.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::broker::{Broker, SubscriptionTable};
use crate::component::{ComponentKind, ComponentRecord};
use crate::config::{BusAddresses, Config, PluginConfig, ServerConfig, StreamConfig};
use crate::endpoint::Endpoint;
use crate::error::{Result, TopologyError};
use crate::handler::{Handler, HandlerRegistry};
use crate::observability::events;
use crate::plugin::{PluginRegistry, PluginRunner};
use self::StreamRole::{Inbound, Outbound};
use crate::stream::{InputBinding, OutputBinding, Stream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamRole {
    Inbound,
    Outbound,
}

impl fmt::Display for StreamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inbound => write!(f, "inbound"),
            Outbound => write!(f, "outbound"),
        }
    }
}

/// Builds the component topology from configuration and owns every loaded
/// component until [`Server::start`] hands them to the runtime.
pub struct Server {
    bus: BusAddresses,
    config: ServerConfig,
    config_path: Option<PathBuf>,
    handler_registry: HandlerRegistry,
    plugin_registry: PluginRegistry,
    names: HashSet<String>,
    records: Vec<ComponentRecord>,
    streams: Vec<Stream>,
    plugins: Vec<PluginRunner>,
}

/// A started server: the actually-bound bus addresses plus the set of
/// component tasks.
pub struct RunningServer {
    bus: BusAddresses,
    components: JoinSet<()>,
}

impl Server {
    pub fn new(
        config: Config,
        handler_registry: HandlerRegistry,
        plugin_registry: PluginRegistry,
    ) -> Result<Self> {
        let bus = config.server.bus_addresses()?;
        Ok(Self {
            bus,
            config: config.server,
            config_path: None,
            handler_registry,
            plugin_registry,
            names: HashSet::new(),
            records: Vec::new(),
            streams: Vec::new(),
            plugins: Vec::new(),
        })
    }

    /// Records where the configuration came from, for startup logging only.
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    /// Loads every configured stream entry; invalid entries are logged and
    /// skipped so one bad entry never takes the whole topology down.
    pub fn load_streams(&mut self) {
        for entry in self.config.inbound_streams.clone() {
            if let Err(err) = self.load_stream(&entry, Inbound) {
                self.log_skipped("stream", entry.name.as_deref(), &err);
            }
        }
        for entry in self.config.outbound_streams.clone() {
            if let Err(err) = self.load_stream(&entry, Outbound) {
                self.log_skipped("stream", entry.name.as_deref(), &err);
            }
        }

        let receives = self.records.iter().any(|r| {
            matches!(
                r.kind,
                ComponentKind::InboundStream | ComponentKind::RawListener
            )
        });
        if !receives {
            warn!(
                event = events::TOPOLOGY_WARNING,
                "no inbound streams loaded; no data will be received"
            );
        }
        if !self
            .records
            .iter()
            .any(|r| r.kind == ComponentKind::OutboundStream)
        {
            warn!(
                event = events::TOPOLOGY_WARNING,
                "no outbound streams loaded; no data will be published"
            );
        }
    }

    /// Loads every configured plugin entry, skipping invalid ones.
    pub fn load_plugins(&mut self) {
        for entry in self.config.plugins.clone() {
            if let Err(err) = self.load_plugin(&entry) {
                self.log_skipped("plugin", entry.name.as_deref(), &err);
            }
        }
    }

    fn load_stream(&mut self, entry: &StreamConfig, role: StreamRole) -> Result<()> {
        let name = entry
            .name
            .as_deref()
            .ok_or_else(|| TopologyError::ConfigMissing(format!("{role} stream's name")))?;
        self.claim_name(name)?;

        let inputs = resolve_endpoints(&entry.input)?;
        let outputs = resolve_endpoints(&entry.output)?;
        if role == Inbound && inputs.is_empty() {
            return Err(TopologyError::ConfigMissing(format!(
                "inbound stream {name}'s input"
            )));
        }

        let handlers = self.build_handlers(entry)?;
        let (input, kind) = classify_input(name, &inputs, role)?;
        let output = classify_output(name, &outputs)?;
        let stream = Stream::new(name, handlers, input, output)?;

        self.names.insert(name.to_string());
        self.records.push(ComponentRecord {
            name: name.to_string(),
            kind,
            inputs,
            outputs,
            command_subscriber: entry.command_subscriber.unwrap_or(false),
        });
        self.streams.push(stream);
        Ok(())
    }

    fn load_plugin(&mut self, entry: &PluginConfig) -> Result<()> {
        let name = entry
            .name
            .as_deref()
            .ok_or_else(|| TopologyError::ConfigMissing("plugin's name".to_string()))?;
        self.claim_name(name)?;

        if entry.inputs.is_empty() {
            warn!(
                event = events::TOPOLOGY_WARNING,
                plugin = %name,
                "plugin has no inputs; it will never process anything"
            );
        }
        if entry.outputs.is_empty() {
            warn!(
                event = events::TOPOLOGY_WARNING,
                plugin = %name,
                "plugin has no outputs; its results will have no subscriber"
            );
        }

        let plugin = self.plugin_registry.build(name, &entry.params)?;

        self.names.insert(name.to_string());
        self.records.push(ComponentRecord {
            name: name.to_string(),
            kind: ComponentKind::Plugin,
            inputs: entry
                .inputs
                .iter()
                .map(|topic| Endpoint::Topic(topic.clone()))
                .collect(),
            outputs: entry
                .outputs
                .iter()
                .map(|topic| Endpoint::Topic(topic.clone()))
                .collect(),
            command_subscriber: false,
        });
        self.plugins.push(PluginRunner::new(name, plugin));
        Ok(())
    }

    /// Skip warnings name the configuration file so the offending entry can
    /// be found.
    fn log_skipped(&self, what: &str, name: Option<&str>, err: &TopologyError) {
        let config = self
            .config_path
            .as_deref()
            .unwrap_or_else(|| Path::new("<inline>"));
        warn!(
            event = events::TOPOLOGY_ENTRY_SKIPPED,
            config = %config.display(),
            name = name.unwrap_or("<unnamed>"),
            err = %err,
            "skipping invalid {what} entry"
        );
    }

    /// Rejects a duplicate component name before anything is registered, so
    /// a failed entry leaves no partial state behind.
    fn claim_name(&self, name: &str) -> Result<()> {
        if self.names.contains(name) {
            return Err(TopologyError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    fn build_handlers(&self, entry: &StreamConfig) -> Result<Vec<Box<dyn Handler>>> {
        entry
            .handlers
            .iter()
            .map(|handler| {
                let name = handler
                    .name
                    .as_deref()
                    .ok_or_else(|| TopologyError::ConfigMissing("handler's name".to_string()))?;
                self.handler_registry.build(name, &handler.params)
            })
            .collect()
    }

    pub fn component_records(&self) -> &[ComponentRecord] {
        &self.records
    }

    /// Starts the broker, then every loaded component. A broker bind failure
    /// is fatal; components run until their transports fail.
    pub async fn start(self) -> Result<RunningServer> {
        if let Some(path) = &self.config_path {
            info!(config = %path.display(), "starting server");
        }

        let handle = Broker::new(self.bus).start().await?;
        let bus = BusAddresses {
            xsub: handle.xsub,
            xpub: handle.xpub,
        };
        let table = SubscriptionTable::compute(&self.records);
        let listeners: HashSet<String> = self
            .records
            .iter()
            .filter(|r| r.kind == ComponentKind::RawListener)
            .map(|r| r.name.clone())
            .collect();

        let mut components = JoinSet::new();
        for stream in self.streams {
            let topics = table.topics_for(stream.name());
            // Raw listeners run indefinitely and are not part of the wait
            // barrier.
            if listeners.contains(stream.name()) {
                tokio::spawn(stream.run(bus, topics));
            } else {
                components.spawn(stream.run(bus, topics));
            }
        }
        for plugin in self.plugins {
            let topics = table.topics_for(plugin.name());
            components.spawn(plugin.run(bus, topics));
        }

        Ok(RunningServer { bus, components })
    }

    /// Starts the server and blocks until every component has stopped.
    pub async fn wait(self) -> Result<()> {
        self.start().await?.wait().await;
        Ok(())
    }
}

impl RunningServer {
    /// The actually-bound bus addresses (useful when configured with port 0).
    pub fn bus_addresses(&self) -> BusAddresses {
        self.bus
    }

    pub async fn wait(mut self) {
        while self.components.join_next().await.is_some() {}
    }
}


fn resolve_endpoints(specs: &[crate::endpoint::EndpointSpec]) -> Result<Vec<Endpoint>> {
    specs.iter().map(Endpoint::parse).collect()
}

/// Maps a stream's first input endpoint to a transport binding and the
/// component kind it implies. A bare port is shorthand for a wildcard UDP
/// listener; TCP splits into listening and connecting adapters on the host.
fn classify_input(
    name: &str,
    inputs: &[Endpoint],
    role: StreamRole,
) -> Result<(InputBinding, ComponentKind)> {
    let stream_kind = match role {
        Inbound => ComponentKind::InboundStream,
        Outbound => ComponentKind::OutboundStream,
    };
    let Some(first) = inputs.first() else {
        return Ok((InputBinding::Bus, stream_kind));
    };

    let binding = match first {
        Endpoint::Topic(_) => return Ok((InputBinding::Bus, stream_kind)),
        Endpoint::Port(port) => InputBinding::UdpListen {
            host: "0.0.0.0".to_string(),
            port: *port,
        },
        Endpoint::Udp { host, port } => InputBinding::UdpListen {
            host: host.clone(),
            port: *port,
        },
        Endpoint::Tcp { host, port } if Endpoint::is_listen_host(host) => InputBinding::TcpListen {
            host: host.clone(),
            port: *port,
        },
        Endpoint::Tcp { host, port } => InputBinding::TcpConnect {
            host: host.clone(),
            port: *port,
        },
    };

    if inputs.len() > 1 {
        warn!(
            event = events::TOPOLOGY_WARNING,
            stream = %name,
            "socket input streams use only their first input; extra inputs ignored"
        );
    }

    // A socket-fed inbound stream is a raw listener: it injects data onto
    // the bus but never subscribes, so plugin outputs cannot target it.
    let kind = match role {
        Inbound => ComponentKind::RawListener,
        Outbound => ComponentKind::OutboundStream,
    };
    Ok((binding, kind))
}

/// Maps a stream's first output endpoint to a publish binding. No output
/// (or a topic) publishes on the bus; a bare port is shorthand for a UDP
/// client aimed at localhost.
fn classify_output(name: &str, outputs: &[Endpoint]) -> Result<OutputBinding> {
    let Some(first) = outputs.first() else {
        return Ok(OutputBinding::Bus);
    };

    if outputs.len() > 1 {
        warn!(
            event = events::TOPOLOGY_WARNING,
            stream = %name,
            "streams publish to only their first output; extra outputs ignored"
        );
    }

    Ok(match first {
        Endpoint::Topic(_) => OutputBinding::Bus,
        Endpoint::Port(port) => OutputBinding::Udp {
            host: "127.0.0.1".to_string(),
            port: *port,
        },
        Endpoint::Udp { host, port } => OutputBinding::Udp {
            host: host.clone(),
            port: *port,
        },
        Endpoint::Tcp { host, port } => OutputBinding::Tcp {
            host: host.clone(),
            port: *port,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointSpec;

    fn server_from(json5: &str) -> Server {
        let config = Config::from_json5(json5).expect("test config should parse");
        Server::new(config, HandlerRegistry::new(), PluginRegistry::new())
            .expect("server should build")
    }

    fn stream_entry(name: &str, input: Vec<EndpointSpec>) -> StreamConfig {
        StreamConfig {
            name: Some(name.to_string()),
            input,
            ..StreamConfig::default()
        }
    }

    #[test]
    fn inbound_stream_without_input_reports_the_missing_field() {
        let mut server = server_from("{}");
        let entry = stream_entry("tlm_in", Vec::new());

        let err = server
            .load_stream(&entry, Inbound)
            .expect_err("missing input should fail");
        assert!(
            matches!(&err, TopologyError::ConfigMissing(what) if what == "inbound stream tlm_in's input"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn unnamed_stream_reports_the_missing_name() {
        let mut server = server_from("{}");
        let entry = StreamConfig::default();

        let err = server
            .load_stream(&entry, Outbound)
            .expect_err("missing name should fail");
        assert!(
            matches!(&err, TopologyError::ConfigMissing(what) if what == "outbound stream's name"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn duplicate_names_leave_no_partial_registration() {
        let mut server = server_from("{}");
        server
            .load_stream(&stream_entry("tlm", vec![EndpointSpec::Port(9999)]), Inbound)
            .expect("first entry should load");

        let err = server
            .load_stream(&stream_entry("tlm", vec![EndpointSpec::Port(9998)]), Inbound)
            .expect_err("duplicate name should fail");
        assert!(matches!(err, TopologyError::DuplicateName(_)));
        assert_eq!(server.records.len(), 1);
        assert_eq!(server.streams.len(), 1);
    }

    #[test]
    fn invalid_entries_are_skipped_and_valid_ones_survive() {
        let mut server = server_from(
            r#"{
                server: {
                    "inbound-streams": [
                        { name: "good", input: [9999] },
                        { name: "bad" },
                    ],
                }
            }"#,
        )
        .with_config_path(PathBuf::from("config/topology.json5"));

        server.load_streams();

        assert_eq!(server.records.len(), 1);
        assert_eq!(server.records[0].name, "good");
    }

    #[test]
    fn unknown_plugin_is_config_invalid() {
        let mut server = server_from("{}");
        let entry = PluginConfig {
            name: Some("nonexistent".to_string()),
            ..PluginConfig::default()
        };

        let err = server
            .load_plugin(&entry)
            .expect_err("unknown plugin should fail");
        assert!(matches!(err, TopologyError::ConfigInvalid(_)));
        assert!(server.records.is_empty());
    }

    #[test]
    fn accumulator_plugin_loads_with_topic_records() {
        let mut server = server_from(
            r#"{
                server: {
                    plugins: [
                        {
                            name: "accumulator",
                            inputs: ["tlm_in"],
                            outputs: ["tlm_out"],
                            threshold: 16,
                        },
                    ],
                }
            }"#,
        );

        server.load_plugins();

        assert_eq!(server.plugins.len(), 1);
        let record = &server.records[0];
        assert_eq!(record.kind, ComponentKind::Plugin);
        assert_eq!(record.inputs, vec![Endpoint::Topic("tlm_in".to_string())]);
        assert_eq!(record.outputs, vec![Endpoint::Topic("tlm_out".to_string())]);
    }

    #[test]
    fn bare_port_input_is_a_wildcard_udp_listener() {
        let (binding, kind) = classify_input("s", &[Endpoint::Port(9999)], Inbound)
            .expect("port input should classify");
        assert_eq!(
            binding,
            InputBinding::UdpListen {
                host: "0.0.0.0".to_string(),
                port: 9999
            }
        );
        assert_eq!(kind, ComponentKind::RawListener);
    }

    #[test]
    fn tcp_input_splits_on_the_listen_host() {
        let listen = Endpoint::Tcp {
            host: "server".to_string(),
            port: 7777,
        };
        let (binding, _) =
            classify_input("s", &[listen], Inbound).expect("listen input should classify");
        assert_eq!(
            binding,
            InputBinding::TcpListen {
                host: "server".to_string(),
                port: 7777
            }
        );

        let connect = Endpoint::Tcp {
            host: "127.0.0.1".to_string(),
            port: 7777,
        };
        let (binding, _) =
            classify_input("s", &[connect], Inbound).expect("connect input should classify");
        assert_eq!(
            binding,
            InputBinding::TcpConnect {
                host: "127.0.0.1".to_string(),
                port: 7777
            }
        );
    }

    #[test]
    fn topic_input_stays_on_the_bus_and_keeps_the_stream_kind() {
        let topic = Endpoint::Topic("tlm_in".to_string());
        let (binding, kind) =
            classify_input("s", &[topic], Outbound).expect("topic input should classify");
        assert_eq!(binding, InputBinding::Bus);
        assert_eq!(kind, ComponentKind::OutboundStream);
    }

    #[test]
    fn bare_port_output_is_a_localhost_udp_client() {
        let output =
            classify_output("s", &[Endpoint::Port(8888)]).expect("port output should classify");
        assert_eq!(
            output,
            OutputBinding::Udp {
                host: "127.0.0.1".to_string(),
                port: 8888
            }
        );

        let none = classify_output("s", &[]).expect("no output should classify");
        assert_eq!(none, OutputBinding::Bus);
    }
}
