/********************************************************************************
 * Copyright (c) 2025 Contributors to the gs-streamer project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use std::net::SocketAddr;

use serde::Deserialize;

use crate::endpoint::EndpointSpec;
use crate::error::TopologyError;

/// Root configuration document. Everything lives under the `server` key.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    /// Publisher-facing bus socket address.
    #[serde(default = "default_xsub")]
    pub xsub: String,

    /// Subscriber-facing bus socket address.
    #[serde(default = "default_xpub")]
    pub xpub: String,

    #[serde(default, rename = "inbound-streams")]
    pub inbound_streams: Vec<StreamConfig>,

    #[serde(default, rename = "outbound-streams")]
    pub outbound_streams: Vec<StreamConfig>,

    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            xsub: default_xsub(),
            xpub: default_xpub(),
            inbound_streams: Vec::new(),
            outbound_streams: Vec::new(),
            plugins: Vec::new(),
        }
    }
}

fn default_xsub() -> String {
    "0.0.0.0:5559".to_string()
}

fn default_xpub() -> String {
    "0.0.0.0:5560".to_string()
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct StreamConfig {
    pub name: Option<String>,

    #[serde(default)]
    pub input: Vec<EndpointSpec>,

    #[serde(default)]
    pub output: Vec<EndpointSpec>,

    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,

    /// Parsed and carried opaquely on the component record; its consumer is
    /// outside this crate.
    #[serde(default, rename = "command-subscriber")]
    pub command_subscriber: Option<bool>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct HandlerConfig {
    pub name: Option<String>,

    /// Remaining keys, forwarded verbatim to the handler factory.
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct PluginConfig {
    pub name: Option<String>,

    #[serde(default)]
    pub inputs: Vec<String>,

    #[serde(default)]
    pub outputs: Vec<String>,

    /// Remaining keys, forwarded verbatim to the plugin factory.
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// The two bus socket addresses, threaded explicitly from the server through
/// the broker into every adapter constructor.
#[derive(Debug, Clone, Copy)]
pub struct BusAddresses {
    pub xsub: SocketAddr,
    pub xpub: SocketAddr,
}

impl Config {
    pub fn from_json5(contents: &str) -> Result<Self, TopologyError> {
        json5::from_str(contents).map_err(|err| {
            TopologyError::ConfigInvalid(format!("unable to parse configuration: {err}"))
        })
    }
}

impl ServerConfig {
    pub fn bus_addresses(&self) -> Result<BusAddresses, TopologyError> {
        let xsub = self.xsub.parse().map_err(|_| {
            TopologyError::ConfigInvalid(format!(
                "server.xsub '{}' is not a socket address",
                self.xsub
            ))
        })?;
        let xpub = self.xpub.parse().map_err(|_| {
            TopologyError::ConfigInvalid(format!(
                "server.xpub '{}' is not a socket address",
                self.xpub
            ))
        })?;
        Ok(BusAddresses { xsub, xpub })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointSpec;

    #[test]
    fn defaults_apply_when_keys_are_absent() {
        let config = Config::from_json5("{ server: {} }").expect("empty server should parse");

        assert_eq!(config.server.xsub, "0.0.0.0:5559");
        assert_eq!(config.server.xpub, "0.0.0.0:5560");
        assert!(config.server.inbound_streams.is_empty());
        assert!(config.server.plugins.is_empty());
    }

    #[test]
    fn stream_entries_parse_ports_and_topics() {
        let config = Config::from_json5(
            r#"{
                server: {
                    "inbound-streams": [
                        { name: "tlm_in", input: [9999] },
                    ],
                    "outbound-streams": [
                        {
                            name: "tlm_out",
                            input: ["tlm_in"],
                            output: [8888],
                            "command-subscriber": true,
                        },
                    ],
                }
            }"#,
        )
        .expect("stream config should parse");

        let inbound = &config.server.inbound_streams[0];
        assert_eq!(inbound.name.as_deref(), Some("tlm_in"));
        assert_eq!(inbound.input, vec![EndpointSpec::Port(9999)]);

        let outbound = &config.server.outbound_streams[0];
        assert_eq!(
            outbound.input,
            vec![EndpointSpec::Name("tlm_in".to_string())]
        );
        assert_eq!(outbound.output, vec![EndpointSpec::Port(8888)]);
        assert_eq!(outbound.command_subscriber, Some(true));
    }

    #[test]
    fn plugin_extra_keys_are_forwarded_as_params() {
        let config = Config::from_json5(
            r#"{
                server: {
                    plugins: [
                        {
                            name: "accumulator",
                            inputs: ["tlm_in"],
                            outputs: ["tlm_out"],
                            threshold: 2048,
                        },
                    ],
                }
            }"#,
        )
        .expect("plugin config should parse");

        let plugin = &config.server.plugins[0];
        assert_eq!(plugin.inputs, vec!["tlm_in".to_string()]);
        assert_eq!(plugin.outputs, vec!["tlm_out".to_string()]);
        assert_eq!(
            plugin.params.get("threshold").and_then(|v| v.as_u64()),
            Some(2048)
        );
    }

    #[test]
    fn bad_bus_address_is_config_invalid() {
        let config = Config::from_json5(r#"{ server: { xsub: "not-an-address" } }"#)
            .expect("document should parse");
        let err = config
            .server
            .bus_addresses()
            .expect_err("bad address should fail");
        assert!(matches!(err, TopologyError::ConfigInvalid(_)));
    }
}
