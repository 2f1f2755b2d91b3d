/********************************************************************************
 * Copyright (c) 2025 Contributors to the gs-streamer project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use serde::Deserialize;

use crate::error::TopologyError;

/// Hosts that select a listening TCP adapter instead of a connecting client.
const LISTEN_HOSTS: [&str; 3] = ["server", "0.0.0.0", "*"];

/// Raw endpoint value as it appears in configuration: either a bare local
/// port number or a string that is resolved by [`Endpoint::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EndpointSpec {
    Port(u16),
    Name(String),
}

/// Resolved endpoint: a local port, a `protocol:host:port` socket binding,
/// or a bus topic naming another component's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Port(u16),
    Udp { host: String, port: u16 },
    Tcp { host: String, port: u16 },
    Topic(String),
}

impl Endpoint {
    pub fn parse(spec: &EndpointSpec) -> Result<Self, TopologyError> {
        match spec {
            EndpointSpec::Port(port) => Ok(Endpoint::Port(*port)),
            EndpointSpec::Name(name) => Self::parse_name(name),
        }
    }

    fn parse_name(name: &str) -> Result<Self, TopologyError> {
        if !name.contains(':') {
            return Ok(Endpoint::Topic(name.to_string()));
        }

        let parts: Vec<&str> = name.split(':').collect();
        if parts.len() != 3 {
            return Err(TopologyError::ConfigInvalid(format!(
                "endpoint '{name}' is not of the form protocol:host:port"
            )));
        }

        let port: u16 = parts[2].parse().map_err(|_| {
            TopologyError::ConfigInvalid(format!("endpoint '{name}' has an unparseable port"))
        })?;
        let host = parts[1].to_string();

        match parts[0] {
            "udp" => Ok(Endpoint::Udp { host, port }),
            "tcp" => Ok(Endpoint::Tcp { host, port }),
            proto => Err(TopologyError::ConfigInvalid(format!(
                "endpoint '{name}' names unrecognized protocol '{proto}'"
            ))),
        }
    }

    /// The topic this endpoint refers to, when it is topic-valued.
    pub fn topic(&self) -> Option<&str> {
        match self {
            Endpoint::Topic(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_listen_host(host: &str) -> bool {
        LISTEN_HOSTS.contains(&host)
    }
}

/// Maps the configured listen-host aliases to a bindable wildcard address.
pub fn bind_host(host: &str) -> &str {
    if host == "server" || host == "*" {
        "0.0.0.0"
    } else {
        host
    }
}
