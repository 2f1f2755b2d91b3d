/********************************************************************************
 * Copyright (c) 2025 Contributors to the gs-streamer project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Stream components: a transport binding composed with an ordered handler
//! chain, sharing the same pipeline-with-veto contract as plugins.

use tracing::{debug, error, info, warn};

use crate::bus::{BusPublisher, BusSubscriber};
use crate::config::BusAddresses;
use crate::error::{Result, TopologyError};
use crate::handler::{valid_workflow, Handler};
use crate::observability::events;
use crate::transport::{Publisher, TcpClient, TcpReconnectClient, TcpServer, UdpClient, UdpListener};

/// Where a stream's inbound data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputBinding {
    /// Subscribe on the bus; the concrete topic set is installed from the
    /// subscription table at start time (and may be empty for outbound
    /// streams fed only by plugin-output wiring).
    Bus,
    UdpListen { host: String, port: u16 },
    TcpListen { host: String, port: u16 },
    TcpConnect { host: String, port: u16 },
}

/// Where a stream's processed output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputBinding {
    Bus,
    Udp { host: String, port: u16 },
    Tcp { host: String, port: u16 },
}

pub struct Stream {
    name: String,
    handlers: Vec<Box<dyn Handler>>,
    input: InputBinding,
    output: OutputBinding,
}

impl Stream {
    /// Validates the handler chain before any socket is opened (fail fast).
    pub fn new(
        name: &str,
        handlers: Vec<Box<dyn Handler>>,
        input: InputBinding,
        output: OutputBinding,
    ) -> Result<Self> {
        if !valid_workflow(&handlers) {
            return Err(TopologyError::InvalidWorkflow(format!(
                "stream {name}'s handler chain has mismatched adjacent types"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            handlers,
            input,
            output,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Threads one unit of data through the handler chain and publishes the
    /// final result under the stream's own name unless an explicit override
    /// topic is supplied. Any handler returning `None` vetoes the message.
    pub async fn process(
        &mut self,
        publisher: &dyn Publisher,
        data: Vec<u8>,
        topic: Option<&str>,
    ) -> std::io::Result<()> {
        let mut current = data;
        for handler in &mut self.handlers {
            match handler.handle(current) {
                Some(next) => current = next,
                None => {
                    debug!(
                        event = events::PIPELINE_VETO,
                        component = %self.name,
                        "handler vetoed message; not publishing"
                    );
                    return Ok(());
                }
            }
        }
        publisher.publish(&current, topic).await
    }

    /// Runs the receive loop until the transport fails fatally.
    pub async fn run(mut self, bus: BusAddresses, topics: Vec<String>) {
        let name = self.name.clone();
        match self.run_inner(bus, topics).await {
            Ok(()) => info!(event = events::COMPONENT_STOPPED, component = %name, "stream stopped"),
            Err(err) => {
                error!(component = %name, err = %err, "stream stopped on transport error");
            }
        }
    }

    async fn run_inner(&mut self, bus: BusAddresses, topics: Vec<String>) -> std::io::Result<()> {
        // Results are always redistributable on the bus, so every stream
        // opens a bus-side publisher regardless of its configured output.
        let bus_publisher = BusPublisher::connect(bus.xsub, &self.name).await?;
        let socket_publisher: Option<Box<dyn Publisher>> = match &self.output {
            OutputBinding::Bus => None,
            OutputBinding::Udp { host, port } => {
                Some(Box::new(UdpClient::connect(host, *port).await?))
            }
            OutputBinding::Tcp { host, port } => {
                Some(Box::new(TcpClient::connect(host, *port).await?))
            }
        };

        info!(
            event = events::COMPONENT_START,
            component = %self.name,
            input = ?self.input,
            topics = ?topics,
            "stream started"
        );

        match self.input.clone() {
            InputBinding::Bus => {
                let mut subscriber = BusSubscriber::connect(bus.xpub, &topics).await?;
                while let Some((_, payload)) = subscriber.next().await? {
                    self.dispatch(&bus_publisher, socket_publisher.as_deref(), payload)
                        .await;
                }
                Ok(())
            }
            InputBinding::UdpListen { host, port } => {
                let listener = UdpListener::bind(&host, port).await?;
                loop {
                    let datagram = listener.recv().await?;
                    self.dispatch(&bus_publisher, socket_publisher.as_deref(), datagram)
                        .await;
                }
            }
            InputBinding::TcpListen { host, port } => {
                let mut server = TcpServer::bind(&host, port).await?;
                loop {
                    let chunk = server.recv().await?;
                    self.dispatch(&bus_publisher, socket_publisher.as_deref(), chunk)
                        .await;
                }
            }
            InputBinding::TcpConnect { host, port } => {
                let mut client = TcpReconnectClient::new(&host, port);
                loop {
                    let chunk = client.recv().await?;
                    self.dispatch(&bus_publisher, socket_publisher.as_deref(), chunk)
                        .await;
                }
            }
        }
    }

    /// Per-message publish errors are logged and the loop continues; they
    /// never affect other components.
    async fn dispatch(
        &mut self,
        bus_publisher: &BusPublisher,
        socket_publisher: Option<&dyn Publisher>,
        data: Vec<u8>,
    ) {
        let name = self.name.clone();
        let publisher: &dyn Publisher = socket_publisher.unwrap_or(bus_publisher);
        if let Err(err) = self.process(publisher, data, None).await {
            warn!(
                event = events::PUBLISH_FAILED,
                component = %name,
                err = %err,
                "publish failed; message dropped"
            );
        }
    }
}
