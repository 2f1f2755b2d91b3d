/********************************************************************************
 * Copyright (c) 2025 Contributors to the gs-streamer project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Plugin contract, factory registry, and the bus-driven plugin runner.
//!
//! A plugin is structurally a stream whose inputs are bus topics rather than
//! transport bindings: same pipeline-with-veto contract, used for pure
//! in-bus processing (accumulation, counting, monitoring).

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::bus::{BusPublisher, BusSubscriber};
use crate::config::BusAddresses;
use crate::error::TopologyError;
use crate::observability::events;
use crate::transport::Publisher;

/// Fallback tick period for plugins without time-driven behavior; their
/// default `flush` produces nothing, so the tick is a no-op.
const IDLE_FLUSH_INTERVAL: Duration = Duration::from_secs(3600);

const MESSAGE_QUEUE_DEPTH: usize = 64;

/// In-bus processing component contract.
pub trait Plugin: Send {
    /// Processes one message; `None` vetoes it (nothing is published).
    fn process(&mut self, data: Vec<u8>, topic: &str) -> Option<Vec<u8>>;

    /// Period of the time-driven flush, for plugins that buffer.
    fn flush_interval(&self) -> Option<Duration> {
        None
    }

    /// Drains buffered output on the periodic timer.
    fn flush(&mut self) -> Option<Vec<u8>> {
        None
    }
}

impl std::fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Plugin")
    }
}

pub type PluginFactory =
    Box<dyn Fn(&Map<String, Value>) -> Result<Box<dyn Plugin>, TopologyError> + Send + Sync>;

/// Compile-time replacement for dynamic class loading: an explicit table of
/// plugin name to factory. Built-in plugins are pre-registered; embedders
/// add their own with [`PluginRegistry::register`].
pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register(
            "accumulator",
            Box::new(|params| {
                crate::plugins::Accumulator::from_params(params)
                    .map(|plugin| Box::new(plugin) as Box<dyn Plugin>)
            }),
        );
        registry
    }

    pub fn register(&mut self, name: &str, factory: PluginFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn build(
        &self,
        name: &str,
        params: &Map<String, Value>,
    ) -> Result<Box<dyn Plugin>, TopologyError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| TopologyError::ConfigInvalid(format!("unknown plugin '{name}'")))?;
        factory(params)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives one plugin instance: subscribes to its input topics, feeds every
/// message through `process`, and publishes results under the plugin's own
/// name. Plugin state is mutated only by this task.
pub struct PluginRunner {
    name: String,
    plugin: Box<dyn Plugin>,
}

impl PluginRunner {
    pub fn new(name: &str, plugin: Box<dyn Plugin>) -> Self {
        Self {
            name: name.to_string(),
            plugin,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(mut self, bus: BusAddresses, topics: Vec<String>) {
        let name = self.name.clone();
        match self.run_inner(bus, topics).await {
            Ok(()) => info!(event = events::COMPONENT_STOPPED, component = %name, "plugin stopped"),
            Err(err) => {
                error!(component = %name, err = %err, "plugin stopped on transport error");
            }
        }
    }

    async fn run_inner(&mut self, bus: BusAddresses, topics: Vec<String>) -> std::io::Result<()> {
        let publisher = BusPublisher::connect(bus.xsub, &self.name).await?;
        let mut subscriber = BusSubscriber::connect(bus.xpub, &topics).await?;
        info!(
            event = events::COMPONENT_START,
            component = %self.name,
            topics = ?topics,
            "plugin started"
        );

        // Reads happen on a dedicated task so the flush timer can fire
        // without cancelling a partially-read frame.
        let (message_tx, mut message_rx) = mpsc::channel(MESSAGE_QUEUE_DEPTH);
        let reader = tokio::spawn(async move {
            loop {
                match subscriber.next().await {
                    Ok(Some(message)) => {
                        if message_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(err = %err, "bus receive failed; stopping reader");
                        break;
                    }
                }
            }
        });

        let mut ticker = tokio::time::interval(
            self.plugin.flush_interval().unwrap_or(IDLE_FLUSH_INTERVAL),
        );

        loop {
            let produced = tokio::select! {
                message = message_rx.recv() => match message {
                    Some((topic, payload)) => self.plugin.process(payload, &topic),
                    None => break,
                },
                _ = ticker.tick() => self.plugin.flush(),
            };

            match produced {
                Some(result) => {
                    if let Err(err) = publisher.publish(&result, None).await {
                        warn!(
                            event = events::PUBLISH_FAILED,
                            component = %self.name,
                            err = %err,
                            "publish failed; message dropped"
                        );
                    }
                }
                None => {
                    debug!(
                        event = events::PIPELINE_VETO,
                        component = %self.name,
                        "plugin produced no output"
                    );
                }
            }
        }

        reader.abort();
        Ok(())
    }
}
