/********************************************************************************
 * Copyright (c) 2025 Contributors to the gs-streamer project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::TopologyError;

/// A single typed transformation step inside a stream/plugin pipeline.
///
/// Returning `None` from [`Handler::handle`] vetoes the message: the rest of
/// the chain does not run and nothing is published.
pub trait Handler: Send {
    /// Type tag of accepted input. `None` accepts anything.
    fn input_type(&self) -> Option<&str> {
        None
    }

    /// Type tag of produced output. `None` may produce anything.
    fn output_type(&self) -> Option<&str> {
        None
    }

    fn handle(&mut self, data: Vec<u8>) -> Option<Vec<u8>>;
}

impl std::fmt::Debug for dyn Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Handler")
    }
}

/// Checks adjacent type-tag compatibility across a handler chain.
///
/// A pair is incompatible only when both the left `output_type` and the right
/// `input_type` are present and unequal; chains of length zero or one are
/// always valid.
pub fn valid_workflow(handlers: &[Box<dyn Handler>]) -> bool {
    handlers
        .windows(2)
        .all(|pair| match (pair[0].output_type(), pair[1].input_type()) {
            (Some(produced), Some(accepted)) => produced == accepted,
            _ => true,
        })
}

pub type HandlerFactory =
    Box<dyn Fn(&Map<String, Value>) -> Result<Box<dyn Handler>, TopologyError> + Send + Sync>;

/// Compile-time replacement for dynamic class loading: an explicit table of
/// handler name to factory, populated by registration calls.
#[derive(Default)]
pub struct HandlerRegistry {
    factories: HashMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, factory: HandlerFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn build(
        &self,
        name: &str,
        params: &Map<String, Value>,
    ) -> Result<Box<dyn Handler>, TopologyError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| TopologyError::ConfigInvalid(format!("unknown handler '{name}'")))?;
        factory(params)
    }
}
