//! Packet accumulator: batches small payloads into larger units.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::TopologyError;
use crate::plugin::Plugin;

const DEFAULT_THRESHOLD: usize = 4096;
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1000;

#[derive(Deserialize)]
#[serde(default)]
struct AccumulatorParams {
    threshold: usize,
    #[serde(rename = "flush-interval-ms")]
    flush_interval_ms: u64,
}

impl Default for AccumulatorParams {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
        }
    }
}

/// Buffers incoming payloads and emits the concatenated batch once buffered
/// bytes reach the threshold or the periodic flush timer fires, whichever
/// comes first. The owning runner task is the only writer of the buffer.
#[derive(Debug)]
pub struct Accumulator {
    threshold: usize,
    flush_interval: Duration,
    buffer: Vec<u8>,
}

impl Accumulator {
    pub fn new(threshold: usize, flush_interval: Duration) -> Self {
        Self {
            threshold,
            flush_interval,
            buffer: Vec::new(),
        }
    }

    pub fn from_params(params: &Map<String, Value>) -> Result<Self, TopologyError> {
        let params: AccumulatorParams = serde_json::from_value(Value::Object(params.clone()))
            .map_err(|err| {
                TopologyError::ConfigInvalid(format!("accumulator parameters: {err}"))
            })?;
        Ok(Self::new(
            params.threshold,
            Duration::from_millis(params.flush_interval_ms),
        ))
    }
}

impl Plugin for Accumulator {
    fn process(&mut self, data: Vec<u8>, _topic: &str) -> Option<Vec<u8>> {
        self.buffer.extend_from_slice(&data);
        if self.buffer.len() >= self.threshold {
            return Some(std::mem::take(&mut self.buffer));
        }
        None
    }

    fn flush_interval(&self) -> Option<Duration> {
        Some(self.flush_interval)
    }

    fn flush(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}
