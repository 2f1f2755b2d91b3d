//! Built-in plugins illustrating the in-bus processing contract.

mod accumulator;

pub use accumulator::Accumulator;
