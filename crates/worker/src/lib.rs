//! Stockpost worker - wires the transfer queue pipeline into a long-running
//! process.

pub mod context;

pub use context::WorkerContext;
