//! Concurrency control for in-flight calls.
//!
//! - [`manager`] - [`manager::WorkerPool`], the bounded set of call slots and
//!   its shutdown sequence.

pub mod manager;
