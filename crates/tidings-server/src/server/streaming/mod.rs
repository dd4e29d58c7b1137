//! Per-call message emission.
//!
//! - [`producer`] - lazy, paced greeting sequence ([`producer::MessageProducer`]).
//! - [`processor`] - the emission loop that forwards a producer into a call's
//!   response channel and honours cancellation.

pub mod processor;
pub mod producer;
