#![doc = include_str!("../README.md")]

pub mod server;

pub use server::{
    config::{CliArgs, ServerConfig},
    serve_with_incoming,
    service::handler::StreamService,
};
