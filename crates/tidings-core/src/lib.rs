#![doc = include_str!("../README.md")]

mod common;
pub mod token;

pub use common::*;

/// Generated protobuf messages and gRPC stubs for `proto/tidings.proto`.
///
/// - [`StreamRequest`](proto::StreamRequest) names the user to greet.
/// - [`StreamResponse`](proto::StreamResponse) carries one greeting.
/// - [`streaming_service_server`](proto::streaming_service_server) and
///   [`streaming_service_client`](proto::streaming_service_client) hold the
///   service trait, server wrapper and client stub.
pub mod proto {
    tonic::include_proto!("tidings");

    /// Encoded descriptor set, registered with the gRPC reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("tidings_descriptor");
}
