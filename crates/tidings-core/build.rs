/// Generates the gRPC client and server bindings for `proto/tidings.proto`.
///
/// The encoded file descriptor set is written next to the generated code so
/// the server can expose it through gRPC reflection:
///
/// ```rust,ignore
/// pub const FILE_DESCRIPTOR_SET: &[u8] =
///     tonic::include_file_descriptor_set!("tidings_descriptor");
/// ```
use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let descriptor_path = out_dir.join("tidings_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure().compile_with_config(
        config,
        &["proto/tidings.proto"],
        &["proto"],
    )?;

    println!("cargo:rerun-if-changed=proto/tidings.proto");
    Ok(())
}
