//! Build script for nozzle-proto
//!
//! Compiles the vendored dropsonde definitions using prost-build.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_root = "../../proto/dropsonde";

    let protos = [
        "envelope.proto",
        "http.proto",
        "log.proto",
        "metric.proto",
        "error.proto",
        "uuid.proto",
    ];

    let proto_paths: Vec<_> = protos
        .iter()
        .map(|p| format!("{proto_root}/{p}"))
        .collect();

    prost_build::Config::new()
        .protoc_executable(protoc_bin_vendored::protoc_bin_path()?)
        .compile_protos(&proto_paths, &[proto_root])?;

    Ok(())
}
