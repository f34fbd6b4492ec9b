//! Build script for the fleet API
//!
//! Compiles the Protocol Buffer definitions into Rust code with
//! tonic-prost-build. Both server and client stubs are generated: the
//! exporter uses the FileService client.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/fleet.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/fleet.proto");

    Ok(())
}
