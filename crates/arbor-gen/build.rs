fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Hermetic builds: no system protoc required.
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    tonic_build::configure()
        .build_server(false)
        .compile_protos(&["proto/streamservice.proto"], &["proto"])?;
    Ok(())
}
