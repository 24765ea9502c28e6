fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use bundled protoc
    // SAFETY: This is safe in a build script context where we control the environment
    unsafe {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &["proto/remote_work_processor_service.proto"],
            &["proto/"],
        )?;
    Ok(())
}
