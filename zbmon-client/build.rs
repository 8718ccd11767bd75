use std::io::Result;

fn main() -> Result<()> {
    // The server trait is generated as well so tests can run an
    // in-process StatsReport service.
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/zbstats/zb_stats.proto"], &["proto"])?;

    Ok(())
}
