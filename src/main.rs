//! Generate expected-output fixtures for every configured batch/beam run

use clap::Parser;
use expected_output::{generate_all, Args, Result, WorldConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("expected_output={}", args.log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let world = WorldConfig::from_env()?;
    info!("Runtime world size {}, rank {}", world.size, world.rank);

    let written = generate_all(&args, world)?;
    for paths in &written {
        info!(
            "{} / {}",
            paths.input_ids.display(),
            paths.output_ids.display()
        );
    }

    println!("Finish!");
    Ok(())
}
