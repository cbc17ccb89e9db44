// Copyright (c) 2025 - Cowboy AI, Inc.
//! Sprawl CLI
//!
//! Compiles a topology config, or launches it against the in-process
//! simulated backend to check that it comes up.
//!
//! Run with: cargo run --bin sprawl -- <compile|simulate> <config.json>
//!
//! Settings come from the environment:
//! - `SPRAWL_LICENSE`: enterprise license passed to agents
//! - `SPRAWL_SUBNET_SEED`: seed for the subnet choice
//! - `RUST_LOG`: log filter (default `info`)

use anyhow::{bail, Context, Result};
use cim_sprawl::{compile, Config, SimulatedWorld, Sprawl, SprawlConfig};
use std::sync::Arc;
use tracing::info;

const USAGE: &str = "usage: sprawl <compile|simulate> <config.json>";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, path) = match args.as_slice() {
        [command, path] => (command.as_str(), path.as_str()),
        _ => bail!(USAGE),
    };

    let config = Config::from_json_file(path)
        .with_context(|| format!("Failed to load config from {path}"))?;

    match command {
        "compile" => {
            let topology = compile(&config).context("Failed to compile topology")?;
            let json = serde_json::to_string_pretty(&topology)
                .context("Failed to serialize topology")?;
            println!("{json}");
        }
        "simulate" => {
            let settings = SprawlConfig::from_env();
            let world = SimulatedWorld::new();
            info!(config = path, "launching against simulated backend");

            let sprawl = Sprawl::launch(Arc::new(world.clone()), Arc::new(world), config, settings)
                .await
                .context("Launch failed")?;
            println!("{}", sprawl.details());
            sprawl.stop().await.context("Failed to tear down topology")?;
            info!("simulated topology torn down");
        }
        other => bail!("unknown command {other:?}\n{USAGE}"),
    }

    Ok(())
}
