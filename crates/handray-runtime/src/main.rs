//! handray: point-to-select runtime binary.
//! Streams hand landmarks from the tracking service, hit-tests the index
//! fingertip ray against the configured targets and prints one JSON line per
//! selection signal on stdout. Logs go to stderr.

use anyhow::Context;
use clap::Parser;

mod cli;
mod config;
mod event_loop;
mod publish;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let command = args.command.unwrap_or(cli::Command::Run(args.run));

    match command {
        cli::Command::Run(opts) => {
            let filter = std::env::var("HANDRAY_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .with_writer(std::io::stderr)
                .init();

            let mut config = config::AppConfig::load_or_default(args.config.as_deref())
                .context("loading config")?;
            opts.apply(&mut config);
            config.validate().context("validating config")?;

            tracing::info!("handray starting");
            event_loop::run(config).await?;
        }
        cli::Command::Targets => {
            let config = config::AppConfig::load_or_default(args.config.as_deref())
                .context("loading config")?;
            for target in config.target_set()?.targets() {
                let c = target.volume.center;
                println!(
                    "{:<16} center=({:.2}, {:.2}, {:.2}) radius={:.2}",
                    target.id, c.x, c.y, c.z, target.volume.radius
                );
            }
        }
    }

    Ok(())
}
