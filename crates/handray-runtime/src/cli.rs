//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(
    name = "handray",
    about = "Point at a target with your index finger, hold to select",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// TOML config file (default: built-in scene with three bulbs)
    #[arg(long, short = 'c', global = true, env = "HANDRAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Options for the default `run` command
    #[command(flatten)]
    pub run: RunOpts,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Stream landmarks and print selection signals as JSON lines (default)
    Run(RunOpts),
    /// Print the configured targets and exit
    Targets,
}

#[derive(clap::Args, Debug, Default, Clone)]
pub struct RunOpts {
    /// Tracking service WebSocket URL
    #[arg(long, env = "HANDRAY_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Dwell window in milliseconds
    #[arg(long)]
    pub hold_ms: Option<u64>,

    /// Use raw tracker x instead of the mirrored one
    #[arg(long)]
    pub no_mirror: bool,
}

impl RunOpts {
    /// Command-line flags win over the config file.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(endpoint) = &self.endpoint {
            config.stream.endpoint = endpoint.clone();
        }
        if let Some(hold_ms) = self.hold_ms {
            config.dwell.hold_ms = hold_ms;
        }
        if self.no_mirror {
            config.selection.mirror_x = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_runs_with_defaults() {
        let cli = Cli::try_parse_from(["handray"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.run.no_mirror);
        assert_eq!(cli.run.hold_ms, None);
    }

    #[test]
    fn run_flags_parse_at_top_level_and_under_run() {
        let top = Cli::try_parse_from(["handray", "--hold-ms", "1500", "--no-mirror"]).unwrap();
        assert_eq!(top.run.hold_ms, Some(1500));
        assert!(top.run.no_mirror);

        let sub = Cli::try_parse_from(["handray", "run", "--endpoint", "ws://10.0.0.2:8000/ws"])
            .unwrap();
        let Some(Command::Run(opts)) = sub.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(opts.endpoint.as_deref(), Some("ws://10.0.0.2:8000/ws"));
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["handray", "targets", "--config", "scene.toml"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Targets)));
        assert_eq!(cli.config, Some(PathBuf::from("scene.toml")));
    }

    #[test]
    fn flags_override_config() {
        let mut config = AppConfig::default();
        let opts = RunOpts {
            endpoint: Some("ws://tracker:9000/ws".into()),
            hold_ms: Some(1_000),
            no_mirror: true,
        };
        opts.apply(&mut config);

        assert_eq!(config.stream.endpoint, "ws://tracker:9000/ws");
        assert_eq!(config.dwell.hold_ms, 1_000);
        assert!(!config.selection.mirror_x);
    }
}
