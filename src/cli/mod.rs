//! Operator command line.

pub mod commands;
pub mod id_resolver;
pub mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::domain::models::config::Config;
use crate::infrastructure::config::ConfigLoader;

use commands::migrate::MigrateArgs;
use commands::runs::RunsArgs;
use commands::schedule::ScheduleArgs;
use commands::serve::ServeArgs;

#[derive(Parser, Debug)]
#[command(name = "texpro-reports")]
#[command(about = "TexPro report scheduling and delivery", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .texpro/config.yaml and .texpro/local.yaml)
    #[arg(short, long, global = true, env = "TEXPRO_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API, dispatcher and worker pool
    Serve(ServeArgs),

    /// Apply database migrations
    Migrate(MigrateArgs),

    /// Inspect and maintain report schedules
    Schedule(ScheduleArgs),

    /// Show run history or a single run
    Runs(RunsArgs),
}

impl Cli {
    /// Load configuration from `--config` or the default layered sources.
    pub fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => ConfigLoader::load_from_file(path),
            None => ConfigLoader::load(),
        }
    }
}

/// Print an error and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
        });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["texpro-reports", "schedule", "list", "--json", "--config", "cfg.yaml"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("cfg.yaml")));
        assert!(matches!(cli.command, Commands::Schedule(_)));
    }
}
