//! texpro-reports CLI entry point.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use texpro_reports::cli::{commands, Cli, Commands};
use texpro_reports::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(err) => texpro_reports::cli::handle_error(err, cli.json),
    };

    // The server logs through the configured subscriber; one-shot commands log
    // warnings to stderr so stdout stays clean for their output.
    let _logger = match cli.command {
        Commands::Serve(_) => match LoggerImpl::init(&LogConfig::from(&config.logging)) {
            Ok(logger) => Some(logger),
            Err(err) => texpro_reports::cli::handle_error(err, cli.json),
        },
        _ => {
            tracing_subscriber::registry()
                .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
            None
        }
    };

    let json = cli.json;
    let result = match cli.command {
        Commands::Serve(args) => commands::serve::execute(args, &config).await,
        Commands::Migrate(args) => commands::migrate::execute(args, &config, json).await,
        Commands::Schedule(args) => commands::schedule::execute(args, &config, json).await,
        Commands::Runs(args) => commands::runs::execute(args, &config, json).await,
    };

    if let Err(err) = result {
        texpro_reports::cli::handle_error(err, json);
    }
}
