use clap::{Parser, Subcommand};

mod app;

/// chronicle-gateway: runs the message ingestion, intent processing and
/// notification pipeline described in `§1`/`§5`.
#[derive(Parser, Debug)]
#[command(name = "chronicle-gateway")]
struct Cli {
    /// Path to the TOML config file. Falls back to CHRONICLE_CONFIG, then
    /// the default search path baked into `AppConfig::load`.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the client manager, processor, sync workers and notification
    /// dispatcher, and run until SIGINT/SIGTERM.
    Run,
    /// Restore every enabled channel's client from disk and exit, without
    /// starting the processor or sync workers.
    RestoreSessions,
    /// Load and validate configuration, then exit 0 or 1.
    CheckConfig,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "chronicle_gateway=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.or_else(|| std::env::var("CHRONICLE_CONFIG").ok());

    let config = match chronicle_core::config::AppConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            std::process::exit(e.exit_code());
        }
    };

    let command = cli.command.unwrap_or(Command::Run);
    let result = match command {
        Command::CheckConfig => {
            tracing::info!("configuration is valid");
            Ok(())
        }
        Command::RestoreSessions => restore_sessions(config).await,
        Command::Run => run(config).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "chronicle-gateway exited with an error");
        std::process::exit(1);
    }
}

async fn run(config: chronicle_core::config::AppConfig) -> anyhow::Result<()> {
    let (app, receiver) = app::App::build(config)?;
    app.run(receiver).await
}

async fn restore_sessions(config: chronicle_core::config::AppConfig) -> anyhow::Result<()> {
    let (app, _receiver) = app::App::build(config)?;
    let count = app.restore_sessions_only().await?;
    tracing::info!(candidates = count, "restore-sessions complete");
    Ok(())
}
