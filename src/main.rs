use anyhow::Context;
use clap::{Parser, Subcommand};
use configuration::{load_settings, Settings};
use database::{Connection as _, Connector, MySqlConnector};

/// The main entry point for the inventory service.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse();

    let mut settings = load_settings().context("Failed to load configuration")?;
    let _log_guard = configuration::init_tracing(&settings.logging);

    // Execute the appropriate command
    match cli.command.unwrap_or(Commands::Serve(ServeArgs { port: None })) {
        Commands::Serve(args) => {
            if let Some(port) = args.port {
                settings.server.port = port;
            }
            web_server::run_server(settings).await
        }
        Commands::Check => handle_check(&settings).await,
        Commands::Config => {
            println!("{:#?}", settings);
            Ok(())
        }
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// A small HTTP inventory service over a MySQL `products` table.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (the default when no command is given).
    Serve(ServeArgs),
    /// Try a single connection to the configured database and report the result.
    Check,
    /// Print the effective configuration, password redacted.
    Config,
}

#[derive(Parser)]
struct ServeArgs {
    /// Listen on this port instead of the configured `PORT`.
    #[arg(long)]
    port: Option<u16>,
}

/// Performs one handshake with the database, without the supervisor's retries.
async fn handle_check(settings: &Settings) -> anyhow::Result<()> {
    let connector = MySqlConnector::new(&settings.database);
    tracing::info!("Checking database connectivity ({})...", connector.describe());

    let mut connection = connector
        .connect()
        .await
        .context("Database connection failed")?;
    connection.ping().await.context("Database ping failed")?;

    tracing::info!("Database is reachable.");
    Ok(())
}
