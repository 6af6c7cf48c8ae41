//! testbed CLI entrypoint.

use clap::Parser;

mod commands;
mod handlers;

use commands::Commands;

#[derive(Parser)]
#[command(name = "testbed")]
#[command(author, version, about = "Ephemeral backing services for integration tests", long_about = None)]
struct Cli {
    /// Read variables from this dotenv file before anything else
    #[arg(long, global = true)]
    env_file: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => {
            dotenvy::from_filename(path)?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let tracing_config = if cli.json_logs {
        testbed_trace::TracingConfig::json()
    } else {
        testbed_trace::TracingConfig::default()
    };
    testbed_trace::init_tracing(&tracing_config)?;

    match cli.command {
        Commands::Up(args) => handlers::up(args).await?,
        Commands::Services => handlers::services(),
        Commands::Settings => handlers::settings()?,
    }

    Ok(())
}
