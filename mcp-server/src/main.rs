use anyhow::Result;
use clap::{Parser, Subcommand};

use mcp_server::{build_dispatcher, config::Config, stdio, telemetry};

#[derive(Parser)]
#[command(
    name = "lodestar-mcp",
    about = "Vision-driven task orchestration server for AI agents",
    version
)]
struct Cli {
    /// Path to a TOML configuration file (overrides CONFIG_FILE)
    #[arg(long, env = "CONFIG_FILE")]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve tool calls over line-delimited JSON stdio (default)
    Serve,
    /// Validate the configuration and exit
    CheckConfig,
    /// Print the routed tool surface
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::CheckConfig => {
            println!("configuration ok");
            Ok(())
        }
        Command::Tools => {
            let (dispatcher, _stores) = build_dispatcher(&config);
            for name in dispatcher.tool_names() {
                println!("{name}");
            }
            Ok(())
        }
        Command::Serve => {
            telemetry::init_telemetry(&config.logging)?;
            telemetry::log_startup_info(&config);

            let (dispatcher, stores) = build_dispatcher(&config);
            stores.health_check().await?;
            let failures = stdio::serve(&dispatcher).await?;

            telemetry::log_shutdown_info();
            if failures > 0 {
                // Non-zero exit signals that at least one call failed
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
