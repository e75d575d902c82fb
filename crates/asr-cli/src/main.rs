use std::sync::Arc;

use clap::{Parser, Subcommand};

use asr_core::config::Config;

#[derive(Parser)]
#[command(
    name = "asr-gateway",
    about = "Realtime speech-recognition WebSocket gateway",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose (debug) logging, overridden by LOG_LEVEL if set
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on (overrides SERVER_PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the effective configuration and exit
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env()?;
    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("config error: {e}");
        }
        anyhow::bail!("invalid configuration, refusing to start");
    }

    let filter = if cli.verbose { "debug" } else { config.log_level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Serve { port } => {
            let mut config = config;
            if let Some(port) = port {
                config.server_port = port;
            }
            tracing::info!(
                host = %config.server_host,
                port = config.server_port,
                model = %config.model_path,
                "starting asr-gateway"
            );
            let state = Arc::new(asr_gateway::GatewayState::new(Arc::new(config)));
            asr_gateway::start_gateway(state).await?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
