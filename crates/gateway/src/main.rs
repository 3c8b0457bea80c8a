use std::path::PathBuf;

use clap::Parser;

use quill_gateway::bootstrap;

#[derive(Parser)]
#[command(name = "quill-gateway", about = "Agentic RAG gateway over scientific papers")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "QUILL_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Override the listen port from the config file.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quill_gateway=info,quill_agent=info,tower_http=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = quill_domain::config::Config::load(&cli.config)?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let state = bootstrap::build_state(config)?;
    bootstrap::serve(state).await?;
    Ok(())
}
