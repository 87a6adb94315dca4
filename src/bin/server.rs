//! WebResearcher server - session API with SSE progress streaming.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use webresearcher::config::Config;
use webresearcher::server::router;
use webresearcher::session::SessionManager;

#[derive(Parser)]
#[command(name = "webresearcher-server", about = "WebResearcher session API", version)]
struct Args {
    /// Bind address
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port
    #[arg(long, short, default_value = "8000")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    info!(
        "History file: {} | model: {}",
        config.history_path.display(),
        config.llm.model
    );

    let manager = Arc::new(SessionManager::new(config)?);
    let app = router(manager);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .context("invalid bind address")?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
