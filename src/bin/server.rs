//! Workforce analytics API server.

use anyhow::Context;
use chrono::Duration;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use workforce_analytics::api::{create_router, AppState};
use workforce_analytics::db::init_pool;
use workforce_analytics::llm::{CompletionProvider, LlmClient};
use workforce_analytics::observability::init_tracing;
use workforce_analytics::security::issue_token;
use workforce_analytics::Config;

#[derive(Parser)]
#[command(name = "workforce-analytics")]
#[command(about = "Workforce analytics REST API with a natural-language query agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Address to listen on (overrides BIND_ADDR)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print a signed bearer token for local testing
    IssueToken {
        #[arg(long)]
        user_id: Uuid,
        #[arg(long)]
        email: Option<String>,
        /// Token lifetime in hours
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;

    match cli.command {
        Command::Serve { bind } => serve(config, bind).await,
        Command::IssueToken { user_id, email, hours } => {
            let token = issue_token(&config.jwt_secret, user_id, email, Duration::hours(hours))?;
            println!("{token}");
            Ok(())
        }
    }
}

async fn serve(mut config: Config, bind: Option<String>) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        config.bind_addr = bind;
    }
    if config.llm_api_key.is_none() {
        warn!("LLM_API_KEY is not set; chat and classification requests will fail");
    }

    let pool = init_pool(&config.database_url)
        .await
        .context("connecting to the database")?;
    let llm: Arc<dyn CompletionProvider> = Arc::new(LlmClient::from_config(&config)?);
    let addr = config.bind_addr.clone();
    let app = create_router(Arc::new(AppState::new(config, pool, llm)));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
}
