use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

use knowledge_gateway::assistant::GeminiClient;
use knowledge_gateway::config::Args;
use knowledge_gateway::rate_limit::RateLimiter;
use knowledge_gateway::state::AppState;
use knowledge_gateway::store::Store;
use knowledge_gateway::{handlers, sweeper};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    // parse cli arguments
    let args = Args::parse();
    let limits = args.rate_limits();

    if args.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY not set, AI routes will fail");
    }

    let rate_limiter = Arc::new(RateLimiter::new(limits));
    let assistant = GeminiClient::new(
        reqwest::Client::new(),
        args.gemini_base_url.clone(),
        args.gemini_model.clone(),
        args.gemini_api_key.clone(),
    );

    // creating shared state
    let state = Arc::new(AppState {
        store: Store::new(),
        rate_limiter: Arc::clone(&rate_limiter),
        assistant: Arc::new(assistant),
    });

    // spawn the background sweeper
    let sweeper = sweeper::spawn(Arc::clone(&rate_limiter), args.sweep_interval());

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(port = args.port, "gateway listening");
    for (class, limit) in [
        ("ai_categorize", limits.categorize),
        ("ai_search", limits.search),
        ("default", limits.default),
    ] {
        info!(
            class,
            max_requests = limit.max_requests,
            window_ms = limit.window.as_millis() as u64,
            "rate limit"
        );
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown().await;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
