//! reddit-watch binary entrypoint.
//! Loads config, builds the source adapter and renderers, serves the control API.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reddit_watch::config::WatchConfig;
use reddit_watch::metrics::Metrics;
use reddit_watch::render::{
    Board, LogRenderer, Renderer, RendererMux, SlackRenderer, StatusLevel, StatusMessage,
};
use reddit_watch::scheduler::{Session, IDLE_HINT};
use reddit_watch::{api, source};

/// Compact human logs by default; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("reddit_watch=info,watch=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = ?e, "ctrl-c handler failed");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    // Config and credential problems are fatal before any polling starts.
    let cfg = WatchConfig::load_default().context("loading configuration")?;
    let adapter = source::build_adapter(&cfg).context("building source adapter")?;
    let initial = cfg.initial_request().context("initial search request")?;

    let metrics = Metrics::init()?;

    let board = Board::default();
    let mut mux = RendererMux::new(vec![Arc::new(board.clone()), Arc::new(LogRenderer)]);
    if let Some(slack) = SlackRenderer::from_env() {
        tracing::info!("slack webhook renderer enabled");
        mux.push(Arc::new(slack));
    }

    let session = Arc::new(
        Session::new(adapter, Arc::new(mux)).with_progress_steps(cfg.watch.progress_steps),
    );
    match initial {
        Some(request) => session.start(request).await,
        None => {
            board
                .publish_status(&StatusMessage {
                    level: StatusLevel::Info,
                    text: IDLE_HINT.to_string(),
                })
                .await
        }
    }

    let state = api::AppState {
        session: session.clone(),
        board,
        defaults: cfg.watch.clone(),
    };
    let app = api::router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind))?;
    tracing::info!(bind = %cfg.server.bind, "control API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving control API")?;

    session.stop().await;
    Ok(())
}
