/*
 * Responsibility
 * - Config load -> dependency wiring -> Router assembly
 * - Middleware application (API key gate / HTTP layers)
 * - Start with axum::serve()
 */
use std::{panic, process};

use anyhow::{Context, Result};
use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::middleware::{self, auth::AuthGate};
use crate::services::auth::build_key_verifier;
use crate::{api, state::AppState};

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,unkey_gate=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // stderr can be hidden depending on how the process is launched.
        tracing::error!(?info, "panic");

        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }));
}

pub async fn run() -> Result<()> {
    init_tracing();

    // A missing root key / API id stops us here, before anything is bound.
    let config = Config::from_env().inspect_err(|err| {
        tracing::error!(error = %err, "refusing to start");
    })?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting API in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let state = build_state(&config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_state(config: &Config) -> Result<AppState> {
    let verifier = build_key_verifier(config).context("failed to build key verifier")?;
    let gate = AuthGate::new(verifier, config.unkey.api_id.as_str());

    Ok(AppState::new(gate))
}

pub fn build_router(state: AppState) -> Router {
    let router = api::routes(state.clone()).with_state(state);

    middleware::http::apply(router)
}
