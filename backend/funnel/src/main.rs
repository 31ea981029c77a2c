//! Lead funnel service entry point.
//!
//! Hosts the quote-form session: formats and gates the form fields, sends the
//! lead email, builds the WhatsApp handoff, and reports conversions to the
//! Meta Conversions API and the browser pixel under a shared event ID. The
//! browser shell talks to it through a small Axum JSON API.

mod api;
mod config;
mod conversions;
mod email;
mod errors;
mod events;
mod fields;
mod format;
mod messaging;
mod orchestrator;
mod pixel;
mod sessions;
#[cfg(test)]
mod testing;
mod tracking;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use conversions::ConversionsApi;
use email::EmailJsClient;
use messaging::ShellNavigator;
use sessions::{SessionParts, SessionRegistry};
use tracking::DeliverySurface;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // HTTP client shared by the email and Conversions API collaborators.
    let client = Client::builder().timeout(config.http_timeout).build()?;

    let shutdown = CancellationToken::new();

    // ─── Form sessions ────────────────────────────────────
    let conversions: Arc<dyn DeliverySurface> = Arc::new(ConversionsApi::new(
        client.clone(),
        config.conversions_endpoint(),
        config.conversions_access_token.clone(),
    ));
    let sessions = Arc::new(SessionRegistry::new(
        SessionParts {
            server_surfaces: vec![conversions],
            email: Arc::new(EmailJsClient::new(client, config.email.clone())),
            opener: Arc::new(ShellNavigator),
            settings: config.orchestrator_settings(),
            pixel_wait: config.pixel_wait,
            shutdown: shutdown.child_token(),
        },
        config.session_idle_ttl,
    ));
    tokio::spawn(sessions.clone().run_eviction(shutdown.child_token()));

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState {
        sessions,
        site_url: config.site_url.clone(),
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/lead", get(api::get_lead))
        .route("/lead/fields/:key", put(api::put_field))
        .route("/lead/email", post(api::submit_email))
        .route("/lead/whatsapp", post(api::submit_whatsapp))
        .route("/pixel/ready", post(api::pixel_ready))
        .route("/pixel/outbox", post(api::take_pixel_calls))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
