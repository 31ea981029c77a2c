//! Meta Conversions API client, the server-side delivery surface.
//!
//! ## Delivery policy
//!
//! * One attempt per event. Transport errors and non-2xx responses are turned
//!   into [`FunnelError`]s for the tracker to log; nothing is retried.
//! * The response body of a rejected request is kept for diagnostics.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::{FunnelError, Result};
use crate::events::TrackedEvent;
use crate::tracking::{Delivery, DeliverySurface};

const ACTION_SOURCE: &str = "website";

// ─────────────────────────────────────────────────────────
// Request shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ServerEvent<'a> {
    #[serde(flatten)]
    event: &'a TrackedEvent,
    action_source: &'static str,
}

pub struct ConversionsApi {
    client: Client,
    endpoint: String,
    access_token: String,
}

impl ConversionsApi {
    /// `endpoint` is the full events URL, e.g.
    /// `https://graph.facebook.com/v18.0/<pixel_id>/events`.
    pub fn new(client: Client, endpoint: String, access_token: String) -> Self {
        Self {
            client,
            endpoint,
            access_token,
        }
    }
}

/// Build the Conversions API request body for a single event.
pub fn build_payload(event: &TrackedEvent, access_token: &str) -> Result<Value> {
    let server_event = serde_json::to_value(ServerEvent {
        event,
        action_source: ACTION_SOURCE,
    })?;

    Ok(json!({
        "data": [server_event],
        "access_token": access_token,
    }))
}

#[async_trait]
impl DeliverySurface for ConversionsApi {
    fn name(&self) -> &'static str {
        "conversions_api"
    }

    async fn deliver(&self, event: &TrackedEvent) -> Result<Delivery> {
        let payload = build_payload(event, &self.access_token)?;

        let resp = self.client.post(&self.endpoint).json(&payload).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FunnelError::ConversionsRejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Conversions API accepted event {}", event.event_id);
        Ok(Delivery::Sent)
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
