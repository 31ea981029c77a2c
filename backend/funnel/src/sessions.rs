//! Per-visitor form sessions.
//!
//! Every browser shell gets its own [`Orchestrator`] and [`ShellPixel`]
//! outbox, keyed by a UUID the shell sends back as the `funnel_session`
//! cookie or the `x-funnel-session` header. Sessions left idle longer than
//! the configured TTL are evicted by [`SessionRegistry::evict_idle`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::email::EmailSender;
use crate::messaging::LinkOpener;
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::pixel::{PixelSurface, ShellPixel, WaitPolicy};
use crate::tracking::{DeliverySurface, EventTracker};

pub const SESSION_COOKIE: &str = "funnel_session";
pub const SESSION_HEADER: &str = "x-funnel-session";

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct SessionParts {
    /// Server-side surfaces; each session appends its own pixel surface.
    pub server_surfaces: Vec<Arc<dyn DeliverySurface>>,
    pub email: Arc<dyn EmailSender>,
    pub opener: Arc<dyn LinkOpener>,
    pub settings: OrchestratorSettings,
    pub pixel_wait: WaitPolicy,
    pub shutdown: CancellationToken,
}

/// One visitor's form and pixel outbox.
#[derive(Clone)]
pub struct FormSession {
    pub orchestrator: Arc<Orchestrator>,
    pub pixel: Arc<ShellPixel>,
}

/// A session looked up for a request.
pub struct Resolved {
    pub id: String,
    pub session: FormSession,
    /// The id was not supplied by the shell and must be handed back to it.
    pub issued: bool,
}

struct Entry {
    session: FormSession,
    last_seen: Instant,
}

pub struct SessionRegistry {
    parts: SessionParts,
    idle_ttl: Duration,
    sessions: RwLock<HashMap<String, Entry>>,
}

impl SessionRegistry {
    pub fn new(parts: SessionParts, idle_ttl: Duration) -> Self {
        Self {
            parts,
            idle_ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Session for the id carried by `headers`, creating it when the id is
    /// unknown (e.g. evicted). A missing or malformed id gets a fresh one.
    pub async fn resolve(&self, headers: &HeaderMap) -> Resolved {
        let (id, issued) = match session_id(headers) {
            Some(id) => (id, false),
            None => (Uuid::now_v7().to_string(), true),
        };

        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry(id.clone()).or_insert_with(|| {
            debug!("Opened form session {id}");
            Entry {
                session: self.open_session(),
                last_seen: Instant::now(),
            }
        });
        entry.last_seen = Instant::now();

        Resolved {
            session: entry.session.clone(),
            id,
            issued,
        }
    }

    /// Drop every session idle for longer than the TTL. Returns how many
    /// were removed.
    pub async fn evict_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let ttl = self.idle_ttl;
        sessions.retain(|_, entry| entry.last_seen.elapsed() <= ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(
                "Evicted {evicted} idle form sessions ({} open)",
                sessions.len()
            );
        }
        evicted
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Periodically evict idle sessions until `shutdown` fires.
    pub async fn run_eviction(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.idle_ttl);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.evict_idle().await;
                }
            }
        }
    }

    fn open_session(&self) -> FormSession {
        let pixel = Arc::new(ShellPixel::new());

        let mut surfaces = self.parts.server_surfaces.clone();
        surfaces.push(Arc::new(PixelSurface::new(
            pixel.clone(),
            self.parts.pixel_wait,
            self.parts.shutdown.child_token(),
        )));

        let orchestrator = Arc::new(Orchestrator::new(
            self.parts.email.clone(),
            Arc::new(EventTracker::new(surfaces)),
            self.parts.opener.clone(),
            self.parts.settings.clone(),
        ));

        FormSession {
            orchestrator,
            pixel,
        }
    }
}

/// Session id from the `x-funnel-session` header, else the session cookie.
/// Only well-formed UUIDs are accepted.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    let header = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let cookie = || {
        headers
            .get(axum::http::header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|cookies| crate::api::cookie_value(cookies, SESSION_COOKIE))
    };

    header
        .or_else(cookie)
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .map(|id| id.to_string())
}
