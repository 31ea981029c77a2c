//! Form session and the two submission actions.
//!
//! Both actions are gated on a complete form. The email action additionally
//! allows a single submission in flight and drives [`SubmissionStatus`]; the
//! WhatsApp action records the conversion and then hands off the deep link.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::email::{EmailSender, LeadEmail, Mailbox};
use crate::errors::FunnelError;
use crate::events::ClientContext;
use crate::fields::{FieldKey, FieldStore, LeadInput};
use crate::messaging::{LinkOpener, MessagingTarget};
use crate::tracking::{EventTracker, TrackOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Idle,
    Submitting,
    Success,
    Error,
}

/// Everything the shell needs to render the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormSnapshot {
    pub fields: LeadInput,
    pub complete: bool,
    pub status: SubmissionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Form incomplete; nothing happened.
    Incomplete,
    /// Another submission is still in flight; nothing happened.
    InFlight,
    Sent,
    Failed,
}

/// Result of a WhatsApp handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Handoff {
    pub url: String,
    pub tracking: TrackOutcome,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub mailbox: Mailbox,
    pub messaging: MessagingTarget,
    pub success_reset: Duration,
    pub error_reset: Duration,
    pub email_timeout: Duration,
}

#[derive(Debug)]
struct Session {
    store: FieldStore,
    status: SubmissionStatus,
    in_flight: bool,
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(|e| e.into_inner())
}

/// Releases the in-flight flag however the email action exits.
struct InFlightGuard {
    session: Arc<Mutex<Session>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.session).in_flight = false;
    }
}

pub struct Orchestrator {
    session: Arc<Mutex<Session>>,
    email: Arc<dyn EmailSender>,
    tracker: Arc<EventTracker>,
    opener: Arc<dyn LinkOpener>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        email: Arc<dyn EmailSender>,
        tracker: Arc<EventTracker>,
        opener: Arc<dyn LinkOpener>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session {
                store: FieldStore::new(),
                status: SubmissionStatus::Idle,
                in_flight: false,
            })),
            email,
            tracker,
            opener,
            settings,
        }
    }

    pub fn snapshot(&self) -> FormSnapshot {
        let session = lock(&self.session);
        FormSnapshot {
            fields: session.store.lead().clone(),
            complete: session.store.is_complete(),
            status: session.status,
        }
    }

    pub fn on_field_change(&self, key: FieldKey, raw: &str) -> FormSnapshot {
        lock(&self.session).store.set_field(key, raw);
        self.snapshot()
    }

    /// Send the lead by email.
    ///
    /// Status goes `submitting` → `success` | `error`, then back to `idle`
    /// after the configured delay. Success also clears the form.
    pub async fn submit_email(&self, client: &ClientContext) -> SubmitOutcome {
        let (lead, _guard) = {
            let mut session = lock(&self.session);
            if !session.store.is_complete() {
                debug!("Email submission ignored: form incomplete");
                return SubmitOutcome::Incomplete;
            }
            if session.in_flight {
                debug!("Email submission ignored: already in flight");
                return SubmitOutcome::InFlight;
            }
            session.in_flight = true;
            session.status = SubmissionStatus::Submitting;
            let guard = InFlightGuard {
                session: Arc::clone(&self.session),
            };
            (session.store.lead().clone(), guard)
        };

        let email = LeadEmail::compose(&lead, &self.settings.mailbox, Local::now());
        let result = match tokio::time::timeout(self.settings.email_timeout, self.email.send(&email))
            .await
        {
            Ok(res) => res,
            Err(_) => Err(FunnelError::Timeout(self.settings.email_timeout)),
        };

        match result {
            Ok(()) => {
                info!("Lead email sent for {}", lead.name);
                lock(&self.session).status = SubmissionStatus::Success;
                self.schedule_revert(self.settings.success_reset, true);
                self.spawn_lead_event(client.clone(), lead);
                SubmitOutcome::Sent
            }
            Err(e) => {
                error!("Failed to send lead email: {e}");
                if let Some(text) = e.text() {
                    error!("Email provider response: {text}");
                }
                if let Some(status) = e.status() {
                    error!("Email provider status: {status}");
                }
                lock(&self.session).status = SubmissionStatus::Error;
                self.schedule_revert(self.settings.error_reset, false);
                SubmitOutcome::Failed
            }
        }
    }

    /// Record the checkout conversion, then open the WhatsApp deep link.
    ///
    /// Returns `None` when the form is incomplete.
    pub async fn submit_messaging(&self, client: &ClientContext) -> Option<Handoff> {
        let lead = {
            let session = lock(&self.session);
            if !session.store.is_complete() {
                debug!("WhatsApp handoff ignored: form incomplete");
                return None;
            }
            session.store.lead().clone()
        };

        let tracking = self.tracker.track_initiate_checkout(client, &lead).await;
        debug!(
            "Checkout {} delivered on {}/{} surfaces",
            tracking.event_id,
            tracking.delivered_count(),
            tracking.reports.len()
        );

        let url = self.settings.messaging.deep_link(&lead);
        self.opener.open(&url);

        Some(Handoff { url, tracking })
    }

    /// Revert to `idle` after `delay`, optionally clearing the form.
    /// Later edits do not cancel a pending revert.
    fn schedule_revert(&self, delay: Duration, clear_fields: bool) {
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut session = lock(&session);
            if clear_fields {
                session.store.clear();
            }
            session.status = SubmissionStatus::Idle;
            debug!("Submission status reverted to idle");
        });
    }

    fn spawn_lead_event(&self, client: ClientContext, lead: LeadInput) {
        let tracker = Arc::clone(&self.tracker);
        tokio::spawn(async move {
            tracker.track_lead(&client, &lead).await;
        });
    }
}
