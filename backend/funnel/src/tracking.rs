//! Conversion tracking: one event, one `event_id`, many delivery surfaces.
//!
//! The tracker is best-effort: a surface that fails or is unavailable is
//! logged and reported in the [`TrackOutcome`], never raised to the caller.
//! Meta deduplicates the server and pixel copies of an event by `event_id`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::events::{ClientContext, CustomData, EventName, TrackedEvent};
use crate::fields::LeadInput;

/// What a surface did with an event it accepted without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Skipped(String),
}

/// A channel that reports conversion events (server API, browser pixel, …).
#[async_trait]
pub trait DeliverySurface: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, event: &TrackedEvent) -> Result<Delivery>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurfaceReport {
    pub surface: &'static str,
    pub status: DeliveryStatus,
}

/// Result of publishing one event to every surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackOutcome {
    pub event_id: String,
    pub reports: Vec<SurfaceReport>,
}

impl TrackOutcome {
    pub fn delivered_count(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.status == DeliveryStatus::Delivered)
            .count()
    }
}

pub struct EventTracker {
    surfaces: Vec<Arc<dyn DeliverySurface>>,
}

impl EventTracker {
    /// Surfaces are tried in the given order.
    pub fn new(surfaces: Vec<Arc<dyn DeliverySurface>>) -> Self {
        Self { surfaces }
    }

    /// Build an event for `event_name` and publish it.
    pub async fn track(
        &self,
        event_name: EventName,
        client: &ClientContext,
        custom_data: CustomData,
    ) -> TrackOutcome {
        let event = TrackedEvent::new(event_name, client, custom_data);
        self.publish(&event).await
    }

    pub async fn track_initiate_checkout(
        &self,
        client: &ClientContext,
        lead: &LeadInput,
    ) -> TrackOutcome {
        self.track(
            EventName::InitiateCheckout,
            client,
            CustomData::initiate_checkout(lead),
        )
        .await
    }

    pub async fn track_lead(&self, client: &ClientContext, lead: &LeadInput) -> TrackOutcome {
        self.track(EventName::Lead, client, CustomData::lead(lead))
            .await
    }

    /// Hand `event` to every surface in order. Each surface is isolated: its
    /// failure does not stop the ones after it.
    pub async fn publish(&self, event: &TrackedEvent) -> TrackOutcome {
        let mut reports = Vec::with_capacity(self.surfaces.len());

        for surface in &self.surfaces {
            let status = match surface.deliver(event).await {
                Ok(Delivery::Sent) => {
                    info!(
                        "{} tracked via {} (event_id={})",
                        event.event_name.as_str(),
                        surface.name(),
                        event.event_id
                    );
                    DeliveryStatus::Delivered
                }
                Ok(Delivery::Skipped(reason)) => {
                    debug!(
                        "{} skipped on {}: {reason}",
                        event.event_name.as_str(),
                        surface.name()
                    );
                    DeliveryStatus::Skipped(reason)
                }
                Err(e) => {
                    warn!(
                        "{} failed on {} (event_id={}): {e}",
                        event.event_name.as_str(),
                        surface.name(),
                        event.event_id
                    );
                    DeliveryStatus::Failed(e.to_string())
                }
            };
            reports.push(SurfaceReport {
                surface: surface.name(),
                status,
            });
        }

        TrackOutcome {
            event_id: event.event_id.clone(),
            reports,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FunnelError;
    use crate::testing::{EventLog, RecordingSurface};

    #[tokio::test]
    async fn every_surface_sees_the_same_event_id() {
        let log = EventLog::default();
        let tracker = EventTracker::new(vec![
            Arc::new(RecordingSurface::new("server", log.clone())),
            Arc::new(RecordingSurface::new("pixel", log.clone())),
        ]);

        let outcome = tracker
            .track_initiate_checkout(&ClientContext::default(), &LeadInput::default())
            .await;

        let seen = log.events();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1.event_id, outcome.event_id);
        assert_eq!(seen[1].1.event_id, outcome.event_id);
        assert_eq!(seen[0].0, "server");
        assert_eq!(seen[1].0, "pixel");
        assert_eq!(outcome.delivered_count(), 2);
    }

    #[tokio::test]
    async fn failing_surface_does_not_stop_the_next() {
        let log = EventLog::default();
        let tracker = EventTracker::new(vec![
            Arc::new(RecordingSurface::failing(
                "server",
                log.clone(),
                FunnelError::ConversionsRejected {
                    status: 400,
                    body: "bad token".to_string(),
                },
            )),
            Arc::new(RecordingSurface::new("pixel", log.clone())),
        ]);

        let outcome = tracker
            .track(EventName::Lead, &ClientContext::default(), CustomData::default())
            .await;

        assert_eq!(log.events().len(), 2);
        assert!(matches!(
            outcome.reports[0].status,
            DeliveryStatus::Failed(ref msg) if msg.contains("bad token")
        ));
        assert_eq!(outcome.reports[1].status, DeliveryStatus::Delivered);
    }

    #[tokio::test]
    async fn skipped_delivery_is_reported() {
        let log = EventLog::default();
        let tracker = EventTracker::new(vec![Arc::new(RecordingSurface::skipping(
            "pixel",
            log.clone(),
            "not loaded",
        ))]);

        let outcome = tracker
            .track(EventName::Lead, &ClientContext::default(), CustomData::default())
            .await;

        assert_eq!(
            outcome.reports[0].status,
            DeliveryStatus::Skipped("not loaded".to_string())
        );
        assert_eq!(outcome.delivered_count(), 0);
    }
}
