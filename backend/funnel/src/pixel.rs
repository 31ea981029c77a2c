//! Browser pixel delivery surface.
//!
//! The pixel global (`fbq`) loads asynchronously in the visitor's browser, so
//! delivery first waits for it with [`await_availability`], a bounded and
//! cancellable poll. If it never shows up the event is skipped on this surface;
//! the server-side copy still carries it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::Result;
use crate::events::{EventName, TrackedEvent};
use crate::tracking::{Delivery, DeliverySurface};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Ready,
    TimedOut,
    Cancelled,
}

/// Poll `probe` every `policy.interval` until it returns true, the timeout
/// elapses, or `cancel` fires. The first probe happens immediately, and the
/// interval is never shorter than a millisecond.
pub async fn await_availability<P>(
    mut probe: P,
    policy: WaitPolicy,
    cancel: &CancellationToken,
) -> Availability
where
    P: FnMut() -> bool,
{
    let poll = async {
        let mut ticker = tokio::time::interval(policy.interval.max(MIN_POLL_INTERVAL));
        loop {
            ticker.tick().await;
            if probe() {
                return;
            }
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Availability::Cancelled,
        res = tokio::time::timeout(policy.timeout, poll) => match res {
            Ok(()) => Availability::Ready,
            Err(_) => Availability::TimedOut,
        },
    }
}

/// `fbq('track', event_name, payload, { eventID: event_id })`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelCall {
    pub event_name: String,
    pub payload: Value,
    pub event_id: String,
}

/// The browser-side tracking global.
pub trait PixelGlobal: Send + Sync {
    fn is_loaded(&self) -> bool;

    fn track(&self, call: PixelCall);
}

/// Pixel payload for `event`. The pixel gets a slimmer custom-data block
/// than the server copy.
pub fn pixel_payload(event: &TrackedEvent) -> Value {
    let data = &event.custom_data;
    match event.event_name {
        EventName::InitiateCheckout => json!({
            "content_name": data.content_name.as_deref().unwrap_or_default(),
            "content_category": data.content_category.as_deref().unwrap_or_default(),
        }),
        EventName::Lead => json!({
            "content_name": data.content_name.as_deref().unwrap_or_default(),
        }),
    }
}

pub struct PixelSurface<G> {
    global: G,
    policy: WaitPolicy,
    cancel: CancellationToken,
}

impl<G: PixelGlobal> PixelSurface<G> {
    pub fn new(global: G, policy: WaitPolicy, cancel: CancellationToken) -> Self {
        Self {
            global,
            policy,
            cancel,
        }
    }
}

#[async_trait]
impl<G: PixelGlobal> DeliverySurface for PixelSurface<G> {
    fn name(&self) -> &'static str {
        "pixel"
    }

    async fn deliver(&self, event: &TrackedEvent) -> Result<Delivery> {
        match await_availability(|| self.global.is_loaded(), self.policy, &self.cancel).await {
            Availability::Ready => {}
            Availability::TimedOut => {
                return Ok(Delivery::Skipped(format!(
                    "pixel not loaded after {:?}",
                    self.policy.timeout
                )))
            }
            Availability::Cancelled => {
                return Ok(Delivery::Skipped("shutting down".to_string()))
            }
        }

        self.global.track(PixelCall {
            event_name: event.event_name.as_str().to_string(),
            payload: pixel_payload(event),
            event_id: event.event_id.clone(),
        });
        Ok(Delivery::Sent)
    }
}

/// Pixel global backed by the browser shell: the shell reports when `fbq`
/// has loaded, and queued calls are handed back for it to execute.
#[derive(Debug, Default)]
pub struct ShellPixel {
    loaded: AtomicBool,
    outbox: Mutex<Vec<PixelCall>>,
}

impl ShellPixel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_loaded(&self) {
        if !self.loaded.swap(true, Ordering::SeqCst) {
            info!("Pixel reported loaded by the shell");
        }
    }

    /// Take every queued call, oldest first.
    pub fn drain(&self) -> Vec<PixelCall> {
        std::mem::take(&mut *self.outbox.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl PixelGlobal for ShellPixel {
    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    fn track(&self, call: PixelCall) {
        debug!("Queued pixel call {} ({})", call.event_name, call.event_id);
        self.outbox
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

impl<T: PixelGlobal + ?Sized> PixelGlobal for std::sync::Arc<T> {
    fn is_loaded(&self) -> bool {
        (**self).is_loaded()
    }

    fn track(&self, call: PixelCall) {
        (**self).track(call)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::events::{ClientContext, CustomData};
    use crate::fields::LeadInput;

    fn quick() -> WaitPolicy {
        WaitPolicy {
            interval: Duration::from_millis(100),
            timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ready_immediately() {
        let cancel = CancellationToken::new();
        assert_eq!(
            await_availability(|| true, quick(), &cancel).await,
            Availability::Ready
        );
    }

    #[tokio::test(start_paused = true)]
    async fn becomes_ready_after_a_few_polls() {
        let cancel = CancellationToken::new();
        let mut probes = 0;
        let res = await_availability(
            || {
                probes += 1;
                probes == 4
            },
            quick(),
            &cancel,
        )
        .await;
        assert_eq!(res, Availability::Ready);
        assert_eq!(probes, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_never_ready() {
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();
        let res = await_availability(|| false, quick(), &cancel).await;
        assert_eq!(res, Availability::TimedOut);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_still_polls() {
        let cancel = CancellationToken::new();
        let policy = WaitPolicy {
            interval: Duration::ZERO,
            timeout: Duration::from_millis(50),
        };
        let mut probes = 0;
        let res = await_availability(
            || {
                probes += 1;
                probes == 3
            },
            policy,
            &cancel,
        )
        .await;
        assert_eq!(res, Availability::Ready);

        let res = await_availability(|| false, policy, &cancel).await;
        assert_eq!(res, Availability::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wins() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            await_availability(|| false, quick(), &cancel).await,
            Availability::Cancelled
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unloaded_pixel_is_skipped_silently() {
        let shell = Arc::new(ShellPixel::new());
        let surface = PixelSurface::new(shell.clone(), quick(), CancellationToken::new());
        let event = TrackedEvent::new(
            EventName::InitiateCheckout,
            &ClientContext::default(),
            CustomData::initiate_checkout(&LeadInput::default()),
        );

        let delivery = surface.deliver(&event).await.unwrap();

        assert!(matches!(delivery, Delivery::Skipped(_)));
        assert!(shell.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn loaded_pixel_receives_event_id() {
        let shell = Arc::new(ShellPixel::new());
        shell.mark_loaded();
        let surface = PixelSurface::new(shell.clone(), quick(), CancellationToken::new());
        let event = TrackedEvent::new(
            EventName::InitiateCheckout,
            &ClientContext::default(),
            CustomData::initiate_checkout(&LeadInput::default()),
        );

        assert_eq!(surface.deliver(&event).await.unwrap(), Delivery::Sent);

        let calls = shell.drain();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].event_name, "InitiateCheckout");
        assert_eq!(calls[0].event_id, event.event_id);
        assert_eq!(calls[0].payload["content_category"], "Energia Solar");
        assert!(shell.drain().is_empty());
    }

    #[test]
    fn lead_pixel_payload_has_content_name_only() {
        let event = TrackedEvent::new(
            EventName::Lead,
            &ClientContext::default(),
            CustomData::lead(&LeadInput::default()),
        );
        let payload = pixel_payload(&event);
        assert_eq!(
            payload,
            json!({ "content_name": "Energia Solar - Orçamento" })
        );
    }
}
