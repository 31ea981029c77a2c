//! Recording test doubles for the orchestrator's collaborators.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::email::{EmailSender, LeadEmail, Mailbox};
use crate::errors::{FunnelError, Result};
use crate::events::TrackedEvent;
use crate::messaging::{LinkOpener, MessagingTarget};
use crate::orchestrator::OrchestratorSettings;
use crate::tracking::{Delivery, DeliverySurface};

// =============================================================================
// Shared call log
// =============================================================================

/// Ordered record of everything the doubles saw, shared between them so tests
/// can assert cross-collaborator ordering.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<String>>>,
    events: Arc<Mutex<Vec<(&'static str, TrackedEvent)>>>,
}

impl EventLog {
    pub fn push(&self, entry: String) {
        self.entries.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// `(surface, event)` pairs in delivery order.
    pub fn events(&self) -> Vec<(&'static str, TrackedEvent)> {
        self.events.lock().unwrap().clone()
    }
}

// =============================================================================
// Delivery surface
// =============================================================================

pub struct RecordingSurface {
    name: &'static str,
    log: EventLog,
    failure: Mutex<Option<FunnelError>>,
    skip: Option<String>,
}

impl RecordingSurface {
    pub fn new(name: &'static str, log: EventLog) -> Self {
        Self {
            name,
            log,
            failure: Mutex::new(None),
            skip: None,
        }
    }

    /// Fails the first delivery with `error`, then behaves normally.
    pub fn failing(name: &'static str, log: EventLog, error: FunnelError) -> Self {
        Self {
            failure: Mutex::new(Some(error)),
            ..Self::new(name, log)
        }
    }

    pub fn skipping(name: &'static str, log: EventLog, reason: &str) -> Self {
        Self {
            skip: Some(reason.to_string()),
            ..Self::new(name, log)
        }
    }
}

#[async_trait]
impl DeliverySurface for RecordingSurface {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn deliver(&self, event: &TrackedEvent) -> Result<Delivery> {
        self.log
            .push(format!("{}:{}", self.name, event.event_name.as_str()));
        self.log
            .events
            .lock()
            .unwrap()
            .push((self.name, event.clone()));

        if let Some(err) = self.failure.lock().unwrap().take() {
            return Err(err);
        }
        match &self.skip {
            Some(reason) => Ok(Delivery::Skipped(reason.clone())),
            None => Ok(Delivery::Sent),
        }
    }
}

// =============================================================================
// Link opener
// =============================================================================

pub struct RecordingOpener {
    log: EventLog,
}

impl RecordingOpener {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

impl LinkOpener for RecordingOpener {
    fn open(&self, url: &str) {
        self.log.push(format!("open:{url}"));
    }
}

// =============================================================================
// Email sender
// =============================================================================

enum Reply {
    Now(Result<()>),
    Gate(oneshot::Receiver<Result<()>>),
}

/// Replies are consumed in order; once exhausted every send succeeds.
pub struct MockEmailSender {
    replies: Mutex<VecDeque<Reply>>,
    sent: Mutex<Vec<LeadEmail>>,
}

impl MockEmailSender {
    pub fn succeeding() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: FunnelError) -> Self {
        let mock = Self::succeeding();
        mock.push_result(Err(error));
        mock
    }

    /// The first send blocks until the returned sender supplies its result.
    pub fn gated() -> (Self, oneshot::Sender<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        let mock = Self::succeeding();
        mock.replies.lock().unwrap().push_back(Reply::Gate(rx));
        (mock, tx)
    }

    pub fn push_result(&self, result: Result<()>) {
        self.replies.lock().unwrap().push_back(Reply::Now(result));
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn sent(&self) -> Vec<LeadEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for MockEmailSender {
    async fn send(&self, email: &LeadEmail) -> Result<()> {
        self.sent.lock().unwrap().push(email.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            None => Ok(()),
            Some(Reply::Now(result)) => result,
            Some(Reply::Gate(rx)) => rx.await.unwrap_or(Ok(())),
        }
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Orchestrator settings with the production reset delays.
pub fn test_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        mailbox: Mailbox {
            to_name: "SunCare".to_string(),
            to_email: "leads@suncare.example".to_string(),
            from_email: "noreply@suncare.example".to_string(),
        },
        messaging: MessagingTarget {
            domain: "wa.me".to_string(),
            recipient: "5567998031541".to_string(),
        },
        success_reset: Duration::from_millis(3000),
        error_reset: Duration::from_millis(5000),
        email_timeout: Duration::from_secs(15),
    }
}
