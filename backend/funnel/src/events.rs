//! Conversion event types shared by every delivery surface.
//!
//! Field names follow the Meta Conversions API wire format so a
//! [`TrackedEvent`] serialises directly into the `data` array.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::fields::LeadInput;
use crate::format::currency_value;

const CONTENT_NAME: &str = "Energia Solar - Orçamento";
const CONTENT_CATEGORY: &str = "Energia Solar";
const QUOTE_CONTENT_ID: &str = "solar-quote";
const CURRENCY: &str = "BRL";

/// Standard Meta events emitted by the funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventName {
    /// The visitor opened the WhatsApp handoff.
    InitiateCheckout,
    /// The lead email was delivered.
    Lead,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitiateCheckout => "InitiateCheckout",
            Self::Lead => "Lead",
        }
    }
}

/// Browser-side identifiers used by Meta to match the event to a visitor.
/// Every value is opaque and may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbc: Option<String>,
}

/// Request-scoped context the shell hands to the core with each action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    pub user: UserContext,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentItem {
    pub id: String,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CustomData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contents: Vec<ContentItem>,
}

impl CustomData {
    /// Checkout data for the WhatsApp handoff: one quote line item titled
    /// after the lead's city.
    pub fn initiate_checkout(lead: &LeadInput) -> Self {
        Self {
            content_name: Some(CONTENT_NAME.to_string()),
            content_category: Some(CONTENT_CATEGORY.to_string()),
            contents: vec![ContentItem {
                id: QUOTE_CONTENT_ID.to_string(),
                quantity: 1,
                title: Some(format!("Orçamento Energia Solar - {}", lead.city)),
            }],
            ..Self::default()
        }
    }

    /// Lead data for a delivered quote request, valued at the monthly bill.
    pub fn lead(lead: &LeadInput) -> Self {
        let value = currency_value(&lead.monthly_energy_cost);
        Self {
            value,
            currency: value.map(|_| CURRENCY.to_string()),
            content_name: Some(CONTENT_NAME.to_string()),
            content_category: Some(CONTENT_CATEGORY.to_string()),
            ..Self::default()
        }
    }
}

/// One logical user action, reported once per delivery surface under the
/// same `event_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedEvent {
    pub event_id: String,
    pub event_name: EventName,
    /// Unix seconds.
    pub event_time: i64,
    pub event_source_url: Option<String>,
    pub user_data: UserContext,
    pub custom_data: CustomData,
}

impl TrackedEvent {
    pub fn new(event_name: EventName, client: &ClientContext, custom_data: CustomData) -> Self {
        Self {
            event_id: Uuid::now_v7().to_string(),
            event_name,
            event_time: Utc::now().timestamp(),
            event_source_url: client.source_url.clone(),
            user_data: client.user.clone(),
            custom_data,
        }
    }
}
