//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::email::{EmailJsOptions, Mailbox};
use crate::errors::{FunnelError, Result};
use crate::messaging::MessagingTarget;
use crate::orchestrator::OrchestratorSettings;
use crate::pixel::WaitPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the shell-facing HTTP API
    pub api_port: u16,
    /// Public URL of the landing page, used as `event_source_url` when the
    /// request carries no Referer
    pub site_url: String,
    /// Graph API base (e.g. https://graph.facebook.com)
    pub graph_api_url: String,
    /// Graph API version segment (e.g. v18.0)
    pub graph_api_version: String,
    /// Meta Pixel / dataset ID
    pub pixel_id: String,
    /// Conversions API access token
    pub conversions_access_token: String,
    pub email: EmailJsOptions,
    pub mailbox: Mailbox,
    pub messaging: MessagingTarget,
    /// How long the success banner stays before the form is cleared
    pub success_reset: Duration,
    /// How long the error banner stays before reverting to idle
    pub error_reset: Duration,
    /// Upper bound on a single email delivery attempt
    pub email_timeout: Duration,
    /// Bounded poll for the browser pixel
    pub pixel_wait: WaitPolicy,
    /// Default timeout for outbound HTTP requests
    pub http_timeout: Duration,
    /// Form sessions untouched for this long are dropped
    pub session_idle_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key → value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        Ok(Config {
            api_port: vars.parse_or("API_PORT", 3001)?,
            site_url: vars.or("SITE_URL", "http://localhost:8080/"),
            graph_api_url: vars.or("GRAPH_API_URL", "https://graph.facebook.com"),
            graph_api_version: vars.or("GRAPH_API_VERSION", "v18.0"),
            pixel_id: vars.required("META_PIXEL_ID")?,
            conversions_access_token: vars.required("META_ACCESS_TOKEN")?,
            email: EmailJsOptions {
                api_url: vars.or("EMAILJS_API_URL", "https://api.emailjs.com/api/v1.0/email/send"),
                service_id: vars.required("EMAILJS_SERVICE_ID")?,
                template_id: vars.required("EMAILJS_TEMPLATE_ID")?,
                public_key: vars.required("EMAILJS_PUBLIC_KEY")?,
            },
            mailbox: Mailbox {
                to_name: vars.or("LEAD_INBOX_NAME", "SunCare"),
                to_email: vars.required("LEAD_INBOX_EMAIL")?,
                from_email: vars.or("LEAD_SENDER_EMAIL", "noreply@suncare.com.br"),
            },
            messaging: MessagingTarget {
                domain: vars.or("WHATSAPP_DOMAIN", "wa.me"),
                recipient: vars.required("WHATSAPP_RECIPIENT")?,
            },
            success_reset: Duration::from_millis(vars.parse_or("SUCCESS_RESET_MS", 3000)?),
            error_reset: Duration::from_millis(vars.parse_or("ERROR_RESET_MS", 5000)?),
            email_timeout: Duration::from_secs(vars.parse_or("EMAIL_TIMEOUT_SECS", 15)?),
            pixel_wait: WaitPolicy {
                interval: Duration::from_millis(vars.positive("PIXEL_POLL_INTERVAL_MS", 100)?),
                timeout: Duration::from_millis(vars.positive("PIXEL_WAIT_TIMEOUT_MS", 10_000)?),
            },
            http_timeout: Duration::from_secs(vars.parse_or("HTTP_TIMEOUT_SECS", 30)?),
            session_idle_ttl: Duration::from_secs(vars.positive("SESSION_IDLE_TTL_SECS", 1800)?),
        })
    }

    /// Conversions API events endpoint for the configured pixel.
    pub fn conversions_endpoint(&self) -> String {
        format!(
            "{}/{}/{}/events",
            self.graph_api_url.trim_end_matches('/'),
            self.graph_api_version,
            self.pixel_id
        )
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            mailbox: self.mailbox.clone(),
            messaging: self.messaging.clone(),
            success_reset: self.success_reset,
            error_reset: self.error_reset,
            email_timeout: self.email_timeout,
        }
    }
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.get(key)
            .ok_or_else(|| FunnelError::Config(format!("{key} environment variable is required")))
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| FunnelError::Config(format!("Invalid {key}"))),
        }
    }

    /// Like `parse_or`, but zero is rejected.
    fn positive(&self, key: &str, default: u64) -> Result<u64> {
        match self.parse_or(key, default)? {
            0 => Err(FunnelError::Config(format!("{key} must be greater than zero"))),
            n => Ok(n),
        }
    }
}
