//! Lead email composition and the EmailJS delivery client.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::errors::{FunnelError, Result};
use crate::fields::LeadInput;

/// Where lead emails go and who they claim to come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub to_name: String,
    pub to_email: String,
    pub from_email: String,
}

/// Template parameters of the lead notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeadEmail {
    pub to_name: String,
    pub to_email: String,
    pub from_name: String,
    pub from_email: String,
    pub client_name: String,
    pub client_phone: String,
    pub client_city: String,
    pub client_energy_cost: String,
    pub submit_date: String,
    pub message: String,
}

impl LeadEmail {
    pub fn compose<Tz>(lead: &LeadInput, mailbox: &Mailbox, submitted_at: DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let submit_date = submitted_at.format("%d/%m/%Y, %H:%M:%S").to_string();
        let message = format!(
            "Novo lead recebido do site:\n\n\
             Nome: {}\n\
             Telefone: {}\n\
             Cidade: {}\n\
             Custo mensal de energia: R$ {}\n\
             Data: {submit_date}",
            lead.name, lead.phone, lead.city, lead.monthly_energy_cost,
        );

        Self {
            to_name: mailbox.to_name.clone(),
            to_email: mailbox.to_email.clone(),
            from_name: lead.name.clone(),
            from_email: mailbox.from_email.clone(),
            client_name: lead.name.clone(),
            client_phone: lead.phone.clone(),
            client_city: lead.city.clone(),
            client_energy_cost: lead.monthly_energy_cost.clone(),
            submit_date,
            message,
        }
    }
}

/// Transactional email collaborator.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &LeadEmail) -> Result<()>;
}

/// Identity of the EmailJS service and template used for lead emails.
#[derive(Debug, Clone)]
pub struct EmailJsOptions {
    pub api_url: String,
    pub service_id: String,
    pub template_id: String,
    pub public_key: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    template_params: &'a LeadEmail,
}

pub struct EmailJsClient {
    client: Client,
    options: EmailJsOptions,
}

impl EmailJsClient {
    pub fn new(client: Client, options: EmailJsOptions) -> Self {
        Self { client, options }
    }
}

#[async_trait]
impl EmailSender for EmailJsClient {
    async fn send(&self, email: &LeadEmail) -> Result<()> {
        let request = SendRequest {
            service_id: &self.options.service_id,
            template_id: &self.options.template_id,
            user_id: &self.options.public_key,
            template_params: email,
        };

        let resp = self
            .client
            .post(&self.options.api_url)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(FunnelError::EmailRejected {
                status: status.as_u16(),
                text,
            });
        }

        debug!("EmailJS accepted lead email for {}", email.client_name);
        Ok(())
    }
}
