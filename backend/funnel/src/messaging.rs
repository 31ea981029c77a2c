//! WhatsApp handoff: the pre-filled message and its deep link.

use tracing::info;

use crate::fields::LeadInput;

/// Destination of the messaging deep link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagingTarget {
    /// e.g. `wa.me`
    pub domain: String,
    /// Recipient phone in international format, digits only.
    pub recipient: String,
}

impl MessagingTarget {
    /// `https://<domain>/<recipient>?text=<percent-encoded message>`
    pub fn deep_link(&self, lead: &LeadInput) -> String {
        let text = urlencoding::encode(&compose_message(lead)).into_owned();
        format!("https://{}/{}?text={text}", self.domain, self.recipient)
    }
}

pub fn compose_message(lead: &LeadInput) -> String {
    format!(
        "Nome do cliente: {}\nCidade: {}\nCusto mensal de energia: R$ {}\nOlá, quero saber mais sobre energia solar!",
        lead.name, lead.city, lead.monthly_energy_cost
    )
}

/// Opens a URL in a new browsing context.
pub trait LinkOpener: Send + Sync {
    fn open(&self, url: &str);
}

/// Navigation happens in the browser shell, which receives the link in the
/// handoff response; this side only records it.
#[derive(Debug, Default)]
pub struct ShellNavigator;

impl LinkOpener for ShellNavigator {
    fn open(&self, url: &str) {
        info!("Handing deep link to the shell: {url}");
    }
}
