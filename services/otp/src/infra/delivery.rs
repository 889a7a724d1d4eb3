use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use agri_domain::recipient::RecipientKind;

use crate::domain::repository::{DeliveryChannel, DeliveryError};
use crate::domain::types::OtpMessage;

// ── Log channel ───────────────────────────────────────────────────────────────

/// Development channel: logs the message instead of sending it. The code
/// itself is only emitted at `debug`.
#[derive(Clone, Debug, Default)]
pub struct LogChannel {
    pub name: &'static str,
}

impl DeliveryChannel for LogChannel {
    async fn send(&self, message: &OtpMessage) -> Result<(), DeliveryError> {
        info!(
            channel = self.name,
            recipient = %message.recipient.masked(),
            purpose = %message.purpose,
            expires_at = %message.expires_at,
            "otp message (not sent, log delivery)"
        );
        debug!(channel = self.name, code = %message.code, "otp code");
        Ok(())
    }
}

// ── Webhook channel ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct WebhookPayload<'a> {
    recipient: &'a str,
    purpose: &'a str,
    purpose_label: &'a str,
    code: &'a str,
    #[serde(serialize_with = "agri_core::serde::to_rfc3339_ms")]
    expires_at: chrono::DateTime<chrono::Utc>,
    ttl_minutes: i64,
}

/// Hands the rendered fields to an email or SMS gateway over HTTP. Templates,
/// sender identity and provider credentials live behind the gateway.
#[derive(Clone)]
pub struct WebhookChannel {
    client: Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl DeliveryChannel for WebhookChannel {
    async fn send(&self, message: &OtpMessage) -> Result<(), DeliveryError> {
        let payload = WebhookPayload {
            recipient: message.recipient.as_str(),
            purpose: message.purpose.as_str(),
            purpose_label: message.purpose.label(),
            code: &message.code,
            expires_at: message.expires_at,
            ttl_minutes: message.ttl_minutes,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError(format!("gateway unreachable: {e}")))?;
        if !response.status().is_success() {
            return Err(DeliveryError(format!(
                "gateway returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

// ── Runtime selection ─────────────────────────────────────────────────────────

/// Delivery adapter chosen at startup from configuration.
#[derive(Clone)]
pub enum DeliveryBackend {
    Log(LogChannel),
    Webhook(WebhookChannel),
}

impl DeliveryBackend {
    pub fn from_url(
        name: &'static str,
        url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(match url {
            Some(url) => Self::Webhook(WebhookChannel::new(url, timeout)?),
            None => Self::Log(LogChannel { name }),
        })
    }
}

impl DeliveryChannel for DeliveryBackend {
    async fn send(&self, message: &OtpMessage) -> Result<(), DeliveryError> {
        match self {
            Self::Log(channel) => channel.send(message).await,
            Self::Webhook(channel) => channel.send(message).await,
        }
    }
}

/// Sends email recipients through `email` and phone recipients through `sms`.
#[derive(Clone)]
pub struct ChannelRouter<E, S>
where
    E: DeliveryChannel,
    S: DeliveryChannel,
{
    pub email: E,
    pub sms: S,
}

impl<E, S> DeliveryChannel for ChannelRouter<E, S>
where
    E: DeliveryChannel,
    S: DeliveryChannel,
{
    async fn send(&self, message: &OtpMessage) -> Result<(), DeliveryError> {
        match message.recipient.kind() {
            RecipientKind::Email => self.email.send(message).await,
            RecipientKind::Phone => self.sms.send(message).await,
        }
    }
}
