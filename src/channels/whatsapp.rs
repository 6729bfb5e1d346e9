//! WhatsApp channel — outbound sends via the Graph API messages endpoint.
//!
//! Stateless client: text messages, single-select list menus, and read
//! receipts. Inbound traffic arrives through the webhook, not here.

use secrecy::{ExposeSecret, SecretString};

use crate::error::ChannelError;

/// Default Graph API base.
const GRAPH_API_BASE: &str = "https://graph.facebook.com/v20.0";

/// A row in a single-select list message.
#[derive(Debug, Clone)]
pub struct ListItem {
    pub id: String,
    pub title: String,
    pub description: String,
}

impl ListItem {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
        }
    }
}

/// WhatsApp Business client — sends messages through the Graph API.
pub struct WhatsAppClient {
    api_base: String,
    phone_number_id: String,
    access_token: SecretString,
    client: reqwest::Client,
}

impl WhatsAppClient {
    pub fn new(phone_number_id: String, access_token: SecretString) -> Self {
        Self {
            api_base: GRAPH_API_BASE.to_string(),
            phone_number_id,
            access_token,
            client: reqwest::Client::new(),
        }
    }

    /// Point the client at a different API base (tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.api_base, self.phone_number_id)
    }

    async fn post_message(
        &self,
        kind: &'static str,
        to: &str,
        body: serde_json::Value,
    ) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.messages_url())
            .bearer_auth(self.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                kind,
                to: to.to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            tracing::warn!(%status, kind, "WhatsApp send failed: {err}");
            return Err(ChannelError::SendFailed {
                kind,
                to: to.to_string(),
                reason: format!("status {status}: {err}"),
            });
        }

        Ok(())
    }

    /// Send a plain text message.
    pub async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        let payload = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": recipient(to),
            "type": "text",
            "text": { "body": body, "preview_url": false },
        });
        self.post_message("text", to, payload).await
    }

    /// Send a single-select list menu (one section; WhatsApp requires sections).
    pub async fn send_list(
        &self,
        to: &str,
        body: &str,
        button_label: &str,
        section_title: &str,
        items: &[ListItem],
    ) -> Result<(), ChannelError> {
        let rows: Vec<serde_json::Value> = items
            .iter()
            .map(|it| {
                serde_json::json!({
                    "id": it.id,
                    "title": it.title,
                    "description": it.description,
                })
            })
            .collect();

        let payload = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": recipient(to),
            "type": "interactive",
            "interactive": {
                "type": "list",
                "body": { "text": body },
                "action": {
                    "button": button_label,
                    "sections": [{ "title": section_title, "rows": rows }],
                },
            },
        });
        self.post_message("list", to, payload).await
    }

    /// Mark an inbound message as read. Best-effort; callers spawn this and
    /// log the error rather than failing the turn.
    pub async fn mark_read(&self, message_id: &str) -> Result<(), ChannelError> {
        let payload = serde_json::json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": message_id,
        });
        self.post_message("read-receipt", message_id, payload).await
    }
}

/// The Graph API wants recipient numbers without the leading `+`.
fn recipient(to: &str) -> String {
    to.strip_prefix('+').unwrap_or(to).to_string()
}
