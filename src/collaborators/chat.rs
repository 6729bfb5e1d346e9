//! Chat-completion proxy client — forwards free-form nutrition questions.

use serde::Deserialize;

use crate::error::CollaboratorError;

const SERVICE: &str = "chat proxy";

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ChatResponse {
    reply: Option<String>,
}

/// HTTP client for the chat-completion proxy.
pub struct ChatClient {
    base_url: String,
    client: reqwest::Client,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Forward a message verbatim. `Ok(None)` means the proxy answered but
    /// produced no usable reply; callers word that case differently from a
    /// transport failure.
    pub async fn forward(&self, message: &str) -> Result<Option<String>, CollaboratorError> {
        let url = format!("{}/chat/message", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await
            .map_err(|e| CollaboratorError::RequestFailed {
                service: SERVICE,
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(CollaboratorError::BadStatus {
                service: SERVICE,
                status: resp.status().as_u16(),
            });
        }

        let body: ChatResponse =
            resp.json()
                .await
                .map_err(|e| CollaboratorError::InvalidResponse {
                    service: SERVICE,
                    reason: e.to_string(),
                })?;

        Ok(extract_reply(body))
    }
}

fn extract_reply(body: ChatResponse) -> Option<String> {
    body.reply.filter(|r| !r.trim().is_empty())
}
