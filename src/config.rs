//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Per-conversation session lifetime. Fixed at 30 minutes; after that the
/// user restarts the login flow.
pub const SESSION_TTL: Duration = Duration::from_secs(60 * 30);

/// Lifetime of a seen-message marker. Only needs to cover the provider's
/// retry window, so minutes rather than hours.
pub const SEEN_TTL: Duration = Duration::from_secs(60 * 5);

/// Engine configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Token echoed back during the webhook verification handshake.
    pub verify_token: String,
    /// WhatsApp Business phone number id (path segment of the send endpoint).
    pub phone_number_id: String,
    /// Graph API bearer token.
    pub access_token: SecretString,
    /// Base URL of the plan/account service.
    pub app_base_url: String,
    /// Base URL of the chat-completion proxy.
    pub chat_base_url: String,
    /// Path of the shared key-value store database.
    pub store_path: String,
    /// Port the webhook listens on.
    pub port: u16,
}

impl Config {
    /// Build a config from the environment.
    ///
    /// `WA_VERIFY_TOKEN`, `WHATSAPP_PHONE_NUMBER_ID` and
    /// `WHATSAPP_ACCESS_TOKEN` are required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            verify_token: require("WA_VERIFY_TOKEN")?,
            phone_number_id: require("WHATSAPP_PHONE_NUMBER_ID")?,
            access_token: SecretString::from(require("WHATSAPP_ACCESS_TOKEN")?),
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            chat_base_url: std::env::var("BACKEND_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string()),
            store_path: std::env::var("SESSION_DB_PATH")
                .unwrap_or_else(|_| "./data/nutri-assist.db".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "PORT".to_string(),
                    message: format!("{e}"),
                })?,
        })
    }
}

fn require(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}
