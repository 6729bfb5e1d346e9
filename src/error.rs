//! Error types for NutriSuite's conversation engine.

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Key-value store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Outbound messaging errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send {kind} message to {to}: {reason}")]
    SendFailed {
        kind: &'static str,
        to: String,
        reason: String,
    },
}

/// Errors talking to an external collaborator service.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Request to {service} failed: {reason}")]
    RequestFailed { service: &'static str, reason: String },

    #[error("{service} returned status {status}")]
    BadStatus { service: &'static str, status: u16 },

    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse { service: &'static str, reason: String },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
