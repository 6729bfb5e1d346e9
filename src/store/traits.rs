//! Key-value store trait — sessions and idempotency markers.

use std::time::Duration;

use async_trait::async_trait;

use crate::conversation::session::Session;
use crate::error::StoreError;

/// Backend-agnostic key-value store backing the session store and the
/// idempotency guard.
///
/// All cross-turn state lives here; the engine itself holds no mutable
/// shared state. Two concurrent deliveries for the same phone are a
/// read-modify-write race on the session — a known limitation, acceptable at
/// single-user concurrency.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Load the session for a phone, refreshing its expiry.
    ///
    /// Returns a fresh default session when none exists or the stored one
    /// has expired — this never fails the conversation path.
    async fn load_session(&self, phone: &str) -> Result<Session, StoreError>;

    /// Persist a session with the given time-to-live.
    async fn save_session(&self, session: &Session, ttl: Duration) -> Result<(), StoreError>;

    /// Whether this delivery id has already been processed.
    ///
    /// Check-then-set with [`mark_seen`](Self::mark_seen) is not atomic; a
    /// duplicate delivered within the same few milliseconds can slip
    /// through. Downstream plan operations tolerate the rare double fire.
    async fn seen(&self, message_id: &str) -> Result<bool, StoreError>;

    /// Record a delivery id with the given time-to-live.
    async fn mark_seen(&self, message_id: &str, ttl: Duration) -> Result<(), StoreError>;
}
