//! Conversation engine — per-turn state machine over the webhook channel.

pub mod dispatcher;
pub mod resolver;
pub mod session;
pub mod summary;

use std::sync::Arc;

use crate::channels::{ListItem, WhatsAppClient};
use crate::collaborators::{AccountClient, ChatClient, PlanClient};
use crate::config::SESSION_TTL;
use crate::conversation::session::Session;
use crate::error::Result;
use crate::store::KvStore;

pub use session::{MealSlot, PendingAction, Step};

/// One inbound delivery, reduced to the fields the engine consumes.
#[derive(Debug, Clone)]
pub struct TurnInput {
    /// Sender phone (channel identity).
    pub phone: String,
    /// Provider delivery id, used for idempotency.
    pub message_id: String,
    /// Free-form text, if any (text body, button text, or reply title).
    pub text: Option<String>,
    /// Selected list row id, if the user picked from a menu.
    pub list_reply_id: Option<String>,
}

/// The conversation engine: resolves each turn against the session and
/// executes intents against the collaborators.
///
/// Holds no mutable state of its own — everything cross-turn lives in the
/// key-value store. Constructed once per process and shared via `Arc`.
pub struct ConversationEngine {
    store: Arc<dyn KvStore>,
    messenger: Arc<WhatsAppClient>,
    plans: PlanClient,
    accounts: AccountClient,
    chat: ChatClient,
}

impl ConversationEngine {
    pub fn new(
        store: Arc<dyn KvStore>,
        messenger: Arc<WhatsAppClient>,
        plans: PlanClient,
        accounts: AccountClient,
        chat: ChatClient,
    ) -> Self {
        Self {
            store,
            messenger,
            plans,
            accounts,
            chat,
        }
    }

    /// Spawn a best-effort read receipt. Never awaited in the turn; failure
    /// is logged and discarded.
    pub fn spawn_mark_read(&self, message_id: &str) {
        let messenger = Arc::clone(&self.messenger);
        let message_id = message_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = messenger.mark_read(&message_id).await {
                tracing::debug!(message_id, error = %e, "Read receipt failed");
            }
        });
    }

    /// Write the session back with a fresh 30-minute expiry.
    pub(crate) async fn persist(&self, session: &Session) -> Result<()> {
        self.store.save_session(session, SESSION_TTL).await?;
        Ok(())
    }

    pub(crate) async fn send_text(&self, to: &str, body: &str) -> Result<()> {
        self.messenger.send_text(to, body).await?;
        Ok(())
    }

    /// Send the main single-select menu.
    pub(crate) async fn send_menu(&self, to: &str) -> Result<()> {
        self.messenger
            .send_list(to, "Choose one option:", "Options", "NutriSuite", &menu_items())
            .await?;
        Ok(())
    }

    pub(crate) fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    pub(crate) fn plans(&self) -> &PlanClient {
        &self.plans
    }

    pub(crate) fn accounts(&self) -> &AccountClient {
        &self.accounts
    }

    pub(crate) fn chat(&self) -> &ChatClient {
        &self.chat
    }
}

/// Today's date the way the plan service keys plans.
pub(crate) fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

/// The seven canonical menu rows.
fn menu_items() -> Vec<ListItem> {
    vec![
        ListItem::new("plan", "Generate plan", "Create today's meal plan"),
        ListItem::new("accept", "Accept plan", "Lock today's plan"),
        ListItem::new("reject", "Reject plan", "Remove today's plan"),
        ListItem::new("swap-breakfast", "Swap breakfast", "Replace breakfast"),
        ListItem::new("swap-lunch", "Swap lunch", "Replace lunch"),
        ListItem::new("swap-dinner", "Swap dinner", "Replace dinner"),
        ListItem::new("show-today", "Show today", "View today's plan"),
    ]
}
