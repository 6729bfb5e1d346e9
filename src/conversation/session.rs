//! Conversation session — per-phone state carried across webhook turns.

use serde::{Deserialize, Serialize};

/// The expected-input mode of a conversation.
///
/// Legal transitions: `Menu → NeedEmail → NeedPassword → Menu`, plus the
/// short-circuits `Menu → Menu` and `NeedEmail → Menu` when an account
/// lookup succeeds. Nothing else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    #[default]
    Menu,
    NeedEmail,
    NeedPassword,
}

impl Step {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: Step) -> bool {
        use Step::*;
        matches!(
            (self, target),
            (Menu, NeedEmail) | (NeedEmail, NeedPassword) | (NeedPassword, Menu)
                | (Menu, Menu)
                | (NeedEmail, Menu)
        )
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Menu => "menu",
            Self::NeedEmail => "need-email",
            Self::NeedPassword => "need-password",
        };
        write!(f, "{s}")
    }
}

/// A meal slot within a day's plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealSlot {
    /// The wire name used by the plan service (`meal_type`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
        }
    }
}

impl std::fmt::Display for MealSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A menu-selected intent, deferred until the user is authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PendingAction {
    /// Generate (or fetch) today's plan.
    Plan,
    /// Accept and lock today's plan.
    Accept,
    /// Reject today's plan; the service replaces it.
    Reject,
    /// Swap a single meal slot.
    Swap { meal: MealSlot },
    /// Show today's plan.
    Show,
}

impl PendingAction {
    /// Map a list-reply row id to an action. Unknown ids map to nothing.
    pub fn from_menu_id(id: &str) -> Option<Self> {
        match id {
            "plan" => Some(Self::Plan),
            "accept" => Some(Self::Accept),
            "reject" => Some(Self::Reject),
            "swap-breakfast" => Some(Self::Swap { meal: MealSlot::Breakfast }),
            "swap-lunch" => Some(Self::Swap { meal: MealSlot::Lunch }),
            "swap-dinner" => Some(Self::Swap { meal: MealSlot::Dinner }),
            "show-today" => Some(Self::Show),
            _ => None,
        }
    }
}

/// Per-phone conversational state, persisted in the key-value store with a
/// sliding 30-minute expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Channel identity. Immutable once created.
    pub phone: String,
    /// Linked account id; `None` means unauthenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Normalized (trimmed, lowercased) email captured during login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Which inputs are accepted next.
    #[serde(default)]
    pub step: Step,
    /// Intent selected via menu, executed once authentication completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<PendingAction>,
}

impl Session {
    /// A fresh default session for an unseen phone.
    pub fn new(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            user_id: None,
            email: None,
            step: Step::Menu,
            pending_action: None,
        }
    }

    /// Whether the phone has been linked to an account.
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}
