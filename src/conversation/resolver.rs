//! Step machine & intent resolution — decides what the user is trying to do.
//!
//! Resolution order per turn: greeting keyword, menu selection, the login
//! sub-flow (email, then password), then the authenticated chat
//! fallthrough. Every path that loads the session writes it back before
//! returning, which also refreshes the sliding expiry.

use std::sync::LazyLock;

use argon2::password_hash::{PasswordHasher, SaltString, rand_core::OsRng};
use argon2::Argon2;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::SEEN_TTL;
use crate::conversation::session::{PendingAction, Session, Step};
use crate::conversation::{ConversationEngine, TurnInput};
use crate::error::{Error, Result};

const GREETING: &str = "hello";
const MIN_PASSWORD_CHARS: usize = 6;

const WELCOME_TEXT: &str = "Hi! I'm your NutriSuite assistant.\n\n\
• *Generate plan* - create today's meal plan\n\
• *Accept/Reject* - confirm or discard today's plan\n\
• *Swap* - replace breakfast, lunch, or dinner\n\
• *Show today* - see today's plan\n\n\
Tap *Options* to choose, or just ask any nutrition question.";

const WELCOME_EMAIL_PROMPT: &str = "Welcome! Please type your *email address* to continue.";
const EMAIL_PROMPT: &str = "Please type your *email address* to continue.";
const INVALID_EMAIL: &str = "Please send a valid *email* (e.g., name@example.com).";
const PASSWORD_PROMPT: &str =
    "No account found. Please enter a *password* to create your account.";
const PASSWORD_TOO_SHORT: &str = "Password should be at least 6 characters. Try again.";
const EMAIL_CONFIRMED: &str = "Email confirmed. You're all set!";
const ACCOUNT_CREATED: &str = "Account created! You're signed in.";
const ACCOUNT_FAILED: &str = "I couldn't create your account. Please try again.";
const SOMETHING_WRONG: &str = "Sorry, something went wrong. Please try again in a moment.";
const CHAT_FAILED: &str =
    "I couldn't reach the nutrition model right now. Please try again in a moment.";
const CHAT_EMPTY_REPLY: &str = "I couldn't form a reply right now. Please try again.";
const TYPE_HELLO: &str = "Type *hello* to get started.";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

/// True when the text looks like an email: one `@`, a dotted domain, no
/// whitespace.
pub fn is_valid_email(text: &str) -> bool {
    EMAIL_RE.is_match(text)
}

/// Canonical form used for every comparison and for storage.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Argon2id hash with a fresh salt; the cleartext never leaves the process.
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::PasswordHash(e.to_string()))?;
    Ok(hash.to_string())
}

impl ConversationEngine {
    /// Process one inbound delivery end to end.
    ///
    /// Duplicate deliveries are absorbed silently; everything else resolves
    /// against the current session step and replies on the same channel.
    pub async fn handle_turn(&self, turn: TurnInput) -> Result<()> {
        if self.store().seen(&turn.message_id).await? {
            debug!(message_id = %turn.message_id, "Duplicate delivery, skipping");
            return Ok(());
        }
        self.store().mark_seen(&turn.message_id, SEEN_TTL).await?;
        self.spawn_mark_read(&turn.message_id);

        let mut session = self.store().load_session(&turn.phone).await?;
        let raw_text = turn.text.as_deref().unwrap_or("");
        let text = raw_text.trim();

        if text.eq_ignore_ascii_case(GREETING) {
            return self.handle_greeting(&mut session).await;
        }

        if let Some(list_id) = turn.list_reply_id.as_deref() {
            return self.handle_menu_selection(&mut session, list_id).await;
        }

        match session.step {
            Step::NeedEmail => self.handle_email_input(&mut session, text).await,
            Step::NeedPassword => self.handle_password_input(&mut session, text).await,
            // The chat collaborator receives the body as typed, untrimmed.
            Step::Menu => self.handle_fallthrough(&mut session, raw_text).await,
        }
    }

    /// Greeting keyword: re-show the menu, or start the login flow by
    /// resolving the phone to a previously linked account.
    async fn handle_greeting(&self, session: &mut Session) -> Result<()> {
        if session.is_authenticated() {
            session.step = Step::Menu;
            self.persist(session).await?;
            self.send_text(&session.phone, WELCOME_TEXT).await?;
            return self.send_menu(&session.phone).await;
        }

        match self.accounts().lookup_by_phone(&session.phone).await {
            Ok(Some(account)) => {
                info!(phone = %session.phone, "Phone already linked, signing in");
                session.user_id = Some(account.id);
                session.email = account.email.as_deref().map(normalize_email);
                session.step = Step::Menu;
                self.persist(session).await?;
                self.send_text(&session.phone, WELCOME_TEXT).await?;
                self.send_menu(&session.phone).await
            }
            Ok(None) => {
                session.step = Step::NeedEmail;
                session.email = None;
                self.persist(session).await?;
                self.send_text(&session.phone, WELCOME_EMAIL_PROMPT).await
            }
            Err(e) => {
                warn!(phone = %session.phone, error = %e, "Phone lookup failed");
                self.persist(session).await?;
                self.send_text(&session.phone, SOMETHING_WRONG).await
            }
        }
    }

    /// A list selection maps to a canonical intent. Unauthenticated users
    /// are routed into the login flow first; the deferred action runs the
    /// instant authentication succeeds.
    async fn handle_menu_selection(&self, session: &mut Session, list_id: &str) -> Result<()> {
        if let Some(action) = PendingAction::from_menu_id(list_id) {
            session.pending_action = Some(action);
        } else {
            warn!(list_id, "Unknown menu selection");
        }

        if !session.is_authenticated() {
            session.step = Step::NeedEmail;
            self.persist(session).await?;
            return self.send_text(&session.phone, EMAIL_PROMPT).await;
        }

        self.persist(session).await?;
        self.run_pending_action(session).await
    }

    async fn handle_email_input(&self, session: &mut Session, text: &str) -> Result<()> {
        if !is_valid_email(text) {
            self.persist(session).await?;
            return self.send_text(&session.phone, INVALID_EMAIL).await;
        }

        let email = normalize_email(text);
        session.email = Some(email.clone());

        match self.accounts().lookup_by_email(&email).await {
            Ok(Some(account)) => {
                if let Err(e) = self.accounts().link_phone(&account.id, &session.phone).await {
                    warn!(error = %e, "Phone link failed");
                    self.persist(session).await?;
                    return self.send_text(&session.phone, SOMETHING_WRONG).await;
                }
                info!(phone = %session.phone, "Email matched, account linked");
                session.user_id = Some(account.id);
                session.step = Step::Menu;
                self.persist(session).await?;
                self.send_text(&session.phone, EMAIL_CONFIRMED).await?;
                if session.pending_action.is_some() {
                    self.run_pending_action(session).await
                } else {
                    self.send_menu(&session.phone).await
                }
            }
            Ok(None) => {
                session.step = Step::NeedPassword;
                self.persist(session).await?;
                self.send_text(&session.phone, PASSWORD_PROMPT).await
            }
            Err(e) => {
                warn!(error = %e, "Email lookup failed");
                self.persist(session).await?;
                self.send_text(&session.phone, SOMETHING_WRONG).await
            }
        }
    }

    async fn handle_password_input(&self, session: &mut Session, text: &str) -> Result<()> {
        if text.chars().count() < MIN_PASSWORD_CHARS {
            self.persist(session).await?;
            return self.send_text(&session.phone, PASSWORD_TOO_SHORT).await;
        }

        let Some(email) = session.email.clone() else {
            // Password step without a remembered email; restart the email step.
            session.step = Step::NeedEmail;
            self.persist(session).await?;
            return self.send_text(&session.phone, EMAIL_PROMPT).await;
        };

        match self.sign_up_or_link(&email, text, &session.phone).await {
            Ok(user_id) => {
                info!(phone = %session.phone, "Account ready, signing in");
                session.user_id = Some(user_id);
                session.step = Step::Menu;
                self.persist(session).await?;
                self.send_text(&session.phone, ACCOUNT_CREATED).await?;
                if session.pending_action.is_some() {
                    self.run_pending_action(session).await
                } else {
                    self.send_menu(&session.phone).await
                }
            }
            Err(e) => {
                warn!(error = %e, "Account creation failed");
                self.persist(session).await?;
                self.send_text(&session.phone, ACCOUNT_FAILED).await
            }
        }
    }

    /// Create an account, or link the phone to one that appeared since the
    /// email lookup (two signups racing on the same email).
    async fn sign_up_or_link(&self, email: &str, password: &str, phone: &str) -> Result<String> {
        if let Some(existing) = self.accounts().lookup_by_email(email).await? {
            self.accounts().link_phone(&existing.id, phone).await?;
            return Ok(existing.id);
        }

        let hash = hash_password(password)?;
        let user_id = self.accounts().register(email, &hash, phone).await?;
        Ok(user_id)
    }

    /// Nothing else matched: authenticated free text goes verbatim to the
    /// chat collaborator; everyone else is pointed at the greeting keyword.
    async fn handle_fallthrough(&self, session: &mut Session, text: &str) -> Result<()> {
        if !session.is_authenticated() {
            self.persist(session).await?;
            return self.send_text(&session.phone, TYPE_HELLO).await;
        }

        let gate = text.trim();
        if !gate.is_empty() && !gate.starts_with('/') {
            match self.chat().forward(text).await {
                Ok(Some(reply)) => self.send_text(&session.phone, &reply).await?,
                Ok(None) => self.send_text(&session.phone, CHAT_EMPTY_REPLY).await?,
                Err(e) => {
                    warn!(error = %e, "Chat forward failed");
                    self.send_text(&session.phone, CHAT_FAILED).await?;
                }
            }
        }

        self.persist(session).await?;
        self.send_menu(&session.phone).await
    }
}
