//! Action dispatcher — executes one pending intent against the plan service.
//!
//! Every collaborator failure degrades to a user-facing message; nothing
//! here aborts the turn. After execution the pending action is cleared,
//! the session persisted, and the menu re-shown.

use tracing::{info, warn};

use crate::conversation::session::{MealSlot, PendingAction, Session};
use crate::conversation::summary::summarize_plan;
use crate::conversation::{today, ConversationEngine};
use crate::error::Result;

const NO_ACTION: &str = "No action selected. Tap Options to choose.";
const GENERATE_FAILED: &str = "Couldn't generate a plan.";
const ACCEPT_FAILED: &str = "Couldn't accept the plan.";
const REJECT_FAILED: &str = "Couldn't replace the plan.";
const SWAP_FAILED: &str = "Couldn't swap that meal.";
const SWAP_NO_PLAN: &str = "I couldn't create a plan to swap.";
const NO_PLAN_TODAY: &str = "No plan found for today. Use *Generate plan* to create one.";

impl ConversationEngine {
    /// Execute the session's pending action and reply with the result.
    ///
    /// Only called once the session is authenticated; the pending action is
    /// cleared immediately after execution.
    pub(crate) async fn run_pending_action(&self, session: &mut Session) -> Result<()> {
        let (Some(user_id), Some(action)) = (session.user_id.clone(), session.pending_action)
        else {
            self.send_text(&session.phone, NO_ACTION).await?;
            return self.send_menu(&session.phone).await;
        };

        let date = today();
        info!(phone = %session.phone, ?action, "Dispatching action");
        let reply = self.execute(&user_id, &date, action).await;
        self.send_text(&session.phone, &reply).await?;

        session.pending_action = None;
        self.persist(session).await?;
        self.send_menu(&session.phone).await
    }

    /// Run one action to completion, folding every failure into the reply.
    async fn execute(&self, user_id: &str, date: &str, action: PendingAction) -> String {
        match action {
            PendingAction::Plan => self.do_generate(user_id, date).await,
            PendingAction::Accept => self.do_accept(user_id, date).await,
            PendingAction::Reject => self.do_reject(user_id, date).await,
            PendingAction::Swap { meal } => self.do_swap(user_id, date, meal).await,
            PendingAction::Show => self.do_show(user_id, date).await,
        }
    }

    async fn do_generate(&self, user_id: &str, date: &str) -> String {
        match self.plans().ensure(user_id, date).await {
            Ok(Some(plan)) if plan.has_meals() => format!(
                "Generated today's plan.\n\n{}",
                summarize_plan(plan.date.as_deref().unwrap_or(date), &plan.meals)
            ),
            Ok(_) => GENERATE_FAILED.to_string(),
            Err(e) => {
                warn!(error = %e, "Plan generation failed");
                GENERATE_FAILED.to_string()
            }
        }
    }

    async fn do_accept(&self, user_id: &str, date: &str) -> String {
        if let Err(e) = self.plans().accept(user_id, date).await {
            warn!(error = %e, "Plan accept failed");
        }
        match self.plans().fetch(user_id, date).await {
            Ok(Some(plan)) if plan.has_meals() => format!(
                "Plan accepted and locked.\n\n{}",
                summarize_plan(plan.date.as_deref().unwrap_or(date), &plan.meals)
            ),
            Ok(_) => ACCEPT_FAILED.to_string(),
            Err(e) => {
                warn!(error = %e, "Plan fetch failed");
                ACCEPT_FAILED.to_string()
            }
        }
    }

    async fn do_reject(&self, user_id: &str, date: &str) -> String {
        if let Err(e) = self.plans().reject(user_id, date).await {
            warn!(error = %e, "Plan reject failed");
        }
        // The reject endpoint usually leaves a freshly generated plan behind.
        match self.plans().fetch(user_id, date).await {
            Ok(Some(plan)) if plan.has_meals() => format!(
                "Replaced with a new plan.\n\n{}",
                summarize_plan(plan.date.as_deref().unwrap_or(date), &plan.meals)
            ),
            Ok(_) => REJECT_FAILED.to_string(),
            Err(e) => {
                warn!(error = %e, "Plan fetch failed");
                REJECT_FAILED.to_string()
            }
        }
    }

    async fn do_swap(&self, user_id: &str, date: &str, meal: MealSlot) -> String {
        // A slot can only be swapped inside an existing plan.
        let base = match self.plans().ensure(user_id, date).await {
            Ok(Some(plan)) if plan.has_meals() => plan,
            Ok(_) => return SWAP_NO_PLAN.to_string(),
            Err(e) => {
                warn!(error = %e, "Plan ensure failed before swap");
                return SWAP_NO_PLAN.to_string();
            }
        };

        let exclude = base.meals.get(meal).and_then(|m| m.label.clone());
        let swapped = match self
            .plans()
            .swap(user_id, date, meal, exclude.as_deref())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, slot = %meal, "Swap failed");
                false
            }
        };

        // Re-fetch regardless so the user always sees current state.
        let current = match self.plans().fetch(user_id, date).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "Plan fetch failed after swap");
                None
            }
        };

        match (swapped, current) {
            (true, Some(plan)) if plan.has_meals() => format!(
                "Swapped *{meal}* for today.\n\n{}",
                summarize_plan(plan.date.as_deref().unwrap_or(date), &plan.meals)
            ),
            (_, Some(plan)) if plan.has_meals() => format!(
                "{SWAP_FAILED}\n\n{}",
                summarize_plan(plan.date.as_deref().unwrap_or(date), &plan.meals)
            ),
            _ => SWAP_FAILED.to_string(),
        }
    }

    async fn do_show(&self, user_id: &str, date: &str) -> String {
        match self.plans().fetch(user_id, date).await {
            Ok(Some(plan)) if plan.has_meals() => {
                summarize_plan(plan.date.as_deref().unwrap_or(date), &plan.meals)
            }
            Ok(_) => NO_PLAN_TODAY.to_string(),
            Err(e) => {
                warn!(error = %e, "Plan fetch failed");
                NO_PLAN_TODAY.to_string()
            }
        }
    }
}
