//! Plan service client — fetch, generate, accept, reject, and swap meal plans.
//!
//! The plan service owns all plan storage; this client only reads and
//! mutates plans through its HTTP contract. The payload is one explicit
//! schema — `{plan: {...} | null}` — with no runtime shape-sniffing.

use serde::{Deserialize, Serialize};

use crate::conversation::session::MealSlot;
use crate::error::CollaboratorError;

/// Calorie target sent when generating a plan on the user's behalf.
pub const DEFAULT_CALORIES_TARGET: u32 = 2100;

const SERVICE: &str = "plan service";

/// A single meal within a plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Meal {
    pub id: Option<String>,
    pub label: Option<String>,
    pub image: Option<String>,
    pub source_url: Option<String>,
    pub calories: Option<f64>,
    pub items: Vec<String>,
}

/// The three meal slots of a day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Meals {
    pub breakfast: Option<Meal>,
    pub lunch: Option<Meal>,
    pub dinner: Option<Meal>,
}

impl Meals {
    /// Whether any slot holds a meal.
    pub fn any(&self) -> bool {
        self.breakfast.is_some() || self.lunch.is_some() || self.dinner.is_some()
    }

    pub fn get(&self, slot: MealSlot) -> Option<&Meal> {
        match slot {
            MealSlot::Breakfast => self.breakfast.as_ref(),
            MealSlot::Lunch => self.lunch.as_ref(),
            MealSlot::Dinner => self.dinner.as_ref(),
        }
    }
}

/// A day's plan as served by the plan service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanSnapshot {
    pub date: Option<String>,
    pub meals: Meals,
    pub locked_at: Option<String>,
}

impl PlanSnapshot {
    /// Whether the snapshot carries any meals at all.
    pub fn has_meals(&self) -> bool {
        self.meals.any()
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct PlanEnvelope {
    plan: Option<PlanSnapshot>,
}

/// HTTP client for the plan service.
pub struct PlanClient {
    base_url: String,
    client: reqwest::Client,
}

impl PlanClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Fetch the plan for a user and date. `Ok(None)` means no plan exists.
    pub async fn fetch(
        &self,
        user_id: &str,
        date: &str,
    ) -> Result<Option<PlanSnapshot>, CollaboratorError> {
        let url = format!("{}/api/mealplans/{date}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("userId", user_id)])
            .send()
            .await
            .map_err(request_failed)?;

        let resp = check_status(resp)?;
        let envelope: PlanEnvelope = resp.json().await.map_err(invalid_response)?;
        Ok(envelope.plan)
    }

    /// Ask the service to generate today's plan.
    pub async fn generate(
        &self,
        user_id: &str,
        calories_target: u32,
    ) -> Result<(), CollaboratorError> {
        let url = format!("{}/api/mealplans/generate", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "userId": user_id,
                "caloriesTarget": calories_target,
            }))
            .send()
            .await
            .map_err(request_failed)?;
        check_status(resp)?;
        Ok(())
    }

    /// Fetch the plan, generating it first if no meals exist yet.
    pub async fn ensure(
        &self,
        user_id: &str,
        date: &str,
    ) -> Result<Option<PlanSnapshot>, CollaboratorError> {
        if let Some(plan) = self.fetch(user_id, date).await? {
            if plan.has_meals() {
                return Ok(Some(plan));
            }
        }
        self.generate(user_id, DEFAULT_CALORIES_TARGET).await?;
        self.fetch(user_id, date).await
    }

    /// Accept (lock) the plan for a date.
    pub async fn accept(&self, user_id: &str, date: &str) -> Result<(), CollaboratorError> {
        let url = format!("{}/api/mealplans/{date}/accept", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "userId": user_id }))
            .send()
            .await
            .map_err(request_failed)?;
        check_status(resp)?;
        Ok(())
    }

    /// Reject the plan for a date; the service generates a replacement.
    pub async fn reject(&self, user_id: &str, date: &str) -> Result<(), CollaboratorError> {
        let url = format!("{}/api/mealplans/{date}/reject", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "userId": user_id,
                "caloriesTarget": DEFAULT_CALORIES_TARGET,
            }))
            .send()
            .await
            .map_err(request_failed)?;
        check_status(resp)?;
        Ok(())
    }

    /// Swap one meal slot, excluding the current label from the re-draw.
    pub async fn swap(
        &self,
        user_id: &str,
        date: &str,
        slot: MealSlot,
        exclude: Option<&str>,
    ) -> Result<(), CollaboratorError> {
        let url = format!("{}/api/mealplans/{date}/swap", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "userId": user_id,
                "mealType": slot.as_str(),
                "exclude": exclude,
            }))
            .send()
            .await
            .map_err(request_failed)?;
        check_status(resp)?;
        Ok(())
    }
}

fn request_failed(e: reqwest::Error) -> CollaboratorError {
    CollaboratorError::RequestFailed {
        service: SERVICE,
        reason: e.to_string(),
    }
}

fn invalid_response(e: reqwest::Error) -> CollaboratorError {
    CollaboratorError::InvalidResponse {
        service: SERVICE,
        reason: e.to_string(),
    }
}

fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, CollaboratorError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(CollaboratorError::BadStatus {
            service: SERVICE,
            status: resp.status().as_u16(),
        })
    }
}
