//! Collaborator clients — external HTTP services consumed but not owned.

pub mod accounts;
pub mod chat;
pub mod plans;

pub use accounts::{Account, AccountClient};
pub use chat::ChatClient;
pub use plans::{Meal, Meals, PlanClient, PlanSnapshot};
