//! NutriSuite assistant — WhatsApp conversation engine.

pub mod channels;
pub mod collaborators;
pub mod config;
pub mod conversation;
pub mod error;
pub mod store;
pub mod webhook;
