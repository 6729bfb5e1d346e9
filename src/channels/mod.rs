//! Channel layer — outbound message I/O.

pub mod whatsapp;

pub use whatsapp::{ListItem, WhatsAppClient};
