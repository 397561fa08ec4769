//! Reminder delivery.
//!
//! This crate provides:
//! - `DeliveryAdapter` trait for pluggable chat transports
//! - `ChatBotAdapter`, the HTTP chat-bot implementation
//! - Minijinja rendering of reminder messages
//! - `Router`, which applies direct-first, group-fallback routing

pub mod chat;
pub mod router;
pub mod templating;
pub mod traits;

pub use chat::ChatBotAdapter;
pub use router::{DeliveryAttempt, RouteKind, RouteOutcome, Router};
pub use templating::ReminderRenderer;
pub use traits::{Address, DeliveryAdapter, DeliveryError};
