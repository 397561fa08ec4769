//! Delivery adapter trait and shared error types.

use std::fmt;
use std::time::Duration;

/// Errors that can occur during reminder delivery.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The transport rejected the address itself; another route may work.
    #[error("address {address} rejected: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("transient delivery failure: {0}")]
    Transient(String),

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DeliveryError {
    /// Only an invalid or unreachable address justifies trying the group route.
    pub fn allows_fallback(&self) -> bool {
        matches!(self, DeliveryError::InvalidAddress { .. })
    }
}

/// Where a message goes: one person, or a group chat.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    User(String),
    Group(String),
}

impl Address {
    pub fn as_str(&self) -> &str {
        match self {
            Address::User(s) | Address::Group(s) => s,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::User(s) => write!(f, "user:{s}"),
            Address::Group(s) => write!(f, "group:{s}"),
        }
    }
}

/// Trait for chat transport implementations.
#[async_trait::async_trait]
pub trait DeliveryAdapter: Send + Sync {
    /// Deliver `text` to `address`, returning the provider's response summary.
    async fn send(&self, address: &Address, text: &str) -> Result<String, DeliveryError>;

    /// Human-readable name for this channel (e.g., "chat-bot").
    fn channel_name(&self) -> &str;
}
