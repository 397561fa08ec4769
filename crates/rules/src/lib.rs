//! Reminder rule engine.
//!
//! This crate provides:
//! - `RuleConfig`: the rule configuration surface (YAML/JSON, defaults for missing keys)
//! - Pure per-rule evaluators over a `TaskSnapshot` and a fixed `now`
//! - `RuleEngine`, which composes the evaluators and resolves recipients

pub mod config;
pub mod error;
pub mod evaluator;
pub mod time;

pub use config::{RuleConfig, RuleSettings};
pub use error::{Result, RuleError};
pub use evaluator::{evaluate, RuleEngine};
