//! Reminder send history.
//!
//! A ledger of delivery attempts keyed by (task, rule, recipient) that answers
//! "was this key attempted within the cooldown?" and records new attempts.
//!
//! - [`HistoryBackend`]: persistence seam, with [`MemoryLedger`] and the
//!   durable line-oriented [`JsonlLedger`]
//! - [`HistoryStore`]: per-key claims so check-then-record is atomic per key

pub mod backend;
pub mod error;
pub mod jsonl;
pub mod record;
pub mod store;

pub use backend::{HistoryBackend, MemoryLedger};
pub use error::{HistoryError, Result};
pub use jsonl::JsonlLedger;
pub use record::{truncate_summary, HistoryRecord, MAX_SUMMARY_CHARS};
pub use store::{Claim, HistoryStore};
