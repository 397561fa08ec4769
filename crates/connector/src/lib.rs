//! Task snapshot sources.
//!
//! - `TaskSource`: the seam the scan cycle pulls snapshots through
//! - `JiraSource`: Jira REST search with pagination and changelog expansion
//! - `StaticSource`: fixed snapshots, e.g. replayed from a JSON file

pub mod error;
pub mod jira;
pub mod source;

pub use error::FetchError;
pub use jira::{JiraSource, MilestoneStatuses};
pub use source::{StaticSource, TaskSource};
