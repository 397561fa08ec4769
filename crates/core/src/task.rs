use serde::{Deserialize, Serialize};

/// Normalize a person identity (usually an e-mail) for comparisons and keys.
pub fn normalize_identity(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// A fix-version attached to a task.
///
/// `release_date` is the tracker's raw value (ISO date or datetime); the rule
/// engine prefers a `YYYYMMDD` run embedded in `name` and only falls back to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixVersion {
    pub name: String,
    #[serde(default)]
    pub release_date: Option<String>,
}

impl FixVersion {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            release_date: None,
        }
    }

    pub fn with_release_date(name: impl Into<String>, release_date: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            release_date: Some(release_date.into()),
        }
    }
}

/// Normalized, immutable view of one tracker work item for a single scan cycle.
///
/// Timestamp fields are kept as the tracker reported them; parsing happens in
/// the rule engine so a malformed value skips only the task that carries it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Unique tracker id, e.g. `FC-100`.
    pub key: String,
    /// Tracker project key. Empty means "derive from the key prefix".
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub reporter: Option<String>,
    #[serde(default)]
    pub status: String,
    pub has_description: bool,
    #[serde(default)]
    pub fix_versions: Vec<FixVersion>,
    #[serde(default)]
    pub has_worklog: bool,
    #[serde(default)]
    pub last_status_changed_at: Option<String>,
    #[serde(default)]
    pub last_assignee_changed_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub uat_done: bool,
    #[serde(default)]
    pub production_done: bool,
    #[serde(default)]
    pub url: String,
}

impl TaskSnapshot {
    /// A snapshot with a description and no other signals set.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            project: String::new(),
            summary: String::new(),
            assignee: None,
            reporter: None,
            status: String::new(),
            has_description: true,
            fix_versions: Vec::new(),
            has_worklog: false,
            last_status_changed_at: None,
            last_assignee_changed_at: None,
            created_at: None,
            due_date: None,
            uat_done: false,
            production_done: false,
            url: String::new(),
        }
    }

    /// Upper-cased project key, falling back to the issue key prefix.
    pub fn project_key(&self) -> String {
        let project = self.project.trim();
        if !project.is_empty() {
            return project.to_uppercase();
        }
        self.key
            .split_once('-')
            .map(|(prefix, _)| prefix.trim().to_uppercase())
            .unwrap_or_default()
    }

    /// Trimmed, upper-cased status for marker matching.
    pub fn status_normalized(&self) -> String {
        self.status.trim().to_uppercase()
    }

    pub fn assignee_identity(&self) -> Option<String> {
        non_empty_identity(self.assignee.as_deref())
    }

    pub fn reporter_identity(&self) -> Option<String> {
        non_empty_identity(self.reporter.as_deref())
    }
}

fn non_empty_identity(raw: Option<&str>) -> Option<String> {
    raw.map(normalize_identity).filter(|s| !s.is_empty())
}
