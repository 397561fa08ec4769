use std::path::Path;

use chrono::{DateTime, Utc};
use nudge_core::TaskSnapshot;

use crate::error::FetchError;

/// Produces fresh task snapshots for one scan cycle.
#[async_trait::async_trait]
pub trait TaskSource: Send + Sync {
    /// Tasks in `projects` (empty = every project the source knows) updated at
    /// or after `since`.
    async fn fetch(&self, projects: &[String], since: DateTime<Utc>) -> Result<Vec<TaskSnapshot>, FetchError>;

    /// Human-readable name for logs (e.g., "jira").
    fn source_name(&self) -> &str;
}

/// A source returning the same snapshots every cycle.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    tasks: Vec<TaskSnapshot>,
}

impl StaticSource {
    pub fn new(tasks: Vec<TaskSnapshot>) -> Self {
        Self { tasks }
    }

    /// Load a JSON array of snapshots.
    pub fn from_json_file(path: &Path) -> Result<Self, FetchError> {
        let raw = std::fs::read_to_string(path)?;
        let tasks: Vec<TaskSnapshot> = serde_json::from_str(&raw)
            .map_err(|e| FetchError::Decode(format!("{}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), tasks = tasks.len(), "loaded snapshot file");
        Ok(Self { tasks })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait::async_trait]
impl TaskSource for StaticSource {
    /// Filters by project only; `since` is ignored because the snapshots carry
    /// no update time.
    async fn fetch(&self, projects: &[String], _since: DateTime<Utc>) -> Result<Vec<TaskSnapshot>, FetchError> {
        if projects.is_empty() {
            return Ok(self.tasks.clone());
        }
        Ok(self
            .tasks
            .iter()
            .filter(|t| {
                let project = t.project_key();
                projects.iter().any(|p| p.eq_ignore_ascii_case(&project))
            })
            .cloned()
            .collect())
    }

    fn source_name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn filters_by_project() {
        let source = StaticSource::new(vec![TaskSnapshot::new("FC-1"), TaskSnapshot::new("FSS-2")]);
        let all = source.fetch(&[], Utc::now()).await.unwrap();
        assert_eq!(all.len(), 2);
        let fc = source.fetch(&["fc".to_string()], Utc::now()).await.unwrap();
        assert_eq!(fc.len(), 1);
        assert_eq!(fc[0].key, "FC-1");
    }

    #[test]
    fn loads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(
            &path,
            r#"[{"key": "FC-100", "status": "CI TESTING", "has_description": true, "assignee": "dev@example.com"}]"#,
        )
        .unwrap();
        let source = StaticSource::from_json_file(&path).unwrap();
        assert_eq!(source.len(), 1);

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(StaticSource::from_json_file(&path), Err(FetchError::Decode(_))));
    }
}
