//! Jira REST snapshot source.
//!
//! Runs one paginated JQL search per cycle (`/rest/api/2/search`, changelog
//! expanded) and normalizes each issue into a [`TaskSnapshot`]. Milestone
//! flags are derived here from configurable status lists so the rule engine
//! only reads booleans.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use nudge_core::{normalize_identity, FixVersion, TaskSnapshot, TrackerConfig};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::FetchError;
use crate::source::TaskSource;

const SEARCH_FIELDS: &str = "summary,status,project,assignee,reporter,description,fixVersions,\
statuscategorychangedate,created,duedate,worklog,timespent";

/// Status names that mark a task as past UAT or in production.
#[derive(Debug, Clone, Default)]
pub struct MilestoneStatuses {
    pub uat: Vec<String>,
    pub production: Vec<String>,
}

impl MilestoneStatuses {
    pub fn new(uat: &[String], production: &[String]) -> Self {
        let upper = |items: &[String]| -> Vec<String> { items.iter().map(|s| s.trim().to_uppercase()).collect() };
        Self {
            uat: upper(uat),
            production: upper(production),
        }
    }

    fn flags(&self, status: &str) -> (bool, bool) {
        let status = status.trim().to_uppercase();
        let production = self.production.iter().any(|s| *s == status);
        let uat = production || self.uat.iter().any(|s| *s == status);
        (uat, production)
    }
}

#[derive(Debug, Clone)]
enum JiraAuth {
    Basic { username: String, token: String },
    Bearer(String),
}

pub struct JiraSource {
    base_url: String,
    auth: JiraAuth,
    page_size: u32,
    milestones: MilestoneStatuses,
    /// Offset used when writing `since` into JQL.
    jql_offset: FixedOffset,
    client: reqwest::Client,
}

impl JiraSource {
    pub fn from_config(
        config: &TrackerConfig,
        milestones: MilestoneStatuses,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        if config.base_url.trim().is_empty() {
            return Err(FetchError::Config("JIRA_BASE_URL is not set".to_string()));
        }
        let token = config
            .api_token
            .clone()
            .ok_or_else(|| FetchError::Config("JIRA_API_TOKEN is not set".to_string()))?;
        let auth = match config.auth_type.as_str() {
            "basic" => JiraAuth::Basic {
                username: config
                    .username
                    .clone()
                    .ok_or_else(|| FetchError::Config("JIRA_USERNAME is required for basic auth".to_string()))?,
                token,
            },
            "bearer" | "token" | "oauth" => JiraAuth::Bearer(token),
            other => return Err(FetchError::Config(format!("unknown JIRA_AUTH_TYPE: {other}"))),
        };
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth,
            page_size: config.page_size.clamp(1, 1000),
            milestones,
            jql_offset: Utc.fix(),
            client,
        })
    }

    /// Write `since` in this offset, matching the Jira user's time zone.
    pub fn with_jql_offset(mut self, offset: FixedOffset) -> Self {
        self.jql_offset = offset;
        self
    }

    pub fn build_jql(&self, projects: &[String], since: DateTime<Utc>) -> String {
        let mut clauses = Vec::new();
        if !projects.is_empty() {
            let quoted: Vec<String> = projects.iter().map(|p| format!("\"{}\"", p.trim())).collect();
            clauses.push(format!("project in ({})", quoted.join(", ")));
        }
        let since = since.with_timezone(&self.jql_offset).format("%Y-%m-%d %H:%M");
        clauses.push(format!("updated >= \"{since}\""));
        format!("{} ORDER BY updated DESC", clauses.join(" AND "))
    }

    async fn search_page(&self, jql: &str, start_at: u32) -> Result<SearchPage, FetchError> {
        let url = format!("{}/rest/api/2/search", self.base_url);
        let start_param = start_at.to_string();
        let max_param = self.page_size.to_string();
        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[
                ("jql", jql),
                ("startAt", start_param.as_str()),
                ("maxResults", max_param.as_str()),
                ("fields", SEARCH_FIELDS),
                ("expand", "changelog"),
            ]);
        request = match &self.auth {
            JiraAuth::Basic { username, token } => request.basic_auth(username, Some(token)),
            JiraAuth::Bearer(token) => request.bearer_auth(token),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }
        response
            .json::<SearchPage>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// Normalize one search hit.
    pub fn to_snapshot(&self, issue: &Value) -> Result<TaskSnapshot, FetchError> {
        let issue: Issue =
            serde_json::from_value(issue.clone()).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(self.snapshot_from(issue))
    }

    fn snapshot_from(&self, issue: Issue) -> TaskSnapshot {
        let fields = issue.fields;
        let status = fields.status.map(|s| s.name).unwrap_or_default();
        let (uat_done, production_done) = self.milestones.flags(&status);
        let changelog = issue.changelog.unwrap_or_default();

        let mut task = TaskSnapshot::new(issue.key.clone());
        task.project = fields.project.map(|p| p.key.to_uppercase()).unwrap_or_default();
        task.summary = fields.summary.unwrap_or_default();
        task.assignee = fields.assignee.and_then(JiraUser::identity);
        task.reporter = fields.reporter.and_then(JiraUser::identity);
        task.has_description = has_text(fields.description.as_ref());
        task.fix_versions = fields
            .fix_versions
            .into_iter()
            .map(|v| FixVersion {
                name: v.name,
                release_date: v.release_date,
            })
            .collect();
        task.has_worklog = fields.worklog.map(|w| w.total > 0).unwrap_or(false)
            || fields.timespent.unwrap_or(0) > 0;
        task.last_status_changed_at =
            changelog.last_change("status").or(fields.statuscategorychangedate);
        task.last_assignee_changed_at = changelog.last_change("assignee");
        task.created_at = fields.created;
        task.due_date = fields.duedate;
        task.status = status;
        task.uat_done = uat_done;
        task.production_done = production_done;
        task.url = format!("{}/browse/{}", self.base_url, issue.key);
        task
    }
}

/// Description present: non-blank text, or any non-null rich-text document.
fn has_text(description: Option<&Value>) -> bool {
    match description {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

#[async_trait::async_trait]
impl TaskSource for JiraSource {
    async fn fetch(&self, projects: &[String], since: DateTime<Utc>) -> Result<Vec<TaskSnapshot>, FetchError> {
        let jql = self.build_jql(projects, since);
        debug!(jql = %jql, "searching tracker");

        let mut tasks = Vec::new();
        let mut start_at = 0u32;
        loop {
            let page = self.search_page(&jql, start_at).await?;
            let fetched = page.issues.len() as u32;
            debug!(start_at, fetched, total = page.total, "tracker page");
            tasks.extend(page.issues.into_iter().map(|issue| self.snapshot_from(issue)));

            if fetched == 0 || fetched < self.page_size || start_at + fetched >= page.total {
                break;
            }
            start_at += fetched;
        }

        info!(tasks = tasks.len(), projects = projects.len(), "fetched task snapshots");
        Ok(tasks)
    }

    fn source_name(&self) -> &str {
        "jira"
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    total: u32,
    #[serde(default)]
    issues: Vec<Issue>,
}

#[derive(Debug, Deserialize)]
struct Issue {
    key: String,
    #[serde(default)]
    fields: IssueFields,
    #[serde(default)]
    changelog: Option<Changelog>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueFields {
    summary: Option<String>,
    status: Option<Named>,
    project: Option<ProjectRef>,
    assignee: Option<JiraUser>,
    reporter: Option<JiraUser>,
    description: Option<Value>,
    #[serde(default)]
    fix_versions: Vec<JiraVersion>,
    #[serde(rename = "statuscategorychangedate")]
    statuscategorychangedate: Option<String>,
    created: Option<String>,
    #[serde(rename = "duedate")]
    duedate: Option<String>,
    worklog: Option<WorklogSummary>,
    #[serde(rename = "timespent")]
    timespent: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ProjectRef {
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JiraUser {
    email_address: Option<String>,
    name: Option<String>,
}

impl JiraUser {
    /// E-mail when visible, else the login name.
    fn identity(self) -> Option<String> {
        self.email_address
            .or(self.name)
            .map(|s| normalize_identity(&s))
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JiraVersion {
    name: String,
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorklogSummary {
    #[serde(default)]
    total: u32,
}

#[derive(Debug, Default, Deserialize)]
struct Changelog {
    #[serde(default)]
    histories: Vec<History>,
}

#[derive(Debug, Deserialize)]
struct History {
    created: String,
    #[serde(default)]
    items: Vec<HistoryItem>,
}

#[derive(Debug, Deserialize)]
struct HistoryItem {
    field: String,
}

impl Changelog {
    /// Raw timestamp of the latest history entry touching `field`.
    ///
    /// Jira timestamps share one format and offset per instance, so the
    /// lexicographic maximum is the latest.
    fn last_change(&self, field: &str) -> Option<String> {
        self.histories
            .iter()
            .filter(|h| h.items.iter().any(|i| i.field.eq_ignore_ascii_case(field)))
            .map(|h| h.created.clone())
            .max()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn source() -> JiraSource {
        let config = TrackerConfig {
            base_url: "https://jira.example.com/".into(),
            username: Some("bot".into()),
            api_token: Some("t".into()),
            auth_type: "basic".into(),
            projects: vec!["FC".into()],
            page_size: 50,
        };
        let milestones = MilestoneStatuses::new(
            &["UAT".to_string(), "READY UAT".to_string()],
            &["DONE".to_string()],
        );
        JiraSource::from_config(&config, milestones, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn jql_quotes_projects_and_formats_since() {
        let since = Utc.with_ymd_and_hms(2024, 3, 2, 3, 0, 0).unwrap();
        let jql = source()
            .with_jql_offset(FixedOffset::east_opt(7 * 3600).unwrap())
            .build_jql(&["FC".into(), "FSS".into()], since);
        assert_eq!(
            jql,
            "project in (\"FC\", \"FSS\") AND updated >= \"2024-03-02 10:00\" ORDER BY updated DESC"
        );
        assert!(!source().build_jql(&[], since).contains("project in"));
    }

    #[test]
    fn basic_auth_requires_username() {
        let config = TrackerConfig {
            base_url: "https://jira.example.com".into(),
            username: None,
            api_token: Some("t".into()),
            auth_type: "basic".into(),
            projects: vec![],
            page_size: 50,
        };
        assert!(matches!(
            JiraSource::from_config(&config, MilestoneStatuses::default(), Duration::from_secs(5)),
            Err(FetchError::Config(_))
        ));
    }

    #[test]
    fn issue_normalization() {
        let issue = json!({
            "key": "FC-100",
            "fields": {
                "summary": "Checkout fails",
                "status": { "name": "Ready UAT" },
                "project": { "key": "fc" },
                "assignee": { "emailAddress": "Dev@Example.com", "name": "dev" },
                "reporter": { "name": "pm.login" },
                "description": "  ",
                "fixVersions": [
                    { "name": "release_20240307" },
                    { "name": "v2", "releaseDate": "2024-03-10" }
                ],
                "statuscategorychangedate": "2024-03-01T09:00:00.000+0700",
                "created": "2024-02-28T09:00:00.000+0700",
                "worklog": { "total": 0 },
                "timespent": null
            },
            "changelog": {
                "histories": [
                    { "created": "2024-03-04T10:00:00.000+0700", "items": [{ "field": "status" }] },
                    { "created": "2024-03-04T11:00:00.000+0700", "items": [{ "field": "assignee" }] },
                    { "created": "2024-03-04T12:30:00.000+0700", "items": [{ "field": "Status" }] }
                ]
            }
        });
        let task = source().to_snapshot(&issue).unwrap();
        assert_eq!(task.project, "FC");
        assert_eq!(task.assignee.as_deref(), Some("dev@example.com"));
        assert_eq!(task.reporter.as_deref(), Some("pm.login"));
        assert!(!task.has_description);
        assert!(!task.has_worklog);
        assert_eq!(task.fix_versions.len(), 2);
        assert_eq!(task.fix_versions[1].release_date.as_deref(), Some("2024-03-10"));
        assert_eq!(task.last_status_changed_at.as_deref(), Some("2024-03-04T12:30:00.000+0700"));
        assert_eq!(task.last_assignee_changed_at.as_deref(), Some("2024-03-04T11:00:00.000+0700"));
        assert!(task.uat_done);
        assert!(!task.production_done);
        assert_eq!(task.url, "https://jira.example.com/browse/FC-100");
    }

    #[test]
    fn status_category_date_used_without_changelog() {
        let issue = json!({
            "key": "FC-1",
            "fields": {
                "status": { "name": "Done" },
                "description": { "type": "doc", "content": [] },
                "statuscategorychangedate": "2024-03-01T09:00:00.000+0700",
                "timespent": 3600
            }
        });
        let task = source().to_snapshot(&issue).unwrap();
        assert!(task.has_description);
        assert!(task.has_worklog);
        assert!(task.uat_done && task.production_done);
        assert_eq!(task.last_status_changed_at.as_deref(), Some("2024-03-01T09:00:00.000+0700"));
        assert_eq!(task.assignee, None);
    }
}
