//! Rule configuration surface.
//!
//! Read from a YAML (or JSON) mapping. Unknown keys are ignored and missing
//! keys fall back to the defaults below, so an empty file is a valid config.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{Duration, FixedOffset, Offset, Utc};
use nudge_core::RuleKind;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, RuleError};

/// Per-rule switches and scoping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSettings {
    /// `None` means the rule's built-in default.
    pub enabled: Option<bool>,
    /// Empty means every project.
    pub included_projects: Vec<String>,
    pub excluded_projects: Vec<String>,
    /// Minijinja template overriding the default message for this rule.
    pub template: Option<String>,
}

/// Numeric thresholds, allow-lists and per-rule scoping for the rule engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// Minutes a task may sit in a CI-testing status without a worklog.
    pub ci_testing_wait_minutes: i64,
    /// How many days ahead of a release the pre-release reminder starts.
    pub pre_version_days: i64,
    /// Cooldown between two attempts for the same (task, rule, recipient).
    pub resend_after_hours: f64,
    /// Tracker projects the engine looks at. Empty means all.
    #[serde(alias = "project_allowlist")]
    pub projects_allowed: Vec<String>,
    /// E-mail domain prefixes eligible for direct delivery. Empty means all.
    pub domains_allowed: Vec<String>,
    pub assignee_change_wait_minutes: i64,
    pub created_wait_minutes: i64,
    /// Status markers meaning "in CI testing" (substring match, case-insensitive).
    pub ci_testing_statuses: Vec<String>,
    /// Statuses at or past UAT; the tracker adapter derives `uat_done` from them.
    pub uat_statuses: Vec<String>,
    /// Statuses meaning the task reached production.
    pub production_statuses: Vec<String>,
    /// Offset used to turn `now` into a calendar day for release comparisons.
    pub utc_offset_minutes: i32,
    /// How far back the tracker is asked for updated tasks.
    pub scan_window_hours: i64,
    /// When non-empty, only these recipients receive reminders.
    pub test_recipients: Vec<String>,
    /// Per-rule settings keyed by rule name (`missing_logtime`, ...).
    pub rules: BTreeMap<String, RuleSettings>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            ci_testing_wait_minutes: 5,
            pre_version_days: 2,
            resend_after_hours: 3.0,
            projects_allowed: Vec::new(),
            domains_allowed: Vec::new(),
            assignee_change_wait_minutes: 60,
            created_wait_minutes: 60,
            ci_testing_statuses: vec!["CI TESTING".to_string()],
            uat_statuses: vec![
                "DEPLOYING".to_string(),
                "UAT".to_string(),
                "UAT TESTING".to_string(),
                "READY UAT".to_string(),
            ],
            production_statuses: vec!["COMPLETE".to_string(), "DONE".to_string()],
            utc_offset_minutes: 7 * 60,
            scan_window_hours: 72,
            test_recipients: Vec::new(),
            rules: BTreeMap::new(),
        }
    }
}

/// Upper bound for every configured window, ten years.
const MAX_WINDOW_HOURS: i64 = 24 * 3650;

fn minutes_saturating(minutes: i64) -> Duration {
    Duration::try_minutes(minutes).unwrap_or(Duration::MAX)
}

/// Split comma-joined entries, trim and upper-case.
fn normalize_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .flat_map(|s| s.split(','))
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl RuleConfig {
    /// Parse and validate a YAML or JSON document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut config: RuleConfig = serde_yaml::from_str(yaml)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Load from disk. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "rule config not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&raw)?;
        info!(
            path = %path.display(),
            ci_wait = config.ci_testing_wait_minutes,
            pre_days = config.pre_version_days,
            resend_hours = config.resend_after_hours,
            projects = config.projects_allowed.len(),
            "loaded rule config"
        );
        Ok(config)
    }

    fn normalize(&mut self) {
        self.projects_allowed = normalize_list(&self.projects_allowed);
        self.ci_testing_statuses = normalize_list(&self.ci_testing_statuses);
        self.uat_statuses = normalize_list(&self.uat_statuses);
        self.production_statuses = normalize_list(&self.production_statuses);
        self.domains_allowed = self
            .domains_allowed
            .iter()
            .map(|d| d.trim().trim_start_matches('@').to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        self.test_recipients = self
            .test_recipients
            .iter()
            .map(|r| nudge_core::normalize_identity(r))
            .filter(|r| !r.is_empty())
            .collect();
        for settings in self.rules.values_mut() {
            settings.included_projects = normalize_list(&settings.included_projects);
            settings.excluded_projects = normalize_list(&settings.excluded_projects);
        }
    }

    fn validate(&self) -> Result<()> {
        let bounded = [
            ("ci_testing_wait_minutes", self.ci_testing_wait_minutes, MAX_WINDOW_HOURS * 60),
            ("pre_version_days", self.pre_version_days, MAX_WINDOW_HOURS / 24),
            ("assignee_change_wait_minutes", self.assignee_change_wait_minutes, MAX_WINDOW_HOURS * 60),
            ("created_wait_minutes", self.created_wait_minutes, MAX_WINDOW_HOURS * 60),
            ("scan_window_hours", self.scan_window_hours, MAX_WINDOW_HOURS),
        ];
        for (name, value, max) in bounded {
            if !(0..=max).contains(&value) {
                return Err(RuleError::Config(format!("{name} must be between 0 and {max}, got {value}")));
            }
        }
        if !self.resend_after_hours.is_finite()
            || !(0.0..=MAX_WINDOW_HOURS as f64).contains(&self.resend_after_hours)
        {
            return Err(RuleError::Config(format!(
                "resend_after_hours must be between 0 and {MAX_WINDOW_HOURS}, got {}",
                self.resend_after_hours
            )));
        }
        if self.utc_offset_minutes.checked_mul(60).and_then(FixedOffset::east_opt).is_none() {
            return Err(RuleError::Config(format!(
                "utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            )));
        }
        for name in self.rules.keys() {
            if name.parse::<RuleKind>().is_err() {
                warn!(rule = %name, "ignoring settings for unknown rule");
            }
        }
        Ok(())
    }

    /// The resend cooldown as a duration (millisecond precision).
    pub fn cooldown(&self) -> Duration {
        Duration::try_milliseconds((self.resend_after_hours * 3_600_000.0).round() as i64).unwrap_or(Duration::MAX)
    }

    pub fn local_offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn scan_window(&self) -> Duration {
        Duration::try_hours(self.scan_window_hours).unwrap_or(Duration::MAX)
    }

    pub fn ci_testing_wait(&self) -> Duration {
        minutes_saturating(self.ci_testing_wait_minutes)
    }

    pub fn assignee_change_wait(&self) -> Duration {
        minutes_saturating(self.assignee_change_wait_minutes)
    }

    pub fn created_wait(&self) -> Duration {
        minutes_saturating(self.created_wait_minutes)
    }

    pub fn settings(&self, kind: RuleKind) -> Option<&RuleSettings> {
        self.rules.get(kind.as_str())
    }

    pub fn rule_enabled(&self, kind: RuleKind) -> bool {
        self.settings(kind)
            .and_then(|s| s.enabled)
            .unwrap_or_else(|| kind.enabled_by_default())
    }

    /// Global project allow-list check; runs before any rule.
    pub fn project_allowed(&self, project: &str) -> bool {
        if self.projects_allowed.is_empty() {
            return true;
        }
        let project = project.trim().to_uppercase();
        self.projects_allowed.iter().any(|p| *p == project)
    }

    /// Whether `kind` is enabled and scoped to `project`.
    pub fn rule_applies(&self, kind: RuleKind, project: &str) -> bool {
        if !self.rule_enabled(kind) {
            return false;
        }
        let Some(settings) = self.settings(kind) else {
            return true;
        };
        let project = project.trim().to_uppercase();
        if !settings.included_projects.is_empty()
            && !settings.included_projects.iter().any(|p| *p == project)
        {
            return false;
        }
        !settings.excluded_projects.iter().any(|p| *p == project)
    }

    pub fn template_override(&self, kind: RuleKind) -> Option<&str> {
        self.settings(kind).and_then(|s| s.template.as_deref())
    }

    pub fn recipient_allowed(&self, identity: &str) -> bool {
        self.test_recipients.is_empty() || self.test_recipients.iter().any(|r| r == identity)
    }

    /// Whether the configured CI-testing markers match `status`.
    pub fn is_ci_testing_status(&self, status: &str) -> bool {
        let status = status.trim().to_uppercase();
        !status.is_empty() && self.ci_testing_statuses.iter().any(|m| status.contains(m.as_str()))
    }

    pub fn is_uat_status(&self, status: &str) -> bool {
        let status = status.trim().to_uppercase();
        self.uat_statuses.iter().any(|s| *s == status)
    }

    pub fn is_production_status(&self, status: &str) -> bool {
        let status = status.trim().to_uppercase();
        self.production_statuses.iter().any(|s| *s == status)
    }
}
