use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub tracker: TrackerConfig,
    pub chat: ChatConfig,
    pub paths: PathsConfig,
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `NUDGE_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("NUDGE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            tracker: TrackerConfig::from_env_profiled(p),
            chat: ChatConfig::from_env_profiled(p),
            paths: PathsConfig::from_env_profiled(p),
            schedule: ScheduleConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  tracker:   url={}, auth={}, projects={}",
            self.tracker.base_url,
            self.tracker.auth_type,
            self.tracker.projects.join(",")
        );
        tracing::info!(
            "  chat:      url={}, bot_configured={}",
            self.chat.base_url,
            self.chat.bot_id.is_some()
        );
        tracing::info!(
            "  paths:     rules={}, directory={}, history={}",
            self.paths.rules_config.display(),
            self.paths.directory.display(),
            self.paths.history.display()
        );
        tracing::info!(
            "  schedule:  cron={}, interval={}m, concurrency={}, delivery_timeout={}s",
            self.schedule.cron.as_deref().unwrap_or("(none)"),
            self.schedule.interval_minutes,
            self.schedule.max_concurrency,
            self.schedule.delivery_timeout_secs
        );
    }

    /// Return a redacted view safe for printing (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "tracker": {
                "base_url": self.tracker.base_url,
                "auth_type": self.tracker.auth_type,
                "projects": self.tracker.projects,
                "configured": self.tracker.is_configured(),
            },
            "chat": {
                "base_url": self.chat.base_url,
                "configured": self.chat.is_configured(),
            },
            "paths": {
                "rules_config": self.paths.rules_config,
                "directory": self.paths.directory,
                "history": self.paths.history,
            },
            "schedule": {
                "cron": self.schedule.cron,
                "interval_minutes": self.schedule.interval_minutes,
                "max_concurrency": self.schedule.max_concurrency,
                "delivery_timeout_secs": self.schedule.delivery_timeout_secs,
            },
        })
    }
}

// ── Tracker (Jira) ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub api_token: Option<String>,
    /// "basic" or "bearer".
    pub auth_type: String,
    /// Project keys to query; also the default rule allow-list.
    pub projects: Vec<String>,
    pub page_size: u32,
}

impl TrackerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            base_url: profiled_env_or(p, "JIRA_BASE_URL", ""),
            username: profiled_env_opt(p, "JIRA_USERNAME"),
            api_token: profiled_env_opt(p, "JIRA_API_TOKEN"),
            auth_type: profiled_env_or(p, "JIRA_AUTH_TYPE", "basic").to_lowercase(),
            projects: split_list(&profiled_env_or(p, "JIRA_PROJECTS", "")),
            page_size: profiled_env_u32(p, "JIRA_PAGE_SIZE", 100),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && self.api_token.is_some()
    }
}

// ── Chat delivery ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub base_url: String,
    pub bot_id: Option<String>,
    /// Bearer token; may be a `${VAR}` reference.
    pub token: Option<String>,
}

impl ChatConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            base_url: profiled_env_or(p, "CHAT_BASE_URL", ""),
            bot_id: profiled_env_opt(p, "CHAT_BOT_ID"),
            token: profiled_env_opt(p, "CHAT_TOKEN"),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && self.bot_id.is_some()
    }
}

// ── Files ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub rules_config: PathBuf,
    pub directory: PathBuf,
    pub history: PathBuf,
}

impl PathsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            rules_config: PathBuf::from(profiled_env_or(p, "RULES_CONFIG", "config/rules.yml")),
            directory: PathBuf::from(profiled_env_or(p, "DIRECTORY_FILE", "config/directory.yml")),
            history: PathBuf::from(profiled_env_or(p, "HISTORY_FILE", "data/reminder_history.jsonl")),
        }
    }
}

// ── Scheduling ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// 5- or 6-field cron expression; takes precedence over the interval.
    pub cron: Option<String>,
    pub interval_minutes: u64,
    /// Upper bound on events delivered concurrently within one cycle.
    pub max_concurrency: usize,
    pub delivery_timeout_secs: u64,
}

impl ScheduleConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            cron: profiled_env_opt(p, "SCHEDULE_CRON"),
            interval_minutes: profiled_env_u64(p, "SCHEDULE_INTERVAL_MINUTES", 15),
            max_concurrency: profiled_env_u32(p, "CYCLE_CONCURRENCY", 8).max(1) as usize,
            delivery_timeout_secs: profiled_env_u64(p, "DELIVERY_TIMEOUT_SECS", 15),
        }
    }
}
