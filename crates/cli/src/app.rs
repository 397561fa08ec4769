//! Builds the scan pipeline from process config and the rule/directory files.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use nudge_connector::{JiraSource, MilestoneStatuses, StaticSource, TaskSource};
use nudge_core::{Config, Directory, RuleKind};
use nudge_cycle::CycleRunner;
use nudge_history::{HistoryBackend, HistoryStore, JsonlLedger, MemoryLedger};
use nudge_notify::{Address, ChatBotAdapter, DeliveryAdapter, DeliveryError, ReminderRenderer, Router};
use nudge_rules::{RuleConfig, RuleEngine};
use tracing::info;

/// How `build_runner` should source and deliver.
#[derive(Debug, Default)]
pub struct RunOptions<'a> {
    pub snapshots: Option<&'a Path>,
    pub dry_run: bool,
}

/// Rule config and directory, loaded and validated.
pub struct Loaded {
    pub rules: RuleConfig,
    pub directory: Arc<Directory>,
    pub renderer: ReminderRenderer,
}

pub fn load(config: &Config) -> Result<Loaded> {
    let rules = RuleConfig::load(&config.paths.rules_config)
        .with_context(|| format!("failed to load rule config {}", config.paths.rules_config.display()))?;
    let directory = if config.paths.directory.exists() {
        Directory::load(&config.paths.directory)
            .with_context(|| format!("failed to load directory {}", config.paths.directory.display()))?
    } else {
        tracing::warn!(path = %config.paths.directory.display(), "identity directory not found, group fallback and escalation disabled");
        Directory::empty()
    };
    let renderer = renderer_for(&rules)?;
    Ok(Loaded {
        rules,
        directory: Arc::new(directory),
        renderer,
    })
}

/// Renderer with the per-rule template overrides from `rules`.
pub fn renderer_for(rules: &RuleConfig) -> Result<ReminderRenderer> {
    let overrides: HashMap<RuleKind, String> = RuleKind::ALL
        .into_iter()
        .filter_map(|kind| rules.template_override(kind).map(|t| (kind, t.to_string())))
        .collect();
    ReminderRenderer::with_overrides(overrides).context("invalid message template")
}

fn open_history(config: &Config, dry_run: bool) -> Result<Arc<HistoryStore>> {
    let backend: Arc<dyn HistoryBackend> = if dry_run {
        Arc::new(MemoryLedger::new())
    } else {
        Arc::new(
            JsonlLedger::open(&config.paths.history)
                .with_context(|| format!("failed to open history {}", config.paths.history.display()))?,
        )
    };
    Ok(Arc::new(HistoryStore::new(backend)))
}

fn task_source(config: &Config, rules: &RuleConfig, snapshots: Option<&Path>) -> Result<Arc<dyn TaskSource>> {
    if let Some(path) = snapshots {
        return Ok(Arc::new(StaticSource::from_json_file(path)?));
    }
    let milestones = MilestoneStatuses::new(&rules.uat_statuses, &rules.production_statuses);
    let source = JiraSource::from_config(&config.tracker, milestones, Duration::from_secs(30))?
        .with_jql_offset(rules.local_offset());
    Ok(Arc::new(source))
}

fn delivery_adapter(config: &Config, timeout: Duration, dry_run: bool) -> Result<Arc<dyn DeliveryAdapter>> {
    if dry_run {
        return Ok(Arc::new(LogOnlyAdapter));
    }
    Ok(Arc::new(ChatBotAdapter::from_config(&config.chat, timeout)?))
}

pub fn build_runner(config: &Config, options: RunOptions<'_>) -> Result<CycleRunner> {
    let Loaded {
        rules,
        directory,
        renderer,
    } = load(config)?;
    let timeout = Duration::from_secs(config.schedule.delivery_timeout_secs.max(1));

    let source = task_source(config, &rules, options.snapshots)?;
    let adapter = delivery_adapter(config, timeout, options.dry_run)?;
    let history = open_history(config, options.dry_run)?;
    let router = Router::new(adapter, directory.clone(), timeout).with_domains_allowed(&rules.domains_allowed);

    info!(
        source = source.source_name(),
        channel = router.channel_name(),
        history = history.backend_name(),
        dry_run = options.dry_run,
        "scan pipeline ready"
    );

    // The tracker project list narrows the query; the rule allow-list still filters.
    let projects = config.tracker.projects.clone();
    let max_concurrency = config.schedule.max_concurrency;
    let engine = RuleEngine::new(rules, directory);
    Ok(CycleRunner::new(source, engine, history, router, renderer)
        .with_projects(projects)
        .with_max_concurrency(max_concurrency))
}

/// Logs each reminder instead of sending it.
struct LogOnlyAdapter;

#[async_trait]
impl DeliveryAdapter for LogOnlyAdapter {
    async fn send(&self, address: &Address, text: &str) -> Result<String, DeliveryError> {
        info!(address = %address, text, "dry run, not sending");
        Ok("dry run".to_string())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}
