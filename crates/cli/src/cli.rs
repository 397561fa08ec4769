use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tracker reminder bot.
///
/// Scans tracker tasks, evaluates reminder rules and delivers chat reminders,
/// never sending the same (task, rule, recipient) twice within the cooldown.
#[derive(Parser, Debug)]
#[command(name = "nudge", version, about)]
pub struct Cli {
    /// Config profile; environment keys are looked up as `{PROFILE}_{KEY}` first.
    #[arg(long, env = "NUDGE_PROFILE", global = true)]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one scan cycle now and print the report.
    Run {
        /// Replay snapshots from a JSON file instead of querying the tracker.
        #[arg(long)]
        snapshots: Option<PathBuf>,

        /// Log messages instead of sending them; history is kept in memory only.
        #[arg(long)]
        dry_run: bool,
    },

    /// Run cycles on the configured cron schedule or interval until interrupted.
    Serve {
        /// Run a cycle immediately instead of waiting for the first tick.
        #[arg(long, env = "NUDGE_RUN_ON_START")]
        run_on_start: bool,
    },

    /// List the most recent history record per key.
    History {
        /// Only records for this task key.
        #[arg(long)]
        task: Option<String>,
    },

    /// Load and validate the rule config and identity directory, then exit.
    CheckConfig,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_snapshots() {
        let cli = Cli::try_parse_from(["nudge", "run", "--snapshots", "tasks.json", "--dry-run"]).unwrap();
        match cli.command {
            Command::Run { snapshots, dry_run } => {
                assert_eq!(snapshots, Some(PathBuf::from("tasks.json")));
                assert!(dry_run);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn parses_history_filter() {
        let cli = Cli::try_parse_from(["nudge", "--profile", "stage", "history", "--task", "FC-100"]).unwrap();
        assert_eq!(cli.profile.as_deref(), Some("stage"));
        assert!(matches!(cli.command, Command::History { task: Some(ref t) } if t == "FC-100"));
    }
}
