//! Subcommand entry points.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use ctxwatch_core::config::Settings;
use ctxwatch_core::{
    AdvisoryLevel, SessionId, SnapshotStore, TranscriptSummary, UsageAccountant, UsageSnapshot,
};

use crate::monitor::{SessionWatcher, WatchMessage};

/// Snapshots not rewritten for this long are flagged by `status`
const STALE_AFTER: Duration = Duration::from_secs(10 * 60);

fn store(settings: &Settings) -> SnapshotStore {
    SnapshotStore::new(settings.state_dir())
}

/// Follow a transcript until Ctrl-C
pub async fn watch(settings: &Settings, session: &str, transcript: &Path) -> Result<()> {
    let session = SessionId::new(session)?;
    let accountant = UsageAccountant::new(store(settings), settings.context_limit);
    let watcher = SessionWatcher::open(
        session.clone(),
        accountant,
        transcript,
        settings.poll_interval(),
        settings.fs_events,
    )
    .await?;
    let mut rx = watcher.start();

    loop {
        let message = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(session = %session, "Interrupted");
                break;
            }
            message = rx.recv() => message,
        };

        match message {
            Some(WatchMessage::Updated { snapshot, level }) => {
                println!("{}", render_update(&snapshot, level));
            }
            Some(WatchMessage::LevelChanged { from, to, percent }) => {
                if to > from {
                    warn!(session = %session, "{} -> {} at {:.1}%: {}", from, to, percent, to.recommendation());
                } else {
                    info!(session = %session, "{} -> {} at {:.1}%", from, to, percent);
                }
            }
            Some(WatchMessage::Error(e)) => warn!(session = %session, "{}", e),
            None => break,
        }
    }

    Ok(())
}

/// Print a session's current usage
pub fn status(settings: &Settings, session: &str, json: bool) -> Result<()> {
    let session = SessionId::new(session)?;
    let mut snapshot = store(settings).read(&session);
    if snapshot.limit == 0 {
        snapshot.limit = settings.context_limit;
    }

    let now = Utc::now();
    if json {
        let report = StatusReport::new(&session, snapshot, now);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render_status(&session, &snapshot, now));
    }
    Ok(())
}

/// Back up and zero a session's snapshot
pub fn reset(settings: &Settings, session: &str) -> Result<()> {
    let session = SessionId::new(session)?;
    let outcome = store(settings).reset(&session, settings.context_limit)?;
    match outcome.backup {
        Some(backup) => println!("{}: reset, previous snapshot at {}", session, backup.display()),
        None => println!("{}: reset", session),
    }
    Ok(())
}

/// Summarize a whole transcript
pub fn scan(settings: &Settings, transcript: &Path, json: bool) -> Result<()> {
    let file = std::fs::File::open(transcript)
        .with_context(|| format!("Failed to open transcript: {:?}", transcript))?;
    let summary = TranscriptSummary::from_reader(BufReader::new(file), settings.context_limit)
        .with_context(|| format!("Failed to read transcript: {:?}", transcript))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", render_summary(&summary));
    }
    Ok(())
}

/// `status --json` output
#[derive(Debug, Serialize)]
struct StatusReport {
    session: String,
    #[serde(flatten)]
    snapshot: UsageSnapshot,
    level: AdvisoryLevel,
    recommendation: &'static str,
    age_secs: Option<u64>,
    stale: bool,
}

impl StatusReport {
    fn new(session: &SessionId, snapshot: UsageSnapshot, now: DateTime<Utc>) -> Self {
        let level = snapshot.level();
        Self {
            session: session.to_string(),
            age_secs: snapshot.age(now).map(|age| age.as_secs()),
            stale: snapshot.is_stale(now, STALE_AFTER),
            level,
            recommendation: level.recommendation(),
            snapshot,
        }
    }
}

fn render_update(snapshot: &UsageSnapshot, level: AdvisoryLevel) -> String {
    format!(
        "{:>5.1}% {:<8} input {} / {}, output {} (total {})",
        snapshot.percent,
        level,
        snapshot.turn_input,
        snapshot.limit,
        snapshot.turn_output,
        snapshot.total_output
    )
}

fn render_status(session: &SessionId, snapshot: &UsageSnapshot, now: DateTime<Utc>) -> String {
    let level = snapshot.level();
    let updated = match snapshot.age(now) {
        Some(age) if snapshot.is_stale(now, STALE_AFTER) => {
            format!("{} ago (stale)", format_age(age))
        }
        Some(age) => format!("{} ago", format_age(age)),
        None => "never".to_string(),
    };

    format!(
        "session:  {}\n\
         usage:    {:.1}% ({} / {} tokens)\n\
         output:   {} total over {} turns\n\
         level:    {} ({})\n\
         updated:  {}",
        session,
        snapshot.percent,
        snapshot.turn_input,
        snapshot.limit,
        snapshot.total_output,
        snapshot.turns,
        level,
        level.recommendation(),
        updated
    )
}

fn render_summary(summary: &TranscriptSummary) -> String {
    let records = &summary.records;
    let mut out = String::new();
    if let Some(id) = &summary.session_id {
        out.push_str(&format!("session:      {}\n", id));
    }
    if let Some(model) = &summary.model {
        out.push_str(&format!("model:        {}\n", model));
    }
    out.push_str(&format!(
        "records:      {} system, {} user, {} assistant, {} summary, {} result, {} stream, {} other, {} malformed\n\
         turns:        {} with usage, {} repeated\n\
         input:        {} direct, {} cache write, {} cache read\n\
         output:       {}\n\
         peak context: {}\n\
         final:        {:.1}% ({} / {}) {}\n\
         tool calls:   {}",
        records.system,
        records.user,
        records.assistant,
        records.summary,
        records.result,
        records.stream_event,
        records.other,
        records.malformed,
        summary.usage_turns,
        summary.duplicate_turns,
        summary.direct_input,
        summary.cache_write_input,
        summary.cache_read_input,
        summary.total_output,
        summary.peak_turn_input,
        summary.percent,
        summary.final_turn_input,
        summary.limit,
        summary.level,
        summary.tool_calls
    ));
    for (name, count) in summary.tools_by_count() {
        out.push_str(&format!("\n  {:<38} {}", name, count));
    }
    out
}

fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    match secs {
        0..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m {}s", secs / 60, secs % 60),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    }
}
