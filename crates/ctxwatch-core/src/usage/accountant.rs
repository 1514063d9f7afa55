//! Folds transcript lines into a session's usage snapshot.

use chrono::Utc;
use tracing::trace;

use super::session::SessionId;
use super::snapshot::UsageSnapshot;
use super::store::SnapshotStore;
use crate::error::UsageError;
use crate::transcript::{RecordKind, TurnRecord};

/// Why a line left the snapshot untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Blank or undecodable line
    Malformed,
    /// Decoded, but not an assistant turn with usage counters
    NoUsage,
    /// Same message id as the last folded turn (one line per content block)
    DuplicateMessage,
}

/// Outcome of feeding one line to the accountant
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateResult {
    /// The snapshot was replaced with this value
    Updated(UsageSnapshot),
    /// The line carried nothing to account for
    Skipped(SkipReason),
}

/// Sole writer of usage snapshots.
///
/// One accountant is owned by each session's watcher task; updates for a
/// session must be applied one at a time in transcript order.
#[derive(Debug, Clone)]
pub struct UsageAccountant {
    store: SnapshotStore,
    limit: u64,
}

impl UsageAccountant {
    pub fn new(store: SnapshotStore, limit: u64) -> Self {
        Self { store, limit }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Account for one transcript line.
    ///
    /// Lines without usage never touch the snapshot file. Re-feeding a line
    /// double-counts its output unless it carries a message id.
    pub fn update(&self, session: &SessionId, line: &str) -> Result<UpdateResult, UsageError> {
        let Some(record) = TurnRecord::parse(line) else {
            trace!(session = %session, "Skipping undecodable line");
            return Ok(UpdateResult::Skipped(SkipReason::Malformed));
        };
        // Streamed starts are followed by the full assistant line for the
        // same message, which has the final output count
        if record.kind() == RecordKind::StreamEvent {
            return Ok(UpdateResult::Skipped(SkipReason::NoUsage));
        }
        let Some(usage) = record.usage() else {
            return Ok(UpdateResult::Skipped(SkipReason::NoUsage));
        };

        let current = self
            .store
            .load(session)
            .unwrap_or_else(|| UsageSnapshot::zero(self.limit));

        if usage.message_id.is_some() && usage.message_id == current.last_message_id {
            trace!(session = %session, message_id = ?usage.message_id, "Skipping repeated message");
            return Ok(UpdateResult::Skipped(SkipReason::DuplicateMessage));
        }

        let next = current.apply(&usage, self.limit, Utc::now());
        self.store.write(session, &next)?;
        trace!(
            session = %session,
            turn_input = next.turn_input,
            total_output = next.total_output,
            percent = next.percent,
            "Usage snapshot updated"
        );
        Ok(UpdateResult::Updated(next))
    }
}
