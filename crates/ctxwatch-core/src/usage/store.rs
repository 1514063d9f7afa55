//! Snapshot files on disk.
//!
//! Layout: `<root>/<session>/token-usage.json`, with reset backups alongside
//! as `token-usage.01.json`, `token-usage.02.json`, ...

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use super::session::SessionId;
use super::snapshot::UsageSnapshot;
use crate::error::UsageError;
use crate::persist;

/// File name of the canonical snapshot in a session directory
pub const SNAPSHOT_FILE: &str = "token-usage.json";

/// Result of a reset
#[derive(Debug, Clone, PartialEq)]
pub struct ResetOutcome {
    /// Where the previous snapshot was moved, if there was one
    pub backup: Option<PathBuf>,
    /// The fresh snapshot now at the canonical path
    pub snapshot: UsageSnapshot,
}

/// Reads and writes session snapshots under a root directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one session's snapshot and backups
    pub fn session_dir(&self, session: &SessionId) -> PathBuf {
        self.root.join(session.as_str())
    }

    /// Canonical snapshot path for a session
    pub fn path(&self, session: &SessionId) -> PathBuf {
        self.session_dir(session).join(SNAPSHOT_FILE)
    }

    /// Load the stored snapshot, `None` if absent or unreadable.
    ///
    /// A corrupt file is logged and treated as absent so that monitoring
    /// restarts from zero instead of halting.
    pub fn load(&self, session: &SessionId) -> Option<UsageSnapshot> {
        let path = self.path(session);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read usage snapshot");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt usage snapshot, treating as empty");
                None
            }
        }
    }

    /// Current snapshot, or the zero default for a session never written
    pub fn read(&self, session: &SessionId) -> UsageSnapshot {
        self.load(session).unwrap_or_default()
    }

    /// Atomically replace the session's snapshot
    pub fn write(&self, session: &SessionId, snapshot: &UsageSnapshot) -> Result<(), UsageError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        persist::write_atomic(&self.path(session), &json)
    }

    /// Start a new iteration for `session`.
    ///
    /// The existing snapshot is moved to the lowest unused backup name, then a
    /// zero snapshot is written in its place.
    pub fn reset(&self, session: &SessionId, limit: u64) -> Result<ResetOutcome, UsageError> {
        let path = self.path(session);
        let backup = persist::move_to_backup(&path)?;
        if let Some(ref backup) = backup {
            debug!(session = %session, backup = %backup.display(), "Backed up usage snapshot");
        }

        let snapshot = UsageSnapshot {
            updated_at: Some(Utc::now()),
            ..UsageSnapshot::zero(limit)
        };
        self.write(session, &snapshot)?;

        Ok(ResetOutcome { backup, snapshot })
    }

    /// Backup files for a session, oldest sequence number first
    pub fn backups(&self, session: &SessionId) -> Vec<PathBuf> {
        let entries = match fs::read_dir(self.session_dir(session)) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        let mut found: Vec<(u32, PathBuf)> = entries
            .filter_map(|entry| {
                let path = entry.ok()?.path();
                let seq = backup_seq(path.file_name()?.to_str()?)?;
                Some((seq, path))
            })
            .collect();
        found.sort_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, path)| path).collect()
    }
}

/// Sequence number of a backup file name such as `token-usage.03.json`
fn backup_seq(name: &str) -> Option<u32> {
    let seq = name.strip_prefix("token-usage.")?.strip_suffix(".json")?;
    if seq.len() < 2 || !seq.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    seq.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> (tempfile::TempDir, SnapshotStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("sessions"));
        (dir, store)
    }

    fn session(id: &str) -> SessionId {
        SessionId::new(id).unwrap()
    }

    #[test]
    fn test_read_before_write_is_zero() {
        let (_dir, store) = store();
        let snap = store.read(&session("new-task"));
        assert_eq!(snap.turn_input, 0);
        assert_eq!(snap.turn_output, 0);
        assert_eq!(snap.total_output, 0);
        assert_eq!(snap.percent, 0.0);
        assert_eq!(snap.updated_at, None);
    }

    #[test]
    fn test_write_then_read() {
        let (_dir, store) = store();
        let id = session("task-1");
        let snap = UsageSnapshot {
            turn_input: 8000,
            turn_output: 150,
            total_output: 150,
            percent: 4.0,
            turns: 1,
            updated_at: Some(Utc::now()),
            ..UsageSnapshot::zero(200_000)
        };
        store.write(&id, &snap).unwrap();

        assert_eq!(store.read(&id), snap);
        assert!(store.path(&id).ends_with("task-1/token-usage.json"));
    }

    #[test]
    fn test_corrupt_snapshot_reads_as_zero() {
        let (_dir, store) = store();
        let id = session("task-1");
        fs::create_dir_all(store.session_dir(&id)).unwrap();
        fs::write(store.path(&id), "{\"turn_input\": 12").unwrap();

        assert_eq!(store.load(&id), None);
        assert_eq!(store.read(&id), UsageSnapshot::default());
    }

    #[test]
    fn test_reset_twice_keeps_both_backups() {
        let (_dir, store) = store();
        let id = session("task-1");

        let first = UsageSnapshot {
            turn_input: 100,
            total_output: 10,
            percent: 50.0,
            ..UsageSnapshot::zero(200)
        };
        store.write(&id, &first).unwrap();
        let outcome = store.reset(&id, 200).unwrap();
        let backup1 = outcome.backup.unwrap();
        assert!(backup1.ends_with("token-usage.01.json"));
        assert_eq!(outcome.snapshot.turn_input, 0);
        assert_eq!(outcome.snapshot.total_output, 0);
        assert_eq!(outcome.snapshot.percent, 0.0);
        assert_eq!(outcome.snapshot.limit, 200);

        let second = UsageSnapshot {
            turn_input: 150,
            total_output: 30,
            percent: 75.0,
            ..UsageSnapshot::zero(200)
        };
        store.write(&id, &second).unwrap();
        let backup2 = store.reset(&id, 200).unwrap().backup.unwrap();
        assert!(backup2.ends_with("token-usage.02.json"));

        let restored1: UsageSnapshot =
            serde_json::from_str(&fs::read_to_string(&backup1).unwrap()).unwrap();
        let restored2: UsageSnapshot =
            serde_json::from_str(&fs::read_to_string(&backup2).unwrap()).unwrap();
        assert_eq!(restored1, first);
        assert_eq!(restored2, second);

        let current = store.read(&id);
        assert_eq!(current.turn_input, 0);
        assert_eq!(current.total_output, 0);
        assert_eq!(current.percent, 0.0);

        assert_eq!(store.backups(&id), vec![backup1, backup2]);
    }

    #[test]
    fn test_backup_seq() {
        assert_eq!(backup_seq("token-usage.01.json"), Some(1));
        assert_eq!(backup_seq("token-usage.120.json"), Some(120));
        assert_eq!(backup_seq("token-usage.json"), None);
        assert_eq!(backup_seq("token-usage.1.json"), None);
        assert_eq!(backup_seq(".token-usage.json.tmp"), None);
    }

    #[test]
    fn test_reset_without_snapshot_writes_zero() {
        let (_dir, store) = store();
        let id = session("fresh");
        let outcome = store.reset(&id, 200_000).unwrap();
        assert_eq!(outcome.backup, None);
        assert!(store.path(&id).exists());
        assert!(store.backups(&id).is_empty());
    }

    #[test]
    fn test_reset_fills_gap_with_lowest_free_number() {
        let (_dir, store) = store();
        let id = session("task-1");
        store.write(&id, &UsageSnapshot::zero(1)).unwrap();
        fs::write(persist::backup_path(&store.path(&id), 2), "{}").unwrap();

        let backup = store.reset(&id, 1).unwrap().backup.unwrap();
        assert!(backup.ends_with("token-usage.01.json"));
    }
}
