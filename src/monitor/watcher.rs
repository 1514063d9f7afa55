use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ctxwatch_core::{
    AdvisoryLevel, SessionId, TailError, TranscriptTail, UpdateResult, UsageAccountant,
    UsageSnapshot,
};

/// Message sent from a session watcher to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum WatchMessage {
    /// The session's snapshot was rewritten
    Updated {
        snapshot: UsageSnapshot,
        level: AdvisoryLevel,
    },
    /// The advisory level moved since the previous update
    LevelChanged {
        from: AdvisoryLevel,
        to: AdvisoryLevel,
        percent: f64,
    },
    /// A snapshot write or transcript read failed
    Error(String),
}

/// Follows one session's transcript and feeds it to the accountant
pub struct SessionWatcher {
    session: SessionId,
    accountant: Arc<UsageAccountant>,
    tail: TranscriptTail,
    /// Level of the last snapshot seen by this watcher
    level: AdvisoryLevel,
}

impl SessionWatcher {
    /// Attach to the end of `transcript`.
    ///
    /// Lines already in the file are not accounted for; only turns appended
    /// after this returns reach the snapshot.
    pub async fn open(
        session: SessionId,
        accountant: UsageAccountant,
        transcript: impl Into<PathBuf>,
        poll_interval: Duration,
        fs_events: bool,
    ) -> Result<Self, TailError> {
        let mut tail = TranscriptTail::open(transcript, poll_interval).await?;
        if fs_events {
            tail = tail.with_fs_events();
        }
        let level = accountant.store().read(&session).level();

        Ok(Self {
            session,
            accountant: Arc::new(accountant),
            tail,
            level,
        })
    }

    /// Start watching in a background task.
    ///
    /// The task stops when the returned receiver is dropped or the transcript
    /// becomes unreadable.
    pub fn start(self) -> mpsc::Receiver<WatchMessage> {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            self.run(tx).await;
        });

        rx
    }

    async fn run(mut self, tx: mpsc::Sender<WatchMessage>) {
        info!(
            session = %self.session,
            transcript = %self.tail.path().display(),
            "Watching transcript"
        );

        loop {
            let line = tokio::select! {
                _ = tx.closed() => break,
                line = self.tail.next_line() => line,
            };

            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!(session = %self.session, error = %e, "Transcript follower stopped");
                    let _ = tx.send(WatchMessage::Error(e.to_string())).await;
                    break;
                }
            };

            let messages = self.account(line).await;
            for message in messages {
                if tx.send(message).await.is_err() {
                    return; // Receiver dropped
                }
            }
        }

        debug!(session = %self.session, "Watcher stopped");
    }

    /// Feed one line to the accountant and translate the outcome.
    ///
    /// The update does synchronous file I/O, so it runs on the blocking pool.
    async fn account(&mut self, line: String) -> Vec<WatchMessage> {
        let accountant = Arc::clone(&self.accountant);
        let session = self.session.clone();
        let result =
            match tokio::task::spawn_blocking(move || accountant.update(&session, &line)).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(session = %self.session, error = %e, "Usage update task failed");
                    return vec![WatchMessage::Error(e.to_string())];
                }
            };

        match result {
            Ok(UpdateResult::Updated(snapshot)) => {
                let level = snapshot.level();
                let mut messages = Vec::with_capacity(2);
                if level != self.level {
                    info!(
                        session = %self.session,
                        from = %self.level,
                        to = %level,
                        percent = snapshot.percent,
                        "Advisory level changed"
                    );
                    messages.push(WatchMessage::LevelChanged {
                        from: self.level,
                        to: level,
                        percent: snapshot.percent,
                    });
                    self.level = level;
                }
                messages.push(WatchMessage::Updated { snapshot, level });
                messages
            }
            Ok(UpdateResult::Skipped(_)) => Vec::new(),
            Err(e) => {
                warn!(session = %self.session, error = %e, "Failed to update usage snapshot");
                vec![WatchMessage::Error(e.to_string())]
            }
        }
    }
}
