//! Live follower for append-only transcript files.
//!
//! Starts at the end of the file as it is at subscription time and yields each
//! line appended afterwards, in order, exactly once. A missing file is waited
//! for; once it appears it is read from the beginning. Truncation or
//! replacement of the file resumes from the new file's end.
//!
//! A file truncated and regrown past the read offset between two polls keeps
//! its identity and size trend, so it is recognized by the byte just before
//! the offset changing. A rewrite that happens to put the same byte there is
//! not detected and is read on from the old offset.

use std::collections::VecDeque;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::stream::{self, Stream};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::TailError;

/// Device and inode of the followed file, used to detect rotation
type FileId = Option<(u64, u64)>;

#[cfg(unix)]
fn file_id(meta: &std::fs::Metadata) -> FileId {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_id(_meta: &std::fs::Metadata) -> FileId {
    None
}

/// Filesystem notifications for the transcript's directory.
///
/// Only shortens the wait between polls; polling alone is still correct.
struct Wakeup {
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<()>,
}

impl Wakeup {
    fn watch(path: &Path) -> Option<Self> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = path.file_name()?.to_os_string();

        let (tx, rx) = mpsc::unbounded_channel();
        let handler = move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(file_name.as_os_str()))
                {
                    let _ = tx.send(());
                }
            }
        };

        let mut watcher = match notify::recommended_watcher(handler) {
            Ok(watcher) => watcher,
            Err(e) => {
                warn!(error = %e, "Failed to create filesystem watcher, polling only");
                return None;
            }
        };
        if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            warn!(dir = %dir.display(), error = %e, "Failed to watch transcript directory, polling only");
            return None;
        }

        Some(Self {
            _watcher: watcher,
            rx,
        })
    }
}

/// Follows one transcript path
pub struct TranscriptTail {
    path: PathBuf,
    poll_interval: Duration,
    /// Open handle, `None` while the file does not exist
    file: Option<File>,
    file_id: FileId,
    /// Byte offset of the next unread byte
    offset: u64,
    /// Bytes of an incomplete trailing line
    pending: Vec<u8>,
    /// Complete lines not yet handed out
    ready: VecDeque<String>,
    /// Drop bytes up to the next newline (line began before subscription)
    discard_partial: bool,
    /// Byte just before `offset`, if known
    last_byte: Option<u8>,
    wake: Option<Wakeup>,
}

impl TranscriptTail {
    /// Subscribe to `path`, starting from its current end.
    ///
    /// A path that does not exist yet is not an error.
    pub async fn open(path: impl Into<PathBuf>, poll_interval: Duration) -> Result<Self, TailError> {
        let mut tail = Self {
            path: path.into(),
            poll_interval,
            file: None,
            file_id: None,
            offset: 0,
            pending: Vec::new(),
            ready: VecDeque::new(),
            discard_partial: false,
            last_byte: None,
            wake: None,
        };

        match tokio::fs::metadata(&tail.path).await {
            Ok(meta) => tail.attach_at_end(&meta).await?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %tail.path.display(), "Transcript does not exist yet, waiting");
            }
            Err(source) => {
                return Err(TailError::Inaccessible {
                    path: tail.path,
                    source,
                })
            }
        }

        Ok(tail)
    }

    /// Wake early on filesystem events instead of waiting a full poll interval
    pub fn with_fs_events(mut self) -> Self {
        self.wake = Wakeup::watch(&self.path);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next complete line, waiting for one to be appended if necessary.
    ///
    /// Never returns on its own except with a terminal error.
    pub async fn next_line(&mut self) -> Result<String, TailError> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(line);
            }
            self.poll_once().await?;
            if self.ready.is_empty() {
                self.wait().await;
            }
        }
    }

    /// Consume the follower as a stream of lines.
    ///
    /// A terminal error is yielded once, after which the stream ends.
    pub fn into_stream(self) -> impl Stream<Item = Result<String, TailError>> {
        stream::unfold(Some(self), |state| async move {
            let mut tail = state?;
            match tail.next_line().await {
                Ok(line) => Some((Ok(line), Some(tail))),
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    async fn wait(&mut self) {
        let interval = self.poll_interval;
        let Some(wake) = self.wake.as_mut() else {
            tokio::time::sleep(interval).await;
            return;
        };

        let event = tokio::select! {
            _ = tokio::time::sleep(interval) => return,
            event = wake.rx.recv() => event,
        };
        match event {
            // Coalesce a burst of events into one poll
            Some(()) => while wake.rx.try_recv().is_ok() {},
            None => {
                warn!(path = %self.path.display(), "Filesystem watcher stopped, polling only");
                self.wake = None;
            }
        }
    }

    /// Check the file once and queue any newly completed lines
    async fn poll_once(&mut self) -> Result<(), TailError> {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if self.file.take().is_some() {
                    debug!(path = %self.path.display(), "Transcript removed, waiting for it to reappear");
                }
                self.reset_position(0, false);
                return Ok(());
            }
            Err(source) => {
                return Err(TailError::Inaccessible {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if self.file.is_none() {
            // Nothing existed before, so everything in it is new
            let Some(file) = self.open_file().await? else {
                return Ok(());
            };
            debug!(path = %self.path.display(), "Transcript appeared");
            self.file = Some(file);
            self.file_id = file_id(&meta);
            self.reset_position(0, false);
            self.read_new().await?;
            return Ok(());
        }

        if file_id(&meta) != self.file_id {
            debug!(path = %self.path.display(), "Transcript replaced, resuming from its end");
            return self.attach_at_end(&meta).await;
        }

        if meta.len() < self.offset {
            debug!(
                path = %self.path.display(),
                old_offset = self.offset,
                new_len = meta.len(),
                "Transcript truncated, resuming from its end"
            );
            return self.attach_at_end(&meta).await;
        }

        if meta.len() > self.offset && !self.read_new().await? {
            debug!(path = %self.path.display(), "Transcript rewritten in place, resuming from its end");
            return self.attach_at_end(&meta).await;
        }
        Ok(())
    }

    async fn open_file(&self) -> Result<Option<File>, TailError> {
        match File::open(&self.path).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(TailError::Inaccessible {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Follow the file at `path` starting from its current end
    async fn attach_at_end(&mut self, meta: &std::fs::Metadata) -> Result<(), TailError> {
        let Some(mut file) = self.open_file().await? else {
            self.file = None;
            self.reset_position(0, false);
            return Ok(());
        };

        let len = meta.len();
        let mut last_byte = None;
        if len > 0 {
            let read_err = |source| TailError::Read {
                path: self.path.clone(),
                source,
            };
            file.seek(SeekFrom::Start(len - 1)).await.map_err(read_err)?;
            last_byte = match file.read_u8().await {
                Ok(last) => Some(last),
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => None,
                Err(source) => return Err(read_err(source)),
            };
        }

        self.file = Some(file);
        self.file_id = file_id(meta);
        self.reset_position(len, last_byte.is_some_and(|b| b != b'\n'));
        self.last_byte = last_byte;
        Ok(())
    }

    fn reset_position(&mut self, offset: u64, discard_partial: bool) {
        self.offset = offset;
        self.pending.clear();
        self.discard_partial = discard_partial;
        self.last_byte = None;
    }

    /// Read everything after `offset`.
    ///
    /// Returns `false`, consuming nothing, when the byte before `offset` is no
    /// longer the one read there earlier (the file was rewritten in place).
    async fn read_new(&mut self) -> Result<bool, TailError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(true);
        };
        let read_err = |source| TailError::Read {
            path: self.path.clone(),
            source,
        };

        let check = self.last_byte.filter(|_| self.offset > 0);
        let start = if check.is_some() {
            self.offset - 1
        } else {
            self.offset
        };
        file.seek(SeekFrom::Start(start)).await.map_err(read_err)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.map_err(read_err)?;

        let new = match check {
            Some(expected) => match buf.split_first() {
                Some((&first, rest)) if first == expected => rest,
                _ => return Ok(false),
            },
            None => &buf[..],
        };
        if let Some(&last) = new.last() {
            self.last_byte = Some(last);
        }
        self.offset += new.len() as u64;
        self.push_bytes(new);
        Ok(true)
    }

    /// Split appended bytes into complete lines
    fn push_bytes(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);

        if self.discard_partial {
            match self.pending.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.pending.drain(..=pos);
                    self.discard_partial = false;
                }
                None => {
                    self.pending.clear();
                    return;
                }
            }
        }

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.ready.push_back(String::from_utf8_lossy(&line).into_owned());
        }
    }
}
