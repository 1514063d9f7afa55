//! Token accounting and per-session snapshot persistence.
//!
//! The accountant is the only writer of a session's snapshot; any number of
//! readers may call [`SnapshotStore::read`] concurrently, from this process or
//! another, and always observe a complete snapshot.

mod accountant;
mod session;
mod snapshot;
mod store;

pub use accountant::{SkipReason, UpdateResult, UsageAccountant};
pub use session::SessionId;
pub use snapshot::{percent_of, UsageSnapshot};
pub use store::{ResetOutcome, SnapshotStore, SNAPSHOT_FILE};
