//! Core library for ctxwatch.
//!
//! Follows an agent's append-only transcript, folds the token usage reported
//! by each assistant turn into a persisted per-session snapshot, and maps the
//! resulting context-window percentage to an advisory level.

pub mod advisory;
pub mod config;
pub mod error;
pub mod persist;
pub mod tail;
pub mod transcript;
pub mod usage;

pub use advisory::{classify, AdvisoryLevel};
pub use error::{TailError, UsageError};
pub use tail::TranscriptTail;
pub use transcript::{TranscriptSummary, TurnRecord, UsagePayload};
pub use usage::{
    ResetOutcome, SessionId, SkipReason, SnapshotStore, UpdateResult, UsageAccountant,
    UsageSnapshot,
};
