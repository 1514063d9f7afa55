//! Transcript record decoding and offline summaries.

mod record;
mod summary;

pub use record::{
    AssistantMessage, ContentBlock, RawUsage, RecordKind, StreamEvent, TurnRecord, TurnUsage,
    UsagePayload,
};
pub use summary::{RecordCounts, TranscriptSummary};
