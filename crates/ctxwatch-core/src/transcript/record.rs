//! Turn records decoded from agent transcript lines.
//!
//! Transcripts are newline-delimited JSON written by the agent CLI
//! (`--output-format stream-json` or the session `.jsonl` files). Each line is
//! a self-contained record tagged by its `type` field.

use serde::{Deserialize, Deserializer, Serialize};

/// One transcript line
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnRecord {
    /// Session lifecycle record (e.g. `subtype: "init"`)
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    /// User message or tool result
    User {
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Model response, the only record carrying token usage
    Assistant {
        message: AssistantMessage,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Conversation summary written after compaction
    Summary {
        #[serde(default)]
        summary: Option<String>,
    },
    /// Final result of a non-interactive run (carries session totals, not a turn)
    Result {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        is_error: bool,
    },
    /// Partial-message event from a streaming run
    StreamEvent {
        #[serde(default)]
        event: StreamEvent,
    },
    /// Any record type not understood yet
    #[serde(other)]
    Other,
}

/// Event carried by a `stream_event` record.
///
/// Only `message_start` reports usage (the input side of the turn); deltas
/// carry no message id and are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        #[serde(default)]
        message: AssistantMessage,
    },
    #[default]
    #[serde(other)]
    Other,
}

/// Body of an assistant record
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient_blocks")]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub usage: Option<RawUsage>,
}

/// One block of assistant content; only tool calls are of interest
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    ToolUse {
        #[serde(default)]
        name: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// Content that is not a list of typed blocks carries no tool calls
fn lenient_blocks<'de, D>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error>
where
    D: Deserializer<'de>,
{
    let serde_json::Value::Array(items) = serde_json::Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// Usage object as written by the provider; every counter is optional
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RawUsage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
}

impl RawUsage {
    /// Convert to a payload, or `None` when no counter is present at all.
    ///
    /// An empty usage object is treated as missing data, not as zero usage.
    pub fn to_payload(&self) -> Option<UsagePayload> {
        if self.input_tokens.is_none()
            && self.cache_creation_input_tokens.is_none()
            && self.cache_read_input_tokens.is_none()
            && self.output_tokens.is_none()
        {
            return None;
        }
        Some(UsagePayload {
            direct_input: self.input_tokens.unwrap_or(0),
            cache_write_input: self.cache_creation_input_tokens.unwrap_or(0),
            cache_read_input: self.cache_read_input_tokens.unwrap_or(0),
            output: self.output_tokens.unwrap_or(0),
        })
    }
}

/// Token counters reported for one assistant turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePayload {
    /// Input tokens processed fresh this turn
    pub direct_input: u64,
    /// Input tokens newly written to the provider cache
    pub cache_write_input: u64,
    /// Input tokens served from the provider cache
    pub cache_read_input: u64,
    /// Tokens generated this turn
    pub output: u64,
}

impl UsagePayload {
    /// Size of the context supplied to the model this turn
    pub fn total_input(&self) -> u64 {
        self.direct_input
            .saturating_add(self.cache_write_input)
            .saturating_add(self.cache_read_input)
    }
}

/// Usage extracted from a single assistant turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnUsage {
    pub payload: UsagePayload,
    pub message_id: Option<String>,
    pub model: Option<String>,
}

/// Kind of a record, used for counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    System,
    User,
    Assistant,
    Summary,
    Result,
    StreamEvent,
    Other,
}

impl TurnRecord {
    /// Decode one transcript line.
    ///
    /// Returns `None` for blank or undecodable lines; those are expected
    /// noise in a live transcript, not errors.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        serde_json::from_str(line).ok()
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Self::System { .. } => RecordKind::System,
            Self::User { .. } => RecordKind::User,
            Self::Assistant { .. } => RecordKind::Assistant,
            Self::Summary { .. } => RecordKind::Summary,
            Self::Result { .. } => RecordKind::Result,
            Self::StreamEvent { .. } => RecordKind::StreamEvent,
            Self::Other => RecordKind::Other,
        }
    }

    /// Usage carried by this record: an assistant turn or the start of a
    /// streamed message, with counters
    pub fn usage(&self) -> Option<TurnUsage> {
        let message = match self {
            Self::Assistant { message, .. } => message,
            Self::StreamEvent {
                event: StreamEvent::MessageStart { message },
            } => message,
            _ => return None,
        };
        let payload = message.usage.as_ref()?.to_payload()?;
        Some(TurnUsage {
            payload,
            message_id: message.id.clone(),
            model: message.model.clone(),
        })
    }

    /// Names of the tools called by this record, in content order
    pub fn tool_names(&self) -> Vec<Option<&str>> {
        let Self::Assistant { message, .. } = self else {
            return Vec::new();
        };
        message
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { name } => Some(name.as_deref()),
                ContentBlock::Other => None,
            })
            .collect()
    }
}
