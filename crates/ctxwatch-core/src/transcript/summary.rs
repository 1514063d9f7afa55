//! Offline summary of a complete transcript.

use std::collections::{BTreeMap, HashSet};
use std::io::BufRead;

use serde::Serialize;

use super::record::{RecordKind, TurnRecord};
use crate::advisory::AdvisoryLevel;
use crate::usage::percent_of;

/// Record counts by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    pub system: usize,
    pub user: usize,
    pub assistant: usize,
    pub summary: usize,
    pub result: usize,
    pub stream_event: usize,
    pub other: usize,
    /// Non-blank lines that did not decode
    pub malformed: usize,
}

/// Totals over every usage-bearing turn in a transcript
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TranscriptSummary {
    /// Agent session id from the init record, if any
    pub session_id: Option<String>,
    /// Model from the most recent assistant turn, or the init record
    pub model: Option<String>,
    pub records: RecordCounts,
    /// Usage-bearing records folded in (assistant turns and streamed starts)
    pub usage_turns: usize,
    /// Usage-bearing records whose message id was already counted
    pub duplicate_turns: usize,
    pub direct_input: u64,
    pub cache_write_input: u64,
    pub cache_read_input: u64,
    pub total_output: u64,
    /// Largest single-turn context size seen
    pub peak_turn_input: u64,
    /// Context size of the final turn
    pub final_turn_input: u64,
    /// `tool_use` blocks across all assistant lines
    pub tool_calls: usize,
    /// Tool calls by tool name (`unknown` when the block has no name)
    pub tool_counts: BTreeMap<String, usize>,
    pub limit: u64,
    /// `final_turn_input` as a percentage of `limit`
    pub percent: f64,
    pub level: AdvisoryLevel,
}

impl TranscriptSummary {
    /// Summarize a transcript read from start to end.
    ///
    /// A message id is counted the first time it appears anywhere in the
    /// file; later lines with the same id (one per content block, or the
    /// assistant line after a streamed start) only add to `duplicate_turns`.
    /// Invalid UTF-8 is replaced rather than treated as a read error.
    pub fn from_reader<R: BufRead>(mut reader: R, limit: u64) -> std::io::Result<Self> {
        let mut summary = Self {
            limit,
            level: AdvisoryLevel::Ok,
            ..Default::default()
        };
        let mut seen: HashSet<String> = HashSet::new();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            if line.trim().is_empty() {
                continue;
            }
            let Some(record) = TurnRecord::parse(&line) else {
                summary.records.malformed += 1;
                continue;
            };
            summary.count(&record);

            let Some(usage) = record.usage() else {
                continue;
            };
            if let Some(id) = &usage.message_id {
                if !seen.insert(id.clone()) {
                    summary.duplicate_turns += 1;
                    continue;
                }
            }

            let payload = usage.payload;
            summary.usage_turns += 1;
            summary.direct_input = summary.direct_input.saturating_add(payload.direct_input);
            summary.cache_write_input = summary
                .cache_write_input
                .saturating_add(payload.cache_write_input);
            summary.cache_read_input = summary
                .cache_read_input
                .saturating_add(payload.cache_read_input);
            summary.total_output = summary.total_output.saturating_add(payload.output);
            summary.final_turn_input = payload.total_input();
            summary.peak_turn_input = summary.peak_turn_input.max(summary.final_turn_input);
            if usage.model.is_some() {
                summary.model = usage.model;
            }
        }

        summary.percent = percent_of(summary.final_turn_input, limit);
        summary.level = AdvisoryLevel::from_percent(summary.percent);
        Ok(summary)
    }

    /// Tool counts, most used first (ties by name)
    pub fn tools_by_count(&self) -> Vec<(&str, usize)> {
        let mut tools: Vec<(&str, usize)> = self
            .tool_counts
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
            .collect();
        tools.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        tools
    }

    fn count(&mut self, record: &TurnRecord) {
        match record.kind() {
            RecordKind::System => self.records.system += 1,
            RecordKind::User => self.records.user += 1,
            RecordKind::Assistant => self.records.assistant += 1,
            RecordKind::Summary => self.records.summary += 1,
            RecordKind::Result => self.records.result += 1,
            RecordKind::StreamEvent => self.records.stream_event += 1,
            RecordKind::Other => self.records.other += 1,
        }
        for name in record.tool_names() {
            self.tool_calls += 1;
            *self
                .tool_counts
                .entry(name.unwrap_or("unknown").to_string())
                .or_insert(0) += 1;
        }
        if let TurnRecord::System {
            subtype,
            session_id,
            model,
        } = record
        {
            if subtype.as_deref() == Some("init") {
                if self.session_id.is_none() {
                    self.session_id = session_id.clone();
                }
                if self.model.is_none() {
                    self.model = model.clone();
                }
            }
        }
    }
}
