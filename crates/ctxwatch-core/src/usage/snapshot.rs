//! Persisted per-session usage snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::advisory::AdvisoryLevel;
use crate::transcript::TurnUsage;

/// Context-window usage of one session, as stored in `token-usage.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Context size of the most recent turn (replaced each turn)
    pub turn_input: u64,
    /// Output of the most recent turn
    pub turn_output: u64,
    /// Output accumulated over the whole session
    pub total_output: u64,
    /// Context-window ceiling in effect for the last write
    pub limit: u64,
    /// `turn_input` as a percentage of `limit`, one decimal place
    pub percent: f64,
    /// Time of the last successful write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Number of turns folded in since the last reset
    #[serde(default)]
    pub turns: u64,
    /// Model reported by the most recent turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Message id of the most recent turn, used to drop repeated lines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_id: Option<String>,
}

/// Round `value / limit * 100` to one decimal place.
///
/// A zero limit yields 0 rather than infinity.
pub fn percent_of(value: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    (value as f64 * 1000.0 / limit as f64).round() / 10.0
}

impl UsageSnapshot {
    /// Zero snapshot for a fresh session
    pub fn zero(limit: u64) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    /// Fold one turn into this snapshot, returning the new snapshot.
    ///
    /// Input is replaced (each turn restates the full context), output
    /// accumulates.
    pub fn apply(&self, usage: &TurnUsage, limit: u64, now: DateTime<Utc>) -> Self {
        let turn_input = usage.payload.total_input();
        Self {
            turn_input,
            turn_output: usage.payload.output,
            total_output: self.total_output.saturating_add(usage.payload.output),
            limit,
            percent: percent_of(turn_input, limit),
            updated_at: Some(now),
            turns: self.turns.saturating_add(1),
            model: usage.model.clone().or_else(|| self.model.clone()),
            last_message_id: usage.message_id.clone(),
        }
    }

    /// Advisory level for the stored percentage
    pub fn level(&self) -> AdvisoryLevel {
        AdvisoryLevel::from_percent(self.percent)
    }

    /// Time since the last write, `None` if never written or in the future
    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        let updated_at = self.updated_at?;
        (now - updated_at).to_std().ok()
    }

    /// Whether the writer has been quiet for longer than `max_age`.
    ///
    /// A snapshot that was never written counts as stale.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match self.age(now) {
            Some(age) => age > max_age,
            None => self.updated_at.is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::UsagePayload;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn turn(direct: u64, cache_read: u64, output: u64) -> TurnUsage {
        TurnUsage {
            payload: UsagePayload {
                direct_input: direct,
                cache_write_input: 0,
                cache_read_input: cache_read,
                output,
            },
            message_id: None,
            model: None,
        }
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(8_000, 200_000), 4.0);
        assert_eq!(percent_of(130_000, 200_000), 65.0);
        assert_eq!(percent_of(170_000, 200_000), 85.0);
        assert_eq!(percent_of(1, 3), 33.3);
        assert_eq!(percent_of(2, 3), 66.7);
        assert_eq!(percent_of(10, 0), 0.0);
    }

    #[test]
    fn test_percent_monotone_in_turn_input() {
        let mut prev = 0.0;
        for value in (0..=200_000).step_by(997) {
            let p = percent_of(value, 200_000);
            assert!(p >= prev, "{} < {} at {}", p, prev, value);
            prev = p;
        }
    }

    #[test]
    fn test_apply_replaces_input_and_accumulates_output() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let first = UsageSnapshot::zero(200_000).apply(&turn(5000, 3000, 150), 200_000, now);
        let second = first.apply(&turn(2000, 128_000, 300), 200_000, now);

        assert_eq!(
            second,
            UsageSnapshot {
                turn_input: 130_000,
                turn_output: 300,
                total_output: 450,
                limit: 200_000,
                percent: 65.0,
                updated_at: Some(now),
                turns: 2,
                model: None,
                last_message_id: None,
            }
        );
        assert_eq!(second.level(), AdvisoryLevel::Warning);
    }

    #[test]
    fn test_model_carries_over_when_turn_omits_it() {
        let now = Utc::now();
        let mut with_model = turn(1, 0, 1);
        with_model.model = Some("claude-opus-4".to_string());
        let snap = UsageSnapshot::zero(100).apply(&with_model, 100, now);
        let snap = snap.apply(&turn(2, 0, 1), 100, now);
        assert_eq!(snap.model.as_deref(), Some("claude-opus-4"));
    }

    #[test]
    fn test_age_and_staleness() {
        let written = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 2, 0).unwrap();
        let snap = UsageSnapshot {
            updated_at: Some(written),
            ..UsageSnapshot::zero(200_000)
        };

        assert_eq!(snap.age(now), Some(Duration::from_secs(120)));
        assert!(snap.is_stale(now, Duration::from_secs(60)));
        assert!(!snap.is_stale(now, Duration::from_secs(300)));

        let never = UsageSnapshot::zero(200_000);
        assert_eq!(never.age(now), None);
        assert!(never.is_stale(now, Duration::from_secs(300)));
    }

    #[test]
    fn test_reads_minimal_legacy_file() {
        let json = r#"{"turn_input":10,"turn_output":1,"total_output":5,"limit":100,"percent":10.0}"#;
        let snap: UsageSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.turns, 0);
        assert_eq!(snap.updated_at, None);
        assert_eq!(snap.level(), AdvisoryLevel::Ok);
    }
}
