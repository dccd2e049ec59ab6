//! Append-only event record sink.
//!
//! Four JSONL streams (mappings, opportunities, executions, positions),
//! each a file of one JSON document per line keyed by opaque uuid, ordered
//! by insertion. This is the whole contract the engine assumes of the
//! repository: idempotent insert by primary key, ordered reads. Anything
//! heavier (a relational store, a message bus) can substitute behind the
//! same surface.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use crate::matcher::EventMapping;
use crate::types::{Opportunity, Position, PriceCents, Qty, Venue};

/// Terminal status of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Both legs filled.
    Complete,
    /// Rejected pre-fire or both legs rejected; nothing rests anywhere.
    NotExecuted,
    /// Asymmetric or unreconcilable outcome; human action required.
    Failed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Complete => write!(f, "complete"),
            ExecutionStatus::NotExecuted => write!(f, "not_executed"),
            ExecutionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One leg of an execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegRecord {
    pub venue: Venue,
    pub price_cents: PriceCents,
    pub qty: Qty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// filled | rejected | transport_error | synthesized
    pub outcome: String,
}

/// Durable record of one execution attempt; exactly one is written per
/// attempt regardless of outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub ts: DateTime<Utc>,
    pub mapping_id: String,
    pub opportunity_id: String,
    pub status: ExecutionStatus,
    pub is_dry_run: bool,
    pub buy: LegRecord,
    pub sell: LegRecord,
    pub realized_pnl_cents: i64,
    pub fees_cents: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub elapsed_ms: u64,
}

pub struct RecordSink {
    dir: PathBuf,
    /// Serializes appends so stream order matches call order.
    write_lock: Mutex<()>,
}

impl RecordSink {
    pub fn new(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn append<T: Serialize>(&self, stream: &str, record: &T) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                warn!("record serialize failed for {}: {}", stream, e);
                return;
            }
        };
        let path = self.dir.join(format!("{}.jsonl", stream));
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| writeln!(f, "{}", line));
        if let Err(e) = result {
            // The sink must never take down a trading path; surface and
            // move on. Snapshot durability is the state store's job.
            warn!("record append to {} failed: {}", path.display(), e);
        }
    }

    fn read_all<T: DeserializeOwned>(&self, stream: &str) -> Vec<T> {
        let path = self.dir.join(format!("{}.jsonl", stream));
        let Ok(file) = std::fs::File::open(&path) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(&line) {
                Ok(v) => out.push(v),
                Err(e) => warn!("skipping bad {} record at line {}: {}", stream, idx + 1, e),
            }
        }
        out
    }

    pub fn record_mapping(&self, mapping: &EventMapping) {
        self.append("event_mappings", mapping);
    }

    pub fn record_opportunity(&self, opportunity: &Opportunity) {
        self.append("opportunities", opportunity);
    }

    pub fn record_execution(&self, execution: &ExecutionRecord) {
        self.append("executions", execution);
    }

    pub fn record_position(&self, position: &Position) {
        self.append("positions", position);
    }

    /// Replay the mapping stream for index hydration. Later lines win on id
    /// collision downstream.
    pub fn load_mappings(&self) -> Vec<EventMapping> {
        self.read_all("event_mappings")
    }

    /// Replay the execution stream (operator forensics, tests).
    pub fn load_executions(&self) -> Vec<ExecutionRecord> {
        self.read_all("executions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::MatchMethod;

    fn sink() -> (RecordSink, PathBuf) {
        let dir = std::env::temp_dir()
            .join("cross_venue_arb_records_tests")
            .join(uuid::Uuid::new_v4().to_string());
        (RecordSink::new(&dir).unwrap(), dir)
    }

    fn mapping(id: &str) -> EventMapping {
        let now = Utc::now();
        EventMapping {
            id: id.to_string(),
            v1_contract: "v1-c".into(),
            v2_contract: "v2-c".into(),
            description: "rec test".into(),
            confidence: 1.0,
            method: MatchMethod::Manual,
            resolution_time: now,
            outcome_alignment: "yes_yes".into(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_mapping_round_trip_preserves_order() {
        let (sink, dir) = sink();
        sink.record_mapping(&mapping("m-1"));
        sink.record_mapping(&mapping("m-2"));
        sink.record_mapping(&mapping("m-3"));

        let loaded = sink.load_mappings();
        let ids: Vec<&str> = loaded.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m-1", "m-2", "m-3"]);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_bad_lines_skipped() {
        let (sink, dir) = sink();
        sink.record_mapping(&mapping("m-1"));
        // Corrupt the stream by hand.
        let path = dir.join("event_mappings.jsonl");
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "not json at all").unwrap();
        drop(f);
        sink.record_mapping(&mapping("m-2"));

        let loaded = sink.load_mappings();
        assert_eq!(loaded.len(), 2);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_execution_record_round_trip() {
        let (sink, dir) = sink();
        let record = ExecutionRecord {
            id: "e-1".into(),
            ts: Utc::now(),
            mapping_id: "m-1".into(),
            opportunity_id: "o-1".into(),
            status: ExecutionStatus::Failed,
            is_dry_run: false,
            buy: LegRecord {
                venue: Venue::V1,
                price_cents: 42,
                qty: 100,
                order_id: Some("ord-1".into()),
                outcome: "filled".into(),
            },
            sell: LegRecord {
                venue: Venue::V2,
                price_cents: 50,
                qty: 100,
                order_id: None,
                outcome: "rejected".into(),
            },
            realized_pnl_cents: 0,
            fees_cents: 0,
            failure: Some("asymmetric_execution".into()),
            elapsed_ms: 120,
        };
        sink.record_execution(&record);

        let loaded = sink.load_executions();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status, ExecutionStatus::Failed);
        assert_eq!(loaded[0].failure.as_deref(), Some("asymmetric_execution"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_stream_is_empty() {
        let (sink, dir) = sink();
        assert!(sink.load_executions().is_empty());
        let _ = std::fs::remove_dir_all(dir);
    }
}
