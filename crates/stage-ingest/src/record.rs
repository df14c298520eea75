//! Decoding of one raw record into stage timestamps.
//!
//! A record is a JSON document carrying a `patch` list of `{op, path, value}`
//! operations. Paths `/TimeA`..`/TimeE` map onto [`Stage`]; anything else is
//! ignored so producers can add fields without breaking the consumer.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::error::{FieldSkipped, RecordError};

/// A point in the processing chain where a timestamp is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Origin enqueue (device message accepted by the ingestion hub).
    A,
    /// Trigger fired.
    B,
    /// Handler entry point.
    C,
    /// Handler after authentication.
    D,
    /// Terminal enqueue (message accepted by the outbound hub).
    E,
}

impl Stage {
    pub const ALL: [Stage; 5] = [Stage::A, Stage::B, Stage::C, Stage::D, Stage::E];

    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "/TimeA" => Some(Stage::A),
            "/TimeB" => Some(Stage::B),
            "/TimeC" => Some(Stage::C),
            "/TimeD" => Some(Stage::D),
            "/TimeE" => Some(Stage::E),
            _ => None,
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Stage::A => "/TimeA",
            Stage::B => "/TimeB",
            Stage::C => "/TimeC",
            Stage::D => "/TimeD",
            Stage::E => "/TimeE",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::A => "A",
            Stage::B => "B",
            Stage::C => "C",
            Stage::D => "D",
            Stage::E => "E",
        };
        f.write_str(name)
    }
}

/// Timestamps found in one record, keyed by stage. Missing stages are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimestampSet {
    stamps: [Option<DateTime<Utc>>; 5],
}

impl TimestampSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stage: Stage) -> Option<DateTime<Utc>> {
        self.stamps[stage.index()]
    }

    pub fn set(&mut self, stage: Stage, at: DateTime<Utc>) {
        self.stamps[stage.index()] = Some(at);
    }

    pub fn is_known(&self, stage: Stage) -> bool {
        self.get(stage).is_some()
    }

    /// Stages that have a timestamp, in chain order.
    pub fn known(&self) -> impl Iterator<Item = (Stage, DateTime<Utc>)> + '_ {
        Stage::ALL
            .into_iter()
            .filter_map(move |s| self.get(s).map(|t| (s, t)))
    }
}

/// Result of decoding one line.
#[derive(Debug, Clone)]
pub struct ParsedRecord {
    pub timestamps: TimestampSet,
    /// Recognised fields whose value could not be read as a timestamp.
    pub skipped: Vec<FieldSkipped>,
    /// The original line, kept for diagnostics.
    pub raw: String,
}

#[derive(Deserialize)]
struct PatchDocument {
    patch: Option<Value>,
}

#[derive(Deserialize)]
struct PatchOp {
    path: Option<String>,
    #[serde(default)]
    value: Value,
}

/// Decodes raw lines into [`ParsedRecord`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordParser;

impl RecordParser {
    pub fn new() -> Self {
        Self
    }

    /// Decode `line`. Fails only when the document itself or its `patch`
    /// array cannot be read; a bad value on one field is reported in
    /// [`ParsedRecord::skipped`] instead.
    pub fn parse(&self, line: &str) -> Result<ParsedRecord, RecordError> {
        let doc: Value = serde_json::from_str(line).map_err(RecordError::NotJson)?;
        let doc: PatchDocument = match doc {
            Value::Object(_) => {
                serde_json::from_value(doc).map_err(|_| RecordError::MissingPatch)?
            }
            _ => return Err(RecordError::MissingPatch),
        };
        let entries = match doc.patch {
            Some(Value::Array(entries)) => entries,
            _ => return Err(RecordError::MissingPatch),
        };

        let mut timestamps = TimestampSet::new();
        let mut skipped = Vec::new();

        for entry in entries {
            // Non-object entries and entries without a path carry nothing we read.
            let Ok(op) = serde_json::from_value::<PatchOp>(entry) else {
                continue;
            };
            let Some(stage) = op.path.as_deref().and_then(Stage::from_path) else {
                continue;
            };
            match parse_timestamp(&op.value) {
                Some(at) => timestamps.set(stage, at),
                None => {
                    let field = FieldSkipped {
                        stage,
                        value: op.value.to_string(),
                    };
                    info!("{}", field);
                    skipped.push(field);
                }
            }
        }

        Ok(ParsedRecord {
            timestamps,
            skipped,
            raw: line.to_string(),
        })
    }
}

/// Read a JSON value as a UTC timestamp.
///
/// Accepts RFC 3339 (with `Z` or an offset) and offset-less ISO-8601, which is
/// taken to be UTC.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}
