//! Error taxonomy for the ingestion engine.
//!
//! Only configuration and source failures can end a run. Record, field and
//! persistence errors are local to one record and never escalate.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::record::Stage;

/// Connection parameters are missing or unusable. Raised before any I/O.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("event source identifier is empty")]
    MissingSource,
    #[error("connection credential is empty")]
    MissingCredential,
    #[error("connection string has no Endpoint=… entry")]
    MissingEndpoint,
    #[error("malformed connection string segment '{0}' (expected Key=Value)")]
    BadSegment(String),
    #[error("unsupported endpoint '{0}' (expected stdin: or file://<path>)")]
    UnsupportedEndpoint(String),
}

/// A whole record could not be decoded and was dropped.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record is not valid JSON: {0}")]
    NotJson(#[source] serde_json::Error),
    #[error("record has no `patch` array")]
    MissingPatch,
}

/// A recognised timestamp field carried a value that is not a timestamp.
/// The stage stays unknown for this record; the record is still processed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("stage {stage}: unparsable timestamp {value}")]
pub struct FieldSkipped {
    pub stage: Stage,
    pub value: String,
}

/// Failure reading from the event source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source reached end of stream. Not a failure of the run.
    #[error("event source closed")]
    Closed,
    #[error("event source I/O error on {origin}: {source}")]
    Io {
        origin: String,
        #[source]
        source: io::Error,
    },
}

/// The durable trail could not be written.
#[derive(Debug, Error)]
#[error("failed to write trail {}: {source}", .path.display())]
pub struct PersistError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}
