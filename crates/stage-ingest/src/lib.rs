pub mod aggregate;
pub mod correlator;
pub mod error;
pub mod ingest;
pub mod record;
pub mod sink;
pub mod source;
pub mod stats;

pub use aggregate::{AggregateFields, RollingAggregate};
pub use correlator::{LatencyCorrelator, LatencySample, Throughput};
pub use error::{ConfigError, FieldSkipped, PersistError, RecordError, SourceError};
pub use ingest::{
    CancelToken, IngestionLoop, LiveReport, LoopExit, LoopState, QuietReporter, Reporter,
    RunSummary, DEFAULT_POLL_INTERVAL,
};
pub use record::{ParsedRecord, RecordParser, Stage, TimestampSet};
pub use sink::{CsvTrail, TrailWriter};
pub use source::{ChannelSource, Endpoint, EndpointKind, EventMessage, EventSource};
pub use stats::{Series, StageStatistics};
