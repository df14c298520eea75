//! The long-running read loop.
//!
//! [`IngestionLoop`] owns the run's [`StageStatistics`] and trail. It pulls
//! messages from an [`EventSource`], splits each into newline-delimited
//! records and pushes every record through parse → correlate → report →
//! persist before reading the next message. A bad record is dropped on its
//! own; it never stops the loop or disturbs statistics already gathered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::correlator::{LatencyCorrelator, LatencySample};
use crate::error::{RecordError, SourceError};
use crate::record::{ParsedRecord, RecordParser, Stage};
use crate::sink::TrailWriter;
use crate::source::{EventMessage, EventSource};
use crate::stats::StageStatistics;

/// Default upper bound on how long one poll blocks before the cancel token
/// is checked again.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared shutdown flag. Clones observe the same signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// Everything the live report shows for one processed record.
pub struct LiveReport<'a> {
    pub record: &'a ParsedRecord,
    pub sample: &'a LatencySample,
    pub stats: &'a StageStatistics,
    /// Cumulative events/s since the first record, if any time has passed.
    pub rate: Option<f64>,
    pub elapsed: Duration,
    pub processed: u64,
    pub dropped: u64,
}

/// Receives per-record outcomes for display.
pub trait Reporter: Send {
    fn processed(&mut self, report: &LiveReport<'_>);
    fn dropped(&mut self, raw: &str, error: &RecordError);
}

/// Reporter that shows nothing; tracing still logs dropped records.
#[derive(Debug, Default)]
pub struct QuietReporter;

impl Reporter for QuietReporter {
    fn processed(&mut self, _report: &LiveReport<'_>) {}
    fn dropped(&mut self, _raw: &str, _error: &RecordError) {}
}

// ---------------------------------------------------------------------------
// IngestionLoop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Listening,
    Parsing,
    Correlating,
    Reporting,
    Cancelled,
    Closed,
}

/// Why [`IngestionLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The cancel token was signalled.
    Cancelled,
    /// The source reached end of stream.
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub exit: LoopExit,
    pub processed: u64,
    pub dropped: u64,
    pub persist_failures: u64,
    pub elapsed: Duration,
}

pub struct IngestionLoop {
    source: Box<dyn EventSource>,
    trail: Box<dyn TrailWriter>,
    reporter: Box<dyn Reporter>,
    cancel: CancelToken,
    poll_interval: Duration,
    parser: RecordParser,
    correlator: LatencyCorrelator,
    stats: StageStatistics,
    state: LoopState,
    dropped: u64,
    persist_failures: u64,
}

impl IngestionLoop {
    pub fn new(
        source: Box<dyn EventSource>,
        trail: Box<dyn TrailWriter>,
        reporter: Box<dyn Reporter>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            source,
            trail,
            reporter,
            cancel,
            poll_interval: DEFAULT_POLL_INTERVAL,
            parser: RecordParser::new(),
            correlator: LatencyCorrelator::new(),
            stats: StageStatistics::new(),
            state: LoopState::Idle,
            dropped: 0,
            persist_failures: 0,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> &StageStatistics {
        &self.stats
    }

    pub fn processed(&self) -> u64 {
        self.correlator.throughput().processed()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            debug!("ingest: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Read until cancelled or the source closes. Only a source I/O failure
    /// ends the loop with an error.
    pub fn run(&mut self) -> Result<RunSummary, SourceError> {
        info!("ingest: listening on {}", self.source.describe());
        self.transition(LoopState::Listening);

        let exit = loop {
            if self.cancel.is_cancelled() {
                self.transition(LoopState::Cancelled);
                break LoopExit::Cancelled;
            }
            match self.source.poll(self.poll_interval) {
                Ok(Some(msg)) => self.handle_message(msg),
                Ok(None) => {}
                Err(SourceError::Closed) => {
                    self.transition(LoopState::Closed);
                    break LoopExit::Closed;
                }
                Err(e) => {
                    warn!(
                        "ingest: source failed after {} processed / {} dropped: {}",
                        self.processed(),
                        self.dropped,
                        e
                    );
                    return Err(e);
                }
            }
        };

        let summary = RunSummary {
            exit,
            processed: self.processed(),
            dropped: self.dropped,
            persist_failures: self.persist_failures,
            elapsed: self.correlator.throughput().elapsed(Instant::now()),
        };
        info!(
            "ingest: stopped ({:?}) — {} processed, {} dropped, {} trail failures",
            summary.exit, summary.processed, summary.dropped, summary.persist_failures
        );
        Ok(summary)
    }

    /// Process every record in one message. Runs to completion regardless of
    /// cancellation.
    pub fn handle_message(&mut self, msg: EventMessage) {
        let text = String::from_utf8_lossy(&msg.body);
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            self.handle_record(line, msg.enqueued_at);
        }
        self.transition(LoopState::Listening);
    }

    fn handle_record(&mut self, line: &str, enqueued_at: Option<DateTime<Utc>>) {
        let now = Instant::now();
        self.correlator.observe_arrival(now);

        self.transition(LoopState::Parsing);
        let mut record = match self.parser.parse(line) {
            Ok(r) => r,
            Err(e) => {
                self.dropped += 1;
                warn!("ingest: dropping record ({}): {}", e, line);
                self.reporter.dropped(line, &e);
                return;
            }
        };
        // A producer-supplied terminal stamp wins over the transport's.
        if let Some(at) = enqueued_at.filter(|_| !record.timestamps.is_known(Stage::E)) {
            record.timestamps.set(Stage::E, at);
        }

        self.transition(LoopState::Correlating);
        let sample = self.correlator.correlate(&record.timestamps, &mut self.stats);

        self.transition(LoopState::Reporting);
        let throughput = self.correlator.throughput();
        let report = LiveReport {
            record: &record,
            sample: &sample,
            stats: &self.stats,
            rate: throughput.rate(now),
            elapsed: throughput.elapsed(now),
            processed: throughput.processed(),
            dropped: self.dropped,
        };
        self.reporter.processed(&report);

        if let Err(e) = self.trail.append_row(&self.stats.csv_row()) {
            self.persist_failures += 1;
            warn!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistError;
    use crate::source::{forward_lines, ChannelSource};
    use crate::stats::Series;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct MemTrail(Arc<Mutex<Vec<String>>>);

    impl TrailWriter for MemTrail {
        fn append_row(&mut self, row: &str) -> Result<(), PersistError> {
            self.0.lock().unwrap().push(row.to_string());
            Ok(())
        }
        fn location(&self) -> String {
            "memory".into()
        }
    }

    struct FailingTrail;

    impl TrailWriter for FailingTrail {
        fn append_row(&mut self, _row: &str) -> Result<(), PersistError> {
            Err(PersistError {
                path: "/dev/full".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            })
        }
        fn location(&self) -> String {
            "nowhere".into()
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        processed: Arc<Mutex<Vec<u64>>>,
        dropped: Arc<Mutex<Vec<String>>>,
    }

    impl Reporter for Recorder {
        fn processed(&mut self, report: &LiveReport<'_>) {
            self.processed.lock().unwrap().push(report.processed);
        }
        fn dropped(&mut self, raw: &str, _error: &RecordError) {
            self.dropped.lock().unwrap().push(raw.to_string());
        }
    }

    const GOOD: &str = r#"{"patch":[{"op":"add","path":"/TimeA","value":"2024-05-01T10:00:00.000Z"},{"op":"add","path":"/TimeB","value":"2024-05-01T10:00:00.100Z"}]}"#;

    fn make_loop(source: ChannelSource, trail: MemTrail, rec: Recorder) -> IngestionLoop {
        IngestionLoop::new(Box::new(source), Box::new(trail), Box::new(rec), CancelToken::new())
            .with_poll_interval(Duration::from_millis(10))
    }

    #[test]
    fn test_batch_with_bad_line_keeps_the_rest() {
        let (_tx, source) = ChannelSource::pair("t", 4);
        let trail = MemTrail::default();
        let rec = Recorder::default();
        let mut ingest = make_loop(source, trail.clone(), rec.clone());

        let body = format!("{}\r\n{{broken\n\n{}\n", GOOD, GOOD);
        ingest.handle_message(EventMessage::new(body, None));

        assert_eq!(ingest.processed(), 2);
        assert_eq!(ingest.dropped(), 1);
        assert_eq!(ingest.stats().get(Series::B).count(), 2);
        assert_eq!(trail.0.lock().unwrap().len(), 2);
        assert_eq!(*rec.processed.lock().unwrap(), vec![1, 2]);
        assert_eq!(*rec.dropped.lock().unwrap(), vec!["{broken".to_string()]);
        assert_eq!(ingest.state(), LoopState::Listening);
    }

    #[test]
    fn test_enqueue_time_supplies_terminal_stage() {
        let (_tx, source) = ChannelSource::pair("t", 4);
        let mut ingest = make_loop(source, MemTrail::default(), Recorder::default());
        let enq = DateTime::parse_from_rfc3339("2024-05-01T10:00:00.500Z")
            .unwrap()
            .with_timezone(&Utc);
        ingest.handle_message(EventMessage::new(GOOD, Some(enq)));
        assert_eq!(ingest.stats().get(Series::E2e).last(), Some(500.0));
        assert_eq!(ingest.stats().get(Series::E).count(), 0);
    }

    #[test]
    fn test_patch_terminal_stamp_beats_enqueue_time() {
        let (_tx, source) = ChannelSource::pair("t", 4);
        let mut ingest = make_loop(source, MemTrail::default(), Recorder::default());
        let line = r#"{"patch":[{"op":"add","path":"/TimeA","value":"2024-05-01T10:00:00.000Z"},{"op":"add","path":"/TimeE","value":"2024-05-01T10:00:00.300Z"}]}"#;
        let read_at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00.530Z")
            .unwrap()
            .with_timezone(&Utc);
        ingest.handle_message(EventMessage::new(line, Some(read_at)));
        assert_eq!(ingest.stats().get(Series::E2e).last(), Some(300.0));
    }

    #[test]
    fn test_cancel_before_any_message() {
        let (_tx, source) = ChannelSource::pair("t", 4);
        let rec = Recorder::default();
        let cancel = CancelToken::new();
        let mut ingest = IngestionLoop::new(
            Box::new(source),
            Box::new(MemTrail::default()),
            Box::new(rec.clone()),
            cancel.clone(),
        );
        cancel.cancel();
        let summary = ingest.run().unwrap();
        assert_eq!(summary.exit, LoopExit::Cancelled);
        assert_eq!(summary.processed, 0);
        assert_eq!(ingest.state(), LoopState::Cancelled);
        assert!(rec.processed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_closed_source_ends_run() {
        let (tx, source) = ChannelSource::pair("t", 4);
        tx.send(Ok(EventMessage::new(GOOD, None))).unwrap();
        drop(tx);
        let mut ingest = make_loop(source, MemTrail::default(), Recorder::default());
        let summary = ingest.run().unwrap();
        assert_eq!(summary.exit, LoopExit::Closed);
        assert_eq!(summary.processed, 1);
        assert_eq!(ingest.state(), LoopState::Closed);
    }

    #[test]
    fn test_source_error_propagates() {
        let (tx, source) = ChannelSource::pair("t", 4);
        tx.send(Err(SourceError::Io {
            origin: "test".into(),
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"),
        }))
        .unwrap();
        let mut ingest = make_loop(source, MemTrail::default(), Recorder::default());
        assert!(matches!(ingest.run(), Err(SourceError::Io { .. })));
    }

    #[test]
    fn test_non_utf8_line_is_dropped_not_fatal() {
        let (tx, source) = ChannelSource::pair("t", 8);
        let mut input = Vec::new();
        input.extend_from_slice(GOOD.as_bytes());
        input.extend_from_slice(b"\n\xff\xfe bad bytes\n");
        input.extend_from_slice(GOOD.as_bytes());
        input.push(b'\n');
        forward_lines(input.as_slice(), "stdin", &tx);
        drop(tx);

        let rec = Recorder::default();
        let mut ingest = make_loop(source, MemTrail::default(), rec.clone());
        let summary = ingest.run().unwrap();
        assert_eq!(summary.exit, LoopExit::Closed);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.dropped, 1);
        assert_eq!(rec.dropped.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_persist_failure_does_not_stop_stats() {
        let (tx, source) = ChannelSource::pair("t", 4);
        tx.send(Ok(EventMessage::new(format!("{}\n{}", GOOD, GOOD), None)))
            .unwrap();
        drop(tx);
        let mut ingest = IngestionLoop::new(
            Box::new(source),
            Box::new(FailingTrail),
            Box::new(QuietReporter),
            CancelToken::new(),
        );
        let summary = ingest.run().unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.persist_failures, 2);
        assert_eq!(ingest.stats().get(Series::B).count(), 2);
    }
}
