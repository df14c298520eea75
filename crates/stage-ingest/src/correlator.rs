//! Stage-gap computation and run-level throughput.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::record::{Stage, TimestampSet};
use crate::stats::{Series, StageStatistics};

/// Gaps for one record in milliseconds. `None` where an endpoint was unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencySample {
    pub b: Option<f64>,
    pub c: Option<f64>,
    pub d: Option<f64>,
    pub e: Option<f64>,
    pub e2e: Option<f64>,
}

impl LatencySample {
    pub fn get(&self, series: Series) -> Option<f64> {
        match series {
            Series::B => self.b,
            Series::C => self.c,
            Series::D => self.d,
            Series::E => self.e,
            Series::E2e => self.e2e,
        }
    }

    /// Endpoints of each series, earlier stage first.
    pub fn endpoints(series: Series) -> (Stage, Stage) {
        match series {
            Series::B => (Stage::A, Stage::B),
            Series::C => (Stage::B, Stage::C),
            Series::D => (Stage::C, Stage::D),
            Series::E => (Stage::D, Stage::E),
            Series::E2e => (Stage::A, Stage::E),
        }
    }

    pub fn from_timestamps(ts: &TimestampSet) -> Self {
        let gap = |series| {
            let (from, to) = Self::endpoints(series);
            Some(millis_between(ts.get(from)?, ts.get(to)?))
        };
        Self {
            b: gap(Series::B),
            c: gap(Series::C),
            d: gap(Series::D),
            e: gap(Series::E),
            e2e: gap(Series::E2e),
        }
    }
}

fn millis_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1000.0,
        None => delta.num_milliseconds() as f64,
    }
}

/// Cumulative event rate since the first record of the run. Never reset.
#[derive(Debug, Clone, Default)]
pub struct Throughput {
    started: Option<Instant>,
    processed: u64,
}

impl Throughput {
    /// Start the clock on the first call; later calls are no-ops.
    pub fn start(&mut self, now: Instant) {
        self.started.get_or_insert(now);
    }

    pub fn record(&mut self) {
        self.processed += 1;
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.started
            .map(|s| now.saturating_duration_since(s))
            .unwrap_or_default()
    }

    /// Events per second, or `None` before any time has passed.
    pub fn rate(&self, now: Instant) -> Option<f64> {
        let secs = self.elapsed(now).as_secs_f64();
        (secs > 0.0).then(|| self.processed as f64 / secs)
    }
}

/// Turns timestamp sets into latency samples and feeds them into
/// [`StageStatistics`].
#[derive(Debug, Clone, Default)]
pub struct LatencyCorrelator {
    throughput: Throughput,
}

impl LatencyCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a record's arrival so the throughput clock starts with the first
    /// record seen, dropped or not.
    pub fn observe_arrival(&mut self, now: Instant) {
        self.throughput.start(now);
    }

    /// Compute the gaps for `ts`, update every series whose endpoints are both
    /// known, and count the record as processed. Negative gaps are kept.
    pub fn correlate(&mut self, ts: &TimestampSet, stats: &mut StageStatistics) -> LatencySample {
        let sample = LatencySample::from_timestamps(ts);
        for series in Series::ALL {
            if let Some(ms) = sample.get(series) {
                if ms < 0.0 {
                    debug!("negative {} gap {:.3}ms (clock skew or reordering)", series, ms);
                }
                stats.get_mut(series).add(ms);
            }
        }
        self.throughput.record();
        sample
    }

    pub fn throughput(&self) -> &Throughput {
        &self.throughput
    }
}
