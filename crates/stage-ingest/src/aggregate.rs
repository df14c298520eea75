//! Rolling last/avg/min/max accumulator for one latency series.

use tracing::warn;

/// Accumulates last/avg/min/max/count over an unbounded stream of samples
/// without retaining them.
///
/// `min` starts at `+∞` and `max` at `−∞` so the first sample always replaces
/// both. Once `count >= 1`, `min <= last <= max` holds. Readers return `None`
/// until the first sample arrives; nothing here ever divides by zero.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingAggregate {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl Default for RollingAggregate {
    fn default() -> Self {
        Self::new()
    }
}

impl RollingAggregate {
    pub const fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            last: 0.0,
        }
    }

    /// Drop all history.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Record one sample. Non-finite values are rejected: an `∞` in min/max
    /// would poison every later comparison.
    pub fn add(&mut self, value: f64) -> bool {
        if !value.is_finite() {
            warn!("rejecting non-finite latency sample {}", value);
            return false;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        true
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn average(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.sum / self.count as f64)
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    pub fn last(&self) -> Option<f64> {
        (self.count > 0).then_some(self.last)
    }

    /// One-line summary: `last (avg:A, min:m/max:M)`, or `n/a` when empty.
    pub fn short(&self) -> String {
        match self.average() {
            Some(avg) => format!(
                "{:.0} (avg:{:.1}, min:{:.0}/max:{:.0})",
                self.last, avg, self.min, self.max
            ),
            None => "n/a".into(),
        }
    }

    /// CSV field group `last,avg,min,max`. Empty fields until the first sample.
    pub fn csv_fields(&self) -> String {
        match self.average() {
            Some(avg) => format!("{:.0},{:.1},{:.0},{:.0}", self.last, avg, self.min, self.max),
            None => ",,,".into(),
        }
    }

    /// CSV header group for `prefix`.
    pub fn csv_header(prefix: &str) -> String {
        format!("{p}-last,{p}-avg,{p}-min,{p}-max", p = prefix)
    }
}

/// Values read back from one rendered CSV field group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateFields {
    pub last: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// Parse the four fields written by [`RollingAggregate::csv_fields`].
///
/// Returns `Ok(None)` for the empty group of an aggregate that had no samples.
pub fn parse_csv_fields(fields: &[&str]) -> Result<Option<AggregateFields>, String> {
    if fields.len() != 4 {
        return Err(format!("expected 4 fields, got {}", fields.len()));
    }
    if fields.iter().all(|f| f.trim().is_empty()) {
        return Ok(None);
    }
    let mut vals = [0.0f64; 4];
    for (slot, raw) in vals.iter_mut().zip(fields) {
        *slot = raw
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("bad number '{}': {}", raw, e))?;
    }
    Ok(Some(AggregateFields {
        last: vals[0],
        avg: vals[1],
        min: vals[2],
        max: vals[3],
    }))
}
