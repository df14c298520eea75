//! Per-series rolling statistics and their CSV representation.

use std::fmt;

use crate::aggregate::{parse_csv_fields, AggregateFields, RollingAggregate};

/// One latency series: four consecutive stage gaps plus end-to-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Series {
    /// origin enqueue → trigger
    B,
    /// trigger → entry
    C,
    /// entry → post-auth
    D,
    /// post-auth → terminal enqueue
    E,
    /// origin enqueue → terminal enqueue
    E2e,
}

impl Series {
    /// CSV column order.
    pub const ALL: [Series; 5] = [Series::B, Series::C, Series::D, Series::E, Series::E2e];

    pub fn prefix(self) -> &'static str {
        match self {
            Series::B => "b",
            Series::C => "c",
            Series::D => "d",
            Series::E => "e",
            Series::E2e => "e2e",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Series::B => "B - Trigger latency",
            Series::C => "C - Entry latency",
            Series::D => "D - Post-auth latency",
            Series::E => "E - Terminal enqueue latency",
            Series::E2e => "A to E latency",
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// One [`RollingAggregate`] per [`Series`], scoped to a single run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageStatistics {
    b: RollingAggregate,
    c: RollingAggregate,
    d: RollingAggregate,
    e: RollingAggregate,
    e2e: RollingAggregate,
}

impl StageStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, series: Series) -> &RollingAggregate {
        match series {
            Series::B => &self.b,
            Series::C => &self.c,
            Series::D => &self.d,
            Series::E => &self.e,
            Series::E2e => &self.e2e,
        }
    }

    pub fn get_mut(&mut self, series: Series) -> &mut RollingAggregate {
        match series {
            Series::B => &mut self.b,
            Series::C => &mut self.c,
            Series::D => &mut self.d,
            Series::E => &mut self.e,
            Series::E2e => &mut self.e2e,
        }
    }

    pub fn reset(&mut self) {
        for s in Series::ALL {
            self.get_mut(s).reset();
        }
    }

    /// Header line, newline-terminated.
    pub fn csv_header() -> String {
        let cols: Vec<String> = Series::ALL
            .iter()
            .map(|s| RollingAggregate::csv_header(s.prefix()))
            .collect();
        format!("{}\n", cols.join(","))
    }

    /// Current values as one newline-terminated row, same column order as the header.
    pub fn csv_row(&self) -> String {
        let cols: Vec<String> = Series::ALL.iter().map(|s| self.get(*s).csv_fields()).collect();
        format!("{}\n", cols.join(","))
    }
}

/// Parse one data row of a trail back into per-series values.
pub fn parse_csv_row(line: &str) -> Result<Vec<(Series, Option<AggregateFields>)>, String> {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
    let want = Series::ALL.len() * 4;
    if fields.len() != want {
        return Err(format!("expected {} columns, got {}", want, fields.len()));
    }
    Series::ALL
        .iter()
        .zip(fields.chunks(4))
        .map(|(s, group)| parse_csv_fields(group).map(|v| (*s, v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "b-last,b-avg,b-min,b-max,c-last,c-avg,c-min,c-max,\
d-last,d-avg,d-min,d-max,e-last,e-avg,e-min,e-max,e2e-last,e2e-avg,e2e-min,e2e-max\n";

    #[test]
    fn test_header_columns() {
        assert_eq!(StageStatistics::csv_header(), HEADER);
    }

    #[test]
    fn test_row_column_count_matches_header() {
        let mut stats = StageStatistics::new();
        stats.get_mut(Series::B).add(100.0);
        stats.get_mut(Series::E2e).add(500.0);
        let row = stats.csv_row();
        assert!(row.ends_with('\n'));
        assert_eq!(row.trim_end().split(',').count(), HEADER.trim_end().split(',').count());
        assert!(row.starts_with("100,100.0,100,100,,,,"));
        assert!(row.trim_end().ends_with("500,500.0,500,500"));
    }

    #[test]
    fn test_row_parses_back() {
        let mut stats = StageStatistics::new();
        stats.get_mut(Series::C).add(50.0);
        stats.get_mut(Series::C).add(70.0);
        let parsed = parse_csv_row(&stats.csv_row()).unwrap();
        assert_eq!(parsed.len(), 5);
        assert_eq!(parsed[0], (Series::B, None));
        let c = parsed[1].1.unwrap();
        assert_eq!(c.last, 70.0);
        assert_eq!(c.avg, 60.0);
        assert_eq!(c.min, 50.0);
        assert_eq!(c.max, 70.0);
    }

    #[test]
    fn test_parse_rejects_short_row() {
        assert!(parse_csv_row("1,2,3").is_err());
    }

    #[test]
    fn test_reset_clears_every_series() {
        let mut stats = StageStatistics::new();
        for s in Series::ALL {
            stats.get_mut(s).add(1.0);
        }
        stats.reset();
        assert_eq!(stats, StageStatistics::new());
    }
}
