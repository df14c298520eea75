//! Live console report, one block per processed record.

use stage_ingest::{LiveReport, RecordError, Reporter, RollingAggregate, Series, Stage};

use crate::color;

const LEGEND: &str =
    "origin --A--> ingest hub --B--> trigger --> handler --C-auth-D--> twin store --E--> outbound hub ----> stagelat";

/// Prints the per-record block to stdout and dropped records to stderr.
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn processed(&mut self, r: &LiveReport<'_>) {
        println!();
        println!("{}", color::dim(&"-".repeat(41)));
        println!("Received: {}", r.record.raw);
        for skipped in &r.record.skipped {
            println!("{}", color::yellow(&format!("  skipped field: {}", skipped)));
        }
        println!();
        println!("{}", color::dim(LEGEND));
        println!();

        let origin = r
            .record
            .timestamps
            .get(Stage::A)
            .map(|t| t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
            .unwrap_or_else(|| "unknown".into());
        println!("A - Origin enqueued time:       {}", origin);
        for series in [Series::B, Series::C, Series::D, Series::E] {
            println!("{}", stat_line(series, r.stats.get(series)));
        }
        println!();
        println!("{}", stat_line(Series::E2e, r.stats.get(Series::E2e)));
        println!();

        let rate = r
            .rate
            .map(|v| format!("{:.3}", v))
            .unwrap_or_else(|| "n/a".into());
        println!("rate:               {} [event/s]", rate);
        println!();
        println!("Time elapsed:       {} [ms]", r.elapsed.as_millis());
        println!("Events counter:     {}", r.processed);
        if r.dropped > 0 {
            println!("Dropped records:    {}", color::red(&r.dropped.to_string()));
        }
    }

    fn dropped(&mut self, raw: &str, error: &RecordError) {
        eprintln!("{} {}", color::red("error on:"), raw);
        eprintln!("  {}", error);
    }
}

fn stat_line(series: Series, agg: &RollingAggregate) -> String {
    let label = format!("{}:", series.label());
    let short = agg.short();
    let value = match agg.last() {
        Some(last) if last < 0.0 => color::red(&short),
        _ => short,
    };
    format!("{:<32}{}", label, value)
}
