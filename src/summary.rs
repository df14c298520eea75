//! `stagelat summary` — show the latest statistics from a CSV trail.
//!
//! Reads the last row of a trail written by `stagelat listen` and prints a
//! static table. Use this to inspect a finished or running capture without
//! attaching to its console.

use anyhow::{bail, Context, Result};
use stage_ingest::stats::parse_csv_row;
use stage_ingest::{AggregateFields, Series, StageStatistics};
use std::path::Path;

use crate::color;

/// Latest row of a trail, with the number of data rows it holds.
pub struct TrailSummary {
    pub rows: usize,
    pub latest: Vec<(Series, Option<AggregateFields>)>,
}

pub fn read(path: &Path) -> Result<Option<TrailSummary>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read trail: {}", path.display()))?;
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());

    let header = lines.next().unwrap_or_default();
    if format!("{}\n", header) != StageStatistics::csv_header() {
        bail!("{} is not a stagelat trail (unexpected header)", path.display());
    }

    let rows: Vec<&str> = lines.collect();
    let Some(last) = rows.last() else {
        return Ok(None);
    };
    let latest = parse_csv_row(last)
        .map_err(|e| anyhow::anyhow!("{}: last row unreadable: {}", path.display(), e))?;
    Ok(Some(TrailSummary { rows: rows.len(), latest }))
}

pub fn run(path: &Path) -> Result<()> {
    let Some(summary) = read(path)? else {
        eprintln!("Trail {} has no rows yet — no records processed.", path.display());
        return Ok(());
    };

    let width = 72;
    println!("{}", color::bold(&"=".repeat(width)));
    println!(
        "{}",
        color::bold_cyan(&format!("{:^width$}", format!(" STAGELAT TRAIL  {} rows ", summary.rows)))
    );
    println!("{}", color::bold(&"=".repeat(width)));
    println!(
        "{}",
        color::bold(&format!(
            "{:<30}  {:>8}  {:>8}  {:>8}  {:>8}",
            "SERIES", "LAST ms", "AVG ms", "MIN ms", "MAX ms"
        ))
    );
    println!("{}", color::dim(&"-".repeat(width)));
    for (series, fields) in &summary.latest {
        match fields {
            Some(f) => println!(
                "{:<30}  {:>8.0}  {:>8.1}  {:>8.0}  {:>8.0}",
                series.label(),
                f.last,
                f.avg,
                f.min,
                f.max
            ),
            None => println!(
                "{:<30}  {:>8}  {:>8}  {:>8}  {:>8}",
                series.label(),
                "—",
                "—",
                "—",
                "—"
            ),
        }
    }
    println!("{}", color::dim(&"-".repeat(width)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_last_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trail.log");
        let mut stats = StageStatistics::new();
        stats.get_mut(Series::B).add(100.0);
        let first = stats.csv_row();
        stats.get_mut(Series::B).add(300.0);
        let second = stats.csv_row();
        std::fs::write(&path, format!("{}{}{}", StageStatistics::csv_header(), first, second)).unwrap();

        let summary = read(&path).unwrap().unwrap();
        assert_eq!(summary.rows, 2);
        let b = summary.latest[0].1.unwrap();
        assert_eq!(b.last, 300.0);
        assert_eq!(b.avg, 200.0);
        assert_eq!(b.max, 300.0);
        assert_eq!(summary.latest[4], (Series::E2e, None));
    }

    #[test]
    fn test_header_only_trail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trail.log");
        std::fs::write(&path, StageStatistics::csv_header()).unwrap();
        assert!(read(&path).unwrap().is_none());
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.csv");
        std::fs::write(&path, "a,b,c\n1,2,3\n").unwrap();
        assert!(read(&path).is_err());
    }
}
