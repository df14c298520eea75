//! Durable CSV trail of rolling statistics.
//!
//! One file per run, named after the run's start time and seeded with the
//! header line. Every processed record appends one row. Each append opens the
//! file in append mode so a row is on disk before the next record is read.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::error::PersistError;
use crate::stats::StageStatistics;

/// Default file-name suffix appended after the start timestamp.
pub const DEFAULT_SUFFIX: &str = "output.log";

// ─── Writer trait ────────────────────────────────────────────────────────────

/// Append-only line store for statistics rows.
pub trait TrailWriter: Send {
    fn append_row(&mut self, row: &str) -> Result<(), PersistError>;

    /// Location of the trail, for the startup banner.
    fn location(&self) -> String;
}

// ─── CSV trail ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct CsvTrail {
    path: PathBuf,
    retries: u32,
}

impl CsvTrail {
    /// File name for a run started at `started`: `YYYYMMDDTHHMMSS<suffix>`.
    pub fn file_name(started: DateTime<Local>, suffix: &str) -> String {
        format!("{}{}", started.format("%Y%m%dT%H%M%S"), suffix)
    }

    /// Create `<dir>/<file_name>` and write the header. Fails if the file
    /// cannot be created; a run without a trail does not start.
    pub fn create(
        dir: &Path,
        started: DateTime<Local>,
        suffix: &str,
        retries: u32,
    ) -> Result<Self, PersistError> {
        let path = dir.join(Self::file_name(started, suffix));
        let persist_err = |source: io::Error| PersistError {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(dir).map_err(persist_err)?;
        // Never reuse a name: a run started in the same second must not
        // clobber an earlier trail.
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .and_then(|mut file| file.write_all(StageStatistics::csv_header().as_bytes()))
            .map_err(persist_err)?;
        info!("trail: writing {}", path.display());
        Ok(Self { path, retries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_once(&self, row: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(row.as_bytes())
    }
}

impl TrailWriter for CsvTrail {
    /// Append `row`, retrying up to `retries` more times before giving up.
    fn append_row(&mut self, row: &str) -> Result<(), PersistError> {
        let mut attempt = 0;
        loop {
            match self.append_once(row) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.retries => {
                    warn!("trail: append to {} failed ({}), retrying", self.path.display(), e);
                    attempt += 1;
                }
                Err(source) => {
                    return Err(PersistError {
                        path: self.path.clone(),
                        source,
                    })
                }
            }
        }
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
