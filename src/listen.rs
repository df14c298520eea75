//! `stagelat listen` — the consumer.
//!
//! Validates connection parameters before touching anything, creates the
//! run's CSV trail, then drives the ingestion loop until Ctrl-C or end of
//! stream.

use anyhow::{Context, Result};
use chrono::Local;
use stage_ingest::{
    CancelToken, CsvTrail, Endpoint, IngestionLoop, LoopExit, QuietReporter, Reporter, TrailWriter,
};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;

use crate::color;
use crate::config::ListenConfig;
use crate::report::ConsoleReporter;

static SHUTDOWN: OnceLock<CancelToken> = OnceLock::new();

extern "C" fn handle_sigint(_: libc::c_int) {
    if let Some(token) = SHUTDOWN.get() {
        token.cancel();
    }
}

pub struct ListenArgs {
    pub source: String,
    pub credential: String,
    pub output_dir: Option<PathBuf>,
    pub quiet: bool,
}

pub fn run(config_path: &Path, args: ListenArgs) -> Result<()> {
    // No I/O before the connection parameters check out.
    let endpoint = Endpoint::parse(&args.source, &args.credential)
        .context("invalid event source configuration (set --eh-name/EH_NAME and --eh-conn-string/EH_CONN_STRING)")?;
    let config = ListenConfig::load(config_path)?;
    info!(
        "config: output_dir={} poll={}ms retries={}",
        config.output_dir.display(),
        config.poll_interval_ms,
        config.persist_retries
    );

    let output_dir = args.output_dir.unwrap_or_else(|| config.output_dir.clone());
    let trail = CsvTrail::create(
        &output_dir,
        Local::now(),
        &config.file_suffix,
        config.persist_retries,
    )?;

    let source = endpoint
        .open()
        .with_context(|| format!("failed to open event source '{}'", endpoint.source))?;

    let cancel = SHUTDOWN.get_or_init(CancelToken::new).clone();
    unsafe { libc::signal(libc::SIGINT, handle_sigint as *const () as libc::sighandler_t) };

    eprintln!(
        "{} listening on '{}', trail {}",
        color::bold_cyan("stagelat"),
        endpoint.source,
        trail.location()
    );
    eprintln!("Only new events are read. Press Ctrl-C to stop.");

    let reporter: Box<dyn Reporter> = if args.quiet || config.quiet {
        Box::new(QuietReporter)
    } else {
        Box::new(ConsoleReporter)
    };

    let mut ingest = IngestionLoop::new(Box::new(source), Box::new(trail), reporter, cancel)
        .with_poll_interval(config.poll_interval());
    let summary = ingest.run()?;

    if summary.exit == LoopExit::Cancelled {
        println!("\n\nExiting...");
    }
    println!();
    println!(
        "{} {} processed, {} dropped in {:.1}s",
        color::bold_green("Reader finished."),
        summary.processed,
        summary.dropped,
        summary.elapsed.as_secs_f64()
    );
    if summary.persist_failures > 0 {
        eprintln!(
            "{}",
            color::yellow(&format!("{} row(s) could not be written to the trail", summary.persist_failures))
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(source: &str, credential: &str, output_dir: &Path) -> ListenArgs {
        ListenArgs {
            source: source.into(),
            credential: credential.into(),
            output_dir: Some(output_dir.to_path_buf()),
            quiet: true,
        }
    }

    #[test]
    fn test_empty_parameters_fail_before_any_io() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("stagelat.toml");
        let trails = dir.path().join("trails");

        let err = run(&config, args("", "Endpoint=-", &trails)).unwrap_err();
        assert!(format!("{:#}", err).contains("--eh-name"));
        assert!(run(&config, args("hub", "  ", &trails)).is_err());

        assert!(!trails.exists(), "no trail directory may be created");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
