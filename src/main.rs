//! stagelat — stage-by-stage pipeline latency tracker.
//!
//! Consumes events that carry one timestamp per processing stage, keeps
//! rolling per-stage and end-to-end latency statistics, and writes them to a
//! per-run CSV trail. Run `stagelat --help` for usage.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod color;
mod config;
mod listen;
mod report;
mod summary;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            print!("{}", toml::to_string_pretty(&config::ListenConfig::default())?);
        }
        Commands::Listen { source, credential, output_dir, quiet } => {
            listen::run(
                &cli.config,
                listen::ListenArgs { source, credential, output_dir, quiet },
            )?;
        }
        Commands::Summary { trail } => {
            summary::run(&trail)?;
        }
    }

    Ok(())
}
