//! CLI definitions for stagelat.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[clap(
    name = "stagelat",
    version,
    about = "Stage-by-stage pipeline latency tracker\n\nCorrelates the timestamps each stage stamps on an event, keeps rolling last/avg/min/max per stage and end-to-end, and writes a CSV trail.",
    long_about = None
)]
pub struct Cli {
    /// Path to stagelat.toml config file (optional; defaults apply when absent)
    #[clap(long, short, default_value = "stagelat.toml")]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Consume new events and print live per-stage latency stats (Ctrl-C to stop)
    Listen {
        /// Event source identifier (hub name)
        #[clap(short = 'n', long = "eh-name", env = "EH_NAME", default_value = "", hide_env_values = true)]
        source: String,

        /// Connection string for the event source, e.g. "Endpoint=file:///var/spool/hub.jsonl"
        #[clap(long = "eh-conn-string", env = "EH_CONN_STRING", default_value = "", hide_env_values = true)]
        credential: String,

        /// Directory for the CSV trail (overrides the config file)
        #[clap(long)]
        output_dir: Option<PathBuf>,

        /// Suppress the per-record console report
        #[clap(long, short)]
        quiet: bool,
    },

    /// Print the latest statistics recorded in a CSV trail
    Summary {
        /// Trail file written by `stagelat listen`
        trail: PathBuf,
    },

    /// Print an example stagelat.toml to stdout
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listen_source(argv: &[&str]) -> String {
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Listen { source, .. } => source,
            _ => panic!("expected listen"),
        }
    }

    #[test]
    fn test_flag_wins_over_environment() {
        // Single test touching EH_NAME so parallel tests don't race on it.
        std::env::set_var("EH_NAME", "from-env");
        assert_eq!(listen_source(&["stagelat", "listen"]), "from-env");
        assert_eq!(listen_source(&["stagelat", "listen", "--eh-name", "from-flag"]), "from-flag");
        assert_eq!(listen_source(&["stagelat", "listen", "-n", "short"]), "short");
        std::env::remove_var("EH_NAME");
        assert_eq!(listen_source(&["stagelat", "listen"]), "");
    }

    #[test]
    fn test_listen_flags() {
        let cli = Cli::try_parse_from([
            "stagelat",
            "--config",
            "alt.toml",
            "listen",
            "--eh-conn-string",
            "Endpoint=-",
            "--output-dir",
            "/tmp/trails",
            "-q",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("alt.toml"));
        match cli.command {
            Commands::Listen { credential, output_dir, quiet, .. } => {
                assert_eq!(credential, "Endpoint=-");
                assert_eq!(output_dir, Some(PathBuf::from("/tmp/trails")));
                assert!(quiet);
            }
            _ => panic!("expected listen"),
        }
    }
}
