//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Track and archive serialized web novels.
///
/// Novelkeeper keeps a local database of books published on third-party
/// vendor sites, re-checks them for updates, and archives finished books
/// as plain-text files.
#[derive(Parser, Debug)]
#[command(name = "novelkeeper")]
#[command(author, version, about)]
pub struct Args {
    /// Path of the SQLite database file
    #[arg(long, global = true, default_value = "novelkeeper.db")]
    pub db: PathBuf,

    /// Site configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database file and apply migrations
    Init,

    /// Print tracking statistics for a site
    Stats {
        /// Site key the statistics are for
        #[arg(long)]
        site: String,

        /// Emit the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch one URL through the resilient client and report the outcome
    Probe {
        /// Absolute http(s) URL to fetch
        url: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_init_parses_with_defaults() {
        let args = Args::try_parse_from(["novelkeeper", "init"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert_eq!(args.db, PathBuf::from("novelkeeper.db"));
        assert!(args.config.is_none());
        assert!(matches!(args.command, Command::Init));
    }

    #[test]
    fn test_cli_requires_a_subcommand() {
        let err = Args::try_parse_from(["novelkeeper"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingSubcommand);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["novelkeeper", "-v", "init"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["novelkeeper", "init", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["novelkeeper", "-q", "init"]).unwrap();
        assert!(args.quiet);

        let args = Args::try_parse_from(["novelkeeper", "init", "--quiet"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_db_flag_accepted_before_and_after_subcommand() {
        let args = Args::try_parse_from(["novelkeeper", "--db", "/tmp/nk.db", "init"]).unwrap();
        assert_eq!(args.db, PathBuf::from("/tmp/nk.db"));

        let args = Args::try_parse_from(["novelkeeper", "init", "--db", "/tmp/nk.db"]).unwrap();
        assert_eq!(args.db, PathBuf::from("/tmp/nk.db"));
    }

    #[test]
    fn test_cli_config_flag_parses_path() {
        let args =
            Args::try_parse_from(["novelkeeper", "--config", "site.toml", "init"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("site.toml")));
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        // --help causes early exit, so we check it returns an error with Help kind
        let err = Args::try_parse_from(["novelkeeper", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Args::try_parse_from(["novelkeeper", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["novelkeeper", "init", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    // ==================== Stats Tests ====================

    #[test]
    fn test_cli_stats_requires_site() {
        let err = Args::try_parse_from(["novelkeeper", "stats"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_stats_parses_site_and_json() {
        let args =
            Args::try_parse_from(["novelkeeper", "stats", "--site", "qd", "--json"]).unwrap();
        match args.command {
            Command::Stats { site, json } => {
                assert_eq!(site, "qd");
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_stats_json_defaults_off() {
        let args = Args::try_parse_from(["novelkeeper", "stats", "--site", "qd"]).unwrap();
        assert!(matches!(args.command, Command::Stats { json: false, .. }));
    }

    // ==================== Probe Tests ====================

    #[test]
    fn test_cli_probe_requires_url() {
        let err = Args::try_parse_from(["novelkeeper", "probe"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_probe_parses_url() {
        let args =
            Args::try_parse_from(["novelkeeper", "probe", "http://vendor.example/1"]).unwrap();
        match args.command {
            Command::Probe { url } => assert_eq!(url, "http://vendor.example/1"),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
