//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;

/// Backfill procurement contract exports month by month.
///
/// Every calendar month touching the range is downloaded whole; months over
/// the portal's row cap are split into weeks, and weeks into days.
#[derive(Parser, Debug)]
#[command(name = "contracts-backfill")]
#[command(author, version, about)]
pub struct Args {
    /// First day of the backfill (YYYY-MM-DD)
    pub global_start_date: NaiveDate,

    /// Last day of the backfill (YYYY-MM-DD)
    pub global_end_date: NaiveDate,

    /// Seconds to wait between months (0-86400)
    #[arg(short = 'd', long, value_parser = clap::value_parser!(u64).range(0..=86_400))]
    pub delay: Option<u64>,

    /// Retries after a timed-out export (0-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub retries: Option<u32>,

    /// Seconds to wait between retries of one export (0-600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=600))]
    pub retry_delay: Option<u64>,

    /// Rows per export above which the export is treated as truncated
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub row_limit: Option<u64>,

    /// Seconds before a single export is considered timed out (1-3600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub export_timeout: Option<u64>,

    /// Program that performs one export: <program> <start> <end> <output path>
    #[arg(short = 'e', long)]
    pub export_command: Option<PathBuf>,

    /// Extra argument passed to the export program before the dates (repeatable)
    #[arg(long = "export-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub export_args: Vec<String>,

    /// Directory exported CSV files are saved to
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Ledger file used to resume interrupted backfills
    #[arg(long)]
    pub ledger: Option<PathBuf>,

    /// Config file (default: $XDG_CONFIG_HOME/contracts-backfill/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        let mut argv = vec!["contracts-backfill", "2023-01-05", "2023-03-10"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv)
    }

    #[test]
    fn test_cli_positional_dates_parse() {
        let args = parse(&[]).unwrap();
        assert_eq!(
            args.global_start_date,
            NaiveDate::from_ymd_opt(2023, 1, 5).unwrap()
        );
        assert_eq!(
            args.global_end_date,
            NaiveDate::from_ymd_opt(2023, 3, 10).unwrap()
        );
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.delay.is_none());
        assert!(args.retries.is_none());
    }

    #[test]
    fn test_cli_missing_end_date_rejected() {
        let result = Args::try_parse_from(["contracts-backfill", "2023-01-05"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_malformed_date_rejected() {
        let result = Args::try_parse_from(["contracts-backfill", "05-01-2023", "2023-03-10"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_delay_and_retries() {
        let args = parse(&["--delay", "30", "--retries", "5"]).unwrap();
        assert_eq!(args.delay, Some(30));
        assert_eq!(args.retries, Some(5));
    }

    #[test]
    fn test_cli_retries_over_max_rejected() {
        let err = parse(&["--retries", "11"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_retries_zero_allowed() {
        let args = parse(&["-r", "0"]).unwrap();
        assert_eq!(args.retries, Some(0));
    }

    #[test]
    fn test_cli_row_limit_zero_rejected() {
        let err = parse(&["--row-limit", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        assert_eq!(parse(&["-v"]).unwrap().verbose, 1);
        assert_eq!(parse(&["-vv"]).unwrap().verbose, 2);
    }

    #[test]
    fn test_cli_paths() {
        let args = parse(&[
            "-e",
            "./export.sh",
            "-o",
            "out",
            "--ledger",
            "state/ledger.json",
        ])
        .unwrap();
        assert_eq!(args.export_command, Some(PathBuf::from("./export.sh")));
        assert_eq!(args.output_dir, Some(PathBuf::from("out")));
        assert_eq!(args.ledger, Some(PathBuf::from("state/ledger.json")));
    }

    #[test]
    fn test_cli_export_args_repeat_and_allow_hyphens() {
        let args = parse(&["--export-arg", "-m", "--export-arg=etl.extract"]).unwrap();
        assert_eq!(args.export_args, vec!["-m", "etl.extract"]);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["contracts-backfill", "--help"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
