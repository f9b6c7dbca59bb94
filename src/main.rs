use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use census::commands;
use census::config::Settings;
use census::observer::{LogObserver, ProgressBarObserver, ScanObserver};
use census::telemetry::{init_tracing, TelemetryConfig};
use census::{Address, Result};

/// Reports written as log lines per progress update when the bar is off.
const LOG_OBSERVER_INTERVAL: u64 = 50;

#[derive(Parser)]
#[command(name = "census", version, about = "Exports addresses and agents from chain state")]
struct Cli {
    /// Log progress lines instead of drawing a progress bar
    #[arg(long, global = true)]
    no_progress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Exports data from a generic account
    Account {
        #[command(subcommand)]
        command: AccountCommand,
    },
    /// Exports data from the legacy account
    Legacy {
        #[command(subcommand)]
        command: LegacyCommand,
    },
    /// Exports derived data from input data
    Derive {
        #[command(subcommand)]
        command: DeriveCommand,
    },
}

#[derive(Subcommand)]
enum AccountCommand {
    /// Exports all addresses from given account. This is done by iterating
    /// through all data stored, so it may take a very long time.
    ExportAddresses {
        /// Path of the chain storage to use.
        #[arg(short = 'p', long)]
        store_path: String,
        /// The account address to traverse.
        #[arg(short = 'a', long)]
        account_address: String,
        /// Path of the output file.
        #[arg(short = 'o', long)]
        output_path: PathBuf,
    },
}

#[derive(Subcommand)]
enum LegacyCommand {
    /// Exports all agent addresses from the legacy account. Every stored value
    /// is checked for the shape of an agent, so this may take a very long time.
    ExportAgents {
        /// Path of the chain storage to use.
        #[arg(short = 'p', long)]
        store_path: String,
        /// Path of the output file.
        #[arg(short = 'o', long)]
        output_path: PathBuf,
        /// Stop once this fraction of the keyspace has been passed (0.0 to 1.0)
        #[arg(long, conflicts_with = "no_early_stop", value_parser = parse_fraction)]
        early_stop: Option<f64>,
        /// Scan the whole legacy account
        #[arg(long)]
        no_early_stop: bool,
    },
}

#[derive(Subcommand)]
enum DeriveCommand {
    /// Exports all possible avatar addresses from given agent addresses.
    /// Derived addresses may or may not be in use.
    AgentToAvatarAddresses {
        /// Path of the input file containing agent addresses.
        #[arg(short = 'i', long)]
        input_path: PathBuf,
        /// Path of the output file.
        #[arg(short = 'o', long)]
        output_path: PathBuf,
    },
}

fn parse_fraction(s: &str) -> std::result::Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{} is not a fraction between 0.0 and 1.0", s))
    }
}

/// Log lines land on stderr unless a log file is configured.
fn logs_to_console(settings: &Settings) -> bool {
    settings.log_file.is_none()
}

fn observer(no_progress: bool) -> Box<dyn ScanObserver> {
    if no_progress {
        Box::new(LogObserver::new(LOG_OBSERVER_INTERVAL))
    } else {
        Box::new(ProgressBarObserver::new())
    }
}

fn run(cli: Cli, settings: &Settings) -> Result<()> {
    let mut observer = observer(cli.no_progress);

    match cli.command {
        Command::Account {
            command: AccountCommand::ExportAddresses { store_path, account_address, output_path },
        } => {
            let account: Address = account_address.parse()?;
            commands::export_addresses(&store_path, &account, &output_path, settings, observer.as_mut())?;
        }
        Command::Legacy {
            command: LegacyCommand::ExportAgents { store_path, output_path, early_stop, no_early_stop },
        } => {
            let early_stop = if no_early_stop {
                None
            } else {
                early_stop.or_else(|| settings.legacy_early_stop())
            };
            commands::export_agents(&store_path, &output_path, early_stop, settings, observer.as_mut())?;
        }
        Command::Derive {
            command: DeriveCommand::AgentToAvatarAddresses { input_path, output_path },
        } => {
            commands::agent_to_avatar_addresses(&input_path, &output_path, observer.as_mut())?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = match init_tracing(TelemetryConfig::from(&settings)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli, &settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "census failed");
            if !logs_to_console(&settings) {
                eprintln!("error: {}", e);
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_short_flags() {
        let cli = Cli::try_parse_from([
            "census", "account", "export-addresses", "-p", "rocksdb+file:///data", "-a",
            "1000000000000000000000000000000000000000", "-o", "out.txt",
        ])
        .unwrap();
        match cli.command {
            Command::Account { command: AccountCommand::ExportAddresses { store_path, output_path, .. } } => {
                assert_eq!(store_path, "rocksdb+file:///data");
                assert_eq!(output_path, PathBuf::from("out.txt"));
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_early_stop_flags_conflict() {
        let result = Cli::try_parse_from([
            "census", "legacy", "export-agents", "-p", "/data", "-o", "out.txt",
            "--early-stop", "0.1", "--no-early-stop",
        ]);
        assert!(result.is_err());
    }

    fn parse_early_stop(value: &str) -> std::result::Result<Option<f64>, clap::Error> {
        let cli = Cli::try_parse_from([
            "census", "legacy", "export-agents", "-p", "/data", "-o", "out.txt", "--early-stop", value,
        ])?;
        match cli.command {
            Command::Legacy { command: LegacyCommand::ExportAgents { early_stop, .. } } => Ok(early_stop),
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_early_stop_accepts_fractions() {
        assert_eq!(parse_early_stop("0.04").unwrap(), Some(0.04));
        assert_eq!(parse_early_stop("0").unwrap(), Some(0.0));
        assert_eq!(parse_early_stop("1").unwrap(), Some(1.0));
    }

    #[test]
    fn test_early_stop_rejects_out_of_range() {
        for value in ["-1", "-0.01", "1.5", "5", "NaN", "inf", "abc"] {
            assert!(parse_early_stop(value).is_err(), "{} accepted", value);
        }
    }

    #[test]
    fn test_errors_echoed_only_when_logging_to_file() {
        assert!(logs_to_console(&Settings::default()));
        let settings = Settings { log_file: Some("/var/log/census.log".to_string()), ..Settings::default() };
        assert!(!logs_to_console(&settings));
    }

    #[test]
    fn test_derive_flags() {
        let cli = Cli::try_parse_from([
            "census", "--no-progress", "derive", "agent-to-avatar-addresses", "-i", "agents.txt", "-o",
            "avatars.txt",
        ])
        .unwrap();
        assert!(cli.no_progress);
    }
}
