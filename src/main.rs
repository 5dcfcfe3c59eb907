use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process::ExitCode;

use sandbox_harness::neo4j::{backup_restore_scenario, ensure_enterprise, BackupRestoreCase};
use sandbox_harness::{logging, HarnessConfig, HarnessError, ScenarioDirs, ScenarioReport};

#[derive(Parser)]
#[command(name = "sandbox-harness")]
#[command(about = "Run multi-phase integration scenarios against sandboxed Neo4j servers.")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up a populated database, write more, restore, and verify
    BackupRestore {
        /// Run sandboxes as the invoking user instead of the image default
        #[arg(long)]
        non_root: bool,
        /// Server password, or `none` to disable authentication
        #[arg(long, default_value = "none")]
        password: String,
    },
    /// Run all four user/auth combinations of backup-restore
    Matrix,
    /// Show the effective configuration
    Config,
}

fn run_case(config: &HarnessConfig, case: &BackupRestoreCase) -> Result<ScenarioReport, HarnessError> {
    ensure_enterprise(config)?;
    let dirs = ScenarioDirs::create(
        "backupRestore-",
        config.scenario.temp_root.as_deref(),
        config.scenario.keep_dirs,
    )?;
    backup_restore_scenario(config, case, dirs).run()
}

// Phase errors already render their cause and the sandbox's log tail.
fn print_error(err: &HarnessError) {
    eprintln!("{} {}", "Error:".red().bold(), err);
}

fn print_outcome(case: &BackupRestoreCase, outcome: &Result<ScenarioReport, HarnessError>) {
    match outcome {
        Ok(report) => {
            println!("{} {}", "PASS".green().bold(), case.name());
            println!("{}", report.to_string().dimmed());
        }
        Err(err) => {
            println!("{} {}", "FAIL".red().bold(), case.name());
            print_error(err);
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let (config, warnings) = HarnessConfig::load();
    let level = if cli.verbose { "debug" } else { config.logging.level.as_str() };
    logging::init(level);
    for warning in &warnings {
        tracing::warn!("{}", warning);
    }

    match cli.command {
        Commands::BackupRestore { non_root, password } => {
            let case = BackupRestoreCase::new(!non_root, &password);
            let outcome = run_case(&config, &case);
            print_outcome(&case, &outcome);
            if outcome.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Commands::Matrix => {
            if let Err(e) = ensure_enterprise(&config) {
                print_error(&e);
                return ExitCode::FAILURE;
            }
            let mut failed = 0;
            let cases = BackupRestoreCase::matrix();
            for case in &cases {
                let outcome = run_case(&config, case);
                print_outcome(case, &outcome);
                if outcome.is_err() {
                    failed += 1;
                }
            }
            println!();
            println!(
                "{} passed, {} failed",
                (cases.len() - failed).to_string().green(),
                failed.to_string().red()
            );
            if failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Commands::Config => {
            println!("{}", "Current configuration:".bold());
            println!();
            match config.to_toml() {
                Ok(s) => {
                    println!("{}", s);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Error serializing config: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}
