// src/main.rs
//! Aurora package manager - CLI entry point

use anyhow::Result;
use aurora::{EngineConfig, TransactionEngine, TransactionPlan};
use clap::{Parser, Subcommand};
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aurora")]
#[command(version)]
#[command(about = "Transactional package manager for the Aurora distribution", long_about = None)]
struct Cli {
    /// Target root directory (for bootstrap or staged installs)
    #[arg(long, global = true, default_value = "/", value_name = "DIR")]
    bootstrap: PathBuf,

    /// Bypass dependency and conflict checks
    #[arg(long, global = true)]
    force: bool,

    /// Bypass checksum and signature verification
    #[arg(long, global = true)]
    skip_crypto: bool,

    /// Answer yes to all confirmation prompts
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize repository indexes into the local database
    Sync,

    /// Install packages from the configured repositories
    Install {
        /// Package names to install
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Install package archives from the local filesystem
    InstallLocal {
        /// Paths to package archives
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Remove installed packages
    Remove {
        /// Package names to remove
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Upgrade every installed package with a newer repository version
    Update,
}

/// Print what a plan would do
fn print_summary(plan: &TransactionPlan) {
    if !plan.to_remove.is_empty() {
        println!("\nPackages to remove:");
        for pkg in &plan.to_remove {
            println!("  - {} {}", pkg.name(), pkg.version());
        }
    }
    if !plan.to_install.is_empty() {
        println!("\nPackages to install:");
        for item in &plan.to_install {
            println!("  - {} {}", item.package.name, item.package.version);
        }
    }
    println!();
}

/// Ask for confirmation when attached to a terminal. Non-interactive runs
/// (and --yes) proceed without asking.
fn confirm(question: &str, assume_yes: bool) -> bool {
    if assume_yes || !std::io::stdin().is_terminal() {
        return true;
    }

    print!(":: {question} [Y/n] ");
    let _ = std::io::stdout().flush();

    let mut response = String::new();
    if std::io::stdin().lock().read_line(&mut response).is_err() {
        return false;
    }
    let response = response.trim();
    response.is_empty() || response.starts_with('y') || response.starts_with('Y')
}

fn run(cli: Cli) -> Result<()> {
    let config = EngineConfig::new(cli.bootstrap).with_skip_crypto(cli.skip_crypto);
    let mut engine = TransactionEngine::new(config)?;

    match cli.command {
        Commands::Sync => engine.sync()?,
        Commands::Install { names } => {
            let plan = engine.plan_install(&names, cli.force)?;
            if plan.is_empty() {
                println!("Nothing to do.");
                return Ok(());
            }
            print_summary(&plan);
            if !confirm("Proceed with installation?", cli.yes) {
                println!("Installation aborted.");
                return Ok(());
            }
            engine.prepare_assets(&plan)?;
            engine.execute(&plan)?;
        }
        Commands::InstallLocal { files } => {
            for file in &files {
                let absolute = std::path::absolute(file)?;
                engine.install_local(&absolute, cli.force)?;
            }
        }
        Commands::Remove { names } => {
            let plan = engine.plan_remove(&names, cli.force)?;
            if plan.is_empty() {
                println!("Nothing to do.");
                return Ok(());
            }
            print_summary(&plan);
            if !confirm("Proceed with removal?", cli.yes) {
                println!("Removal aborted.");
                return Ok(());
            }
            engine.execute(&plan)?;
        }
        Commands::Update => {
            let plan = engine.plan_update(cli.force)?;
            if plan.is_empty() {
                println!("System is already up to date.");
                return Ok(());
            }
            print_summary(&plan);
            if !confirm("Proceed with update?", cli.yes) {
                println!("Update aborted.");
                return Ok(());
            }
            engine.prepare_assets(&plan)?;
            engine.execute(&plan)?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
