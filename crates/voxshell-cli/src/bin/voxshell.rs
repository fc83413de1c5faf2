//! VoxShell binary
//!
//! Speak (or type) a request, get one validated system command run for you.
//!
//! # Usage
//! ```bash
//! voxshell [--config voxshell.toml] [--intents intents.toml] [--os unix] [--dry-run] [--verbose]
//! voxshell once "建立一個叫做 test 的資料夾"
//! voxshell check "rm -rf /"
//! voxshell intents
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Instant;

use tracing_subscriber::EnvFilter;
use voxshell_cli::{reply, ConsoleSink, Session, StdinSource};
use voxshell_core::{OsFamily, ReplyLanguage, SafetyVerdict, ShellConfig};

/// VoxShell - natural-language commands with a safety gate
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (TOML or JSON)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Intent library overriding the built-in one
    #[arg(short, long, value_name = "FILE")]
    intents: Option<PathBuf>,

    /// Target OS family (unix or windows); defaults to the host
    #[arg(long)]
    os: Option<OsFamily>,

    /// Command timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Reply language (zh or en)
    #[arg(short, long)]
    language: Option<ReplyLanguage>,

    /// Show commands instead of running them
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive loop reading one utterance per line (default)
    Run,

    /// Handle a single utterance and exit
    Once {
        /// The utterance
        text: String,

        /// Print the structured outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the intent library with example utterances
    Intents,

    /// Validate a raw command line and print the verdict
    Check {
        /// Command line, e.g. "rm -rf /"
        command: String,

        /// Treat the command as destructive
        #[arg(long)]
        destructive: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let language = config.language;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let mut session = Session::from_config(&config)?;
            print_banner(&config, session.compiler().library().len());

            let summary = voxshell_cli::run(&mut session, &mut StdinSource::new(), &mut ConsoleSink, language).await?;
            tracing::info!(
                turns = summary.turns,
                executed = summary.executed,
                refused = summary.refused,
                declined = summary.declined,
                "Session closed"
            );
        }
        Commands::Once { text, json } => {
            let mut session = Session::from_config(&config)?;
            let outcome = session.handle(&text, Instant::now()).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", reply::render(&outcome, language));
            }
            if let Some(code) = outcome.exit_code().filter(|code| *code != 0) {
                std::process::exit(code.clamp(1, 255));
            }
        }
        Commands::Intents => {
            let session = Session::from_config(&config)?;
            let compiler = session.compiler();
            println!("{} ({})", "Intent library".bold(), compiler.os());
            for definition in compiler.library().definitions() {
                let marker = if definition.destructive { " [confirm]".yellow().to_string() } else { String::new() };
                println!("\n{}{}  {}", definition.id.to_string().cyan().bold(), marker, definition.description);
                for example in &definition.examples {
                    println!("   └─ {}", example);
                }
            }
        }
        Commands::Check { command, destructive } => {
            let policy = config.safety_policy().context("Invalid safety settings")?;
            match policy.validate_line(&command, destructive) {
                SafetyVerdict::Allowed => println!("{} {}", "ALLOWED".green().bold(), command),
                SafetyVerdict::AllowedDestructive => {
                    println!("{} {}", "NEEDS CONFIRMATION".yellow().bold(), command)
                }
                SafetyVerdict::Rejected(reason) => {
                    println!("{} {} ({})", "REJECTED".red().bold(), command, reason);
                    std::process::exit(2);
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<ShellConfig> {
    let mut config = match &cli.config {
        Some(path) => ShellConfig::from_file(path)?,
        None => ShellConfig::default(),
    };

    if let Some(path) = &cli.intents {
        config = config.with_intents_path(path);
    }
    if let Some(os) = cli.os {
        config = config.with_os(os);
    }
    if let Some(secs) = cli.timeout {
        config = config.with_timeout_secs(secs);
    }
    if let Some(language) = cli.language {
        config = config.with_language(language);
    }
    if cli.dry_run {
        config = config.with_dry_run(true);
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn print_banner(config: &ShellConfig, intents: usize) {
    println!();
    println!("╔═══════════════════════════════════════════════╗");
    println!("║              🎙  VOXSHELL  v{:<10}        ║", voxshell_cli::VERSION);
    println!("╚═══════════════════════════════════════════════╝");
    println!();
    println!("   ├─ OS family:    {}", config.os_family());
    println!("   ├─ Intents:      {}", intents);
    println!("   ├─ Timeout:      {}s", config.execution.timeout_secs);
    println!("   └─ Dry run:      {}", config.execution.dry_run);
    println!();
    println!("Say a request, \"確認\" to confirm, \"exit\" to quit");
    println!();
}
