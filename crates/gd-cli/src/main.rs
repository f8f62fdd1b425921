//! Guardian CLI
//!
//! CLI tool for compiling filter lists and managing engine state.

mod rules_file;
mod state_cmd;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gd_compiler::compile_sources;
use gd_core::types::RuleAction;
use gd_engine::fetcher::fetch_all;

use crate::rules_file::{compile_list_files, print_stats, read_rules_file, write_rules_file, RulesFile};

#[derive(Parser)]
#[command(name = "gd-cli")]
#[command(about = "Guardian filter list compiler and policy engine tools")]
struct Cli {
    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile local filter list files into host rule JSON
    Compile {
        /// Input filter list files, in priority order
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Output rules file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fetch the enabled filter lists and compile them
    Fetch {
        /// Engine config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output rules file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summarize a compiled rules file
    Info {
        /// Rules file to inspect
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Inspect or change persisted engine state
    State {
        /// State file
        #[arg(short, long, default_value = "guardian-state.json")]
        state: PathBuf,

        /// Engine config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Use local list files instead of fetching (ID=PATH, repeatable)
        #[arg(short, long = "list")]
        lists: Vec<String>,

        #[command(subcommand)]
        command: StateCommand,
    },
}

#[derive(Subcommand)]
enum StateCommand {
    /// Show the global switch, block count and overrides
    Status,
    /// Flip global filtering
    Toggle,
    /// Flip the whitelist status of a host
    Whitelist { host: String },
    /// Manage user overrides
    Override {
        #[command(subcommand)]
        command: OverrideCommand,
    },
    /// Add a user cosmetic selector
    Cosmetic { selector: String },
    /// Re-fetch the enabled lists and install the rules
    Refresh,
}

#[derive(Subcommand)]
enum OverrideCommand {
    /// Add an allow or block override for a domain
    Add { domain: String, action: String },
    /// Remove every override for a domain
    Remove { domain: String },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Compile { input, output } => cmd_compile(&input, output, cli.verbose),
        Commands::Fetch { config, output } => cmd_fetch(config, output).await,
        Commands::Info { input } => cmd_info(&input),
        Commands::State {
            state,
            config,
            lists,
            command,
        } => cmd_state(state, config, &lists, command).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_compile(inputs: &[String], output: Option<PathBuf>, verbose: bool) -> Result<(), String> {
    let (ruleset, stats, elapsed_ms) = compile_list_files(inputs, verbose)?;

    println!("Compiled {} filter lists in {:.1}ms", inputs.len(), elapsed_ms);
    print_stats(&stats);

    if let Some(path) = output {
        write_rules_file(&path, &RulesFile::from(ruleset))?;
        println!("Wrote rules to '{}'", path.display());
    }
    Ok(())
}

async fn cmd_fetch(config: Option<PathBuf>, output: Option<PathBuf>) -> Result<(), String> {
    let config = state_cmd::load_config(config.as_deref()).await?;
    let fetcher = state_cmd::build_fetcher(&config, &[])?;
    let sources: Vec<_> = config.sources.iter().filter(|s| s.enabled).cloned().collect();
    if sources.is_empty() {
        return Err("No filter lists are enabled in the config".to_string());
    }

    let start = Instant::now();
    let round = fetch_all(fetcher.as_ref(), &sources).await;
    if round.texts.is_empty() {
        return Err("No filter list could be fetched".to_string());
    }
    let (ruleset, stats) = compile_sources(round.texts.iter().map(|(id, text)| (id.as_str(), text.as_str())));

    println!(
        "Fetched {} of {} filter lists in {:.1}ms",
        round.texts.len(),
        sources.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    for (id, e) in &round.failures {
        println!("  {} failed: {}", id, e);
    }
    print_stats(&stats);

    if let Some(path) = output {
        write_rules_file(&path, &RulesFile::from(ruleset))?;
        println!("Wrote rules to '{}'", path.display());
    }
    Ok(())
}

fn cmd_info(input: &std::path::Path) -> Result<(), String> {
    let file = read_rules_file(input)?;
    let blocks = file.rules.iter().filter(|r| r.action == RuleAction::Block).count();
    let max_id = file.rules.iter().map(|r| r.id).max().unwrap_or(0);

    println!("Rules file: {}", input.display());
    println!("  Network:  {} ({} block, {} allow)", file.rules.len(), blocks, file.rules.len() - blocks);
    println!("  Max ID:   {}", max_id);
    println!("  Cosmetic: {}", file.cosmetic_rules.len());
    Ok(())
}

async fn cmd_state(
    state: PathBuf,
    config: Option<PathBuf>,
    lists: &[String],
    command: StateCommand,
) -> Result<(), String> {
    log::debug!("Using state file {}", state.display());
    let session = state_cmd::open(&state, config.as_ref(), lists).await?;

    match command {
        StateCommand::Status => session.status().await,
        StateCommand::Toggle => session.toggle().await,
        StateCommand::Whitelist { host } => session.whitelist(&host).await,
        StateCommand::Override { command } => match command {
            OverrideCommand::Add { domain, action } => session.add_override(&domain, &action).await,
            OverrideCommand::Remove { domain } => session.remove_override(&domain).await,
        },
        StateCommand::Cosmetic { selector } => session.add_cosmetic(&selector).await,
        StateCommand::Refresh => session.refresh().await,
    }
}
