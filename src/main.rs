use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace};

use devbox::parallel::{categorize_commands, EngineConfig};
use devbox::provision::Provisioner;

/// Provision isolated development boxes
#[derive(Parser)]
#[command(name = "devbox")]
#[command(about = "Devbox - run setup commands in development boxes, concurrently where safe", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run setup commands inside a box
    Setup {
        /// Name of the running box
        box_name: String,

        /// File with one setup command per line ('#' starts a comment line)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Only show command output when a command fails
        #[arg(short, long)]
        quiet: bool,

        /// Setup commands, run before those read from --file
        commands: Vec<String>,
    },
    /// Print the packages installed in a box as JSON
    Packages {
        /// Name of the running box
        box_name: String,
    },
    /// Show how commands would be grouped, without running them
    Classify {
        commands: Vec<String>,
    },
    /// Print the effective engine configuration as JSON
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        2 => "trace",
        _ => "trace,tokio=debug",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 3)
        .with_line_number(cli.verbose >= 3)
        .init();

    debug!("devbox started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    let result = match cli.command {
        Commands::Setup {
            box_name,
            file,
            quiet,
            commands,
        } => run_setup(&box_name, commands, file.as_deref(), !quiet).await,
        Commands::Packages { box_name } => run_packages(&box_name).await,
        Commands::Classify { commands } => run_classify(&commands),
        Commands::Config => run_config(),
    };

    if let Err(e) = result {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run_setup(
    box_name: &str,
    mut commands: Vec<String>,
    file: Option<&Path>,
    show_output: bool,
) -> Result<()> {
    if let Some(path) = file {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read setup commands from {}", path.display()))?;
        commands.extend(parse_command_file(&contents));
    }

    if commands.is_empty() {
        info!("No setup commands to run");
        return Ok(());
    }

    let mut provisioner = Provisioner::docker(EngineConfig::load());
    let result = provisioner
        .execute_setup_commands(box_name, commands.as_slice(), show_output)
        .await;
    provisioner.monitor().log_summary();

    result.with_context(|| format!("Setup failed for box '{box_name}'"))?;
    info!("Setup completed for box '{}'", box_name);
    Ok(())
}

async fn run_packages(box_name: &str) -> Result<()> {
    let mut provisioner = Provisioner::docker(EngineConfig::load());
    let inventory = provisioner.query_packages(box_name).await;
    provisioner.monitor().log_summary();

    println!("{}", serde_json::to_string_pretty(&inventory)?);
    Ok(())
}

fn run_classify(commands: &[String]) -> Result<()> {
    for group in categorize_commands(commands) {
        let mode = if group.parallel { "parallel" } else { "sequential" };
        println!("{} ({mode})", group.name);
        for command in &group.commands {
            println!("  {command}");
        }
    }
    Ok(())
}

fn run_config() -> Result<()> {
    let config = EngineConfig::load();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// One command per line; blank lines and `#` comment lines are skipped.
fn parse_command_file(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
