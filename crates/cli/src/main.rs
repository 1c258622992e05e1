//! mergeorder command-line tool.
//!
//! Given the branches waiting to land on a base branch, estimates how hard
//! each merge will be and which order keeps conflict resolution cheapest.
//! Also generates and validates configuration files.

mod render;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use mergeorder_core::config::{AppConfig, Strategy, DEFAULT_CONFIG_TEMPLATE};
use mergeorder_core::search::run_search;
use mergeorder_core::vcs::GitCli;

const LOCAL_CONFIG: &str = "mergeorder.toml";

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Find the merge order with the least conflict resolution.
#[derive(Parser, Debug)]
#[command(
    name = "mergeorder",
    version,
    about = "Estimate merge difficulty and find the cheapest merge order",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Path to the TOML configuration file (default: ./mergeorder.toml, then
    /// the user config directory).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level filter (overrides the config file).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(flatten)]
    plan: PlanArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Args, Debug)]
struct PlanArgs {
    /// Branches to order, as named on the remote.
    branches: Vec<String>,

    /// Search strategy: exhaustive or independent.
    #[arg(short, long)]
    strategy: Option<Strategy>,

    /// Base branch the candidates merge into.
    #[arg(short, long)]
    base: Option<String>,

    /// Remote holding the base and candidate branches.
    #[arg(long)]
    remote: Option<String>,

    /// Path to the repository checkout.
    #[arg(long)]
    repo: Option<PathBuf>,

    /// Do not fetch the remote before resolving branches.
    #[arg(long)]
    no_fetch: bool,

    /// Run the exhaustive search past the branch-count cap.
    #[arg(long)]
    force: bool,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = LOCAL_CONFIG)]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("Error: {:#}", e)));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Init { output }) => {
            init_logging(cli.log_level.as_deref(), None);
            cmd_init(&output)
        }
        Some(Commands::Validate) => {
            init_logging(cli.log_level.as_deref(), None);
            cmd_validate(cli.config.as_deref())
        }
        None => {
            let config = load_config(cli.config.as_deref(), &cli.plan)?;
            init_logging(cli.log_level.as_deref(), Some(config.log_level.as_str()));
            cmd_plan(&config, &cli.plan).await
        }
    }
}

fn init_logging(flag: Option<&str>, configured: Option<&str>) {
    let level = flag.or(configured).unwrap_or("warn");
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

/// The explicit path, else `./mergeorder.toml`, else the user config file.
fn locate_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("mergeorder").join("config.toml"))
        .filter(|path| path.exists())
}

fn load_config(explicit: Option<&Path>, args: &PlanArgs) -> Result<AppConfig> {
    let mut config = match locate_config(explicit) {
        Some(path) => AppConfig::load_from_file(&path)
            .with_context(|| format!("failed to load configuration file {}", path.display()))?,
        None => AppConfig::default(),
    };
    apply_overrides(&mut config, args);
    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Command-line flags win over file values.
fn apply_overrides(config: &mut AppConfig, args: &PlanArgs) {
    if let Some(strategy) = args.strategy {
        config.search.strategy = strategy;
    }
    if let Some(base) = &args.base {
        config.repo.base_branch = base.clone();
    }
    if let Some(remote) = &args.remote {
        config.repo.remote = remote.clone();
    }
    if let Some(repo) = &args.repo {
        config.repo.path = repo.clone();
    }
    if args.no_fetch {
        config.repo.fetch = false;
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

async fn cmd_plan(config: &AppConfig, args: &PlanArgs) -> Result<()> {
    if args.branches.is_empty() {
        anyhow::bail!("no branches given; pass the branch names to order");
    }
    info!(
        strategy = %config.search.strategy,
        base = %config.repo.base_branch,
        branches = args.branches.len(),
        "planning merge order"
    );

    let gateway = GitCli::from_config(&config.repo);
    let report = run_search(&gateway, config, &args.branches, args.force)
        .await
        .context("merge order search failed")?;
    debug!(generated_at = %report.generated_at, "report ready");

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        println!("{json}");
    } else {
        render::print_report(&report);
    }
    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, DEFAULT_CONFIG_TEMPLATE).context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!(
            "Default configuration written to {}",
            output.display()
        ))
    );
    println!();
    println!("Next steps:");
    println!("  1. Adjust the base branch, remote and scoring weights");
    println!(
        "  2. To use the advisory oracle, set [advisory] enabled = true and export its API key"
    );
    println!("  3. Validate with: mergeorder validate --config {}", output.display());
    println!("  4. Plan: mergeorder --config {} <branch>...", output.display());

    Ok(())
}

fn cmd_validate(explicit: Option<&Path>) -> Result<()> {
    let Some(config_path) = locate_config(explicit) else {
        anyhow::bail!("no configuration file found; create one with `mergeorder init`");
    };
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(&config_path).context("failed to parse configuration")?;
    println!("  {}", style::success("TOML structure is valid"));

    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    println!("  {}", style::success("Environment variable references processed"));

    if let Err(e) = config.validate() {
        println!("  {}", style::error(&format!("Validation error: {e}")));
        anyhow::bail!("configuration validation failed");
    }
    println!("  {}", style::success("All values are valid"));

    println!();
    println!("Configuration summary:");
    println!("  Repository    : {}", config.repo.path.display());
    println!("  Base          : {}/{}", config.repo.remote, config.repo.base_branch);
    println!("  Strategy      : {}", config.search.strategy);
    println!("  Branch cap    : {}", config.search.max_exhaustive_branches);
    println!("  Resolution    : {}", config.search.resolution);
    if config.advisory.enabled {
        println!(
            "  Blend         : {} structural / {} advisory",
            config.blend.structural_weight, config.blend.advisory_weight
        );
        println!(
            "  Advisory key  : {}",
            if config.advisory.api_key.is_some() {
                "set".to_string()
            } else {
                style::warn(&format!("NOT SET (${})", config.advisory.api_key_env))
            }
        );
    } else {
        println!("  Blend         : structural only (advisory disabled)");
    }

    Ok(())
}
