use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gitea_mirror::{Config, MirrorEngine, Scheduler};

#[derive(Parser)]
#[command(name = "gitea-mirror")]
#[command(about = "Mirror GitHub repositories into a Gitea instance")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (defaults to XDG config location, then environment)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror repositories on a schedule (the default)
    Run {
        /// Log intended changes without touching Gitea
        #[arg(long)]
        dry_run: bool,

        /// Exit after the first run
        #[arg(long)]
        single_run: bool,
    },

    /// Perform exactly one mirror run
    Sync {
        /// Log intended changes without touching Gitea
        #[arg(long)]
        dry_run: bool,
    },

    /// List repositories that would be mirrored
    List,

    /// Show the applied configuration with credentials redacted
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;
    info!("Starting gitea-mirror v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::resolve(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        None => cmd_run(config, false, false).await,
        Some(Commands::Run {
            dry_run,
            single_run,
        }) => cmd_run(config, dry_run, single_run).await,
        Some(Commands::Sync { dry_run }) => cmd_sync(config, dry_run).await,
        Some(Commands::List) => cmd_list(config).await,
        Some(Commands::Config) => cmd_config(&config),
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    Ok(())
}

/// Run the scheduler until shutdown, or once with `--single-run`
async fn cmd_run(mut config: Config, dry_run: bool, single_run: bool) -> Result<()> {
    config.dry_run |= dry_run;
    config.schedule.single_run |= single_run;
    info!("Applied configuration:\n{}", config.redacted());

    let engine = MirrorEngine::from_config(config)?;
    let mut scheduler = Scheduler::new(engine);
    scheduler.run().await?;

    Ok(())
}

/// Perform a single mirror run
async fn cmd_sync(mut config: Config, dry_run: bool) -> Result<()> {
    config.dry_run |= dry_run;
    info!("Applied configuration:\n{}", config.redacted());

    let engine = MirrorEngine::from_config(config)?;
    let summary = engine.run_once().await?;

    println!("\n🎉 Mirroring complete");
    println!("   📊 Repositories found: {}", summary.found);
    println!("   ✅ Mirrored: {}", summary.mirrored);
    println!("   ⏭️  Already mirrored: {}", summary.already_mirrored);
    println!("   ⭐ Starred: {}", summary.starred);
    if summary.dry_run_actions > 0 {
        println!("   🔍 Dry-run actions: {}", summary.dry_run_actions);
    }
    println!("   ⚠️  Warnings: {}", summary.warnings);
    println!("   ❌ Failed: {}", summary.failed);
    println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());

    if summary.failed > 0 {
        println!("\n🔍 Failed repositories:");
        for report in &summary.reports {
            if let Err(e) = &report.outcome {
                println!("   ❌ {}: {}", report.repository, e);
            }
        }
    }

    Ok(())
}

/// List repositories that would be mirrored
async fn cmd_list(config: Config) -> Result<()> {
    let engine = MirrorEngine::from_config(config)?;
    let repositories = engine.discover().await?;

    println!("Repositories ({}):", repositories.len());

    for repo in repositories {
        let mut flags = Vec::new();
        if repo.private {
            flags.push("private".to_string());
        }
        if repo.is_fork {
            flags.push("fork".to_string());
        }
        if repo.starred {
            flags.push("starred".to_string());
        }
        if let Some(org) = &repo.organization {
            flags.push(format!("org: {}", org));
        }

        if flags.is_empty() {
            println!("  📁 {}", repo.full_name);
        } else {
            println!("  📁 {} ({})", repo.full_name, flags.join(", "));
        }
    }

    Ok(())
}

/// Print the redacted configuration
fn cmd_config(config: &Config) -> Result<()> {
    println!("{}", config.redacted());
    Ok(())
}
