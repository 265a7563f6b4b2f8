use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use walvault::cli::{handle_command, Commands};
use walvault::codec::ArtifactCodec;
use walvault::config::{Settings, VaultPaths};
use walvault::crypto::SecureString;
use walvault::engine::PostgresEngine;
use walvault::offsite::ScpTransport;
use walvault::orchestrator::Orchestrator;
use walvault::storage::write_json_atomic;
use walvault::VaultError;

#[derive(Parser)]
#[command(
    name = "walvault",
    author = "Kaylee Beyene",
    version,
    about = "Backup and point-in-time recovery for write-ahead-logged databases",
    long_about = "walvault captures snapshots of a database cluster, archives its \
                  write-ahead log segments, and stages restores that the engine \
                  replays up to any moment covered by the archive."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to <home>/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store home directory
    #[arg(long, global = true, env = "WALVAULT_HOME")]
    home: Option<PathBuf>,

    /// Prompt for the artifact password instead of reading it from settings
    #[arg(long, global = true)]
    ask_password: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "walvault=debug" } else { "walvault=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<VaultError>()
                .map(VaultError::exit_code)
                .unwrap_or(1);
            error!(exit_code = code, "{:#}", e);
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let paths = VaultPaths::resolve(cli.home)?;
    let settings_path = cli.config.unwrap_or_else(|| paths.settings_file());
    let settings = Settings::load_or_default(&settings_path)?;

    match cli.command {
        Commands::Init => return init(&paths, &settings_path, &settings),
        Commands::Config => {
            show_config(&paths, &settings_path, &settings);
            return Ok(());
        }
        _ => {}
    }

    settings.validate()?;

    let codec = if cli.command.needs_codec() {
        build_codec(&settings, cli.ask_password)?
    } else {
        ArtifactCodec::plain()
    };

    let engine = PostgresEngine::new(&settings.source);
    let mut orchestrator = Orchestrator::new(paths, settings.clone(), codec, Box::new(engine));
    if matches!(cli.command, Commands::Remote) && settings.offsite.enabled {
        orchestrator = orchestrator.with_transport(Box::new(ScpTransport::new(&settings.offsite)?));
    }

    handle_command(&orchestrator, cli.command)?;
    Ok(())
}

fn build_codec(settings: &Settings, ask_password: bool) -> Result<ArtifactCodec> {
    let password = if ask_password {
        let entered = rpassword::prompt_password("Artifact password: ")
            .context("Failed to read password")?;
        Some(SecureString::from(entered))
    } else {
        settings.codec.resolve_password()?
    };

    Ok(ArtifactCodec::new(&settings.codec, password)?)
}

fn init(paths: &VaultPaths, settings_path: &Path, settings: &Settings) -> Result<()> {
    println!("Initializing walvault store at: {}", paths.base_dir().display());
    paths.ensure_directories()?;

    if settings_path.exists() {
        println!("Settings already exist at {}", settings_path.display());
    } else {
        write_json_atomic(settings_path, settings)?;
        println!("Default settings written to {}", settings_path.display());
    }

    println!("Initialization complete!");
    println!();
    println!("Edit the settings to point at your cluster, then run:");
    println!("  walvault status   # check connectivity");
    println!("  walvault base     # first base snapshot");
    println!("  walvault wal      # archive closed log segments");
    Ok(())
}

fn show_config(paths: &VaultPaths, settings_path: &Path, settings: &Settings) {
    println!("walvault Configuration");
    println!("======================");
    println!("Store home:     {}", paths.base_dir().display());
    println!("Settings file:  {}", settings_path.display());
    println!("Operation log:  {}", paths.operation_log().display());
    println!();
    println!("Settings:");
    println!(
        "  Source:             {}@{}:{}/{}",
        settings.source.user, settings.source.host, settings.source.port, settings.source.database
    );
    println!("  Log directory:      {}", settings.source.wal_dir.display());
    println!("  Snapshot format:    {}", settings.snapshot_format);
    println!("  Encoding:           {}", settings.codec.chain());
    println!(
        "  Retention (days):   full {}, incremental {}, offsite {}",
        settings.retention.full_days, settings.retention.incremental_days, settings.retention.offsite_days
    );
    println!("  Sweep after run:    {}", settings.sweep_after_run);
    println!(
        "  Offsite:            {}",
        if settings.offsite.enabled {
            format!("{}@{}:{}", settings.offsite.user, settings.offsite.host, settings.offsite.path)
        } else {
            "disabled".to_string()
        }
    );
}
