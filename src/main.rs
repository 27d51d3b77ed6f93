//! Framelimits CLI
//!
//! Thin host around the bounds engine: loads configuration, opens the
//! historian, and drives the poll loop.

use clap::{Parser, Subcommand};
use framelimits::{
    config::Config, BoundsEngine, ChangeReactor, EngineSettings, MemoryHistorian, VERSION,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "framelimits")]
#[command(version = VERSION)]
#[command(about = "Statistical control limits for event-window sensor data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the poll loop and keep bounds current
    Run {
        /// Historian snapshot file (overrides the configured path)
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Poll period in seconds (overrides the configured period)
        #[arg(long)]
        poll_period: Option<u64>,
    },

    /// Run one full recomputation and exit
    Once {
        /// Historian snapshot file (overrides the configured path)
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Show current configuration state
    Status,

    /// Show configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            snapshot,
            poll_period,
        } => cmd_run(snapshot, poll_period),
        Commands::Once { snapshot } => cmd_once(snapshot),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Load and validate configuration, or exit.
fn load_config() -> Config {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        eprintln!("Edit {:?} and try again.", Config::config_path());
        std::process::exit(1);
    }
    config
}

/// Open the snapshot-backed historian, or exit.
fn open_historian(config: &Config, snapshot: Option<PathBuf>) -> MemoryHistorian {
    let path = match snapshot.or_else(|| config.snapshot_path.clone()) {
        Some(path) => path,
        None => {
            eprintln!("Error: no historian snapshot configured (set snapshot_path or pass --snapshot)");
            std::process::exit(1);
        }
    };
    match MemoryHistorian::from_snapshot_file(&path) {
        Ok(historian) => historian,
        Err(e) => {
            eprintln!("Error opening historian snapshot: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_run(snapshot: Option<PathBuf>, poll_period: Option<u64>) {
    init_tracing();
    println!("Framelimits v{VERSION}");
    println!();

    let mut config = load_config();
    if let Some(secs) = poll_period {
        config.poll_period_secs = secs;
    }

    let historian = open_historian(&config, snapshot);
    let engine = BoundsEngine::new(historian, EngineSettings::from_config(&config));
    let mut reactor = ChangeReactor::new(engine);

    println!("  Sensor: {}", config.sensor_path);
    for output in &config.outputs {
        println!("  Output: {} ({})", output.path, output.formula);
    }
    println!("  Template: {}", config.template);
    println!("  Sample interval: {}s", config.sample_interval_secs);
    println!("  Poll period: {}s", config.poll_period_secs);
    println!();

    // Initial pass; unresolvable attributes are fatal before the loop starts.
    if let Err(e) = reactor.start() {
        eprintln!("Error during initial run: {e}");
        std::process::exit(1);
    }
    println!(
        "Initial run complete: {} slices",
        reactor.engine().slice_statistics().len()
    );
    println!("Press Ctrl+C to stop");
    println!();

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .expect("Error setting Ctrl+C handler");

    if let Err(e) = reactor.run(&shutdown_rx, config.poll_period()) {
        eprintln!("Poll loop aborted: {e}");
        std::process::exit(1);
    }

    println!();
    println!("Stopped.");
}

fn cmd_once(snapshot: Option<PathBuf>) {
    init_tracing();
    let config = load_config();
    let historian = open_historian(&config, snapshot);
    let mut engine = BoundsEngine::new(historian, EngineSettings::from_config(&config));

    if let Err(e) = engine.initial_run() {
        eprintln!("Error during recomputation: {e}");
        std::process::exit(1);
    }

    println!("Slices: {}", engine.slice_statistics().len());
    for (attribute, series) in engine.output_series() {
        match (series.first(), series.last()) {
            (Some(first), Some(last)) => println!(
                "  {attribute}: {} values, {:.4} .. {:.4}",
                series.len(),
                first.0,
                last.0
            ),
            _ => println!("  {attribute}: empty"),
        }
    }
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Framelimits Status");
    println!("==================");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!(
        "Config valid: {}",
        match config.validate() {
            Ok(()) => "yes".to_string(),
            Err(e) => format!("no ({e})"),
        }
    );
    println!();
    println!("Sensor: {}", config.sensor_path);
    println!("Template: {}", config.template);
    println!("Outputs:");
    for output in &config.outputs {
        println!("  {} ({})", output.path, output.formula);
    }
    match &config.snapshot_path {
        Some(path) => println!(
            "Snapshot: {:?} ({})",
            path,
            if path.exists() { "found" } else { "missing" }
        ),
        None => println!("Snapshot: not configured"),
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}
