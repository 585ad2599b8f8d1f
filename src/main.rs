use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use popsentry::config::Config;
use popsentry::detect::{report, AnomalyEngine, DetectError, DetectionWindow};
use popsentry::month::Month;
use popsentry::storage;

#[derive(Parser)]
#[command(
    name = "popsentry",
    about = "Anomaly detection for monthly popularity counters",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the counter database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect anomalies for a target month (exit code 1 = minor, 2 = high confidence)
    Detect {
        /// Month to analyze (YYYYMM), defaults to the current month
        #[arg(long, short = 'm')]
        month: Option<String>,

        /// Expected base package (repeatable, replaces the configured list)
        #[arg(long = "expected-package")]
        expected_packages: Vec<String>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show the effective detection thresholds
    Thresholds {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Load a JSON snapshot of counter rows into the database
    Import {
        /// Snapshot file path
        #[arg(long)]
        file: PathBuf,
    },

    /// Start the admin report API
    Serve {
        /// Bind address, defaults to the configured one
        #[arg(long)]
        bind: Option<String>,
    },
}

/// Stderr subscriber active while the config file is read, so its fallback
/// warnings are not lost before the configured subscriber exists.
fn bootstrap_subscriber() -> impl tracing::Subscriber + Send + Sync {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish()
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    // Logs go to stderr so report output on stdout stays parseable.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = tracing::subscriber::with_default(bootstrap_subscriber(), || match &cli.config {
        Some(path) => Config::load(path),
        None => Ok(Config::load_or_default()),
    })?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }

    init_tracing(&config);

    match cli.command {
        Commands::Detect {
            month,
            expected_packages,
            json,
        } => {
            let target = match month {
                Some(raw) => raw.parse::<Month>().context("invalid --month")?,
                None => Month::current(),
            };
            let expected = if expected_packages.is_empty() {
                config.base_packages.expected.clone()
            } else {
                expected_packages
            };
            let thresholds = config.thresholds;
            let window = DetectionWindow::for_target(target, thresholds.lookback_months);

            tracing::info!(%target, expected = expected.len(), "Running anomaly detection");
            let pool = storage::open_pool(&config.database.path.display().to_string())?;
            let result = storage::with_snapshot(&pool, |store| -> Result<_, DetectError> {
                AnomalyEngine::new(store, thresholds, expected).detect_window(&window)
            })
            .context("anomaly detection failed")?;

            let severity = result.severity(thresholds.extreme_growth_threshold);
            if json {
                let output = serde_json::json!({
                    "window": window,
                    "severity": severity,
                    "result": result,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print!("{}", report::format_report(&result, &window, &thresholds));
            }

            if severity.exit_code() != 0 {
                std::io::stdout().flush()?;
                std::process::exit(severity.exit_code());
            }
        }
        Commands::Thresholds { json } => {
            let t = config.thresholds;
            if json {
                println!("{}", serde_json::to_string_pretty(&t)?);
            } else {
                println!("{:<34} | Value", "Threshold");
                println!("{:-<34}-|-{:-<10}", "", "");
                println!("{:<34} | {}", "lookback_months", t.lookback_months);
                println!("{:<34} | {}", "min_baseline_count", t.min_baseline_count);
                println!("{:<34} | {}", "min_correlation_count", t.min_correlation_count);
                println!("{:<34} | {:.1}", "growth_threshold", t.growth_threshold);
                println!("{:<34} | {:.1}", "extreme_growth_threshold", t.extreme_growth_threshold);
                println!(
                    "{:<34} | {:.2}",
                    "base_package_deviation_threshold", t.base_package_deviation_threshold
                );
                println!(
                    "{:<34} | {}",
                    "expected_packages",
                    config.base_packages.expected.join(", ")
                );
            }
        }
        Commands::Import { file } => {
            let pool = storage::open_pool(&config.database.path.display().to_string())?;
            let rows = storage::import_snapshot(&pool, &file)?;
            println!("Imported {} counter rows.", rows);
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.api.bind.clone());
            tracing::info!(%bind, "Starting popsentry API");
            popsentry::serve(&bind, &config).await?;
        }
    }

    Ok(())
}
