//! cardscan - replay recorded card scans
//!
//! Feeds recorded per-frame model output through the scan loop and prints the
//! state transitions, for tuning error-correction policies offline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cardscan::config::{self, AppConfig};
use cardscan::replay::{self, ReplayScript};
use cardscan::{AggregationState, ScanEvent, ScanMode};

/// cardscan - camera card number aggregation
#[derive(Parser, Debug)]
#[command(name = "cardscan")]
#[command(about = "Replay recorded card scans through the error-correction loop")]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a TOML script of per-frame readings
    Replay {
        /// Script file
        script: PathBuf,

        /// Scan mode (fast or accurate); overrides the config file
        #[arg(short, long)]
        mode: Option<ScanMode>,

        /// Frame interval in milliseconds; overrides the script
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Print every event as a JSON line
        #[arg(long)]
        json: bool,
    },
    /// Print the default configuration
    DefaultConfig,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_or_default_config(args.config.as_deref())?;
    init_logging(&config)?;

    match args.command {
        Command::Replay {
            script,
            mode,
            interval_ms,
            json,
        } => run_replay(&config, &script, mode, interval_ms, json),
        Command::DefaultConfig => {
            print!("{}", toml::to_string_pretty(&AppConfig::default())?);
            Ok(())
        }
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid logging level in configuration")?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Load the given config file, the user config file, or defaults
fn load_or_default_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        return config::load_config(path);
    }

    if let Ok(config_dir) = config::config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            return config::load_config(&config_path);
        }
    }
    Ok(AppConfig::default())
}

fn run_replay(
    config: &AppConfig,
    script_path: &Path,
    mode: Option<ScanMode>,
    interval_ms: Option<u64>,
    json: bool,
) -> Result<()> {
    let mut script = ReplayScript::load(script_path)?;
    if interval_ms.is_some() {
        script.interval_ms = interval_ms;
    }

    let frame_interval = script.interval()?;

    let mode = mode.unwrap_or(config.scan.mode);
    let policy = config.scan.policy_for(mode)?;
    info!(
        frames = script.frames.len(),
        %mode,
        interval = ?frame_interval,
        "replaying {:?}",
        script_path
    );

    let outcome = replay::run(&script, policy, config.driver_options(), |event| {
        if json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("Failed to encode event: {}", e),
            }
        } else {
            print_event(event, frame_interval);
        }
    })?;

    if !json {
        println!(
            "{} frames, {} classified in {:.1} ms",
            outcome.frames,
            outcome.diagnostics.frames_processed,
            outcome.diagnostics.total_compute_duration_ms
        );
        if let AggregationState::Abandoned = outcome.state {
            println!("No card found");
        }
    }

    Ok(())
}

fn print_event(event: &ScanEvent, frame_interval: Duration) {
    match event {
        ScanEvent::Collecting { session } => println!("[{session}] collecting"),
        ScanEvent::Converged { session, result } => {
            let at = frame_time(frame_interval, result.frames);
            println!(
                "[{session}] converged at frame {} (~{:.1}s): {} ({} votes{})",
                result.frames,
                at.as_secs_f64(),
                result.number,
                result.agreement,
                if result.best_effort { ", best effort" } else { "" }
            );
            if let Some(expiry) = result.expiry {
                println!("    expiry {expiry}");
            }
            if let Some(name) = &result.name {
                println!("    name   {name}");
            }
        }
        ScanEvent::Abandoned { session } => println!("[{session}] abandoned"),
        ScanEvent::QrCode { session, payload } => println!("[{session}] qr code: {payload}"),
        ScanEvent::Frame(tick) if tick.is_card && !tick.has_candidate => {
            println!("    frame {}: card in view, no number", tick.frame)
        }
        ScanEvent::Frame(_) => {}
    }
}

/// Approximate replay time of a 1-based frame index
fn frame_time(interval: Duration, frame: u64) -> Duration {
    let index = u32::try_from(frame.saturating_sub(1)).unwrap_or(u32::MAX);
    interval.saturating_mul(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_time() {
        let interval = Duration::from_millis(100);
        assert_eq!(frame_time(interval, 0), Duration::ZERO);
        assert_eq!(frame_time(interval, 1), Duration::ZERO);
        assert_eq!(frame_time(interval, 4), Duration::from_millis(300));
        // Indices past u32 saturate instead of wrapping
        let huge = frame_time(interval, u64::from(u32::MAX) + 2);
        assert_eq!(huge, interval.saturating_mul(u32::MAX));
    }
}
