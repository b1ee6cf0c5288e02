/*
SPDX-FileCopyrightText: Copyright 2026 Cadence Contributors
SPDX-License-Identifier: MIT
*/

use std::collections::HashMap;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use cadence::config::{OutputKind, PatternSpec, RigConfig};
use cadence::device::console::{ConsoleBinaryDriver, ConsoleContinuousDriver};
use cadence::device::{BinaryDevice, ContinuousDevice};
use cadence::sequencer::{BlinkDef, RoutineDef, Sequencer, SweepDef};
use cadence::timer::TimerRegistry;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Cadence actuation sequencer.
///
/// Example:
///   cadence --rig demos/rig.yaml --run-for 35
#[derive(Debug, Parser)]
#[command(
    name = "cadence",
    about = "Cadence – timer-driven actuation sequencer",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML rig description (devices + routines).
    #[arg(short = 'r', long = "rig")]
    rig: Option<PathBuf>,

    /// Shut down cleanly after this many seconds instead of waiting for Ctrl-C.
    #[arg(long = "run-for", value_name = "SECONDS")]
    run_for: Option<u64>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialise structured logging.
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Cadence starting up...");

    // ── Parse CLI arguments ───────────────────────────────────────────────────
    let cli = Cli::parse();

    info!(
        rig     = ?cli.rig,
        run_for = ?cli.run_for,
        "Configuration"
    );

    // ── Load the rig description ──────────────────────────────────────────────
    let rig = match &cli.rig {
        Some(path) => {
            let mut cfg = RigConfig::new();
            if let Err(e) = cfg.load_from_file(path) {
                error!("Failed to load rig: {:#}", e);
                process::exit(1);
            }
            cfg
        }
        None => {
            warn!("No rig file provided, using the built-in demo rig");
            RigConfig::demo_rig()
        }
    };

    // ── Build output devices ──────────────────────────────────────────────────
    let mut binary_devices: HashMap<String, Arc<BinaryDevice>> = HashMap::new();
    let mut continuous_devices: HashMap<String, Arc<ContinuousDevice>> = HashMap::new();

    for spec in rig.devices().values() {
        match &spec.output {
            OutputKind::Binary => {
                let driver = ConsoleBinaryDriver::new(spec.name.as_str(), spec.channel);
                binary_devices.insert(
                    spec.name.clone(),
                    Arc::new(BinaryDevice::new(spec.name.as_str(), driver)),
                );
            }
            OutputKind::Continuous { range, bias } => {
                let driver = ConsoleContinuousDriver::new(spec.name.as_str(), spec.channel);
                continuous_devices.insert(
                    spec.name.clone(),
                    Arc::new(ContinuousDevice::new(
                        spec.name.as_str(),
                        *range,
                        *bias,
                        driver,
                    )),
                );
            }
        }
    }
    info!(
        "Built {} binary and {} continuous device(s)",
        binary_devices.len(),
        continuous_devices.len()
    );

    // ── Translate routine specs into definitions ──────────────────────────────
    // Sort by name for deterministic startup order
    let mut specs: Vec<_> = rig.routines().values().collect();
    specs.sort_by_key(|r| &r.name);

    let mut defs: Vec<Box<dyn RoutineDef>> = Vec::new();
    for spec in specs {
        match &spec.pattern {
            PatternSpec::Blink {
                tick_interval,
                step,
                toggles_per_tick,
                duration,
            } => {
                let Some(device) = binary_devices.get(&spec.device) else {
                    error!(
                        "Routine '{}' references missing binary device '{}'",
                        spec.name, spec.device
                    );
                    process::exit(1);
                };
                defs.push(Box::new(BlinkDef {
                    name: spec.name.clone(),
                    device: Arc::clone(device),
                    tick_interval: *tick_interval,
                    step: *step,
                    toggles_per_tick: *toggles_per_tick,
                    duration: *duration,
                }));
            }
            PatternSpec::Sweep {
                tick_interval,
                waypoints,
                duration,
            } => {
                let Some(device) = continuous_devices.get(&spec.device) else {
                    error!(
                        "Routine '{}' references missing continuous device '{}'",
                        spec.name, spec.device
                    );
                    process::exit(1);
                };
                defs.push(Box::new(SweepDef {
                    name: spec.name.clone(),
                    device: Arc::clone(device),
                    tick_interval: *tick_interval,
                    waypoints: waypoints.clone(),
                    duration: *duration,
                }));
            }
        }
    }

    // ── Start everything ──────────────────────────────────────────────────────
    let registry = TimerRegistry::new();
    let sequencer = Sequencer::new(registry.clone());

    for def in &defs {
        if let Err(e) = sequencer.start(def.as_ref()) {
            error!("Failed to start routine: {e}");
            process::exit(1);
        }
    }

    // ── Run until Ctrl-C or the requested window elapses ──────────────────────
    match cli.run_for {
        Some(secs) => {
            info!("Running for {secs}s, then shutting down");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!("Run window elapsed");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received");
                }
            }
        }
        None => {
            info!("Running until Ctrl-C");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {e}");
            }
        }
    }

    // ── Orderly shutdown ──────────────────────────────────────────────────────
    sequencer.stop_all();
    registry.shutdown().await;
    info!("Cadence stopped");
}
