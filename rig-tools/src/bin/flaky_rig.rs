/*
SPDX-FileCopyrightText: Copyright 2026 Cadence Contributors
SPDX-License-Identifier: MIT
*/

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use cadence::device::fake::RecordingBinaryDriver;
use cadence::device::BinaryDevice;
use cadence::sequencer::{BlinkDef, Sequencer};
use cadence::timer::TimerRegistry;

const TICK: Duration = Duration::from_secs(1);
const STEP: Duration = Duration::from_millis(100);
const TOGGLES: u32 = 5;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Run an endless blink against a driver scripted to fail on a cadence.
///
/// Every injected fault is logged and swallowed by the timer driver; the rig
/// then checks that the successful writes still alternate on/off — a failed
/// toggle must not lose the device's tracked state.
///
/// Example:
///   flaky-rig --seconds 10 --fault-every-ms 700
#[derive(Debug, Parser)]
#[command(name = "flaky-rig", about = "Cadence flaky-device rig")]
struct Cli {
    /// How long to let the blink run before stopping it.
    #[arg(long = "seconds", default_value_t = 10)]
    seconds: u64,

    /// Queue one scripted driver failure this often.
    #[arg(long = "fault-every-ms", default_value_t = 700)]
    fault_every_ms: u64,
}

/// Toggles attempted inside `window`: one five-toggle burst per second.
/// The stop at the end of the window races toggles due exactly on it, so the
/// real count can sit one burst either side under load.
fn expected_attempts(window: Duration) -> usize {
    let mut count = 0;
    let mut tick = Duration::ZERO;
    while tick < window {
        for i in 0..TOGGLES {
            if tick + STEP * i < window {
                count += 1;
            }
        }
        tick += TICK;
    }
    count
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(
        seconds = cli.seconds,
        fault_every_ms = cli.fault_every_ms,
        "Flaky rig starting"
    );

    let driver = RecordingBinaryDriver::named("flaky-led");
    let log = driver.log();
    let script = driver.script();
    let led = Arc::new(BinaryDevice::new("flaky-led", driver));

    // Fault injector: queue one scripted failure per interval tick.
    let injected = Arc::new(AtomicUsize::new(0));
    let injector = {
        let injected = Arc::clone(&injected);
        let period = Duration::from_millis(cli.fault_every_ms);
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            loop {
                ticks.tick().await;
                script.fail_once("injected transient fault");
                injected.fetch_add(1, Ordering::Relaxed);
            }
        })
    };

    let blink = BlinkDef {
        name: "flaky-blink".to_string(),
        device: Arc::clone(&led),
        tick_interval: TICK,
        step: STEP,
        toggles_per_tick: TOGGLES,
        duration: None,
    };

    let registry = TimerRegistry::new();
    let sequencer = Sequencer::new(registry.clone());
    sequencer.start(&blink)?;

    tokio::time::sleep(Duration::from_secs(cli.seconds)).await;

    sequencer.stop_all();
    registry.shutdown().await;
    injector.abort();

    // ── Summary ───────────────────────────────────────────────────────────────
    let levels: Vec<bool> = log
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|&(_, on)| on)
        .collect();
    let attempts = expected_attempts(Duration::from_secs(cli.seconds));
    let faults = injected.load(Ordering::Relaxed);

    info!("── Flaky summary ─────────────────────────────");
    info!(
        "  {} of ~{} toggle(s) reached the driver, {} fault(s) scripted",
        levels.len(),
        attempts,
        faults
    );
    if levels.windows(2).all(|w| w[0] != w[1]) {
        info!("  ✓ successful writes alternate strictly — no state lost to faults");
    } else {
        warn!("  ✗ consecutive equal levels recorded: {levels:?}");
    }

    Ok(())
}
