/*
SPDX-FileCopyrightText: Copyright 2026 Cadence Contributors
SPDX-License-Identifier: MIT
*/

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use cadence::device::fake::{RecordingBinaryDriver, RecordingContinuousDriver};
use cadence::device::{BinaryDevice, ContinuousDevice, Range};
use cadence::sequencer::{BlinkDef, Sequencer, SweepDef, Waypoint};
use cadence::timer::TimerRegistry;

// ── The classic demo bench, hard-coded ────────────────────────────────────────

const BLINK_TICK: Duration = Duration::from_secs(2);
const BLINK_STEP: Duration = Duration::from_millis(100);
const BLINK_TOGGLES: u32 = 10;
const BLINK_DURATION: Duration = Duration::from_secs(6);

const SWEEP_TICK: Duration = Duration::from_secs(7);
const SWEEP_DURATION: Duration = Duration::from_secs(30);
const SWEEP_POSITIONS: [f64; 5] = [45.0, 90.0, 135.0, 170.0, 10.0];

// ── CLI argument definition ───────────────────────────────────────────────────

/// Soak the demo bench (blink + sweep) against recording fakes on the real
/// clock, then compare recorded command counts with the cycle arithmetic.
///
/// Counts assume light load; jitter near a burst boundary can drift them by
/// one or two commands.
///
/// Example:
///   soak-rig --seconds 35
#[derive(Debug, Parser)]
#[command(name = "soak-rig", about = "Cadence soak rig – demo bench on fakes")]
struct Cli {
    /// How long to let the bench run before stopping everything.
    #[arg(long = "seconds", default_value_t = 35)]
    seconds: u64,
}

// ── Expected command counts ───────────────────────────────────────────────────

/// Toggles the blink routine delivers inside `window`: one ten-step burst per
/// tick, truncated by whichever of `window` and the routine duration comes
/// first. A toggle due exactly at the cut-off is suppressed.
fn expected_toggles(window: Duration) -> usize {
    let end = window.min(BLINK_DURATION);
    let mut count = 0;
    let mut tick = Duration::ZERO;
    while tick < end {
        for i in 0..BLINK_TOGGLES {
            if tick + BLINK_STEP * i < end {
                count += 1;
            }
        }
        tick += BLINK_TICK;
    }
    count
}

/// Positions the sweep routine delivers inside `window`: five one-second
/// waypoints per cycle, truncated the same way.
fn expected_positions(window: Duration) -> usize {
    let end = window.min(SWEEP_DURATION);
    let mut count = 0;
    let mut cycle = Duration::ZERO;
    while cycle < end {
        for i in 0..SWEEP_POSITIONS.len() as u32 {
            if cycle + Duration::from_secs(1) * i < end {
                count += 1;
            }
        }
        cycle += SWEEP_TICK;
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
    info!(seconds = cli.seconds, "Soak rig starting");

    // ── Bench: recording fakes behind real devices ────────────────────────────
    let led_driver = RecordingBinaryDriver::named("status-led");
    let led_log = led_driver.log();
    let led = Arc::new(BinaryDevice::new("status-led", led_driver));

    let servo_driver = RecordingContinuousDriver::named("horn-servo");
    let servo_log = servo_driver.log();
    let servo = Arc::new(ContinuousDevice::new(
        "horn-servo",
        Range::new(0.0, 180.0),
        0.0,
        servo_driver,
    ));

    let blink = BlinkDef {
        name: "status-blink".to_string(),
        device: Arc::clone(&led),
        tick_interval: BLINK_TICK,
        step: BLINK_STEP,
        toggles_per_tick: BLINK_TOGGLES,
        duration: Some(BLINK_DURATION),
    };
    let sweep = SweepDef {
        name: "horn-sweep".to_string(),
        device: Arc::clone(&servo),
        tick_interval: SWEEP_TICK,
        waypoints: SWEEP_POSITIONS
            .iter()
            .enumerate()
            .map(|(i, &position)| Waypoint {
                offset: Duration::from_secs(i as u64),
                position,
            })
            .collect(),
        duration: Some(SWEEP_DURATION),
    };

    // ── Run ───────────────────────────────────────────────────────────────────
    let registry = TimerRegistry::new();
    let sequencer = Sequencer::new(registry.clone());

    sequencer.start(&blink)?;
    sequencer.start(&sweep)?;

    tokio::time::sleep(Duration::from_secs(cli.seconds)).await;

    sequencer.stop_all();
    registry.shutdown().await;

    // ── Summary ───────────────────────────────────────────────────────────────
    let window = Duration::from_secs(cli.seconds);
    let toggles = led_log
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .len();
    let positions: Vec<f64> = servo_log
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|&(_, position)| position)
        .collect();

    let pattern_intact = positions
        .iter()
        .zip(SWEEP_POSITIONS.iter().cycle())
        .all(|(got, want)| got == want);

    info!("── Soak summary ──────────────────────────────");
    report("status-led toggles", toggles, expected_toggles(window));
    report("horn-servo positions", positions.len(), expected_positions(window));
    if pattern_intact {
        info!("  ✓ waypoint pattern intact");
    } else {
        warn!("  ✗ waypoint pattern out of order: {positions:?}");
    }
    info!(
        "  final states: led={:?}, servo={:?}",
        led.state(),
        servo.last_position()
    );

    Ok(())
}

fn report(label: &str, got: usize, want: usize) {
    if got == want {
        info!("  ✓ {label}: {got} recorded ({want} expected)");
    } else {
        warn!("  ✗ {label}: {got} recorded, {want} expected");
    }
}
