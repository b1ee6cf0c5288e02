/*
SPDX-FileCopyrightText: Copyright 2026 Cadence Contributors
SPDX-License-Identifier: MIT
*/

//! Sweep routine: a waypoint sequence on a continuous output.
//!
//! Each cycle replays the waypoint list — position commands at fixed offsets
//! from the cycle start. The first cycle begins at install, later cycles are
//! launched by a repeating cycle-scheduler every `tick_interval`. Positions
//! go through the device's calibration, so a waypoint outside the usable
//! window simply parks the output at the nearest end.

use std::sync::Arc;
use std::time::Duration;

use crate::device::ContinuousDevice;
use crate::error::ScheduleError;

use super::{RoutineCtx, RoutineDef};

/// One step of a sweep cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    /// When to command the position, measured from the start of the cycle.
    /// Normally inside `tick_interval`; a later offset bleeds into the next
    /// cycle, which overlaps patterns but breaks nothing.
    pub offset: Duration,
    /// Target position, pre-calibration.
    pub position: f64,
}

/// Definition of a sweep pattern over [`Waypoint`]s.
pub struct SweepDef {
    pub name: String,
    pub device: Arc<ContinuousDevice>,
    /// Time between the starts of consecutive cycles.
    pub tick_interval: Duration,
    pub waypoints: Vec<Waypoint>,
    /// Total run time; `None` sweeps until stopped. A stop that coincides
    /// with a cycle boundary or a waypoint wins and suppresses it.
    pub duration: Option<Duration>,
}

impl RoutineDef for SweepDef {
    fn name(&self) -> &str {
        &self.name
    }

    fn install(&self, ctx: &RoutineCtx) -> Result<(), ScheduleError> {
        schedule_cycle(ctx, &self.device, &self.waypoints);

        let cycle_ctx = ctx.clone();
        let device = Arc::clone(&self.device);
        let waypoints = self.waypoints.clone();
        ctx.schedule_repeating(self.tick_interval, move || {
            schedule_cycle(&cycle_ctx, &device, &waypoints);
            Ok(())
        })?;

        if let Some(total) = self.duration {
            let stop_ctx = ctx.clone();
            ctx.schedule_once(total, move || {
                stop_ctx.stop();
                Ok(())
            });
        }
        Ok(())
    }
}

/// Queue one cycle's waypoints starting now.
fn schedule_cycle(ctx: &RoutineCtx, device: &Arc<ContinuousDevice>, waypoints: &[Waypoint]) {
    for wp in waypoints {
        let device = Arc::clone(device);
        let position = wp.position;
        ctx.schedule_once(wp.offset, move || device.set_position(position));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::RecordingContinuousDriver;
    use crate::device::Range;
    use crate::sequencer::{RoutineState, Sequencer};
    use crate::timer::TimerRegistry;
    use tokio::time::{sleep, Instant};

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn servo(range: Range) -> (crate::device::fake::CommandLog<f64>, Arc<ContinuousDevice>) {
        let driver = RecordingContinuousDriver::named("horn-servo");
        let log = driver.log();
        (
            log,
            Arc::new(ContinuousDevice::new("horn-servo", range, 0.0, driver)),
        )
    }

    /// The demo pattern: five waypoints, one per second, 7 s cycle.
    fn demo_waypoints() -> Vec<Waypoint> {
        [45.0, 90.0, 135.0, 170.0, 10.0]
            .into_iter()
            .enumerate()
            .map(|(i, position)| Waypoint {
                offset: secs(i as u64),
                position,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn four_full_cycles_then_a_clean_stop() {
        let registry = TimerRegistry::new();
        let sequencer = Sequencer::new(registry.clone());
        let (log, device) = servo(Range::new(0.0, 180.0));
        let start = Instant::now();

        let routine = sequencer
            .start(&SweepDef {
                name: "horn-sweep".to_string(),
                device: Arc::clone(&device),
                tick_interval: secs(7),
                waypoints: demo_waypoints(),
                duration: Some(secs(28)),
            })
            .unwrap();

        sleep(secs(29)).await;

        // Cycles start at 0, 7, 14 and 21 s. The 28 s stop outranks the
        // coinciding fifth cycle tick, so the count is exact.
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 20);

        let pattern = [45.0, 90.0, 135.0, 170.0, 10.0];
        for (i, (at, position)) in log.iter().enumerate() {
            let cycle = (i / 5) as u64;
            let step = (i % 5) as u64;
            assert_eq!(*at, start + secs(7 * cycle + step), "command {i} mistimed");
            assert_eq!(*position, pattern[i % 5], "command {i} off pattern");
        }

        assert_eq!(device.last_position(), Some(10.0));
        assert_eq!(routine.state(), RoutineState::Stopped);

        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_inside_a_cycle_truncates_it() {
        let registry = TimerRegistry::new();
        let sequencer = Sequencer::new(registry.clone());
        let (log, device) = servo(Range::new(0.0, 180.0));

        let routine = sequencer
            .start(&SweepDef {
                name: "horn-sweep".to_string(),
                device,
                tick_interval: secs(7),
                waypoints: demo_waypoints(),
                duration: Some(secs(30)),
            })
            .unwrap();

        sleep(Duration::from_millis(30_500)).await;

        // The fifth cycle starts at 28 s and gets two commands out (28 s,
        // 29 s). Its 30 s waypoint ties with the stop and loses on
        // registration order; 31 s and 32 s are cancelled outright.
        {
            let log = log.lock().unwrap();
            assert_eq!(log.len(), 22);
            assert_eq!(log[20].1, 45.0);
            assert_eq!(log[21].1, 90.0);
        }
        assert_eq!(routine.state(), RoutineState::Stopped);

        // Nothing trails in after the stop.
        sleep(secs(5)).await;
        assert_eq!(log.lock().unwrap().len(), 22);

        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn waypoints_outside_the_window_park_on_its_ends() {
        let registry = TimerRegistry::new();
        let sequencer = Sequencer::new(registry.clone());
        let (log, device) = servo(Range::new(10.0, 170.0));

        let routine = sequencer
            .start(&SweepDef {
                name: "binding-horn".to_string(),
                device,
                tick_interval: secs(5),
                waypoints: vec![
                    Waypoint {
                        offset: Duration::ZERO,
                        position: 200.0,
                    },
                    Waypoint {
                        offset: secs(1),
                        position: -20.0,
                    },
                ],
                duration: None,
            })
            .unwrap();

        sleep(Duration::from_millis(1_500)).await;
        routine.stop();

        let positions: Vec<f64> = log.lock().unwrap().iter().map(|(_, p)| *p).collect();
        assert_eq!(positions, vec![170.0, 10.0]);

        registry.shutdown().await;
    }
}
