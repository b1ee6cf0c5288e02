/*
SPDX-FileCopyrightText: Copyright 2026 Cadence Contributors
SPDX-License-Identifier: MIT
*/

//! Blink routine: batches of toggles on a binary output.
//!
//! Each cycle schedules `toggles_per_tick` one-shot toggles spaced `step`
//! apart; the first cycle starts immediately at install, later cycles are
//! launched by a repeating batch-scheduler every `tick_interval`. With the
//! classic parameters (2 s tick, 100 ms step, 10 toggles, 6 s duration) the
//! output flashes in three ten-toggle bursts and goes quiet exactly at the
//! 6 s mark: the stop one-shot outranks the coinciding fourth tick, so no
//! partial burst leaks past the deadline.

use std::sync::Arc;
use std::time::Duration;

use crate::device::BinaryDevice;
use crate::error::ScheduleError;

use super::{RoutineCtx, RoutineDef};

/// Definition of a blink pattern. Start it with
/// [`Sequencer::start`](super::Sequencer::start).
pub struct BlinkDef {
    /// Routine name, for logs and lookups.
    pub name: String,
    /// Output to toggle. Shared — other routines may address the same device;
    /// the device serialises commands.
    pub device: Arc<BinaryDevice>,
    /// Time between the starts of consecutive toggle batches.
    pub tick_interval: Duration,
    /// Spacing between toggles inside one batch.
    pub step: Duration,
    /// Toggles per batch.
    pub toggles_per_tick: u32,
    /// Total run time; `None` blinks until stopped. The stop lands exactly
    /// `duration` after start and wins against any work due at the same
    /// instant.
    pub duration: Option<Duration>,
}

impl RoutineDef for BlinkDef {
    fn name(&self) -> &str {
        &self.name
    }

    fn install(&self, ctx: &RoutineCtx) -> Result<(), ScheduleError> {
        schedule_batch(ctx, &self.device, self.step, self.toggles_per_tick);

        let batch_ctx = ctx.clone();
        let device = Arc::clone(&self.device);
        let step = self.step;
        let count = self.toggles_per_tick;
        ctx.schedule_repeating(self.tick_interval, move || {
            schedule_batch(&batch_ctx, &device, step, count);
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

/// Queue one batch of toggles starting now.
fn schedule_batch(ctx: &RoutineCtx, device: &Arc<BinaryDevice>, step: Duration, count: u32) {
    for i in 0..count {
        let device = Arc::clone(device);
        ctx.schedule_once(step * i, move || device.toggle());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
