/*
SPDX-FileCopyrightText: Copyright 2026 Cadence Contributors
SPDX-License-Identifier: MIT
*/

//! In-memory drivers that record instead of actuate.
//!
//! The recording drivers capture `(fire instant, command)` pairs into a
//! shared log, so a test or rig binary can assert exactly what reached the
//! transport and exactly when. A [`FailureScript`] can queue one-off failures
//! to exercise the error funnel without any hardware misbehaving on cue.
//!
//! These are runtime tools, not test scaffolding: the `rig-tools` binaries
//! drive whole routines against them.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;

use crate::error::DeviceError;

use super::{BinaryDriver, ContinuousDriver};

/// Shared command log: every successfully driven command with its instant.
pub type CommandLog<T> = Arc<Mutex<Vec<(Instant, T)>>>;

fn recovered<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Failure scripting ─────────────────────────────────────────────────────────

/// Queue of failures a recording driver will report, in order, one per
/// command. Cloneable, so a rig can keep injecting faults while the device
/// owns the driver.
#[derive(Clone, Default)]
pub struct FailureScript {
    queued: Arc<Mutex<VecDeque<String>>>,
}

impl FailureScript {
    /// The next command fails with `reason` instead of being recorded.
    pub fn fail_once(&self, reason: impl Into<String>) {
        recovered(&self.queued).push_back(reason.into());
    }

    fn take(&self) -> Option<String> {
        recovered(&self.queued).pop_front()
    }
}

// ── Recording drivers ─────────────────────────────────────────────────────────

/// Binary transport that records every accepted level.
pub struct RecordingBinaryDriver {
    label: String,
    log: CommandLog<bool>,
    script: FailureScript,
}

impl RecordingBinaryDriver {
    pub fn new() -> Self {
        Self::named("fake-binary")
    }

    /// A driver whose failures name `label` as the device.
    pub fn named(label: impl Into<String>) -> Self {
        RecordingBinaryDriver {
            label: label.into(),
            log: Arc::new(Mutex::new(Vec::new())),
            script: FailureScript::default(),
        }
    }

    /// Handle onto the command log; clone it out before the driver moves
    /// into a device.
    pub fn log(&self) -> CommandLog<bool> {
        Arc::clone(&self.log)
    }

    /// Handle onto the failure script, for injecting faults after the move.
    pub fn script(&self) -> FailureScript {
        self.script.clone()
    }

    /// Convenience for [`FailureScript::fail_once`].
    pub fn fail_once(&self, reason: impl Into<String>) {
        self.script.fail_once(reason);
    }
}

impl Default for RecordingBinaryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryDriver for RecordingBinaryDriver {
    fn drive(&mut self, on: bool) -> Result<(), DeviceError> {
        if let Some(reason) = self.script.take() {
            return Err(DeviceError::CommandFailed {
                device: self.label.clone(),
                reason,
            });
        }
        recovered(&self.log).push((Instant::now(), on));
        Ok(())
    }
}

/// Continuous transport that records every accepted position.
pub struct RecordingContinuousDriver {
    label: String,
    log: CommandLog<f64>,
    script: FailureScript,
}

impl RecordingContinuousDriver {
    pub fn new() -> Self {
        Self::named("fake-continuous")
    }

    pub fn named(label: impl Into<String>) -> Self {
        RecordingContinuousDriver {
            label: label.into(),
            log: Arc::new(Mutex::new(Vec::new())),
            script: FailureScript::default(),
        }
    }

    pub fn log(&self) -> CommandLog<f64> {
        Arc::clone(&self.log)
    }

    pub fn script(&self) -> FailureScript {
        self.script.clone()
    }

    pub fn fail_once(&self, reason: impl Into<String>) {
        self.script.fail_once(reason);
    }
}

impl Default for RecordingContinuousDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ContinuousDriver for RecordingContinuousDriver {
    fn drive(&mut self, position: f64) -> Result<(), DeviceError> {
        if let Some(reason) = self.script.take() {
            return Err(DeviceError::CommandFailed {
                device: self.label.clone(),
                reason,
            });
        }
        recovered(&self.log).push((Instant::now(), position));
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_failures_are_consumed_in_order_between_successes() {
        let mut driver = RecordingBinaryDriver::named("bench-relay");
        let log = driver.log();
        driver.fail_once("first fault");
        driver.fail_once("second fault");

        let e1 = driver.drive(true).unwrap_err();
        let e2 = driver.drive(true).unwrap_err();
        driver.drive(true).unwrap();

        assert_eq!(
            e1,
            DeviceError::CommandFailed {
                device: "bench-relay".to_string(),
                reason: "first fault".to_string(),
            }
        );
        assert!(matches!(e2, DeviceError::CommandFailed { reason, .. } if reason == "second fault"));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn script_handle_injects_after_the_driver_moved_away() {
        let driver = RecordingContinuousDriver::new();
        let script = driver.script();
        let log = driver.log();

        // Simulates the driver living inside a device elsewhere.
        let mut boxed: Box<dyn ContinuousDriver> = Box::new(driver);
        boxed.drive(10.0).unwrap();

        script.fail_once("injected");
        assert!(boxed.drive(20.0).is_err());
        boxed.drive(30.0).unwrap();

        let recorded: Vec<f64> = log.lock().unwrap().iter().map(|(_, p)| *p).collect();
        assert_eq!(recorded, vec![10.0, 30.0]);
    }
}
