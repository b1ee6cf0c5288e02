/*
SPDX-FileCopyrightText: Copyright 2026 Cadence Contributors
SPDX-License-Identifier: MIT
*/

//! Output device layer: typed wrappers over raw output drivers.
//!
//! Two wrapper types model the two output capabilities a routine can drive:
//!
//! ```text
//! routine callback ──► BinaryDevice::toggle()        ──► dyn BinaryDriver     ──► transport
//!                  ──► ContinuousDevice::set_position ──► dyn ContinuousDriver ──► transport
//!                       ↑ tracked state, calibration       ↑ console / fake / real I/O
//! ```
//!
//! The wrapper owns everything a routine should never have to think about:
//! logical state tracking for binary outputs, range clamping and bias
//! calibration for continuous ones, input validation, and per-device command
//! serialisation (an internal mutex, so two actions firing in the same batch
//! cannot interleave their writes to one device).
//!
//! Drivers are deliberately dumb: one method, already-validated input, no
//! state. Implementations live in [`console`] (narrates to the log, used by
//! the demo runner) and [`fake`] (records every command, used by tests and
//! the rig binaries).

pub mod console;
pub mod fake;

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::DeviceError;

// ── Driver capability traits ──────────────────────────────────────────────────

/// Transport for a two-state output (relay, LED, valve solenoid).
///
/// Receives the resolved target level; the wrapper has already decided what
/// `on` means for a toggle. Implementations construct their own
/// [`DeviceError::CommandFailed`] so the failure names the device.
pub trait BinaryDriver: Send {
    fn drive(&mut self, on: bool) -> Result<(), DeviceError>;
}

/// Transport for a positionable output (servo, dimmer, damper).
///
/// `position` is final: finite, bias-corrected, and clamped into the device
/// range by the wrapper before it gets here.
pub trait ContinuousDriver: Send {
    fn drive(&mut self, position: f64) -> Result<(), DeviceError>;
}

// ── Binary state ──────────────────────────────────────────────────────────────

/// Logical state of a binary output as last successfully commanded.
///
/// A freshly constructed device assumes `Off` — the wrapper cannot read the
/// physical line back, so the first `toggle()` on an unknown output drives it
/// on. Callers that know better should start with an explicit
/// [`BinaryDevice::turn_off`] / [`BinaryDevice::turn_on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinaryState {
    #[default]
    Off,
    On,
}

impl BinaryState {
    pub fn toggled(self) -> Self {
        match self {
            BinaryState::Off => BinaryState::On,
            BinaryState::On => BinaryState::Off,
        }
    }

    pub fn is_on(self) -> bool {
        self == BinaryState::On
    }
}

// ── Calibration range ─────────────────────────────────────────────────────────

/// Usable position window for a continuous output.
///
/// Calibration data, not logic: a servo whose horn binds below 10° and above
/// 170° gets `Range { min: 10.0, max: 170.0 }` in its rig entry, and every
/// commanded position is clamped into the window. Out-of-range targets land
/// exactly on `min` or `max`, never error.
///
/// Both endpoints must be finite with `min <= max`; the config validator
/// enforces this before a device is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        debug_assert!(
            min.is_finite() && max.is_finite() && min <= max,
            "invalid range {min}..{max}"
        );
        Range { min, max }
    }

    /// Clamp `v` into the window.
    pub fn clamp(&self, v: f64) -> f64 {
        v.clamp(self.min, self.max)
    }
}

// ── BinaryDevice ──────────────────────────────────────────────────────────────

struct BinaryInner {
    driver: Box<dyn BinaryDriver>,
    state: BinaryState,
}

/// A two-state output with tracked logical state.
///
/// `Send + Sync`; routines share one device via `Arc` and the internal mutex
/// serialises commands. The tracked state only advances when the driver
/// accepts the command — a failed write leaves the device where it was, so a
/// retry sees the truth.
pub struct BinaryDevice {
    id: String,
    inner: Mutex<BinaryInner>,
}

impl BinaryDevice {
    /// Wrap `driver` as the device `id`. Initial state is assumed [`BinaryState::Off`].
    pub fn new(id: impl Into<String>, driver: impl BinaryDriver + 'static) -> Self {
        BinaryDevice {
            id: id.into(),
            inner: Mutex::new(BinaryInner {
                driver: Box::new(driver),
                state: BinaryState::Off,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Last successfully commanded state.
    pub fn state(&self) -> BinaryState {
        self.lock().state
    }

    pub fn turn_on(&self) -> Result<(), DeviceError> {
        self.command(BinaryState::On)
    }

    pub fn turn_off(&self) -> Result<(), DeviceError> {
        self.command(BinaryState::Off)
    }

    /// Flip to the opposite of the tracked state.
    pub fn toggle(&self) -> Result<(), DeviceError> {
        let mut inner = self.lock();
        let target = inner.state.toggled();
        inner.driver.drive(target.is_on())?;
        inner.state = target;
        Ok(())
    }

    fn command(&self, target: BinaryState) -> Result<(), DeviceError> {
        let mut inner = self.lock();
        inner.driver.drive(target.is_on())?;
        inner.state = target;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BinaryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── ContinuousDevice ──────────────────────────────────────────────────────────

struct ContinuousInner {
    driver: Box<dyn ContinuousDriver>,
    last_position: Option<f64>,
}

/// A positionable output with range clamping and bias calibration.
///
/// Every `set_position(v)` dispatches `clamp(v + bias)` — the bias first, so
/// a mechanically offset horn can be corrected in configuration, then the
/// clamp, so the command can never leave the calibrated window.
pub struct ContinuousDevice {
    id: String,
    range: Range,
    bias: f64,
    inner: Mutex<ContinuousInner>,
}

impl ContinuousDevice {
    /// Wrap `driver` as the device `id` with its calibration.
    ///
    /// `bias` must be finite; the config validator enforces this.
    pub fn new(
        id: impl Into<String>,
        range: Range,
        bias: f64,
        driver: impl ContinuousDriver + 'static,
    ) -> Self {
        debug_assert!(bias.is_finite(), "non-finite bias {bias}");
        ContinuousDevice {
            id: id.into(),
            range,
            bias,
            inner: Mutex::new(ContinuousInner {
                driver: Box::new(driver),
                last_position: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn range(&self) -> Range {
        self.range
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    /// Last position successfully delivered to the driver, after calibration.
    /// `None` until the first successful command.
    pub fn last_position(&self) -> Option<f64> {
        self.lock().last_position
    }

    /// Move the output to `position`.
    ///
    /// Rejects NaN and infinite targets before any calibration (see
    /// [`DeviceError::NonFinitePosition`]); everything else is bias-corrected,
    /// clamped into the range, and dispatched. Out-of-window targets are a
    /// normal case and land on the nearest endpoint.
    pub fn set_position(&self, position: f64) -> Result<(), DeviceError> {
        if !position.is_finite() {
            return Err(DeviceError::NonFinitePosition {
                device: self.id.clone(),
                value: position,
            });
        }

        let target = self.range.clamp(position + self.bias);
        let mut inner = self.lock();
        inner.driver.drive(target)?;
        inner.last_position = Some(target);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ContinuousInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::fake::{RecordingBinaryDriver, RecordingContinuousDriver};
    use super::*;

    fn positions(log: &fake::CommandLog<f64>) -> Vec<f64> {
        log.lock().unwrap().iter().map(|(_, v)| *v).collect()
    }

    fn levels(log: &fake::CommandLog<bool>) -> Vec<bool> {
        log.lock().unwrap().iter().map(|(_, v)| *v).collect()
    }

    // ── BinaryDevice ──────────────────────────────────────────────────────────

    #[test]
    fn binary_device_starts_off() {
        let device = BinaryDevice::new("status-led", RecordingBinaryDriver::new());
        assert_eq!(device.state(), BinaryState::Off);
    }

    #[test]
    fn turn_on_and_off_track_state_and_reach_the_driver() {
        let driver = RecordingBinaryDriver::new();
        let log = driver.log();
        let device = BinaryDevice::new("status-led", driver);

        device.turn_on().unwrap();
        assert_eq!(device.state(), BinaryState::On);

        device.turn_off().unwrap();
        assert_eq!(device.state(), BinaryState::Off);

        assert_eq!(levels(&log), vec![true, false]);
    }

    #[test]
    fn toggle_alternates_from_the_assumed_off_state() {
        let driver = RecordingBinaryDriver::new();
        let log = driver.log();
        let device = BinaryDevice::new("status-led", driver);

        device.toggle().unwrap();
        device.toggle().unwrap();
        device.toggle().unwrap();

        assert_eq!(device.state(), BinaryState::On);
        assert_eq!(levels(&log), vec![true, false, true]);
    }

    #[test]
    fn failed_binary_command_leaves_state_untouched() {
        let driver = RecordingBinaryDriver::new();
        let log = driver.log();
        driver.fail_once("coil stuck");
        let device = BinaryDevice::new("status-led", driver);

        let err = device.turn_on().unwrap_err();
        assert!(matches!(err, DeviceError::CommandFailed { .. }));
        assert_eq!(device.state(), BinaryState::Off);
        assert!(levels(&log).is_empty(), "failed command must not be recorded");

        // The fault was transient — the next command goes through.
        device.turn_on().unwrap();
        assert_eq!(device.state(), BinaryState::On);
        assert_eq!(levels(&log), vec![true]);
    }

    // ── ContinuousDevice ──────────────────────────────────────────────────────

    fn servo(range: Range, bias: f64) -> (fake::CommandLog<f64>, ContinuousDevice) {
        let driver = RecordingContinuousDriver::new();
        let log = driver.log();
        (log, ContinuousDevice::new("horn-servo", range, bias, driver))
    }

    #[test]
    fn in_range_position_passes_through_unchanged() {
        let (log, device) = servo(Range::new(0.0, 180.0), 0.0);
        device.set_position(90.0).unwrap();
        assert_eq!(positions(&log), vec![90.0]);
        assert_eq!(device.last_position(), Some(90.0));
    }

    #[test]
    fn out_of_range_positions_land_exactly_on_the_endpoints() {
        let (log, device) = servo(Range::new(10.0, 170.0), 0.0);

        device.set_position(200.0).unwrap();
        device.set_position(-45.0).unwrap();
        device.set_position(10.0).unwrap();

        assert_eq!(positions(&log), vec![170.0, 10.0, 10.0]);
        assert_eq!(device.last_position(), Some(10.0));
    }

    #[test]
    fn bias_is_applied_before_the_clamp() {
        let (log, device) = servo(Range::new(0.0, 180.0), -10.0);

        device.set_position(45.0).unwrap(); // 45 - 10 = 35
        device.set_position(5.0).unwrap(); // 5 - 10 = -5 → clamped to 0

        assert_eq!(positions(&log), vec![35.0, 0.0]);
    }

    #[test]
    fn non_finite_positions_are_rejected_before_dispatch() {
        let (log, device) = servo(Range::new(0.0, 180.0), 0.0);

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = device.set_position(bad).unwrap_err();
            assert!(
                matches!(err, DeviceError::NonFinitePosition { .. }),
                "expected NonFinitePosition for {bad}, got: {err}"
            );
        }

        assert!(positions(&log).is_empty());
        assert_eq!(device.last_position(), None);
    }

    #[test]
    fn failed_continuous_command_keeps_the_previous_position() {
        let driver = RecordingContinuousDriver::new();
        let log = driver.log();
        driver.fail_once("pwm timeout");
        let device = ContinuousDevice::new("horn-servo", Range::new(0.0, 180.0), 0.0, driver);

        assert!(device.set_position(90.0).is_err());
        assert_eq!(device.last_position(), None);

        device.set_position(45.0).unwrap();
        assert_eq!(device.last_position(), Some(45.0));
        assert_eq!(positions(&log), vec![45.0]);
    }
}
