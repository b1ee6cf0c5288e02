/*
SPDX-FileCopyrightText: Copyright 2026 Cadence Contributors
SPDX-License-Identifier: MIT
*/

//! Structured error types for the Cadence sequencer.
//!
//! Two error enums model the two failure layers:
//!
//! * [`DeviceError`] — why a single device command failed (low-level, carries
//!   the device id and exact values).
//! * [`ScheduleError`] — why the [`TimerRegistry`](crate::timer::TimerRegistry)
//!   refused a registration, and therefore why a routine failed to install.
//!
//! # Failure policy
//! Timer callbacks return `Result<(), DeviceError>`. A callback `Err` is
//! funnelled to the `tracing` error sink by the registry driver and never
//! tears down the driver task; later firings proceed as scheduled. Refusing a
//! registration, by contrast, is synchronous and surfaces to the caller
//! before anything is queued.
//!
//! **Do not** replace these with `anyhow::Error` in library paths — the
//! structured variants are intentional. `anyhow` is reserved for the
//! config-loading and binary layers.

use thiserror::Error;

// ── Device commands ───────────────────────────────────────────────────────────

/// Detailed reason why a single device command failed.
///
/// Returned by every [`BinaryDevice`] / [`ContinuousDevice`] operation and by
/// the driver traits underneath them. The wrappers guarantee that a command
/// returning `Err` leaves the tracked device state untouched.
///
/// [`BinaryDevice`]: crate::device::BinaryDevice
/// [`ContinuousDevice`]: crate::device::ContinuousDevice
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    /// The underlying transport rejected or failed to deliver the command.
    ///
    /// `reason` is free text from the driver (I/O error, protocol NAK, a
    /// scripted failure in tests). The device id makes the event attributable
    /// without further context.
    #[error("device '{device}' command failed: {reason}")]
    CommandFailed { device: String, reason: String },

    /// `set_position()` was called with a NaN or infinite target.
    ///
    /// Rejected before clamping so a non-finite value can never reach a
    /// driver or corrupt the last-position record.
    #[error("device '{device}' given non-finite position {value}")]
    NonFinitePosition { device: String, value: f64 },
}

// ── Registration ──────────────────────────────────────────────────────────────

/// Error returned when the timer registry refuses a registration.
///
/// One-shot scheduling is infallible (`Duration` cannot encode a negative
/// delay), so the only refusal left is a repeating registration with a zero
/// period — which would make the fire sequence `t0, t0, t0, …` and
/// spin the driver. Routine installation propagates this unchanged after
/// unwinding any partially registered actions.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// `schedule_repeating()` was called with a zero period.
    #[error("repeating period must be strictly positive — got 0")]
    ZeroPeriod,
}
