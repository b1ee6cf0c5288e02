/*
SPDX-FileCopyrightText: Copyright 2026 Cadence Contributors
SPDX-License-Identifier: MIT
*/

//! Cadence – timer-driven actuation sequencer
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── error.rs    – device and scheduling error types
//! ├── timer/      – timer registry: one driver task, many deadlines
//! ├── device/     – output devices (binary / continuous) + drivers
//! ├── sequencer/  – routines: blink bursts, waypoint sweeps
//! └── config/     – YAML rig description (devices + routines)
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod sequencer;
pub mod timer;
