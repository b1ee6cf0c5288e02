/*
SPDX-FileCopyrightText: Copyright 2026 Cadence Contributors
SPDX-License-Identifier: MIT
*/

//! Drivers that narrate commands to the log instead of a bus.
//!
//! The demo runner wires these in so a rig can be exercised end to end with
//! nothing attached: every command a real transport would carry is emitted as
//! a structured `info!` event, tagged with the device id and its configured
//! channel number. Commands always succeed.

use tracing::info;

use crate::error::DeviceError;

use super::{BinaryDriver, ContinuousDriver};

/// Narrating stand-in for a binary output transport.
pub struct ConsoleBinaryDriver {
    device: String,
    channel: u32,
}

impl ConsoleBinaryDriver {
    /// `device` is the rig id, `channel` the output line a real transport
    /// would drive.
    pub fn new(device: impl Into<String>, channel: u32) -> Self {
        ConsoleBinaryDriver {
            device: device.into(),
            channel,
        }
    }
}

impl BinaryDriver for ConsoleBinaryDriver {
    fn drive(&mut self, on: bool) -> Result<(), DeviceError> {
        info!(
            device = %self.device,
            channel = self.channel,
            level = if on { "on" } else { "off" },
            "→ binary write"
        );
        Ok(())
    }
}

/// Narrating stand-in for a continuous output transport.
pub struct ConsoleContinuousDriver {
    device: String,
    channel: u32,
}

impl ConsoleContinuousDriver {
    pub fn new(device: impl Into<String>, channel: u32) -> Self {
        ConsoleContinuousDriver {
            device: device.into(),
            channel,
        }
    }
}

impl ContinuousDriver for ConsoleContinuousDriver {
    fn drive(&mut self, position: f64) -> Result<(), DeviceError> {
        info!(
            device = %self.device,
            channel = self.channel,
            position = format!("{position:.1}"),
            "→ position write"
        );
        Ok(())
    }
}
