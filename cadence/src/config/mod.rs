//! Rig configuration loading and management.
//!
//! A "rig" is the set of output devices on the bench plus the routines that
//! drive them. The expected YAML structure is:
//!
//! ```yaml
//! devices:
//!   status-led:
//!     kind: binary
//!     channel: 1
//!   horn-servo:
//!     kind: continuous
//!     channel: 4
//!     range: { min: 10.0, max: 170.0 }
//!     bias: -2.0
//!
//! routines:
//!   status-blink:
//!     kind: blink
//!     device: status-led
//!     tick_interval_ms: 2000
//!     step_ms: 100
//!     toggles_per_tick: 10
//!     duration_ms: 6000
//!   horn-sweep:
//!     kind: sweep
//!     device: horn-servo
//!     tick_interval_ms: 7000
//!     waypoints:
//!       - { offset_ms: 0, position: 45.0 }
//!       - { offset_ms: 1000, position: 90.0 }
//!     duration_ms: 30000
//! ```
//!
//! Calibration (range and bias) lives here, per device instance — a servo
//! with a binding horn gets its empirical window in its rig entry, and the
//! device layer clamps every command into it.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::device::Range;
use crate::sequencer::Waypoint;

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
///
/// Kept private — callers work with [`DeviceSpec`] / [`RoutineSpec`] via
/// [`RigConfig`] instead.
#[derive(Debug, Deserialize)]
struct RigFile {
    #[serde(default)]
    devices: HashMap<String, DeviceEntry>,
    #[serde(default)]
    routines: HashMap<String, RoutineEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum DeviceEntry {
    Binary {
        channel: u32,
    },
    Continuous {
        channel: u32,
        /// Absent range falls back to the conventional hobby-servo window.
        #[serde(default = "default_range")]
        range: RangeEntry,
        #[serde(default)]
        bias: f64,
    },
}

#[derive(Debug, Deserialize)]
struct RangeEntry {
    min: f64,
    max: f64,
}

fn default_range() -> RangeEntry {
    RangeEntry {
        min: 0.0,
        max: 180.0,
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RoutineEntry {
    Blink {
        device: String,
        tick_interval_ms: u64,
        step_ms: u64,
        toggles_per_tick: u32,
        duration_ms: Option<u64>,
    },
    Sweep {
        device: String,
        tick_interval_ms: u64,
        waypoints: Vec<WaypointEntry>,
        duration_ms: Option<u64>,
    },
}

#[derive(Debug, Deserialize)]
struct WaypointEntry {
    offset_ms: u64,
    position: f64,
}

// ── Public data structures ────────────────────────────────────────────────────

/// What kind of output a device exposes, with its calibration.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputKind {
    Binary,
    Continuous { range: Range, bias: f64 },
}

/// One output device on the rig.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    pub name: String,
    /// Output line a transport would drive (pin, relay index, PWM slot).
    pub channel: u32,
    pub output: OutputKind,
}

/// Pattern parameters for one routine, in resolved units.
#[derive(Debug, Clone)]
pub enum PatternSpec {
    Blink {
        tick_interval: Duration,
        step: Duration,
        toggles_per_tick: u32,
        duration: Option<Duration>,
    },
    Sweep {
        tick_interval: Duration,
        waypoints: Vec<Waypoint>,
        duration: Option<Duration>,
    },
}

/// One routine on the rig: a pattern bound to a device by name.
#[derive(Debug, Clone)]
pub struct RoutineSpec {
    pub name: String,
    pub device: String,
    pub pattern: PatternSpec,
}

// ── RigConfig ─────────────────────────────────────────────────────────────────

/// Loads and manages the rig description from a YAML file.
#[derive(Debug, Default)]
pub struct RigConfig {
    devices: HashMap<String, DeviceSpec>,
    routines: HashMap<String, RoutineSpec>,
    /// Set to `true` after a successful [`load_from_file`](Self::load_from_file)
    /// or by [`demo_rig`](Self::demo_rig).
    loaded: bool,
}

impl RigConfig {
    /// Creates a new, empty `RigConfig`.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in demo rig, matching the classic two-device bench: a
    /// status LED on channel 1 blinking in ten-toggle bursts for six
    /// seconds, and a horn servo on channel 4 sweeping five waypoints per
    /// seven-second cycle for thirty seconds.
    pub fn demo_rig() -> Self {
        let mut cfg = Self::new();

        cfg.devices.insert(
            "status-led".to_string(),
            DeviceSpec {
                name: "status-led".to_string(),
                channel: 1,
                output: OutputKind::Binary,
            },
        );
        cfg.devices.insert(
            "horn-servo".to_string(),
            DeviceSpec {
                name: "horn-servo".to_string(),
                channel: 4,
                output: OutputKind::Continuous {
                    range: Range::new(0.0, 180.0),
                    bias: 0.0,
                },
            },
        );

        cfg.routines.insert(
            "status-blink".to_string(),
            RoutineSpec {
                name: "status-blink".to_string(),
                device: "status-led".to_string(),
                pattern: PatternSpec::Blink {
                    tick_interval: Duration::from_secs(2),
                    step: Duration::from_millis(100),
                    toggles_per_tick: 10,
                    duration: Some(Duration::from_secs(6)),
                },
            },
        );
        cfg.routines.insert(
            "horn-sweep".to_string(),
            RoutineSpec {
                name: "horn-sweep".to_string(),
                device: "horn-servo".to_string(),
                pattern: PatternSpec::Sweep {
                    tick_interval: Duration::from_secs(7),
                    waypoints: [45.0, 90.0, 135.0, 170.0, 10.0]
                        .into_iter()
                        .enumerate()
                        .map(|(i, position)| Waypoint {
                            offset: Duration::from_secs(i as u64),
                            position,
                        })
                        .collect(),
                    duration: Some(Duration::from_secs(30)),
                },
            },
        );

        cfg.loaded = true;
        cfg
    }

    /// Parses `path` and populates the device and routine maps.
    ///
    /// * If the file describes no devices and no routines, the built-in
    ///   [`demo_rig`](Self::demo_rig) is used instead.
    /// * Calling this a second time replaces everything previously loaded.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, the YAML is
    /// structurally invalid, or the rig is inconsistent (a routine naming a
    /// missing device, a blink bound to a continuous output, a zero tick, a
    /// non-finite position or calibration value).
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Loading rig configuration from: {}", path.display());

        // Reset state before (re-)loading
        self.devices.clear();
        self.routines.clear();
        self.loaded = false;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open rig file: {}", path.display()))?;

        let file: RigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        for (name, entry) in file.devices {
            let spec = match entry {
                DeviceEntry::Binary { channel } => DeviceSpec {
                    name: name.clone(),
                    channel,
                    output: OutputKind::Binary,
                },
                DeviceEntry::Continuous {
                    channel,
                    range,
                    bias,
                } => DeviceSpec {
                    name: name.clone(),
                    channel,
                    output: OutputKind::Continuous {
                        range: Range {
                            min: range.min,
                            max: range.max,
                        },
                        bias,
                    },
                },
            };
            debug!("  Device: {} | channel {} | {:?}", spec.name, spec.channel, spec.output);
            self.devices.insert(name, spec);
        }

        for (name, entry) in file.routines {
            let spec = match entry {
                RoutineEntry::Blink {
                    device,
                    tick_interval_ms,
                    step_ms,
                    toggles_per_tick,
                    duration_ms,
                } => RoutineSpec {
                    name: name.clone(),
                    device,
                    pattern: PatternSpec::Blink {
                        tick_interval: Duration::from_millis(tick_interval_ms),
                        step: Duration::from_millis(step_ms),
                        toggles_per_tick,
                        duration: duration_ms.map(Duration::from_millis),
                    },
                },
                RoutineEntry::Sweep {
                    device,
                    tick_interval_ms,
                    waypoints,
                    duration_ms,
                } => RoutineSpec {
                    name: name.clone(),
                    device,
                    pattern: PatternSpec::Sweep {
                        tick_interval: Duration::from_millis(tick_interval_ms),
                        waypoints: waypoints
                            .into_iter()
                            .map(|wp| Waypoint {
                                offset: Duration::from_millis(wp.offset_ms),
                                position: wp.position,
                            })
                            .collect(),
                        duration: duration_ms.map(Duration::from_millis),
                    },
                },
            };
            debug!("  Routine: {} → device '{}'", spec.name, spec.device);
            self.routines.insert(name, spec);
        }

        // Fallback: an empty rig file means "give me the demo bench"
        if self.devices.is_empty() && self.routines.is_empty() {
            warn!("No devices or routines in rig file, using the built-in demo rig");
            *self = Self::demo_rig();
            return Ok(());
        }

        self.validate()?;
        self.loaded = true;

        info!(
            "Successfully loaded rig: {} device(s), {} routine(s)",
            self.devices.len(),
            self.routines.len()
        );
        for routine in self.routines.values() {
            info!("  Routine: {} → device '{}'", routine.name, routine.device);
        }

        Ok(())
    }

    /// Cross-checks the parsed rig before anything is built from it.
    fn validate(&self) -> Result<()> {
        for device in self.devices.values() {
            if let OutputKind::Continuous { range, bias } = &device.output {
                ensure!(
                    range.min.is_finite() && range.max.is_finite() && range.min <= range.max,
                    "device '{}': invalid range {}..{}",
                    device.name,
                    range.min,
                    range.max
                );
                ensure!(
                    bias.is_finite(),
                    "device '{}': bias must be finite, got {}",
                    device.name,
                    bias
                );
            }
        }

        for routine in self.routines.values() {
            let Some(device) = self.devices.get(&routine.device) else {
                bail!(
                    "routine '{}' references unknown device '{}'",
                    routine.name,
                    routine.device
                );
            };

            match &routine.pattern {
                PatternSpec::Blink {
                    tick_interval,
                    toggles_per_tick,
                    ..
                } => {
                    ensure!(
                        matches!(device.output, OutputKind::Binary),
                        "routine '{}' is a blink but device '{}' is not a binary output",
                        routine.name,
                        device.name
                    );
                    ensure!(
                        !tick_interval.is_zero(),
                        "routine '{}': tick_interval_ms must be > 0",
                        routine.name
                    );
                    ensure!(
                        *toggles_per_tick >= 1,
                        "routine '{}': toggles_per_tick must be >= 1",
                        routine.name
                    );
                }
                PatternSpec::Sweep {
                    tick_interval,
                    waypoints,
                    ..
                } => {
                    ensure!(
                        matches!(device.output, OutputKind::Continuous { .. }),
                        "routine '{}' is a sweep but device '{}' is not a continuous output",
                        routine.name,
                        device.name
                    );
                    ensure!(
                        !tick_interval.is_zero(),
                        "routine '{}': tick_interval_ms must be > 0",
                        routine.name
                    );
                    ensure!(
                        !waypoints.is_empty(),
                        "routine '{}': waypoints must not be empty",
                        routine.name
                    );
                    for (i, wp) in waypoints.iter().enumerate() {
                        ensure!(
                            wp.position.is_finite(),
                            "routine '{}': waypoint {} position must be finite, got {}",
                            routine.name,
                            i,
                            wp.position
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Returns the [`DeviceSpec`] for `name`, if the rig has one.
    pub fn device(&self, name: &str) -> Option<&DeviceSpec> {
        self.devices.get(name)
    }

    /// Returns the full map of devices on the rig.
    pub fn devices(&self) -> &HashMap<String, DeviceSpec> {
        &self.devices
    }

    /// Returns the full map of routines on the rig.
    pub fn routines(&self) -> &HashMap<String, RoutineSpec> {
        &self.routines
    }

    /// Returns `true` after a successful load (or for the demo rig).
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
