//! Mission and simulator configuration.
//!
//! Defaults reproduce the reference box mission: 3 m cruise altitude,
//! 1 m arrival radius, 1 m/s stop speed. Any field may be overridden from a
//! TOML file with `[mission]` and `[sim]` tables.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mission::state::GlobalPosition;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Mission thresholds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    pub cruise_altitude: f64,      // m, takeoff and waypoint altitude
    pub climb_fraction: f64,       // share of cruise altitude that ends takeoff
    pub proximity_threshold: f64,  // m, horizontal arrival radius
    pub stop_speed_threshold: f64, // m/s, horizontal speed allowed before landing
    pub heading: f64,              // rad, heading sent with every goto
    /// Also require a touchdown fix (home altitude, zero height) before disarm.
    pub require_touchdown: bool,
    pub touchdown_altitude: f64,   // m above home still counted as landed
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            cruise_altitude: 3.0,
            climb_fraction: 0.95,
            proximity_threshold: 1.0,
            stop_speed_threshold: 1.0,
            heading: 0.0,
            require_touchdown: false,
            touchdown_altitude: 0.1,
        }
    }
}

impl MissionConfig {
    /// Altitude at which takeoff is considered complete.
    pub fn climb_altitude(&self) -> f64 {
        self.climb_fraction * self.cruise_altitude
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("mission.cruise_altitude", self.cruise_altitude)?;
        positive("mission.proximity_threshold", self.proximity_threshold)?;
        positive("mission.stop_speed_threshold", self.stop_speed_threshold)?;
        positive("mission.touchdown_altitude", self.touchdown_altitude)?;
        if !(self.climb_fraction > 0.0 && self.climb_fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "mission.climb_fraction must be in (0, 1], got {}",
                self.climb_fraction
            )));
        }
        if !self.heading.is_finite() {
            return Err(ConfigError::Invalid("mission.heading must be finite".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Simulated vehicle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub dt: f64,                     // integration timestep, s
    pub max_time: f64,               // hard stop, s
    pub status_interval: u32,        // steps between status frames
    pub handover_time: f64,          // s until the pilot switches to guided
    pub max_horizontal_speed: f64,   // m/s
    pub max_climb_rate: f64,         // m/s
    pub max_descent_rate: f64,       // m/s
    pub position_gain: f64,          // 1/s, position error to velocity demand
    pub velocity_time_constant: f64, // s, first-order velocity response
    pub auto_disarm_delay: f64,      // s on the ground before the autopilot disarms
    pub home: GlobalPosition,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dt: 0.05,         // 20 Hz telemetry
            max_time: 300.0,  // 5 min ceiling
            status_interval: 10,
            handover_time: 0.5,
            max_horizontal_speed: 3.0,
            max_climb_rate: 1.5,
            max_descent_rate: 0.7,
            position_gain: 1.0,
            velocity_time_constant: 0.25,
            auto_disarm_delay: 1.0,
            home: GlobalPosition::new(-122.397_450, 37.792_480, 0.0),
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("sim.dt", self.dt)?;
        positive("sim.max_time", self.max_time)?;
        positive("sim.max_horizontal_speed", self.max_horizontal_speed)?;
        positive("sim.max_climb_rate", self.max_climb_rate)?;
        positive("sim.max_descent_rate", self.max_descent_rate)?;
        positive("sim.position_gain", self.position_gain)?;
        positive("sim.velocity_time_constant", self.velocity_time_constant)?;
        if self.status_interval == 0 {
            return Err(ConfigError::Invalid("sim.status_interval must be at least 1".into()));
        }
        if !(self.handover_time >= 0.0 && self.auto_disarm_delay >= 0.0) {
            return Err(ConfigError::Invalid(
                "sim.handover_time and sim.auto_disarm_delay must be non-negative".into(),
            ));
        }
        if !self.home.is_finite() {
            return Err(ConfigError::Invalid("sim.home must be finite".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mission: MissionConfig,
    pub sim: SimConfig,
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.mission.validate()?;
        config.sim.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

fn positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} must be positive and finite, got {value}")))
    }
}
