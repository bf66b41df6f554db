use std::collections::VecDeque;
use std::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Local frame vectors
// ---------------------------------------------------------------------------

/// Position in the local tangent frame, relative to home.
/// Frame: North-East-Up (NEU), so `z` is altitude, positive up.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position(pub Vector3<f64>);

impl Position {
    pub fn new(north: f64, east: f64, up: f64) -> Self {
        Self(Vector3::new(north, east, up))
    }

    pub fn north(&self) -> f64 {
        self.0.x
    }

    pub fn east(&self) -> f64 {
        self.0.y
    }

    pub fn altitude(&self) -> f64 {
        self.0.z
    }

    /// Distance in the horizontal plane only; altitude is ignored.
    pub fn horizontal_distance(&self, other: &Position) -> f64 {
        (self.0.xy() - other.0.xy()).norm()
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|c| c.is_finite())
    }
}

/// Velocity in the local NEU frame, m/s.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity(pub Vector3<f64>);

impl Velocity {
    pub fn new(north: f64, east: f64, up: f64) -> Self {
        Self(Vector3::new(north, east, up))
    }

    pub fn horizontal_speed(&self) -> f64 {
        self.0.xy().norm()
    }

    /// Climb rate, positive up.
    pub fn vertical_speed(&self) -> f64 {
        self.0.z
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|c| c.is_finite())
    }
}

/// Geodetic position as reported by the vehicle (degrees, metres).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GlobalPosition {
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f64,
}

impl GlobalPosition {
    pub fn new(longitude: f64, latitude: f64, altitude: f64) -> Self {
        Self { longitude, latitude, altitude }
    }

    pub fn is_finite(&self) -> bool {
        self.longitude.is_finite() && self.latitude.is_finite() && self.altitude.is_finite()
    }
}

// ---------------------------------------------------------------------------
// Flight state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FlightState {
    #[default]
    Manual,
    Arming,
    Takeoff,
    Waypoint,
    Landing,
    Disarming,
}

impl FlightState {
    pub const ALL: [FlightState; 6] = [
        FlightState::Manual,
        FlightState::Arming,
        FlightState::Takeoff,
        FlightState::Waypoint,
        FlightState::Landing,
        FlightState::Disarming,
    ];

    /// Whether `self -> next` is one of the mission edges.
    /// Abort (any state to `Manual`) is always allowed.
    pub fn can_transition_to(self, next: FlightState) -> bool {
        use FlightState::*;
        match (self, next) {
            (_, Manual) => true,
            (Manual, Arming) => true,
            (Arming, Takeoff) => true,
            (Takeoff, Waypoint) => true,
            (Waypoint, Waypoint) => true,
            (Waypoint, Landing) => true,
            (Landing, Disarming) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FlightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlightState::Manual => "MANUAL",
            FlightState::Arming => "ARMING",
            FlightState::Takeoff => "TAKEOFF",
            FlightState::Waypoint => "WAYPOINT",
            FlightState::Landing => "LANDING",
            FlightState::Disarming => "DISARMING",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Mission context (owned by the state machine)
// ---------------------------------------------------------------------------

/// Height above the local origin still counted as "on the ground", m.
const LOCAL_GROUND_TOLERANCE: f64 = 0.01;

/// Everything the state machine knows about one mission run.
///
/// Only `MissionStateMachine` mutates this; callers get a shared view.
#[derive(Debug, Clone, Default)]
pub struct MissionContext {
    pub flight_state: FlightState,
    /// Commanded destination. Meaningful in `Takeoff` and `Waypoint`.
    pub target_position: Position,
    pub pending_waypoints: VecDeque<Position>,
    pub mission_active: bool,

    pub last_known_position: Position,
    pub last_known_velocity: Velocity,
    pub last_known_global: Option<GlobalPosition>,
    /// Home point recorded at arming.
    pub home: Option<GlobalPosition>,
    pub is_armed: bool,
    pub is_guided: bool,
}

impl MissionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the vehicle sits at home altitude, within `tolerance` metres
    /// globally and 1 cm locally. Needs both a global fix and a recorded home.
    pub fn is_on_ground(&self, tolerance: f64) -> bool {
        match (self.last_known_global, self.home) {
            (Some(global), Some(home)) => {
                global.altitude - home.altitude < tolerance
                    && self.last_known_position.altitude().abs() < LOCAL_GROUND_TOLERANCE
            }
            _ => false,
        }
    }
}
