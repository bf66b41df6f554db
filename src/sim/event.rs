use std::fmt;

use serde::Serialize;

use crate::mission::state::{FlightState, Position};

// ---------------------------------------------------------------------------
// Mission events
// ---------------------------------------------------------------------------

/// Kinds of mission events.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Transition { from: FlightState, to: FlightState },
    WaypointCommanded { remaining: usize },
    Altitude { altitude: f64, ascending: bool },
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Transition { from, to } => write!(f, "{from} -> {to}"),
            EventKind::WaypointCommanded { remaining } => {
                write!(f, "waypoint commanded ({remaining} left)")
            }
            EventKind::Altitude { altitude, ascending } => write!(
                f,
                "altitude {:.2} m ({})",
                altitude,
                if *ascending { "ascending" } else { "descending" }
            ),
        }
    }
}

/// A discrete event observed during a mission run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionEvent {
    pub time: f64,
    pub description: String,
    pub north: f64,
    pub east: f64,
    pub altitude: f64,
}

impl MissionEvent {
    pub fn new(time: f64, kind: &EventKind, position: &Position) -> Self {
        Self {
            time,
            description: kind.to_string(),
            north: position.north(),
            east: position.east(),
            altitude: position.altitude(),
        }
    }
}

/// What detectors get to look at after each telemetry frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub time: f64,
    pub state: FlightState,
    pub position: Position,
    pub pending: usize,
}

/// Trait for passive event detectors.
/// Implementations compare consecutive snapshots and report events.
pub trait EventDetector {
    fn check(&mut self, prev: &Snapshot, current: &Snapshot) -> Option<EventKind>;
}

/// Reports every flight-state change.
pub struct TransitionDetector;

impl EventDetector for TransitionDetector {
    fn check(&mut self, prev: &Snapshot, current: &Snapshot) -> Option<EventKind> {
        (prev.state != current.state)
            .then_some(EventKind::Transition { from: prev.state, to: current.state })
    }
}

/// Reports each waypoint popped off the queue.
pub struct WaypointDetector;

impl EventDetector for WaypointDetector {
    fn check(&mut self, prev: &Snapshot, current: &Snapshot) -> Option<EventKind> {
        let entered = prev.state != FlightState::Waypoint && current.state == FlightState::Waypoint;
        let popped = current.state == FlightState::Waypoint && current.pending < prev.pending;
        (entered || popped).then_some(EventKind::WaypointCommanded { remaining: current.pending })
    }
}

/// Detects when altitude crosses a threshold (ascending or descending).
pub struct AltitudeDetector {
    pub altitude: f64,
    pub ascending: bool,
    fired: bool,
}

impl AltitudeDetector {
    pub fn new(altitude: f64, ascending: bool) -> Self {
        Self { altitude, ascending, fired: false }
    }
}

impl EventDetector for AltitudeDetector {
    fn check(&mut self, prev: &Snapshot, current: &Snapshot) -> Option<EventKind> {
        if self.fired {
            return None;
        }
        let (was, now) = (prev.position.altitude(), current.position.altitude());
        let crossed = if self.ascending {
            was < self.altitude && now >= self.altitude
        } else {
            was > self.altitude && now <= self.altitude
        };
        if crossed {
            self.fired = true;
            Some(EventKind::Altitude { altitude: self.altitude, ascending: self.ascending })
        } else {
            None
        }
    }
}
