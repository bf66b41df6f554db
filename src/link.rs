//! Boundary between the mission core and whatever talks to the vehicle.
//!
//! A link delivers telemetry one frame at a time and accepts fire-and-forget
//! commands. The core never waits for an acknowledgement and never retries a
//! command the link refused; state updates are optimistic and only corrected
//! by later telemetry.

use std::fmt;

use thiserror::Error;

use crate::mission::state::{GlobalPosition, Position, Velocity};

// ---------------------------------------------------------------------------
// Inbound telemetry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetryEvent {
    Position(Position),
    Velocity(Velocity),
    GlobalPosition(GlobalPosition),
    Status { armed: bool, guided: bool },
}

impl TelemetryEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryEvent::Position(_) => "position",
            TelemetryEvent::Velocity(_) => "velocity",
            TelemetryEvent::GlobalPosition(_) => "global_position",
            TelemetryEvent::Status { .. } => "status",
        }
    }
}

/// A telemetry event stamped with link time, s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub time: f64,
    pub event: TelemetryEvent,
}

// ---------------------------------------------------------------------------
// Outbound commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    TakeControl,
    ReleaseControl,
    Arm,
    Disarm,
    SetHome(GlobalPosition),
    Takeoff { altitude: f64 },
    /// Fly to a local position. Heading in radians, 0 = north.
    Goto { target: Position, heading: f64 },
    Land,
    /// Tear down the connection and end the run.
    Stop,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::TakeControl => "take_control",
            Command::ReleaseControl => "release_control",
            Command::Arm => "arm",
            Command::Disarm => "disarm",
            Command::SetHome(_) => "set_home",
            Command::Takeoff { .. } => "takeoff",
            Command::Goto { .. } => "goto",
            Command::Land => "land",
            Command::Stop => "stop",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::TakeControl => write!(f, "take_control"),
            Command::ReleaseControl => write!(f, "release_control"),
            Command::Arm => write!(f, "arm"),
            Command::Disarm => write!(f, "disarm"),
            Command::SetHome(g) => write!(
                f,
                "set_home({:.7}, {:.7}, {:.2})",
                g.longitude, g.latitude, g.altitude
            ),
            Command::Takeoff { altitude } => write!(f, "takeoff({altitude:.2})"),
            Command::Goto { target, heading } => write!(
                f,
                "goto({:.2}, {:.2}, {:.2}, {:.2})",
                target.north(),
                target.east(),
                target.altitude(),
                heading
            ),
            Command::Land => write!(f, "land"),
            Command::Stop => write!(f, "stop"),
        }
    }
}

// ---------------------------------------------------------------------------
// Link trait
// ---------------------------------------------------------------------------

/// Failures a link may report when handed a command.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("vehicle rejected {command}")]
    Rejected { command: String },

    #[error("link disconnected")]
    Disconnected,
}

/// Trait for vehicle links.
///
/// Implement this to fly the mission against a real autopilot connection
/// or a simulator. Events are pulled one at a time, which keeps all mission
/// handlers serialized even when the link has several telemetry sources.
pub trait VehicleLink {
    /// Next telemetry frame, or `None` once the link is closed.
    fn next_telemetry(&mut self) -> Option<Telemetry>;

    fn take_control(&mut self) -> Result<(), LinkError>;
    fn release_control(&mut self) -> Result<(), LinkError>;
    fn arm(&mut self) -> Result<(), LinkError>;
    fn disarm(&mut self) -> Result<(), LinkError>;
    fn set_home(&mut self, home: GlobalPosition) -> Result<(), LinkError>;
    fn takeoff(&mut self, altitude: f64) -> Result<(), LinkError>;
    fn goto_position(
        &mut self,
        north: f64,
        east: f64,
        altitude: f64,
        heading: f64,
    ) -> Result<(), LinkError>;
    fn land(&mut self) -> Result<(), LinkError>;
    fn stop(&mut self) -> Result<(), LinkError>;

    /// Route a [`Command`] to the matching method.
    fn send(&mut self, command: &Command) -> Result<(), LinkError> {
        match *command {
            Command::TakeControl => self.take_control(),
            Command::ReleaseControl => self.release_control(),
            Command::Arm => self.arm(),
            Command::Disarm => self.disarm(),
            Command::SetHome(home) => self.set_home(home),
            Command::Takeoff { altitude } => self.takeoff(altitude),
            Command::Goto { target, heading } => {
                self.goto_position(target.north(), target.east(), target.altitude(), heading)
            }
            Command::Land => self.land(),
            Command::Stop => self.stop(),
        }
    }

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Link that only remembers which method was hit.
    #[derive(Default)]
    struct Tally {
        calls: Vec<String>,
    }

    impl VehicleLink for Tally {
        fn next_telemetry(&mut self) -> Option<Telemetry> {
            None
        }
        fn take_control(&mut self) -> Result<(), LinkError> {
            self.calls.push("take_control".into());
            Ok(())
        }
        fn release_control(&mut self) -> Result<(), LinkError> {
            self.calls.push("release_control".into());
            Ok(())
        }
        fn arm(&mut self) -> Result<(), LinkError> {
            self.calls.push("arm".into());
            Ok(())
        }
        fn disarm(&mut self) -> Result<(), LinkError> {
            Err(LinkError::Rejected { command: "disarm".into() })
        }
        fn set_home(&mut self, _home: GlobalPosition) -> Result<(), LinkError> {
            self.calls.push("set_home".into());
            Ok(())
        }
        fn takeoff(&mut self, altitude: f64) -> Result<(), LinkError> {
            self.calls.push(format!("takeoff {altitude}"));
            Ok(())
        }
        fn goto_position(
            &mut self,
            north: f64,
            east: f64,
            altitude: f64,
            _heading: f64,
        ) -> Result<(), LinkError> {
            self.calls.push(format!("goto {north} {east} {altitude}"));
            Ok(())
        }
        fn land(&mut self) -> Result<(), LinkError> {
            self.calls.push("land".into());
            Ok(())
        }
        fn stop(&mut self) -> Result<(), LinkError> {
            Err(LinkError::Disconnected)
        }
    }

    #[test]
    fn send_routes_to_methods() {
        let mut link = Tally::default();
        link.send(&Command::Takeoff { altitude: 3.0 }).unwrap();
        link.send(&Command::Goto { target: Position::new(5.0, 0.0, 3.0), heading: 0.0 })
            .unwrap();
        link.send(&Command::Land).unwrap();
        assert_eq!(link.calls, vec!["takeoff 3", "goto 5 0 3", "land"]);
    }

    #[test]
    fn send_surfaces_link_errors() {
        let mut link = Tally::default();
        assert_eq!(
            link.send(&Command::Disarm),
            Err(LinkError::Rejected { command: "disarm".into() })
        );
        assert_eq!(link.send(&Command::Stop), Err(LinkError::Disconnected));
        assert_eq!(link.name(), "unnamed");
    }

    #[test]
    fn command_display_is_readable() {
        let cmd = Command::Goto { target: Position::new(5.0, 0.0, 3.0), heading: 0.0 };
        assert_eq!(cmd.to_string(), "goto(5.00, 0.00, 3.00, 0.00)");
        assert_eq!(Command::Takeoff { altitude: 3.0 }.to_string(), "takeoff(3.00)");
    }
}
