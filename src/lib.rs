pub mod config;
pub mod io;
pub mod link;
pub mod logging;
pub mod mission;
pub mod sim;

pub use config::{Config, ConfigError, MissionConfig, SimConfig};
pub use link::{Command, LinkError, Telemetry, TelemetryEvent, VehicleLink};
pub use mission::{
    box_path, FlightState, GlobalPosition, MissionContext, MissionError, MissionResult,
    MissionStateMachine, Position, Velocity,
};
pub use sim::{MissionRunner, SimVehicle};
