pub mod state;
pub mod path;
pub mod machine;
pub mod error;

pub use state::{FlightState, GlobalPosition, MissionContext, Position, Velocity};
pub use path::{box_path, BOX_OFFSETS, BOX_SIDE};
pub use machine::MissionStateMachine;
pub use error::{MissionError, MissionResult};
