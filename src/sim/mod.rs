pub mod dynamics;
pub mod integrator;
pub mod vehicle;
pub mod event;
pub mod runner;

pub use vehicle::SimVehicle;
pub use runner::{MissionRunner, RunLog, RunnerError, RunnerResult, TrackPoint};
pub use integrator::rk4_step;
