//! Error types for the mission state machine.
//!
//! Neither kind is fatal: the machine keeps its current state and waits for
//! the next valid event.

use thiserror::Error;

use super::state::FlightState;

/// Errors raised by transition methods and telemetry handlers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MissionError {
    /// A transition was requested while its guard was false.
    #[error("cannot {transition} in {state}: {reason}")]
    Precondition {
        transition: &'static str,
        state: FlightState,
        reason: &'static str,
    },

    /// A telemetry vector carried a NaN or infinite component.
    #[error("malformed {kind} telemetry: non-finite component")]
    MalformedTelemetry { kind: &'static str },
}

/// Result type for mission operations.
pub type MissionResult<T> = Result<T, MissionError>;
