pub mod csv;
pub mod json;

pub use csv::TelemetryRecorder;
pub use json::{write_summary, write_summary_file, MissionSummary};
