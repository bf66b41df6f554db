use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::mission::state::FlightState;
use crate::sim::event::MissionEvent;
use crate::sim::runner::RunLog;

/// Summary of one mission run, written as the JSON flight report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionSummary {
    pub link: String,
    pub completed: bool,
    pub aborted: bool,
    pub final_state: String,
    pub flight_time_s: f64,
    pub max_altitude_m: f64,
    pub waypoints_commanded: usize,
    pub commands_issued: usize,
    pub commands_rejected: usize,
    pub telemetry_frames: usize,
    pub malformed_frames: usize,
    pub events: Vec<MissionEvent>,
}

impl MissionSummary {
    pub fn from_log(log: &RunLog, link: &str, state: FlightState, completed: bool) -> Self {
        Self {
            link: link.to_string(),
            completed,
            aborted: log.aborted,
            final_state: state.to_string(),
            flight_time_s: log.flight_time(),
            max_altitude_m: log.max_altitude,
            waypoints_commanded: log.waypoints_commanded(),
            commands_issued: log.commands.len(),
            commands_rejected: log.rejected_commands,
            telemetry_frames: log.frames,
            malformed_frames: log.malformed_frames,
            events: log.events.clone(),
        }
    }
}

/// Write the summary as pretty-printed JSON.
pub fn write_summary<W: Write>(writer: &mut W, summary: &MissionSummary) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(&mut *writer, summary)?;
    writeln!(writer).map_err(serde_json::Error::io)
}

/// Write the summary JSON to a file.
pub fn write_summary_file(path: impl AsRef<Path>, summary: &MissionSummary) -> io::Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    write_summary(&mut file, summary)?;
    file.flush()
}
