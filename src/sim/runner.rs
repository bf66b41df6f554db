use std::io::{self, Write};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::MissionConfig;
use crate::io::csv::TelemetryRecorder;
use crate::io::json::MissionSummary;
use crate::link::{Command, TelemetryEvent, VehicleLink};
use crate::mission::error::MissionError;
use crate::mission::machine::MissionStateMachine;
use crate::mission::state::{FlightState, Position};
use super::event::{
    AltitudeDetector, EventDetector, MissionEvent, Snapshot, TransitionDetector, WaypointDetector,
};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Mission(#[from] MissionError),

    #[error("navigation log: {0}")]
    Io(#[from] io::Error),
}

pub type RunnerResult<T> = Result<T, RunnerError>;

// ---------------------------------------------------------------------------
// Run log
// ---------------------------------------------------------------------------

/// A command as handed to the link, and whether the link took it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandRecord {
    pub time: f64,
    pub command: String,
    pub accepted: bool,
}

/// One local position fix, tagged with the state the machine was in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub time: f64,
    pub position: Position,
    pub state: FlightState,
}

/// Everything observed during one mission run.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    pub events: Vec<MissionEvent>,
    pub commands: Vec<CommandRecord>,
    pub track: Vec<TrackPoint>,
    pub frames: usize,
    pub malformed_frames: usize,
    pub rejected_commands: usize,
    pub max_altitude: f64,
    /// Set once the machine reaches `Disarming`.
    pub disarmed: bool,
    pub aborted: bool,
}

impl RunLog {
    /// Gotos issued, which is one per waypoint flown.
    pub fn waypoints_commanded(&self) -> usize {
        self.commands.iter().filter(|c| c.command.starts_with("goto")).count()
    }

    /// Time from the takeoff command to the disarm command (or the last
    /// frame, if the vehicle never got that far). Zero without a takeoff.
    pub fn flight_time(&self) -> f64 {
        let at = |prefix: &str| {
            self.commands.iter().find(|c| c.command.starts_with(prefix)).map(|c| c.time)
        };
        let Some(start) = at("takeoff") else {
            return 0.0;
        };
        let end = at("disarm")
            .or_else(|| self.track.last().map(|p| p.time))
            .unwrap_or(start);
        (end - start).max(0.0)
    }
}

// ---------------------------------------------------------------------------
// Mission runner
// ---------------------------------------------------------------------------

/// Pumps telemetry from a link through the mission state machine and hands
/// the resulting commands back to the link, one frame at a time.
///
/// Link failures are logged and counted, never retried: the machine has
/// already moved on optimistically and later telemetry is the only
/// correction.
pub struct MissionRunner<L: VehicleLink> {
    link: L,
    machine: MissionStateMachine,
    recorder: Option<TelemetryRecorder<Box<dyn Write>>>,
    detectors: Vec<Box<dyn EventDetector>>,
    log: RunLog,
    last: Option<Snapshot>,
    time: f64,
    stopped: bool,
}

impl<L: VehicleLink> MissionRunner<L> {
    pub fn new(link: L, config: MissionConfig) -> Self {
        let detectors: Vec<Box<dyn EventDetector>> = vec![
            Box::new(TransitionDetector),
            Box::new(WaypointDetector),
            Box::new(AltitudeDetector::new(config.climb_altitude(), true)),
            Box::new(AltitudeDetector::new(config.touchdown_altitude, false)),
        ];
        Self {
            link,
            machine: MissionStateMachine::new(config),
            recorder: None,
            detectors,
            log: RunLog::default(),
            last: None,
            time: 0.0,
            stopped: false,
        }
    }

    /// Record every frame and command to a CSV navigation log.
    pub fn with_recorder<W: Write + 'static>(mut self, writer: W) -> io::Result<Self> {
        let boxed: Box<dyn Write> = Box::new(writer);
        self.recorder = Some(TelemetryRecorder::new(boxed)?);
        Ok(self)
    }

    pub fn machine(&self) -> &MissionStateMachine {
        &self.machine
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    pub fn track(&self) -> &[TrackPoint] {
        &self.log.track
    }

    /// Finished by landing, not by abort.
    pub fn mission_complete(&self) -> bool {
        self.log.disarmed && !self.log.aborted && self.machine.mission_complete()
    }

    pub fn summary(&self) -> MissionSummary {
        MissionSummary::from_log(
            &self.log,
            self.link.name(),
            self.machine.state(),
            self.mission_complete(),
        )
    }

    /// Arm the mission; nothing is commanded until telemetry says so.
    pub fn begin(&mut self) -> RunnerResult<()> {
        self.machine.start_mission()?;
        info!(link = self.link.name(), "mission begins");
        self.last = Some(self.snapshot());
        Ok(())
    }

    /// Process one telemetry frame. Returns `false` once the link is closed
    /// or the mission has sent `Stop`.
    pub fn step(&mut self) -> RunnerResult<bool> {
        if self.stopped {
            return Ok(false);
        }
        let Some(frame) = self.link.next_telemetry() else {
            debug!(time = self.time, "link closed");
            return Ok(false);
        };
        self.time = frame.time;
        self.log.frames += 1;
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record_telemetry(&frame)?;
        }

        let dispatched = match self.machine.handle(frame.event) {
            Ok(commands) => self.dispatch(&commands),
            Err(MissionError::MalformedTelemetry { .. }) => {
                self.log.malformed_frames += 1;
                Ok(())
            }
            Err(err) => return Err(err.into()),
        };
        self.observe(matches!(frame.event, TelemetryEvent::Position(_)));
        dispatched?;
        Ok(!self.stopped)
    }

    /// Run to completion (or until the link closes) and summarize.
    pub fn run(&mut self) -> RunnerResult<MissionSummary> {
        self.begin()?;
        while self.step()? {}
        if !self.mission_complete() {
            warn!(state = %self.machine.state(), time = self.time, "run ended before mission completed");
        }
        self.flush()?;
        Ok(self.summary())
    }

    /// Drop back to manual and release the vehicle.
    pub fn abort(&mut self) -> RunnerResult<()> {
        let commands = self.machine.abort_to_manual();
        if !commands.is_empty() {
            self.log.aborted = true;
        }
        let dispatched = self.dispatch(&commands);
        self.observe(false);
        dispatched?;
        self.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.recorder.take() {
            Some(recorder) => recorder.finish().map(drop),
            None => Ok(()),
        }
    }

    /// Every command in the batch reaches the link before a navigation log
    /// failure is reported; the machine has already moved on.
    fn dispatch(&mut self, commands: &[Command]) -> io::Result<()> {
        let mut log_error = None;
        for command in commands {
            debug!(link = self.link.name(), %command, "dispatch");
            let accepted = match self.link.send(command) {
                Ok(()) => true,
                Err(err) => {
                    warn!(%command, %err, "link refused command");
                    self.log.rejected_commands += 1;
                    false
                }
            };
            self.log.commands.push(CommandRecord {
                time: self.time,
                command: command.to_string(),
                accepted,
            });
            if matches!(command, Command::Stop) {
                self.stopped = true;
            }
            if let Some(recorder) = self.recorder.as_mut() {
                if let Err(err) = recorder.record_command(self.time, command) {
                    warn!(%command, %err, "navigation log write failed");
                    log_error.get_or_insert(err);
                }
            }
        }
        log_error.map_or(Ok(()), Err)
    }

    fn snapshot(&self) -> Snapshot {
        let ctx = self.machine.context();
        Snapshot {
            time: self.time,
            state: ctx.flight_state,
            position: ctx.last_known_position,
            pending: ctx.pending_waypoints.len(),
        }
    }

    fn observe(&mut self, position_fix: bool) {
        let current = self.snapshot();
        if let Some(prev) = self.last {
            for detector in self.detectors.iter_mut() {
                if let Some(kind) = detector.check(&prev, &current) {
                    info!(time = current.time, event = %kind, "mission event");
                    self.log.events.push(MissionEvent::new(current.time, &kind, &current.position));
                }
            }
        }
        if current.state == FlightState::Disarming {
            self.log.disarmed = true;
        }
        if position_fix {
            self.log.max_altitude = self.log.max_altitude.max(current.position.altitude());
            self.log.track.push(TrackPoint {
                time: current.time,
                position: current.position,
                state: current.state,
            });
        }
        self.last = Some(current);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use crate::config::SimConfig;
    use crate::link::{LinkError, Telemetry};
    use crate::mission::state::GlobalPosition;
    use crate::sim::vehicle::SimVehicle;

    fn sitl_runner(sim: SimConfig) -> MissionRunner<SimVehicle> {
        MissionRunner::new(SimVehicle::new(sim).unwrap(), MissionConfig::default())
    }

    fn count_events(log: &RunLog, needle: &str) -> usize {
        log.events.iter().filter(|e| e.description.contains(needle)).count()
    }

    #[test]
    fn sitl_box_mission_completes() {
        let mut runner = sitl_runner(SimConfig::default());
        let summary = runner.run().unwrap();

        assert!(summary.completed, "ended in {}", summary.final_state);
        assert_eq!(runner.machine().state(), FlightState::Disarming);
        assert_eq!(summary.waypoints_commanded, 12);
        assert_eq!(summary.commands_rejected, 0);
        assert!(summary.max_altitude_m > 2.85 && summary.max_altitude_m < 3.2);
        assert!(summary.flight_time_s > 10.0 && summary.flight_time_s < 200.0);

        let log = runner.log();
        assert_eq!(count_events(log, " -> "), 5);
        assert_eq!(count_events(log, "waypoint commanded"), 12);
        assert_eq!(count_events(log, "ascending"), 1);
        assert_eq!(count_events(log, "descending"), 1);

        let last: Vec<&str> = log.commands.iter().rev().take(3).map(|c| c.command.as_str()).collect();
        assert_eq!(last, vec!["stop", "release_control", "disarm"]);

        let vehicle = runner.into_link();
        assert!(vehicle.is_stopped());
        assert!(!vehicle.is_armed());
        assert!(vehicle.state().pos.z.abs() < 0.01);
    }

    #[test]
    fn sitl_track_stays_near_the_box() {
        let mut runner = sitl_runner(SimConfig::default());
        runner.run().unwrap();
        for p in runner.track() {
            let n = p.position.north();
            let e = p.position.east();
            assert!(n > -2.0 && n < 17.0 && e > -2.0 && e < 17.0, "strayed to ({n}, {e})");
        }
    }

    #[test]
    fn abort_mid_flight_releases_vehicle() {
        let mut runner = sitl_runner(SimConfig::default());
        runner.begin().unwrap();
        while runner.machine().state() != FlightState::Waypoint {
            assert!(runner.step().unwrap());
        }
        runner.abort().unwrap();

        assert_eq!(runner.machine().state(), FlightState::Manual);
        assert!(!runner.mission_complete());
        assert!(!runner.step().unwrap());

        let cmds: Vec<&str> =
            runner.log().commands.iter().rev().take(2).map(|c| c.command.as_str()).collect();
        assert_eq!(cmds, vec!["stop", "release_control"]);
        assert!(runner.link().is_stopped());
        assert!(!runner.summary().completed);
    }

    #[test]
    fn stalled_vehicle_times_out_in_manual() {
        let sim = SimConfig { handover_time: 1_000.0, max_time: 5.0, ..SimConfig::default() };
        let mut runner = sitl_runner(sim);
        let summary = runner.run().unwrap();
        assert!(!summary.completed);
        assert_eq!(summary.final_state, "MANUAL");
        assert!(runner.log().commands.is_empty());
        assert!(runner.log().frames > 300);
    }

    #[test]
    fn not_complete_before_flying() {
        let mut runner = sitl_runner(SimConfig::default());
        assert!(!runner.mission_complete());
        runner.begin().unwrap();
        assert!(!runner.mission_complete());
        assert!(!runner.summary().completed);
    }

    #[test]
    fn abort_after_landing_changes_nothing() {
        let mut runner = sitl_runner(SimConfig::default());
        runner.run().unwrap();
        let sent = runner.log().commands.len();
        runner.abort().unwrap();

        assert_eq!(runner.log().commands.len(), sent);
        assert_eq!(runner.log().rejected_commands, 0);
        assert!(runner.mission_complete());
        assert!(runner.summary().completed);
    }

    #[test]
    fn abort_before_arming_only_stops_link() {
        let mut runner = sitl_runner(SimConfig::default());
        runner.begin().unwrap();
        runner.step().unwrap();
        runner.abort().unwrap();

        let cmds: Vec<&str> = runner.log().commands.iter().map(|c| c.command.as_str()).collect();
        assert_eq!(cmds, vec!["stop"]);
        assert!(runner.link().is_stopped());
        assert!(!runner.mission_complete());
    }

    #[test]
    fn begin_twice_is_refused() {
        let mut runner = sitl_runner(SimConfig::default());
        runner.begin().unwrap();
        assert!(matches!(runner.begin(), Err(RunnerError::Mission(_))));
    }

    // -----------------------------------------------------------------------
    // Navigation log
    // -----------------------------------------------------------------------

    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn recorder_logs_frames_and_commands() {
        let buf = SharedBuf::default();
        let mut runner = sitl_runner(SimConfig::default()).with_recorder(buf.clone()).unwrap();
        runner.run().unwrap();

        let text = String::from_utf8(buf.0.borrow().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "time,source,kind,x,y,z,detail");
        assert_eq!(lines.iter().filter(|l| l.contains(",command,goto,")).count(), 12);
        assert_eq!(lines.iter().filter(|l| l.contains(",command,")).count(), runner.log().commands.len());
        assert_eq!(
            lines.iter().filter(|l| l.contains(",telemetry,")).count(),
            runner.log().frames
        );
        assert!(lines.last().unwrap().contains(",command,stop,"));
    }

    /// Accepts telemetry rows but fails any row naming a goto.
    #[derive(Default)]
    struct NoGotoRows {
        line: Vec<u8>,
    }

    impl Write for NoGotoRows {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.line.extend_from_slice(buf);
            if self.line.windows(4).any(|w| w == b"goto") {
                self.line.clear();
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            if let Some(end) = self.line.iter().rposition(|&b| b == b'\n') {
                self.line.drain(..=end);
            }
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn log_failure_still_reaches_the_link() {
        let mut runner =
            sitl_runner(SimConfig::default()).with_recorder(NoGotoRows::default()).unwrap();
        runner.begin().unwrap();
        let err = loop {
            match runner.step() {
                Ok(open) => assert!(open, "link closed before the first goto"),
                Err(err) => break err,
            }
        };
        assert!(matches!(err, RunnerError::Io(_)));
        assert_eq!(runner.machine().state(), FlightState::Waypoint);

        let goto = runner.log().commands.last().unwrap();
        assert!(goto.command.starts_with("goto") && goto.accepted);
        assert_eq!(count_events(runner.log(), "waypoint commanded"), 1);

        // The vehicle heads for the first corner despite the log failure.
        let start = runner.machine().context().target_position.north() - 5.0;
        for _ in 0..200 {
            let _ = runner.step();
        }
        assert!(runner.link().state().pos.x > start + 2.0);
    }

    // -----------------------------------------------------------------------
    // Scripted link
    // -----------------------------------------------------------------------

    /// Replays canned telemetry and refuses every command.
    struct Grumpy {
        script: VecDeque<Telemetry>,
        refused: Vec<&'static str>,
    }

    impl Grumpy {
        fn new(events: Vec<TelemetryEvent>) -> Self {
            let script = events
                .into_iter()
                .enumerate()
                .map(|(i, event)| Telemetry { time: i as f64 * 0.1, event })
                .collect();
            Self { script, refused: Vec::new() }
        }

        fn refuse(&mut self, name: &'static str) -> Result<(), LinkError> {
            self.refused.push(name);
            Err(LinkError::Rejected { command: name.into() })
        }
    }

    impl VehicleLink for Grumpy {
        fn next_telemetry(&mut self) -> Option<Telemetry> {
            self.script.pop_front()
        }
        fn take_control(&mut self) -> Result<(), LinkError> {
            self.refuse("take_control")
        }
        fn release_control(&mut self) -> Result<(), LinkError> {
            self.refuse("release_control")
        }
        fn arm(&mut self) -> Result<(), LinkError> {
            self.refuse("arm")
        }
        fn disarm(&mut self) -> Result<(), LinkError> {
            self.refuse("disarm")
        }
        fn set_home(&mut self, _home: GlobalPosition) -> Result<(), LinkError> {
            self.refuse("set_home")
        }
        fn takeoff(&mut self, _altitude: f64) -> Result<(), LinkError> {
            self.refuse("takeoff")
        }
        fn goto_position(&mut self, _n: f64, _e: f64, _a: f64, _h: f64) -> Result<(), LinkError> {
            self.refuse("goto")
        }
        fn land(&mut self) -> Result<(), LinkError> {
            self.refuse("land")
        }
        fn stop(&mut self) -> Result<(), LinkError> {
            self.refuse("stop")
        }
        fn name(&self) -> &str {
            "grumpy"
        }
    }

    #[test]
    fn refused_commands_are_counted_not_retried() {
        let link = Grumpy::new(vec![
            TelemetryEvent::GlobalPosition(GlobalPosition::new(-122.397_45, 37.792_48, 0.0)),
            TelemetryEvent::Position(Position::new(f64::NAN, 0.0, 0.0)),
            TelemetryEvent::Status { armed: false, guided: true },
            TelemetryEvent::Status { armed: false, guided: true },
            TelemetryEvent::Status { armed: true, guided: true },
        ]);
        let mut runner = MissionRunner::new(link, MissionConfig::default());
        let summary = runner.run().unwrap();

        // State moves on optimistically even though nothing was accepted.
        assert_eq!(runner.machine().state(), FlightState::Takeoff);
        assert_eq!(summary.link, "grumpy");
        assert_eq!(summary.commands_rejected, 4);
        assert_eq!(summary.malformed_frames, 1);
        assert_eq!(summary.telemetry_frames, 5);
        assert!(runner.log().commands.iter().all(|c| !c.accepted));
        assert_eq!(
            runner.into_link().refused,
            vec!["take_control", "arm", "set_home", "takeoff"]
        );
    }
}
