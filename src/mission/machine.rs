use tracing::{debug, info, trace, warn};

use crate::config::MissionConfig;
use crate::link::{Command, TelemetryEvent};
use super::error::{MissionError, MissionResult};
use super::path::box_path;
use super::state::{FlightState, GlobalPosition, MissionContext, Position, Velocity};

// ---------------------------------------------------------------------------
// Mission state machine
// ---------------------------------------------------------------------------

/// Event-driven mission controller.
///
/// Every handler and transition returns the commands it issued, so the
/// caller decides how (and whether) to hand them to the vehicle link. A
/// transition whose guard is false returns `MissionError::Precondition` and
/// leaves the context untouched.
#[derive(Debug, Clone)]
pub struct MissionStateMachine {
    ctx: MissionContext,
    config: MissionConfig,
}

impl Default for MissionStateMachine {
    fn default() -> Self {
        Self::new(MissionConfig::default())
    }
}

impl MissionStateMachine {
    pub fn new(config: MissionConfig) -> Self {
        Self { ctx: MissionContext::new(), config }
    }

    pub fn context(&self) -> &MissionContext {
        &self.ctx
    }

    pub fn config(&self) -> &MissionConfig {
        &self.config
    }

    pub fn state(&self) -> FlightState {
        self.ctx.flight_state
    }

    /// Inert and finished: no mission running and nothing left to command.
    pub fn mission_complete(&self) -> bool {
        !self.ctx.mission_active
            && matches!(self.ctx.flight_state, FlightState::Manual | FlightState::Disarming)
    }

    /// Declare arming intent. Telemetry drives everything after this.
    pub fn start_mission(&mut self) -> MissionResult<()> {
        if self.ctx.flight_state != FlightState::Manual {
            return Err(self.refuse("start mission", "vehicle is not in manual"));
        }
        if self.ctx.mission_active {
            return Err(self.refuse("start mission", "mission already active"));
        }
        // Fresh bookkeeping; the telemetry snapshot stays valid.
        self.ctx.pending_waypoints.clear();
        self.ctx.target_position = Position::default();
        self.ctx.home = None;
        self.ctx.mission_active = true;
        info!("mission started, waiting for guided mode");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Telemetry handlers
    // -----------------------------------------------------------------------

    /// Dispatch one telemetry event to its handler.
    pub fn handle(&mut self, event: TelemetryEvent) -> MissionResult<Vec<Command>> {
        trace!(kind = event.kind(), ?event, "telemetry");
        match event {
            TelemetryEvent::Position(p) => self.on_position_update(p),
            TelemetryEvent::Velocity(v) => self.on_velocity_update(v),
            TelemetryEvent::GlobalPosition(g) => self.on_global_position_update(g),
            TelemetryEvent::Status { armed, guided } => self.on_status_update(armed, guided),
        }
    }

    pub fn on_position_update(&mut self, position: Position) -> MissionResult<Vec<Command>> {
        if !position.is_finite() {
            return Err(malformed("position"));
        }
        self.ctx.last_known_position = position;
        if !self.ctx.mission_active {
            return Ok(Vec::new());
        }

        match self.ctx.flight_state {
            FlightState::Takeoff => {
                if self.climb_complete() {
                    return self.advance_to_waypoints();
                }
            }
            FlightState::Waypoint => {
                if self.target_reached() {
                    if !self.ctx.pending_waypoints.is_empty() {
                        return self.command_next_waypoint();
                    }
                    if self.stopped() {
                        return self.land();
                    }
                }
            }
            FlightState::Manual
            | FlightState::Arming
            | FlightState::Landing
            | FlightState::Disarming => {}
        }
        Ok(Vec::new())
    }

    /// Velocity only refreshes the snapshot, except when touchdown gating is
    /// enabled: then a landed, released vehicle is disarmed from here too.
    pub fn on_velocity_update(&mut self, velocity: Velocity) -> MissionResult<Vec<Command>> {
        if !velocity.is_finite() {
            return Err(malformed("velocity"));
        }
        self.ctx.last_known_velocity = velocity;
        if !self.ctx.mission_active {
            return Ok(Vec::new());
        }

        match self.ctx.flight_state {
            FlightState::Landing if self.config.require_touchdown => {
                if self.disarm_guard().is_ok() {
                    return self.disarm();
                }
            }
            FlightState::Manual
            | FlightState::Arming
            | FlightState::Takeoff
            | FlightState::Waypoint
            | FlightState::Landing
            | FlightState::Disarming => {}
        }
        Ok(Vec::new())
    }

    pub fn on_global_position_update(
        &mut self,
        global: GlobalPosition,
    ) -> MissionResult<Vec<Command>> {
        if !global.is_finite() {
            return Err(malformed("global position"));
        }
        self.ctx.last_known_global = Some(global);
        Ok(Vec::new())
    }

    pub fn on_status_update(&mut self, armed: bool, guided: bool) -> MissionResult<Vec<Command>> {
        self.ctx.is_armed = armed;
        self.ctx.is_guided = guided;
        if !self.ctx.mission_active {
            return Ok(Vec::new());
        }

        match self.ctx.flight_state {
            FlightState::Manual => {
                if self.arm_guard().is_ok() {
                    return self.arm();
                }
            }
            FlightState::Arming => {
                if armed {
                    return self.takeoff();
                }
            }
            FlightState::Landing => {
                if self.disarm_guard().is_ok() {
                    return self.disarm();
                }
            }
            FlightState::Takeoff | FlightState::Waypoint | FlightState::Disarming => {}
        }
        Ok(Vec::new())
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Manual -> Arming: take control, arm, and pin home to the current fix.
    pub fn arm(&mut self) -> MissionResult<Vec<Command>> {
        let home = self.arm_guard()?;
        self.ctx.home = Some(home);
        self.enter(FlightState::Arming);
        Ok(vec![Command::TakeControl, Command::Arm, Command::SetHome(home)])
    }

    /// Arming -> Takeoff: climb straight up to cruise altitude.
    pub fn takeoff(&mut self) -> MissionResult<Vec<Command>> {
        if self.ctx.flight_state != FlightState::Arming {
            return Err(self.refuse("take off", "not arming"));
        }
        if !self.ctx.is_armed {
            return Err(self.refuse("take off", "vehicle not armed"));
        }
        let altitude = self.config.cruise_altitude;
        let here = self.ctx.last_known_position;
        self.ctx.target_position = Position::new(here.north(), here.east(), altitude);
        self.enter(FlightState::Takeoff);
        Ok(vec![Command::Takeoff { altitude }])
    }

    /// Takeoff -> Waypoint: lay out the box from here and fly its first leg.
    pub fn advance_to_waypoints(&mut self) -> MissionResult<Vec<Command>> {
        if self.ctx.flight_state != FlightState::Takeoff {
            return Err(self.refuse("start waypoints", "not taking off"));
        }
        if !self.climb_complete() {
            return Err(self.refuse("start waypoints", "below takeoff altitude"));
        }
        let path = box_path(&self.ctx.last_known_position, self.config.cruise_altitude);
        info!(waypoints = path.len(), "box path generated");
        self.ctx.pending_waypoints = path.into();
        Ok(self.pop_next_waypoint())
    }

    /// Waypoint -> Waypoint: fly to the next queued waypoint.
    pub fn command_next_waypoint(&mut self) -> MissionResult<Vec<Command>> {
        if self.ctx.flight_state != FlightState::Waypoint {
            return Err(self.refuse("command next waypoint", "not flying waypoints"));
        }
        if self.ctx.pending_waypoints.is_empty() {
            return Err(self.refuse("command next waypoint", "no waypoints left"));
        }
        Ok(self.pop_next_waypoint())
    }

    /// Waypoint -> Landing: final corner reached and the vehicle has settled.
    pub fn land(&mut self) -> MissionResult<Vec<Command>> {
        if self.ctx.flight_state != FlightState::Waypoint {
            return Err(self.refuse("land", "not flying waypoints"));
        }
        if !self.ctx.pending_waypoints.is_empty() {
            return Err(self.refuse("land", "waypoints remain"));
        }
        if !self.target_reached() {
            return Err(self.refuse("land", "final waypoint not reached"));
        }
        if !self.stopped() {
            return Err(self.refuse("land", "horizontal speed too high"));
        }
        self.enter(FlightState::Landing);
        Ok(vec![Command::Land])
    }

    /// Landing -> Disarming: disarm, hand control back, close the link.
    pub fn disarm(&mut self) -> MissionResult<Vec<Command>> {
        self.disarm_guard()?;
        self.ctx.mission_active = false;
        self.enter(FlightState::Disarming);
        Ok(vec![Command::Disarm, Command::ReleaseControl, Command::Stop])
    }

    /// Any state -> Manual. Always succeeds; the mission is inert afterwards.
    ///
    /// Nothing is sent when no mission is running: either none was started
    /// or disarm already released control and stopped the link. Control is
    /// only taken at arming, so an abort from `Manual` just stops.
    pub fn abort_to_manual(&mut self) -> Vec<Command> {
        let prev = self.ctx.flight_state;
        let was_active = self.ctx.mission_active;
        self.ctx.pending_waypoints.clear();
        self.ctx.mission_active = false;
        if !was_active {
            if prev != FlightState::Manual {
                self.enter(FlightState::Manual);
            }
            return Vec::new();
        }
        warn!(from = %prev, "mission aborted, returning to manual");
        self.enter(FlightState::Manual);
        if prev == FlightState::Manual {
            vec![Command::Stop]
        } else {
            vec![Command::ReleaseControl, Command::Stop]
        }
    }

    // -----------------------------------------------------------------------
    // Guards and helpers
    // -----------------------------------------------------------------------

    fn arm_guard(&self) -> MissionResult<GlobalPosition> {
        if self.ctx.flight_state != FlightState::Manual {
            return Err(self.refuse("arm", "not in manual"));
        }
        if !self.ctx.mission_active {
            return Err(self.refuse("arm", "no mission started"));
        }
        if !self.ctx.is_guided {
            return Err(self.refuse("arm", "vehicle not in guided mode"));
        }
        self.ctx
            .last_known_global
            .ok_or_else(|| self.refuse("arm", "no global position for home"))
    }

    fn disarm_guard(&self) -> MissionResult<()> {
        if self.ctx.flight_state != FlightState::Landing {
            return Err(self.refuse("disarm", "not landing"));
        }
        if self.ctx.is_armed || self.ctx.is_guided {
            return Err(self.refuse("disarm", "vehicle still armed or guided"));
        }
        if self.config.require_touchdown && !self.ctx.is_on_ground(self.config.touchdown_altitude)
        {
            return Err(self.refuse("disarm", "no touchdown fix"));
        }
        Ok(())
    }

    fn climb_complete(&self) -> bool {
        self.ctx.last_known_position.altitude().abs()
            >= self.config.climb_fraction * self.ctx.target_position.altitude().abs()
    }

    fn target_reached(&self) -> bool {
        self.ctx.target_position.horizontal_distance(&self.ctx.last_known_position)
            < self.config.proximity_threshold
    }

    fn stopped(&self) -> bool {
        self.ctx.last_known_velocity.horizontal_speed() < self.config.stop_speed_threshold
    }

    /// Caller guarantees a non-empty queue.
    fn pop_next_waypoint(&mut self) -> Vec<Command> {
        let Some(target) = self.ctx.pending_waypoints.pop_front() else {
            return Vec::new();
        };
        self.ctx.target_position = target;
        self.enter(FlightState::Waypoint);
        info!(
            north = target.north(),
            east = target.east(),
            altitude = target.altitude(),
            remaining = self.ctx.pending_waypoints.len(),
            "next waypoint"
        );
        vec![Command::Goto { target, heading: self.config.heading }]
    }

    fn enter(&mut self, next: FlightState) {
        let prev = self.ctx.flight_state;
        debug_assert!(prev.can_transition_to(next), "illegal edge {prev} -> {next}");
        self.ctx.flight_state = next;
        if prev != next {
            info!(from = %prev, to = %next, "flight state transition");
        } else {
            debug!(state = %next, "re-entered state");
        }
    }

    fn refuse(&self, transition: &'static str, reason: &'static str) -> MissionError {
        MissionError::Precondition { transition, state: self.ctx.flight_state, reason }
    }
}

fn malformed(kind: &'static str) -> MissionError {
    warn!(kind, "discarding malformed telemetry");
    MissionError::MalformedTelemetry { kind }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
