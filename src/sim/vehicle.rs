use std::collections::VecDeque;

use nalgebra::{Vector2, Vector3};
use tracing::{debug, info};

use crate::config::{ConfigError, SimConfig};
use crate::link::{LinkError, Telemetry, TelemetryEvent, VehicleLink};
use crate::mission::state::{GlobalPosition, Position, Velocity};
use super::dynamics::{KinState, Setpoint, EARTH_RADIUS};
use super::integrator::rk4_step;

// ---------------------------------------------------------------------------
// Software-in-the-loop multirotor
// ---------------------------------------------------------------------------

/// Simulated vehicle behind the [`VehicleLink`] boundary.
///
/// Telemetry is produced lazily: each call to `next_telemetry` drains the
/// current frame, and an empty queue advances the physics by one `dt` and
/// queues the next frame (global, local position, velocity, plus a status
/// report every `status_interval` steps).
#[derive(Debug, Clone)]
pub struct SimVehicle {
    config: SimConfig,
    state: KinState,
    setpoint: Setpoint,
    home: GlobalPosition,
    armed: bool,
    guided: bool,
    handed_over: bool,
    touchdown_at: Option<f64>,
    stopped: bool,
    step: u64,
    queue: VecDeque<Telemetry>,
}

impl SimVehicle {
    /// Fails on a config `SimConfig::validate` rejects (zero `dt` would
    /// never advance time, zero `status_interval` has no status cadence).
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut vehicle = Self {
            home: config.home,
            config,
            state: KinState::at_rest(),
            setpoint: Setpoint::Idle,
            armed: false,
            guided: false,
            handed_over: false,
            touchdown_at: None,
            stopped: false,
            step: 0,
            queue: VecDeque::new(),
        };
        vehicle.queue_frame();
        Ok(vehicle)
    }

    pub fn state(&self) -> &KinState {
        &self.state
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn is_guided(&self) -> bool {
        self.guided
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn home(&self) -> GlobalPosition {
        self.home
    }

    /// Geodetic fix for the current local position (flat-earth approximation).
    pub fn global_position(&self) -> GlobalPosition {
        let lat0 = self.home.latitude.to_radians();
        GlobalPosition {
            longitude: self.home.longitude
                + (self.state.pos.y / (EARTH_RADIUS * lat0.cos())).to_degrees(),
            latitude: self.home.latitude + (self.state.pos.x / EARTH_RADIUS).to_degrees(),
            altitude: self.home.altitude + self.state.pos.z,
        }
    }

    /// Local NEU offset of `global` from the current home.
    fn local_offset(&self, global: &GlobalPosition) -> Vector3<f64> {
        let lat0 = self.home.latitude.to_radians();
        Vector3::new(
            (global.latitude - self.home.latitude).to_radians() * EARTH_RADIUS,
            (global.longitude - self.home.longitude).to_radians() * EARTH_RADIUS * lat0.cos(),
            global.altitude - self.home.altitude,
        )
    }

    fn on_ground(&self) -> bool {
        self.state.pos.z <= 1e-3
    }

    // -----------------------------------------------------------------------
    // Physics and telemetry
    // -----------------------------------------------------------------------

    fn advance(&mut self) {
        let dt = self.config.dt;
        let setpoint = if self.armed { self.setpoint } else { Setpoint::Idle };
        self.state = rk4_step(&self.state, &setpoint, &self.config, dt);
        self.step += 1;

        // Ground contact
        if self.state.pos.z < 0.0 {
            self.state.pos.z = 0.0;
            self.state.vel.z = self.state.vel.z.max(0.0);
        }
        if !self.armed && self.on_ground() {
            self.state.vel = Vector3::zeros();
        }

        // Pilot flips the mode switch to guided once.
        if !self.handed_over && self.state.time >= self.config.handover_time {
            self.handed_over = true;
            self.guided = true;
            info!(time = self.state.time, "pilot handed over to guided mode");
        }

        // Autopilot disarms on its own after sitting on the ground.
        if matches!(self.setpoint, Setpoint::Descend(_)) && self.armed && self.on_ground() {
            let since = *self.touchdown_at.get_or_insert(self.state.time);
            if self.state.time - since >= self.config.auto_disarm_delay {
                info!(time = self.state.time, "touchdown, autopilot disarmed");
                self.armed = false;
                self.guided = false;
                self.setpoint = Setpoint::Idle;
            }
        }
    }

    fn queue_frame(&mut self) {
        let time = self.state.time;
        let pos = self.state.pos;
        let vel = self.state.vel;
        let frames = [
            TelemetryEvent::GlobalPosition(self.global_position()),
            TelemetryEvent::Position(Position(pos)),
            TelemetryEvent::Velocity(Velocity(vel)),
        ];
        self.queue.extend(frames.into_iter().map(|event| Telemetry { time, event }));
        if self.step % u64::from(self.config.status_interval) == 0 {
            self.queue.push_back(Telemetry {
                time,
                event: TelemetryEvent::Status { armed: self.armed, guided: self.guided },
            });
        }
    }

    fn connected(&self) -> Result<(), LinkError> {
        if self.stopped {
            Err(LinkError::Disconnected)
        } else {
            Ok(())
        }
    }

    fn reject(command: &str) -> Result<(), LinkError> {
        Err(LinkError::Rejected { command: command.to_string() })
    }
}

impl VehicleLink for SimVehicle {
    fn next_telemetry(&mut self) -> Option<Telemetry> {
        if self.stopped {
            return None;
        }
        if self.queue.is_empty() {
            if self.state.time + 0.5 * self.config.dt >= self.config.max_time {
                return None;
            }
            self.advance();
            self.queue_frame();
        }
        self.queue.pop_front()
    }

    fn take_control(&mut self) -> Result<(), LinkError> {
        self.connected()?;
        self.guided = true;
        Ok(())
    }

    fn release_control(&mut self) -> Result<(), LinkError> {
        self.connected()?;
        self.guided = false;
        Ok(())
    }

    fn arm(&mut self) -> Result<(), LinkError> {
        self.connected()?;
        if !self.guided {
            return Self::reject("arm");
        }
        self.armed = true;
        self.touchdown_at = None;
        Ok(())
    }

    fn disarm(&mut self) -> Result<(), LinkError> {
        self.connected()?;
        if self.armed && !self.on_ground() {
            return Self::reject("disarm");
        }
        self.armed = false;
        self.setpoint = Setpoint::Idle;
        Ok(())
    }

    fn set_home(&mut self, home: GlobalPosition) -> Result<(), LinkError> {
        self.connected()?;
        let shift = self.local_offset(&home);
        self.state.pos -= shift;
        self.home = home;
        debug!(?home, "home set");
        Ok(())
    }

    fn takeoff(&mut self, altitude: f64) -> Result<(), LinkError> {
        self.connected()?;
        if !self.armed || !self.guided {
            return Self::reject("takeoff");
        }
        let pos = self.state.pos;
        self.setpoint = Setpoint::Hold(Vector3::new(pos.x, pos.y, altitude));
        Ok(())
    }

    fn goto_position(
        &mut self,
        north: f64,
        east: f64,
        altitude: f64,
        _heading: f64,
    ) -> Result<(), LinkError> {
        self.connected()?;
        if !self.armed || !self.guided {
            return Self::reject("goto");
        }
        self.setpoint = Setpoint::Hold(Vector3::new(north, east, altitude));
        Ok(())
    }

    fn land(&mut self) -> Result<(), LinkError> {
        self.connected()?;
        if !self.armed {
            return Self::reject("land");
        }
        let pos = self.state.pos;
        self.setpoint = Setpoint::Descend(Vector2::new(pos.x, pos.y));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), LinkError> {
        self.connected()?;
        self.stopped = true;
        self.queue.clear();
        info!(time = self.state.time, "connection closed");
        Ok(())
    }

    fn name(&self) -> &str {
        "sitl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_until<F: Fn(&SimVehicle) -> bool>(v: &mut SimVehicle, done: F) {
        while !done(v) {
            assert!(v.next_telemetry().is_some(), "link closed early");
        }
    }

    #[test]
    fn first_frame_is_at_rest_with_status() {
        let mut v = SimVehicle::new(SimConfig::default()).unwrap();
        let kinds: Vec<&str> = (0..4).map(|_| v.next_telemetry().unwrap().event.kind()).collect();
        assert_eq!(kinds, vec!["global_position", "position", "velocity", "status"]);
    }

    #[test]
    fn status_every_interval() {
        let cfg = SimConfig { status_interval: 5, ..SimConfig::default() };
        let mut v = SimVehicle::new(cfg).unwrap();
        let mut status = 0;
        for _ in 0..(4 * 20 + 1) {
            if let Some(t) = v.next_telemetry() {
                if matches!(t.event, TelemetryEvent::Status { .. }) {
                    status += 1;
                }
            }
        }
        // 81 frames reach past step 15: statuses on steps 0, 5, 10 and 15.
        assert!(status >= 4);
    }

    #[test]
    fn rejects_zero_status_interval() {
        let cfg = SimConfig { status_interval: 0, ..SimConfig::default() };
        assert!(matches!(SimVehicle::new(cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_timestep() {
        let cfg = SimConfig { dt: 0.0, ..SimConfig::default() };
        assert!(matches!(SimVehicle::new(cfg), Err(ConfigError::Invalid(_))));
        let cfg = SimConfig { dt: f64::NAN, ..SimConfig::default() };
        assert!(matches!(SimVehicle::new(cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn pilot_hands_over_to_guided() {
        let mut v = SimVehicle::new(SimConfig::default()).unwrap();
        assert!(!v.is_guided());
        drain_until(&mut v, |v| v.state().time >= 0.6);
        assert!(v.is_guided());
    }

    #[test]
    fn arm_requires_guided() {
        let cfg = SimConfig { handover_time: 100.0, ..SimConfig::default() };
        let mut v = SimVehicle::new(cfg).unwrap();
        assert!(matches!(v.arm(), Err(LinkError::Rejected { .. })));
        v.take_control().unwrap();
        v.arm().unwrap();
        assert!(v.is_armed());
    }

    #[test]
    fn takeoff_climbs_to_altitude() {
        let mut v = SimVehicle::new(SimConfig::default()).unwrap();
        v.take_control().unwrap();
        v.arm().unwrap();
        v.takeoff(3.0).unwrap();
        drain_until(&mut v, |v| v.state().time >= 15.0);
        assert!((v.state().pos.z - 3.0).abs() < 0.01);
        assert!((v.global_position().altitude - 3.0).abs() < 0.01);
    }

    #[test]
    fn disarmed_vehicle_ignores_goto() {
        let mut v = SimVehicle::new(SimConfig::default()).unwrap();
        v.take_control().unwrap();
        assert!(v.goto_position(5.0, 0.0, 3.0, 0.0).is_err());
        drain_until(&mut v, |v| v.state().time >= 2.0);
        assert_eq!(v.state().pos, Vector3::zeros());
    }

    #[test]
    fn lands_and_auto_disarms() {
        let mut v = SimVehicle::new(SimConfig::default()).unwrap();
        v.take_control().unwrap();
        v.arm().unwrap();
        v.takeoff(3.0).unwrap();
        drain_until(&mut v, |v| v.state().pos.z > 2.9);
        assert!(matches!(v.disarm(), Err(LinkError::Rejected { .. })));
        v.land().unwrap();
        drain_until(&mut v, |v| !v.is_armed());
        assert!(!v.is_guided());
        assert_eq!(v.state().pos.z, 0.0);
    }

    #[test]
    fn global_fix_tracks_local_offset() {
        let mut v = SimVehicle::new(SimConfig::default()).unwrap();
        v.state.pos = Vector3::new(100.0, -50.0, 2.0);
        let g = v.global_position();
        let back = v.local_offset(&g);
        assert!((back - v.state.pos).norm() < 1e-6);
    }

    #[test]
    fn stop_closes_link() {
        let mut v = SimVehicle::new(SimConfig::default()).unwrap();
        v.stop().unwrap();
        assert!(v.next_telemetry().is_none());
        assert_eq!(v.arm(), Err(LinkError::Disconnected));
    }

    #[test]
    fn link_closes_at_max_time() {
        let cfg = SimConfig { max_time: 1.0, ..SimConfig::default() };
        let mut v = SimVehicle::new(cfg).unwrap();
        let mut last = 0.0;
        while let Some(t) = v.next_telemetry() {
            last = t.time;
        }
        assert!((last - 1.0).abs() < 1e-9);
    }
}
