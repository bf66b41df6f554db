use nalgebra::{Vector2, Vector3};

use crate::config::SimConfig;

// ---------------------------------------------------------------------------
// Physical constants
// ---------------------------------------------------------------------------

pub const EARTH_RADIUS: f64 = 6_371_000.0; // mean Earth radius, m

// ---------------------------------------------------------------------------
// Kinematic multirotor state
// ---------------------------------------------------------------------------

/// Point-mass state of the simulated vehicle.
/// Frame: North-East-Up (NEU), origin at home.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinState {
    pub time: f64,            // s
    pub pos: Vector3<f64>,    // m
    pub vel: Vector3<f64>,    // m/s
}

impl KinState {
    pub fn at_rest() -> Self {
        Self { time: 0.0, pos: Vector3::zeros(), vel: Vector3::zeros() }
    }

    /// Advance state by a derivative scaled by dt (used inside RK4).
    pub fn apply(&self, d: &Deriv, dt: f64) -> KinState {
        KinState {
            time: self.time + dt,
            pos: self.pos + d.dpos * dt,
            vel: self.vel + d.dvel * dt,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Deriv {
    pub dpos: Vector3<f64>,   // velocity
    pub dvel: Vector3<f64>,   // acceleration
}

// ---------------------------------------------------------------------------
// Autopilot setpoint
// ---------------------------------------------------------------------------

/// What the onboard autopilot is trying to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setpoint {
    /// Motors off or idling: no velocity demand.
    Idle,
    /// Fly to and hold a position (takeoff and goto).
    Hold(Vector3<f64>),
    /// Hold the horizontal position, descend at the maximum rate.
    Descend(Vector2<f64>),
}

/// Velocity the autopilot asks for at `pos`.
///
/// Proportional on position error, saturated separately in the horizontal
/// plane and vertically (climb and descent limits differ).
pub fn velocity_demand(pos: &Vector3<f64>, setpoint: &Setpoint, cfg: &SimConfig) -> Vector3<f64> {
    let (target_xy, err_z) = match setpoint {
        Setpoint::Idle => return Vector3::zeros(),
        Setpoint::Hold(target) => (target.xy(), target.z - pos.z),
        Setpoint::Descend(xy) => (*xy, -cfg.max_descent_rate / cfg.position_gain - pos.z.max(0.0)),
    };

    let mut v_xy = (target_xy - pos.xy()) * cfg.position_gain;
    let speed = v_xy.norm();
    if speed > cfg.max_horizontal_speed {
        v_xy *= cfg.max_horizontal_speed / speed;
    }
    let v_z = (err_z * cfg.position_gain).clamp(-cfg.max_descent_rate, cfg.max_climb_rate);

    Vector3::new(v_xy.x, v_xy.y, v_z)
}

/// First-order velocity response toward the autopilot's demand.
pub fn derivatives(state: &KinState, setpoint: &Setpoint, cfg: &SimConfig) -> Deriv {
    let demand = velocity_demand(&state.pos, setpoint, cfg);
    Deriv {
        dpos: state.vel,
        dvel: (demand - state.vel) / cfg.velocity_time_constant,
    }
}
