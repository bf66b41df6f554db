use crate::config::SimConfig;
use super::dynamics::{derivatives, KinState, Setpoint};

// ---------------------------------------------------------------------------
// Classical 4th-order Runge-Kutta, setpoint held constant over the step
// ---------------------------------------------------------------------------

/// Single RK4 step: advance state by dt.
pub fn rk4_step(state: &KinState, setpoint: &Setpoint, cfg: &SimConfig, dt: f64) -> KinState {
    let k1 = derivatives(state, setpoint, cfg);
    let k2 = derivatives(&state.apply(&k1, dt * 0.5), setpoint, cfg);
    let k3 = derivatives(&state.apply(&k2, dt * 0.5), setpoint, cfg);
    let k4 = derivatives(&state.apply(&k3, dt), setpoint, cfg);

    KinState {
        time: state.time + dt,
        pos: state.pos + (k1.dpos + 2.0 * k2.dpos + 2.0 * k3.dpos + k4.dpos) * (dt / 6.0),
        vel: state.vel + (k1.dvel + 2.0 * k2.dvel + 2.0 * k3.dvel + k4.dvel) * (dt / 6.0),
    }
}
