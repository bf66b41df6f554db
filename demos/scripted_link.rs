use std::collections::VecDeque;

use backyard_flyer::link::{LinkError, Telemetry, TelemetryEvent, VehicleLink};
use backyard_flyer::{GlobalPosition, MissionConfig, MissionRunner, Position, Velocity};

/// A toy link: the vehicle closes half the distance to its target every
/// frame and drops to the ground (and disarms itself) when told to land.
struct HalfStepLink {
    home: GlobalPosition,
    pos: Position,
    target: Option<Position>,
    landing: bool,
    armed: bool,
    guided: bool,
    time: f64,
    queue: VecDeque<Telemetry>,
    closed: bool,
}

impl HalfStepLink {
    fn new() -> Self {
        Self {
            home: GlobalPosition::new(-122.397_45, 37.792_48, 0.0),
            pos: Position::default(),
            target: None,
            landing: false,
            armed: false,
            guided: true, // pilot already flipped the switch
            time: 0.0,
            queue: VecDeque::new(),
            closed: false,
        }
    }

    fn tick(&mut self) {
        self.time += 0.1;
        if let Some(target) = self.target {
            self.pos.0 += (target.0 - self.pos.0) * 0.5;
        }
        if self.landing {
            self.pos.0.z *= 0.5;
            if self.pos.0.z < 0.01 {
                self.pos.0.z = 0.0;
                self.armed = false;
                self.guided = false;
            }
        }
        let global = GlobalPosition { altitude: self.home.altitude + self.pos.altitude(), ..self.home };
        for event in [
            TelemetryEvent::GlobalPosition(global),
            TelemetryEvent::Position(self.pos),
            TelemetryEvent::Velocity(Velocity::default()),
            TelemetryEvent::Status { armed: self.armed, guided: self.guided },
        ] {
            self.queue.push_back(Telemetry { time: self.time, event });
        }
    }
}

impl VehicleLink for HalfStepLink {
    fn next_telemetry(&mut self) -> Option<Telemetry> {
        if self.closed || self.time > 120.0 {
            return None;
        }
        if self.queue.is_empty() {
            self.tick();
        }
        self.queue.pop_front()
    }

    fn take_control(&mut self) -> Result<(), LinkError> {
        self.guided = true;
        Ok(())
    }

    fn release_control(&mut self) -> Result<(), LinkError> {
        self.guided = false;
        Ok(())
    }

    fn arm(&mut self) -> Result<(), LinkError> {
        self.armed = true;
        Ok(())
    }

    fn disarm(&mut self) -> Result<(), LinkError> {
        self.armed = false;
        Ok(())
    }

    fn set_home(&mut self, home: GlobalPosition) -> Result<(), LinkError> {
        self.home = home;
        Ok(())
    }

    fn takeoff(&mut self, altitude: f64) -> Result<(), LinkError> {
        self.target = Some(Position::new(self.pos.north(), self.pos.east(), altitude));
        Ok(())
    }

    fn goto_position(
        &mut self,
        north: f64,
        east: f64,
        altitude: f64,
        _heading: f64,
    ) -> Result<(), LinkError> {
        self.target = Some(Position::new(north, east, altitude));
        Ok(())
    }

    fn land(&mut self) -> Result<(), LinkError> {
        self.target = None;
        self.landing = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), LinkError> {
        self.closed = true;
        Ok(())
    }

    fn name(&self) -> &str {
        "half-step"
    }
}

fn main() {
    let mut runner = MissionRunner::new(HalfStepLink::new(), MissionConfig::default());

    println!("Flying the box over the {} link...", runner.link().name());
    let summary = match runner.run() {
        Ok(summary) => summary,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };

    for c in &runner.log().commands {
        println!("  t={:>6.2}s   {}", c.time, c.command);
    }
    println!(
        "\n  {} after {:.1} s, {} waypoints, completed: {}",
        summary.final_state, summary.flight_time_s, summary.waypoints_commanded, summary.completed
    );
}
