use std::io;

use backyard_flyer::io::write_summary;
use backyard_flyer::{Config, MissionRunner, SimVehicle};

// A taller, tighter box flown by a slower vehicle.
const CONFIG: &str = r#"
[mission]
cruise_altitude = 5.0
proximity_threshold = 0.5
stop_speed_threshold = 0.5

[sim]
max_horizontal_speed = 2.0
max_climb_rate = 1.0
"#;

fn main() -> anyhow::Result<()> {
    backyard_flyer::logging::init();

    let config = Config::from_toml_str(CONFIG)?;
    let vehicle = SimVehicle::new(config.sim.clone())?;
    let mut runner = MissionRunner::new(vehicle, config.mission.clone());
    let summary = runner.run()?;

    let corners: Vec<_> = runner
        .log()
        .commands
        .iter()
        .filter(|c| c.command.starts_with("goto"))
        .map(|c| format!("  t={:>6.2}s   {}", c.time, c.command))
        .collect();
    println!("Waypoints commanded:\n{}\n", corners.join("\n"));

    write_summary(&mut io::stdout(), &summary)?;
    Ok(())
}
