use std::env;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};

use backyard_flyer::io::{write_summary_file, MissionSummary};
use backyard_flyer::{logging, Config, MissionRunner, SimVehicle};

struct Args {
    config: Option<PathBuf>,
    log: Option<PathBuf>,
    summary: Option<PathBuf>,
    max_time: Option<f64>,
    json_logs: bool,
}

fn parse_args() -> Args {
    let mut args = Args { config: None, log: None, summary: None, max_time: None, json_logs: false };

    let raw: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < raw.len() {
        match raw[i].as_str() {
            "-c" | "--config" => {
                i += 1;
                args.config = Some(PathBuf::from(value(&raw, i, "config")));
            }
            "-l" | "--log" => {
                i += 1;
                args.log = Some(PathBuf::from(value(&raw, i, "log")));
            }
            "-s" | "--summary" => {
                i += 1;
                args.summary = Some(PathBuf::from(value(&raw, i, "summary")));
            }
            "--max-time" => {
                i += 1;
                let t: f64 = value(&raw, i, "max-time").parse().unwrap_or_else(|_| {
                    eprintln!("Error: invalid value for --max-time");
                    process::exit(1);
                });
                args.max_time = Some(t);
            }
            "--json-logs" => args.json_logs = true,
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            other => {
                eprintln!("Unknown option: {other}");
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }
    args
}

fn value<'a>(raw: &'a [String], i: usize, name: &str) -> &'a str {
    raw.get(i).map(String::as_str).unwrap_or_else(|| {
        eprintln!("Error: --{name} requires a value");
        process::exit(1);
    })
}

fn print_usage() {
    eprintln!(
        "Usage: backyard-flyer [OPTIONS]\n\
         \n\
         Flies the box mission against the simulated vehicle.\n\
         \n\
         Options:\n\
         \x20 -c, --config <FILE>    TOML file with [mission] and [sim] tables\n\
         \x20 -l, --log <FILE>       Write the CSV navigation log\n\
         \x20 -s, --summary <FILE>   Write the JSON mission summary\n\
         \x20 --max-time <S>         Override sim.max_time\n\
         \x20 --json-logs            Emit logs as JSON lines\n\
         \x20 -h, --help             Show this help\n\
         \n\
         Log level comes from RUST_LOG (default: info)."
    );
}

fn main() -> anyhow::Result<()> {
    let args = parse_args();
    if args.json_logs {
        logging::init_json();
    } else {
        logging::init();
    }

    let mut config = match &args.config {
        Some(path) => {
            Config::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => Config::default(),
    };
    if let Some(t) = args.max_time {
        config.sim.max_time = t;
    }

    let vehicle = SimVehicle::new(config.sim.clone())?;
    let mut runner = MissionRunner::new(vehicle, config.mission.clone());
    if let Some(path) = &args.log {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        runner = runner.with_recorder(BufWriter::new(file))?;
    }

    let summary = runner.run()?;
    print_report(&config, &runner, &summary);

    if let Some(path) = &args.summary {
        write_summary_file(path, &summary)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    if !summary.completed {
        bail!("mission did not complete, final state {}", summary.final_state);
    }
    Ok(())
}

fn print_report(config: &Config, runner: &MissionRunner<SimVehicle>, summary: &MissionSummary) {
    let m = &config.mission;
    let s = &config.sim;

    println!();
    println!("====================================================================");
    println!("  BACKYARD FLYER: box mission over {}", summary.link);
    println!("====================================================================");
    println!();
    println!("  Mission Parameters");
    println!("  ──────────────────────────────────────────────────────────────────");
    println!(
        "  Cruise alt:    {:>8.2} m     Takeoff done: {:>8.2} m",
        m.cruise_altitude,
        m.climb_altitude()
    );
    println!(
        "  Arrival:       {:>8.2} m     Stop speed:   {:>8.2} m/s",
        m.proximity_threshold, m.stop_speed_threshold
    );
    println!(
        "  Sim dt:        {:>8.3} s     Max time:     {:>8.1} s",
        s.dt, s.max_time
    );
    println!();

    println!("  Mission Events");
    println!("  ──────────────────────────────────────────────────────────────────");
    for e in &summary.events {
        println!(
            "  t={:>6.2}s   N={:>6.2}  E={:>6.2}  alt={:>5.2}   {}",
            e.time, e.north, e.east, e.altitude, e.description
        );
    }
    println!();

    println!("  Commands");
    println!("  ──────────────────────────────────────────────────────────────────");
    for c in &runner.log().commands {
        let mark = if c.accepted { "" } else { "   REJECTED" };
        println!("  t={:>6.2}s   {}{}", c.time, c.command, mark);
    }
    println!();

    println!("  Summary");
    println!("  ──────────────────────────────────────────────────────────────────");
    println!("  Final state:   {:>10}", summary.final_state);
    println!("  Completed:     {:>10}", summary.completed);
    println!("  Flight time:   {:>8.1} s", summary.flight_time_s);
    println!("  Max altitude:  {:>8.2} m", summary.max_altitude_m);
    println!("  Waypoints:     {:>8}", summary.waypoints_commanded);
    println!(
        "  Commands:      {:>8}   ({} rejected)",
        summary.commands_issued, summary.commands_rejected
    );
    println!(
        "  Telemetry:     {:>8}   ({} malformed)",
        summary.telemetry_frames, summary.malformed_frames
    );
    println!("====================================================================");
    println!();
}
