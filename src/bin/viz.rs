use eframe::egui;
use egui_plot::{Line, Plot, PlotPoints, Points};

use backyard_flyer::io::MissionSummary;
use backyard_flyer::sim::TrackPoint;
use backyard_flyer::{box_path, logging, Config, FlightState, MissionRunner, Position, SimVehicle};

fn main() -> eframe::Result {
    logging::init();
    let config = Config::default();
    let vehicle = match SimVehicle::new(config.sim.clone()) {
        Ok(vehicle) => vehicle,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };
    let mut runner = MissionRunner::new(vehicle, config.mission.clone());
    let summary = match runner.run() {
        Ok(summary) => summary,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };

    // Planned box, laid out from where the waypoint phase started.
    let reference = runner
        .track()
        .iter()
        .find(|p| p.state == FlightState::Waypoint)
        .map_or(Position::default(), |p| p.position);
    let planned = box_path(&reference, config.mission.cruise_altitude);

    let app = MissionViz { track: runner.track().to_vec(), planned, summary };
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1200.0, 800.0]),
        ..Default::default()
    };
    eframe::run_native("Backyard Flyer", options, Box::new(|_| Ok(Box::new(app))))
}

struct MissionViz {
    track: Vec<TrackPoint>,
    planned: Vec<Position>,
    summary: MissionSummary,
}

impl eframe::App for MissionViz {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let step = (self.track.len() / 2000).max(1);
        let sampled: Vec<&TrackPoint> = self.track.iter().step_by(step).collect();

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.heading(format!("Box mission over {}", self.summary.link));
            ui.label(format!(
                "Final state: {}  |  Waypoints: {}  |  Max alt: {:.2} m  |  Flight: {:.1} s",
                self.summary.final_state,
                self.summary.waypoints_commanded,
                self.summary.max_altitude_m,
                self.summary.flight_time_s,
            ));
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let available = ui.available_size();
            let half_w = available.x / 2.0 - 8.0;
            let height = available.y - 24.0;

            ui.horizontal(|ui| {
                // Ground track, east on x so north points up
                ui.vertical(|ui| {
                    ui.label("Ground track (m)");
                    let flown: PlotPoints =
                        sampled.iter().map(|p| [p.position.east(), p.position.north()]).collect();
                    let corners: PlotPoints =
                        self.planned.iter().map(|p| [p.east(), p.north()]).collect();
                    Plot::new("track")
                        .width(half_w)
                        .height(height)
                        .x_axis_label("East (m)")
                        .y_axis_label("North (m)")
                        .data_aspect(1.0)
                        .show(ui, |plot_ui| {
                            plot_ui.line(Line::new("Flown", flown));
                            plot_ui.points(Points::new("Waypoints", corners).radius(4.0));
                        });
                });

                // Altitude vs Time
                ui.vertical(|ui| {
                    ui.label("Altitude (m)");
                    let points: PlotPoints =
                        sampled.iter().map(|p| [p.time, p.position.altitude()]).collect();
                    Plot::new("altitude")
                        .width(half_w)
                        .height(height)
                        .x_axis_label("Time (s)")
                        .show(ui, |plot_ui| {
                            plot_ui.line(Line::new("Altitude", points));
                        });
                });
            });
        });
    }
}
