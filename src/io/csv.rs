use std::io::{self, Write};

use crate::link::{Command, Telemetry, TelemetryEvent};

/// Navigation log: one CSV row per telemetry frame or dispatched command.
///
/// Columns: time, source, kind, x, y, z, detail
///
/// `x, y, z` are north/east/up for local frames and commands,
/// longitude/latitude/altitude for global fixes, and empty for status rows.
pub struct TelemetryRecorder<W: Write> {
    writer: W,
    rows: usize,
}

impl<W: Write> TelemetryRecorder<W> {
    /// Wrap a writer and emit the header row.
    pub fn new(mut writer: W) -> io::Result<Self> {
        writeln!(writer, "time,source,kind,x,y,z,detail")?;
        Ok(Self { writer, rows: 0 })
    }

    /// Data rows written so far (header excluded).
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn record_telemetry(&mut self, frame: &Telemetry) -> io::Result<()> {
        let kind = frame.event.kind();
        match frame.event {
            TelemetryEvent::Position(p) => {
                self.row(frame.time, "telemetry", kind, Some((p.north(), p.east(), p.altitude())), "")
            }
            TelemetryEvent::Velocity(v) => {
                self.row(frame.time, "telemetry", kind, Some((v.0.x, v.0.y, v.0.z)), "")
            }
            TelemetryEvent::GlobalPosition(g) => self.row(
                frame.time,
                "telemetry",
                kind,
                Some((g.longitude, g.latitude, g.altitude)),
                "",
            ),
            TelemetryEvent::Status { armed, guided } => self.row(
                frame.time,
                "telemetry",
                kind,
                None,
                &format!("armed={armed} guided={guided}"),
            ),
        }
    }

    pub fn record_command(&mut self, time: f64, command: &Command) -> io::Result<()> {
        let name = command.name();
        match *command {
            Command::SetHome(g) => {
                self.row(time, "command", name, Some((g.longitude, g.latitude, g.altitude)), "")
            }
            Command::Takeoff { altitude } => {
                self.row(time, "command", name, Some((0.0, 0.0, altitude)), "")
            }
            Command::Goto { target, heading } => self.row(
                time,
                "command",
                name,
                Some((target.north(), target.east(), target.altitude())),
                &format!("heading={heading:.3}"),
            ),
            _ => self.row(time, "command", name, None, ""),
        }
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn row(
        &mut self,
        time: f64,
        source: &str,
        kind: &str,
        xyz: Option<(f64, f64, f64)>,
        detail: &str,
    ) -> io::Result<()> {
        match xyz {
            // Global fixes need the extra digits.
            Some((x, y, z)) => writeln!(
                self.writer,
                "{:.3},{},{},{:.7},{:.7},{:.4},{}",
                time, source, kind, x, y, z, detail
            )?,
            None => writeln!(self.writer, "{:.3},{},{},,,,{}", time, source, kind, detail)?,
        }
        self.rows += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mission::state::Position;

    #[test]
    fn csv_output_has_header_and_rows() {
        let mut rec = TelemetryRecorder::new(Vec::new()).unwrap();
        rec.record_telemetry(&Telemetry {
            time: 0.0,
            event: TelemetryEvent::Position(Position::new(1.0, 2.0, 3.0)),
        })
        .unwrap();
        rec.record_telemetry(&Telemetry {
            time: 0.05,
            event: TelemetryEvent::Status { armed: true, guided: false },
        })
        .unwrap();
        rec.record_command(
            0.05,
            &Command::Goto { target: Position::new(5.0, 0.0, 3.0), heading: 0.0 },
        )
        .unwrap();
        rec.record_command(0.1, &Command::Land).unwrap();
        assert_eq!(rec.rows(), 4);

        let output = String::from_utf8(rec.finish().unwrap()).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines[0], "time,source,kind,x,y,z,detail");
        assert_eq!(lines.len(), 5); // header + 4 data rows
        assert_eq!(lines[1], "0.000,telemetry,position,1.0000000,2.0000000,3.0000,");
        assert_eq!(lines[2], "0.050,telemetry,status,,,,armed=true guided=false");
        assert_eq!(lines[3], "0.050,command,goto,5.0000000,0.0000000,3.0000,heading=0.000");
        assert_eq!(lines[4], "0.100,command,land,,,,");
    }

    #[test]
    fn every_row_has_seven_columns() {
        let mut rec = TelemetryRecorder::new(Vec::new()).unwrap();
        for cmd in [Command::TakeControl, Command::Arm, Command::Takeoff { altitude: 3.0 }] {
            rec.record_command(0.0, &cmd).unwrap();
        }
        let output = String::from_utf8(rec.finish().unwrap()).unwrap();
        for line in output.lines() {
            assert_eq!(line.split(',').count(), 7, "{line}");
        }
    }
}
