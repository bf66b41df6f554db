use super::state::Position;

// ---------------------------------------------------------------------------
// Box pattern: 15 m square, a waypoint every 5 m, closing on the start corner
// ---------------------------------------------------------------------------

/// Horizontal (north, east) offsets from the reference point, in flight order.
pub const BOX_OFFSETS: [(f64, f64); 12] = [
    (5.0, 0.0),
    (10.0, 0.0),
    (15.0, 0.0),
    (15.0, 5.0),
    (15.0, 10.0),
    (15.0, 15.0),
    (10.0, 15.0),
    (5.0, 15.0),
    (0.0, 15.0),
    (0.0, 10.0),
    (0.0, 5.0),
    (0.0, 0.0),
];

/// Side length of the box, m.
pub const BOX_SIDE: f64 = 15.0;

/// Waypoints for one box flight anchored at `reference`.
///
/// The reference altitude is projected out: every waypoint sits at
/// `cruise_altitude` above home.
pub fn box_path(reference: &Position, cruise_altitude: f64) -> Vec<Position> {
    BOX_OFFSETS
        .iter()
        .map(|&(dn, de)| {
            Position::new(reference.north() + dn, reference.east() + de, cruise_altitude)
        })
        .collect()
}
