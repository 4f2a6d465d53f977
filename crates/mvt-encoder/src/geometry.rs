//! Geometry command stream encoding.
//!
//! A feature's geometry is a flat sequence of commands interpreted by
//! a cursor: MoveTo(1), LineTo(2), ClosePath(7), packed as
//! `(id | count << 3)`, with coordinates zigzag-encoded deltas from
//! the previous cursor position.

const CMD_MOVE_TO: u32 = 1;
const CMD_LINE_TO: u32 = 2;
const CMD_CLOSE_PATH: u32 = 7;

/// Zigzag-encode a signed delta.
#[inline]
pub fn zigzag(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Pack a command with a repeat count.
#[inline]
pub fn command(id: u32, count: u32) -> u32 {
    (id & 0x7) | (count << 3)
}

/// Tracks the cursor while building one feature's command stream.
pub struct GeometryEncoder {
    commands: Vec<u32>,
    cursor_x: i32,
    cursor_y: i32,
}

impl Default for GeometryEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl GeometryEncoder {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            cursor_x: 0,
            cursor_y: 0,
        }
    }

    fn push_delta(&mut self, x: i32, y: i32) {
        self.commands.push(zigzag(x - self.cursor_x));
        self.commands.push(zigzag(y - self.cursor_y));
        self.cursor_x = x;
        self.cursor_y = y;
    }

    /// Encode one or more points as a single MoveTo with count.
    pub fn points(&mut self, points: &[(i32, i32)]) {
        if points.is_empty() {
            return;
        }
        self.commands.push(command(CMD_MOVE_TO, points.len() as u32));
        for &(x, y) in points {
            self.push_delta(x, y);
        }
    }

    /// Encode an open path: MoveTo then LineTo runs.
    pub fn linestring(&mut self, line: &[(i32, i32)]) {
        if line.len() < 2 {
            return;
        }
        self.commands.push(command(CMD_MOVE_TO, 1));
        self.push_delta(line[0].0, line[0].1);
        self.commands
            .push(command(CMD_LINE_TO, (line.len() - 1) as u32));
        for &(x, y) in &line[1..] {
            self.push_delta(x, y);
        }
    }

    /// Encode a closed ring: the closing point is implied by ClosePath
    /// and must not be present in `ring`.
    pub fn ring(&mut self, ring: &[(i32, i32)]) {
        if ring.len() < 3 {
            return;
        }
        self.commands.push(command(CMD_MOVE_TO, 1));
        self.push_delta(ring[0].0, ring[0].1);
        self.commands
            .push(command(CMD_LINE_TO, (ring.len() - 1) as u32));
        for &(x, y) in &ring[1..] {
            self.push_delta(x, y);
        }
        self.commands.push(command(CMD_CLOSE_PATH, 1));
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn into_commands(self) -> Vec<u32> {
        self.commands
    }
}

/// Signed area of a ring in tile coordinates (y grows downward, so a
/// positive value means clockwise on screen).
pub fn signed_area(ring: &[(i32, i32)]) -> i64 {
    if ring.len() < 3 {
        return 0;
    }
    let mut area = 0i64;
    for i in 0..ring.len() {
        let j = (i + 1) % ring.len();
        area += ring[i].0 as i64 * ring[j].1 as i64;
        area -= ring[j].0 as i64 * ring[i].1 as i64;
    }
    area / 2
}

/// Force a ring's winding: exterior rings clockwise in tile space,
/// interior rings counter-clockwise.
pub fn wind_ring(mut ring: Vec<(i32, i32)>, is_hole: bool) -> Vec<(i32, i32)> {
    let clockwise = signed_area(&ring) > 0;
    let want_clockwise = !is_hole;
    if clockwise != want_clockwise {
        ring.reverse();
    }
    ring
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zigzag_values() {
        assert_eq!(zigzag(0), 0);
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);
        assert_eq!(zigzag(-2), 3);
        assert_eq!(zigzag(2), 4);
    }

    #[test]
    fn test_command_packing() {
        assert_eq!(command(CMD_MOVE_TO, 1), 9);
        assert_eq!(command(CMD_LINE_TO, 3), 26);
        assert_eq!(command(CMD_CLOSE_PATH, 1), 15);
    }

    #[test]
    fn test_point_stream() {
        let mut enc = GeometryEncoder::new();
        enc.points(&[(25, 17)]);
        // The canonical spec example: MoveTo(25, 17)
        assert_eq!(enc.into_commands(), vec![9, 50, 34]);
    }

    #[test]
    fn test_linestring_stream() {
        let mut enc = GeometryEncoder::new();
        enc.linestring(&[(2, 2), (2, 10), (10, 10)]);
        // MoveTo(2,2), LineTo(0,8),(8,0)
        assert_eq!(enc.into_commands(), vec![9, 4, 4, 18, 0, 16, 16, 0]);
    }

    #[test]
    fn test_ring_stream_ends_with_close() {
        let mut enc = GeometryEncoder::new();
        enc.ring(&[(0, 0), (10, 0), (10, 10), (0, 10)]);
        let commands = enc.into_commands();
        assert_eq!(commands[0], 9); // MoveTo
        assert_eq!(*commands.last().unwrap(), 15); // ClosePath
    }

    #[test]
    fn test_cursor_carries_between_parts() {
        let mut enc = GeometryEncoder::new();
        enc.linestring(&[(0, 0), (5, 5)]);
        enc.linestring(&[(6, 6), (7, 7)]);
        let commands = enc.into_commands();
        // First part: MoveTo + 2 coords + LineTo + 2 coords = 6 values,
        // so the second MoveTo's deltas sit at positions 7 and 8 and
        // are (1, 1) relative to the cursor at (5, 5).
        assert_eq!(commands[6], 9);
        assert_eq!(commands[7], zigzag(1));
        assert_eq!(commands[8], zigzag(1));
    }

    #[test]
    fn test_winding() {
        // In tile space (y down) this ring runs clockwise on screen,
        // which is what exteriors need; as a hole it must be reversed.
        let ring = vec![(0, 0), (10, 0), (10, 10), (0, 10)];
        assert!(signed_area(&ring) > 0);
        let wound = wind_ring(ring.clone(), false);
        assert_eq!(wound, ring);
        let hole = wind_ring(ring, true);
        assert!(signed_area(&hole) < 0);
    }
}
