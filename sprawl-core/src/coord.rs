//! Lattice coordinates, world bounds, and axis-aligned regions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One cell of the world lattice.
///
/// The derived ordering is lexicographic on (x, y, z), which is the
/// order region scans and exports use.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coordinate {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Move one cell in `direction`, or `None` if that would leave `bounds`.
    pub fn step(self, direction: Direction, bounds: WorldBounds) -> Option<Coordinate> {
        let (dx, dy, dz) = direction.delta();
        let next = Coordinate::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.z.saturating_add(dz),
        );
        bounds.contains(next).then_some(next)
    }
}

impl From<(i32, i32, i32)> for Coordinate {
    fn from((x, y, z): (i32, i32, i32)) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Movement directions understood by the exploration layer.
///
/// Up/down walk the y axis, left/right the x axis and forward/backward
/// the z axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    Forward,
    Backward,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
        Direction::Forward,
        Direction::Backward,
    ];

    fn delta(self) -> (i32, i32, i32) {
        match self {
            Direction::Up => (0, 1, 0),
            Direction::Down => (0, -1, 0),
            Direction::Left => (-1, 0, 0),
            Direction::Right => (1, 0, 0),
            Direction::Forward => (0, 0, 1),
            Direction::Backward => (0, 0, -1),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

/// Closed range `[min, max]` applied independently to every axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub min: i32,
    pub max: i32,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self { min: 0, max: 99 }
    }
}

impl WorldBounds {
    /// Bounds `[min, max]`. Swapped arguments are reordered.
    pub fn new(min: i32, max: i32) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Number of cells along one axis.
    pub fn size(&self) -> u64 {
        (i64::from(self.max) - i64::from(self.min) + 1) as u64
    }

    /// Total number of cells in the world, saturating at `u64::MAX`.
    pub fn volume(&self) -> u64 {
        self.size().saturating_pow(3)
    }

    pub fn contains_axis(&self, value: i32) -> bool {
        (self.min..=self.max).contains(&value)
    }

    pub fn contains(&self, coord: Coordinate) -> bool {
        self.contains_axis(coord.x) && self.contains_axis(coord.y) && self.contains_axis(coord.z)
    }

    /// The cell nearest the middle of the world, rounding up.
    pub fn center(&self) -> Coordinate {
        let mid = ((i64::from(self.min) + i64::from(self.max) + 1) / 2) as i32;
        Coordinate::new(mid, mid, mid)
    }

    /// `[center - radius, center + radius]` clamped to the bounds.
    pub fn clamp_span(&self, center: i32, radius: u32) -> (i32, i32) {
        let r = i64::from(radius);
        let c = i64::from(center);
        let lo = (c - r).max(i64::from(self.min));
        let hi = (c + r).min(i64::from(self.max));
        (lo as i32, hi as i32)
    }

    /// The box covering every cell of the world.
    pub fn region(&self) -> Region {
        Region {
            min: Coordinate::new(self.min, self.min, self.min),
            max: Coordinate::new(self.max, self.max, self.max),
        }
    }
}

/// Inclusive axis-aligned box of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub min: Coordinate,
    pub max: Coordinate,
}

impl Region {
    pub fn new(min: Coordinate, max: Coordinate) -> Self {
        Self { min, max }
    }

    /// The cube of `radius` around `center`, each axis clamped to `bounds`.
    pub fn around(center: Coordinate, radius: u32, bounds: WorldBounds) -> Self {
        let (min_x, max_x) = bounds.clamp_span(center.x, radius);
        let (min_y, max_y) = bounds.clamp_span(center.y, radius);
        let (min_z, max_z) = bounds.clamp_span(center.z, radius);
        Self {
            min: Coordinate::new(min_x, min_y, min_z),
            max: Coordinate::new(max_x, max_y, max_z),
        }
    }

    pub fn contains(&self, coord: Coordinate) -> bool {
        (self.min.x..=self.max.x).contains(&coord.x)
            && (self.min.y..=self.max.y).contains(&coord.y)
            && (self.min.z..=self.max.z).contains(&coord.z)
    }

    /// Number of cells in the box; zero when any axis is inverted.
    /// Saturates at `u64::MAX`.
    pub fn volume(&self) -> u64 {
        let span = |lo: i32, hi: i32| (i64::from(hi) - i64::from(lo) + 1).max(0) as u64;
        span(self.min.x, self.max.x)
            .saturating_mul(span(self.min.y, self.max.y))
            .saturating_mul(span(self.min.z, self.max.z))
    }

    /// Every cell, x outermost and z innermost, all ascending.
    pub fn coordinates(&self) -> impl Iterator<Item = Coordinate> {
        let Region { min, max } = *self;
        (min.x..=max.x).flat_map(move |x| {
            (min.y..=max.y).flat_map(move |y| (min.z..=max.z).map(move |z| Coordinate::new(x, y, z)))
        })
    }
}
