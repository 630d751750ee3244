// Core types shared across the decision pipeline.
//
// Defines grid coordinates (`Pos`), headings (`Direction`, `Rotation`), the
// oriented ship pose (`ShipPose`) with its footprint math, and the integer id
// newtypes used to index the entity tables. Ids are dense integers rather
// than opaque handles because the judge protocol addresses every entity by
// its position in an ordered per-frame record list.
//
// The ship footprint math lives here as pure functions of `(Pos, Direction)`
// so that the pathfinder, the collision checks, and command generation all
// agree on the exact cells a ship occupies.
//
// **Critical constraint: determinism.** Every type here derives a total
// order so it can key a `BTreeMap` or break ties without relying on hash
// iteration order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// A cell on the 200×200 grid. `x` is the row index, `y` the column index,
/// matching the order coordinates appear on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pos {
    pub x: i32,
    pub y: i32,
}

impl Pos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Sentinel for "no position yet" — mirrors the judge's `-1 -1` idiom.
    pub const UNSET: Pos = Pos::new(-1, -1);

    pub fn is_set(self) -> bool {
        self != Self::UNSET
    }

    /// Manhattan distance between two cells.
    pub fn manhattan_distance(self, other: Self) -> u32 {
        (self.x - other.x).unsigned_abs() + (self.y - other.y).unsigned_abs()
    }

    /// Chebyshev distance between two cells.
    pub fn chebyshev_distance(self, other: Self) -> u32 {
        (self.x - other.x)
            .unsigned_abs()
            .max((self.y - other.y).unsigned_abs())
    }
}

impl Add for Pos {
    type Output = Pos;
    fn add(self, rhs: Pos) -> Pos {
        Pos::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Pos {
    type Output = Pos;
    fn sub(self, rhs: Pos) -> Pos {
        Pos::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One of the four cardinal headings. The wire encoding is
/// 0 East, 1 West, 2 North, 3 South.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    East,
    West,
    North,
    South,
}

impl Direction {
    /// The four headings in canonical wire order.
    pub const ALL: [Direction; 4] = [
        Direction::East,
        Direction::West,
        Direction::North,
        Direction::South,
    ];

    /// The unit step for this heading. East grows `x`, South grows `y`.
    pub fn offset(self) -> Pos {
        match self {
            Direction::East => Pos::new(1, 0),
            Direction::West => Pos::new(-1, 0),
            Direction::North => Pos::new(0, -1),
            Direction::South => Pos::new(0, 1),
        }
    }

    /// Wire encoding for the `move` and pose commands.
    pub fn wire_index(self) -> u8 {
        match self {
            Direction::East => 0,
            Direction::West => 1,
            Direction::North => 2,
            Direction::South => 3,
        }
    }

    /// Clockwise cycle: E → S → W → N → E.
    pub fn rotate_cw(self) -> Direction {
        match self {
            Direction::East => Direction::South,
            Direction::South => Direction::West,
            Direction::West => Direction::North,
            Direction::North => Direction::East,
        }
    }

    pub fn rotate_ccw(self) -> Direction {
        match self {
            Direction::East => Direction::North,
            Direction::North => Direction::West,
            Direction::West => Direction::South,
            Direction::South => Direction::East,
        }
    }
}

/// A rotation command operand. Wire encoding is 0 clockwise, 1 anticlockwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    Clockwise,
    AntiClockwise,
}

impl Rotation {
    pub fn wire_index(self) -> u8 {
        match self {
            Rotation::Clockwise => 0,
            Rotation::AntiClockwise => 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Ship pose and footprint
// ---------------------------------------------------------------------------

/// Ship footprint length along the heading axis, in cells.
pub const SHIP_LENGTH: i32 = 3;
/// Ship footprint width across the heading axis, in cells.
pub const SHIP_WIDTH: i32 = 2;

/// The oriented pose of a ship: its core cell plus its heading. A ship
/// occupies a `SHIP_WIDTH × SHIP_LENGTH` rectangle; the core is the
/// stern-port corner, the hull extends `SHIP_LENGTH` cells forward and
/// `SHIP_WIDTH` cells to starboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShipPose {
    pub pos: Pos,
    pub dir: Direction,
}

impl ShipPose {
    pub const fn new(pos: Pos, dir: Direction) -> Self {
        Self { pos, dir }
    }

    /// Sentinel pose, mirroring `Pos::UNSET`.
    pub const UNSET: ShipPose = ShipPose::new(Pos::UNSET, Direction::East);

    pub fn is_set(self) -> bool {
        self.pos.is_set()
    }

    /// Every cell the hull covers, in (forward, starboard) scan order.
    pub fn footprint(self) -> [Pos; (SHIP_LENGTH * SHIP_WIDTH) as usize] {
        let f = self.dir.offset();
        let r = self.dir.rotate_cw().offset();
        let mut cells = [Pos::UNSET; (SHIP_LENGTH * SHIP_WIDTH) as usize];
        let mut i = 0;
        for a in 0..SHIP_LENGTH {
            for b in 0..SHIP_WIDTH {
                cells[i] = Pos::new(
                    self.pos.x + a * f.x + b * r.x,
                    self.pos.y + a * f.y + b * r.y,
                );
                i += 1;
            }
        }
        cells
    }

    /// The axis-aligned bounding rectangle of the hull as
    /// `(min corner, max corner)`, both inclusive.
    pub fn occupancy_rect(self) -> (Pos, Pos) {
        let f = self.dir.offset();
        let r = self.dir.rotate_cw().offset();
        let far = Pos::new(
            self.pos.x + (SHIP_LENGTH - 1) * f.x + (SHIP_WIDTH - 1) * r.x,
            self.pos.y + (SHIP_LENGTH - 1) * f.y + (SHIP_WIDTH - 1) * r.y,
        );
        (
            Pos::new(self.pos.x.min(far.x), self.pos.y.min(far.y)),
            Pos::new(self.pos.x.max(far.x), self.pos.y.max(far.y)),
        )
    }

    /// Advance one cell along the heading.
    pub fn move_forward(self) -> ShipPose {
        ShipPose::new(self.pos + self.dir.offset(), self.dir)
    }

    /// Rotate clockwise, pivoting about the bow: the core advances two cells
    /// before the heading turns.
    pub fn rotate_cw(self) -> ShipPose {
        let f = self.dir.offset();
        ShipPose::new(
            Pos::new(self.pos.x + 2 * f.x, self.pos.y + 2 * f.y),
            self.dir.rotate_cw(),
        )
    }

    /// Rotate anticlockwise, pivoting about the starboard bow: the core
    /// advances one cell forward and one to starboard.
    pub fn rotate_ccw(self) -> ShipPose {
        let f = self.dir.offset();
        let r = self.dir.rotate_cw().offset();
        ShipPose::new(
            Pos::new(self.pos.x + f.x + r.x, self.pos.y + f.y + r.y),
            self.dir.rotate_ccw(),
        )
    }

    /// True if the two hulls share at least one cell.
    pub fn overlaps(self, other: ShipPose) -> bool {
        let (a_min, a_max) = self.occupancy_rect();
        let (b_min, b_max) = other.occupancy_rect();
        a_min.x <= b_max.x && b_min.x <= a_max.x && a_min.y <= b_max.y && b_min.y <= a_max.y
    }

    /// True if the hull covers the given cell.
    pub fn covers(self, cell: Pos) -> bool {
        let (min, max) = self.occupancy_rect();
        min.x <= cell.x && cell.x <= max.x && min.y <= cell.y && cell.y <= max.y
    }
}

impl fmt::Display for ShipPose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:?}", self.pos, self.dir)
    }
}

// ---------------------------------------------------------------------------
// Entity id newtypes
// ---------------------------------------------------------------------------

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub usize);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(/// Index of a robot in the fleet (wire order).
RobotId);
entity_id!(/// Index of a ship in the fleet (wire order).
ShipId);
entity_id!(/// Index of a berth (wire order, 0..10).
BerthId);
entity_id!(/// Monotonic id of a goods item, assigned on arrival.
GoodsId);
entity_id!(/// Id of a detected single-lane corridor (1-based).
LaneId);
