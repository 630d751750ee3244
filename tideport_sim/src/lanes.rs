// Single-lane corridors: 1-wide passages where two robots cannot pass each
// other, found once at init and guarded with directional locks each frame.
//
// A corridor cell is a passable cell with at most two passable neighbors.
// Maximal connected runs of such cells (at least `min_lane_length` long)
// become lanes; the run's end cells that touch a wider area are its entry
// endpoints. Ring-shaped runs have no endpoints and are not lanes.
//
// Locks are rebuilt every frame from robot positions and headings: a robot
// inside a lane blocks entry from the endpoint it is moving toward (a
// head-on meeting could not resolve inside the corridor), and a stationary
// robot blocks both ends.
//
// See also: `robot_control.rs` for the conflict classifications that
// consult these locks.

use crate::map::{Grid, Map};
use crate::robot::Robot;
use crate::types::{LaneId, Pos};

#[derive(Clone, Debug)]
pub struct SingleLane {
    pub id: LaneId,
    /// Corridor cells in walk order from one end to the other.
    pub cells: Vec<Pos>,
    /// The end cells robots enter and leave through (1 for a dead end).
    pub entries: Vec<Pos>,
}

impl SingleLane {
    fn index_of(&self, p: Pos) -> Option<usize> {
        self.cells.iter().position(|&c| c == p)
    }
}

/// Entries of one lane currently unsafe to enter.
#[derive(Clone, Debug, Default)]
struct LaneLock {
    blocked_entries: Vec<Pos>,
}

pub struct SingleLaneManager {
    /// Lane id per cell; 0 marks "not in a lane".
    lane_of: Grid<u32>,
    lanes: Vec<SingleLane>,
    locks: Vec<LaneLock>,
}

impl SingleLaneManager {
    /// Scan the map for corridors. Run once at init.
    pub fn build(map: &Map, min_lane_length: usize) -> Self {
        let rows = map.rows();
        let cols = map.cols();
        let mut candidate = Grid::new(rows, cols, false);
        for x in 0..rows as i32 {
            for y in 0..cols as i32 {
                let p = Pos::new(x, y);
                if map.passable(p) && passable_neighbor_count(map, p) <= 2 {
                    candidate.set(p, true);
                }
            }
        }

        let mut lane_of = Grid::new(rows, cols, 0u32);
        let mut lanes = Vec::new();
        let mut visited = Grid::new(rows, cols, false);

        for x in 0..rows as i32 {
            for y in 0..cols as i32 {
                let start = Pos::new(x, y);
                if !candidate.get(start) || visited.get(start) {
                    continue;
                }
                let component = collect_component(map, &candidate, &mut visited, start);
                let Some(ordered) = order_as_path(map, &candidate, &component) else {
                    continue; // a ring has no entry and is not a lane
                };
                if ordered.len() < min_lane_length {
                    continue;
                }
                let id = LaneId(lanes.len() + 1);
                for &c in &ordered {
                    lane_of.set(c, id.0 as u32);
                }
                let mut entries = Vec::new();
                for &end in [ordered.first(), ordered.last()].into_iter().flatten() {
                    if !entries.contains(&end) {
                        entries.push(end);
                    }
                }
                lanes.push(SingleLane {
                    id,
                    cells: ordered,
                    entries,
                });
            }
        }

        let lock_count = lanes.len();
        Self {
            lane_of,
            lanes,
            locks: vec![LaneLock::default(); lock_count],
        }
    }

    pub fn lane_id(&self, p: Pos) -> Option<LaneId> {
        if p.x < 0
            || p.y < 0
            || p.x as usize >= self.lane_of.rows()
            || p.y as usize >= self.lane_of.cols()
        {
            return None;
        }
        match self.lane_of.get(p) {
            0 => None,
            id => Some(LaneId(id as usize)),
        }
    }

    pub fn lane(&self, id: LaneId) -> &SingleLane {
        &self.lanes[id.0 - 1]
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Is `p` one of the lane's entry endpoints?
    pub fn is_entering_lane(&self, id: LaneId, p: Pos) -> bool {
        self.lane(id).entries.contains(&p)
    }

    /// Is entry into the lane from `p` currently contradicted by an
    /// occupant's direction of travel?
    pub fn is_locked(&self, id: LaneId, p: Pos) -> bool {
        self.locks[id.0 - 1].blocked_entries.contains(&p)
    }

    /// Rebuild all locks from this frame's robot occupancy.
    pub fn update_locks(&mut self, robots: &[Robot]) {
        for lock in &mut self.locks {
            lock.blocked_entries.clear();
        }
        for robot in robots {
            let Some(id) = self.lane_id(robot.pos) else {
                continue;
            };
            let lane = &self.lanes[id.0 - 1];
            let Some(idx) = lane.index_of(robot.pos) else {
                continue;
            };
            let heading = match robot.path.next_step() {
                Some(step) => match lane.index_of(step) {
                    Some(j) => (j as i64 - idx as i64).signum(),
                    // Next step leaves the lane: the robot exits through the
                    // end it is standing on.
                    None if idx == 0 => -1,
                    None => 1,
                },
                None => 0,
            };
            let mut blocked = Vec::new();
            match heading {
                1 => blocked.push(*lane.cells.last().expect("lane is non-empty")),
                -1 => blocked.push(lane.cells[0]),
                _ => {
                    blocked.push(lane.cells[0]);
                    blocked.push(*lane.cells.last().expect("lane is non-empty"));
                }
            }
            let lock = &mut self.locks[id.0 - 1];
            for b in blocked {
                if !lock.blocked_entries.contains(&b) {
                    lock.blocked_entries.push(b);
                }
            }
        }
    }
}

fn passable_neighbor_count(map: &Map, p: Pos) -> usize {
    crate::types::Direction::ALL
        .iter()
        .filter(|d| map.passable(p + d.offset()))
        .count()
}

fn collect_component(
    map: &Map,
    candidate: &Grid<bool>,
    visited: &mut Grid<bool>,
    start: Pos,
) -> Vec<Pos> {
    let mut component = Vec::new();
    let mut stack = vec![start];
    visited.set(start, true);
    while let Some(p) = stack.pop() {
        component.push(p);
        for d in crate::types::Direction::ALL {
            let n = p + d.offset();
            if map.passable(n) && candidate.get(n) && !visited.get(n) {
                visited.set(n, true);
                stack.push(n);
            }
        }
    }
    component
}

/// Order a corridor component from one end to the other. Returns `None` for
/// components with no endpoint (rings).
fn order_as_path(map: &Map, candidate: &Grid<bool>, component: &[Pos]) -> Option<Vec<Pos>> {
    let in_component = |p: Pos| component.contains(&p);
    let degree = |p: Pos| {
        crate::types::Direction::ALL
            .iter()
            .filter(|d| {
                let n = p + d.offset();
                map.passable(n) && candidate.get(n) && in_component(n)
            })
            .count()
    };
    let mut ends: Vec<Pos> = component.iter().copied().filter(|&p| degree(p) <= 1).collect();
    ends.sort();
    let start = *ends.first()?;

    let mut ordered = vec![start];
    let mut prev = None;
    let mut current = start;
    while ordered.len() < component.len() {
        let mut advanced = false;
        for d in crate::types::Direction::ALL {
            let n = current + d.offset();
            if Some(n) != prev && map.passable(n) && candidate.get(n) && in_component(n) {
                ordered.push(n);
                prev = Some(current);
                current = n;
                advanced = true;
                break;
            }
        }
        if !advanced {
            break;
        }
    }
    Some(ordered)
}
