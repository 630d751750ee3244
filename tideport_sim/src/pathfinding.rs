// Generic A* over the two spatial models the harbor uses: the 4-connected
// walking grid for robots and the oriented hull poses for ships.
//
// The search is parameterized by a `SearchSpace`: neighbor generation, step
// cost, heuristic, and the goal test all come from the space, so one
// implementation serves both models. The open set is the decrease-key queue
// from `queue.rs`; a node whose cost improves is re-queued in place, so the
// open set never holds duplicates and no separate closed set is needed —
// stale pops are filtered by comparing against the best-known cost.
//
// Paths are stored reversed: the goal sits at index 0 and the next step is
// at the back, so advancing the cursor is a cheap `pop`. Callers depend on
// this layout.
//
// See also: `map.rs` for the terrain queries both spaces wrap, `robot.rs`
// and `ship.rs` for the path cursors that consume the result.
//
// **Critical constraint: determinism.** Open-set ties are broken by
// (f, g ascending, insertion order); the hash maps here are point-lookup
// tables only and never iterated.

use crate::map::Map;
use crate::queue::PriorityQueueWithRemove;
use crate::types::{Direction, Pos, ShipPose};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use thiserror::Error;

/// Why a search produced no path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum PathfindingFailure {
    #[error("start position is not passable")]
    StartBlocked,
    #[error("goal position is not passable")]
    GoalBlocked,
    #[error("open set exhausted before reaching the goal")]
    NoPath,
}

/// A found route, stored goal-first: `steps[0]` is the goal, the back is the
/// next step. The start node is not included.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Path<T> {
    steps: Vec<T>,
    /// Total step cost as reported by the search that produced the path.
    pub cost: u32,
}

impl<T: Copy> Path<T> {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            cost: 0,
        }
    }

    pub fn from_reversed(steps: Vec<T>, cost: u32) -> Self {
        Self { steps, cost }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// The step the cursor will take next, if any.
    pub fn next_step(&self) -> Option<T> {
        self.steps.last().copied()
    }

    /// Consume the next step.
    pub fn advance(&mut self) -> Option<T> {
        self.steps.pop()
    }

    /// Push a step to be taken immediately, before the current remainder.
    pub fn push_next(&mut self, step: T) {
        self.steps.push(step);
    }

    /// Append a step after the current final node (a new journey suffix).
    pub fn push_suffix(&mut self, step: T) {
        self.steps.insert(0, step);
    }

    pub fn as_slice(&self) -> &[T] {
        &self.steps
    }

    pub fn clear(&mut self) {
        self.steps.clear();
        self.cost = 0;
    }

    /// Keep the goal-side prefix `steps[..from]` and replace the near side
    /// with `detour` (which must end where the kept prefix resumes).
    pub fn splice_tail(&mut self, from: usize, detour: Path<T>) {
        self.steps.truncate(from);
        self.steps.extend(detour.steps);
    }
}

/// A searchable spatial model.
pub trait SearchSpace {
    type Node: Copy + Eq + Hash + fmt::Debug;

    fn neighbors(&self, n: Self::Node) -> Vec<Self::Node>;
    fn step_cost(&self, from: Self::Node, to: Self::Node) -> u32;
    fn heuristic(&self, n: Self::Node, goal: Self::Node) -> u32;
    fn goal_reached(&self, n: Self::Node, goal: Self::Node) -> bool;
    /// Pre-flight check for an impossible start; spaces that cannot tell
    /// may return true.
    fn start_valid(&self, n: Self::Node) -> bool;
    fn goal_valid(&self, n: Self::Node) -> bool;
}

/// A* over any `SearchSpace`.
pub fn find_path<S: SearchSpace>(
    space: &S,
    start: S::Node,
    goal: S::Node,
) -> Result<Path<S::Node>, PathfindingFailure> {
    if !space.start_valid(start) {
        return Err(PathfindingFailure::StartBlocked);
    }
    if !space.goal_valid(goal) {
        return Err(PathfindingFailure::GoalBlocked);
    }
    if space.goal_reached(start, goal) {
        return Ok(Path::new());
    }

    // Priority is (f, g, insertion seq): f breaks first, then lower g, then
    // earlier insertion.
    let mut open: PriorityQueueWithRemove<S::Node, (u32, u32, u64)> = PriorityQueueWithRemove::new();
    let mut best_g: HashMap<S::Node, u32> = HashMap::new();
    let mut came_from: HashMap<S::Node, S::Node> = HashMap::new();
    let mut seq: u64 = 0;

    best_g.insert(start, 0);
    open.insert(start, (space.heuristic(start, goal), 0, seq));

    while let Some((node, (_f, g, _seq))) = open.pop() {
        if g > *best_g.get(&node).unwrap_or(&u32::MAX) {
            continue;
        }
        if space.goal_reached(node, goal) {
            let mut steps = Vec::new();
            let mut cursor = node;
            while cursor != start {
                steps.push(cursor);
                cursor = came_from[&cursor];
            }
            return Ok(Path::from_reversed(steps, g));
        }
        for next in space.neighbors(node) {
            let candidate = g + space.step_cost(node, next);
            if candidate < *best_g.get(&next).unwrap_or(&u32::MAX) {
                best_g.insert(next, candidate);
                came_from.insert(next, node);
                seq += 1;
                open.insert(next, (candidate + space.heuristic(next, goal), candidate, seq));
            }
        }
    }

    Err(PathfindingFailure::NoPath)
}

// ---------------------------------------------------------------------------
// The two concrete spaces
// ---------------------------------------------------------------------------

/// Robot movement: 4-connected walking over passable cells, unit cost,
/// Manhattan heuristic.
pub struct RobotSpace<'a> {
    pub map: &'a Map,
}

impl SearchSpace for RobotSpace<'_> {
    type Node = Pos;

    fn neighbors(&self, n: Pos) -> Vec<Pos> {
        self.map.neighbors(n)
    }

    fn step_cost(&self, _from: Pos, _to: Pos) -> u32 {
        1
    }

    fn heuristic(&self, n: Pos, goal: Pos) -> u32 {
        n.manhattan_distance(goal)
    }

    fn goal_reached(&self, n: Pos, goal: Pos) -> bool {
        n == goal
    }

    fn start_valid(&self, n: Pos) -> bool {
        // The robot's own cell carries its obstacle marker during conflict
        // resolution, so only bounds are checked here.
        self.map.in_bounds(n)
    }

    fn goal_valid(&self, n: Pos) -> bool {
        self.map.passable(n)
    }
}

/// Ship movement: forward / rotate-clockwise / rotate-anticlockwise over
/// hull-passable poses. Steps that put the hull inside the coastal sea lane
/// cost 2, everything else 1. The goal test ignores heading — orientation is
/// corrected afterwards by suffix rotations.
pub struct ShipSpace<'a> {
    pub map: &'a Map,
}

impl SearchSpace for ShipSpace<'_> {
    type Node = ShipPose;

    fn neighbors(&self, n: ShipPose) -> Vec<ShipPose> {
        [n.move_forward(), n.rotate_cw(), n.rotate_ccw()]
            .into_iter()
            .filter(|&p| self.map.ship_passable(p))
            .collect()
    }

    fn step_cost(&self, _from: ShipPose, to: ShipPose) -> u32 {
        if self.map.pose_in_sea_lane(to) {
            2
        } else {
            1
        }
    }

    fn heuristic(&self, n: ShipPose, goal: ShipPose) -> u32 {
        n.pos.chebyshev_distance(goal.pos)
    }

    fn goal_reached(&self, n: ShipPose, goal: ShipPose) -> bool {
        n.pos == goal.pos
    }

    fn start_valid(&self, n: ShipPose) -> bool {
        self.map.ship_passable(n)
    }

    fn goal_valid(&self, n: ShipPose) -> bool {
        Direction::ALL
            .iter()
            .any(|&d| self.map.ship_passable(ShipPose::new(n.pos, d)))
    }
}

/// Append rotation steps so the path ends facing `goal_dir`. The reached
/// pose is the path's final node (or `start` for an empty path). Rotations
/// displace the hull, so each intermediate pose must be passable; if neither
/// rotation chain fits, the path is left as found and the reached pose is
/// returned unchanged.
pub fn correct_orientation(
    map: &Map,
    path: &mut Path<ShipPose>,
    start: ShipPose,
    goal_dir: Direction,
) -> ShipPose {
    let reached = path.as_slice().first().copied().unwrap_or(start);
    if reached.dir == goal_dir {
        return reached;
    }

    for rotate in [ShipPose::rotate_cw as fn(ShipPose) -> ShipPose, ShipPose::rotate_ccw] {
        let mut chain = Vec::new();
        let mut pose = reached;
        while pose.dir != goal_dir && chain.len() < 3 {
            pose = rotate(pose);
            if !map.ship_passable(pose) {
                chain.clear();
                break;
            }
            chain.push(pose);
        }
        if pose.dir == goal_dir && !chain.is_empty() {
            for step in chain {
                path.push_suffix(step);
            }
            return pose;
        }
    }
    reached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Map;
    use crate::types::Direction;

    fn open_map(n: usize) -> Map {
        let line = ".".repeat(n);
        let lines: Vec<&str> = (0..n).map(|_| line.as_str()).collect();
        Map::parse(&lines)
    }

    fn sea_map(n: usize) -> Map {
        let line = "*".repeat(n);
        let lines: Vec<&str> = (0..n).map(|_| line.as_str()).collect();
        Map::parse(&lines)
    }

    #[test]
    fn straight_path_has_manhattan_cost() {
        let map = open_map(8);
        let space = RobotSpace { map: &map };
        let path = find_path(&space, Pos::new(0, 0), Pos::new(0, 5)).unwrap();
        assert_eq!(path.len(), 5);
        assert_eq!(path.cost, 5);
        assert_eq!(path.as_slice()[0], Pos::new(0, 5));
        assert_eq!(path.next_step(), Some(Pos::new(0, 1)));
    }

    #[test]
    fn path_steps_are_adjacent_and_cost_adds_up() {
        let map = Map::parse(&[
            ".....",
            ".###.",
            ".....",
            ".###.",
            ".....",
        ]);
        let space = RobotSpace { map: &map };
        let start = Pos::new(0, 0);
        let goal = Pos::new(4, 4);
        let path = find_path(&space, start, goal).unwrap();

        let mut prev = start;
        let mut cost = 0;
        for &step in path.as_slice().iter().rev() {
            assert!(space.neighbors(prev).contains(&step), "{prev} -> {step}");
            cost += space.step_cost(prev, step);
            prev = step;
        }
        assert_eq!(prev, goal);
        assert_eq!(cost, path.cost);
    }

    #[test]
    fn tie_break_follows_neighbor_order() {
        let map = open_map(3);
        let space = RobotSpace { map: &map };
        // Two shortest routes exist; the even-sum reversal at (0, 0) makes
        // South the first expansion, so the route through (0, 1) wins.
        let path = find_path(&space, Pos::new(0, 0), Pos::new(1, 1)).unwrap();
        assert_eq!(path.as_slice(), &[Pos::new(1, 1), Pos::new(0, 1)]);
    }

    #[test]
    fn blocked_goal_is_reported() {
        let map = Map::parse(&["..#", "..#", "..#"]);
        let space = RobotSpace { map: &map };
        assert_eq!(
            find_path(&space, Pos::new(0, 0), Pos::new(0, 2)),
            Err(PathfindingFailure::GoalBlocked)
        );
    }

    #[test]
    fn walled_off_goal_exhausts_the_open_set() {
        let map = Map::parse(&[
            "..#..",
            "..#..",
            "..#..",
            "..#..",
            "..#..",
        ]);
        let space = RobotSpace { map: &map };
        assert_eq!(
            find_path(&space, Pos::new(0, 0), Pos::new(0, 4)),
            Err(PathfindingFailure::NoPath)
        );
    }

    #[test]
    fn start_at_goal_yields_empty_path() {
        let map = open_map(4);
        let space = RobotSpace { map: &map };
        let path = find_path(&space, Pos::new(2, 2), Pos::new(2, 2)).unwrap();
        assert!(path.is_empty());
        assert_eq!(path.cost, 0);
    }

    #[test]
    fn ship_path_reaches_goal_position_in_open_sea() {
        let map = sea_map(12);
        let space = ShipSpace { map: &map };
        let start = ShipPose::new(Pos::new(2, 2), Direction::East);
        let goal = ShipPose::new(Pos::new(2, 7), Direction::East);
        let path = find_path(&space, start, goal).unwrap();
        assert_eq!(path.as_slice()[0].pos, goal.pos);
        // Every step is one of the three legal moves from its predecessor.
        let mut prev = start;
        for &step in path.as_slice().iter().rev() {
            assert!(
                step == prev.move_forward()
                    || step == prev.rotate_cw()
                    || step == prev.rotate_ccw()
            );
            prev = step;
        }
    }

    #[test]
    fn sea_lane_steps_cost_double() {
        let map = sea_map(12);
        let space = ShipSpace { map: &map };
        // Interior pose: hull clear of the coastal margin.
        let interior = ShipPose::new(Pos::new(4, 4), Direction::East);
        assert_eq!(space.step_cost(interior, ShipPose::new(Pos::new(5, 4), Direction::East)), 1);
        // Pose whose hull touches the border row sits inside the margin.
        let coastal = ShipPose::new(Pos::new(0, 0), Direction::East);
        assert_eq!(space.step_cost(interior, coastal), 2);
    }

    #[test]
    fn orientation_correction_appends_rotations() {
        let map = sea_map(14);
        let space = ShipSpace { map: &map };
        let start = ShipPose::new(Pos::new(4, 4), Direction::East);
        let goal = ShipPose::new(Pos::new(4, 8), Direction::South);
        let mut path = find_path(&space, start, goal).unwrap();
        let final_pose = correct_orientation(&map, &mut path, start, Direction::South);
        assert_eq!(final_pose.dir, Direction::South);
        assert_eq!(path.as_slice()[0], final_pose);
    }

    #[test]
    fn path_cursor_advances_from_the_back() {
        let mut path = Path::from_reversed(vec![Pos::new(0, 3), Pos::new(0, 2), Pos::new(0, 1)], 3);
        assert_eq!(path.advance(), Some(Pos::new(0, 1)));
        assert_eq!(path.advance(), Some(Pos::new(0, 2)));
        assert_eq!(path.next_step(), Some(Pos::new(0, 3)));
        assert_eq!(path.len(), 1);
    }
}
