// Next-frame conflict detection and resolution for the robot fleet.
//
// After the scheduler hands out targets, this controller runs pathfinding
// for every robot that needs it, predicts each robot's next cell, and then
// repairs the predictions until no two robots want the same cell, want to
// swap cells, or try to enter a single lane against its lock.
//
// Resolution works with two tools: *wait* (hold this frame, `next_pos`
// snaps back to the current cell) and *refind* (pin the other robot's cell
// as a temporary obstacle and re-run A*). Obstacles pinned during one
// repair round are released at the start of the next, and the whole loop
// runs at most twice — residual conflicts are logged and the robots
// involved are held in place for the frame.
//
// See also: `lanes.rs` for the lock model behind the lane
// classifications, `map.rs` for the obstacle pins, `robot.rs` for the
// priority rule.
//
// **Critical constraint: determinism.** Conflicts are collected into an
// ordered set keyed by (id, id, kind) and processed in that order.

use crate::goods::GoodsTable;
use crate::lanes::SingleLaneManager;
use crate::map::Map;
use crate::pathfinding::{find_path, RobotSpace};
use crate::robot::{Robot, RobotStatus};
use crate::types::Pos;
use std::collections::BTreeSet;
use tracing::{debug, error, warn};

/// How many repair rounds run before residual conflicts are accepted.
const MAX_RESOLUTION_ROUNDS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum ConflictKind {
    /// Both robots want the same cell next frame.
    TargetOverlap,
    /// Each robot wants the other's current cell.
    SwapPositions,
    /// Both try to enter the same lane from opposite ends this frame.
    HeadOnAttempt,
    /// One robot tries to enter a lane locked against its entry.
    EntryAttemptWhileOccupied,
}

/// A detected conflict between robots `a < b` (`a == b` for single-robot
/// lane-entry events).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Conflict {
    a: usize,
    b: usize,
    kind: ConflictKind,
}

#[derive(Default)]
pub struct RobotController {
    wait_flags: Vec<bool>,
    refind_flags: Vec<bool>,
    /// Obstacles pinned during the current repair round.
    pinned: Vec<Pos>,
}

impl RobotController {
    pub fn new() -> Self {
        Self::default()
    }

    /// The per-frame pipeline: pathfind, predict, then repair.
    pub fn run(
        &mut self,
        map: &mut Map,
        lanes: &mut SingleLaneManager,
        robots: &mut [Robot],
        goods: &mut GoodsTable,
    ) {
        for robot in robots.iter_mut() {
            if robot.status == RobotStatus::Death {
                continue;
            }
            if robot.needs_pathfinding() {
                run_pathfinding(map, robot, goods);
            }
        }

        lanes.update_locks(robots);

        for robot in robots.iter_mut() {
            robot.update_next_pos();
        }

        for _round in 0..MAX_RESOLUTION_ROUNDS {
            self.reset(map, robots.len());
            let conflicts = detect_next_frame_conflicts(lanes, robots);
            if conflicts.is_empty() {
                break;
            }
            for conflict in &conflicts {
                self.resolve(map, robots, *conflict);
            }

            for i in 0..robots.len() {
                if self.refind_flags[i] {
                    refind_with_soft_obstacles(map, &mut robots[i], goods);
                    robots[i].update_next_pos();
                }
            }
            for i in 0..robots.len() {
                if self.wait_flags[i] {
                    robots[i].next_pos = robots[i].pos;
                }
            }
        }

        // Whatever survives two rounds is held in place for the frame.
        let residual = detect_next_frame_conflicts(lanes, robots);
        if !residual.is_empty() {
            warn!(count = residual.len(), "unresolved robot conflicts, holding participants");
            for c in &residual {
                robots[c.a].next_pos = robots[c.a].pos;
                robots[c.b].next_pos = robots[c.b].pos;
            }
        }

        self.release_pins(map);
    }

    /// Start a repair round clean: flags down, last round's pins released.
    fn reset(&mut self, map: &mut Map, robot_count: usize) {
        self.release_pins(map);
        self.wait_flags.clear();
        self.wait_flags.resize(robot_count, false);
        self.refind_flags.clear();
        self.refind_flags.resize(robot_count, false);
    }

    fn release_pins(&mut self, map: &mut Map) {
        for p in self.pinned.drain(..) {
            map.remove_temporary_obstacle(p);
        }
    }

    fn pin(&mut self, map: &mut Map, p: Pos) {
        map.add_temporary_obstacle(p);
        self.pinned.push(p);
    }

    fn wait(&mut self, robot: usize) {
        self.wait_flags[robot] = true;
    }

    fn refind(&mut self, robot: usize) {
        self.refind_flags[robot] = true;
    }

    fn resolve(&mut self, map: &mut Map, robots: &mut [Robot], conflict: Conflict) {
        let (a, b) = (conflict.a, conflict.b);
        match conflict.kind {
            ConflictKind::TargetOverlap => self.resolve_target_overlap(map, robots, a, b),
            ConflictKind::SwapPositions => self.resolve_swap(map, robots, a, b),
            ConflictKind::HeadOnAttempt => {
                self.wait(lower_priority(robots, a, b));
            }
            ConflictKind::EntryAttemptWhileOccupied => {
                self.wait(a);
            }
        }
    }

    fn resolve_target_overlap(&mut self, map: &mut Map, robots: &mut [Robot], a: usize, b: usize) {
        let a_stationary = robots[a].next_pos == robots[a].pos;
        let b_stationary = robots[b].next_pos == robots[b].pos;

        if a_stationary || b_stationary {
            if a_stationary && robots[a].next_pos == robots[b].destination {
                // The blocker is parked on b's destination; walking around
                // it cannot help.
                self.wait(b);
            } else if b_stationary && robots[b].next_pos == robots[a].destination {
                self.wait(a);
            } else if a_stationary {
                self.pin(map, robots[a].pos);
                self.refind(b);
            } else {
                self.pin(map, robots[b].pos);
                self.refind(a);
            }
            return;
        }

        let a_dizzy = robots[a].status == RobotStatus::Dizzy;
        let b_dizzy = robots[b].status == RobotStatus::Dizzy;
        if a_dizzy || b_dizzy {
            if !a_dizzy {
                self.pin(map, robots[b].pos);
                self.refind(a);
            } else if !b_dizzy {
                self.pin(map, robots[a].pos);
                self.refind(b);
            } else {
                // Two stunned robots cannot both be moving somewhere.
                error!(robot_a = a, robot_b = b, "overlap reported between two stunned robots");
            }
            return;
        }

        let a_at_bs_goal = robots[a].next_pos == robots[b].destination;
        let b_at_as_goal = robots[b].next_pos == robots[a].destination;
        if !a_at_bs_goal && !b_at_as_goal {
            self.resolve_passing_overlap(map, robots, a, b);
        } else if a_at_bs_goal && b_at_as_goal {
            self.wait(lower_priority(robots, a, b));
        } else if b_at_as_goal {
            self.wait(b);
        } else {
            self.wait(a);
        }
    }

    /// Both robots are merely passing through the contested cell. The lower
    /// priority robot waits and becomes an obstacle for the other's re-run,
    /// unless one of them could not re-route because its destination is
    /// under the other robot.
    fn resolve_passing_overlap(&mut self, map: &mut Map, robots: &mut [Robot], a: usize, b: usize) {
        let a_dst_open =
            robots[a].destination != robots[b].pos && map.passable(robots[a].destination);
        let b_dst_open =
            robots[b].destination != robots[a].pos && map.passable(robots[b].destination);
        match (a_dst_open, b_dst_open) {
            (false, false) => {
                self.wait(a);
                self.wait(b);
            }
            (false, true) => {
                self.wait(a);
                self.pin(map, robots[a].pos);
                self.refind(b);
            }
            (true, false) => {
                self.wait(b);
                self.pin(map, robots[b].pos);
                self.refind(a);
            }
            (true, true) => {
                let loser = lower_priority(robots, a, b);
                let winner = if loser == a { b } else { a };
                self.wait(loser);
                self.pin(map, robots[loser].pos);
                self.refind(winner);
            }
        }
    }

    fn resolve_swap(&mut self, map: &mut Map, robots: &mut [Robot], a: usize, b: usize) {
        if robots[a].status == RobotStatus::Dizzy || robots[b].status == RobotStatus::Dizzy {
            error!(robot_a = a, robot_b = b, "swap reported involving a stunned robot");
            return;
        }
        let a_dst_is_b = robots[a].destination == robots[b].pos;
        let b_dst_is_a = robots[b].destination == robots[a].pos;

        if a_dst_is_b && b_dst_is_a {
            self.resolve_deadlock(map, robots, a, b);
        } else if a_dst_is_b && !robots[b].path.is_empty() {
            self.wait(a);
            self.pin(map, robots[a].pos);
            self.refind(b);
        } else if b_dst_is_a && !robots[a].path.is_empty() {
            self.wait(b);
            self.pin(map, robots[b].pos);
            self.refind(a);
        } else {
            self.wait(a);
            self.pin(map, robots[a].pos);
            self.refind(b);
        }
    }

    /// Mutual-destination swap: neither can finish until the other moves.
    /// Sidestep one robot to any free neighbor not under the other robot;
    /// if no cell fits, both hold.
    fn resolve_deadlock(&mut self, map: &Map, robots: &mut [Robot], a: usize, b: usize) {
        debug!(robot_a = a, robot_b = b, "breaking a destination swap deadlock");
        let b_pos = robots[b].pos;
        for cell in map.neighbors(robots[a].pos) {
            if cell != b_pos {
                robots[a].move_to_temporary(cell);
                return;
            }
        }
        let a_pos = robots[a].pos;
        for cell in map.neighbors(robots[b].pos) {
            if cell != a_pos {
                robots[b].move_to_temporary(cell);
                return;
            }
        }
        self.wait(a);
        self.wait(b);
        warn!(robot_a = a, robot_b = b, "deadlock could not be sidestepped");
    }
}

/// The robot of the pair that must yield under the priority rule.
fn lower_priority(robots: &[Robot], a: usize, b: usize) -> usize {
    if robots[a].has_priority_over(&robots[b]) {
        b
    } else {
        a
    }
}

fn detect_next_frame_conflicts(
    lanes: &SingleLaneManager,
    robots: &[Robot],
) -> BTreeSet<Conflict> {
    let mut conflicts = BTreeSet::new();

    for i in 0..robots.len() {
        for j in (i + 1)..robots.len() {
            let (r1, r2) = (&robots[i], &robots[j]);
            if r1.next_pos == r2.next_pos {
                conflicts.insert(Conflict {
                    a: i,
                    b: j,
                    kind: ConflictKind::TargetOverlap,
                });
            } else if r1.next_pos == r2.pos && r2.next_pos == r1.pos {
                conflicts.insert(Conflict {
                    a: i,
                    b: j,
                    kind: ConflictKind::SwapPositions,
                });
            } else if let (Some(next1), None, None, Some(next2)) = (
                lanes.lane_id(r1.next_pos),
                lanes.lane_id(r1.pos),
                lanes.lane_id(r2.pos),
                lanes.lane_id(r2.next_pos),
            ) {
                // Same-cell entry was already classified as TargetOverlap, so
                // this is entry from opposite endpoints in the same frame.
                if next1 == next2
                    && lanes.is_entering_lane(next1, r1.next_pos)
                    && lanes.is_entering_lane(next2, r2.next_pos)
                {
                    conflicts.insert(Conflict {
                        a: i,
                        b: j,
                        kind: ConflictKind::HeadOnAttempt,
                    });
                }
            }
        }
    }

    // Lane-entry-while-locked involves a single robot against the lane
    // state, so it gets its own scan.
    for (i, robot) in robots.iter().enumerate() {
        if robot.next_pos == robot.pos {
            continue;
        }
        if let (Some(lane), None) = (lanes.lane_id(robot.next_pos), lanes.lane_id(robot.pos)) {
            if lanes.is_locked(lane, robot.next_pos) {
                conflicts.insert(Conflict {
                    a: i,
                    b: i,
                    kind: ConflictKind::EntryAttemptWhileOccupied,
                });
            }
        }
    }

    conflicts
}

/// Re-route after a conflict, first treating cells other robots could reach
/// within a frame as soft obstacles. If no route survives the soft pins,
/// fall back to a plain search — a blocked detour is worse than a risky one.
fn refind_with_soft_obstacles(map: &mut Map, robot: &mut Robot, goods: &mut GoodsTable) {
    let mut soft_pins = Vec::new();
    for cell in map.collision_risk(robot.id, 1) {
        if cell != robot.pos && cell != robot.destination {
            map.add_temporary_obstacle(cell);
            soft_pins.push(cell);
        }
    }
    let careful = find_path(&RobotSpace { map }, robot.pos, robot.destination);
    for cell in soft_pins {
        map.remove_temporary_obstacle(cell);
    }
    match careful {
        Ok(path) => {
            debug!(robot = %robot.id,
                   blockers = map.nearby_temporary_obstacles(robot.pos, 2).len(),
                   "rerouted around traffic");
            robot.path = path;
        }
        Err(_) => run_pathfinding(map, robot, goods),
    }
}

/// Route the robot to its destination; on failure release its claim and
/// return it to idle.
fn run_pathfinding(map: &Map, robot: &mut Robot, goods: &mut GoodsTable) {
    match find_path(&RobotSpace { map }, robot.pos, robot.destination) {
        Ok(path) => {
            robot.path = path;
        }
        Err(reason) => {
            debug!(robot = %robot.id, destination = %robot.destination, %reason,
                   "pathfinding failed, dropping target");
            if let Some(id) = robot.target_goods {
                goods.release(id);
            }
            robot.reset_to_idle();
        }
    }
}
