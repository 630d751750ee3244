// Per-robot state: the controller's local state machine layered over the
// read-only state the world reports each frame.
//
// `world_state` (0 stunned, 1 normal) comes from the judge and is never
// guessed; `status` is the controller's own finite state machine. A stunned
// report forces `Dizzy`; recovery re-derives the working status from what
// the robot is holding and targeting. `Death` is set once at init for
// robots standing on cells that reach no berth, and never leaves.
//
// See also: `robot_control.rs` which drives pathfinding and writes
// `next_pos`, `robot_scheduler.rs` which assigns targets.

use crate::pathfinding::Path;
use crate::types::{BerthId, GoodsId, Pos, RobotId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RobotStatus {
    Idle,
    MovingToGoods,
    MovingToBerth,
    /// Stunned by the world this frame; intent is cancelled.
    Dizzy,
    /// Standing where no berth is reachable. Irreversible.
    Death,
    /// At a berth slot, emitting `pull` this frame.
    Unloading,
}

#[derive(Clone, Debug)]
pub struct Robot {
    pub id: RobotId,
    pub pos: Pos,
    /// World-reported carrying flag.
    pub carrying: bool,
    /// The item in hand, tracked locally across frames.
    pub carrying_goods: Option<GoodsId>,
    /// The item this robot is walking toward.
    pub target_goods: Option<GoodsId>,
    /// The berth this robot is delivering to.
    pub target_berth: Option<BerthId>,
    pub destination: Pos,
    pub path: Path<Pos>,
    /// The cell this robot intends to occupy next frame.
    pub next_pos: Pos,
    pub status: RobotStatus,
    /// World-reported state: 0 stunned, 1 normal.
    pub world_state: u8,
}

impl Robot {
    pub fn new(id: RobotId, pos: Pos) -> Self {
        Self {
            id,
            pos,
            carrying: false,
            carrying_goods: None,
            target_goods: None,
            target_berth: None,
            destination: Pos::UNSET,
            path: Path::new(),
            next_pos: pos,
            status: RobotStatus::Idle,
            world_state: 1,
        }
    }

    /// Fold in this frame's world record. Advances the path cursor when the
    /// robot reached its predicted cell, and runs the Dizzy transitions.
    pub fn sync(&mut self, carrying: bool, pos: Pos, world_state: u8) {
        self.carrying = carrying;
        self.world_state = world_state;
        if self.path.next_step() == Some(pos) {
            self.path.advance();
        }
        self.pos = pos;
        if !carrying {
            self.carrying_goods = None;
        }

        if self.status == RobotStatus::Death {
            return;
        }
        if world_state == 0 {
            self.status = RobotStatus::Dizzy;
        } else if self.status == RobotStatus::Dizzy {
            self.recover();
        } else if self.status == RobotStatus::Unloading {
            // The drop-off was acknowledged; back to the pool.
            self.status = RobotStatus::Idle;
        }
    }

    /// Re-derive the working status after a stun ends.
    fn recover(&mut self) {
        self.status = if self.carrying && self.target_berth.is_some() {
            RobotStatus::MovingToBerth
        } else if self.target_goods.is_some() {
            RobotStatus::MovingToGoods
        } else {
            self.clear_target();
            RobotStatus::Idle
        };
    }

    /// Peek the path cursor into `next_pos`. Stunned or pathless robots
    /// stay put.
    pub fn update_next_pos(&mut self) {
        self.next_pos = if self.world_state == 0
            || self.status == RobotStatus::Dizzy
            || self.status == RobotStatus::Death
        {
            self.pos
        } else {
            self.path.next_step().unwrap_or(self.pos)
        };
    }

    /// True when the controller must run A* for this robot.
    pub fn needs_pathfinding(&self) -> bool {
        matches!(
            self.status,
            RobotStatus::MovingToGoods | RobotStatus::MovingToBerth
        ) && self.has_target()
            && self.path.is_empty()
            && self.destination.is_set()
            && self.destination != self.pos
    }

    pub fn has_target(&self) -> bool {
        self.target_goods.is_some() || self.target_berth.is_some()
    }

    pub fn clear_target(&mut self) {
        self.target_goods = None;
        self.target_berth = None;
        self.destination = Pos::UNSET;
        self.path.clear();
    }

    pub fn reset_to_idle(&mut self) {
        self.clear_target();
        if self.status != RobotStatus::Death {
            self.status = RobotStatus::Idle;
        }
    }

    /// Sidestep one cell to break a deadlock: go to `temp`, hold it one
    /// extra frame so the other party can pass, then return to the current
    /// cell and resume the remaining path.
    pub fn move_to_temporary(&mut self, temp: Pos) {
        self.path.push_next(self.pos);
        self.path.push_next(temp);
        self.path.push_next(temp);
        self.next_pos = temp;
    }

    /// Priority for conflict resolution: carrying beats fetching, then the
    /// shorter remaining path, then the lower id.
    pub fn has_priority_over(&self, other: &Robot) -> bool {
        if self.carrying != other.carrying {
            return self.carrying;
        }
        if self.path.len() != other.path.len() {
            return self.path.len() < other.path.len();
        }
        self.id < other.id
    }
}
