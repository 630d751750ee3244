// Per-ship state: the oriented hull, its path cursor, the loading ledger,
// and the sea-route cache shared by the ship scheduler.
//
// Like robots, ships keep the judge's `world_state` (0 normal, 1 recovering,
// 2 loading) separate from the scheduler's own `status` machine. A ship
// whose predicted pose fails to materialize accumulates stillness; past a
// bound the scheduler repairs the route by splicing a detour back onto the
// surviving suffix of the old path.
//
// `SeaRouteCache` memoizes `(start, destination) → route`. It is a plain
// struct owned by the ship scheduler and passed by reference — the pipeline
// is single-threaded, so no locking is involved.
//
// See also: `ship_scheduler.rs` for the berth/delivery assignment driving
// these transitions, `pathfinding.rs` for `ShipSpace`.

use crate::map::Map;
use crate::pathfinding::{correct_orientation, find_path, Path, ShipSpace};
use crate::types::{BerthId, GoodsId, Pos, ShipId, ShipPose};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShipStatus {
    Idle,
    MovingToBerth,
    MovingToDelivery,
    Loading,
}

/// The single pose change a ship can be commanded per frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShipStep {
    Forward,
    RotateCw,
    RotateCcw,
}

#[derive(Clone, Debug)]
pub struct Ship {
    pub id: ShipId,
    pub pose: ShipPose,
    /// World-reported state: 0 normal, 1 recovering, 2 loading.
    pub world_state: u8,
    /// World-reported berth association.
    pub world_berth: Option<BerthId>,
    pub status: ShipStatus,
    /// Target berth while moving to or loading at one.
    pub berth: Option<BerthId>,
    /// Target delivery point index while delivering.
    pub delivery: Option<usize>,
    pub capacity: u32,
    pub goods_count: u32,
    pub loaded_value: u64,
    /// Items currently aboard.
    pub aboard: Vec<GoodsId>,
    pub destination: ShipPose,
    pub next_pose: ShipPose,
    pub path: Path<ShipPose>,
    /// Consecutive frames the ship failed to reach its predicted pose.
    pub stillness_frames: u32,
    /// Set when a departure trigger fired and `dept` is due this frame.
    pub should_depart: bool,
    /// Consecutive loading frames in which nothing arrived to load.
    pub idle_loading_frames: u32,
}

impl Ship {
    pub fn new(id: ShipId, pose: ShipPose, capacity: u32) -> Self {
        Self {
            id,
            pose,
            world_state: 0,
            world_berth: None,
            status: ShipStatus::Idle,
            berth: None,
            delivery: None,
            capacity,
            goods_count: 0,
            loaded_value: 0,
            aboard: Vec::new(),
            destination: ShipPose::UNSET,
            next_pose: ShipPose::UNSET,
            path: Path::new(),
            stillness_frames: 0,
            should_depart: false,
            idle_loading_frames: 0,
        }
    }

    /// Fold in this frame's world record, advancing or faulting the cursor.
    pub fn sync(&mut self, world_state: u8, world_berth: Option<BerthId>, pose: ShipPose) {
        self.world_state = world_state;
        self.world_berth = world_berth;
        if self.next_pose.is_set() && self.next_pose != self.pose {
            if pose == self.next_pose {
                if self.path.next_step() == Some(pose) {
                    self.path.advance();
                }
                self.stillness_frames = 0;
            } else {
                warn!(ship = %self.id, expected = %self.next_pose, actual = %pose,
                      "ship did not reach its predicted pose");
                self.stillness_frames += 1;
            }
        }
        self.pose = pose;
    }

    pub fn remaining_capacity(&self) -> u32 {
        self.capacity.saturating_sub(self.goods_count)
    }

    pub fn capacity_fraction(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.remaining_capacity() as f64 / self.capacity as f64
        }
    }

    /// Take up to `remaining_capacity` items aboard; returns how many were
    /// actually loaded. Loading a full ship is a no-op.
    pub fn load(&mut self, items: &[(GoodsId, u32)]) -> usize {
        let room = self.remaining_capacity() as usize;
        let accepted = items.len().min(room);
        for &(id, value) in &items[..accepted] {
            self.aboard.push(id);
            self.loaded_value += value as u64;
        }
        self.goods_count += accepted as u32;
        accepted
    }

    /// Empty the hold at a delivery point, returning the delivered items.
    pub fn unload_all(&mut self) -> Vec<GoodsId> {
        self.goods_count = 0;
        self.loaded_value = 0;
        std::mem::take(&mut self.aboard)
    }

    /// Predict next frame's pose from the cursor. Recovering ships hold.
    pub fn update_next_pose(&mut self) {
        self.next_pose = if !self.path.is_empty() && self.world_state != 1 {
            self.path.next_step().unwrap_or(self.pose)
        } else {
            self.pose
        };
    }

    /// Classify the predicted pose change as a wire command.
    pub fn step_command(&self) -> Option<ShipStep> {
        if !self.next_pose.is_set() || self.next_pose == self.pose {
            return None;
        }
        if self.next_pose == self.pose.move_forward() {
            Some(ShipStep::Forward)
        } else if self.next_pose == self.pose.rotate_cw() {
            Some(ShipStep::RotateCw)
        } else if self.next_pose == self.pose.rotate_ccw() {
            Some(ShipStep::RotateCcw)
        } else {
            warn!(ship = %self.id, from = %self.pose, to = %self.next_pose,
                  "predicted pose is not one step away");
            None
        }
    }

    pub fn reached_destination(&self) -> bool {
        self.destination.is_set() && self.destination.pos == self.pose.pos
    }

    pub fn is_idle(&self) -> bool {
        self.status == ShipStatus::Idle
    }

    pub fn set_moving_to_berth(&mut self, berth: BerthId, destination: ShipPose) {
        self.status = ShipStatus::MovingToBerth;
        self.berth = Some(berth);
        self.delivery = None;
        self.destination = destination;
        self.path.clear();
    }

    pub fn set_loading(&mut self) {
        self.status = ShipStatus::Loading;
        self.destination = ShipPose::UNSET;
        self.idle_loading_frames = 0;
        self.path.clear();
    }

    pub fn set_moving_to_delivery(&mut self, delivery: usize, destination: ShipPose) {
        self.status = ShipStatus::MovingToDelivery;
        self.delivery = Some(delivery);
        self.destination = destination;
        self.path.clear();
    }

    /// Clear departure bookkeeping once `dept` has been issued.
    pub fn reset_departure(&mut self) {
        self.should_depart = false;
        self.stillness_frames = 0;
        self.path.clear();
    }

    /// Priority for command-emission ordering: recovering ships yield, a
    /// ship whose next pose sits on the other's destination goes first,
    /// then the longer remaining path, then the lower id.
    pub fn has_priority_over(&self, other: &Ship) -> bool {
        let recovering = self.world_state == 1;
        let other_recovering = other.world_state == 1;
        if recovering != other_recovering {
            return other_recovering;
        }
        if other.destination.is_set()
            && self.next_pose.is_set()
            && self.next_pose.overlaps(other.destination)
        {
            return true;
        }
        if self.destination.is_set()
            && other.next_pose.is_set()
            && other.next_pose.overlaps(self.destination)
        {
            return false;
        }
        if self.path.len() != other.path.len() {
            return self.path.len() > other.path.len();
        }
        self.id < other.id
    }

    /// Splice a detour around whatever is blocking the next step: keep the
    /// farthest still-passable suffix point of the current path, route to it
    /// from here, and join the two.
    pub fn repair_route(&mut self, map: &Map) -> bool {
        if self.path.is_empty() {
            warn!(ship = %self.id, "route repair requested with no path");
            return false;
        }
        let steps = self.path.as_slice();
        let mut rejoin = None;
        for i in (0..steps.len()).rev() {
            if steps[i] != self.pose && map.ship_passable(steps[i]) {
                rejoin = Some(i);
                break;
            }
        }
        let (keep, target) = match rejoin {
            Some(i) => (i, steps[i]),
            None => (0, self.destination),
        };
        match find_path(&ShipSpace { map }, self.pose, target) {
            Ok(detour) => {
                self.path.splice_tail(keep, detour);
                self.stillness_frames = 0;
                true
            }
            Err(reason) => {
                warn!(ship = %self.id, %reason, "route repair failed");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Sea route cache
// ---------------------------------------------------------------------------

/// Memoized `(start, destination) → route` table for ship pathfinding.
/// Misses fall through to A* under the ship cost model, with the heading
/// corrected by suffix rotations at the destination.
#[derive(Clone, Debug, Default)]
pub struct SeaRouteCache {
    routes: BTreeMap<(ShipPose, ShipPose), (Vec<ShipPose>, u32)>,
}

impl SeaRouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The route from `start` to `destination`, computed on first request.
    pub fn route(&mut self, map: &Map, start: ShipPose, destination: ShipPose) -> Option<Path<ShipPose>> {
        if let Some((steps, cost)) = self.routes.get(&(start, destination)) {
            return Some(Path::from_reversed(steps.clone(), *cost));
        }
        match find_path(&ShipSpace { map }, start, destination) {
            Ok(mut path) => {
                correct_orientation(map, &mut path, start, destination.dir);
                self.routes.insert(
                    (start, destination),
                    (path.as_slice().to_vec(), path.cost),
                );
                Some(path)
            }
            Err(reason) => {
                warn!(%start, %destination, %reason, "sea route not found");
                None
            }
        }
    }

    /// Cost-model length of the route, if one exists.
    pub fn route_length(&mut self, map: &Map, start: ShipPose, destination: ShipPose) -> Option<u32> {
        self.route(map, start, destination).map(|p| p.cost)
    }

    #[cfg(test)]
    pub fn cached_routes(&self) -> usize {
        self.routes.len()
    }
}
