// Berth and delivery assignment for the ship fleet.
//
// Each frame, ships are processed in priority order (recovering ships last,
// then blockers first, longer paths first). Idle ships are priced against
// every admissible berth — expected value on and incoming to the berth,
// divided by the full round trip of travel, loading, and transport — and
// sent to the best one. Loading ships stay until a departure trigger fires:
// the hold is nearly full, the berth ran dry for too long, or the remaining
// game frames barely cover the trip to a delivery point.
//
// Admission control is the inter-ship collision story: at most
// `max_ships_per_berth` ships target a berth, departures are followed by a
// reassignment hysteresis, and ships that still end up blocked accumulate
// stillness and splice a detour. No pairwise pose resolution is attempted.
//
// See also: `ship.rs` for the per-ship state machine and the route cache,
// `berth.rs` for slot arithmetic, `config.rs` for the thresholds.

use crate::berth::Berth;
use crate::config::{Params, FINAL_FRAME};
use crate::goods::{GoodsStatus, GoodsTable};
use crate::map::Map;
use crate::pathfinding::Path;
use crate::ship::{SeaRouteCache, Ship, ShipStatus, ShipStep};
use crate::types::{BerthId, Direction, ShipPose};
use std::collections::BTreeMap;
use tideport_proto::Command;
use tracing::{debug, warn};

/// Safety margin, in frames, on the end-of-game departure deadline.
const DEPARTURE_MARGIN: u32 = 5;

pub struct ShipScheduler {
    params: Params,
    pub routes: SeaRouteCache,
    /// `(ship, berth)` → frame the ship departed that berth.
    recently_left: BTreeMap<(usize, usize), u32>,
}

impl ShipScheduler {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            routes: SeaRouteCache::new(),
            recently_left: BTreeMap::new(),
        }
    }

    /// One scheduling pass over the fleet.
    pub fn step(
        &mut self,
        frame: u32,
        map: &Map,
        ships: &mut [Ship],
        berths: &mut [Berth],
        goods: &mut GoodsTable,
        out: &mut Vec<Command>,
    ) {
        let mut occupancy = vec![0usize; berths.len()];
        for ship in ships.iter() {
            if let Some(b) = ship.berth {
                if matches!(ship.status, ShipStatus::MovingToBerth | ShipStatus::Loading)
                    && b.0 < occupancy.len()
                {
                    occupancy[b.0] += 1;
                }
            }
        }

        for idx in priority_order(ships) {
            self.step_ship(frame, map, idx, ships, berths, goods, &mut occupancy, out);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn step_ship(
        &mut self,
        frame: u32,
        map: &Map,
        idx: usize,
        ships: &mut [Ship],
        berths: &mut [Berth],
        goods: &mut GoodsTable,
        occupancy: &mut [usize],
        out: &mut Vec<Command>,
    ) {
        let ship = &mut ships[idx];
        if ship.world_state == 1 {
            // Recovering: the judge ignores movement commands this frame.
            return;
        }

        match ship.status {
            ShipStatus::Idle => {
                self.assign_berth(frame, map, idx, ship, berths, goods, occupancy);
            }
            ShipStatus::MovingToBerth => {
                if ship.reached_destination() {
                    out.push(Command::Berth { ship: idx });
                    ship.set_loading();
                } else {
                    self.advance(map, idx, ship, out);
                }
            }
            ShipStatus::Loading => {
                self.load_or_depart(frame, map, idx, ship, berths, goods, out);
            }
            ShipStatus::MovingToDelivery => {
                if ship.reached_destination() {
                    for id in ship.unload_all() {
                        if let Some(g) = goods.get_mut(id) {
                            g.status = GoodsStatus::Delivered;
                        }
                    }
                    debug!(ship = %ship.id, "delivery complete");
                    ship.berth = None;
                    ship.delivery = None;
                    ship.destination = ShipPose::UNSET;
                    ship.path.clear();
                    ship.status = ShipStatus::Idle;
                } else {
                    self.advance(map, idx, ship, out);
                }
            }
        }
    }

    /// Send an idle ship to the admissible berth with the best expected
    /// value per frame of round trip.
    #[allow(clippy::too_many_arguments)]
    fn assign_berth(
        &mut self,
        frame: u32,
        map: &Map,
        idx: usize,
        ship: &mut Ship,
        berths: &[Berth],
        goods: &GoodsTable,
        occupancy: &mut [usize],
    ) {
        let mut best: Option<(f64, usize, ShipPose)> = None;
        for (b, berth) in berths.iter().enumerate() {
            let Some(dock) = berth.docking_pose else {
                continue;
            };
            if occupancy[b] >= self.params.max_ships_per_berth {
                continue;
            }
            if let Some(&left) = self.recently_left.get(&(idx, b)) {
                if frame.saturating_sub(left) < self.params.berth_reassign_hysteresis {
                    continue;
                }
            }

            let stored_value: u64 = berth
                .stored_ids()
                .filter_map(|id| goods.get(id))
                .map(|g| g.value as u64)
                .sum();
            let incoming_value: u64 = berth
                .incoming
                .iter()
                .filter_map(|&id| goods.get(id))
                .map(|g| g.value as u64)
                .sum();
            let expected = stored_value + incoming_value;
            if expected == 0 {
                continue;
            }

            let Some(travel) = self.routes.route_length(map, ship.pose, dock) else {
                continue;
            };
            let item_count = berth.stored_count() + berth.incoming.len() as u32;
            let load_time = item_count.div_ceil(berth.loading_velocity.max(1));
            let round_trip = (travel + load_time + berth.transport_time).max(1);
            let profit = expected as f64 / round_trip as f64;

            if best.map_or(true, |(p, _, _)| profit > p) {
                best = Some((profit, b, dock));
            }
        }

        if let Some((_, b, dock)) = best {
            debug!(ship = %ship.id, berth = b, "assigning ship to berth");
            ship.set_moving_to_berth(BerthId(b), dock);
            if let Some(route) = self.routes.route(map, ship.pose, dock) {
                ship.path = route;
            }
            occupancy[b] += 1;
        }
    }

    /// Load at the berth's velocity and fire departure triggers.
    #[allow(clippy::too_many_arguments)]
    fn load_or_depart(
        &mut self,
        frame: u32,
        map: &Map,
        idx: usize,
        ship: &mut Ship,
        berths: &mut [Berth],
        goods: &mut GoodsTable,
        out: &mut Vec<Command>,
    ) {
        let Some(berth_id) = ship.berth else {
            warn!(ship = %ship.id, "loading ship has no berth, resetting to idle");
            ship.status = ShipStatus::Idle;
            return;
        };
        let berth = &mut berths[berth_id.0];

        let want = berth.loading_velocity.min(ship.remaining_capacity());
        let taken = berth.take_up_to(want);
        if taken.is_empty() {
            ship.idle_loading_frames += 1;
        } else {
            ship.idle_loading_frames = 0;
            let items: Vec<_> = taken
                .iter()
                .map(|&id| (id, goods.get(id).map_or(0, |g| g.value)))
                .collect();
            ship.load(&items);
        }

        let capacity_low = ship.remaining_capacity() < self.params.capacity_gap
            || ship.capacity_fraction() < self.params.able_depart_scale;
        let waited_out = ship.goods_count > 0
            && berth.incoming.is_empty()
            && ship.idle_loading_frames >= self.params.ship_wait_time_limit;
        let deadline = ship.goods_count > 0
            && self
                .nearest_delivery_length(map, ship.pose)
                .is_some_and(|len| frame + len + DEPARTURE_MARGIN >= FINAL_FRAME);

        if capacity_low || waited_out || deadline {
            ship.should_depart = true;
        }
        if !ship.should_depart {
            return;
        }

        match self.nearest_delivery(map, ship.pose) {
            Some((delivery, dest, route)) => {
                out.push(Command::Dept { ship: idx });
                self.recently_left.insert((idx, berth_id.0), frame);
                ship.reset_departure();
                ship.set_moving_to_delivery(delivery, dest);
                ship.path = route;
            }
            None => {
                warn!(ship = %ship.id, "no reachable delivery point, staying docked");
                ship.should_depart = false;
            }
        }
    }

    /// Keep a moving ship moving: route if the path is gone, repair after
    /// too much stillness, then emit the step command.
    fn advance(
        &mut self,
        map: &Map,
        idx: usize,
        ship: &mut Ship,
        out: &mut Vec<Command>,
    ) {
        if ship.path.is_empty() {
            match self.routes.route(map, ship.pose, ship.destination) {
                Some(route) => ship.path = route,
                None => {
                    warn!(ship = %ship.id, destination = %ship.destination,
                          "no route to destination, dropping assignment");
                    ship.berth = None;
                    ship.delivery = None;
                    ship.destination = ShipPose::UNSET;
                    ship.status = ShipStatus::Idle;
                    return;
                }
            }
        }
        if ship.stillness_frames >= self.params.ship_stillness_bound {
            ship.repair_route(map);
        }
        ship.update_next_pose();
        match ship.step_command() {
            Some(ShipStep::Forward) => out.push(Command::ShipForward { ship: idx }),
            Some(ShipStep::RotateCw) => out.push(Command::Rotate { ship: idx, dir: 0 }),
            Some(ShipStep::RotateCcw) => out.push(Command::Rotate { ship: idx, dir: 1 }),
            None => {}
        }
    }

    fn nearest_delivery_length(&mut self, map: &Map, pose: ShipPose) -> Option<u32> {
        self.nearest_delivery(map, pose).map(|(_, _, route)| route.cost)
    }

    /// The delivery point with the shortest sea route from `pose`.
    fn nearest_delivery(
        &mut self,
        map: &Map,
        pose: ShipPose,
    ) -> Option<(usize, ShipPose, Path<ShipPose>)> {
        let points: Vec<_> = map.delivery_points().to_vec();
        let mut best: Option<(u32, usize, ShipPose)> = None;
        for (i, &p) in points.iter().enumerate() {
            let Some(dest) = Direction::ALL
                .into_iter()
                .map(|d| ShipPose::new(p, d))
                .find(|&pose| map.ship_passable(pose))
            else {
                continue;
            };
            let Some(len) = self.routes.route_length(map, pose, dest) else {
                continue;
            };
            if best.map_or(true, |(l, _, _)| len < l) {
                best = Some((len, i, dest));
            }
        }
        let (_, i, dest) = best?;
        let route = self.routes.route(map, pose, dest)?;
        Some((i, dest, route))
    }
}

/// Fleet processing order by pairwise priority wins, ties toward lower ids.
fn priority_order(ships: &[Ship]) -> Vec<usize> {
    let n = ships.len();
    let mut wins = vec![0usize; n];
    for i in 0..n {
        for j in 0..n {
            if i != j && ships[i].has_priority_over(&ships[j]) {
                wins[i] += 1;
            }
        }
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| (std::cmp::Reverse(wins[i]), i));
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GoodsId, Pos, ShipId};

    fn sea_map(n: usize) -> Map {
        let line = "*".repeat(n);
        let lines: Vec<&str> = (0..n).map(|_| line.as_str()).collect();
        Map::parse(&lines)
    }

    fn docked_ship(capacity: u32) -> Ship {
        let mut ship = Ship::new(
            ShipId(0),
            ShipPose::new(Pos::new(8, 8), Direction::East),
            capacity,
        );
        ship.world_state = 2;
        ship.status = ShipStatus::Loading;
        ship.berth = Some(BerthId(0));
        ship
    }

    fn berth_with_goods(goods: &mut GoodsTable, count: usize) -> Berth {
        let mut berth = Berth::new(BerthId(0), Pos::new(0, 0), 100, 2);
        let cells: Vec<Pos> = berth.cells().collect();
        for i in 0..count {
            let id = goods.spawn(cells[i], 40, 0);
            goods.get_mut(id).unwrap().status = GoodsStatus::AtBerth;
            berth.store(cells[i], id);
        }
        berth
    }

    #[test]
    fn nearly_full_ship_departs_for_delivery() {
        let map = sea_map(20);
        let mut goods = GoodsTable::new();
        let mut berths = vec![berth_with_goods(&mut goods, 0)];
        // 25 of 30 aboard leaves 5 < CAPACITY_GAP.
        let mut ship = docked_ship(30);
        ship.goods_count = 25;
        ship.loaded_value = 500;
        let mut ships = vec![ship];

        let mut sched = ShipScheduler::new(Params::default());
        let mut out = Vec::new();
        sched.step(100, &map, &mut ships, &mut berths, &mut goods, &mut out);

        assert!(out.contains(&Command::Dept { ship: 0 }));
        assert_eq!(ships[0].status, ShipStatus::MovingToDelivery);
        assert!(ships[0].delivery.is_some());
        assert!(!ships[0].path.is_empty());
        assert!(!ships[0].should_depart);
    }

    #[test]
    fn loading_consumes_slots_at_the_berth_velocity() {
        let map = sea_map(20);
        let mut goods = GoodsTable::new();
        let mut berths = vec![berth_with_goods(&mut goods, 3)];
        let mut ships = vec![docked_ship(30)];

        let mut sched = ShipScheduler::new(Params::default());
        let mut out = Vec::new();
        sched.step(100, &map, &mut ships, &mut berths, &mut goods, &mut out);
        assert_eq!(ships[0].goods_count, 2);
        assert_eq!(ships[0].loaded_value, 80);
        assert_eq!(berths[0].stored_count(), 1);

        sched.step(101, &map, &mut ships, &mut berths, &mut goods, &mut out);
        assert_eq!(ships[0].goods_count, 3);
        assert_eq!(berths[0].stored_count(), 0);
        // Plenty of room left: no departure yet.
        assert_eq!(ships[0].status, ShipStatus::Loading);
    }

    #[test]
    fn dry_berth_times_the_ship_out() {
        let map = sea_map(20);
        let mut goods = GoodsTable::new();
        let mut berths = vec![berth_with_goods(&mut goods, 1)];
        let mut ships = vec![docked_ship(30)];

        let mut params = Params::default();
        params.ship_wait_time_limit = 3;
        let mut sched = ShipScheduler::new(params);
        let mut out = Vec::new();

        // Frame 1 loads the only item; the next three frames run dry.
        for frame in 0..5 {
            sched.step(100 + frame, &map, &mut ships, &mut berths, &mut goods, &mut out);
            if ships[0].status != ShipStatus::Loading {
                break;
            }
        }
        assert_eq!(ships[0].status, ShipStatus::MovingToDelivery);
        assert!(out.contains(&Command::Dept { ship: 0 }));
        assert_eq!(ships[0].goods_count, 1);
    }

    #[test]
    fn idle_ship_is_priced_onto_a_stocked_berth() {
        let map = sea_map(20);
        let mut goods = GoodsTable::new();
        let mut stocked = berth_with_goods(&mut goods, 4);
        stocked.docking_pose = Some(ShipPose::new(Pos::new(10, 4), Direction::East));
        let mut berths = vec![stocked];

        let mut ship = Ship::new(
            ShipId(0),
            ShipPose::new(Pos::new(10, 14), Direction::West),
            30,
        );
        ship.world_state = 0;
        let mut ships = vec![ship];

        let mut sched = ShipScheduler::new(Params::default());
        let mut out = Vec::new();
        sched.step(10, &map, &mut ships, &mut berths, &mut goods, &mut out);

        assert_eq!(ships[0].status, ShipStatus::MovingToBerth);
        assert_eq!(ships[0].berth, Some(BerthId(0)));
        assert!(!ships[0].path.is_empty());
    }

    #[test]
    fn empty_berths_attract_no_ships() {
        let map = sea_map(20);
        let mut goods = GoodsTable::new();
        let mut empty = Berth::new(BerthId(0), Pos::new(0, 0), 100, 2);
        empty.docking_pose = Some(ShipPose::new(Pos::new(10, 4), Direction::East));
        let mut berths = vec![empty];

        let ship = Ship::new(
            ShipId(0),
            ShipPose::new(Pos::new(10, 14), Direction::West),
            30,
        );
        let mut ships = vec![ship];

        let mut sched = ShipScheduler::new(Params::default());
        let mut out = Vec::new();
        sched.step(10, &map, &mut ships, &mut berths, &mut goods, &mut out);
        assert_eq!(ships[0].status, ShipStatus::Idle);
        assert!(out.is_empty());
    }

    #[test]
    fn arrival_at_the_dock_emits_berth_and_loads() {
        let map = sea_map(20);
        let mut goods = GoodsTable::new();
        let mut berths = vec![berth_with_goods(&mut goods, 1)];
        let dock = ShipPose::new(Pos::new(8, 8), Direction::East);
        let mut ship = Ship::new(ShipId(0), dock, 30);
        ship.status = ShipStatus::MovingToBerth;
        ship.berth = Some(BerthId(0));
        ship.destination = dock;
        let mut ships = vec![ship];

        let mut sched = ShipScheduler::new(Params::default());
        let mut out = Vec::new();
        sched.step(10, &map, &mut ships, &mut berths, &mut goods, &mut out);
        assert!(out.contains(&Command::Berth { ship: 0 }));
        assert_eq!(ships[0].status, ShipStatus::Loading);
    }

    #[test]
    fn delivery_arrival_unloads_and_idles() {
        let map = sea_map(20);
        let mut goods = GoodsTable::new();
        let aboard = goods.spawn(Pos::new(0, 0), 70, 0);
        goods.get_mut(aboard).unwrap().status = GoodsStatus::AtBerth;
        let mut berths = vec![berth_with_goods(&mut goods, 0)];

        let here = ShipPose::new(Pos::new(9, 9), Direction::East);
        let mut ship = Ship::new(ShipId(0), here, 30);
        ship.status = ShipStatus::MovingToDelivery;
        ship.delivery = Some(0);
        ship.destination = here;
        ship.load(&[(aboard, 70)]);
        let mut ships = vec![ship];

        let mut sched = ShipScheduler::new(Params::default());
        let mut out = Vec::new();
        sched.step(10, &map, &mut ships, &mut berths, &mut goods, &mut out);

        assert_eq!(ships[0].status, ShipStatus::Idle);
        assert_eq!(ships[0].goods_count, 0);
        assert_eq!(goods.get(aboard).unwrap().status, GoodsStatus::Delivered);
    }

    #[test]
    fn hysteresis_keeps_a_ship_off_the_berth_it_just_left() {
        let map = sea_map(20);
        let mut goods = GoodsTable::new();
        let mut berths = vec![berth_with_goods(&mut goods, 0)];
        berths[0].docking_pose = Some(ShipPose::new(Pos::new(10, 4), Direction::East));

        let mut ship = docked_ship(30);
        ship.goods_count = 25;
        let mut ships = vec![ship];

        let mut sched = ShipScheduler::new(Params::default());
        let mut out = Vec::new();
        // Departs under the capacity trigger.
        sched.step(100, &map, &mut ships, &mut berths, &mut goods, &mut out);
        assert_eq!(ships[0].status, ShipStatus::MovingToDelivery);

        // Back to idle with the berth restocked: the hysteresis window
        // still blocks reassignment to the same berth.
        ships[0].status = ShipStatus::Idle;
        ships[0].destination = ShipPose::UNSET;
        ships[0].path.clear();
        let restock = goods.spawn(Pos::new(0, 0), 90, 100);
        goods.get_mut(restock).unwrap().status = GoodsStatus::AtBerth;
        berths[0].store(Pos::new(0, 0), restock);

        out.clear();
        sched.step(120, &map, &mut ships, &mut berths, &mut goods, &mut out);
        assert_eq!(ships[0].status, ShipStatus::Idle);
    }
}
