// Frame orchestration: world snapshot in, commands out.
//
// `GameManager` owns every component and runs the fixed per-frame pipeline:
// ingest the snapshot (goods, robot and ship records), sweep expired goods,
// make purchases, schedule robots, resolve conflicts, emit robot commands
// in id order, then run the ship scheduler. The frame closes with the
// temporary-obstacle table provably empty.
//
// The judge reports no ship positions, so ship poses are dead-reckoned:
// a commanded pose change is assumed to have happened unless the ship was
// recovering that frame.
//
// Init is map-driven: the initial robot fleet is one robot per `A` cell,
// and a robot standing where no berth is reachable is born `Death`.
//
// See also: `tideport_proto` for the wire records consumed and produced
// here, and every sibling module for the components this drives.

use crate::assets::{AssetManager, Purchase};
use crate::berth::Berth;
use crate::config::Params;
use crate::goods::{GoodsStatus, GoodsTable};
use crate::lanes::SingleLaneManager;
use crate::map::Map;
use crate::robot::{Robot, RobotStatus};
use crate::robot_control::RobotController;
use crate::robot_scheduler::RobotScheduler;
use crate::ship::Ship;
use crate::ship_scheduler::ShipScheduler;
use crate::types::{BerthId, Direction, Pos, RobotId, ShipId, ShipPose};
use tideport_proto::{Command, CommandBuffer, FrameInput, InitData};
use tracing::{info, warn};

pub struct GameManager {
    pub map: Map,
    pub lanes: SingleLaneManager,
    pub goods: GoodsTable,
    pub berths: Vec<Berth>,
    pub robots: Vec<Robot>,
    pub ships: Vec<Ship>,
    robot_scheduler: RobotScheduler,
    controller: RobotController,
    ship_scheduler: ShipScheduler,
    assets: AssetManager,
    ship_capacity: u32,
    pub frame: u32,
    pub money: i64,
}

impl GameManager {
    pub fn new(init: &InitData, params: Params) -> Self {
        let rows: Vec<&str> = init.map_rows.iter().map(|s| s.as_str()).collect();
        let mut map = Map::parse(&rows);

        let mut berths: Vec<Berth> = init
            .berths
            .iter()
            .map(|r| {
                Berth::new(
                    BerthId(r.id),
                    Pos::new(r.x, r.y),
                    r.transport_time,
                    r.loading_velocity,
                )
            })
            .collect();
        berths.sort_by_key(|b| b.id);

        for berth in &berths {
            let seeds: Vec<Pos> = berth.cells().collect();
            map.compute_berth_distances(berth.id, &seeds);
        }
        for berth in &mut berths {
            berth.docking_pose = find_docking_pose(&map, berth);
            if berth.docking_pose.is_none() {
                warn!(berth = %berth.id, "no docking pose, ships cannot serve this berth");
            }
        }

        let lanes = SingleLaneManager::build(&map, params.min_lane_length);
        RobotScheduler::cluster_berths(&map, &mut berths, params.cluster_count);

        let mut assets = AssetManager::new(params.clone());
        assets.init(&map, &berths);

        let mut robot_scheduler = RobotScheduler::new(params.clone());
        let mut robots = Vec::new();
        for &spawn in map.robot_shops() {
            let mut robot = Robot::new(RobotId(robots.len()), spawn);
            if !berths.iter().any(|b| map.is_berth_reachable(b.id, spawn)) {
                robot.status = RobotStatus::Death;
            }
            robot_scheduler.register_robot(&map, &berths, spawn);
            robots.push(robot);
        }
        info!(
            robots = robots.len(),
            berths = berths.len(),
            lanes = lanes.lane_count(),
            "game initialized"
        );

        Self {
            map,
            lanes,
            goods: GoodsTable::new(),
            berths,
            robots,
            ships: Vec::new(),
            robot_scheduler,
            controller: RobotController::new(),
            ship_scheduler: ShipScheduler::new(params.clone()),
            assets,
            ship_capacity: init.ship_capacity,
            frame: 0,
            money: 0,
        }
    }

    pub fn robot_count(&self) -> usize {
        self.robots.len()
    }

    pub fn ship_count(&self) -> usize {
        self.ships.len()
    }

    /// Run one frame of the pipeline and buffer this frame's commands.
    pub fn step(&mut self, input: &FrameInput, out: &mut CommandBuffer) {
        self.frame = input.frame_id;
        self.money = input.money;

        for record in &input.new_goods {
            self.goods
                .spawn(Pos::new(record.x, record.y), record.value, self.frame);
        }

        for (robot, record) in self.robots.iter_mut().zip(&input.robots) {
            robot.sync(record.carrying, Pos::new(record.x, record.y), record.state);
        }
        for (ship, record) in self.ships.iter_mut().zip(&input.ships) {
            let assumed = if record.state == 1 || !ship.next_pose.is_set() {
                ship.pose
            } else {
                ship.next_pose
            };
            let berth = usize::try_from(record.berth_id).ok().map(BerthId);
            ship.sync(record.state, berth, assumed);
        }

        self.goods.sweep(self.frame);
        self.drop_stale_targets();

        self.map
            .set_robot_positions(self.robots.iter().map(|r| r.pos).collect());

        for purchase in self
            .assets
            .decide(self.frame, self.money, &self.robots, &self.ships)
        {
            match purchase {
                Purchase::Robot { pos, .. } => {
                    out.push(Command::BuyRobot { x: pos.x, y: pos.y });
                    let mut robot = Robot::new(RobotId(self.robots.len()), pos);
                    if !self
                        .berths
                        .iter()
                        .any(|b| self.map.is_berth_reachable(b.id, pos))
                    {
                        robot.status = RobotStatus::Death;
                    }
                    self.robot_scheduler
                        .register_robot(&self.map, &self.berths, pos);
                    self.robots.push(robot);
                }
                Purchase::Ship { pos, .. } => {
                    out.push(Command::BuyShip { x: pos.x, y: pos.y });
                    let pose = Direction::ALL
                        .into_iter()
                        .map(|d| ShipPose::new(pos, d))
                        .find(|&p| self.map.ship_passable(p))
                        .unwrap_or(ShipPose::new(pos, Direction::East));
                    self.ships
                        .push(Ship::new(ShipId(self.ships.len()), pose, self.ship_capacity));
                }
            }
        }

        self.rebuild_incoming();

        self.robot_scheduler.schedule(
            self.frame,
            &self.map,
            &mut self.robots,
            &mut self.goods,
            &self.berths,
        );

        self.controller.run(
            &mut self.map,
            &mut self.lanes,
            &mut self.robots,
            &mut self.goods,
        );

        self.emit_robot_commands(out);

        let mut ship_commands = Vec::new();
        self.ship_scheduler.step(
            self.frame,
            &self.map,
            &mut self.ships,
            &mut self.berths,
            &mut self.goods,
            &mut ship_commands,
        );
        for command in ship_commands {
            out.push(command);
        }

        self.map.clear_temporary_obstacles();
        debug_assert!(self.map.temporary_obstacles_clear());
    }

    /// Reset robots whose claimed goods expired or vanished while they were
    /// still walking.
    fn drop_stale_targets(&mut self) {
        for robot in &mut self.robots {
            if robot.status != RobotStatus::MovingToGoods {
                continue;
            }
            let Some(target) = robot.target_goods else {
                continue;
            };
            let stale = match self.goods.get(target) {
                Some(g) => g.is_expired(self.frame) || g.status != GoodsStatus::Claimed,
                None => true,
            };
            if stale {
                self.goods.release(target);
                robot.reset_to_idle();
            }
        }
    }

    /// Refresh each berth's incoming list from robot intents.
    fn rebuild_incoming(&mut self) {
        for berth in &mut self.berths {
            berth.incoming.clear();
        }
        for robot in &self.robots {
            if let (Some(berth), Some(goods)) = (robot.target_berth, robot.carrying_goods) {
                if berth.0 < self.berths.len() {
                    self.berths[berth.0].incoming.push(goods);
                }
            }
        }
    }

    /// Robot commands in id order: an arrival action or one move per robot.
    fn emit_robot_commands(&mut self, out: &mut CommandBuffer) {
        for i in 0..self.robots.len() {
            let robot = &self.robots[i];
            if robot.status == RobotStatus::Death || robot.world_state == 0 {
                continue;
            }

            let at_destination =
                robot.destination.is_set() && robot.pos == robot.destination;
            if at_destination && robot.status == RobotStatus::MovingToGoods {
                self.pick_up(i, out);
                continue;
            }
            if at_destination && robot.status == RobotStatus::MovingToBerth {
                self.put_down(i, out);
                continue;
            }

            let robot = &self.robots[i];
            if robot.next_pos != robot.pos {
                match Direction::ALL
                    .into_iter()
                    .find(|d| robot.pos + d.offset() == robot.next_pos)
                {
                    Some(dir) => out.push(Command::Move {
                        robot: i,
                        dir: dir.wire_index(),
                    }),
                    None => warn!(robot = %robot.id, from = %robot.pos, to = %robot.next_pos,
                                  "next position is not adjacent"),
                }
            }
        }
    }

    fn pick_up(&mut self, i: usize, out: &mut CommandBuffer) {
        let robot = &mut self.robots[i];
        let Some(target) = robot.target_goods else {
            robot.reset_to_idle();
            return;
        };
        let valid = self
            .goods
            .get(target)
            .is_some_and(|g| !g.is_expired(self.frame) && g.pos == robot.pos);
        if !valid {
            // The window closed mid-transit; the sweep already dropped it.
            self.goods.release(target);
            robot.reset_to_idle();
            return;
        }
        out.push(Command::Get { robot: i });
        if let Some(g) = self.goods.get_mut(target) {
            g.status = GoodsStatus::Carried;
        }
        robot.carrying_goods = Some(target);
        robot.target_goods = None;
        robot.destination = Pos::UNSET;
        robot.path.clear();
        robot.status = RobotStatus::Idle;
    }

    fn put_down(&mut self, i: usize, out: &mut CommandBuffer) {
        let robot = &mut self.robots[i];
        let (Some(berth_id), Some(goods_id)) = (robot.target_berth, robot.carrying_goods) else {
            robot.reset_to_idle();
            return;
        };
        out.push(Command::Pull { robot: i });
        let berth = &mut self.berths[berth_id.0];
        berth.store(robot.pos, goods_id);
        if let Some(g) = self.goods.get_mut(goods_id) {
            g.status = GoodsStatus::AtBerth;
            g.pos = robot.pos;
        }
        robot.carrying_goods = None;
        robot.clear_target();
        robot.status = RobotStatus::Unloading;
    }
}

/// The first pose whose hull fits on the berth footprint and its adjacent
/// water, scanning footprint cells in row-major order and headings in wire
/// order.
fn find_docking_pose(map: &Map, berth: &Berth) -> Option<ShipPose> {
    for cell in berth.cells() {
        for dir in Direction::ALL {
            let pose = ShipPose::new(cell, dir);
            if map.ship_passable(pose) {
                return Some(pose);
            }
        }
    }
    // Fall back to the docking ring just off the footprint.
    map.ship_shop_candidates()
        .iter()
        .filter(|c| berth.cells().any(|b| b.manhattan_distance(**c) == 1))
        .flat_map(|&c| Direction::ALL.into_iter().map(move |d| ShipPose::new(c, d)))
        .find(|&p| map.ship_passable(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tideport_proto::{BerthRecord, GoodsRecord, RobotRecord};

    /// 16×16: land on the left with two `A` spawns, a berth bridging to
    /// water on the right, one isolated pocket at the bottom-left.
    fn init_data() -> InitData {
        let mut rows = Vec::new();
        for x in 0..16 {
            let mut row = String::new();
            for y in 0..16 {
                let ch = if x == 15 && y <= 1 {
                    if y == 0 { 'A' } else { '#' }
                } else if x >= 14 && y <= 2 {
                    '#'
                } else if (4..8).contains(&x) && (6..10).contains(&y) {
                    'B'
                } else if x == 0 && y == 0 {
                    'A'
                } else if x == 2 && y == 1 {
                    'A'
                } else if y >= 10 {
                    '*'
                } else {
                    '.'
                };
                row.push(ch);
            }
            rows.push(row);
        }
        InitData {
            map_rows: rows,
            berths: vec![BerthRecord {
                id: 0,
                x: 4,
                y: 6,
                transport_time: 100,
                loading_velocity: 2,
            }],
            ship_capacity: 30,
        }
    }

    fn frame(
        frame_id: u32,
        money: i64,
        goods: Vec<GoodsRecord>,
        robots: &[Robot],
    ) -> FrameInput {
        FrameInput {
            frame_id,
            money,
            new_goods: goods,
            robots: robots
                .iter()
                .map(|r| RobotRecord {
                    carrying: r.carrying,
                    x: r.pos.x,
                    y: r.pos.y,
                    state: 1,
                })
                .collect(),
            ships: Vec::new(),
        }
    }

    #[test]
    fn init_spawns_a_robot_per_shop_cell() {
        let gm = GameManager::new(&init_data(), Params::default());
        assert_eq!(gm.robot_count(), 3);
        assert_eq!(gm.robots[0].pos, Pos::new(0, 0));
        assert_eq!(gm.robots[0].status, RobotStatus::Idle);
        // The walled-off pocket spawn reaches no berth.
        assert_eq!(gm.robots[2].pos, Pos::new(15, 0));
        assert_eq!(gm.robots[2].status, RobotStatus::Death);
        assert!(gm.berths[0].docking_pose.is_some());
    }

    #[test]
    fn first_frame_assigns_goods_and_emits_moves() {
        let mut gm = GameManager::new(&init_data(), Params::default());
        let robots = gm.robots.clone();
        let input = frame(
            1,
            25000,
            vec![GoodsRecord { x: 2, y: 4, value: 80 }],
            &robots,
        );
        let mut out = CommandBuffer::new();
        gm.step(&input, &mut out);

        // Someone claimed the item and is walking.
        let claimed = gm
            .robots
            .iter()
            .any(|r| r.status == RobotStatus::MovingToGoods);
        assert!(claimed);
        assert!(out
            .commands()
            .iter()
            .any(|c| matches!(c, Command::Move { .. })));
        // Bootstrap purchases go out on the first frame with funds.
        assert!(out
            .commands()
            .iter()
            .any(|c| matches!(c, Command::BuyShip { .. })));
        assert!(gm.map.temporary_obstacles_clear());
    }

    #[test]
    fn arrival_on_a_live_item_emits_get() {
        let mut gm = GameManager::new(&init_data(), Params::default());
        let spawn = gm.robots[0].pos;
        let robots = gm.robots.clone();
        // Goods directly under the first robot.
        let input = frame(
            1,
            0,
            vec![GoodsRecord {
                x: spawn.x,
                y: spawn.y,
                value: 50,
            }],
            &robots,
        );
        let mut out = CommandBuffer::new();
        gm.step(&input, &mut out);

        assert!(out.commands().contains(&Command::Get { robot: 0 }));
        assert!(gm.robots[0].carrying_goods.is_some());
    }

    #[test]
    fn expired_target_is_dropped_without_get() {
        let mut gm = GameManager::new(&init_data(), Params::default());
        let spawn = gm.robots[0].pos;
        let robots = gm.robots.clone();

        // Frame 1: the item appears two cells away and gets claimed.
        let input = frame(
            1,
            0,
            vec![GoodsRecord {
                x: spawn.x,
                y: spawn.y + 2,
                value: 50,
            }],
            &robots,
        );
        let mut out = CommandBuffer::new();
        gm.step(&input, &mut out);
        assert_eq!(gm.robots[0].status, RobotStatus::MovingToGoods);

        // The robot arrives long after the window closed.
        let mut arrived = gm.robots.clone();
        arrived[0].pos = Pos::new(spawn.x, spawn.y + 2);
        let late = frame(1100, 0, Vec::new(), &arrived);
        let mut out = CommandBuffer::new();
        gm.step(&late, &mut out);

        assert!(!out
            .commands()
            .iter()
            .any(|c| matches!(c, Command::Get { .. })));
        assert_eq!(gm.robots[0].status, RobotStatus::Idle);
        assert!(gm.robots[0].target_goods.is_none());
        assert!(gm.goods.is_empty());
    }

    #[test]
    fn carried_item_is_pulled_into_a_berth_slot() {
        let mut gm = GameManager::new(&init_data(), Params::default());
        // Hand the robot an item and stand it on its chosen slot.
        let id = gm.goods.spawn(Pos::new(0, 0), 60, 1);
        gm.goods.get_mut(id).unwrap().status = GoodsStatus::Carried;
        gm.robots[0].carrying = true;
        gm.robots[0].carrying_goods = Some(id);

        let robots = gm.robots.clone();
        let mut input = frame(2, 0, Vec::new(), &robots);
        input.robots[0].carrying = true;
        let mut out = CommandBuffer::new();
        gm.step(&input, &mut out);
        // The scheduler sent it to a berth slot this frame.
        assert_eq!(gm.robots[0].status, RobotStatus::MovingToBerth);
        let slot = gm.robots[0].destination;
        assert!(gm.berths[0].contains(slot));

        // Teleport the walk: next frame it stands on the slot.
        let mut arrived = gm.robots.clone();
        arrived[0].pos = slot;
        arrived[0].path.clear();
        gm.robots[0].pos = slot;
        gm.robots[0].path.clear();
        let mut input = frame(3, 0, Vec::new(), &arrived);
        input.robots[0].carrying = true;
        let mut out = CommandBuffer::new();
        gm.step(&input, &mut out);

        assert!(out.commands().contains(&Command::Pull { robot: 0 }));
        assert_eq!(gm.berths[0].stored_count(), 1);
        assert_eq!(gm.goods.get(id).unwrap().status, GoodsStatus::AtBerth);
        assert_eq!(gm.robots[0].status, RobotStatus::Unloading);
        assert!(gm.robots[0].carrying_goods.is_none());
    }

    #[test]
    fn frames_leave_no_temporary_obstacles_behind() {
        let mut gm = GameManager::new(&init_data(), Params::default());
        let robots = gm.robots.clone();
        for f in 1..6 {
            let input = frame(
                f,
                25000,
                vec![GoodsRecord {
                    x: 3,
                    y: (f % 5) as i32,
                    value: 30,
                }],
                &gm.robots.clone(),
            );
            let mut out = CommandBuffer::new();
            gm.step(&input, &mut out);
            assert!(gm.map.temporary_obstacles_clear(), "frame {f}");
        }
        let _ = robots;
    }
}
