// Goods→robot and berth→robot assignment.
//
// Idle robots are matched to the free goods item with the best value per
// frame of round trip (walk there plus walk to the cheapest berth), with a
// TTL weighting that boosts comfortable pickups and decays proportionally
// once the remaining window drops under `ttl_bound`. Robots holding an item
// with no berth yet get the berth with the shortest walking distance from
// where they stand.
//
// Under partition scheduling every robot is pinned to a berth cluster and
// only competes for goods whose cheapest return berth lies in that cluster;
// a periodic rebalancing pass moves idle robots out of clusters whose
// pending value has dried up.
//
// A robot that no candidate fits keeps its current status and emits
// nothing this frame.
//
// See also: `robot_control.rs` which turns these targets into paths and
// conflict-free steps, `berth.rs` for slot selection.

use crate::berth::Berth;
use crate::config::Params;
use crate::goods::{GoodsStatus, GoodsTable};
use crate::map::{Map, UNREACHABLE};
use crate::robot::{Robot, RobotStatus};
use crate::types::{BerthId, GoodsId, Pos};
use tracing::debug;

pub struct RobotScheduler {
    params: Params,
    /// Cluster each robot is pinned to under partition scheduling.
    robot_cluster: Vec<Option<usize>>,
    last_rebalance: u32,
}

impl RobotScheduler {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            robot_cluster: Vec::new(),
            last_rebalance: 0,
        }
    }

    /// Group berths into `cluster_count` clusters by walking distance:
    /// farthest-point seeding, then nearest-seed assignment. Unreachable
    /// berth pairs (different land blocks) are treated as infinitely far,
    /// so blocks split first.
    pub fn cluster_berths(map: &Map, berths: &mut [Berth], cluster_count: usize) {
        if berths.is_empty() || cluster_count == 0 {
            return;
        }
        let dist = |a: &Berth, b: &Berth| -> u64 {
            match map.berth_distance(a.id, b.origin) {
                UNREACHABLE => u64::MAX,
                d => d as u64,
            }
        };

        let mut seeds: Vec<usize> = vec![0];
        while seeds.len() < cluster_count.min(berths.len()) {
            let mut best: Option<(u64, usize)> = None;
            for (i, b) in berths.iter().enumerate() {
                if seeds.contains(&i) {
                    continue;
                }
                let to_seeds = seeds
                    .iter()
                    .map(|&s| dist(&berths[s], b))
                    .min()
                    .unwrap_or(u64::MAX);
                if best.map_or(true, |(d, _)| to_seeds > d) {
                    best = Some((to_seeds, i));
                }
            }
            match best {
                Some((_, i)) => seeds.push(i),
                None => break,
            }
        }

        for i in 0..berths.len() {
            let mut assigned = 0;
            let mut best = u64::MAX;
            for (c, &s) in seeds.iter().enumerate() {
                let d = if s == i { 0 } else { dist(&berths[s], &berths[i]) };
                if d < best {
                    best = d;
                    assigned = c;
                }
            }
            berths[i].cluster = Some(assigned);
        }
    }

    /// Pin a newly spawned or purchased robot to the cluster of its nearest
    /// berth.
    pub fn register_robot(&mut self, map: &Map, berths: &[Berth], pos: Pos) {
        let cluster = berths
            .iter()
            .filter(|b| map.is_berth_reachable(b.id, pos))
            .min_by_key(|b| (map.berth_distance(b.id, pos), b.id))
            .and_then(|b| b.cluster);
        self.robot_cluster.push(cluster);
    }

    pub fn robot_cluster(&self, robot: usize) -> Option<usize> {
        self.robot_cluster.get(robot).copied().flatten()
    }

    /// One scheduling pass: assign targets to robots that need them, in
    /// ascending id order.
    pub fn schedule(
        &mut self,
        frame: u32,
        map: &Map,
        robots: &mut [Robot],
        goods: &mut GoodsTable,
        berths: &[Berth],
    ) {
        if self.params.dynamic_partition_scheduling
            && frame.saturating_sub(self.last_rebalance) >= self.params.dynamic_scheduling_interval
        {
            self.rebalance(frame, map, robots, goods, berths);
            self.last_rebalance = frame;
        }

        for robot in robots.iter_mut() {
            match robot.status {
                RobotStatus::Death | RobotStatus::Dizzy => continue,
                _ => {}
            }

            if robot.carrying && robot.target_berth.is_none() {
                if let Some((berth, slot)) = self.pick_berth(map, berths, robot) {
                    robot.target_berth = Some(berth);
                    robot.destination = slot;
                    robot.path.clear();
                    robot.status = RobotStatus::MovingToBerth;
                }
            } else if robot.status == RobotStatus::Idle && !robot.carrying {
                let cluster = self.robot_cluster(robot.id.0);
                if let Some((goods_id, dest)) = self.pick_goods(frame, map, berths, robot, goods, cluster)
                {
                    if let Some(g) = goods.get_mut(goods_id) {
                        g.status = GoodsStatus::Claimed;
                    }
                    robot.target_goods = Some(goods_id);
                    robot.destination = dest;
                    robot.path.clear();
                    robot.status = RobotStatus::MovingToGoods;
                }
            }
        }
    }

    /// Best free goods item for this robot, by value per round-trip frame.
    fn pick_goods(
        &self,
        frame: u32,
        map: &Map,
        berths: &[Berth],
        robot: &Robot,
        goods: &GoodsTable,
        cluster: Option<usize>,
    ) -> Option<(GoodsId, Pos)> {
        let restrict = self.params.partition_scheduling;
        let mut best: Option<(f64, GoodsId, Pos)> = None;

        for g in goods.iter_free(frame) {
            let return_cost = berths
                .iter()
                .filter(|b| !restrict || cluster.is_none() || b.cluster == cluster)
                .map(|b| map.berth_distance(b.id, g.pos))
                .filter(|&d| d != UNREACHABLE)
                .min();
            let Some(return_cost) = return_cost else {
                continue;
            };
            let travel = robot.pos.manhattan_distance(g.pos);
            let ttl = g.ttl(frame);
            if travel as i64 > ttl as i64 {
                continue;
            }

            let trip = (travel + return_cost).max(1) as f64;
            let mut score = g.value as f64 / trip;
            score *= if ttl >= self.params.ttl_bound {
                self.params.ttl_profit_weight
            } else {
                self.params.ttl_profit_weight * ttl as f64 / self.params.ttl_bound as f64
            };

            // Strict improvement keeps the lowest-id winner on ties.
            if best.map_or(true, |(s, _, _)| score > s) {
                best = Some((score, g.id, g.pos));
            }
        }
        best.map(|(_, id, pos)| (id, pos))
    }

    /// Nearest berth (cluster first, anywhere as fallback) with a free slot.
    fn pick_berth(&self, map: &Map, berths: &[Berth], robot: &Robot) -> Option<(BerthId, Pos)> {
        let cluster = self.robot_cluster(robot.id.0);
        let candidate = |restrict: bool| {
            berths
                .iter()
                .filter(|b| !restrict || cluster.is_none() || b.cluster == cluster)
                .filter(|b| !b.is_full())
                .filter(|b| map.is_berth_reachable(b.id, robot.pos))
                .min_by_key(|b| (map.berth_distance(b.id, robot.pos), b.id))
        };
        let berth = if self.params.partition_scheduling {
            candidate(true).or_else(|| candidate(false))
        } else {
            candidate(false)
        }?;
        let slot = berth.nearest_empty_slot(robot.pos)?;
        Some((berth.id, slot))
    }

    /// Move idle robots out of clusters whose pending value fell under the
    /// release bound, into the currently richest cluster.
    fn rebalance(
        &mut self,
        frame: u32,
        map: &Map,
        robots: &[Robot],
        goods: &GoodsTable,
        berths: &[Berth],
    ) {
        let cluster_count = self.params.cluster_count;
        if cluster_count == 0 {
            return;
        }
        let mut value = vec![0u64; cluster_count];
        for g in goods.iter_free(frame) {
            let nearest = berths
                .iter()
                .filter(|b| map.is_berth_reachable(b.id, g.pos))
                .min_by_key(|b| (map.berth_distance(b.id, g.pos), b.id));
            if let Some(c) = nearest.and_then(|b| b.cluster) {
                if c < cluster_count {
                    value[c] += g.value as u64;
                }
            }
        }
        let total: u64 = value.iter().sum();
        let average = total as f64 / cluster_count as f64;
        let richest = (0..cluster_count)
            .max_by_key(|&c| (value[c], std::cmp::Reverse(c)))
            .unwrap_or(0);

        for robot in robots {
            let Some(current) = self.robot_cluster.get(robot.id.0).copied().flatten() else {
                continue;
            };
            if robot.status != RobotStatus::Idle || current == richest {
                continue;
            }
            if (value[current] as f64) < self.params.robot_release_bound * average {
                debug!(robot = %robot.id, from = current, to = richest, "rebalancing idle robot");
                self.robot_cluster[robot.id.0] = Some(richest);
            }
        }
    }
}
