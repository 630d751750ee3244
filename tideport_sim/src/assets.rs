// Purchase decisions: when and where to buy robots and ships.
//
// At init the map is partitioned into land-connected and sea-connected
// blocks, joined into harbor blocks (a land block with berths plus the sea
// its berths touch). Each harbor block gets at most one robot shop (the
// best-placed `A` cell) and one ship shop (the best docking-ring cell),
// scored by weighted distance to the block's berths and delivery points.
//
// Per frame the manager buys at most one robot and one ship. The first
// `start_num` units of each kind are bought unconditionally as soon as
// funds allow; beyond that, the staged quota tables apply — row 0 of a
// table holds fleet-size thresholds selecting the active stage, row `1 + i`
// holds block `i`'s per-stage quota of active units. A second ship is
// additionally gated on the simulation clock.
//
// See also: `config.rs` for the quota tables and weights, `game.rs` which
// turns the returned decisions into `lbot`/`lboat` commands and fleet
// entries.

use crate::berth::Berth;
use crate::config::Params;
use crate::map::{CellKind, Grid, Map, UNREACHABLE};
use crate::robot::Robot;
use crate::ship::Ship;
use crate::types::{BerthId, Direction, Pos};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Judge-fixed price of one robot.
pub const ROBOT_PRICE: i64 = 2000;
/// Judge-fixed price of one ship.
pub const SHIP_PRICE: i64 = 8000;

/// A land block with berths, joined to the sea its berths touch.
#[derive(Clone, Debug)]
pub struct HarborBlock {
    pub land_size: usize,
    pub berths: Vec<BerthId>,
    pub delivery_points: Vec<Pos>,
    pub robot_shop: Option<Pos>,
    pub ship_shop: Option<Pos>,
}

/// One purchase to emit this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Purchase {
    Robot { block: usize, pos: Pos },
    Ship { block: usize, pos: Pos },
}

pub struct AssetManager {
    params: Params,
    blocks: Vec<HarborBlock>,
    /// Land-block index per cell (`usize::MAX` = none).
    land_block_of: Grid<usize>,
}

impl AssetManager {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            blocks: Vec::new(),
            land_block_of: Grid::new(0, 0, usize::MAX),
        }
    }

    pub fn blocks(&self) -> &[HarborBlock] {
        &self.blocks
    }

    /// Which harbor block a land cell belongs to.
    pub fn block_of(&self, p: Pos) -> Option<usize> {
        if p.x < 0
            || p.y < 0
            || p.x as usize >= self.land_block_of.rows()
            || p.y as usize >= self.land_block_of.cols()
        {
            return None;
        }
        match self.land_block_of.get(p) {
            usize::MAX => None,
            b => Some(b),
        }
    }

    /// Partition the map and pick shops. Run once after the distance fields
    /// exist.
    pub fn init(&mut self, map: &Map, berths: &[Berth]) {
        let rows = map.rows();
        let cols = map.cols();

        // Land labeling over walkable cells.
        let mut land_label = Grid::new(rows, cols, usize::MAX);
        let mut land_sizes = Vec::new();
        for x in 0..rows as i32 {
            for y in 0..cols as i32 {
                let p = Pos::new(x, y);
                if map.passable(p) && land_label.get(p) == usize::MAX {
                    let size = flood(map, &mut land_label, p, land_sizes.len(), |m, c| m.passable(c));
                    land_sizes.push(size);
                }
            }
        }

        // Sea labeling over hull-passable cells.
        let mut sea_label = Grid::new(rows, cols, usize::MAX);
        let mut sea_count = 0;
        for x in 0..rows as i32 {
            for y in 0..cols as i32 {
                let p = Pos::new(x, y);
                if map.sea_passable(p) && sea_label.get(p) == usize::MAX {
                    flood(map, &mut sea_label, p, sea_count, |m, c| m.sea_passable(c));
                    sea_count += 1;
                }
            }
        }

        // Sea distance to the nearest delivery point, for ship-shop scoring.
        let delivery_dist = sea_distance_field(map);

        // Join: one harbor block per land label that holds a berth.
        let mut block_index_of_label = vec![usize::MAX; land_sizes.len()];
        let mut blocks: Vec<HarborBlock> = Vec::new();
        for berth in berths {
            let label = land_label.get(berth.origin);
            if label == usize::MAX {
                continue;
            }
            let block = if block_index_of_label[label] == usize::MAX {
                block_index_of_label[label] = blocks.len();
                blocks.push(HarborBlock {
                    land_size: land_sizes[label],
                    berths: Vec::new(),
                    delivery_points: Vec::new(),
                    robot_shop: None,
                    ship_shop: None,
                });
                blocks.len() - 1
            } else {
                block_index_of_label[label]
            };
            blocks[block].berths.push(berth.id);
        }

        // Delivery points reachable from each block's berth waters.
        for block in &mut blocks {
            let mut sea_labels = Vec::new();
            for &bid in &block.berths {
                for cell in berths[bid.0].cells() {
                    for d in Direction::ALL {
                        let n = cell + d.offset();
                        if map.in_bounds(n) && map.cell(n) == CellKind::Sea {
                            let label = sea_label.get(n);
                            if label != usize::MAX && !sea_labels.contains(&label) {
                                sea_labels.push(label);
                            }
                        }
                    }
                }
            }
            for &p in map.delivery_points() {
                if map.in_bounds(p) && sea_labels.contains(&sea_label.get(p)) {
                    block.delivery_points.push(p);
                }
            }
        }

        // Shop selection per block.
        for block in &mut blocks {
            block.robot_shop = pick_robot_shop(map, berths, block, &self.params);
            block.ship_shop = pick_ship_shop(map, berths, block, &delivery_dist, &self.params);
            info!(
                berths = block.berths.len(),
                robot_shop = ?block.robot_shop,
                ship_shop = ?block.ship_shop,
                deliveries = block.delivery_points.len(),
                "harbor block ready"
            );
        }

        // Re-label cells with block indices for per-robot attribution.
        let mut block_of = Grid::new(rows, cols, usize::MAX);
        for x in 0..rows as i32 {
            for y in 0..cols as i32 {
                let p = Pos::new(x, y);
                let label = land_label.get(p);
                if label != usize::MAX && block_index_of_label[label] != usize::MAX {
                    block_of.set(p, block_index_of_label[label]);
                }
            }
        }

        self.blocks = blocks;
        self.land_block_of = block_of;
    }

    /// Decide this frame's purchases: at most one robot and one ship.
    pub fn decide(
        &mut self,
        frame: u32,
        money: i64,
        robots: &[Robot],
        ships: &[Ship],
    ) -> Vec<Purchase> {
        let mut purchases = Vec::new();
        let mut funds = money;

        let mut robots_per_block = vec![0usize; self.blocks.len()];
        for robot in robots {
            if let Some(b) = self.block_of(robot.pos) {
                robots_per_block[b] += 1;
            }
        }

        let robot_purchase = self.pick_robot_purchase(&robots_per_block, robots.len(), funds);
        let ship_purchase = self.pick_ship_purchase(frame, ships.len(), funds, robot_purchase);

        let ordered: [Option<Purchase>; 2] = if self.params.robot_first {
            [robot_purchase, ship_purchase]
        } else {
            [ship_purchase, robot_purchase]
        };
        for purchase in ordered.into_iter().flatten() {
            let price = match purchase {
                Purchase::Robot { .. } => ROBOT_PRICE,
                Purchase::Ship { .. } => SHIP_PRICE,
            };
            if funds >= price {
                funds -= price;
                debug!(?purchase, funds, "purchase decided");
                purchases.push(purchase);
            }
        }
        purchases
    }

    fn pick_robot_purchase(
        &self,
        robots_per_block: &[usize],
        total_robots: usize,
        funds: i64,
    ) -> Option<Purchase> {
        if total_robots >= self.params.max_robot_num || funds < ROBOT_PRICE {
            return None;
        }
        // Bootstrap units ignore the quota ladder.
        let bootstrap = total_robots < self.params.start_num;
        let block = (0..self.blocks.len())
            .filter(|&b| self.blocks[b].robot_shop.is_some())
            .filter(|&b| {
                bootstrap
                    || stage_quota(&self.params.robot_purchase_assign, b, total_robots)
                        .is_some_and(|q| robots_per_block[b] < q)
            })
            .min_by_key(|&b| (robots_per_block[b], b))?;
        Some(Purchase::Robot {
            block,
            pos: self.blocks[block].robot_shop?,
        })
    }

    fn pick_ship_purchase(
        &self,
        frame: u32,
        total_ships: usize,
        funds: i64,
        pending_robot: Option<Purchase>,
    ) -> Option<Purchase> {
        if total_ships >= self.params.max_ship_num || funds < SHIP_PRICE {
            return None;
        }
        if self.params.robot_first
            && pending_robot.is_some()
            && funds < ROBOT_PRICE + SHIP_PRICE
        {
            return None;
        }
        // Everything beyond the bootstrap fleet waits for the clock gate.
        if total_ships >= self.params.start_num && frame < self.params.time_to_buy_ship {
            return None;
        }
        let bootstrap = total_ships < self.params.start_num;
        let mut ships_per_block = vec![0usize; self.blocks.len()];
        // Ships roam one sea; attribute the fleet to the block count evenly
        // by assigning each purchase in turn to the emptiest block.
        let mut remaining = total_ships;
        'spread: loop {
            for b in 0..self.blocks.len() {
                if remaining == 0 {
                    break 'spread;
                }
                ships_per_block[b] += 1;
                remaining -= 1;
            }
            if self.blocks.is_empty() {
                break;
            }
        }

        let block = (0..self.blocks.len())
            .filter(|&b| self.blocks[b].ship_shop.is_some())
            .filter(|&b| !self.blocks[b].delivery_points.is_empty())
            .filter(|&b| {
                bootstrap
                    || stage_quota(&self.params.ship_purchase_assign, b, total_ships)
                        .is_some_and(|q| ships_per_block[b] < q)
            })
            .min_by_key(|&b| (ships_per_block[b], b))?;
        Some(Purchase::Ship {
            block,
            pos: self.blocks[block].ship_shop?,
        })
    }
}

/// Quota for `block` at the stage selected by the current fleet size, or
/// `None` when the table has no applicable stage.
fn stage_quota(table: &[Vec<usize>], block: usize, fleet_size: usize) -> Option<usize> {
    let thresholds = table.first()?;
    let stage = thresholds.iter().position(|&t| fleet_size < t)?;
    let row = table.get(1 + block).or_else(|| table.get(1))?;
    row.get(stage).copied()
}

fn flood(
    map: &Map,
    labels: &mut Grid<usize>,
    start: Pos,
    label: usize,
    passable: impl Fn(&Map, Pos) -> bool,
) -> usize {
    let mut queue = VecDeque::new();
    labels.set(start, label);
    queue.push_back(start);
    let mut size = 0;
    while let Some(p) = queue.pop_front() {
        size += 1;
        for d in Direction::ALL {
            let n = p + d.offset();
            if map.in_bounds(n) && passable(map, n) && labels.get(n) == usize::MAX {
                labels.set(n, label);
                queue.push_back(n);
            }
        }
    }
    size
}

/// Multi-source BFS over water from every delivery point.
fn sea_distance_field(map: &Map) -> Grid<u32> {
    let mut dist = Grid::new(map.rows(), map.cols(), UNREACHABLE);
    let mut queue = VecDeque::new();
    for &p in map.delivery_points() {
        dist.set(p, 0);
        queue.push_back(p);
    }
    while let Some(p) = queue.pop_front() {
        let next = dist.get(p) + 1;
        for d in Direction::ALL {
            let n = p + d.offset();
            if map.in_bounds(n) && map.sea_passable(n) && dist.get(n) == UNREACHABLE {
                dist.set(n, next);
                queue.push_back(n);
            }
        }
    }
    dist
}

/// The `A` cell minimizing the weighted average walking distance to the
/// block's berths.
fn pick_robot_shop(
    map: &Map,
    berths: &[Berth],
    block: &HarborBlock,
    params: &Params,
) -> Option<Pos> {
    let mut best: Option<(f64, Pos)> = None;
    for &shop in map.robot_shops() {
        let mut total = 0.0;
        let mut reachable = 0usize;
        for &bid in &block.berths {
            let d = map.berth_distance(bid, shop);
            if d != UNREACHABLE {
                total += params.land_distance_weight * d as f64;
                reachable += 1;
            }
        }
        if reachable < block.berths.len() || block.berths.is_empty() {
            continue;
        }
        let score = total / reachable as f64;
        if best.map_or(true, |(s, _)| score < s) {
            best = Some((score, shop));
        }
    }
    best.map(|(_, p)| p)
}

/// The docking-ring cell minimizing berth adjacency plus weighted sea
/// distance to the nearest delivery point.
fn pick_ship_shop(
    map: &Map,
    berths: &[Berth],
    block: &HarborBlock,
    delivery_dist: &Grid<u32>,
    params: &Params,
) -> Option<Pos> {
    let block_berth_cells: Vec<Pos> = block
        .berths
        .iter()
        .flat_map(|&bid| berths[bid.0].cells())
        .collect();
    let mut best: Option<(f64, Pos)> = None;
    for &shop in map.ship_shop_candidates() {
        let near_block = block_berth_cells
            .iter()
            .map(|&c| c.manhattan_distance(shop))
            .min();
        let Some(berth_dist) = near_block else {
            continue;
        };
        if berth_dist > 1 {
            continue; // ring cell of some other block's berth
        }
        let sea_d = delivery_dist.get(shop);
        if sea_d == UNREACHABLE {
            continue;
        }
        let score = params.land_distance_weight * berth_dist as f64
            + params.delivery_distance_weight * sea_d as f64;
        if best.map_or(true, |(s, _)| score < s) {
            best = Some((score, shop));
        }
    }
    best.map(|(_, p)| p)
}
