// The harbor grid: cell kinds, neighbor queries, distance fields, and the
// temporary-obstacle mechanism the conflict resolver leans on.
//
// The grid is parsed once from the init block and never changes shape.
// Derived features the wire format does not carry are computed at the same
// time: robot shops (the `A` spawn cells), delivery points (one per maximal
// run of border sea cells), ship-shop candidates (sea cells touching a berth
// footprint), and sea lanes (the coastal margin where ships run at half
// speed).
//
// Temporary obstacles are reference counted: several pathfinding calls
// within one frame may pin the same cell, and the cell only reverts to its
// prior kind when the last pin is released. The controller clears the table
// at the end of every frame, so the ref-count map is empty at frame
// boundaries.
//
// See also: `pathfinding.rs` for the searches that run over this map,
// `lanes.rs` for corridor detection, `robot_control.rs` for the
// temporary-obstacle lifecycle.
//
// **Critical constraint: determinism.** Neighbor order, BFS visit order,
// and every derived-feature scan follow fixed row-major or wire order.

use crate::types::{BerthId, Direction, Pos, RobotId, ShipPose};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use tracing::error;

/// Number of rows on the competition map.
pub const MAP_ROWS: usize = 200;
/// Number of columns on the competition map.
pub const MAP_COLS: usize = 200;

/// Sentinel distance for cells no BFS wave reached.
pub const UNREACHABLE: u32 = u32::MAX;

/// What occupies a grid cell. `Robot` is the transient marker the
/// temporary-obstacle mechanism writes; it never appears in parsed maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    Space,
    Sea,
    Obstacle,
    Berth,
    Robot,
}

/// A dense rectangular array addressed by `Pos` (x = row, y = column).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Grid<T: Copy> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Copy> Grid<T> {
    pub fn new(rows: usize, cols: usize, initial: T) -> Self {
        Self {
            rows,
            cols,
            data: vec![initial; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, p: Pos) -> T {
        self.data[p.x as usize * self.cols + p.y as usize]
    }

    #[inline]
    pub fn set(&mut self, p: Pos, value: T) {
        self.data[p.x as usize * self.cols + p.y as usize] = value;
    }
}

/// The parsed map plus every per-map precomputation.
#[derive(Clone, Debug)]
pub struct Map {
    rows: usize,
    cols: usize,
    grid: Grid<CellKind>,
    /// Walking distance from every land cell to each berth, indexed by
    /// `BerthId`. Filled by `compute_berth_distances`.
    berth_distance: Vec<Grid<u32>>,
    /// Coastal-margin marking for the ship cost model.
    sea_lane: Grid<bool>,
    /// Cells currently pinned as obstacles: prior kind and pin count.
    temporary: BTreeMap<Pos, (CellKind, u32)>,
    /// Robot positions for the current frame, in fleet order.
    robot_positions: Vec<Pos>,
    /// The `A` cells.
    robot_shops: Vec<Pos>,
    /// One representative cell per maximal border run of sea cells.
    delivery_points: Vec<Pos>,
    /// Sea cells 4-adjacent to a berth footprint.
    ship_shop_candidates: Vec<Pos>,
}

impl Map {
    /// Parse a map from its wire rows. Accepts any rectangular size so tests
    /// can use small grids; the protocol layer enforces 200×200.
    pub fn parse(lines: &[&str]) -> Self {
        let rows = lines.len();
        let cols = lines.first().map_or(0, |l| l.len());
        let mut grid = Grid::new(rows, cols, CellKind::Space);
        let mut robot_shops = Vec::new();
        for (x, line) in lines.iter().enumerate() {
            for (y, ch) in line.chars().enumerate() {
                let p = Pos::new(x as i32, y as i32);
                let kind = match ch {
                    '.' => CellKind::Space,
                    '*' => CellKind::Sea,
                    '#' => CellKind::Obstacle,
                    'A' => {
                        robot_shops.push(p);
                        CellKind::Space
                    }
                    'B' => CellKind::Berth,
                    other => {
                        error!(cell = %p, glyph = %other, "unknown map character, treating as obstacle");
                        CellKind::Obstacle
                    }
                };
                grid.set(p, kind);
            }
        }

        let mut map = Self {
            rows,
            cols,
            grid,
            berth_distance: Vec::new(),
            sea_lane: Grid::new(rows, cols, false),
            temporary: BTreeMap::new(),
            robot_positions: Vec::new(),
            robot_shops,
            delivery_points: Vec::new(),
            ship_shop_candidates: Vec::new(),
        };
        map.derive_sea_lanes();
        map.derive_delivery_points();
        map.derive_ship_shops();
        map
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn in_bounds(&self, p: Pos) -> bool {
        p.x >= 0 && p.y >= 0 && (p.x as usize) < self.rows && (p.y as usize) < self.cols
    }

    pub fn cell(&self, p: Pos) -> CellKind {
        self.grid.get(p)
    }

    /// True for cells a robot may stand on.
    pub fn passable(&self, p: Pos) -> bool {
        self.in_bounds(p) && matches!(self.grid.get(p), CellKind::Space | CellKind::Berth)
    }

    /// True for cells a ship hull may cover.
    pub fn sea_passable(&self, p: Pos) -> bool {
        self.in_bounds(p) && matches!(self.grid.get(p), CellKind::Sea | CellKind::Berth)
    }

    /// True if every hull cell of the pose is on water or a berth.
    pub fn ship_passable(&self, pose: ShipPose) -> bool {
        pose.footprint().iter().all(|&c| self.sea_passable(c))
    }

    /// True if any hull cell of the pose is inside the coastal margin.
    pub fn pose_in_sea_lane(&self, pose: ShipPose) -> bool {
        pose.footprint()
            .iter()
            .any(|&c| self.in_bounds(c) && self.sea_lane.get(c))
    }

    pub fn is_sea_lane(&self, p: Pos) -> bool {
        self.in_bounds(p) && self.sea_lane.get(p)
    }

    /// Passable 4-neighbors in canonical {E, W, N, S} order, reversed on
    /// cells whose coordinate sum is even. Alternating the preference per
    /// cell parity spreads equal-cost expansions across both axes, so A*
    /// produces diagonal staircases instead of long L-shaped hugs. Callers
    /// rely on this exact order.
    pub fn neighbors(&self, p: Pos) -> Vec<Pos> {
        let mut result = Vec::with_capacity(4);
        for dir in Direction::ALL {
            let next = p + dir.offset();
            if self.passable(next) {
                result.push(next);
            }
        }
        if (p.x + p.y) % 2 == 0 {
            result.reverse();
        }
        result
    }

    // -----------------------------------------------------------------------
    // Berth distance fields
    // -----------------------------------------------------------------------

    /// Multi-source BFS with unit edge weights from the given seed cells.
    /// Run once per berth at init; unreachable cells keep `UNREACHABLE`.
    pub fn compute_berth_distances(&mut self, id: BerthId, seeds: &[Pos]) {
        let mut dist = Grid::new(self.rows, self.cols, UNREACHABLE);
        let mut queue = VecDeque::new();
        for &p in seeds {
            if self.passable(p) {
                dist.set(p, 0);
                queue.push_back(p);
            }
        }
        while let Some(current) = queue.pop_front() {
            let next_dist = dist.get(current) + 1;
            for dir in Direction::ALL {
                let next = current + dir.offset();
                if self.passable(next) && dist.get(next) == UNREACHABLE {
                    dist.set(next, next_dist);
                    queue.push_back(next);
                }
            }
        }
        if self.berth_distance.len() <= id.0 {
            self.berth_distance
                .resize(id.0 + 1, Grid::new(self.rows, self.cols, UNREACHABLE));
        }
        self.berth_distance[id.0] = dist;
    }

    /// Walking distance from `p` to the berth, `UNREACHABLE` if none.
    pub fn berth_distance(&self, id: BerthId, p: Pos) -> u32 {
        if !self.in_bounds(p) {
            return UNREACHABLE;
        }
        self.berth_distance
            .get(id.0)
            .map_or(UNREACHABLE, |g| g.get(p))
    }

    pub fn is_berth_reachable(&self, id: BerthId, p: Pos) -> bool {
        self.berth_distance(id, p) != UNREACHABLE
    }

    pub fn berth_count(&self) -> usize {
        self.berth_distance.len()
    }

    // -----------------------------------------------------------------------
    // Temporary obstacles
    // -----------------------------------------------------------------------

    /// Pin a cell as an obstacle for the rest of the frame's control logic.
    /// Pinning water or a permanent obstacle is an invariant violation:
    /// logged and ignored.
    pub fn add_temporary_obstacle(&mut self, p: Pos) {
        if !self.in_bounds(p) {
            return;
        }
        let kind = self.grid.get(p);
        if matches!(kind, CellKind::Sea | CellKind::Obstacle) {
            error!(cell = %p, ?kind, "temporary obstacle on impassable terrain");
            return;
        }
        let entry = self.temporary.entry(p).or_insert((kind, 0));
        entry.1 += 1;
        self.grid.set(p, CellKind::Robot);
    }

    /// Release one pin on a cell; the cell reverts once the count hits zero.
    pub fn remove_temporary_obstacle(&mut self, p: Pos) {
        if let Some((prior, count)) = self.temporary.get_mut(&p) {
            *count -= 1;
            if *count == 0 {
                let prior = *prior;
                self.temporary.remove(&p);
                self.grid.set(p, prior);
            }
        }
    }

    /// Drop every pin at once. Called at the frame boundary.
    pub fn clear_temporary_obstacles(&mut self) {
        let pinned: Vec<(Pos, CellKind)> = self
            .temporary
            .iter()
            .map(|(&p, &(prior, _))| (p, prior))
            .collect();
        for (p, prior) in pinned {
            if self.grid.get(p) == CellKind::Robot {
                self.grid.set(p, prior);
            }
        }
        self.temporary.clear();
    }

    /// True when no pins are outstanding (the frame-boundary invariant).
    pub fn temporary_obstacles_clear(&self) -> bool {
        self.temporary.is_empty()
    }

    /// The robot-marker cells within a square radius of `p`, excluding `p`.
    pub fn nearby_temporary_obstacles(&self, p: Pos, radius: i32) -> Vec<Pos> {
        let mut result = Vec::new();
        for dx in -radius..=radius {
            for dy in -radius..=radius {
                let next = p + Pos::new(dx, dy);
                if self.in_bounds(next) && next != p && self.grid.get(next) == CellKind::Robot {
                    result.push(next);
                }
            }
        }
        result
    }

    // -----------------------------------------------------------------------
    // Robot occupancy
    // -----------------------------------------------------------------------

    /// Refresh the per-frame robot position list, in fleet order.
    pub fn set_robot_positions(&mut self, positions: Vec<Pos>) {
        self.robot_positions = positions;
    }

    /// Cells another robot could plausibly occupy within `frames_ahead`
    /// frames: for every other robot inside a `2·frames_ahead` Manhattan
    /// bubble, the passable square of that radius around it. Used as soft
    /// obstacles when re-routing through traffic.
    pub fn collision_risk(&self, robot: RobotId, frames_ahead: i32) -> Vec<Pos> {
        let mut cells = Vec::new();
        let Some(&own) = self.robot_positions.get(robot.0) else {
            return cells;
        };
        for (i, &other) in self.robot_positions.iter().enumerate() {
            if i == robot.0 {
                continue;
            }
            if own.manhattan_distance(other) <= 2 * frames_ahead as u32 {
                for dx in -frames_ahead..=frames_ahead {
                    for dy in -frames_ahead..=frames_ahead {
                        let next = other + Pos::new(dx, dy);
                        if self.passable(next) {
                            cells.push(next);
                        }
                    }
                }
            }
        }
        cells
    }

    // -----------------------------------------------------------------------
    // Derived features
    // -----------------------------------------------------------------------

    pub fn robot_shops(&self) -> &[Pos] {
        &self.robot_shops
    }

    pub fn delivery_points(&self) -> &[Pos] {
        &self.delivery_points
    }

    pub fn ship_shop_candidates(&self) -> &[Pos] {
        &self.ship_shop_candidates
    }

    /// Sea cells within Chebyshev distance 1 of any non-sea cell (the map
    /// edge counts as non-sea). Ships pay double cost inside this margin.
    fn derive_sea_lanes(&mut self) {
        for x in 0..self.rows as i32 {
            for y in 0..self.cols as i32 {
                let p = Pos::new(x, y);
                if self.grid.get(p) != CellKind::Sea {
                    continue;
                }
                let mut margin = false;
                'scan: for dx in -1..=1 {
                    for dy in -1..=1 {
                        let n = p + Pos::new(dx, dy);
                        if !self.in_bounds(n) || self.grid.get(n) != CellKind::Sea {
                            margin = true;
                            break 'scan;
                        }
                    }
                }
                if margin {
                    self.sea_lane.set(p, true);
                }
            }
        }
    }

    /// One delivery point per maximal run of sea cells along the border,
    /// taking the middle cell of each run.
    fn derive_delivery_points(&mut self) {
        let mut border: Vec<Pos> = Vec::new();
        let (rows, cols) = (self.rows as i32, self.cols as i32);
        for y in 0..cols {
            border.push(Pos::new(0, y));
        }
        for x in 1..rows {
            border.push(Pos::new(x, cols - 1));
        }
        for y in (0..cols - 1).rev() {
            border.push(Pos::new(rows - 1, y));
        }
        for x in (1..rows - 1).rev() {
            border.push(Pos::new(x, 0));
        }

        let mut run: Vec<Pos> = Vec::new();
        let mut points = Vec::new();
        for &p in &border {
            if self.grid.get(p) == CellKind::Sea {
                run.push(p);
            } else if !run.is_empty() {
                points.push(run[run.len() / 2]);
                run.clear();
            }
        }
        if !run.is_empty() {
            points.push(run[run.len() / 2]);
        }
        points.sort();
        points.dedup();
        self.delivery_points = points;
    }

    /// Sea cells 4-adjacent to a berth cell: the docking ring a ship shop
    /// can sit on.
    fn derive_ship_shops(&mut self) {
        let mut candidates = Vec::new();
        for x in 0..self.rows as i32 {
            for y in 0..self.cols as i32 {
                let p = Pos::new(x, y);
                if self.grid.get(p) != CellKind::Sea {
                    continue;
                }
                if Direction::ALL
                    .iter()
                    .any(|d| self.in_bounds(p + d.offset()) && self.grid.get(p + d.offset()) == CellKind::Berth)
                {
                    candidates.push(p);
                }
            }
        }
        self.ship_shop_candidates = candidates;
    }

    /// Plain-text rendering for logs and test failure output. Overlays the
    /// given path with `@`.
    pub fn render(&self, path: &[Pos]) -> String {
        let mut out = String::with_capacity(self.rows * (self.cols + 1));
        for x in 0..self.rows as i32 {
            for y in 0..self.cols as i32 {
                let p = Pos::new(x, y);
                let ch = if path.contains(&p) {
                    '@'
                } else {
                    match self.grid.get(p) {
                        CellKind::Space => '.',
                        CellKind::Sea => '*',
                        CellKind::Obstacle => '#',
                        CellKind::Berth => 'B',
                        CellKind::Robot => 'R',
                    }
                };
                out.push(ch);
            }
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(&[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_map(n: usize) -> Map {
        let line = ".".repeat(n);
        let lines: Vec<&str> = (0..n).map(|_| line.as_str()).collect();
        Map::parse(&lines)
    }

    #[test]
    fn bfs_distance_matches_manhattan_on_open_ground() {
        let mut map = open_map(10);
        map.compute_berth_distances(BerthId(0), &[Pos::new(0, 0)]);
        assert_eq!(map.berth_distance(BerthId(0), Pos::new(3, 4)), 7);
        assert_eq!(map.berth_distance(BerthId(0), Pos::new(0, 0)), 0);
        assert!(map.is_berth_reachable(BerthId(0), Pos::new(9, 9)));
    }

    #[test]
    fn bfs_marks_walled_off_cells_unreachable() {
        let mut map = Map::parse(&[
            "..#.",
            "..#.",
            "..#.",
            "..#.",
        ]);
        map.compute_berth_distances(BerthId(0), &[Pos::new(0, 0)]);
        assert!(!map.is_berth_reachable(BerthId(0), Pos::new(0, 3)));
        assert!(map.is_berth_reachable(BerthId(0), Pos::new(3, 1)));
    }

    #[test]
    fn neighbor_order_flips_on_even_coordinate_sum() {
        let map = open_map(12);
        // Even sum: reversed {S, N, W, E}.
        assert_eq!(
            map.neighbors(Pos::new(5, 5)),
            vec![
                Pos::new(5, 6),
                Pos::new(5, 4),
                Pos::new(4, 5),
                Pos::new(6, 5),
            ]
        );
        // Odd sum: canonical {E, W, N, S}.
        assert_eq!(
            map.neighbors(Pos::new(5, 6)),
            vec![
                Pos::new(6, 6),
                Pos::new(4, 6),
                Pos::new(5, 5),
                Pos::new(5, 7),
            ]
        );
    }

    #[test]
    fn corner_neighbors_respect_bounds_and_order() {
        let map = open_map(4);
        // (0, 0): even sum, candidates E and S survive, reversed.
        assert_eq!(
            map.neighbors(Pos::new(0, 0)),
            vec![Pos::new(0, 1), Pos::new(1, 0)]
        );
    }

    #[test]
    fn temporary_obstacle_roundtrip_restores_cell() {
        let mut map = Map::parse(&["..B", "...", "..."]);
        let p = Pos::new(0, 2);
        assert_eq!(map.cell(p), CellKind::Berth);
        map.add_temporary_obstacle(p);
        assert_eq!(map.cell(p), CellKind::Robot);
        assert!(!map.passable(p));
        map.remove_temporary_obstacle(p);
        assert_eq!(map.cell(p), CellKind::Berth);
        assert!(map.temporary_obstacles_clear());
    }

    #[test]
    fn temporary_obstacle_refcount_nests() {
        let mut map = open_map(4);
        let p = Pos::new(1, 1);
        map.add_temporary_obstacle(p);
        map.add_temporary_obstacle(p);
        map.remove_temporary_obstacle(p);
        assert_eq!(map.cell(p), CellKind::Robot);
        map.remove_temporary_obstacle(p);
        assert_eq!(map.cell(p), CellKind::Space);
        assert!(map.temporary_obstacles_clear());
    }

    #[test]
    fn temporary_obstacle_on_sea_is_rejected() {
        let mut map = Map::parse(&["*...", "....", "....", "...."]);
        map.add_temporary_obstacle(Pos::new(0, 0));
        assert_eq!(map.cell(Pos::new(0, 0)), CellKind::Sea);
        assert!(map.temporary_obstacles_clear());
    }

    #[test]
    fn clear_drops_all_pins() {
        let mut map = open_map(5);
        map.add_temporary_obstacle(Pos::new(1, 1));
        map.add_temporary_obstacle(Pos::new(1, 1));
        map.add_temporary_obstacle(Pos::new(2, 2));
        map.clear_temporary_obstacles();
        assert!(map.temporary_obstacles_clear());
        assert_eq!(map.cell(Pos::new(1, 1)), CellKind::Space);
        assert_eq!(map.cell(Pos::new(2, 2)), CellKind::Space);
    }

    #[test]
    fn collision_risk_bubbles_around_close_robots() {
        let mut map = open_map(10);
        map.set_robot_positions(vec![Pos::new(5, 5), Pos::new(5, 7)]);
        let cells = map.collision_risk(RobotId(0), 1);
        // Robot 1 is within the 2-cell bubble; its 3×3 square is returned.
        assert!(cells.contains(&Pos::new(5, 7)));
        assert!(cells.contains(&Pos::new(4, 6)));
        assert!(!cells.contains(&Pos::new(5, 5)));

        // With no lookahead the bubble test excludes robot 1 entirely.
        assert!(map.collision_risk(RobotId(0), 0).is_empty());
    }

    #[test]
    fn robot_shops_are_the_a_cells() {
        let map = Map::parse(&["A...", "..A.", "....", "...."]);
        assert_eq!(map.robot_shops(), &[Pos::new(0, 0), Pos::new(1, 2)]);
        // A cells are walkable space.
        assert!(map.passable(Pos::new(0, 0)));
    }

    #[test]
    fn delivery_points_sit_on_border_sea_runs() {
        let map = Map::parse(&[
            "****",
            "#..*",
            "#..*",
            "####",
        ]);
        let points = map.delivery_points();
        assert!(!points.is_empty());
        for p in points {
            assert_eq!(map.cell(*p), CellKind::Sea);
            assert!(p.x == 0 || p.y == 3 || p.x == 3 || p.y == 0);
        }
    }

    #[test]
    fn ship_shop_candidates_touch_berths() {
        let map = Map::parse(&[
            "..**",
            "BB**",
            "BB**",
            "..**",
        ]);
        let candidates = map.ship_shop_candidates();
        assert!(candidates.contains(&Pos::new(1, 2)));
        assert!(candidates.contains(&Pos::new(2, 2)));
        assert!(!candidates.contains(&Pos::new(0, 3)));
    }

    #[test]
    fn sea_lane_is_the_coastal_margin() {
        let map = Map::parse(&[
            "*****",
            "*****",
            "*****",
            "*****",
            "*****",
        ]);
        // Border water touches the map edge; interior water does not.
        assert!(map.is_sea_lane(Pos::new(0, 2)));
        assert!(map.is_sea_lane(Pos::new(4, 4)));
        assert!(!map.is_sea_lane(Pos::new(1, 1)));
        assert!(!map.is_sea_lane(Pos::new(2, 2)));
    }

    #[test]
    fn render_shows_cells_and_path_overlay() {
        let map = Map::parse(&["..B", "#.*", "..."]);
        let plain = map.to_string();
        assert_eq!(plain, "..B\n#.*\n...\n");
        let overlaid = map.render(&[Pos::new(0, 0), Pos::new(0, 1)]);
        assert!(overlaid.starts_with("@@B"));
    }

    #[test]
    fn ship_passability_needs_the_whole_hull() {
        let map = Map::parse(&[
            "*****",
            "*****",
            "**.**",
            "*****",
            "*****",
        ]);
        assert!(map.ship_passable(ShipPose::new(Pos::new(0, 0), Direction::East)));
        // Hull over the land cell at (2, 2) is blocked.
        assert!(!map.ship_passable(ShipPose::new(Pos::new(1, 1), Direction::East)));
        // Hull hanging off the map edge is blocked.
        assert!(!map.ship_passable(ShipPose::new(Pos::new(3, 3), Direction::East)));
    }
}
