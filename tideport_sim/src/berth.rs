// Berth records: the 4×4 dock footprints where robots drop goods off and
// ships load them.
//
// Storage is sixteen slots addressed by cell, each holding at most one
// goods id (`Option<GoodsId>` — the table in `goods.rs` stays the single
// owner of the items themselves). The incoming list is rebuilt every frame
// from robot intents, so a berth always knows the value heading its way
// when the ship scheduler prices it.
//
// See also: `ship_scheduler.rs` for berth pricing and loading, `map.rs`
// for the distance fields seeded from the footprint cells.

use crate::types::{BerthId, GoodsId, Pos, ShipPose};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Side length of the square berth footprint.
pub const BERTH_SIZE: i32 = 4;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Berth {
    pub id: BerthId,
    /// Top-left cell of the footprint.
    pub origin: Pos,
    /// Frames a loaded ship needs from this berth to its delivery point.
    pub transport_time: u32,
    /// Goods loaded onto a docked ship per frame.
    pub loading_velocity: u32,
    /// One slot per footprint cell, row-major.
    slots: [[Option<GoodsId>; BERTH_SIZE as usize]; BERTH_SIZE as usize],
    /// Cluster this berth belongs to under partition scheduling.
    pub cluster: Option<usize>,
    /// Pose a ship docks at, computed once from the map at init.
    pub docking_pose: Option<ShipPose>,
    /// Goods claimed or carried by robots currently heading here.
    /// Rebuilt every frame.
    pub incoming: Vec<GoodsId>,
}

impl Berth {
    pub fn new(id: BerthId, origin: Pos, transport_time: u32, loading_velocity: u32) -> Self {
        Self {
            id,
            origin,
            transport_time,
            loading_velocity,
            slots: Default::default(),
            cluster: None,
            docking_pose: None,
            incoming: Vec::new(),
        }
    }

    /// Every footprint cell, row-major. Used to seed the BFS distance field.
    pub fn cells(&self) -> impl Iterator<Item = Pos> + '_ {
        (0..BERTH_SIZE).flat_map(move |dx| {
            (0..BERTH_SIZE).map(move |dy| self.origin + Pos::new(dx, dy))
        })
    }

    pub fn contains(&self, p: Pos) -> bool {
        p.x >= self.origin.x
            && p.x < self.origin.x + BERTH_SIZE
            && p.y >= self.origin.y
            && p.y < self.origin.y + BERTH_SIZE
    }

    fn slot_index(&self, p: Pos) -> Option<(usize, usize)> {
        if self.contains(p) {
            Some(((p.x - self.origin.x) as usize, (p.y - self.origin.y) as usize))
        } else {
            None
        }
    }

    pub fn slot(&self, p: Pos) -> Option<GoodsId> {
        self.slot_index(p).and_then(|(i, j)| self.slots[i][j])
    }

    /// The empty slot cell closest to `from` (Manhattan), row-major on ties.
    pub fn nearest_empty_slot(&self, from: Pos) -> Option<Pos> {
        let mut best: Option<(u32, Pos)> = None;
        for cell in self.cells() {
            if self.slot(cell).is_some() {
                continue;
            }
            let d = from.manhattan_distance(cell);
            if best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, cell));
            }
        }
        best.map(|(_, cell)| cell)
    }

    /// Place a goods item in the slot at `p`. Writing to an occupied slot is
    /// an invariant violation: logged, and the item is diverted to the
    /// nearest empty slot instead (dropped entirely if the berth is full).
    pub fn store(&mut self, p: Pos, goods: GoodsId) -> bool {
        let target = match self.slot_index(p) {
            Some((i, j)) if self.slots[i][j].is_none() => Some((i, j)),
            Some(_) => {
                error!(berth = %self.id, cell = %p, "store into an occupied berth slot");
                self.nearest_empty_slot(p)
                    .and_then(|alt| self.slot_index(alt))
            }
            None => {
                error!(berth = %self.id, cell = %p, "store outside the berth footprint");
                None
            }
        };
        match target {
            Some((i, j)) => {
                self.slots[i][j] = Some(goods);
                true
            }
            None => false,
        }
    }

    /// Remove and return up to `n` stored items, row-major order.
    pub fn take_up_to(&mut self, n: u32) -> Vec<GoodsId> {
        let mut taken = Vec::new();
        for row in self.slots.iter_mut() {
            for slot in row.iter_mut() {
                if taken.len() as u32 == n {
                    return taken;
                }
                if let Some(id) = slot.take() {
                    taken.push(id);
                }
            }
        }
        taken
    }

    pub fn stored_count(&self) -> u32 {
        self.slots
            .iter()
            .flatten()
            .filter(|s| s.is_some())
            .count() as u32
    }

    pub fn stored_ids(&self) -> impl Iterator<Item = GoodsId> + '_ {
        self.slots.iter().flatten().filter_map(|s| *s)
    }

    pub fn is_full(&self) -> bool {
        self.stored_count() == (BERTH_SIZE * BERTH_SIZE) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn berth() -> Berth {
        Berth::new(BerthId(0), Pos::new(10, 10), 500, 2)
    }

    #[test]
    fn footprint_has_sixteen_cells() {
        let b = berth();
        let cells: Vec<Pos> = b.cells().collect();
        assert_eq!(cells.len(), 16);
        assert!(b.contains(Pos::new(10, 10)));
        assert!(b.contains(Pos::new(13, 13)));
        assert!(!b.contains(Pos::new(14, 10)));
    }

    #[test]
    fn nearest_empty_slot_prefers_close_cells() {
        let mut b = berth();
        assert_eq!(b.nearest_empty_slot(Pos::new(9, 10)), Some(Pos::new(10, 10)));
        assert!(b.store(Pos::new(10, 10), GoodsId(1)));
        assert_eq!(b.nearest_empty_slot(Pos::new(9, 10)), Some(Pos::new(10, 11)));
    }

    #[test]
    fn store_into_occupied_slot_diverts() {
        let mut b = berth();
        assert!(b.store(Pos::new(10, 10), GoodsId(1)));
        assert!(b.store(Pos::new(10, 10), GoodsId(2)));
        assert_eq!(b.stored_count(), 2);
        assert_eq!(b.slot(Pos::new(10, 10)), Some(GoodsId(1)));
    }

    #[test]
    fn take_up_to_respects_the_load_rate() {
        let mut b = berth();
        for (i, cell) in [Pos::new(10, 10), Pos::new(10, 11), Pos::new(11, 10)]
            .into_iter()
            .enumerate()
        {
            b.store(cell, GoodsId(i));
        }
        let first = b.take_up_to(2);
        assert_eq!(first.len(), 2);
        let rest = b.take_up_to(2);
        assert_eq!(rest.len(), 1);
        assert_eq!(b.stored_count(), 0);
    }

    #[test]
    fn full_berth_rejects_further_stores() {
        let mut b = berth();
        let cells: Vec<Pos> = b.cells().collect();
        for (i, cell) in cells.iter().enumerate() {
            assert!(b.store(*cell, GoodsId(i)));
        }
        assert!(b.is_full());
        assert!(!b.store(cells[0], GoodsId(99)));
        assert_eq!(b.stored_count(), 16);
    }
}
