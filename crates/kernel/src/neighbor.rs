//! Uniform-grid spatial hash for neighbor search.
//!
//! Particles are bucketed by cell key into a sorted `(key, index)` array plus a
//! per-cell `(start, count)` table. The same two arrays are built on the device
//! by the GPU backend, so their element types are `Pod` and match the device
//! layout exactly.

use bytemuck::{Pod, Zeroable};

use crate::params::Params;

/// One entry of the sorted pair array.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
pub struct KeyIndexPair {
    /// Cell key, `cy * resolution_x + cx`.
    pub key: i32,
    /// Particle index.
    pub index: i32,
}

/// Slice of the sorted pair array that belongs to one cell.
///
/// Empty cells keep `start == n` (the particle count) and `count == 0`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct CellRange {
    /// First sorted position holding this cell's key.
    pub start: u32,
    /// Number of sorted positions holding this cell's key.
    pub count: u32,
}

/// Cell geometry taken from the parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellGrid {
    /// Cell count along x and y.
    pub resolution: [u32; 2],
    /// Cell width and height.
    pub cell_size: [f32; 2],
    /// Query half-extent (the smoothing radius).
    pub reach: f32,
}

impl CellGrid {
    /// Geometry for the current parameters.
    pub fn from_params(params: &Params) -> Self {
        let primary = params.primary();
        let derived = params.derived();
        Self {
            resolution: [primary.cell_resolution_x, primary.cell_resolution_y],
            cell_size: [derived.cell_width, derived.cell_height],
            reach: derived.h,
        }
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> usize {
        self.resolution[0] as usize * self.resolution[1] as usize
    }

    /// Cell containing `pos`, clamped to the border cells.
    #[inline]
    pub fn pos_to_cell(&self, pos: [f32; 2]) -> [i32; 2] {
        let cx = (pos[0] / self.cell_size[0]).floor() as i32;
        let cy = (pos[1] / self.cell_size[1]).floor() as i32;
        [
            cx.clamp(0, self.resolution[0] as i32 - 1),
            cy.clamp(0, self.resolution[1] as i32 - 1),
        ]
    }

    /// Flat key of cell `(cx, cy)`.
    #[inline]
    pub fn cell_key(&self, cell: [i32; 2]) -> i32 {
        cell[1] * self.resolution[0] as i32 + cell[0]
    }
}

/// Sorted pair array and cell table for the current positions.
#[derive(Debug, Clone)]
pub struct NeighborGrid {
    grid: CellGrid,
    pairs: Vec<KeyIndexPair>,
    table: Vec<CellRange>,
}

impl NeighborGrid {
    /// Empty index with geometry from `params`.
    pub fn new(params: &Params) -> Self {
        let grid = CellGrid::from_params(params);
        Self {
            table: vec![CellRange { start: 0, count: 0 }; grid.cell_count()],
            pairs: Vec::new(),
            grid,
        }
    }

    /// Cell geometry in use.
    pub fn grid(&self) -> &CellGrid {
        &self.grid
    }

    /// Sorted `(key, index)` pairs.
    pub fn sorted_pairs(&self) -> &[KeyIndexPair] {
        &self.pairs
    }

    /// Per-cell ranges into [`NeighborGrid::sorted_pairs`].
    pub fn cell_table(&self) -> &[CellRange] {
        &self.table
    }

    /// Rebuild from `positions`, picking up any change of grid geometry in `params`.
    pub fn rebuild(&mut self, positions: &[[f32; 2]], params: &Params) {
        self.grid = CellGrid::from_params(params);
        let n = positions.len();

        self.pairs.clear();
        self.pairs.extend(positions.iter().enumerate().map(|(i, &pos)| KeyIndexPair {
            key: self.grid.cell_key(self.grid.pos_to_cell(pos)),
            index: i as i32,
        }));
        // Stable, so equal keys stay in index order.
        self.pairs.sort_by_key(|pair| pair.key);

        self.table = bucketize(&self.pairs, self.grid.cell_count());
        debug_assert_eq!(
            self.table.iter().map(|c| c.count as usize).sum::<usize>(),
            n
        );
    }

    /// Call `f` with every particle index stored in the cells overlapping
    /// `pos ± h`. The particle at `pos` itself is included when it is indexed.
    ///
    /// Cells are walked x-major, then y, then sorted order within a cell; the
    /// device passes use the same order.
    pub fn for_each_neighbor<F>(&self, pos: [f32; 2], mut f: F)
    where
        F: FnMut(usize),
    {
        let reach = self.grid.reach;
        let lo = self.grid.pos_to_cell([pos[0] - reach, pos[1] - reach]);
        let hi = self.grid.pos_to_cell([pos[0] + reach, pos[1] + reach]);
        for cx in lo[0]..=hi[0] {
            for cy in lo[1]..=hi[1] {
                let range = self.table[self.grid.cell_key([cx, cy]) as usize];
                let start = range.start as usize;
                for pair in &self.pairs[start..start + range.count as usize] {
                    f(pair.index as usize);
                }
            }
        }
    }
}

/// Build the per-cell table from a sorted pair array: scatter-min of the sorted
/// position into `start`, scatter-add into `count`.
pub fn bucketize(sorted: &[KeyIndexPair], cell_count: usize) -> Vec<CellRange> {
    let n = sorted.len() as u32;
    let mut table = vec![CellRange { start: n, count: 0 }; cell_count];
    for (i, pair) in sorted.iter().enumerate() {
        let cell = &mut table[pair.key as usize];
        cell.start = cell.start.min(i as u32);
        cell.count += 1;
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParamField, ParamValue};

    fn params_with_resolution(res: i64) -> Params {
        let mut params = Params::default();
        params
            .set_primary(ParamField::CellResolutionX, ParamValue::Int(res))
            .unwrap();
        params
            .set_primary(ParamField::CellResolutionY, ParamValue::Int(res))
            .unwrap();
        params
    }

    /// Deterministic pseudo-random positions, some outside the unit square.
    fn scattered_positions(n: usize) -> Vec<[f32; 2]> {
        let mut state = 0x2545_f491_u32;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state as f32 / u32::MAX as f32) * 1.2 - 0.1
        };
        (0..n).map(|_| [next(), next()]).collect()
    }

    #[test]
    fn clamps_out_of_range_positions() {
        let params = params_with_resolution(10);
        let grid = CellGrid::from_params(&params);
        assert_eq!(grid.pos_to_cell([-0.5, 0.05]), [0, 0]);
        assert_eq!(grid.pos_to_cell([3.0, 0.95]), [9, 9]);
        assert_eq!(grid.pos_to_cell([0.55, 0.25]), [5, 2]);
        assert_eq!(grid.cell_key([5, 2]), 25);
    }

    #[test]
    fn empty_cells_use_sentinel() {
        let params = params_with_resolution(4);
        let mut index = NeighborGrid::new(&params);
        index.rebuild(&[[0.1, 0.1], [0.12, 0.1], [0.9, 0.9]], &params);

        let table = index.cell_table();
        assert_eq!(table[0], CellRange { start: 0, count: 2 });
        assert_eq!(table[15], CellRange { start: 2, count: 1 });
        assert_eq!(table[5], CellRange { start: 3, count: 0 });
    }

    #[test]
    fn ranges_are_disjoint_and_exhaustive() {
        let params = params_with_resolution(16);
        let positions = scattered_positions(500);
        let mut index = NeighborGrid::new(&params);
        index.rebuild(&positions, &params);

        let pairs = index.sorted_pairs();
        assert!(pairs.windows(2).all(|w| w[0].key <= w[1].key));

        let mut covered = vec![false; positions.len()];
        for (key, range) in index.cell_table().iter().enumerate() {
            for slot in range.start..range.start + range.count {
                let pair = pairs[slot as usize];
                assert_eq!(pair.key as usize, key);
                let cell = index.grid().pos_to_cell(positions[pair.index as usize]);
                assert_eq!(index.grid().cell_key(cell) as usize, key);
                assert!(!covered[slot as usize], "slot {slot} claimed twice");
                covered[slot as usize] = true;
            }
        }
        assert!(covered.iter().all(|&c| c));
    }

    #[test]
    fn query_never_misses_a_true_neighbor() {
        let params = params_with_resolution(40);
        let h = params.derived().h;
        let positions = scattered_positions(400);
        let mut index = NeighborGrid::new(&params);
        index.rebuild(&positions, &params);

        for (i, &pi) in positions.iter().enumerate() {
            let mut visited = vec![false; positions.len()];
            index.for_each_neighbor(pi, |j| visited[j] = true);
            assert!(visited[i], "particle {i} must see itself");
            for (j, &pj) in positions.iter().enumerate() {
                let dx = pj[0] - pi[0];
                let dy = pj[1] - pi[1];
                if (dx * dx + dy * dy).sqrt() <= h {
                    assert!(visited[j], "particle {i} missed neighbor {j}");
                }
            }
        }
    }

    #[test]
    fn equal_keys_keep_index_order() {
        let params = params_with_resolution(2);
        let mut index = NeighborGrid::new(&params);
        index.rebuild(&[[0.9, 0.9], [0.1, 0.1], [0.8, 0.8], [0.2, 0.2]], &params);
        let order: Vec<i32> = index.sorted_pairs().iter().map(|p| p.index).collect();
        assert_eq!(order, vec![1, 3, 0, 2]);
    }
}
