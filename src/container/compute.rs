use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use super::Container;
use crate::cell::Clip;
use crate::cell::VoronoiCell;
use crate::prelude::Float;
use crate::prelude::Point3d;

// Squared distance below which two particles are reported as duplicates and
// the bisector is skipped.
const DUPLICATE_DISTANCE_SQUARED: Float = 1e-20;

/// A per-thread search workspace. It owns the lazily extended table of block
/// offsets sorted by a conservative lower bound on the squared distance to
/// the target particle's block, so repeated cell computations share the
/// enumeration work. The grid itself is read-only during search.
pub struct Workspace {
    shells: ShellTable,
}

impl Workspace {
    pub fn new(container: &Container) -> Self {
        Self {
            shells: ShellTable::new(container),
        }
    }
}

#[derive(Clone, Copy)]
struct ShellEntry {
    l2: Float,
    delta: [i64; 3],
}

// Block offsets in non-decreasing order of the conservative bound
//     L2(delta) = sum_axis (max(0, |delta| - 1) * block_side)^2
// on the squared distance between any point of the base block and any point
// of the offset block. Offsets are generated shell by shell (by Chebyshev
// radius) into a heap and moved to the sorted list once no unexpanded shell
// can undercut them.
struct ShellTable {
    sorted: Vec<ShellEntry>,
    heap: BinaryHeap<Reverse<(OrderedFloat<Float>, [i64; 3])>>,
    next_shell: i64,
    range: [i64; 3],
    block_size: [Float; 3],
    min_side: Float,
}

impl ShellTable {
    fn new(container: &Container) -> Self {
        let dims = [
            container.nx as i64,
            container.ny as i64,
            container.nz as i64,
        ];
        let mut range = [0; 3];
        for axis in 0..3 {
            // periodic axes reach one full domain length out, so that every
            // particle image that can contribute a plane is enumerated
            range[axis] = if container.domain.periodic(axis) {
                dims[axis]
            } else {
                dims[axis] - 1
            };
        }
        let block_size = container.block_size.to_array();
        Self {
            sorted: Vec::new(),
            heap: BinaryHeap::new(),
            next_shell: 0,
            range,
            block_size,
            min_side: block_size.iter().copied().fold(Float::INFINITY, Float::min),
        }
    }

    fn entry(&mut self, i: usize) -> Option<ShellEntry> {
        while self.sorted.len() <= i {
            let exhausted = self.next_shell > *self.range.iter().max().unwrap();
            match self.heap.peek() {
                Some(&Reverse((l2, _))) if exhausted || l2.0 <= self.shell_floor(self.next_shell) => {
                    let Reverse((l2, delta)) = self.heap.pop().unwrap();
                    self.sorted.push(ShellEntry { l2: l2.0, delta });
                }
                None if exhausted => return None,
                _ => self.expand_shell(),
            }
        }
        Some(self.sorted[i])
    }

    // No offset in shell `s` or beyond can have a bound below this.
    fn shell_floor(&self, s: i64) -> Float {
        if s <= 1 {
            0.0
        } else {
            ((s - 1) as Float * self.min_side).powi(2)
        }
    }

    fn expand_shell(&mut self) {
        let s = self.next_shell;
        self.next_shell += 1;
        let clamp = |v: i64, axis: usize| v.clamp(-self.range[axis], self.range[axis]);
        for di in clamp(-s, 0)..=clamp(s, 0) {
            for dj in clamp(-s, 1)..=clamp(s, 1) {
                for dk in clamp(-s, 2)..=clamp(s, 2) {
                    if di.abs().max(dj.abs()).max(dk.abs()) != s {
                        continue;
                    }
                    let delta = [di, dj, dk];
                    let l2: Float = (0..3)
                        .map(|axis| {
                            let steps = (delta[axis].abs() - 1).max(0) as Float;
                            (steps * self.block_size[axis]).powi(2)
                        })
                        .sum();
                    self.heap.push(Reverse((OrderedFloat(l2), delta)));
                }
            }
        }
    }
}

impl Container {
    /// Computes the Voronoi cell of the particle in slot `q` of block `ijk`.
    /// Returns `None` if the cell is annihilated by a wall or a neighbor
    /// plane. With `track_neighbors`, every face of the produced cell
    /// carries the identifier of the particle or wall that created it.
    pub fn compute_cell(
        &self,
        workspace: &mut Workspace,
        ijk: usize,
        q: usize,
        track_neighbors: bool,
    ) -> Option<VoronoiCell> {
        let (_, p0, r0) = self.particle(ijk, q);
        let base = self.block_coords(ijk);
        let mut cell = VoronoiCell::new(track_neighbors);
        self.init_cell(&mut cell, p0);
        if !self.apply_walls(&mut cell, p0) {
            return None;
        }
        let mut rsq = cell.max_radius_squared();
        let mut i = 0;
        while let Some(entry) = workspace.shells.entry(i) {
            i += 1;
            if entry.l2 >= self.cutoff(rsq) {
                break;
            }
            let Some((block, image, shift)) = self.resolve_block(base, entry.delta) else {
                continue;
            };
            for slot in 0..self.count(block) {
                if block == ijk && slot == q && image == [0, 0, 0] {
                    continue;
                }
                let (id, pos, radius) = self.particle(block, slot);
                let rel = pos + shift - p0;
                let d2 = rel.length_squared();
                if d2 < DUPLICATE_DISTANCE_SQUARED {
                    log::warn!("Duplicate particle {} at {:?}", id, pos);
                    continue;
                }
                let offset = 0.5 * (d2 + r0 * r0 - radius * radius);
                match cell.clip(rel, offset, id) {
                    Clip::Annihilated => return None,
                    Clip::Cut => rsq = cell.max_radius_squared(),
                    Clip::Unchanged => {}
                }
            }
        }
        Some(cell)
    }

    /// Finds the particle whose Voronoi cell contains the given position,
    /// which is the particle nearest to it (under radical distance for
    /// radical containers). Walls are not considered. Returns the particle
    /// identifier and its position, possibly in a periodic image of the
    /// primary domain. `None` if the position is outside a non-periodic
    /// axis range or the container is empty.
    pub fn find_voronoi_cell(
        &self,
        workspace: &mut Workspace,
        pos: Point3d,
    ) -> Option<(i64, Point3d)> {
        let mut p = pos;
        let (base_ijk, base_image) = self.remap(&mut p)?;
        let base = self.block_coords(base_ijk);
        let len = self.domain.side_lengths();
        let base_shift = Point3d::new(
            base_image[0] as Float * len.x,
            base_image[1] as Float * len.y,
            base_image[2] as Float * len.z,
        );
        let mut best: Option<(Float, i64, Point3d)> = None;
        let mut i = 0;
        while let Some(entry) = workspace.shells.entry(i) {
            i += 1;
            if let Some((best_distance, _, _)) = best {
                if entry.l2 - self.max_radius * self.max_radius >= best_distance {
                    break;
                }
            }
            let Some((block, _, shift)) = self.resolve_block(base, entry.delta) else {
                continue;
            };
            for slot in 0..self.count(block) {
                let (id, particle_pos, radius) = self.particle(block, slot);
                let image_pos = particle_pos + shift;
                let distance = image_pos.distance_squared(p) - radius * radius;
                if best.is_none() || distance < best.unwrap().0 {
                    best = Some((distance, id, image_pos + base_shift));
                }
            }
        }
        best.map(|(_, id, found)| (id, found))
    }

    // The initial cell box: the domain box in the particle's local frame on
    // non-periodic axes, and a full domain length on each side along
    // periodic axes, so that the particle's own images genuinely cut the
    // cell and tag its faces.
    fn init_cell(&self, cell: &mut VoronoiCell, p0: Point3d) {
        let len = self.domain.side_lengths().to_array();
        let min = self.domain.min.to_array();
        let p = p0.to_array();
        let mut lo = [0.0; 3];
        let mut hi = [0.0; 3];
        for axis in 0..3 {
            if self.domain.periodic(axis) {
                lo[axis] = -len[axis];
                hi[axis] = len[axis];
            } else {
                lo[axis] = min[axis] - p[axis];
                hi[axis] = min[axis] + len[axis] - p[axis];
            }
        }
        cell.init(Point3d::from_array(lo), Point3d::from_array(hi));
    }

    // Termination bound on the conservative block distance: a particle in a
    // block at least this far away cannot cut the current cell.
    fn cutoff(&self, rsq: Float) -> Float {
        if self.radical() {
            4.0 * (rsq.sqrt() + self.max_radius).powi(2)
        } else {
            4.0 * rsq
        }
    }

    // Resolves a block offset against the grid: the wrapped block index,
    // the periodic image the offset reaches into, and the position shift of
    // that image. `None` if the offset leaves the grid on a non-periodic
    // axis.
    fn resolve_block(
        &self,
        base: [i64; 3],
        delta: [i64; 3],
    ) -> Option<(usize, [i64; 3], Point3d)> {
        let dims = [self.nx as i64, self.ny as i64, self.nz as i64];
        let len = self.domain.side_lengths().to_array();
        let mut idx = [0; 3];
        let mut image = [0i64; 3];
        let mut shift = [0.0; 3];
        for axis in 0..3 {
            let c = base[axis] + delta[axis];
            if self.domain.periodic(axis) {
                let w = c.div_euclid(dims[axis]);
                image[axis] = w;
                idx[axis] = (c - w * dims[axis]) as usize;
                shift[axis] = w as Float * len[axis];
            } else {
                if c < 0 || c >= dims[axis] {
                    return None;
                }
                idx[axis] = c as usize;
            }
        }
        Some((
            self.index(idx[0], idx[1], idx[2]),
            image,
            Point3d::from_array(shift),
        ))
    }
}
