mod compute;
mod draw;
mod pre_container;

use std::cell::UnsafeCell;
use std::io;
use std::io::BufRead;
use std::io::Write;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use rayon::prelude::*;

pub use compute::Workspace;
pub use pre_container::PreContainer;

use crate::cell::VoronoiCell;
use crate::config::DEFAULT_RADIUS;
use crate::config::MAX_PARTICLE_MEMORY;
use crate::config::MAX_REGIONS;
use crate::domain::DomainBox;
use crate::error::fatal_error;
use crate::error::ExitCode;
use crate::output::OutputTemplate;
use crate::prelude::Float;
use crate::prelude::Point3d;
use crate::wall::Wall;

/// A particle to be stored in a container. The radius is ignored by
/// containers built without radius weighting.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub id: i64,
    pub pos: Point3d,
    pub radius: Float,
}

impl Particle {
    pub fn new(id: i64, pos: Point3d) -> Self {
        Self {
            id,
            pos,
            radius: 0.0,
        }
    }

    pub fn with_radius(id: i64, pos: Point3d, radius: Float) -> Self {
        Self { id, pos, radius }
    }
}

/// An append-only log of `(block, slot)` pairs recording insertion order,
/// owned by the caller and consumed when output in input order is requested.
#[derive(Clone, Debug, Default)]
pub struct ParticleOrder {
    entries: Vec<(usize, usize)>,
}

impl ParticleOrder {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, ijk: usize, q: usize) {
        self.entries.push((ijk, q));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Fixed-capacity particle storage of one grid block. The slot count lives
// outside in the container so that parallel insertion can claim slots with
// a single atomic increment.
struct Block {
    ids: Box<[i64]>,
    data: Box<[Float]>,
}

impl Block {
    fn with_memory(mem: usize, ps: usize) -> Self {
        Self {
            ids: vec![0; mem].into_boxed_slice(),
            data: vec![0.0; mem * ps].into_boxed_slice(),
        }
    }

    fn memory(&self) -> usize {
        self.ids.len()
    }

    fn write(&mut self, slot: usize, particle: &Particle, ps: usize) {
        self.ids[slot] = particle.id;
        let d = &mut self.data[slot * ps..(slot + 1) * ps];
        d[0] = particle.pos.x;
        d[1] = particle.pos.y;
        d[2] = particle.pos.z;
        if ps == 4 {
            d[3] = particle.radius;
        }
    }

    fn particle(&self, slot: usize, ps: usize) -> (i64, Point3d, Float) {
        let d = &self.data[slot * ps..(slot + 1) * ps];
        (
            self.ids[slot],
            Point3d::new(d[0], d[1], d[2]),
            if ps == 4 { d[3] } else { 0.0 },
        )
    }

    /// Doubles the capacity until `slot` fits, preserving stored particles.
    fn grow_to(&mut self, slot: usize, ps: usize) {
        let mut nmem = self.memory() * 2;
        while slot >= nmem {
            nmem *= 2;
        }
        if nmem > MAX_PARTICLE_MEMORY {
            fatal_error(
                "Absolute maximum memory allocation exceeded",
                ExitCode::MemoryError,
            );
        }
        log::trace!("Block memory scaled up to {}", nmem);
        let mut ids = vec![0; nmem].into_boxed_slice();
        ids[..self.ids.len()].copy_from_slice(&self.ids);
        let mut data = vec![0.0; nmem * ps].into_boxed_slice();
        data[..self.data.len()].copy_from_slice(&self.data);
        self.ids = ids;
        self.data = data;
    }
}

// Slots claimed through the atomic count are written without further
// synchronization, each claim yielding a distinct slot.
struct BlockSlot(UnsafeCell<Block>);

unsafe impl Sync for BlockSlot {}

#[derive(Default)]
struct OverflowLog {
    entries: Vec<OverflowEntry>,
    max_radius: Float,
}

struct OverflowEntry {
    ijk: usize,
    slot: usize,
    particle: Particle,
}

#[derive(Clone, Copy)]
struct BlockPtr {
    ids: *mut i64,
    data: *mut Float,
    mem: usize,
}

struct BlockPtrs<'a>(&'a [BlockPtr]);

unsafe impl Sync for BlockPtrs<'_> {}

/// A particle container dividing its domain into a uniform grid of blocks.
///
/// Particles are inserted serially with [`put`](Self::put) or in bulk from
/// many threads with [`par_put_all`](Self::par_put_all); after any parallel
/// insertion, [`reconcile_overflow`](Self::reconcile_overflow) must run
/// before the container is searched. Voronoi cells are computed per particle
/// against the stored neighbors, the registered walls and, along periodic
/// axes, the particles' periodic images.
pub struct Container {
    domain: DomainBox,
    nx: usize,
    ny: usize,
    nz: usize,
    block_size: Point3d,
    inv_block_size: Point3d,
    ps: usize,
    co: Vec<AtomicUsize>,
    blocks: Vec<BlockSlot>,
    overflow: Mutex<OverflowLog>,
    max_radius: Float,
    walls: Vec<(i64, Box<dyn Wall>)>,
}

impl Container {
    /// Creates a container over `domain` with the given grid dimensions and
    /// initial per-block slot allocation. With `radical` set, particles
    /// carry radii and cells are built under radical (power) distance.
    pub fn new(
        domain: DomainBox,
        (nx, ny, nz): (usize, usize, usize),
        init_memory: usize,
        radical: bool,
    ) -> Self {
        assert!(nx > 0 && ny > 0 && nz > 0, "Empty grid");
        assert!(init_memory > 0, "Empty block allocation");
        if nx.saturating_mul(ny).saturating_mul(nz) > MAX_REGIONS {
            fatal_error(
                "Number of computational blocks exceeds the maximum allowed",
                ExitCode::MemoryError,
            );
        }
        let nxyz = nx * ny * nz;
        let side = domain.side_lengths();
        let block_size = Point3d::new(side.x / nx as Float, side.y / ny as Float, side.z / nz as Float);
        let ps = if radical { 4 } else { 3 };
        Self {
            domain,
            nx,
            ny,
            nz,
            block_size,
            inv_block_size: block_size.recip(),
            ps,
            co: (0..nxyz).map(|_| AtomicUsize::new(0)).collect(),
            blocks: (0..nxyz)
                .map(|_| BlockSlot(UnsafeCell::new(Block::with_memory(init_memory, ps))))
                .collect(),
            overflow: Mutex::new(OverflowLog::default()),
            max_radius: 0.0,
            walls: Vec::new(),
        }
    }

    pub fn domain(&self) -> &DomainBox {
        &self.domain
    }

    pub fn grid_dimensions(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    pub fn radical(&self) -> bool {
        self.ps == 4
    }

    /// The largest particle radius stored so far. Only meaningful for
    /// radical containers after reconciliation.
    pub fn max_radius(&self) -> Float {
        self.max_radius
    }

    pub fn total_particles(&self) -> usize {
        self.co.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    /// Registers a bounding wall and returns its identifier. Wall
    /// identifiers are negative, starting at -7 below the six identifiers
    /// reserved for the faces of the bounding box.
    pub fn add_wall(&mut self, wall: Box<dyn Wall>) -> i64 {
        let id = -7 - self.walls.len() as i64;
        self.walls.push((id, wall));
        id
    }

    /// Whether a point lies inside the domain bounds and all walls.
    pub fn point_inside(&self, pos: Point3d) -> bool {
        self.domain.contains(pos) && self.walls.iter().all(|(_, w)| w.point_inside(pos))
    }

    pub(crate) fn apply_walls(&self, cell: &mut VoronoiCell, pos: Point3d) -> bool {
        self.walls.iter().all(|(id, w)| w.cut_cell(cell, pos, *id))
    }

    /// Stores a particle in the block containing it. Returns `false` and
    /// logs if the position violates a non-periodic axis range.
    pub fn put(&mut self, particle: Particle) -> bool {
        self.put_slot(particle).is_some()
    }

    /// Like [`put`](Self::put), additionally recording the storage location
    /// in an insertion-order log.
    pub fn put_ordered(&mut self, order: &mut ParticleOrder, particle: Particle) -> bool {
        match self.put_slot(particle) {
            Some((ijk, q)) => {
                order.add(ijk, q);
                true
            }
            None => false,
        }
    }

    fn put_slot(&mut self, mut particle: Particle) -> Option<(usize, usize)> {
        let Some(ijk) = self.locate(&mut particle.pos) else {
            log::debug!("Out of bounds: {:?}", particle.pos);
            return None;
        };
        let q = *self.co[ijk].get_mut();
        let block = self.blocks[ijk].0.get_mut();
        if q == block.memory() {
            block.grow_to(q, self.ps);
        }
        block.write(q, &particle, self.ps);
        *self.co[ijk].get_mut() += 1;
        if self.radical() && particle.radius > self.max_radius {
            self.max_radius = particle.radius;
        }
        Some((ijk, q))
    }

    /// Inserts a batch of particles from the rayon thread pool. Slots are
    /// claimed by an atomic increment on the block count; claims beyond a
    /// block's current capacity land in the overflow log, to be placed by
    /// [`reconcile_overflow`](Self::reconcile_overflow) once insertion has
    /// finished. Each thread keeps a private running maximum radius that is
    /// reduced into the log when its span of work completes.
    pub fn par_put_all(&mut self, particles: &[Particle]) {
        let ps = self.ps;
        let ptrs: Vec<BlockPtr> = self
            .blocks
            .iter_mut()
            .map(|slot| {
                let block = slot.0.get_mut();
                BlockPtr {
                    ids: block.ids.as_mut_ptr(),
                    data: block.data.as_mut_ptr(),
                    mem: block.memory(),
                }
            })
            .collect();
        let ptrs = BlockPtrs(&ptrs);
        let this = &*self;
        let max_radius = particles
            .par_iter()
            .fold(
                || 0.0,
                |local_max: Float, particle| {
                    let ptrs = &ptrs;
                    let mut pos = particle.pos;
                    let Some(ijk) = this.locate(&mut pos) else {
                        log::debug!("Out of bounds: {:?}", particle.pos);
                        return local_max;
                    };
                    let placed = Particle { pos, ..*particle };
                    let slot = this.co[ijk].fetch_add(1, Ordering::Relaxed);
                    let block = ptrs.0[ijk];
                    if slot < block.mem {
                        // Safety: the atomic claim hands each caller a
                        // distinct in-capacity slot, and no block is resized
                        // while the batch runs.
                        unsafe {
                            block.ids.add(slot).write(placed.id);
                            let d = block.data.add(slot * ps);
                            d.write(placed.pos.x);
                            d.add(1).write(placed.pos.y);
                            d.add(2).write(placed.pos.z);
                            if ps == 4 {
                                d.add(3).write(placed.radius);
                            }
                        }
                    } else {
                        let mut overflow = this.overflow.lock().unwrap();
                        overflow.entries.push(OverflowEntry {
                            ijk,
                            slot,
                            particle: placed,
                        });
                    }
                    local_max.max(particle.radius)
                },
            )
            .reduce(|| 0.0, Float::max);
        if self.radical() {
            let overflow = self.overflow.get_mut().unwrap();
            overflow.max_radius = overflow.max_radius.max(max_radius);
        }
    }

    /// Places the particles that overflowed their block during parallel
    /// insertion, growing each affected block to the smallest power-of-two
    /// capacity that covers the largest claimed slot, and folds the pending
    /// per-thread maximum radius into the container-wide one. Idempotent on
    /// a quiescent container.
    pub fn reconcile_overflow(&mut self) {
        let overflow = self.overflow.get_mut().unwrap();
        let entries = std::mem::take(&mut overflow.entries);
        let pending_max = std::mem::replace(&mut overflow.max_radius, 0.0);
        for entry in entries {
            let block = self.blocks[entry.ijk].0.get_mut();
            if entry.slot >= block.memory() {
                block.grow_to(entry.slot, self.ps);
            }
            block.write(entry.slot, &entry.particle, self.ps);
        }
        if self.radical() && pending_max > self.max_radius {
            self.max_radius = pending_max;
        }
    }

    /// Reads a whitespace-separated particle stream of `id x y z` records
    /// (`id x y z r` for radical containers), one per line.
    pub fn import<R: BufRead>(&mut self, reader: R) {
        let radical = self.radical();
        for particle in parse_particles(reader, radical) {
            self.put(particle);
        }
    }

    /// Like [`import`](Self::import), additionally recording insertion
    /// order.
    pub fn import_ordered<R: BufRead>(&mut self, order: &mut ParticleOrder, reader: R) {
        let radical = self.radical();
        for particle in parse_particles(reader, radical) {
            self.put_ordered(order, particle);
        }
    }

    /// Maps a position to its block, wrapping it into the primary domain
    /// along periodic axes. Fails on a violated non-periodic axis.
    fn locate(&self, pos: &mut Point3d) -> Option<usize> {
        let mut idx = [0; 3];
        let mut p = pos.to_array();
        let min = self.domain.min.to_array();
        let len = self.domain.side_lengths().to_array();
        let inv = self.inv_block_size.to_array();
        let dims = [self.nx, self.ny, self.nz];
        for axis in 0..3 {
            let c = ((p[axis] - min[axis]) * inv[axis]).floor() as i64;
            let n = dims[axis] as i64;
            if self.domain.periodic(axis) {
                let wrapped = c.rem_euclid(n);
                p[axis] += len[axis] * ((wrapped - c) / n) as Float;
                idx[axis] = wrapped as usize;
            } else {
                if c < 0 || c >= n {
                    return None;
                }
                idx[axis] = c as usize;
            }
        }
        *pos = Point3d::from_array(p);
        Some(self.index(idx[0], idx[1], idx[2]))
    }

    /// Maps a position to its block like `locate`, additionally reporting
    /// the periodic image displacement that was removed, so that callers can
    /// reconstruct absolute positions.
    pub fn remap(&self, pos: &mut Point3d) -> Option<(usize, [i64; 3])> {
        let mut idx = [0; 3];
        let mut image = [0i64; 3];
        let mut p = pos.to_array();
        let min = self.domain.min.to_array();
        let len = self.domain.side_lengths().to_array();
        let inv = self.inv_block_size.to_array();
        let dims = [self.nx, self.ny, self.nz];
        for axis in 0..3 {
            let c = ((p[axis] - min[axis]) * inv[axis]).floor() as i64;
            let n = dims[axis] as i64;
            if c < 0 || c >= n {
                if !self.domain.periodic(axis) {
                    return None;
                }
                let w = c.div_euclid(n);
                image[axis] = w;
                p[axis] -= w as Float * len[axis];
                idx[axis] = (c - w * n) as usize;
            } else {
                idx[axis] = c as usize;
            }
        }
        *pos = Point3d::from_array(p);
        Some((self.index(idx[0], idx[1], idx[2]), image))
    }

    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.nx * (j + self.ny * k)
    }

    fn block_coords(&self, ijk: usize) -> [i64; 3] {
        [
            (ijk % self.nx) as i64,
            ((ijk / self.nx) % self.ny) as i64,
            (ijk / (self.nx * self.ny)) as i64,
        ]
    }

    fn count(&self, ijk: usize) -> usize {
        self.co[ijk].load(Ordering::Relaxed)
    }

    // Shared read access to a block; the grid must be quiescent, which the
    // borrow rules guarantee because all mutation requires `&mut self`.
    fn block(&self, ijk: usize) -> &Block {
        unsafe { &*self.blocks[ijk].0.get() }
    }

    pub(crate) fn particle(&self, ijk: usize, q: usize) -> (i64, Point3d, Float) {
        self.block(ijk).particle(q, self.ps)
    }

    fn output_radius(&self, radius: Float) -> Float {
        if self.radical() {
            radius
        } else {
            DEFAULT_RADIUS
        }
    }

    /// Iterates over all stored particles in block order.
    pub fn particles(&self) -> impl Iterator<Item = ParticleRef> + '_ {
        (0..self.blocks.len()).flat_map(move |ijk| {
            (0..self.count(ijk)).map(move |q| {
                let (id, pos, radius) = self.particle(ijk, q);
                ParticleRef {
                    ijk,
                    q,
                    id,
                    pos,
                    radius,
                }
            })
        })
    }

    /// Iterates over stored particles in the order recorded in `order`.
    pub fn particles_ordered<'a>(
        &'a self,
        order: &'a ParticleOrder,
    ) -> impl Iterator<Item = ParticleRef> + 'a {
        order.entries.iter().map(move |&(ijk, q)| {
            let (id, pos, radius) = self.particle(ijk, q);
            ParticleRef {
                ijk,
                q,
                id,
                pos,
                radius,
            }
        })
    }

    /// Computes every cell and writes one line per particle according to the
    /// output template. Particles whose cell is annihilated by a wall are
    /// skipped.
    pub fn print_custom<W: Write>(
        &self,
        template: &OutputTemplate,
        out: &mut W,
    ) -> io::Result<()> {
        if template.is_empty() {
            return Ok(());
        }
        let mut workspace = Workspace::new(self);
        let track = template.contains_neighbors();
        for p in self.particles() {
            if let Some(cell) = self.compute_cell(&mut workspace, p.ijk, p.q, track) {
                template.write_cell(out, &cell, p.id, p.pos, self.output_radius(p.radius))?;
            }
        }
        Ok(())
    }

    /// Like [`print_custom`](Self::print_custom), emitting cells in the
    /// order recorded in `order`.
    pub fn print_custom_ordered<W: Write>(
        &self,
        template: &OutputTemplate,
        order: &ParticleOrder,
        out: &mut W,
    ) -> io::Result<()> {
        if template.is_empty() {
            return Ok(());
        }
        let mut workspace = Workspace::new(self);
        let track = template.contains_neighbors();
        for p in self.particles_ordered(order) {
            if let Some(cell) = self.compute_cell(&mut workspace, p.ijk, p.q, track) {
                template.write_cell(out, &cell, p.id, p.pos, self.output_radius(p.radius))?;
            }
        }
        Ok(())
    }

    /// Parallel variant of [`print_custom`](Self::print_custom): cells are
    /// computed on the rayon thread pool with one private workspace per
    /// thread, then written in block order.
    pub fn par_print_custom<W: Write>(
        &self,
        template: &OutputTemplate,
        out: &mut W,
    ) -> io::Result<()> {
        if template.is_empty() {
            return Ok(());
        }
        let track = template.contains_neighbors();
        let refs: Vec<ParticleRef> = self.particles().collect();
        let lines: Vec<Vec<u8>> = refs
            .par_iter()
            .map_init(
                || Workspace::new(self),
                |workspace, p| {
                    let mut buf = Vec::new();
                    if let Some(cell) = self.compute_cell(workspace, p.ijk, p.q, track) {
                        template
                            .write_cell(&mut buf, &cell, p.id, p.pos, self.output_radius(p.radius))
                            .expect("write to memory buffer");
                    }
                    buf
                },
            )
            .collect();
        for line in lines {
            out.write_all(&line)?;
        }
        Ok(())
    }

    /// Computes every cell and sums the volumes. In a closed container this
    /// equals the domain volume up to tolerance.
    pub fn sum_cell_volumes(&self) -> Float {
        let mut workspace = Workspace::new(self);
        let mut volume = 0.0;
        for p in self.particles() {
            if let Some(cell) = self.compute_cell(&mut workspace, p.ijk, p.q, false) {
                volume += cell.volume();
            }
        }
        volume
    }

    /// Computes every cell, discarding the results. Useful for timing the
    /// tessellation itself.
    pub fn compute_all_cells(&self) {
        let mut workspace = Workspace::new(self);
        for p in self.particles() {
            self.compute_cell(&mut workspace, p.ijk, p.q, false);
        }
    }
}

/// A stored particle together with its storage location.
#[derive(Clone, Copy, Debug)]
pub struct ParticleRef {
    pub ijk: usize,
    pub q: usize,
    pub id: i64,
    pub pos: Point3d,
    pub radius: Float,
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::Rng;
    use rand::SeedableRng;

    use super::Container;
    use super::Particle;
    use super::ParticleOrder;
    use super::Workspace;
    use crate::domain::DomainBox;
    use crate::domain::Extent;
    use crate::output::OutputTemplate;
    use crate::prelude::Point3d;
    use crate::test_utils::assert_float_is_close;
    use crate::test_utils::assert_float_is_close_high_error;
    use crate::test_utils::assert_point_is_close;

    fn unit_domain(periodic: bool) -> DomainBox {
        DomainBox::new(Extent::cube_from_side_length(1.0), [periodic; 3])
    }

    fn random_particles(n: usize, seed: u64) -> Vec<Particle> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|i| {
                Particle::new(
                    i as i64,
                    Point3d::new(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)),
                )
            })
            .collect()
    }

    #[test]
    fn single_particle_owns_the_whole_box() {
        let mut container = Container::new(unit_domain(false), (1, 1, 1), 8, false);
        container.put(Particle::new(0, Point3d::splat(0.5)));
        let mut workspace = Workspace::new(&container);
        let cell = container.compute_cell(&mut workspace, 0, 0, true).unwrap();
        assert_float_is_close(cell.volume(), 1.0);
        assert_eq!(cell.number_of_vertices(), 8);
        assert_eq!(cell.number_of_faces(), 6);
        assert_eq!(cell.vertex_orders(), vec![3; 8]);
        let neighbors = cell.neighbors();
        assert_eq!(neighbors.len(), 6);
        assert!(neighbors.iter().all(|&n| n < 0));
    }

    #[test]
    fn two_particles_split_the_box() {
        let mut container = Container::new(unit_domain(false), (2, 1, 1), 8, false);
        container.put(Particle::new(0, Point3d::new(0.25, 0.5, 0.5)));
        container.put(Particle::new(1, Point3d::new(0.75, 0.5, 0.5)));
        let mut workspace = Workspace::new(&container);
        let mut volumes = Vec::new();
        for p in container.particles() {
            let cell = container
                .compute_cell(&mut workspace, p.ijk, p.q, true)
                .unwrap();
            volumes.push(cell.volume());
            if p.id == 0 {
                assert!(cell.neighbors().contains(&1));
                let shared = cell
                    .neighbors()
                    .iter()
                    .position(|&n| n == 1)
                    .unwrap();
                assert_float_is_close(cell.face_areas()[shared], 1.0);
                assert_point_is_close(cell.face_normals()[shared], Point3d::new(1.0, 0.0, 0.0));
            }
        }
        assert_float_is_close(volumes[0], 0.5);
        assert_float_is_close(volumes[1], 0.5);
    }

    #[test]
    fn periodic_single_particle_neighbors_itself() {
        let mut container = Container::new(unit_domain(true), (1, 1, 1), 8, false);
        container.put(Particle::new(0, Point3d::splat(0.5)));
        let mut workspace = Workspace::new(&container);
        let cell = container.compute_cell(&mut workspace, 0, 0, true).unwrap();
        assert_float_is_close(cell.volume(), 1.0);
        assert_eq!(cell.number_of_faces(), 6);
        assert_eq!(cell.neighbors(), vec![0; 6]);
    }

    #[test]
    fn radical_bisector_is_shifted_by_the_radii() {
        let mut container = Container::new(unit_domain(false), (2, 1, 1), 8, true);
        container.put(Particle::with_radius(0, Point3d::new(0.3, 0.5, 0.5), 0.2));
        container.put(Particle::with_radius(1, Point3d::new(0.7, 0.5, 0.5), 0.1));
        let mut workspace = Workspace::new(&container);
        let mut volumes = [0.0; 2];
        for p in container.particles() {
            let cell = container
                .compute_cell(&mut workspace, p.ijk, p.q, false)
                .unwrap();
            volumes[p.id as usize] = cell.volume();
        }
        // the power bisector sits at x = 0.5 + (0.2^2 - 0.1^2) / (2 * 0.4)
        assert_float_is_close_high_error(volumes[0], 0.5375);
        assert_float_is_close_high_error(volumes[1], 0.4625);
        assert_float_is_close(volumes[0] + volumes[1], 1.0);
    }

    #[test]
    fn cell_volumes_partition_the_domain() {
        let mut container = Container::new(unit_domain(false), (3, 3, 3), 8, false);
        for p in random_particles(100, 17) {
            container.put(p);
        }
        assert!((container.sum_cell_volumes() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn periodic_cell_volumes_partition_the_domain() {
        let mut container = Container::new(unit_domain(true), (3, 3, 3), 8, false);
        for p in random_particles(60, 3) {
            container.put(p);
        }
        assert!((container.sum_cell_volumes() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn neighbor_lists_are_symmetric() {
        for radical in [false, true] {
            let mut container = Container::new(unit_domain(false), (3, 3, 3), 8, radical);
            let mut rng = StdRng::seed_from_u64(99);
            for p in random_particles(60, 5) {
                container.put(Particle {
                    radius: if radical { rng.gen_range(0.01..0.1) } else { 0.0 },
                    ..p
                });
            }
            let mut workspace = Workspace::new(&container);
            let mut lists = vec![Vec::new(); 60];
            for p in container.particles() {
                let cell = container
                    .compute_cell(&mut workspace, p.ijk, p.q, true)
                    .unwrap();
                lists[p.id as usize] = cell.neighbors();
            }
            for (a, list) in lists.iter().enumerate() {
                for &b in list.iter().filter(|&&b| b >= 0) {
                    assert!(
                        lists[b as usize].contains(&(a as i64)),
                        "{} lists {} but not vice versa",
                        a,
                        b
                    );
                }
            }
        }
    }

    #[test]
    fn parallel_insertion_places_every_particle_once() {
        let particles = random_particles(10_000, 23);
        let mut container = Container::new(unit_domain(false), (4, 4, 4), 8, false);
        container.par_put_all(&particles);
        container.reconcile_overflow();
        assert_eq!(container.total_particles(), particles.len());
        let mut ids: Vec<i64> = container.particles().map(|p| p.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..particles.len() as i64).collect::<Vec<_>>());
    }

    #[test]
    fn reconciliation_is_idempotent() {
        let particles = random_particles(2000, 8);
        let mut container = Container::new(unit_domain(false), (2, 2, 2), 8, false);
        container.par_put_all(&particles);
        container.reconcile_overflow();
        let before: Vec<(i64, Point3d)> = container.particles().map(|p| (p.id, p.pos)).collect();
        container.reconcile_overflow();
        let after: Vec<(i64, Point3d)> = container.particles().map(|p| (p.id, p.pos)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn parallel_output_is_deterministic() {
        let particles = random_particles(500, 4);
        let mut container = Container::new(unit_domain(false), (3, 3, 3), 8, false);
        container.par_put_all(&particles);
        container.reconcile_overflow();
        let template = OutputTemplate::parse("%i %v %c %n %t");
        let mut first = Vec::new();
        container.par_print_custom(&template, &mut first).unwrap();
        let mut second = Vec::new();
        container.par_print_custom(&template, &mut second).unwrap();
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn lattice_shift_preserves_periodic_cells() {
        let particles = random_particles(40, 12);
        let domain = unit_domain(true);
        let mut container = Container::new(domain.clone(), (2, 2, 2), 8, false);
        let mut shifted = Container::new(domain, (2, 2, 2), 8, false);
        for p in particles {
            container.put(p);
            shifted.put(Particle::new(p.id, p.pos + Point3d::new(2.0, -1.0, 3.0)));
        }
        let mut volumes = vec![0.0; 40];
        let mut workspace = Workspace::new(&container);
        for p in container.particles() {
            let cell = container
                .compute_cell(&mut workspace, p.ijk, p.q, false)
                .unwrap();
            volumes[p.id as usize] = cell.volume();
        }
        let mut workspace = Workspace::new(&shifted);
        for p in shifted.particles() {
            let cell = shifted
                .compute_cell(&mut workspace, p.ijk, p.q, false)
                .unwrap();
            assert_float_is_close_high_error(volumes[p.id as usize], cell.volume());
        }
    }

    #[test]
    fn ordered_output_follows_insertion_order() {
        let mut container = Container::new(unit_domain(false), (2, 2, 2), 8, false);
        let mut order = ParticleOrder::new();
        container.import_ordered(
            &mut order,
            "5 0.75 0.5 0.5\n9 0.25 0.5 0.5\n".as_bytes(),
        );
        assert_eq!(order.len(), 2);
        let template = OutputTemplate::parse("%i");
        let mut out = Vec::new();
        container
            .print_custom_ordered(&template, &order, &mut out)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "5\n9\n");
        // block order puts the lower block first instead
        let mut unordered = Vec::new();
        container.print_custom(&template, &mut unordered).unwrap();
        assert_eq!(String::from_utf8(unordered).unwrap(), "9\n5\n");
    }

    #[test]
    fn out_of_domain_particles_are_rejected() {
        let mut container = Container::new(unit_domain(false), (2, 2, 2), 8, false);
        assert!(!container.put(Particle::new(0, Point3d::new(1.5, 0.5, 0.5))));
        assert!(container.put(Particle::new(1, Point3d::new(0.5, 0.5, 0.5))));
        assert_eq!(container.total_particles(), 1);
    }

    #[test]
    fn wall_annihilated_cells_are_skipped_in_output() {
        use crate::wall::SphereWall;
        let domain = DomainBox::new(
            Extent::new(Point3d::splat(-2.0), Point3d::splat(2.0)),
            [false; 3],
        );
        let mut container = Container::new(domain, (2, 2, 2), 8, false);
        container.add_wall(Box::new(SphereWall::new(Point3d::ZERO, 1.0)));
        container.put(Particle::new(0, Point3d::new(0.5, 0.0, 0.0)));
        // far outside the sphere wall; its cell is annihilated by the cut
        container.put(Particle::new(1, Point3d::new(1.9, 1.9, 1.9)));
        let template = OutputTemplate::parse("%i");
        let mut out = Vec::new();
        container.print_custom(&template, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0\n");
    }
}

/// Parses a particle input stream, one whitespace-separated record per
/// line. Malformed records are fatal, reporting the line number.
pub(crate) fn parse_particles<R: BufRead>(
    reader: R,
    radical: bool,
) -> impl Iterator<Item = Particle> {
    fn parse_failure(line: usize) -> ! {
        fatal_error(
            &format!("File import error on line {}", line),
            ExitCode::FileError,
        )
    }
    let expected = if radical { 5 } else { 4 };
    reader.lines().enumerate().filter_map(move |(i, line)| {
        let line = line.unwrap_or_else(|e| {
            fatal_error(&format!("File import error: {}", e), ExitCode::FileError)
        });
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            return None;
        }
        if fields.len() != expected {
            parse_failure(i + 1);
        }
        let id = fields[0].parse().unwrap_or_else(|_| parse_failure(i + 1));
        let coords: Vec<Float> = fields[1..4]
            .iter()
            .map(|f| f.parse().unwrap_or_else(|_| parse_failure(i + 1)))
            .collect();
        let radius = if radical {
            fields[4].parse().unwrap_or_else(|_| parse_failure(i + 1))
        } else {
            0.0
        };
        Some(Particle {
            id,
            pos: Point3d::new(coords[0], coords[1], coords[2]),
            radius,
        })
    })
}
