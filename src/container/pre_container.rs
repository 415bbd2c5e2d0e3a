use std::io::BufRead;

use super::parse_particles;
use super::Container;
use super::Particle;
use super::ParticleOrder;
use crate::config::OPTIMAL_PARTICLES;
use crate::domain::DomainBox;
use crate::prelude::Float;

/// Append-only staging storage for particles read from a stream of unknown
/// length, used to choose a grid size before the container is allocated.
/// Bounds are checked on insertion; block assignment is deferred to
/// [`setup`](Self::setup).
pub struct PreContainer {
    domain: DomainBox,
    radical: bool,
    particles: Vec<Particle>,
}

impl PreContainer {
    pub fn new(domain: DomainBox, radical: bool) -> Self {
        Self {
            domain,
            radical,
            particles: Vec::new(),
        }
    }

    pub fn put(&mut self, particle: Particle) {
        if self.domain.accepts(particle.pos) {
            self.particles.push(particle);
        }
    }

    pub fn import<R: BufRead>(&mut self, reader: R) {
        for particle in parse_particles(reader, self.radical) {
            self.put(particle);
        }
    }

    pub fn total_particles(&self) -> usize {
        self.particles.len()
    }

    /// Guesses grid dimensions so that blocks hold a near-optimal number of
    /// particles, scaling each dimension with the respective axis length.
    pub fn guess_optimal(&self) -> (usize, usize, usize) {
        let side = self.domain.side_lengths();
        let total = self.particles.len() as Float;
        let inv_length_scale = (total / (OPTIMAL_PARTICLES * side.x * side.y * side.z)).cbrt();
        (
            (side.x * inv_length_scale + 1.0) as usize,
            (side.y * inv_length_scale + 1.0) as usize,
            (side.z * inv_length_scale + 1.0) as usize,
        )
    }

    /// Transfers the staged particles into a container.
    pub fn setup(self, container: &mut Container) {
        for particle in self.particles {
            container.put(particle);
        }
    }

    /// Transfers the staged particles, recording insertion order.
    pub fn setup_ordered(self, order: &mut ParticleOrder, container: &mut Container) {
        for particle in self.particles {
            container.put_ordered(order, particle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PreContainer;
    use crate::container::Container;
    use crate::container::Particle;
    use crate::domain::DomainBox;
    use crate::domain::Extent;
    use crate::prelude::Point3d;

    fn domain() -> DomainBox {
        DomainBox::new(Extent::cube_from_side_length(1.0), [false; 3])
    }

    #[test]
    fn rejects_out_of_bounds_particles() {
        let mut pre = PreContainer::new(domain(), false);
        pre.put(Particle::new(0, Point3d::new(0.5, 0.5, 0.5)));
        pre.put(Particle::new(1, Point3d::new(1.5, 0.5, 0.5)));
        assert_eq!(pre.total_particles(), 1);
    }

    #[test]
    fn import_parses_records() {
        let mut pre = PreContainer::new(domain(), false);
        pre.import("0 0.25 0.5 0.5\n1 0.75 0.5 0.5\n".as_bytes());
        assert_eq!(pre.total_particles(), 2);
    }

    #[test]
    fn guess_optimal_scales_with_axis_lengths() {
        let domain = DomainBox::new(
            Extent::new(Point3d::ZERO, Point3d::new(4.0, 1.0, 1.0)),
            [false; 3],
        );
        let mut pre = PreContainer::new(domain, false);
        for i in 0..4000 {
            pre.put(Particle::new(
                i,
                Point3d::new(
                    (i % 16) as f64 / 4.0,
                    (i / 16 % 10) as f64 / 10.0,
                    (i / 160) as f64 / 25.0,
                ),
            ));
        }
        let (nx, ny, nz) = pre.guess_optimal();
        // 4000 particles in a 4x1x1 box: about 5.6 per block wants roughly
        // 714 blocks, with the x dimension four times the others
        assert!(nx > ny && nx > nz);
        assert!((3..=5).contains(&(nx / ny)));
        let blocks = nx * ny * nz;
        assert!((400..=1500).contains(&blocks), "{}", blocks);
    }

    #[test]
    fn setup_fills_a_container() {
        let mut pre = PreContainer::new(domain(), false);
        pre.import("0 0.25 0.5 0.5\n1 0.75 0.5 0.5\n".as_bytes());
        let mut container = Container::new(domain(), (2, 2, 2), 8, false);
        pre.setup(&mut container);
        assert_eq!(container.total_particles(), 2);
    }
}
