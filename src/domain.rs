use derive_more::Deref;
use derive_more::DerefMut;

use crate::prelude::Float;
use crate::prelude::Point3d;

/// An axis-aligned box given by its minimum and maximum corners.
#[derive(Clone, Debug)]
pub struct Extent {
    pub min: Point3d,
    pub max: Point3d,
}

impl Extent {
    pub fn new(min: Point3d, max: Point3d) -> Self {
        assert!(
            min.x < max.x && min.y < max.y && min.z < max.z,
            "Degenerate extent: {:?} {:?}",
            min,
            max
        );
        Self { min, max }
    }

    pub fn cube_from_side_length(side_length: Float) -> Self {
        Self::new(Point3d::ZERO, Point3d::splat(side_length))
    }

    pub fn side_lengths(&self) -> Point3d {
        self.max - self.min
    }

    pub fn volume(&self) -> Float {
        let s = self.side_lengths();
        s.x * s.y * s.z
    }

    pub fn contains(&self, pos: Point3d) -> bool {
        self.min.x <= pos.x
            && pos.x <= self.max.x
            && self.min.y <= pos.y
            && pos.y <= self.max.y
            && self.min.z <= pos.z
            && pos.z <= self.max.z
    }
}

/// The domain of a tessellation: a bounded box together with a periodicity
/// flag per axis. Positions outside the box are wrapped back into it along
/// periodic axes and rejected along non-periodic ones.
#[derive(Clone, Debug, Deref, DerefMut)]
pub struct DomainBox {
    #[deref]
    #[deref_mut]
    extent: Extent,
    periodic: [bool; 3],
}

impl DomainBox {
    pub fn new(extent: Extent, periodic: [bool; 3]) -> Self {
        Self { extent, periodic }
    }

    pub fn periodic(&self, axis: usize) -> bool {
        self.periodic[axis]
    }

    pub fn fully_periodic(&self) -> bool {
        self.periodic.iter().all(|p| *p)
    }

    /// Checks whether a position is inside the domain, treating periodic
    /// axes as unbounded.
    pub fn accepts(&self, pos: Point3d) -> bool {
        let p = pos.to_array();
        let min = self.min.to_array();
        let max = self.max.to_array();
        (0..3).all(|axis| self.periodic[axis] || (min[axis] <= p[axis] && p[axis] <= max[axis]))
    }
}

#[cfg(test)]
mod tests {
    use super::DomainBox;
    use super::Extent;
    use crate::prelude::Point3d;

    #[test]
    fn extent_side_lengths_and_volume() {
        let extent = Extent::new(Point3d::new(-1.0, 0.0, 2.0), Point3d::new(1.0, 3.0, 6.0));
        assert_eq!(extent.side_lengths(), Point3d::new(2.0, 3.0, 4.0));
        assert_eq!(extent.volume(), 24.0);
    }

    #[test]
    fn accepts_respects_periodicity() {
        let extent = Extent::cube_from_side_length(1.0);
        let domain = DomainBox::new(extent.clone(), [false, false, false]);
        assert!(domain.accepts(Point3d::new(0.5, 0.5, 0.5)));
        assert!(!domain.accepts(Point3d::new(1.5, 0.5, 0.5)));
        let domain = DomainBox::new(extent, [true, false, false]);
        assert!(domain.accepts(Point3d::new(1.5, 0.5, 0.5)));
        assert!(!domain.accepts(Point3d::new(0.5, 1.5, 0.5)));
    }
}
