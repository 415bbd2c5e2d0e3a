use crate::cell::VoronoiCell;
use crate::prelude::Float;
use crate::prelude::Point3d;

// Below this squared distance to a wall axis or center the tangent direction
// is undefined and the cut is skipped.
const SMALL_DISTANCE_SQUARED: Float = 1e-10;

/// A bounding primitive that restricts the domain. Walls are registered with
/// a container, which assigns each a negative identifier used for the faces
/// it creates.
pub trait Wall: Send + Sync {
    /// Whether a point lies on the retained side of the wall.
    fn point_inside(&self, pos: Point3d) -> bool;

    /// Applies the clipping planes of this wall to the cell of a particle at
    /// `pos`, tagging created faces with `wall_id`. Returns `false` if the
    /// cell was annihilated.
    fn cut_cell(&self, cell: &mut VoronoiCell, pos: Point3d, wall_id: i64) -> bool;
}

/// A half-space wall with outward normal `normal`, retaining points with
/// `normal . x < displacement`.
pub struct PlaneWall {
    normal: Point3d,
    displacement: Float,
}

impl PlaneWall {
    pub fn new(normal: Point3d, displacement: Float) -> Self {
        Self {
            normal,
            displacement,
        }
    }
}

impl Wall for PlaneWall {
    fn point_inside(&self, pos: Point3d) -> bool {
        self.normal.dot(pos) < self.displacement
    }

    fn cut_cell(&self, cell: &mut VoronoiCell, pos: Point3d, wall_id: i64) -> bool {
        cell.plane(
            self.normal,
            self.displacement - self.normal.dot(pos),
            wall_id,
        )
    }
}

/// A spherical wall retaining its interior.
pub struct SphereWall {
    center: Point3d,
    radius: Float,
}

impl SphereWall {
    pub fn new(center: Point3d, radius: Float) -> Self {
        Self { center, radius }
    }
}

impl Wall for SphereWall {
    fn point_inside(&self, pos: Point3d) -> bool {
        pos.distance_squared(self.center) < self.radius * self.radius
    }

    fn cut_cell(&self, cell: &mut VoronoiCell, pos: Point3d, wall_id: i64) -> bool {
        let dq = pos - self.center;
        let d2 = dq.length_squared();
        if d2 < SMALL_DISTANCE_SQUARED {
            return true;
        }
        cell.plane(dq, self.radius * d2.sqrt() - d2, wall_id)
    }
}

/// An infinite cylindrical wall retaining its interior.
pub struct CylinderWall {
    point: Point3d,
    axis: Point3d,
    radius: Float,
}

impl CylinderWall {
    pub fn new(point: Point3d, axis: Point3d, radius: Float) -> Self {
        Self {
            point,
            axis: axis.normalize(),
            radius,
        }
    }

    fn radial(&self, pos: Point3d) -> Point3d {
        let q = pos - self.point;
        q - self.axis * q.dot(self.axis)
    }
}

impl Wall for CylinderWall {
    fn point_inside(&self, pos: Point3d) -> bool {
        self.radial(pos).length_squared() < self.radius * self.radius
    }

    fn cut_cell(&self, cell: &mut VoronoiCell, pos: Point3d, wall_id: i64) -> bool {
        let radial = self.radial(pos);
        let d2 = radial.length_squared();
        if d2 < SMALL_DISTANCE_SQUARED {
            return true;
        }
        cell.plane(radial, self.radius * d2.sqrt() - d2, wall_id)
    }
}

/// A conical wall with its apex at `apex`, opening along `axis` with the
/// given half-angle, retaining its interior.
pub struct ConeWall {
    apex: Point3d,
    axis: Point3d,
    sin_angle: Float,
    cos_angle: Float,
}

impl ConeWall {
    pub fn new(apex: Point3d, axis: Point3d, half_angle: Float) -> Self {
        Self {
            apex,
            axis: axis.normalize(),
            sin_angle: half_angle.sin(),
            cos_angle: half_angle.cos(),
        }
    }
}

impl Wall for ConeWall {
    fn point_inside(&self, pos: Point3d) -> bool {
        let q = pos - self.apex;
        let axial = q.dot(self.axis);
        let radial = (q - self.axis * axial).length();
        axial > 0.0 && radial * self.cos_angle < axial * self.sin_angle
    }

    fn cut_cell(&self, cell: &mut VoronoiCell, pos: Point3d, wall_id: i64) -> bool {
        let q = pos - self.apex;
        let axial = q.dot(self.axis);
        let radial_vec = q - self.axis * axial;
        let d2 = radial_vec.length_squared();
        if d2 < SMALL_DISTANCE_SQUARED {
            return true;
        }
        let radial_hat = radial_vec / d2.sqrt();
        // outward normal of the nearest cone surface plane through the apex
        let normal = radial_hat * self.cos_angle - self.axis * self.sin_angle;
        cell.plane(normal, -normal.dot(q), wall_id)
    }
}

#[cfg(test)]
mod tests {
    use super::ConeWall;
    use super::CylinderWall;
    use super::PlaneWall;
    use super::SphereWall;
    use super::Wall;
    use crate::cell::VoronoiCell;
    use crate::prelude::Point3d;
    use crate::test_utils::assert_float_is_close;

    fn cell_around(pos: Point3d, half: f64) -> VoronoiCell {
        let mut cell = VoronoiCell::new(true);
        cell.init(Point3d::splat(-half) - pos, Point3d::splat(half) - pos);
        cell
    }

    #[test]
    fn plane_wall_cuts_the_cell() {
        let wall = PlaneWall::new(Point3d::new(1.0, 0.0, 0.0), 0.25);
        let pos = Point3d::ZERO;
        assert!(wall.point_inside(pos));
        let mut cell = cell_around(pos, 0.5);
        assert!(wall.cut_cell(&mut cell, pos, -7));
        assert_float_is_close(cell.volume(), 0.75);
        assert!(cell.neighbors().contains(&-7));
    }

    #[test]
    fn sphere_wall_tangent_plane() {
        let wall = SphereWall::new(Point3d::ZERO, 1.0);
        let pos = Point3d::new(0.3, 0.0, 0.0);
        assert!(wall.point_inside(pos));
        assert!(!wall.point_inside(Point3d::new(1.1, 0.0, 0.0)));
        let mut cell = cell_around(pos, 2.0);
        assert!(wall.cut_cell(&mut cell, pos, -7));
        // tangent plane at x = 1: the local cell spans [-2.3, 0.7] in x
        assert_float_is_close(cell.volume(), 3.0 * 4.0 * 4.0);
    }

    #[test]
    fn sphere_wall_skips_its_center() {
        let wall = SphereWall::new(Point3d::ZERO, 1.0);
        let mut cell = cell_around(Point3d::ZERO, 0.5);
        assert!(wall.cut_cell(&mut cell, Point3d::ZERO, -7));
        assert_float_is_close(cell.volume(), 1.0);
    }

    #[test]
    fn cylinder_wall_tangent_plane() {
        let wall = CylinderWall::new(Point3d::ZERO, Point3d::new(0.0, 0.0, 2.0), 1.0);
        let pos = Point3d::new(0.5, 0.0, 0.7);
        assert!(wall.point_inside(pos));
        let mut cell = cell_around(pos, 2.0);
        assert!(wall.cut_cell(&mut cell, pos, -8));
        // tangent plane at x = 1: the local cell spans [-2.5, 0.5] in x
        assert_float_is_close(cell.volume(), 3.0 * 4.0 * 4.0);
    }

    #[test]
    fn cone_wall_point_inside() {
        let wall = ConeWall::new(
            Point3d::ZERO,
            Point3d::new(0.0, 0.0, 1.0),
            std::f64::consts::FRAC_PI_4,
        );
        assert!(wall.point_inside(Point3d::new(0.1, 0.0, 1.0)));
        assert!(!wall.point_inside(Point3d::new(1.5, 0.0, 1.0)));
        assert!(!wall.point_inside(Point3d::new(0.1, 0.0, -1.0)));
    }

    #[test]
    fn cone_wall_cuts_an_off_axis_cell() {
        let wall = ConeWall::new(
            Point3d::ZERO,
            Point3d::new(0.0, 0.0, 1.0),
            std::f64::consts::FRAC_PI_4,
        );
        let pos = Point3d::new(1.9, 0.0, 2.0);
        let mut cell = cell_around(pos, 0.1);
        assert!(wall.cut_cell(&mut cell, pos, -9));
        assert!(cell.volume() < 0.2f64.powi(3));
        assert!(cell.check_relations());
    }
}
