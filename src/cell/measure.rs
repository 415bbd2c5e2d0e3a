use std::io;
use std::io::Write;

use crate::prelude::Float;
use crate::prelude::Point3d;

use super::VoronoiCell;

/// Statistics derived from the cell graph. Face-related quantities walk each
/// face loop once, using the edge orientation convention of the builder.
impl VoronoiCell {
    /// The vertex positions, relative to the owning particle.
    pub fn vertices(&self) -> &[Point3d] {
        &self.verts
    }

    /// The degree of each vertex.
    pub fn vertex_orders(&self) -> Vec<usize> {
        self.edges.iter().map(Vec::len).collect()
    }

    pub fn number_of_edges(&self) -> usize {
        self.edges.iter().map(Vec::len).sum::<usize>() / 2
    }

    pub fn number_of_faces(&self) -> usize {
        let mut count = 0;
        self.for_each_face(|_, _, _| count += 1);
        count
    }

    /// The cell volume, as the sum of the tetrahedra spanned by the origin
    /// and the fan triangulations of the faces.
    pub fn volume(&self) -> Float {
        let mut six_v = 0.0;
        self.for_each_face(|_, _, face| {
            let p0 = self.verts[face[0]];
            for i in 1..face.len() - 1 {
                six_v += p0.dot(self.verts[face[i]].cross(self.verts[face[i + 1]]));
            }
        });
        (six_v / 6.0).abs()
    }

    /// The volume-weighted centroid, relative to the owning particle.
    pub fn centroid(&self) -> Point3d {
        let mut six_v = 0.0;
        let mut weighted = Point3d::ZERO;
        self.for_each_face(|_, _, face| {
            let p0 = self.verts[face[0]];
            for i in 1..face.len() - 1 {
                let p1 = self.verts[face[i]];
                let p2 = self.verts[face[i + 1]];
                let w = p0.dot(p1.cross(p2));
                six_v += w;
                weighted += (p0 + p1 + p2) * (w / 4.0);
            }
        });
        if six_v.abs() < Float::EPSILON {
            return Point3d::ZERO;
        }
        weighted / six_v
    }

    pub fn surface_area(&self) -> Float {
        self.face_areas().into_iter().sum()
    }

    /// The total length of the cell edges.
    pub fn total_edge_distance(&self) -> Float {
        let mut total = 0.0;
        for v in 0..self.verts.len() {
            for &t in &self.edges[v] {
                total += self.verts[v].distance(self.verts[t]);
            }
        }
        total / 2.0
    }

    pub fn face_areas(&self) -> Vec<Float> {
        let mut areas = Vec::new();
        self.for_each_face(|_, _, face| {
            areas.push(0.5 * self.newell(face).length());
        });
        areas
    }

    pub fn face_perimeters(&self) -> Vec<Float> {
        let mut perimeters = Vec::new();
        self.for_each_face(|_, _, face| {
            perimeters.push(
                (0..face.len())
                    .map(|i| {
                        self.verts[face[i]].distance(self.verts[face[(i + 1) % face.len()]])
                    })
                    .sum(),
            );
        });
        perimeters
    }

    /// The number of edges of each face.
    pub fn face_orders(&self) -> Vec<usize> {
        let mut orders = Vec::new();
        self.for_each_face(|_, _, face| orders.push(face.len()));
        orders
    }

    /// A frequency table of the number of edges of each face, indexed from
    /// zero.
    pub fn face_freq_table(&self) -> Vec<usize> {
        let orders = self.face_orders();
        let max = orders.iter().copied().max().unwrap_or(0);
        let mut table = vec![0; max + 1];
        for order in orders {
            table[order] += 1;
        }
        table
    }

    /// The vertex loop of each face, in walk order.
    pub fn face_vertex_loops(&self) -> Vec<Vec<usize>> {
        let mut loops = Vec::new();
        self.for_each_face(|_, _, face| loops.push(face.to_vec()));
        loops
    }

    /// The outward unit normal of each face.
    pub fn face_normals(&self) -> Vec<Point3d> {
        let mut normals = Vec::new();
        self.for_each_face(|_, _, face| {
            let n = self.newell(face).normalize_or_zero();
            // the origin is interior, so outward means away from it
            let flip = n.dot(self.verts[face[0]]) < 0.0;
            normals.push(if flip { -n } else { n });
        });
        normals
    }

    /// The identifier of the plane that created each face. Empty unless the
    /// cell tracks neighbors.
    pub fn neighbors(&self) -> Vec<i64> {
        if self.tags.is_none() {
            return Vec::new();
        }
        let mut neighbors = Vec::new();
        self.for_each_face(|v, k, _| neighbors.push(self.read_tag(v, k)));
        neighbors
    }

    /// Writes the cell edges as Gnuplot polylines, one closed loop per face,
    /// translated to the global position `pos`.
    pub fn draw_gnuplot<W: Write>(&self, pos: Point3d, out: &mut W) -> io::Result<()> {
        let mut result = Ok(());
        self.for_each_face(|_, _, face| {
            if result.is_err() {
                return;
            }
            result = (|| {
                for i in face.iter().chain(face.first()) {
                    let p = self.verts[*i] + pos;
                    writeln!(out, "{} {} {}", p.x, p.y, p.z)?;
                }
                writeln!(out)
            })();
        });
        result
    }

    /// Writes the cell vertices and edges in POV-Ray format, translated to
    /// the global position `pos`.
    pub fn draw_pov<W: Write>(&self, pos: Point3d, out: &mut W) -> io::Result<()> {
        for v in &self.verts {
            let p = *v + pos;
            writeln!(out, "sphere{{<{},{},{}>,r}}", p.x, p.y, p.z)?;
        }
        for v in 0..self.verts.len() {
            for &t in &self.edges[v] {
                if t > v {
                    let a = self.verts[v] + pos;
                    let b = self.verts[t] + pos;
                    writeln!(
                        out,
                        "cylinder{{<{},{},{}>,<{},{},{}>,r}}",
                        a.x, a.y, a.z, b.x, b.y, b.z
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Calls `f` once per face with the starting directed edge of the walk
    /// and the loop of source vertices.
    pub(crate) fn for_each_face<F: FnMut(usize, usize, &[usize])>(&self, mut f: F) {
        let mut visited: Vec<Vec<bool>> =
            self.edges.iter().map(|ring| vec![false; ring.len()]).collect();
        let mut face = Vec::new();
        for v0 in 0..self.verts.len() {
            for k0 in 0..self.edges[v0].len() {
                if visited[v0][k0] {
                    continue;
                }
                face.clear();
                let (mut v, mut k) = (v0, k0);
                loop {
                    visited[v][k] = true;
                    face.push(v);
                    let (nv, nk) = self.next_edge(v, k);
                    v = nv;
                    k = nk;
                    if (v, k) == (v0, k0) {
                        break;
                    }
                }
                f(v0, k0, &face);
            }
        }
    }

    fn newell(&self, face: &[usize]) -> Point3d {
        let mut n = Point3d::ZERO;
        for i in 0..face.len() {
            let p1 = self.verts[face[i]];
            let p2 = self.verts[face[(i + 1) % face.len()]];
            n += p1.cross(p2);
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use crate::cell::VoronoiCell;
    use crate::prelude::Point3d;
    use crate::test_utils::assert_float_is_close;
    use crate::test_utils::assert_point_is_close;

    fn unit_cell() -> VoronoiCell {
        let mut cell = VoronoiCell::new(true);
        cell.init(Point3d::splat(-0.5), Point3d::splat(0.5));
        cell
    }

    #[test]
    fn cube_measures() {
        let cell = unit_cell();
        assert_float_is_close(cell.volume(), 1.0);
        assert_float_is_close(cell.surface_area(), 6.0);
        assert_float_is_close(cell.total_edge_distance(), 12.0);
        assert_float_is_close(cell.max_radius_squared(), 0.75);
        assert_point_is_close(cell.centroid(), Point3d::ZERO);
        assert_eq!(cell.vertex_orders(), vec![3; 8]);
        assert_eq!(cell.face_orders(), vec![4; 6]);
        assert_eq!(cell.face_freq_table(), vec![0, 0, 0, 0, 6]);
    }

    #[test]
    fn cube_face_normals_are_axis_aligned_and_outward() {
        let cell = unit_cell();
        let mut normals = cell.face_normals();
        normals.sort_by(|a, b| a.to_array().partial_cmp(&b.to_array()).unwrap());
        let expected = [
            Point3d::new(-1.0, 0.0, 0.0),
            Point3d::new(0.0, -1.0, 0.0),
            Point3d::new(0.0, 0.0, -1.0),
            Point3d::new(0.0, 0.0, 1.0),
            Point3d::new(0.0, 1.0, 0.0),
            Point3d::new(1.0, 0.0, 0.0),
        ];
        for (n, e) in normals.iter().zip(expected) {
            assert_point_is_close(*n, e);
        }
    }

    #[test]
    fn halved_cube_centroid_moves() {
        let mut cell = unit_cell();
        assert!(cell.plane(Point3d::new(1.0, 0.0, 0.0), 0.0, 1));
        assert_point_is_close(cell.centroid(), Point3d::new(-0.25, 0.0, 0.0));
        assert_float_is_close(cell.surface_area(), 2.0 + 4.0 * 0.5);
    }

    #[test]
    fn face_loops_close_and_cover_every_edge() {
        let mut cell = unit_cell();
        cell.plane(Point3d::new(1.0, 1.0, 1.0), 1.2, 9);
        let loops = cell.face_vertex_loops();
        let total: usize = loops.iter().map(Vec::len).sum();
        // every directed edge belongs to exactly one face loop
        assert_eq!(total, 2 * cell.number_of_edges());
    }
}
