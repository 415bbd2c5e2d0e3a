use std::io;
use std::io::Write;

use super::Container;
use super::Workspace;

/// Auxiliary geometry output in Gnuplot and POV-Ray formats.
impl Container {
    /// Draws an outline of the domain box as Gnuplot polylines.
    pub fn draw_domain_gnuplot<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let (a, b) = (self.domain.min, self.domain.max);
        write!(
            out,
            "{} {} {}\n{} {} {}\n{} {} {}\n{} {} {}\n\
             {} {} {}\n{} {} {}\n{} {} {}\n{} {} {}\n\
             {} {} {}\n\n{} {} {}\n{} {} {}\n\n\
             {} {} {}\n{} {} {}\n\n{} {} {}\n{} {} {}\n",
            a.x, a.y, a.z, b.x, a.y, a.z, b.x, b.y, a.z, a.x, b.y, a.z,
            a.x, b.y, b.z, b.x, b.y, b.z, b.x, a.y, b.z, a.x, a.y, b.z,
            a.x, b.y, b.z, a.x, a.y, a.z, a.x, a.y, b.z,
            b.x, a.y, a.z, b.x, a.y, b.z, b.x, b.y, a.z, b.x, b.y, b.z
        )
    }

    /// Draws the twelve domain box edges as POV-Ray cylinders with spheres
    /// at the corners.
    pub fn draw_domain_pov<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let (a, b) = (self.domain.min, self.domain.max);
        let corners = [
            [a.x, a.y, a.z],
            [b.x, a.y, a.z],
            [a.x, b.y, a.z],
            [b.x, b.y, a.z],
            [a.x, a.y, b.z],
            [b.x, a.y, b.z],
            [a.x, b.y, b.z],
            [b.x, b.y, b.z],
        ];
        for (i, j) in [
            (0, 1), (2, 3), (4, 5), (6, 7),
            (0, 2), (1, 3), (4, 6), (5, 7),
            (0, 4), (1, 5), (2, 6), (3, 7),
        ] {
            let (p, q): ([f64; 3], [f64; 3]) = (corners[i], corners[j]);
            writeln!(
                out,
                "cylinder{{<{},{},{}>,<{},{},{}>,rr}}",
                p[0], p[1], p[2], q[0], q[1], q[2]
            )?;
        }
        for c in corners {
            writeln!(out, "sphere{{<{},{},{}>,rr}}", c[0], c[1], c[2])?;
        }
        Ok(())
    }

    /// Dumps stored particle ids and positions, one record per line.
    pub fn draw_particles<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for p in self.particles() {
            if self.radical() {
                writeln!(out, "{} {} {} {} {}", p.id, p.pos.x, p.pos.y, p.pos.z, p.radius)?;
            } else {
                writeln!(out, "{} {} {} {}", p.id, p.pos.x, p.pos.y, p.pos.z)?;
            }
        }
        Ok(())
    }

    /// Dumps stored particles as POV-Ray spheres.
    pub fn draw_particles_pov<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for p in self.particles() {
            writeln!(out, "// id {}", p.id)?;
            if self.radical() {
                writeln!(
                    out,
                    "sphere{{<{},{},{}>,{}}}",
                    p.pos.x, p.pos.y, p.pos.z, p.radius
                )?;
            } else {
                writeln!(out, "sphere{{<{},{},{}>,s}}", p.pos.x, p.pos.y, p.pos.z)?;
            }
        }
        Ok(())
    }

    /// Computes all cells and draws their edges in Gnuplot format.
    pub fn draw_cells_gnuplot<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut workspace = Workspace::new(self);
        for p in self.particles() {
            if let Some(cell) = self.compute_cell(&mut workspace, p.ijk, p.q, false) {
                cell.draw_gnuplot(p.pos, out)?;
            }
        }
        Ok(())
    }

    /// Computes all cells and draws them in POV-Ray format.
    pub fn draw_cells_pov<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut workspace = Workspace::new(self);
        for p in self.particles() {
            if let Some(cell) = self.compute_cell(&mut workspace, p.ijk, p.q, false) {
                writeln!(out, "// cell {}", p.id)?;
                cell.draw_pov(p.pos, out)?;
            }
        }
        Ok(())
    }
}
