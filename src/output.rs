use std::fmt;
use std::io;
use std::io::Write;

use crate::cell::VoronoiCell;
use crate::prelude::Float;
use crate::prelude::Point3d;

/// One `%` control code of the custom output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Code {
    ParticleId,
    X,
    Y,
    Z,
    Position,
    Radius,
    VertexCount,
    VerticesLocal,
    VerticesGlobal,
    VertexOrders,
    MaxRadiusSquared,
    EdgeCount,
    TotalEdgeDistance,
    FacePerimeters,
    FaceCount,
    SurfaceArea,
    FaceFreqTable,
    FaceOrders,
    FaceAreas,
    FaceVertexLoops,
    FaceNormals,
    FaceNeighbors,
    Volume,
    CentroidLocal,
    CentroidGlobal,
}

impl Code {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'i' => Code::ParticleId,
            'x' => Code::X,
            'y' => Code::Y,
            'z' => Code::Z,
            'q' => Code::Position,
            'r' => Code::Radius,
            'w' => Code::VertexCount,
            'p' => Code::VerticesLocal,
            'P' => Code::VerticesGlobal,
            'o' => Code::VertexOrders,
            'm' => Code::MaxRadiusSquared,
            'g' => Code::EdgeCount,
            'E' => Code::TotalEdgeDistance,
            'e' => Code::FacePerimeters,
            's' => Code::FaceCount,
            'F' => Code::SurfaceArea,
            'A' => Code::FaceFreqTable,
            'a' => Code::FaceOrders,
            'f' => Code::FaceAreas,
            't' => Code::FaceVertexLoops,
            'l' => Code::FaceNormals,
            'n' => Code::FaceNeighbors,
            'v' => Code::Volume,
            'c' => Code::CentroidLocal,
            'C' => Code::CentroidGlobal,
            _ => return None,
        })
    }

    fn to_char(self) -> char {
        match self {
            Code::ParticleId => 'i',
            Code::X => 'x',
            Code::Y => 'y',
            Code::Z => 'z',
            Code::Position => 'q',
            Code::Radius => 'r',
            Code::VertexCount => 'w',
            Code::VerticesLocal => 'p',
            Code::VerticesGlobal => 'P',
            Code::VertexOrders => 'o',
            Code::MaxRadiusSquared => 'm',
            Code::EdgeCount => 'g',
            Code::TotalEdgeDistance => 'E',
            Code::FacePerimeters => 'e',
            Code::FaceCount => 's',
            Code::SurfaceArea => 'F',
            Code::FaceFreqTable => 'A',
            Code::FaceOrders => 'a',
            Code::FaceAreas => 'f',
            Code::FaceVertexLoops => 't',
            Code::FaceNormals => 'l',
            Code::FaceNeighbors => 'n',
            Code::Volume => 'v',
            Code::CentroidLocal => 'c',
            Code::CentroidGlobal => 'C',
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Item {
    Text(String),
    Code {
        precision: Option<usize>,
        code: Code,
    },
}

/// A parsed custom output template: literal text interspersed with `%`
/// control codes, optionally carrying a `%.<digits>` precision prefix that
/// sets the number of decimal digits of the code's numeric output.
///
/// Unrecognized `%` sequences are kept as literal text, so parsing never
/// fails and formatting a template reproduces the original string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputTemplate {
    items: Vec<Item>,
}

impl OutputTemplate {
    pub fn parse(format: &str) -> Self {
        let mut items = Vec::new();
        let mut text = String::new();
        let mut chars = format.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                text.push(c);
                continue;
            }
            // a candidate control sequence: %<code> or %.<digits><code>
            let mut sequence = String::from("%");
            let mut precision = None;
            if chars.peek() == Some(&'.') {
                sequence.push(chars.next().unwrap());
                let mut digits = String::new();
                while chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                    digits.push(chars.next().unwrap());
                }
                sequence.push_str(&digits);
                if !digits.is_empty() {
                    precision = digits.parse().ok();
                }
            }
            match chars.peek().copied().and_then(Code::from_char) {
                Some(code) if precision.is_some() || !sequence.contains('.') => {
                    chars.next();
                    if !text.is_empty() {
                        items.push(Item::Text(std::mem::take(&mut text)));
                    }
                    items.push(Item::Code { precision, code });
                }
                _ => text.push_str(&sequence),
            }
        }
        if !text.is_empty() {
            items.push(Item::Text(text));
        }
        Self { items }
    }

    /// A template producing no output at all.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The default output of the front end: id, position and volume, plus
    /// the radius when radii are carried.
    pub fn default_for(radical: bool) -> Self {
        if radical {
            Self::parse("%i %q %v %r")
        } else {
            Self::parse("%i %q %v")
        }
    }

    /// Whether the template requests per-face neighbor identifiers, which
    /// require the cell to be built with neighbor tracking.
    pub fn contains_neighbors(&self) -> bool {
        self.items.iter().any(|item| {
            matches!(
                item,
                Item::Code {
                    code: Code::FaceNeighbors,
                    ..
                }
            )
        })
    }

    /// Writes one line of statistics for a computed cell.
    pub fn write_cell<W: Write>(
        &self,
        out: &mut W,
        cell: &VoronoiCell,
        id: i64,
        pos: Point3d,
        radius: Float,
    ) -> io::Result<()> {
        for item in &self.items {
            match item {
                Item::Text(text) => write!(out, "{}", text)?,
                Item::Code { precision, code } => {
                    self.write_code(out, *code, *precision, cell, id, pos, radius)?
                }
            }
        }
        writeln!(out)
    }

    fn write_code<W: Write>(
        &self,
        out: &mut W,
        code: Code,
        precision: Option<usize>,
        cell: &VoronoiCell,
        id: i64,
        pos: Point3d,
        radius: Float,
    ) -> io::Result<()> {
        match code {
            Code::ParticleId => write!(out, "{}", id),
            Code::X => write_float(out, pos.x, precision),
            Code::Y => write_float(out, pos.y, precision),
            Code::Z => write_float(out, pos.z, precision),
            Code::Position => write_point(out, pos, precision),
            Code::Radius => write_float(out, radius, precision),
            Code::VertexCount => write!(out, "{}", cell.number_of_vertices()),
            Code::VerticesLocal => write_positions(out, cell.vertices().iter().copied(), precision),
            Code::VerticesGlobal => {
                write_positions(out, cell.vertices().iter().map(|v| *v + pos), precision)
            }
            Code::VertexOrders => write_ints(out, cell.vertex_orders()),
            Code::MaxRadiusSquared => write_float(out, cell.max_radius_squared(), precision),
            Code::EdgeCount => write!(out, "{}", cell.number_of_edges()),
            Code::TotalEdgeDistance => write_float(out, cell.total_edge_distance(), precision),
            Code::FacePerimeters => write_floats(out, cell.face_perimeters(), precision),
            Code::FaceCount => write!(out, "{}", cell.number_of_faces()),
            Code::SurfaceArea => write_float(out, cell.surface_area(), precision),
            Code::FaceFreqTable => write_ints(out, cell.face_freq_table()),
            Code::FaceOrders => write_ints(out, cell.face_orders()),
            Code::FaceAreas => write_floats(out, cell.face_areas(), precision),
            Code::FaceVertexLoops => write_loops(out, cell.face_vertex_loops()),
            Code::FaceNormals => {
                write_positions(out, cell.face_normals().into_iter(), precision)
            }
            Code::FaceNeighbors => write_ints(out, cell.neighbors()),
            Code::Volume => write_float(out, cell.volume(), precision),
            Code::CentroidLocal => write_point(out, cell.centroid(), precision),
            Code::CentroidGlobal => write_point(out, cell.centroid() + pos, precision),
        }
    }
}

impl fmt::Display for OutputTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            match item {
                Item::Text(text) => write!(f, "{}", text)?,
                Item::Code { precision, code } => {
                    write!(f, "%")?;
                    if let Some(p) = precision {
                        write!(f, ".{}", p)?;
                    }
                    write!(f, "{}", code.to_char())?;
                }
            }
        }
        Ok(())
    }
}

fn write_float<W: Write>(out: &mut W, x: Float, precision: Option<usize>) -> io::Result<()> {
    match precision {
        Some(p) => write!(out, "{:.*}", p, x),
        None => write!(out, "{}", x),
    }
}

fn write_point<W: Write>(out: &mut W, p: Point3d, precision: Option<usize>) -> io::Result<()> {
    write_float(out, p.x, precision)?;
    write!(out, " ")?;
    write_float(out, p.y, precision)?;
    write!(out, " ")?;
    write_float(out, p.z, precision)
}

fn write_floats<W: Write>(
    out: &mut W,
    values: Vec<Float>,
    precision: Option<usize>,
) -> io::Result<()> {
    for (i, x) in values.into_iter().enumerate() {
        if i > 0 {
            write!(out, " ")?;
        }
        write_float(out, x, precision)?;
    }
    Ok(())
}

fn write_ints<W: Write, I: fmt::Display>(out: &mut W, values: Vec<I>) -> io::Result<()> {
    for (i, x) in values.into_iter().enumerate() {
        if i > 0 {
            write!(out, " ")?;
        }
        write!(out, "{}", x)?;
    }
    Ok(())
}

/// Bracketed position triplets, as `(x,y,z) (x,y,z) ...`.
fn write_positions<W: Write>(
    out: &mut W,
    points: impl Iterator<Item = Point3d>,
    precision: Option<usize>,
) -> io::Result<()> {
    for (i, p) in points.enumerate() {
        if i > 0 {
            write!(out, " ")?;
        }
        write!(out, "(")?;
        write_float(out, p.x, precision)?;
        write!(out, ",")?;
        write_float(out, p.y, precision)?;
        write!(out, ",")?;
        write_float(out, p.z, precision)?;
        write!(out, ")")?;
    }
    Ok(())
}

/// Bracketed vertex index loops, as `(a,b,c) (d,e,f) ...`.
fn write_loops<W: Write>(out: &mut W, loops: Vec<Vec<usize>>) -> io::Result<()> {
    for (i, l) in loops.into_iter().enumerate() {
        if i > 0 {
            write!(out, " ")?;
        }
        write!(out, "(")?;
        for (j, v) in l.into_iter().enumerate() {
            if j > 0 {
                write!(out, ",")?;
            }
            write!(out, "{}", v)?;
        }
        write!(out, ")")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::OutputTemplate;
    use crate::cell::VoronoiCell;
    use crate::prelude::Point3d;

    fn unit_cell() -> VoronoiCell {
        let mut cell = VoronoiCell::new(true);
        cell.init(Point3d::splat(-0.5), Point3d::splat(0.5));
        cell
    }

    fn render(template: &str) -> String {
        let template = OutputTemplate::parse(template);
        let mut out = Vec::new();
        template
            .write_cell(
                &mut out,
                &unit_cell(),
                7,
                Point3d::new(0.5, 0.5, 0.5),
                0.25,
            )
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn templates_round_trip() {
        for format in [
            "%i %q %v",
            "%i %q %v %r",
            "order=%o faces=%s",
            "%.3v %.12c",
            "%w %p %P %m %g %E %e %F %A %a %f %t %l %n",
            "100% literal %% %j",
            "%.v trailing %",
        ] {
            assert_eq!(OutputTemplate::parse(format).to_string(), format);
        }
    }

    #[test]
    fn default_line_for_the_unit_cube() {
        assert_eq!(render("%i %q %v"), "7 0.5 0.5 0.5 1\n");
    }

    #[test]
    fn precision_prefix_controls_decimal_digits() {
        assert_eq!(render("%.3v"), "1.000\n");
        assert_eq!(render("%.2x %.1F"), "0.50 6.0\n");
    }

    #[test]
    fn counts_and_lists() {
        assert_eq!(render("%w %s %g"), "8 6 12\n");
        assert_eq!(render("%o"), "3 3 3 3 3 3 3 3\n");
        assert_eq!(render("%A"), "0 0 0 0 6\n");
    }

    #[test]
    fn neighbor_detection() {
        assert!(OutputTemplate::parse("%i %n").contains_neighbors());
        assert!(!OutputTemplate::parse("%i %v").contains_neighbors());
        // a literal "%n" hidden behind an unknown sequence still counts only
        // when parsed as a code
        assert!(!OutputTemplate::parse("%jn").contains_neighbors());
    }

    #[test]
    fn empty_template_produces_no_items() {
        assert!(OutputTemplate::parse("").is_empty());
        assert!(!OutputTemplate::parse(" ").is_empty());
    }

    #[test]
    fn unknown_sequences_stay_literal() {
        assert_eq!(render("a %k b"), "a %k b\n");
        assert_eq!(render("%.i"), "%.i\n");
    }
}
