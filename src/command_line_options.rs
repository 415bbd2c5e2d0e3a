use clap::Parser;

/// The command-line surface of the tessellation front end. Reads particle
/// records from the input file, computes the Voronoi cell of each particle
/// and writes one line of statistics per cell.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CommandLineOptions {
    /// Minimum x coordinate of the domain
    #[clap(allow_hyphen_values = true)]
    pub x_min: f64,
    /// Maximum x coordinate of the domain
    #[clap(allow_hyphen_values = true)]
    pub x_max: f64,
    /// Minimum y coordinate of the domain
    #[clap(allow_hyphen_values = true)]
    pub y_min: f64,
    /// Maximum y coordinate of the domain
    #[clap(allow_hyphen_values = true)]
    pub y_max: f64,
    /// Minimum z coordinate of the domain
    #[clap(allow_hyphen_values = true)]
    pub z_min: f64,
    /// Maximum z coordinate of the domain
    #[clap(allow_hyphen_values = true)]
    pub z_max: f64,
    /// Input particle file of `id x y z [r]` records; `-` reads standard
    /// input
    pub input: String,
    /// Output file; defaults to `<input>.vor`, `-` writes standard output
    pub output: Option<String>,
    /// Custom output template; an empty string switches the main output off
    #[clap(short, long)]
    pub custom: Option<String>,
    /// Write cell edges in Gnuplot format to `<input>.gnu`
    #[clap(short, long)]
    pub gnuplot: bool,
    /// Write cell edges in Gnuplot format to the given file
    #[clap(long, value_name = "FILE")]
    pub gnuplot_file: Option<String>,
    /// Configure the grid from a particle length scale
    #[clap(short, long, conflicts_with = "grid")]
    pub length_scale: Option<f64>,
    /// Explicit grid dimensions
    #[clap(short = 'n', long, number_of_values = 3, value_names = &["NX", "NY", "NZ"])]
    pub grid: Option<Vec<usize>>,
    /// Initial slot allocation per grid block
    #[clap(short = 'm', long, default_value_t = 8)]
    pub init_mem: usize,
    /// Emit cells in input order instead of storage order
    #[clap(short, long)]
    pub ordered: bool,
    /// Make the domain periodic in all three directions
    #[clap(short, long)]
    pub periodic: bool,
    /// Make the domain periodic in the x direction
    #[clap(long)]
    pub periodic_x: bool,
    /// Make the domain periodic in the y direction
    #[clap(long)]
    pub periodic_y: bool,
    /// Make the domain periodic in the z direction
    #[clap(long)]
    pub periodic_z: bool,
    /// Read a radius column and compute the radical tessellation
    #[clap(short, long)]
    pub radical: bool,
    #[clap(short, parse(from_occurrences))]
    pub verbosity: usize,
    /// Add six plane walls bounding the box x1<x<x2, x3<y<x4, x5<z<x6
    #[clap(long, number_of_values = 6, multiple_occurrences = true, allow_hyphen_values = true, value_name = "X")]
    pub wall_box: Vec<f64>,
    /// Add a spherical wall centered on (x1,x2,x3) with radius x4
    #[clap(long, number_of_values = 4, multiple_occurrences = true, allow_hyphen_values = true, value_name = "X")]
    pub wall_sphere: Vec<f64>,
    /// Add a plane wall with normal (x1,x2,x3) and displacement x4
    #[clap(long, number_of_values = 4, multiple_occurrences = true, allow_hyphen_values = true, value_name = "X")]
    pub wall_plane: Vec<f64>,
    /// Add a cylindrical wall centered on (x1,x2,x3), pointing along
    /// (x4,x5,x6), with radius x7
    #[clap(long, number_of_values = 7, multiple_occurrences = true, allow_hyphen_values = true, value_name = "X")]
    pub wall_cylinder: Vec<f64>,
    /// Add a conical wall with apex (x1,x2,x3), axis (x4,x5,x6) and
    /// half-angle x7 in radians
    #[clap(long, number_of_values = 7, multiple_occurrences = true, allow_hyphen_values = true, value_name = "X")]
    pub wall_cone: Vec<f64>,
    /// Write POV-Ray particles to `<input>_p.pov` and cells to
    /// `<input>_v.pot`
    #[clap(short = 'y', long)]
    pub pov: bool,
    /// Write only POV-Ray particles, to the given file
    #[clap(long, value_name = "FILE")]
    pub pov_particles: Option<String>,
    /// Write only POV-Ray cells, to the given file
    #[clap(long, value_name = "FILE")]
    pub pov_cells: Option<String>,
}

impl CommandLineOptions {
    pub fn periodicity(&self) -> [bool; 3] {
        [
            self.periodic || self.periodic_x,
            self.periodic || self.periodic_y,
            self.periodic || self.periodic_z,
        ]
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::CommandLineOptions;

    #[test]
    fn parses_bounds_and_flags() {
        let opts = CommandLineOptions::parse_from([
            "tessera", "-p", "-r", "-o", "--", "-1", "1", "-1", "1", "-1", "1", "points.dat",
        ]);
        assert_eq!(opts.x_min, -1.0);
        assert_eq!(opts.z_max, 1.0);
        assert_eq!(opts.input, "points.dat");
        assert!(opts.output.is_none());
        assert_eq!(opts.periodicity(), [true; 3]);
        assert!(opts.radical);
        assert!(opts.ordered);
    }

    #[test]
    fn grid_and_length_scale_conflict() {
        let result = CommandLineOptions::try_parse_from([
            "tessera", "-l", "0.1", "-n", "4", "4", "4", "0", "1", "0", "1", "0", "1", "p.dat",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn walls_accumulate() {
        let opts = CommandLineOptions::parse_from([
            "tessera",
            "--wall-sphere", "0", "0", "0", "1",
            "--wall-sphere", "1", "0", "0", "2",
            "0", "1", "0", "1", "0", "1", "p.dat",
        ]);
        assert_eq!(opts.wall_sphere.len(), 8);
    }
}
