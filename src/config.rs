/// Tolerance used for plane-side classification of cell vertices. A vertex
/// whose signed distance to a cutting plane is within this value is treated
/// as lying on the plane.
pub const TOLERANCE: f64 = 1e-11;

/// Initial number of particle slots allocated per grid block.
pub const INIT_MEMORY: usize = 8;

/// Absolute ceiling on the per-block slot count. Exceeding this is fatal.
pub const MAX_PARTICLE_MEMORY: usize = 16_777_216;

/// Absolute ceiling on the number of vertices of a single cell.
pub const MAX_VERTICES: usize = 16_777_216;

/// Absolute ceiling on the degree of a single cell vertex.
pub const MAX_VERTEX_ORDER: usize = 2048;

/// Ceiling on the total number of grid blocks, to prevent enormous
/// allocations from a bad length scale.
pub const MAX_REGIONS: usize = 16_777_216;

/// Target mean number of particles per grid block when guessing an optimal
/// grid size from a staged particle set.
pub const OPTIMAL_PARTICLES: f64 = 5.6;

/// Radius reported for particles of a container without radius information.
pub const DEFAULT_RADIUS: f64 = 0.5;
