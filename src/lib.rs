//! # Tessera
//! Tessera computes three-dimensional Voronoi tessellations cell by cell.
//! A [`Container`](prelude::Container) divides a rectangular domain
//! (optionally periodic along any axis) into a uniform grid of blocks and
//! stores particles by block. The Voronoi cell of a particle is built
//! incrementally: it starts as the bounding box, is clipped by the
//! registered walls, and is then cut by the perpendicular bisector of every
//! relevant neighbor, visiting candidate blocks in order of increasing
//! distance until no unvisited block can contribute. When particles carry
//! radii, bisectors are placed under radical (power) distance instead.
//!
//! ## A basic example
//! ```no_run
//! use std::io;
//!
//! use tessera::prelude::*;
//!
//! fn main() -> io::Result<()> {
//!     let domain = DomainBox::new(Extent::cube_from_side_length(1.0), [false; 3]);
//!     let mut container = Container::new(domain, (4, 4, 4), 8, false);
//!     container.put(Particle::new(0, Point3d::new(0.3, 0.4, 0.5)));
//!     container.put(Particle::new(1, Point3d::new(0.7, 0.6, 0.5)));
//!     let template = OutputTemplate::parse("%i %q %v %n");
//!     container.print_custom(&template, &mut io::stdout())
//! }
//! ```

pub mod cell;
pub mod command_line_options;
pub mod config;
pub mod container;
pub mod domain;
pub mod error;
pub mod output;
pub mod wall;

#[cfg(test)]
pub(crate) mod test_utils;

/// `use tessera::prelude::*` to import the commonly used types.
pub mod prelude;
