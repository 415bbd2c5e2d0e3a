pub use crate::cell::Clip;
pub use crate::cell::VoronoiCell;
pub use crate::container::Container;
pub use crate::container::Particle;
pub use crate::container::ParticleOrder;
pub use crate::container::PreContainer;
pub use crate::container::Workspace;
pub use crate::domain::DomainBox;
pub use crate::domain::Extent;
pub use crate::error::ExitCode;
pub use crate::output::OutputTemplate;
pub use crate::wall::ConeWall;
pub use crate::wall::CylinderWall;
pub use crate::wall::PlaneWall;
pub use crate::wall::SphereWall;
pub use crate::wall::Wall;

pub type Float = f64;
pub type Point3d = glam::DVec3;
