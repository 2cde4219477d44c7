//! Sky geometry: coordinates, regions, energy axes and the analysis geometry.

pub mod axis;
pub mod coord;
pub mod geom;
pub mod region;

pub use axis::*;
pub use coord::*;
pub use geom::*;
pub use region::*;
