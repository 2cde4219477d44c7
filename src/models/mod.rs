//! Spectral model implementations.
//!
//! Models are small value types so that fitting and simulation code can stay
//! generic over the spectral shape.

pub mod parameter;
pub mod spectral;

pub use parameter::*;
pub use spectral::*;
