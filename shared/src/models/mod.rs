//! Domain models for the Coal Fire Risk platform

mod features;
mod records;
mod risk;

pub use features::*;
pub use records::*;
pub use risk::*;
