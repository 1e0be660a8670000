//! Domain layer - Backend ports and the values that cross them
//!
//! The preparation workflow only ever talks to hardware through the traits
//! defined here.

pub mod ports;

pub use ports::*;
