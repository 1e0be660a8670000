//! Storage Preparation Module
//!
//! The workflow that decides what to ask the SCM and bdev backends to do
//! and how to interpret and aggregate their answers.

pub mod consent;
pub mod diagnostics;
pub mod nvme;
pub mod orchestrator;
pub mod render;
pub mod request;
pub mod scm;

pub use consent::*;
pub use diagnostics::*;
pub use nvme::*;
pub use orchestrator::*;
pub use render::*;
pub use request::*;
pub use scm::*;
