//! Pure data types for kumi: packages, execution results, and the env contract.
//!
//! This crate is a leaf dependency with no async runtime and no I/O. It exists
//! so that display layers and external tools can consume kumi's results
//! without pulling in kumi-engine's process and git machinery.

pub mod env;
pub mod package;
pub mod result;

// Flat re-exports for convenience
pub use package::*;
pub use result::*;
