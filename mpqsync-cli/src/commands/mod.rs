//! CLI command implementations.
//!
//! One module per subcommand; argument structs are clap-derived and owned by
//! the module that consumes them. Shared context lives in `common`.

pub mod build;
pub mod check;
pub mod clean;
mod common;
pub mod download;
pub mod update;

pub use common::Environment;
