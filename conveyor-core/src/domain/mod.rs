//! Core domain types
//!
//! This module contains the structures shared by the loader (which builds
//! plans), the runner (which executes them) and the CLI (which reports on
//! them).

pub mod log;
pub mod plan;
pub mod result;
