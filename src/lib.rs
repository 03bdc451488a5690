// src/lib.rs

//! Find the stale corners of a git repository: for every text file at a
//! revision, the day most of its lines were last touched, the mean of those
//! days, and the author responsible for most of it.

pub mod aggregate;
pub mod analyzer;
pub mod attribution;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod finalize;
pub mod model;
pub mod report;
pub mod store;
pub mod walker;

pub use analyzer::{run, Analyzer, RunStats};
pub use config::RunConfig;
pub use error::{AttributionError, FatalError, FatalResult};
