//! Top-level error for a probe run.

use crate::config::ConfigError;
use crate::perf::PerfError;
use crate::region::RegionError;
use crate::system::SystemError;
use crate::table::TableError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to query system parameters: {0}")]
    System(#[from] SystemError),

    #[error("Counter setup failed: {0}")]
    Perf(#[from] PerfError),

    #[error("Memory mapping failed: {0}")]
    Region(#[from] RegionError),

    #[error("Page table lookup failed: {0}")]
    Table(#[from] TableError),

    #[error("Failed to write report: {0}")]
    Output(#[from] io::Error),
}
