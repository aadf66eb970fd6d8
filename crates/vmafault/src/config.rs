//! Validated run configuration for the measurement driver.

use crate::events::PrivilegeLevels;
use crate::region::RegionOptions;
use std::str::FromStr;
use thiserror::Error;

/// Event measured when none is requested.
pub const DEFAULT_EVENT: &str = "page-faults";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid cycle count {0:?} (expected a positive number or \"all\")")]
    Cycles(String),

    #[error("At least one event is required")]
    NoEvents,
}

/// Number of stimulus/measure cycles to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleCount {
    Fixed(usize),
    /// One cycle per cache line of the region.
    AllLines,
}

impl CycleCount {
    pub fn resolve(self, region_len: usize, line_size: usize) -> usize {
        match self {
            CycleCount::Fixed(n) => n,
            CycleCount::AllLines => (region_len / line_size.max(1)).max(1),
        }
    }
}

impl Default for CycleCount {
    fn default() -> Self {
        CycleCount::Fixed(1)
    }
}

impl FromStr for CycleCount {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(CycleCount::AllLines),
            _ => match s.parse::<usize>() {
                Ok(n) if n > 0 => Ok(CycleCount::Fixed(n)),
                _ => Err(ConfigError::Cycles(s.to_string())),
            },
        }
    }
}

/// Everything the driver needs to run one measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub privilege: PrivilegeLevels,
    pub huge_pages: bool,
    pub populate: bool,
    pub cycles: CycleCount,
    /// Event names; the first one leads the counter group.
    pub events: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            privilege: PrivilegeLevels::default(),
            huge_pages: false,
            populate: false,
            cycles: CycleCount::default(),
            events: vec![DEFAULT_EVENT.to_string()],
        }
    }
}

impl ProbeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.events.is_empty() {
            return Err(ConfigError::NoEvents);
        }
        if self.cycles == CycleCount::Fixed(0) {
            return Err(ConfigError::Cycles("0".to_string()));
        }
        Ok(())
    }

    pub fn region_options(&self) -> RegionOptions {
        RegionOptions {
            huge_pages: self.huge_pages,
            populate: self.populate,
        }
    }
}
