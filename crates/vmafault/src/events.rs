//! Symbolic event names and privilege levels, encoded for `perf_event_open`.
//!
//! Names follow the `perf list` vocabulary:
//!
//! - generic hardware events: `cpu-cycles`, `instructions`, `cache-misses`, …
//! - software events: `page-faults`, `minor-faults`, `context-switches`, …
//! - hardware cache events: `<cache>-<op>[-misses]`, e.g. `dTLB-load-misses`
//! - raw PMU events: `r` followed by a hex config, e.g. `r01a8`

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const PERF_TYPE_HARDWARE: u32 = 0;
pub const PERF_TYPE_SOFTWARE: u32 = 1;
pub const PERF_TYPE_HW_CACHE: u32 = 3;
pub const PERF_TYPE_RAW: u32 = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EventError {
    #[error("Unknown event name: {0}")]
    Unknown(String),

    #[error("Invalid raw event config: {0}")]
    InvalidRaw(String),

    #[error("Invalid privilege level {0:?} (expected 0, 1, 2 or 3)")]
    PrivilegeLevel(String),

    #[error("Empty privilege level list")]
    NoPrivilegeLevel,
}

// ═══════════════════════════════════════════════════════════════════════
//  Privilege levels
// ═══════════════════════════════════════════════════════════════════════

/// Set of execution privilege levels (rings 0..=3) a counter counts in.
///
/// Level 0 is the kernel and level 3 is user space.  Linux perf has no
/// notion of rings 1 and 2; they select hypervisor counting instead.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrivilegeLevels(u8);

impl PrivilegeLevels {
    pub const KERNEL: Self = Self(1 << 0);
    pub const LEVEL1: Self = Self(1 << 1);
    pub const LEVEL2: Self = Self(1 << 2);
    pub const USER: Self = Self(1 << 3);

    /// Build a set from individual level numbers.
    pub fn from_levels(levels: &[u8]) -> Result<Self, EventError> {
        if levels.is_empty() {
            return Err(EventError::NoPrivilegeLevel);
        }
        levels.iter().try_fold(Self(0), |acc, &level| match level {
            0..=3 => Ok(Self(acc.0 | 1 << level)),
            _ => Err(EventError::PrivilegeLevel(level.to_string())),
        })
    }

    /// Parse a comma-separated token list such as `"0,3"`.
    pub fn from_tokens(tokens: &str) -> Result<Self, EventError> {
        let levels = tokens
            .split(',')
            .filter(|t| !t.is_empty())
            .map(|t| match t.trim() {
                "0" => Ok(0),
                "1" => Ok(1),
                "2" => Ok(2),
                "3" => Ok(3),
                other => Err(EventError::PrivilegeLevel(other.to_string())),
            })
            .collect::<Result<Vec<u8>, _>>()?;
        Self::from_levels(&levels)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn counts_kernel(self) -> bool {
        self.contains(Self::KERNEL)
    }

    pub const fn counts_user(self) -> bool {
        self.contains(Self::USER)
    }

    pub const fn counts_hypervisor(self) -> bool {
        self.0 & (Self::LEVEL1.0 | Self::LEVEL2.0) != 0
    }
}

impl Default for PrivilegeLevels {
    fn default() -> Self {
        Self::USER
    }
}

impl FromStr for PrivilegeLevels {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tokens(s)
    }
}

impl fmt::Debug for PrivilegeLevels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let levels: Vec<u8> = (0..4).filter(|l| self.0 & 1 << l != 0).collect();
        write!(f, "PrivilegeLevels({levels:?})")
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Event catalog
// ═══════════════════════════════════════════════════════════════════════

const HARDWARE: &[(&str, u64)] = &[
    ("cpu-cycles", 0),
    ("cycles", 0),
    ("instructions", 1),
    ("cache-references", 2),
    ("cache-misses", 3),
    ("branch-instructions", 4),
    ("branches", 4),
    ("branch-misses", 5),
    ("bus-cycles", 6),
    ("stalled-cycles-frontend", 7),
    ("idle-cycles-frontend", 7),
    ("stalled-cycles-backend", 8),
    ("idle-cycles-backend", 8),
    ("ref-cycles", 9),
];

const SOFTWARE: &[(&str, u64)] = &[
    ("cpu-clock", 0),
    ("task-clock", 1),
    ("page-faults", 2),
    ("faults", 2),
    ("context-switches", 3),
    ("cs", 3),
    ("cpu-migrations", 4),
    ("migrations", 4),
    ("minor-faults", 5),
    ("major-faults", 6),
    ("alignment-faults", 7),
    ("emulation-faults", 8),
];

const CACHES: &[(&str, u64)] = &[
    ("L1-dcache", 0),
    ("L1-icache", 1),
    ("LLC", 2),
    ("dTLB", 3),
    ("iTLB", 4),
    ("branch", 5),
    ("node", 6),
];

// (suffix, op, result); op: load/store/prefetch, result: access/miss.
const CACHE_OPS: &[(&str, u64, u64)] = &[
    ("loads", 0, 0),
    ("load-misses", 0, 1),
    ("stores", 1, 0),
    ("store-misses", 1, 1),
    ("prefetches", 2, 0),
    ("prefetch-misses", 2, 1),
];

/// A resolved event: the `type`/`config` pair of a `perf_event_attr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSpec {
    pub name: String,
    pub type_: u32,
    pub config: u64,
}

impl EventSpec {
    /// Resolve a symbolic name to a perf event type and config.
    pub fn resolve(name: &str) -> Result<Self, EventError> {
        let (type_, config) = lookup(name)?;
        Ok(Self {
            name: name.to_string(),
            type_,
            config,
        })
    }
}

fn lookup(name: &str) -> Result<(u32, u64), EventError> {
    if let Some(&(_, config)) = HARDWARE.iter().find(|(n, _)| *n == name) {
        return Ok((PERF_TYPE_HARDWARE, config));
    }
    if let Some(&(_, config)) = SOFTWARE.iter().find(|(n, _)| *n == name) {
        return Ok((PERF_TYPE_SOFTWARE, config));
    }
    if let Some(config) = lookup_cache(name) {
        return Ok((PERF_TYPE_HW_CACHE, config));
    }
    if let Some(hex) = name.strip_prefix('r') {
        return u64::from_str_radix(hex, 16)
            .map(|config| (PERF_TYPE_RAW, config))
            .map_err(|_| EventError::InvalidRaw(name.to_string()));
    }
    Err(EventError::Unknown(name.to_string()))
}

fn lookup_cache(name: &str) -> Option<u64> {
    CACHES.iter().find_map(|&(cache, id)| {
        let suffix = name.strip_prefix(cache)?.strip_prefix('-')?;
        CACHE_OPS
            .iter()
            .find(|(s, _, _)| *s == suffix)
            .map(|&(_, op, result)| id | op << 8 | result << 16)
    })
}
