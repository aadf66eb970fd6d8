//! Host memory parameters: page size, huge page size, cache-line size.

use std::fmt;
use std::fs;
use std::io;
use thiserror::Error;

const MEMINFO_PATH: &str = "/proc/meminfo";
const COHERENCY_LINE_PATH: &str = "/sys/devices/system/cpu/cpu0/cache/index0/coherency_line_size";
const FALLBACK_CACHE_LINE: u64 = 64;

#[derive(Error, Debug)]
pub enum SystemError {
    #[error("sysconf({name}) failed: {source}")]
    Sysconf {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read {MEMINFO_PATH}: {0}")]
    Meminfo(#[source] io::Error),

    #[error("No usable Hugepagesize line in {MEMINFO_PATH}")]
    NoHugepageSize,
}

/// Base page size in bytes.
pub fn page_size() -> Result<u64, SystemError> {
    // SAFETY: sysconf has no memory-safety preconditions
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        -1 => Err(SystemError::Sysconf {
            name: "_SC_PAGESIZE",
            source: io::Error::last_os_error(),
        }),
        sz => Ok(sz as u64),
    }
}

/// Default huge page size in bytes, from `/proc/meminfo`.
pub fn huge_page_size() -> Result<u64, SystemError> {
    let text = fs::read_to_string(MEMINFO_PATH).map_err(SystemError::Meminfo)?;
    parse_hugepage_size(&text).ok_or(SystemError::NoHugepageSize)
}

/// Extract `Hugepagesize:` from meminfo text, in bytes.
///
/// ```
/// use vmafault::system::parse_hugepage_size;
///
/// let text = "MemTotal: 16 kB\nHugepagesize:    2048 kB\n";
/// assert_eq!(parse_hugepage_size(text), Some(2 * 1024 * 1024));
/// ```
pub fn parse_hugepage_size(meminfo: &str) -> Option<u64> {
    let line = meminfo
        .lines()
        .find_map(|l| l.strip_prefix("Hugepagesize:"))?;
    let mut fields = line.split_whitespace();
    let value: u64 = fields.next()?.parse().ok()?;
    let scale = match fields.next() {
        None | Some("kB") => 1024,
        Some(_) => return None,
    };
    value.checked_mul(scale).filter(|&bytes| bytes > 0)
}

/// L1 data cache line size in bytes.
///
/// Some architectures report 0 through sysconf; sysfs is consulted next,
/// then a 64-byte line is assumed.
pub fn cache_line_size() -> u64 {
    // SAFETY: sysconf has no memory-safety preconditions
    let sz = unsafe { libc::sysconf(libc::_SC_LEVEL1_DCACHE_LINESIZE) };
    if sz > 0 {
        return sz as u64;
    }
    match fs::read_to_string(COHERENCY_LINE_PATH)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|sz| sz.is_power_of_two())
    {
        Some(sz) => sz,
        None => {
            log::warn!("Cache line size unknown, assuming {FALLBACK_CACHE_LINE} bytes");
            FALLBACK_CACHE_LINE
        }
    }
}

/// Parameters reported in the startup summary line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemInfo {
    pub pid: u32,
    pub page_size: u64,
    pub huge_page_size: u64,
    pub cache_line_size: u64,
}

impl SystemInfo {
    pub fn query() -> Result<Self, SystemError> {
        Ok(Self {
            pid: std::process::id(),
            page_size: page_size()?,
            huge_page_size: huge_page_size()?,
            cache_line_size: cache_line_size(),
        })
    }
}

impl fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pid = {}, page size = {}, hugepage size = {}, L1 dcache line size = {}",
            self.pid, self.page_size, self.huge_page_size, self.cache_line_size
        )
    }
}
