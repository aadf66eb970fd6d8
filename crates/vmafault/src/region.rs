//! The anonymous mapping a measurement runs against.

use log::{debug, warn};
use std::io;
use std::ptr::NonNull;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegionError {
    #[error("Failed to map {len} bytes (flags {flags:#x}): {source}")]
    Map {
        len: usize,
        flags: i32,
        #[source]
        source: io::Error,
    },

    #[error("Region length must be non-zero")]
    Empty,

    #[error("mprotect of {len} bytes at {addr:#x} failed: {source}")]
    Protect {
        addr: usize,
        len: usize,
        #[source]
        source: io::Error,
    },
}

/// How the region is backed and whether its pages are faulted in up front.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionOptions {
    /// Back the region with huge pages (`MAP_HUGETLB`).
    pub huge_pages: bool,
    /// Pre-fault every page at map time (`MAP_POPULATE`).
    pub populate: bool,
}

impl RegionOptions {
    pub fn mmap_flags(self) -> i32 {
        let mut flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
        if self.huge_pages {
            flags |= libc::MAP_HUGETLB;
        }
        if self.populate {
            flags |= libc::MAP_POPULATE;
        }
        flags
    }
}

/// A private anonymous read/write mapping, unmapped on drop.
#[derive(Debug)]
pub struct MappedRegion {
    base: NonNull<u8>,
    len: usize,
    prot: i32,
}

#[allow(clippy::len_without_is_empty)]
impl MappedRegion {
    /// Map `len` bytes of anonymous read/write memory.
    pub fn new(len: usize, options: RegionOptions) -> Result<Self, RegionError> {
        Self::map(None, len, libc::PROT_READ | libc::PROT_WRITE, options.mmap_flags())
    }

    /// Map `len` bytes at exactly `addr` (`MAP_FIXED`).
    ///
    /// # Safety
    ///
    /// Any existing mapping overlapping `addr..addr + len` is replaced.
    pub unsafe fn fixed(addr: usize, len: usize, prot: i32) -> Result<Self, RegionError> {
        Self::map(
            Some(addr),
            len,
            prot,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_FIXED,
        )
    }

    fn map(addr: Option<usize>, len: usize, prot: i32, flags: i32) -> Result<Self, RegionError> {
        if len == 0 {
            return Err(RegionError::Empty);
        }
        let hint = addr.unwrap_or(0) as *mut libc::c_void;
        // SAFETY: anonymous mapping, no file descriptor involved
        let ptr = unsafe { libc::mmap(hint, len, prot, flags, -1, 0) };
        if ptr == libc::MAP_FAILED {
            return Err(RegionError::Map {
                len,
                flags,
                source: io::Error::last_os_error(),
            });
        }
        let base = NonNull::new(ptr as *mut u8).ok_or(RegionError::Map {
            len,
            flags,
            source: io::Error::from(io::ErrorKind::AddrNotAvailable),
        })?;
        debug!("Mapped {len} bytes at {:p} (flags {flags:#x})", base);
        Ok(Self { base, len, prot })
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.base.as_ptr()
    }

    pub fn addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn prot(&self) -> i32 {
        self.prot
    }

    /// Change the protection of the whole region.
    pub fn protect(&mut self, prot: i32) -> Result<(), RegionError> {
        // SAFETY: the range is exactly the mapping this value owns
        let rc = unsafe { libc::mprotect(self.base.as_ptr() as *mut libc::c_void, self.len, prot) };
        if rc != 0 {
            return Err(RegionError::Protect {
                addr: self.addr(),
                len: self.len,
                source: io::Error::last_os_error(),
            });
        }
        self.prot = prot;
        Ok(())
    }

    /// Addresses of the first word of `count` consecutive cache lines,
    /// starting at the region base and wrapping around its end.
    ///
    /// Addresses are produced on demand, so `count` may be arbitrarily large.
    pub fn cache_line_addresses(
        &self,
        line_size: usize,
        count: usize,
    ) -> impl Iterator<Item = *const u8> {
        debug_assert!(line_size.is_power_of_two());
        let base = self.addr();
        let lines = (self.len / line_size).max(1);
        (0..count).map(move |i| {
            let offset = (i % lines) * line_size;
            ((base + offset) & !(line_size - 1)) as *const u8
        })
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: unmapping the exact range returned by mmap
        let rc = unsafe { libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.len) };
        if rc != 0 {
            warn!(
                "munmap of {} bytes at {:p} failed: {}",
                self.len,
                self.base,
                io::Error::last_os_error()
            );
        } else {
            debug!("Unmapped {} bytes at {:p}", self.len, self.base);
        }
    }
}
