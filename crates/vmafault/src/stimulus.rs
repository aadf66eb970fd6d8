//! Cache-line stimulus: load one word, evict its line, fence.
//!
//! This is the event the counters bracket.  The three instructions are
//! issued as a single `asm!` block without `nomem`, so the compiler treats
//! it as reading and writing arbitrary memory and cannot move loads or
//! stores across it.
//!
//! | Target      | Sequence                    |
//! |-------------|-----------------------------|
//! | x86_64      | `mov`, `clflush`, `sfence`  |
//! | powerpc64   | `ld`, `dcbf`, `sync`        |
//! | aarch64     | `ldr`, `dc civac`, `dsb sy` |

#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "powerpc64",
    target_arch = "aarch64"
)))]
compile_error!("no cache-line flush sequence for this target architecture");

use core::arch::asm;

/// A reproducible memory event at one address.
pub trait Stimulus {
    /// Touch `addr` and leave its cache line evicted.
    ///
    /// # Safety
    ///
    /// `addr` must be valid for an aligned 8-byte read.
    unsafe fn touch_and_evict(&self, addr: *const u8);
}

/// Load followed by a data cache flush of the containing line.
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheLineFlush;

impl Stimulus for CacheLineFlush {
    #[inline(always)]
    unsafe fn touch_and_evict(&self, addr: *const u8) {
        load_flush(addr);
    }
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
unsafe fn load_flush(addr: *const u8) {
    asm!(
        "mov {tmp}, qword ptr [{addr}]",
        "clflush byte ptr [{addr}]",
        "sfence",
        addr = in(reg) addr,
        tmp = out(reg) _,
        options(nostack, preserves_flags)
    );
}

#[cfg(target_arch = "powerpc64")]
#[inline(always)]
unsafe fn load_flush(addr: *const u8) {
    asm!(
        "ld {tmp}, 0({addr})",
        "dcbf 0, {addr}",
        "sync",
        addr = in(reg_nonzero) addr,
        tmp = out(reg) _,
        options(nostack)
    );
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
unsafe fn load_flush(addr: *const u8) {
    asm!(
        "ldr {tmp}, [{addr}]",
        "dc civac, {addr}",
        "dsb sy",
        addr = in(reg) addr,
        tmp = out(reg) _,
        options(nostack, preserves_flags)
    );
}
