//! Pure decoding functions for the vmafault probe.
//!
//! Everything the probe learns about a page arrives as a raw 64-bit word
//! read from a kernel-exposed table.  This module holds the functions that
//! turn those words into structured data, with **no I/O, no system calls
//! and no external state mutation**, so they can be tested against
//! synthetic bit patterns without root, a PMU, or even Linux.
//!
//! The effectful shell lives next door:
//!
//! | Pure function / type          | Effectful caller                 |
//! |-------------------------------|----------------------------------|
//! | [`bits::bits`]                | every decoder                    |
//! | [`pagemap::PageTableEntry`]   | `crate::pagemap::decode_mapping` |
//! | [`kpageflags::flag_names`]    | `crate::kpage::decode_frame`     |
//! | [`stats::EventStatistics`]    | `crate::perf::CounterGroup`      |

pub mod bits;
pub mod kpageflags;
pub mod pagemap;
pub mod stats;
