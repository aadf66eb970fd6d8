//! vmafault — measure how one virtual page behaves under the kernel's
//! fault and caching machinery.
//!
//! The probe maps a region, decodes the kernel's bookkeeping for its first
//! page, then brackets a load-and-flush of one cache line with a group of
//! perf event counters and reports the deltas.
//!
//! # Architecture
//!
//! - [`verified`] — Pure decoders: bit ranges, pagemap words, kpageflags, statistics
//! - [`table`] — Keyed 8-byte reads from pagemap/kpagecount/kpageflags
//! - [`pagemap`] — Page-table state of one virtual address
//! - [`kpage`] — Reference count and flags of one physical frame
//! - [`events`] — Event names and privilege levels for `perf_event_open`
//! - [`perf`] — Grouped counters with an explicit leader and state machine
//! - [`stimulus`] — Per-architecture load + cache-line flush + fence
//! - [`region`] — The anonymous mapping under test
//! - [`system`] — Page, huge page and cache-line sizes
//! - [`config`] — Validated run configuration
//! - [`driver`] — Orchestration and reporting
//! - [`maps`] — `/proc/self/maps` listing

pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod kpage;
pub mod maps;
pub mod pagemap;
pub mod perf;
pub mod region;
pub mod stimulus;
pub mod system;
pub mod table;
pub mod verified;

pub use config::{CycleCount, ProbeConfig};
pub use driver::{Probe, RunSummary};
pub use error::ProbeError;
