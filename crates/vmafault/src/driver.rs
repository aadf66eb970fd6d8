//! Measurement driver: map a region, describe its first page, then run
//! reset → enable → stimulus → disable → read cycles against it.
//!
//! Within a cycle that order is the whole correctness argument: the
//! counter delta read at the end must be attributable to the single
//! access in the middle.  [`run_cycles`] is the only place the order is
//! spelled out, and it is written against the [`Measure`] and
//! [`Stimulus`] traits so tests can check it without a PMU.

use crate::config::ProbeConfig;
use crate::error::ProbeError;
use crate::kpage::{decode_frame, KernelPageMetadata};
use crate::pagemap::decode_mapping;
use crate::perf::{CounterGroup, PerfError};
use crate::region::MappedRegion;
use crate::stimulus::{CacheLineFlush, Stimulus};
use crate::system::SystemInfo;
use crate::table::{ProcTables, TableReader};
use crate::verified::pagemap::PageTableEntry;
use crate::verified::stats::EventStatistics;
use log::{debug, info, warn};
use std::fmt;
use std::io::Write;

// ═══════════════════════════════════════════════════════════════════════
//  Measurement cycle
// ═══════════════════════════════════════════════════════════════════════

/// Group-wide counter control, as seen by the cycle loop.
pub trait Measure {
    fn reset(&mut self) -> Result<(), PerfError>;
    fn enable(&mut self) -> Result<(), PerfError>;
    fn disable(&mut self) -> Result<(), PerfError>;
    /// Read every counter into its slot of `stats`.
    fn read_all(&mut self, stats: &mut [EventStatistics]) -> Result<(), PerfError>;
}

impl Measure for CounterGroup {
    fn reset(&mut self) -> Result<(), PerfError> {
        CounterGroup::reset(self)
    }

    fn enable(&mut self) -> Result<(), PerfError> {
        CounterGroup::enable(self)
    }

    fn disable(&mut self) -> Result<(), PerfError> {
        CounterGroup::disable(self)
    }

    fn read_all(&mut self, stats: &mut [EventStatistics]) -> Result<(), PerfError> {
        self.read_into(stats)
    }
}

/// Run one measured stimulus per address in `region`'s first `cycles`
/// cache lines, folding every counter delta into `stats`.
pub fn run_cycles<M, S>(
    group: &mut M,
    stimulus: &S,
    region: &MappedRegion,
    line_size: usize,
    cycles: usize,
    stats: &mut [EventStatistics],
) -> Result<(), PerfError>
where
    M: Measure + ?Sized,
    S: Stimulus + ?Sized,
{
    for addr in region.cache_line_addresses(line_size, cycles) {
        group.reset()?;
        group.enable()?;
        // SAFETY: addr is a line-aligned address inside the live region
        unsafe { stimulus.touch_and_evict(addr) };
        group.disable()?;
        group.read_all(stats)?;
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
//  Page-state report
// ═══════════════════════════════════════════════════════════════════════

/// What is known about the frame behind a mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameInfo {
    Resolved(KernelPageMetadata),
    /// Not present, swapped, or the PFN was hidden from this process.
    Unresolved,
    /// The kpagecount/kpageflags tables could not be read.
    Unreadable(String),
}

/// Decoded pagemap entry plus frame metadata for one virtual address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageReport {
    pub addr: u64,
    pub entry: PageTableEntry,
    pub frame: FrameInfo,
}

impl PageReport {
    /// Decode `addr`'s mapping; a pagemap failure is an error, a frame
    /// lookup failure is recorded in [`FrameInfo`].
    pub fn collect<R: TableReader + ?Sized>(
        tables: &R,
        addr: u64,
        page_size: u64,
    ) -> Result<Self, ProbeError> {
        let entry = decode_mapping(tables, addr, page_size)?;
        let frame = match entry.frame() {
            None => FrameInfo::Unresolved,
            Some(pfn) => match decode_frame(tables, pfn) {
                Ok(meta) => FrameInfo::Resolved(meta),
                Err(e) => {
                    warn!("Frame {pfn:#x} metadata unavailable: {e}");
                    FrameInfo::Unreadable(e.to_string())
                }
            },
        };
        Ok(Self { addr, entry, frame })
    }
}

impl fmt::Display for PageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let e = &self.entry;
        writeln!(f, "page information for virtual addr {:#018x}", self.addr)?;
        writeln!(f, "  page frame number (if present)   = {:#018x}", e.pfn_field())?;
        writeln!(f, "  swap type (if swapped)           = {:#018x}", e.swap_type_field())?;
        writeln!(f, "  swap offset (if swapped)         = {:#018x}", e.swap_offset_field())?;
        writeln!(f, "  pte is soft-dirty                = {:#018x}", e.soft_dirty() as u64)?;
        writeln!(f, "  page exclusively mapped          = {:#018x}", e.exclusive() as u64)?;
        writeln!(f, "  page is file-page or shared-anon = {:#018x}", e.file_or_shared_anon() as u64)?;
        writeln!(f, "  page swapped                     = {:#018x}", e.swapped() as u64)?;
        writeln!(f, "  page present                     = {:#018x}", e.present() as u64)?;
        match &self.frame {
            FrameInfo::Resolved(meta) => {
                writeln!(f, "  page count                       = {:#018x}", meta.count)?;
                writeln!(
                    f,
                    "  page flags                       = {:#018x} {}",
                    meta.flags,
                    meta.flag_list()
                )
            }
            FrameInfo::Unresolved => {
                writeln!(f, "  page count                       = n/a (frame not resolved)")?;
                writeln!(f, "  page flags                       = n/a (frame not resolved)")
            }
            FrameInfo::Unreadable(reason) => {
                writeln!(f, "  page count                       = n/a ({reason})")?;
                writeln!(f, "  page flags                       = n/a ({reason})")
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Aggregates
// ═══════════════════════════════════════════════════════════════════════

/// Final statistics for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSummary {
    pub name: String,
    pub stats: EventStatistics,
    pub cycles: u64,
}

impl fmt::Display for EventSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>32} : total = {:<10} \tmin = {:<10} \tmax = {:<10} \tavg = {:<10}",
            self.name,
            self.stats.total,
            self.stats.min,
            self.stats.max,
            self.stats.average(self.cycles)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub system: SystemInfo,
    pub page: PageReport,
    pub events: Vec<EventSummary>,
}

impl RunSummary {
    pub fn event(&self, name: &str) -> Option<&EventSummary> {
        self.events.iter().find(|e| e.name == name)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Probe
// ═══════════════════════════════════════════════════════════════════════

/// The full orchestration, parameterised over table access and stimulus.
#[derive(Debug, Default)]
pub struct Probe<R = ProcTables, S = CacheLineFlush> {
    tables: R,
    stimulus: S,
}

impl Probe {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: TableReader, S: Stimulus> Probe<R, S> {
    pub fn with_parts(tables: R, stimulus: S) -> Self {
        Self { tables, stimulus }
    }

    /// Run one configured measurement, writing the report to `out`.
    ///
    /// The region and counters are released on every return path.
    pub fn run<W: Write + ?Sized>(
        &self,
        config: &ProbeConfig,
        out: &mut W,
    ) -> Result<RunSummary, ProbeError> {
        config.validate()?;

        let system = SystemInfo::query()?;
        let region_len = system.huge_page_size as usize;
        let line_size = system.cache_line_size as usize;
        writeln!(out, "{}, events = {}", system, config.events.len())?;

        let mut group = CounterGroup::prepare(config.events.as_slice(), config.privilege)?;
        let counters = group.counters().count();
        let mut stats = vec![EventStatistics::default(); counters];
        info!(
            "Prepared {} counter(s) led by {} at {:?}",
            counters,
            group.leader().name(),
            config.privilege
        );

        let region = MappedRegion::new(region_len, config.region_options())?;

        let page = PageReport::collect(&self.tables, region.addr() as u64, system.page_size)?;
        write!(out, "{page}")?;

        let cycles = config.cycles.resolve(region.len(), line_size);
        debug!("Running {cycles} cycle(s) over {} bytes", region.len());
        run_cycles(&mut group, &self.stimulus, &region, line_size, cycles, &mut stats)?;

        let events: Vec<EventSummary> = group
            .counters()
            .zip(stats)
            .map(|(counter, stats)| EventSummary {
                name: counter.name().to_string(),
                stats,
                cycles: cycles as u64,
            })
            .collect();
        for event in &events {
            writeln!(out, "{event}")?;
        }

        Ok(RunSummary {
            system,
            page,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CycleCount;
    use crate::events::PrivilegeLevels;
    use crate::region::RegionOptions;
    use crate::table::{BufferTables, Table};
    use std::cell::RefCell;
    use std::rc::Rc;

    // ─── Fakes ───────────────────────────────────────────────────

    type Log = Rc<RefCell<Vec<&'static str>>>;

    /// Records control calls and refuses reads while enabled.
    struct RecordingGroup {
        log: Log,
        enabled: bool,
        next_value: u64,
    }

    impl Measure for RecordingGroup {
        fn reset(&mut self) -> Result<(), PerfError> {
            self.log.borrow_mut().push("reset");
            Ok(())
        }

        fn enable(&mut self) -> Result<(), PerfError> {
            self.log.borrow_mut().push("enable");
            self.enabled = true;
            Ok(())
        }

        fn disable(&mut self) -> Result<(), PerfError> {
            self.log.borrow_mut().push("disable");
            self.enabled = false;
            Ok(())
        }

        fn read_all(&mut self, stats: &mut [EventStatistics]) -> Result<(), PerfError> {
            assert!(!self.enabled, "read issued before disable");
            self.log.borrow_mut().push("read");
            for s in stats.iter_mut() {
                s.record(self.next_value);
            }
            self.next_value += 1;
            Ok(())
        }
    }

    struct RecordingStimulus {
        log: Log,
        touched: RefCell<Vec<usize>>,
    }

    impl Stimulus for RecordingStimulus {
        unsafe fn touch_and_evict(&self, addr: *const u8) {
            self.log.borrow_mut().push("touch");
            self.touched.borrow_mut().push(addr as usize);
        }
    }

    fn fakes() -> (Log, RecordingGroup, RecordingStimulus) {
        let log: Log = Rc::default();
        let group = RecordingGroup {
            log: log.clone(),
            enabled: false,
            next_value: 0,
        };
        let stimulus = RecordingStimulus {
            log: log.clone(),
            touched: RefCell::default(),
        };
        (log, group, stimulus)
    }

    // ─── Cycle ordering ──────────────────────────────────────────

    #[test]
    fn cycle_order_is_reset_enable_touch_disable_read() {
        let (log, mut group, stimulus) = fakes();
        let region = MappedRegion::new(4096, RegionOptions::default()).unwrap();
        let mut stats = vec![EventStatistics::default(); 2];

        run_cycles(&mut group, &stimulus, &region, 64, 3, &mut stats).unwrap();

        let expected: Vec<&str> = ["reset", "enable", "touch", "disable", "read"]
            .iter()
            .copied()
            .cycle()
            .take(15)
            .collect();
        assert_eq!(*log.borrow(), expected);
    }

    #[test]
    fn every_read_follows_a_disable() {
        let (log, mut group, stimulus) = fakes();
        let region = MappedRegion::new(4096, RegionOptions::default()).unwrap();
        let mut stats = vec![EventStatistics::default(); 1];

        run_cycles(&mut group, &stimulus, &region, 64, 64, &mut stats).unwrap();

        let log = log.borrow();
        for (i, op) in log.iter().enumerate() {
            if *op == "read" {
                assert_eq!(log[i - 1], "disable", "read at {i} not preceded by disable");
            }
        }
    }

    #[test]
    fn cycles_touch_successive_lines_and_aggregate() {
        let (_log, mut group, stimulus) = fakes();
        let region = MappedRegion::new(4096, RegionOptions::default()).unwrap();
        let mut stats = vec![EventStatistics::default(); 1];

        run_cycles(&mut group, &stimulus, &region, 64, 3, &mut stats).unwrap();

        let base = region.addr();
        assert_eq!(*stimulus.touched.borrow(), vec![base, base + 64, base + 128]);
        assert_eq!(stats[0].total, 3); // 0 + 1 + 2
        assert_eq!((stats[0].min, stats[0].max), (0, 2));
    }

    // ─── Page report ─────────────────────────────────────────────

    #[test]
    fn report_resolves_frame_metadata() {
        let mut tables = BufferTables::new();
        tables.set(Table::PageMap, 2, 1 << 63 | 1 << 56 | 0x99);
        tables.set(Table::KPageCount, 0x99, 1);
        tables.set(Table::KPageFlags, 0x99, 1 << 5 | 1 << 12);

        let report = PageReport::collect(&tables, 2 * 4096, 4096).unwrap();
        let text = report.to_string();

        assert!(matches!(report.frame, FrameInfo::Resolved(KernelPageMetadata { count: 1, .. })));
        assert!(text.contains("page frame number (if present)   = 0x0000000000000099"));
        assert!(text.contains("page exclusively mapped          = 0x0000000000000001"));
        assert!(text.contains("page present                     = 0x0000000000000001"));
        assert!(text.contains("[ LRU ANON ]"));
    }

    #[test]
    fn report_tolerates_unreadable_frame_tables() {
        let mut tables = BufferTables::new();
        tables.set(Table::PageMap, 0, 1 << 63 | 0x10);

        let report = PageReport::collect(&tables, 0, 4096).unwrap();
        assert!(matches!(report.frame, FrameInfo::Unreadable(_)));
        assert!(report.to_string().contains("page count                       = n/a"));
    }

    #[test]
    fn report_skips_frame_lookup_when_not_present() {
        let mut tables = BufferTables::new();
        tables.set(Table::PageMap, 0, 0);
        let report = PageReport::collect(&tables, 0, 4096).unwrap();
        assert_eq!(report.frame, FrameInfo::Unresolved);
    }

    #[test]
    fn report_fails_without_pagemap() {
        let tables = BufferTables::new();
        assert!(matches!(
            PageReport::collect(&tables, 0, 4096),
            Err(ProbeError::Table(_))
        ));
    }

    // ─── Aggregates ──────────────────────────────────────────────

    #[test]
    fn summary_line_layout() {
        let mut stats = EventStatistics::default();
        for v in [5, 2, 9] {
            stats.record(v);
        }
        let line = EventSummary {
            name: "page-faults".into(),
            stats,
            cycles: 3,
        }
        .to_string();
        assert!(line.starts_with(&format!("{:>32} :", "page-faults")));
        assert!(line.contains("total = 16"));
        assert!(line.contains("min = 2"));
        assert!(line.contains("max = 9"));
        assert!(line.contains("avg = 5"));
    }

    // ─── End to end ──────────────────────────────────────────────

    fn run_page_faults(populate: bool) -> Option<RunSummary> {
        let config = ProbeConfig {
            populate,
            privilege: PrivilegeLevels::USER,
            cycles: CycleCount::Fixed(1),
            ..ProbeConfig::default()
        };
        let mut out = Vec::new();
        match Probe::new().run(&config, &mut out) {
            Ok(summary) => {
                let text = String::from_utf8(out).unwrap();
                assert!(text.starts_with(&format!("pid = {}", std::process::id())));
                assert!(text.contains("events = 1"));
                assert!(text.contains("page information for virtual addr"));
                Some(summary)
            }
            Err(e @ (ProbeError::Perf(_) | ProbeError::System(_))) => {
                eprintln!("Not available: {} (expected in CI)", e);
                None
            }
            Err(e) => panic!("probe failed: {e}"),
        }
    }

    #[test]
    fn first_touch_of_fresh_region_faults_once() {
        if let Some(summary) = run_page_faults(false) {
            let faults = summary.event("page-faults").unwrap();
            assert_eq!(faults.stats.total, 1);
            assert_eq!(faults.stats.last, 1);
            assert!(!summary.page.entry.present(), "fresh region must start unfaulted");
        }
    }

    #[test]
    fn populated_region_does_not_fault() {
        if let Some(summary) = run_page_faults(true) {
            let faults = summary.event("page-faults").unwrap();
            assert_eq!(faults.stats.total, 0);
            assert!(summary.page.entry.present(), "populated region must be resident");
        }
    }
}
