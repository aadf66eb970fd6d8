//! Grouped hardware/software event counters via `perf_event_open()`.
//!
//! A [`CounterGroup`] owns one leader and any number of members opened
//! into the leader's group.  Reset, enable and disable are issued once on
//! the leader with `PERF_IOC_FLAG_GROUP`, so every counter in the group
//! starts and stops at the same instant.
//!
//! ```text
//!             prepare
//!   ─────────────────────▶ Prepared ──┐
//!                                     │ reset / enable
//!        ┌──────── reset ◀────────────┤
//!        ▼                            ▼
//!      Reset ── enable ──▶ Enabled ── disable ──▶ Disabled ── read
//!                             ▲                      │
//!                             └──── enable ──────────┘
//! ```
//!
//! Counters are closed when the group is dropped.

use crate::events::{EventError, EventSpec, PrivilegeLevels};
use crate::verified::stats::EventStatistics;
use log::debug;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use thiserror::Error;

/// perf_event_attr structure (subset needed for our use).
#[repr(C)]
#[derive(Debug, Default)]
struct PerfEventAttr {
    type_: u32,
    size: u32,
    config: u64,
    sample_period: u64,
    sample_type: u64,
    read_format: u64,
    flags: u64,
    wakeup_events: u32,
    bp_type: u32,
    config1: u64,
    config2: u64,
    branch_sample_type: u64,
    sample_regs_user: u64,
    sample_stack_user: u32,
    clockid: i32,
    sample_regs_intr: u64,
    aux_watermark: u32,
    sample_max_stack: u16,
    __reserved_2: u16,
    aux_sample_size: u32,
    __reserved_3: u32,
    sig_data: u64,
    config3: u64,
}

const FLAG_DISABLED: u64 = 1 << 0;
const FLAG_EXCLUDE_USER: u64 = 1 << 4;
const FLAG_EXCLUDE_KERNEL: u64 = 1 << 5;
const FLAG_EXCLUDE_HV: u64 = 1 << 6;
const PERF_EVENT_IOC_ENABLE: libc::c_ulong = 0x2400;
const PERF_EVENT_IOC_DISABLE: libc::c_ulong = 0x2401;
const PERF_EVENT_IOC_RESET: libc::c_ulong = 0x2403;
const PERF_IOC_FLAG_GROUP: libc::c_ulong = 1;

// ═══════════════════════════════════════════════════════════════════════
//  Error type
// ═══════════════════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum PerfError {
    #[error("Failed to resolve event: {0}")]
    Resolve(#[from] EventError),

    #[error("Failed to open counter {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("{op} failed on group leader {name}: {source}")]
    Control {
        op: GroupOp,
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read counter {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Short read of counter {name}: {got} bytes")]
    ShortRead { name: String, got: usize },

    #[error("Cannot {op} a counter group that is {state:?}")]
    InvalidState { op: GroupOp, state: GroupState },

    #[error("Counter group needs at least one event")]
    NoEvents,

    #[error("{counters} counters but {stats} statistics slots")]
    StatsMismatch { counters: usize, stats: usize },
}

// ═══════════════════════════════════════════════════════════════════════
//  Group state machine
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// Opened disabled, never enabled.
    Prepared,
    Reset,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOp {
    Reset,
    Enable,
    Disable,
    Read,
}

impl std::fmt::Display for GroupOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            GroupOp::Reset => "reset",
            GroupOp::Enable => "enable",
            GroupOp::Disable => "disable",
            GroupOp::Read => "read",
        })
    }
}

impl GroupState {
    /// State after applying `op`, or `None` if `op` is not allowed now.
    ///
    /// Reads are only meaningful once an enabled interval has been closed
    /// by a disable, so `Read` is accepted in `Disabled` alone.
    pub fn next(self, op: GroupOp) -> Option<GroupState> {
        use GroupOp as Op;
        use GroupState as S;
        match (self, op) {
            (S::Enabled, Op::Reset | Op::Enable | Op::Read) => None,
            (_, Op::Reset) => Some(S::Reset),
            (_, Op::Enable) => Some(S::Enabled),
            (S::Enabled, Op::Disable) => Some(S::Disabled),
            (_, Op::Disable) => None,
            (S::Disabled, Op::Read) => Some(S::Disabled),
            (_, Op::Read) => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Single counter
// ═══════════════════════════════════════════════════════════════════════

fn attr_for(spec: &EventSpec, levels: PrivilegeLevels) -> PerfEventAttr {
    let mut flags = FLAG_DISABLED;
    if !levels.counts_user() {
        flags |= FLAG_EXCLUDE_USER;
    }
    if !levels.counts_kernel() {
        flags |= FLAG_EXCLUDE_KERNEL;
    }
    if !levels.counts_hypervisor() {
        flags |= FLAG_EXCLUDE_HV;
    }

    PerfEventAttr {
        type_: spec.type_,
        size: std::mem::size_of::<PerfEventAttr>() as u32,
        config: spec.config,
        flags,
        ..Default::default()
    }
}

/// One open event counter.
#[derive(Debug)]
pub struct Counter {
    spec: EventSpec,
    fd: OwnedFd,
}

impl Counter {
    /// Resolve `name` and open it disabled for the calling thread on any
    /// CPU, joining `leader`'s group when one is given.
    pub fn prepare(
        name: &str,
        levels: PrivilegeLevels,
        leader: Option<&Counter>,
    ) -> Result<Self, PerfError> {
        let spec = EventSpec::resolve(name)?;
        let mut attr = attr_for(&spec, levels);
        let group_fd: RawFd = leader.map_or(-1, |l| l.fd.as_raw_fd());

        // SAFETY: perf_event_open with valid attr pointer
        let fd = unsafe {
            libc::syscall(
                libc::SYS_perf_event_open,
                &mut attr as *mut PerfEventAttr,
                0i32,  // pid = current thread
                -1i32, // cpu = any
                group_fd,
                0u64, // flags
            )
        } as RawFd;

        if fd < 0 {
            return Err(PerfError::Open {
                name: spec.name,
                source: io::Error::last_os_error(),
            });
        }

        debug!(
            "Opened counter {} (type={}, config={:#x}, levels={:?}, group_fd={})",
            spec.name, spec.type_, spec.config, levels, group_fd
        );
        // SAFETY: fd was just returned by the kernel and is owned by nobody else
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { spec, fd })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    fn control(&self, op: GroupOp, request: libc::c_ulong) -> Result<(), PerfError> {
        // SAFETY: ioctl on an owned perf fd with a perf request code
        let rc = unsafe { libc::ioctl(self.fd.as_raw_fd(), request, PERF_IOC_FLAG_GROUP) };
        if rc < 0 {
            return Err(PerfError::Control {
                op,
                name: self.spec.name.clone(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    /// Read the current count (does NOT reset).
    pub fn value(&self) -> Result<u64, PerfError> {
        let mut value: u64 = 0;
        // SAFETY: reading 8 bytes into a u64 on the stack
        let n = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                &mut value as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if n < 0 {
            return Err(PerfError::Read {
                name: self.spec.name.clone(),
                source: io::Error::last_os_error(),
            });
        }
        if n as usize != std::mem::size_of::<u64>() {
            return Err(PerfError::ShortRead {
                name: self.spec.name.clone(),
                got: n as usize,
            });
        }
        Ok(value)
    }

    /// Read the current count and fold it into `stats`.
    pub fn read_into(&self, stats: &mut EventStatistics) -> Result<u64, PerfError> {
        let value = self.value()?;
        stats.record(value);
        Ok(value)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Counter group
// ═══════════════════════════════════════════════════════════════════════

/// A leader counter plus the members that start and stop with it.
#[derive(Debug)]
pub struct CounterGroup {
    leader: Counter,
    members: Vec<Counter>,
    state: GroupState,
}

impl CounterGroup {
    /// Open every event in `names`; the first becomes the group leader.
    pub fn prepare<S: AsRef<str>>(names: &[S], levels: PrivilegeLevels) -> Result<Self, PerfError> {
        let (first, rest) = names.split_first().ok_or(PerfError::NoEvents)?;
        let leader = Counter::prepare(first.as_ref(), levels, None)?;
        let members = rest
            .iter()
            .map(|name| Counter::prepare(name.as_ref(), levels, Some(&leader)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            leader,
            members,
            state: GroupState::Prepared,
        })
    }

    pub fn leader(&self) -> &Counter {
        &self.leader
    }

    /// Leader first, then members in the order they were prepared.
    pub fn counters(&self) -> impl Iterator<Item = &Counter> {
        std::iter::once(&self.leader).chain(self.members.iter())
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    fn transition(&self, op: GroupOp) -> Result<GroupState, PerfError> {
        self.state.next(op).ok_or(PerfError::InvalidState {
            op,
            state: self.state,
        })
    }

    pub fn reset(&mut self) -> Result<(), PerfError> {
        let next = self.transition(GroupOp::Reset)?;
        self.leader.control(GroupOp::Reset, PERF_EVENT_IOC_RESET)?;
        self.state = next;
        Ok(())
    }

    pub fn enable(&mut self) -> Result<(), PerfError> {
        let next = self.transition(GroupOp::Enable)?;
        self.leader.control(GroupOp::Enable, PERF_EVENT_IOC_ENABLE)?;
        self.state = next;
        Ok(())
    }

    pub fn disable(&mut self) -> Result<(), PerfError> {
        let next = self.transition(GroupOp::Disable)?;
        self.leader.control(GroupOp::Disable, PERF_EVENT_IOC_DISABLE)?;
        self.state = next;
        Ok(())
    }

    /// Read every counter into the matching slot of `stats`.
    pub fn read_into(&mut self, stats: &mut [EventStatistics]) -> Result<(), PerfError> {
        self.transition(GroupOp::Read)?;
        let counters = self.counters().count();
        if stats.len() != counters {
            return Err(PerfError::StatsMismatch {
                counters,
                stats: stats.len(),
            });
        }
        for (counter, slot) in self.counters().zip(stats.iter_mut()) {
            counter.read_into(slot)?;
        }
        Ok(())
    }
}
