//! Kernel bookkeeping for one physical frame: reference count and flags.

use crate::table::{Table, TableError, TableReader};
use crate::verified::kpageflags::flag_names;
use std::fmt;

/// Reference count and classification flags of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelPageMetadata {
    pub count: u64,
    pub flags: u64,
}

impl KernelPageMetadata {
    /// Names of the flags set in [`flags`](Self::flags), in catalog order.
    pub fn flag_names(&self) -> Vec<&'static str> {
        flag_names(self.flags)
    }

    /// Display adapter printing the names as `[ A B C ]`.
    pub fn flag_list(&self) -> FlagList {
        FlagList(self.flags)
    }
}

pub struct FlagList(u64);

impl fmt::Display for FlagList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for name in flag_names(self.0) {
            write!(f, " {name}")?;
        }
        f.write_str(" ]")
    }
}

/// Read the kpagecount and kpageflags entries for `pfn`.
///
/// Both reads are independent; either failing fails the whole lookup.
/// Reading these tables needs CAP_SYS_ADMIN, so callers usually treat
/// an error here as informational.
pub fn decode_frame<R: TableReader + ?Sized>(
    tables: &R,
    pfn: u64,
) -> Result<KernelPageMetadata, TableError> {
    let count = tables.read_entry(Table::KPageCount, pfn)?;
    let flags = tables.read_entry(Table::KPageFlags, pfn)?;
    log::debug!("frame {pfn:#x}: count={count} flags={flags:#018x}");
    Ok(KernelPageMetadata { count, flags })
}
