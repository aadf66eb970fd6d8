//! Page-table state of one virtual address, read from the pagemap table.

use crate::table::{Table, TableError, TableReader};
use crate::verified::pagemap::{entry_offset, PageTableEntry, ENTRY_SIZE};

/// Read and decode the pagemap entry for `virtual_address`.
///
/// The entry is read fresh on every call.  Fails if the table cannot be
/// opened or yields fewer than eight bytes at the computed offset; there
/// is no retry.
pub fn decode_mapping<R: TableReader + ?Sized>(
    tables: &R,
    virtual_address: u64,
    page_size: u64,
) -> Result<PageTableEntry, TableError> {
    let index = entry_offset(virtual_address, page_size) / ENTRY_SIZE;
    let raw = tables.read_entry(Table::PageMap, index)?;
    log::debug!("pagemap[{index:#x}] for {virtual_address:#x} = {raw:#018x}");
    Ok(PageTableEntry::from_raw(raw))
}
