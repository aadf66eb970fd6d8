//! Keyed reads from the kernel's 8-byte-entry binary tables.
//!
//! Three tables are involved, all read-only and directly indexed:
//!
//! - [`Table::PageMap`]: `/proc/self/pagemap`, one entry per virtual page.
//! - [`Table::KPageCount`]: `/proc/kpagecount`, one entry per frame.
//! - [`Table::KPageFlags`]: `/proc/kpageflags`, one entry per frame.
//!
//! The decoders only see the [`TableReader`] trait.  [`ProcTables`] is the
//! procfs implementation; [`BufferTables`] serves synthetic entries so the
//! decoders can be exercised without root.

use crate::verified::pagemap::ENTRY_SIZE;
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════
//  Error type
// ═══════════════════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read {table} entry {index:#x}: {source}")]
    Read {
        table: Table,
        index: u64,
        #[source]
        source: io::Error,
    },

    #[error("Short read of {table} entry {index:#x}")]
    ShortRead { table: Table, index: u64 },
}

// ═══════════════════════════════════════════════════════════════════════
//  Tables
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    PageMap,
    KPageCount,
    KPageFlags,
}

impl Table {
    /// Procfs path backing this table for the calling process.
    pub fn path(self) -> &'static Path {
        Path::new(match self {
            Table::PageMap => "/proc/self/pagemap",
            Table::KPageCount => "/proc/kpagecount",
            Table::KPageFlags => "/proc/kpageflags",
        })
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Table::PageMap => "pagemap",
            Table::KPageCount => "kpagecount",
            Table::KPageFlags => "kpageflags",
        })
    }
}

/// Read one 64-bit entry from a directly indexed table.
pub trait TableReader {
    fn read_entry(&self, table: Table, index: u64) -> Result<u64, TableError>;
}

// ═══════════════════════════════════════════════════════════════════════
//  procfs
// ═══════════════════════════════════════════════════════════════════════

/// Tables read from procfs.
///
/// Each query opens the table afresh: entries describe live kernel state
/// and are never cached.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcTables;

impl TableReader for ProcTables {
    fn read_entry(&self, table: Table, index: u64) -> Result<u64, TableError> {
        let path = table.path();
        let file = File::open(path).map_err(|source| TableError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mut buf = [0u8; ENTRY_SIZE as usize];
        file.read_exact_at(&mut buf, index * ENTRY_SIZE)
            .map_err(|source| match source.kind() {
                io::ErrorKind::UnexpectedEof => TableError::ShortRead { table, index },
                _ => TableError::Read {
                    table,
                    index,
                    source,
                },
            })?;
        Ok(u64::from_ne_bytes(buf))
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  In-memory tables
// ═══════════════════════════════════════════════════════════════════════

/// Synthetic tables backed by byte buffers laid out like the procfs files.
///
/// A read past the end of a buffer, or from a table that was never
/// inserted, behaves like a short read of the real file.
#[derive(Debug, Default, Clone)]
pub struct BufferTables {
    tables: HashMap<Table, Vec<u8>>,
}

impl BufferTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install raw bytes for `table`, replacing any previous contents.
    pub fn with_bytes(mut self, table: Table, bytes: Vec<u8>) -> Self {
        self.tables.insert(table, bytes);
        self
    }

    /// Store `value` at `index`, growing the table with zero entries.
    pub fn set(&mut self, table: Table, index: u64, value: u64) {
        let bytes = self.tables.entry(table).or_default();
        let start = (index * ENTRY_SIZE) as usize;
        let end = start + ENTRY_SIZE as usize;
        if bytes.len() < end {
            bytes.resize(end, 0);
        }
        bytes[start..end].copy_from_slice(&value.to_ne_bytes());
    }
}

impl TableReader for BufferTables {
    fn read_entry(&self, table: Table, index: u64) -> Result<u64, TableError> {
        let bytes = self
            .tables
            .get(&table)
            .ok_or(TableError::ShortRead { table, index })?;
        let start = index
            .checked_mul(ENTRY_SIZE)
            .and_then(|s| usize::try_from(s).ok())
            .ok_or(TableError::ShortRead { table, index })?;
        let entry = bytes
            .get(start..start + ENTRY_SIZE as usize)
            .ok_or(TableError::ShortRead { table, index })?;

        let mut buf = [0u8; ENTRY_SIZE as usize];
        buf.copy_from_slice(entry);
        Ok(u64::from_ne_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_tables_index_by_entry() {
        let mut bytes = Vec::new();
        for v in [0x11u64, 0x22, 0x33] {
            bytes.extend_from_slice(&v.to_ne_bytes());
        }
        let tables = BufferTables::new().with_bytes(Table::KPageCount, bytes);
        assert_eq!(tables.read_entry(Table::KPageCount, 0).unwrap(), 0x11);
        assert_eq!(tables.read_entry(Table::KPageCount, 2).unwrap(), 0x33);
    }

    #[test]
    fn buffer_tables_short_read() {
        let tables = BufferTables::new().with_bytes(Table::PageMap, vec![0; 12]);
        assert!(matches!(
            tables.read_entry(Table::PageMap, 1),
            Err(TableError::ShortRead { index: 1, .. })
        ));
        assert!(matches!(
            tables.read_entry(Table::KPageFlags, 0),
            Err(TableError::ShortRead { .. })
        ));
    }

    #[test]
    fn set_grows_table() {
        let mut tables = BufferTables::new();
        tables.set(Table::KPageFlags, 4, 0xdead);
        assert_eq!(tables.read_entry(Table::KPageFlags, 4).unwrap(), 0xdead);
        assert_eq!(tables.read_entry(Table::KPageFlags, 3).unwrap(), 0);
    }

    #[test]
    fn proc_pagemap_is_readable_for_own_stack() {
        let local = 0u64;
        let page = crate::system::page_size().unwrap();
        let index = &local as *const u64 as u64 / page;
        match ProcTables.read_entry(Table::PageMap, index) {
            Ok(raw) => {
                let entry = crate::verified::pagemap::PageTableEntry::from_raw(raw);
                assert!(entry.present(), "touched stack page must be present");
            }
            Err(e) => eprintln!("pagemap not available: {} (expected in sandboxes)", e),
        }
    }
}
