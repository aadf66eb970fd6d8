//! Field layout of a `/proc/<pid>/pagemap` entry.
//!
//! ```text
//!  63  62  61  60..57  56  55  54 ........................ 5  4 ..... 0
//! ┌───┬───┬───┬───────┬───┬───┬────────────────────────────┬──────────┐
//! │ P │ S │ F │   0   │ X │ D │        PFN (if present)                │
//! │   │   │   │       │   │   │  swap offset (if swapped)  │ swap type│
//! └───┴───┴───┴───────┴───┴───┴────────────────────────────┴──────────┘
//!  P = present, S = swapped, F = file page or shared anon,
//!  X = exclusively mapped, D = soft-dirty
//! ```
//!
//! Bits 54..0 carry either a page frame number or a swap entry, never
//! both.  [`PageTableEntry::mapping`] picks the meaningful interpretation
//! from the present/swapped flags; the raw field accessors return the
//! bits regardless, for verbatim hex dumps.

use super::bits::{bit, bits};

/// Size in bytes of one pagemap (and kpagecount/kpageflags) entry.
pub const ENTRY_SIZE: u64 = 8;

pub const PRESENT_BIT: u32 = 63;
pub const SWAPPED_BIT: u32 = 62;
pub const FILE_OR_SHARED_BIT: u32 = 61;
pub const EXCLUSIVE_BIT: u32 = 56;
pub const SOFT_DIRTY_BIT: u32 = 55;

pub const PFN_HIGH: u32 = 54;
pub const PFN_LOW: u32 = 0;
pub const SWAP_OFFSET_HIGH: u32 = 54;
pub const SWAP_OFFSET_LOW: u32 = 5;
pub const SWAP_TYPE_HIGH: u32 = 4;
pub const SWAP_TYPE_LOW: u32 = 0;

// Flag bits sit strictly above the shared PFN/swap field.
const _: () = assert!(SOFT_DIRTY_BIT > PFN_HIGH);
const _: () = assert!(SWAP_OFFSET_LOW == SWAP_TYPE_HIGH + 1);
const _: () = assert!(SWAP_OFFSET_HIGH == PFN_HIGH);

/// Byte offset of the entry describing `virtual_address` in a
/// page-indexed table.
///
/// # Panics
///
/// Debug builds assert that `page_size` is a power of two.
#[inline]
pub fn entry_offset(virtual_address: u64, page_size: u64) -> u64 {
    debug_assert!(page_size.is_power_of_two(), "page size must be a power of two");
    (virtual_address / page_size) * ENTRY_SIZE
}

/// A swap location decoded from a non-present pagemap entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapEntry {
    pub swap_type: u64,
    pub offset: u64,
}

/// The meaningful interpretation of bits 54..0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapping {
    /// Resident; the frame number may read as zero without CAP_SYS_ADMIN.
    Present { pfn: u64 },
    Swapped(SwapEntry),
    NotPresent,
}

/// One decoded pagemap word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTableEntry {
    raw: u64,
}

impl PageTableEntry {
    pub const fn from_raw(raw: u64) -> Self {
        Self { raw }
    }

    pub const fn raw(&self) -> u64 {
        self.raw
    }

    pub const fn present(&self) -> bool {
        bit(self.raw, PRESENT_BIT)
    }

    pub const fn swapped(&self) -> bool {
        bit(self.raw, SWAPPED_BIT)
    }

    pub const fn file_or_shared_anon(&self) -> bool {
        bit(self.raw, FILE_OR_SHARED_BIT)
    }

    pub const fn exclusive(&self) -> bool {
        bit(self.raw, EXCLUSIVE_BIT)
    }

    pub const fn soft_dirty(&self) -> bool {
        bit(self.raw, SOFT_DIRTY_BIT)
    }

    /// Bits 54..0, meaningful only when present.
    pub const fn pfn_field(&self) -> u64 {
        bits(self.raw, PFN_HIGH, PFN_LOW)
    }

    /// Bits 54..5, meaningful only when swapped.
    pub const fn swap_offset_field(&self) -> u64 {
        bits(self.raw, SWAP_OFFSET_HIGH, SWAP_OFFSET_LOW)
    }

    /// Bits 4..0, meaningful only when swapped.
    pub const fn swap_type_field(&self) -> u64 {
        bits(self.raw, SWAP_TYPE_HIGH, SWAP_TYPE_LOW)
    }

    /// Interpret bits 54..0 according to the present/swapped flags.
    ///
    /// Present wins if the kernel ever reports both flags.
    pub fn mapping(&self) -> Mapping {
        if self.present() {
            Mapping::Present {
                pfn: self.pfn_field(),
            }
        } else if self.swapped() {
            Mapping::Swapped(SwapEntry {
                swap_type: self.swap_type_field(),
                offset: self.swap_offset_field(),
            })
        } else {
            Mapping::NotPresent
        }
    }

    /// The frame number, if the page is resident and the kernel exposed it.
    pub fn frame(&self) -> Option<u64> {
        match self.mapping() {
            Mapping::Present { pfn } if pfn != 0 => Some(pfn),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAG_BITS: [u32; 5] = [
        PRESENT_BIT,
        SWAPPED_BIT,
        FILE_OR_SHARED_BIT,
        EXCLUSIVE_BIT,
        SOFT_DIRTY_BIT,
    ];

    fn flags(e: &PageTableEntry) -> [bool; 5] {
        [
            e.present(),
            e.swapped(),
            e.file_or_shared_anon(),
            e.exclusive(),
            e.soft_dirty(),
        ]
    }

    // ─── Flags ───────────────────────────────────────────────────

    #[test]
    fn each_flag_decodes_independently() {
        for (idx, &b) in FLAG_BITS.iter().enumerate() {
            let entry = PageTableEntry::from_raw(1 << b);
            let decoded = flags(&entry);
            for (other, &set) in decoded.iter().enumerate() {
                assert_eq!(set, other == idx, "bit {b} leaked into flag #{other}");
            }
            assert_eq!(entry.pfn_field(), 0, "flag bit {b} leaked into PFN");
        }
    }

    #[test]
    fn pfn_bits_do_not_set_flags() {
        let entry = PageTableEntry::from_raw(bits(u64::MAX, PFN_HIGH, 0));
        assert_eq!(flags(&entry), [false; 5]);
        assert_eq!(entry.pfn_field(), (1u64 << 55) - 1);
    }

    // ─── Interpretation ──────────────────────────────────────────

    #[test]
    fn present_entry_yields_pfn() {
        let entry = PageTableEntry::from_raw(1 << PRESENT_BIT | 1 << EXCLUSIVE_BIT | 0x1234);
        assert_eq!(entry.mapping(), Mapping::Present { pfn: 0x1234 });
        assert_eq!(entry.frame(), Some(0x1234));
    }

    #[test]
    fn hidden_pfn_is_unresolved() {
        let entry = PageTableEntry::from_raw(1 << PRESENT_BIT);
        assert_eq!(entry.mapping(), Mapping::Present { pfn: 0 });
        assert_eq!(entry.frame(), None);
    }

    #[test]
    fn swapped_entry_yields_swap_fields() {
        let raw = 1 << SWAPPED_BIT | (0xabc << SWAP_OFFSET_LOW) | 0x1f;
        let entry = PageTableEntry::from_raw(raw);
        assert_eq!(
            entry.mapping(),
            Mapping::Swapped(SwapEntry {
                swap_type: 0x1f,
                offset: 0xabc,
            })
        );
        assert_eq!(entry.frame(), None);
    }

    #[test]
    fn empty_entry_is_not_present() {
        let entry = PageTableEntry::from_raw(0);
        assert_eq!(entry.mapping(), Mapping::NotPresent);
        assert_eq!(entry.frame(), None);
    }

    #[test]
    fn entry_offset_is_page_indexed() {
        assert_eq!(entry_offset(0, 4096), 0);
        assert_eq!(entry_offset(4095, 4096), 0);
        assert_eq!(entry_offset(4096, 4096), 8);
        assert_eq!(entry_offset(0x7fff_0000_0000, 4096), 0x7fff_0000_0000 / 4096 * 8);
    }
}
