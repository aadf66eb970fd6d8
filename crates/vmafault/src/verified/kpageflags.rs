//! Symbolic rendering of `/proc/kpageflags` words.
//!
//! The catalog lists the flag names in kernel bit order, except that the
//! kernel reserves six bits after `IDLE` (bit 25) that this catalog does
//! not name.  Catalog entries past index 25 therefore live six bits
//! higher than their position: `RESERVED` (index 26) is bit 32 and
//! `SOFTDIRTY` (index 34) is bit 40.

/// Last catalog index stored at its own bit position.
pub const GAP_AFTER: usize = 25;

/// Number of unnamed bit positions following [`GAP_AFTER`].
pub const GAP_WIDTH: usize = 6;

/// Flag names in catalog order.
pub const KPAGE_FLAGS: [&str; 35] = [
    "LOCKED",
    "ERROR",
    "REFERENCED",
    "UPTODATE",
    "DIRTY",
    "LRU",
    "ACTIVE",
    "SLAB",
    "WRITEBACK",
    "RECLAIM",
    "BUDDY",
    "MMAP",
    "ANON",
    "SWAPCACHE",
    "SWAPBACKED",
    "COMPOUND-HEAD",
    "COMPOUND-TAIL",
    "HUGE",
    "UNEVICTABLE",
    "HWPOISON",
    "NOPAGE",
    "KSM",
    "THP",
    "BALLOON",
    "ZERO-PAGE",
    "IDLE",
    "RESERVED",
    "MLOCKED",
    "MAPPEDTODISK",
    "PRIVATE",
    "PRIVATE-2",
    "OWNER-PRIVATE",
    "ARCH",
    "UNCACHED",
    "SOFTDIRTY",
];

// The highest catalog bit must still fit in the word.
const _: () = assert!(KPAGE_FLAGS.len() - 1 + GAP_WIDTH < 64);
const _: () = assert!(GAP_AFTER < KPAGE_FLAGS.len());

/// Bit position of the catalog entry at `index`.
#[inline]
pub const fn flag_bit(index: usize) -> u32 {
    if index > GAP_AFTER {
        (index + GAP_WIDTH) as u32
    } else {
        index as u32
    }
}

/// Names of every catalog flag set in `word`, in catalog order.
///
/// Bits that fall in the reserved gap or above the catalog are ignored.
pub fn flag_names(word: u64) -> Vec<&'static str> {
    KPAGE_FLAGS
        .iter()
        .enumerate()
        .filter(|&(idx, _)| word & (1u64 << flag_bit(idx)) != 0)
        .map(|(_, &name)| name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_25_is_the_26th_name() {
        assert_eq!(flag_names(1 << 25), vec![KPAGE_FLAGS[25]]);
        assert_eq!(flag_names(1 << 25), vec!["IDLE"]);
    }

    #[test]
    fn gap_is_skipped_exactly_once() {
        for b in 26..32 {
            assert!(flag_names(1 << b).is_empty(), "reserved bit {b} matched a name");
        }
        assert_eq!(flag_names(1 << 32), vec!["RESERVED"]);
        assert_eq!(flag_names(1 << 40), vec!["SOFTDIRTY"]);
    }

    #[test]
    fn every_catalog_entry_round_trips_through_its_bit() {
        for (idx, &name) in KPAGE_FLAGS.iter().enumerate() {
            assert_eq!(flag_names(1 << flag_bit(idx)), vec![name]);
        }
    }

    #[test]
    fn names_come_out_in_catalog_order() {
        let word = 1 << 12 | 1 << 5 | 1 << 2 | 1 << 40;
        assert_eq!(
            flag_names(word),
            vec!["REFERENCED", "LRU", "ANON", "SOFTDIRTY"]
        );
    }

    #[test]
    fn bits_above_catalog_are_ignored() {
        assert!(flag_names(1 << 41 | 1 << 63).is_empty());
        assert!(flag_names(0).is_empty());
    }
}
