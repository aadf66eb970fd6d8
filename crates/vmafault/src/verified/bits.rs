//! Inclusive bit-range extraction from a 64-bit word.

/// Width of the words exposed by every kernel table this crate reads.
pub const WORD_BITS: u32 = u64::BITS;

/// Return the right-justified value of bits `high..=low` of `value`.
///
/// Bits are numbered from the least-significant bit.  The full-width range
/// `bits(v, 63, 0)` returns `v` unchanged: the mask is built without
/// shifting a 64-bit one by 64, which would overflow.
///
/// # Panics
///
/// Debug builds assert `low <= high < 64`.
///
/// ```
/// use vmafault::verified::bits::bits;
///
/// assert_eq!(bits(0xabcd, 15, 8), 0xab);
/// assert_eq!(bits(u64::MAX, 63, 0), u64::MAX);
/// ```
#[inline]
pub const fn bits(value: u64, high: u32, low: u32) -> u64 {
    debug_assert!(high < WORD_BITS, "bit range exceeds word width");
    debug_assert!(low <= high, "bit range is inverted");

    let width = high - low + 1;
    let mask = if width == WORD_BITS {
        u64::MAX
    } else {
        (1u64 << width) - 1
    };
    (value >> low) & mask
}

/// Return bit `bit` of `value` as a boolean.
#[inline]
pub const fn bit(value: u64, bit: u32) -> bool {
    bits(value, bit, bit) != 0
}

// Full width is the identity, single bits are 0 or 1.
const _: () = assert!(bits(0xdead_beef_cafe_f00d, 63, 0) == 0xdead_beef_cafe_f00d);
const _: () = assert!(bits(1 << 63, 63, 63) == 1);
