//! Size-class quantization.
//!
//! Sizes are mapped to one of [`crate::BIN_COUNT`] bins using a scheme that
//! mirrors IEEE-754 floats: a 3-bit mantissa and an implicit exponent, so
//! that bin boundaries grow geometrically while still being cheap to
//! compute from a plain `u32` with no floating point involved.
//!
//! Two roundings are needed: free regions are filed under the bin whose
//! minimum size is *at most* their size (round down, so the region is
//! always found when searched for by a request that fits it), while
//! allocation requests search starting at the bin whose minimum size is
//! *at least* the request (round up, so a match is always large enough).

const MANTISSA_BITS: u32 = 3;
const MANTISSA_VALUE: u32 = 1 << MANTISSA_BITS;
const MANTISSA_MASK: u32 = MANTISSA_VALUE - 1;

/// Quantizes `size` down to a bin index whose minimum representable size is
/// at most `size`. Used when filing a free region into the directory.
pub fn quantize_round_down(size: u32) -> u32 {
    if size < MANTISSA_VALUE {
        size
    } else {
        let highest_set_bit = 31 - size.leading_zeros();
        let mantissa_start_bit = highest_set_bit - MANTISSA_BITS;
        let exp = mantissa_start_bit + 1;
        let mantissa = (size >> mantissa_start_bit) & MANTISSA_MASK;
        (exp << MANTISSA_BITS) | mantissa
    }
}

/// Quantizes `size` up to a bin index whose minimum representable size is
/// at least `size`. Used when searching the directory for a region that can
/// satisfy an allocation request.
///
/// The rounded-up mantissa is allowed to overflow into the exponent (it's
/// added rather than OR'd in), exactly as incrementing a float's mantissa
/// past its range carries into the exponent.
pub fn quantize_round_up(size: u32) -> u32 {
    if size < MANTISSA_VALUE {
        size
    } else {
        let highest_set_bit = 31 - size.leading_zeros();
        let mantissa_start_bit = highest_set_bit - MANTISSA_BITS;
        let exp = mantissa_start_bit + 1;
        let mut mantissa = (size >> mantissa_start_bit) & MANTISSA_MASK;

        let low_bits_mask = (1 << mantissa_start_bit) - 1;
        if size & low_bits_mask != 0 {
            mantissa += 1;
        }

        (exp << MANTISSA_BITS) + mantissa
    }
}

/// Recovers the minimum size a bin index represents, i.e. the inverse of
/// [`quantize_round_down`]/[`quantize_round_up`].
pub fn bin_index_to_min_size(bin_index: u32) -> u32 {
    let exponent = bin_index >> MANTISSA_BITS;
    let mantissa = bin_index & MANTISSA_MASK;
    if exponent == 0 {
        mantissa
    } else {
        (mantissa | MANTISSA_VALUE) << (exponent - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denorm_range_is_exact() {
        for size in 0..MANTISSA_VALUE {
            assert_eq!(quantize_round_down(size), size);
            assert_eq!(quantize_round_up(size), size);
            assert_eq!(bin_index_to_min_size(size), size);
        }
    }

    #[test]
    fn round_down_never_overestimates() {
        for size in [8u32, 9, 15, 16, 17, 1000, 1 << 20, u32::MAX / 2, u32::MAX] {
            let bin = quantize_round_down(size);
            assert!(bin_index_to_min_size(bin) <= size);
        }
    }

    #[test]
    fn round_up_never_underestimates() {
        for size in [8u32, 9, 15, 16, 17, 1000, 1 << 20, u32::MAX / 2] {
            let bin = quantize_round_up(size);
            assert!(bin_index_to_min_size(bin) >= size);
        }
    }

    #[test]
    fn round_trip_is_monotonic() {
        let mut prev = 0u32;
        for bin in 0..256u32 {
            let size = bin_index_to_min_size(bin);
            assert!(size >= prev, "bin {bin}: {size} < prev {prev}");
            prev = size;
        }
    }

    #[test]
    fn exact_powers_of_two_round_trip() {
        for shift in 3..31u32 {
            let size = 1u32 << shift;
            let down = quantize_round_down(size);
            let up = quantize_round_up(size);
            assert_eq!(down, up, "power of two {size} should round identically");
            assert_eq!(bin_index_to_min_size(down), size);
        }
    }
}
