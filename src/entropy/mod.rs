//! Adaptive binary/multi-symbol arithmetic coding engine
//!
//! A Said-style range coder with a 32-bit interval and byte-wise
//! renormalization, matching the wire format of the patch/occupancy
//! protocol. Three probability models exist: a static equiprobable bit
//! model, an adaptive bit model, and an adaptive n-ary data model. Model
//! instances are plain owned values scoped to the segment being coded;
//! nothing here is process-global, so concurrent decodes of independent
//! streams never share state.

pub mod decoder;
pub mod encoder;
pub mod models;

pub use decoder::ArithmeticDecoder;
pub use encoder::ArithmeticEncoder;
pub use models::{AdaptiveBitModel, AdaptiveDataModel, StaticBitModel};

/// Interval renormalization threshold (one byte of headroom)
pub(crate) const AC_MIN_LENGTH: u32 = 0x0100_0000;

/// Initial interval length
pub(crate) const AC_MAX_LENGTH: u32 = 0xFFFF_FFFF;

/// Probability precision of the bit models
pub(crate) const BM_LENGTH_SHIFT: u32 = 13;

/// Rescaling bound for adaptive bit model counts
pub(crate) const BM_MAX_COUNT: u32 = 1 << BM_LENGTH_SHIFT;

/// Probability precision of the data models
pub(crate) const DM_LENGTH_SHIFT: u32 = 15;

/// Rescaling bound for adaptive data model counts
pub(crate) const DM_MAX_COUNT: u32 = 1 << DM_LENGTH_SHIFT;

/// Number of bits of the fixed-length representation of `n`
///
/// This is `ceil(log2(n + 1))`: the width every fixed-width field in the
/// protocol is sized with (0 needs zero bits, 1 needs one, 256 needs nine).
pub fn fixed_length_bit_count(n: u32) -> u32 {
    32 - n.leading_zeros()
}

/// Map an unsigned code value to the signed value it carries
///
/// Even codes are non-negative, odd codes negative: 0, 1, 2, 3, 4 decode to
/// 0, -1, 1, -2, 2.
pub fn code_to_signed(value: u32) -> i64 {
    if value & 1 != 0 {
        -(((value as i64) + 1) >> 1)
    } else {
        (value as i64) >> 1
    }
}

/// Map a signed value to its unsigned code (inverse of [`code_to_signed`])
pub fn signed_to_code(value: i64) -> u32 {
    if value < 0 {
        (-2 * value - 1) as u32
    } else {
        (2 * value) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_length_bit_count_boundaries() {
        // Boundary widths the encoder relies on.
        assert_eq!(fixed_length_bit_count(0), 0);
        assert_eq!(fixed_length_bit_count(1), 1);
        assert_eq!(fixed_length_bit_count(2), 2);
        assert_eq!(fixed_length_bit_count(7), 3);
        assert_eq!(fixed_length_bit_count(8), 4);
        assert_eq!(fixed_length_bit_count(255), 8);
        assert_eq!(fixed_length_bit_count(256), 9);
    }

    #[test]
    fn test_signed_mapping_roundtrip() {
        for v in [-5i64, -2, -1, 0, 1, 2, 100, -100, i32::MAX as i64] {
            assert_eq!(code_to_signed(signed_to_code(v)), v);
        }
        assert_eq!(code_to_signed(0), 0);
        assert_eq!(code_to_signed(1), -1);
        assert_eq!(code_to_signed(2), 1);
        assert_eq!(code_to_signed(3), -2);
        assert_eq!(code_to_signed(4), 2);
    }
}
