//! Arithmetic decoder
//!
//! Decodes one entropy-coded segment. The segment slice is exactly the span
//! declared in the enclosing stream; reads past its end yield zero bytes, so
//! the coder may idle near the tail without ever touching bytes that belong
//! to the next segment. The declared byte length, not the bits actually
//! consumed, governs how far the outer cursor advances.

use super::models::{AdaptiveBitModel, AdaptiveDataModel, StaticBitModel};
use super::{code_to_signed, AC_MAX_LENGTH, AC_MIN_LENGTH, BM_LENGTH_SHIFT, DM_LENGTH_SHIFT};
use crate::error::{Error, Result};

/// Arithmetic decoder over a single coded segment
pub struct ArithmeticDecoder<'a> {
    buf: &'a [u8],
    pos: usize,
    value: u32,
    length: u32,
}

impl<'a> ArithmeticDecoder<'a> {
    /// Start decoding `buf`, seeding the code value from its first four bytes
    pub fn new(buf: &'a [u8]) -> Self {
        let mut decoder = ArithmeticDecoder {
            buf,
            pos: 0,
            value: 0,
            length: AC_MAX_LENGTH,
        };
        for _ in 0..4 {
            decoder.value = (decoder.value << 8) | decoder.next_byte() as u32;
        }
        decoder
    }

    /// Bytes of the segment pulled into the code window so far
    pub fn bytes_consumed(&self) -> usize {
        self.pos.min(self.buf.len())
    }

    #[inline]
    fn next_byte(&mut self) -> u8 {
        let byte = self.buf.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        byte
    }

    #[inline]
    fn renormalize(&mut self) {
        loop {
            self.value = (self.value << 8) | self.next_byte() as u32;
            self.length <<= 8;
            if self.length >= AC_MIN_LENGTH {
                break;
            }
        }
    }

    /// Decode one bit under the static equiprobable model
    #[inline]
    pub fn decode_bit(&mut self, model: &StaticBitModel) -> bool {
        let split = model.bit0_prob * (self.length >> BM_LENGTH_SHIFT);
        let bit = self.value >= split;
        if bit {
            self.value -= split;
            self.length -= split;
        } else {
            self.length = split;
        }
        if self.length < AC_MIN_LENGTH {
            self.renormalize();
        }
        bit
    }

    /// Decode one bit under an adaptive model
    #[inline]
    pub fn decode_adaptive_bit(&mut self, model: &mut AdaptiveBitModel) -> bool {
        let split = model.bit0_prob * (self.length >> BM_LENGTH_SHIFT);
        let bit = self.value >= split;
        if bit {
            self.value -= split;
            self.length -= split;
        } else {
            self.length = split;
            model.bit0_count += 1;
        }
        if self.length < AC_MIN_LENGTH {
            self.renormalize();
        }
        model.bits_until_update -= 1;
        if model.bits_until_update == 0 {
            model.update();
        }
        bit
    }

    /// Decode one symbol under an adaptive n-ary model
    pub fn decode_symbol(&mut self, model: &mut AdaptiveDataModel) -> u32 {
        let mut low_value = 0u32;
        let mut high_value = self.length;
        self.length >>= DM_LENGTH_SHIFT;

        // Binary search of the cumulative distribution.
        let mut symbol = 0u32;
        let mut upper = model.data_symbols;
        let mut mid = upper >> 1;
        loop {
            let split = self.length * model.distribution[mid as usize];
            if split > self.value {
                upper = mid;
                high_value = split;
            } else {
                symbol = mid;
                low_value = split;
            }
            mid = (symbol + upper) >> 1;
            if mid == symbol {
                break;
            }
        }

        self.value -= low_value;
        self.length = high_value - low_value;
        if self.length < AC_MIN_LENGTH {
            self.renormalize();
        }

        model.symbol_count[symbol as usize] += 1;
        model.symbols_until_update -= 1;
        if model.symbols_until_update == 0 {
            model.update();
        }
        symbol
    }

    /// Decode a fixed-width unsigned integer, LSB first, under the static model
    ///
    /// Widths come from stream-declared header bytes, so anything past the
    /// 32-bit value range is rejected as corrupt rather than shifted.
    pub fn decode_fixed_width(&mut self, bit_count: u32, model: &StaticBitModel) -> Result<u32> {
        if bit_count > 32 {
            return Err(Error::corrupt(format!(
                "declared field width {bit_count} exceeds 32 bits"
            )));
        }
        let mut value = 0u32;
        for i in 0..bit_count {
            if self.decode_bit(model) {
                value |= 1 << i;
            }
        }
        Ok(value)
    }

    /// Decode an order-`k` exp-Golomb value
    ///
    /// Prefix bits come from the adaptive model, suffix bits from the static
    /// one; `k` grows with every prefix continuation. No valid value needs a
    /// prefix past 32 continuations, so a longer run is corrupt rather than
    /// an overflowing shift.
    pub fn decode_exp_golomb(
        &mut self,
        mut k: u32,
        static_model: &StaticBitModel,
        prefix_model: &mut AdaptiveBitModel,
    ) -> Result<u32> {
        let mut symbol = 0u32;
        while self.decode_adaptive_bit(prefix_model) {
            if k >= 32 {
                return Err(Error::corrupt(
                    "exp-Golomb prefix exceeds the 32-bit value range",
                ));
            }
            symbol += 1 << k;
            k += 1;
        }
        let mut suffix = 0u32;
        while k > 0 {
            k -= 1;
            if self.decode_bit(static_model) {
                suffix |= 1 << k;
            }
        }
        Ok(symbol + suffix)
    }

    /// Decode a zig-zag-mapped signed exp-Golomb value
    pub fn decode_signed_exp_golomb(
        &mut self,
        k: u32,
        static_model: &StaticBitModel,
        prefix_model: &mut AdaptiveBitModel,
    ) -> Result<i64> {
        Ok(code_to_signed(self.decode_exp_golomb(
            k,
            static_model,
            prefix_model,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::super::encoder::ArithmeticEncoder;
    use super::*;

    #[test]
    fn test_static_bit_roundtrip() {
        let bits = [true, false, false, true, true, true, false, true, false];
        let model = StaticBitModel::new();
        let mut enc = ArithmeticEncoder::new();
        for &bit in &bits {
            enc.encode_bit(bit, &model);
        }
        let data = enc.finish();

        let mut dec = ArithmeticDecoder::new(&data);
        for &bit in &bits {
            assert_eq!(dec.decode_bit(&model), bit);
        }
    }

    #[test]
    fn test_adaptive_bit_roundtrip_biased() {
        // A heavily biased sequence exercises the model update path.
        let bits: Vec<bool> = (0..400).map(|i| i % 13 == 0).collect();
        let mut enc = ArithmeticEncoder::new();
        let mut enc_model = AdaptiveBitModel::new();
        for &bit in &bits {
            enc.encode_adaptive_bit(bit, &mut enc_model);
        }
        let data = enc.finish();

        let mut dec = ArithmeticDecoder::new(&data);
        let mut dec_model = AdaptiveBitModel::new();
        for &bit in &bits {
            assert_eq!(dec.decode_adaptive_bit(&mut dec_model), bit);
        }
    }

    #[test]
    fn test_data_model_roundtrip() {
        let symbols: Vec<u32> = (0..300).map(|i| (i * 7 + i / 5) % 10).collect();
        let mut enc = ArithmeticEncoder::new();
        let mut enc_model = AdaptiveDataModel::new(10);
        for &s in &symbols {
            enc.encode_symbol(s, &mut enc_model);
        }
        let data = enc.finish();

        let mut dec = ArithmeticDecoder::new(&data);
        let mut dec_model = AdaptiveDataModel::new(10);
        for &s in &symbols {
            assert_eq!(dec.decode_symbol(&mut dec_model), s);
        }
    }

    #[test]
    fn test_fixed_width_and_exp_golomb_roundtrip() {
        let static_model = StaticBitModel::new();
        let values = [0u32, 1, 2, 7, 8, 255, 256, 65535, 123_456];
        let deltas = [0i64, 1, -1, 5, -5, 127, -128, 1000, -999];

        let mut enc = ArithmeticEncoder::new();
        let mut prefix = AdaptiveBitModel::new();
        for &v in &values {
            enc.encode_fixed_width(v, 20, &static_model);
        }
        for &d in &deltas {
            enc.encode_signed_exp_golomb(d, 0, &static_model, &mut prefix);
        }
        let data = enc.finish();

        let mut dec = ArithmeticDecoder::new(&data);
        let mut prefix = AdaptiveBitModel::new();
        for &v in &values {
            assert_eq!(dec.decode_fixed_width(20, &static_model).unwrap(), v);
        }
        for &d in &deltas {
            assert_eq!(
                dec.decode_signed_exp_golomb(0, &static_model, &mut prefix)
                    .unwrap(),
                d
            );
        }
    }

    #[test]
    fn test_oversized_fixed_width_rejected() {
        let static_model = StaticBitModel::new();
        let mut dec = ArithmeticDecoder::new(&[0xAA; 16]);
        assert!(dec.decode_fixed_width(32, &static_model).is_ok());
        assert!(dec.decode_fixed_width(33, &static_model).is_err());
    }

    #[test]
    fn test_runaway_exp_golomb_prefix_rejected() {
        // An all-ones segment keeps the prefix model producing continuation
        // bits forever; the decoder must bail out instead of overflowing.
        let static_model = StaticBitModel::new();
        let mut dec = ArithmeticDecoder::new(&[0xFF; 64]);
        let mut prefix = AdaptiveBitModel::new();
        assert!(dec
            .decode_exp_golomb(0, &static_model, &mut prefix)
            .is_err());
    }

    #[test]
    fn test_tiny_segment_zero_padded_tail() {
        // A couple of bits produce fewer than four code bytes; the decoder
        // zero-pads its window and must still recover them.
        let model = StaticBitModel::new();
        let mut enc = ArithmeticEncoder::new();
        enc.encode_bit(true, &model);
        enc.encode_bit(false, &model);
        let data = enc.finish();

        let mut dec = ArithmeticDecoder::new(&data);
        assert!(dec.decode_bit(&model));
        assert!(!dec.decode_bit(&model));
    }
}
