//! Arithmetic encoder
//!
//! Mirror of [`super::decoder::ArithmeticDecoder`]: identical interval
//! arithmetic and model updates, with carry propagation into bytes already
//! emitted. `finish` flushes enough of the interval base that the emitted
//! prefix decodes unambiguously no matter what bytes follow it in the
//! surrounding stream.

use super::models::{AdaptiveBitModel, AdaptiveDataModel, StaticBitModel};
use super::{signed_to_code, AC_MAX_LENGTH, AC_MIN_LENGTH, BM_LENGTH_SHIFT, DM_LENGTH_SHIFT};

/// Arithmetic encoder producing one coded segment
pub struct ArithmeticEncoder {
    out: Vec<u8>,
    base: u32,
    length: u32,
}

impl ArithmeticEncoder {
    pub fn new() -> Self {
        ArithmeticEncoder {
            out: Vec::new(),
            base: 0,
            length: AC_MAX_LENGTH,
        }
    }

    fn propagate_carry(&mut self) {
        for byte in self.out.iter_mut().rev() {
            if *byte == 0xFF {
                *byte = 0;
            } else {
                *byte += 1;
                return;
            }
        }
    }

    fn renormalize(&mut self) {
        loop {
            self.out.push((self.base >> 24) as u8);
            self.base <<= 8;
            self.length <<= 8;
            if self.length >= AC_MIN_LENGTH {
                break;
            }
        }
    }

    #[inline]
    fn add_to_base(&mut self, x: u32) {
        let init_base = self.base;
        self.base = self.base.wrapping_add(x);
        if init_base > self.base {
            self.propagate_carry();
        }
    }

    /// Encode one bit under the static equiprobable model
    pub fn encode_bit(&mut self, bit: bool, model: &StaticBitModel) {
        let split = model.bit0_prob * (self.length >> BM_LENGTH_SHIFT);
        if bit {
            self.add_to_base(split);
            self.length -= split;
        } else {
            self.length = split;
        }
        if self.length < AC_MIN_LENGTH {
            self.renormalize();
        }
    }

    /// Encode one bit under an adaptive model
    pub fn encode_adaptive_bit(&mut self, bit: bool, model: &mut AdaptiveBitModel) {
        let split = model.bit0_prob * (self.length >> BM_LENGTH_SHIFT);
        if bit {
            self.add_to_base(split);
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
    }

    /// Encode one symbol under an adaptive n-ary model
    pub fn encode_symbol(&mut self, symbol: u32, model: &mut AdaptiveDataModel) {
        debug_assert!(symbol < model.data_symbols);
        let idx = symbol as usize;
        if symbol == model.data_symbols - 1 {
            let x = model.distribution[idx] * (self.length >> DM_LENGTH_SHIFT);
            self.add_to_base(x);
            self.length -= x;
        } else {
            self.length >>= DM_LENGTH_SHIFT;
            let x = model.distribution[idx] * self.length;
            self.add_to_base(x);
            self.length = model.distribution[idx + 1] * self.length - x;
        }
        if self.length < AC_MIN_LENGTH {
            self.renormalize();
        }

        model.symbol_count[idx] += 1;
        model.symbols_until_update -= 1;
        if model.symbols_until_update == 0 {
            model.update();
        }
    }

    /// Encode a fixed-width unsigned integer, LSB first, under the static model
    pub fn encode_fixed_width(&mut self, value: u32, bit_count: u32, model: &StaticBitModel) {
        debug_assert!(bit_count <= 32);
        for i in 0..bit_count {
            self.encode_bit((value >> i) & 1 != 0, model);
        }
    }

    /// Encode an order-`k` exp-Golomb value
    pub fn encode_exp_golomb(
        &mut self,
        value: u32,
        mut k: u32,
        static_model: &StaticBitModel,
        prefix_model: &mut AdaptiveBitModel,
    ) {
        // Widened so the growing prefix shift stays in range at k = 32.
        let mut value = value as u64;
        loop {
            if value >= (1u64 << k) {
                self.encode_adaptive_bit(true, prefix_model);
                value -= 1u64 << k;
                k += 1;
            } else {
                self.encode_adaptive_bit(false, prefix_model);
                while k > 0 {
                    k -= 1;
                    self.encode_bit((value >> k) & 1 != 0, static_model);
                }
                return;
            }
        }
    }

    /// Encode a zig-zag-mapped signed exp-Golomb value
    pub fn encode_signed_exp_golomb(
        &mut self,
        value: i64,
        k: u32,
        static_model: &StaticBitModel,
        prefix_model: &mut AdaptiveBitModel,
    ) {
        self.encode_exp_golomb(signed_to_code(value), k, static_model, prefix_model);
    }

    /// Terminate the segment and return its bytes
    pub fn finish(mut self) -> Vec<u8> {
        // Shrink the interval to a sub-range whose emitted prefix is
        // self-contained, then flush.
        if self.length > 2 * AC_MIN_LENGTH {
            self.add_to_base(AC_MIN_LENGTH);
            self.length = AC_MIN_LENGTH >> 1;
        } else {
            self.add_to_base(AC_MIN_LENGTH >> 1);
            self.length = AC_MIN_LENGTH >> 9;
        }
        self.renormalize();
        self.out
    }
}

impl Default for ArithmeticEncoder {
    fn default() -> Self {
        ArithmeticEncoder::new()
    }
}
