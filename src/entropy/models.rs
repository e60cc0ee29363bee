//! Probability models for the arithmetic coding engine
//!
//! Models carry all adaptive state; the coder itself is stateless apart from
//! its interval. Encoder and decoder must drive identical model instances in
//! identical order or the stream desynchronizes.

use super::{BM_LENGTH_SHIFT, BM_MAX_COUNT, DM_LENGTH_SHIFT, DM_MAX_COUNT};

/// Non-adaptive bit model with p(0) = 1/2
///
/// Used for the "raw" bits of fixed-width integers and exp-Golomb suffixes.
#[derive(Debug, Clone, Copy)]
pub struct StaticBitModel {
    pub(crate) bit0_prob: u32,
}

impl StaticBitModel {
    pub fn new() -> Self {
        StaticBitModel {
            bit0_prob: 1 << (BM_LENGTH_SHIFT - 1),
        }
    }
}

impl Default for StaticBitModel {
    fn default() -> Self {
        StaticBitModel::new()
    }
}

/// Adaptive binary model
///
/// Tracks zero/total counts and periodically refreshes the scaled
/// probability, halving the counts once they reach the rescaling bound.
#[derive(Debug, Clone)]
pub struct AdaptiveBitModel {
    pub(crate) bit0_prob: u32,
    pub(crate) bit0_count: u32,
    bit_count: u32,
    update_cycle: u32,
    pub(crate) bits_until_update: u32,
}

impl AdaptiveBitModel {
    pub fn new() -> Self {
        AdaptiveBitModel {
            bit0_prob: 1 << (BM_LENGTH_SHIFT - 1),
            bit0_count: 1,
            bit_count: 2,
            update_cycle: 4,
            bits_until_update: 4,
        }
    }

    pub(crate) fn update(&mut self) {
        self.bit_count += self.update_cycle;
        if self.bit_count > BM_MAX_COUNT {
            self.bit_count = (self.bit_count + 1) >> 1;
            self.bit0_count = (self.bit0_count + 1) >> 1;
            if self.bit0_count == self.bit_count {
                self.bit_count += 1;
            }
        }
        let scale = 0x8000_0000u32 / self.bit_count;
        self.bit0_prob = (self.bit0_count * scale) >> (31 - BM_LENGTH_SHIFT);

        self.update_cycle = (5 * self.update_cycle) >> 2;
        if self.update_cycle > 64 {
            self.update_cycle = 64;
        }
        self.bits_until_update = self.update_cycle;
    }
}

impl Default for AdaptiveBitModel {
    fn default() -> Self {
        AdaptiveBitModel::new()
    }
}

/// Adaptive model over an alphabet of `n` symbols
///
/// Symbol frequencies feed a cumulative distribution refreshed on a growing
/// update cycle; decoding binary-searches the distribution.
#[derive(Debug, Clone)]
pub struct AdaptiveDataModel {
    pub(crate) distribution: Vec<u32>,
    pub(crate) symbol_count: Vec<u32>,
    pub(crate) data_symbols: u32,
    total_count: u32,
    update_cycle: u32,
    pub(crate) symbols_until_update: u32,
}

impl AdaptiveDataModel {
    /// Create a model over `data_symbols` symbols (at least 2)
    pub fn new(data_symbols: u32) -> Self {
        debug_assert!(data_symbols >= 2);
        let mut model = AdaptiveDataModel {
            distribution: vec![0; data_symbols as usize],
            symbol_count: vec![1; data_symbols as usize],
            data_symbols,
            total_count: 0,
            update_cycle: data_symbols,
            symbols_until_update: 0,
        };
        model.update();
        model.update_cycle = (data_symbols + 6) >> 1;
        model.symbols_until_update = model.update_cycle;
        model
    }

    pub(crate) fn update(&mut self) {
        self.total_count += self.update_cycle;
        if self.total_count > DM_MAX_COUNT {
            self.total_count = 0;
            for count in self.symbol_count.iter_mut() {
                *count = (*count + 1) >> 1;
                self.total_count += *count;
            }
        }

        let scale = 0x8000_0000u32 / self.total_count;
        let mut sum = 0u32;
        for k in 0..self.data_symbols as usize {
            self.distribution[k] = (scale.wrapping_mul(sum)) >> (31 - DM_LENGTH_SHIFT);
            sum += self.symbol_count[k];
        }

        self.update_cycle = (5 * self.update_cycle) >> 2;
        let max_cycle = (self.data_symbols + 6) << 3;
        if self.update_cycle > max_cycle {
            self.update_cycle = max_cycle;
        }
        self.symbols_until_update = self.update_cycle;
    }
}
