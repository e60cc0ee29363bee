//! Run-length occupancy-map decoding
//!
//! Each patch-owned macro-block is coded as either "fully occupied" (one bit)
//! or as alternating runs of sub-cells along one of four scan orders. Decoded
//! sub-cells are broadcast to the full-resolution grid by the occupancy
//! precision. Unassigned blocks consume no bits and stay unoccupied.

use crate::entropy::{AdaptiveBitModel, AdaptiveDataModel, ArithmeticDecoder, StaticBitModel};
use crate::error::{Error, Result};

/// Run-length reordering for the 4-bit binary run code
///
/// The code index is chosen by expected frequency; this table maps it back to
/// the actual run length.
pub(crate) const RUN_LENGTH_INV_TABLE: [usize; 16] =
    [0, 1, 2, 3, 7, 11, 14, 5, 13, 9, 6, 10, 12, 4, 8, 15];

/// Forward mapping from a run length to its 4-bit code index
pub(crate) fn run_length_code(length: usize) -> usize {
    RUN_LENGTH_INV_TABLE
        .iter()
        .position(|&l| l == length)
        .unwrap_or(0)
}

/// One of the four fixed sub-cell scan orders
///
/// 0: row-major, 1: column-major, 2: anti-diagonal, 3: its horizontal mirror.
pub(crate) fn traversal_order(order: usize, block_size: usize) -> Vec<(usize, usize)> {
    let mut cells = Vec::with_capacity(block_size * block_size);
    match order {
        0 => {
            for v in 0..block_size {
                for u in 0..block_size {
                    cells.push((u, v));
                }
            }
        }
        1 => {
            for v in 0..block_size {
                for u in 0..block_size {
                    cells.push((v, u));
                }
            }
        }
        2 => {
            for k in 1..2 * block_size {
                for u in k.saturating_sub(block_size)..k.min(block_size) {
                    cells.push((u, k - (u + 1)));
                }
            }
        }
        _ => {
            for k in 1..2 * block_size {
                for u in k.saturating_sub(block_size)..k.min(block_size) {
                    cells.push((block_size - (1 + u), k - (u + 1)));
                }
            }
        }
    }
    cells
}

pub(crate) struct OccupancyModels {
    pub full_block: AdaptiveBitModel,
    pub occupancy: AdaptiveBitModel,
    pub traversal_bit0: AdaptiveBitModel,
    pub traversal_bit1: AdaptiveBitModel,
    pub run_count_bit: AdaptiveBitModel,
    pub run_length_bits: [AdaptiveBitModel; 4],
    pub traversal_index: AdaptiveDataModel,
    pub run_count: AdaptiveDataModel,
    pub run_length: AdaptiveDataModel,
}

impl OccupancyModels {
    pub fn new(point_count: usize) -> Self {
        let arity = point_count.max(2) as u32;
        OccupancyModels {
            full_block: AdaptiveBitModel::new(),
            occupancy: AdaptiveBitModel::new(),
            traversal_bit0: AdaptiveBitModel::new(),
            traversal_bit1: AdaptiveBitModel::new(),
            run_count_bit: AdaptiveBitModel::new(),
            run_length_bits: std::array::from_fn(|_| AdaptiveBitModel::new()),
            traversal_index: AdaptiveDataModel::new(4 + 1),
            run_count: AdaptiveDataModel::new(arity),
            run_length: AdaptiveDataModel::new(arity),
        }
    }
}

/// Decode the occupancy map for one frame from the open arithmetic segment
///
/// `block_to_patch` selects which macro-blocks carry coded data. The result
/// is the full-resolution `width * height` grid.
pub(crate) fn decode_occupancy_map(
    decoder: &mut ArithmeticDecoder<'_>,
    block_to_patch: &[usize],
    width: usize,
    height: usize,
    grid_width: usize,
    grid_height: usize,
    occupancy_resolution: usize,
    occupancy_precision: usize,
    bin_coding: bool,
) -> Result<Vec<bool>> {
    let static_model = StaticBitModel::new();
    let block_size = occupancy_resolution / occupancy_precision;
    let point_count = block_size * block_size;
    let orders: Vec<Vec<(usize, usize)>> =
        (0..4).map(|k| traversal_order(k, block_size)).collect();
    let mut models = OccupancyModels::new(point_count);

    let mut occupancy_map = vec![false; width * height];
    let mut block = vec![false; point_count];
    for v0 in 0..grid_height {
        for u0 in 0..grid_width {
            if block_to_patch[v0 * grid_width + u0] == 0 {
                continue;
            }
            let full = decoder.decode_adaptive_bit(&mut models.full_block);
            if full {
                block.fill(true);
            } else {
                let order_index = if bin_coding {
                    let bit1 = decoder.decode_adaptive_bit(&mut models.traversal_bit1);
                    let bit0 = decoder.decode_adaptive_bit(&mut models.traversal_bit0);
                    ((bit1 as usize) << 1) | bit0 as usize
                } else {
                    decoder.decode_symbol(&mut models.traversal_index) as usize
                };
                let order = orders.get(order_index).ok_or_else(|| {
                    Error::corrupt(format!("traversal order {order_index} out of range"))
                })?;

                let run_count_minus_two = if bin_coding {
                    decoder.decode_exp_golomb(0, &static_model, &mut models.run_count_bit)?
                        as usize
                } else {
                    decoder.decode_symbol(&mut models.run_count) as usize
                };
                let run_count_minus_one = run_count_minus_two + 1;

                let mut occupied = decoder.decode_adaptive_bit(&mut models.occupancy);
                let mut i = 0usize;
                for _ in 0..run_count_minus_one {
                    let run_length = if bin_coding {
                        let mut code = 0usize;
                        for (bit, model) in
                            models.run_length_bits.iter_mut().enumerate().rev()
                        {
                            code |= (decoder.decode_adaptive_bit(model) as usize) << bit;
                        }
                        RUN_LENGTH_INV_TABLE[code]
                    } else {
                        decoder.decode_symbol(&mut models.run_length) as usize
                    };
                    if i + run_length + 1 > point_count {
                        return Err(Error::corrupt(format!(
                            "occupancy run overflows the block at cell {i}"
                        )));
                    }
                    for _ in 0..=run_length {
                        let (u1, v1) = order[i];
                        block[v1 * block_size + u1] = occupied;
                        i += 1;
                    }
                    occupied = !occupied;
                }
                // Remaining cells carry the current alternating value.
                for &(u1, v1) in &order[i..] {
                    block[v1 * block_size + u1] = occupied;
                }
            }

            for v1 in 0..block_size {
                let v2 = v0 * occupancy_resolution + v1 * occupancy_precision;
                for u1 in 0..block_size {
                    let u2 = u0 * occupancy_resolution + u1 * occupancy_precision;
                    let occupied = block[v1 * block_size + u1];
                    for v3 in 0..occupancy_precision {
                        for u3 in 0..occupancy_precision {
                            occupancy_map[(v2 + v3) * width + u2 + u3] = occupied;
                        }
                    }
                }
            }
        }
    }
    Ok(occupancy_map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_traversal_orders_cover_every_cell_once() {
        for order in 0..4 {
            for block_size in [2usize, 4, 8] {
                let cells = traversal_order(order, block_size);
                assert_eq!(cells.len(), block_size * block_size);
                let unique: HashSet<_> = cells.iter().collect();
                assert_eq!(unique.len(), cells.len(), "order {order}");
            }
        }
    }

    #[test]
    fn test_diagonal_orders_mirror_each_other() {
        let block_size = 4;
        let diagonal = traversal_order(2, block_size);
        let mirrored = traversal_order(3, block_size);
        for (&(u, v), &(mu, mv)) in diagonal.iter().zip(&mirrored) {
            assert_eq!(mu, block_size - 1 - u);
            assert_eq!(mv, v);
        }
    }

    #[test]
    fn test_run_length_table_is_a_permutation() {
        let unique: HashSet<_> = RUN_LENGTH_INV_TABLE.iter().collect();
        assert_eq!(unique.len(), 16);
        for length in 0..16 {
            assert_eq!(RUN_LENGTH_INV_TABLE[run_length_code(length)], length);
        }
    }
}
