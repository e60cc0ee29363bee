//! Block-to-patch and occupancy run-length encoding
//!
//! Mirrors of the decoding side, sharing its candidate-list construction,
//! traversal orders, and run-length code table. Run selection keeps to the
//! simplest valid choices: raster traversal and literal runs.

use crate::decoder::block_to_patch::{build_candidate_lists, candidate_index_codeword, CandidateIndexModels};
use crate::decoder::occupancy::{run_length_code, traversal_order, OccupancyModels};
use crate::entropy::{fixed_length_bit_count, ArithmeticEncoder, StaticBitModel};
use crate::error::{Error, Result};
use crate::patch::Patch;

fn encode_candidate_index(
    encoder: &mut ArithmeticEncoder,
    index: usize,
    bin_coding: bool,
    models: &mut CandidateIndexModels,
) {
    if bin_coding {
        for (i, bit) in candidate_index_codeword(index).into_iter().enumerate() {
            encoder.encode_adaptive_bit(bit, &mut models.bits[i]);
        }
    } else {
        encoder.encode_symbol(index as u32, &mut models.index);
    }
}

fn encode_selection(
    encoder: &mut ArithmeticEncoder,
    candidates: &[usize],
    owner: usize,
    max_candidate_count: usize,
    patch_count: usize,
    bin_coding: bool,
    models: &mut CandidateIndexModels,
    static_model: &StaticBitModel,
) -> Result<()> {
    let position = candidates.iter().position(|&c| c == owner);
    match position {
        Some(position) if position < max_candidate_count => {
            encode_candidate_index(encoder, position, bin_coding, models);
        }
        _ => {
            if position.is_none() {
                return Err(Error::config_mismatch(format!(
                    "block owner {owner} is not among its candidates"
                )));
            }
            encode_candidate_index(encoder, max_candidate_count, bin_coding, models);
            let bit_count = fixed_length_bit_count(patch_count as u32);
            encoder.encode_fixed_width(owner as u32, bit_count, static_model);
        }
    }
    Ok(())
}

/// Largest candidate-list depth the index code must address
///
/// Capped at 4 in the binary variant, whose unary code has five codewords.
pub(crate) fn max_candidate_count(
    patches: &[Patch],
    grid_width: usize,
    grid_height: usize,
    bin_coding: bool,
) -> Result<usize> {
    let candidates = build_candidate_lists(patches, grid_width, grid_height, true)?;
    let deepest = candidates.iter().map(Vec::len).max().unwrap_or(1);
    Ok(if bin_coding { deepest.min(4) } else { deepest })
}

/// Encode the block-to-patch map for the run-length occupancy path
pub(crate) fn encode_block_to_patch(
    encoder: &mut ArithmeticEncoder,
    patches: &[Patch],
    block_to_patch: &[usize],
    grid_width: usize,
    grid_height: usize,
    max_candidate_count: usize,
    bin_coding: bool,
) -> Result<()> {
    let static_model = StaticBitModel::new();
    let candidates = build_candidate_lists(patches, grid_width, grid_height, true)?;
    let mut models = CandidateIndexModels::new(max_candidate_count);

    for (owner, candidates) in block_to_patch.iter().zip(&candidates) {
        if candidates.len() == 1 {
            if *owner != candidates[0] {
                return Err(Error::config_mismatch(
                    "single-candidate block carries a different owner",
                ));
            }
            continue;
        }
        encode_selection(
            encoder,
            candidates,
            *owner,
            max_candidate_count,
            patches.len(),
            bin_coding,
            &mut models,
            &static_model,
        )?;
    }
    Ok(())
}

/// Encode the block-to-patch map for the video-derived occupancy path
pub(crate) fn encode_block_to_patch_from_occupancy(
    encoder: &mut ArithmeticEncoder,
    patches: &[Patch],
    block_to_patch: &[usize],
    occupancy_map: &[bool],
    width: usize,
    grid_width: usize,
    grid_height: usize,
    occupancy_resolution: usize,
    max_candidate_count: usize,
    bin_coding: bool,
) -> Result<()> {
    let static_model = StaticBitModel::new();
    let candidates = build_candidate_lists(patches, grid_width, grid_height, false)?;
    let mut models = CandidateIndexModels::new(max_candidate_count);

    for (p, (owner, candidates)) in block_to_patch.iter().zip(&candidates).enumerate() {
        if candidates.is_empty() {
            continue;
        }
        let u_start = (p % grid_width) * occupancy_resolution;
        let v_start = (p / grid_width) * occupancy_resolution;
        let occupied = (v_start..v_start + occupancy_resolution).any(|v| {
            (u_start..u_start + occupancy_resolution).any(|u| occupancy_map[v * width + u])
        });
        if !occupied {
            continue;
        }
        if candidates.len() == 1 {
            continue;
        }
        encode_selection(
            encoder,
            candidates,
            *owner,
            max_candidate_count,
            patches.len(),
            bin_coding,
            &mut models,
            &static_model,
        )?;
    }
    Ok(())
}

/// Encode the occupancy map for one frame into the open arithmetic segment
///
/// Sub-cell values are sampled at the top-left pixel of each precision
/// square; the map must be uniform within squares (the decoder broadcasts).
pub(crate) fn encode_occupancy_map(
    encoder: &mut ArithmeticEncoder,
    block_to_patch: &[usize],
    occupancy_map: &[bool],
    width: usize,
    grid_width: usize,
    grid_height: usize,
    occupancy_resolution: usize,
    occupancy_precision: usize,
    bin_coding: bool,
) -> Result<()> {
    let static_model = StaticBitModel::new();
    let block_size = occupancy_resolution / occupancy_precision;
    let point_count = block_size * block_size;
    let order = traversal_order(0, block_size);
    let mut models = OccupancyModels::new(point_count);

    let mut block = vec![false; point_count];
    for v0 in 0..grid_height {
        for u0 in 0..grid_width {
            if block_to_patch[v0 * grid_width + u0] == 0 {
                continue;
            }
            for v1 in 0..block_size {
                let v2 = v0 * occupancy_resolution + v1 * occupancy_precision;
                for u1 in 0..block_size {
                    let u2 = u0 * occupancy_resolution + u1 * occupancy_precision;
                    block[v1 * block_size + u1] = occupancy_map[v2 * width + u2];
                }
            }

            let full = block.iter().all(|&b| b);
            encoder.encode_adaptive_bit(full, &mut models.full_block);
            if full {
                continue;
            }

            // Raster traversal, literal runs.
            if bin_coding {
                encoder.encode_adaptive_bit(false, &mut models.traversal_bit1);
                encoder.encode_adaptive_bit(false, &mut models.traversal_bit0);
            } else {
                encoder.encode_symbol(0, &mut models.traversal_index);
            }

            let values: Vec<bool> = order
                .iter()
                .map(|&(u1, v1)| block[v1 * block_size + u1])
                .collect();
            let mut runs: Vec<usize> = Vec::new();
            let mut previous = None;
            for &value in &values {
                match runs.last_mut() {
                    Some(last) if previous == Some(value) => *last += 1,
                    _ => {
                        runs.push(1);
                        previous = Some(value);
                    }
                }
            }

            // A single uniform run is sent as one explicit full-length run;
            // otherwise the last run is left for the decoder's remainder fill.
            let explicit: &[usize] = if runs.len() == 1 {
                &runs[..]
            } else {
                &runs[..runs.len() - 1]
            };
            let run_count_minus_two = explicit.len() - 1;
            if bin_coding {
                encoder.encode_exp_golomb(
                    run_count_minus_two as u32,
                    0,
                    &static_model,
                    &mut models.run_count_bit,
                );
            } else {
                encoder.encode_symbol(run_count_minus_two as u32, &mut models.run_count);
            }

            encoder.encode_adaptive_bit(values[0], &mut models.occupancy);
            for &run in explicit {
                let code = run - 1;
                if bin_coding {
                    let index = run_length_code(code);
                    for bit in (0..4).rev() {
                        encoder.encode_adaptive_bit(
                            (index >> bit) & 1 != 0,
                            &mut models.run_length_bits[bit],
                        );
                    }
                } else {
                    encoder.encode_symbol(code as u32, &mut models.run_length);
                }
            }
        }
    }
    Ok(())
}
