//! Block-to-patch assignment decoding
//!
//! Every macro-block is owned by at most one patch. Ownership is coded as an
//! index into the block's candidate list (patches whose bounding rectangle
//! covers the block, iterated last-decoded first, stored as 1-based indices),
//! with an escape to a plain fixed-width patch index when the candidate list
//! is deeper than the coded range.

use crate::entropy::{
    fixed_length_bit_count, AdaptiveBitModel, AdaptiveDataModel, ArithmeticDecoder,
    StaticBitModel,
};
use crate::error::{Error, Result};
use crate::patch::Patch;

/// Unary codeword for a candidate index in the binary coding variant
///
/// Codewords: 0, 10, 110, 1110, 11110 — index 4 is the deepest and carries
/// no terminating zero.
pub(crate) fn candidate_index_codeword(index: usize) -> Vec<bool> {
    debug_assert!(index <= 4);
    let mut bits = vec![true; index.min(4)];
    if index < 4 {
        bits.push(false);
    }
    bits
}

/// Candidate patches per macro-block, deepest patch first, 1-based
///
/// `with_sentinel` appends the empty-assignment candidate `0` to every list
/// (the run-length occupancy path); the video-derived path leaves it off and
/// resolves empty blocks from the occupancy pixels instead.
pub(crate) fn build_candidate_lists(
    patches: &[Patch],
    grid_width: usize,
    grid_height: usize,
    with_sentinel: bool,
) -> Result<Vec<Vec<usize>>> {
    let mut candidates = vec![Vec::new(); grid_width * grid_height];
    for (patch_index, patch) in patches.iter().enumerate().rev() {
        let u_end = patch.u0 as usize + patch.size_u0 as usize;
        let v_end = patch.v0 as usize + patch.size_v0 as usize;
        if u_end > grid_width || v_end > grid_height {
            return Err(Error::corrupt(format!(
                "patch {patch_index} rectangle ({u_end}x{v_end}) exceeds the {grid_width}x{grid_height} block grid"
            )));
        }
        for v0 in patch.v0 as usize..v_end {
            for u0 in patch.u0 as usize..u_end {
                candidates[v0 * grid_width + u0].push(patch_index + 1);
            }
        }
    }
    if with_sentinel {
        for list in candidates.iter_mut() {
            list.push(0);
        }
    }
    Ok(candidates)
}

pub(crate) struct CandidateIndexModels {
    pub bits: [AdaptiveBitModel; 4],
    pub index: AdaptiveDataModel,
}

impl CandidateIndexModels {
    pub fn new(max_candidate_count: usize) -> Self {
        CandidateIndexModels {
            bits: std::array::from_fn(|_| AdaptiveBitModel::new()),
            index: AdaptiveDataModel::new(max_candidate_count as u32 + 2),
        }
    }
}

fn decode_candidate_index(
    decoder: &mut ArithmeticDecoder<'_>,
    bin_coding: bool,
    models: &mut CandidateIndexModels,
) -> usize {
    if bin_coding {
        for (i, model) in models.bits.iter_mut().enumerate() {
            if !decoder.decode_adaptive_bit(model) {
                return i;
            }
        }
        4
    } else {
        decoder.decode_symbol(&mut models.index) as usize
    }
}

fn resolve_selection(
    decoder: &mut ArithmeticDecoder<'_>,
    candidates: &[usize],
    selected: usize,
    max_candidate_count: usize,
    patch_count: usize,
    static_model: &StaticBitModel,
) -> Result<usize> {
    if selected == max_candidate_count {
        let bit_count = fixed_length_bit_count(patch_count as u32);
        let index = decoder.decode_fixed_width(bit_count, static_model)? as usize;
        if index > patch_count {
            return Err(Error::corrupt(format!(
                "escaped block owner {index} exceeds patch count {patch_count}"
            )));
        }
        Ok(index)
    } else {
        candidates.get(selected).copied().ok_or_else(|| {
            Error::corrupt(format!(
                "candidate index {selected} outside list of {}",
                candidates.len()
            ))
        })
    }
}

/// Decode the block-to-patch map for the run-length occupancy path
pub(crate) fn decode_block_to_patch(
    decoder: &mut ArithmeticDecoder<'_>,
    patches: &[Patch],
    grid_width: usize,
    grid_height: usize,
    max_candidate_count: usize,
    bin_coding: bool,
) -> Result<Vec<usize>> {
    let static_model = StaticBitModel::new();
    let candidates = build_candidate_lists(patches, grid_width, grid_height, true)?;
    let mut models = CandidateIndexModels::new(max_candidate_count);

    let mut block_to_patch = vec![0usize; grid_width * grid_height];
    for (block, candidates) in block_to_patch.iter_mut().zip(&candidates) {
        if candidates.len() == 1 {
            *block = candidates[0];
        } else {
            let selected = decode_candidate_index(decoder, bin_coding, &mut models);
            *block = resolve_selection(
                decoder,
                candidates,
                selected,
                max_candidate_count,
                patches.len(),
                &static_model,
            )?;
        }
    }
    Ok(block_to_patch)
}

/// Decode the block-to-patch map when occupancy came from a video stream
///
/// Selection bits are consumed only for blocks that contain at least one
/// occupied pixel; empty blocks are unassigned without touching the coder.
pub(crate) fn decode_block_to_patch_from_occupancy(
    decoder: &mut ArithmeticDecoder<'_>,
    patches: &[Patch],
    occupancy_map: &[bool],
    width: usize,
    grid_width: usize,
    grid_height: usize,
    occupancy_resolution: usize,
    max_candidate_count: usize,
    bin_coding: bool,
) -> Result<Vec<usize>> {
    let static_model = StaticBitModel::new();
    let candidates = build_candidate_lists(patches, grid_width, grid_height, false)?;
    let mut models = CandidateIndexModels::new(max_candidate_count);

    let mut block_to_patch = vec![0usize; grid_width * grid_height];
    for (p, (block, candidates)) in block_to_patch.iter_mut().zip(&candidates).enumerate() {
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
            *block = candidates[0];
        } else {
            let selected = decode_candidate_index(decoder, bin_coding, &mut models);
            *block = resolve_selection(
                decoder,
                candidates,
                selected,
                max_candidate_count,
                patches.len(),
                &static_model,
            )?;
        }
    }
    Ok(block_to_patch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch_at(u0: u32, v0: u32, size_u0: u32, size_v0: u32) -> Patch {
        Patch {
            u0,
            v0,
            size_u0,
            size_v0,
            ..Patch::default()
        }
    }

    #[test]
    fn test_candidate_codewords() {
        assert_eq!(candidate_index_codeword(0), vec![false]);
        assert_eq!(candidate_index_codeword(1), vec![true, false]);
        assert_eq!(candidate_index_codeword(3), vec![true, true, true, false]);
        assert_eq!(candidate_index_codeword(4), vec![true, true, true, true]);
    }

    #[test]
    fn test_candidate_lists_last_patch_first() {
        let patches = vec![patch_at(0, 0, 2, 2), patch_at(1, 0, 1, 1)];
        let lists = build_candidate_lists(&patches, 2, 2, true).unwrap();
        // Block (1,0) is covered by both; patch 1 (index+1 = 2) comes first.
        assert_eq!(lists[1], vec![2, 1, 0]);
        assert_eq!(lists[0], vec![1, 0]);
        // Block (0,1) only by patch 0.
        assert_eq!(lists[2], vec![1, 0]);
    }

    #[test]
    fn test_candidate_lists_without_sentinel() {
        let patches = vec![patch_at(0, 0, 1, 1)];
        let lists = build_candidate_lists(&patches, 2, 1, false).unwrap();
        assert_eq!(lists[0], vec![1]);
        assert!(lists[1].is_empty());
    }

    #[test]
    fn test_out_of_grid_patch_is_corrupt() {
        let patches = vec![patch_at(1, 0, 2, 1)];
        assert!(build_candidate_lists(&patches, 2, 1, true).is_err());
    }
}
