//! Patch metadata encoding, intra and temporally-predicted
//!
//! Bit-for-bit mirror of the decoding side: identical model topology driven
//! in identical order, so a decode of the produced segment reconstructs the
//! input patch list exactly.

use crate::bitstream::BitstreamWriter;
use crate::context::FrameContext;
use crate::entropy::{
    fixed_length_bit_count, AdaptiveBitModel, AdaptiveDataModel, ArithmeticEncoder,
    StaticBitModel,
};
use crate::error::{Error, Result};
use crate::metadata::{encode_metadata, ArithmeticMetadataSink, Metadata, MetadataModels};
use crate::patch::Patch;

use super::FrameCodingConfig;

/// Encode a projection normal axis (mirror of the decoder's prefix code)
fn encode_normal_axis(
    encoder: &mut ArithmeticEncoder,
    normal: u8,
    bin_coding: bool,
    static_model: &StaticBitModel,
    orientation_bit: &mut AdaptiveBitModel,
    orientation: &mut AdaptiveDataModel,
) {
    if bin_coding {
        match normal {
            0 => encoder.encode_adaptive_bit(false, orientation_bit),
            1 => {
                encoder.encode_adaptive_bit(true, orientation_bit);
                encoder.encode_bit(false, static_model);
            }
            _ => {
                encoder.encode_adaptive_bit(true, orientation_bit);
                encoder.encode_bit(true, static_model);
            }
        }
    } else {
        encoder.encode_symbol(normal as u32, orientation);
    }
}

fn encode_patch_metadata(
    encoder: &mut ArithmeticEncoder,
    models: &mut MetadataModels,
    static_model: StaticBitModel,
    metadata: &Metadata,
    flags: crate::metadata::MetadataEnabledFlags,
) -> Result<()> {
    let mut scoped = metadata.clone();
    scoped.enabled_flags = flags;
    encode_metadata(
        &scoped,
        &mut ArithmeticMetadataSink {
            encoder,
            models,
            static_model,
        },
    )
}

fn field_width(values: impl Iterator<Item = u32>) -> u8 {
    fixed_length_bit_count(values.max().unwrap_or(0) + 1) as u8
}

/// Write the intra plain-stream widths and encode the patch list
///
/// Returns after the per-patch data is in `encoder`; the caller closes the
/// segment once block-to-patch and occupancy follow it.
pub(crate) fn encode_intra_patches(
    writer: &mut BitstreamWriter,
    encoder: &mut ArithmeticEncoder,
    frame: &FrameContext,
    config: &FrameCodingConfig,
) -> Result<()> {
    let patches = &frame.patches;
    let bit_counts = [
        field_width(patches.iter().map(|p| p.u0)),
        field_width(patches.iter().map(|p| p.v0)),
        field_width(patches.iter().map(|p| p.u1)),
        field_width(patches.iter().map(|p| p.v1)),
        field_width(patches.iter().map(|p| p.d1)),
    ];
    let lod_bit_count = field_width(patches.iter().map(|p| p.lod));
    for count in bit_counts {
        writer.write_u8(count);
    }
    writer.write_u8(lod_bit_count);

    let static_model = StaticBitModel::new();
    let mut metadata_models = MetadataModels::new();
    encode_patch_metadata(
        encoder,
        &mut metadata_models,
        static_model,
        &frame.frame_metadata,
        config.frame_metadata_flags,
    )?;

    let mut size_u0_model = AdaptiveBitModel::new();
    let mut size_v0_model = AdaptiveBitModel::new();
    let mut orientation_bit = AdaptiveBitModel::new();
    let mut orientation = AdaptiveDataModel::new(4);

    let mut prev_size_u0: i64 = 0;
    let mut prev_size_v0: i64 = 0;
    let patch_metadata_flags = frame.frame_metadata.lower_level_flags;

    for patch in patches {
        encoder.encode_fixed_width(patch.u0, bit_counts[0] as u32, &static_model);
        encoder.encode_fixed_width(patch.v0, bit_counts[1] as u32, &static_model);
        encoder.encode_fixed_width(patch.u1, bit_counts[2] as u32, &static_model);
        encoder.encode_fixed_width(patch.v1, bit_counts[3] as u32, &static_model);
        encoder.encode_fixed_width(patch.d1, bit_counts[4] as u32, &static_model);
        encoder.encode_fixed_width(patch.lod, lod_bit_count as u32, &static_model);

        if !config.absolute_d1 && config.frame_projection_mode == 2 {
            let bit_count = fixed_length_bit_count(2 + 1);
            encoder.encode_fixed_width(patch.projection_mode as u32, bit_count, &static_model);
        }

        encoder.encode_signed_exp_golomb(
            patch.size_u0 as i64 - prev_size_u0,
            0,
            &static_model,
            &mut size_u0_model,
        );
        encoder.encode_signed_exp_golomb(
            patch.size_v0 as i64 - prev_size_v0,
            0,
            &static_model,
            &mut size_v0_model,
        );
        prev_size_u0 = patch.size_u0 as i64;
        prev_size_v0 = patch.size_v0 as i64;

        encode_normal_axis(
            encoder,
            patch.normal_axis,
            config.bin_coding,
            &static_model,
            &mut orientation_bit,
            &mut orientation,
        );
        encode_patch_metadata(
            encoder,
            &mut metadata_models,
            static_model,
            &patch.metadata,
            patch_metadata_flags,
        )?;
    }
    Ok(())
}

/// Write the inter plain-stream prefix and encode the patch list as deltas
///
/// Matched patches (a prefix of the list, marked by `best_match_index`) are
/// coded against the previous frame; the rest as fixed-width values under
/// widths derived from the matched maxima, with explicit overrides where
/// those fall short.
pub(crate) fn encode_inter_patches(
    writer: &mut BitstreamWriter,
    encoder: &mut ArithmeticEncoder,
    frame: &FrameContext,
    previous: &FrameContext,
    config: &FrameCodingConfig,
) -> Result<()> {
    let patches = &frame.patches;
    let patch_count = patches.len();
    let matched_count = patches
        .iter()
        .take_while(|p| p.best_match_index.is_some())
        .count();
    if patches[matched_count..]
        .iter()
        .any(|p| p.best_match_index.is_some())
    {
        return Err(Error::config_mismatch(
            "matched patches must form a prefix of the patch list",
        ));
    }

    // Widths the decoder will derive from the matched-patch maxima.
    let mut top_max = [0u32; 5];
    for patch in &patches[..matched_count] {
        for (max, field) in top_max
            .iter_mut()
            .zip([patch.u0, patch.v0, patch.u1, patch.v1, patch.d1])
        {
            *max = (*max).max(field);
        }
    }
    let unmatched = &patches[matched_count..];
    let mut bit_counts = [0u32; 5];
    let mut explicit = [None::<u8>; 5];
    let fields =
        |p: &Patch, i: usize| -> u32 { [p.u0, p.v0, p.u1, p.v1, p.d1][i] };
    for i in 0..5 {
        let derived = fixed_length_bit_count(top_max[i] + 1);
        let needed = field_width(unmatched.iter().map(|p| fields(p, i))) as u32;
        if needed > derived {
            explicit[i] = Some(needed as u8);
            bit_counts[i] = needed;
        } else {
            bit_counts[i] = derived;
        }
    }

    let mut flags = 0u8;
    for (i, width) in explicit.iter().enumerate() {
        if width.is_some() {
            flags |= 1 << (4 - i);
        }
    }
    writer.write_u8(flags);
    for width in explicit.into_iter().flatten() {
        writer.write_u8(width);
    }

    let static_model = StaticBitModel::new();
    let mut metadata_models = MetadataModels::new();

    let mut patch_index_model = AdaptiveBitModel::new();
    let mut u0_model = AdaptiveBitModel::new();
    let mut v0_model = AdaptiveBitModel::new();
    let mut u1_model = AdaptiveBitModel::new();
    let mut v1_model = AdaptiveBitModel::new();
    let mut d1_model = AdaptiveBitModel::new();
    let mut int_size_u0_model = AdaptiveBitModel::new();
    let mut int_size_v0_model = AdaptiveBitModel::new();
    let mut size_u0_model = AdaptiveBitModel::new();
    let mut size_v0_model = AdaptiveBitModel::new();
    let mut orientation_bit = AdaptiveBitModel::new();
    let mut orientation = AdaptiveDataModel::new(4);

    let matched_bit_count = fixed_length_bit_count(patch_count as u32);
    encoder.encode_fixed_width(matched_count as u32, matched_bit_count, &static_model);

    let mut prev_size_u0: i64 = 0;
    let mut prev_size_v0: i64 = 0;
    for (patch_index, patch) in patches[..matched_count].iter().enumerate() {
        let reference_index = patch.best_match_index.unwrap_or(0);
        let reference = previous.patches.get(reference_index).ok_or_else(|| {
            Error::ReferenceOutOfRange {
                index: reference_index as i64,
                count: previous.patches.len(),
            }
        })?;
        encoder.encode_signed_exp_golomb(
            reference_index as i64 - patch_index as i64,
            0,
            &static_model,
            &mut patch_index_model,
        );

        for (delta, model) in [
            (patch.u0 as i64 - reference.u0 as i64, &mut u0_model),
            (patch.v0 as i64 - reference.v0 as i64, &mut v0_model),
            (patch.u1 as i64 - reference.u1 as i64, &mut u1_model),
            (patch.v1 as i64 - reference.v1 as i64, &mut v1_model),
            (patch.d1 as i64 - reference.d1 as i64, &mut d1_model),
        ] {
            encoder.encode_signed_exp_golomb(delta, 0, &static_model, model);
        }
        encoder.encode_signed_exp_golomb(
            patch.size_u0 as i64 - reference.size_u0 as i64,
            0,
            &static_model,
            &mut int_size_u0_model,
        );
        encoder.encode_signed_exp_golomb(
            patch.size_v0 as i64 - reference.size_v0 as i64,
            0,
            &static_model,
            &mut int_size_v0_model,
        );
        prev_size_u0 = patch.size_u0 as i64;
        prev_size_v0 = patch.size_v0 as i64;
    }

    let patch_metadata_flags = frame.frame_metadata.lower_level_flags;
    for patch in unmatched {
        encoder.encode_fixed_width(patch.u0, bit_counts[0], &static_model);
        encoder.encode_fixed_width(patch.v0, bit_counts[1], &static_model);
        encoder.encode_fixed_width(patch.u1, bit_counts[2], &static_model);
        encoder.encode_fixed_width(patch.v1, bit_counts[3], &static_model);
        encoder.encode_fixed_width(patch.d1, bit_counts[4], &static_model);

        encoder.encode_signed_exp_golomb(
            patch.size_u0 as i64 - prev_size_u0,
            0,
            &static_model,
            &mut size_u0_model,
        );
        encoder.encode_signed_exp_golomb(
            patch.size_v0 as i64 - prev_size_v0,
            0,
            &static_model,
            &mut size_v0_model,
        );
        prev_size_u0 = patch.size_u0 as i64;
        prev_size_v0 = patch.size_v0 as i64;

        encode_normal_axis(
            encoder,
            patch.normal_axis,
            config.bin_coding,
            &static_model,
            &mut orientation_bit,
            &mut orientation,
        );
        encode_patch_metadata(
            encoder,
            &mut metadata_models,
            static_model,
            &patch.metadata,
            patch_metadata_flags,
        )?;
    }
    Ok(())
}
