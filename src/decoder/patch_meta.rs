//! Patch metadata decoding, intra and temporally-predicted
//!
//! Each frame's patch list arrives either in intra form (fixed-width fields
//! under widths declared in the plain stream) or, when delta coding is on and
//! a previous frame exists, as deltas against matched patches of that frame.
//! Both forms live inside one arithmetic segment whose byte length is
//! declared ahead of it in the plain stream.

use tracing::warn;

use crate::bitstream::BitstreamReader;
use crate::context::FrameContext;
use crate::entropy::{
    fixed_length_bit_count, AdaptiveBitModel, AdaptiveDataModel, ArithmeticDecoder,
    StaticBitModel,
};
use crate::error::{Error, Result};
use crate::metadata::{decode_metadata, ArithmeticMetadataSource, MetadataModels};

/// Frame-constant inputs to patch decoding
#[derive(Debug, Clone, Copy)]
pub(crate) struct PatchCodingConfig {
    pub occupancy_resolution: u8,
    pub absolute_d1: bool,
    pub frame_projection_mode: u8,
    /// Binary prefix-code variant of axis/candidate/run coding
    pub bin_coding: bool,
}

/// Plain-stream prefix of an intra patch segment
#[derive(Debug, Clone, Copy)]
pub(crate) struct IntraHeader {
    /// Field widths for U0, V0, U1, V1, D1
    pub bit_counts: [u8; 5],
    pub lod_bit_count: u8,
    pub compressed_size: u32,
}

pub(crate) fn read_intra_header(reader: &mut BitstreamReader<'_>) -> Result<IntraHeader> {
    let mut bit_counts = [0u8; 5];
    for count in bit_counts.iter_mut() {
        *count = reader.read_u8()?;
    }
    let lod_bit_count = reader.read_u8()?;
    let compressed_size = reader.read_u32()?;
    Ok(IntraHeader {
        bit_counts,
        lod_bit_count,
        compressed_size,
    })
}

/// Plain-stream prefix of an inter patch segment
///
/// One byte packs five presence flags (bit 4 = U0 down to bit 0 = D1); an
/// explicit width byte follows per set flag. Unset fields derive their width
/// from the matched-patch maxima instead.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InterHeader {
    pub explicit_widths: [Option<u8>; 5],
    pub compressed_size: u32,
}

pub(crate) fn read_inter_header(reader: &mut BitstreamReader<'_>) -> Result<InterHeader> {
    let flags = reader.read_u8()?;
    let mut explicit_widths = [None; 5];
    for (i, width) in explicit_widths.iter_mut().enumerate() {
        if (flags >> (4 - i)) & 1 != 0 {
            *width = Some(reader.read_u8()?);
        }
    }
    let compressed_size = reader.read_u32()?;
    Ok(InterHeader {
        explicit_widths,
        compressed_size,
    })
}

/// Decode a projection normal axis (ternary symbol, or 1/2-bit prefix code)
pub(crate) fn decode_normal_axis(
    decoder: &mut ArithmeticDecoder<'_>,
    bin_coding: bool,
    static_model: &StaticBitModel,
    orientation_bit: &mut AdaptiveBitModel,
    orientation: &mut AdaptiveDataModel,
) -> u8 {
    if bin_coding {
        if !decoder.decode_adaptive_bit(orientation_bit) {
            0
        } else if !decoder.decode_bit(static_model) {
            1
        } else {
            2
        }
    } else {
        decoder.decode_symbol(orientation) as u8
    }
}

/// Resolve a patch's projection mode from the frame-wide mode
fn decode_projection_mode(
    decoder: &mut ArithmeticDecoder<'_>,
    frame_projection_mode: u8,
    static_model: &StaticBitModel,
) -> Result<u8> {
    match frame_projection_mode {
        0 => Ok(0),
        1 => Ok(1),
        2 => {
            let bit_count = fixed_length_bit_count(2 + 1);
            Ok(decoder.decode_fixed_width(bit_count, static_model)? as u8)
        }
        mode => {
            warn!(mode, "undefined frame projection mode, using projection 0");
            Ok(0)
        }
    }
}

/// Decode an intra patch segment: frame metadata, then every patch
///
/// `frame.patches` must already be sized to the declared patch count and
/// `frame.frame_metadata.enabled_flags` set from the GOF level.
pub(crate) fn decode_intra_patches(
    decoder: &mut ArithmeticDecoder<'_>,
    frame: &mut FrameContext,
    header: &IntraHeader,
    config: &PatchCodingConfig,
) -> Result<()> {
    let static_model = StaticBitModel::new();
    let mut metadata_models = MetadataModels::new();

    decode_metadata(
        &mut frame.frame_metadata,
        &mut ArithmeticMetadataSource {
            decoder,
            models: &mut metadata_models,
            static_model,
        },
    )?;

    let mut size_u0_model = AdaptiveBitModel::new();
    let mut size_v0_model = AdaptiveBitModel::new();
    let mut orientation_bit = AdaptiveBitModel::new();
    let mut orientation = AdaptiveDataModel::new(4);

    let mut prev_size_u0: i64 = 0;
    let mut prev_size_v0: i64 = 0;
    let patch_metadata_flags = frame.frame_metadata.lower_level_flags;

    for patch in frame.patches.iter_mut() {
        patch.occupancy_resolution = config.occupancy_resolution as u32;

        patch.u0 = decoder.decode_fixed_width(header.bit_counts[0] as u32, &static_model)?;
        patch.v0 = decoder.decode_fixed_width(header.bit_counts[1] as u32, &static_model)?;
        patch.u1 = decoder.decode_fixed_width(header.bit_counts[2] as u32, &static_model)?;
        patch.v1 = decoder.decode_fixed_width(header.bit_counts[3] as u32, &static_model)?;
        patch.d1 = decoder.decode_fixed_width(header.bit_counts[4] as u32, &static_model)?;
        patch.lod = decoder.decode_fixed_width(header.lod_bit_count as u32, &static_model)?;

        if !config.absolute_d1 {
            patch.frame_projection_mode = config.frame_projection_mode;
            patch.projection_mode =
                decode_projection_mode(decoder, config.frame_projection_mode, &static_model)?;
        } else {
            patch.frame_projection_mode = 0;
            patch.projection_mode = 0;
        }

        let delta_size_u0 =
            decoder.decode_signed_exp_golomb(0, &static_model, &mut size_u0_model)?;
        let delta_size_v0 =
            decoder.decode_signed_exp_golomb(0, &static_model, &mut size_v0_model)?;
        let size_u0 = prev_size_u0 + delta_size_u0;
        let size_v0 = prev_size_v0 + delta_size_v0;
        if size_u0 < 0 || size_v0 < 0 {
            return Err(Error::corrupt(format!(
                "negative patch size ({size_u0}, {size_v0})"
            )));
        }
        patch.size_u0 = size_u0 as u32;
        patch.size_v0 = size_v0 as u32;
        prev_size_u0 = size_u0;
        prev_size_v0 = size_v0;

        let normal = decode_normal_axis(
            decoder,
            config.bin_coding,
            &static_model,
            &mut orientation_bit,
            &mut orientation,
        );
        patch.set_axes(normal);

        patch.metadata.enabled_flags = patch_metadata_flags;
        decode_metadata(
            &mut patch.metadata,
            &mut ArithmeticMetadataSource {
                decoder,
                models: &mut metadata_models,
                static_model,
            },
        )?;
    }
    Ok(())
}

/// Decode an inter patch segment against the previous frame's patch list
pub(crate) fn decode_inter_patches(
    decoder: &mut ArithmeticDecoder<'_>,
    frame: &mut FrameContext,
    previous: &FrameContext,
    header: &InterHeader,
    config: &PatchCodingConfig,
) -> Result<()> {
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

    let patch_count = frame.patches.len();
    let matched_bit_count = fixed_length_bit_count(patch_count as u32);
    let matched_count =
        decoder.decode_fixed_width(matched_bit_count, &static_model)? as usize;
    if matched_count > patch_count {
        return Err(Error::corrupt(format!(
            "matched patch count {matched_count} exceeds patch count {patch_count}"
        )));
    }

    let mut top_max = [0u32; 5];
    let mut prev_size_u0: i64 = 0;
    let mut prev_size_v0: i64 = 0;

    for patch_index in 0..matched_count {
        let patch = &mut frame.patches[patch_index];
        patch.occupancy_resolution = config.occupancy_resolution as u32;

        let delta_index =
            decoder.decode_signed_exp_golomb(0, &static_model, &mut patch_index_model)?;
        let reference_index = delta_index + patch_index as i64;
        if reference_index < 0 || reference_index as usize >= previous.patches.len() {
            return Err(Error::ReferenceOutOfRange {
                index: reference_index,
                count: previous.patches.len(),
            });
        }
        let reference = &previous.patches[reference_index as usize];
        patch.best_match_index = Some(reference_index as usize);

        let delta_u0 = decoder.decode_signed_exp_golomb(0, &static_model, &mut u0_model)?;
        let delta_v0 = decoder.decode_signed_exp_golomb(0, &static_model, &mut v0_model)?;
        let delta_u1 = decoder.decode_signed_exp_golomb(0, &static_model, &mut u1_model)?;
        let delta_v1 = decoder.decode_signed_exp_golomb(0, &static_model, &mut v1_model)?;
        let delta_d1 = decoder.decode_signed_exp_golomb(0, &static_model, &mut d1_model)?;
        let delta_size_u0 =
            decoder.decode_signed_exp_golomb(0, &static_model, &mut int_size_u0_model)?;
        let delta_size_v0 =
            decoder.decode_signed_exp_golomb(0, &static_model, &mut int_size_v0_model)?;

        let fields = [
            delta_u0 + reference.u0 as i64,
            delta_v0 + reference.v0 as i64,
            delta_u1 + reference.u1 as i64,
            delta_v1 + reference.v1 as i64,
            delta_d1 + reference.d1 as i64,
        ];
        let size_u0 = delta_size_u0 + reference.size_u0 as i64;
        let size_v0 = delta_size_v0 + reference.size_v0 as i64;
        if fields.iter().any(|&f| f < 0) || size_u0 < 0 || size_v0 < 0 {
            return Err(Error::corrupt(
                "matched patch delta produced a negative field",
            ));
        }

        patch.u0 = fields[0] as u32;
        patch.v0 = fields[1] as u32;
        patch.u1 = fields[2] as u32;
        patch.v1 = fields[3] as u32;
        patch.d1 = fields[4] as u32;
        patch.size_u0 = size_u0 as u32;
        patch.size_v0 = size_v0 as u32;
        for (max, field) in top_max.iter_mut().zip(fields) {
            *max = (*max).max(field as u32);
        }
        prev_size_u0 = size_u0;
        prev_size_v0 = size_v0;

        patch.normal_axis = reference.normal_axis;
        patch.tangent_axis = reference.tangent_axis;
        patch.bitangent_axis = reference.bitangent_axis;
    }

    // Unset widths derive from the matched-patch maxima.
    let mut bit_counts = [0u32; 5];
    for i in 0..5 {
        bit_counts[i] = match header.explicit_widths[i] {
            Some(width) => width as u32,
            None => fixed_length_bit_count(top_max[i] + 1),
        };
    }

    let patch_metadata_flags = frame.frame_metadata.lower_level_flags;
    for patch in frame.patches.iter_mut().skip(matched_count) {
        patch.occupancy_resolution = config.occupancy_resolution as u32;

        patch.u0 = decoder.decode_fixed_width(bit_counts[0], &static_model)?;
        patch.v0 = decoder.decode_fixed_width(bit_counts[1], &static_model)?;
        patch.u1 = decoder.decode_fixed_width(bit_counts[2], &static_model)?;
        patch.v1 = decoder.decode_fixed_width(bit_counts[3], &static_model)?;
        patch.d1 = decoder.decode_fixed_width(bit_counts[4], &static_model)?;

        let delta_size_u0 =
            decoder.decode_signed_exp_golomb(0, &static_model, &mut size_u0_model)?;
        let delta_size_v0 =
            decoder.decode_signed_exp_golomb(0, &static_model, &mut size_v0_model)?;
        let size_u0 = prev_size_u0 + delta_size_u0;
        let size_v0 = prev_size_v0 + delta_size_v0;
        if size_u0 < 0 || size_v0 < 0 {
            return Err(Error::corrupt(format!(
                "negative patch size ({size_u0}, {size_v0})"
            )));
        }
        patch.size_u0 = size_u0 as u32;
        patch.size_v0 = size_v0 as u32;
        prev_size_u0 = size_u0;
        prev_size_v0 = size_v0;

        let normal = decode_normal_axis(
            decoder,
            config.bin_coding,
            &static_model,
            &mut orientation_bit,
            &mut orientation,
        );
        patch.set_axes(normal);

        patch.metadata.enabled_flags = patch_metadata_flags;
        decode_metadata(
            &mut patch.metadata,
            &mut ArithmeticMetadataSource {
                decoder,
                models: &mut metadata_models,
                static_model,
            },
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::BitstreamWriter;

    #[test]
    fn test_inter_header_flag_packing() {
        // Bit 4 = U0 ... bit 0 = D1; widths follow in field order.
        let mut writer = BitstreamWriter::new();
        writer.write_u8(0b10001);
        writer.write_u8(7); // U0 width
        writer.write_u8(9); // D1 width
        writer.write_u32(123);
        let data = writer.into_inner();

        let mut reader = BitstreamReader::new(&data);
        let header = read_inter_header(&mut reader).unwrap();
        assert_eq!(header.explicit_widths, [Some(7), None, None, None, Some(9)]);
        assert_eq!(header.compressed_size, 123);
    }

    #[test]
    fn test_intra_header_field_order() {
        let mut writer = BitstreamWriter::new();
        for w in [3u8, 4, 5, 6, 7, 2] {
            writer.write_u8(w);
        }
        writer.write_u32(64);
        let data = writer.into_inner();

        let mut reader = BitstreamReader::new(&data);
        let header = read_intra_header(&mut reader).unwrap();
        assert_eq!(header.bit_counts, [3, 4, 5, 6, 7]);
        assert_eq!(header.lod_bit_count, 2);
        assert_eq!(header.compressed_size, 64);
    }
}
