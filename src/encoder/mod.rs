//! Patch/occupancy protocol encoder
//!
//! Writes the exact stream the decoder consumes: GOF header, per-frame patch
//! and occupancy segments, and the missed-points side-channel headers. Pixel
//! video sub-streams are produced by external encoders and spliced in by the
//! caller at the same positions the decoder consumes them.

mod occupancy;
mod patch_meta;

use tracing::debug;

use crate::bitstream::BitstreamWriter;
use crate::context::{FrameContext, GofContext};
use crate::decoder::block_to_patch::build_candidate_lists;
use crate::entropy::ArithmeticEncoder;
use crate::error::{Error, Result};
use crate::metadata::{encode_metadata, MetadataEnabledFlags, PlainMetadataSink};

/// Encoder configuration
#[derive(Debug, Clone)]
pub struct EncoderParams {
    /// Surface thickness signalled per frame when depth is not absolute
    pub surface_thickness: u8,
    /// Frame-wide projection mode signalled when depth is not absolute
    pub frame_projection_mode: u8,
}

impl Default for EncoderParams {
    fn default() -> Self {
        EncoderParams {
            surface_thickness: 4,
            frame_projection_mode: 0,
        }
    }
}

/// Protocol encoder for the patch/occupancy bitstream
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    params: EncoderParams,
}

/// Frame-constant inputs to patch encoding
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameCodingConfig {
    pub absolute_d1: bool,
    pub frame_projection_mode: u8,
    pub bin_coding: bool,
    pub frame_metadata_flags: MetadataEnabledFlags,
}

/// Write one GOF header (mirror of the decoding order)
pub(crate) fn write_gof_header(
    context: &GofContext,
    writer: &mut BitstreamWriter,
) -> Result<()> {
    let group_size = context.frames.len();
    if group_size == 0 || group_size > u8::MAX as usize {
        return Err(Error::config_mismatch(format!(
            "GOF size {group_size} not representable"
        )));
    }
    writer.write_u8(group_size as u8);
    writer.write_u16(context.width);
    writer.write_u16(context.height);
    writer.write_u8(context.occupancy_resolution);
    writer.write_u8(context.occupancy_precision);
    writer.write_u8(context.radius2_smoothing);
    writer.write_u8(context.neighbor_count_smoothing);
    writer.write_u8(context.radius2_boundary_detection);
    writer.write_u8(context.threshold_smoothing);
    writer.write_bool(context.lossless_geo);
    writer.write_bool(context.lossless_texture);
    writer.write_bool(context.no_attributes);
    writer.write_bool(context.lossless_geo_444);
    writer.write_bool(context.use_missed_points_separate_video);
    writer.write_bool(context.use_occupancy_map_video);
    writer.write_bool(context.absolute_d1);
    writer.write_bool(context.bin_arith_coding);
    writer.write_f32(context.model_scale);
    for origin in context.model_origin {
        writer.write_f32(origin);
    }
    encode_metadata(&context.gof_metadata, &mut PlainMetadataSink { writer })?;
    writer.write_bool(context.flag_color_smoothing);
    if context.flag_color_smoothing {
        writer.write_u8(context.threshold_color_smoothing);
        writer.write_f64(context.threshold_local_entropy);
        writer.write_u8(context.radius2_color_smoothing);
        writer.write_u8(context.neighbor_count_color_smoothing);
    }
    if context.lossless_geo {
        writer.write_bool(context.enhanced_delta_depth);
    }
    writer.write_bool(context.delta_coding);
    Ok(())
}

impl Encoder {
    pub fn new(params: EncoderParams) -> Self {
        Encoder { params }
    }

    /// Write one GOF's metadata protocol (header, frame segments, missed-points
    /// headers) in stream order
    pub fn write_gof(&self, context: &GofContext, writer: &mut BitstreamWriter) -> Result<()> {
        write_gof_header(context, writer)?;

        for i in 0..context.frames.len() {
            let previous = if i > 0 { Some(&context.frames[i - 1]) } else { None };
            self.write_frame_segment(context, &context.frames[i], previous, writer)?;
        }

        if context.lossless_geo && context.use_missed_points_separate_video {
            write_missed_points_geometry_header(context, writer);
        }
        if !context.no_attributes
            && context.lossless_texture
            && context.use_missed_points_separate_video
        {
            write_missed_points_texture_header(context, writer);
        }
        Ok(())
    }

    /// Write the end-of-stream marker (a zero group size)
    pub fn write_end_of_stream(&self, writer: &mut BitstreamWriter) {
        writer.write_u8(0);
    }

    fn write_frame_segment(
        &self,
        context: &GofContext,
        frame: &FrameContext,
        previous: Option<&FrameContext>,
        writer: &mut BitstreamWriter,
    ) -> Result<()> {
        let video_derived = context.use_occupancy_map_video;
        let grid_width = context.block_to_patch_width();
        let grid_height = context.block_to_patch_height();
        let occupancy_resolution = context.occupancy_resolution as usize;
        let occupancy_precision = context.occupancy_precision as usize;

        writer.write_u32(frame.patches.len() as u32);
        if !video_derived {
            writer.write_u8(context.occupancy_precision);
        }
        let bin_coding = context.bin_arith_coding
            && !context.lossless_geo
            && occupancy_resolution == 16
            && occupancy_precision == 4;
        let max_candidate_count =
            occupancy::max_candidate_count(&frame.patches, grid_width, grid_height, bin_coding)?;
        writer.write_u8(max_candidate_count as u8);
        if !context.absolute_d1 {
            writer.write_u8(self.params.surface_thickness);
            writer.write_u8(self.params.frame_projection_mode);
        }

        let config = FrameCodingConfig {
            absolute_d1: context.absolute_d1,
            frame_projection_mode: self.params.frame_projection_mode,
            bin_coding,
            frame_metadata_flags: context.gof_metadata.lower_level_flags,
        };

        if frame.occupancy_map.len() != context.width as usize * context.height as usize {
            return Err(Error::config_mismatch(format!(
                "frame {} occupancy map has {} cells, expected {}x{}",
                frame.index,
                frame.occupancy_map.len(),
                context.width,
                context.height
            )));
        }
        let block_to_patch = resolve_block_to_patch(frame, grid_width, grid_height)?;
        let mut encoder = ArithmeticEncoder::new();
        let intra = previous.is_none() || !context.delta_coding;
        if intra {
            patch_meta::encode_intra_patches(writer, &mut encoder, frame, &config)?;
        } else {
            let previous = previous.expect("inter mode requires a previous frame");
            patch_meta::encode_inter_patches(writer, &mut encoder, frame, previous, &config)?;
        }

        if video_derived {
            occupancy::encode_block_to_patch_from_occupancy(
                &mut encoder,
                &frame.patches,
                &block_to_patch,
                &frame.occupancy_map,
                context.width as usize,
                grid_width,
                grid_height,
                occupancy_resolution,
                max_candidate_count,
                bin_coding,
            )?;
        } else {
            occupancy::encode_block_to_patch(
                &mut encoder,
                &frame.patches,
                &block_to_patch,
                grid_width,
                grid_height,
                max_candidate_count,
                bin_coding,
            )?;
            occupancy::encode_occupancy_map(
                &mut encoder,
                &block_to_patch,
                &frame.occupancy_map,
                context.width as usize,
                grid_width,
                grid_height,
                occupancy_resolution,
                occupancy_precision,
                bin_coding,
            )?;
        }

        let segment = encoder.finish();
        writer.write_u32(segment.len() as u32);
        writer.write_bytes(&segment);
        debug!(
            frame = frame.index,
            patch_count = frame.patches.len(),
            intra,
            segment_bytes = segment.len(),
            "encoded frame segment"
        );
        Ok(())
    }
}

/// The frame's block-to-patch map, or the default deepest-candidate
/// assignment when the caller did not provide one
fn resolve_block_to_patch(
    frame: &FrameContext,
    grid_width: usize,
    grid_height: usize,
) -> Result<Vec<usize>> {
    if frame.block_to_patch.len() == grid_width * grid_height {
        return Ok(frame.block_to_patch.clone());
    }
    if !frame.block_to_patch.is_empty() {
        return Err(Error::config_mismatch(format!(
            "block-to-patch map has {} entries, grid is {}x{}",
            frame.block_to_patch.len(),
            grid_width,
            grid_height
        )));
    }
    let candidates = build_candidate_lists(&frame.patches, grid_width, grid_height, true)?;
    Ok(candidates.iter().map(|list| list[0]).collect())
}

fn write_missed_points_geometry_header(context: &GofContext, writer: &mut BitstreamWriter) {
    writer.write_u64(context.mp_geo_width as u64);
    for frame in &context.frames {
        writer.write_u64(frame.missed_points_patch.count as u64);
    }
}

fn write_missed_points_texture_header(context: &GofContext, writer: &mut BitstreamWriter) {
    writer.write_u64(context.mp_att_width as u64);
    for frame in &context.frames {
        writer.write_u64(frame.missed_points_patch.color_count as u64);
    }
}
