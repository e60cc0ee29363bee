//! GOF header parsing

use tracing::debug;

use crate::bitstream::BitstreamReader;
use crate::context::{FrameContext, GofContext};
use crate::error::{Error, Result};
use crate::metadata::{decode_metadata, MetadataEnabledFlags, PlainMetadataSource};

/// Parse one GOF header from the stream
///
/// Returns `None` on the end-of-stream marker (group size 0). The GOF-level
/// metadata enable flags come from configuration, not from the stream.
pub(crate) fn decode_gof_header(
    reader: &mut BitstreamReader<'_>,
    gof_metadata_flags: MetadataEnabledFlags,
) -> Result<Option<GofContext>> {
    let group_size = reader.read_u8()?;
    if group_size == 0 {
        return Ok(None);
    }

    let mut context = GofContext::default();
    context.width = reader.read_u16()?;
    context.height = reader.read_u16()?;
    context.occupancy_resolution = reader.read_u8()?;
    context.occupancy_precision = reader.read_u8()?;
    // Both are divisors downstream; a zero or a non-dividing precision would
    // leave the block grid undefined.
    if context.occupancy_resolution == 0
        || context.occupancy_precision == 0
        || context.occupancy_resolution % context.occupancy_precision != 0
    {
        return Err(Error::corrupt(format!(
            "occupancy resolution {} is not a positive multiple of precision {}",
            context.occupancy_resolution, context.occupancy_precision
        )));
    }
    context.radius2_smoothing = reader.read_u8()?;
    context.neighbor_count_smoothing = reader.read_u8()?;
    context.radius2_boundary_detection = reader.read_u8()?;
    context.threshold_smoothing = reader.read_u8()?;
    context.lossless_geo = reader.read_bool()?;
    context.lossless_texture = reader.read_bool()?;
    context.no_attributes = reader.read_bool()?;
    context.lossless_geo_444 = reader.read_bool()?;
    context.use_missed_points_separate_video = reader.read_bool()?;
    context.use_occupancy_map_video = reader.read_bool()?;
    context.absolute_d1 = reader.read_bool()?;
    context.bin_arith_coding = reader.read_bool()?;
    context.model_scale = reader.read_f32()?;
    context.model_origin = [reader.read_f32()?, reader.read_f32()?, reader.read_f32()?];

    context.gof_metadata.enabled_flags = gof_metadata_flags;
    decode_metadata(&mut context.gof_metadata, &mut PlainMetadataSource { reader })?;

    context.flag_color_smoothing = reader.read_bool()?;
    if context.flag_color_smoothing {
        context.threshold_color_smoothing = reader.read_u8()?;
        context.threshold_local_entropy = reader.read_f64()?;
        context.radius2_color_smoothing = reader.read_u8()?;
        context.neighbor_count_color_smoothing = reader.read_u8()?;
    }
    if context.lossless_geo {
        context.enhanced_delta_depth = reader.read_bool()?;
    }
    context.delta_coding = reader.read_bool()?;

    context.mp_geo_width = 64;
    context.mp_att_width = 64;

    context.frames = (0..group_size as usize)
        .map(|index| FrameContext {
            index,
            ..FrameContext::default()
        })
        .collect();

    debug!(
        group_size,
        width = context.width,
        height = context.height,
        occupancy_resolution = context.occupancy_resolution,
        lossless_geo = context.lossless_geo,
        delta_coding = context.delta_coding,
        "decoded GOF header"
    );
    Ok(Some(context))
}
