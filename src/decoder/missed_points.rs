//! Missed-points side-channel headers and sample extraction

use tracing::debug;

use crate::bitstream::BitstreamReader;
use crate::context::GofContext;
use crate::error::{Error, Result};
use crate::video::VideoSequence;

/// Rows needed for `sample_count` samples of `components` values each at the
/// given side-video width, rounded up to a multiple of 8
pub(crate) fn side_video_height(
    sample_count: usize,
    width: usize,
    components: usize,
) -> usize {
    let rows = (sample_count * components).div_ceil(width);
    rows.div_ceil(8) * 8
}

/// Read the geometry side-video header: shared width, per-frame counts
pub(crate) fn read_geometry_header(
    context: &mut GofContext,
    reader: &mut BitstreamReader<'_>,
) -> Result<()> {
    let width = reader.read_u64()? as usize;
    if width == 0 {
        return Err(Error::corrupt("missed-points side video width is zero"));
    }
    let components = if context.lossless_geo_444 { 1 } else { 3 };
    let mut max_height = 0usize;
    for frame in context.frames.iter_mut() {
        let count = reader.read_u64()? as usize;
        frame.missed_points_patch.resize_geometry(count);
        max_height = max_height.max(side_video_height(count, width, components));
    }
    context.mp_geo_width = width;
    context.mp_geo_height = max_height;
    debug!(width, height = max_height, "missed-points geometry header");
    Ok(())
}

/// Read the texture side-video header: shared width, per-frame counts
pub(crate) fn read_texture_header(
    context: &mut GofContext,
    reader: &mut BitstreamReader<'_>,
) -> Result<()> {
    let width = reader.read_u64()? as usize;
    if width == 0 {
        return Err(Error::corrupt("missed-points side video width is zero"));
    }
    let mut max_height = 0usize;
    for frame in context.frames.iter_mut() {
        let count = reader.read_u64()? as usize;
        frame.missed_points_patch.resize_color(count);
        max_height = max_height.max(side_video_height(count, width, 1));
    }
    context.mp_att_width = width;
    context.mp_att_height = max_height;
    debug!(width, height = max_height, "missed-points texture header");
    Ok(())
}

fn check_dimensions(
    video: &VideoSequence,
    width: usize,
    height: usize,
    what: &str,
) -> Result<()> {
    if video.width() != width || video.height() != height {
        return Err(Error::config_mismatch(format!(
            "{what} side video is {}x{}, header declared {width}x{height}",
            video.width(),
            video.height()
        )));
    }
    Ok(())
}

/// Pull geometry samples back out of the decoded side video
///
/// 4:4:4 lossless layout replicates a single channel into x/y/z; the packed
/// layout stores the three coordinates at raster offsets 0, count, 2*count.
pub(crate) fn extract_geometry(context: &mut GofContext) -> Result<()> {
    let video = context
        .mp_geometry_video
        .as_ref()
        .ok_or_else(|| Error::config_mismatch("missed-points geometry video not decoded"))?;
    check_dimensions(video, context.mp_geo_width, context.mp_geo_height, "geometry")?;
    let lossless_444 = context.lossless_geo_444;

    for frame in context.frames.iter_mut() {
        let image = video.frame(frame.index);
        let width = image.width();
        let patch = &mut frame.missed_points_patch;
        let count = patch.count;
        if count > 0 {
            let last = if lossless_444 { count - 1 } else { 3 * count - 1 };
            if last / width >= image.height() {
                return Err(Error::config_mismatch(format!(
                    "{count} missed points do not fit the {width}x{} side video",
                    image.height()
                )));
            }
        }
        for i in 0..count {
            if lossless_444 {
                let value = image.value(0, i % width, i / width);
                patch.x[i] = value;
                patch.y[i] = value;
                patch.z[i] = value;
            } else {
                patch.x[i] = image.value(0, i % width, i / width);
                patch.y[i] = image.value(0, (count + i) % width, (count + i) / width);
                patch.z[i] =
                    image.value(0, (2 * count + i) % width, (2 * count + i) / width);
            }
        }
    }
    Ok(())
}

/// Pull color samples back out of the decoded side video
pub(crate) fn extract_texture(context: &mut GofContext) -> Result<()> {
    let video = context
        .mp_texture_video
        .as_ref()
        .ok_or_else(|| Error::config_mismatch("missed-points texture video not decoded"))?;
    check_dimensions(video, context.mp_att_width, context.mp_att_height, "texture")?;

    for frame in context.frames.iter_mut() {
        let image = video.frame(frame.index);
        let width = image.width();
        let patch = &mut frame.missed_points_patch;
        let count = patch.color_count;
        if count > 0 && (count - 1) / width >= image.height() {
            return Err(Error::config_mismatch(format!(
                "{count} missed-point colors do not fit the {width}x{} side video",
                image.height()
            )));
        }
        for i in 0..count {
            patch.r[i] = image.value(0, i % width, i / width);
            patch.g[i] = image.value(1, i % width, i / width);
            patch.b[i] = image.value(2, i % width, i / width);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FrameContext;
    use crate::video::Image;

    fn texture_context(width: usize, height: usize, color_count: usize) -> GofContext {
        let mut context = GofContext {
            mp_att_width: width,
            mp_att_height: height,
            frames: vec![FrameContext::default()],
            ..GofContext::default()
        };
        context.frames[0].missed_points_patch.resize_color(color_count);
        context.mp_texture_video = Some(VideoSequence::new(vec![Image::new(width, height)]));
        context
    }

    #[test]
    fn test_texture_count_overflowing_side_video_rejected() {
        // 100 colors cannot fit a 4x8 image; the extractor must refuse
        // instead of reading past the raster.
        let mut context = texture_context(4, 8, 100);
        assert!(extract_texture(&mut context).is_err());
    }

    #[test]
    fn test_texture_count_within_side_video_extracts() {
        let mut context = texture_context(4, 8, 32);
        extract_texture(&mut context).unwrap();
        assert_eq!(context.frames[0].missed_points_patch.r.len(), 32);
    }

    #[test]
    fn test_side_video_height_rounds_to_eight() {
        // 100 samples * 3 components at width 64: ceil(300/64) = 5 -> 8 rows.
        assert_eq!(side_video_height(100, 64, 3), 8);
        assert_eq!(side_video_height(0, 64, 3), 0);
        assert_eq!(side_video_height(512, 64, 1), 8);
        assert_eq!(side_video_height(513, 64, 1), 16);
    }
}
