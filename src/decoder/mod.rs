//! Patch/occupancy protocol decoder
//!
//! [`Decoder::decode_gof`] pulls one group of frames off the stream: header,
//! per-frame patch/occupancy segments (strictly in frame order, since inter
//! prediction reads the previous frame's finalized patch list), the video
//! sub-streams consumed through the [`VideoDecoder`] collaborator, and the
//! missed-points side channels. The fully decoded context is then handed to
//! the reconstruction and coloring collaborators.

pub(crate) mod block_to_patch;
mod header;
mod missed_points;
pub(crate) mod occupancy;
mod patch_meta;

use tracing::{debug, info, warn};

use crate::bitstream::BitstreamReader;
use crate::context::{FrameContext, GofContext};
use crate::entropy::ArithmeticDecoder;
use crate::error::{Error, Result};
use crate::metadata::MetadataEnabledFlags;
use crate::patch::Patch;
use crate::reconstruct::{PointCloudColorizer, PointCloudReconstructor, ReconstructionParams};
use crate::video::{occupancy_maps_from_video, VideoDecoder, VideoStreamKind, VideoStreamSpec};

use patch_meta::PatchCodingConfig;

/// Decoder configuration
///
/// The GOF-level metadata enable flags are configuration shared with the
/// encoder, not part of the stream.
#[derive(Debug, Clone, Default)]
pub struct DecoderParams {
    pub gof_metadata_flags: MetadataEnabledFlags,
}

/// Protocol decoder for the patch/occupancy bitstream
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    params: DecoderParams,
}

/// GOF-constant scalars threaded through the per-frame segment decode
#[derive(Debug, Clone, Copy)]
struct SequencerConfig {
    width: usize,
    height: usize,
    occupancy_resolution: usize,
    occupancy_precision: u8,
    lossless_geo: bool,
    absolute_d1: bool,
    bin_arith_coding: bool,
    delta_coding: bool,
    frame_metadata_flags: MetadataEnabledFlags,
}

impl Decoder {
    pub fn new(params: DecoderParams) -> Self {
        Decoder { params }
    }

    /// Decode one GOF; `Ok(None)` is the end-of-stream marker
    pub fn decode_gof(
        &self,
        reader: &mut BitstreamReader<'_>,
        video_decoder: &mut dyn VideoDecoder,
        reconstructor: &mut dyn PointCloudReconstructor,
        colorizer: &mut dyn PointCloudColorizer,
    ) -> Result<Option<GofContext>> {
        let Some(mut context) =
            header::decode_gof_header(reader, self.params.gof_metadata_flags)?
        else {
            return Ok(None);
        };
        let mut surface_thickness = 4u8;

        if context.use_occupancy_map_video {
            self.decode_occupancy_video(reader, video_decoder, &mut context)?;
        }
        self.decode_frame_segments(reader, &mut context, &mut surface_thickness)?;
        self.decode_geometry_video(reader, video_decoder, &mut context)?;

        if context.lossless_geo && context.use_missed_points_separate_video {
            missed_points::read_geometry_header(&mut context, reader)?;
            let video = video_decoder.decompress(
                reader,
                &VideoStreamSpec {
                    kind: VideoStreamKind::MissedPointsGeometry,
                    width: context.mp_geo_width,
                    height: context.mp_geo_height,
                    frame_count: context.size(),
                    lossless_444: false,
                    bytes_per_sample: 2,
                },
            )?;
            context.mp_geometry_video = Some(video);
            missed_points::extract_geometry(&mut context)?;
        }

        let params = ReconstructionParams::from_context(&context, surface_thickness);
        reconstructor.generate_point_cloud(&context, &params)?;

        if !context.no_attributes {
            let video = video_decoder.decompress(
                reader,
                &VideoStreamSpec {
                    kind: VideoStreamKind::Texture,
                    width: context.width as usize,
                    height: context.height as usize,
                    frame_count: context.size() * 2,
                    lossless_444: false,
                    bytes_per_sample: 1,
                },
            )?;
            context.texture_video = Some(video);

            if context.lossless_texture && context.use_missed_points_separate_video {
                missed_points::read_texture_header(&mut context, reader)?;
                let video = video_decoder.decompress(
                    reader,
                    &VideoStreamSpec {
                        kind: VideoStreamKind::MissedPointsTexture,
                        width: context.mp_att_width,
                        height: context.mp_att_height,
                        frame_count: context.size(),
                        lossless_444: false,
                        bytes_per_sample: 1,
                    },
                )?;
                context.mp_texture_video = Some(video);
                missed_points::extract_texture(&mut context)?;
            }
        }
        colorizer.color_point_cloud(&context, context.no_attributes, &params)?;

        info!(
            frames = context.size(),
            patches = context.frames.iter().map(|f| f.patches.len()).sum::<usize>(),
            "decoded GOF"
        );
        Ok(Some(context))
    }

    fn decode_occupancy_video(
        &self,
        reader: &mut BitstreamReader<'_>,
        video_decoder: &mut dyn VideoDecoder,
        context: &mut GofContext,
    ) -> Result<()> {
        let precision = context.occupancy_precision as usize;
        let width = context.width as usize / precision;
        let height = context.height as usize / precision;
        let video = video_decoder.decompress(
            reader,
            &VideoStreamSpec {
                kind: VideoStreamKind::OccupancyMap,
                width,
                height,
                frame_count: context.size(),
                lossless_444: false,
                bytes_per_sample: 1,
            },
        )?;
        if video.frame_count() < context.size()
            || video.width() != width
            || video.height() != height
        {
            return Err(Error::config_mismatch(format!(
                "occupancy video is {}x{} with {} frames, expected {width}x{height} with {}",
                video.width(),
                video.height(),
                video.frame_count(),
                context.size()
            )));
        }

        let maps = occupancy_maps_from_video(
            &video,
            context.width as usize,
            context.height as usize,
            precision,
        );
        for (frame, map) in context.frames.iter_mut().zip(maps) {
            frame.occupancy_map = map;
        }
        context.occupancy_video = Some(video);
        Ok(())
    }

    fn decode_frame_segments(
        &self,
        reader: &mut BitstreamReader<'_>,
        context: &mut GofContext,
        surface_thickness: &mut u8,
    ) -> Result<()> {
        let config = SequencerConfig {
            width: context.width as usize,
            height: context.height as usize,
            occupancy_resolution: context.occupancy_resolution as usize,
            occupancy_precision: context.occupancy_precision,
            lossless_geo: context.lossless_geo,
            absolute_d1: context.absolute_d1,
            bin_arith_coding: context.bin_arith_coding,
            delta_coding: context.delta_coding,
            frame_metadata_flags: context.gof_metadata.lower_level_flags,
        };
        let video_derived = context.use_occupancy_map_video;
        let fold_missed_points = !video_derived
            && context.lossless_geo
            && !context.use_missed_points_separate_video;

        for i in 0..context.frames.len() {
            let (done, rest) = context.frames.split_at_mut(i);
            let frame = &mut rest[0];
            let previous = done.last();
            decode_frame_segment(reader, frame, previous, &config, surface_thickness, video_derived)?;

            if fold_missed_points {
                // The last decoded patch is the missed-points placeholder.
                let dummy = frame.patches.pop().ok_or_else(|| {
                    Error::corrupt("lossless frame carries no missed-points placeholder patch")
                })?;
                let mp = &mut frame.missed_points_patch;
                mp.u0 = dummy.u0;
                mp.v0 = dummy.v0;
                mp.size_u0 = dummy.size_u0;
                mp.size_v0 = dummy.size_v0;
                mp.occupancy_resolution = dummy.occupancy_resolution;
            }
        }
        Ok(())
    }

    fn decode_geometry_video(
        &self,
        reader: &mut BitstreamReader<'_>,
        video_decoder: &mut dyn VideoDecoder,
        context: &mut GofContext,
    ) -> Result<()> {
        let lossless_444 = context.lossless_geo && context.lossless_geo_444;
        let bytes_per_sample = if context.lossless_geo { 2 } else { 1 };
        let width = context.width as usize;
        let height = context.height as usize;
        if context.absolute_d1 {
            let video = video_decoder.decompress(
                reader,
                &VideoStreamSpec {
                    kind: VideoStreamKind::Geometry,
                    width,
                    height,
                    frame_count: context.size() * 2,
                    lossless_444,
                    bytes_per_sample,
                },
            )?;
            context.geometry_video = Some(video);
        } else {
            // Separate near (D0) and far (D1) streams.
            let d0 = video_decoder.decompress(
                reader,
                &VideoStreamSpec {
                    kind: VideoStreamKind::Geometry,
                    width,
                    height,
                    frame_count: context.size(),
                    lossless_444,
                    bytes_per_sample,
                },
            )?;
            let d1 = video_decoder.decompress(
                reader,
                &VideoStreamSpec {
                    kind: VideoStreamKind::GeometryD1,
                    width,
                    height,
                    frame_count: context.size(),
                    lossless_444,
                    bytes_per_sample,
                },
            )?;
            context.geometry_video = Some(d0);
            context.geometry_d1_video = Some(d1);
        }
        Ok(())
    }
}

/// Decode one frame's patch/occupancy segment
fn decode_frame_segment(
    reader: &mut BitstreamReader<'_>,
    frame: &mut FrameContext,
    previous: Option<&FrameContext>,
    config: &SequencerConfig,
    surface_thickness: &mut u8,
    video_derived: bool,
) -> Result<()> {
    frame.frame_metadata.enabled_flags = config.frame_metadata_flags;

    let patch_count = reader.read_u32()? as usize;
    frame.patches = vec![Patch::default(); patch_count];

    // The run-length path re-states the precision per frame; the video path
    // inherits it from the header.
    let frame_precision = if video_derived {
        config.occupancy_precision
    } else {
        let precision = reader.read_u8()?;
        if precision == 0 || config.occupancy_resolution % precision as usize != 0 {
            return Err(Error::corrupt(format!(
                "frame {} re-states occupancy precision {precision}, which does not divide resolution {}",
                frame.index, config.occupancy_resolution
            )));
        }
        precision
    };
    let max_candidate_count = reader.read_u8()? as usize;

    let mut frame_projection_mode = 0u8;
    if !config.absolute_d1 {
        *surface_thickness = reader.read_u8()?;
        frame_projection_mode = reader.read_u8()?;
    }

    let bin_coding = config.bin_arith_coding
        && !config.lossless_geo
        && config.occupancy_resolution == 16
        && frame_precision == 4;
    let patch_config = PatchCodingConfig {
        occupancy_resolution: config.occupancy_resolution as u8,
        absolute_d1: config.absolute_d1,
        frame_projection_mode,
        bin_coding,
    };
    let intra = previous.is_none() || !config.delta_coding;

    let (intra_header, inter_header) = if intra {
        (Some(patch_meta::read_intra_header(reader)?), None)
    } else {
        (None, Some(patch_meta::read_inter_header(reader)?))
    };
    let declared = intra_header
        .map(|h| h.compressed_size)
        .or(inter_header.map(|h| h.compressed_size))
        .unwrap_or(0) as usize;
    if declared > reader.remaining() {
        return Err(Error::StreamUnderflow {
            offset: reader.position(),
            need: declared,
            have: reader.remaining(),
        });
    }
    let segment = &reader.tail()[..declared];
    let mut decoder = ArithmeticDecoder::new(segment);

    match (intra_header, inter_header, previous) {
        (Some(header), _, _) => {
            patch_meta::decode_intra_patches(&mut decoder, frame, &header, &patch_config)?
        }
        (_, Some(header), Some(previous)) => patch_meta::decode_inter_patches(
            &mut decoder,
            frame,
            previous,
            &header,
            &patch_config,
        )?,
        _ => unreachable!("inter mode without a previous frame"),
    }

    let grid_width = config.width / config.occupancy_resolution;
    let grid_height = config.height / config.occupancy_resolution;
    if video_derived {
        frame.block_to_patch = block_to_patch::decode_block_to_patch_from_occupancy(
            &mut decoder,
            &frame.patches,
            &frame.occupancy_map,
            config.width,
            grid_width,
            grid_height,
            config.occupancy_resolution,
            max_candidate_count,
            bin_coding,
        )?;
    } else {
        frame.block_to_patch = block_to_patch::decode_block_to_patch(
            &mut decoder,
            &frame.patches,
            grid_width,
            grid_height,
            max_candidate_count,
            bin_coding,
        )?;
        frame.occupancy_map = occupancy::decode_occupancy_map(
            &mut decoder,
            &frame.block_to_patch,
            config.width,
            config.height,
            grid_width,
            grid_height,
            config.occupancy_resolution,
            frame_precision as usize,
            bin_coding,
        )?;
    }

    // The declared byte length, not the bits consumed, advances the cursor.
    let consumed = decoder.bytes_consumed();
    if consumed != declared {
        warn!(
            frame = frame.index,
            declared, consumed, "arithmetic segment length does not match bits consumed"
        );
    }
    reader.skip(declared)?;
    debug!(
        frame = frame.index,
        patch_count,
        intra,
        segment_bytes = declared,
        "decoded frame segment"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::BitstreamWriter;
    use crate::encoder::{write_gof_header, Encoder, EncoderParams};
    use crate::video::{Image, VideoSequence};

    struct ZeroVideoDecoder;

    impl VideoDecoder for ZeroVideoDecoder {
        fn decompress(
            &mut self,
            _reader: &mut BitstreamReader<'_>,
            spec: &VideoStreamSpec,
        ) -> Result<VideoSequence> {
            Ok(VideoSequence::new(
                (0..spec.frame_count)
                    .map(|_| Image::new(spec.width, spec.height))
                    .collect(),
            ))
        }
    }

    struct NoopReconstructor;

    impl PointCloudReconstructor for NoopReconstructor {
        fn generate_point_cloud(
            &mut self,
            _context: &GofContext,
            _params: &ReconstructionParams,
        ) -> Result<()> {
            Ok(())
        }
    }

    struct NoopColorizer;

    impl PointCloudColorizer for NoopColorizer {
        fn color_point_cloud(
            &mut self,
            _context: &GofContext,
            _no_attributes: bool,
            _params: &ReconstructionParams,
        ) -> Result<()> {
            Ok(())
        }
    }

    /// One-frame GOF with a single block-sized patch, plus its header length
    fn encoded_single_frame_gof() -> (Vec<u8>, usize) {
        let mut context = GofContext {
            width: 64,
            height: 64,
            occupancy_resolution: 16,
            occupancy_precision: 4,
            absolute_d1: true,
            no_attributes: true,
            model_scale: 1.0,
            frames: vec![FrameContext::default()],
            ..GofContext::default()
        };
        let mut patch = Patch {
            size_u0: 1,
            size_v0: 1,
            occupancy_resolution: 16,
            ..Patch::default()
        };
        patch.set_axes(0);
        context.frames[0].patches = vec![patch];
        let mut block_to_patch = vec![0usize; 16];
        block_to_patch[0] = 1;
        context.frames[0].block_to_patch = block_to_patch;
        let mut occupancy_map = vec![false; 64 * 64];
        for v in 0..16 {
            for u in 0..16 {
                occupancy_map[v * 64 + u] = true;
            }
        }
        context.frames[0].occupancy_map = occupancy_map;

        let encoder = Encoder::new(EncoderParams::default());
        let mut writer = BitstreamWriter::new();
        encoder.write_gof(&context, &mut writer).unwrap();
        encoder.write_end_of_stream(&mut writer);
        let data = writer.into_inner();

        let mut header = BitstreamWriter::new();
        write_gof_header(&context, &mut header).unwrap();
        let header_len = header.into_inner().len();
        (data, header_len)
    }

    #[test]
    fn test_bad_frame_precision_byte_is_corrupt() {
        // After the header come the LE u32 patch count and the frame's
        // re-stated occupancy precision byte.
        let (data, header_len) = encoded_single_frame_gof();
        let precision_offset = header_len + 4;
        assert_eq!(data[precision_offset], 4);

        for bad in [0u8, 3] {
            let mut corrupted = data.clone();
            corrupted[precision_offset] = bad;
            let decoder = Decoder::new(DecoderParams::default());
            let mut reader = BitstreamReader::new(&corrupted);
            let result = decoder.decode_gof(
                &mut reader,
                &mut ZeroVideoDecoder,
                &mut NoopReconstructor,
                &mut NoopColorizer,
            );
            assert!(result.is_err(), "precision byte {bad} must be rejected");
        }
    }

    #[test]
    fn test_intact_stream_still_decodes() {
        let (data, _) = encoded_single_frame_gof();
        let decoder = Decoder::new(DecoderParams::default());
        let mut reader = BitstreamReader::new(&data);
        let decoded = decoder
            .decode_gof(
                &mut reader,
                &mut ZeroVideoDecoder,
                &mut NoopReconstructor,
                &mut NoopColorizer,
            )
            .unwrap()
            .expect("one GOF before the end marker");
        assert_eq!(decoded.frames[0].patches.len(), 1);
    }
}
