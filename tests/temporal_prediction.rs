//! Inter-frame coverage: matched patches coded as deltas against the
//! previous frame, plus unmatched patches appended after the prefix.

use vpcc::bitstream::{BitstreamReader, BitstreamWriter};
use vpcc::reconstruct::{PointCloudColorizer, PointCloudReconstructor, ReconstructionParams};
use vpcc::video::{Image, VideoDecoder, VideoSequence, VideoStreamSpec};
use vpcc::{
    Decoder, DecoderParams, Encoder, EncoderParams, FrameContext, GofContext, Patch, Result,
};

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

fn make_patch(u0: u32, v0: u32, size_u0: u32, size_v0: u32, normal: u8) -> Patch {
    let mut patch = Patch {
        u0,
        v0,
        u1: 16 * u0,
        v1: 16 * v0,
        d1: 8 + u0,
        size_u0,
        size_v0,
        occupancy_resolution: 16,
        ..Patch::default()
    };
    patch.set_axes(normal);
    patch
}

fn default_block_to_patch(patches: &[Patch], grid: usize) -> Vec<usize> {
    let mut map = vec![0usize; grid * grid];
    for (i, patch) in patches.iter().enumerate() {
        for v in patch.v0..patch.v0 + patch.size_v0 {
            for u in patch.u0..patch.u0 + patch.size_u0 {
                map[v as usize * grid + u as usize] = i + 1;
            }
        }
    }
    map
}

fn occupancy_for_blocks(
    block_to_patch: &[usize],
    grid: usize,
    resolution: usize,
    width: usize,
    height: usize,
) -> Vec<bool> {
    let mut map = vec![false; width * height];
    for (p, &owner) in block_to_patch.iter().enumerate() {
        if owner == 0 {
            continue;
        }
        let u0 = (p % grid) * resolution;
        let v0 = (p / grid) * resolution;
        for v in v0..v0 + resolution / 2 {
            for u in u0..u0 + resolution {
                map[v * width + u] = true;
            }
        }
    }
    map
}

fn fill_frame(frame: &mut FrameContext, patches: Vec<Patch>) {
    let block_to_patch = default_block_to_patch(&patches, 4);
    frame.occupancy_map = occupancy_for_blocks(&block_to_patch, 4, 16, 64, 64);
    frame.block_to_patch = block_to_patch;
    frame.patches = patches;
}

fn two_frame_context() -> GofContext {
    GofContext {
        width: 64,
        height: 64,
        occupancy_resolution: 16,
        occupancy_precision: 4,
        absolute_d1: true,
        no_attributes: true,
        delta_coding: true,
        model_scale: 1.0,
        frames: (0..2)
            .map(|index| FrameContext {
                index,
                ..FrameContext::default()
            })
            .collect(),
        ..GofContext::default()
    }
}

fn roundtrip(context: &GofContext) -> GofContext {
    let encoder = Encoder::new(EncoderParams::default());
    let mut writer = BitstreamWriter::new();
    encoder.write_gof(context, &mut writer).unwrap();
    encoder.write_end_of_stream(&mut writer);
    let data = writer.into_inner();

    let decoder = Decoder::new(DecoderParams::default());
    let mut reader = BitstreamReader::new(&data);
    decoder
        .decode_gof(
            &mut reader,
            &mut ZeroVideoDecoder,
            &mut NoopReconstructor,
            &mut NoopColorizer,
        )
        .unwrap()
        .expect("one GOF before the end marker")
}

#[test]
fn test_matched_patches_shift_by_constant() {
    let mut context = two_frame_context();
    let frame0 = vec![
        make_patch(0, 0, 2, 2, 0),
        make_patch(2, 0, 2, 2, 1),
        make_patch(0, 2, 2, 2, 2),
    ];
    // Frame 1: same layout with the 3-D anchor shifted by a constant, each
    // patch matched to its own index in frame 0.
    let frame1: Vec<Patch> = frame0
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let mut shifted = p.clone();
            shifted.u1 += 10;
            shifted.v1 += 10;
            shifted.d1 += 2;
            shifted.best_match_index = Some(i);
            shifted
        })
        .collect();
    fill_frame(&mut context.frames[0], frame0.clone());
    fill_frame(&mut context.frames[1], frame1.clone());

    let decoded = roundtrip(&context);
    assert_eq!(decoded.frames[0].patches, frame0);
    assert_eq!(decoded.frames[1].patches, frame1);
    for (i, patch) in decoded.frames[1].patches.iter().enumerate() {
        assert_eq!(patch.best_match_index, Some(i));
    }
}

#[test]
fn test_unmatched_patches_follow_matched_prefix() {
    let mut context = two_frame_context();
    let frame0 = vec![make_patch(0, 0, 2, 2, 0), make_patch(2, 2, 2, 2, 1)];
    let mut frame1: Vec<Patch> = frame0
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let mut shifted = p.clone();
            shifted.d1 += 1;
            shifted.best_match_index = Some(i);
            shifted
        })
        .collect();
    // One new patch with no temporal match, coded fixed-width.
    frame1.push(make_patch(2, 0, 2, 2, 2));
    fill_frame(&mut context.frames[0], frame0.clone());
    fill_frame(&mut context.frames[1], frame1.clone());

    let decoded = roundtrip(&context);
    assert_eq!(decoded.frames[1].patches, frame1);
    assert_eq!(decoded.frames[1].patches[2].best_match_index, None);
}

#[test]
fn test_delta_coding_off_keeps_every_frame_intra() {
    let mut context = two_frame_context();
    context.delta_coding = false;
    let frame0 = vec![make_patch(0, 0, 2, 2, 0)];
    let frame1 = vec![make_patch(1, 1, 2, 2, 2)];
    fill_frame(&mut context.frames[0], frame0.clone());
    fill_frame(&mut context.frames[1], frame1.clone());

    let decoded = roundtrip(&context);
    assert_eq!(decoded.frames[0].patches, frame0);
    assert_eq!(decoded.frames[1].patches, frame1);
    // Intra frames never reference the previous frame.
    assert!(decoded.frames[1].patches[0].best_match_index.is_none());
}
