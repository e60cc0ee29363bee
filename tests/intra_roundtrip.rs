//! Intra-frame round-trip coverage: patch lists, block ownership, and
//! partially-occupied run-length blocks through a full encode/decode cycle.

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
        u1: 10 * u0 + 5,
        v1: 10 * v0 + 7,
        d1: 3 * u0 + v0,
        size_u0,
        size_v0,
        occupancy_resolution: 16,
        ..Patch::default()
    };
    patch.set_axes(normal);
    patch
}

/// Later patches overwrite earlier ones, matching the deepest-candidate
/// default assignment.
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

/// Occupy the top half of every owned macro-block (uniform at precision 4).
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

fn base_context(frame_count: usize) -> GofContext {
    GofContext {
        width: 64,
        height: 64,
        occupancy_resolution: 16,
        occupancy_precision: 4,
        absolute_d1: true,
        no_attributes: true,
        model_scale: 1.0,
        frames: (0..frame_count)
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
    let decoded = decoder
        .decode_gof(
            &mut reader,
            &mut ZeroVideoDecoder,
            &mut NoopReconstructor,
            &mut NoopColorizer,
        )
        .unwrap()
        .expect("one GOF before the end marker");
    let end = decoder
        .decode_gof(
            &mut reader,
            &mut ZeroVideoDecoder,
            &mut NoopReconstructor,
            &mut NoopColorizer,
        )
        .unwrap();
    assert!(end.is_none());
    assert_eq!(reader.remaining(), 0);
    decoded
}

#[test]
fn test_intra_patches_roundtrip_exactly() {
    let mut context = base_context(1);
    let patches = vec![
        make_patch(0, 0, 2, 2, 0),
        make_patch(1, 1, 3, 2, 2),
        make_patch(2, 2, 2, 2, 1),
    ];
    let block_to_patch = default_block_to_patch(&patches, 4);
    let occupancy = occupancy_for_blocks(&block_to_patch, 4, 16, 64, 64);
    context.frames[0].patches = patches.clone();
    context.frames[0].block_to_patch = block_to_patch.clone();
    context.frames[0].occupancy_map = occupancy.clone();

    let decoded = roundtrip(&context);
    assert_eq!(decoded.frames.len(), 1);
    assert_eq!(decoded.frames[0].patches, patches);
    assert_eq!(decoded.frames[0].block_to_patch, block_to_patch);
    assert_eq!(decoded.frames[0].occupancy_map, occupancy);
}

#[test]
fn test_single_patch_partial_occupancy() {
    let mut context = base_context(1);
    let patches = vec![make_patch(1, 0, 2, 3, 1)];
    let block_to_patch = default_block_to_patch(&patches, 4);
    let occupancy = occupancy_for_blocks(&block_to_patch, 4, 16, 64, 64);
    context.frames[0].patches = patches.clone();
    context.frames[0].block_to_patch = block_to_patch.clone();
    context.frames[0].occupancy_map = occupancy.clone();

    let decoded = roundtrip(&context);
    let frame = &decoded.frames[0];
    assert_eq!(frame.patches, patches);
    assert_eq!(frame.occupancy_map, occupancy);
    // Blocks outside every patch stay unoccupied without consuming bits.
    assert!(!frame.occupancy_map[0]);
}

#[test]
fn test_binary_coding_variant_roundtrip() {
    // occupancy resolution 16, precision 4, lossy geometry: the binary
    // prefix-code variant of axis/candidate/run coding.
    let mut context = base_context(1);
    context.bin_arith_coding = true;
    let patches = vec![make_patch(0, 0, 3, 3, 0), make_patch(1, 1, 3, 3, 2)];
    let block_to_patch = default_block_to_patch(&patches, 4);
    let occupancy = occupancy_for_blocks(&block_to_patch, 4, 16, 64, 64);
    context.frames[0].patches = patches.clone();
    context.frames[0].block_to_patch = block_to_patch.clone();
    context.frames[0].occupancy_map = occupancy.clone();

    let decoded = roundtrip(&context);
    assert_eq!(decoded.frames[0].patches, patches);
    assert_eq!(decoded.frames[0].block_to_patch, block_to_patch);
    assert_eq!(decoded.frames[0].occupancy_map, occupancy);
}
