//! Decode contexts
//!
//! A [`GofContext`] carries everything decoded for one group of frames: the
//! header configuration, the per-frame state, and the video sequences pulled
//! out of the shared stream by the external video decoder. Frames are
//! allocated when the header is parsed and populated strictly in index order.

use crate::metadata::Metadata;
use crate::patch::Patch;
use crate::video::VideoSequence;

/// Group-of-frames configuration and state
#[derive(Debug, Clone, Default)]
pub struct GofContext {
    /// Packed video frame width in pixels
    pub width: u16,
    /// Packed video frame height in pixels
    pub height: u16,
    /// Occupancy macro-block size in pixels
    pub occupancy_resolution: u8,
    /// Occupancy sub-sampling precision in pixels
    pub occupancy_precision: u8,
    pub radius2_smoothing: u8,
    pub neighbor_count_smoothing: u8,
    pub radius2_boundary_detection: u8,
    pub threshold_smoothing: u8,
    pub lossless_geo: bool,
    pub lossless_texture: bool,
    pub no_attributes: bool,
    pub lossless_geo_444: bool,
    pub use_missed_points_separate_video: bool,
    pub use_occupancy_map_video: bool,
    /// Absolute depth coding (single geometry stream of doubled length)
    pub absolute_d1: bool,
    /// Binary variant of the occupancy/patch entropy coding
    pub bin_arith_coding: bool,
    pub model_scale: f32,
    pub model_origin: [f32; 3],
    /// GOF-level metadata (plain bitstream form)
    pub gof_metadata: Metadata,
    pub flag_color_smoothing: bool,
    pub threshold_color_smoothing: u8,
    pub threshold_local_entropy: f64,
    pub radius2_color_smoothing: u8,
    pub neighbor_count_color_smoothing: u8,
    pub enhanced_delta_depth: bool,
    /// Whether frames after the first may use temporal patch prediction
    pub delta_coding: bool,
    /// Per-frame state, length = GOF size
    pub frames: Vec<FrameContext>,
    /// Missed-points side-video geometry in pixels
    pub mp_geo_width: usize,
    pub mp_geo_height: usize,
    /// Missed-points side-video texture in pixels
    pub mp_att_width: usize,
    pub mp_att_height: usize,
    /// Decoded occupancy-map video, when carried as a dedicated stream
    pub occupancy_video: Option<VideoSequence>,
    /// Decoded geometry video (D0 + D1 interleaved when `absolute_d1`)
    pub geometry_video: Option<VideoSequence>,
    /// Decoded D1 geometry video (separate stream when not `absolute_d1`)
    pub geometry_d1_video: Option<VideoSequence>,
    pub texture_video: Option<VideoSequence>,
    pub mp_geometry_video: Option<VideoSequence>,
    pub mp_texture_video: Option<VideoSequence>,
}

impl GofContext {
    /// Number of frames in the GOF
    pub fn size(&self) -> usize {
        self.frames.len()
    }

    /// Width of the block-to-patch grid in macro-blocks
    pub fn block_to_patch_width(&self) -> usize {
        self.width as usize / self.occupancy_resolution as usize
    }

    /// Height of the block-to-patch grid in macro-blocks
    pub fn block_to_patch_height(&self) -> usize {
        self.height as usize / self.occupancy_resolution as usize
    }
}

/// Per-frame decoded state
#[derive(Debug, Clone, Default)]
pub struct FrameContext {
    /// Frame index within the GOF
    pub index: usize,
    /// Patches in decode order
    pub patches: Vec<Patch>,
    /// Full-resolution occupancy grid, `width * height` entries, row-major
    pub occupancy_map: Vec<bool>,
    /// Per macro-block owner: 0 = unassigned, else 1-based patch index
    pub block_to_patch: Vec<usize>,
    /// Lossless samples outside all patches
    pub missed_points_patch: MissedPointsPatch,
    /// Frame-level metadata (arithmetic form, intra frames only)
    pub frame_metadata: Metadata,
}

/// Raw lossless samples not covered by any patch
///
/// Carried either in a dedicated side video or folded into the occupancy map
/// as a placeholder patch whose placement rectangle lands here.
#[derive(Debug, Clone, Default)]
pub struct MissedPointsPatch {
    /// Number of geometry samples
    pub count: usize,
    /// Number of color samples
    pub color_count: usize,
    pub x: Vec<u16>,
    pub y: Vec<u16>,
    pub z: Vec<u16>,
    pub r: Vec<u16>,
    pub g: Vec<u16>,
    pub b: Vec<u16>,
    /// Placement rectangle when folded into the occupancy map
    pub u0: u32,
    pub v0: u32,
    pub size_u0: u32,
    pub size_v0: u32,
    pub occupancy_resolution: u32,
}

impl MissedPointsPatch {
    /// Allocate the coordinate arrays for `count` geometry samples
    pub fn resize_geometry(&mut self, count: usize) {
        self.count = count;
        self.x.resize(count, 0);
        self.y.resize(count, 0);
        self.z.resize(count, 0);
    }

    /// Allocate the color arrays for `count` color samples
    pub fn resize_color(&mut self, count: usize) {
        self.color_count = count;
        self.r.resize(count, 0);
        self.g.resize(count, 0);
        self.b.resize(count, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_grid_dimensions() {
        let context = GofContext {
            width: 64,
            height: 48,
            occupancy_resolution: 16,
            ..GofContext::default()
        };
        assert_eq!(context.block_to_patch_width(), 4);
        assert_eq!(context.block_to_patch_height(), 3);
    }

    #[test]
    fn test_missed_points_resize() {
        let mut patch = MissedPointsPatch::default();
        patch.resize_geometry(5);
        patch.resize_color(3);
        assert_eq!(patch.x.len(), 5);
        assert_eq!(patch.z.len(), 5);
        assert_eq!(patch.b.len(), 3);
    }
}
