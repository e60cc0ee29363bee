//! External video-codec boundary
//!
//! Pixel coding of the occupancy, geometry, and texture streams is delegated
//! to an external decoder behind [`VideoDecoder`]: it pulls a sub-stream off
//! the shared cursor, advances the cursor by exactly the bytes it consumed,
//! and hands back decoded planar frames. This module also derives the
//! full-resolution occupancy grid from a decoded occupancy video.

use rayon::prelude::*;

use crate::bitstream::BitstreamReader;
use crate::error::Result;

/// One decoded planar frame, up to three 16-bit channels
#[derive(Debug, Clone, Default)]
pub struct Image {
    width: usize,
    height: usize,
    channels: [Vec<u16>; 3],
}

impl Image {
    /// Allocate a zeroed frame
    pub fn new(width: usize, height: usize) -> Self {
        Image {
            width,
            height,
            channels: [
                vec![0; width * height],
                vec![0; width * height],
                vec![0; width * height],
            ],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Sample one channel at pixel (x, y)
    pub fn value(&self, channel: usize, x: usize, y: usize) -> u16 {
        debug_assert!(x < self.width && y < self.height);
        self.channels[channel][y * self.width + x]
    }

    pub fn set_value(&mut self, channel: usize, x: usize, y: usize, value: u16) {
        debug_assert!(x < self.width && y < self.height);
        self.channels[channel][y * self.width + x] = value;
    }
}

/// A decoded sequence of frames from one video sub-stream
#[derive(Debug, Clone, Default)]
pub struct VideoSequence {
    frames: Vec<Image>,
}

impl VideoSequence {
    pub fn new(frames: Vec<Image>) -> Self {
        VideoSequence { frames }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: usize) -> &Image {
        &self.frames[index]
    }

    pub fn frames(&self) -> &[Image] {
        &self.frames
    }

    pub fn width(&self) -> usize {
        self.frames.first().map_or(0, Image::width)
    }

    pub fn height(&self) -> usize {
        self.frames.first().map_or(0, Image::height)
    }
}

/// Which sub-stream a video decode request is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoStreamKind {
    OccupancyMap,
    Geometry,
    GeometryD1,
    Texture,
    MissedPointsGeometry,
    MissedPointsTexture,
}

/// Parameters of one video decode request
#[derive(Debug, Clone)]
pub struct VideoStreamSpec {
    pub kind: VideoStreamKind,
    /// Expected frame width in pixels
    pub width: usize,
    /// Expected frame height in pixels
    pub height: usize,
    /// Number of frames the sub-stream carries
    pub frame_count: usize,
    /// Lossless 4:4:4 layout (geometry streams only)
    pub lossless_444: bool,
    /// Sample depth in bytes (1 or 2)
    pub bytes_per_sample: usize,
}

/// External pixel-level video decoder
///
/// Implementations read the sub-stream for `spec` from the shared cursor and
/// must leave the cursor positioned on the first byte after it.
pub trait VideoDecoder {
    fn decompress(
        &mut self,
        reader: &mut BitstreamReader<'_>,
        spec: &VideoStreamSpec,
    ) -> Result<VideoSequence>;
}

/// Derive a full-resolution occupancy grid from one occupancy video frame
///
/// The video frame is sub-sampled by `precision` in both axes; each pixel is
/// broadcast to the `precision x precision` square it represents (nearest).
pub fn occupancy_map_from_video_frame(
    frame: &Image,
    width: usize,
    height: usize,
    precision: usize,
) -> Vec<bool> {
    let mut occupancy = vec![false; width * height];
    for v in 0..height {
        for u in 0..width {
            occupancy[v * width + u] = frame.value(0, u / precision, v / precision) != 0;
        }
    }
    occupancy
}

/// Derive occupancy grids for every frame of an occupancy video in parallel
pub fn occupancy_maps_from_video(
    video: &VideoSequence,
    width: usize,
    height: usize,
    precision: usize,
) -> Vec<Vec<bool>> {
    video
        .frames()
        .par_iter()
        .map(|frame| occupancy_map_from_video_frame(frame, width, height, precision))
        .collect()
}
