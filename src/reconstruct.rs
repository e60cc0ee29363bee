//! External reconstruction boundary
//!
//! Turning decoded patches, occupancy, and video samples back into 3-D points
//! (and coloring them) is geometry work outside the bitstream protocol. The
//! sequencer hands the fully decoded [`GofContext`] to implementations of the
//! traits below together with the configuration bundle assembled from the GOF
//! header.

use crate::context::GofContext;
use crate::error::Result;

/// Configuration handed to the reconstruction and coloring stages
///
/// Assembled from the GOF header plus the surface thickness threaded through
/// the per-frame segments.
#[derive(Debug, Clone)]
pub struct ReconstructionParams {
    pub occupancy_resolution: usize,
    pub neighbor_count_smoothing: usize,
    pub radius2_smoothing: f64,
    pub radius2_boundary_detection: f64,
    pub threshold_smoothing: f64,
    pub lossless_geo: bool,
    pub lossless_geo_444: bool,
    pub absolute_d1: bool,
    pub surface_thickness: u8,
    /// Skip level-of-detail scaling during reconstruction
    pub ignore_lod: bool,
    pub threshold_color_smoothing: f64,
    pub threshold_local_entropy: f64,
    pub radius2_color_smoothing: f64,
    pub neighbor_count_color_smoothing: usize,
    pub flag_color_smoothing: bool,
    pub enhanced_delta_depth: bool,
}

impl ReconstructionParams {
    /// Build the bundle from a decoded GOF header
    pub fn from_context(context: &GofContext, surface_thickness: u8) -> Self {
        ReconstructionParams {
            occupancy_resolution: context.occupancy_resolution as usize,
            neighbor_count_smoothing: context.neighbor_count_smoothing as usize,
            radius2_smoothing: context.radius2_smoothing as f64,
            radius2_boundary_detection: context.radius2_boundary_detection as f64,
            threshold_smoothing: context.threshold_smoothing as f64,
            lossless_geo: context.lossless_geo,
            lossless_geo_444: context.lossless_geo_444,
            absolute_d1: context.absolute_d1,
            surface_thickness,
            ignore_lod: true,
            threshold_color_smoothing: context.threshold_color_smoothing as f64,
            threshold_local_entropy: context.threshold_local_entropy,
            radius2_color_smoothing: context.radius2_color_smoothing as f64,
            neighbor_count_color_smoothing: context.neighbor_count_color_smoothing as usize,
            flag_color_smoothing: context.flag_color_smoothing,
            enhanced_delta_depth: context.lossless_geo && context.enhanced_delta_depth,
        }
    }
}

/// Produces point geometry from the decoded patch/occupancy state
pub trait PointCloudReconstructor {
    fn generate_point_cloud(
        &mut self,
        context: &GofContext,
        params: &ReconstructionParams,
    ) -> Result<()>;
}

/// Colors reconstructed points from the decoded texture video
pub trait PointCloudColorizer {
    fn color_point_cloud(
        &mut self,
        context: &GofContext,
        no_attributes: bool,
        params: &ReconstructionParams,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_from_context() {
        let context = GofContext {
            occupancy_resolution: 16,
            radius2_smoothing: 64,
            lossless_geo: true,
            enhanced_delta_depth: true,
            ..GofContext::default()
        };
        let params = ReconstructionParams::from_context(&context, 4);
        assert_eq!(params.occupancy_resolution, 16);
        assert_eq!(params.radius2_smoothing, 64.0);
        assert_eq!(params.surface_thickness, 4);
        assert!(params.enhanced_delta_depth);
    }

    #[test]
    fn test_enhanced_delta_depth_requires_lossless() {
        let context = GofContext {
            enhanced_delta_depth: true,
            lossless_geo: false,
            ..GofContext::default()
        };
        let params = ReconstructionParams::from_context(&context, 4);
        assert!(!params.enhanced_delta_depth);
    }
}
