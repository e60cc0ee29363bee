//! Patch records
//!
//! A patch is a rectangular 2-D projection of a contiguous 3-D surface
//! region, packed into the shared video frame. Placement and size are in
//! occupancy-block units; `u1`/`v1`/`d1` anchor the projection in 3-D.

use crate::metadata::Metadata;

/// One projected surface patch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    /// Horizontal position in the packed frame, in block units
    pub u0: u32,
    /// Vertical position in the packed frame, in block units
    pub v0: u32,
    /// Tangential origin of the bounding box in 3-D
    pub u1: u32,
    /// Bitangential origin of the bounding box in 3-D
    pub v1: u32,
    /// Depth origin along the normal axis
    pub d1: u32,
    /// Width in block units
    pub size_u0: u32,
    /// Height in block units
    pub size_v0: u32,
    /// Level of detail
    pub lod: u32,
    /// Block size this patch was packed with
    pub occupancy_resolution: u32,
    /// Projection plane normal (0, 1 or 2)
    pub normal_axis: u8,
    /// Tangent axis, derived from the normal
    pub tangent_axis: u8,
    /// Bitangent axis, derived from the normal
    pub bitangent_axis: u8,
    /// Near/far projection selector
    pub projection_mode: u8,
    /// Frame-wide projection mode this patch was coded under
    pub frame_projection_mode: u8,
    /// Index of the matched patch in the previous frame, if any
    pub best_match_index: Option<usize>,
    /// Patch-level metadata
    pub metadata: Metadata,
}

impl Patch {
    /// Set the normal axis and the tangent/bitangent axes it determines
    pub fn set_axes(&mut self, normal_axis: u8) {
        self.normal_axis = normal_axis;
        let (tangent, bitangent) = axes_from_normal(normal_axis);
        self.tangent_axis = tangent;
        self.bitangent_axis = bitangent;
    }
}

/// Tangent/bitangent axes determined by a projection normal
///
/// The assignment is fixed by the protocol: normal 0 maps to (2, 1),
/// normal 1 to (2, 0), anything else to (0, 1).
pub fn axes_from_normal(normal_axis: u8) -> (u8, u8) {
    match normal_axis {
        0 => (2, 1),
        1 => (2, 0),
        _ => (0, 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axes_from_normal() {
        assert_eq!(axes_from_normal(0), (2, 1));
        assert_eq!(axes_from_normal(1), (2, 0));
        assert_eq!(axes_from_normal(2), (0, 1));
    }

    #[test]
    fn test_axes_are_mutually_exclusive() {
        for normal in 0..3u8 {
            let (t, b) = axes_from_normal(normal);
            assert_ne!(t, b);
            assert_ne!(t, normal);
            assert_ne!(b, normal);
        }
    }

    #[test]
    fn test_set_axes() {
        let mut patch = Patch::default();
        patch.set_axes(1);
        assert_eq!(patch.normal_axis, 1);
        assert_eq!(patch.tangent_axis, 2);
        assert_eq!(patch.bitangent_axis, 0);
    }
}
