//! Three-level transform metadata (GOF / frame / patch)
//!
//! Each level carries an enable-flags record gating which optional fields
//! may be signalled, plus the optional values themselves. The enable flags
//! form a strict hierarchy: a field disabled at one level is never signalled
//! at any level below it.
//!
//! The same logical structure has two encodings on the wire: a plain
//! byte-oriented form (used inside the GOF header) and an arithmetic-coded
//! form (used at frame and patch level). Both are driven by the one pair of
//! [`decode_metadata`]/[`encode_metadata`] walkers over the
//! [`MetadataBitSource`]/[`MetadataBitSink`] seam, so the field semantics
//! cannot drift apart.

use tracing::warn;

use crate::bitstream::{BitstreamReader, BitstreamWriter};
use crate::entropy::{
    code_to_signed, signed_to_code, AdaptiveBitModel, ArithmeticDecoder, ArithmeticEncoder,
    StaticBitModel,
};
use crate::error::Result;

/// Which optional fields may be signalled at a metadata level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataEnabledFlags {
    pub metadata_enabled: bool,
    pub scale_enabled: bool,
    pub offset_enabled: bool,
    pub rotation_enabled: bool,
    pub point_size_enabled: bool,
    pub point_shape_enabled: bool,
}

impl MetadataEnabledFlags {
    /// Flags with every field enabled
    pub fn all_enabled() -> Self {
        MetadataEnabledFlags {
            metadata_enabled: true,
            scale_enabled: true,
            offset_enabled: true,
            rotation_enabled: true,
            point_size_enabled: true,
            point_shape_enabled: true,
        }
    }
}

/// Rendering primitive for reconstructed points
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum PointShape {
    #[default]
    Circle = 0,
    Square = 1,
    Diamond = 2,
}

impl PointShape {
    /// Decode from the 8-bit wire value; undefined codes fall back to circle
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => PointShape::Circle,
            1 => PointShape::Square,
            2 => PointShape::Diamond,
            _ => {
                warn!(code, "undefined point shape, falling back to circle");
                PointShape::Circle
            }
        }
    }
}

/// Decoded metadata values for one level
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// Enable flags inherited from the level above
    pub enabled_flags: MetadataEnabledFlags,
    /// Whether any value block was signalled at this level
    pub present: bool,
    pub scale: Option<[u32; 3]>,
    pub offset: Option<[i32; 3]>,
    pub rotation: Option<[i32; 3]>,
    pub point_size: Option<u16>,
    pub point_shape: Option<PointShape>,
    /// Enable flags this level grants to the level below
    pub lower_level_flags: MetadataEnabledFlags,
}

/// One presence/enable bit position in the metadata layout
///
/// The arithmetic form keeps a dedicated adaptive model per position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataBit {
    Present,
    ScalePresent,
    OffsetPresent,
    RotationPresent,
    PointSizePresent,
    PointShapePresent,
    LowerEnabled,
    LowerScale,
    LowerOffset,
    LowerRotation,
    LowerPointSize,
    LowerPointShape,
}

const METADATA_BIT_COUNT: usize = 12;

/// Bit/value source capability the metadata walker decodes from
pub trait MetadataBitSource {
    fn read_flag(&mut self, bit: MetadataBit) -> Result<bool>;
    fn read_u32(&mut self) -> Result<u32>;
    fn read_i32(&mut self) -> Result<i32>;
    fn read_u16(&mut self) -> Result<u16>;
    fn read_u8(&mut self) -> Result<u8>;
}

/// Bit/value sink capability the metadata walker encodes into
pub trait MetadataBitSink {
    fn write_flag(&mut self, bit: MetadataBit, value: bool) -> Result<()>;
    fn write_u32(&mut self, value: u32) -> Result<()>;
    fn write_i32(&mut self, value: i32) -> Result<()>;
    fn write_u16(&mut self, value: u16) -> Result<()>;
    fn write_u8(&mut self, value: u8) -> Result<()>;
}

/// Decode one metadata level from `source` into `metadata`
///
/// `metadata.enabled_flags` must already hold the flags granted by the level
/// above; if metadata is disabled there, nothing is consumed.
pub fn decode_metadata(
    metadata: &mut Metadata,
    source: &mut impl MetadataBitSource,
) -> Result<()> {
    if !metadata.enabled_flags.metadata_enabled {
        return Ok(());
    }

    metadata.present = source.read_flag(MetadataBit::Present)?;
    if metadata.present {
        if metadata.enabled_flags.scale_enabled {
            metadata.scale = if source.read_flag(MetadataBit::ScalePresent)? {
                Some([source.read_u32()?, source.read_u32()?, source.read_u32()?])
            } else {
                None
            };
        }
        if metadata.enabled_flags.offset_enabled {
            metadata.offset = if source.read_flag(MetadataBit::OffsetPresent)? {
                Some([source.read_i32()?, source.read_i32()?, source.read_i32()?])
            } else {
                None
            };
        }
        if metadata.enabled_flags.rotation_enabled {
            metadata.rotation = if source.read_flag(MetadataBit::RotationPresent)? {
                Some([source.read_i32()?, source.read_i32()?, source.read_i32()?])
            } else {
                None
            };
        }
        if metadata.enabled_flags.point_size_enabled {
            metadata.point_size = if source.read_flag(MetadataBit::PointSizePresent)? {
                Some(source.read_u16()?)
            } else {
                None
            };
        }
        if metadata.enabled_flags.point_shape_enabled {
            metadata.point_shape = if source.read_flag(MetadataBit::PointShapePresent)? {
                Some(PointShape::from_code(source.read_u8()?))
            } else {
                None
            };
        }
    }

    let lower = &mut metadata.lower_level_flags;
    lower.metadata_enabled = source.read_flag(MetadataBit::LowerEnabled)?;
    if lower.metadata_enabled {
        lower.scale_enabled = source.read_flag(MetadataBit::LowerScale)?;
        lower.offset_enabled = source.read_flag(MetadataBit::LowerOffset)?;
        lower.rotation_enabled = source.read_flag(MetadataBit::LowerRotation)?;
        lower.point_size_enabled = source.read_flag(MetadataBit::LowerPointSize)?;
        lower.point_shape_enabled = source.read_flag(MetadataBit::LowerPointShape)?;
    }
    Ok(())
}

/// Encode one metadata level into `sink` (exact mirror of [`decode_metadata`])
pub fn encode_metadata(metadata: &Metadata, sink: &mut impl MetadataBitSink) -> Result<()> {
    if !metadata.enabled_flags.metadata_enabled {
        return Ok(());
    }

    sink.write_flag(MetadataBit::Present, metadata.present)?;
    if metadata.present {
        if metadata.enabled_flags.scale_enabled {
            sink.write_flag(MetadataBit::ScalePresent, metadata.scale.is_some())?;
            if let Some(scale) = metadata.scale {
                for component in scale {
                    sink.write_u32(component)?;
                }
            }
        }
        if metadata.enabled_flags.offset_enabled {
            sink.write_flag(MetadataBit::OffsetPresent, metadata.offset.is_some())?;
            if let Some(offset) = metadata.offset {
                for component in offset {
                    sink.write_i32(component)?;
                }
            }
        }
        if metadata.enabled_flags.rotation_enabled {
            sink.write_flag(MetadataBit::RotationPresent, metadata.rotation.is_some())?;
            if let Some(rotation) = metadata.rotation {
                for component in rotation {
                    sink.write_i32(component)?;
                }
            }
        }
        if metadata.enabled_flags.point_size_enabled {
            sink.write_flag(MetadataBit::PointSizePresent, metadata.point_size.is_some())?;
            if let Some(size) = metadata.point_size {
                sink.write_u16(size)?;
            }
        }
        if metadata.enabled_flags.point_shape_enabled {
            sink.write_flag(MetadataBit::PointShapePresent, metadata.point_shape.is_some())?;
            if let Some(shape) = metadata.point_shape {
                sink.write_u8(shape as u8)?;
            }
        }
    }

    let lower = &metadata.lower_level_flags;
    sink.write_flag(MetadataBit::LowerEnabled, lower.metadata_enabled)?;
    if lower.metadata_enabled {
        sink.write_flag(MetadataBit::LowerScale, lower.scale_enabled)?;
        sink.write_flag(MetadataBit::LowerOffset, lower.offset_enabled)?;
        sink.write_flag(MetadataBit::LowerRotation, lower.rotation_enabled)?;
        sink.write_flag(MetadataBit::LowerPointSize, lower.point_size_enabled)?;
        sink.write_flag(MetadataBit::LowerPointShape, lower.point_shape_enabled)?;
    }
    Ok(())
}

/// Plain byte-oriented metadata source (GOF header form)
pub struct PlainMetadataSource<'r, 'a> {
    pub reader: &'r mut BitstreamReader<'a>,
}

impl MetadataBitSource for PlainMetadataSource<'_, '_> {
    fn read_flag(&mut self, _bit: MetadataBit) -> Result<bool> {
        self.reader.read_bool()
    }

    fn read_u32(&mut self) -> Result<u32> {
        self.reader.read_u32()
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(code_to_signed(self.reader.read_u32()?) as i32)
    }

    fn read_u16(&mut self) -> Result<u16> {
        self.reader.read_u16()
    }

    fn read_u8(&mut self) -> Result<u8> {
        self.reader.read_u8()
    }
}

/// Plain byte-oriented metadata sink (GOF header form)
pub struct PlainMetadataSink<'w> {
    pub writer: &'w mut BitstreamWriter,
}

impl MetadataBitSink for PlainMetadataSink<'_> {
    fn write_flag(&mut self, _bit: MetadataBit, value: bool) -> Result<()> {
        self.writer.write_bool(value);
        Ok(())
    }

    fn write_u32(&mut self, value: u32) -> Result<()> {
        self.writer.write_u32(value);
        Ok(())
    }

    fn write_i32(&mut self, value: i32) -> Result<()> {
        self.writer.write_u32(signed_to_code(value as i64));
        Ok(())
    }

    fn write_u16(&mut self, value: u16) -> Result<()> {
        self.writer.write_u16(value);
        Ok(())
    }

    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value);
        Ok(())
    }
}

/// Adaptive bit models for the arithmetic metadata form, one per bit position
///
/// Owned by the enclosing segment codec so state never leaks across streams.
#[derive(Debug, Clone)]
pub struct MetadataModels {
    bits: [AdaptiveBitModel; METADATA_BIT_COUNT],
}

impl MetadataModels {
    pub fn new() -> Self {
        MetadataModels {
            bits: std::array::from_fn(|_| AdaptiveBitModel::new()),
        }
    }

    fn bit_model(&mut self, bit: MetadataBit) -> &mut AdaptiveBitModel {
        &mut self.bits[bit as usize]
    }
}

impl Default for MetadataModels {
    fn default() -> Self {
        MetadataModels::new()
    }
}

/// Arithmetic-coded metadata source (frame/patch form)
pub struct ArithmeticMetadataSource<'d, 'a, 'm> {
    pub decoder: &'d mut ArithmeticDecoder<'a>,
    pub models: &'m mut MetadataModels,
    pub static_model: StaticBitModel,
}

impl MetadataBitSource for ArithmeticMetadataSource<'_, '_, '_> {
    fn read_flag(&mut self, bit: MetadataBit) -> Result<bool> {
        Ok(self.decoder.decode_adaptive_bit(self.models.bit_model(bit)))
    }

    fn read_u32(&mut self) -> Result<u32> {
        self.decoder.decode_fixed_width(32, &self.static_model)
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(code_to_signed(self.decoder.decode_fixed_width(32, &self.static_model)?) as i32)
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(self.decoder.decode_fixed_width(16, &self.static_model)? as u16)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.decoder.decode_fixed_width(8, &self.static_model)? as u8)
    }
}

/// Arithmetic-coded metadata sink (frame/patch form)
pub struct ArithmeticMetadataSink<'e, 'm> {
    pub encoder: &'e mut ArithmeticEncoder,
    pub models: &'m mut MetadataModels,
    pub static_model: StaticBitModel,
}

impl MetadataBitSink for ArithmeticMetadataSink<'_, '_> {
    fn write_flag(&mut self, bit: MetadataBit, value: bool) -> Result<()> {
        self.encoder
            .encode_adaptive_bit(value, self.models.bit_model(bit));
        Ok(())
    }

    fn write_u32(&mut self, value: u32) -> Result<()> {
        self.encoder.encode_fixed_width(value, 32, &self.static_model);
        Ok(())
    }

    fn write_i32(&mut self, value: i32) -> Result<()> {
        self.encoder
            .encode_fixed_width(signed_to_code(value as i64), 32, &self.static_model);
        Ok(())
    }

    fn write_u16(&mut self, value: u16) -> Result<()> {
        self.encoder
            .encode_fixed_width(value as u32, 16, &self.static_model);
        Ok(())
    }

    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.encoder
            .encode_fixed_width(value as u32, 8, &self.static_model);
        Ok(())
    }
}
