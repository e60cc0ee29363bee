//! Byte-granular bitstream accessor
//!
//! The patch/occupancy protocol interleaves fixed-width header fields with
//! opaque spans consumed by collaborators (arithmetic-coded segments, video
//! sub-streams). Both sides share one sequential cursor: the reader exposes
//! typed little-endian reads plus `skip`/`tail` so an entropy-coded sub-range
//! can be handed out as a slice and then skipped by its declared byte count.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Sequential reader over an in-memory compressed stream
#[derive(Debug, Clone)]
pub struct BitstreamReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitstreamReader<'a> {
    /// Create a reader positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        BitstreamReader { data, pos: 0 }
    }

    /// Current byte offset
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Total buffer size in bytes
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// The not-yet-consumed portion of the buffer
    pub fn tail(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::StreamUnderflow {
                offset: self.pos,
                need: n,
                have: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Advance the cursor by `n` bytes (used to step over consumed sub-streams)
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(LittleEndian::read_f64(self.take(8)?))
    }
}

/// Sequential writer building an in-memory compressed stream
#[derive(Debug, Default)]
pub struct BitstreamWriter {
    data: Vec<u8>,
}

impl BitstreamWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        BitstreamWriter::default()
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing has been written yet
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume the writer, returning the stream bytes
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn write_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(v as u8);
    }

    pub fn write_u16(&mut self, v: u16) {
        let mut buf = [0u8; 2];
        LittleEndian::write_u16(&mut buf, v);
        self.data.extend_from_slice(&buf);
    }

    pub fn write_u32(&mut self, v: u32) {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, v);
        self.data.extend_from_slice(&buf);
    }

    pub fn write_u64(&mut self, v: u64) {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, v);
        self.data.extend_from_slice(&buf);
    }

    pub fn write_f32(&mut self, v: f32) {
        let mut buf = [0u8; 4];
        LittleEndian::write_f32(&mut buf, v);
        self.data.extend_from_slice(&buf);
    }

    pub fn write_f64(&mut self, v: f64) {
        let mut buf = [0u8; 8];
        LittleEndian::write_f64(&mut buf, v);
        self.data.extend_from_slice(&buf);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }
}
