//! Append-only message writer with a fixed capacity.

use crate::dir::encode_direction;
use crate::error::{MsgError, MsgResult};

/// An append-only byte buffer with an explicit capacity.
///
/// Two overflow disciplines exist:
///
/// - **Strict** ([`new`](Self::new)): an overflowing write returns
///   [`MsgError::Overflow`] and writes nothing.
/// - **Overflow-allowed** ([`overflow_allowed`](Self::overflow_allowed)): an
///   overflowing write clears the accumulated contents, raises the sticky
///   [`overflowed`](Self::overflowed) flag, and then proceeds, so the producer
///   always ends with a valid bounded buffer. The channel uses this for its
///   accumulating reliable stream; the owning session watches the flag and
///   drops the connection.
#[derive(Debug, Clone)]
pub struct MessageWriter {
    data: Vec<u8>,
    capacity: usize,
    allow_overflow: bool,
    overflowed: bool,
}

impl MessageWriter {
    /// Creates a strict writer with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            allow_overflow: false,
            overflowed: false,
        }
    }

    /// Creates a writer that truncates-and-flags instead of failing.
    #[must_use]
    pub fn overflow_allowed(capacity: usize) -> Self {
        Self {
            allow_overflow: true,
            ..Self::new(capacity)
        }
    }

    /// Returns the number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the fixed capacity of this buffer.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of bytes still available.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity - self.data.len()
    }

    /// Returns `true` once an overflow-allowed write has dropped data.
    ///
    /// The flag is sticky until [`clear`](Self::clear).
    #[must_use]
    pub const fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Returns the written bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the writer and returns the written bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Discards all written bytes and resets the overflow flag.
    pub fn clear(&mut self) {
        self.data.clear();
        self.overflowed = false;
    }

    fn reserve(&mut self, len: usize) -> MsgResult<()> {
        if self.data.len() + len > self.capacity {
            if !self.allow_overflow {
                return Err(MsgError::Overflow {
                    needed: self.data.len() + len,
                    capacity: self.capacity,
                });
            }
            if len > self.capacity {
                return Err(MsgError::OversizedWrite {
                    len,
                    capacity: self.capacity,
                });
            }
            self.data.clear();
            self.overflowed = true;
        }
        Ok(())
    }

    /// Appends a single unsigned byte.
    pub fn write_u8(&mut self, value: u8) -> MsgResult<()> {
        self.reserve(1)?;
        self.data.push(value);
        Ok(())
    }

    /// Appends a single signed byte.
    pub fn write_i8(&mut self, value: i8) -> MsgResult<()> {
        self.write_u8(value as u8)
    }

    /// Appends a little-endian signed short.
    pub fn write_i16(&mut self, value: i16) -> MsgResult<()> {
        self.reserve(2)?;
        self.data.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Appends a little-endian signed long.
    pub fn write_i32(&mut self, value: i32) -> MsgResult<()> {
        self.reserve(4)?;
        self.data.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Appends a little-endian unsigned long.
    pub fn write_u32(&mut self, value: u32) -> MsgResult<()> {
        self.write_i32(value as i32)
    }

    /// Appends a null-terminated string.
    pub fn write_string(&mut self, value: &str) -> MsgResult<()> {
        self.reserve(value.len() + 1)?;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        Ok(())
    }

    /// Appends a raw byte span.
    pub fn write_bytes(&mut self, value: &[u8]) -> MsgResult<()> {
        self.reserve(value.len())?;
        self.data.extend_from_slice(value);
        Ok(())
    }

    /// Appends a coordinate quantized to 1/8-unit counts.
    pub fn write_coord(&mut self, value: f32) -> MsgResult<()> {
        self.write_i16(((value * 8.0) as i32) as i16)
    }

    /// Appends a three-coordinate position.
    pub fn write_pos(&mut self, value: &[f32; 3]) -> MsgResult<()> {
        self.write_coord(value[0])?;
        self.write_coord(value[1])?;
        self.write_coord(value[2])
    }

    /// Appends an angle quantized to 1/256 of a turn.
    pub fn write_angle(&mut self, value: f32) -> MsgResult<()> {
        self.write_u8((((value * 256.0 / 360.0) as i32) & 255) as u8)
    }

    /// Appends a full-precision angle quantized to 1/65536 of a turn.
    pub fn write_angle16(&mut self, value: f32) -> MsgResult<()> {
        self.write_i16((((value * 65536.0 / 360.0) as i32) & 65535) as i16)
    }

    /// Appends a unit vector as an index into the direction table.
    pub fn write_dir(&mut self, value: &[f32; 3]) -> MsgResult<()> {
        self.write_u8(encode_direction(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_writer() {
        let writer = MessageWriter::new(16);
        assert!(writer.is_empty());
        assert_eq!(writer.len(), 0);
        assert_eq!(writer.capacity(), 16);
        assert_eq!(writer.remaining(), 16);
        assert!(!writer.overflowed());
    }

    #[test]
    fn strict_overflow_is_error_and_writes_nothing() {
        let mut writer = MessageWriter::new(2);
        writer.write_i16(5).unwrap();
        let err = writer.write_u8(1).unwrap_err();
        assert_eq!(
            err,
            MsgError::Overflow {
                needed: 3,
                capacity: 2
            }
        );
        assert_eq!(writer.len(), 2);
        assert!(!writer.overflowed());
    }

    #[test]
    fn allowed_overflow_clears_and_flags() {
        let mut writer = MessageWriter::overflow_allowed(4);
        writer.write_i32(7).unwrap();
        // buffer is full; the next write drops everything accumulated
        writer.write_u8(9).unwrap();
        assert!(writer.overflowed());
        assert_eq!(writer.as_slice(), &[9]);
    }

    #[test]
    fn allowed_overflow_flag_is_sticky() {
        let mut writer = MessageWriter::overflow_allowed(2);
        writer.write_i16(1).unwrap();
        writer.write_u8(2).unwrap();
        assert!(writer.overflowed());
        writer.write_u8(3).unwrap();
        assert!(writer.overflowed());
        writer.clear();
        assert!(!writer.overflowed());
        assert!(writer.is_empty());
    }

    #[test]
    fn single_write_larger_than_buffer_errors_even_when_allowed() {
        let mut writer = MessageWriter::overflow_allowed(4);
        let err = writer.write_bytes(&[0; 8]).unwrap_err();
        assert_eq!(
            err,
            MsgError::OversizedWrite {
                len: 8,
                capacity: 4
            }
        );
    }

    #[test]
    fn string_gets_null_terminated() {
        let mut writer = MessageWriter::new(8);
        writer.write_string("abc").unwrap();
        assert_eq!(writer.as_slice(), b"abc\0");
    }

    #[test]
    fn shorts_and_longs_are_little_endian() {
        let mut writer = MessageWriter::new(8);
        writer.write_i16(0x0102).unwrap();
        writer.write_i32(0x0304_0506).unwrap();
        assert_eq!(writer.as_slice(), &[0x02, 0x01, 0x06, 0x05, 0x04, 0x03]);
    }

    #[test]
    fn negative_coord_quantizes_toward_zero() {
        let mut writer = MessageWriter::new(2);
        writer.write_coord(-3.1).unwrap();
        let raw = i16::from_le_bytes([writer.as_slice()[0], writer.as_slice()[1]]);
        assert_eq!(raw, -24);
    }

    #[test]
    fn angle_wraps_modulo_turn() {
        let mut a = MessageWriter::new(1);
        let mut b = MessageWriter::new(1);
        a.write_angle(90.0).unwrap();
        b.write_angle(90.0 + 360.0).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
    }
}
