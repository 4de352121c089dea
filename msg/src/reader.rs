//! Cursor-based message reader with sentinel truncation semantics.

use crate::dir::decode_direction;
use crate::COORD_SCALE;

/// A read cursor over an immutable byte span.
///
/// Reads past the end of the span return `-1` for numeric primitives and an
/// empty string for string primitives, and raise the sticky
/// [`is_overrun`](Self::is_overrun) flag. They never panic and never error:
/// the top-level message loop checks the flag once per message and raises a
/// single protocol error, instead of every nested delta helper carrying a
/// failure path.
#[derive(Debug)]
pub struct MessageReader<'a> {
    data: &'a [u8],
    pos: usize,
    overrun: bool,
}

impl<'a> MessageReader<'a> {
    /// Creates a reader over the given span.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            overrun: false,
        }
    }

    /// Returns the current cursor position in bytes.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Returns the number of unread bytes.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Returns `true` once any read has run past the end of the span.
    #[must_use]
    pub const fn is_overrun(&self) -> bool {
        self.overrun
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        if self.pos + N > self.data.len() {
            self.pos = self.data.len();
            self.overrun = true;
            return None;
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Some(out)
    }

    /// Reads an unsigned byte, or `-1` past the end.
    pub fn read_u8(&mut self) -> i32 {
        self.take::<1>().map_or(-1, |b| i32::from(b[0]))
    }

    /// Reads a signed byte, or `-1` past the end.
    pub fn read_i8(&mut self) -> i32 {
        self.take::<1>().map_or(-1, |b| i32::from(b[0] as i8))
    }

    /// Reads a little-endian signed short, or `-1` past the end.
    pub fn read_i16(&mut self) -> i32 {
        self.take::<2>()
            .map_or(-1, |b| i32::from(i16::from_le_bytes(b)))
    }

    /// Reads a little-endian signed long, or `-1` past the end.
    pub fn read_i32(&mut self) -> i32 {
        self.take::<4>().map_or(-1, i32::from_le_bytes)
    }

    /// Reads a little-endian unsigned long, or `u32::MAX` past the end.
    pub fn read_u32(&mut self) -> u32 {
        self.read_i32() as u32
    }

    /// Reads a null-terminated string.
    ///
    /// Stops at the terminator or the end of the span. Bytes are interpreted
    /// as Latin-1 so arbitrary server text cannot fail to decode.
    pub fn read_string(&mut self) -> String {
        self.read_string_until(|c| c == 0)
    }

    /// Reads a string terminated by a null byte or a newline.
    pub fn read_string_line(&mut self) -> String {
        self.read_string_until(|c| c == 0 || c == b'\n')
    }

    fn read_string_until(&mut self, stop: impl Fn(u8) -> bool) -> String {
        let mut out = String::new();
        loop {
            let c = self.read_u8();
            if c == -1 {
                break;
            }
            let byte = c as u8;
            if stop(byte) {
                break;
            }
            out.push(char::from(byte));
        }
        out
    }

    /// Reads a raw span of up to `len` bytes.
    ///
    /// Returns the available prefix (possibly short) and raises the overrun
    /// flag if fewer than `len` bytes remained.
    pub fn read_bytes(&mut self, len: usize) -> &'a [u8] {
        let available = self.remaining();
        let take = len.min(available);
        let span = &self.data[self.pos..self.pos + take];
        self.pos += take;
        if take < len {
            self.overrun = true;
        }
        span
    }

    /// Reads a 1/8-unit quantized coordinate.
    pub fn read_coord(&mut self) -> f32 {
        self.read_i16() as f32 * COORD_SCALE
    }

    /// Reads a three-coordinate position.
    pub fn read_pos(&mut self) -> [f32; 3] {
        [self.read_coord(), self.read_coord(), self.read_coord()]
    }

    /// Reads a 1/256-turn quantized angle in degrees.
    pub fn read_angle(&mut self) -> f32 {
        self.read_i8() as f32 * (360.0 / 256.0)
    }

    /// Reads a 1/65536-turn quantized angle in degrees.
    pub fn read_angle16(&mut self) -> f32 {
        self.read_i16() as f32 * (360.0 / 65536.0)
    }

    /// Reads a direction-table index and decodes it to a unit vector.
    ///
    /// Returns `None` for an index outside the table, which the caller must
    /// treat as a protocol violation.
    pub fn read_dir(&mut self) -> Option<[f32; 3]> {
        let index = self.read_u8();
        if index < 0 {
            return None;
        }
        decode_direction(index as u8)
    }
}
