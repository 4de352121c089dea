//! Byte-oriented message buffers for the slipgate client protocol.
//!
//! This crate provides [`MessageWriter`] and [`MessageReader`], the primitives
//! every other protocol layer is built on, plus the compressed direction table
//! used to encode unit vectors in a single byte.
//!
//! # Design Principles
//!
//! - **Bounded writes** - A writer has an explicit capacity fixed at
//!   construction. In strict mode any overflowing write is an error; in
//!   overflow-allowed mode (used by the channel) the buffer is cleared and a
//!   sticky flag is raised so the producer still ends with a valid, bounded
//!   packet.
//! - **Sentinel reads** - Reads past the end of a buffer return `-1` (numeric)
//!   or an empty string and raise a sticky overrun flag instead of failing.
//!   The fatal check is deliberately deferred to the top-level message loop:
//!   some sub-parsers probe past soft boundaries by design (variable-length
//!   bitmask headers).
//! - **Quantized primitives** - Coordinates travel as 1/8-unit shorts, angles
//!   as 1/256-turn bytes or 1/65536-turn shorts, directions as an index into
//!   a fixed 162-entry unit-vector table.
//!
//! # Example
//!
//! ```
//! use msg::{MessageReader, MessageWriter};
//!
//! let mut writer = MessageWriter::new(64);
//! writer.write_u8(7).unwrap();
//! writer.write_coord(10.5).unwrap();
//! writer.write_string("map q2dm1").unwrap();
//!
//! let mut reader = MessageReader::new(writer.as_slice());
//! assert_eq!(reader.read_u8(), 7);
//! assert_eq!(reader.read_coord(), 10.5);
//! assert_eq!(reader.read_string(), "map q2dm1");
//! assert!(!reader.is_overrun());
//! ```

mod dir;
mod error;
mod reader;
mod writer;

pub use dir::{decode_direction, encode_direction, DIR_TABLE_LEN};
pub use error::{MsgError, MsgResult};
pub use reader::MessageReader;
pub use writer::MessageWriter;

/// Scale applied to quantized coordinates (1/8 unit per count).
pub const COORD_SCALE: f32 = 0.125;
