#![no_main]

use libfuzzer_sys::fuzz_target;
use msg::MessageReader;

fuzz_target!(|data: &[u8]| {
    let mut reader = MessageReader::new(data);
    let mut idx = 0usize;

    // Use input bytes to drive a bounded sequence of operations. Every read
    // must return a sentinel past the end, never panic.
    while idx < data.len() && idx < 1024 {
        let op = data[idx] % 10;
        idx += 1;

        match op {
            0 => {
                let _ = reader.read_u8();
            }
            1 => {
                let _ = reader.read_i8();
            }
            2 => {
                let _ = reader.read_i16();
            }
            3 => {
                let _ = reader.read_i32();
            }
            4 => {
                let _ = reader.read_string();
            }
            5 => {
                let _ = reader.read_string_line();
            }
            6 => {
                let len = data[idx.saturating_sub(1)] as usize;
                let _ = reader.read_bytes(len);
            }
            7 => {
                let _ = reader.read_pos();
            }
            8 => {
                let _ = reader.read_angle16();
            }
            _ => {
                let _ = reader.read_dir();
            }
        }
    }

    // also drive the variable-length entity header off arbitrary bytes
    let mut reader = MessageReader::new(data);
    while !reader.is_overrun() && reader.remaining() > 0 {
        let _ = codec::parse_entity_header(&mut reader);
    }
});
