#![no_main]

use client::{parse_server_message, ClientSession, ConnState, NullEvents};
use libfuzzer_sys::fuzz_target;
use msg::MessageReader;
use netchan::{ChanSide, Netchan};

fuzz_target!(|data: &[u8]| {
    // Treat the input as a sequence of length-prefixed datagram payloads
    // arriving on one connection. Protocol errors are expected outcomes;
    // panics and runaway allocation are bugs.
    let mut cl = ClientSession::new(0x1234);
    cl.state = ConnState::Connected;

    let mut idx = 0usize;
    while idx < data.len() {
        let len = (data[idx] as usize % 200).saturating_add(1);
        idx += 1;
        let end = (idx + len).min(data.len());
        let frame = &data[idx..end];
        idx = end;

        let mut reader = MessageReader::new(frame);
        if parse_server_message(&mut cl, &mut reader, &mut NullEvents).is_err() {
            // a fatal error resets the session, as the pump would
            cl.reset();
            cl.state = ConnState::Connected;
        }
    }

    // the channel header parser must accept arbitrary bytes too
    let mut chan = Netchan::new(ChanSide::Client { qport: 7 }, 0);
    let mut reader = MessageReader::new(data);
    let _ = chan.process(&mut reader, 0);
});
