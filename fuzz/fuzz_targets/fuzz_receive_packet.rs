#![no_main]

use libfuzzer_sys::fuzz_target;
use tether_rsp::mock::MockTransport;
use tether_rsp::{Received, RspError, RspSession};

// Goal: never panic and never hang, whatever arrives on the wire. Decoded
// bodies stay within the caller's buffer and the end of the scripted input
// always surfaces as a disconnect.
fuzz_target!(|data: &[u8]| {
    let mut session = RspSession::with_buffer_size(MockTransport::new(data), 64);
    let mut packet = [0u8; 64];
    loop {
        match session.receive_packet(&mut packet) {
            Ok(Received::Packet(n)) => assert!(n < packet.len() - 1),
            Ok(Received::Interrupted) | Ok(Received::Overflowed) => {}
            Err(RspError::Disconnected) => break,
            Err(err) => panic!("unexpected receive error: {err}"),
        }
    }
});
