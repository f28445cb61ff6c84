#![no_main]

use libfuzzer_sys::fuzz_target;
use tether_rsp::mock::MockTransport;
use tether_rsp::{Dispatcher, ParamCursor, RspSession};

// Goal: resolving an arbitrary command body must not panic, however the
// backward prefix scan slices it. Replies that outlive the scripted acks
// surface as a disconnect error, which is expected.
fuzz_target!(|data: &[u8]| {
    let mut dispatcher: Dispatcher<MockTransport> = Dispatcher::new();
    dispatcher.define_reply("g", "0000");
    dispatcher.define_reply("qC", "QC1");
    dispatcher.define_reply("X", "OK");

    let mut session = RspSession::new(MockTransport::new(b"++++"));
    let _ = dispatcher.dispatch(&mut session, data);

    if let Ok(body) = std::str::from_utf8(data) {
        let mut params = ParamCursor::new(body);
        while params.next_str().is_some() {}

        let mut ints = ParamCursor::new(body);
        for _ in 0..32 {
            let _ = ints.next_int(16);
        }
    }
});
