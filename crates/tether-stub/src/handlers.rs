use std::thread;
use std::time::Duration;

use tether_rsp::{
    hexify, unhexify, Dispatcher, Handler, HandlerOutcome, ParamCursor, RspResult, RspSession,
    Transport, DEFAULT_BUFFER_SIZE,
};

/// Build the stub's command table.
///
/// Canned replies fake a tiny single-threaded target: memory reads come back
/// zeroed and registers hold fixed values, which is all a debugger needs to
/// believe it is attached.
pub fn dispatcher<T: Transport>() -> Dispatcher<T> {
    let mut dispatcher = Dispatcher::new();

    // Execution control.
    dispatcher.define_handler("c", ContinueHandler::default());
    dispatcher.define_handler("C", ContinueHandler::default());
    dispatcher.define_handler("s", StepHandler);
    // Halt reason.
    dispatcher.define_reply("?", format!("S{:02x}", libc::SIGTRAP));

    // Registers.
    dispatcher.define_reply("g", "xxxxxxxx0000000100000002");
    dispatcher.define_reply("G", "OK");
    dispatcher.define_reply("p", "12345678");
    dispatcher.define_reply("P", "OK");

    // Memory.
    dispatcher.define_handler("m", MemoryHandler);
    dispatcher.define_handler("M", MemoryHandler);
    dispatcher.define_reply("X", "OK");

    // General queries.
    dispatcher.define_handler("q", QueryHandler);
    dispatcher.define_handler("Q", QueryHandler);
    dispatcher.define_handler("qRcmd", RemoteCommandHandler);

    // Thread selection and liveness.
    dispatcher.define_reply("Hc", "OK");
    dispatcher.define_reply("Hg", "OK");
    dispatcher.define_reply("T", "OK");

    // Breakpoints and watchpoints always take.
    dispatcher.define_reply("z", "OK");
    dispatcher.define_reply("Z", "OK");

    // Detach.
    dispatcher.define_reply("D", "OK");

    dispatcher
}

/// Answers `q`/`Q` general queries for a target with one fake thread.
struct QueryHandler;

impl<T: Transport> Handler<T> for QueryHandler {
    fn handle(
        &mut self,
        session: &mut RspSession<T>,
        cmd: &str,
        param: &str,
    ) -> RspResult<HandlerOutcome> {
        let mut params = ParamCursor::new(param);
        let Some(subcmd) = params.next_str() else {
            return Ok(HandlerOutcome::NotHandled);
        };

        if cmd == "Q" {
            return match subcmd {
                "StartNoAckMode" => {
                    // No-ack mode covers the confirmation itself.
                    session.set_no_ack_mode(true);
                    session.send_packet(b"OK")?;
                    Ok(HandlerOutcome::Handled)
                }
                "PassSignals" => {
                    session.send_packet(b"OK")?;
                    Ok(HandlerOutcome::Handled)
                }
                _ => Ok(HandlerOutcome::NotHandled),
            };
        }

        match subcmd {
            "Supported" => {
                session.send_packet_fmt(format_args!(
                    "PacketSize={:x};qXfer:libraries:read+;qXfer:features:read+;QStartNoAckMode+;QPassSignals+",
                    DEFAULT_BUFFER_SIZE - 1
                ))?;
                Ok(HandlerOutcome::Handled)
            }
            "Xfer" => {
                // Minimal target description; enough for the debugger to
                // pick an architecture.
                session.send_packet(
                    b"l<target version=\"1.0\"><architecture>i386</architecture></target>",
                )?;
                Ok(HandlerOutcome::Handled)
            }
            "C" => {
                session.send_packet(b"QC1234")?;
                Ok(HandlerOutcome::Handled)
            }
            "Attached" => {
                session.send_packet(b"1")?;
                Ok(HandlerOutcome::Handled)
            }
            "fThreadInfo" => {
                session.send_packet(b"m1234,1000,2000,3000")?;
                Ok(HandlerOutcome::Handled)
            }
            "sThreadInfo" => {
                session.send_packet(b"l")?;
                Ok(HandlerOutcome::Handled)
            }
            "ThreadExtraInfo" => {
                session.send_packet(hexify(b"thread info la la la").as_bytes())?;
                Ok(HandlerOutcome::Handled)
            }
            "Offsets" => {
                session.send_packet(b"Text=0;Data=1;Bss=2")?;
                Ok(HandlerOutcome::Handled)
            }
            "Symbol" => {
                let name = params.next_str();
                let value = params.next_str();
                match (name, value) {
                    (Some(""), Some("")) => {
                        // Ask the debugger to look up `main` for us.
                        session.send_packet_fmt(format_args!("qSymbol:{}", hexify(b"main")))?;
                        Ok(HandlerOutcome::Handled)
                    }
                    (Some(_), Some(_)) => {
                        session.send_packet(b"OK")?;
                        Ok(HandlerOutcome::Handled)
                    }
                    _ => Ok(HandlerOutcome::NotHandled),
                }
            }
            // Known queries with nothing to report decline, so the
            // dispatcher answers with the empty packet.
            "TStatus" | "L" | "CRC" | "P" => Ok(HandlerOutcome::NotHandled),
            // Everything else is consumed without any reply.
            _ => Ok(HandlerOutcome::Handled),
        }
    }
}

/// Fake memory: reads come back zero filled, writes are accepted and dropped.
struct MemoryHandler;

/// Longest `m` read the stub will answer. A reply carries two hex
/// characters per byte and has to fit in the packet size advertised by
/// `qSupported`; the length comes straight off the wire, so anything
/// bigger gets an error instead of an allocation.
const MAX_READ_BYTES: i64 = (DEFAULT_BUFFER_SIZE as i64 - 1) / 2;

impl<T: Transport> Handler<T> for MemoryHandler {
    fn handle(
        &mut self,
        session: &mut RspSession<T>,
        cmd: &str,
        param: &str,
    ) -> RspResult<HandlerOutcome> {
        match cmd {
            "m" => {
                let mut params = ParamCursor::new(param);
                let addr = params.next_int(16);
                let length = params.next_int(16);
                match (addr, length) {
                    (Some(_), Some(length)) if (0..=MAX_READ_BYTES).contains(&length) => {
                        let payload = "00".repeat(length as usize);
                        session.send_packet(payload.as_bytes())?;
                    }
                    _ => {
                        session.send_packet(b"E00")?;
                    }
                }
            }
            "M" => {
                session.send_packet(b"OK")?;
            }
            _ => {}
        }
        Ok(HandlerOutcome::Handled)
    }
}

/// Pretends to resume the target, reporting a stop only when the debugger
/// interrupts.
struct ContinueHandler {
    poll_interval: Duration,
}

impl Default for ContinueHandler {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl<T: Transport> Handler<T> for ContinueHandler {
    fn handle(
        &mut self,
        session: &mut RspSession<T>,
        cmd: &str,
        param: &str,
    ) -> RspResult<HandlerOutcome> {
        if cmd == "C" {
            tracing::info!(target: "tether.stub", signal = param, "delivering signal");
            session.send_packet_fmt(format_args!("S{param}"))?;
            return Ok(HandlerOutcome::Handled);
        }

        if cmd == "c" {
            let location = if param.is_empty() { "current" } else { param };
            tracing::info!(target: "tether.stub", location, "resuming");
        }

        loop {
            tracing::debug!(target: "tether.stub", "target running");
            if session.is_interrupted()? {
                session.send_packet_fmt(format_args!("S{:02x}", libc::SIGINT))?;
                return Ok(HandlerOutcome::Handled);
            }
            thread::sleep(self.poll_interval);
        }
    }
}

/// Single step: reports an immediate SIGTRAP stop with canned registers.
struct StepHandler;

impl<T: Transport> Handler<T> for StepHandler {
    fn handle(
        &mut self,
        session: &mut RspSession<T>,
        cmd: &str,
        param: &str,
    ) -> RspResult<HandlerOutcome> {
        if cmd == "S" {
            tracing::info!(target: "tether.stub", signal = param, "delivering signal");
            session.send_packet_fmt(format_args!("S{param}"))?;
            return Ok(HandlerOutcome::Handled);
        }

        if cmd == "s" {
            let location = if param.is_empty() { "current" } else { param };
            tracing::info!(target: "tether.stub", location, "stepping");
        }

        session.send_packet_fmt(format_args!(
            "T{:02x}05:01020304;04:02030405;08:03040506;thread:1234;",
            libc::SIGTRAP
        ))?;
        Ok(HandlerOutcome::Handled)
    }
}

/// Handles `monitor` commands forwarded through `qRcmd`.
struct RemoteCommandHandler;

impl<T: Transport> Handler<T> for RemoteCommandHandler {
    fn handle(
        &mut self,
        session: &mut RspSession<T>,
        _cmd: &str,
        param: &str,
    ) -> RspResult<HandlerOutcome> {
        let decoded = unhexify(param);
        tracing::info!(
            target: "tether.stub",
            command = %String::from_utf8_lossy(&decoded),
            "monitor command"
        );
        // Console output goes out hex encoded in an `O` packet, then the
        // command itself is acknowledged.
        session.send_packet_fmt(format_args!("O{}", hexify(b"how are you?\n")))?;
        session.send_packet(b"OK")?;
        Ok(HandlerOutcome::Handled)
    }
}
