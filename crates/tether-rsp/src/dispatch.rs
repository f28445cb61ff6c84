use std::collections::HashMap;
use std::str;

use crate::session::{Received, RspSession, DEFAULT_BUFFER_SIZE};
use crate::{RspError, RspResult, Transport};

const DELIMITERS: &[u8; 3] = b":;,";

/// What a [`Handler`] did with a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The command was consumed; the handler sent whatever reply was needed.
    Handled,
    /// The command was declined; dispatch keeps trying shorter prefixes.
    NotHandled,
}

/// A command responder registered with a [`Dispatcher`].
///
/// `cmd` is the matched command prefix and `param` the remainder of the
/// packet body, ready for [`ParamCursor`](crate::ParamCursor). Handlers reply
/// through the session themselves and say whether they consumed the command.
pub trait Handler<T>: Send {
    fn handle(
        &mut self,
        session: &mut RspSession<T>,
        cmd: &str,
        param: &str,
    ) -> RspResult<HandlerOutcome>;
}

enum Response<T> {
    Literal(String),
    Handler(Box<dyn Handler<T>>),
}

/// Maps command prefixes to canned replies or [`Handler`]s and drives a
/// session's packet loop.
///
/// Packet bodies do not carry an explicit command/parameter boundary, so
/// dispatch scans the body from the end towards the start, trying ever
/// shorter prefixes against the registry until a responder accepts one. A
/// body like `m4000,2` is offered as `m4000`/`2`, then `m`/`4000,2`, then
/// whole, and finally as its first byte alone.
pub struct Dispatcher<T> {
    responses: HashMap<String, Response<T>>,
}

impl<T> Dispatcher<T> {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
        }
    }

    /// Register a fixed reply for `cmd`, replacing any previous entry.
    pub fn define_reply(&mut self, cmd: impl Into<String>, message: impl Into<String>) {
        self.responses
            .insert(cmd.into(), Response::Literal(message.into()));
    }

    /// Register a handler for `cmd`, replacing any previous entry.
    pub fn define_handler(&mut self, cmd: impl Into<String>, handler: impl Handler<T> + 'static) {
        self.responses
            .insert(cmd.into(), Response::Handler(Box::new(handler)));
    }
}

impl<T: Transport> Dispatcher<T> {
    /// Serve packets until the peer disconnects.
    ///
    /// A disconnect noticed anywhere, including inside a handler, ends the
    /// loop with `Ok`. Interrupt bytes that arrive between packets are
    /// ignored here; pending interrupts are only meaningful inside a handler
    /// that polls [`RspSession::is_interrupted`]. An oversized packet also
    /// ends the session, since the rest of the stream can no longer be
    /// framed reliably.
    pub fn serve(&mut self, session: &mut RspSession<T>) -> RspResult<()> {
        let mut packet = vec![0u8; DEFAULT_BUFFER_SIZE];
        loop {
            match self.serve_one(session, &mut packet) {
                Ok(true) => {}
                Ok(false) => return Ok(()),
                Err(RspError::Disconnected) => {
                    tracing::info!(target: "tether.rsp", "session ended: peer disconnected");
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn serve_one(&mut self, session: &mut RspSession<T>, packet: &mut [u8]) -> RspResult<bool> {
        match session.receive_packet(packet)? {
            Received::Interrupted => Ok(true),
            Received::Overflowed => {
                tracing::info!(target: "tether.rsp", "session ended: oversized packet");
                Ok(false)
            }
            // An empty command gets no reply at all.
            Received::Packet(0) => Ok(true),
            Received::Packet(n) => {
                self.dispatch(session, &packet[..n])?;
                Ok(true)
            }
        }
    }

    /// Resolve one packet body against the registry and send the reply.
    ///
    /// Commands nothing claims are answered with the empty packet, which the
    /// debugger reads as "unsupported". Empty bodies are ignored.
    pub fn dispatch(&mut self, session: &mut RspSession<T>, body: &[u8]) -> RspResult<()> {
        if body.is_empty() {
            return Ok(());
        }

        let mut scanner = TokenScanner::new(body);
        while let Some((cmd, param)) = scanner.next_token() {
            if self.try_respond(session, cmd, param)? {
                return Ok(());
            }
        }

        // Last resort: the first byte alone as the command.
        if self.try_respond(session, &body[..1], &body[1..])? {
            return Ok(());
        }

        tracing::debug!(
            target: "tether.rsp",
            body = %body.escape_ascii(),
            "unsupported command"
        );
        session.send_packet(b"")?;
        Ok(())
    }

    fn try_respond(
        &mut self,
        session: &mut RspSession<T>,
        cmd: &[u8],
        param: &[u8],
    ) -> RspResult<bool> {
        // Command names are ASCII in practice; a prefix that is not valid
        // UTF-8 cannot be in the registry.
        let Ok(cmd) = str::from_utf8(cmd) else {
            return Ok(false);
        };
        match self.responses.get_mut(cmd) {
            Some(Response::Literal(message)) => {
                session.send_packet(message.as_bytes())?;
                Ok(true)
            }
            Some(Response::Handler(handler)) => {
                // Binary parameters only reach registered handlers; canned
                // replies above never inspect them.
                let Ok(param) = str::from_utf8(param) else {
                    return Ok(false);
                };
                Ok(handler.handle(session, cmd, param)? == HandlerOutcome::Handled)
            }
            None => Ok(false),
        }
    }
}

impl<T> Default for Dispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Backward scanner producing candidate command/parameter splits.
///
/// The cursor starts past the end of the body and walks left. A delimiter
/// (`:`, `;` or `,`) splits just before it; a run of digits (with `-`)
/// splits at the run's start. When the scan reaches the front without
/// another split the whole body is yielded once with an empty parameter,
/// after which the scanner is exhausted for good.
struct TokenScanner<'a> {
    body: &'a [u8],
    sep: Option<usize>,
}

impl<'a> TokenScanner<'a> {
    fn new(body: &'a [u8]) -> Self {
        Self {
            body,
            sep: Some(body.len()),
        }
    }

    fn next_token(&mut self) -> Option<(&'a [u8], &'a [u8])> {
        let start = self.sep?;
        if start == 0 {
            self.sep = None;
            return None;
        }

        let mut digits = 0;
        let mut pos = start;
        while pos > 0 {
            pos -= 1;
            let byte = self.body[pos];
            if DELIMITERS.contains(&byte) {
                self.sep = Some(pos);
                return Some((&self.body[..pos], &self.body[pos + 1..]));
            }
            if byte == b'-' || byte.is_ascii_digit() {
                digits += 1;
                continue;
            }
            if digits > 0 {
                let split = pos + 1;
                self.sep = Some(split);
                return Some((&self.body[..split], &self.body[split..]));
            }
        }

        // No further split point; offer the whole body.
        self.sep = Some(0);
        Some((self.body, b"".as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::mock::MockTransport;
    use pretty_assertions::assert_eq;

    fn tokens(body: &[u8]) -> Vec<(String, String)> {
        let mut scanner = TokenScanner::new(body);
        let mut out = Vec::new();
        while let Some((cmd, param)) = scanner.next_token() {
            out.push((
                String::from_utf8_lossy(cmd).into_owned(),
                String::from_utf8_lossy(param).into_owned(),
            ));
        }
        out
    }

    fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
        expected
            .iter()
            .map(|(c, p)| (c.to_string(), p.to_string()))
            .collect()
    }

    #[test]
    fn scans_splits_from_the_end_backwards() {
        assert_eq!(
            tokens(b"m0,1"),
            pairs(&[("m0", "1"), ("m", "0,1"), ("m0,1", "")])
        );
    }

    #[test]
    fn scans_nested_delimiters_and_digit_runs() {
        assert_eq!(
            tokens(b"Z0,4000,1"),
            pairs(&[
                ("Z0,4000", "1"),
                ("Z0", "4000,1"),
                ("Z", "0,4000,1"),
                ("Z0,4000,1", ""),
            ])
        );
    }

    #[test]
    fn body_without_split_points_is_yielded_whole() {
        assert_eq!(tokens(b"qC"), pairs(&[("qC", "")]));
    }

    #[test]
    fn semicolon_splits_verbose_commands() {
        assert_eq!(
            tokens(b"vCont;c"),
            pairs(&[("vCont", "c"), ("vCont;c", "")])
        );
    }

    #[test]
    fn minus_sign_counts_as_part_of_a_number() {
        assert_eq!(tokens(b"z-1"), pairs(&[("z", "-1"), ("z-1", "")]));
    }

    #[test]
    fn leading_delimiter_yields_an_empty_command() {
        assert_eq!(tokens(b";x"), pairs(&[("", "x")]));
    }

    #[test]
    fn scanner_stays_exhausted() {
        let mut scanner = TokenScanner::new(b"qC");
        assert!(scanner.next_token().is_some());
        assert!(scanner.next_token().is_none());
        assert!(scanner.next_token().is_none());
    }

    /// Records every invocation and returns a fixed outcome.
    struct Recorder {
        calls: Arc<Mutex<Vec<(String, String)>>>,
        outcome: HandlerOutcome,
    }

    impl Recorder {
        fn new(outcome: HandlerOutcome) -> (Self, Arc<Mutex<Vec<(String, String)>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    calls: Arc::clone(&calls),
                    outcome,
                },
                calls,
            )
        }
    }

    impl<T> Handler<T> for Recorder {
        fn handle(
            &mut self,
            _session: &mut RspSession<T>,
            cmd: &str,
            param: &str,
        ) -> RspResult<HandlerOutcome> {
            self.calls
                .lock()
                .unwrap()
                .push((cmd.to_string(), param.to_string()));
            Ok(self.outcome)
        }
    }

    fn session(input: &[u8]) -> RspSession<MockTransport> {
        RspSession::new(MockTransport::new(input))
    }

    #[test]
    fn literal_reply_is_sent_framed() {
        let mut dispatcher: Dispatcher<MockTransport> = Dispatcher::new();
        dispatcher.define_reply("g", "0000");

        let mut session = session(b"+");
        dispatcher.dispatch(&mut session, b"g").unwrap();
        assert_eq!(session.transport_mut().output(), b"$0000#c0");
    }

    #[test]
    fn longest_prefix_wins_over_the_fallback() {
        let mut dispatcher = Dispatcher::new();
        let (recorder, calls) = Recorder::new(HandlerOutcome::Handled);
        dispatcher.define_reply("qC", "QC0");
        dispatcher.define_handler("q", recorder);

        let mut session = session(b"+");
        dispatcher.dispatch(&mut session, b"qC").unwrap();

        assert_eq!(session.transport_mut().output(), b"$QC0#c4");
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn fallback_offers_the_first_byte_alone() {
        let mut dispatcher = Dispatcher::new();
        let (recorder, calls) = Recorder::new(HandlerOutcome::Handled);
        dispatcher.define_handler("q", recorder);

        let mut session = session(b"");
        dispatcher.dispatch(&mut session, b"qC").unwrap();

        assert_eq!(*calls.lock().unwrap(), pairs(&[("q", "C")]));
        assert!(session.transport_mut().output().is_empty());
    }

    #[test]
    fn declined_commands_keep_scanning_and_end_unsupported() {
        let mut dispatcher = Dispatcher::new();
        let (recorder, calls) = Recorder::new(HandlerOutcome::NotHandled);
        dispatcher.define_handler("m", recorder);

        let mut session = session(b"+");
        dispatcher.dispatch(&mut session, b"m0,1").unwrap();

        // Consulted for the "m" prefix and again through the fallback, then
        // answered with the empty (unsupported) packet.
        assert_eq!(
            *calls.lock().unwrap(),
            pairs(&[("m", "0,1"), ("m", "0,1")])
        );
        assert_eq!(session.transport_mut().output(), b"$#00");
    }

    #[test]
    fn unknown_commands_get_the_empty_reply() {
        let mut dispatcher: Dispatcher<MockTransport> = Dispatcher::new();
        let mut session = session(b"+");
        dispatcher.dispatch(&mut session, b"Z9,0,0").unwrap();
        assert_eq!(session.transport_mut().output(), b"$#00");
    }

    #[test]
    fn binary_parameters_still_reach_literal_replies() {
        let mut dispatcher: Dispatcher<MockTransport> = Dispatcher::new();
        dispatcher.define_reply("X", "OK");

        let mut session = session(b"+");
        dispatcher.dispatch(&mut session, b"X0,2:\xff\xfe").unwrap();
        assert_eq!(session.transport_mut().output(), b"$OK#9a");
    }

    #[test]
    fn serve_replies_until_disconnect() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.define_reply("qAttached", "1");

        // One packet, the debugger's ack for our reply, then EOF.
        let mut session = session(b"$qAttached#8f+");
        dispatcher.serve(&mut session).unwrap();
        assert_eq!(session.transport_mut().output(), b"+$1#31");
    }

    #[test]
    fn serve_ignores_empty_commands() {
        let mut dispatcher: Dispatcher<MockTransport> = Dispatcher::new();
        let mut session = session(b"$#00");
        dispatcher.serve(&mut session).unwrap();
        // Acknowledged but never answered.
        assert_eq!(session.transport_mut().output(), b"+");
    }

    #[test]
    fn serve_ignores_idle_interrupts() {
        let mut dispatcher: Dispatcher<MockTransport> = Dispatcher::new();
        let mut session = session(&[0x03]);
        dispatcher.serve(&mut session).unwrap();
        assert!(session.transport_mut().output().is_empty());
    }

    #[test]
    fn serve_ends_on_oversized_packet() {
        let mut dispatcher: Dispatcher<MockTransport> = Dispatcher::new();

        // 5000 payload bytes cannot fit the serve loop's scratch buffer.
        let mut input = Vec::from(&b"$"[..]);
        input.extend(std::iter::repeat(b'a').take(5000));
        input.extend_from_slice(b"#88");
        let mut session = session(&input);

        dispatcher.serve(&mut session).unwrap();
        assert!(session.transport_mut().output().is_empty());
    }
}
