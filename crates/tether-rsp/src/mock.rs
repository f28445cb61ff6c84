//! Scripted transport for exercising sessions without a socket.

use std::collections::VecDeque;
use std::io;

use crate::Transport;

/// Deterministic, in-memory [`Transport`] test double.
///
/// Inbound bytes are scripted up front (and can be extended with
/// [`push_input`](Self::push_input)); everything written by the session is
/// captured for inspection via [`output`](Self::output).
pub struct MockTransport {
    input: VecDeque<u8>,
    output: Vec<u8>,
    close_on_empty: bool,
}

impl MockTransport {
    /// Transport that reports end-of-stream once the scripted input is
    /// drained.
    pub fn new(input: impl AsRef<[u8]>) -> Self {
        Self {
            input: input.as_ref().iter().copied().collect(),
            output: Vec::new(),
            close_on_empty: true,
        }
    }

    /// Transport that reports "no data available yet" (rather than
    /// end-of-stream) once the scripted input is drained. Reads past the
    /// script fail instead of blocking forever.
    pub fn idle_after_input(input: impl AsRef<[u8]>) -> Self {
        Self {
            close_on_empty: false,
            ..Self::new(input)
        }
    }

    /// Append more scripted inbound bytes.
    pub fn push_input(&mut self, bytes: impl AsRef<[u8]>) {
        self.input.extend(bytes.as_ref().iter().copied());
    }

    /// Everything the session has written so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.input.is_empty() {
            if self.close_on_empty {
                return Ok(0);
            }
            // A real transport would block here; an idle script should only
            // ever be observed through `is_readable`/`peek`.
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "scripted input exhausted",
            ));
        }
        let mut filled = 0;
        while filled < buf.len() {
            match self.input.pop_front() {
                Some(byte) => {
                    buf[filled] = byte;
                    filled += 1;
                }
                None => break,
            }
        }
        Ok(filled)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn is_readable(&self) -> bool {
        // An exhausted closing script is readable the way a closed socket is:
        // the read that observes the close must not be suppressed.
        !self.input.is_empty() || self.close_on_empty
    }
}
