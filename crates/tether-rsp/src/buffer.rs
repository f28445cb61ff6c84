use std::io;

use crate::Transport;

/// Result of a non-blocking look at the next inbound byte.
///
/// The distinction between `Empty` and `Closed` matters to interrupt polling:
/// a long-running command keeps polling through `Empty`, while `Closed` means
/// the debugger went away and the session should end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Peeked {
    Byte(u8),
    /// No byte is available right now; a later read may still succeed.
    Empty,
    /// The peer closed the stream.
    Closed,
}

/// Fixed-capacity buffered byte stream over a [`Transport`].
///
/// One instance buffers a single direction. The owning session passes its
/// transport into each call, so the receive and send buffers of a session can
/// share one connection without aliasing it.
///
/// A single pushed-back byte is supported and is always returned before any
/// buffered byte.
pub struct PacketBuffer {
    data: Box<[u8]>,
    /// Number of valid bytes in `data` (refilled input, or pending output).
    len: usize,
    /// Read cursor into `data`; only meaningful on the receive side.
    pos: usize,
    pushback: Option<u8>,
}

impl PacketBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity].into_boxed_slice(),
            len: 0,
            pos: 0,
            pushback: None,
        }
    }

    /// Next inbound byte without consuming it, refilling from the transport
    /// only when it reports data available.
    pub fn peek<T: Transport + ?Sized>(&mut self, transport: &mut T) -> io::Result<Peeked> {
        if let Some(byte) = self.pushback {
            return Ok(Peeked::Byte(byte));
        }
        if self.pos >= self.len {
            if !transport.is_readable() {
                return Ok(Peeked::Empty);
            }
            if !self.refill(transport)? {
                return Ok(Peeked::Closed);
            }
        }
        Ok(Peeked::Byte(self.data[self.pos]))
    }

    /// Next inbound byte, blocking on the transport when the buffer is
    /// exhausted. `None` means the peer closed the stream.
    pub fn get_byte<T: Transport + ?Sized>(&mut self, transport: &mut T) -> io::Result<Option<u8>> {
        if let Some(byte) = self.pushback.take() {
            return Ok(Some(byte));
        }
        if self.pos >= self.len {
            if !self.refill(transport)? {
                self.len = 0;
                self.pos = 0;
                return Ok(None);
            }
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(Some(byte))
    }

    /// Push one byte back; it is returned by the next `peek`/`get_byte`.
    /// A second unget before that overwrites the first.
    pub fn unget_byte(&mut self, byte: u8) {
        self.pushback = Some(byte);
    }

    /// Fill `dst` from the stream, stopping early if the peer closes it.
    /// Returns the number of bytes placed in `dst`.
    pub fn read_bytes<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        dst: &mut [u8],
    ) -> io::Result<usize> {
        let mut filled = 0;
        while filled < dst.len() {
            match self.get_byte(transport)? {
                Some(byte) => {
                    dst[filled] = byte;
                    filled += 1;
                }
                None => break,
            }
        }
        Ok(filled)
    }

    /// Append one byte to the output buffer, flushing first if it is full.
    pub fn put_byte<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        byte: u8,
    ) -> io::Result<()> {
        if self.len >= self.data.len() {
            self.flush(transport)?;
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Append a slice to the output buffer (`put_byte` looped). Returns the
    /// number of bytes accepted, which on success is the whole slice; a
    /// failed implicit flush surfaces as the error instead.
    pub fn write_bytes<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        src: &[u8],
    ) -> io::Result<usize> {
        for &byte in src {
            self.put_byte(transport, byte)?;
        }
        Ok(src.len())
    }

    /// Drain the buffered output region to the transport. Returns the number
    /// of bytes written; zero when there was nothing to do.
    pub fn flush<T: Transport + ?Sized>(&mut self, transport: &mut T) -> io::Result<usize> {
        let mut written = 0;
        while written < self.len {
            let n = transport.write(&self.data[written..self.len])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "transport accepted no bytes",
                ));
            }
            tracing::trace!(
                target: "tether.rsp",
                "out> {}",
                self.data[written..written + n].escape_ascii()
            );
            written += n;
        }
        self.len = 0;
        self.pos = 0;
        Ok(written)
    }

    /// Read one transport chunk into the buffer. `false` means end of stream.
    fn refill<T: Transport + ?Sized>(&mut self, transport: &mut T) -> io::Result<bool> {
        let n = transport.read(&mut self.data)?;
        if n == 0 {
            return Ok(false);
        }
        self.len = n;
        self.pos = 0;
        tracing::trace!(target: "tether.rsp", "in> {}", self.data[..n].escape_ascii());
        Ok(true)
    }
}
