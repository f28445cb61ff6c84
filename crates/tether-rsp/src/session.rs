use std::fmt;

use crate::buffer::{PacketBuffer, Peeked};
use crate::hex::{hex_char, hex_value};
use crate::{RspError, RspResult, Transport};

/// Default capacity of a session's receive and send buffers, and the
/// conventional scratch size for decoded packet bodies.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

const INTERRUPT: u8 = 0x03;

/// Outcome of [`RspSession::receive_packet`] that leaves the session usable.
///
/// Transport failures are reported through [`RspError`] instead and end the
/// session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Received {
    /// A checksum-verified packet body of this many bytes.
    Packet(usize),
    /// A bare `0x03` arrived while waiting for a frame start.
    Interrupted,
    /// The decoded body would not fit the caller's buffer.
    Overflowed,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    Cmd,
    Checksum1,
    Checksum2,
}

/// One RSP session over a [`Transport`].
///
/// Owns the buffered receive and send streams and implements the framing
/// state machine on top of them: `$<payload>#<checksum>` packets in,
/// acknowledged replies out. The session is generic over its transport the
/// same way it is served: one connection, single-threaded, blocking.
pub struct RspSession<T> {
    transport: T,
    recv_buffer: PacketBuffer,
    send_buffer: PacketBuffer,
    no_ack_mode: bool,
    max_resend: Option<u32>,
}

impl<T: Transport> RspSession<T> {
    pub fn new(transport: T) -> Self {
        Self::with_buffer_size(transport, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(transport: T, size: usize) -> Self {
        Self {
            transport,
            recv_buffer: PacketBuffer::new(size),
            send_buffer: PacketBuffer::new(size),
            no_ack_mode: false,
            max_resend: None,
        }
    }

    /// Mutable access to the underlying transport. This is primarily useful
    /// in tests with [`crate::mock::MockTransport`].
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Stop exchanging `+`/`-` acknowledgements. Entered once via the
    /// `QStartNoAckMode` command and never left for the rest of the session.
    pub fn set_no_ack_mode(&mut self, no_ack_mode: bool) {
        tracing::debug!(target: "tether.rsp", no_ack_mode, "ack exchange toggled");
        self.no_ack_mode = no_ack_mode;
    }

    pub fn is_no_ack_mode(&self) -> bool {
        self.no_ack_mode
    }

    /// Cap how many times an unacknowledged reply is retransmitted before
    /// [`RspError::Unacknowledged`] is returned. `None` (the default) retries
    /// forever, which is what the protocol expects of a conforming stub.
    pub fn set_max_resend(&mut self, limit: Option<u32>) {
        self.max_resend = limit;
    }

    /// Non-consuming check for a pending `0x03` interrupt request, for use
    /// inside long-running command handlers. The interrupt byte itself is
    /// consumed when found; any other pending byte is left in place.
    pub fn is_interrupted(&mut self) -> RspResult<bool> {
        match self.recv_buffer.peek(&mut self.transport)? {
            Peeked::Byte(INTERRUPT) => {
                let _ = self.recv_buffer.get_byte(&mut self.transport)?;
                Ok(true)
            }
            Peeked::Byte(_) | Peeked::Empty => Ok(false),
            Peeked::Closed => Err(RspError::Disconnected),
        }
    }

    /// Receive one packet, decoding escapes and run-length runs into
    /// `packet` and verifying the checksum.
    ///
    /// Framing errors (bad hex, bad escape, checksum mismatch) are answered
    /// with a single NAK and parsing restarts; they are never surfaced to the
    /// caller. A read failure at any point is [`RspError::Disconnected`].
    pub fn receive_packet(&mut self, packet: &mut [u8]) -> RspResult<Received> {
        let limit = packet.len().saturating_sub(1);
        let mut state = State::Init;
        let mut checksum: u8 = 0;
        let mut checkcode: u8 = 0;
        let mut out = 0usize;

        while out < limit {
            let ch = self.read_byte()?;

            if ch == b'$' {
                // A fresh frame start always restarts framing.
                (state, checksum, checkcode, out) = (State::Cmd, 0, 0, 0);
                continue;
            }
            if ch == b'#' {
                if state == State::Cmd {
                    state = State::Checksum1;
                    continue;
                }
                (state, checksum, checkcode, out) = (State::Init, 0, 0, 0);
                self.send_nak()?;
                continue;
            }

            match state {
                State::Init => {
                    if ch == INTERRUPT {
                        return Ok(Received::Interrupted);
                    }
                    // Noise between frames is discarded.
                }
                State::Cmd => {
                    checksum = checksum.wrapping_add(ch);

                    match ch {
                        b'*' => {
                            if out == 0 {
                                // Nothing decoded yet, so there is no byte to
                                // repeat.
                                (state, checksum, checkcode, out) = (State::Init, 0, 0, 0);
                                self.send_nak()?;
                                continue;
                            }
                            let follow = self.read_byte()?;
                            if matches!(follow, b'#' | b'$' | b'+' | b'-') {
                                (state, checksum, checkcode, out) = (State::Init, 0, 0, 0);
                                self.send_nak()?;
                                continue;
                            }
                            checksum = checksum.wrapping_add(follow);

                            let repeat = usize::from(follow).saturating_sub(29);
                            let fill = packet[out - 1];
                            let emit = repeat.min(limit - out);
                            packet[out..out + emit].fill(fill);
                            out += emit;
                        }
                        b'}' => {
                            let follow = self.read_byte()?;
                            checksum = checksum.wrapping_add(follow);
                            packet[out] = follow ^ 0x20;
                            out += 1;
                        }
                        _ => {
                            packet[out] = ch;
                            out += 1;
                        }
                    }
                }
                State::Checksum1 | State::Checksum2 => {
                    let Some(digit) = hex_value(ch) else {
                        (state, checksum, checkcode, out) = (State::Init, 0, 0, 0);
                        self.send_nak()?;
                        continue;
                    };
                    checkcode = (checkcode << 4) | digit;

                    if state == State::Checksum1 {
                        state = State::Checksum2;
                        continue;
                    }
                    if checkcode == checksum {
                        if !self.no_ack_mode {
                            self.send_buffer.put_byte(&mut self.transport, b'+')?;
                        }
                        self.send_buffer.flush(&mut self.transport)?;
                        tracing::debug!(target: "tether.rsp", len = out, "packet received");
                        return Ok(Received::Packet(out));
                    }
                    tracing::debug!(
                        target: "tether.rsp",
                        computed = checksum,
                        received = checkcode,
                        "checksum mismatch"
                    );
                    (state, checksum, checkcode, out) = (State::Init, 0, 0, 0);
                    self.send_nak()?;
                }
            }
        }

        tracing::warn!(target: "tether.rsp", capacity = packet.len(), "packet overflowed buffer");
        Ok(Received::Overflowed)
    }

    /// Frame `payload` and transmit it, retransmitting until the debugger
    /// acknowledges.
    ///
    /// Outgoing payloads are sent as-is: no byte stuffing or run-length
    /// encoding is applied, so payloads containing `$`, `#`, `}` or `*` will
    /// corrupt framing on the wire. Replies produced by this crate's callers
    /// are plain text, which never needs escaping.
    ///
    /// A `$` read back instead of an acknowledgement is the next inbound
    /// packet arriving early; it is pushed back and treated as an implicit
    /// acknowledgement.
    pub fn send_packet(&mut self, payload: &[u8]) -> RspResult<usize> {
        let mut checksum: u8 = 0;
        for &byte in payload {
            checksum = checksum.wrapping_add(byte);
        }

        let mut attempts: u32 = 0;
        loop {
            self.send_buffer.put_byte(&mut self.transport, b'$')?;
            self.send_buffer.write_bytes(&mut self.transport, payload)?;
            self.send_buffer.put_byte(&mut self.transport, b'#')?;
            self.send_buffer
                .put_byte(&mut self.transport, hex_char(checksum >> 4))?;
            self.send_buffer.put_byte(&mut self.transport, hex_char(checksum))?;
            self.send_buffer.flush(&mut self.transport)?;

            if self.no_ack_mode {
                break;
            }

            match self.read_byte()? {
                b'+' => break,
                b'$' => {
                    self.recv_buffer.unget_byte(b'$');
                    break;
                }
                _ => {
                    attempts += 1;
                    if let Some(max) = self.max_resend {
                        if attempts > max {
                            return Err(RspError::Unacknowledged(attempts));
                        }
                    }
                    tracing::debug!(target: "tether.rsp", attempts, "retransmitting reply");
                }
            }
        }
        Ok(payload.len())
    }

    /// [`send_packet`](Self::send_packet) over a formatted payload.
    pub fn send_packet_fmt(&mut self, args: fmt::Arguments<'_>) -> RspResult<usize> {
        self.send_packet(fmt::format(args).as_bytes())
    }

    fn read_byte(&mut self) -> RspResult<u8> {
        match self.recv_buffer.get_byte(&mut self.transport)? {
            Some(byte) => Ok(byte),
            None => Err(RspError::Disconnected),
        }
    }

    fn send_nak(&mut self) -> RspResult<()> {
        tracing::trace!(target: "tether.rsp", "framing reset, requesting retransmission");
        self.send_buffer.put_byte(&mut self.transport, b'-')?;
        self.send_buffer.flush(&mut self.transport)?;
        Ok(())
    }
}
