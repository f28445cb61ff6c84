//! GDB Remote Serial Protocol (RSP) engine for Tether.
//!
//! `tether-stub` consumes this crate to serve a debug target to a connecting
//! GDB. The crate owns the wire-level concerns only: buffered byte streams
//! over a [`Transport`], the `$...#xx` framing state machine with checksum,
//! escape and run-length decoding, ACK/NAK retransmission, and the command
//! dispatcher that splits packet bodies into `(command, parameter)` pairs and
//! routes them to registered replies.
//!
//! What a command *means* (register values, memory contents, breakpoints) is
//! the caller's business: commands are registered on a [`Dispatcher`] either
//! as literal reply strings or as [`Handler`] implementations.

mod buffer;
mod dispatch;
mod hex;
mod params;
mod session;

// The scripted transport is only needed for tests and downstream integration
// suites. Compile it for tether-rsp's own unit tests unconditionally (via
// `cfg(test)`), while keeping it behind features for normal builds, downstream
// crates, and the fuzz targets.
#[cfg(any(test, feature = "mock-transport", feature = "fuzzing"))]
pub mod mock;

use std::io;

use thiserror::Error;

pub use buffer::{PacketBuffer, Peeked};
pub use dispatch::{Dispatcher, Handler, HandlerOutcome};
pub use hex::{hexify, unhexify};
pub use params::ParamCursor;
pub use session::{Received, RspSession, DEFAULT_BUFFER_SIZE};

pub type RspResult<T> = Result<T, RspError>;

#[derive(Debug, Error)]
pub enum RspError {
    #[error("transport closed by peer")]
    Disconnected,
    #[error("no acknowledgement after {0} retransmissions")]
    Unacknowledged(u32),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Byte-oriented duplex connection to the debugger.
///
/// `read` and `write` follow `std::io` conventions (`Ok(0)` from `read` means
/// the peer closed the stream). `is_readable` is a non-blocking poll used to
/// look for input without committing to a read; it must report `true` for a
/// closed stream so that the close is observed on the next read.
pub trait Transport: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn is_readable(&self) -> bool;
}
