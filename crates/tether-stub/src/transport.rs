use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};

use anyhow::{Context, Result};
use tether_rsp::Transport;

/// Serves one debugger over TCP: bind, accept a single connection, then
/// speak on it for the rest of the process lifetime.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Bind `port` on all interfaces and block until a debugger connects.
    pub fn accept(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .with_context(|| format!("failed to bind TCP port {port}"))?;
        tracing::info!(target: "tether.stub", port, "listening for a debugger");
        Self::accept_from(&listener)
    }

    fn accept_from(listener: &TcpListener) -> Result<Self> {
        let (stream, peer) = listener
            .accept()
            .context("failed to accept debugger connection")?;
        tracing::info!(target: "tether.stub", %peer, "debugger connected");
        Ok(Self { stream })
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn is_readable(&self) -> bool {
        poll_readable(self.stream.as_raw_fd())
    }
}

/// Debugger conversation over the process's own stdin and stdout.
///
/// Reads and writes go straight to the file descriptors. Going through the
/// locked `Stdin` handle would buffer bytes where [`poll_readable`] cannot
/// see them and break interrupt detection.
pub struct StdioTransport;

impl Transport for StdioTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: `buf` is a valid writable region of `buf.len()` bytes.
        let n = unsafe { libc::read(libc::STDIN_FILENO, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // SAFETY: `buf` is a valid readable region of `buf.len()` bytes.
        let n = unsafe { libc::write(libc::STDOUT_FILENO, buf.as_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    fn is_readable(&self) -> bool {
        poll_readable(libc::STDIN_FILENO)
    }
}

/// True when a read on `fd` would not block. End of stream counts as
/// readable, so a hung-up peer is noticed instead of looking idle forever.
fn poll_readable(fd: RawFd) -> bool {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: `pollfd` is a valid array of one entry for the duration of
    // the call.
    let ready = unsafe { libc::poll(&mut pollfd, 1, 0) };
    ready > 0 && pollfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0
}
