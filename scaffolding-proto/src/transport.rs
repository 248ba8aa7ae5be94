//! Exact-count reads and writes over a blocking byte stream.
//!
//! TCP carries no message boundaries, so every response field is assembled
//! from however many chunks the socket hands back. A zero-length read before
//! the field is complete is an orderly close by the peer; a read that fails
//! with `WouldBlock` or `TimedOut` means the stream's read timeout elapsed.
//! Neither is retried here.

use crate::framing::{decode_response_header, FrameField, RESPONSE_HEADER_LEN};
use crate::{Result, ScaffoldingError};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{trace, warn};

pub struct FrameTransport<S> {
    stream: S,
    read_timeout: Duration,
    max_frame_size: u32,
}

impl<S> FrameTransport<S> {
    /// `read_timeout` is only used for reporting; the stream itself must
    /// already be configured to time out.
    pub fn new(stream: S, read_timeout: Duration, max_frame_size: u32) -> Self {
        Self {
            stream,
            read_timeout,
            max_frame_size,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Write> FrameTransport<S> {
    /// Writes every byte, retrying short writes.
    pub fn send_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut written = 0;

        while written < bytes.len() {
            match self.stream.write(&bytes[written..]) {
                Ok(0) => {
                    return Err(ScaffoldingError::Connection(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection accepted no bytes",
                    )));
                }
                Ok(n) => {
                    written += n;
                    trace!("Wrote {} bytes ({}/{})", n, written, bytes.len());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ScaffoldingError::Connection(e)),
            }
        }

        self.stream.flush()?;
        Ok(())
    }
}

impl<S: Read> FrameTransport<S> {
    /// Reads exactly `n` bytes belonging to `field`.
    pub fn recv_exact(&mut self, n: usize, field: FrameField) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        let mut filled = 0;

        while filled < n {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => {
                    warn!("Peer closed after {} of {} bytes of {}", filled, n, field);
                    return Err(ScaffoldingError::ConnectionClosed {
                        field,
                        received: filled,
                        expected: n,
                    });
                }
                Ok(read) => {
                    filled += read;
                    trace!("Read {} bytes of {} ({}/{})", read, field, filled, n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    return Err(ScaffoldingError::Timeout {
                        field,
                        after: self.read_timeout,
                    });
                }
                Err(e) => return Err(ScaffoldingError::Connection(e)),
            }
        }

        Ok(buf)
    }

    pub fn recv_status(&mut self) -> Result<u8> {
        let status = self.recv_exact(1, FrameField::Status)?;
        Ok(status[0])
    }

    /// Reads the data length and checks it against the frame size limit
    /// before anything is allocated for the body.
    pub fn recv_length(&mut self, status: u8) -> Result<u32> {
        let length = self.recv_exact(4, FrameField::Length)?;

        let mut header = [0u8; RESPONSE_HEADER_LEN];
        header[0] = status;
        header[1..].copy_from_slice(&length);
        let (_, length) = decode_response_header(&header);

        if length > self.max_frame_size {
            warn!(
                "Received oversized frame: {} bytes (max: {})",
                length, self.max_frame_size
            );
            return Err(ScaffoldingError::FrameTooLarge {
                length,
                max: self.max_frame_size,
            });
        }

        Ok(length)
    }

    pub fn recv_data(&mut self, length: u32) -> Result<Vec<u8>> {
        self.recv_exact(length as usize, FrameField::Body)
    }
}
