use crate::{Result, ScaffoldingError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use tracing::{debug, warn};

/// Longest kind whose length still fits the one-byte prefix
pub const MAX_KIND_LEN: usize = u8::MAX as usize;

/// Status byte (1) + data length (4)
pub const RESPONSE_HEADER_LEN: usize = 5;

/// Maximum frame size (10MB for safety)
pub const MAX_FRAME_SIZE: u32 = 10 * 1024 * 1024;

/// Default maximum frame size for most deployments (1MB)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 1024 * 1024;

pub const STATUS_OK: u8 = 0;
pub const STATUS_NOT_READY: u8 = 32;
pub const STATUS_UNKNOWN_KIND: u8 = 255;

/// The piece of a response frame being read when a transport error hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameField {
    Status,
    Length,
    Body,
}

impl fmt::Display for FrameField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameField::Status => f.write_str("status byte"),
            FrameField::Length => f.write_str("data length"),
            FrameField::Body => f.write_str("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub kind: String,
    pub body: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u8,
    pub data: Bytes,
}

impl Response {
    pub fn new(status: u8, data: impl Into<Bytes>) -> Self {
        Self {
            status,
            data: data.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Data as text, replacing invalid sequences. Used for error messages,
    /// which services are not obliged to send as valid UTF-8.
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

fn body_len(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| ScaffoldingError::Encoding(format!("body of {} bytes exceeds u32 length", len)))
}

/// Lays out `[kind len][kind][body len BE][body]`
pub fn encode_request(kind: &str, body: &[u8]) -> Result<Bytes> {
    let kind_bytes = kind.as_bytes();

    if kind_bytes.len() > MAX_KIND_LEN {
        return Err(ScaffoldingError::Encoding(format!(
            "kind is {} bytes (max: {})",
            kind_bytes.len(),
            MAX_KIND_LEN
        )));
    }

    let length = body_len(body.len())?;

    let mut buf = BytesMut::with_capacity(1 + kind_bytes.len() + 4 + body.len());
    buf.put_u8(kind_bytes.len() as u8);
    buf.put_slice(kind_bytes);
    buf.put_u32(length);
    buf.put_slice(body);

    debug!("Encoded request {} with {} byte body", kind, length);

    Ok(buf.freeze())
}

/// Decodes exactly one complete request frame. Any body `encode_request`
/// accepts decodes here; size limits belong to `RequestCodec`.
pub fn decode_request(frame: &[u8]) -> Result<Request> {
    let mut src = BytesMut::from(frame);
    let request = try_split_request(&mut src, u32::MAX)?
        .ok_or_else(|| ScaffoldingError::Protocol("incomplete request frame".to_string()))?;

    if !src.is_empty() {
        return Err(ScaffoldingError::Protocol(format!(
            "{} trailing bytes after request frame",
            src.len()
        )));
    }

    Ok(request)
}

pub fn encode_response(status: u8, data: &[u8]) -> Result<Bytes> {
    let length = body_len(data.len())?;

    let mut buf = BytesMut::with_capacity(RESPONSE_HEADER_LEN + data.len());
    buf.put_u8(status);
    buf.put_u32(length);
    buf.put_slice(data);

    Ok(buf.freeze())
}

/// Splits a response header into `(status, data length)`
pub fn decode_response_header(header: &[u8; RESPONSE_HEADER_LEN]) -> (u8, u32) {
    let status = header[0];
    let length = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    (status, length)
}

/// Consumes one request frame from `src` if it is complete.
fn try_split_request(src: &mut BytesMut, max_frame_size: u32) -> Result<Option<Request>> {
    if src.is_empty() {
        return Ok(None);
    }

    let kind_len = src[0] as usize;
    let header_len = 1 + kind_len + 4;
    if src.len() < header_len {
        return Ok(None);
    }

    let mut length_bytes = [0u8; 4];
    length_bytes.copy_from_slice(&src[1 + kind_len..header_len]);
    let length = u32::from_be_bytes(length_bytes);

    if length > max_frame_size {
        warn!("Received oversized request: {} bytes (max: {})", length, max_frame_size);
        return Err(ScaffoldingError::FrameTooLarge {
            length,
            max: max_frame_size,
        });
    }

    let frame_size = header_len + length as usize;
    if src.len() < frame_size {
        src.reserve(frame_size - src.len());
        return Ok(None);
    }

    src.advance(1);
    let kind = src.split_to(kind_len);
    src.advance(4);
    let body = src.split_to(length as usize).freeze();

    let kind = String::from_utf8(kind.to_vec())
        .map_err(|e| ScaffoldingError::Decode(format!("kind is not UTF-8: {}", e)))?;

    Ok(Some(Request { kind, body }))
}

/// Service-side codec for use with tokio_util: decodes request frames and
/// encodes response frames.
pub struct RequestCodec {
    max_frame_size: u32,
}

impl RequestCodec {
    pub fn new(max_frame_size: u32) -> Self {
        Self { max_frame_size }
    }
}

impl Default for RequestCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl tokio_util::codec::Decoder for RequestCodec {
    type Item = Request;
    type Error = ScaffoldingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let request = try_split_request(src, self.max_frame_size)?;
        if let Some(ref request) = request {
            debug!("Decoded request {} ({} byte body)", request.kind, request.body.len());
        }
        Ok(request)
    }
}

impl tokio_util::codec::Encoder<Response> for RequestCodec {
    type Error = ScaffoldingError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<()> {
        let length = body_len(item.data.len())?;

        debug!("Encoding response status {} with {} bytes", item.status, length);

        dst.reserve(RESPONSE_HEADER_LEN + item.data.len());
        dst.put_u8(item.status);
        dst.put_u32(length);
        dst.put_slice(&item.data);

        Ok(())
    }
}
