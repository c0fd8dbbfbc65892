//! ## Wire codec for the discovery coordinator
//!
//! Every inbound frame carries a 12-byte header (magic, CRC-32 checksum,
//! payload size) followed by a payload whose first byte is a request-type
//! tag and whose remainder is a JSON-encoded body. See [`request`] and
//! [`response`] for the payload shapes.

pub mod request;
pub mod response;

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};

/// The 4-byte ASCII-derived magic number that opens every frame.
pub const MAGIC: u32 = 0x543C_C92F;

/// Frames larger than this (payload only, header excluded) are rejected
/// without being parsed.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Size in bytes of the fixed frame header (magic + checksum + size).
pub const HEADER_SIZE: usize = 12;

#[derive(Debug)]
pub enum Error {
    /// Frame too short to contain a header.
    Truncated,
    /// The leading 4 bytes did not match [`MAGIC`].
    BadMagic,
    /// The CRC-32 of the payload did not match the header's checksum.
    BadChecksum,
    /// The declared payload size exceeds [`MAX_PAYLOAD_SIZE`].
    OversizedFrame,
    /// The request-type tag byte was not one of the five known values.
    UnknownTag(u8),
    /// The payload was not valid JSON for its tag.
    Json(serde_json::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "frame truncated"),
            Self::BadMagic => write!(f, "bad magic number"),
            Self::BadChecksum => write!(f, "checksum mismatch"),
            Self::OversizedFrame => write!(f, "frame exceeds maximum payload size"),
            Self::UnknownTag(tag) => write!(f, "unknown request tag: {tag}"),
            Self::Json(e) => write!(f, "invalid payload json: {e}"),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Reads the total frame size (header + payload) from the start of `bytes`,
/// without validating the checksum.
///
/// Returns `Err` only for a frame that can never become valid (bad magic or
/// an oversized declared payload). Returns `Ok(size)` even if `bytes` does
/// not yet contain `size` bytes — callers buffering a stream should compare
/// the result against `bytes.len()` and read more before calling
/// [`Decoder::decode`].
///
/// # Test
///
/// ```
/// use discovery_codec::Decoder;
///
/// let bytes = discovery_codec::encode_payload(&[4u8][..]);
/// assert_eq!(Decoder::frame_size(&bytes).unwrap(), bytes.len());
/// ```
pub struct Decoder;

impl Decoder {
    pub fn frame_size(bytes: &[u8]) -> Result<usize, Error> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::Truncated);
        }

        if u32::from_be_bytes(bytes[0..4].try_into().unwrap()) != MAGIC {
            return Err(Error::BadMagic);
        }

        let size = u32::from_be_bytes(bytes[8..12].try_into().unwrap()) as usize;
        if size > MAX_PAYLOAD_SIZE {
            return Err(Error::OversizedFrame);
        }

        Ok(HEADER_SIZE + size)
    }

    /// Decodes one complete frame from the front of `bytes`. `bytes` must
    /// already contain at least [`Decoder::frame_size`] bytes.
    ///
    /// # Test
    ///
    /// ```
    /// use discovery_codec::{Decoder, request::Request};
    ///
    /// let frame = discovery_codec::encode_request(&Request::Heartbeat);
    /// let (req, consumed) = Decoder::decode(&frame).unwrap();
    /// assert_eq!(consumed, frame.len());
    /// assert!(matches!(req, Request::Heartbeat));
    /// ```
    pub fn decode(bytes: &[u8]) -> Result<(request::Request, usize), Error> {
        let total = Self::frame_size(bytes)?;
        if bytes.len() < total {
            return Err(Error::Truncated);
        }

        let checksum = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
        let payload = &bytes[HEADER_SIZE..total];

        if crc32fast::hash(payload) != checksum {
            return Err(Error::BadChecksum);
        }

        let req = request::Request::decode(payload)?;
        Ok((req, total))
    }
}

/// Encodes a raw payload (tag byte + JSON body, or just a tag byte for
/// `Heartbeat`) into a complete frame with header.
pub fn encode_payload(payload: &[u8]) -> BytesMut {
    let mut out = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    out.put_u32(MAGIC);
    out.put_u32(crc32fast::hash(payload));
    out.put_u32(payload.len() as u32);
    out.extend_from_slice(payload);
    out
}

/// Encodes a [`request::Request`] into a complete frame.
pub fn encode_request(req: &request::Request) -> BytesMut {
    let payload = req.encode();
    encode_payload(&payload)
}

/// Encodes a [`response::Response`] into a complete frame.
pub fn encode_response(res: &response::Response) -> BytesMut {
    let payload = res.encode();
    encode_payload(&payload)
}

/// Convenience used by streaming readers: how many bytes of `buf` a frame
/// needs before [`Decoder::decode`] can run, given the bytes seen so far.
/// Mirrors the "is there enough in the buffer yet" loop the accept-loop
/// reader task runs per connection.
pub fn remaining_needed(buf: &[u8]) -> Result<usize, Error> {
    let total = Decoder::frame_size(buf)?;
    Ok(total.saturating_sub(buf.len()))
}

pub(crate) fn take_u8(bytes: &mut &[u8]) -> Result<u8, Error> {
    if bytes.is_empty() {
        return Err(Error::Truncated);
    }
    Ok(bytes.get_u8())
}
