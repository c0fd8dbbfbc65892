//! Response payload shapes (spec §6-7).
//!
//! Responses share the request frame's header (magic/checksum/size); there
//! is no response-side tag byte, since a session only ever has one request
//! in flight and therefore knows which shape to expect.

use serde::Serialize;

use crate::request::ServiceDef;
use crate::Error;

/// A response to a session request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Join/Leave/Watch/Ignore succeeded.
    Ack,
    /// One of the four semantic error strings from spec §7.
    Error(String),
    /// The result of a Snapshot request, in registry order. An empty
    /// snapshot is encoded as a zero-length payload rather than `"[]"`.
    Snapshot(Vec<ServiceDef>),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

#[derive(Serialize)]
struct AckBody {
    ok: bool,
}

impl Response {
    /// Encodes this response into a raw payload (no header).
    ///
    /// # Test
    ///
    /// ```
    /// use discovery_codec::response::Response;
    ///
    /// let frame = discovery_codec::encode_response(&Response::Ack);
    /// assert!(frame.len() > 0);
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Ack => serde_json::to_vec(&AckBody { ok: true }).expect("serializable"),
            Self::Error(msg) => {
                serde_json::to_vec(&ErrorBody { error: msg }).expect("serializable")
            }
            Self::Snapshot(entries) => {
                if entries.is_empty() {
                    Vec::new()
                } else {
                    serde_json::to_vec(entries).expect("serializable")
                }
            }
        }
    }

    /// Parses a Snapshot response payload. An empty payload decodes to an
    /// empty vector.
    pub fn decode_snapshot(payload: &[u8]) -> Result<Vec<ServiceDef>, Error> {
        if payload.is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(payload)?)
    }

    /// Parses a Join/Leave/Watch/Ignore response payload: either `{"ok":
    /// true}` or `{"error": "..."}`.
    pub fn decode_ack(payload: &[u8]) -> Result<Result<(), String>, Error> {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Error { error: String },
            Ack { ok: bool },
        }

        let raw: Raw = serde_json::from_slice(payload)?;
        Ok(match raw {
            Raw::Error { error } => Err(error),
            Raw::Ack { ok: _ } => Ok(()),
        })
    }
}
