//! Request-tag byte and per-tag JSON payload shapes (spec §6).

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use crate::{take_u8, Error};

/// The leading byte of every request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RequestTag {
    Join = 0,
    Leave = 1,
    Watch = 2,
    Snapshot = 3,
    Heartbeat = 4,
}

/// A published service's identity and payload, as it appears on the wire.
/// `host` is optional here because an absent/empty host means "use the
/// publishing connection's remote IP" — resolved by the session layer, not
/// the codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDef {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub host: Option<String>,
    pub port: u16,
    pub group: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        default,
        with = "base64_bytes_opt"
    )]
    pub custom_data: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Deserialize)]
struct JoinBody {
    #[serde(default)]
    host: Option<String>,
    port: u16,
    group: String,
    #[serde(default, with = "base64_bytes_opt", rename = "customData")]
    custom_data: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Deserialize)]
struct LeaveBody {
    #[serde(default)]
    host: Option<String>,
    port: u16,
    group: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SnapshotBody {
    group: String,
}

#[derive(Debug, Clone, Deserialize)]
struct WatchBody {
    groups: Vec<String>,
}

/// A decoded request: the tag plus its parsed body.
///
/// # Test
///
/// ```
/// use discovery_codec::request::Request;
///
/// let frame = discovery_codec::encode_request(&Request::Snapshot { group: "web".into() });
/// let (decoded, _) = discovery_codec::Decoder::decode(&frame).unwrap();
/// assert_eq!(decoded, Request::Snapshot { group: "web".into() });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Join {
        host: Option<String>,
        port: u16,
        group: String,
        custom_data: Option<Vec<u8>>,
    },
    Leave {
        host: Option<String>,
        port: u16,
        group: String,
    },
    Snapshot {
        group: String,
    },
    Watch {
        groups: Vec<String>,
    },
    Heartbeat,
}

impl Request {
    pub fn tag(&self) -> RequestTag {
        match self {
            Self::Join { .. } => RequestTag::Join,
            Self::Leave { .. } => RequestTag::Leave,
            Self::Snapshot { .. } => RequestTag::Snapshot,
            Self::Watch { .. } => RequestTag::Watch,
            Self::Heartbeat => RequestTag::Heartbeat,
        }
    }

    /// Encodes this request into a tag byte followed by its JSON body
    /// (no body at all for `Heartbeat`).
    pub fn encode(&self) -> Vec<u8> {
        let tag: u8 = self.tag().into();
        let mut out = vec![tag];
        match self {
            Self::Join {
                host,
                port,
                group,
                custom_data,
            } => {
                let body = ServiceDef {
                    host: host.clone(),
                    port: *port,
                    group: group.clone(),
                    custom_data: custom_data.clone(),
                };
                out.extend_from_slice(&serde_json::to_vec(&body).expect("serializable"));
            }
            Self::Leave { host, port, group } => {
                let body = ServiceDef {
                    host: host.clone(),
                    port: *port,
                    group: group.clone(),
                    custom_data: None,
                };
                out.extend_from_slice(&serde_json::to_vec(&body).expect("serializable"));
            }
            Self::Snapshot { group } => {
                out.extend_from_slice(
                    &serde_json::to_vec(&SnapshotBodyOut { group: group.clone() })
                        .expect("serializable"),
                );
            }
            Self::Watch { groups } => {
                out.extend_from_slice(
                    &serde_json::to_vec(&WatchBody {
                        groups: groups.clone(),
                    })
                    .expect("serializable"),
                );
            }
            Self::Heartbeat => {}
        }
        out
    }

    /// Parses a payload (tag byte + JSON body) into a [`Request`].
    pub fn decode(mut payload: &[u8]) -> Result<Self, Error> {
        let tag_byte = take_u8(&mut payload)?;
        let tag = RequestTag::try_from(tag_byte).map_err(|_| Error::UnknownTag(tag_byte))?;

        Ok(match tag {
            RequestTag::Join => {
                let body: JoinBody = serde_json::from_slice(payload)?;
                Self::Join {
                    host: body.host,
                    port: body.port,
                    group: body.group,
                    custom_data: body.custom_data,
                }
            }
            RequestTag::Leave => {
                let body: LeaveBody = serde_json::from_slice(payload)?;
                Self::Leave {
                    host: body.host,
                    port: body.port,
                    group: body.group,
                }
            }
            RequestTag::Snapshot => {
                let body: SnapshotBody = serde_json::from_slice(payload)?;
                Self::Snapshot { group: body.group }
            }
            RequestTag::Watch => {
                let body: WatchBody = serde_json::from_slice(payload)?;
                Self::Watch {
                    groups: body.groups,
                }
            }
            RequestTag::Heartbeat => Self::Heartbeat,
        })
    }
}

#[derive(Serialize)]
struct SnapshotBodyOut {
    group: String,
}

mod base64_bytes_opt {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, ser: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => ser.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes)),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(de: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(de)?;
        match raw {
            Some(s) => base64::engine::general_purpose::STANDARD
                .decode(s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
