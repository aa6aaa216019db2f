use crate::utils::{ROOM_ID_LEN, ROOM_LINK_SEGMENT};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

const ROOM_ID_ALPHABET: &[u8; 64] =
    b"useandom-26T198340PX75pxJACKVERYMINDBUSHWOLF_GQZbfghjklqvwyzrict";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("room id must not be empty")]
pub struct InvalidRoomId;

/// Caller-chosen rendezvous key. Only non-emptiness is enforced.
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidRoomId> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(InvalidRoomId);
        }
        if trimmed.len() == id.len() {
            Ok(Self(id))
        } else {
            Ok(Self(trimmed.to_owned()))
        }
    }

    /// Fresh random id, short enough to read out loud.
    pub fn generate() -> Self {
        let bytes = Uuid::new_v4().into_bytes();
        let id = bytes
            .iter()
            .take(ROOM_ID_LEN)
            .map(|b| ROOM_ID_ALPHABET[(b & 63) as usize] as char)
            .collect();
        Self(id)
    }

    /// Accepts a bare id or a link such as `https://host/room/abc123`.
    pub fn from_link(input: &str) -> Result<Self, InvalidRoomId> {
        let input = input.trim();
        let id = match input.split_once(ROOM_LINK_SEGMENT) {
            Some((_, rest)) => rest.split(['/', '?', '#']).next().unwrap_or_default(),
            None => input,
        };
        Self::new(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomId {
    type Error = InvalidRoomId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoomId> for String {
    fn from(value: RoomId) -> Self {
        value.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
