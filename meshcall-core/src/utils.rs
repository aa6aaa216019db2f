pub const DEFAULT_STUN_ADDR: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_STUN_ADDR_2: &str = "stun:stun1.l.google.com:19302";

/// Length of ids produced by [`crate::RoomId::generate`].
pub const ROOM_ID_LEN: usize = 6;

/// Path segment that precedes the room id in shareable links.
pub const ROOM_LINK_SEGMENT: &str = "/room/";
