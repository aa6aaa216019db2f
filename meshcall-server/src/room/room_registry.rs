use crate::error::RegistryError;
use crate::room::{Room, RoomCommand, RoomHandle};
use crate::signaling::SignalingOutput;
use dashmap::DashMap;
use meshcall_core::{ConnectionId, RoomId, ServerMessage};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const MAX_JOIN_ATTEMPTS: usize = 8;

/// Owns every room and which room each connection is in.
///
/// Rooms are spawned on first join and remove themselves the moment they
/// become empty. Nothing outside this type mutates membership, and the
/// connection-to-room index is written only by the room loops, so a caller
/// that stops waiting on `join` or `leave` never leaves the two disagreeing.
#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<RoomId, RoomHandle>>,
    memberships: Arc<DashMap<ConnectionId, RoomId>>,
    signaling: Arc<dyn SignalingOutput>,
    next_generation: Arc<AtomicU64>,
    command_capacity: usize,
}

impl RoomRegistry {
    pub fn new(signaling: Arc<dyn SignalingOutput>, command_capacity: usize) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            memberships: Arc::new(DashMap::new()),
            signaling,
            next_generation: Arc::new(AtomicU64::new(0)),
            command_capacity: command_capacity.max(1),
        }
    }

    /// Puts `connection_id` into `room_id` and returns the members that were
    /// already there. Any previous membership is left first, so its room
    /// sees the departure before the new room sees the join.
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<Vec<ConnectionId>, RegistryError> {
        self.leave(&connection_id).await;

        for attempt in 1..=MAX_JOIN_ATTEMPTS {
            let handle = self.room_handle(&room_id);
            let (reply_tx, reply_rx) = oneshot::channel();

            let sent = handle
                .command_tx
                .send(RoomCommand::Join {
                    connection_id,
                    reply: reply_tx,
                })
                .await;

            if sent.is_ok() {
                if let Ok(snapshot) = reply_rx.await {
                    return Ok(snapshot);
                }
            }

            debug!(
                "Room '{}' retired during join of {} (attempt {})",
                room_id, connection_id, attempt
            );
        }

        Err(RegistryError::RoomUnavailable(room_id))
    }

    /// Removes `connection_id` from its room, if any. Returns whether it was
    /// a member of one.
    pub async fn leave(&self, connection_id: &ConnectionId) -> bool {
        let Some(room_id) = self.room_of(connection_id) else {
            return false;
        };

        let Some(handle) = self.rooms.get(&room_id).map(|h| h.clone()) else {
            warn!(
                "{} was recorded in room '{}' but the room is gone",
                connection_id, room_id
            );
            self.memberships
                .remove_if(connection_id, |_, room| *room == room_id);
            return false;
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = handle
            .command_tx
            .send(RoomCommand::Leave {
                connection_id: *connection_id,
                reply: reply_tx,
            })
            .await;

        sent.is_ok() && reply_rx.await.is_ok()
    }

    /// Sends `message` to every member of `room_id` except `exclude`.
    pub async fn broadcast(
        &self,
        room_id: &RoomId,
        exclude: Option<ConnectionId>,
        message: ServerMessage,
    ) -> bool {
        let Some(handle) = self.rooms.get(room_id).map(|h| h.clone()) else {
            return false;
        };

        handle
            .command_tx
            .send(RoomCommand::Broadcast { exclude, message })
            .await
            .is_ok()
    }

    pub async fn members(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        let Some(handle) = self.rooms.get(room_id).map(|h| h.clone()) else {
            return Vec::new();
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if handle
            .command_tx
            .send(RoomCommand::Members { reply: reply_tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        reply_rx.await.unwrap_or_default()
    }

    pub fn room_of(&self, connection_id: &ConnectionId) -> Option<RoomId> {
        self.memberships.get(connection_id).map(|r| r.clone())
    }

    pub fn contains_room(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn room_handle(&self, room_id: &RoomId) -> RoomHandle {
        self.rooms
            .entry(room_id.clone())
            .or_insert_with(|| {
                info!("Creating new room: {}", room_id);

                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let (command_tx, command_rx) = mpsc::channel(self.command_capacity);
                let room = Room::new(
                    room_id.clone(),
                    generation,
                    command_rx,
                    self.signaling.clone(),
                    self.rooms.clone(),
                    self.memberships.clone(),
                );
                tokio::spawn(room.run());

                RoomHandle {
                    generation,
                    command_tx,
                }
            })
            .clone()
    }
}
