use crate::room::room_command::RoomCommand;
use crate::signaling::SignalingOutput;
use dashmap::DashMap;
use meshcall_core::{ConnectionId, RoomId, ServerMessage};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Registry entry pointing at a running room loop.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    pub(crate) generation: u64,
    pub(crate) command_tx: mpsc::Sender<RoomCommand>,
}

/// Single writer for one room's membership.
///
/// Every join, leave and broadcast for the room goes through `command_rx`,
/// so the snapshot a joiner receives and the notifications other members
/// receive are always derived from the same sequence of states. The
/// registry's connection-to-room index is only updated from here, in step
/// with `members`.
pub struct Room {
    id: RoomId,
    generation: u64,
    members: BTreeSet<ConnectionId>,
    retired: bool,
    command_rx: mpsc::Receiver<RoomCommand>,
    signaling: Arc<dyn SignalingOutput>,
    rooms: Arc<DashMap<RoomId, RoomHandle>>,
    memberships: Arc<DashMap<ConnectionId, RoomId>>,
}

impl Room {
    pub(crate) fn new(
        id: RoomId,
        generation: u64,
        command_rx: mpsc::Receiver<RoomCommand>,
        signaling: Arc<dyn SignalingOutput>,
        rooms: Arc<DashMap<RoomId, RoomHandle>>,
        memberships: Arc<DashMap<ConnectionId, RoomId>>,
    ) -> Self {
        Self {
            id,
            generation,
            members: BTreeSet::new(),
            retired: false,
            command_rx,
            signaling,
            rooms,
            memberships,
        }
    }

    pub async fn run(mut self) {
        info!("Room '{}' event loop started", self.id);

        while let Some(cmd) = self.command_rx.recv().await {
            self.handle_command(cmd).await;

            if self.retired {
                break;
            }
        }

        self.drain().await;
        info!("Room '{}' event loop finished", self.id);
    }

    async fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join {
                connection_id,
                reply,
            } => {
                let snapshot: Vec<ConnectionId> = self
                    .members
                    .iter()
                    .filter(|id| **id != connection_id)
                    .copied()
                    .collect();

                self.signaling
                    .send(&connection_id, ServerMessage::AllUsers {
                        members: snapshot.clone(),
                    })
                    .await;
                self.broadcast(
                    Some(connection_id),
                    ServerMessage::UserJoined { id: connection_id },
                )
                .await;
                self.members.insert(connection_id);
                self.memberships.insert(connection_id, self.id.clone());

                info!(
                    "Room '{}' has {} participants after {} joined",
                    self.id,
                    self.members.len(),
                    connection_id
                );

                if reply.send(snapshot).is_err() {
                    // Joiner went away mid-join; nobody will ever leave for it.
                    self.remove_member(connection_id).await;
                }
            }

            RoomCommand::Leave {
                connection_id,
                reply,
            } => {
                self.remove_member(connection_id).await;
                let _ = reply.send(());
            }

            RoomCommand::Broadcast { exclude, message } => {
                self.broadcast(exclude, message).await;
            }

            RoomCommand::Members { reply } => {
                let _ = reply.send(self.members.iter().copied().collect());
            }
        }
    }

    async fn remove_member(&mut self, connection_id: ConnectionId) {
        self.memberships
            .remove_if(&connection_id, |_, room| *room == self.id);
        if !self.members.remove(&connection_id) {
            return;
        }

        self.broadcast(
            Some(connection_id),
            ServerMessage::UserDisconnected { id: connection_id },
        )
        .await;

        if self.members.is_empty() {
            self.retire();
        } else {
            info!(
                "{} left room '{}', {} participants remaining",
                connection_id,
                self.id,
                self.members.len()
            );
        }
    }

    async fn broadcast(&self, exclude: Option<ConnectionId>, message: ServerMessage) {
        for member in self.members.iter().filter(|m| Some(**m) != exclude) {
            self.signaling.send(member, message.clone()).await;
        }
    }

    /// Deletes the room from the registry before the emptying command is
    /// acknowledged, so no later join can observe it.
    fn retire(&mut self) {
        info!("Deleting empty room: {}", self.id);

        let generation = self.generation;
        self.rooms
            .remove_if(&self.id, |_, handle| handle.generation == generation);
        self.command_rx.close();
        self.retired = true;
    }

    /// Refuses whatever was queued before the room retired. Queued joins see
    /// their reply dropped and retry against a fresh room.
    async fn drain(&mut self) {
        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                RoomCommand::Join { connection_id, .. } => {
                    debug!(
                        "Bouncing join of {} off retired room '{}'",
                        connection_id, self.id
                    );
                }
                RoomCommand::Leave { reply, .. } => {
                    let _ = reply.send(());
                }
                RoomCommand::Members { reply } => {
                    let _ = reply.send(Vec::new());
                }
                RoomCommand::Broadcast { .. } => {}
            }
        }
    }
}
