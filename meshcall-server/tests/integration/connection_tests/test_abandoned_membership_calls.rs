use meshcall_core::{RoomId, ServerMessage};
use std::time::Duration;
use tokio::time::timeout;

use crate::integration::{create_gated_registry, init_tracing};

const GIVE_UP: Duration = Duration::from_millis(50);

#[tokio::test]
async fn test_leave_abandoned_while_queue_full_can_be_retried() {
    init_tracing();

    let (registry, gate, signaling) = create_gated_registry();
    let room = RoomId::new("R1").unwrap();
    let a = signaling.connect();
    let b = signaling.connect();

    registry.join(a, room.clone()).await.unwrap();
    registry.join(b, room.clone()).await.unwrap();

    // The room loop blocks delivering the first broadcast and the second
    // one fills the only queue slot.
    gate.close_gate();
    assert!(registry.broadcast(&room, None, ServerMessage::HeartbeatAck).await);
    assert!(registry.broadcast(&room, None, ServerMessage::HeartbeatAck).await);

    assert!(timeout(GIVE_UP, registry.leave(&b)).await.is_err());
    assert_eq!(registry.room_of(&b), Some(room.clone()));

    gate.open_gate();
    assert!(registry.leave(&b).await);
    assert_eq!(registry.room_of(&b), None);
    assert_eq!(signaling.departures_seen_by(&a), vec![b]);

    assert!(registry.leave(&a).await);
    assert!(registry.members(&room).await.is_empty());
    assert!(!registry.contains_room(&room));
}

#[tokio::test]
async fn test_join_abandoned_after_enqueue_leaves_no_member_behind() {
    init_tracing();

    let (registry, gate, signaling) = create_gated_registry();
    let room = RoomId::new("R1").unwrap();
    let a = signaling.connect();
    let c = signaling.connect();

    registry.join(a, room.clone()).await.unwrap();

    gate.close_gate();
    assert!(registry.broadcast(&room, None, ServerMessage::HeartbeatAck).await);
    assert!(timeout(GIVE_UP, registry.join(c, room.clone())).await.is_err());

    gate.open_gate();
    assert_eq!(registry.members(&room).await, vec![a]);
    assert_eq!(registry.room_of(&c), None);
    assert_eq!(signaling.joined_seen_by(&a), vec![c]);
    assert_eq!(signaling.departures_seen_by(&a), vec![c]);

    // Nothing keeps the room alive once its real member goes.
    assert!(registry.leave(&a).await);
    assert!(!registry.contains_room(&room));
}
