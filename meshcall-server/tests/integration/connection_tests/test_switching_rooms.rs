use meshcall_core::{RoomId, ServerMessage};

use crate::integration::{create_test_registry, init_tracing};

#[tokio::test]
async fn test_switching_rooms_leaves_previous_first() {
    init_tracing();

    let (registry, _relay, signaling) = create_test_registry();
    let room_a = RoomId::new("A").unwrap();
    let room_b = RoomId::new("B").unwrap();

    let mover = signaling.connect();
    let stays_in_a = signaling.connect();
    let waits_in_b = signaling.connect();

    registry.join(stays_in_a, room_a.clone()).await.unwrap();
    registry.join(mover, room_a.clone()).await.unwrap();
    registry.join(waits_in_b, room_b.clone()).await.unwrap();
    signaling.clear();

    let snapshot = registry.join(mover, room_b.clone()).await.unwrap();
    assert_eq!(snapshot, vec![waits_in_b]);

    assert_eq!(
        signaling.messages_for(&stays_in_a),
        vec![ServerMessage::UserDisconnected { id: mover }]
    );
    assert_eq!(
        signaling.messages_for(&waits_in_b),
        vec![ServerMessage::UserJoined { id: mover }]
    );
    assert_eq!(registry.room_of(&mover), Some(room_b.clone()));
    assert_eq!(registry.members(&room_a).await, vec![stays_in_a]);
}

#[tokio::test]
async fn test_switching_out_of_sole_membership_deletes_room() {
    let (registry, _relay, signaling) = create_test_registry();
    let room_a = RoomId::new("A").unwrap();
    let room_b = RoomId::new("B").unwrap();
    let mover = signaling.connect();

    registry.join(mover, room_a.clone()).await.unwrap();
    registry.join(mover, room_b.clone()).await.unwrap();

    assert!(!registry.contains_room(&room_a));
    assert!(registry.contains_room(&room_b));
}
