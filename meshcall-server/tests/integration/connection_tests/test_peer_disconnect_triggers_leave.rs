use meshcall_core::{RoomId, ServerMessage};

use crate::integration::{create_test_registry, init_tracing};

#[tokio::test]
async fn test_peer_disconnect_triggers_leave() {
    init_tracing();

    let (registry, _relay, signaling) = create_test_registry();
    let room = RoomId::new("R1").unwrap();
    let a = signaling.connect();
    let b = signaling.connect();

    assert!(registry.join(a, room.clone()).await.unwrap().is_empty());
    assert_eq!(registry.join(b, room.clone()).await.unwrap(), vec![a]);

    assert_eq!(
        signaling.messages_for(&b),
        vec![ServerMessage::AllUsers { members: vec![a] }]
    );
    assert_eq!(signaling.joined_seen_by(&a), vec![b]);

    signaling.disconnect(&b);
    assert!(registry.leave(&b).await);

    assert_eq!(signaling.departures_seen_by(&a), vec![b]);
    assert!(
        signaling.departures_seen_by(&b).is_empty(),
        "departing member is never told about itself"
    );
    assert!(registry.contains_room(&room), "A is still in the room");

    signaling.disconnect(&a);
    assert!(registry.leave(&a).await);
    assert!(!registry.contains_room(&room));
    assert_eq!(registry.room_count(), 0);
}

#[tokio::test]
async fn test_leave_without_room_is_noop() {
    let (registry, _relay, signaling) = create_test_registry();
    let a = signaling.connect();

    assert!(!registry.leave(&a).await);
    assert!(signaling.messages_for(&a).is_empty());
}

#[tokio::test]
async fn test_double_leave_is_noop() {
    let (registry, _relay, signaling) = create_test_registry();
    let room = RoomId::new("R1").unwrap();
    let a = signaling.connect();
    let b = signaling.connect();

    registry.join(a, room.clone()).await.unwrap();
    registry.join(b, room.clone()).await.unwrap();

    assert!(registry.leave(&b).await);
    assert!(!registry.leave(&b).await);
    assert_eq!(signaling.departures_seen_by(&a), vec![b]);
}
