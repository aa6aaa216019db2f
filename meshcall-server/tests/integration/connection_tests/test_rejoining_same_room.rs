use meshcall_core::{RoomId, ServerMessage};

use crate::integration::{create_test_registry, init_tracing};

#[tokio::test]
async fn test_rejoining_same_room_is_leave_then_join() {
    init_tracing();

    let (registry, _relay, signaling) = create_test_registry();
    let room = RoomId::new("R1").unwrap();
    let x = signaling.connect();
    let y = signaling.connect();

    registry.join(y, room.clone()).await.unwrap();
    registry.join(x, room.clone()).await.unwrap();
    signaling.clear();

    let snapshot = registry.join(x, room.clone()).await.unwrap();
    assert_eq!(snapshot, vec![y]);

    assert_eq!(
        signaling.messages_for(&y),
        vec![
            ServerMessage::UserDisconnected { id: x },
            ServerMessage::UserJoined { id: x },
        ]
    );
    assert_eq!(
        signaling.messages_for(&x),
        vec![ServerMessage::AllUsers { members: vec![y] }]
    );
    assert_eq!(registry.room_of(&x), Some(room.clone()));

    let mut members = registry.members(&room).await;
    members.sort();
    let mut expected = vec![x, y];
    expected.sort();
    assert_eq!(members, expected);
}

#[tokio::test]
async fn test_sole_member_rejoining_gets_fresh_room() {
    let (registry, _relay, signaling) = create_test_registry();
    let room = RoomId::new("R1").unwrap();
    let x = signaling.connect();

    registry.join(x, room.clone()).await.unwrap();
    let snapshot = registry.join(x, room.clone()).await.unwrap();

    assert!(snapshot.is_empty());
    assert_eq!(registry.members(&room).await, vec![x]);
    assert_eq!(registry.room_of(&x), Some(room));
}
