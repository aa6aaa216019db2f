mod test_abandoned_membership_calls;
mod test_peer_disconnect_triggers_leave;
mod test_rejoining_same_room;
mod test_switching_rooms;
