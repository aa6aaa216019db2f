use meshcall_core::{ServerMessage, SignalEnvelope};
use serde_json::json;

use crate::integration::{create_test_registry, init_tracing};

const MESSAGE_COUNT: usize = 200;

#[tokio::test]
async fn test_rapid_signals_keep_pair_order() {
    init_tracing();

    let (_registry, relay, signaling) = create_test_registry();
    let a = signaling.connect();
    let b = signaling.connect();
    let target = signaling.connect();

    for i in 0..MESSAGE_COUNT {
        for sender in [a, b] {
            relay
                .relay(sender, SignalEnvelope {
                    to: target,
                    from: None,
                    payload: json!({"seq": i}),
                })
                .await;
        }
    }

    for sender in [a, b] {
        let seqs: Vec<u64> = signaling
            .messages_for(&target)
            .into_iter()
            .filter_map(|msg| match msg {
                ServerMessage::Signal { from, payload } if from == sender => payload["seq"].as_u64(),
                _ => None,
            })
            .collect();

        let expected: Vec<u64> = (0..MESSAGE_COUNT as u64).collect();
        assert_eq!(seqs, expected);
    }
}
