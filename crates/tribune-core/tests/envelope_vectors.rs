//! Envelope decoding vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use tribune_core::protocol::decode_envelope;

use vector_loader::load;

#[test]
fn envelope_vectors() {
    let files = [
        "typing_min.json",
        "message_read_full.json",
        "new_message_extra_fields.json",
        "not_json.json",
        "missing_type.json",
        "unknown_type.json",
        "bad_timestamp.json",
    ];

    for f in files {
        let v = load(f);
        let res = decode_envelope(&v.frame);

        if let Some(err) = v.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.client_code().as_str(), err.code, "vector={}", v.description);
            continue;
        }

        let env = res.expect("expected ok envelope");
        let ex = v.expect.expect("missing expect block");

        assert_eq!(env.kind.as_str(), ex["type"].as_str().unwrap(), "vector={}", v.description);
        assert_eq!(
            env.conversation_id.as_ref().map(|c| c.as_str()),
            ex["conversation_id"].as_str(),
            "vector={}",
            v.description
        );
        assert_eq!(
            env.user_id.as_ref().map(|u| u.as_str()),
            ex["user_id"].as_str(),
            "vector={}",
            v.description
        );
        assert_eq!(
            env.timestamp.is_some(),
            ex["has_timestamp"].as_bool().unwrap_or(false),
            "vector={}",
            v.description
        );

        match ex["message_id"].as_str() {
            Some(id) => {
                let raw = env.message.as_ref().expect("message payload");
                let payload: serde_json::Value = serde_json::from_str(raw.get()).unwrap();
                assert_eq!(payload["id"], id, "vector={}", v.description);
            }
            None => assert!(env.message.is_none(), "vector={}", v.description),
        }
    }
}

#[test]
fn opaque_payload_survives_reencode() {
    let v = load("new_message_extra_fields.json");
    let env = decode_envelope(&v.frame).unwrap();
    let out = env.to_json().unwrap();
    assert!(out.contains(r#""message":{"id":"m1","body":"hi"}"#));
    assert!(!out.contains("client_version"));
}
