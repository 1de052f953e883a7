//! Wire envelope vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use serde_json::Value;

use tablesync_core::protocol::{decode, Envelope};

use vector_loader::load;

#[test]
fn envelope_vectors() {
    let files = [
        "send_min.json",
        "send_with_channel.json",
        "response_ok.json",
        "response_void.json",
        "response_error.json",
        "bad_json.json",
        "response_both.json",
        "unknown_field.json",
    ];

    for f in files {
        let v = load(f);
        let res = decode(&v.frame);

        if let Some(err) = v.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.client_code().as_str(), err.code, "vector={}", v.description);
            continue;
        }

        let env = res.expect("expected ok envelope");
        let ex = v.expect.expect("missing expect block");

        match (ex["kind"].as_str().unwrap(), env) {
            ("send", Envelope::Send(s)) => {
                assert_eq!(s.name, ex["name"].as_str().unwrap(), "vector={}", v.description);
                assert_eq!(s.payload, ex["payload"], "vector={}", v.description);
                assert_eq!(
                    s.channel.map(u64::from),
                    ex["channel"].as_u64(),
                    "vector={}",
                    v.description
                );
            }
            ("response", Envelope::Response(r)) => {
                assert_eq!(r.channel as u64, ex["channel"].as_u64().unwrap(), "vector={}", v.description);
                match ex.get("error").and_then(Value::as_str) {
                    Some(msg) => {
                        let e = r.into_result().unwrap_err();
                        assert_eq!(e.to_string(), msg, "vector={}", v.description);
                    }
                    None => {
                        assert_eq!(r.into_result().unwrap(), ex["result"], "vector={}", v.description);
                    }
                }
            }
            (kind, other) => panic!("vector={} expected {kind}, got {other:?}", v.description),
        }
    }
}

#[test]
fn encoded_request_decodes_to_same_envelope() {
    let env = Envelope::request("boardPlay", serde_json::json!({"id": "b1"}), 7);
    let frame = tablesync_core::protocol::encode(&env).unwrap();
    assert_eq!(decode(&frame).unwrap(), env);
}
