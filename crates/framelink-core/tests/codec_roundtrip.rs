//! Codec properties over freshly built envelopes.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::HashSet;

use serde_json::{json, Value};

use framelink_core::protocol::{decode, encode, ChannelId, Envelope, EnvelopeId};

#[test]
fn every_kind_survives_the_wire() {
    let ch = ChannelId::generate();
    let asked = EnvelopeId::generate();
    let envelopes = vec![
        Envelope::syn(ch.clone(), "https://host.example"),
        Envelope::ack(ch.clone(), "https://plugin.example"),
        Envelope::send(ch.clone(), "setTitle", json!("Organizations")),
        Envelope::send(ch.clone(), "ready", Value::Null),
        Envelope::request(ch.clone(), "ping", json!({ "n": [1, 2, 3], "nested": { "ok": true } })),
        Envelope::response(ch.clone(), asked.clone(), "ping", json!({ "ack": true })),
        Envelope::error(ch.clone(), asked, "boom"),
    ];

    for env in envelopes {
        let wire = encode(&env).unwrap();
        assert_eq!(decode(&wire).unwrap(), env);
    }
}

#[test]
fn wire_uses_camel_case_and_omits_absent_fields() {
    let ch = ChannelId::from("c-1");
    let env = Envelope::send(ch, "ready", Value::Null);
    let wire = encode(&env).unwrap();

    let obj = wire.as_object().unwrap();
    assert_eq!(obj["channelId"], "c-1");
    assert_eq!(obj["kind"], "send");
    assert!(obj.contains_key("envelopeId"));
    assert!(!obj.contains_key("payload"));
    assert!(!obj.contains_key("inReplyTo"));
}

#[test]
fn envelope_ids_are_not_reused() {
    let ch = ChannelId::generate();
    let ids: HashSet<String> = (0..1000)
        .map(|_| Envelope::send(ch.clone(), "n", Value::Null).envelope_id.as_str().to_string())
        .collect();
    assert_eq!(ids.len(), 1000);
}

#[test]
fn handshake_must_not_carry_reply_id() {
    let wire = json!({
        "channelId": "c-1",
        "envelopeId": "e-1",
        "kind": "handshake-ack",
        "payload": { "origin": "https://plugin.example" },
        "inReplyTo": "e-0"
    });
    let err = decode(&wire).unwrap_err();
    assert!(err.reason.contains("inReplyTo"), "{}", err.reason);
}
