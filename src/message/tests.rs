//! Unit tests for catalog-driven message encoding.

use bytes::Bytes;
use rstest::rstest;

use super::*;
use crate::error::ProtocolViolation;

fn sample(kind: FrameKind) -> Message {
    match kind {
        FrameKind::IAm => Message::IAm(IAm::cell()),
        FrameKind::Accept => Message::Accept(Accept::default()),
        FrameKind::Mount => Message::Mount(MountPoint::default()),
        FrameKind::Unmount => Message::Unmount(MountPoint::default()),
        FrameKind::NeedBand => Message::NeedBand(NeedBand { count: 1 }),
        FrameKind::HttpReqHead => HttpReqHead::default().into(),
        FrameKind::HttpReqBody => Message::HttpReqBody(Bytes::new()),
        FrameKind::HttpReqEnd => Message::HttpReqEnd,
        FrameKind::HttpResHead => HttpResHead::default().into(),
        FrameKind::HttpResBody => Message::HttpResBody(Bytes::new()),
        FrameKind::HttpResEnd => Message::HttpResEnd,
    }
}

/// Structured payloads carry exactly the keys their catalog schema lists.
#[test]
fn structured_payload_keys_match_schema() {
    for entry in &catalog::CATALOG {
        if entry.shape != PayloadShape::Structured {
            continue;
        }
        let bytes = sample(entry.kind).encode().expect("sample encodes");
        let object: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&bytes[1..]).expect("payload is a JSON object");
        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        let mut schema: Vec<&str> = entry.fields.iter().map(|field| field.name).collect();
        keys.sort_unstable();
        schema.sort_unstable();
        assert_eq!(keys, schema, "{} payload keys", entry.kind);
    }
}

/// Dropping a required key fails to decode; dropping an optional one does not.
#[test]
fn required_flags_decide_whether_a_missing_key_decodes() {
    for entry in &catalog::CATALOG {
        if entry.shape != PayloadShape::Structured {
            continue;
        }
        let bytes = sample(entry.kind).encode().expect("sample encodes");
        let object: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&bytes[1..]).expect("payload is a JSON object");
        for field in entry.fields {
            let mut stripped = object.clone();
            assert!(
                stripped.remove(field.name).is_some(),
                "{} sample lacks {}",
                entry.kind,
                field.name
            );
            let payload = serde_json::to_vec(&stripped).expect("stripped payload encodes");
            let result = Message::from_bytes(frame::encode_frame(entry.kind.tag(), &payload));
            if field.required {
                assert!(
                    matches!(result, Err(HiveError::PayloadDecode { kind, .. }) if kind == entry.kind),
                    "{} without required {} gave {result:?}",
                    entry.kind,
                    field.name
                );
            } else {
                assert!(
                    result.is_ok(),
                    "{} without optional {} gave {result:?}",
                    entry.kind,
                    field.name
                );
            }
        }
    }
}

#[test]
fn every_kind_decodes_to_itself() {
    for kind in FrameKind::ALL {
        let message = sample(kind);
        let bytes = message.encode().expect("sample encodes");
        assert_eq!(bytes[0], kind.tag());
        assert_eq!(Message::from_bytes(bytes).expect("sample decodes"), message);
    }
}

#[test]
fn iam_uses_original_field_names() {
    let bytes = Message::IAm(IAm {
        conn_kind: 1,
        uuid: "abc".to_owned(),
    })
    .encode()
    .expect("IAm encodes");
    assert_eq!(&bytes[..], b"\x00{\"connKind\":1,\"uuid\":\"abc\"}");
}

#[test]
fn raw_payload_is_passed_through_verbatim() {
    let chunk = Bytes::from_static(b"\x00\xFFnot json");
    let bytes = Message::HttpResBody(chunk.clone()).encode().expect("raw encodes");
    assert_eq!(&bytes[1..], &chunk[..]);
}

#[test]
fn optional_request_fields_default_when_absent() {
    let json = br#"{"remoteAddr":"10.0.0.1:5000","method":"GET","scheme":"https","host":"example.com","port":443,"path":"/","proto":"HTTP/2.0","protoMajor":2,"protoMinor":0}"#;
    let bytes = frame::encode_frame(FrameKind::HttpReqHead.tag(), json);
    let Message::HttpReqHead(head) = Message::from_bytes(bytes).expect("minimal head decodes")
    else {
        panic!("expected a request head");
    };
    assert!(head.query.is_empty());
    assert!(head.headers.is_empty());
    assert!(head.form.is_empty());
    assert_eq!(head.remote_addr_real, "");
    assert_eq!(head.port, 443);
}

#[rstest]
#[case(FrameKind::IAm, &b"{\"uuid\":\"x\"}"[..])]
#[case(FrameKind::Mount, &b"{\"host\":\"a\"}"[..])]
#[case(FrameKind::NeedBand, &b"{\"count\":-1}"[..])]
#[case(FrameKind::HttpResHead, &b"not json"[..])]
#[case(FrameKind::Accept, &b""[..])]
fn bad_structured_payloads_fail_to_decode(#[case] kind: FrameKind, #[case] payload: &[u8]) {
    let bytes = frame::encode_frame(kind.tag(), payload);
    let err = Message::from_bytes(bytes).expect_err("payload must be rejected");
    assert!(
        matches!(err, HiveError::PayloadDecode { kind: k, .. } if k == kind),
        "unexpected error {err:?}"
    );
}

#[test]
fn end_markers_reject_trailing_bytes() {
    let bytes = frame::encode_frame(FrameKind::HttpReqEnd.tag(), b"x");
    assert!(matches!(
        Message::from_bytes(bytes),
        Err(HiveError::PayloadDecode {
            kind: FrameKind::HttpReqEnd,
            ..
        })
    ));
}

#[test]
fn unknown_tag_is_a_protocol_violation() {
    let err = Message::from_bytes(Bytes::from_static(b"\x21{}")).expect_err("tag 0x21 unknown");
    assert_eq!(
        err.as_violation(),
        Some(&ProtocolViolation::UnknownKind { tag: 0x21 })
    );
}

#[test]
fn empty_frame_is_malformed() {
    assert!(matches!(
        Message::from_bytes(Bytes::new()),
        Err(HiveError::MalformedFrame)
    ));
}

#[rstest]
#[case(7)]
#[case(256)]
#[case(-1)]
fn unknown_role_number_survives_decoding(#[case] conn_kind: i64) {
    let json = format!(r#"{{"connKind":{conn_kind},"uuid":""}}"#);
    let bytes = frame::encode_frame(FrameKind::IAm.tag(), json.as_bytes());
    let Message::IAm(iam) = Message::from_bytes(bytes).expect("IAm decodes") else {
        panic!("expected IAm");
    };
    assert_eq!(iam.role(), Err(ProtocolViolation::UnknownRole { conn_kind }));
}
