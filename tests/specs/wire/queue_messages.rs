//! Queue message specs
//!
//! A request carrying file payloads travels dispatcher -> relay hop ->
//! worker. The JSON envelope and the file bodies move separately; the relay
//! hop forwards bodies it received without buffering them in memory.

use std::io::Cursor;

use keel_core::{ActivityId, DataStream};
use keel_wire::{read_data_stream, rewire_for_forwarding, write_data_stream, ProtocolError};

use crate::prelude::*;

fn request_with_files() -> ExecuteScript {
    ExecuteScript {
        activity_id: ActivityId::new(),
        script: "tar -xf bundle.tar && ./run.sh".to_string(),
        files: vec![
            DataStream::from_bytes(b"#!/bin/sh\necho run\n".to_vec()),
            DataStream::from_bytes(vec![0x5a; 300_000]),
        ],
    }
}

/// Everything one hop sends: the message bytes, then every stream body.
struct Delivery {
    message: Vec<u8>,
    bodies: Vec<u8>,
}

fn send(serializer: &QueueMessageSerializer, request: &ExecuteScript) -> Delivery {
    let (message, streams) = serializer.write_message(request).unwrap();
    let mut bodies = Vec::new();
    for stream in &streams {
        write_data_stream(stream, &mut bodies, serializer.transforms()).unwrap();
    }
    Delivery { message, bodies }
}

fn receive(serializer: &QueueMessageSerializer, delivery: Delivery) -> ExecuteScript {
    let (request, streams) =
        serializer.read_message::<ExecuteScript>(&delivery.message).unwrap();
    let mut bodies = Cursor::new(delivery.bodies);
    for _ in &streams {
        read_data_stream(&mut bodies, serializer.transforms(), &streams).unwrap();
    }
    request
}

#[test]
fn files_arrive_intact_through_compressed_transport() {
    let serializer = QueueMessageSerializer::new(TransformChain::compressed());
    let sent = request_with_files();

    let delivery = send(&serializer, &sent);
    assert!(delivery.message.len() < 1024, "file bodies must not ride in the envelope");
    let received = receive(&serializer, delivery);

    assert_eq!(received.activity_id, sent.activity_id);
    assert_eq!(received.script, sent.script);
    assert_eq!(received.files.len(), 2);
    for (got, want) in received.files.iter().zip(&sent.files) {
        let mut sent_bytes = Vec::new();
        want.write_to(&mut sent_bytes).unwrap();
        assert_eq!(got.id(), want.id());
        assert_eq!(got.read_to_vec().unwrap(), sent_bytes);
    }
    assert_eq!(received.files[0].read_to_vec().unwrap(), b"#!/bin/sh\necho run\n");
}

#[test]
fn relay_hop_forwards_received_files() {
    let serializer = QueueMessageSerializer::new(TransformChain::compressed());
    let sent = request_with_files();

    let at_hop = receive(&serializer, send(&serializer, &sent));
    rewire_for_forwarding(&at_hop.files).unwrap();
    let at_worker = receive(&serializer, send(&serializer, &at_hop));

    assert_eq!(at_worker.files[1].read_to_vec().unwrap(), vec![0x5a; 300_000]);
    assert_eq!(at_worker.files[0].id(), sent.files[0].id());
}

#[test]
fn worker_rejects_message_meant_for_another_type() {
    #[derive(Debug, serde::Serialize, serde::Deserialize)]
    struct CancelRequest {
        activity_id: ActivityId,
    }

    let serializer = QueueMessageSerializer::default();
    let (bytes, _) =
        serializer.write_message(&CancelRequest { activity_id: ActivityId::new() }).unwrap();

    let err = serializer.read_message::<ExecuteScript>(&bytes).unwrap_err();
    assert!(matches!(err, ProtocolError::TypeMismatch { .. }), "got {err:?}");
}

#[test]
fn envelope_is_plain_json_without_transforms() {
    let serializer = QueueMessageSerializer::default();
    let request = ExecuteScript {
        activity_id: ActivityId::new(),
        script: "true".to_string(),
        files: vec![DataStream::from_bytes(b"abc".to_vec())],
    };
    let (bytes, streams) = serializer.write_message(&request).unwrap();

    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["message"]["script"], "true");
    assert_eq!(json["message"]["files"][0]["length"], 3);
    assert_eq!(streams, request.files);
}
