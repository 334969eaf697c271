// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn endpoint(uri: &str) -> Endpoint {
    Endpoint::new(uri).unwrap()
}

#[test]
fn marker_and_channel_are_namespaced_per_request() {
    let keys = KeySpace::new("octo");
    let e = endpoint("poll://E1/");
    let a = ActivityId::new();

    assert_eq!(keys.cancellation_marker(&e, a), format!("octo:cancel:poll://E1/:{a}"));
    assert_eq!(keys.cancellation_channel(&e, a), format!("octo:cancel-channel:poll://E1/:{a}"));
}

#[test]
fn different_requests_never_share_names() {
    let keys = KeySpace::default();
    let e1 = endpoint("poll://E1/");
    let e2 = endpoint("poll://E2/");
    let a1 = ActivityId::new();
    let a2 = ActivityId::new();

    assert_ne!(keys.cancellation_marker(&e1, a1), keys.cancellation_marker(&e1, a2));
    assert_ne!(keys.cancellation_marker(&e1, a1), keys.cancellation_marker(&e2, a1));
    assert_ne!(keys.cancellation_marker(&e1, a1), keys.cancellation_channel(&e1, a1));
}

#[test]
fn canary_keys_are_fresh() {
    let keys = KeySpace::new("ns");
    let first = keys.new_canary_key();
    let second = keys.new_canary_key();

    assert!(first.starts_with("ns:canary:"));
    assert_ne!(first, second);
}

#[test]
fn keyspace_follows_config_namespace() {
    let config = crate::RelayConfig::default().with_namespace("custom");
    assert_eq!(KeySpace::from(&config).namespace(), "custom");
}
