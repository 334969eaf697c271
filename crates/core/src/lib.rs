// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keel-core: identities and payload types shared across the relay layer

pub mod data_stream;
pub mod endpoint;
pub mod id;

pub use data_stream::{
    capture_streams, DataStream, DataStreamError, DataStreamReader, DataStreamWriter,
};
pub use endpoint::{Endpoint, EndpointError};
pub use id::{short, ActivityId, DataStreamId};
