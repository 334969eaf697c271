// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Logical destinations for relayed requests.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("endpoint must not be empty")]
    Empty,
    #[error("endpoint must not contain whitespace: {0:?}")]
    Whitespace(String),
}

/// A polling subscription URI, e.g. `poll://SQ-TENTACLE/`.
///
/// Many independent endpoints share one broker; every key and channel the
/// relay touches is namespaced by the endpoint so they never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(uri: impl Into<String>) -> Result<Self, EndpointError> {
        let uri = uri.into();
        if uri.is_empty() {
            return Err(EndpointError::Empty);
        }
        if uri.chars().any(char::is_whitespace) {
            return Err(EndpointError::Whitespace(uri));
        }
        Ok(Self(uri))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = EndpointError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Endpoint> for String {
    fn from(e: Endpoint) -> Self {
        e.0
    }
}

impl std::str::FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Endpoint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[path = "endpoint_tests.rs"]
mod tests;
