// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier types shared by the relay layer.

/// Returns a string slice truncated to at most `n` characters.
pub fn short(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

/// Define a newtype ID wrapper around a 128-bit `Uuid`.
///
/// Generates `new()` for random ID generation, `from_uuid()`, `as_uuid()`,
/// `short()`, `Display`, `FromStr`, `From<Uuid>` and transparent serde
/// implementations.
///
/// ```ignore
/// define_id! {
///     /// Doc comment for the ID type.
///     pub struct ActivityId;
/// }
/// ```
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            /// Generate a new random ID
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            pub fn from_uuid(id: uuid::Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            /// Returns the first `n` characters of the hyphenated form, for logs.
            pub fn short(&self, n: usize) -> String {
                let full = self.0.to_string();
                $crate::id::short(&full, n).to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0.as_hyphenated())
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(id: uuid::Uuid) -> Self {
                Self(id)
            }
        }
    };
}

define_id! {
    /// Identifies one RPC invocation.
    ///
    /// Minted by the caller when the request is enqueued and carried with it
    /// for the lifetime of that single call. Cancellation markers and
    /// notifications are correlated by this id.
    pub struct ActivityId;
}

define_id! {
    /// Identifies one out-of-band binary payload.
    pub struct DataStreamId;
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
