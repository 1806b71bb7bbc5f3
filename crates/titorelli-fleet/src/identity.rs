// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client identifier codec.
//!
//! A client identifier is the external credential subject of a bot workload.
//! It packs the internal bot id and the account id into one opaque string:
//!
//! ```text
//! base64( base64("<bot id>") ":" base64("<account id>") )
//! ```
//!
//! Decoding is strict: anything that would not be produced by [`encode`]
//! for some pair is rejected with [`IdentityError::Malformed`], so a decoded
//! pair is always the exact pair that was encoded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

/// Errors from decoding a client identifier.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdentityError {
    /// The identifier is not structurally valid.
    #[error("Malformed client identifier: {0}")]
    Malformed(&'static str),
}

/// Decoded client identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
    /// Internal (store-assigned) bot id.
    pub bot_id: i64,
    /// Account (tenant) id.
    pub account_id: i64,
}

impl ClientIdentity {
    /// Create an identity from its parts.
    pub fn new(bot_id: i64, account_id: i64) -> Self {
        Self { bot_id, account_id }
    }

    /// Encode into an opaque client identifier.
    pub fn encode(&self) -> String {
        encode(self.bot_id, self.account_id)
    }
}

/// Encode a (bot id, account id) pair into an opaque client identifier.
pub fn encode(bot_id: i64, account_id: i64) -> String {
    let inner = format!(
        "{}:{}",
        STANDARD.encode(bot_id.to_string()),
        STANDARD.encode(account_id.to_string())
    );

    STANDARD.encode(inner)
}

/// Decode a client identifier produced by [`encode`].
pub fn decode(client_id: &str) -> Result<ClientIdentity, IdentityError> {
    let outer = decode_utf8(client_id)?;

    let mut parts = outer.split(':');
    let (Some(bot_part), Some(account_part), None) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(IdentityError::Malformed("expected exactly two segments"));
    };

    Ok(ClientIdentity {
        bot_id: decode_id(bot_part)?,
        account_id: decode_id(account_part)?,
    })
}

fn decode_utf8(input: &str) -> Result<String, IdentityError> {
    let bytes = STANDARD
        .decode(input)
        .map_err(|_| IdentityError::Malformed("invalid base64"))?;

    String::from_utf8(bytes).map_err(|_| IdentityError::Malformed("invalid utf-8"))
}

fn decode_id(segment: &str) -> Result<i64, IdentityError> {
    let digits = decode_utf8(segment)?;
    let id: i64 = digits
        .parse()
        .map_err(|_| IdentityError::Malformed("segment is not an integer"))?;

    // "+7" or "007" would parse but never come out of encode()
    if id.to_string() != digits {
        return Err(IdentityError::Malformed("non-canonical integer"));
    }

    Ok(id)
}
