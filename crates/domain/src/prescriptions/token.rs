use std::fmt;

use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

/// Number of random bytes behind a public token.
pub const TOKEN_BYTES: usize = 32;

/// Bearer credential handed to the pharmacy out-of-band.
///
/// No `Display`, and `Debug` is redacted: the raw value only leaves through
/// [`PublicToken::expose`].
#[derive(Clone, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(transparent)]
pub struct PublicToken(String);

impl PublicToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wraps a token presented by a caller. No format check: malformed input
    /// takes the same lookup path as a well-formed unknown token.
    pub fn from_presented(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PublicToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PublicToken(<redacted>)")
    }
}
