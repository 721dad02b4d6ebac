use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// An opaque correlation token minted by the requester and echoed verbatim
/// by the responder. Carries the issuing endpoint's name so a peer without
/// a `type` field can still tell a response from a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Session(String);

impl Session {
    /// Mints a fresh token of the form `RTWS.<name>[<time>,<hex>]`.
    ///
    /// The nonce is 8 random bytes (64 bits, well above the ≥40 bit floor
    /// required for global uniqueness with overwhelming probability).
    pub fn mint(name: &str) -> Self {
        let mut nonce = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut nonce);
        let time = OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1_000_000_000.0;
        Self(format!("RTWS.{name}[{time},{}]", hex::encode(nonce)))
    }

    /// Extracts the endpoint name embedded at mint time, supporting both
    /// the normative `RTWS.<name>[...]` form and the legacy
    /// `Name:<name>,Time:...,Nonce:...` form so that a peer running the
    /// older wire variant can still be disambiguated.
    pub fn issuer(&self) -> Option<&str> {
        if let Some(rest) = self.0.strip_prefix("RTWS.") {
            rest.find('[').map(|idx| &rest[..idx])
        } else if let Some(rest) = self.0.strip_prefix("Name:") {
            rest.find(',').map(|idx| &rest[..idx])
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Session {
    fn from(value: String) -> Self {
        Self(value)
    }
}
