//! Entity id (Dcid) — opaque bounded-length token, restricted character set.
//!
//! Identity key for every other entity in the graph (§3 Data model). The
//! restricted alphabet and length cap are not specified exactly by the
//! design doc; we follow the shapes real dcids take (`geoId/06`,
//! `country/USA`, `Count_Person`, a bare UUID-shaped id for blank nodes)
//! and keep the limit generous but finite so a malformed request fails
//! fast instead of building an unbounded row key.

use crate::error::MixerError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum byte length of a dcid. Generous relative to observed ids, but
/// finite — unbounded ids would let a single request construct arbitrarily
/// large row keys.
pub const MAX_DCID_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dcid(String);

impl Dcid {
    pub fn parse(raw: impl Into<String>) -> Result<Self, MixerError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(MixerError::InvalidArgument("empty dcid".to_string()));
        }
        if raw.len() > MAX_DCID_LEN {
            return Err(MixerError::InvalidArgument(format!(
                "dcid exceeds {MAX_DCID_LEN} bytes: {raw}"
            )));
        }
        if raw.contains('^') {
            return Err(MixerError::InvalidArgument(format!(
                "dcid contains reserved separator '^': {raw}"
            )));
        }
        if !raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b':' | b'.' | b'_' | b'-' | b'/'))
        {
            return Err(MixerError::InvalidArgument(format!(
                "dcid has disallowed characters: {raw}"
            )));
        }
        Ok(Dcid(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Dcid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Dcid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
