//! Reverse key -> semantic-slot token map.
//!
//! Every key builder returns, alongside the row keys, a map from row key to
//! the token that identifies which semantic slot produced it, so fan-out
//! code never has to re-parse a row key to bucket results (§4.1).

use crate::dcid::Dcid;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// A single place/entity.
    Place(Dcid),
    /// A (place, stat-var) pair, the common unit for observation requests.
    PlaceStatVar(Dcid, Dcid),
    /// The trailing suffix segment, used when neither of the above fits
    /// (e.g. related-entities ranking keys keyed by place type).
    Suffix(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Place(d) => write!(f, "{d}"),
            Token::PlaceStatVar(p, sv) => write!(f, "{p}^{sv}"),
            Token::Suffix(s) => write!(f, "{s}"),
        }
    }
}

/// Derive a token from the dcid heuristic: the last `^`-delimited segment
/// before the final separator, used by the row-store reader when the
/// caller passes no explicit `tokenFn` (§4.2).
pub fn dcid_heuristic_token(row_key: &str) -> Token {
    let suffix = row_key.rsplit('/').next().unwrap_or(row_key);
    let mut parts = suffix.split('^');
    let first = parts.next().unwrap_or(suffix);
    Token::Suffix(first.to_string())
}
