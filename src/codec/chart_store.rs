//! The "chart store" tagged union (§3, §9 Design Notes: dynamic dispatch
//! on variant payloads must use explicit discrimination, never a silent
//! fallback branch). Only the time-series variant exists today; decoding
//! an unrecognized `kind` is a hard decode error, not a no-op.

use super::error::{CodecError, CodecResult};
use super::types::ObsTimeSeries;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChartStore {
    ObsTimeSeries(ObsTimeSeries),
}

/// Raw on-wire shape: a `{"kind": "...", ...}` envelope. We deserialize to
/// this first so an unrecognized `kind` produces `UnknownVariant` instead
/// of a generic serde error, matching "decoders must reject unknown
/// variants rather than branch silently" (§9).
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    kind: String,
}

pub fn decode_chart_store(bytes: &[u8]) -> CodecResult<ChartStore> {
    let raw: RawEnvelope = serde_json::from_slice(bytes)?;
    match raw.kind.as_str() {
        "obsTimeSeries" => {
            let parsed: ChartStore = serde_json::from_slice(bytes)?;
            Ok(parsed)
        }
        other => Err(CodecError::UnknownVariant(other.to_string())),
    }
}

impl ChartStore {
    pub fn as_obs_time_series(&self) -> Option<&ObsTimeSeries> {
        match self {
            ChartStore::ObsTimeSeries(ts) => Some(ts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_variant() {
        let bytes = br#"{"kind":"futureVariant"}"#;
        let err = decode_chart_store(bytes).unwrap_err();
        assert!(matches!(err, CodecError::UnknownVariant(_)));
    }

    #[test]
    fn decodes_obs_time_series() {
        let bytes = br#"{"kind":"obsTimeSeries","series_by_facet":[]}"#;
        let cs = decode_chart_store(bytes).unwrap();
        assert!(cs.as_obs_time_series().is_some());
    }
}
