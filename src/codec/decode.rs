//! Decoder chain: base-decode -> decompress -> structural-decode (§4.6).
//!
//! The chain's first two stages are fixed and identical for every record
//! kind; only the structural decode varies, dispatched by the caller based
//! on the row-key prefix (the codec itself is prefix-agnostic at this
//! layer — callers pick which `decode_*` function to invoke).

use super::chart_store::{decode_chart_store, ChartStore};
use super::error::{CodecError, CodecResult};
use super::types::{
    decode_pop_pv, PopulationTriples, PropertyLabels, PropertyValuesRecord, RelatedEntitiesRecord,
    TriplesRecord,
};
use base64::Engine;
use std::io::Read;

/// Stage 1+2: base64-decode then gzip-decompress a cell payload.
pub fn inflate_cell(raw: &[u8]) -> CodecResult<Vec<u8>> {
    if raw.is_empty() {
        return Err(CodecError::EmptyCell);
    }
    let compressed = base64::engine::general_purpose::STANDARD.decode(raw)?;
    let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CodecError::Gzip(e.to_string()))?;
    Ok(out)
}

pub fn decode_triples(raw: &[u8]) -> CodecResult<TriplesRecord> {
    let bytes = inflate_cell(raw)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn decode_property_values(raw: &[u8]) -> CodecResult<PropertyValuesRecord> {
    let bytes = inflate_cell(raw)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn decode_property_labels(raw: &[u8]) -> CodecResult<PropertyLabels> {
    let bytes = inflate_cell(raw)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn decode_related_entities(raw: &[u8]) -> CodecResult<RelatedEntitiesRecord> {
    let bytes = inflate_cell(raw)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn decode_chart(raw: &[u8]) -> CodecResult<ChartStore> {
    let bytes = inflate_cell(raw)?;
    decode_chart_store(&bytes)
}

/// `popPV/<dcid>` rows are the one record kind whose structural form is
/// not JSON: a `^`-separated alternating predicate/value string (§4.6).
pub fn decode_population_triples(raw: &[u8]) -> CodecResult<PopulationTriples> {
    let bytes = inflate_cell(raw)?;
    let text = String::from_utf8(bytes)
        .map_err(|e| CodecError::MalformedPopPv(e.to_string()))?;
    decode_pop_pv(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn encode_cell(json: &str) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(json.as_bytes()).unwrap();
        let compressed = enc.finish().unwrap();
        base64::engine::general_purpose::STANDARD
            .encode(compressed)
            .into_bytes()
    }

    #[test]
    fn round_trips_triples() {
        let json = r#"{"triples":[{"subject_id":"geoId/06","predicate":"name","object_name":"California"}]}"#;
        let raw = encode_cell(json);
        let decoded = decode_triples(&raw).unwrap();
        assert_eq!(decoded.triples.len(), 1);
        assert_eq!(decoded.triples[0].subject_id, "geoId/06");
    }

    #[test]
    fn empty_cell_is_dropped_not_panicked() {
        assert!(matches!(inflate_cell(&[]), Err(CodecError::EmptyCell)));
    }

    #[test]
    fn pop_pv_cardinality_matches_pair_count() {
        let decoded = decode_pop_pv("age^18OrMore^gender^Female").unwrap();
        assert_eq!(decoded.num_constraints, 2);
        assert_eq!(decoded.pairs.len(), 2);
    }

    #[test]
    fn pop_pv_rejects_odd_field_count() {
        assert!(decode_pop_pv("age^18OrMore^gender").is_err());
    }
}
