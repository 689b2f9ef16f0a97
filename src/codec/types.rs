//! Decoded record shapes for each artifact kind (§4.6).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of a `triples/<dcid>` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple {
    pub subject_id: String,
    pub predicate: String,
    #[serde(default)]
    pub object_id: Option<String>,
    #[serde(default)]
    pub object_name: Option<String>,
    #[serde(default)]
    pub object_value: Option<String>,
    #[serde(default)]
    pub subject_types: Vec<String>,
    #[serde(default)]
    pub object_types: Vec<String>,
    #[serde(default)]
    pub provenance_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriplesRecord {
    pub triples: Vec<Triple>,
}

/// One row of a property-values record (in or out direction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedNode {
    pub dcid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub provenance_id: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyValuesRecord {
    pub nodes: Vec<TypedNode>,
}

/// `arcs/<dcid>` record: in/out predicate labels. Absent lists are
/// normalized to empty on decode, never surfaced as null (§4.6).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyLabels {
    #[serde(default)]
    pub in_labels: Vec<String>,
    #[serde(default)]
    pub out_labels: Vec<String>,
}

/// `relatedLocations*` record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedEntitiesRecord {
    pub dcids: Vec<String>,
    #[serde(default)]
    pub rank_from_top: Option<i64>,
    #[serde(default)]
    pub rank_from_bottom: Option<i64>,
}

/// `popPV/<dcid>` population triples: `^`-separated alternating
/// predicate/value pairs, cardinality = pairs / 2, emitted as a
/// `numConstraints` pseudo-triple alongside the real ones (§4.6).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationTriples {
    pub pairs: Vec<(String, String)>,
    pub num_constraints: usize,
}

pub fn decode_pop_pv(raw: &str) -> Result<PopulationTriples, super::error::CodecError> {
    if raw.is_empty() {
        return Ok(PopulationTriples::default());
    }
    let parts: Vec<&str> = raw.split('^').collect();
    if parts.len() % 2 != 0 {
        return Err(super::error::CodecError::MalformedPopPv(format!(
            "odd number of ^-separated fields ({})",
            parts.len()
        )));
    }
    let pairs: Vec<(String, String)> = parts
        .chunks_exact(2)
        .map(|c| (c[0].to_string(), c[1].to_string()))
        .collect();
    let num_constraints = pairs.len();
    Ok(PopulationTriples {
        pairs,
        num_constraints,
    })
}

/// One date -> value point with the facet it came from, the shape a
/// `statValue` lookup resolves to (§4.7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatedValue {
    pub date: String,
    pub value: f64,
}

/// Facet tuple (§3): the provenance/method fingerprint of one series
/// variant. Equality here is what "belongs to exactly one facet" means.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Facet {
    pub import_name: String,
    pub measurement_method: String,
    pub observation_period: String,
    pub scaling_factor: String,
    pub unit: String,
    pub provenance_url: String,
}

/// One facet-tagged time series for a single (entity, stat-var).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSeries {
    pub facet: Facet,
    /// date (ASCII-sortable YYYY|YYYY-MM|YYYY-MM-DD) -> value.
    pub values: BTreeMap<String, f64>,
    #[serde(default)]
    pub earliest_date: Option<String>,
    #[serde(default)]
    pub latest_date: Option<String>,
}

impl SourceSeries {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `max(date)` within this series — the "latest value" per §4.7 select.
    pub fn latest(&self) -> Option<DatedValue> {
        self.values.iter().next_back().map(|(d, v)| DatedValue {
            date: d.clone(),
            value: *v,
        })
    }
}

/// The full set of facet variants for one (entity, stat-var), the input
/// to the ranking/filter engine (§4.7).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObsTimeSeries {
    pub series_by_facet: Vec<SourceSeries>,
}
