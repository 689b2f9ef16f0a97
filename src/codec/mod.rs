//! Artifact codec (§4.6): decodes one cell payload into a typed record.
//!
//! Every payload goes through the same fixed chain — base64-decode,
//! gzip-decompress, then a structural decode that is specific to the
//! record kind the caller expects (the row key's prefix tells the caller
//! which `decode_*` function applies; this module does not itself branch
//! on prefixes).

mod chart_store;
mod decode;
mod error;
mod types;

pub use chart_store::ChartStore;
pub use decode::{
    decode_chart, decode_population_triples, decode_property_labels, decode_property_values,
    decode_related_entities, decode_triples, inflate_cell,
};
pub use error::{CodecError, CodecResult};
pub use types::{
    decode_pop_pv, DatedValue, Facet, ObsTimeSeries, PopulationTriples, PropertyLabels,
    PropertyValuesRecord, RelatedEntitiesRecord, SourceSeries, Triple, TriplesRecord, TypedNode,
};
