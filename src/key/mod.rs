//! Row-key grammar and pure key-construction functions (§4.1, §6).
//!
//! Row keys are persisted compatibility contracts with the upstream
//! producer pipeline: prefix literals, component order, and the `^`
//! separator may never change independently of that pipeline (§9).

mod builder;
mod stat_var;
mod token;

pub use builder::{
    chart_data, landing_page, location_rankings, observed_ancestor, places_in, place_stat_vars,
    pop_constraint, property_labels, property_values, related_entities, related_locations_prefix,
    stat_collection, stats_series, triples, Direction, KeySet, ObservedAncestorKind,
    RelatedEntitiesFlags, PREFIX_ARCS, PREFIX_CHART, PREFIX_LANDING_PAGE, PREFIX_OBS_ANCESTOR,
    PREFIX_PLACES_IN, PREFIX_PLACE_STAT_VARS, PREFIX_POP_PV, PREFIX_PROPERTY_VALUES_IN,
    PREFIX_PROPERTY_VALUES_OUT, PREFIX_TRIPLES,
};
pub use stat_var::StatVarDescriptor;
pub use token::{dcid_heuristic_token, Token};
