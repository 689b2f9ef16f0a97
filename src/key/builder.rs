//! Pure, deterministic mapping from semantic arguments to row keys (§4.1).
//!
//! Every function here is a pure function of its arguments: no I/O, no
//! mutable state, and (§8 property 1) two independent calls with the same
//! arguments must produce byte-identical keys. Component separators and
//! prefix literals are a persisted contract with the producer pipeline
//! (§9 compatibility hazard) — never reorder components or change the `^`
//! separator.

use super::stat_var::StatVarDescriptor;
use super::token::Token;
use crate::dcid::Dcid;
use std::collections::HashMap;

pub const PREFIX_TRIPLES: &str = "triples/";
pub const PREFIX_ARCS: &str = "arcs/";
pub const PREFIX_PLACES_IN: &str = "placesIn/";
pub const PREFIX_PLACE_STAT_VARS: &str = "placeStatVars/";
pub const PREFIX_CHART: &str = "chart/";
pub const PREFIX_OBS_ANCESTOR: &str = "obsAncestor/";
pub const PREFIX_POP_PV: &str = "popPV/";
pub const PREFIX_PROPERTY_VALUES_OUT: &str = "propertyValuesOut/";
pub const PREFIX_PROPERTY_VALUES_IN: &str = "propertyValuesIn/";
pub const PREFIX_LANDING_PAGE: &str = "landingPage/";

/// Direction of a property-value traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// Observed-node ancestor kind (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedAncestorKind {
    ObservedNode,
    ComparedNode,
}

impl ObservedAncestorKind {
    fn as_str(self) -> &'static str {
        match self {
            ObservedAncestorKind::ObservedNode => "0",
            ObservedAncestorKind::ComparedNode => "1",
        }
    }
}

/// The one 2×2 (ancestor × per-capita) slice of the eight `relatedLocations`
/// prefixes (§6) that `relatedEntities` selects from; same-type is always
/// true for this operation (a relatedEntities query always compares
/// entities of the place's own type).
fn related_entities_prefix(same_ancestor: bool, per_capita: bool) -> &'static str {
    match (same_ancestor, per_capita) {
        (true, false) => "relatedLocationsSameTypeAndAncestor/",
        (true, true) => "relatedLocationsSameTypeAndAncestorPC/",
        (false, false) => "relatedLocationsSameType/",
        (false, true) => "relatedLocationsSameTypePC/",
    }
}

/// The full eight-way table (§6), exposed for `locationRankings` and for
/// callers that need the same-type=false variants.
pub fn related_locations_prefix(same_ancestor: bool, same_type: bool, per_capita: bool) -> &'static str {
    match (same_ancestor, same_type, per_capita) {
        (true, true, false) => "relatedLocationsSameTypeAndAncestor/",
        (true, true, true) => "relatedLocationsSameTypeAndAncestorPC/",
        (false, true, false) => "relatedLocationsSameType/",
        (false, true, true) => "relatedLocationsSameTypePC/",
        (true, false, false) => "relatedLocationsSameAncestor/",
        (true, false, true) => "relatedLocationsSameAncestorPC/",
        (false, false, false) => "relatedLocations/",
        (false, false, true) => "relatedLocationsPC/",
    }
}

/// Result of a key-builder call: the ordered keys plus the reverse
/// key -> token map so callers never re-parse a row key (§4.1).
pub struct KeySet {
    pub keys: Vec<String>,
    pub tokens: HashMap<String, Token>,
}

impl KeySet {
    fn with_capacity(n: usize) -> Self {
        KeySet {
            keys: Vec::with_capacity(n),
            tokens: HashMap::with_capacity(n),
        }
    }

    fn push(&mut self, key: String, token: Token) {
        self.tokens.insert(key.clone(), token);
        self.keys.push(key);
    }
}

pub fn triples(dcids: &[Dcid]) -> KeySet {
    let mut out = KeySet::with_capacity(dcids.len());
    for dcid in dcids {
        let key = format!("{PREFIX_TRIPLES}{dcid}");
        out.push(key, Token::Place(dcid.clone()));
    }
    out
}

pub fn property_values(dcids: &[Dcid], predicate: &str, direction: Direction) -> KeySet {
    let prefix = match direction {
        Direction::Out => PREFIX_PROPERTY_VALUES_OUT,
        Direction::In => PREFIX_PROPERTY_VALUES_IN,
    };
    let mut out = KeySet::with_capacity(dcids.len());
    for dcid in dcids {
        let key = format!("{prefix}{dcid}^{predicate}");
        out.push(key, Token::Place(dcid.clone()));
    }
    out
}

pub fn property_labels(dcids: &[Dcid]) -> KeySet {
    let mut out = KeySet::with_capacity(dcids.len());
    for dcid in dcids {
        let key = format!("{PREFIX_ARCS}{dcid}");
        out.push(key, Token::Place(dcid.clone()));
    }
    out
}

pub fn places_in(dcids: &[Dcid], place_type: &str) -> KeySet {
    let mut out = KeySet::with_capacity(dcids.len());
    for dcid in dcids {
        let key = format!("{PREFIX_PLACES_IN}{dcid}^{place_type}");
        out.push(key, Token::Place(dcid.clone()));
    }
    out
}

pub fn place_stat_vars(dcids: &[Dcid]) -> KeySet {
    let mut out = KeySet::with_capacity(dcids.len());
    for dcid in dcids {
        let key = format!("{PREFIX_PLACE_STAT_VARS}{dcid}");
        out.push(key, Token::Place(dcid.clone()));
    }
    out
}

/// `chartData(keys)` — the key argument is opaque to the builder; it is
/// typically a suffix already produced by `statsSeries`/`statCollection`
/// and re-wrapped behind `chart/`.
pub fn chart_data(keys: &[String]) -> KeySet {
    let mut out = KeySet::with_capacity(keys.len());
    for k in keys {
        let key = format!("{PREFIX_CHART}{k}");
        out.push(key, Token::Suffix(k.clone()));
    }
    out
}

pub fn stats_series(places: &[Dcid], stat_vars: &[(Dcid, StatVarDescriptor)]) -> KeySet {
    let mut out = KeySet::with_capacity(places.len() * stat_vars.len());
    for place in places {
        for (sv_dcid, sv) in stat_vars {
            let key = format!("{PREFIX_CHART}{place}^{}", sv.stat_sig_suffix());
            out.push(key, Token::PlaceStatVar(place.clone(), sv_dcid.clone()));
        }
    }
    out
}

pub fn stat_collection(
    parent: &Dcid,
    child_type: &str,
    date: &str,
    stat_vars: &[(Dcid, StatVarDescriptor)],
) -> KeySet {
    let mut out = KeySet::with_capacity(stat_vars.len());
    for (sv_dcid, sv) in stat_vars {
        let mut key = format!(
            "{PREFIX_CHART}{parent}^{child_type}^{}^{}^{}^{}^{}^{date}^{}",
            sv.measured_property,
            sv.measurement_method,
            sv.stat_type,
            sv.measurement_denominator,
            sv.measurement_qualifier,
            sv.population_type,
        );
        for (prop, value) in &sv.constraints {
            key.push('^');
            key.push_str(prop);
            key.push('^');
            key.push_str(value);
        }
        out.push(key, Token::Place(sv_dcid.clone()));
    }
    out
}

/// Flags controlling the `relatedEntities` prefix selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelatedEntitiesFlags {
    pub same_ancestor: bool,
    pub per_capita: bool,
}

pub fn related_entities(
    dcid: &Dcid,
    stat_var: &Dcid,
    ancestor: Option<&Dcid>,
    flags: RelatedEntitiesFlags,
) -> KeySet {
    let prefix = related_entities_prefix(flags.same_ancestor, flags.per_capita);
    let key = match ancestor {
        Some(a) => format!("{prefix}{dcid}^{a}^{stat_var}"),
        None => format!("{prefix}{dcid}^{stat_var}"),
    };
    let mut out = KeySet::with_capacity(1);
    out.push(key, Token::PlaceStatVar(dcid.clone(), stat_var.clone()));
    out
}

/// `locationRankings` key: `<prefix>*^<placeType>[^<ancestor>]^<statVar>`.
/// The literal `*` marks this as the aggregated-over-placeType slot rather
/// than a specific dcid.
pub fn location_rankings(
    place_type: &str,
    stat_var: &Dcid,
    ancestor: Option<&Dcid>,
    same_ancestor: bool,
    per_capita: bool,
) -> KeySet {
    let prefix = related_locations_prefix(same_ancestor, true, per_capita);
    let key = match ancestor {
        Some(a) => format!("{prefix}*^{place_type}^{a}^{stat_var}"),
        None => format!("{prefix}*^{place_type}^{stat_var}"),
    };
    let mut out = KeySet::with_capacity(1);
    out.push(key, Token::Suffix(stat_var.to_string()));
    out
}

pub fn observed_ancestor(obs_dcids: &[Dcid], kind: ObservedAncestorKind) -> KeySet {
    let mut out = KeySet::with_capacity(obs_dcids.len());
    for dcid in obs_dcids {
        let key = format!("{PREFIX_OBS_ANCESTOR}{dcid}^{}", kind.as_str());
        out.push(key, Token::Place(dcid.clone()));
    }
    out
}

pub fn pop_constraint(pop_dcids: &[Dcid]) -> KeySet {
    let mut out = KeySet::with_capacity(pop_dcids.len());
    for dcid in pop_dcids {
        let key = format!("{PREFIX_POP_PV}{dcid}");
        out.push(key, Token::Place(dcid.clone()));
    }
    out
}

pub fn landing_page(dcid: &Dcid) -> KeySet {
    let key = format!("{PREFIX_LANDING_PAGE}{dcid}");
    let mut out = KeySet::with_capacity(1);
    out.push(key, Token::Place(dcid.clone()));
    out
}
