//! Request handlers (§4.8): the typed request/response surface over the
//! store facade. Every handler is stateless given a [`StoreFacade`]
//! reference — no handler holds state across calls.

pub mod landing;

use crate::codec::{
    ChartStore, Facet, ObsTimeSeries, PropertyLabels, PropertyValuesRecord, RelatedEntitiesRecord,
    SourceSeries, Triple, TriplesRecord, TypedNode,
};
use crate::dcid::Dcid;
use crate::error::{MixerError, MixerResult};
use crate::key::{self, Direction, RelatedEntitiesFlags, StatVarDescriptor, Token};
use crate::rank::{rank_and_select_series, RankFilter, SelectedObservation};
use crate::store::{RowSet, StoreFacade};
use std::collections::HashMap;

/// Parse the fixed + constraint predicates off a stat-var entity's own
/// `triples/` record into a [`StatVarDescriptor`]. Any predicate with a
/// literal `object_value` that isn't one of the six fixed fields is a
/// population constraint — the schema Data Commons statistical variables
/// use (age, gender, race, ... as direct properties on the node).
pub fn resolve_stat_var_descriptor(triples: &[Triple]) -> StatVarDescriptor {
    let mut descriptor = StatVarDescriptor::default();
    for t in triples {
        let Some(value) = &t.object_value else { continue };
        match t.predicate.as_str() {
            "populationType" => descriptor.population_type = value.clone(),
            "measuredProperty" => descriptor.measured_property = value.clone(),
            "statType" => descriptor.stat_type = value.clone(),
            "measurementMethod" => descriptor.measurement_method = value.clone(),
            "measurementQualifier" => descriptor.measurement_qualifier = value.clone(),
            "measurementDenominator" => descriptor.measurement_denominator = value.clone(),
            "scalingFactor" => descriptor.scaling_factor = value.clone(),
            "unit" => descriptor.unit = value.clone(),
            "typeOf" | "name" | "provenance" | "constraintProperties" => {}
            other => {
                descriptor.constraints.insert(other.to_string(), value.clone());
            }
        }
    }
    descriptor
}

async fn fetch_stat_var_descriptors(
    facade: &StoreFacade,
    stat_vars: &[Dcid],
) -> MixerResult<HashMap<Dcid, StatVarDescriptor>> {
    let keys = key::triples(stat_vars);
    let tokens = keys.tokens.clone();
    let result = facade
        .fan_out(
            RowSet::Keys(keys.keys.clone()),
            |_k, b| crate::codec::decode_triples(b).map(|r| r.triples),
            move |k| tokens.get(k).cloned().unwrap_or_else(|| key::dcid_heuristic_token(k)),
        )
        .await?;
    let merged = StoreFacade::merge_concat(&result);
    let mut out = HashMap::with_capacity(stat_vars.len());
    for sv in stat_vars {
        let triples = merged
            .get(&Token::Place(sv.clone()))
            .cloned()
            .unwrap_or_default();
        out.insert(sv.clone(), resolve_stat_var_descriptor(&triples));
    }
    Ok(out)
}

// --- propertyLabels ---------------------------------------------------

pub struct PropertyLabelsRequest {
    pub dcids: Vec<Dcid>,
}

pub struct PropertyLabelsResponse {
    pub labels: HashMap<Dcid, PropertyLabels>,
}

/// persistent only, merge = first non-empty (§4.8).
pub async fn property_labels(
    facade: &StoreFacade,
    req: PropertyLabelsRequest,
) -> MixerResult<PropertyLabelsResponse> {
    let keys = key::property_labels(&req.dcids);
    let tokens = keys.tokens.clone();
    let result = facade
        .fan_out(
            RowSet::Keys(keys.keys.clone()),
            |_k, b| crate::codec::decode_property_labels(b),
            move |k| tokens.get(k).cloned().unwrap_or_else(|| key::dcid_heuristic_token(k)),
        )
        .await?;
    let merged = StoreFacade::merge_pick_first_persistent(&result);
    let labels = req
        .dcids
        .into_iter()
        .map(|d| {
            let v = merged.get(&Token::Place(d.clone())).cloned().unwrap_or_default();
            (d, v)
        })
        .collect();
    Ok(PropertyLabelsResponse { labels })
}

// --- propertyValues -----------------------------------------------------

pub struct PropertyValuesRequest {
    pub dcids: Vec<Dcid>,
    pub predicate: String,
    pub direction: Direction,
    pub value_type: Option<String>,
    pub limit: Option<usize>,
}

pub struct PropertyValuesResponse {
    pub values: HashMap<Dcid, Vec<TypedNode>>,
}

/// overlay + persistent, merge = concat then dedupe/limit (§4.8).
pub async fn property_values(
    facade: &StoreFacade,
    req: PropertyValuesRequest,
) -> MixerResult<PropertyValuesResponse> {
    let keys = key::property_values(&req.dcids, &req.predicate, req.direction);
    let tokens = keys.tokens.clone();
    let result = facade
        .fan_out(
            RowSet::Keys(keys.keys.clone()),
            |_k, b| crate::codec::decode_property_values(b).map(|r| r.nodes),
            move |k| tokens.get(k).cloned().unwrap_or_else(|| key::dcid_heuristic_token(k)),
        )
        .await?;
    let merged = StoreFacade::merge_concat(&result);

    let mut values = HashMap::with_capacity(req.dcids.len());
    for d in &req.dcids {
        let mut nodes = merged.get(&Token::Place(d.clone())).cloned().unwrap_or_default();
        dedupe_by_dcid(&mut nodes);
        if let Some(vt) = &req.value_type {
            nodes.retain(|n| n.types.iter().any(|t| t == vt));
        }
        if let Some(limit) = req.limit {
            nodes.truncate(limit);
        }
        values.insert(d.clone(), nodes);
    }
    Ok(PropertyValuesResponse { values })
}

fn dedupe_by_dcid(nodes: &mut Vec<TypedNode>) {
    let mut seen = rustc_hash::FxHashSet::default();
    nodes.retain(|n| seen.insert(n.dcid.clone()));
}

// --- triples --------------------------------------------------------------

pub struct TriplesRequest {
    pub dcids: Vec<Dcid>,
    pub limit: Option<usize>,
}

pub struct TriplesResponse {
    pub triples: HashMap<Dcid, Vec<Triple>>,
}

/// persistent + overlay (the overlay carries population/observation node
/// triples; gating by node kind would need a type lookup this handler
/// doesn't otherwise need, so the overlay is consulted for every dcid —
/// documented simplification, see DESIGN.md), merge = concat then a
/// per-(direction, predicate, type) cap.
pub async fn triples(facade: &StoreFacade, req: TriplesRequest) -> MixerResult<TriplesResponse> {
    let keys = key::triples(&req.dcids);
    let tokens = keys.tokens.clone();
    let result = facade
        .fan_out(
            RowSet::Keys(keys.keys.clone()),
            |_k, b| crate::codec::decode_triples(b).map(|r| r.triples),
            move |k| tokens.get(k).cloned().unwrap_or_else(|| key::dcid_heuristic_token(k)),
        )
        .await?;
    let merged = StoreFacade::merge_concat(&result);

    let mut triples = HashMap::with_capacity(req.dcids.len());
    for d in &req.dcids {
        let mut list = merged.get(&Token::Place(d.clone())).cloned().unwrap_or_default();
        cap_per_predicate_and_type(&mut list, req.limit);
        triples.insert(d.clone(), list);
    }
    Ok(TriplesResponse { triples })
}

/// Cap the number of triples kept per (direction, predicate, object-type)
/// bucket, direction inferred from which side of the triple carries the
/// requested dcid's predicate (out = predicate on the subject, always true
/// here since `triples/<dcid>` only stores the subject's own arcs; in-arcs
/// are a separate prefix entirely, so every row here is "out").
fn cap_per_predicate_and_type(list: &mut Vec<Triple>, limit: Option<usize>) {
    let Some(limit) = limit else { return };
    let mut counts: HashMap<(String, String), usize> = HashMap::new();
    list.retain(|t| {
        let ty = t.object_types.first().cloned().unwrap_or_default();
        let key = (t.predicate.clone(), ty);
        let count = counts.entry(key).or_insert(0);
        *count += 1;
        *count <= limit
    });
}

// --- placesIn ---------------------------------------------------------

pub struct PlacesInRequest {
    pub dcids: Vec<Dcid>,
    pub place_type: String,
}

pub struct PlacesInResponse {
    pub places: Vec<(Dcid, String)>,
}

/// persistent only, merge = first non-empty (§4.8).
pub async fn places_in(facade: &StoreFacade, req: PlacesInRequest) -> MixerResult<PlacesInResponse> {
    let keys = key::places_in(&req.dcids, &req.place_type);
    let tokens = keys.tokens.clone();
    let result = facade
        .fan_out(
            RowSet::Keys(keys.keys.clone()),
            |_k, b| crate::codec::decode_property_values(b).map(|r| r.nodes),
            move |k| tokens.get(k).cloned().unwrap_or_else(|| key::dcid_heuristic_token(k)),
        )
        .await?;
    let merged = StoreFacade::merge_pick_first_persistent(&result);

    let mut places = Vec::new();
    for d in &req.dcids {
        if let Some(nodes) = merged.get(&Token::Place(d.clone())) {
            for n in nodes {
                places.push((d.clone(), n.dcid.clone()));
            }
        }
    }
    Ok(PlacesInResponse { places })
}

// --- relatedEntities ----------------------------------------------------

pub struct RelatedEntitiesRequest {
    pub dcid: Dcid,
    pub stat_vars: Vec<Dcid>,
    pub ancestor: Option<Dcid>,
    pub flags: RelatedEntitiesFlags,
}

pub struct RelatedEntitiesResponse {
    pub related: HashMap<Dcid, RelatedEntitiesRecord>,
}

/// persistent only, merge = first non-empty (§4.8).
pub async fn related_entities(
    facade: &StoreFacade,
    req: RelatedEntitiesRequest,
) -> MixerResult<RelatedEntitiesResponse> {
    let mut related = HashMap::with_capacity(req.stat_vars.len());
    for sv in &req.stat_vars {
        let keys = key::related_entities(&req.dcid, sv, req.ancestor.as_ref(), req.flags);
        let tokens = keys.tokens.clone();
        let result = facade
            .fan_out(
                RowSet::Keys(keys.keys.clone()),
                |_k, b| crate::codec::decode_related_entities(b),
                move |k| tokens.get(k).cloned().unwrap_or_else(|| key::dcid_heuristic_token(k)),
            )
            .await?;
        let merged = StoreFacade::merge_pick_first_persistent(&result);
        let record = merged
            .get(&Token::PlaceStatVar(req.dcid.clone(), sv.clone()))
            .cloned()
            .unwrap_or_default();
        related.insert(sv.clone(), record);
    }
    Ok(RelatedEntitiesResponse { related })
}

// --- locationRankings ---------------------------------------------------

pub struct LocationRankingsRequest {
    pub place_type: String,
    pub stat_vars: Vec<Dcid>,
    pub ancestor: Option<Dcid>,
    pub same_ancestor: bool,
    pub per_capita: bool,
}

pub struct LocationRankingsResponse {
    pub rankings: HashMap<Dcid, RelatedEntitiesRecord>,
}

/// persistent only, merge = first non-empty (§4.8).
pub async fn location_rankings(
    facade: &StoreFacade,
    req: LocationRankingsRequest,
) -> MixerResult<LocationRankingsResponse> {
    let mut rankings = HashMap::with_capacity(req.stat_vars.len());
    for sv in &req.stat_vars {
        let keys = key::location_rankings(
            &req.place_type,
            sv,
            req.ancestor.as_ref(),
            req.same_ancestor,
            req.per_capita,
        );
        let tokens = keys.tokens.clone();
        let result = facade
            .fan_out(
                RowSet::Keys(keys.keys.clone()),
                |_k, b| crate::codec::decode_related_entities(b),
                move |k| tokens.get(k).cloned().unwrap_or_else(|| key::dcid_heuristic_token(k)),
            )
            .await?;
        let merged = StoreFacade::merge_pick_first_persistent(&result);
        let record = merged
            .get(&Token::Suffix(sv.to_string()))
            .cloned()
            .unwrap_or_default();
        rankings.insert(sv.clone(), record);
    }
    Ok(LocationRankingsResponse { rankings })
}

// --- placeStatVars ------------------------------------------------------

pub struct PlaceStatVarsRequest {
    pub dcids: Vec<Dcid>,
}

pub struct PlaceStatVarsResponse {
    pub stat_vars: HashMap<Dcid, Vec<Dcid>>,
}

/// persistent only, merge = first non-empty (§4.8).
pub async fn place_stat_vars(
    facade: &StoreFacade,
    req: PlaceStatVarsRequest,
) -> MixerResult<PlaceStatVarsResponse> {
    let keys = key::place_stat_vars(&req.dcids);
    let tokens = keys.tokens.clone();
    let result = facade
        .fan_out(
            RowSet::Keys(keys.keys.clone()),
            |_k, b| crate::codec::decode_property_values(b).map(|r| r.nodes),
            move |k| tokens.get(k).cloned().unwrap_or_else(|| key::dcid_heuristic_token(k)),
        )
        .await?;
    let merged = StoreFacade::merge_pick_first_persistent(&result);

    let mut stat_vars = HashMap::with_capacity(req.dcids.len());
    for d in &req.dcids {
        let nodes = merged.get(&Token::Place(d.clone())).cloned().unwrap_or_default();
        let svs = nodes
            .into_iter()
            .filter_map(|n| Dcid::parse(&n.dcid).ok())
            .collect();
        stat_vars.insert(d.clone(), svs);
    }
    Ok(PlaceStatVarsResponse { stat_vars })
}

// --- statSeries / statValue / statAll -----------------------------------

async fn fetch_obs_time_series(
    facade: &StoreFacade,
    places: &[Dcid],
    stat_vars: &[Dcid],
) -> MixerResult<(HashMap<Token, ObsTimeSeries>, HashMap<Dcid, StatVarDescriptor>)> {
    let descriptors = fetch_stat_var_descriptors(facade, stat_vars).await?;
    let sv_pairs: Vec<(Dcid, StatVarDescriptor)> = stat_vars
        .iter()
        .map(|sv| (sv.clone(), descriptors.get(sv).cloned().unwrap_or_default()))
        .collect();
    let keys = key::stats_series(places, &sv_pairs);
    let tokens = keys.tokens.clone();
    // Overlay-first with per-slot backfill (§4.4, §8 property 4): a slot
    // the overlay resolves wins outright; persistent is only fetched for
    // the slots the overlay left unresolved, never unioned against them.
    let merged = facade
        .fan_out_backfill(
            RowSet::Keys(keys.keys.clone()),
            |_k, b| crate::codec::decode_chart(b).map(as_obs_time_series_owned),
            move |k| tokens.get(k).cloned().unwrap_or_else(|| key::dcid_heuristic_token(k)),
        )
        .await?;
    let flattened = merged
        .into_iter()
        .map(|(token, series_lists)| {
            let mut ts = ObsTimeSeries::default();
            for s in series_lists {
                ts.series_by_facet.extend(s.series_by_facet);
            }
            (token, ts)
        })
        .collect();
    Ok((flattened, descriptors))
}

fn as_obs_time_series_owned(store: ChartStore) -> ObsTimeSeries {
    store.as_obs_time_series().cloned().unwrap_or_default()
}

pub struct StatSeriesRequest {
    pub place: Dcid,
    pub stat_var: Dcid,
    pub filter: RankFilter,
}

pub struct StatSeriesResponse {
    pub series: Option<std::collections::BTreeMap<String, f64>>,
    pub facet: Option<Facet>,
}

/// overlay then persistent, merge = ranker (§4.7, §4.8).
pub async fn stat_series(facade: &StoreFacade, req: StatSeriesRequest) -> MixerResult<StatSeriesResponse> {
    let (merged, _) = fetch_obs_time_series(facade, &[req.place.clone()], &[req.stat_var.clone()]).await?;
    let token = Token::PlaceStatVar(req.place.clone(), req.stat_var.clone());
    let Some(ts) = merged.get(&token) else {
        return Ok(StatSeriesResponse {
            series: None,
            facet: None,
        });
    };
    match rank_and_select_series(ts, &req.filter, None) {
        Some(SelectedObservation::Series { facet, values }) => Ok(StatSeriesResponse {
            series: Some(values),
            facet: Some(facet),
        }),
        _ => Ok(StatSeriesResponse {
            series: None,
            facet: None,
        }),
    }
}

pub struct StatValueRequest {
    pub place: Dcid,
    pub stat_var: Dcid,
    pub date: Option<String>,
    pub filter: RankFilter,
}

pub struct StatValueResponse {
    pub date: String,
    pub value: f64,
    pub facet: Facet,
}

/// overlay then persistent, merge = ranker (§4.7, §4.8). A `date` not
/// present in any ranked series is `NOT_FOUND`, distinct from an empty
/// filter result which the ranker already represents as `None` before this
/// handler maps it.
pub async fn stat_value(facade: &StoreFacade, req: StatValueRequest) -> MixerResult<StatValueResponse> {
    let (merged, _) = fetch_obs_time_series(facade, &[req.place.clone()], &[req.stat_var.clone()]).await?;
    let token = Token::PlaceStatVar(req.place.clone(), req.stat_var.clone());
    let ts = merged.get(&token).ok_or_else(|| {
        MixerError::NotFound(format!("no observations for {}^{}", req.place, req.stat_var))
    })?;

    match rank_and_select_series(ts, &req.filter, req.date.as_deref()) {
        Some(SelectedObservation::Point { date, value, facet }) => Ok(StatValueResponse { date, value, facet }),
        Some(SelectedObservation::Series { facet, values }) => {
            let series = SourceSeries {
                facet: facet.clone(),
                values,
                earliest_date: None,
                latest_date: None,
            };
            let latest = series.latest().ok_or_else(|| {
                MixerError::NotFound(format!("empty series for {}^{}", req.place, req.stat_var))
            })?;
            Ok(StatValueResponse {
                date: latest.date,
                value: latest.value,
                facet,
            })
        }
        None => Err(MixerError::NotFound(format!(
            "no matching observation for {}^{}",
            req.place, req.stat_var
        ))),
    }
}

pub struct StatAllRequest {
    pub places: Vec<Dcid>,
    pub stat_vars: Vec<Dcid>,
    pub filter: RankFilter,
}

pub struct StatAllResponse {
    pub selected: HashMap<(Dcid, Dcid), SelectedObservation>,
}

/// overlay then persistent, merge = ranker (§4.7, §4.8).
pub async fn stat_all(facade: &StoreFacade, req: StatAllRequest) -> MixerResult<StatAllResponse> {
    let (merged, _) = fetch_obs_time_series(facade, &req.places, &req.stat_vars).await?;
    let mut selected = HashMap::new();
    for place in &req.places {
        for sv in &req.stat_vars {
            let token = Token::PlaceStatVar(place.clone(), sv.clone());
            if let Some(ts) = merged.get(&token) {
                if let Some(sel) = rank_and_select_series(ts, &req.filter, None) {
                    selected.insert((place.clone(), sv.clone()), sel);
                }
            }
        }
    }
    Ok(StatAllResponse { selected })
}

// --- statCollection -------------------------------------------------------

pub struct StatCollectionRequest {
    pub parent: Dcid,
    pub child_type: String,
    pub date: String,
    pub stat_vars: Vec<Dcid>,
}

pub struct StatCollectionResponse {
    /// Best cohort per stat-var, ranked by (import, method) via the shared
    /// ranking table (§4.8 "rank cohorts by (import, method)").
    pub cohorts: HashMap<Dcid, SourceSeries>,
}

pub async fn stat_collection(
    facade: &StoreFacade,
    req: StatCollectionRequest,
) -> MixerResult<StatCollectionResponse> {
    let descriptors = fetch_stat_var_descriptors(facade, &req.stat_vars).await?;
    let sv_pairs: Vec<(Dcid, StatVarDescriptor)> = req
        .stat_vars
        .iter()
        .map(|sv| (sv.clone(), descriptors.get(sv).cloned().unwrap_or_default()))
        .collect();
    let keys = key::stat_collection(&req.parent, &req.child_type, &req.date, &sv_pairs);
    let tokens = keys.tokens.clone();
    // Same overlay-first backfill policy as `fetch_obs_time_series` (§4.4,
    // §8 property 4): an overlay-resolved cohort slot wins outright.
    let merged = facade
        .fan_out_backfill(
            RowSet::Keys(keys.keys.clone()),
            |_k, b| crate::codec::decode_chart(b).map(as_obs_time_series_owned),
            move |k| tokens.get(k).cloned().unwrap_or_else(|| key::dcid_heuristic_token(k)),
        )
        .await?;

    let table = crate::rank::RankingTable::default_table();
    let mut cohorts = HashMap::with_capacity(req.stat_vars.len());
    for sv in &req.stat_vars {
        let series_lists = merged.get(&Token::Place(sv.clone())).cloned().unwrap_or_default();
        let all_series: Vec<&SourceSeries> = series_lists.iter().flat_map(|ts| ts.series_by_facet.iter()).collect();
        let ranked = crate::rank::rank_series(all_series, &table, &crate::rank::DEFAULT_TIEBREAK_ORDER);
        if let Some(best) = ranked.into_iter().next() {
            cohorts.insert(sv.clone(), best.clone());
        }
    }
    Ok(StatCollectionResponse { cohorts })
}

// --- sparqlQuery ----------------------------------------------------------

pub struct SparqlQueryRequest {
    pub sparql: String,
}

/// relational adapter (§4.9). Translator errors are `INVALID_ARGUMENT`,
/// engine errors `INTERNAL`, via `From<RelationalError> for MixerError`.
pub async fn sparql_query(
    adapter: &crate::relational::RelationalQueryAdapter,
    schema: &crate::relational::SchemaMapping,
    req: SparqlQueryRequest,
) -> MixerResult<crate::relational::SparqlQueryResult> {
    let ast = crate::relational::parse_sparql(&req.sparql)?;
    Ok(adapter.execute(&ast, schema).await?)
}
