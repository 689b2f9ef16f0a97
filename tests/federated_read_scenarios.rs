//! End-to-end scenarios (§8) driven through the public handler surface
//! against a real local row-store plus overlay, rather than the unit
//! tests colocated with each module which exercise pure logic in
//! isolation.

use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use mixer::dcid::Dcid;
use mixer::handlers::{self, RelatedEntitiesRequest, StatSeriesRequest, StatValueRequest};
use mixer::key::RelatedEntitiesFlags;
use mixer::rank::RankFilter;
use mixer::store::{
    InstanceKind, OverlayCache, OverlaySnapshot, RocksDbRowStore, RowStoreInstance, StoreFacade,
};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;

fn encode_cell(json: &str) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(json.as_bytes()).unwrap();
    let compressed = enc.finish().unwrap();
    base64::engine::general_purpose::STANDARD
        .encode(compressed)
        .into_bytes()
}

fn open_store() -> (TempDir, RocksDbRowStore) {
    let dir = TempDir::new().unwrap();
    let store = RocksDbRowStore::open(dir.path()).unwrap();
    (dir, store)
}

fn facade_with(store: RocksDbRowStore, overlay: OverlayCache) -> StoreFacade {
    let instance = RowStoreInstance {
        name: "persistent".to_string(),
        kind: InstanceKind::Base,
        client: Arc::new(store),
    };
    StoreFacade::new(Arc::new(overlay), vec![instance])
}

/// S1 — population lookup: the ranking table prefers CensusPEP over
/// CensusACS5YearSurvey, so a statSeries for a place with both facets
/// returns the CensusPEP series, exercised end to end through the real
/// row-store reader and token-keyed merge rather than the ranker alone.
#[tokio::test]
async fn s1_population_lookup_prefers_census_pep_end_to_end() {
    let (_dir, store) = open_store();
    let place = Dcid::parse("geoId/06").unwrap();
    let stat_var = Dcid::parse("Count_Person").unwrap();

    store
        .put(
            &format!("triples/{stat_var}"),
            &encode_cell(r#"{"triples":[{"subject_id":"Count_Person","predicate":"populationType","object_value":"Person"},{"subject_id":"Count_Person","predicate":"measuredProperty","object_value":"count"},{"subject_id":"Count_Person","predicate":"statType","object_value":"measuredValue"}]}"#),
        )
        .unwrap();

    let chart_key = format!("chart/{place}^count^measuredValue^^^Person");
    store
        .put(
            &chart_key,
            &encode_cell(
                r#"{"kind":"obsTimeSeries","series_by_facet":[
                    {"facet":{"import_name":"CensusACS5YearSurvey","measurement_method":"CensusACS5yrSurvey","observation_period":"","scaling_factor":"","unit":"","provenance_url":""},"values":{"2014":100.0}},
                    {"facet":{"import_name":"CensusPEP","measurement_method":"CensusPEPSurvey","observation_period":"","scaling_factor":"","unit":"","provenance_url":""},"values":{"2014":200.0}}
                ]}"#,
            ),
        )
        .unwrap();

    let facade = facade_with(store, OverlayCache::new());
    let resp = handlers::stat_series(
        &facade,
        StatSeriesRequest {
            place,
            stat_var,
            filter: RankFilter::default(),
        },
    )
    .await
    .unwrap();

    let facet = resp.facet.expect("expected a winning facet");
    assert_eq!(facet.import_name, "CensusPEP");
    assert_eq!(resp.series.unwrap().get("2014"), Some(&200.0));
}

/// S2 — date query with fallback: the rank-1 series lacks the requested
/// date, so statValue falls through to the rank-2 series that has it.
#[tokio::test]
async fn s2_date_query_falls_back_to_rank_2_end_to_end() {
    let (_dir, store) = open_store();
    let place = Dcid::parse("country/USA").unwrap();
    let stat_var = Dcid::parse("Count_Person").unwrap();

    store
        .put(
            &format!("triples/{stat_var}"),
            &encode_cell(r#"{"triples":[{"subject_id":"Count_Person","predicate":"populationType","object_value":"Person"},{"subject_id":"Count_Person","predicate":"measuredProperty","object_value":"count"},{"subject_id":"Count_Person","predicate":"statType","object_value":"measuredValue"}]}"#),
        )
        .unwrap();

    let chart_key = format!("chart/{place}^count^measuredValue^^^Person");
    store
        .put(
            &chart_key,
            &encode_cell(
                r#"{"kind":"obsTimeSeries","series_by_facet":[
                    {"facet":{"import_name":"CensusPEP","measurement_method":"CensusPEPSurvey","observation_period":"","scaling_factor":"","unit":"","provenance_url":""},"values":{"2015":1.0}},
                    {"facet":{"import_name":"CensusACS5YearSurvey","measurement_method":"CensusACS5yrSurvey","observation_period":"","scaling_factor":"","unit":"","provenance_url":""},"values":{"2014":2.0}}
                ]}"#,
            ),
        )
        .unwrap();

    let facade = facade_with(store, OverlayCache::new());
    let resp = handlers::stat_value(
        &facade,
        StatValueRequest {
            place,
            stat_var,
            date: Some("2014".to_string()),
            filter: RankFilter::default(),
        },
    )
    .await
    .unwrap();

    assert_eq!(resp.value, 2.0);
    assert_eq!(resp.facet.import_name, "CensusACS5YearSurvey");
}

/// S3 — overlay override: place A's series is present only in the
/// overlay, place B's only in the persistent store. statSeries must
/// return A from the overlay and B from the persistent fallback.
#[tokio::test]
async fn s3_overlay_overrides_persistent_per_place() {
    let (_dir, store) = open_store();
    let place_a = Dcid::parse("geoId/06").unwrap();
    let place_b = Dcid::parse("geoId/17").unwrap();
    let stat_var = Dcid::parse("Count_Person").unwrap();

    let triples_payload = r#"{"triples":[{"subject_id":"Count_Person","predicate":"populationType","object_value":"Person"},{"subject_id":"Count_Person","predicate":"measuredProperty","object_value":"count"},{"subject_id":"Count_Person","predicate":"statType","object_value":"measuredValue"}]}"#;
    store
        .put(&format!("triples/{stat_var}"), &encode_cell(triples_payload))
        .unwrap();

    let chart_key_b = format!("chart/{place_b}^count^measuredValue^^^Person");
    store
        .put(
            &chart_key_b,
            &encode_cell(
                r#"{"kind":"obsTimeSeries","series_by_facet":[
                    {"facet":{"import_name":"CensusPEP","measurement_method":"CensusPEPSurvey","observation_period":"","scaling_factor":"","unit":"","provenance_url":""},"values":{"2020":5.0}}
                ]}"#,
            ),
        )
        .unwrap();

    let overlay = OverlayCache::new();
    let chart_key_a = format!("chart/{place_a}^count^measuredValue^^^Person");
    let mut overlay_data = HashMap::new();
    overlay_data.insert(
        format!("triples/{stat_var}"),
        encode_cell(triples_payload),
    );
    overlay_data.insert(
        chart_key_a.clone(),
        encode_cell(
            r#"{"kind":"obsTimeSeries","series_by_facet":[
                {"facet":{"import_name":"CensusPEP","measurement_method":"CensusPEPSurvey","observation_period":"","scaling_factor":"","unit":"","provenance_url":""},"values":{"2020":9.0}}
            ]}"#,
        ),
    );
    overlay.update(OverlaySnapshot::new(1, overlay_data));

    let facade = facade_with(store, overlay);

    let resp_a = handlers::stat_series(
        &facade,
        StatSeriesRequest {
            place: place_a,
            stat_var: stat_var.clone(),
            filter: RankFilter::default(),
        },
    )
    .await
    .unwrap();
    assert_eq!(resp_a.series.unwrap().get("2020"), Some(&9.0));

    let resp_b = handlers::stat_series(
        &facade,
        StatSeriesRequest {
            place: place_b,
            stat_var,
            filter: RankFilter::default(),
        },
    )
    .await
    .unwrap();
    assert_eq!(resp_b.series.unwrap().get("2020"), Some(&5.0));
}

/// S3 (slot-level) — an overlay facet for a slot must win outright over a
/// higher-ranked persistent facet for that *same* slot, not get unioned
/// with it and re-ranked. The overlay holds only a low-ranked
/// `UnknownImport` facet for this place/stat-var; persistent independently
/// holds a `CensusPEP` facet for the identical slot that would outrank it
/// if the two were merged before ranking. The overlay facet must still be
/// the one returned, and persistent must not even be consulted for this
/// slot.
#[tokio::test]
async fn s3_overlay_facet_wins_outright_over_higher_ranked_persistent_same_slot() {
    let (_dir, store) = open_store();
    let place = Dcid::parse("geoId/08").unwrap();
    let stat_var = Dcid::parse("Count_Person").unwrap();

    let triples_payload = r#"{"triples":[{"subject_id":"Count_Person","predicate":"populationType","object_value":"Person"},{"subject_id":"Count_Person","predicate":"measuredProperty","object_value":"count"},{"subject_id":"Count_Person","predicate":"statType","object_value":"measuredValue"}]}"#;
    store
        .put(&format!("triples/{stat_var}"), &encode_cell(triples_payload))
        .unwrap();

    let chart_key = format!("chart/{place}^count^measuredValue^^^Person");
    // Persistent holds the higher-ranked CensusPEP facet for this exact slot.
    store
        .put(
            &chart_key,
            &encode_cell(
                r#"{"kind":"obsTimeSeries","series_by_facet":[
                    {"facet":{"import_name":"CensusPEP","measurement_method":"CensusPEPSurvey","observation_period":"","scaling_factor":"","unit":"","provenance_url":""},"values":{"2020":500.0}}
                ]}"#,
            ),
        )
        .unwrap();

    let overlay = OverlayCache::new();
    let mut overlay_data = HashMap::new();
    overlay_data.insert(format!("triples/{stat_var}"), encode_cell(triples_payload));
    // Overlay holds only a low-ranked, unknown-import facet for the same slot.
    overlay_data.insert(
        chart_key.clone(),
        encode_cell(
            r#"{"kind":"obsTimeSeries","series_by_facet":[
                {"facet":{"import_name":"SomeUnrankedImport","measurement_method":"Unknown","observation_period":"","scaling_factor":"","unit":"","provenance_url":""},"values":{"2020":1.0}}
            ]}"#,
        ),
    );
    overlay.update(OverlaySnapshot::new(1, overlay_data));

    let facade = facade_with(store, overlay);

    let resp = handlers::stat_series(
        &facade,
        StatSeriesRequest {
            place,
            stat_var,
            filter: RankFilter::default(),
        },
    )
    .await
    .unwrap();

    // If persistent's CensusPEP facet had been unioned in before ranking it
    // would win (it outranks the overlay's unknown-import facet); the
    // per-slot backfill contract means persistent is never consulted here.
    let facet = resp.facet.expect("expected a winning facet");
    assert_eq!(facet.import_name, "SomeUnrankedImport");
    assert_eq!(resp.series.unwrap().get("2020"), Some(&1.0));
}

/// S5 — relatedEntities selection: a request with `same_ancestor = true`
/// and `per_capita = false` must read from the
/// `relatedLocationsSameTypeAndAncestor` prefix and bucket the result
/// under the (dcid, stat-var) token, regardless of the fact that the
/// dcid itself contains a `/`.
#[tokio::test]
async fn s5_related_entities_uses_same_type_and_ancestor_prefix() {
    let (_dir, store) = open_store();
    let dcid = Dcid::parse("geoId/06085").unwrap();
    let ancestor = Dcid::parse("country/USA").unwrap();
    let stat_var = Dcid::parse("Count_Person").unwrap();

    let key = format!("relatedLocationsSameTypeAndAncestor/{dcid}^{ancestor}^{stat_var}");
    store
        .put(
            &key,
            &encode_cell(r#"{"dcids":["geoId/06001","geoId/06075"],"rank_from_top":1}"#),
        )
        .unwrap();

    let facade = facade_with(store, OverlayCache::new());
    let resp = handlers::related_entities(
        &facade,
        RelatedEntitiesRequest {
            dcid,
            stat_vars: vec![stat_var.clone()],
            ancestor: Some(ancestor),
            flags: RelatedEntitiesFlags {
                same_ancestor: true,
                per_capita: false,
            },
        },
    )
    .await
    .unwrap();

    let record = resp.related.get(&stat_var).expect("expected a related-entities record");
    assert_eq!(record.dcids, vec!["geoId/06001".to_string(), "geoId/06075".to_string()]);
    assert_eq!(record.rank_from_top, Some(1));
}

/// A place dcid containing a `/` must still resolve correctly after the
/// fan-out merge — the builder's own key -> token map is used, not a
/// heuristic re-derivation from the row key's trailing segment.
#[tokio::test]
async fn place_dcid_with_slash_resolves_through_property_labels() {
    let (_dir, store) = open_store();
    let dcid = Dcid::parse("geoId/06085").unwrap();
    store
        .put(
            &format!("arcs/{dcid}"),
            &encode_cell(r#"{"in_labels":["containedInPlace"],"out_labels":["name"]}"#),
        )
        .unwrap();

    let facade = facade_with(store, OverlayCache::new());
    let resp = handlers::property_labels(
        &facade,
        handlers::PropertyLabelsRequest {
            dcids: vec![dcid.clone()],
        },
    )
    .await
    .unwrap();

    let labels = resp.labels.get(&dcid).expect("expected labels for the requested dcid");
    assert_eq!(labels.in_labels, vec!["containedInPlace".to_string()]);
    assert_eq!(labels.out_labels, vec!["name".to_string()]);
}
