//! Observation ranking & filter engine (§4.7).
//!
//! Given a facet-tagged collection of time-series variants plus filter
//! options, produce either the winning series (no date requested) or the
//! single best `(date, value, facet)` point (date requested). Ranking is a
//! stable sort by `(import, measurement-method)` score, then a
//! parameterized tiebreak chain — parameterized because the design doc
//! leaves "does provenance-url participate in tiebreak 4" unresolved
//! across deployments (§9 Open Questions; resolved here as a configurable
//! final tiebreak, default "yes", see DESIGN.md).

mod table;

pub use table::{RankingTable, LOWEST};

use crate::codec::{Facet, ObsTimeSeries, SourceSeries};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Filter options applied before ranking (§4.7 step 1). Any field left
/// empty is not applied; a series is dropped only if the field is
/// non-empty *and* disagrees with the facet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankFilter {
    pub measurement_method: Option<String>,
    pub observation_period: Option<String>,
    pub unit: Option<String>,
    pub scaling_factor: Option<String>,
}

/// Which tiebreak fields participate, and in what order, after the
/// primary (import, method) score. The design doc's default order is
/// period, scaling factor, unit, then provenance-domain; deployments that
/// don't want provenance-url in the comparison can drop the last entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiebreakField {
    ObservationPeriod,
    ScalingFactor,
    Unit,
    ProvenanceDomain,
}

pub const DEFAULT_TIEBREAK_ORDER: [TiebreakField; 4] = [
    TiebreakField::ObservationPeriod,
    TiebreakField::ScalingFactor,
    TiebreakField::Unit,
    TiebreakField::ProvenanceDomain,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SelectedObservation {
    Series {
        facet: Facet,
        values: std::collections::BTreeMap<String, f64>,
    },
    Point {
        date: String,
        value: f64,
        facet: Facet,
    },
}

fn provenance_domain(url: &str) -> &str {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    without_scheme.split('/').next().unwrap_or(without_scheme)
}

fn facet_matches(facet: &Facet, filter: &RankFilter) -> bool {
    if let Some(m) = &filter.measurement_method {
        if !m.is_empty() && &facet.measurement_method != m {
            return false;
        }
    }
    if let Some(p) = &filter.observation_period {
        if !p.is_empty() && &facet.observation_period != p {
            return false;
        }
    }
    if let Some(u) = &filter.unit {
        if !u.is_empty() && &facet.unit != u {
            return false;
        }
    }
    if let Some(s) = &filter.scaling_factor {
        if !s.is_empty() && &facet.scaling_factor != s {
            return false;
        }
    }
    true
}

/// Filter survivors from the full facet-series set (§4.7 step 1).
pub fn filter_series<'a>(ts: &'a ObsTimeSeries, filter: &RankFilter) -> Vec<&'a SourceSeries> {
    ts.series_by_facet
        .iter()
        .filter(|s| facet_matches(&s.facet, filter))
        .collect()
}

fn compare(a: &SourceSeries, b: &SourceSeries, table: &RankingTable, tiebreak: &[TiebreakField]) -> Ordering {
    let score_a = table.score(&a.facet.import_name, &a.facet.measurement_method);
    let score_b = table.score(&b.facet.import_name, &b.facet.measurement_method);
    let mut ord = score_a.cmp(&score_b);
    if ord != Ordering::Equal {
        return ord;
    }
    for field in tiebreak {
        ord = match field {
            TiebreakField::ObservationPeriod => {
                a.facet.observation_period.cmp(&b.facet.observation_period)
            }
            TiebreakField::ScalingFactor => a.facet.scaling_factor.cmp(&b.facet.scaling_factor),
            TiebreakField::Unit => a.facet.unit.cmp(&b.facet.unit),
            TiebreakField::ProvenanceDomain => {
                provenance_domain(&a.facet.provenance_url).cmp(provenance_domain(&b.facet.provenance_url))
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Rank survivors with the comparator above. The sort is stable (§4.7 step
/// 2 "final: stable"), so equal-score rows retain their original relative
/// order — `sort_by` on a `Vec` is a stable sort in Rust's standard
/// library.
pub fn rank_series<'a>(
    mut survivors: Vec<&'a SourceSeries>,
    table: &RankingTable,
    tiebreak: &[TiebreakField],
) -> Vec<&'a SourceSeries> {
    survivors.sort_by(|a, b| compare(a, b, table, tiebreak));
    survivors
}

/// Full filter -> rank -> select pipeline (§4.7).
///
/// Returns `None` in two distinguishable-by-caller cases: filtering left
/// no survivors (empty result, not an error), or a `date` was requested
/// and no ranked series contains it (the handler maps this to
/// `NOT_FOUND`).
pub fn rank_and_select_series(
    ts: &ObsTimeSeries,
    filter: &RankFilter,
    date: Option<&str>,
) -> Option<SelectedObservation> {
    rank_and_select_series_with(ts, filter, date, &RankingTable::default_table(), &DEFAULT_TIEBREAK_ORDER)
}

pub fn rank_and_select_series_with(
    ts: &ObsTimeSeries,
    filter: &RankFilter,
    date: Option<&str>,
    table: &RankingTable,
    tiebreak: &[TiebreakField],
) -> Option<SelectedObservation> {
    let survivors = filter_series(ts, filter);
    if survivors.is_empty() {
        return None;
    }
    let ranked = rank_series(survivors, table, tiebreak);

    match date {
        None => {
            let winner = ranked[0];
            Some(SelectedObservation::Series {
                facet: winner.facet.clone(),
                values: winner.values.clone(),
            })
        }
        Some(d) => ranked.into_iter().find_map(|series| {
            series.values.get(d).map(|v| SelectedObservation::Point {
                date: d.to_string(),
                value: *v,
                facet: series.facet.clone(),
            })
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(import: &str, method: &str, dates: &[(&str, f64)]) -> SourceSeries {
        SourceSeries {
            facet: Facet {
                import_name: import.to_string(),
                measurement_method: method.to_string(),
                ..Default::default()
            },
            values: dates.iter().map(|(d, v)| (d.to_string(), *v)).collect(),
            earliest_date: None,
            latest_date: None,
        }
    }

    #[test]
    fn scenario_s1_population_lookup_prefers_census_pep() {
        let ts = ObsTimeSeries {
            series_by_facet: vec![
                series("CensusACS5YearSurvey", "CensusACS5yrSurvey", &[("2014", 100.0)]),
                series("CensusPEP", "CensusPEPSurvey", &[("2014", 200.0)]),
            ],
        };
        let selected = rank_and_select_series(&ts, &RankFilter::default(), None).unwrap();
        match selected {
            SelectedObservation::Series { facet, .. } => assert_eq!(facet.import_name, "CensusPEP"),
            _ => panic!("expected series"),
        }
    }

    #[test]
    fn scenario_s2_date_query_falls_back_to_rank_2() {
        let ts = ObsTimeSeries {
            series_by_facet: vec![
                series("CensusPEP", "CensusPEPSurvey", &[("2015", 1.0)]),
                series("CensusACS5YearSurvey", "CensusACS5yrSurvey", &[("2014", 2.0)]),
            ],
        };
        let selected = rank_and_select_series(&ts, &RankFilter::default(), Some("2014")).unwrap();
        match selected {
            SelectedObservation::Point { value, facet, .. } => {
                assert_eq!(value, 2.0);
                assert_eq!(facet.import_name, "CensusACS5YearSurvey");
            }
            _ => panic!("expected point"),
        }
    }

    #[test]
    fn date_not_found_returns_none() {
        let ts = ObsTimeSeries {
            series_by_facet: vec![series("CensusPEP", "CensusPEPSurvey", &[("2015", 1.0)])],
        };
        assert!(rank_and_select_series(&ts, &RankFilter::default(), Some("1999")).is_none());
    }

    #[test]
    fn empty_survivors_returns_none_not_error() {
        let ts = ObsTimeSeries {
            series_by_facet: vec![series("CensusPEP", "CensusPEPSurvey", &[("2015", 1.0)])],
        };
        let filter = RankFilter {
            unit: Some("SomeOtherUnit".to_string()),
            ..Default::default()
        };
        assert!(rank_and_select_series(&ts, &filter, None).is_none());
    }

    #[test]
    fn ranking_is_stable_and_deterministic_across_repeats() {
        let ts = ObsTimeSeries {
            series_by_facet: vec![
                series("Unknown1", "Unknown1Method", &[("2015", 1.0)]),
                series("Unknown2", "Unknown2Method", &[("2015", 2.0)]),
            ],
        };
        let first = rank_and_select_series(&ts, &RankFilter::default(), None).unwrap();
        let second = rank_and_select_series(&ts, &RankFilter::default(), None).unwrap();
        assert_eq!(first, second);
        match first {
            SelectedObservation::Series { facet, .. } => assert_eq!(facet.import_name, "Unknown1"),
            _ => panic!("expected series"),
        }
    }
}
