//! The (import, measurement-method) -> priority-score ranking table
//! (§4.7, §9 "ranking table as configuration").
//!
//! This is data, not code paths: adding an entry must never change the
//! relative order of pairs that were already unknown — they all continue
//! to receive the shared `LOWEST` sentinel.

use std::collections::HashMap;

/// Sentinel score for any (import, measurement-method) pair absent from
/// the table. Deliberately coarse so additions to the table are additive.
pub const LOWEST: i32 = 100;

#[derive(Debug, Clone)]
pub struct RankingTable {
    scores: HashMap<(String, String), i32>,
}

impl RankingTable {
    pub fn new(entries: Vec<((&str, &str), i32)>) -> Self {
        let scores = entries
            .into_iter()
            .map(|((import, method), score)| ((import.to_string(), method.to_string()), score))
            .collect();
        Self { scores }
    }

    pub fn score(&self, import_name: &str, measurement_method: &str) -> i32 {
        self.scores
            .get(&(import_name.to_string(), measurement_method.to_string()))
            .copied()
            .unwrap_or(LOWEST)
    }

    /// Default table seeded with the pairs the design doc names explicitly
    /// (§4.7). Deployments override this via configuration; this is the
    /// fallback used when no override is supplied.
    pub fn default_table() -> Self {
        Self::new(vec![
            (("CensusPEP", "CensusPEPSurvey"), 0),
            (("CensusACS5YearSurvey", "CensusACS5yrSurvey"), 1),
            (("BLS_LAUS", "BLSSeasonallyUnadjusted"), 0),
            (("BLS_LAUS", "BLSSeasonallyAdjusted"), 1),
            (("EurostatData", "EurostatRegionalPopulationData"), 0),
        ])
    }
}

impl Default for RankingTable {
    fn default() -> Self {
        Self::default_table()
    }
}
