//! Analysis over the staged datasets
//!
//! Reads the population JSON and the main series file back out of the
//! object store and produces the summary report.

pub mod population;
pub mod series;

use serde::Serialize;

use crate::config::{DEFAULT_LISTING_PATH, POPULATION_PREFIX};
use crate::error::{MirrorError, Result};
use crate::ingest::population_key;
use crate::storage::ObjectStore;

pub use population::{parse_population, population_stats, PopulationRecord, PopulationStats};
pub use series::{
    best_year_per_series, join_with_population, parse_series, BestYear, JoinedRow, SeriesRow,
};

/// What the report reads and how it filters
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub population_key: String,
    pub series_key: String,
    pub start_year: i32,
    pub end_year: i32,
    pub series_id: String,
    pub period: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            population_key: population_key(POPULATION_PREFIX),
            series_key: format!(
                "{}/pr.data.0.Current",
                DEFAULT_LISTING_PATH.trim_matches('/')
            ),
            start_year: 2013,
            end_year: 2018,
            series_id: "PRS30006032".to_string(),
            period: "Q01".to_string(),
        }
    }
}

/// Combined analysis output
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub population: Option<PopulationStats>,
    pub best_years: Vec<BestYear>,
    pub target_rows: Vec<JoinedRow>,
}

/// Build the report from objects in `bucket`
pub async fn run_report(
    store: &dyn ObjectStore,
    bucket: &str,
    options: &ReportOptions,
) -> Result<AnalysisReport> {
    let (population_raw, series_raw) = tokio::try_join!(
        store.get(bucket, &options.population_key),
        store.get(bucket, &options.series_key)
    )?;

    let population = parse_population(&population_raw)?;
    let series_text = String::from_utf8(series_raw).map_err(|e| {
        MirrorError::InvalidInput(format!("{} is not UTF-8: {}", options.series_key, e))
    })?;
    let rows = parse_series(&series_text)?;

    Ok(AnalysisReport {
        population: population_stats(&population, options.start_year, options.end_year),
        best_years: best_year_per_series(&rows),
        target_rows: join_with_population(&rows, &population, &options.series_id, &options.period),
    })
}
