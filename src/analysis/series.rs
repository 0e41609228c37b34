//! Time-series flat file parsing and aggregation

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::population::PopulationRecord;
use crate::error::{MirrorError, Result};

/// One row of a `pr.data.*` file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRow {
    pub series_id: String,
    pub year: i32,
    pub period: String,
    /// `None` when the cell is not numeric
    pub value: Option<f64>,
}

/// Year with the largest summed value for one series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestYear {
    pub series_id: String,
    pub year: i32,
    pub value: f64,
}

/// A series row joined with the population of its year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRow {
    pub series_id: String,
    pub year: i32,
    pub period: String,
    pub value: Option<f64>,
    pub population: f64,
}

/// Parse a tab-separated series file with a header line
///
/// Header names and cells are whitespace-trimmed (the published files pad
/// them). Rows with an unparsable year are skipped.
pub fn parse_series(text: &str) -> Result<Vec<SeriesRow>> {
    let mut lines = text.lines();
    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| MirrorError::InvalidInput("series file is empty".to_string()))?
        .split('\t')
        .map(str::trim)
        .collect();

    let column = |name: &str| {
        header
            .iter()
            .position(|h| *h == name)
            .ok_or_else(|| MirrorError::InvalidInput(format!("series file has no '{}' column", name)))
    };
    let series_col = column("series_id")?;
    let year_col = column("year")?;
    let period_col = column("period")?;
    let value_col = column("value")?;

    let mut rows = Vec::new();
    for (line_no, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split('\t').map(str::trim).collect();
        let cell = |i: usize| cells.get(i).copied().unwrap_or_default();

        let Ok(year) = cell(year_col).parse::<i32>() else {
            tracing::debug!("Skipping series line {}: bad year {:?}", line_no + 2, cell(year_col));
            continue;
        };

        rows.push(SeriesRow {
            series_id: cell(series_col).to_string(),
            year,
            period: cell(period_col).to_string(),
            value: cell(value_col).parse().ok(),
        });
    }

    Ok(rows)
}

/// For every series, the year whose values sum highest
///
/// Missing values count as zero. Ties go to the earliest year.
pub fn best_year_per_series(rows: &[SeriesRow]) -> Vec<BestYear> {
    let mut sums: BTreeMap<&str, BTreeMap<i32, f64>> = BTreeMap::new();
    for row in rows {
        *sums
            .entry(row.series_id.as_str())
            .or_default()
            .entry(row.year)
            .or_default() += row.value.unwrap_or(0.0);
    }

    sums.into_iter()
        .filter_map(|(series_id, years)| {
            let mut best: Option<(i32, f64)> = None;
            for (year, total) in years {
                if best.map_or(true, |(_, b)| total > b) {
                    best = Some((year, total));
                }
            }
            best.map(|(year, value)| BestYear {
                series_id: series_id.to_string(),
                year,
                value,
            })
        })
        .collect()
}

/// Inner join on year, keeping only `series_id`/`period`
pub fn join_with_population(
    rows: &[SeriesRow],
    population: &[PopulationRecord],
    series_id: &str,
    period: &str,
) -> Vec<JoinedRow> {
    rows.iter()
        .filter(|r| r.series_id == series_id && r.period == period)
        .flat_map(|r| {
            population
                .iter()
                .filter(move |p| p.year == r.year)
                .map(move |p| JoinedRow {
                    series_id: r.series_id.clone(),
                    year: r.year,
                    period: r.period.clone(),
                    value: r.value,
                    population: p.population,
                })
        })
        .collect()
}
