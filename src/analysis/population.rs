//! Population records and summary statistics

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MirrorError, Result};

/// One `(Year, Population)` row of the population API response
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopulationRecord {
    pub year: i32,
    pub population: f64,
}

/// Mean and sample standard deviation over a year range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopulationStats {
    pub start_year: i32,
    pub end_year: i32,
    pub count: usize,
    pub mean: f64,
    /// `None` with fewer than two samples
    pub std_dev: Option<f64>,
}

#[derive(Deserialize)]
struct PopulationDocument {
    data: Vec<Value>,
}

/// Numbers arrive either as JSON numbers or as numeric strings
fn numeric(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse `{"data": [{"Year": ..., "Population": ...}, ...]}`
pub fn parse_population(raw: &[u8]) -> Result<Vec<PopulationRecord>> {
    let document: PopulationDocument = serde_json::from_slice(raw)?;

    document
        .data
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let year = numeric(row.get("Year"));
            let population = numeric(row.get("Population"));
            match (year, population) {
                (Some(year), Some(population)) => Ok(PopulationRecord {
                    year: year as i32,
                    population,
                }),
                _ => Err(MirrorError::InvalidInput(format!(
                    "population row {} has a non-numeric Year or Population",
                    i
                ))),
            }
        })
        .collect()
}

/// Statistics for records with `start_year <= year <= end_year`
pub fn population_stats(
    records: &[PopulationRecord],
    start_year: i32,
    end_year: i32,
) -> Option<PopulationStats> {
    let values: Vec<f64> = records
        .iter()
        .filter(|r| r.year >= start_year && r.year <= end_year)
        .map(|r| r.population)
        .collect();

    if values.is_empty() {
        return None;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std_dev = (values.len() > 1).then(|| {
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        variance.sqrt()
    });

    Some(PopulationStats {
        start_year,
        end_year,
        count: values.len(),
        mean,
        std_dev,
    })
}
