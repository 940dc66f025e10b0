//! Dataset overview shown on the dataset page
//!
//! Summaries are expensive for large files, so they are cached on the
//! `Dataset` record and rebuilt only after an explicit invalidation.

use polars::prelude::*;
use serde_json::{json, Value};

use super::{is_numeric_dtype, json_values, loader::dtype_name, numeric_values};
use crate::error::Result;
use crate::plots;
use crate::records::VisualizationCache;

pub const PREVIEW_ROWS: usize = 10;
const HISTOGRAM_BINS: usize = 20;

fn column_stats(column: &Column, height: usize) -> Result<Value> {
    let series = column.as_materialized_series();
    let null_count = series.null_count();
    let mut stats = json!({
        "name": series.name().to_string(),
        "dtype": dtype_name(series.dtype()),
        "null_count": null_count,
        "unique_count": series.n_unique().unwrap_or(0),
        "null_percent": if height == 0 { 0.0 } else { null_count as f64 / height as f64 * 100.0 },
    });
    if is_numeric_dtype(series.dtype()) {
        let values: Vec<f64> = numeric_values(series)?.into_iter().flatten().collect();
        if !values.is_empty() {
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            stats["mean"] = json!(mean);
            stats["std"] = json!(var.sqrt());
            stats["min"] = json!(values.iter().copied().fold(f64::INFINITY, f64::min));
            stats["max"] = json!(values.iter().copied().fold(f64::NEG_INFINITY, f64::max));
        }
    }
    Ok(stats)
}

/// Column statistics, the first rows and one histogram per numeric column.
pub fn summarize(df: &DataFrame) -> Result<VisualizationCache> {
    let height = df.height();
    let stats = df
        .get_columns()
        .iter()
        .map(|c| column_stats(c, height))
        .collect::<Result<Vec<_>>>()?;

    let head = df.head(Some(PREVIEW_ROWS));
    let preview_columns = head
        .get_columns()
        .iter()
        .map(|c| {
            let series = c.as_materialized_series();
            Ok(json!({"name": series.name().to_string(), "values": json_values(series)?}))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut histograms = serde_json::Map::new();
    for column in df.get_columns() {
        let series = column.as_materialized_series();
        if is_numeric_dtype(series.dtype()) {
            if let Some(fig) = plots::histogram(series.name(), &numeric_values(series)?, HISTOGRAM_BINS) {
                histograms.insert(series.name().to_string(), fig);
            }
        }
    }

    Ok(VisualizationCache {
        valid: true,
        stats: Some(json!({"rows": height, "columns": df.width(), "column_info": stats})),
        preview: Some(json!({"rows": head.height(), "columns": preview_columns})),
        plots: Some(Value::Object(histograms)),
    })
}
