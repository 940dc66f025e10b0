//! Tabular data access
//!
//! - [`loader`] reads dataset files with their stored separator/encoding
//! - [`registry`] registers uploaded files as `Dataset` records
//! - [`summary`] builds the cached dataset overview
//! - the helpers below convert polars columns to plain values

pub mod loader;
pub mod registry;
pub mod summary;

pub use loader::{selection_order, DatasetLoader};
pub use registry::{register_dataset, NewDataset};
pub use summary::summarize;

use polars::prelude::*;
use serde_json::Value;

use crate::error::Result;

pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

pub fn is_integer_dtype(dtype: &DataType) -> bool {
    is_numeric_dtype(dtype) && !matches!(dtype, DataType::Float32 | DataType::Float64)
}

/// Column values as `f64`. Text is parsed; anything unparsable is `None`.
pub fn numeric_values(series: &Series) -> Result<Vec<Option<f64>>> {
    if series.dtype() == &DataType::String {
        return Ok(series
            .str()?
            .into_iter()
            .map(|v| v.and_then(|s| s.trim().parse::<f64>().ok()))
            .collect());
    }
    let cast = series.cast(&DataType::Float64)?;
    Ok(cast.f64()?.into_iter().collect())
}

/// Column values rendered as text, nulls preserved.
pub fn text_values(series: &Series) -> Result<Vec<Option<String>>> {
    let cast = if series.dtype() == &DataType::String {
        series.clone()
    } else {
        series.cast(&DataType::String)?
    };
    Ok(cast.str()?.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// Column values as JSON, numbers kept numeric.
pub fn json_values(series: &Series) -> Result<Vec<Value>> {
    let dtype = series.dtype();
    if is_integer_dtype(dtype) {
        let cast = series.cast(&DataType::Int64)?;
        return Ok(cast.i64()?.into_iter().map(|v| v.map_or(Value::Null, Value::from)).collect());
    }
    if is_numeric_dtype(dtype) {
        return Ok(numeric_values(series)?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::from))
            .collect());
    }
    if dtype == &DataType::Boolean {
        return Ok(series.bool()?.into_iter().map(|v| v.map_or(Value::Null, Value::Bool)).collect());
    }
    Ok(text_values(series)?
        .into_iter()
        .map(|v| v.map_or(Value::Null, Value::String))
        .collect())
}

/// Build a column from JSON values: numeric if every non-null value is a
/// number, text otherwise.
pub fn column_from_json(name: &str, values: &[Value]) -> Column {
    let all_numeric = values.iter().all(|v| v.is_null() || v.is_number());
    if all_numeric {
        let all_int = values.iter().all(|v| v.is_null() || v.is_i64());
        if all_int {
            let ints: Vec<Option<i64>> = values.iter().map(Value::as_i64).collect();
            return Column::new(name.into(), ints);
        }
        let floats: Vec<Option<f64>> = values.iter().map(Value::as_f64).collect();
        return Column::new(name.into(), floats);
    }
    let text: Vec<Option<String>> = values
        .iter()
        .map(|v| match v {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .collect();
    Column::new(name.into(), text)
}

/// Build a column from form text, typed numeric when every value parses.
pub fn column_from_text(name: &str, values: &[String]) -> Column {
    if !values.is_empty() && values.iter().all(|v| v.trim().parse::<i64>().is_ok()) {
        let ints: Vec<i64> = values.iter().filter_map(|v| v.trim().parse().ok()).collect();
        return Column::new(name.into(), ints);
    }
    if !values.is_empty() && values.iter().all(|v| v.trim().parse::<f64>().is_ok()) {
        let floats: Vec<f64> = values.iter().filter_map(|v| v.trim().parse().ok()).collect();
        return Column::new(name.into(), floats);
    }
    Column::new(name.into(), values.to_vec())
}
