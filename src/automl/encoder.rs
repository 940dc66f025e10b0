//! Feature encoding from a frame to a dense matrix

use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::data::{is_numeric_dtype, numeric_values, text_values};
use crate::error::{Result, WorkbenchError};

/// Above this many distinct values a text column is dropped instead of
/// one-hot encoded.
const MAX_CATEGORIES: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Encoding {
    /// Standardized with training statistics; missing values become the mean.
    Numeric { mean: f64, std: f64 },
    /// One-hot over the training vocabulary; unseen values encode as zeros.
    Categorical { levels: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EncodedFeature {
    name: String,
    encoding: Encoding,
}

impl EncodedFeature {
    fn width(&self) -> usize {
        match &self.encoding {
            Encoding::Numeric { .. } => 1,
            Encoding::Categorical { levels } => levels.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureEncoder {
    features: Vec<EncodedFeature>,
    dropped: Vec<String>,
}

impl FeatureEncoder {
    /// Learn encodings for `columns` of `df`.
    pub fn fit(df: &DataFrame, columns: &[String]) -> Result<Self> {
        let mut features = Vec::with_capacity(columns.len());
        let mut dropped = Vec::new();

        for name in columns {
            let series = df.column(name)?.as_materialized_series();
            let dtype = series.dtype();
            if is_numeric_dtype(dtype) || dtype == &DataType::Boolean {
                let values: Vec<f64> = numeric_values(series)?.into_iter().flatten().collect();
                if values.is_empty() {
                    dropped.push(name.clone());
                    continue;
                }
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                let std = if var.sqrt() > 1e-12 { var.sqrt() } else { 1.0 };
                features.push(EncodedFeature { name: name.clone(), encoding: Encoding::Numeric { mean, std } });
            } else {
                let mut levels: Vec<String> = text_values(series)?.into_iter().flatten().collect();
                levels.sort();
                levels.dedup();
                if levels.is_empty() || levels.len() > MAX_CATEGORIES {
                    dropped.push(name.clone());
                    continue;
                }
                features.push(EncodedFeature { name: name.clone(), encoding: Encoding::Categorical { levels } });
            }
        }

        if features.is_empty() {
            return Err(WorkbenchError::Fit("no usable feature columns".to_string()));
        }
        Ok(Self { features, dropped })
    }

    /// Names of the columns the encoder reads, in input order.
    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    /// Columns seen at fit time but not used.
    pub fn dropped(&self) -> &[String] {
        &self.dropped
    }

    pub fn width(&self) -> usize {
        self.features.iter().map(EncodedFeature::width).sum()
    }

    /// Encode `df`. Every used feature column must be present; columns are
    /// matched by name so input order does not matter.
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        let present: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        let missing: Vec<&str> = self
            .features
            .iter()
            .filter(|f| !present.contains(&f.name))
            .map(|f| f.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(WorkbenchError::Schema(format!(
                "input is missing feature column(s): {}",
                missing.join(", ")
            )));
        }

        let n_rows = df.height();
        let mut x = Array2::<f64>::zeros((n_rows, self.width()));
        let mut offset = 0;

        for feature in &self.features {
            let series = df.column(&feature.name)?.as_materialized_series();
            match &feature.encoding {
                Encoding::Numeric { mean, std } => {
                    for (i, v) in numeric_values(series)?.into_iter().enumerate() {
                        x[[i, offset]] = (v.filter(|v| v.is_finite()).unwrap_or(*mean) - mean) / std;
                    }
                }
                Encoding::Categorical { levels } => {
                    let index: HashMap<&str, usize> =
                        levels.iter().enumerate().map(|(i, l)| (l.as_str(), i)).collect();
                    for (i, v) in text_values(series)?.into_iter().enumerate() {
                        if let Some(j) = v.as_deref().and_then(|s| index.get(s)) {
                            x[[i, offset + j]] = 1.0;
                        }
                    }
                }
            }
            offset += feature.width();
        }

        Ok(x)
    }
}
