//! Model fitting and scoring
//!
//! Job runners only see the [`Backend`] and [`FittedModel`] traits. The
//! default [`TabularBackend`] fits a small set of candidate models, scores
//! them on a holdout split, and stores the result as a JSON artifact
//! directory.

mod candidates;
mod encoder;
mod leaderboard;
pub mod metrics;
mod predictor;

pub use candidates::CandidateSpec;
pub use encoder::FeatureEncoder;
pub use leaderboard::Leaderboard;
pub use predictor::{TabularBackend, TabularPredictor, ARTIFACT_FILE};

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, WorkbenchError};

/// Metric name to score. Error metrics are negated so higher is better.
pub type Scorecard = BTreeMap<String, f64>;

/// Speed/accuracy trade-off passed to the fitting primitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    #[default]
    MediumQuality,
    GoodQuality,
    HighQuality,
    BestQuality,
}

impl Preset {
    pub const ALL: [Preset; 4] =
        [Preset::MediumQuality, Preset::GoodQuality, Preset::HighQuality, Preset::BestQuality];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::MediumQuality => "medium_quality",
            Preset::GoodQuality => "good_quality",
            Preset::HighQuality => "high_quality",
            Preset::BestQuality => "best_quality",
        }
    }
}

impl FromStr for Preset {
    type Err = WorkbenchError;

    fn from_str(s: &str) -> Result<Self> {
        Preset::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| WorkbenchError::Validation(format!("unknown quality preset: {}", s)))
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    Binary,
    Multiclass,
    Regression,
}

impl ProblemType {
    pub fn is_classification(&self) -> bool {
        !matches!(self, ProblemType::Regression)
    }

    pub fn eval_metric(&self) -> &'static str {
        match self {
            ProblemType::Regression => "root_mean_squared_error",
            _ => "accuracy",
        }
    }
}

/// Arguments to [`Backend::fit`].
pub struct FitRequest<'a> {
    pub data: &'a DataFrame,
    pub label: &'a str,
    /// `None` means unbounded.
    pub time_limit: Option<Duration>,
    pub preset: Preset,
    /// Directory the artifact is written to.
    pub path: &'a Path,
}

/// A fitted model loaded from (or just written to) an artifact directory.
pub trait FittedModel: Send + Sync {
    fn label(&self) -> &str;

    /// Feature columns the model actually uses, in input order.
    fn features(&self) -> Vec<String>;

    fn problem_type(&self) -> ProblemType;

    /// Candidate scores on the validation split captured at fit time.
    fn leaderboard(&self) -> Leaderboard;

    /// Candidate scores against labeled data.
    fn leaderboard_on(&self, data: &DataFrame) -> Result<Leaderboard>;

    /// Score the best model against the label column of `data`.
    fn evaluate(&self, data: &DataFrame) -> Result<Scorecard>;

    /// One prediction per row. Numeric labels come back as JSON numbers.
    fn predict(&self, data: &DataFrame) -> Result<Vec<serde_json::Value>>;
}

/// The fitting/scoring primitive.
pub trait Backend: Send + Sync {
    fn fit(&self, request: FitRequest<'_>) -> Result<Box<dyn FittedModel>>;

    fn load(&self, path: &Path) -> Result<Box<dyn FittedModel>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_parse() {
        assert_eq!("best_quality".parse::<Preset>().unwrap(), Preset::BestQuality);
        assert_eq!(Preset::default().as_str(), "medium_quality");
        assert!(matches!("fast".parse::<Preset>(), Err(WorkbenchError::Validation(_))));
    }
}
