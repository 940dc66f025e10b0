//! Tabular backend and its persisted predictor

use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::candidates::{argmax, CandidateSpec, FittedCandidate};
use super::encoder::FeatureEncoder;
use super::leaderboard::Leaderboard;
use super::metrics;
use super::{Backend, FitRequest, FittedModel, Preset, ProblemType, Scorecard};
use crate::data::{is_integer_dtype, is_numeric_dtype, numeric_values, text_values};
use crate::error::{Result, WorkbenchError};

/// File inside the artifact directory holding the serialized predictor.
pub const ARTIFACT_FILE: &str = "predictor.json";

const ARTIFACT_VERSION: u32 = 1;
const HOLDOUT_FRACTION: f64 = 0.2;
const MIN_ROWS_FOR_HOLDOUT: usize = 10;
const SPLIT_SEED: u64 = 0;
const ENSEMBLE_NAME: &str = "WeightedEnsemble_L2";

const VAL_COLUMNS: [&str; 6] = ["model", "score_val", "eval_metric", "pred_time_val", "fit_time", "fit_order"];
const TEST_COLUMNS: [&str; 6] = ["model", "score_test", "score_val", "eval_metric", "pred_time_test", "fit_time"];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrainedModel {
    name: String,
    spec: CandidateSpec,
    model: FittedCandidate,
    score_val: f64,
    fit_time: f64,
    pred_time_val: f64,
    fit_order: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Ensemble {
    /// Indices into `TabularPredictor::models`.
    members: Vec<usize>,
    weights: Vec<f64>,
    score_val: f64,
    fit_time: f64,
    pred_time_val: f64,
    fit_order: usize,
}

/// How the label column maps to model outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LabelSpace {
    problem_type: ProblemType,
    /// Class labels as text, sorted; empty for regression.
    classes: Vec<String>,
    /// Class labels were integers and are returned as numbers.
    numeric_classes: bool,
}

impl LabelSpace {
    fn infer(series: &Series) -> Result<Self> {
        let dtype = series.dtype();
        if is_integer_dtype(dtype) {
            let mut distinct: Vec<i64> = series.cast(&DataType::Int64)?.i64()?.into_iter().flatten().collect();
            distinct.sort_unstable();
            distinct.dedup();
            if distinct.len() <= 2 {
                return Ok(Self {
                    problem_type: ProblemType::Binary,
                    classes: distinct.iter().map(i64::to_string).collect(),
                    numeric_classes: true,
                });
            }
        }
        if is_numeric_dtype(dtype) {
            return Ok(Self { problem_type: ProblemType::Regression, classes: Vec::new(), numeric_classes: false });
        }

        let mut classes: Vec<String> = text_values(series)?.into_iter().flatten().collect();
        classes.sort();
        classes.dedup();
        let problem_type = match classes.len() {
            0 => return Err(WorkbenchError::Fit("label column has no values".to_string())),
            1 | 2 => ProblemType::Binary,
            _ => ProblemType::Multiclass,
        };
        Ok(Self { problem_type, classes, numeric_classes: false })
    }

    fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Model targets for a label column; unseen classes map to `n_classes`.
    fn encode(&self, series: &Series) -> Result<Vec<Option<f64>>> {
        if self.problem_type == ProblemType::Regression {
            return numeric_values(series);
        }
        Ok(text_values(series)?
            .into_iter()
            .map(|v| {
                v.map(|label| {
                    self.classes.iter().position(|c| *c == label).unwrap_or(self.classes.len()) as f64
                })
            })
            .collect())
    }

    fn decode(&self, value: f64) -> Value {
        if self.problem_type == ProblemType::Regression {
            return Value::from(value);
        }
        let Some(label) = self.classes.get(value.max(0.0) as usize) else {
            return Value::Null;
        };
        if self.numeric_classes {
            if let Ok(n) = label.parse::<i64>() {
                return Value::from(n);
            }
        }
        Value::String(label.clone())
    }
}

/// Fitted predictor persisted as `<artifact dir>/predictor.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabularPredictor {
    version: u32,
    #[serde(skip)]
    path: PathBuf,
    label: String,
    preset: Preset,
    labels: LabelSpace,
    encoder: FeatureEncoder,
    models: Vec<TrainedModel>,
    ensemble: Option<Ensemble>,
    best: String,
    leaderboard: Leaderboard,
}

impl TabularPredictor {
    pub fn load(path: &Path) -> Result<Self> {
        let file = path.join(ARTIFACT_FILE);
        if !path.is_dir() {
            return Err(WorkbenchError::ArtifactLoad(format!(
                "artifact directory not found: {}",
                path.display()
            )));
        }
        let bytes = fs::read(&file)
            .map_err(|e| WorkbenchError::ArtifactLoad(format!("cannot read {}: {}", file.display(), e)))?;
        let mut predictor: TabularPredictor = serde_json::from_slice(&bytes)
            .map_err(|e| WorkbenchError::ArtifactLoad(format!("corrupt artifact {}: {}", file.display(), e)))?;
        if predictor.version != ARTIFACT_VERSION {
            return Err(WorkbenchError::ArtifactLoad(format!(
                "unsupported artifact version {}",
                predictor.version
            )));
        }
        predictor.path = path.to_path_buf();
        Ok(predictor)
    }

    fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.path)?;
        let file = self.path.join(ARTIFACT_FILE);
        let tmp = self.path.join(format!("{}.tmp", ARTIFACT_FILE));
        fs::write(&tmp, serde_json::to_vec(self)?)?;
        fs::rename(&tmp, &file)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the model used by `predict` and `evaluate`.
    pub fn best_model(&self) -> &str {
        &self.best
    }

    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.iter().map(|m| m.name.clone()).collect();
        if self.ensemble.is_some() {
            names.push(ENSEMBLE_NAME.to_string());
        }
        names
    }

    fn raw_predict(&self, name: &str, x: &Array2<f64>) -> Result<Array1<f64>> {
        if name == ENSEMBLE_NAME {
            let ensemble = self
                .ensemble
                .as_ref()
                .ok_or_else(|| WorkbenchError::ArtifactLoad("artifact has no ensemble".to_string()))?;
            let preds: Vec<Array1<f64>> = ensemble
                .members
                .iter()
                .filter_map(|&i| self.models.get(i))
                .map(|m| m.model.predict(x))
                .collect();
            return Ok(combine(self.labels.problem_type, self.labels.n_classes(), &preds, &ensemble.weights));
        }
        self.models
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.model.predict(x))
            .ok_or_else(|| WorkbenchError::ArtifactLoad(format!("artifact has no model named {}", name)))
    }

    /// Rows with a label, their encoded features and targets.
    fn labeled(&self, data: &DataFrame) -> Result<(Array2<f64>, Vec<f64>)> {
        let column = data.column(&self.label).map_err(|_| {
            WorkbenchError::Schema(format!("label column '{}' not found in data", self.label))
        })?;
        let series = column.as_materialized_series();
        let rows = data.filter(&series.is_not_null())?;
        if rows.height() == 0 {
            return Err(WorkbenchError::Validation("no labeled rows to score".to_string()));
        }
        let y: Vec<f64> = self
            .labels
            .encode(rows.column(&self.label)?.as_materialized_series())?
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        let x = self.encoder.transform(&rows)?;
        Ok((x, y))
    }

    fn score_card(&self, y_true: &[f64], y_pred: &[f64]) -> Scorecard {
        match self.labels.problem_type {
            ProblemType::Regression => metrics::regression_scorecard(y_true, y_pred),
            _ => metrics::classification_scorecard(y_true, y_pred, self.labels.n_classes()),
        }
    }
}

impl FittedModel for TabularPredictor {
    fn label(&self) -> &str {
        &self.label
    }

    fn features(&self) -> Vec<String> {
        self.encoder.feature_names()
    }

    fn problem_type(&self) -> ProblemType {
        self.labels.problem_type
    }

    fn leaderboard(&self) -> Leaderboard {
        self.leaderboard.clone()
    }

    fn leaderboard_on(&self, data: &DataFrame) -> Result<Leaderboard> {
        let (x, y) = self.labeled(data)?;
        let problem = self.labels.problem_type;
        let mut board = Leaderboard::new(&TEST_COLUMNS, "model", "score_test");

        let mut entries: Vec<(String, f64, f64)> =
            self.models.iter().map(|m| (m.name.clone(), m.score_val, m.fit_time)).collect();
        if let Some(e) = &self.ensemble {
            entries.push((ENSEMBLE_NAME.to_string(), e.score_val, e.fit_time));
        }
        for (name, score_val, fit_time) in entries {
            let start = Instant::now();
            let pred = self.raw_predict(&name, &x)?;
            let pred_time = start.elapsed().as_secs_f64();
            let score_test = metrics::primary_score(problem, &y, &pred.to_vec());
            board.push_row(vec![
                json!(name),
                Value::from(score_test),
                Value::from(score_val),
                json!(problem.eval_metric()),
                Value::from(pred_time),
                Value::from(fit_time),
            ]);
        }
        board.sort_by_score();
        Ok(board)
    }

    fn evaluate(&self, data: &DataFrame) -> Result<Scorecard> {
        let (x, y) = self.labeled(data)?;
        let pred = self.raw_predict(&self.best, &x)?;
        Ok(self.score_card(&y, &pred.to_vec()))
    }

    fn predict(&self, data: &DataFrame) -> Result<Vec<Value>> {
        let x = self.encoder.transform(data)?;
        let pred = self.raw_predict(&self.best, &x)?;
        Ok(pred.iter().map(|v| self.labels.decode(*v)).collect())
    }
}

/// Weighted average for regression, weighted vote for classification.
fn combine(problem: ProblemType, n_classes: usize, preds: &[Array1<f64>], weights: &[f64]) -> Array1<f64> {
    let n = preds.first().map_or(0, Array1::len);
    if problem == ProblemType::Regression {
        let total: f64 = weights.iter().sum();
        let mut out = Array1::<f64>::zeros(n);
        for (p, w) in preds.iter().zip(weights) {
            out.scaled_add(*w / total.max(f64::MIN_POSITIVE), p);
        }
        return out;
    }
    (0..n)
        .map(|i| {
            let mut votes = vec![0.0; n_classes.max(1)];
            for (p, w) in preds.iter().zip(weights) {
                let class = p[i] as usize;
                if class < votes.len() {
                    votes[class] += w;
                }
            }
            argmax(&votes) as f64
        })
        .collect()
}

fn holdout_split(n: usize) -> (Vec<usize>, Vec<usize>) {
    let mut idx: Vec<usize> = (0..n).collect();
    if n < MIN_ROWS_FOR_HOLDOUT {
        return (idx.clone(), idx);
    }
    idx.shuffle(&mut StdRng::seed_from_u64(SPLIT_SEED));
    let n_val = ((n as f64 * HOLDOUT_FRACTION).round() as usize).max(1);
    let val = idx[..n_val].to_vec();
    let train = idx[n_val..].to_vec();
    (train, val)
}

fn round4(v: f64) -> f64 {
    (v * 1e4).round() / 1e4
}

/// In-process tabular AutoML backend.
#[derive(Debug, Default, Clone)]
pub struct TabularBackend;

impl TabularBackend {
    pub fn new() -> Self {
        Self
    }

    pub fn fit_predictor(&self, request: FitRequest<'_>) -> Result<TabularPredictor> {
        let started = Instant::now();
        let deadline = request.time_limit.map(|d| started + d);

        let label_column = request.data.column(request.label).map_err(|_| {
            WorkbenchError::Schema(format!("label column '{}' not found in training data", request.label))
        })?;
        let label_series = label_column.as_materialized_series().clone();
        let labels = LabelSpace::infer(&label_series)?;
        let data = request.data.filter(&label_series.is_not_null())?;
        if data.height() == 0 {
            return Err(WorkbenchError::Fit("no rows with a label value".to_string()));
        }

        let feature_columns: Vec<String> = data
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .filter(|c| c != request.label)
            .collect();
        if feature_columns.is_empty() {
            return Err(WorkbenchError::Fit("training data has no feature columns".to_string()));
        }

        let encoder = FeatureEncoder::fit(&data, &feature_columns)?;
        if !encoder.dropped().is_empty() {
            info!(dropped = ?encoder.dropped(), "Ignoring unusable feature columns");
        }
        let x = encoder.transform(&data)?;
        let y = Array1::from_vec(
            labels
                .encode(data.column(request.label)?.as_materialized_series())?
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect(),
        );
        if y.iter().any(|v| !v.is_finite()) {
            return Err(WorkbenchError::Fit(format!("label column '{}' has non-numeric values", request.label)));
        }

        let (train_idx, val_idx) = holdout_split(x.nrows());
        let uses_holdout = val_idx.len() < x.nrows();
        let x_train = x.select(Axis(0), &train_idx);
        let y_train = y.select(Axis(0), &train_idx);
        let x_val = x.select(Axis(0), &val_idx);
        let y_val = y.select(Axis(0), &val_idx).to_vec();

        let problem = labels.problem_type;
        let n_classes = labels.n_classes();
        let specs = CandidateSpec::for_preset(request.preset, problem);
        info!(
            rows = x.nrows(),
            encoded_width = x.ncols(),
            problem_type = ?problem,
            preset = %request.preset,
            candidates = specs.len(),
            holdout_rows = if uses_holdout { val_idx.len() } else { 0 },
            "Fitting candidates"
        );

        let mut models: Vec<TrainedModel> = Vec::new();
        let mut val_preds: Vec<Array1<f64>> = Vec::new();
        for (order, spec) in specs.into_iter().enumerate() {
            if !models.is_empty() && deadline.is_some_and(|d| Instant::now() >= d) {
                info!(candidate = %spec.name(), "Time limit reached, skipping remaining candidates");
                break;
            }
            let name = spec.name();
            let fit_start = Instant::now();
            let model = match spec.fit(&x_train, &y_train, n_classes) {
                Ok(m) => m,
                Err(e) => {
                    warn!(candidate = %name, error = %e, "Candidate failed to fit");
                    continue;
                }
            };
            let fit_time = fit_start.elapsed().as_secs_f64();
            let pred_start = Instant::now();
            let pred = model.predict(&x_val);
            let pred_time_val = pred_start.elapsed().as_secs_f64();
            let score_val = metrics::primary_score(problem, &y_val, &pred.to_vec());
            debug!(candidate = %name, score_val, fit_time, "Candidate fitted");

            val_preds.push(pred);
            models.push(TrainedModel {
                name,
                spec,
                model,
                score_val,
                fit_time,
                pred_time_val,
                fit_order: order + 1,
            });
        }
        if models.is_empty() {
            return Err(WorkbenchError::Fit("no candidate model could be fitted".to_string()));
        }

        let ensemble = build_ensemble(request.preset, problem, n_classes, &models, &val_preds, &y_val);

        if uses_holdout {
            for trained in models.iter_mut() {
                let refit_start = Instant::now();
                match trained.spec.fit(&x, &y, n_classes) {
                    Ok(full) => {
                        trained.model = full;
                        trained.fit_time += refit_start.elapsed().as_secs_f64();
                    }
                    Err(e) => warn!(candidate = %trained.name, error = %e, "Refit on full data failed"),
                }
            }
        }

        let mut leaderboard = Leaderboard::new(&VAL_COLUMNS, "model", "score_val");
        for m in &models {
            leaderboard.push_row(vec![
                json!(m.name),
                Value::from(m.score_val),
                json!(problem.eval_metric()),
                Value::from(round4(m.pred_time_val)),
                Value::from(round4(m.fit_time)),
                json!(m.fit_order),
            ]);
        }
        if let Some(e) = &ensemble {
            leaderboard.push_row(vec![
                json!(ENSEMBLE_NAME),
                Value::from(e.score_val),
                json!(problem.eval_metric()),
                Value::from(round4(e.pred_time_val)),
                Value::from(round4(e.fit_time)),
                json!(e.fit_order),
            ]);
        }
        leaderboard.sort_by_score();
        let best = leaderboard
            .data
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| models[0].name.clone());

        let predictor = TabularPredictor {
            version: ARTIFACT_VERSION,
            path: request.path.to_path_buf(),
            label: request.label.to_string(),
            preset: request.preset,
            labels,
            encoder,
            models,
            ensemble,
            best,
            leaderboard,
        };
        predictor.save()?;
        info!(
            best_model = %predictor.best,
            path = %request.path.display(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Predictor saved"
        );
        Ok(predictor)
    }
}

fn build_ensemble(
    preset: Preset,
    problem: ProblemType,
    n_classes: usize,
    models: &[TrainedModel],
    val_preds: &[Array1<f64>],
    y_val: &[f64],
) -> Option<Ensemble> {
    if preset == Preset::MediumQuality {
        return None;
    }
    let size = if preset == Preset::BestQuality { 3 } else { 2 };
    let mut ranked: Vec<usize> = (0..models.len())
        .filter(|&i| !matches!(models[i].spec, CandidateSpec::MeanBaseline | CandidateSpec::MajorityBaseline))
        .collect();
    ranked.sort_by(|&a, &b| {
        models[b].score_val.partial_cmp(&models[a].score_val).unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(size);
    if ranked.len() < 2 {
        return None;
    }

    let weights: Vec<f64> = ranked
        .iter()
        .map(|&i| match problem {
            // score is negated RMSE
            ProblemType::Regression => 1.0 / (-models[i].score_val + 1e-9),
            _ => models[i].score_val + 1e-9,
        })
        .collect();
    let preds: Vec<Array1<f64>> = ranked.iter().map(|&i| val_preds[i].clone()).collect();
    let combined = combine(problem, n_classes, &preds, &weights);

    Some(Ensemble {
        score_val: metrics::primary_score(problem, y_val, &combined.to_vec()),
        fit_time: ranked.iter().map(|&i| models[i].fit_time).sum(),
        pred_time_val: ranked.iter().map(|&i| models[i].pred_time_val).sum(),
        fit_order: models.iter().map(|m| m.fit_order).max().unwrap_or(0) + 1,
        members: ranked,
        weights,
    })
}

impl Backend for TabularBackend {
    fn fit(&self, request: FitRequest<'_>) -> Result<Box<dyn FittedModel>> {
        Ok(Box::new(self.fit_predictor(request)?))
    }

    fn load(&self, path: &Path) -> Result<Box<dyn FittedModel>> {
        Ok(Box::new(TabularPredictor::load(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sales() -> DataFrame {
        df!(
            "region" => &["north", "south", "north", "south", "east", "north", "south", "east", "north", "south", "east", "north"],
            "units" => &[5i64, 12, 7, 3, 9, 11, 6, 2, 8, 10, 4, 1],
            "revenue" => &[50.0, 125.0, 71.0, 29.0, 88.0, 112.0, 58.0, 21.0, 79.0, 99.0, 41.0, 9.5],
        )
        .unwrap()
    }

    fn fit(df: &DataFrame, label: &str, preset: Preset, dir: &Path) -> TabularPredictor {
        TabularBackend::new()
            .fit_predictor(FitRequest { data: df, label, time_limit: None, preset, path: dir })
            .unwrap()
    }

    #[test]
    fn test_regression_fit_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sales_1");
        let df = sales();
        let predictor = fit(&df, "revenue", Preset::MediumQuality, &path);
        assert_eq!(predictor.problem_type(), ProblemType::Regression);
        assert_eq!(predictor.features(), vec!["region", "units"]);
        assert_eq!(predictor.leaderboard().len(), 3);

        let loaded = TabularPredictor::load(&path).unwrap();
        let preds = loaded.predict(&df).unwrap();
        assert_eq!(preds.len(), df.height());
        assert!(preds.iter().all(Value::is_number));
        let card = loaded.evaluate(&df).unwrap();
        assert!(card.contains_key("root_mean_squared_error"));
        assert!(card["r2"] > 0.5);
    }

    #[test]
    fn test_good_preset_adds_ensemble() {
        let dir = tempfile::tempdir().unwrap();
        let predictor = fit(&sales(), "revenue", Preset::GoodQuality, dir.path());
        assert!(predictor.model_names().contains(&ENSEMBLE_NAME.to_string()));
        let names = predictor.leaderboard().column(0);
        assert!(names.contains(&json!(ENSEMBLE_NAME)));
    }

    #[test]
    fn test_text_label_is_classification() {
        let dir = tempfile::tempdir().unwrap();
        let df = df!(
            "x" => &[0.0, 0.1, 0.2, 5.0, 5.1, 5.2],
            "kind" => &["low", "low", "low", "high", "high", "high"],
        )
        .unwrap();
        let predictor = fit(&df, "kind", Preset::MediumQuality, dir.path());
        assert_eq!(predictor.problem_type(), ProblemType::Binary);
        let preds = predictor.predict(&df!("x" => &[0.05, 5.05]).unwrap()).unwrap();
        assert_eq!(preds, vec![json!("low"), json!("high")]);
        assert_eq!(predictor.evaluate(&df).unwrap()["accuracy"], 1.0);
    }

    #[test]
    fn test_integer_binary_label_predicts_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let df = df!("x" => &[0.0, 0.1, 5.0, 5.1], "churn" => &[0i64, 0, 1, 1]).unwrap();
        let predictor = fit(&df, "churn", Preset::MediumQuality, dir.path());
        let preds = predictor.predict(&df).unwrap();
        assert_eq!(preds, vec![json!(0), json!(0), json!(1), json!(1)]);
    }

    #[test]
    fn test_zero_time_limit_still_fits_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let df = sales();
        let predictor = TabularBackend::new()
            .fit_predictor(FitRequest {
                data: &df,
                label: "revenue",
                time_limit: Some(Duration::ZERO),
                preset: Preset::BestQuality,
                path: dir.path(),
            })
            .unwrap();
        assert_eq!(predictor.leaderboard().len(), 1);
        assert_eq!(predictor.best_model(), "MeanBaseline");
    }

    #[test]
    fn test_leaderboard_on_requires_label() {
        let dir = tempfile::tempdir().unwrap();
        let df = sales();
        let predictor = fit(&df, "revenue", Preset::MediumQuality, dir.path());
        let board = predictor.leaderboard_on(&df).unwrap();
        assert_eq!(board.columns[1], "score_test");
        let unlabeled = df.drop("revenue").unwrap();
        assert!(matches!(predictor.leaderboard_on(&unlabeled), Err(WorkbenchError::Schema(_))));
        assert!(matches!(predictor.evaluate(&unlabeled), Err(WorkbenchError::Schema(_))));
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let err = TabularPredictor::load(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, WorkbenchError::ArtifactLoad(_)));
        std::fs::write(dir.path().join(ARTIFACT_FILE), b"{not json").unwrap();
        assert!(matches!(TabularPredictor::load(dir.path()), Err(WorkbenchError::ArtifactLoad(_))));
    }

    #[test]
    fn test_holdout_split_deterministic() {
        assert_eq!(holdout_split(5), ((0..5).collect(), (0..5).collect()));
        let (train, val) = holdout_split(20);
        assert_eq!(val.len(), 4);
        assert_eq!(train.len(), 16);
        assert_eq!(holdout_split(20), (train, val));
    }
}
