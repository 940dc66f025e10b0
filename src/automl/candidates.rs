//! Candidate models tried by the tabular backend
//!
//! Regression targets are raw values; classification targets are class
//! indices stored as `f64`.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::{Preset, ProblemType};
use crate::error::{Result, WorkbenchError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Weighting {
    Uniform,
    Distance,
}

/// An unfitted candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CandidateSpec {
    MeanBaseline,
    MajorityBaseline,
    Ridge { alpha: f64 },
    KNeighbors { k: usize, weighting: Weighting },
    NearestCentroid,
}

impl CandidateSpec {
    /// Candidates for a preset, cheapest first. The first entry is always a
    /// baseline so at least one model fits under any time limit.
    pub fn for_preset(preset: Preset, problem: ProblemType) -> Vec<CandidateSpec> {
        use CandidateSpec::*;
        use Weighting::*;

        let mut specs = if problem.is_classification() {
            vec![MajorityBaseline, NearestCentroid, KNeighbors { k: 5, weighting: Uniform }]
        } else {
            vec![MeanBaseline, Ridge { alpha: 1.0 }, KNeighbors { k: 5, weighting: Uniform }]
        };
        if preset != Preset::MediumQuality {
            specs.push(KNeighbors { k: 10, weighting: Distance });
            if !problem.is_classification() {
                specs.push(Ridge { alpha: 10.0 });
            }
        }
        if matches!(preset, Preset::HighQuality | Preset::BestQuality) {
            specs.push(KNeighbors { k: 3, weighting: Distance });
            if !problem.is_classification() {
                specs.push(Ridge { alpha: 0.1 });
            }
        }
        if preset == Preset::BestQuality {
            specs.push(KNeighbors { k: 15, weighting: Uniform });
            if !problem.is_classification() {
                specs.push(Ridge { alpha: 100.0 });
            }
        }
        specs
    }

    /// Leaderboard name.
    pub fn name(&self) -> String {
        match self {
            CandidateSpec::MeanBaseline => "MeanBaseline".to_string(),
            CandidateSpec::MajorityBaseline => "MajorityBaseline".to_string(),
            CandidateSpec::Ridge { alpha } if (*alpha - 1.0).abs() < f64::EPSILON => {
                "LinearModel".to_string()
            }
            CandidateSpec::Ridge { alpha } => format!("LinearModel_A{}", alpha),
            CandidateSpec::KNeighbors { k, weighting } => {
                let w = match weighting {
                    Weighting::Uniform => "Unif",
                    Weighting::Distance => "Dist",
                };
                format!("KNeighbors{}_K{}", w, k)
            }
            CandidateSpec::NearestCentroid => "NearestCentroid".to_string(),
        }
    }

    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<FittedCandidate> {
        if x.nrows() == 0 || x.nrows() != y.len() {
            return Err(WorkbenchError::Fit(format!(
                "cannot fit on {} rows with {} labels",
                x.nrows(),
                y.len()
            )));
        }
        Ok(match self {
            CandidateSpec::MeanBaseline => FittedCandidate::Constant { value: y.mean().unwrap_or(0.0) },
            CandidateSpec::MajorityBaseline => {
                let counts = class_counts(y, n_classes);
                FittedCandidate::Constant { value: argmax(&counts) as f64 }
            }
            CandidateSpec::Ridge { alpha } => fit_ridge(x, y, *alpha)?,
            CandidateSpec::KNeighbors { k, weighting } => FittedCandidate::KNeighbors {
                k: (*k).min(x.nrows()).max(1),
                weighting: *weighting,
                classify: n_classes > 0,
                n_classes,
                x_train: x.clone(),
                y_train: y.clone(),
            },
            CandidateSpec::NearestCentroid => fit_centroids(x, y, n_classes)?,
        })
    }
}

/// A fitted candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FittedCandidate {
    Constant {
        value: f64,
    },
    Linear {
        coefficients: Array1<f64>,
        intercept: f64,
    },
    KNeighbors {
        k: usize,
        weighting: Weighting,
        classify: bool,
        n_classes: usize,
        x_train: Array2<f64>,
        y_train: Array1<f64>,
    },
    Centroids {
        /// One row per class; `None` for classes absent from training.
        centroids: Vec<Option<Array1<f64>>>,
    },
}

impl FittedCandidate {
    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        match self {
            FittedCandidate::Constant { value } => Array1::from_elem(x.nrows(), *value),
            FittedCandidate::Linear { coefficients, intercept } => x.dot(coefficients) + *intercept,
            FittedCandidate::KNeighbors { k, weighting, classify, n_classes, x_train, y_train } => {
                let preds: Vec<f64> = (0..x.nrows())
                    .into_par_iter()
                    .map(|i| {
                        let neighbors = k_nearest(x.row(i), x_train, y_train, *k);
                        if *classify {
                            vote(&neighbors, *n_classes, *weighting)
                        } else {
                            average(&neighbors, *weighting)
                        }
                    })
                    .collect();
                Array1::from_vec(preds)
            }
            FittedCandidate::Centroids { centroids } => x
                .axis_iter(Axis(0))
                .map(|row| {
                    centroids
                        .iter()
                        .enumerate()
                        .filter_map(|(class, c)| c.as_ref().map(|c| (class, euclidean(row, c.view()))))
                        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
                        .map_or(0.0, |(class, _)| class as f64)
                })
                .collect(),
        }
    }
}

fn fit_ridge(x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Result<FittedCandidate> {
    let n_features = x.ncols();
    let x_mean = x
        .mean_axis(Axis(0))
        .ok_or_else(|| WorkbenchError::Fit("empty design matrix".to_string()))?;
    let y_mean = y.mean().unwrap_or(0.0);
    let x_c = x - &x_mean.view().insert_axis(Axis(0));
    let y_c = y - y_mean;

    // (XᵀX + αI) w = Xᵀy on centered data
    let mut gram = x_c.t().dot(&x_c);
    for i in 0..n_features {
        gram[[i, i]] += alpha;
    }
    let rhs = x_c.t().dot(&y_c);

    let coefficients = cholesky_solve(&gram, &rhs)
        .or_else(|| gauss_jordan_solve(&gram, &rhs))
        .ok_or_else(|| WorkbenchError::Fit("singular normal equations".to_string()))?;
    let intercept = y_mean - coefficients.dot(&x_mean);
    Ok(FittedCandidate::Linear { coefficients, intercept })
}

fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 1e-12 {
                    return None;
                }
                l[[i, i]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * z[j]).sum();
        z[i] = (b[i] - sum) / l[[i, i]];
    }
    let mut w = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * w[j]).sum();
        w[i] = (z[i] - sum) / l[[i, i]];
    }
    Some(w)
}

/// Partial-pivot elimination on `[A | b]`, used when Cholesky fails.
fn gauss_jordan_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut aug = Array2::<f64>::zeros((n, n + 1));
    aug.slice_mut(ndarray::s![.., ..n]).assign(a);
    aug.column_mut(n).assign(b);

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&r1, &r2| aug[[r1, col]].abs().partial_cmp(&aug[[r2, col]].abs()).unwrap_or(Ordering::Equal))?;
        if aug[[pivot_row, col]].abs() < 1e-10 {
            return None;
        }
        if pivot_row != col {
            for j in 0..=n {
                aug.swap([col, j], [pivot_row, j]);
            }
        }
        let pivot = aug[[col, col]];
        for j in 0..=n {
            aug[[col, j]] /= pivot;
        }
        for row in 0..n {
            if row != col {
                let factor = aug[[row, col]];
                if factor != 0.0 {
                    for j in 0..=n {
                        aug[[row, j]] -= factor * aug[[col, j]];
                    }
                }
            }
        }
    }
    Some(aug.column(n).to_owned())
}

fn fit_centroids(x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<FittedCandidate> {
    if n_classes == 0 {
        return Err(WorkbenchError::Fit("nearest centroid needs class labels".to_string()));
    }
    let mut sums = vec![Array1::<f64>::zeros(x.ncols()); n_classes];
    let mut counts = vec![0usize; n_classes];
    for (row, label) in x.axis_iter(Axis(0)).zip(y.iter()) {
        let class = *label as usize;
        if class < n_classes {
            sums[class] += &row;
            counts[class] += 1;
        }
    }
    let centroids = sums
        .into_iter()
        .zip(counts)
        .map(|(sum, count)| (count > 0).then(|| sum / count as f64))
        .collect();
    Ok(FittedCandidate::Centroids { centroids })
}

#[derive(Debug, Clone, Copy)]
struct Neighbor {
    dist: f64,
    label: f64,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    // max-heap on distance: the farthest kept neighbor sits on top
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.partial_cmp(&other.dist).unwrap_or(Ordering::Equal)
    }
}

fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
}

fn k_nearest(point: ArrayView1<f64>, x_train: &Array2<f64>, y_train: &Array1<f64>, k: usize) -> Vec<Neighbor> {
    let mut heap = BinaryHeap::with_capacity(k + 1);
    for (row, label) in x_train.axis_iter(Axis(0)).zip(y_train.iter()) {
        let dist = euclidean(point, row);
        if heap.len() < k {
            heap.push(Neighbor { dist, label: *label });
        } else if heap.peek().is_some_and(|top| dist < top.dist) {
            heap.pop();
            heap.push(Neighbor { dist, label: *label });
        }
    }
    heap.into_vec()
}

fn weight(n: &Neighbor, weighting: Weighting) -> f64 {
    match weighting {
        Weighting::Uniform => 1.0,
        Weighting::Distance => 1.0 / (n.dist + 1e-9),
    }
}

fn average(neighbors: &[Neighbor], weighting: Weighting) -> f64 {
    let total: f64 = neighbors.iter().map(|n| weight(n, weighting)).sum();
    if total == 0.0 {
        return 0.0;
    }
    neighbors.iter().map(|n| weight(n, weighting) * n.label).sum::<f64>() / total
}

fn vote(neighbors: &[Neighbor], n_classes: usize, weighting: Weighting) -> f64 {
    let mut scores = vec![0.0; n_classes.max(1)];
    for n in neighbors {
        let class = n.label as usize;
        if class < scores.len() {
            scores[class] += weight(n, weighting);
        }
    }
    argmax(&scores) as f64
}

pub(crate) fn class_counts(y: &Array1<f64>, n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0.0; n_classes.max(1)];
    for v in y.iter() {
        let class = *v as usize;
        if class < counts.len() {
            counts[class] += 1.0;
        }
    }
    counts
}

/// First index of the maximum; ties go to the lower index.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
