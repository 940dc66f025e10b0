//! Scorecards for regression and classification
//!
//! Error metrics are reported negated so that every score is
//! higher-is-better, matching how candidates are ranked.

use super::{ProblemType, Scorecard};

/// The single score used to rank candidates.
pub fn primary_score(problem: ProblemType, y_true: &[f64], y_pred: &[f64]) -> f64 {
    match problem {
        ProblemType::Regression => -mse(y_true, y_pred).sqrt(),
        _ => accuracy(y_true, y_pred),
    }
}

pub fn regression_scorecard(y_true: &[f64], y_pred: &[f64]) -> Scorecard {
    let mut card = Scorecard::new();
    if y_true.is_empty() {
        return card;
    }
    let n = y_true.len() as f64;
    let errors: Vec<f64> = y_true.iter().zip(y_pred).map(|(t, p)| t - p).collect();

    let mse = mse(y_true, y_pred);
    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

    let y_mean = y_true.iter().sum::<f64>() / n;
    let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
    let ss_res: f64 = errors.iter().map(|e| e * e).sum();
    let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

    let mut abs_errors: Vec<f64> = errors.iter().map(|e| e.abs()).collect();
    abs_errors.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = abs_errors.len() / 2;
    let median_ae = if abs_errors.len() % 2 == 0 {
        (abs_errors[mid - 1] + abs_errors[mid]) / 2.0
    } else {
        abs_errors[mid]
    };

    card.insert("root_mean_squared_error".into(), -mse.sqrt());
    card.insert("mean_squared_error".into(), -mse);
    card.insert("mean_absolute_error".into(), -mae);
    card.insert("median_absolute_error".into(), -median_ae);
    card.insert("r2".into(), r2);
    card.insert("pearsonr".into(), pearson(y_true, y_pred));
    card
}

/// `y_true`/`y_pred` hold class indices. Labels outside `0..n_classes`
/// (unseen at training time) never match a prediction.
pub fn classification_scorecard(y_true: &[f64], y_pred: &[f64], n_classes: usize) -> Scorecard {
    let mut card = Scorecard::new();
    if y_true.is_empty() {
        return card;
    }
    let k = n_classes + 1;
    let mut confusion = vec![vec![0.0f64; k]; k];
    for (t, p) in y_true.iter().zip(y_pred) {
        let t = (*t as usize).min(n_classes);
        let p = (*p as usize).min(n_classes);
        confusion[t][p] += 1.0;
    }

    let total = y_true.len() as f64;
    let correct: f64 = (0..k).map(|i| confusion[i][i]).sum();
    let true_counts: Vec<f64> = confusion.iter().map(|row| row.iter().sum()).collect();
    let pred_counts: Vec<f64> = (0..k).map(|j| confusion.iter().map(|row| row[j]).sum()).collect();

    let recalls: Vec<f64> = (0..k)
        .filter(|&i| true_counts[i] > 0.0)
        .map(|i| confusion[i][i] / true_counts[i])
        .collect();
    let balanced = recalls.iter().sum::<f64>() / recalls.len().max(1) as f64;

    // multiclass Matthews correlation
    let cov_tp = correct * total - true_counts.iter().zip(&pred_counts).map(|(t, p)| t * p).sum::<f64>();
    let cov_pp = total * total - pred_counts.iter().map(|p| p * p).sum::<f64>();
    let cov_tt = total * total - true_counts.iter().map(|t| t * t).sum::<f64>();
    let mcc = if cov_pp * cov_tt > 0.0 { cov_tp / (cov_pp * cov_tt).sqrt() } else { 0.0 };

    card.insert("accuracy".into(), correct / total);
    card.insert("balanced_accuracy".into(), balanced);
    card.insert("mcc".into(), mcc);

    if n_classes == 2 {
        // class index 1 is the positive label
        let tp = confusion[1][1];
        let fp = pred_counts[1] - tp;
        let fn_ = true_counts[1] - tp;
        let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
        let f1 = if precision + recall > 0.0 { 2.0 * precision * recall / (precision + recall) } else { 0.0 };
        card.insert("precision".into(), precision);
        card.insert("recall".into(), recall);
        card.insert("f1".into(), f1);
    }
    card
}

fn mse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum::<f64>() / y_true.len() as f64
}

fn accuracy(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| (*t - *p).abs() < 0.5).count();
    correct as f64 / y_true.len() as f64
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let ma = a.iter().sum::<f64>() / n;
    let mb = b.iter().sum::<f64>() / n;
    let cov: f64 = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum();
    let va: f64 = a.iter().map(|x| (x - ma).powi(2)).sum();
    let vb: f64 = b.iter().map(|y| (y - mb).powi(2)).sum();
    if va > 0.0 && vb > 0.0 {
        cov / (va * vb).sqrt()
    } else {
        0.0
    }
}
