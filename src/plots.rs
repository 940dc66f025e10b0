//! Plot figures as Plotly-style JSON
//!
//! Rendering happens client side; these functions only shape the data and
//! return `None` when the inputs are not plottable.

use serde_json::{json, Value};

fn as_numbers(values: &[Value]) -> Option<Vec<Option<f64>>> {
    values
        .iter()
        .map(|v| match v {
            Value::Null => Some(None),
            Value::Number(n) => n.as_f64().map(Some),
            _ => None,
        })
        .collect()
}

/// Scatter of predicted against real values with a dashed `y = x` line.
///
/// `None` unless both series are numeric and hold at least one pair.
pub fn predicted_vs_real(real: &[Value], predicted: &[Value]) -> Option<String> {
    let real = as_numbers(real)?;
    let predicted = as_numbers(predicted)?;
    let pairs: Vec<(f64, f64)> = real
        .iter()
        .zip(&predicted)
        .filter_map(|(r, p)| Some(((*r)?, (*p)?)))
        .collect();
    if pairs.is_empty() {
        return None;
    }

    let lo = pairs.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let hi = pairs.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let xs: Vec<f64> = pairs.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = pairs.iter().map(|p| p.1).collect();

    let figure = json!({
        "data": [
            {
                "type": "scatter",
                "mode": "markers",
                "name": "Predictions",
                "x": xs,
                "y": ys,
                "marker": {"opacity": 0.6},
            },
            {
                "type": "scatter",
                "mode": "lines",
                "name": "Ideal",
                "x": [lo, hi],
                "y": [lo, hi],
                "line": {"dash": "dash", "color": "red"},
            },
        ],
        "layout": {
            "title": "Predicted vs. Real Values",
            "xaxis": {"title": "Real Values"},
            "yaxis": {"title": "Predicted Values"},
        },
    });
    serde_json::to_string(&figure).ok()
}

/// Scatter of one input feature against the predicted column.
pub fn feature_vs_prediction(feature: &str, values: &[Value], target: &str, predicted: &[Value]) -> Option<String> {
    let predicted = as_numbers(predicted)?;
    let pairs: Vec<(Value, f64)> = values
        .iter()
        .zip(&predicted)
        .filter_map(|(v, p)| Some((v.clone(), (*p)?)))
        .filter(|(v, _)| !v.is_null())
        .collect();
    if pairs.is_empty() {
        return None;
    }
    let figure = json!({
        "data": [{
            "type": "scatter",
            "mode": "markers",
            "x": pairs.iter().map(|p| p.0.clone()).collect::<Vec<_>>(),
            "y": pairs.iter().map(|p| p.1).collect::<Vec<_>>(),
            "marker": {"color": pairs.iter().map(|p| p.1).collect::<Vec<_>>(), "colorscale": "Viridis"},
        }],
        "layout": {
            "title": format!("{} vs. predicted {}", feature, target),
            "xaxis": {"title": feature},
            "yaxis": {"title": format!("predicted_{}", target)},
        },
    });
    serde_json::to_string(&figure).ok()
}

/// Bar figure of `bins` equal-width buckets over the non-null values.
pub fn histogram(column: &str, values: &[Option<f64>], bins: usize) -> Option<Value> {
    let present: Vec<f64> = values.iter().flatten().copied().filter(|v| v.is_finite()).collect();
    if present.is_empty() || bins == 0 {
        return None;
    }
    let lo = present.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = if hi > lo { (hi - lo) / bins as f64 } else { 1.0 };

    let mut counts = vec![0usize; bins];
    for v in &present {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    let centers: Vec<f64> = (0..bins).map(|i| lo + width * (i as f64 + 0.5)).collect();

    Some(json!({
        "data": [{"type": "bar", "x": centers, "y": counts, "name": column}],
        "layout": {
            "title": format!("Distribution of {}", column),
            "xaxis": {"title": column},
            "yaxis": {"title": "Count"},
            "bargap": 0.05,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_counts_every_value() {
        let values = vec![Some(0.0), Some(1.0), Some(10.0), None, Some(10.0)];
        let fig = histogram("units", &values, 5).unwrap();
        let counts: Vec<u64> = fig["data"][0]["y"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_u64().unwrap())
            .collect();
        assert_eq!(counts.iter().sum::<u64>(), 4);
        assert_eq!(counts[4], 2);
        assert!(histogram("units", &[None], 5).is_none());
    }

    #[test]
    fn test_numeric_series_render() {
        let real = vec![json!(1.0), json!(3), Value::Null];
        let pred = vec![json!(1.5), json!(2.5), json!(9.0)];
        let fig: Value = serde_json::from_str(&predicted_vs_real(&real, &pred).unwrap()).unwrap();
        assert_eq!(fig["data"][0]["x"], json!([1.0, 3.0]));
        assert_eq!(fig["data"][1]["x"], json!([1.0, 3.0]));
    }

    #[test]
    fn test_text_series_yield_none() {
        let real = vec![json!("a"), json!("b")];
        let pred = vec![json!("a"), json!("a")];
        assert!(predicted_vs_real(&real, &pred).is_none());
        assert!(predicted_vs_real(&[], &[]).is_none());
    }

    #[test]
    fn test_feature_plot_accepts_text_axis() {
        let fig = feature_vs_prediction("region", &[json!("north")], "revenue", &[json!(3.0)]);
        assert!(fig.unwrap().contains("predicted_revenue"));
        assert!(feature_vs_prediction("region", &[json!("north")], "kind", &[json!("x")]).is_none());
    }
}
