//! Leaderboard table in `{columns, data}` split form

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Candidate comparison table.
///
/// `name_column` and `score_column` say which columns hold the candidate name
/// and its primary score, so readers never depend on column position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub columns: Vec<String>,
    pub data: Vec<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_column: Option<String>,
}

impl Leaderboard {
    pub fn new(columns: &[&str], name_column: &str, score_column: &str) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            data: Vec::new(),
            name_column: Some(name_column.to_string()),
            score_column: Some(score_column.to_string()),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.data.push(row);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of the candidate-name column.
    pub fn name_index(&self) -> Option<usize> {
        self.name_column
            .as_deref()
            .and_then(|n| self.column_index(n))
            .or_else(|| self.column_index("model"))
    }

    /// Index of the primary score column.
    pub fn score_index(&self) -> Option<usize> {
        self.score_column
            .as_deref()
            .and_then(|n| self.column_index(n))
            .or_else(|| self.columns.iter().position(|c| c.starts_with("score_")))
    }

    pub fn column(&self, index: usize) -> Vec<Value> {
        self.data.iter().map(|row| row.get(index).cloned().unwrap_or(Value::Null)).collect()
    }

    /// Sort rows by the score column, highest first. Rows without a numeric
    /// score go last; ties keep their insertion order.
    pub fn sort_by_score(&mut self) {
        let Some(idx) = self.score_index() else {
            return;
        };
        self.data.sort_by(|a, b| {
            let sa = a.get(idx).and_then(Value::as_f64).unwrap_or(f64::NEG_INFINITY);
            let sb = b.get(idx).and_then(Value::as_f64).unwrap_or(f64::NEG_INFINITY);
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_named_columns_take_precedence() {
        let mut lb = Leaderboard::new(&["fit_time", "model", "score_val"], "model", "score_val");
        lb.push_row(vec![json!(0.1), json!("A"), json!(-3.0)]);
        lb.push_row(vec![json!(0.2), json!("B"), json!(-1.0)]);
        lb.sort_by_score();
        assert_eq!(lb.name_index(), Some(1));
        assert_eq!(lb.column(1), vec![json!("B"), json!("A")]);
    }

    #[test]
    fn test_metadata_optional_on_read() {
        let lb: Leaderboard =
            serde_json::from_value(json!({"columns": ["model", "score_test"], "data": [["A", 1.0]]}))
                .unwrap();
        assert_eq!(lb.name_index(), Some(0));
        assert_eq!(lb.score_index(), Some(1));
    }
}
