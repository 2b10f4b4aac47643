use crate::error::{RankingError, Result};
use ndarray::Array2;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Opaque identifier of a recommendable item.
pub type CandidateId = String;

/// Feature name → value for one entity.
pub type FeatureRow = HashMap<String, FeatureValue>;

/// Validated inbound ranking request.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingRequest {
    pub customer_id: String,
    pub query_embedding: Vec<f32>,
    pub month_sin: f64,
    pub month_cos: f64,
}

/// Scalar feature value as stored in the feature store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Text(String),
}

impl FeatureValue {
    /// Parse a raw store value: numeric when it parses as `f64`, text otherwise.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => FeatureValue::Number(n),
            _ => FeatureValue::Text(raw.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(n) => Some(*n),
            FeatureValue::Text(_) => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, FeatureValue::Text(_))
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Number(n) => write!(f, "{}", n),
            FeatureValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Text(value.to_string())
    }
}

/// Numeric model input. Rows follow candidate order, columns follow the
/// scorer's declared schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    values: Array2<f32>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<String>, values: Array2<f32>) -> Result<Self> {
        if values.ncols() != columns.len() {
            return Err(RankingError::FeatureSchema(format!(
                "matrix has {} columns but {} names",
                values.ncols(),
                columns.len()
            )));
        }
        Ok(Self { columns, values })
    }

    pub fn empty(columns: Vec<String>) -> Self {
        let width = columns.len();
        Self {
            columns,
            values: Array2::zeros((0, width)),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    pub fn row_count(&self) -> usize {
        self.values.nrows()
    }

    pub fn column_count(&self) -> usize {
        self.values.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn column(&self, name: &str) -> Option<Vec<f32>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.values.column(idx).to_vec())
    }
}

/// One ranked entry; serialized as `[score, candidate_id]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub score: f32,
    pub candidate_id: CandidateId,
}

impl Serialize for ScoredCandidate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.score)?;
        tuple.serialize_element(&self.candidate_id)?;
        tuple.end()
    }
}

/// Successful response body: at most `TOP_K_RESPONSE` entries, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankingResponse {
    pub ranking: Vec<ScoredCandidate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feature_value_parse() {
        assert_eq!(FeatureValue::parse("42"), FeatureValue::Number(42.0));
        assert_eq!(FeatureValue::parse(" 0.5 "), FeatureValue::Number(0.5));
        assert_eq!(FeatureValue::parse("Red"), FeatureValue::Text("Red".into()));
        assert_eq!(FeatureValue::parse("NaN"), FeatureValue::Text("NaN".into()));
    }

    #[test]
    fn test_response_serializes_pairs() {
        let response = RankingResponse {
            ranking: vec![ScoredCandidate {
                score: 0.5,
                candidate_id: "a1".into(),
            }],
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value, json!({ "ranking": [[0.5, "a1"]] }));
    }

    #[test]
    fn test_matrix_rejects_mismatched_names() {
        let result = FeatureMatrix::new(vec!["age".into()], Array2::zeros((2, 3)));
        assert!(matches!(result, Err(RankingError::FeatureSchema(_))));
    }
}
