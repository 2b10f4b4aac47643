/// Boosted-Tree Ranking Model
///
/// Loads and runs an ONNX export of the GBDT ranker using tract-onnx.
/// Falls back to an importance-weighted linear score over the declared
/// schema when no ONNX artifact is available.
use super::artifact::{ModelDescription, ModelKind, ServingModel};
use super::schema::FeatureSchema;
use super::Scorer;
use crate::error::{RankingError, Result};
use crate::models::FeatureMatrix;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tract_onnx::prelude::{
    tract_ndarray, tvec, DatumType, Framework, Graph, InferenceModelExt, SimplePlan, Tensor,
    TypedFact, TypedOp,
};

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// GBDT Ranking Model
///
/// The optimized plan is immutable once built; `run` takes `&self`, so one
/// instance is shared by every request.
pub struct RankingModel {
    backend: Backend,
    schema: FeatureSchema,
    name: String,
    version: String,
}

enum Backend {
    Onnx(Arc<OnnxPlan>),
    Weighted,
}

impl RankingModel {
    /// Load ONNX model from file path
    ///
    /// Falls back to weighted scoring if the file is missing or fails to load,
    /// unless `require_onnx` is set.
    pub fn load<P: AsRef<Path>>(
        model_path: Option<P>,
        schema: FeatureSchema,
        require_onnx: bool,
    ) -> Result<Self> {
        let Some(path) = model_path else {
            if require_onnx {
                return Err(RankingError::Scoring(
                    "ONNX ranking model required but no path configured".to_string(),
                ));
            }
            warn!("No ranking model configured, using importance-weighted scoring");
            return Ok(Self::weighted(schema));
        };
        let path = path.as_ref();

        match Self::try_load_onnx(path) {
            Ok(plan) => {
                info!(
                    path = %path.display(),
                    feature_count = schema.len(),
                    "Loaded ONNX ranking model"
                );
                Ok(Self {
                    backend: Backend::Onnx(Arc::new(plan)),
                    schema,
                    name: "ranking".to_string(),
                    version: "default".to_string(),
                })
            }
            Err(e) if require_onnx => Err(RankingError::Scoring(format!(
                "failed to load ONNX model from {}: {}",
                path.display(),
                e
            ))),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load ONNX model, falling back to importance-weighted scoring"
                );
                Ok(Self::weighted(schema))
            }
        }
    }

    /// Importance-weighted linear scorer (development / fallback).
    pub fn weighted(schema: FeatureSchema) -> Self {
        debug!("Using importance-weighted ranking model");
        Self {
            backend: Backend::Weighted,
            schema,
            name: "ranking".to_string(),
            version: "default".to_string(),
        }
    }

    pub fn with_identity(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.name = name.into();
        self.version = version.into();
        self
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Onnx(_) => "onnx",
            Backend::Weighted => "weighted",
        }
    }

    fn predict_onnx(&self, plan: &OnnxPlan, matrix: &FeatureMatrix) -> Result<Vec<f32>> {
        let rows = matrix.row_count();
        let cols = matrix.column_count();

        let input = tract_ndarray::Array2::from_shape_vec(
            (rows, cols),
            matrix.values().iter().copied().collect(),
        )
        .map_err(|e| RankingError::Scoring(format!("failed to build input tensor: {}", e)))?;
        let input: Tensor = input.into_dyn().into();

        let output = plan
            .run(tvec![input.into()])
            .map_err(|e| RankingError::Scoring(format!("ONNX inference failed: {}", e)))?;

        // Classifier exports emit an int64 `label` tensor ahead of the
        // float probabilities; score on the first float output.
        let scores = output
            .iter()
            .find(|t| t.datum_type() == DatumType::F32)
            .ok_or_else(|| RankingError::Scoring("model produced no float output".to_string()))?;
        let view = scores
            .to_array_view::<f32>()
            .map_err(|e| RankingError::Scoring(format!("output extraction failed: {}", e)))?;
        let flat: Vec<f32> = view.iter().copied().collect();

        // Regressors emit one value per row; binary classifiers emit
        // [p(neg), p(pos)] per row and we rank on p(pos).
        if flat.len() == rows {
            Ok(flat)
        } else if flat.len() == rows * 2 {
            Ok(flat.chunks_exact(2).map(|pair| pair[1]).collect())
        } else {
            Err(RankingError::Scoring(format!(
                "model returned {} values for {} rows",
                flat.len(),
                rows
            )))
        }
    }

    /// `score = Σ importance_i · x_i`
    fn predict_weighted(&self, matrix: &FeatureMatrix) -> Vec<f32> {
        let weights = ndarray::Array1::from_iter(
            self.schema.features().iter().map(|f| f.importance),
        );
        matrix.values().dot(&weights).to_vec()
    }

    fn try_load_onnx(
        path: &Path,
    ) -> std::result::Result<OnnxPlan, Box<dyn std::error::Error + Send + Sync>> {
        if !path.exists() {
            return Err(format!("Model file not found: {}", path.display()).into());
        }

        let plan = tract_onnx::onnx()
            .model_for_path(path)?
            .into_optimized()?
            .into_runnable()?;

        Ok(plan)
    }
}

impl Scorer for RankingModel {
    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn score(&self, matrix: &FeatureMatrix) -> Result<Vec<f32>> {
        if matrix.column_count() != self.schema.len() {
            return Err(RankingError::Scoring(format!(
                "expected {} features, got {}",
                self.schema.len(),
                matrix.column_count()
            )));
        }
        if matrix.columns() != self.schema.names() {
            return Err(RankingError::Scoring(
                "feature columns are not in the model's declared order".to_string(),
            ));
        }
        if matrix.is_empty() {
            return Ok(Vec::new());
        }

        let scores = match &self.backend {
            Backend::Onnx(plan) => self.predict_onnx(plan, matrix)?,
            Backend::Weighted => self.predict_weighted(matrix),
        };

        if scores.len() != matrix.row_count() {
            return Err(RankingError::Scoring(format!(
                "model returned {} scores for {} rows",
                scores.len(),
                matrix.row_count()
            )));
        }

        Ok(scores)
    }
}

impl ServingModel for RankingModel {
    fn kind(&self) -> ModelKind {
        ModelKind::TreeEnsemble
    }

    fn describe(&self) -> ModelDescription {
        ModelDescription {
            name: self.name.clone(),
            version: self.version.clone(),
            kind: self.kind(),
            backend: self.backend_name(),
            input_dimension: self.schema.len(),
            features: self.schema.by_importance(),
            item_count: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ranking::schema::FeatureSpec;
    use ndarray::Array2;

    fn two_feature_model() -> RankingModel {
        let schema = FeatureSchema::new(vec![
            FeatureSpec {
                name: "age".into(),
                importance: 0.5,
            },
            FeatureSpec {
                name: "color".into(),
                importance: 2.0,
            },
        ])
        .unwrap();
        RankingModel::weighted(schema)
    }

    fn matrix(columns: &[&str], rows: usize, values: Vec<f32>) -> FeatureMatrix {
        FeatureMatrix::new(
            columns.iter().map(|c| c.to_string()).collect(),
            Array2::from_shape_vec((rows, columns.len()), values).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_weighted_scores_preserve_row_order() {
        let model = two_feature_model();
        let input = matrix(&["age", "color"], 3, vec![2.0, 0.0, 0.0, 1.0, 4.0, 1.0]);

        let scores = model.score(&input).unwrap();

        assert_eq!(scores, vec![1.0, 2.0, 4.0]);
    }

    #[test]
    fn test_rejects_wrong_column_count() {
        let model = two_feature_model();
        let input = matrix(&["age"], 1, vec![1.0]);

        let result = model.score(&input);

        assert!(matches!(result, Err(RankingError::Scoring(_))));
    }

    #[test]
    fn test_rejects_wrong_column_order() {
        let model = two_feature_model();
        let input = matrix(&["color", "age"], 1, vec![1.0, 1.0]);

        assert!(matches!(model.score(&input), Err(RankingError::Scoring(_))));
    }

    #[test]
    fn test_empty_matrix_scores_nothing() {
        let model = two_feature_model();
        let input = FeatureMatrix::empty(vec!["age".into(), "color".into()]);

        assert!(model.score(&input).unwrap().is_empty());
    }

    #[test]
    fn test_missing_model_file_falls_back() {
        let model = RankingModel::load(
            Some("/nonexistent/ranker.onnx"),
            FeatureSchema::hm_default(),
            false,
        )
        .unwrap();

        assert_eq!(model.backend_name(), "weighted");
    }

    #[test]
    fn test_missing_model_file_fails_when_required() {
        let result = RankingModel::load(
            Some("/nonexistent/ranker.onnx"),
            FeatureSchema::hm_default(),
            true,
        );

        assert!(matches!(result, Err(RankingError::Scoring(_))));
    }

    /// Two-output graph shaped like a binary classifier export:
    /// `label` (int64 ArgMax) first, then `probabilities` (the input rows).
    fn classifier_export() -> Vec<u8> {
        use prost::Message;
        use tract_onnx::pb::{
            attribute_proto::AttributeType, tensor_proto::DataType, tensor_shape_proto::dimension,
            tensor_shape_proto::Dimension, type_proto, AttributeProto, GraphProto, ModelProto,
            NodeProto, OperatorSetIdProto, TensorShapeProto, TypeProto, ValueInfoProto,
        };

        fn value_info(name: &str, elem_type: DataType, dims: &[dimension::Value]) -> ValueInfoProto {
            ValueInfoProto {
                name: name.to_string(),
                r#type: Some(TypeProto {
                    value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                        elem_type: elem_type as i32,
                        shape: Some(TensorShapeProto {
                            dim: dims
                                .iter()
                                .map(|d| Dimension {
                                    value: Some(d.clone()),
                                    ..Default::default()
                                })
                                .collect(),
                        }),
                    })),
                    ..Default::default()
                }),
                ..Default::default()
            }
        }

        let batch = dimension::Value::DimParam("N".to_string());
        let width = dimension::Value::DimValue(2);

        let graph = GraphProto {
            name: "classifier".to_string(),
            node: vec![
                NodeProto {
                    name: "argmax".to_string(),
                    op_type: "ArgMax".to_string(),
                    input: vec!["features".to_string()],
                    output: vec!["label".to_string()],
                    attribute: vec![
                        AttributeProto {
                            name: "axis".to_string(),
                            r#type: AttributeType::Int as i32,
                            i: 1,
                            ..Default::default()
                        },
                        AttributeProto {
                            name: "keepdims".to_string(),
                            r#type: AttributeType::Int as i32,
                            i: 0,
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                },
                NodeProto {
                    name: "identity".to_string(),
                    op_type: "Identity".to_string(),
                    input: vec!["features".to_string()],
                    output: vec!["probabilities".to_string()],
                    ..Default::default()
                },
            ],
            input: vec![value_info(
                "features",
                DataType::Float,
                &[batch.clone(), width.clone()],
            )],
            output: vec![
                value_info("label", DataType::Int64, &[batch.clone()]),
                value_info("probabilities", DataType::Float, &[batch, width]),
            ],
            ..Default::default()
        };

        ModelProto {
            ir_version: 7,
            opset_import: vec![OperatorSetIdProto {
                domain: String::new(),
                version: 13,
            }],
            graph: Some(graph),
            ..Default::default()
        }
        .encode_to_vec()
    }

    #[test]
    fn test_classifier_export_scores_positive_class() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranker.onnx");
        std::fs::write(&path, classifier_export()).unwrap();
        let schema = two_feature_model().schema().clone();

        let model = RankingModel::load(Some(&path), schema, true).unwrap();
        let input = matrix(&["age", "color"], 2, vec![0.8, 0.2, 0.3, 0.7]);

        assert_eq!(model.backend_name(), "onnx");
        assert_eq!(model.score(&input).unwrap(), vec![0.2, 0.7]);
    }

    #[test]
    fn test_describe_reports_tree_ensemble() {
        let description = two_feature_model()
            .with_identity("ranker", "7")
            .describe();

        assert_eq!(description.kind, ModelKind::TreeEnsemble);
        assert_eq!(description.version, "7");
        assert_eq!(description.features[0].name, "color");
    }
}
