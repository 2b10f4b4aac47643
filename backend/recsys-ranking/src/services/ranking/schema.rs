/// Declared Feature Schema
///
/// Ordered list of the feature names a ranking model was trained on, each with
/// the importance reported by the trainer. Column order of every scoring
/// matrix follows this list exactly.
use crate::error::{RankingError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(default)]
    pub importance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    features: Vec<FeatureSpec>,
    names: Vec<String>,
}

/// Accepted on-disk shapes: `{"features": [...]}` or a bare array, where each
/// entry is either a name or a `{name, importance}` object.
#[derive(Deserialize)]
#[serde(untagged)]
enum SchemaFile {
    Wrapped { features: Vec<SchemaEntry> },
    Bare(Vec<SchemaEntry>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SchemaEntry {
    Name(String),
    Spec(FeatureSpec),
}

/// Features and importances of the H&M ranking model.
const DEFAULT_FEATURES: &[(&str, f32)] = &[
    ("index_name", 0.110_684_67),
    ("section_name", 0.095_306_71),
    ("colour_group_name_right", 0.082_581_59),
    ("garment_group_name", 0.082_526_11),
    ("age", 0.082_372_67),
    ("index_group_name", 0.078_862_3),
    ("department_name", 0.076_268_42),
    ("perceived_colour_master_name", 0.073_050_514),
    ("product_group_name", 0.065_659_18),
    ("product_type_name", 0.064_171_85),
    ("graphical_appearance_name", 0.063_687_75),
    ("perceived_colour_value_name", 0.063_513_115),
    ("colour_group_name", 0.061_315_097),
    ("month_sin", 0.0),
    ("month_cos", 0.0),
];

impl FeatureSchema {
    pub fn new(features: Vec<FeatureSpec>) -> Result<Self> {
        if features.is_empty() {
            return Err(RankingError::FeatureSchema(
                "model declares no features".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for spec in &features {
            if spec.name.trim().is_empty() {
                return Err(RankingError::FeatureSchema(
                    "feature name must not be empty".to_string(),
                ));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(RankingError::FeatureSchema(format!(
                    "feature '{}' declared twice",
                    spec.name
                )));
            }
        }

        let names = features.iter().map(|f| f.name.clone()).collect();
        Ok(Self { features, names })
    }

    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(|name| FeatureSpec {
                    name: name.into(),
                    importance: 0.0,
                })
                .collect(),
        )
    }

    pub fn hm_default() -> Self {
        let features = DEFAULT_FEATURES
            .iter()
            .map(|(name, importance)| FeatureSpec {
                name: (*name).to_string(),
                importance: *importance,
            })
            .collect::<Vec<_>>();
        let names = features.iter().map(|f: &FeatureSpec| f.name.clone()).collect();
        Self { features, names }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: SchemaFile = serde_json::from_str(raw).map_err(|e| {
            RankingError::FeatureSchema(format!("unreadable schema definition: {}", e))
        })?;
        let entries = match file {
            SchemaFile::Wrapped { features } | SchemaFile::Bare(features) => features,
        };
        Self::new(
            entries
                .into_iter()
                .map(|entry| match entry {
                    SchemaEntry::Name(name) => FeatureSpec {
                        name,
                        importance: 0.0,
                    },
                    SchemaEntry::Spec(spec) => spec,
                })
                .collect(),
        )
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RankingError::FeatureSchema(format!(
                "cannot read schema {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&raw)
    }

    /// Declared names in model order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Features sorted by importance, highest first; ties keep model order.
    pub fn by_importance(&self) -> Vec<FeatureSpec> {
        let mut sorted = self.features.clone();
        sorted.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sorted
    }
}
