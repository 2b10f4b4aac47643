use super::FeatureStore;
use crate::context::RequestContext;
use crate::error::{RankingError, Result};
use crate::models::{CandidateId, FeatureMatrix, FeatureRow, FeatureValue};
use crate::services::bounded;
use crate::services::ranking::FeatureSchema;
use ndarray::Array2;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Cyclical month encoding supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthEncoding {
    pub sin: f64,
    pub cos: f64,
}

pub const MONTH_SIN: &str = "month_sin";
pub const MONTH_COS: &str = "month_cos";

/// Builds the ranker's input matrix for a filtered candidate list.
///
/// Row `i` of the result always belongs to `candidate_ids[i]`.
pub struct FeatureAssembler {
    store: Arc<dyn FeatureStore>,
    aliases: Vec<(String, String)>,
    timeout: Duration,
}

impl FeatureAssembler {
    pub fn new(
        store: Arc<dyn FeatureStore>,
        aliases: Vec<(String, String)>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            aliases,
            timeout,
        }
    }

    pub async fn assemble(
        &self,
        ctx: &RequestContext,
        candidate_ids: &[CandidateId],
        customer_id: &str,
        month: MonthEncoding,
        schema: &FeatureSchema,
    ) -> Result<FeatureMatrix> {
        if candidate_ids.is_empty() {
            return Ok(FeatureMatrix::empty(schema.names().to_vec()));
        }

        let (rows, customer) = tokio::join!(
            bounded(self.timeout, self.store.get_feature_rows(candidate_ids)),
            bounded(self.timeout, self.store.get_customer_row(customer_id)),
        );
        let rows = rows.map_err(|e| RankingError::collaborator("feature store", e))?;
        let customer = customer.map_err(|e| RankingError::collaborator("feature store", e))?;

        debug!(
            correlation_id = ctx.correlation_id(),
            candidates = candidate_ids.len(),
            rows_found = rows.len(),
            customer_fields = customer.len(),
            "Feature rows fetched"
        );

        let missing_rows = candidate_ids
            .iter()
            .filter(|id| !rows.contains_key(*id))
            .count();
        if missing_rows > 0 {
            warn!(
                correlation_id = ctx.correlation_id(),
                missing_rows,
                "Candidates without a feature row, their features will be zero-filled"
            );
        }

        // Candidate fields, then the broadcast customer row, then the month
        let assembled: Vec<FeatureRow> = candidate_ids
            .iter()
            .map(|id| {
                let mut row = rows.get(id).cloned().unwrap_or_default();
                row.extend(customer.iter().map(|(k, v)| (k.clone(), v.clone())));
                row.insert(MONTH_SIN.to_string(), FeatureValue::Number(month.sin));
                row.insert(MONTH_COS.to_string(), FeatureValue::Number(month.cos));
                row
            })
            .collect();

        build_matrix(ctx, assembled, schema, &self.aliases)
    }
}

/// Reconcile rows against `schema` and encode them, preserving row order.
pub(crate) fn build_matrix(
    ctx: &RequestContext,
    mut rows: Vec<FeatureRow>,
    schema: &FeatureSchema,
    aliases: &[(String, String)],
) -> Result<FeatureMatrix> {
    apply_aliases(&mut rows, schema, aliases);
    zero_fill(ctx, &mut rows, schema);

    let mut values = Array2::<f32>::zeros((rows.len(), schema.len()));
    for (col, name) in schema.names().iter().enumerate() {
        let column = rows
            .iter()
            .map(|row| row.get(name))
            .collect::<Option<Vec<&FeatureValue>>>()
            .ok_or_else(|| {
                RankingError::FeatureSchema(format!(
                    "feature '{}' missing after reconciliation",
                    name
                ))
            })?;

        for (row, value) in encode_column(&column).into_iter().enumerate() {
            values[[row, col]] = value;
        }
    }

    FeatureMatrix::new(schema.names().to_vec(), values)
}

/// Copy `source` into a declared `target` that is absent from a row.
fn apply_aliases(rows: &mut [FeatureRow], schema: &FeatureSchema, aliases: &[(String, String)]) {
    for (target, source) in aliases {
        if !schema.contains(target) {
            continue;
        }
        for row in rows.iter_mut() {
            if row.contains_key(target) {
                continue;
            }
            if let Some(value) = row.get(source).cloned() {
                row.insert(target.clone(), value);
            }
        }
    }
}

/// Insert 0 for every declared feature a row lacks. One warning per feature.
fn zero_fill(ctx: &RequestContext, rows: &mut [FeatureRow], schema: &FeatureSchema) {
    for name in schema.names() {
        let mut filled = 0usize;
        for row in rows.iter_mut() {
            if !row.contains_key(name) {
                row.insert(name.clone(), FeatureValue::Number(0.0));
                filled += 1;
            }
        }
        if filled > 0 {
            warn!(
                correlation_id = ctx.correlation_id(),
                feature = %name,
                rows = filled,
                "Declared feature missing from assembled rows, filled with 0"
            );
        }
    }
}

/// Numeric columns pass through. A column holding any text is treated as
/// categorical: each distinct value gets the index of its first appearance
/// in this batch.
fn encode_column(column: &[&FeatureValue]) -> Vec<f32> {
    if !column.iter().any(|v| v.is_text()) {
        return column
            .iter()
            .map(|v| v.as_number().unwrap_or_default() as f32)
            .collect();
    }

    let mut vocabulary: HashMap<String, usize> = HashMap::new();
    column
        .iter()
        .map(|value| {
            let next = vocabulary.len();
            *vocabulary.entry(value.to_string()).or_insert(next) as f32
        })
        .collect()
}
