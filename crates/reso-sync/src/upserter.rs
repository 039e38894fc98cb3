use std::sync::Arc;

use async_trait::async_trait;
use tokio_postgres::{
    types::ToSql,
    Client,
};

use crate::normalize::Row;

/// Component B: idempotent batched write keyed by a conflict-key column
/// set (spec.md §4.B). Schema beyond the conflict-key columns is out of
/// scope for the engine; the concrete Postgres implementation stores the
/// remainder of each row as a single JSONB document, mirroring how the
/// teacher's own document store keys rows by identity and treats the rest
/// of the row as an opaque blob.
#[async_trait]
pub trait Upserter: Send + Sync {
    async fn upsert(&self, table: &str, rows: Vec<Row>, conflict_key: &[&str]) -> anyhow::Result<u64>;
}

pub struct PostgresUpserter {
    client: Arc<Client>,
}

impl PostgresUpserter {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Upserter for PostgresUpserter {
    async fn upsert(&self, table: &str, rows: Vec<Row>, conflict_key: &[&str]) -> anyhow::Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let key_columns: Vec<String> = conflict_key.iter().map(|s| s.to_string()).collect();
        let params_per_row = key_columns.len() + 1; // + data (jsonb)

        let mut values_clause = String::new();
        let mut params: Vec<Box<dyn ToSql + Sync + Send>> = Vec::with_capacity(rows.len() * params_per_row);

        for (row_idx, row) in rows.into_iter().enumerate() {
            if row_idx > 0 {
                values_clause.push(',');
            }
            values_clause.push('(');
            for (col_idx, key_col) in key_columns.iter().enumerate() {
                if col_idx > 0 {
                    values_clause.push(',');
                }
                let placeholder = row_idx * params_per_row + col_idx + 1;
                values_clause.push_str(&format!("${placeholder}"));
                let key_value = row
                    .get(key_col.as_str())
                    .ok_or_else(|| anyhow::anyhow!("row is missing conflict key column {key_col}"))?
                    .as_str()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| row[key_col.as_str()].to_string());
                params.push(Box::new(key_value));
            }
            let data_placeholder = row_idx * params_per_row + key_columns.len() + 1;
            values_clause.push_str(&format!(",${data_placeholder}, now())"));
            params.push(Box::new(serde_json::Value::Object(row.into_iter().collect())));
        }

        // Quoted to match the mixed-case, double-quoted columns `ensure_schema`
        // creates (e.g. `"ListingKey"`); unquoted identifiers fold to
        // lower-case in Postgres and would not resolve to those columns.
        let quoted_key_list = key_columns
            .iter()
            .map(|col| format!("\"{col}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {table} ({quoted_key_list}, data, updated_at) VALUES {values_clause} \
             ON CONFLICT ({quoted_key_list}) DO UPDATE SET data = EXCLUDED.data, updated_at = EXCLUDED.updated_at"
        );

        let param_refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect();
        let affected = self.client.execute(&sql, &param_refs).await?;
        Ok(affected)
    }
}
