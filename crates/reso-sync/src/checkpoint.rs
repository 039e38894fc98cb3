use std::sync::Arc;

use async_trait::async_trait;
use chrono::{
    DateTime,
    Utc,
};
use tokio_postgres::Client;

/// Component C: read/write the last-processed timestamp per resource
/// (spec.md §4.C), backed by the `sync_log` table.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, resource: &str) -> anyhow::Result<Option<DateTime<Utc>>>;

    /// Upserts the checkpoint row and bumps `updated_at`. A no-op when
    /// `timestamp` is `None` (spec.md §4.C — "must be a no-op when the
    /// timestamp argument is empty").
    async fn set(&self, resource: &str, timestamp: Option<DateTime<Utc>>) -> anyhow::Result<()>;
}

pub struct PostgresCheckpointStore {
    client: Arc<Client>,
}

impl PostgresCheckpointStore {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    async fn get(&self, resource: &str) -> anyhow::Result<Option<DateTime<Utc>>> {
        let row = self
            .client
            .query_opt(
                "SELECT lastprocessedtimestamp FROM sync_log WHERE resourcetype = $1",
                &[&resource],
            )
            .await?;
        Ok(row.and_then(|row| row.get::<_, Option<DateTime<Utc>>>(0)))
    }

    async fn set(&self, resource: &str, timestamp: Option<DateTime<Utc>>) -> anyhow::Result<()> {
        let Some(timestamp) = timestamp else {
            return Ok(());
        };

        self.client
            .execute(
                "INSERT INTO sync_log (resourcetype, lastprocessedtimestamp, updatedat) \
                 VALUES ($1, $2, now()) \
                 ON CONFLICT (resourcetype) DO UPDATE SET \
                 lastprocessedtimestamp = EXCLUDED.lastprocessedtimestamp, updatedat = EXCLUDED.updatedat",
                &[&resource, &timestamp],
            )
            .await?;
        Ok(())
    }
}
