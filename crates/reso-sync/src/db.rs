use std::sync::Arc;

use tokio_postgres::{
    Client,
    NoTls,
};

/// Opens the Postgres connection and spawns its driving connection future
/// on the runtime, matching the pattern required by `tokio-postgres`: the
/// `Client` only does anything useful while its `Connection` is polled
/// somewhere.
pub async fn connect(database_url: &str) -> anyhow::Result<Arc<Client>> {
    let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "postgres connection closed with an error");
        }
    });

    Ok(Arc::new(client))
}

/// Idempotent bootstrap for the three tables the engine writes to (spec.md
/// §6). Schema beyond the conflict-key columns is intentionally out of
/// scope; everything else lives in the `data` JSONB column.
pub async fn ensure_schema(client: &Client) -> anyhow::Result<()> {
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS property (
                \"ListingKey\" TEXT PRIMARY KEY,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE TABLE IF NOT EXISTS media (
                \"ResourceRecordKey\" TEXT NOT NULL,
                \"MediaKey\" TEXT NOT NULL,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (\"ResourceRecordKey\", \"MediaKey\")
            );
            CREATE TABLE IF NOT EXISTS sync_log (
                resourcetype TEXT PRIMARY KEY,
                lastprocessedtimestamp TIMESTAMPTZ,
                updatedat TIMESTAMPTZ NOT NULL DEFAULT now()
            );",
        )
        .await?;
    Ok(())
}
