mod checkpoint;
mod cli;
mod coordinator;
mod db;
mod dedup;
mod descriptor;
mod fetcher;
mod normalize;
mod scheduler;
mod slice;
mod upserter;

#[cfg(test)]
mod testing;

use std::sync::{
    atomic::{
        AtomicBool,
        Ordering,
    },
    Arc,
};

use chrono::{
    DateTime,
    TimeZone,
    Utc,
};
use checkpoint::PostgresCheckpointStore;
use clap::Parser;
use cli::Cli;
use coordinator::SyncCoordinator;
use descriptor::{
    ResourceDescriptor,
    ResourceName,
};
use fetcher::ODataPageFetcher;
use normalize::RowNormalizer;
use reso_sync_common::Config;
use upserter::PostgresUpserter;

/// Earliest timestamp the IDX/VOW walks will consider. Unlike media there is
/// no environment knob for this in spec.md §6; it only needs to predate the
/// upstream's own history.
fn listing_floor_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
}

const MEDIA_ARRAY_FIELDS: &[&str] = &["MediaURL", "MediaCategory"];

fn build_descriptor(name: ResourceName, config: &Config) -> ResourceDescriptor {
    match name {
        ResourceName::Idx => ResourceDescriptor::idx(config.idx_base_url.clone(), config.idx_token.clone(), listing_floor_date()),
        ResourceName::Vow => ResourceDescriptor::vow(config.vow_base_url.clone(), config.vow_token.clone(), listing_floor_date()),
        ResourceName::Media => {
            ResourceDescriptor::media(config.media_base_url.clone(), config.idx_token.clone(), config.media_sync_start_date)
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    reso_sync_common::log::init(config.debug);

    let cli = Cli::parse();

    let client = db::connect(&config.database_url).await?;
    db::ensure_schema(&client).await?;

    let fetcher = ODataPageFetcher::new(Config::REQUEST_TIMEOUT)?;
    let normalizer = RowNormalizer::new(MEDIA_ARRAY_FIELDS);
    let upserter = PostgresUpserter::new(client.clone());
    let checkpoint_store = PostgresCheckpointStore::new(client.clone());

    let cancelled = Arc::new(AtomicBool::new(false));
    {
        let cancelled = cancelled.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("cancellation requested, finishing the in-flight slice before stopping");
                cancelled.store(true, Ordering::SeqCst);
            }
        });
    }

    let descriptors: Vec<ResourceDescriptor> = cli
        .selected_resources()
        .into_iter()
        .map(|name| build_descriptor(name, &config))
        .collect();

    let coordinator = SyncCoordinator {
        checkpoint_store: &checkpoint_store,
        fetcher: &fetcher,
        normalizer: &normalizer,
        upserter: &upserter,
        batch_size: config.batch_size,
        fail_fast: cli.fail_fast,
    };

    let report = coordinator.run(&descriptors, cli.sync_mode(), &cancelled).await?;

    for (resource, error) in &report.failed {
        tracing::error!(resource = %resource, error = %error, "resource sync did not complete");
    }

    if report.all_succeeded() || !cli.fail_fast {
        Ok(())
    } else {
        std::process::exit(1)
    }
}
