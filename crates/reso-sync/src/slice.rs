use chrono::{
    DateTime,
    Utc,
};
use reso_sync_common::FetchError;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::{
    dedup::DedupSet,
    descriptor::ResourceDescriptor,
    fetcher::{
        PageFetcher,
        PageRequest,
    },
    normalize::Normalizer,
    upserter::Upserter,
};

/// Server-side paging ceiling per `$filter` query (spec.md §4.E).
const API_CAP: u32 = 100_000;

#[derive(Debug, Error)]
pub enum SliceError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("record could not be normalized: {0}")]
    Normalize(anyhow::Error),

    #[error("store write failed: {0}")]
    Store(anyhow::Error),

    /// `fail_on_cap` was set and the slice saturated the paging cap; no
    /// caller in the window scheduler currently sets `fail_on_cap`, but the
    /// contract is honored for any future caller that does.
    #[error("slice for filter `{filter}` unexpectedly saturated the paging cap")]
    UnexpectedSaturation { filter: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceResult {
    pub fetched: u64,
    /// Records newly added to the shared dedup set by this slice, not the
    /// dedup set's total size.
    pub unique: u64,
    pub upserted: u64,
    pub oldest_ts: Option<DateTime<Utc>>,
    pub latest_ts: Option<DateTime<Utc>>,
    pub hit_limit: bool,
}

fn record_timestamp(record: &JsonValue, descriptor: &ResourceDescriptor) -> Option<DateTime<Utc>> {
    std::iter::once(descriptor.timestamp_field)
        .chain(descriptor.timestamp_field_fallbacks.iter().copied())
        .find_map(|field| {
            let value = record.get(field)?.as_str()?;
            DateTime::parse_from_rfc3339(value).ok()
        })
        .map(|dt| dt.with_timezone(&Utc))
}

/// Component E: fetches all pages of one `(filter, ordering)` slice,
/// detecting cap saturation, deduplicating against the run-wide dedup set,
/// and upserting accepted rows in per-page batches (spec.md §4.E).
pub async fn run_slice(
    descriptor: &ResourceDescriptor,
    filter: &str,
    dedup_set: &mut DedupSet,
    fail_on_cap: bool,
    fetcher: &dyn PageFetcher,
    normalizer: &dyn Normalizer,
    upserter: &dyn Upserter,
    batch_size: u32,
) -> Result<SliceResult, SliceError> {
    let mut skip: u32 = 0;
    let mut hit_limit = false;
    let mut fetched: u64 = 0;
    let mut unique_added: u64 = 0;
    let mut upserted: u64 = 0;
    let mut oldest_ts: Option<DateTime<Utc>> = None;
    let mut latest_ts: Option<DateTime<Utc>> = None;

    loop {
        if skip >= API_CAP {
            hit_limit = true;
            break;
        }

        let request = PageRequest {
            endpoint: &descriptor.endpoint,
            credential: &descriptor.credential,
            top: batch_size,
            skip,
            filter,
            orderby: None,
        };

        let page = match fetcher.fetch_page(request).await {
            Ok(page) => page,
            Err(FetchError::CapExceeded) => {
                hit_limit = true;
                if fail_on_cap {
                    return Err(SliceError::UnexpectedSaturation {
                        filter: filter.to_string(),
                    });
                }
                break;
            },
            Err(other) => return Err(SliceError::Fetch(other)),
        };

        let page_len = page.value.len();
        fetched += page_len as u64;

        let mut accepted_rows = Vec::with_capacity(page_len);
        for record in &page.value {
            if let Some(ts) = record_timestamp(record, descriptor) {
                oldest_ts = Some(oldest_ts.map_or(ts, |o| o.min(ts)));
                latest_ts = Some(latest_ts.map_or(ts, |l| l.max(ts)));
            }

            let identity = DedupSet::identity(record, descriptor.conflict_key);
            if !dedup_set.insert(identity) {
                continue;
            }
            unique_added += 1;

            let row = normalizer.normalize(record).map_err(SliceError::Normalize)?;
            accepted_rows.push(row);
        }

        if !accepted_rows.is_empty() {
            let affected = upserter
                .upsert(descriptor.table, accepted_rows, descriptor.conflict_key)
                .await
                .map_err(SliceError::Store)?;
            upserted += affected;
        }

        if (page_len as u32) < batch_size {
            break;
        }

        skip += page_len as u32;
        if skip >= API_CAP {
            hit_limit = true;
            break;
        }
    }

    Ok(SliceResult {
        fetched,
        unique: unique_added,
        upserted,
        oldest_ts,
        latest_ts,
        hit_limit,
    })
}
