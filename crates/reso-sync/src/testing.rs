//! In-memory fakes for the component traits, used to exercise the slice
//! executor and window scheduler deterministically without a network or a
//! live Postgres instance. Mirrors the teacher's `FakeSource` pattern: a
//! seedable in-memory dataset that the real `fetch_page`/`upsert`/checkpoint
//! contracts are implemented against.

use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::Mutex,
};

use async_trait::async_trait;
use chrono::{
    DateTime,
    Utc,
};
use serde_json::Value as JsonValue;

use crate::{
    checkpoint::CheckpointStore,
    fetcher::{
        Page,
        PageFetcher,
        PageRequest,
    },
    normalize::Row,
    upserter::Upserter,
};

#[derive(Default)]
pub struct FakeCheckpointStore {
    checkpoints: Mutex<HashMap<String, DateTime<Utc>>>,
}

#[async_trait]
impl CheckpointStore for FakeCheckpointStore {
    async fn get(&self, resource: &str) -> anyhow::Result<Option<DateTime<Utc>>> {
        Ok(self.checkpoints.lock().unwrap().get(resource).copied())
    }

    async fn set(&self, resource: &str, timestamp: Option<DateTime<Utc>>) -> anyhow::Result<()> {
        let Some(timestamp) = timestamp else {
            return Ok(());
        };
        self.checkpoints
            .lock()
            .unwrap()
            .insert(resource.to_string(), timestamp);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeUpserter {
    pub upserted: Mutex<Vec<(String, Row)>>,
}

impl FakeUpserter {
    pub fn total_upserted(&self) -> usize {
        self.upserted.lock().unwrap().len()
    }
}

#[async_trait]
impl Upserter for FakeUpserter {
    async fn upsert(&self, table: &str, rows: Vec<Row>, _conflict_key: &[&str]) -> anyhow::Result<u64> {
        let count = rows.len() as u64;
        let mut guard = self.upserted.lock().unwrap();
        for row in rows {
            guard.push((table.to_string(), row));
        }
        Ok(count)
    }
}

#[derive(Default, Clone, Copy)]
struct Predicate {
    gt: Option<DateTime<Utc>>,
    ge: Option<DateTime<Utc>>,
    lt: Option<DateTime<Utc>>,
}

impl Predicate {
    fn matches(&self, ts: DateTime<Utc>) -> bool {
        if let Some(gt) = self.gt {
            if ts <= gt {
                return false;
            }
        }
        if let Some(ge) = self.ge {
            if ts < ge {
                return false;
            }
        }
        if let Some(lt) = self.lt {
            if ts >= lt {
                return false;
            }
        }
        true
    }
}

fn parse_filter(filter: &str) -> Predicate {
    let mut predicate = Predicate::default();
    for clause in filter.split(" and ") {
        let parts: Vec<&str> = clause.trim().splitn(3, ' ').collect();
        if parts.len() != 3 {
            continue;
        }
        let Ok(value) = DateTime::parse_from_rfc3339(parts[2]) else {
            continue;
        };
        let value = value.with_timezone(&Utc);
        match parts[1] {
            "gt" => predicate.gt = Some(value),
            "ge" => predicate.ge = Some(value),
            "lt" => predicate.lt = Some(value),
            _ => {},
        }
    }
    predicate
}

/// A seedable, in-memory stand-in for the upstream OData feed.
#[derive(Default)]
pub struct FakePageFetcher {
    state: Mutex<FakePageFetcherState>,
}

#[derive(Default)]
struct FakePageFetcherState {
    records: Vec<(DateTime<Utc>, JsonValue)>,
    /// Filter strings that should always raise `CapExceeded`, used to
    /// simulate a saturated window without materializing 100,000 fake
    /// records.
    cap_exceeded_filters: HashSet<String>,
    calls: u32,
}

impl FakePageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ts: DateTime<Utc>, key: &str, fields: JsonValue) {
        let mut row = fields;
        row.as_object_mut()
            .expect("fields must be a JSON object")
            .insert("ListingKey".to_string(), JsonValue::String(key.to_string()));
        self.state.lock().unwrap().records.push((ts, row));
    }

    pub fn mark_saturated(&self, filter: impl Into<String>) {
        self.state.lock().unwrap().cap_exceeded_filters.insert(filter.into());
    }

    pub fn call_count(&self) -> u32 {
        self.state.lock().unwrap().calls
    }
}

#[async_trait]
impl PageFetcher for FakePageFetcher {
    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page, reso_sync_common::FetchError> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;

        if state.cap_exceeded_filters.contains(request.filter) {
            return Err(reso_sync_common::FetchError::CapExceeded);
        }

        let predicate = parse_filter(request.filter);
        let mut matched: Vec<_> = state
            .records
            .iter()
            .filter(|(ts, _)| predicate.matches(*ts))
            .collect();
        matched.sort_by_key(|(ts, _)| *ts);

        let skip = request.skip as usize;
        let top = request.top as usize;
        let page: Vec<JsonValue> = matched
            .into_iter()
            .skip(skip)
            .take(top)
            .map(|(_, value)| value.clone())
            .collect();

        Ok(Page {
            value: page,
            next_link: None,
            total_count: None,
        })
    }
}
