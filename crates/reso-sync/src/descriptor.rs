use std::fmt::Display;

use chrono::{
    DateTime,
    Utc,
};
use url::Url;

/// Which of the three logical resource streams a descriptor refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum ResourceName {
    Idx,
    Vow,
    Media,
}

impl Display for ResourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceName::Idx => "IDX",
            ResourceName::Vow => "VOW",
            ResourceName::Media => "MEDIA",
        };
        f.write_str(s)
    }
}

impl ResourceName {
    /// Cross-resource ordering when all three are selected (spec.md §5):
    /// IDX → VOW → MEDIA.
    pub fn run_order() -> [ResourceName; 3] {
        [ResourceName::Idx, ResourceName::Vow, ResourceName::Media]
    }

    /// The sync_log row key for this resource's checkpoint.
    pub fn checkpoint_key(&self) -> &'static str {
        match self {
            ResourceName::Idx => "idx",
            ResourceName::Vow => "vow",
            ResourceName::Media => "media",
        }
    }
}

/// Static, per-stream configuration consumed by the window scheduler and
/// slice executor. Built once per resource at the start of a sync run
/// (spec.md §3).
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    pub name: ResourceName,
    pub endpoint: Url,
    pub credential: String,
    /// Field used for window predicates and ordering:
    /// `ModificationTimestamp` for IDX/VOW, `MediaModificationTimestamp` for
    /// media.
    pub timestamp_field: &'static str,
    /// Alternate timestamp fields tried, in order, when `timestamp_field`
    /// is absent on a record (spec.md §4.E).
    pub timestamp_field_fallbacks: &'static [&'static str],
    /// Column(s) defining row identity for conflict resolution and dedup.
    pub conflict_key: &'static [&'static str],
    pub floor_date: DateTime<Utc>,
    pub table: &'static str,
    /// Media and VOW are known to exceed the paging cap in aggregate
    /// (spec.md §4.F); this skips the optimistic single-predicate attempt
    /// in full-sync mode and defaults window width to 7 days.
    pub high_cardinality: bool,
}

impl ResourceDescriptor {
    pub fn idx(endpoint: Url, credential: String, floor_date: DateTime<Utc>) -> Self {
        ResourceDescriptor {
            name: ResourceName::Idx,
            endpoint,
            credential,
            timestamp_field: "ModificationTimestamp",
            timestamp_field_fallbacks: &["PhotosChangeTimestamp", "CreationTimestamp"],
            conflict_key: &["ListingKey"],
            floor_date,
            table: "property",
            high_cardinality: false,
        }
    }

    pub fn vow(endpoint: Url, credential: String, floor_date: DateTime<Utc>) -> Self {
        ResourceDescriptor {
            name: ResourceName::Vow,
            endpoint,
            credential,
            timestamp_field: "ModificationTimestamp",
            timestamp_field_fallbacks: &["PhotosChangeTimestamp", "CreationTimestamp"],
            conflict_key: &["ListingKey"],
            floor_date,
            table: "property",
            high_cardinality: true,
        }
    }

    pub fn media(endpoint: Url, credential: String, floor_date: DateTime<Utc>) -> Self {
        ResourceDescriptor {
            name: ResourceName::Media,
            endpoint,
            credential,
            timestamp_field: "MediaModificationTimestamp",
            timestamp_field_fallbacks: &["ModificationTimestamp"],
            conflict_key: &["ResourceRecordKey", "MediaKey"],
            floor_date,
            table: "media",
            high_cardinality: true,
        }
    }

    /// Default window width for the backward walk (spec.md §4.F): 30 days
    /// for listings, 7 days for media, 7 days for any stream whose known
    /// cardinality exceeds 1,000,000 (subsumed here by `high_cardinality`
    /// since both media and VOW are flagged that way).
    pub fn default_window_width(&self) -> chrono::Duration {
        if self.high_cardinality || self.name == ResourceName::Media {
            chrono::Duration::days(7)
        } else {
            chrono::Duration::days(30)
        }
    }
}
