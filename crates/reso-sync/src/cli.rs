use clap::Parser;

use crate::{
    coordinator::SyncMode,
    descriptor::ResourceName,
};

/// Command-line surface for the ingestion engine (spec.md §6).
#[derive(Parser, Debug)]
#[command(author, version, about = "Syncs RESO/OData listing and media feeds into Postgres", long_about = None)]
pub struct Cli {
    /// Sync only the IDX (active listings) resource.
    #[arg(long, conflicts_with_all = ["vow_only", "media_only"])]
    pub idx_only: bool,

    /// Sync only the VOW (historical/closed listings) resource.
    #[arg(long, conflicts_with_all = ["idx_only", "media_only"])]
    pub vow_only: bool,

    /// Sync only the MEDIA resource.
    #[arg(long, conflicts_with_all = ["idx_only", "vow_only"])]
    pub media_only: bool,

    /// Use the checkpointed incremental strategy instead of a full
    /// date-partitioned walk.
    #[arg(long)]
    pub incremental: bool,

    /// Abort the whole run on the first resource failure instead of
    /// continuing to the next resource.
    #[arg(long)]
    pub fail_fast: bool,
}

impl Cli {
    pub fn selected_resources(&self) -> Vec<ResourceName> {
        if self.idx_only {
            return vec![ResourceName::Idx];
        }
        if self.vow_only {
            return vec![ResourceName::Vow];
        }
        if self.media_only {
            return vec![ResourceName::Media];
        }
        ResourceName::run_order().to_vec()
    }

    pub fn sync_mode(&self) -> SyncMode {
        if self.incremental {
            SyncMode::Incremental
        } else {
            SyncMode::Full
        }
    }
}
