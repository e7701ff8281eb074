//! # Group Service
//!
//! Family groups: persistence plus the cached forest used to scope/filter
//! inventory queries.
//!
//! ## Invalidation contract
//! - add_group: `groups:` — the forest and any other group read

use std::sync::Arc;

use tracing::info;

use crate::cache::{ReadCache, Ttl};
use crate::error::EngineResult;
use crate::keys;
use bodega_core::{build_forest, FamilyGroup, GroupForest, GroupTree};
use bodega_db::Database;

/// Service for family-group operations.
#[derive(Clone)]
pub struct GroupService {
    db: Database,
    cache: Arc<ReadCache>,
}

impl GroupService {
    /// Creates a new GroupService.
    pub fn new(db: Database, cache: Arc<ReadCache>) -> Self {
        GroupService { db, cache }
    }

    /// Adds a group and revokes cached group reads.
    pub async fn add_group(&self, group: FamilyGroup) -> EngineResult<FamilyGroup> {
        self.db.groups().insert(&group).await?;
        self.cache.invalidate_prefix(&keys::groups_prefix()).await;

        info!(group_id = group.id, name = %group.name, "Family group added");
        Ok(group)
    }

    /// The assembled forest. Cache-first (long TTL; groups rarely change).
    ///
    /// A build failure (cycle, duplicate id) propagates and caches nothing,
    /// so a later read re-checks the stored rows.
    pub async fn forest(&self) -> EngineResult<GroupForest> {
        self.cache
            .get_or_insert_with(&keys::groups_forest(), Ttl::Long, || async {
                let groups = self.db.groups().list().await?;
                build_forest(groups).map_err(Into::into)
            })
            .await
    }

    /// The forest rendered as nested trees (for API responses).
    pub async fn trees(&self) -> EngineResult<Vec<GroupTree>> {
        Ok(self.forest().await?.to_trees())
    }

    /// Subtree ids of one group (the group itself included): the scoping set
    /// for "stock in this department" queries.
    pub async fn scope_ids(&self, group_id: i64) -> EngineResult<Vec<i64>> {
        Ok(self.forest().await?.descendant_ids(group_id))
    }
}
