//! # Family Group Repository
//!
//! Persistence for the flat family-group list. Assembling the forest is
//! pure logic and lives in `bodega_core::hierarchy`.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use bodega_core::FamilyGroup;

/// Repository for family group operations.
#[derive(Debug, Clone)]
pub struct GroupRepository {
    pool: SqlitePool,
}

impl GroupRepository {
    /// Creates a new GroupRepository.
    pub fn new(pool: SqlitePool) -> Self {
        GroupRepository { pool }
    }

    /// Inserts a group.
    pub async fn insert(&self, group: &FamilyGroup) -> DbResult<()> {
        debug!(id = group.id, name = %group.name, "Inserting family group");

        sqlx::query(
            r#"
            INSERT INTO family_groups (id, name, parent_group_id, marked_as_root)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(group.id)
        .bind(&group.name)
        .bind(group.parent_group_id)
        .bind(group.marked_as_root)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a group by id.
    pub async fn get(&self, id: i64) -> DbResult<Option<FamilyGroup>> {
        let group = sqlx::query_as::<_, FamilyGroup>(
            r#"
            SELECT id, name, parent_group_id, marked_as_root
            FROM family_groups
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(group)
    }

    /// Lists all groups, by id.
    pub async fn list(&self) -> DbResult<Vec<FamilyGroup>> {
        let groups = sqlx::query_as::<_, FamilyGroup>(
            r#"
            SELECT id, name, parent_group_id, marked_as_root
            FROM family_groups
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(groups)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
