use anyhow::Context;
use async_trait::async_trait;
use uuid::Uuid;

use super::repo_types::{Group, GroupChanges, GroupRow, NewGroup};
use crate::db::PgStore;

#[async_trait]
pub trait GroupRepo: Send + Sync {
    /// Insert the group, or refresh description and role of the one already
    /// holding `name`. Permissions of an existing group are left as edited.
    async fn ensure_group(&self, group: &NewGroup) -> anyhow::Result<Group>;
    async fn create_group(&self, group: &NewGroup) -> anyhow::Result<Group>;
    async fn find_group(&self, id: Uuid) -> anyhow::Result<Option<Group>>;
    async fn find_group_by_name(&self, name: &str) -> anyhow::Result<Option<Group>>;
    async fn list_groups(&self) -> anyhow::Result<Vec<Group>>;
    async fn update_group(&self, id: Uuid, changes: &GroupChanges) -> anyhow::Result<Option<Group>>;
    async fn delete_group(&self, id: Uuid) -> anyhow::Result<bool>;
}

const GROUP_COLUMNS: &str = "id, name, description, role, perm_note, perm_message, created_at";

#[async_trait]
impl GroupRepo for PgStore {
    async fn ensure_group(&self, group: &NewGroup) -> anyhow::Result<Group> {
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            r#"
            INSERT INTO groups (id, name, description, role, perm_note, perm_message)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO UPDATE
               SET description = EXCLUDED.description,
                   role = EXCLUDED.role
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.role.as_str())
        .bind(group.permissions.note)
        .bind(group.permissions.message)
        .fetch_one(&self.db)
        .await
        .with_context(|| format!("ensure group {}", group.name))?;
        Ok(row.into())
    }

    async fn create_group(&self, group: &NewGroup) -> anyhow::Result<Group> {
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            r#"
            INSERT INTO groups (id, name, description, role, perm_note, perm_message)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.role.as_str())
        .bind(group.permissions.note)
        .bind(group.permissions.message)
        .fetch_one(&self.db)
        .await
        .context("insert group")?;
        Ok(row.into())
    }

    async fn find_group(&self, id: Uuid) -> anyhow::Result<Option<Group>> {
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn find_group_by_name(&self, name: &str) -> anyhow::Result<Option<Group>> {
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list_groups(&self) -> anyhow::Result<Vec<Group>> {
        let rows = sqlx::query_as::<_, GroupRow>(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups ORDER BY created_at ASC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_group(
        &self,
        id: Uuid,
        changes: &GroupChanges,
    ) -> anyhow::Result<Option<Group>> {
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            r#"
            UPDATE groups
               SET name = COALESCE($2, name),
                   description = COALESCE($3, description),
                   perm_note = COALESCE($4, perm_note),
                   perm_message = COALESCE($5, perm_message)
             WHERE id = $1
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(changes.permissions.map(|p| p.note))
        .bind(changes.permissions.map(|p| p.message))
        .fetch_optional(&self.db)
        .await
        .context("update group")?;
        Ok(row.map(Into::into))
    }

    async fn delete_group(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete group")?;
        Ok(res.rows_affected() > 0)
    }
}
