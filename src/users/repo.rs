use anyhow::Context;
use async_trait::async_trait;
use uuid::Uuid;

use super::repo_types::{NewUser, User, UserChanges, UserRow};
use crate::db::PgStore;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, user: &NewUser) -> anyhow::Result<User>;
    /// Insert unless `username` is taken; an existing user is returned untouched.
    async fn ensure_user(&self, user: &NewUser) -> anyhow::Result<User>;
    /// Insert, or overwrite every field of the user holding `username`.
    async fn upsert_user(&self, user: &NewUser) -> anyhow::Result<User>;
    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;
    async fn list_users(&self) -> anyhow::Result<Vec<User>>;
    async fn update_user(&self, id: Uuid, changes: &UserChanges) -> anyhow::Result<Option<User>>;
    async fn set_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool>;
    async fn set_avatar(&self, id: Uuid, avatar: &str) -> anyhow::Result<Option<User>>;
    async fn delete_user(&self, id: Uuid) -> anyhow::Result<bool>;
}

/// Selects a user row joined with its group from a relation aliased `u`.
const SELECT_JOINED: &str = r#"
    SELECT u.id, u.username, u.password_hash, u.fullname, u.birthday, u.height,
           u.gender, u.avatar, u.group_id, u.created_at,
           g.name AS group_name, g.role AS group_role, g.perm_note, g.perm_message
"#;

impl PgStore {
    async fn write_user(&self, insert: &str, user: &NewUser) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            WITH u AS (
                {insert}
            )
            {SELECT_JOINED}
              FROM u LEFT JOIN groups g ON g.id = u.group_id
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.fullname)
        .bind(user.birthday)
        .bind(user.height)
        .bind(&user.gender)
        .bind(user.group_id)
        .fetch_optional(&self.db)
        .await
        .with_context(|| format!("write user {}", user.username))?;
        Ok(row.map(Into::into))
    }
}

const INSERT_USER: &str = r#"
    INSERT INTO users (id, username, password_hash, fullname, birthday, height, gender, group_id)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
"#;

#[async_trait]
impl UserRepo for PgStore {
    async fn create_user(&self, user: &NewUser) -> anyhow::Result<User> {
        self.write_user(&format!("{INSERT_USER} RETURNING *"), user)
            .await?
            .context("insert user returned no row")
    }

    async fn ensure_user(&self, user: &NewUser) -> anyhow::Result<User> {
        let inserted = self
            .write_user(
                &format!("{INSERT_USER} ON CONFLICT (username) DO NOTHING RETURNING *"),
                user,
            )
            .await?;
        match inserted {
            Some(u) => Ok(u),
            None => self
                .find_user_by_username(&user.username)
                .await?
                .with_context(|| format!("user {} vanished", user.username)),
        }
    }

    async fn upsert_user(&self, user: &NewUser) -> anyhow::Result<User> {
        let sql = format!(
            r#"{INSERT_USER}
            ON CONFLICT (username) DO UPDATE
               SET password_hash = EXCLUDED.password_hash,
                   fullname = EXCLUDED.fullname,
                   birthday = EXCLUDED.birthday,
                   height = EXCLUDED.height,
                   gender = EXCLUDED.gender,
                   group_id = EXCLUDED.group_id
            RETURNING *"#
        );
        self.write_user(&sql, user)
            .await?
            .context("upsert user returned no row")
    }

    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "{SELECT_JOINED} FROM users u LEFT JOIN groups g ON g.id = u.group_id WHERE u.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn find_user_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "{SELECT_JOINED} FROM users u LEFT JOIN groups g ON g.id = u.group_id \
             WHERE u.username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "{SELECT_JOINED} FROM users u LEFT JOIN groups g ON g.id = u.group_id \
             ORDER BY u.created_at ASC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_user(&self, id: Uuid, changes: &UserChanges) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            WITH u AS (
                UPDATE users
                   SET fullname = COALESCE($2, fullname),
                       birthday = COALESCE($3, birthday),
                       height = COALESCE($4, height),
                       gender = COALESCE($5, gender),
                       group_id = COALESCE($6, group_id)
                 WHERE id = $1
                RETURNING *
            )
            {SELECT_JOINED}
              FROM u LEFT JOIN groups g ON g.id = u.group_id
            "#
        ))
        .bind(id)
        .bind(&changes.fullname)
        .bind(changes.birthday)
        .bind(changes.height)
        .bind(&changes.gender)
        .bind(changes.group_id)
        .fetch_optional(&self.db)
        .await
        .context("update user")?;
        Ok(row.map(Into::into))
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool> {
        let res = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.db)
            .await
            .context("update password")?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_avatar(&self, id: Uuid, avatar: &str) -> anyhow::Result<Option<User>> {
        let res = sqlx::query("UPDATE users SET avatar = $2 WHERE id = $1")
            .bind(id)
            .bind(avatar)
            .execute(&self.db)
            .await
            .context("update avatar")?;
        if res.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_user(id).await
    }

    async fn delete_user(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete user")?;
        Ok(res.rows_affected() > 0)
    }
}
