//! In-process store used with `STORE_BACKEND=memory` and by the test suite.

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    chat::{
        repo::MessageRepo,
        repo_types::{ConversationFilter, Message, NewMessage, Page},
    },
    groups::{
        repo::GroupRepo,
        repo_types::{Group, GroupChanges, NewGroup, Permissions, Role},
    },
    metrics::{
        repo::MetricRepo,
        repo_types::{BodyMetric, NewBodyMetric},
    },
    users::{
        repo::UserRepo,
        repo_types::{NewUser, User, UserChanges},
    },
};

#[derive(Default)]
struct Tables {
    groups: Vec<Group>,
    users: Vec<User>,
    metrics: Vec<BodyMetric>,
    messages: Vec<Message>,
}

impl Tables {
    /// Refreshes the group-derived fields, mirroring the SQL join.
    fn joined(&self, user: &User) -> User {
        let group = user
            .group_id
            .and_then(|gid| self.groups.iter().find(|g| g.id == gid));
        User {
            group_name: group.map(|g| g.name.clone()),
            role: group.map(|g| g.role).unwrap_or(Role::Member),
            permissions: group.map(|g| g.permissions).unwrap_or_default(),
            ..user.clone()
        }
    }

    fn new_user(&self, user: &NewUser) -> User {
        self.joined(&User {
            id: Uuid::new_v4(),
            username: user.username.clone(),
            password_hash: user.password_hash.clone(),
            fullname: user.fullname.clone(),
            birthday: user.birthday,
            height: user.height,
            gender: user.gender.clone(),
            avatar: None,
            group_id: user.group_id,
            group_name: None,
            role: Role::Member,
            permissions: Permissions::default(),
            created_at: OffsetDateTime::now_utc(),
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GroupRepo for MemoryStore {
    async fn ensure_group(&self, group: &NewGroup) -> anyhow::Result<Group> {
        let mut t = self.tables.write().await;
        if let Some(existing) = t.groups.iter_mut().find(|g| g.name == group.name) {
            existing.description = group.description.clone();
            existing.role = group.role;
            return Ok(existing.clone());
        }
        let created = Group {
            id: Uuid::new_v4(),
            name: group.name.clone(),
            description: group.description.clone(),
            role: group.role,
            permissions: group.permissions,
            created_at: OffsetDateTime::now_utc(),
        };
        t.groups.push(created.clone());
        Ok(created)
    }

    async fn create_group(&self, group: &NewGroup) -> anyhow::Result<Group> {
        let mut t = self.tables.write().await;
        anyhow::ensure!(
            !t.groups.iter().any(|g| g.name == group.name),
            "group {} already exists",
            group.name
        );
        let created = Group {
            id: Uuid::new_v4(),
            name: group.name.clone(),
            description: group.description.clone(),
            role: group.role,
            permissions: group.permissions,
            created_at: OffsetDateTime::now_utc(),
        };
        t.groups.push(created.clone());
        Ok(created)
    }

    async fn find_group(&self, id: Uuid) -> anyhow::Result<Option<Group>> {
        let t = self.tables.read().await;
        Ok(t.groups.iter().find(|g| g.id == id).cloned())
    }

    async fn find_group_by_name(&self, name: &str) -> anyhow::Result<Option<Group>> {
        let t = self.tables.read().await;
        Ok(t.groups.iter().find(|g| g.name == name).cloned())
    }

    async fn list_groups(&self) -> anyhow::Result<Vec<Group>> {
        Ok(self.tables.read().await.groups.clone())
    }

    async fn update_group(
        &self,
        id: Uuid,
        changes: &GroupChanges,
    ) -> anyhow::Result<Option<Group>> {
        let mut t = self.tables.write().await;
        let Some(group) = t.groups.iter_mut().find(|g| g.id == id) else {
            return Ok(None);
        };
        if let Some(name) = &changes.name {
            group.name = name.clone();
        }
        if let Some(description) = &changes.description {
            group.description = Some(description.clone());
        }
        if let Some(permissions) = changes.permissions {
            group.permissions = permissions;
        }
        Ok(Some(group.clone()))
    }

    async fn delete_group(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut t = self.tables.write().await;
        let before = t.groups.len();
        t.groups.retain(|g| g.id != id);
        let removed = t.groups.len() != before;
        if removed {
            for u in t.users.iter_mut().filter(|u| u.group_id == Some(id)) {
                u.group_id = None;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn create_user(&self, user: &NewUser) -> anyhow::Result<User> {
        let mut t = self.tables.write().await;
        anyhow::ensure!(
            !t.users.iter().any(|u| u.username == user.username),
            "username {} already exists",
            user.username
        );
        let created = t.new_user(user);
        t.users.push(created.clone());
        Ok(created)
    }

    async fn ensure_user(&self, user: &NewUser) -> anyhow::Result<User> {
        let mut t = self.tables.write().await;
        if let Some(existing) = t.users.iter().find(|u| u.username == user.username) {
            return Ok(t.joined(existing));
        }
        let created = t.new_user(user);
        t.users.push(created.clone());
        Ok(created)
    }

    async fn upsert_user(&self, user: &NewUser) -> anyhow::Result<User> {
        let mut t = self.tables.write().await;
        if let Some(idx) = t.users.iter().position(|u| u.username == user.username) {
            let existing = &mut t.users[idx];
            existing.password_hash = user.password_hash.clone();
            existing.fullname = user.fullname.clone();
            existing.birthday = user.birthday;
            existing.height = user.height;
            existing.gender = user.gender.clone();
            existing.group_id = user.group_id;
            let updated = t.joined(&t.users[idx]);
            return Ok(updated);
        }
        let created = t.new_user(user);
        t.users.push(created.clone());
        Ok(created)
    }

    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.id == id).map(|u| t.joined(u)))
    }

    async fn find_user_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users
            .iter()
            .find(|u| u.username == username)
            .map(|u| t.joined(u)))
    }

    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        let t = self.tables.read().await;
        Ok(t.users.iter().map(|u| t.joined(u)).collect())
    }

    async fn update_user(&self, id: Uuid, changes: &UserChanges) -> anyhow::Result<Option<User>> {
        let mut t = self.tables.write().await;
        let Some(idx) = t.users.iter().position(|u| u.id == id) else {
            return Ok(None);
        };
        let user = &mut t.users[idx];
        if let Some(fullname) = &changes.fullname {
            user.fullname = fullname.clone();
        }
        if let Some(birthday) = changes.birthday {
            user.birthday = birthday;
        }
        if let Some(height) = changes.height {
            user.height = height;
        }
        if let Some(gender) = &changes.gender {
            user.gender = gender.clone();
        }
        if let Some(group_id) = changes.group_id {
            user.group_id = Some(group_id);
        }
        Ok(Some(t.joined(&t.users[idx])))
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool> {
        let mut t = self.tables.write().await;
        match t.users.iter_mut().find(|u| u.id == id) {
            Some(u) => {
                u.password_hash = password_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_avatar(&self, id: Uuid, avatar: &str) -> anyhow::Result<Option<User>> {
        let mut t = self.tables.write().await;
        let Some(idx) = t.users.iter().position(|u| u.id == id) else {
            return Ok(None);
        };
        t.users[idx].avatar = Some(avatar.to_string());
        Ok(Some(t.joined(&t.users[idx])))
    }

    async fn delete_user(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut t = self.tables.write().await;
        let before = t.users.len();
        t.users.retain(|u| u.id != id);
        Ok(t.users.len() != before)
    }
}

#[async_trait]
impl MetricRepo for MemoryStore {
    async fn insert_metric(
        &self,
        user_id: Uuid,
        metric: &NewBodyMetric,
    ) -> anyhow::Result<BodyMetric> {
        let created = BodyMetric {
            id: Uuid::new_v4(),
            user_id,
            measured_on: metric.measured_on,
            measurements: metric.measurements.clone(),
            analysis: metric.analysis.clone(),
            note: metric.note.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.tables.write().await.metrics.push(created.clone());
        Ok(created)
    }

    async fn latest_metrics(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<BodyMetric>> {
        let mut all = self.list_metrics(user_id).await?;
        all.reverse();
        all.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(all)
    }

    async fn list_metrics(&self, user_id: Uuid) -> anyhow::Result<Vec<BodyMetric>> {
        let t = self.tables.read().await;
        let mut rows: Vec<BodyMetric> = t
            .metrics
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|x, y| (x.measured_on, x.created_at).cmp(&(y.measured_on, y.created_at)));
        Ok(rows)
    }

    async fn find_metric(&self, id: Uuid) -> anyhow::Result<Option<BodyMetric>> {
        let t = self.tables.read().await;
        Ok(t.metrics.iter().find(|m| m.id == id).cloned())
    }

    async fn update_note(&self, id: Uuid, note: &str) -> anyhow::Result<Option<BodyMetric>> {
        let mut t = self.tables.write().await;
        Ok(t.metrics.iter_mut().find(|m| m.id == id).map(|m| {
            m.note = note.to_string();
            m.clone()
        }))
    }
}

#[async_trait]
impl MessageRepo for MemoryStore {
    async fn insert_message(&self, message: &NewMessage) -> anyhow::Result<Message> {
        let created = Message {
            id: Uuid::new_v4(),
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            content: message.content.clone(),
            image: message.image.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.tables.write().await.messages.push(created.clone());
        Ok(created)
    }

    async fn conversation(
        &self,
        filter: &ConversationFilter,
        page: Page,
    ) -> anyhow::Result<Vec<Message>> {
        let t = self.tables.read().await;
        // Reverse insertion order first so equal timestamps stay newest-first.
        let mut rows: Vec<Message> = t
            .messages
            .iter()
            .rev()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        rows.sort_by(|x, y| y.created_at.cmp(&x.created_at));
        Ok(rows
            .into_iter()
            .skip(usize::try_from(page.offset).unwrap_or(0))
            .take(usize::try_from(page.limit).unwrap_or(0))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn new_user(name: &str, group_id: Option<Uuid>) -> NewUser {
        NewUser {
            username: name.into(),
            password_hash: "x".into(),
            fullname: name.to_uppercase(),
            birthday: date!(1990 - 01 - 01),
            height: 170.0,
            gender: "other".into(),
            group_id,
        }
    }

    #[tokio::test]
    async fn ensure_group_keeps_edited_permissions() {
        let store = MemoryStore::new();
        let seed = NewGroup {
            name: "Members".into(),
            description: Some("Regular members".into()),
            role: Role::Member,
            permissions: Permissions::default(),
        };
        let group = store.ensure_group(&seed).await.unwrap();
        let chat = Permissions { note: false, message: true };
        store
            .update_group(group.id, &GroupChanges { permissions: Some(chat), ..Default::default() })
            .await
            .unwrap();

        let again = store.ensure_group(&seed).await.unwrap();
        assert_eq!(again.id, group.id);
        assert_eq!(again.permissions, chat);
        assert_eq!(again.description.as_deref(), Some("Regular members"));
    }

    #[tokio::test]
    async fn users_carry_group_capabilities() {
        let store = MemoryStore::new();
        let admins = store
            .ensure_group(&NewGroup {
                name: "Administrators".into(),
                description: None,
                role: Role::Administrator,
                permissions: Permissions::ALL,
            })
            .await
            .unwrap();
        let u = store.create_user(&new_user("alice", Some(admins.id))).await.unwrap();
        assert_eq!(u.role, Role::Administrator);
        assert_eq!(u.group_name.as_deref(), Some("Administrators"));

        store.delete_group(admins.id).await.unwrap();
        let u = store.find_user(u.id).await.unwrap().unwrap();
        assert_eq!(u.role, Role::Member);
        assert_eq!(u.group_id, None);
    }

    #[tokio::test]
    async fn ensure_user_keeps_existing_record() {
        let store = MemoryStore::new();
        let first = store.ensure_user(&new_user("bot", None)).await.unwrap();
        let mut again = new_user("bot", None);
        again.fullname = "Changed".into();
        let second = store.ensure_user(&again).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.fullname, "BOT");
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn metrics_are_ordered_by_measurement_date() {
        let store = MemoryStore::new();
        let uid = Uuid::new_v4();
        for d in [date!(2024 - 02 - 01), date!(2024 - 01 - 01), date!(2024 - 03 - 01)] {
            store
                .insert_metric(
                    uid,
                    &NewBodyMetric {
                        measured_on: d,
                        measurements: Default::default(),
                        analysis: None,
                        note: String::new(),
                    },
                )
                .await
                .unwrap();
        }
        let all = store.list_metrics(uid).await.unwrap();
        assert_eq!(all.first().unwrap().measured_on, date!(2024 - 01 - 01));
        let latest = store.latest_metrics(uid, 2).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].measured_on, date!(2024 - 03 - 01));
        assert_eq!(latest[1].measured_on, date!(2024 - 02 - 01));
    }
}
