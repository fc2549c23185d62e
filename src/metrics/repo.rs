use anyhow::Context;
use async_trait::async_trait;
use uuid::Uuid;

use super::repo_types::{BodyMetric, NewBodyMetric};
use crate::db::PgStore;

#[async_trait]
pub trait MetricRepo: Send + Sync {
    async fn insert_metric(
        &self,
        user_id: Uuid,
        metric: &NewBodyMetric,
    ) -> anyhow::Result<BodyMetric>;
    /// Newest `limit` metrics of a user by measurement date.
    async fn latest_metrics(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<BodyMetric>>;
    /// Every metric of a user, oldest measurement first.
    async fn list_metrics(&self, user_id: Uuid) -> anyhow::Result<Vec<BodyMetric>>;
    async fn find_metric(&self, id: Uuid) -> anyhow::Result<Option<BodyMetric>>;
    async fn update_note(&self, id: Uuid, note: &str) -> anyhow::Result<Option<BodyMetric>>;
}

const METRIC_COLUMNS: &str = r#"
    id, user_id, measured_on, weight_kg, body_fat_pct, mineral_kg, water_pct,
    muscle_mass_kg, physique_rating, bmr_kcal, metabolic_age, visceral_fat,
    analysis, note, created_at
"#;

#[async_trait]
impl MetricRepo for PgStore {
    async fn insert_metric(
        &self,
        user_id: Uuid,
        metric: &NewBodyMetric,
    ) -> anyhow::Result<BodyMetric> {
        let m = &metric.measurements;
        let row = sqlx::query_as::<_, BodyMetric>(&format!(
            r#"
            INSERT INTO body_metrics (
                id, user_id, measured_on, weight_kg, body_fat_pct, mineral_kg, water_pct,
                muscle_mass_kg, physique_rating, bmr_kcal, metabolic_age, visceral_fat,
                analysis, note
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {METRIC_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(metric.measured_on)
        .bind(m.weight_kg)
        .bind(m.body_fat_pct)
        .bind(m.mineral_kg)
        .bind(m.water_pct)
        .bind(m.muscle_mass_kg)
        .bind(m.physique_rating)
        .bind(m.bmr_kcal)
        .bind(m.metabolic_age)
        .bind(m.visceral_fat)
        .bind(&metric.analysis)
        .bind(&metric.note)
        .fetch_one(&self.db)
        .await
        .context("insert body metric")?;
        Ok(row)
    }

    async fn latest_metrics(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<BodyMetric>> {
        let rows = sqlx::query_as::<_, BodyMetric>(&format!(
            r#"
            SELECT {METRIC_COLUMNS}
              FROM body_metrics
             WHERE user_id = $1
             ORDER BY measured_on DESC, created_at DESC
             LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn list_metrics(&self, user_id: Uuid) -> anyhow::Result<Vec<BodyMetric>> {
        let rows = sqlx::query_as::<_, BodyMetric>(&format!(
            r#"
            SELECT {METRIC_COLUMNS}
              FROM body_metrics
             WHERE user_id = $1
             ORDER BY measured_on ASC, created_at ASC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn find_metric(&self, id: Uuid) -> anyhow::Result<Option<BodyMetric>> {
        let row = sqlx::query_as::<_, BodyMetric>(&format!(
            "SELECT {METRIC_COLUMNS} FROM body_metrics WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn update_note(&self, id: Uuid, note: &str) -> anyhow::Result<Option<BodyMetric>> {
        let row = sqlx::query_as::<_, BodyMetric>(&format!(
            "UPDATE body_metrics SET note = $2 WHERE id = $1 RETURNING {METRIC_COLUMNS}"
        ))
        .bind(id)
        .bind(note)
        .fetch_optional(&self.db)
        .await
        .context("update metric note")?;
        Ok(row)
    }
}
