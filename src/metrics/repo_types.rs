use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// Measurements taken from one body-composition scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Measurements {
    pub weight_kg: Option<f64>,
    pub body_fat_pct: Option<f64>,
    pub mineral_kg: Option<f64>,
    pub water_pct: Option<f64>,
    pub muscle_mass_kg: Option<f64>,
    pub physique_rating: Option<f64>,
    pub bmr_kcal: Option<f64>,
    pub metabolic_age: Option<f64>,
    pub visceral_fat: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BodyMetric {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "crate::dates")]
    pub measured_on: Date,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub measurements: Measurements,
    pub analysis: Option<String>,
    pub note: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewBodyMetric {
    pub measured_on: Date,
    pub measurements: Measurements,
    pub analysis: Option<String>,
    pub note: String,
}
