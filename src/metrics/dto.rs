use serde::{Deserialize, Serialize};
use time::Date;

use super::repo_types::{BodyMetric, Measurements};

#[derive(Debug, Deserialize)]
pub struct CreateMetricRequest {
    #[serde(with = "crate::dates")]
    pub measured_on: Date,
    #[serde(flatten)]
    pub measurements: Measurements,
    pub analysis: Option<String>,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNoteRequest {
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Serialize)]
pub struct LatestWithPrevious {
    pub latest: Option<BodyMetric>,
    pub previous: Option<BodyMetric>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeImageRequest {
    #[serde(alias = "imageBase64")]
    pub image_base64: String,
    pub fullname: Option<String>,
    pub gender: Option<String>,
    pub height: Option<f64>,
    pub age: Option<u32>,
    /// Overrides the built-in scan prompt.
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeImageResponse {
    pub model: String,
    pub text: String,
}
