//! ML inference API
//!
//! Diabetes risk prediction, food and exercise recommendations, and food
//! detection on uploaded images.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{read_json, RetryPolicy, UpstreamError};

const SERVICE: &str = "ml-api";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RiskPredictionRequest {
    pub age: u32,
    pub gender: String,
    pub bmi: f64,
    pub smoking_history: String,
    pub heart_disease: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RiskPrediction {
    pub percentage: f64,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RecommendedFood {
    pub name: String,
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub carbohydrate: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub proteins: f64,
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Deserialize)]
struct FoodRecommendationResponse {
    #[serde(default)]
    food_recommendation: Vec<Vec<RecommendedFood>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExerciseRequest {
    pub gender: String,
    pub age: u32,
    pub height: f64,
    pub diabetes: bool,
    pub bmi: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ExerciseRecommendation {
    #[serde(default)]
    pub calories_burned: f64,
    #[serde(default)]
    pub exercise_duration: f64,
    #[serde(default)]
    pub exercise_categories: Vec<String>,
}

/// One object found on a scanned image
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DetectedFood {
    pub name: String,
    #[serde(default = "default_unit")]
    pub unit: i64,
}

fn default_unit() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
struct ScanResponse {
    #[serde(default)]
    objects: Vec<DetectedFood>,
}

#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn predict_diabetes_risk(&self, request: &RiskPredictionRequest) -> Result<RiskPrediction, UpstreamError>;

    /// Recommendations come grouped in lists (one per meal suggestion)
    async fn food_recommendations(&self, risk_percentage: f64) -> Result<Vec<Vec<RecommendedFood>>, UpstreamError>;

    async fn exercise_recommendations(&self, request: &ExerciseRequest) -> Result<ExerciseRecommendation, UpstreamError>;

    async fn scan_food(&self, image_url: &str) -> Result<Vec<DetectedFood>, UpstreamError>;
}

/// HTTP client for the SweetLife ML service
#[derive(Debug, Clone)]
pub struct MlApiClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl MlApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, retry: RetryPolicy) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            retry,
        })
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, UpstreamError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);
        debug!("POST {}", url);

        self.retry
            .run(SERVICE, || {
                let request = self.client.post(&url).json(body);
                async move {
                    let resp = request
                        .send()
                        .await
                        .map_err(|e| UpstreamError::transport(SERVICE, e))?;
                    read_json(SERVICE, resp).await
                }
            })
            .await
    }
}

#[async_trait]
impl InferenceService for MlApiClient {
    async fn predict_diabetes_risk(&self, request: &RiskPredictionRequest) -> Result<RiskPrediction, UpstreamError> {
        self.post_json("diabetes_predict", request).await
    }

    async fn food_recommendations(&self, risk_percentage: f64) -> Result<Vec<Vec<RecommendedFood>>, UpstreamError> {
        let body = serde_json::json!({ "diabetes_percentage": risk_percentage });
        let resp: FoodRecommendationResponse = self.post_json("food_recommendation", &body).await?;
        Ok(resp.food_recommendation)
    }

    async fn exercise_recommendations(&self, request: &ExerciseRequest) -> Result<ExerciseRecommendation, UpstreamError> {
        self.post_json("exercise_recommendation", request).await
    }

    async fn scan_food(&self, image_url: &str) -> Result<Vec<DetectedFood>, UpstreamError> {
        let body = serde_json::json!({ "image": image_url });
        let resp: ScanResponse = self.post_json("scan-food", &body).await?;
        Ok(resp.objects)
    }
}
