//! In-memory collaborators for tool tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::external::{
    DetectedFood, ExerciseRecommendation, ExerciseRequest, InferenceService, NutritionLookup,
    RecommendedFood, RiskPrediction, RiskPredictionRequest, UpstreamError,
};
use crate::models::Nutrition;

fn unavailable() -> UpstreamError {
    UpstreamError::Status {
        service: "ml-api",
        status: 503,
        body: "model offline".into(),
    }
}

/// Canned inference answers; records every request it receives
pub(crate) struct FakeInference {
    /// `None` makes risk prediction fail
    pub risk: Option<RiskPrediction>,
    pub foods: Vec<Vec<RecommendedFood>>,
    pub exercise: ExerciseRecommendation,
    pub detected: Vec<DetectedFood>,
    risk_requests: Mutex<Vec<RiskPredictionRequest>>,
    food_risk_inputs: Mutex<Vec<f64>>,
    exercise_requests: Mutex<Vec<ExerciseRequest>>,
    scanned_urls: Mutex<Vec<String>>,
}

impl FakeInference {
    pub fn with_risk(percentage: f64, note: &str) -> Self {
        Self {
            risk: Some(RiskPrediction {
                percentage,
                note: note.to_string(),
            }),
            foods: Vec::new(),
            exercise: ExerciseRecommendation {
                calories_burned: 0.0,
                exercise_duration: 0.0,
                exercise_categories: Vec::new(),
            },
            detected: Vec::new(),
            risk_requests: Mutex::new(Vec::new()),
            food_risk_inputs: Mutex::new(Vec::new()),
            exercise_requests: Mutex::new(Vec::new()),
            scanned_urls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            risk: None,
            ..Self::with_risk(0.0, "")
        }
    }

    pub fn risk_requests(&self) -> Vec<RiskPredictionRequest> {
        self.risk_requests.lock().unwrap().clone()
    }

    pub fn food_risk_inputs(&self) -> Vec<f64> {
        self.food_risk_inputs.lock().unwrap().clone()
    }

    pub fn exercise_requests(&self) -> Vec<ExerciseRequest> {
        self.exercise_requests.lock().unwrap().clone()
    }

    pub fn scanned_urls(&self) -> Vec<String> {
        self.scanned_urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceService for FakeInference {
    async fn predict_diabetes_risk(&self, request: &RiskPredictionRequest) -> Result<RiskPrediction, UpstreamError> {
        self.risk_requests.lock().unwrap().push(request.clone());
        self.risk.clone().ok_or_else(unavailable)
    }

    async fn food_recommendations(&self, risk_percentage: f64) -> Result<Vec<Vec<RecommendedFood>>, UpstreamError> {
        self.food_risk_inputs.lock().unwrap().push(risk_percentage);
        Ok(self.foods.clone())
    }

    async fn exercise_recommendations(&self, request: &ExerciseRequest) -> Result<ExerciseRecommendation, UpstreamError> {
        self.exercise_requests.lock().unwrap().push(request.clone());
        Ok(self.exercise.clone())
    }

    async fn scan_food(&self, image_url: &str) -> Result<Vec<DetectedFood>, UpstreamError> {
        self.scanned_urls.lock().unwrap().push(image_url.to_string());
        Ok(self.detected.clone())
    }
}

/// Nutrition lookup backed by a fixed table
pub(crate) struct FakeLookup {
    foods: HashMap<String, Nutrition>,
    calls: AtomicU32,
}

impl FakeLookup {
    pub fn with(name: &str, nutrition: Nutrition) -> Self {
        Self {
            foods: HashMap::from([(name.to_lowercase(), nutrition)]),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NutritionLookup for FakeLookup {
    async fn lookup(&self, name: &str) -> Result<Nutrition, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.foods
            .get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| UpstreamError::NoResult {
                service: "fooddata-central",
                query: name.to_string(),
            })
    }
}
