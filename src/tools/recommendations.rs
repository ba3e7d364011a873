//! Food and exercise recommendation tools

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::db::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::external::{ExerciseRequest, InferenceService};
use crate::models::{HealthProfile, RiskAssessment, User};
use crate::nutrition::{age_on, Gender};

/// Risk score used for users without an assessment (diabetic, or never predicted)
const DEFAULT_RISK_SCORE: f64 = 100.0;

/// Known exercise categories: (name, description)
const EXERCISES: &[(&str, &str)] = &[
    ("Squats", "A strength training exercise involving the thighs, hips, and buttocks muscles. Squats help improve lower body strength and core stability."),
    ("Deadlifts", "A weightlifting exercise where you lift a weight from the floor to your hips. Deadlifts strengthen the lower back, thighs, buttocks, and upper back muscles."),
    ("Bench presses", "A strength exercise using a barbell or dumbbells, typically performed while lying on a bench. It focuses on strengthening the chest, shoulders, and triceps."),
    ("Overhead presses", "A weightlifting exercise where you push a weight overhead from your shoulders. It helps train the shoulder muscles, triceps, and core stability."),
    ("Yoga", "A physical and mental practice combining body postures, breathing techniques, and meditation. Yoga improves flexibility, balance, strength, and reduces stress."),
    ("Brisk walking", "A fast-paced walk aimed at increasing heart rate. It's beneficial for heart health, calorie burning, and general fitness."),
    ("Cycling", "An activity involving pedaling a bicycle that works the leg muscles, strengthens cardiovascular health, and burns calories. It can be done outdoors or on a stationary bike."),
    ("Swimming", "A water sport that involves almost all the body's muscles. It helps improve endurance, breathing techniques, and protects joints due to low impact."),
    ("Running", "A cardiovascular exercise that helps improve heart health, endurance, and burns a significant amount of calories."),
    ("Dancing", "A physical activity involving rhythmic body movements to music. It's great for fitness, coordination, and mood improvement."),
    ("Walking", "A light activity that can be done by anyone. It helps improve blood circulation, reduce stress, and maintain heart health."),
];

#[derive(Debug, Serialize)]
pub struct RecommendationDetails {
    pub calories: String,
    pub carbohydrate: String,
    pub fat: String,
    pub proteins: String,
}

#[derive(Debug, Serialize)]
pub struct FoodRecommendation {
    pub name: String,
    pub details: RecommendationDetails,
    pub image: String,
}

/// Response for get_food_recommendations
#[derive(Debug, Serialize)]
pub struct FoodRecommendationsResponse {
    pub risk_score: f64,
    pub food_recommendation: Vec<FoodRecommendation>,
}

/// Foods suited to the user's stored risk score
pub async fn get_food_recommendations(
    db: &Database,
    inference: &dyn InferenceService,
    user_id: i64,
) -> ServiceResult<FoodRecommendationsResponse> {
    let assessment = db.with_conn(|conn| {
        if User::get_by_id(conn, user_id)?.is_none() {
            return Ok(None);
        }
        RiskAssessment::get_by_user(conn, user_id).map(Some)
    })?;
    let Some(assessment) = assessment else {
        return Err(ServiceError::not_found("User", user_id));
    };

    let risk_score = assessment.map(|a| a.risk_score).unwrap_or(DEFAULT_RISK_SCORE);
    debug!("Food recommendations for user {} at risk {}", user_id, risk_score);

    let groups = inference.food_recommendations(risk_score).await?;
    let food_recommendation = groups
        .into_iter()
        .flatten()
        .map(|food| FoodRecommendation {
            details: RecommendationDetails {
                calories: format!("{:.2} kcal", food.calories),
                carbohydrate: format!("{:.2} g", food.carbohydrate),
                fat: format!("{:.2} g", food.fat),
                proteins: format!("{:.2} g", food.proteins),
            },
            name: food.name,
            image: food.image,
        })
        .collect();

    Ok(FoodRecommendationsResponse {
        risk_score,
        food_recommendation,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExerciseItem {
    pub name: String,
    pub desc: String,
    pub image: String,
}

/// Response for get_exercise_recommendations
#[derive(Debug, Serialize)]
pub struct ExerciseRecommendationsResponse {
    pub calories_burned: f64,
    pub exercise_duration: f64,
    pub exercise_list: Vec<ExerciseItem>,
}

/// Describe a category from the model; unknown categories keep only their name
fn describe_exercise(name: &str, asset_base_url: &str) -> ExerciseItem {
    match EXERCISES.iter().find(|(known, _)| *known == name) {
        Some((known, desc)) => ExerciseItem {
            name: known.to_string(),
            desc: desc.to_string(),
            image: format!("{}/exercise/{}.jpg", asset_base_url, known.replace(' ', "%20")),
        },
        None => ExerciseItem {
            name: name.to_string(),
            desc: String::new(),
            image: String::new(),
        },
    }
}

pub async fn get_exercise_recommendations(
    db: &Database,
    inference: &dyn InferenceService,
    user_id: i64,
    asset_base_url: &str,
    today: NaiveDate,
) -> ServiceResult<ExerciseRecommendationsResponse> {
    let (user, profile) = db.with_conn(|conn| {
        Ok((User::get_by_id(conn, user_id)?, HealthProfile::get_by_user(conn, user_id)?))
    })?;
    let user = user.ok_or_else(|| ServiceError::not_found("User", user_id))?;
    let profile = profile.ok_or_else(|| ServiceError::not_found("Health profile", user_id))?;

    let (Some(date_of_birth), Some(gender)) = (user.date_of_birth, user.gender.as_deref().and_then(Gender::from_str))
    else {
        return Err(ServiceError::invalid(
            "Please update your profile: gender and date of birth are required",
        ));
    };

    let request = ExerciseRequest {
        gender: gender.as_str().to_string(),
        age: age_on(date_of_birth, today)?,
        height: profile.height_cm,
        diabetes: profile.is_diabetic,
        bmi: profile.bmi,
    };
    let recommendation = inference.exercise_recommendations(&request).await?;

    Ok(ExerciseRecommendationsResponse {
        calories_burned: recommendation.calories_burned,
        exercise_duration: recommendation.exercise_duration,
        exercise_list: recommendation
            .exercise_categories
            .iter()
            .map(|name| describe_exercise(name, asset_base_url))
            .collect(),
    })
}
