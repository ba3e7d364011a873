//! Health profile tools
//!
//! A profile holds body measurements and diabetes status. Diabetic profiles
//! carry diabetes details; non-diabetic profiles carry a predicted risk
//! assessment instead.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::db::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::external::{InferenceService, RiskPrediction, RiskPredictionRequest, UpstreamError};
use crate::models::{
    DiabetesDetails, DiabetesDetailsWrite, DiabeticType, HealthProfile, HealthProfileWrite,
    RiskAssessment, SmokingHistory, User,
};
use crate::nutrition::{age_on, compute_bmi, ActivityLevel, CalcError, Gender, RiskLevel};

/// Input for create_health_profile and update_health_profile
#[derive(Debug, Clone)]
pub struct HealthProfileRequest {
    pub height_cm: f64,
    pub weight_kg: f64,
    pub is_diabetic: bool,
    pub smoking_history: String,
    pub has_heart_disease: bool,
    pub activity_level: String,
    pub diabetic_type: Option<String>,
    pub insulin_level: Option<f64>,
    pub blood_pressure: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DiabetesDetailsView {
    pub diabetic_type: DiabeticType,
    pub insulin_level: f64,
    pub blood_pressure: i64,
}

#[derive(Debug, Serialize)]
pub struct DiabetesPredictionView {
    pub risk_percentage: f64,
    pub risk_level: RiskLevel,
    pub note: String,
}

/// Response for the health profile tools
#[derive(Debug, Serialize)]
pub struct HealthProfileResponse {
    pub user_id: i64,
    pub height: f64,
    pub weight: f64,
    pub bmi: f64,
    pub is_diabetic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diabetes_details: Option<DiabetesDetailsView>,
    pub smoking_history: SmokingHistory,
    pub has_heart_disease: bool,
    pub activity_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diabetes_prediction: Option<DiabetesPredictionView>,
    pub updated_at: String,
}

/// Validated request, ready to write
struct ProfilePlan {
    profile: HealthProfileWrite,
    diabetes: Option<DiabetesDetailsWrite>,
}

fn plan(req: &HealthProfileRequest) -> ServiceResult<ProfilePlan> {
    for (field, value) in [("height", req.height_cm), ("weight", req.weight_kg)] {
        if !value.is_finite() || value <= 0.0 {
            return Err(ServiceError::invalid(format!("{} must be greater than zero", field)));
        }
    }

    let activity_level = ActivityLevel::from_str(&req.activity_level).ok_or_else(|| {
        ServiceError::invalid(format!(
            "Invalid activity_level: '{}'. Use sedentary, light, moderate, active or extremely-active",
            req.activity_level
        ))
    })?;

    let diabetes = if req.is_diabetic {
        let raw_type = req
            .diabetic_type
            .as_deref()
            .ok_or_else(|| ServiceError::invalid("diabetic_type is required for a diabetic profile"))?;
        let diabetic_type = DiabeticType::from_str(raw_type).ok_or_else(|| {
            ServiceError::invalid(format!(
                "Invalid diabetic_type: '{}'. Use type1, type2 or gestational",
                raw_type
            ))
        })?;
        let insulin_level = req.insulin_level.unwrap_or(0.0);
        let blood_pressure = req.blood_pressure.unwrap_or(0);
        if !insulin_level.is_finite() || insulin_level < 0.0 || blood_pressure < 0 {
            return Err(ServiceError::invalid("insulin_level and blood_pressure cannot be negative"));
        }
        Some(DiabetesDetailsWrite {
            diabetic_type,
            insulin_level,
            blood_pressure,
        })
    } else {
        None
    };

    Ok(ProfilePlan {
        profile: HealthProfileWrite {
            height_cm: req.height_cm,
            weight_kg: req.weight_kg,
            bmi: compute_bmi(req.weight_kg, req.height_cm)?,
            is_diabetic: req.is_diabetic,
            smoking_history: SmokingHistory::from_str(&req.smoking_history),
            has_heart_disease: req.has_heart_disease,
            activity_level,
        },
        diabetes,
    })
}

/// Ask the model for a risk score; only non-diabetic profiles get one
async fn predict_risk(
    inference: &dyn InferenceService,
    user: &User,
    profile: &HealthProfileWrite,
    today: NaiveDate,
) -> ServiceResult<Option<RiskPrediction>> {
    if profile.is_diabetic {
        return Ok(None);
    }

    let gender = Gender::parse(user.gender.as_deref().ok_or(CalcError::MissingField("gender"))?)?;
    let date_of_birth = user.date_of_birth.ok_or(CalcError::MissingField("date_of_birth"))?;

    let request = RiskPredictionRequest {
        age: age_on(date_of_birth, today)?,
        gender: gender.as_str().to_string(),
        bmi: profile.bmi,
        smoking_history: profile.smoking_history.model_label().to_string(),
        heart_disease: profile.has_heart_disease,
    };
    let prediction = inference.predict_diabetes_risk(&request).await?;
    if !(0.0..=100.0).contains(&prediction.percentage) {
        return Err(UpstreamError::InvalidResponse {
            service: "ml-api",
            message: format!("risk percentage {} is outside 0-100", prediction.percentage),
        }
        .into());
    }
    info!(
        "Diabetes risk for user {}: {:.1}%",
        user.id, prediction.percentage
    );
    Ok(Some(prediction))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveMode {
    Create,
    Update,
}

async fn save_health_profile(
    db: &Database,
    inference: &dyn InferenceService,
    user_id: i64,
    req: &HealthProfileRequest,
    today: NaiveDate,
    mode: SaveMode,
) -> ServiceResult<HealthProfileResponse> {
    let plan = plan(req)?;

    let (user, existing) = db.with_conn(|conn| {
        Ok((User::get_by_id(conn, user_id)?, HealthProfile::get_by_user(conn, user_id)?))
    })?;
    let user = user.ok_or_else(|| ServiceError::not_found("User", user_id))?;
    match (mode, existing.is_some()) {
        (SaveMode::Create, true) => {
            return Err(ServiceError::invalid("Health profile already exists, use update_health_profile"))
        }
        (SaveMode::Update, false) => return Err(ServiceError::not_found("Health profile", user_id)),
        _ => {}
    }

    // Nothing is written until the prediction is in
    let prediction = predict_risk(inference, &user, &plan.profile, today).await?;

    db.with_transaction(|tx| {
        let profile = match mode {
            SaveMode::Create => HealthProfile::create(tx, user_id, &plan.profile)?,
            SaveMode::Update => HealthProfile::update(tx, user_id, &plan.profile)?
                .ok_or_else(|| ServiceError::not_found("Health profile", user_id))?,
        };

        match (&plan.diabetes, &prediction) {
            (Some(details), _) => {
                DiabetesDetails::upsert(tx, profile.id, details)?;
                RiskAssessment::delete_for_profile(tx, profile.id)?;
            }
            (None, Some(prediction)) => {
                DiabetesDetails::delete_for_profile(tx, profile.id)?;
                RiskAssessment::upsert(tx, profile.id, prediction.percentage, &prediction.note)?;
            }
            (None, None) => {
                DiabetesDetails::delete_for_profile(tx, profile.id)?;
            }
        }
        Ok::<_, ServiceError>(())
    })?;

    info!("Saved health profile for user {} ({:?})", user_id, mode);
    get_health_profile(db, user_id)
}

pub async fn create_health_profile(
    db: &Database,
    inference: &dyn InferenceService,
    user_id: i64,
    req: &HealthProfileRequest,
    today: NaiveDate,
) -> ServiceResult<HealthProfileResponse> {
    save_health_profile(db, inference, user_id, req, today, SaveMode::Create).await
}

pub async fn update_health_profile(
    db: &Database,
    inference: &dyn InferenceService,
    user_id: i64,
    req: &HealthProfileRequest,
    today: NaiveDate,
) -> ServiceResult<HealthProfileResponse> {
    save_health_profile(db, inference, user_id, req, today, SaveMode::Update).await
}

pub fn get_health_profile(db: &Database, user_id: i64) -> ServiceResult<HealthProfileResponse> {
    let conn = db.get_conn()?;
    let profile = HealthProfile::get_by_user(&conn, user_id)?
        .ok_or_else(|| ServiceError::not_found("Health profile", user_id))?;

    let diabetes_details = if profile.is_diabetic {
        DiabetesDetails::get_by_profile(&conn, profile.id)?.map(|d| DiabetesDetailsView {
            diabetic_type: d.diabetic_type,
            insulin_level: d.insulin_level,
            blood_pressure: d.blood_pressure,
        })
    } else {
        None
    };
    let diabetes_prediction = if profile.is_diabetic {
        None
    } else {
        RiskAssessment::get_by_profile(&conn, profile.id)?.map(|r| DiabetesPredictionView {
            risk_percentage: r.risk_score,
            risk_level: r.risk_level,
            note: r.note,
        })
    };

    Ok(HealthProfileResponse {
        user_id,
        height: profile.height_cm,
        weight: profile.weight_kg,
        bmi: profile.bmi,
        is_diabetic: profile.is_diabetic,
        diabetes_details,
        smoking_history: profile.smoking_history,
        has_heart_disease: profile.has_heart_disease,
        activity_level: profile.activity_level,
        diabetes_prediction,
        updated_at: profile.updated_at,
    })
}
