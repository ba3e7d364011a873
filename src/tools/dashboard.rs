//! Daily progress dashboard
//!
//! Combines the user's profile, today's consumption and the calculated
//! targets into one view.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::db::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{food_log, ConsumedTotals, DiabetesDetails, DiabeticType, HealthProfile, User};
use crate::nutrition::{
    age_on, compute_targets, ActivityLevel, CalcError, Gender, NutrientProgress, OverallProgress,
    PhysiologicalProfile,
};

/// The parts of a user the dashboard needs
#[derive(Debug, Clone, PartialEq)]
pub struct UserSnapshot {
    pub name: String,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub diabetic_type: Option<DiabeticType>,
}

/// Read access to the data behind a dashboard
pub trait HealthDataSource {
    fn user(&self, user_id: i64) -> ServiceResult<UserSnapshot>;

    fn health_profile(&self, user_id: i64) -> ServiceResult<HealthProfile>;

    /// Zeros when nothing was logged that day
    fn consumed_totals(&self, user_id: i64, day: NaiveDate) -> ServiceResult<ConsumedTotals>;
}

impl HealthDataSource for Database {
    fn user(&self, user_id: i64) -> ServiceResult<UserSnapshot> {
        let conn = self.get_conn()?;
        let user = User::get_by_id(&conn, user_id)?
            .ok_or_else(|| ServiceError::not_found("User", user_id))?;

        let diabetic_type = match HealthProfile::get_by_user(&conn, user_id)? {
            Some(profile) if profile.is_diabetic => {
                DiabetesDetails::get_by_profile(&conn, profile.id)?.map(|d| d.diabetic_type)
            }
            _ => None,
        };

        Ok(UserSnapshot {
            name: user.name,
            gender: user.gender,
            date_of_birth: user.date_of_birth,
            diabetic_type,
        })
    }

    fn health_profile(&self, user_id: i64) -> ServiceResult<HealthProfile> {
        let conn = self.get_conn()?;
        HealthProfile::get_by_user(&conn, user_id)?
            .ok_or_else(|| ServiceError::not_found("Health profile", user_id))
    }

    fn consumed_totals(&self, user_id: i64, day: NaiveDate) -> ServiceResult<ConsumedTotals> {
        let conn = self.get_conn()?;
        Ok(food_log::daily_totals(&conn, user_id, day)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressBreakdown {
    pub calories: NutrientProgress,
    pub carbs: NutrientProgress,
    pub sugar: NutrientProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardUser {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diabetes_type: Option<DiabeticType>,
    pub diabetes: bool,
}

/// Response for get_daily_progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyProgressResponse {
    pub progress: ProgressBreakdown,
    pub status: OverallProgress,
    pub user: DashboardUser,
}

/// Assemble the dashboard for `user_id` on `today`
pub fn build_dashboard<S>(source: &S, user_id: i64, today: NaiveDate) -> ServiceResult<DailyProgressResponse>
where
    S: HealthDataSource + ?Sized,
{
    let user = source.user(user_id)?;
    let profile = source.health_profile(user_id)?;

    let gender = Gender::parse(user.gender.as_deref().ok_or(CalcError::MissingField("gender"))?)?;
    let date_of_birth = user.date_of_birth.ok_or(CalcError::MissingField("date_of_birth"))?;

    let physiology = PhysiologicalProfile {
        gender,
        weight_kg: profile.weight_kg,
        height_cm: profile.height_cm,
        age_years: age_on(date_of_birth, today)?,
        activity_level: ActivityLevel::parse(&profile.activity_level)?,
        is_diabetic: profile.is_diabetic,
    };
    let targets = compute_targets(&physiology)?;

    let consumed = source.consumed_totals(user_id, today)?;
    debug!(
        "Dashboard for user {} on {}: targets {:?}, consumed {:?}",
        user_id, today, targets, consumed
    );

    let progress = ProgressBreakdown {
        calories: NutrientProgress::evaluate(consumed.total_calories, targets.calories),
        carbs: NutrientProgress::evaluate(consumed.total_carbs, targets.carbs_g),
        sugar: NutrientProgress::evaluate(consumed.total_sugar, targets.sugar_g),
    };
    let status = OverallProgress::from_parts(
        progress.calories.satisfaction,
        progress.carbs.satisfaction,
        progress.sugar.satisfaction,
    );

    Ok(DailyProgressResponse {
        progress,
        status,
        user: DashboardUser {
            name: user.name,
            diabetes_type: if profile.is_diabetic { user.diabetic_type } else { None },
            diabetes: profile.is_diabetic,
        },
    })
}
