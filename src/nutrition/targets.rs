//! Daily nutrition targets
//!
//! Harris-Benedict BMR, activity-scaled calorie target, and the sugar and
//! carbohydrate allowances derived from it. Also BMI and age helpers used by
//! the health profile flow.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Share of daily calories allowed from sugar for diabetic users
const DIABETIC_SUGAR_SHARE: f64 = 0.05;
/// Share of daily calories allowed from sugar otherwise
const DEFAULT_SUGAR_SHARE: f64 = 0.10;
/// Share of daily calories expected from carbohydrates
const CARB_SHARE: f64 = 0.45;
/// Energy density of carbohydrates (kcal per gram)
const KCAL_PER_GRAM_CARB: f64 = 4.0;

/// Calculator precondition failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("{field} must be greater than zero (got {value})")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("Unrecognized gender: '{0}'")]
    UnknownGender(String),

    #[error("Unrecognized activity level: '{0}'")]
    UnknownActivityLevel(String),

    #[error("Profile is missing {0}")]
    MissingField(&'static str),

    #[error("Date of birth {date_of_birth} is after {today}")]
    BirthDateInFuture {
        date_of_birth: NaiveDate,
        today: NaiveDate,
    },
}

/// Biological sex used by the BMR equations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            _ => None,
        }
    }

    /// Strict parse for calculator input
    pub fn parse(s: &str) -> Result<Self, CalcError> {
        Self::from_str(s).ok_or_else(|| CalcError::UnknownGender(s.to_string()))
    }
}

/// Activity level for the TDEE multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
    #[serde(alias = "extremely_active")]
    ExtremelyActive,
}

impl ActivityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityLevel::Sedentary => "sedentary",
            ActivityLevel::Light => "light",
            ActivityLevel::Moderate => "moderate",
            ActivityLevel::Active => "active",
            ActivityLevel::ExtremelyActive => "extremely-active",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "sedentary" => Some(ActivityLevel::Sedentary),
            "light" => Some(ActivityLevel::Light),
            "moderate" => Some(ActivityLevel::Moderate),
            "active" => Some(ActivityLevel::Active),
            "extremely-active" => Some(ActivityLevel::ExtremelyActive),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Result<Self, CalcError> {
        Self::from_str(s).ok_or_else(|| CalcError::UnknownActivityLevel(s.to_string()))
    }

    /// TDEE multiplier applied to BMR
    pub fn factor(&self) -> f64 {
        match self {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::Light => 1.375,
            ActivityLevel::Moderate => 1.55,
            ActivityLevel::Active => 1.725,
            ActivityLevel::ExtremelyActive => 1.9,
        }
    }
}

/// Physiological input to the calculator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysiologicalProfile {
    pub gender: Gender,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub age_years: u32,
    pub activity_level: ActivityLevel,
    pub is_diabetic: bool,
}

impl PhysiologicalProfile {
    pub fn validate(&self) -> Result<(), CalcError> {
        require_positive("weight_kg", self.weight_kg)?;
        require_positive("height_cm", self.height_cm)?;
        if self.age_years == 0 {
            return Err(CalcError::NonPositive {
                field: "age_years",
                value: 0.0,
            });
        }
        Ok(())
    }
}

/// Daily targets derived from a profile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NutrientTarget {
    pub calories: f64,
    pub carbs_g: f64,
    pub sugar_g: f64,
}

fn require_positive(field: &'static str, value: f64) -> Result<f64, CalcError> {
    if !value.is_finite() {
        return Err(CalcError::NonFinite { field });
    }
    if value <= 0.0 {
        return Err(CalcError::NonPositive { field, value });
    }
    Ok(value)
}

/// Round half-up to `places` decimals.
///
/// The nudge absorbs binary representation error right at the half boundary,
/// e.g. 2172.325 stored as 2172.32499999...
pub fn round_half_up(value: f64, places: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(places);
    let scaled = value * factor;
    (scaled + scaled.signum() * 1e-9).round() / factor
}

/// Basal metabolic rate (Harris-Benedict, gender-specific coefficients)
pub fn compute_bmr(profile: &PhysiologicalProfile) -> Result<f64, CalcError> {
    profile.validate()?;

    let age = f64::from(profile.age_years);
    let bmr = match profile.gender {
        Gender::Male => 66.0 + 13.7 * profile.weight_kg + 5.0 * profile.height_cm - 6.78 * age,
        Gender::Female => 655.0 + 9.6 * profile.weight_kg + 1.8 * profile.height_cm - 4.7 * age,
    };

    require_positive("bmr", bmr)
}

/// Daily calorie target (BMR x activity factor), rounded to 2 decimals
pub fn compute_daily_calories(profile: &PhysiologicalProfile) -> Result<f64, CalcError> {
    let bmr = compute_bmr(profile)?;
    let calories = round_half_up(bmr * profile.activity_level.factor(), 2);
    require_positive("daily_calories", calories)
}

/// Daily sugar allowance in grams; 0 when there is no calorie target
pub fn compute_daily_sugar(daily_calories: f64, is_diabetic: bool) -> f64 {
    if !daily_calories.is_finite() || daily_calories <= 0.0 {
        return 0.0;
    }
    let share = if is_diabetic {
        DIABETIC_SUGAR_SHARE
    } else {
        DEFAULT_SUGAR_SHARE
    };
    round_half_up(daily_calories * share, 2)
}

/// Daily carbohydrate allowance in grams; 0 when there is no calorie target
pub fn compute_daily_carbs(daily_calories: f64) -> f64 {
    if !daily_calories.is_finite() || daily_calories <= 0.0 {
        return 0.0;
    }
    round_half_up(daily_calories * CARB_SHARE / KCAL_PER_GRAM_CARB, 2)
}

/// All three daily targets for a profile
pub fn compute_targets(profile: &PhysiologicalProfile) -> Result<NutrientTarget, CalcError> {
    let calories = compute_daily_calories(profile)?;
    Ok(NutrientTarget {
        calories,
        carbs_g: compute_daily_carbs(calories),
        sugar_g: compute_daily_sugar(calories, profile.is_diabetic),
    })
}

/// Body mass index, rounded to 2 decimals
pub fn compute_bmi(weight_kg: f64, height_cm: f64) -> Result<f64, CalcError> {
    require_positive("weight_kg", weight_kg)?;
    let height_m = require_positive("height_cm", height_cm)? / 100.0;
    Ok(round_half_up(weight_kg / (height_m * height_m), 2))
}

/// Whole years between `date_of_birth` and `today`
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> Result<u32, CalcError> {
    if date_of_birth > today {
        return Err(CalcError::BirthDateInFuture {
            date_of_birth,
            today,
        });
    }

    let mut age = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    Ok(u32::try_from(age).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(gender: Gender, weight: f64, height: f64, age: u32, activity: ActivityLevel) -> PhysiologicalProfile {
        PhysiologicalProfile {
            gender,
            weight_kg: weight,
            height_cm: height,
            age_years: age,
            activity_level: activity,
            is_diabetic: false,
        }
    }

    #[test]
    fn test_male_sedentary_calories() {
        // BMR = 66 + 959 + 875 - 203.4 = 1696.6; x 1.2 = 2035.92
        let p = profile(Gender::Male, 70.0, 175.0, 30, ActivityLevel::Sedentary);
        assert!((compute_bmr(&p).unwrap() - 1696.6).abs() < 1e-9);
        assert!((compute_daily_calories(&p).unwrap() - 2035.92).abs() < 1e-9);
    }

    #[test]
    fn test_female_moderate_calories_rounds_half_up() {
        // BMR = 655 + 576 + 288 - 117.5 = 1401.5; x 1.55 = 2172.325 -> 2172.33
        let p = profile(Gender::Female, 60.0, 160.0, 25, ActivityLevel::Moderate);
        assert!((compute_bmr(&p).unwrap() - 1401.5).abs() < 1e-9);
        assert!((compute_daily_calories(&p).unwrap() - 2172.33).abs() < 1e-9);
    }

    #[test]
    fn test_activity_factors() {
        let levels = [
            (ActivityLevel::Sedentary, 1.2),
            (ActivityLevel::Light, 1.375),
            (ActivityLevel::Moderate, 1.55),
            (ActivityLevel::Active, 1.725),
            (ActivityLevel::ExtremelyActive, 1.9),
        ];
        for (level, factor) in levels {
            assert_eq!(level.factor(), factor);
            let p = profile(Gender::Male, 70.0, 175.0, 30, level);
            let expected = round_half_up(1696.6 * factor, 2);
            assert!((compute_daily_calories(&p).unwrap() - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_invalid_measurements_are_rejected() {
        let p = profile(Gender::Male, 0.0, 175.0, 30, ActivityLevel::Sedentary);
        assert!(matches!(
            compute_daily_calories(&p),
            Err(CalcError::NonPositive { field: "weight_kg", .. })
        ));

        let p = profile(Gender::Male, 70.0, -1.0, 30, ActivityLevel::Sedentary);
        assert!(matches!(
            compute_daily_calories(&p),
            Err(CalcError::NonPositive { field: "height_cm", .. })
        ));

        let p = profile(Gender::Female, 70.0, 175.0, 0, ActivityLevel::Sedentary);
        assert!(matches!(
            compute_daily_calories(&p),
            Err(CalcError::NonPositive { field: "age_years", .. })
        ));

        let p = profile(Gender::Female, f64::NAN, 175.0, 30, ActivityLevel::Sedentary);
        assert!(matches!(
            compute_daily_calories(&p),
            Err(CalcError::NonFinite { field: "weight_kg" })
        ));
    }

    #[test]
    fn test_implausible_age_does_not_produce_negative_target() {
        // 66 + 13.7*40 + 5*100 - 6.78*200 < 0
        let p = profile(Gender::Male, 40.0, 100.0, 200, ActivityLevel::Sedentary);
        assert!(matches!(
            compute_daily_calories(&p),
            Err(CalcError::NonPositive { field: "bmr", .. })
        ));
    }

    #[test]
    fn test_enum_parsing_is_strict() {
        assert_eq!(Gender::parse("Male").unwrap(), Gender::Male);
        assert_eq!(Gender::parse(" female ").unwrap(), Gender::Female);
        assert_eq!(
            Gender::parse("other"),
            Err(CalcError::UnknownGender("other".to_string()))
        );

        assert_eq!(
            ActivityLevel::parse("extremely_active").unwrap(),
            ActivityLevel::ExtremelyActive
        );
        assert_eq!(
            ActivityLevel::parse("EXTREMELY-ACTIVE").unwrap(),
            ActivityLevel::ExtremelyActive
        );
        assert_eq!(
            ActivityLevel::parse("high"),
            Err(CalcError::UnknownActivityLevel("high".to_string()))
        );
    }

    #[test]
    fn test_daily_sugar() {
        assert_eq!(compute_daily_sugar(2000.0, true), 100.0);
        assert_eq!(compute_daily_sugar(2000.0, false), 200.0);
        assert_eq!(compute_daily_sugar(0.0, true), 0.0);
        assert_eq!(compute_daily_sugar(0.0, false), 0.0);
        assert_eq!(compute_daily_sugar(-10.0, false), 0.0);
        assert_eq!(compute_daily_sugar(f64::NAN, false), 0.0);
        assert!((compute_daily_sugar(2035.92, true) - 101.8).abs() < 1e-9);
    }

    #[test]
    fn test_daily_carbs() {
        assert_eq!(compute_daily_carbs(2000.0), 225.0);
        assert_eq!(compute_daily_carbs(-5.0), 0.0);
        assert_eq!(compute_daily_carbs(f64::INFINITY), 0.0);
        // 2035.92 * 0.45 / 4 = 229.041
        assert!((compute_daily_carbs(2035.92) - 229.04).abs() < 1e-9);
    }

    #[test]
    fn test_targets_are_finite_and_non_negative() {
        let genders = [Gender::Male, Gender::Female];
        let levels = [
            ActivityLevel::Sedentary,
            ActivityLevel::Light,
            ActivityLevel::Moderate,
            ActivityLevel::Active,
            ActivityLevel::ExtremelyActive,
        ];
        for gender in genders {
            for level in levels {
                for (weight, height, age) in [(45.0, 150.0, 18), (70.0, 175.0, 30), (120.0, 190.0, 65)] {
                    let mut p = profile(gender, weight, height, age, level);
                    for diabetic in [false, true] {
                        p.is_diabetic = diabetic;
                        let t = compute_targets(&p).unwrap();
                        for v in [t.calories, t.carbs_g, t.sugar_g] {
                            assert!(v.is_finite());
                            assert!(v >= 0.0);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_bmi() {
        assert!((compute_bmi(70.0, 175.0).unwrap() - 22.86).abs() < 1e-9);
        assert!(matches!(
            compute_bmi(70.0, 0.0),
            Err(CalcError::NonPositive { field: "height_cm", .. })
        ));
        assert!(compute_bmi(0.0, 175.0).is_err());
    }

    #[test]
    fn test_age_on() {
        let dob = NaiveDate::from_ymd_opt(1990, 6, 15).unwrap();
        let before_birthday = NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();
        let on_birthday = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        assert_eq!(age_on(dob, before_birthday).unwrap(), 34);
        assert_eq!(age_on(dob, on_birthday).unwrap(), 35);
        assert!(matches!(
            age_on(on_birthday, dob),
            Err(CalcError::BirthDateInFuture { .. })
        ));
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(1.005, 2), 1.01);
        assert_eq!(round_half_up(2.5, 0), 3.0);
        assert_eq!(round_half_up(2.344, 2), 2.34);
    }
}
