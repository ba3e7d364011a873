//! Nutrition calculation module
//!
//! Daily targets, progress classification and risk bucketing. Everything in
//! here is pure and safe to call from any task.

pub mod progress;
pub mod risk;
pub mod targets;

pub use progress::{
    classify, fold_overall, overall_message, percent_of, NutrientProgress, OverallProgress,
    Satisfaction,
};
pub use risk::{derive_risk_level, RiskLevel};
pub use targets::{
    age_on, compute_bmi, compute_daily_calories, compute_daily_carbs, compute_daily_sugar,
    compute_targets, round_half_up, ActivityLevel, CalcError, Gender, NutrientTarget,
    PhysiologicalProfile,
};
