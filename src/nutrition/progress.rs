//! Progress classification
//!
//! Buckets consumption against a target into UNDER / PASS / OVER and folds
//! the three per-nutrient results into an overall verdict.

use serde::{Deserialize, Serialize};

use super::targets::round_half_up;

/// Below this percentage of target a nutrient is UNDER
pub const UNDER_THRESHOLD_PERCENT: f64 = 80.0;
/// Above this percentage of target a nutrient is OVER
pub const OVER_THRESHOLD_PERCENT: f64 = 120.0;

/// Consumption verdict for one nutrient or for the whole day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Satisfaction {
    Under,
    Pass,
    Over,
}

impl Satisfaction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Satisfaction::Under => "UNDER",
            Satisfaction::Pass => "PASS",
            Satisfaction::Over => "OVER",
        }
    }
}

fn sanitize(current: f64) -> f64 {
    if current.is_finite() {
        current
    } else {
        0.0
    }
}

fn has_target(target: f64) -> bool {
    target.is_finite() && target > 0.0
}

/// Classify consumption against a target.
///
/// Uses the unrounded ratio, so 79.6% is still UNDER even though it reports
/// as 80. Without a usable target anything eaten is OVER and nothing is UNDER.
pub fn classify(current: f64, target: f64) -> Satisfaction {
    let current = sanitize(current);
    if !has_target(target) {
        return if current > 0.0 {
            Satisfaction::Over
        } else {
            Satisfaction::Under
        };
    }

    let percent = current * 100.0 / target;
    if percent < UNDER_THRESHOLD_PERCENT {
        Satisfaction::Under
    } else if percent > OVER_THRESHOLD_PERCENT {
        Satisfaction::Over
    } else {
        Satisfaction::Pass
    }
}

/// Whole-number percentage of target consumed, rounded half-up; 0 without a target
pub fn percent_of(current: f64, target: f64) -> i64 {
    if !has_target(target) {
        return 0;
    }
    round_half_up(sanitize(current) * 100.0 / target, 0) as i64
}

/// Progress for a single nutrient
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NutrientProgress {
    pub current: f64,
    pub percent: i64,
    pub satisfaction: Satisfaction,
    pub target: f64,
}

impl NutrientProgress {
    pub fn evaluate(current: f64, target: f64) -> Self {
        Self {
            current: sanitize(current),
            percent: percent_of(current, target),
            satisfaction: classify(current, target),
            target,
        }
    }
}

/// Fold the calorie, carb and sugar verdicts into one.
///
/// Any OVER wins; otherwise two or more UNDER make the day UNDER. A single
/// UNDER nutrient is tolerated.
pub fn fold_overall(calories: Satisfaction, carbs: Satisfaction, sugar: Satisfaction) -> Satisfaction {
    let mut under = 0;
    let mut over = 0;
    for satisfaction in [calories, carbs, sugar] {
        match satisfaction {
            Satisfaction::Under => under += 1,
            Satisfaction::Over => over += 1,
            Satisfaction::Pass => {}
        }
    }

    if over > 0 {
        Satisfaction::Over
    } else if under >= 2 {
        Satisfaction::Under
    } else {
        Satisfaction::Pass
    }
}

/// User-facing message for a day's result.
///
/// Evaluated independently of `fold_overall`: two UNDER nutrients fold to
/// UNDER but still get the "good condition" message.
pub fn overall_message(calories: Satisfaction, carbs: Satisfaction, sugar: Satisfaction) -> &'static str {
    let all = [calories, carbs, sugar];
    if all.contains(&Satisfaction::Over) {
        "Attention! Some nutrients exceed the limit"
    } else if all.iter().all(|s| *s == Satisfaction::Under) {
        "You need to increase your nutrient intake"
    } else {
        "You are in good nutritional condition"
    }
}

/// Overall verdict with its message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallProgress {
    pub message: String,
    pub satisfaction: Satisfaction,
}

impl OverallProgress {
    pub fn from_parts(calories: Satisfaction, carbs: Satisfaction, sugar: Satisfaction) -> Self {
        Self {
            message: overall_message(calories, carbs, sugar).to_string(),
            satisfaction: fold_overall(calories, carbs, sugar),
        }
    }
}
