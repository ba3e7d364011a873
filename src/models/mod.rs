//! Data models
//!
//! Rust structs representing database entities.

mod food;
pub mod food_log;
mod health_profile;
mod mini_course;
mod mini_grocery;
mod nutrition;
mod risk_assessment;
mod user;

pub use food::{Food, FoodCreate};
pub use food_log::{ConsumedTotals, FoodLogCreate, FoodLogEntry};
pub use health_profile::{
    DiabetesDetails, DiabetesDetailsWrite, DiabeticType, HealthProfile, HealthProfileWrite,
    SmokingHistory,
};
pub use mini_course::{MiniCourse, MiniCourseCreate};
pub use mini_grocery::{MiniGrocery, MiniGroceryCreate};
pub use nutrition::{Nutrition, PORTION_GRAMS};
pub use risk_assessment::RiskAssessment;
pub use user::{User, UserCreate, UserUpdate};
