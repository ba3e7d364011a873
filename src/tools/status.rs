//! SweetLife Status Tool
//!
//! Provides runtime status information about the SweetLife service.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::build_info::BuildInfo;

/// Usage guide for AI assistants driving the SweetLife tools
pub const PROGRESS_INSTRUCTIONS: &str = r#"
# SweetLife Usage Instructions

SweetLife tracks what a user eats against daily calorie, carbohydrate and
sugar targets derived from their health profile.

## Account setup

1. `register_user` with name and email. A verification email is sent in the
   background; check it with `verification_status`. If the email cannot be
   delivered after the configured attempts, the unverified account is removed.
2. `verify_account` with the user id and the token from the email link.
3. `update_profile` with name, gender (male/female) and date_of_birth
   (YYYY-MM-DD). Gender and date of birth are required for targets.
4. `create_health_profile` with height_cm, weight_kg, is_diabetic,
   smoking_history, has_heart_disease and activity_level.
   - Diabetic users must also pass diabetic_type (type1/type2),
     insulin_level and blood_pressure.
   - Non-diabetic users get a diabetes risk prediction instead.
   Use `update_health_profile` afterwards; it takes the same fields.

Activity levels: sedentary, light, moderate, active, extremely-active.
Smoking history: never, former, current, not_current, ever, no_info.

## Logging food

- `search_food` finds a food by name and returns nutrition for the given
  weight in grams (default 100 g). Unknown foods are fetched from the
  nutrition lookup service and saved to the catalog.
- `scan_food` takes a local image path and returns the detected foods with
  nutrition per portion.
- `log_food` records scanned foods (name + unit count) and additional foods
  (name + weight in grams) in one call. Every name must exist in the catalog.
- `get_food_history` lists logged foods grouped by day, newest first.

## Daily progress

`get_daily_progress` returns, for calories, carbs and sugar:
- target, consumed, percentage and a status message per nutrient
- an overall satisfaction across the three nutrients

Satisfaction is UNDER below 80% of target, PASS from 80% to 120%, and
OVER above 120%. Any OVER makes the day OVER; two or more UNDER make it
UNDER.

## Recommendations

- `get_food_recommendations` uses the stored diabetes risk score (100 when
  the user is diabetic or has no prediction).
- `get_exercise_recommendations` needs gender and date of birth on the
  profile.

## Courses and groceries

`list_mini_courses` and `list_mini_groceries` take an optional `page`
(default 1) and `limit` (default 10, max 100) and return `data` plus
`pagination` with total_items, total_pages, has_next and has_prev.
"#;

/// Runtime status of the SweetLife service
#[derive(Debug, Clone, Serialize)]
pub struct SweetlifeStatus {
    /// Build information
    pub build_number: u64,
    pub build_timestamp: &'static str,
    pub version: &'static str,

    /// Database information
    pub database_path: String,
    pub database_size_bytes: Option<u64>,

    /// Verification tasks still sending email
    pub pending_verifications: usize,

    /// Process information
    pub uptime_seconds: u64,
    pub process_id: u32,
    pub memory_usage_bytes: u64,
}

/// Status tracker for collecting runtime information
pub struct StatusTracker {
    start_time: Instant,
    database_path: PathBuf,
}

impl StatusTracker {
    /// Create a new status tracker
    pub fn new(database_path: PathBuf) -> Self {
        Self {
            start_time: Instant::now(),
            database_path,
        }
    }

    /// Get the current status
    pub fn get_status(&self, pending_verifications: usize) -> SweetlifeStatus {
        let build_info = BuildInfo::current();

        let database_size_bytes = std::fs::metadata(&self.database_path)
            .ok()
            .map(|m| m.len());

        let pid = std::process::id();
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]));

        let memory_usage_bytes = sys
            .process(Pid::from_u32(pid))
            .map(|p| p.memory())
            .unwrap_or(0);

        SweetlifeStatus {
            build_number: build_info.build_number,
            build_timestamp: build_info.build_timestamp,
            version: build_info.version,
            database_path: self.database_path.display().to_string(),
            database_size_bytes,
            pending_verifications,
            uptime_seconds: self.start_time.elapsed().as_secs(),
            process_id: pid,
            memory_usage_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_reports_database() {
        let (dir, _db) = crate::db::test_database();
        let path = dir.path().join("test.db");
        let tracker = StatusTracker::new(path.clone());
        let status = tracker.get_status(2);

        assert_eq!(status.database_path, path.display().to_string());
        assert_eq!(status.pending_verifications, 2);
        assert_eq!(status.process_id, std::process::id());

        let missing = StatusTracker::new(dir.path().join("missing.db")).get_status(0);
        assert!(missing.database_size_bytes.is_none());
    }
}
