//! SweetLife MCP Server Implementation
//!
//! Implements the MCP server with all SweetLife tools.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::{schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::AppConfig;
use crate::db::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::external::{BlobStore, InferenceService, Mailer, NutritionLookup};
use crate::models::food_log::LOGGED_AT_FORMAT;
use crate::models::FoodCreate;
use crate::tools::{catalog, dashboard};
use crate::tools::foods::{self, AdditionalEntry, ScannedEntry};
use crate::tools::health_profiles::{self, HealthProfileRequest};
use crate::tools::recommendations;
use crate::tools::status::StatusTracker;
use crate::tools::users::{
    self, RegisterUserResponse, UpdateProfileRequest, VerificationRegistry, VerificationSettings,
};

/// External services the tools talk to
#[derive(Clone)]
pub struct Collaborators {
    pub inference: Arc<dyn InferenceService>,
    pub lookup: Arc<dyn NutritionLookup>,
    pub store: Arc<dyn BlobStore>,
    pub mailer: Arc<dyn Mailer>,
}

/// SweetLife MCP Service
#[derive(Clone)]
pub struct SweetlifeService {
    status_tracker: Arc<Mutex<StatusTracker>>,
    database: Database,
    external: Collaborators,
    verification: VerificationSettings,
    verifications: Arc<VerificationRegistry>,
    asset_base_url: String,
    tool_router: ToolRouter<SweetlifeService>,
}

impl SweetlifeService {
    pub fn new(config: &AppConfig, database: Database, external: Collaborators) -> Self {
        Self {
            status_tracker: Arc::new(Mutex::new(StatusTracker::new(config.database_path.clone()))),
            database,
            external,
            verification: VerificationSettings {
                app_host: config.app_host.clone(),
                app_key: config.app_key.clone(),
                attempts: config.verification_attempts,
                backoff: config.verification_backoff,
            },
            verifications: Arc::new(VerificationRegistry::new()),
            asset_base_url: config.asset_base_url.clone(),
            tool_router: Self::tool_router(),
        }
    }
}

/// Turn a service result into a tool result.
///
/// Missing records come back as an `{"error": ...}` payload rather than a
/// protocol error; bad input maps to invalid params.
fn respond<T: Serialize>(result: ServiceResult<T>) -> Result<CallToolResult, McpError> {
    let json = match result {
        Ok(value) => serde_json::to_string_pretty(&value),
        Err(ServiceError::NotFound { entity, id }) => {
            let id = match id.parse::<i64>() {
                Ok(n) => serde_json::Value::from(n),
                Err(_) => serde_json::Value::from(id),
            };
            Ok(serde_json::json!({"error": format!("{} not found", entity), "id": id}).to_string())
        }
        Err(e @ (ServiceError::InvalidInput(_) | ServiceError::Computation(_))) => {
            return Err(McpError::invalid_params(e.to_string(), None));
        }
        Err(e) => {
            warn!("Tool failed: {}", e);
            return Err(McpError::internal_error(e.to_string(), None));
        }
    }
    .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

// ============================================================================
// User Parameter Structs
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RegisterUserParams {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct VerifyAccountParams {
    pub user_id: i64,
    /// Token from the verification email link
    pub token: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct VerificationStatusParams {
    pub user_id: i64,
    /// Stop the verification task
    #[serde(default)]
    pub cancel: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UserIdParams {
    pub user_id: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateProfileParams {
    pub user_id: i64,
    pub name: String,
    /// male or female
    pub gender: String,
    /// YYYY-MM-DD
    pub date_of_birth: String,
    /// Local image file for the new profile photo
    pub photo_path: Option<String>,
}

// ============================================================================
// Health Profile Parameter Structs
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct HealthProfileParams {
    pub user_id: i64,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub is_diabetic: bool,
    /// never, former, current, not_current, ever, no_info
    pub smoking_history: String,
    pub has_heart_disease: bool,
    /// sedentary, light, moderate, active, extremely-active
    pub activity_level: String,
    /// Required when diabetic: type1, type2 or gestational
    pub diabetic_type: Option<String>,
    /// Required when diabetic
    pub insulin_level: Option<f64>,
    /// Required when diabetic
    pub blood_pressure: Option<i64>,
}

impl HealthProfileParams {
    fn split(self) -> (i64, HealthProfileRequest) {
        (
            self.user_id,
            HealthProfileRequest {
                height_cm: self.height_cm,
                weight_kg: self.weight_kg,
                is_diabetic: self.is_diabetic,
                smoking_history: self.smoking_history,
                has_heart_disease: self.has_heart_disease,
                activity_level: self.activity_level,
                diabetic_type: self.diabetic_type,
                insulin_level: self.insulin_level,
                blood_pressure: self.blood_pressure,
            },
        )
    }
}

// ============================================================================
// Food Parameter Structs
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AddFoodParams {
    pub name: String,
    pub image_url: Option<String>,
    /// Per 100 g
    pub calories: f64,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub sugar: f64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchFoodParams {
    pub name: String,
    /// Portion weight in grams (default 100)
    pub weight: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ScanFoodParams {
    /// Local path of the food image
    pub image_path: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ScannedFoodParam {
    pub name: String,
    /// Number of portions
    pub unit: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AdditionalFoodParam {
    pub name: String,
    /// Grams
    pub weight: f64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct LogFoodParams {
    pub user_id: i64,
    #[serde(default)]
    pub scanned: Vec<ScannedFoodParam>,
    #[serde(default)]
    pub additional: Vec<AdditionalFoodParam>,
    /// YYYY-MM-DDTHH:MM:SS, defaults to now
    pub logged_at: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FoodHistoryParams {
    pub user_id: i64,
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PageParams {
    /// 1-based page number (default 1)
    #[serde(default)]
    pub page: Option<i64>,
    /// Items per page (default 10, max 100)
    #[serde(default)]
    pub limit: Option<i64>,
}

// ============================================================================
// Tool Implementations
// ============================================================================

#[tool_router]
impl SweetlifeService {
    // --- Status ---

    #[tool(description = "Get the current status of the SweetLife service including build info, database status, and process information")]
    async fn sweetlife_status(&self) -> Result<CallToolResult, McpError> {
        let pending = self.verifications.pending().await;
        let tracker = self.status_tracker.lock().await;
        let status = tracker.get_status(pending);
        let json = serde_json::to_string_pretty(&status)
            .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Get step-by-step instructions for the SweetLife tools. Call this when starting a session or when unsure how to track food and progress.")]
    fn progress_instructions(&self) -> Result<CallToolResult, McpError> {
        use crate::tools::status::PROGRESS_INSTRUCTIONS;
        Ok(CallToolResult::success(vec![Content::text(PROGRESS_INSTRUCTIONS)]))
    }

    // --- Users ---

    #[tool(description = "Register a user and send the verification email in the background")]
    async fn register_user(&self, Parameters(p): Parameters<RegisterUserParams>) -> Result<CallToolResult, McpError> {
        let user = match users::register_user(&self.database, &p.name, &p.email) {
            Ok(user) => user,
            Err(e) => return respond::<()>(Err(e)),
        };
        let handle = users::start_verification(
            self.database.clone(),
            Arc::clone(&self.external.mailer),
            &user,
            &self.verification,
        );
        let verification = handle.state();
        self.verifications.insert(handle).await;
        respond(Ok(RegisterUserResponse {
            id: user.id,
            name: user.name,
            email: user.email,
            verification,
        }))
    }

    #[tool(description = "Verify an account with the token from the verification email")]
    fn verify_account(&self, Parameters(p): Parameters<VerifyAccountParams>) -> Result<CallToolResult, McpError> {
        respond(users::verify_account(&self.database, &self.verification.app_key, p.user_id, &p.token))
    }

    #[tool(description = "Get the state of a user's verification email task. Set cancel=true to stop it.")]
    async fn verification_status(&self, Parameters(p): Parameters<VerificationStatusParams>) -> Result<CallToolResult, McpError> {
        let state = if p.cancel {
            self.verifications.cancel(p.user_id).await
        } else {
            self.verifications.state(p.user_id).await
        };
        respond(state.ok_or_else(|| ServiceError::not_found("Verification task", p.user_id)))
    }

    #[tool(description = "Get a user's profile")]
    fn get_profile(&self, Parameters(p): Parameters<UserIdParams>) -> Result<CallToolResult, McpError> {
        respond(users::get_profile(&self.database, p.user_id))
    }

    #[tool(description = "Update name, gender and date of birth, optionally uploading a new profile photo")]
    async fn update_profile(&self, Parameters(p): Parameters<UpdateProfileParams>) -> Result<CallToolResult, McpError> {
        let req = UpdateProfileRequest {
            name: p.name,
            gender: p.gender,
            date_of_birth: p.date_of_birth,
            photo_path: p.photo_path,
        };
        let today = Local::now().date_naive();
        respond(users::update_profile(&self.database, self.external.store.as_ref(), p.user_id, req, today).await)
    }

    // --- Health Profiles ---

    #[tool(description = "Create a user's health profile. Non-diabetic users get a diabetes risk prediction.")]
    async fn create_health_profile(&self, Parameters(p): Parameters<HealthProfileParams>) -> Result<CallToolResult, McpError> {
        let (user_id, req) = p.split();
        let today = Local::now().date_naive();
        respond(
            health_profiles::create_health_profile(&self.database, self.external.inference.as_ref(), user_id, &req, today)
                .await,
        )
    }

    #[tool(description = "Get a user's health profile with diabetes details or risk prediction")]
    fn get_health_profile(&self, Parameters(p): Parameters<UserIdParams>) -> Result<CallToolResult, McpError> {
        respond(health_profiles::get_health_profile(&self.database, p.user_id))
    }

    #[tool(description = "Replace a user's health profile. The risk prediction is refreshed.")]
    async fn update_health_profile(&self, Parameters(p): Parameters<HealthProfileParams>) -> Result<CallToolResult, McpError> {
        let (user_id, req) = p.split();
        let today = Local::now().date_naive();
        respond(
            health_profiles::update_health_profile(&self.database, self.external.inference.as_ref(), user_id, &req, today)
                .await,
        )
    }

    // --- Dashboard ---

    #[tool(description = "Get today's calorie, carbohydrate and sugar progress against the user's daily targets")]
    fn get_daily_progress(&self, Parameters(p): Parameters<UserIdParams>) -> Result<CallToolResult, McpError> {
        let today = Local::now().date_naive();
        respond(dashboard::build_dashboard(&self.database, p.user_id, today))
    }

    // --- Foods ---

    #[tool(description = "Add a food to the catalog with nutrition per 100 g")]
    fn add_food(&self, Parameters(p): Parameters<AddFoodParams>) -> Result<CallToolResult, McpError> {
        let data = FoodCreate {
            name: p.name,
            image_url: p.image_url,
            calories: p.calories,
            protein: p.protein,
            carbs: p.carbs,
            fat: p.fat,
            sugar: p.sugar,
        };
        respond(foods::add_food(&self.database, data))
    }

    #[tool(description = "Find a food's nutrition for a weight in grams. Unknown foods are looked up and saved to the catalog.")]
    async fn search_food(&self, Parameters(p): Parameters<SearchFoodParams>) -> Result<CallToolResult, McpError> {
        respond(foods::search_food(&self.database, self.external.lookup.as_ref(), &p.name, p.weight).await)
    }

    #[tool(description = "Detect foods on an image and return their nutrition per portion")]
    async fn scan_food(&self, Parameters(p): Parameters<ScanFoodParams>) -> Result<CallToolResult, McpError> {
        respond(
            foods::scan_food(
                &self.database,
                self.external.store.as_ref(),
                self.external.inference.as_ref(),
                &p.image_path,
            )
            .await,
        )
    }

    #[tool(description = "Log scanned foods (portions) and additional foods (grams) for a user")]
    fn log_food(&self, Parameters(p): Parameters<LogFoodParams>) -> Result<CallToolResult, McpError> {
        let logged_at = match p.logged_at.as_deref() {
            Some(raw) => NaiveDateTime::parse_from_str(raw.trim(), LOGGED_AT_FORMAT).map_err(|_| {
                McpError::invalid_params(format!("Invalid logged_at: '{}'. Use YYYY-MM-DDTHH:MM:SS", raw), None)
            })?,
            None => Local::now().naive_local(),
        };
        let scanned: Vec<ScannedEntry> = p
            .scanned
            .into_iter()
            .map(|e| ScannedEntry { name: e.name, unit: e.unit })
            .collect();
        let additional: Vec<AdditionalEntry> = p
            .additional
            .into_iter()
            .map(|e| AdditionalEntry { name: e.name, weight: e.weight })
            .collect();
        respond(foods::log_food(&self.database, p.user_id, &scanned, &additional, logged_at))
    }

    #[tool(description = "Get a user's logged foods grouped by day, newest first")]
    fn get_food_history(&self, Parameters(p): Parameters<FoodHistoryParams>) -> Result<CallToolResult, McpError> {
        respond(foods::get_food_history(&self.database, p.user_id, p.limit))
    }

    // --- Mini courses and groceries ---

    #[tool(description = "List mini courses about diabetes and nutrition, one page at a time")]
    fn list_mini_courses(&self, Parameters(p): Parameters<PageParams>) -> Result<CallToolResult, McpError> {
        respond(catalog::list_mini_courses(&self.database, p.page.unwrap_or(1), p.limit.unwrap_or(0)))
    }

    #[tool(description = "List diabetes-friendly grocery products, one page at a time")]
    fn list_mini_groceries(&self, Parameters(p): Parameters<PageParams>) -> Result<CallToolResult, McpError> {
        respond(catalog::list_mini_groceries(&self.database, p.page.unwrap_or(1), p.limit.unwrap_or(0)))
    }

    // --- Recommendations ---

    #[tool(description = "Get foods recommended for the user's diabetes risk score")]
    async fn get_food_recommendations(&self, Parameters(p): Parameters<UserIdParams>) -> Result<CallToolResult, McpError> {
        respond(
            recommendations::get_food_recommendations(&self.database, self.external.inference.as_ref(), p.user_id)
                .await,
        )
    }

    #[tool(description = "Get recommended exercise, duration and calories to burn for the user")]
    async fn get_exercise_recommendations(&self, Parameters(p): Parameters<UserIdParams>) -> Result<CallToolResult, McpError> {
        let today = Local::now().date_naive();
        respond(
            recommendations::get_exercise_recommendations(
                &self.database,
                self.external.inference.as_ref(),
                p.user_id,
                &self.asset_base_url,
                today,
            )
            .await,
        )
    }
}

// ============================================================================
// Server Handler
// ============================================================================

#[tool_handler]
impl ServerHandler for SweetlifeService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "sweetlife".into(),
                version: crate::build_info::VERSION.into(),
                title: Some("SweetLife".into()),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "SweetLife - Daily nutrition goals and diabetes risk tracking. \
                 IMPORTANT: Call progress_instructions first. \
                 Users: register_user, verify_account, verification_status, get_profile, update_profile. \
                 Health: create_health_profile, get_health_profile, update_health_profile. \
                 Progress: get_daily_progress. \
                 Food: add_food, search_food, scan_food, log_food, get_food_history. \
                 Learn and shop: list_mini_courses, list_mini_groceries. \
                 Recommendations: get_food_recommendations, get_exercise_recommendations."
                    .into(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_becomes_payload() {
        let result = respond::<()>(Err(ServiceError::not_found("User", 7))).unwrap();
        let text = serde_json::to_string(&result).unwrap();
        assert!(text.contains("User not found"));
    }

    #[test]
    fn test_invalid_input_is_invalid_params() {
        let err = respond::<()>(Err(ServiceError::invalid("bad"))).unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
        assert_eq!(err.message, "bad");
    }
}
