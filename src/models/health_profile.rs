//! Health profile model
//!
//! One profile per user, plus diabetes details for diabetic profiles.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::{DbError, DbResult};
use crate::nutrition::ActivityLevel;

/// Smoking history categories understood by the risk model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SmokingHistory {
    Never,
    Former,
    Current,
    NotCurrent,
    Ever,
    #[default]
    NoInfo,
}

impl SmokingHistory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmokingHistory::Never => "never",
            SmokingHistory::Former => "former",
            SmokingHistory::Current => "current",
            SmokingHistory::NotCurrent => "not_current",
            SmokingHistory::Ever => "ever",
            SmokingHistory::NoInfo => "no_info",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().replace(' ', "_").as_str() {
            "never" => SmokingHistory::Never,
            "former" => SmokingHistory::Former,
            "current" => SmokingHistory::Current,
            "not_current" => SmokingHistory::NotCurrent,
            "ever" => SmokingHistory::Ever,
            _ => SmokingHistory::NoInfo,
        }
    }

    /// Label used by the prediction model's training data
    pub fn model_label(&self) -> &'static str {
        match self {
            SmokingHistory::NotCurrent => "not current",
            SmokingHistory::NoInfo => "No Info",
            other => other.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiabeticType {
    Type1,
    Type2,
    Gestational,
}

impl DiabeticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiabeticType::Type1 => "type1",
            DiabeticType::Type2 => "type2",
            DiabeticType::Gestational => "gestational",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "type1" => Some(DiabeticType::Type1),
            "type2" => Some(DiabeticType::Type2),
            "gestational" => Some(DiabeticType::Gestational),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthProfile {
    pub id: i64,
    pub user_id: i64,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub bmi: f64,
    pub is_diabetic: bool,
    pub smoking_history: SmokingHistory,
    pub has_heart_disease: bool,
    /// Stored text; parsed strictly by the calculator
    pub activity_level: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Values written on create and update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthProfileWrite {
    pub height_cm: f64,
    pub weight_kg: f64,
    pub bmi: f64,
    pub is_diabetic: bool,
    pub smoking_history: SmokingHistory,
    pub has_heart_disease: bool,
    pub activity_level: ActivityLevel,
}

impl HealthProfile {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            height_cm: row.get("height_cm")?,
            weight_kg: row.get("weight_kg")?,
            bmi: row.get("bmi")?,
            is_diabetic: row.get("is_diabetic")?,
            smoking_history: SmokingHistory::from_str(row.get::<_, String>("smoking_history")?.as_str()),
            has_heart_disease: row.get("has_heart_disease")?,
            activity_level: row.get("activity_level")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn create(conn: &Connection, user_id: i64, data: &HealthProfileWrite) -> DbResult<Self> {
        conn.execute(
            r#"
            INSERT INTO health_profiles (
                user_id, height_cm, weight_kg, bmi, is_diabetic,
                smoking_history, has_heart_disease, activity_level
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                user_id,
                data.height_cm,
                data.weight_kg,
                data.bmi,
                data.is_diabetic,
                data.smoking_history.as_str(),
                data.has_heart_disease,
                data.activity_level.as_str(),
            ],
        )?;

        Self::get_by_user(conn, user_id)?.ok_or(DbError::MissingAfterWrite("health profile"))
    }

    pub fn get_by_user(conn: &Connection, user_id: i64) -> DbResult<Option<Self>> {
        let mut stmt = conn.prepare("SELECT * FROM health_profiles WHERE user_id = ?1")?;

        match stmt.query_row([user_id], Self::from_row) {
            Ok(profile) => Ok(Some(profile)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite every field; `None` when the user has no profile
    pub fn update(conn: &Connection, user_id: i64, data: &HealthProfileWrite) -> DbResult<Option<Self>> {
        let changed = conn.execute(
            r#"
            UPDATE health_profiles
            SET height_cm = ?1, weight_kg = ?2, bmi = ?3, is_diabetic = ?4,
                smoking_history = ?5, has_heart_disease = ?6, activity_level = ?7,
                updated_at = datetime('now')
            WHERE user_id = ?8
            "#,
            params![
                data.height_cm,
                data.weight_kg,
                data.bmi,
                data.is_diabetic,
                data.smoking_history.as_str(),
                data.has_heart_disease,
                data.activity_level.as_str(),
                user_id,
            ],
        )?;

        if changed == 0 {
            return Ok(None);
        }
        Self::get_by_user(conn, user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiabetesDetails {
    pub id: i64,
    pub profile_id: i64,
    pub diabetic_type: DiabeticType,
    pub insulin_level: f64,
    pub blood_pressure: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiabetesDetailsWrite {
    pub diabetic_type: DiabeticType,
    pub insulin_level: f64,
    pub blood_pressure: i64,
}

impl DiabetesDetails {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let raw_type: String = row.get("diabetic_type")?;
        // CHECK constraint keeps this column to known values
        let diabetic_type = DiabeticType::from_str(&raw_type).unwrap_or(DiabeticType::Type2);
        Ok(Self {
            id: row.get("id")?,
            profile_id: row.get("profile_id")?,
            diabetic_type,
            insulin_level: row.get("insulin_level")?,
            blood_pressure: row.get("blood_pressure")?,
        })
    }

    pub fn get_by_profile(conn: &Connection, profile_id: i64) -> DbResult<Option<Self>> {
        let mut stmt = conn.prepare("SELECT * FROM diabetes_details WHERE profile_id = ?1")?;

        match stmt.query_row([profile_id], Self::from_row) {
            Ok(details) => Ok(Some(details)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert or replace the details for a profile
    pub fn upsert(conn: &Connection, profile_id: i64, data: &DiabetesDetailsWrite) -> DbResult<Self> {
        conn.execute(
            r#"
            INSERT INTO diabetes_details (profile_id, diabetic_type, insulin_level, blood_pressure)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(profile_id) DO UPDATE SET
                diabetic_type = excluded.diabetic_type,
                insulin_level = excluded.insulin_level,
                blood_pressure = excluded.blood_pressure,
                updated_at = datetime('now')
            "#,
            params![
                profile_id,
                data.diabetic_type.as_str(),
                data.insulin_level,
                data.blood_pressure,
            ],
        )?;

        Self::get_by_profile(conn, profile_id)?.ok_or(DbError::MissingAfterWrite("diabetes details"))
    }

    pub fn delete_for_profile(conn: &Connection, profile_id: i64) -> DbResult<bool> {
        let deleted = conn.execute("DELETE FROM diabetes_details WHERE profile_id = ?1", [profile_id])?;
        Ok(deleted > 0)
    }
}
