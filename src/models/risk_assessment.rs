//! Risk assessment model
//!
//! Diabetes risk prediction stored for non-diabetic profiles.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::{DbError, DbResult};
use crate::nutrition::{derive_risk_level, RiskLevel};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: i64,
    pub profile_id: i64,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub note: String,
    pub created_at: String,
    pub updated_at: String,
}

impl RiskAssessment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let risk_score: f64 = row.get("risk_score")?;
        let risk_level = RiskLevel::from_str(row.get::<_, String>("risk_level")?.as_str())
            .unwrap_or_else(|| derive_risk_level(risk_score));
        Ok(Self {
            id: row.get("id")?,
            profile_id: row.get("profile_id")?,
            risk_level,
            risk_score,
            note: row.get("note")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Store a score, bucketing it into a level; replaces any previous assessment
    pub fn upsert(conn: &Connection, profile_id: i64, risk_score: f64, note: &str) -> DbResult<Self> {
        let level = derive_risk_level(risk_score);
        conn.execute(
            r#"
            INSERT INTO risk_assessments (profile_id, risk_level, risk_score, note)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(profile_id) DO UPDATE SET
                risk_level = excluded.risk_level,
                risk_score = excluded.risk_score,
                note = excluded.note,
                updated_at = datetime('now')
            "#,
            params![profile_id, level.as_str(), risk_score, note],
        )?;

        Self::get_by_profile(conn, profile_id)?.ok_or(DbError::MissingAfterWrite("risk assessment"))
    }

    pub fn get_by_profile(conn: &Connection, profile_id: i64) -> DbResult<Option<Self>> {
        let mut stmt = conn.prepare("SELECT * FROM risk_assessments WHERE profile_id = ?1")?;

        match stmt.query_row([profile_id], Self::from_row) {
            Ok(risk) => Ok(Some(risk)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_by_user(conn: &Connection, user_id: i64) -> DbResult<Option<Self>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT r.* FROM risk_assessments r
            JOIN health_profiles p ON p.id = r.profile_id
            WHERE p.user_id = ?1
            "#,
        )?;

        match stmt.query_row([user_id], Self::from_row) {
            Ok(risk) => Ok(Some(risk)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn delete_for_profile(conn: &Connection, profile_id: i64) -> DbResult<bool> {
        let deleted = conn.execute("DELETE FROM risk_assessments WHERE profile_id = ?1", [profile_id])?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_database;
    use crate::models::{HealthProfile, HealthProfileWrite, SmokingHistory, User, UserCreate};
    use crate::nutrition::ActivityLevel;

    #[test]
    fn test_upsert_buckets_and_replaces() {
        let (_dir, db) = test_database();
        let conn = db.get_conn().unwrap();
        let user = User::create(
            &conn,
            &UserCreate {
                name: "Citra".into(),
                email: "citra@example.com".into(),
            },
        )
        .unwrap();
        let profile = HealthProfile::create(
            &conn,
            user.id,
            &HealthProfileWrite {
                height_cm: 160.0,
                weight_kg: 60.0,
                bmi: 23.44,
                is_diabetic: false,
                smoking_history: SmokingHistory::Never,
                has_heart_disease: false,
                activity_level: ActivityLevel::Moderate,
            },
        )
        .unwrap();

        let first = RiskAssessment::upsert(&conn, profile.id, 72.5, "see a doctor").unwrap();
        assert_eq!(first.risk_level, RiskLevel::High);

        let second = RiskAssessment::upsert(&conn, profile.id, 50.0, "").unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.risk_level, RiskLevel::Low);

        let by_user = RiskAssessment::get_by_user(&conn, user.id).unwrap().unwrap();
        assert!((by_user.risk_score - 50.0).abs() < 0.001);

        assert!(RiskAssessment::delete_for_profile(&conn, profile.id).unwrap());
        assert!(RiskAssessment::get_by_user(&conn, user.id).unwrap().is_none());
    }
}
