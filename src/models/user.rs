//! User model
//!
//! Profile side of an account. Credentials live with the login service.

use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::{DbError, DbResult};
use crate::nutrition::Gender;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// Stored text; parsed strictly where a calculation needs it
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub image_url: Option<String>,
    pub verified_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreate {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<NaiveDate>,
    pub image_url: Option<String>,
}

impl User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let date_of_birth: Option<String> = row.get("date_of_birth")?;
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            gender: row.get("gender")?,
            date_of_birth: date_of_birth
                .and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()),
            image_url: row.get("image_url")?,
            verified_at: row.get("verified_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }

    pub fn create(conn: &Connection, data: &UserCreate) -> DbResult<Self> {
        conn.execute(
            "INSERT INTO users (name, email) VALUES (?1, ?2)",
            params![data.name, data.email],
        )?;

        let id = conn.last_insert_rowid();
        Self::get_by_id(conn, id)?.ok_or(DbError::MissingAfterWrite("user"))
    }

    pub fn get_by_id(conn: &Connection, id: i64) -> DbResult<Option<Self>> {
        let mut stmt = conn.prepare("SELECT * FROM users WHERE id = ?1")?;

        match stmt.query_row([id], Self::from_row) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Case-insensitive email lookup
    pub fn find_by_email(conn: &Connection, email: &str) -> DbResult<Option<Self>> {
        let mut stmt = conn.prepare("SELECT * FROM users WHERE email = ?1")?;

        match stmt.query_row([email.trim()], Self::from_row) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply a partial update; `None` when the user does not exist
    pub fn update(conn: &Connection, id: i64, data: &UserUpdate) -> DbResult<Option<Self>> {
        let Some(current) = Self::get_by_id(conn, id)? else {
            return Ok(None);
        };

        let name = data.name.clone().unwrap_or(current.name);
        let gender = data
            .gender
            .map(|g| g.as_str().to_string())
            .or(current.gender);
        let date_of_birth = data
            .date_of_birth
            .or(current.date_of_birth)
            .map(|d| d.format(DATE_FORMAT).to_string());
        let image_url = data.image_url.clone().or(current.image_url);

        conn.execute(
            r#"
            UPDATE users
            SET name = ?1, gender = ?2, date_of_birth = ?3, image_url = ?4,
                updated_at = datetime('now')
            WHERE id = ?5
            "#,
            params![name, gender, date_of_birth, image_url, id],
        )?;

        Self::get_by_id(conn, id)
    }

    /// Stamp `verified_at`; false if the user is missing or already verified
    pub fn mark_verified(conn: &Connection, id: i64) -> DbResult<bool> {
        let changed = conn.execute(
            r#"
            UPDATE users
            SET verified_at = datetime('now'), updated_at = datetime('now')
            WHERE id = ?1 AND verified_at IS NULL
            "#,
            [id],
        )?;
        Ok(changed > 0)
    }

    /// Delete a user only while still unverified; false when nothing was deleted
    pub fn delete_unverified(conn: &Connection, id: i64) -> DbResult<bool> {
        let deleted = conn.execute(
            "DELETE FROM users WHERE id = ?1 AND verified_at IS NULL",
            [id],
        )?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_database;

    fn new_user(conn: &Connection, email: &str) -> User {
        User::create(
            conn,
            &UserCreate {
                name: "Ayu".to_string(),
                email: email.to_string(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_create_and_find_by_email_ignores_case() {
        let (_dir, db) = test_database();
        let conn = db.get_conn().unwrap();
        let user = new_user(&conn, "ayu@example.com");
        assert!(!user.is_verified());
        assert!(user.gender.is_none());

        let found = User::find_by_email(&conn, "AYU@example.com").unwrap().unwrap();
        assert_eq!(found.id, user.id);

        let duplicate = User::create(
            &conn,
            &UserCreate {
                name: String::new(),
                email: "Ayu@Example.com".to_string(),
            },
        );
        assert!(duplicate.is_err());
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let (_dir, db) = test_database();
        let conn = db.get_conn().unwrap();
        let user = new_user(&conn, "ayu@example.com");

        let dob = NaiveDate::from_ymd_opt(1995, 3, 20).unwrap();
        let updated = User::update(
            &conn,
            user.id,
            &UserUpdate {
                gender: Some(Gender::Female),
                date_of_birth: Some(dob),
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();
        assert_eq!(updated.name, "Ayu");
        assert_eq!(updated.gender.as_deref(), Some("female"));
        assert_eq!(updated.date_of_birth, Some(dob));

        assert!(User::update(&conn, 9999, &UserUpdate::default()).unwrap().is_none());
    }

    #[test]
    fn test_delete_unverified_spares_verified_users() {
        let (_dir, db) = test_database();
        let conn = db.get_conn().unwrap();
        let verified = new_user(&conn, "a@example.com");
        let pending = new_user(&conn, "b@example.com");

        assert!(User::mark_verified(&conn, verified.id).unwrap());
        assert!(!User::mark_verified(&conn, verified.id).unwrap());

        assert!(!User::delete_unverified(&conn, verified.id).unwrap());
        assert!(User::delete_unverified(&conn, pending.id).unwrap());
        assert!(User::get_by_id(&conn, verified.id).unwrap().is_some());
        assert!(User::get_by_id(&conn, pending.id).unwrap().is_none());
    }
}
