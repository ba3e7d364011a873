//! Mini course model
//!
//! Short lessons linked from the app, listed page by page.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::{DbError, DbResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiniCourse {
    pub id: i64,
    pub title: String,
    pub image: String,
    pub url: String,
    pub description: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiniCourseCreate {
    pub title: String,
    pub image: String,
    pub url: String,
    pub description: String,
}

impl MiniCourse {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            image: row.get("image")?,
            url: row.get("url")?,
            description: row.get("description")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn create(conn: &Connection, data: &MiniCourseCreate) -> DbResult<Self> {
        conn.execute(
            r#"
            INSERT INTO mini_courses (title, image, url, description)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![data.title.trim(), data.image, data.url, data.description],
        )?;

        let id = conn.last_insert_rowid();
        Self::get_by_id(conn, id)?.ok_or(DbError::MissingAfterWrite("mini course"))
    }

    pub fn get_by_id(conn: &Connection, id: i64) -> DbResult<Option<Self>> {
        let mut stmt = conn.prepare("SELECT * FROM mini_courses WHERE id = ?1")?;

        match stmt.query_row([id], Self::from_row) {
            Ok(course) => Ok(Some(course)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// One page in insertion order
    pub fn list_page(conn: &Connection, offset: i64, limit: i64) -> DbResult<Vec<Self>> {
        let mut stmt = conn.prepare("SELECT * FROM mini_courses ORDER BY id ASC LIMIT ?1 OFFSET ?2")?;

        let courses = stmt
            .query_map(params![limit, offset], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(courses)
    }

    pub fn count(conn: &Connection) -> DbResult<i64> {
        let count = conn.query_row("SELECT COUNT(*) FROM mini_courses", [], |row| row.get(0))?;
        Ok(count)
    }
}
