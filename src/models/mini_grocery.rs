//! Mini grocery model
//!
//! Diabetes-friendly products with a link to where they are sold.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::{DbError, DbResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiniGrocery {
    pub id: i64,
    pub name: String,
    pub image: String,
    pub url: String,
    pub price: f64,
    pub description: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiniGroceryCreate {
    pub name: String,
    pub image: String,
    pub url: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub description: String,
}

impl MiniGrocery {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            image: row.get("image")?,
            url: row.get("url")?,
            price: row.get("price")?,
            description: row.get("description")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn create(conn: &Connection, data: &MiniGroceryCreate) -> DbResult<Self> {
        conn.execute(
            r#"
            INSERT INTO mini_groceries (name, image, url, price, description)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![data.name.trim(), data.image, data.url, data.price, data.description],
        )?;

        let id = conn.last_insert_rowid();
        Self::get_by_id(conn, id)?.ok_or(DbError::MissingAfterWrite("mini grocery"))
    }

    pub fn get_by_id(conn: &Connection, id: i64) -> DbResult<Option<Self>> {
        let mut stmt = conn.prepare("SELECT * FROM mini_groceries WHERE id = ?1")?;

        match stmt.query_row([id], Self::from_row) {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// One page in insertion order
    pub fn list_page(conn: &Connection, offset: i64, limit: i64) -> DbResult<Vec<Self>> {
        let mut stmt = conn.prepare("SELECT * FROM mini_groceries ORDER BY id ASC LIMIT ?1 OFFSET ?2")?;

        let items = stmt
            .query_map(params![limit, offset], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(items)
    }

    pub fn count(conn: &Connection) -> DbResult<i64> {
        let count = conn.query_row("SELECT COUNT(*) FROM mini_groceries", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_database;

    #[test]
    fn test_create_rejects_negative_price() {
        let (_dir, db) = test_database();
        let conn = db.get_conn().unwrap();
        let oats = MiniGrocery::create(
            &conn,
            &MiniGroceryCreate {
                name: " Rolled Oats ".into(),
                image: "https://cdn.example.com/grocery/oats.jpg".into(),
                url: "https://shop.example.com/oats".into(),
                price: 32000.0,
                description: "Low glycemic breakfast".into(),
            },
        )
        .unwrap();
        assert_eq!(oats.name, "Rolled Oats");

        let negative = MiniGrocery::create(
            &conn,
            &MiniGroceryCreate {
                name: "Broken".into(),
                image: String::new(),
                url: String::new(),
                price: -1.0,
                description: String::new(),
            },
        );
        assert!(negative.is_err());
        assert_eq!(MiniGrocery::count(&conn).unwrap(), 1);
        assert_eq!(MiniGrocery::list_page(&conn, 0, 10).unwrap().len(), 1);
    }
}
