//! Food catalog model
//!
//! Nutrition is stored per 100 g portion. Names are unique ignoring case.

use std::collections::HashMap;

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::{DbError, DbResult};
use super::Nutrition;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Food {
    pub id: i64,
    pub name: String,
    pub image_url: Option<String>,
    /// Per 100 g
    pub nutrition: Nutrition,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodCreate {
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
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

impl FoodCreate {
    pub fn nutrition(&self) -> Nutrition {
        Nutrition {
            calories: self.calories,
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
            sugar: self.sugar,
        }
    }
}

impl Food {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            image_url: row.get("image_url")?,
            nutrition: Nutrition {
                calories: row.get("calories")?,
                protein: row.get("protein")?,
                carbs: row.get("carbs")?,
                fat: row.get("fat")?,
                sugar: row.get("sugar")?,
            },
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn create(conn: &Connection, data: &FoodCreate) -> DbResult<Self> {
        conn.execute(
            r#"
            INSERT INTO foods (name, image_url, calories, protein, carbs, fat, sugar)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                data.name.trim(),
                data.image_url,
                data.calories,
                data.protein,
                data.carbs,
                data.fat,
                data.sugar,
            ],
        )?;

        let id = conn.last_insert_rowid();
        Self::get_by_id(conn, id)?.ok_or(DbError::MissingAfterWrite("food"))
    }

    /// Insert, or refresh nutrition and image of the food with the same name
    pub fn upsert_by_name(conn: &Connection, data: &FoodCreate) -> DbResult<Self> {
        conn.execute(
            r#"
            INSERT INTO foods (name, image_url, calories, protein, carbs, fat, sugar)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(name) DO UPDATE SET
                image_url = COALESCE(excluded.image_url, foods.image_url),
                calories = excluded.calories,
                protein = excluded.protein,
                carbs = excluded.carbs,
                fat = excluded.fat,
                sugar = excluded.sugar,
                updated_at = datetime('now')
            "#,
            params![
                data.name.trim(),
                data.image_url,
                data.calories,
                data.protein,
                data.carbs,
                data.fat,
                data.sugar,
            ],
        )?;

        Self::find_by_name(conn, &data.name)?.ok_or(DbError::MissingAfterWrite("food"))
    }

    pub fn get_by_id(conn: &Connection, id: i64) -> DbResult<Option<Self>> {
        let mut stmt = conn.prepare("SELECT * FROM foods WHERE id = ?1")?;

        match stmt.query_row([id], Self::from_row) {
            Ok(food) => Ok(Some(food)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Exact name match, ignoring case
    pub fn find_by_name(conn: &Connection, name: &str) -> DbResult<Option<Self>> {
        let mut stmt = conn.prepare("SELECT * FROM foods WHERE name = ?1")?;

        match stmt.query_row([name.trim()], Self::from_row) {
            Ok(food) => Ok(Some(food)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Substring search on name
    /// Map lowercased names to ids for the names that exist in the catalog
    pub fn ids_by_names(conn: &Connection, names: &[String]) -> DbResult<HashMap<String, i64>> {
        let mut stmt = conn.prepare("SELECT id FROM foods WHERE name = ?1")?;
        let mut ids = HashMap::new();

        for name in names {
            let key = name.trim().to_lowercase();
            if ids.contains_key(&key) {
                continue;
            }
            match stmt.query_row([name.trim()], |row| row.get::<_, i64>(0)) {
                Ok(id) => {
                    ids.insert(key, id);
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(ids)
    }

    pub fn count(conn: &Connection) -> DbResult<i64> {
        let count = conn.query_row("SELECT COUNT(*) FROM foods", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_database;

    fn rice() -> FoodCreate {
        FoodCreate {
            name: "Nasi Putih".into(),
            image_url: None,
            calories: 130.0,
            protein: 2.7,
            carbs: 28.0,
            fat: 0.3,
            sugar: 0.1,
        }
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let (_dir, db) = test_database();
        let conn = db.get_conn().unwrap();
        let food = Food::create(&conn, &rice()).unwrap();

        let found = Food::find_by_name(&conn, "nasi putih").unwrap().unwrap();
        assert_eq!(found.id, food.id);

        let dup = FoodCreate {
            name: "NASI PUTIH".into(),
            ..rice()
        };
        assert!(Food::create(&conn, &dup).is_err());
    }

    #[test]
    fn test_upsert_refreshes_nutrition() {
        let (_dir, db) = test_database();
        let conn = db.get_conn().unwrap();
        let first = Food::upsert_by_name(&conn, &rice()).unwrap();
        let second = Food::upsert_by_name(
            &conn,
            &FoodCreate {
                calories: 129.0,
                ..rice()
            },
        )
        .unwrap();
        assert_eq!(first.id, second.id);
        assert!((second.nutrition.calories - 129.0).abs() < 0.001);
        assert_eq!(Food::count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_ids_by_names() {
        let (_dir, db) = test_database();
        let conn = db.get_conn().unwrap();
        let rice = Food::create(&conn, &rice()).unwrap();
        Food::create(
            &conn,
            &FoodCreate {
                name: "Tempe Goreng".into(),
                image_url: None,
                calories: 225.0,
                protein: 18.0,
                carbs: 10.0,
                fat: 13.0,
                sugar: 0.0,
            },
        )
        .unwrap();

        let ids = Food::ids_by_names(&conn, &["NASI PUTIH".to_string(), "Rendang".to_string()]).unwrap();
        assert_eq!(ids.get("nasi putih"), Some(&rice.id));
        assert!(!ids.contains_key("rendang"));
    }
}
