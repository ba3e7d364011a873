//! Food log model
//!
//! What a user ate and when. An entry with a positive weight is measured in
//! grams; otherwise it counts whole 100 g catalog portions.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbResult;
use super::Nutrition;

pub const LOGGED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodLogCreate {
    pub food_id: i64,
    pub units: i64,
    pub weight_g: Option<f64>,
    pub logged_at: NaiveDateTime,
}

/// A log row joined with its food
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodLogEntry {
    pub id: i64,
    pub food_id: i64,
    pub food_name: String,
    pub units: i64,
    pub weight_g: Option<f64>,
    pub nutrition: Nutrition,
    pub logged_at: String,
}

/// Totals eaten by one user on one day
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumedTotals {
    pub total_calories: f64,
    pub total_carbs: f64,
    pub total_sugar: f64,
}

/// Nutrition of one entry given the food's per-100 g values
pub fn consumed_nutrition(per_100g: &Nutrition, units: i64, weight_g: Option<f64>) -> Nutrition {
    match weight_g {
        Some(weight) if weight > 0.0 => per_100g.for_weight(weight),
        _ => per_100g.scale(units as f64),
    }
}

fn day_bounds(day: NaiveDate) -> (String, String) {
    let start = day.format("%Y-%m-%dT00:00:00").to_string();
    let end = day
        .succ_opt()
        .map(|next| next.format("%Y-%m-%dT00:00:00").to_string())
        .unwrap_or_else(|| day.format("%Y-%m-%dT23:59:59.999").to_string());
    (start, end)
}

impl FoodLogEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let per_100g = Nutrition {
            calories: row.get("calories")?,
            protein: row.get("protein")?,
            carbs: row.get("carbs")?,
            fat: row.get("fat")?,
            sugar: row.get("sugar")?,
        };
        let units: i64 = row.get("units")?;
        let weight_g: Option<f64> = row.get("weight_g")?;

        Ok(Self {
            id: row.get("id")?,
            food_id: row.get("food_id")?,
            food_name: row.get("food_name")?,
            units,
            weight_g,
            nutrition: consumed_nutrition(&per_100g, units, weight_g),
            logged_at: row.get("logged_at")?,
        })
    }
}

/// Insert entries for a user; returns the new ids in order
pub fn create_logs(conn: &Connection, user_id: i64, entries: &[FoodLogCreate]) -> DbResult<Vec<i64>> {
    let mut stmt = conn.prepare(
        r#"
        INSERT INTO food_logs (user_id, food_id, units, weight_g, logged_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )?;

    let mut ids = Vec::with_capacity(entries.len());
    for entry in entries {
        stmt.execute(params![
            user_id,
            entry.food_id,
            entry.units,
            entry.weight_g,
            entry.logged_at.format(LOGGED_AT_FORMAT).to_string(),
        ])?;
        ids.push(conn.last_insert_rowid());
    }

    Ok(ids)
}

/// Sum a user's entries for one day, each total rounded to 1 decimal
pub fn daily_totals(conn: &Connection, user_id: i64, day: NaiveDate) -> DbResult<ConsumedTotals> {
    let (start, end) = day_bounds(day);

    let totals = conn.query_row(
        r#"
        SELECT
            ROUND(COALESCE(SUM(
                CASE WHEN l.weight_g IS NOT NULL AND l.weight_g > 0
                     THEN f.calories * (l.weight_g / 100.0)
                     ELSE f.calories * l.units
                END), 0), 1) AS total_calories,
            ROUND(COALESCE(SUM(
                CASE WHEN l.weight_g IS NOT NULL AND l.weight_g > 0
                     THEN f.carbs * (l.weight_g / 100.0)
                     ELSE f.carbs * l.units
                END), 0), 1) AS total_carbs,
            ROUND(COALESCE(SUM(
                CASE WHEN l.weight_g IS NOT NULL AND l.weight_g > 0
                     THEN f.sugar * (l.weight_g / 100.0)
                     ELSE f.sugar * l.units
                END), 0), 1) AS total_sugar
        FROM food_logs l
        JOIN foods f ON f.id = l.food_id
        WHERE l.user_id = ?1 AND l.logged_at >= ?2 AND l.logged_at < ?3
        "#,
        params![user_id, start, end],
        |row| {
            Ok(ConsumedTotals {
                total_calories: row.get("total_calories")?,
                total_carbs: row.get("total_carbs")?,
                total_sugar: row.get("total_sugar")?,
            })
        },
    )?;

    Ok(totals)
}

/// Most recent entries first
pub fn history(conn: &Connection, user_id: i64, limit: i64) -> DbResult<Vec<FoodLogEntry>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT l.id, l.food_id, f.name AS food_name, l.units, l.weight_g, l.logged_at,
               f.calories, f.protein, f.carbs, f.fat, f.sugar
        FROM food_logs l
        JOIN foods f ON f.id = l.food_id
        WHERE l.user_id = ?1
        ORDER BY l.logged_at DESC, l.id DESC
        LIMIT ?2
        "#,
    )?;

    let entries = stmt
        .query_map(params![user_id, limit], FoodLogEntry::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}
