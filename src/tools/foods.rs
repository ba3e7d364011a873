//! Food MCP Tools
//!
//! Catalog management, nutrition search, image scanning, food logging and
//! history.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::external::{generate_file_name, BlobStore, InferenceService, NutritionLookup};
use crate::models::food_log::{self, LOGGED_AT_FORMAT};
use crate::models::{Food, FoodCreate, FoodLogCreate, User, PORTION_GRAMS};
use crate::nutrition::round_half_up;

const SCAN_FOOD_PREFIX: &str = "scan-food";

/// Response for add_food
#[derive(Debug, Serialize)]
pub struct AddFoodResponse {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// Add a catalog food with nutrition per 100 g
pub fn add_food(db: &Database, data: FoodCreate) -> ServiceResult<AddFoodResponse> {
    let name = data.name.trim();
    if name.is_empty() {
        return Err(ServiceError::invalid("Food name cannot be empty"));
    }
    if !data.nutrition().is_valid() {
        return Err(ServiceError::invalid("Nutrition values must be finite and non-negative"));
    }

    let conn = db.get_conn()?;
    if Food::find_by_name(&conn, name)?.is_some() {
        return Err(ServiceError::invalid(format!("Food '{}' already exists", name)));
    }

    let food = Food::create(&conn, &data)?;
    info!("Added food {} ({})", food.id, food.name);

    Ok(AddFoodResponse {
        id: food.id,
        name: food.name,
        created_at: food.created_at,
    })
}

/// Response for search_food: nutrition scaled to the requested weight
#[derive(Debug, Serialize)]
pub struct SearchFoodResponse {
    pub name: String,
    pub calories: f64,
    pub protein: f64,
    pub sugar: f64,
    pub carbohydrate: f64,
    pub fat: f64,
    pub weight: f64,
    /// "catalog" or "lookup"
    pub source: &'static str,
}

/// Find a food by name, asking the nutrition lookup service (and saving its
/// answer to the catalog) when the catalog has no match
pub async fn search_food(
    db: &Database,
    lookup: &dyn NutritionLookup,
    name: &str,
    weight_g: Option<f64>,
) -> ServiceResult<SearchFoodResponse> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::invalid("Food name cannot be empty"));
    }
    let weight = weight_g.unwrap_or(PORTION_GRAMS);
    if !weight.is_finite() || weight <= 0.0 {
        return Err(ServiceError::invalid("weight must be greater than zero"));
    }

    let (food, source) = match db.with_conn(|conn| Food::find_by_name(conn, name))? {
        Some(food) => (food, "catalog"),
        None => {
            debug!("'{}' not in catalog, asking nutrition lookup", name);
            let per_100g = lookup.lookup(name).await?;
            let food = db.with_conn(|conn| {
                Food::upsert_by_name(
                    conn,
                    &FoodCreate {
                        name: name.to_string(),
                        image_url: None,
                        calories: per_100g.calories,
                        protein: per_100g.protein,
                        carbs: per_100g.carbs,
                        fat: per_100g.fat,
                        sugar: per_100g.sugar,
                    },
                )
            })?;
            info!("Saved '{}' from nutrition lookup as food {}", food.name, food.id);
            (food, "lookup")
        }
    };

    let scaled = food.nutrition.for_weight(weight);
    Ok(SearchFoodResponse {
        name: food.name,
        calories: scaled.calories,
        protein: scaled.protein,
        sugar: scaled.sugar,
        carbohydrate: scaled.carbs,
        fat: scaled.fat,
        weight,
        source,
    })
}

/// One recognised food on a scanned image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScannedFood {
    pub name: String,
    pub unit: i64,
    pub calories: f64,
    pub protein: f64,
    pub sugar: f64,
    pub carbohydrate: f64,
    pub fat: f64,
}

/// Response for scan_food
#[derive(Debug, Serialize)]
pub struct ScanFoodResponse {
    pub is_detected: bool,
    pub food_list: Vec<ScannedFood>,
    pub image_url: String,
}

/// Upload an image, let the model detect foods on it, and price each
/// detected food from the catalog. Foods missing from the catalog are skipped.
pub async fn scan_food(
    db: &Database,
    store: &dyn BlobStore,
    inference: &dyn InferenceService,
    image_path: &str,
) -> ServiceResult<ScanFoodResponse> {
    let path = Path::new(image_path);
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ServiceError::invalid(format!("Cannot read image '{}': {}", image_path, e)))?;
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let key = format!("{}/{}", SCAN_FOOD_PREFIX, generate_file_name(extension));
    let image_url = store.upload(&key, bytes).await?;

    let detected = inference.scan_food(&image_url).await?;
    debug!("Model detected {} object(s) on {}", detected.len(), image_url);

    // Sum units per food, keyed case-insensitively
    let mut totals: BTreeMap<String, (String, i64)> = BTreeMap::new();
    for object in &detected {
        let name = object.name.trim();
        if name.is_empty() {
            continue;
        }
        let entry = totals
            .entry(name.to_lowercase())
            .or_insert_with(|| (name.to_string(), 0));
        entry.1 += object.unit.max(0);
    }

    let conn = db.get_conn()?;
    let mut food_list = Vec::with_capacity(totals.len());
    for (name, units) in totals.values() {
        let Some(food) = Food::find_by_name(&conn, name)? else {
            warn!("Detected food '{}' is not in the catalog, skipping", name);
            continue;
        };
        let n = food.nutrition.scale(*units as f64);
        food_list.push(ScannedFood {
            name: food.name,
            unit: *units,
            calories: n.calories,
            protein: n.protein,
            sugar: n.sugar,
            carbohydrate: n.carbs,
            fat: n.fat,
        });
    }

    Ok(ScanFoodResponse {
        is_detected: !totals.is_empty(),
        food_list,
        image_url,
    })
}

/// A scanned food counted in portions
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScannedEntry {
    pub name: String,
    pub unit: i64,
}

/// A manually added food measured in grams
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdditionalEntry {
    pub name: String,
    pub weight: f64,
}

/// Response for log_food
#[derive(Debug, Serialize)]
pub struct LogFoodResponse {
    pub success: bool,
    pub logged: usize,
    pub ids: Vec<i64>,
    pub logged_at: String,
}

/// Log scanned and additional foods for a user in one transaction
pub fn log_food(
    db: &Database,
    user_id: i64,
    scanned: &[ScannedEntry],
    additional: &[AdditionalEntry],
    logged_at: NaiveDateTime,
) -> ServiceResult<LogFoodResponse> {
    if scanned.is_empty() && additional.is_empty() {
        return Err(ServiceError::invalid("Nothing to log"));
    }
    if let Some(bad) = scanned.iter().find(|e| e.unit < 1) {
        return Err(ServiceError::invalid(format!("unit for '{}' must be at least 1", bad.name)));
    }
    if let Some(bad) = additional.iter().find(|e| !e.weight.is_finite() || e.weight <= 0.0) {
        return Err(ServiceError::invalid(format!("weight for '{}' must be greater than zero", bad.name)));
    }

    let names: Vec<String> = scanned
        .iter()
        .map(|e| e.name.clone())
        .chain(additional.iter().map(|e| e.name.clone()))
        .collect();

    let ids = db.with_transaction(|tx| {
        if User::get_by_id(tx, user_id)?.is_none() {
            return Err(ServiceError::not_found("User", user_id));
        }

        let food_ids = Food::ids_by_names(tx, &names)?;
        let food_id = |name: &str| {
            food_ids
                .get(&name.trim().to_lowercase())
                .copied()
                .ok_or_else(|| ServiceError::not_found("Food", name.trim()))
        };

        let mut entries = Vec::with_capacity(names.len());
        for e in scanned {
            entries.push(FoodLogCreate {
                food_id: food_id(&e.name)?,
                units: e.unit,
                weight_g: None,
                logged_at,
            });
        }
        for e in additional {
            entries.push(FoodLogCreate {
                food_id: food_id(&e.name)?,
                units: 1,
                weight_g: Some(e.weight),
                logged_at,
            });
        }

        Ok(food_log::create_logs(tx, user_id, &entries)?)
    })?;

    info!("Logged {} food(s) for user {}", ids.len(), user_id);
    Ok(LogFoodResponse {
        success: true,
        logged: ids.len(),
        ids,
        logged_at: logged_at.format(LOGGED_AT_FORMAT).to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct FoodHistoryItem {
    pub id: i64,
    pub food_name: String,
    pub calories: f64,
    /// HH:MM
    pub time: String,
    pub units: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct FoodHistoryDay {
    /// YYYY-MM-DD
    pub date: String,
    pub total_calories: f64,
    pub entries: Vec<FoodHistoryItem>,
}

/// Response for get_food_history
#[derive(Debug, Serialize)]
pub struct FoodHistoryResponse {
    pub food_history: Vec<FoodHistoryDay>,
}

/// Recent entries grouped by day, newest day first
pub fn get_food_history(db: &Database, user_id: i64, limit: i64) -> ServiceResult<FoodHistoryResponse> {
    let limit = limit.clamp(1, 500);
    let conn = db.get_conn()?;
    if User::get_by_id(&conn, user_id)?.is_none() {
        return Err(ServiceError::not_found("User", user_id));
    }
    let entries = food_log::history(&conn, user_id, limit)?;

    let mut days: Vec<FoodHistoryDay> = Vec::new();
    for entry in entries {
        let (date, time) = match NaiveDateTime::parse_from_str(&entry.logged_at, LOGGED_AT_FORMAT) {
            Ok(at) => (at.format("%Y-%m-%d").to_string(), at.format("%H:%M").to_string()),
            Err(_) => (entry.logged_at.chars().take(10).collect(), String::new()),
        };

        // history() is ordered by time, so a day's entries are contiguous
        if days.last().map(|d| d.date != date).unwrap_or(true) {
            days.push(FoodHistoryDay {
                date,
                total_calories: 0.0,
                entries: Vec::new(),
            });
        }
        if let Some(day) = days.last_mut() {
            day.total_calories += entry.nutrition.calories;
            day.entries.push(FoodHistoryItem {
                id: entry.id,
                food_name: entry.food_name,
                calories: round_half_up(entry.nutrition.calories, 1),
                time,
                units: entry.units,
                weight: entry.weight_g,
            });
        }
    }

    for day in &mut days {
        day.total_calories = round_half_up(day.total_calories, 1);
    }

    Ok(FoodHistoryResponse { food_history: days })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_database;
    use crate::external::{DetectedFood, LocalBlobStore};
    use crate::models::{Nutrition, UserCreate};
    use crate::tools::testing::{FakeInference, FakeLookup};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn food(name: &str, calories: f64, carbs: f64, sugar: f64) -> FoodCreate {
        FoodCreate {
            name: name.into(),
            image_url: None,
            calories,
            protein: 2.0,
            carbs,
            fat: 1.0,
            sugar,
        }
    }

    fn seeded() -> (TempDir, Database, i64) {
        let (dir, db) = test_database();
        add_food(&db, food("Nasi Putih", 130.0, 28.0, 0.1)).unwrap();
        add_food(&db, food("Telur Rebus", 155.0, 1.1, 1.1)).unwrap();
        let user_id = db
            .with_conn(|conn| User::create(conn, &UserCreate { name: "Ayu".into(), email: "ayu@example.com".into() }))
            .unwrap()
            .id;
        (dir, db, user_id)
    }

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_add_food_validation() {
        let (_dir, db, _) = seeded();
        assert!(matches!(add_food(&db, food("  ", 1.0, 1.0, 1.0)), Err(ServiceError::InvalidInput(_))));
        assert!(matches!(add_food(&db, food("Apel", -1.0, 1.0, 1.0)), Err(ServiceError::InvalidInput(_))));
        assert!(matches!(add_food(&db, food("nasi putih", 1.0, 1.0, 1.0)), Err(ServiceError::InvalidInput(_))));
        let found = db.with_conn(|conn| Food::find_by_name(conn, "NASI PUTIH")).unwrap().unwrap();
        assert_eq!(found.nutrition.calories, 130.0);
    }

    #[tokio::test]
    async fn test_search_food_catalog_then_lookup() {
        let (_dir, db, _) = seeded();
        let lookup = FakeLookup::with("Apple", Nutrition { calories: 52.0, protein: 0.3, carbs: 13.8, fat: 0.2, sugar: 10.4 });

        let rice = search_food(&db, &lookup, "nasi putih", Some(150.0)).await.unwrap();
        assert_eq!(rice.source, "catalog");
        assert!((rice.calories - 195.0).abs() < 0.001);
        assert!((rice.carbohydrate - 42.0).abs() < 0.001);
        assert_eq!(lookup.calls(), 0);

        let apple = search_food(&db, &lookup, "Apple", Some(200.0)).await.unwrap();
        assert_eq!(apple.source, "lookup");
        assert!((apple.calories - 104.0).abs() < 0.001);
        assert_eq!(lookup.calls(), 1);

        // saved to the catalog, so the second search stays local
        let again = search_food(&db, &lookup, "apple", None).await.unwrap();
        assert_eq!(again.source, "catalog");
        assert_eq!(again.weight, 100.0);
        assert_eq!(lookup.calls(), 1);

        assert!(matches!(
            search_food(&db, &lookup, "Durian", None).await,
            Err(ServiceError::Upstream(_))
        ));
        assert!(matches!(
            search_food(&db, &lookup, "Apple", Some(0.0)).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_scan_food_groups_and_skips_unknown() {
        let (_dir, db, _) = seeded();
        let files = TempDir::new().unwrap();
        let store = LocalBlobStore::new(files.path().join("blobs"), "http://cdn.local");
        let image = files.path().join("plate.jpg");
        std::fs::write(&image, b"jpeg").unwrap();

        let mut inference = FakeInference::with_risk(0.0, "");
        inference.detected = vec![
            DetectedFood { name: "nasi putih".into(), unit: 1 },
            DetectedFood { name: "Nasi Putih".into(), unit: 2 },
            DetectedFood { name: "telur rebus".into(), unit: 1 },
            DetectedFood { name: "rendang".into(), unit: 1 },
        ];

        let resp = scan_food(&db, &store, &inference, &image.display().to_string()).await.unwrap();
        assert!(resp.is_detected);
        assert!(resp.image_url.starts_with("http://cdn.local/scan-food/"));
        assert_eq!(inference.scanned_urls(), vec![resp.image_url.clone()]);
        assert_eq!(resp.food_list.len(), 2);

        let rice = resp.food_list.iter().find(|f| f.name == "Nasi Putih").unwrap();
        assert_eq!(rice.unit, 3);
        assert!((rice.calories - 390.0).abs() < 0.001);
        assert!((rice.carbohydrate - 84.0).abs() < 0.001);

        inference.detected.clear();
        let empty = scan_food(&db, &store, &inference, &image.display().to_string()).await.unwrap();
        assert!(!empty.is_detected);
        assert!(empty.food_list.is_empty());
    }

    #[test]
    fn test_log_food_and_history() {
        let (_dir, db, user_id) = seeded();

        log_food(
            &db,
            user_id,
            &[ScannedEntry { name: "Nasi Putih".into(), unit: 2 }],
            &[AdditionalEntry { name: "telur rebus".into(), weight: 50.0 }],
            at(4, 12, 30),
        )
        .unwrap();
        let resp = log_food(
            &db,
            user_id,
            &[ScannedEntry { name: "Telur Rebus".into(), unit: 1 }],
            &[],
            at(5, 7, 5),
        )
        .unwrap();
        assert_eq!(resp.logged, 1);
        assert_eq!(resp.logged_at, "2025-03-05T07:05:00");

        let history = get_food_history(&db, user_id, 50).unwrap();
        assert_eq!(history.food_history.len(), 2);

        let latest = &history.food_history[0];
        assert_eq!(latest.date, "2025-03-05");
        assert_eq!(latest.entries[0].time, "07:05");
        assert_eq!(latest.total_calories, 155.0);

        // 2 portions of rice + 50 g of egg
        let earlier = &history.food_history[1];
        assert_eq!(earlier.date, "2025-03-04");
        assert_eq!(earlier.entries.len(), 2);
        assert_eq!(earlier.total_calories, 337.5);
        let egg = earlier.entries.iter().find(|e| e.food_name == "Telur Rebus").unwrap();
        assert_eq!(egg.calories, 77.5);
        assert_eq!(egg.weight, Some(50.0));
    }

    #[test]
    fn test_log_food_rejects_unknown_food_atomically() {
        let (_dir, db, user_id) = seeded();

        let result = log_food(
            &db,
            user_id,
            &[ScannedEntry { name: "Nasi Putih".into(), unit: 1 }],
            &[AdditionalEntry { name: "Rendang".into(), weight: 80.0 }],
            at(4, 12, 0),
        );
        assert!(matches!(result, Err(ServiceError::NotFound { entity: "Food", .. })));
        assert!(get_food_history(&db, user_id, 10).unwrap().food_history.is_empty());

        assert!(matches!(log_food(&db, user_id, &[], &[], at(4, 12, 0)), Err(ServiceError::InvalidInput(_))));
        assert!(matches!(
            log_food(&db, user_id, &[ScannedEntry { name: "Nasi Putih".into(), unit: 0 }], &[], at(4, 12, 0)),
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            log_food(&db, 999, &[ScannedEntry { name: "Nasi Putih".into(), unit: 1 }], &[], at(4, 12, 0)),
            Err(ServiceError::NotFound { entity: "User", .. })
        ));
    }
}
