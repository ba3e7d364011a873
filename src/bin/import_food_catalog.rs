//! Seed the food catalog, mini courses or mini groceries from a JSON file
//!
//! Usage: import_food_catalog <file.json> [foods|courses|groceries]
//!
//! Foods (the default) hold nutrition per 100 g:
//! `[{"name": "Nasi Putih", "calories": 130, "protein": 2.7, "carbs": 28, "fat": 0.3, "sugar": 0.1}]`.
//! Existing foods with the same name are updated. Courses and groceries are
//! appended:
//! `[{"title": "Carb counting", "image": "...", "url": "...", "description": "..."}]`,
//! `[{"name": "Rolled oats", "image": "...", "url": "...", "price": 32000}]`.

use rusqlite::Connection;
use sweetlife::config::AppConfig;
use sweetlife::db::{migrations, Database, DbResult};
use sweetlife::models::{Food, FoodCreate, MiniCourse, MiniCourseCreate, MiniGrocery, MiniGroceryCreate};

fn import_foods(conn: &Connection, foods: &[FoodCreate]) -> DbResult<i64> {
    let mut skipped = 0;
    for food in foods {
        if food.name.trim().is_empty() || food.calories < 0.0 {
            skipped += 1;
            continue;
        }
        let saved = Food::upsert_by_name(conn, food)?;
        println!("  {:>5}  {}", saved.id, saved.name);
    }
    if skipped > 0 {
        println!("Skipped {} invalid entries", skipped);
    }
    Food::count(conn)
}

fn import_courses(conn: &Connection, courses: &[MiniCourseCreate]) -> DbResult<i64> {
    for course in courses {
        let saved = MiniCourse::create(conn, course)?;
        println!("  {:>5}  {}", saved.id, saved.title);
    }
    MiniCourse::count(conn)
}

fn import_groceries(conn: &Connection, groceries: &[MiniGroceryCreate]) -> DbResult<i64> {
    let mut skipped = 0;
    for grocery in groceries {
        if grocery.name.trim().is_empty() || grocery.price < 0.0 {
            skipped += 1;
            continue;
        }
        let saved = MiniGrocery::create(conn, grocery)?;
        println!("  {:>5}  {}", saved.id, saved.name);
    }
    if skipped > 0 {
        println!("Skipped {} invalid entries", skipped);
    }
    MiniGrocery::count(conn)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .ok_or("usage: import_food_catalog <file.json> [foods|courses|groceries]")?;
    let kind = args.next().unwrap_or_else(|| "foods".to_string());

    let config = AppConfig::from_env()?;
    println!("Database path: {}", config.database_path.display());
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let raw = std::fs::read_to_string(&path)?;
    let database = Database::new(&config.database_path)?;

    match kind.as_str() {
        "foods" => {
            let foods: Vec<FoodCreate> = serde_json::from_str(&raw)?;
            println!("Importing {} foods from {}", foods.len(), path);
            let total = database.with_conn(|conn| {
                migrations::run_migrations(conn)?;
                import_foods(conn, &foods)
            })?;
            println!("Catalog now holds {} foods", total);
        }
        "courses" => {
            let courses: Vec<MiniCourseCreate> = serde_json::from_str(&raw)?;
            println!("Importing {} mini courses from {}", courses.len(), path);
            let total = database.with_conn(|conn| {
                migrations::run_migrations(conn)?;
                import_courses(conn, &courses)
            })?;
            println!("Now holding {} mini courses", total);
        }
        "groceries" => {
            let groceries: Vec<MiniGroceryCreate> = serde_json::from_str(&raw)?;
            println!("Importing {} mini groceries from {}", groceries.len(), path);
            let total = database.with_conn(|conn| {
                migrations::run_migrations(conn)?;
                import_groceries(conn, &groceries)
            })?;
            println!("Now holding {} mini groceries", total);
        }
        other => return Err(format!("unknown kind '{}', expected foods, courses or groceries", other).into()),
    }

    Ok(())
}
