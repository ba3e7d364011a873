//! Mini course and mini grocery listing tools

use serde::Serialize;

use crate::db::Database;
use crate::error::ServiceResult;
use crate::models::{MiniCourse, MiniGrocery};

const DEFAULT_PAGE_LIMIT: i64 = 10;
const MAX_PAGE_LIMIT: i64 = 100;

/// Page position of a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total_items: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    /// Pages are 1-based; a page past the end yields an empty listing.
    pub fn new(page: i64, limit: i64, total_items: i64) -> Self {
        let (page, limit) = clamp_page(page, limit);
        let total_pages = (total_items + limit - 1) / limit;
        Self {
            page,
            limit,
            total_items,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// Page below 1 becomes 1; limit below 1 becomes the default, above the max is capped
pub fn clamp_page(page: i64, limit: i64) -> (i64, i64) {
    let page = page.max(1);
    let limit = if limit < 1 {
        DEFAULT_PAGE_LIMIT
    } else {
        limit.min(MAX_PAGE_LIMIT)
    };
    (page, limit)
}

/// Response for list_mini_courses and list_mini_groceries
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

pub fn list_mini_courses(db: &Database, page: i64, limit: i64) -> ServiceResult<PaginatedResponse<MiniCourse>> {
    let response = db.with_conn(|conn| {
        let pagination = Pagination::new(page, limit, MiniCourse::count(conn)?);
        let data = MiniCourse::list_page(conn, pagination.offset(), pagination.limit)?;
        Ok(PaginatedResponse { data, pagination })
    })?;
    Ok(response)
}

pub fn list_mini_groceries(db: &Database, page: i64, limit: i64) -> ServiceResult<PaginatedResponse<MiniGrocery>> {
    let response = db.with_conn(|conn| {
        let pagination = Pagination::new(page, limit, MiniGrocery::count(conn)?);
        let data = MiniGrocery::list_page(conn, pagination.offset(), pagination.limit)?;
        Ok(PaginatedResponse { data, pagination })
    })?;
    Ok(response)
}
