//! SweetLife Library
//!
//! Daily nutrition targets, progress tracking and diabetes risk for the
//! SweetLife MCP server.

pub mod build_info;
pub mod config;
pub mod db;
pub mod error;
pub mod external;
pub mod mcp;
pub mod models;
pub mod nutrition;
pub mod tools;
