//! SweetLife Tools module
//!
//! Service operations behind the MCP tools. Each takes the collaborators it
//! needs explicitly so it can be tested without the server.

pub mod catalog;
pub mod dashboard;
pub mod foods;
pub mod health_profiles;
pub mod recommendations;
pub mod status;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;
