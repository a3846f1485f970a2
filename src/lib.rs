//! DB Query Server Library
//!
//! This library provides MCP (Model Context Protocol) tools for AI assistants
//! to query a single SQL database (PostgreSQL or SQLite) and receive the results
//! as JSON, CSV or an HTML table.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::DbError;
pub use mcp::DbService;
