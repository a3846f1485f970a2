//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - The backend capability trait and its sqlx-backed pool
//! - Statement execution and cell decoding
//! - Parameter ordering and binding
//! - Row materialization and schema introspection
//! - Database dispatch macros for reducing code duplication

pub mod backend;
pub mod executor;
#[macro_use]
pub mod macros;
pub mod materializer;
pub mod mock;
pub mod params;
pub mod pool;
pub mod schema;
pub mod types;

pub use backend::{Backend, ResultTable};
pub use materializer::RowMaterializer;
pub use mock::MockBackend;
pub use params::order_named_params;
pub use pool::DbPool;
pub use schema::SchemaInspector;
