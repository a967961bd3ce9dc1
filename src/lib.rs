// Time-series query composition and retrieval engine for dashboard
// datasources: a typed catalog of series transformations, serializable
// per-target pipelines, and a concurrent aggregation query client.
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{DatasourceError, Result};
