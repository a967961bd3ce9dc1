// Application layer - query orchestration and metadata caching
pub mod metadata_cache;
pub mod query_service;
pub mod transport;
