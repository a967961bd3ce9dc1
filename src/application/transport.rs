// Transport seam between the engine and the datasource server
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Minimal HTTP surface the engine needs from its host: send a request to a
/// path relative to the configured datasource URL, get a JSON body back.
/// Injected so the orchestration logic stays independent of the concrete
/// client (and mockable for call-count assertions).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_json(&self, path: &str) -> Result<Value>;

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value>;
}
