// reqwest-backed transport implementation
use crate::application::transport::Transport;
use crate::error::{DatasourceError, Result};
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn absolute_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode(url: String, response: reqwest::Response) -> Result<Value> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DatasourceError::Transport(format!(
                "{url} returned {status}: {body}"
            )));
        }
        response.json().await.map_err(|e| {
            DatasourceError::Transport(format!("failed to decode response from {url}: {e}"))
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = self.absolute_url(path);
        tracing::debug!("GET {url}");
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| DatasourceError::Transport(format!("request to {url} failed: {e}")))?;
        Self::decode(url, response).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = self.absolute_url(path);
        tracing::debug!("POST {url}");
        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| DatasourceError::Transport(format!("request to {url} failed: {e}")))?;
        Self::decode(url, response).await
    }
}
