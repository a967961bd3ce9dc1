// Aggregation query client - fans per-target requests out against the
// datasource server and joins them back into the uniform result set
use crate::application::metadata_cache::MetadataCache;
use crate::application::transport::Transport;
use crate::domain::functions::FunctionInstance;
use crate::domain::registry::FunctionRegistry;
use crate::domain::series::TimeSeriesResult;
use crate::domain::target::{QueryOptions, QueryTarget, SavedFunction};
use crate::error::{DatasourceError, Result};
use futures::future::try_join_all;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

const TOPICS_PATH: &str = "/api/topics";
const AGGREGATORS_PATH: &str = "/api/aggregators";

/// Outcome of a connectivity test, rendered by the dashboard as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub status: TestOutcome,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Success,
    Error,
}

impl ConnectionStatus {
    fn success() -> Self {
        Self {
            status: TestOutcome::Success,
            message: "Data source is working".to_string(),
        }
    }

    fn error(message: String) -> Self {
        Self {
            status: TestOutcome::Error,
            message,
        }
    }
}

pub struct TelemetryQueryService {
    transport: Arc<dyn Transport>,
    registry: Arc<FunctionRegistry>,
    topic_filters: Vec<String>,
    metadata: MetadataCache,
}

impl TelemetryQueryService {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<FunctionRegistry>,
        topic_filters: Vec<String>,
    ) -> Self {
        Self {
            transport,
            registry,
            topic_filters,
            metadata: MetadataCache::new(),
        }
    }

    /// Run every visible, topic-bearing target of `options` as a concurrent
    /// aggregation request and join the responses in target order.
    ///
    /// An empty surviving set resolves immediately without touching the
    /// network. Any single failed request fails the whole query.
    pub async fn query(&self, options: &QueryOptions) -> Result<Vec<TimeSeriesResult>> {
        let (from, to) = options.range.as_unix_seconds();
        let targets: Vec<&QueryTarget> =
            options.targets.iter().filter(|t| t.is_active()).collect();
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(
            "fanning out {} aggregation requests for [{from}, {to}]",
            targets.len()
        );
        try_join_all(
            targets
                .iter()
                .map(|target| self.fetch_target(target, from, to, options.max_data_points)),
        )
        .await
    }

    async fn fetch_target(
        &self,
        target: &QueryTarget,
        from: i64,
        to: i64,
        max_data_points: usize,
    ) -> Result<TimeSeriesResult> {
        let topic = target.topic.as_deref().unwrap_or_default();
        let aggregator = target.aggregator();

        let (path, payload) = if target.functions.is_empty() {
            let path = aggregate_path(aggregator, topic, from, to, max_data_points);
            let payload = self.transport.get_json(&path).await?;
            (path, payload)
        } else {
            // Targets carrying a pipeline go to the server-side transform
            // endpoint, stages rendered to their textual form.
            let stages = self.render_pipeline(&target.functions)?;
            let path = pipeline_path(aggregator, topic, from, to, max_data_points);
            let payload = self.transport.post_json(&path, &Value::from(stages)).await?;
            (path, payload)
        };

        let points = decode_datapoints(&path, &payload)?;
        Ok(TimeSeriesResult::from_points(
            target.display_name(),
            &points,
            target.mul,
            target.add,
        ))
    }

    fn render_pipeline(&self, stages: &[SavedFunction]) -> Result<Vec<String>> {
        stages
            .iter()
            .map(|saved| {
                let instance = FunctionInstance::from_saved(&self.registry, saved)?;
                Ok(instance.text().to_string())
            })
            .collect()
    }

    /// Probe the datasource by requesting the topic catalog. Never errors;
    /// failures come back as a structured status for the settings screen.
    pub async fn test_connection(&self) -> ConnectionStatus {
        match self.transport.get_json(TOPICS_PATH).await {
            Ok(_) => ConnectionStatus::success(),
            Err(e) => {
                ConnectionStatus::error(format!("Unable to connect to data source: {e}"))
            }
        }
    }

    /// Sorted topic catalog, fetched at most once per service instance.
    pub async fn list_topics(&self) -> Result<Vec<String>> {
        let transport = self.transport.clone();
        self.metadata
            .topics(|| async move {
                let payload = transport.get_json(TOPICS_PATH).await?;
                Ok(sorted_string_list(TOPICS_PATH, &payload))
            })
            .await
    }

    /// Topic catalog restricted by the configured substring filters; an
    /// empty filter list passes the full catalog through.
    pub async fn list_topics_filtered(&self) -> Result<Vec<String>> {
        let topics = self.list_topics().await?;
        if self.topic_filters.is_empty() {
            return Ok(topics);
        }
        Ok(topics
            .into_iter()
            .filter(|topic| self.topic_filters.iter().any(|f| topic.contains(f.as_str())))
            .collect())
    }

    /// Sorted aggregator catalog, fetched at most once per service instance.
    pub async fn list_aggregators(&self) -> Result<Vec<String>> {
        let transport = self.transport.clone();
        self.metadata
            .aggregators(|| async move {
                let payload = transport.get_json(AGGREGATORS_PATH).await?;
                Ok(sorted_string_list(AGGREGATORS_PATH, &payload))
            })
            .await
    }
}

fn aggregate_path(aggregator: &str, topic: &str, from: i64, to: i64, max_data_points: usize) -> String {
    format!(
        "/api/aggregate/{}/{}/{from}/{to}/{max_data_points}",
        urlencoding::encode(aggregator),
        urlencoding::encode(topic),
    )
}

fn pipeline_path(aggregator: &str, topic: &str, from: i64, to: i64, max_data_points: usize) -> String {
    format!(
        "/api/pipeline/{}/{}/{from}/{to}/{max_data_points}",
        urlencoding::encode(aggregator),
        urlencoding::encode(topic),
    )
}

/// Decode an aggregate payload: a JSON array of `[value, unixSeconds]`
/// pairs. `null` values are gap markers and decode to NaN; anything else
/// that is not numeric is a malformed response.
fn decode_datapoints(path: &str, payload: &Value) -> Result<Vec<(f64, f64)>> {
    let rows = payload
        .as_array()
        .ok_or_else(|| malformed(path, "expected a JSON array of datapoints"))?;
    rows.iter()
        .map(|row| {
            let pair = row
                .as_array()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| malformed(path, "expected [value, seconds] pairs"))?;
            let value = if pair[0].is_null() {
                f64::NAN
            } else {
                pair[0]
                    .as_f64()
                    .ok_or_else(|| malformed(path, "non-numeric datapoint value"))?
            };
            let seconds = pair[1]
                .as_f64()
                .ok_or_else(|| malformed(path, "non-numeric datapoint timestamp"))?;
            Ok((value, seconds))
        })
        .collect()
}

fn malformed(path: &str, detail: &str) -> DatasourceError {
    DatasourceError::MalformedResponse {
        path: path.to_string(),
        detail: detail.to_string(),
    }
}

/// Metadata payloads degrade to an empty catalog when the server answers
/// with something that is not an array.
fn sorted_string_list(path: &str, payload: &Value) -> Vec<String> {
    let mut items: Vec<String> = match payload.as_array() {
        Some(rows) => rows
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        None => {
            tracing::warn!("{path} returned a non-array payload, treating as empty");
            Vec::new()
        }
    };
    items.sort();
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::target::TimeRange;
    use async_trait::async_trait;
    use chrono::DateTime;
    use serde_json::json;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Barrier;

    #[derive(Default)]
    struct MockTransport {
        routes: HashMap<String, Value>,
        fail: HashSet<String>,
        delay_ms: HashMap<String, u64>,
        barrier: Option<Arc<Barrier>>,
        calls: Mutex<Vec<String>>,
        posts: Mutex<Vec<(String, Value)>>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self::default()
        }

        fn route(mut self, path: &str, payload: Value) -> Self {
            self.routes.insert(path.to_string(), payload);
            self
        }

        fn failing(mut self, path: &str) -> Self {
            self.fail.insert(path.to_string());
            self
        }

        fn delayed(mut self, path: &str, ms: u64) -> Self {
            self.delay_ms.insert(path.to_string(), ms);
            self
        }

        fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
            self.barrier = Some(barrier);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn posts(&self) -> Vec<(String, Value)> {
            self.posts.lock().unwrap().clone()
        }

        async fn respond(&self, path: &str) -> Result<Value> {
            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            if let Some(ms) = self.delay_ms.get(path) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            if self.fail.contains(path) {
                return Err(DatasourceError::Transport("connection refused".to_string()));
            }
            self.routes
                .get(path)
                .cloned()
                .ok_or_else(|| DatasourceError::Transport(format!("no route for {path}")))
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn get_json(&self, path: &str) -> Result<Value> {
            self.calls.lock().unwrap().push(path.to_string());
            self.respond(path).await
        }

        async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
            self.calls.lock().unwrap().push(path.to_string());
            self.posts.lock().unwrap().push((path.to_string(), body.clone()));
            self.respond(path).await
        }
    }

    fn service(transport: Arc<MockTransport>, filters: &[&str]) -> TelemetryQueryService {
        TelemetryQueryService::new(
            transport,
            Arc::new(FunctionRegistry::builtin()),
            filters.iter().map(|f| f.to_string()).collect(),
        )
    }

    fn range(from_secs: i64, to_secs: i64) -> TimeRange {
        TimeRange::new(
            DateTime::from_timestamp(from_secs, 0).unwrap(),
            DateTime::from_timestamp(to_secs, 0).unwrap(),
        )
    }

    fn options(targets: Vec<QueryTarget>) -> QueryOptions {
        QueryOptions {
            range: range(10, 20),
            max_data_points: 100,
            targets,
        }
    }

    #[tokio::test]
    async fn test_empty_target_set_resolves_without_network() {
        let transport = Arc::new(MockTransport::new());
        let service = service(transport.clone(), &[]);

        let mut hidden = QueryTarget::new("power");
        hidden.hide = true;
        let results = service
            .query(&options(vec![hidden, QueryTarget::new("")]))
            .await
            .unwrap();

        assert!(results.is_empty());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_results_preserve_target_order_across_completion_order() {
        // The first response is held back so the second completes first.
        let transport = Arc::new(
            MockTransport::new()
                .route("/api/aggregate/last/power/10/20/100", json!([[1.0, 10.0]]))
                .route("/api/aggregate/last/temp/10/20/100", json!([[2.0, 10.0]]))
                .delayed("/api/aggregate/last/power/10/20/100", 30),
        );
        let service = service(transport.clone(), &[]);

        let results = service
            .query(&options(vec![
                QueryTarget::new("power"),
                QueryTarget::new("temp"),
            ]))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].target, "power");
        assert_eq!(results[1].target, "temp");
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_requests_are_in_flight_concurrently() {
        // The barrier only opens once both fetches have been issued, so a
        // sequential client would never finish.
        let barrier = Arc::new(Barrier::new(2));
        let transport = Arc::new(
            MockTransport::new()
                .route("/api/aggregate/last/power/10/20/100", json!([]))
                .route("/api/aggregate/last/temp/10/20/100", json!([]))
                .with_barrier(barrier),
        );
        let service = service(transport.clone(), &[]);

        let results = tokio::time::timeout(
            Duration::from_secs(5),
            service.query(&options(vec![
                QueryTarget::new("power"),
                QueryTarget::new("temp"),
            ])),
        )
        .await
        .expect("requests were not issued concurrently")
        .unwrap();

        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_one_failed_request_fails_the_whole_query() {
        let transport = Arc::new(
            MockTransport::new()
                .route("/api/aggregate/last/power/10/20/100", json!([[1.0, 10.0]]))
                .failing("/api/aggregate/last/temp/10/20/100"),
        );
        let service = service(transport.clone(), &[]);

        let err = service
            .query(&options(vec![
                QueryTarget::new("power"),
                QueryTarget::new("temp"),
            ]))
            .await
            .unwrap_err();
        assert!(matches!(err, DatasourceError::Transport(_)));
    }

    #[tokio::test]
    async fn test_rescale_and_alias_are_applied_per_target() {
        let transport = Arc::new(MockTransport::new().route(
            "/api/aggregate/avg/power/10/20/100",
            json!([[10.0, 1.5], [null, 2.0]]),
        ));
        let service = service(transport.clone(), &[]);

        let mut target = QueryTarget::new("power");
        target.alias = Some("Mains".to_string());
        target.consolidate_by = Some("avg".to_string());
        target.mul = 2.0;
        target.add = 1.0;

        let results = service.query(&options(vec![target])).await.unwrap();
        assert_eq!(results[0].target, "Mains");
        assert_eq!(results[0].datapoints[0], (21.0, 1500));
        assert!(results[0].datapoints[1].0.is_nan());
        assert_eq!(results[0].datapoints[1].1, 2000);
    }

    #[tokio::test]
    async fn test_topics_with_separators_are_path_encoded() {
        let transport = Arc::new(MockTransport::new().route(
            "/api/aggregate/last/ground_floor%2Fkitchen%2Foven/10/20/100",
            json!([]),
        ));
        let service = service(transport.clone(), &[]);

        service
            .query(&options(vec![QueryTarget::new("ground_floor/kitchen/oven")]))
            .await
            .unwrap();
        assert_eq!(
            transport.calls(),
            vec!["/api/aggregate/last/ground_floor%2Fkitchen%2Foven/10/20/100"]
        );
    }

    #[tokio::test]
    async fn test_pipeline_targets_post_rendered_stages() {
        let transport = Arc::new(MockTransport::new().route(
            "/api/pipeline/last/power/10/20/100",
            json!([[4.0, 10.0]]),
        ));
        let service = service(transport.clone(), &[]);

        let mut target = QueryTarget::new("power");
        target.functions = vec![
            SavedFunction {
                name: "rolling_mean".to_string(),
                params: vec!["10".to_string(), "2".to_string()],
            },
            SavedFunction {
                name: "dropna".to_string(),
                params: Vec::new(),
            },
        ];

        let results = service.query(&options(vec![target])).await.unwrap();
        assert_eq!(results[0].datapoints, vec![(4.0, 10000)]);

        let posts = transport.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "/api/pipeline/last/power/10/20/100");
        assert_eq!(posts[0].1, json!(["rolling_mean(10, 2)", "dropna()"]));
    }

    #[tokio::test]
    async fn test_unknown_pipeline_stage_fails_before_any_request() {
        let transport = Arc::new(MockTransport::new());
        let service = service(transport.clone(), &[]);

        let mut target = QueryTarget::new("power");
        target.functions = vec![SavedFunction {
            name: "no_such_function".to_string(),
            params: Vec::new(),
        }];

        let err = service.query(&options(vec![target])).await.unwrap_err();
        assert!(matches!(err, DatasourceError::FunctionNotFound(_)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_aggregate_payload_is_an_error() {
        let transport = Arc::new(
            MockTransport::new()
                .route("/api/aggregate/last/power/10/20/100", json!({"oops": true})),
        );
        let service = service(transport.clone(), &[]);

        let err = service
            .query(&options(vec![QueryTarget::new("power")]))
            .await
            .unwrap_err();
        assert!(matches!(err, DatasourceError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_topics_are_fetched_once_and_sorted() {
        let transport = Arc::new(
            MockTransport::new().route("/api/topics", json!(["b/two", "a/one", "c/three"])),
        );
        let service = service(transport.clone(), &[]);

        for _ in 0..3 {
            let topics = service.list_topics().await.unwrap();
            assert_eq!(topics, vec!["a/one", "b/two", "c/three"]);
        }
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_topic_calls_share_one_fetch() {
        let transport =
            Arc::new(MockTransport::new().route("/api/topics", json!(["a", "b"])));
        let service = service(transport.clone(), &[]);

        let (one, two, three) = tokio::join!(
            service.list_topics(),
            service.list_topics(),
            service.list_topics()
        );
        assert_eq!(one.unwrap(), vec!["a", "b"]);
        assert_eq!(two.unwrap(), vec!["a", "b"]);
        assert_eq!(three.unwrap(), vec!["a", "b"]);
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_topic_and_aggregator_caches_are_independent() {
        let transport = Arc::new(
            MockTransport::new()
                .route("/api/topics", json!(["a"]))
                .route("/api/aggregators", json!(["max", "avg", "last"])),
        );
        let service = service(transport.clone(), &[]);

        assert_eq!(service.list_topics().await.unwrap(), vec!["a"]);
        let aggregators = service.list_aggregators().await.unwrap();
        assert_eq!(aggregators, vec!["avg", "last", "max"]);
        assert_eq!(service.list_aggregators().await.unwrap(), aggregators);
        assert_eq!(transport.calls(), vec!["/api/topics", "/api/aggregators"]);
    }

    #[tokio::test]
    async fn test_non_array_metadata_degrades_to_empty() {
        let transport =
            Arc::new(MockTransport::new().route("/api/topics", json!({"error": "nope"})));
        let service = service(transport.clone(), &[]);

        assert!(service.list_topics().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_topic_filters_keep_any_matching_substring() {
        let transport = Arc::new(MockTransport::new().route(
            "/api/topics",
            json!(["ground_floor/kitchen/oven", "second_floor/room3/heater"]),
        ));
        let filtered = service(transport.clone(), &["kitchen"]);
        assert_eq!(
            filtered.list_topics_filtered().await.unwrap(),
            vec!["ground_floor/kitchen/oven"]
        );

        let transport = Arc::new(MockTransport::new().route(
            "/api/topics",
            json!(["ground_floor/kitchen/oven", "second_floor/room3/heater"]),
        ));
        let unfiltered = service(transport.clone(), &[]);
        assert_eq!(unfiltered.list_topics_filtered().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_connection_status_reflects_the_topics_probe() {
        let transport = Arc::new(MockTransport::new().route("/api/topics", json!(["a"])));
        let status = service(transport, &[]).test_connection().await;
        assert_eq!(status.status, TestOutcome::Success);
        assert_eq!(status.message, "Data source is working");

        let transport = Arc::new(MockTransport::new().failing("/api/topics"));
        let status = service(transport, &[]).test_connection().await;
        assert_eq!(status.status, TestOutcome::Error);
        assert!(status.message.contains("Unable to connect"));
    }

    #[test]
    fn test_aggregate_path_layout() {
        assert_eq!(
            aggregate_path("avg", "room:temp", 5, 15, 42),
            "/api/aggregate/avg/room%3Atemp/5/15/42"
        );
    }
}
