// Connectivity probe - dependency injection and datasource health report
use std::sync::Arc;

use telemetry_query::application::query_service::{TelemetryQueryService, TestOutcome};
use telemetry_query::domain::registry::FunctionRegistry;
use telemetry_query::infrastructure::config::load_datasource_config;
use telemetry_query::infrastructure::http_transport::HttpTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = load_datasource_config()?;

    // Create transport (infrastructure layer) and the query service
    let transport = Arc::new(HttpTransport::new(config.datasource.url.clone()));
    let registry = Arc::new(FunctionRegistry::builtin());
    let service = TelemetryQueryService::new(
        transport,
        registry.clone(),
        config.datasource.topic_filters.clone(),
    );

    let status = service.test_connection().await;
    match status.status {
        TestOutcome::Success => println!("{} -> {}", config.datasource.url, status.message),
        TestOutcome::Error => {
            println!("{} -> {}", config.datasource.url, status.message);
            return Ok(());
        }
    }

    let topics = service.list_topics_filtered().await?;
    println!("{} topics visible to dashboards:", topics.len());
    for topic in &topics {
        println!("  {topic}");
    }

    let aggregators = service.list_aggregators().await?;
    println!("aggregators: {}", aggregators.join(", "));

    let functions: usize = registry.categories().values().map(|b| b.len()).sum();
    println!("{functions} pipeline functions registered");

    Ok(())
}
