// Infrastructure layer - HTTP transport and configuration
pub mod config;
pub mod http_transport;
