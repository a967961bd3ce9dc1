// Error taxonomy for the query engine
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasourceError {
    /// A pipeline stage referenced a name the registry does not know.
    #[error("function not found: {0}")]
    FunctionNotFound(String),

    /// Network or HTTP failure talking to the datasource server.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a payload shape we cannot decode.
    #[error("malformed response from {path}: {detail}")]
    MalformedResponse { path: String, detail: String },

    /// A time range bound could not be parsed.
    #[error("invalid time range: {0}")]
    InvalidRange(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, DatasourceError>;
