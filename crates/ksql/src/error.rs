use thiserror::Error;

/// A statement or metadata query could not be run against the
/// streaming-SQL endpoint.
#[derive(Error, Debug)]
pub enum QueryRegistrationError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected response from {url}: {message}")]
    Response { url: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, QueryRegistrationError>;
