//! Idempotent registration of streaming-SQL tables over the REST API.

use crate::error::{QueryRegistrationError, Result};
use clap::Args;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Content type the streaming-SQL REST API expects.
pub const KSQL_CONTENT_TYPE: &str = "application/vnd.ksql.v1+json";

pub const DEFAULT_KSQL_URL: &str = "http://localhost:8088";

/// Streaming-SQL endpoint arguments.
#[derive(Args, Clone, Debug)]
pub struct KsqlArgs {
    /// Base URL of the streaming-SQL server
    #[arg(long, env = "KSQL_URL", default_value = DEFAULT_KSQL_URL)]
    pub ksql_url: String,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub ksql_timeout_secs: u64,
}

/// What [`QueryRegistrar::register_if_absent`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    AlreadyPresent,
    Submitted,
}

#[derive(Serialize)]
struct StatementRequest<'a> {
    ksql: &'a str,
    #[serde(rename = "streamsProperties")]
    streams_properties: BTreeMap<&'a str, &'a str>,
}

#[derive(Deserialize)]
struct ListTablesEntity {
    #[serde(default)]
    tables: Vec<TableInfo>,
}

#[derive(Deserialize)]
struct TableInfo {
    name: String,
}

pub struct QueryRegistrar {
    client: Client,
    endpoint: String,
}

impl QueryRegistrar {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(10))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        if base_url.is_empty() {
            return Err(QueryRegistrationError::InvalidConfig(
                "Streaming-SQL URL must not be empty".to_string(),
            ));
        }

        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            QueryRegistrationError::InvalidConfig(format!("Failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            client,
            endpoint: format!("{}/ksql", base_url.trim_end_matches('/')),
        })
    }

    pub fn from_args(args: &KsqlArgs) -> Result<Self> {
        Self::with_timeout(&args.ksql_url, Duration::from_secs(args.ksql_timeout_secs))
    }

    /// URL statements are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Names of the tables the server currently knows.
    pub async fn table_names(&self) -> Result<Vec<String>> {
        let body = self.post("SHOW TABLES;", BTreeMap::new()).await?;

        let entities: Vec<ListTablesEntity> =
            serde_json::from_str(&body).map_err(|e| QueryRegistrationError::Response {
                url: self.endpoint.clone(),
                message: format!("cannot parse table listing: {e}"),
            })?;

        Ok(entities
            .into_iter()
            .flat_map(|entity| entity.tables)
            .map(|table| table.name)
            .collect())
    }

    /// Table names are case-insensitive on the server.
    pub async fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self
            .table_names()
            .await?
            .iter()
            .any(|table| table.eq_ignore_ascii_case(name)))
    }

    /// Submit `statement` unless `table` already exists.
    ///
    /// The statement runs with `ksql.streams.auto.offset.reset = earliest`
    /// so derived tables include data produced before registration.
    pub async fn register_if_absent(&self, table: &str, statement: &str) -> Result<Registration> {
        if self.table_exists(table).await? {
            info!("Table {table} already exists, skipping registration");
            return Ok(Registration::AlreadyPresent);
        }

        debug!("Executing statement for {table}...");
        let properties = BTreeMap::from([("ksql.streams.auto.offset.reset", "earliest")]);
        self.post(statement, properties).await?;

        info!("Registered {table}");
        Ok(Registration::Submitted)
    }

    async fn post(&self, statement: &str, properties: BTreeMap<&str, &str>) -> Result<String> {
        let request = StatementRequest {
            ksql: statement,
            streams_properties: properties,
        };
        let body = serde_json::to_string(&request).map_err(|e| {
            QueryRegistrationError::InvalidConfig(format!("Cannot encode statement: {e}"))
        })?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, KSQL_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|source| QueryRegistrationError::Request {
                url: self.endpoint.clone(),
                source,
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| QueryRegistrationError::Request {
                url: self.endpoint.clone(),
                source,
            })?;

        if !status.is_success() {
            return Err(QueryRegistrationError::Status {
                url: self.endpoint.clone(),
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let registrar = QueryRegistrar::new("http://localhost:8088/").unwrap();
        assert_eq!(registrar.endpoint(), "http://localhost:8088/ksql");
    }

    #[test]
    fn test_empty_url_is_rejected() {
        assert!(matches!(
            QueryRegistrar::new(""),
            Err(QueryRegistrationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let request = StatementRequest {
            ksql: "SHOW TABLES;",
            streams_properties: BTreeMap::from([("ksql.streams.auto.offset.reset", "earliest")]),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "ksql": "SHOW TABLES;",
                "streamsProperties": { "ksql.streams.auto.offset.reset": "earliest" }
            })
        );
    }
}
