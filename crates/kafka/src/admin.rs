//! Topic metadata and creation.

use crate::error::{Error, Result};
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::ClientConfig;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A topic to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication: i32,
}

impl TopicSpec {
    pub fn new(name: impl Into<String>, partitions: i32, replication: i32) -> Self {
        Self {
            name: name.into(),
            partitions,
            replication,
        }
    }
}

/// Result of a create request that the broker did not reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// Someone else created the topic between our metadata check and the request.
    AlreadyExists,
}

/// Broker administration used by the topic provisioner.
#[async_trait]
pub trait TopicAdmin: Send + Sync {
    /// Names of the topics currently known to the cluster.
    async fn topic_names(&self) -> Result<HashSet<String>>;

    async fn create_topic(&self, spec: &TopicSpec) -> Result<CreateOutcome>;
}

/// [`TopicAdmin`] backed by an rdkafka admin client.
pub struct KafkaAdmin {
    client: Arc<AdminClient<DefaultClientContext>>,
    timeout: Duration,
}

impl KafkaAdmin {
    pub fn new(bootstrap_servers: &str) -> Result<Self> {
        let client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .create()?;

        Ok(Self {
            client: Arc::new(client),
            timeout: Duration::from_secs(5),
        })
    }

    /// Timeout for metadata and create requests.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl TopicAdmin for KafkaAdmin {
    async fn topic_names(&self) -> Result<HashSet<String>> {
        let client = Arc::clone(&self.client);
        let timeout = self.timeout;

        // fetch_metadata blocks the calling thread until the broker answers
        let metadata = tokio::task::spawn_blocking(move || {
            client.inner().fetch_metadata(None, timeout)
        })
        .await
        .map_err(|e| Error::Consumer(format!("Metadata request task failed: {e}")))??;

        Ok(metadata
            .topics()
            .iter()
            .map(|topic| topic.name().to_string())
            .collect())
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<CreateOutcome> {
        let new_topic = NewTopic::new(
            &spec.name,
            spec.partitions,
            TopicReplication::Fixed(spec.replication),
        );
        let opts = AdminOptions::new().operation_timeout(Some(self.timeout));

        let results = self.client.create_topics(&[new_topic], &opts).await?;

        let mut outcome = CreateOutcome::Created;
        for result in results {
            match result {
                Ok(topic_name) => debug!("Create request for '{topic_name}' accepted"),
                Err((_, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    outcome = CreateOutcome::AlreadyExists;
                }
                Err((topic_name, code)) => {
                    return Err(Error::Provision {
                        topic: topic_name,
                        reason: code.to_string(),
                    });
                }
            }
        }

        Ok(outcome)
    }
}
