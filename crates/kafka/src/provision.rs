//! Idempotent topic provisioning.
//!
//! A [`TopicProvisioner`] is created once per process and shared by handle
//! with every producer. It remembers each topic it has handled, so the broker
//! sees at most one metadata check and one create request per topic for the
//! lifetime of the process, however many producers ask for it.

use crate::admin::{CreateOutcome, TopicAdmin, TopicSpec};
use crate::error::Error;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info, warn};

/// What [`TopicProvisioner::ensure`] did for a topic.
#[derive(Debug)]
pub enum ProvisionOutcome {
    /// This process already handled the topic; nothing was sent to the broker.
    AlreadyProvisioned,
    /// The topic was listed in the broker's metadata, or lost a creation race.
    Existing,
    Created,
    /// Creation failed. The error is logged and otherwise ignored: the first
    /// produce or poll against the topic surfaces the real problem.
    Failed(Error),
}

impl ProvisionOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ProvisionOutcome::Failed(_))
    }
}

pub struct TopicProvisioner {
    admin: Arc<dyn TopicAdmin>,
    // One cell per topic, initialised by the check-then-create sequence.
    // Concurrent callers for the same topic wait on its cell; callers for
    // other topics do not.
    provisioned: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
}

impl TopicProvisioner {
    pub fn new(admin: Arc<dyn TopicAdmin>) -> Self {
        Self {
            admin,
            provisioned: Mutex::new(HashMap::new()),
        }
    }

    /// Make sure `spec.name` exists, creating it if the broker does not know it.
    ///
    /// Never fails: see [`ProvisionOutcome::Failed`]. A topic whose creation
    /// failed is still recorded as handled and is not retried by this process.
    pub async fn ensure(&self, spec: &TopicSpec) -> ProvisionOutcome {
        let cell = {
            let mut provisioned = self.provisioned.lock().await;
            Arc::clone(provisioned.entry(spec.name.clone()).or_default())
        };

        let mut outcome = None;
        let slot = &mut outcome;
        cell.get_or_init(move || async move {
            *slot = Some(self.provision(spec).await);
        })
        .await;

        outcome.unwrap_or_else(|| {
            debug!("Topic '{}' already provisioned by this process", spec.name);
            ProvisionOutcome::AlreadyProvisioned
        })
    }

    pub async fn is_provisioned(&self, topic: &str) -> bool {
        self.provisioned
            .lock()
            .await
            .get(topic)
            .is_some_and(|cell| cell.initialized())
    }

    async fn provision(&self, spec: &TopicSpec) -> ProvisionOutcome {
        match self.admin.topic_names().await {
            Ok(names) if names.contains(&spec.name) => {
                debug!("Topic '{}' already exists on the broker", spec.name);
                return ProvisionOutcome::Existing;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    "Could not list topics before creating '{}', trying to create it anyway: {e}",
                    spec.name
                );
            }
        }

        match self.admin.create_topic(spec).await {
            Ok(CreateOutcome::Created) => {
                info!(
                    "Topic '{}' created ({} partition(s), replication {})",
                    spec.name, spec.partitions, spec.replication
                );
                ProvisionOutcome::Created
            }
            Ok(CreateOutcome::AlreadyExists) => {
                info!("Topic '{}' already exists", spec.name);
                ProvisionOutcome::Existing
            }
            Err(e) => {
                let err = match e {
                    Error::Provision { .. } => e,
                    other => Error::Provision {
                        topic: spec.name.clone(),
                        reason: other.to_string(),
                    },
                };
                error!("{err}");
                ProvisionOutcome::Failed(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryAdmin;

    fn spec(name: &str) -> TopicSpec {
        TopicSpec::new(name, 1, 1)
    }

    #[tokio::test]
    async fn test_ensure_creates_once() {
        let admin = MemoryAdmin::default();
        let provisioner = TopicProvisioner::new(Arc::new(admin.clone()));

        assert!(matches!(
            provisioner.ensure(&spec("arrivals")).await,
            ProvisionOutcome::Created
        ));
        for _ in 0..4 {
            assert!(matches!(
                provisioner.ensure(&spec("arrivals")).await,
                ProvisionOutcome::AlreadyProvisioned
            ));
        }

        assert_eq!(admin.create_requests(), vec![spec("arrivals")]);
        assert_eq!(admin.metadata_requests(), 1);
    }

    #[tokio::test]
    async fn test_existing_topic_is_not_created() {
        let admin = MemoryAdmin::with_topics(["org.chicago.cta.stations"]);
        let provisioner = TopicProvisioner::new(Arc::new(admin.clone()));

        let outcome = provisioner.ensure(&spec("org.chicago.cta.stations")).await;
        assert!(matches!(outcome, ProvisionOutcome::Existing));
        assert!(admin.create_requests().is_empty());
        assert!(provisioner.is_provisioned("org.chicago.cta.stations").await);
    }

    #[tokio::test]
    async fn test_creation_race_is_not_an_error() {
        let admin = MemoryAdmin::default();
        admin.hide_from_metadata("contended");
        let provisioner = TopicProvisioner::new(Arc::new(admin.clone()));

        let outcome = provisioner.ensure(&spec("contended")).await;
        assert!(matches!(outcome, ProvisionOutcome::Existing));
    }

    #[tokio::test]
    async fn test_failure_is_absorbed_and_not_retried() {
        let admin = MemoryAdmin::default();
        admin.fail_creates_for("broken", "policy violation");
        let provisioner = TopicProvisioner::new(Arc::new(admin.clone()));

        let outcome = provisioner.ensure(&spec("broken")).await;
        match outcome {
            ProvisionOutcome::Failed(Error::Provision { topic, reason }) => {
                assert_eq!(topic, "broken");
                assert!(reason.contains("policy violation"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        assert!(matches!(
            provisioner.ensure(&spec("broken")).await,
            ProvisionOutcome::AlreadyProvisioned
        ));
        assert_eq!(admin.create_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_metadata_failure_still_attempts_creation() {
        let admin = MemoryAdmin::default();
        admin.fail_metadata(true);
        let provisioner = TopicProvisioner::new(Arc::new(admin.clone()));

        assert!(matches!(
            provisioner.ensure(&spec("fresh")).await,
            ProvisionOutcome::Created
        ));
        assert_eq!(admin.create_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_issues_one_request() {
        let admin = MemoryAdmin::default();
        let provisioner = Arc::new(TopicProvisioner::new(Arc::new(admin.clone())));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let provisioner = Arc::clone(&provisioner);
            handles.push(tokio::spawn(async move {
                provisioner.ensure(&spec("shared")).await
            }));
        }
        for handle in handles {
            assert!(!handle.await.unwrap().is_failed());
        }

        assert_eq!(admin.create_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_slow_topic_does_not_block_others() {
        let admin = MemoryAdmin::default();
        let release = admin.hold_creates_for("slow");
        let provisioner = Arc::new(TopicProvisioner::new(Arc::new(admin.clone())));

        let slow = {
            let provisioner = Arc::clone(&provisioner);
            tokio::spawn(async move { provisioner.ensure(&spec("slow")).await })
        };
        while admin.create_requests().is_empty() {
            tokio::task::yield_now().await;
        }

        let fast = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            provisioner.ensure(&spec("fast")),
        )
        .await
        .expect("provisioning 'fast' waited on 'slow'");
        assert!(matches!(fast, ProvisionOutcome::Created));
        assert!(!provisioner.is_provisioned("slow").await);

        release.notify_one();
        assert!(matches!(slow.await.unwrap(), ProvisionOutcome::Created));
        assert!(provisioner.is_provisioned("slow").await);
    }
}
