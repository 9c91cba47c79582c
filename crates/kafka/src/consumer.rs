//! Paced event consumer loop.
//!
//! [`EventConsumer::run`] alternates two phases forever: a drain cycle that
//! polls and handles messages back to back until a poll comes up empty, and
//! an idle sleep before the next cycle. A handler failure only costs the
//! message it failed on; a poll error ends the current cycle early.

use crate::config::ConsumerOptions;
use crate::error::{Error, Result};
use crate::message::{RawMessage, TopicPartition, Watermarks};
use crate::source::KafkaSource;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Callback invoked whenever the broker hands this consumer partitions.
pub type OnAssign = Arc<dyn Fn(&mut Assignment) + Send + Sync>;

/// Partitions offered to a consumer by a rebalance.
///
/// Nothing is read from the partitions unless the on-assign callback calls
/// [`Assignment::accept`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    partitions: Vec<TopicPartition>,
    accepted: bool,
}

impl Assignment {
    pub fn new(partitions: Vec<TopicPartition>) -> Self {
        Self {
            partitions,
            accepted: false,
        }
    }

    pub fn partitions(&self) -> &[TopicPartition] {
        &self.partitions
    }

    pub fn accept(&mut self) {
        self.accepted = true;
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }
}

/// The broker side of a consumer.
#[async_trait]
pub trait MessageSource: Send {
    /// Subscribe to every topic matching `pattern` (a regex when it starts
    /// with `^`).
    fn subscribe(&mut self, pattern: &str, on_assign: OnAssign) -> Result<()>;

    /// Wait up to `timeout` for the next message.
    ///
    /// `None` means nothing arrived in time; `Some(Err(_))` is a
    /// broker-reported error in place of a message.
    async fn poll(&mut self, timeout: Duration) -> Option<Result<RawMessage>>;

    /// Current watermarks of every partition assigned to this source.
    ///
    /// Empty until an assignment has been applied.
    async fn watermarks(&mut self, timeout: Duration) -> Result<Vec<(TopicPartition, Watermarks)>>;

    fn close(&mut self);
}

/// Per-message callback of a consumer loop.
pub trait MessageHandler: Send {
    fn handle(&mut self, message: &RawMessage) -> anyhow::Result<()>;
}

impl<F> MessageHandler for F
where
    F: FnMut(&RawMessage) -> anyhow::Result<()> + Send,
{
    fn handle(&mut self, message: &RawMessage) -> anyhow::Result<()> {
        self(message)
    }
}

/// Why a drain cycle stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainEnd {
    /// A poll returned nothing within its timeout.
    #[default]
    Exhausted,
    /// The broker reported an error instead of a message.
    PollError,
    /// A message showed up before any assignment was accepted.
    Unassigned,
}

/// What one drain cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainSummary {
    pub handled: usize,
    pub failed: usize,
    pub end: DrainEnd,
}

pub struct EventConsumer<S, H> {
    pattern: String,
    source: S,
    handler: H,
    options: ConsumerOptions,
    assigned: Arc<AtomicBool>,
}

impl<H: MessageHandler> EventConsumer<KafkaSource, H> {
    /// Consumer reading `pattern` from the Kafka cluster at `bootstrap_servers`.
    pub fn kafka(
        bootstrap_servers: &str,
        pattern: &str,
        handler: H,
        options: ConsumerOptions,
    ) -> Result<Self> {
        let source = KafkaSource::new(bootstrap_servers, pattern, &options)?;
        Self::new(pattern, source, handler, options)
    }
}

impl<S: MessageSource, H: MessageHandler> EventConsumer<S, H> {
    /// Subscribe `source` to `pattern`, accepting every assignment it is offered.
    pub fn new(pattern: &str, mut source: S, handler: H, options: ConsumerOptions) -> Result<Self> {
        if pattern.is_empty() {
            return Err(Error::InvalidConfig(
                "Topic pattern must not be empty".to_string(),
            ));
        }

        let assigned = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&assigned);
        let label = pattern.to_string();
        let on_assign: OnAssign = Arc::new(move |assignment: &mut Assignment| {
            info!(
                "Partitions assigned for {label}: {:?}",
                assignment.partitions()
            );
            assignment.accept();
            flag.store(true, Ordering::SeqCst);
        });

        source.subscribe(pattern, on_assign)?;
        info!("Subscribed to {pattern}");

        Ok(Self {
            pattern: pattern.to_string(),
            source,
            handler,
            options,
            assigned,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether an assignment has been accepted since subscribing.
    pub fn is_assigned(&self) -> bool {
        self.assigned.load(Ordering::SeqCst)
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Poll and handle messages until a poll yields nothing.
    ///
    /// Never sleeps between messages. Handler failures are logged and
    /// counted; a poll error is logged and ends the cycle.
    pub async fn drain(&mut self) -> DrainSummary {
        let mut summary = DrainSummary::default();

        loop {
            let message = match self.source.poll(self.options.poll_timeout).await {
                None => {
                    summary.end = DrainEnd::Exhausted;
                    break;
                }
                Some(Err(e)) => {
                    error!("Error while polling {}: {e}", self.pattern);
                    summary.end = DrainEnd::PollError;
                    break;
                }
                Some(Ok(message)) => message,
            };

            if !self.is_assigned() {
                warn!(
                    "Dropping {} received before any partition assignment was accepted",
                    message.position()
                );
                summary.end = DrainEnd::Unassigned;
                break;
            }

            debug!("Handling {}", message.position());
            match self.handler.handle(&message) {
                Ok(()) => summary.handled += 1,
                Err(e) => {
                    let err = Error::Handler {
                        position: message.position(),
                        message: format!("{e:#}"),
                    };
                    error!("{err}");
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// Drain, sleep for the idle interval, repeat. Does not return.
    pub async fn run(&mut self) {
        info!("Consuming {}", self.pattern);
        loop {
            let summary = self.drain().await;
            if summary.handled > 0 || summary.failed > 0 {
                debug!(
                    "Drained {}: {} handled, {} failed, ended by {:?}",
                    self.pattern, summary.handled, summary.failed, summary.end
                );
            }
            tokio::time::sleep(self.options.idle_sleep).await;
        }
    }

    /// Release the subscription. Call once the loop has stopped.
    pub fn close(&mut self) {
        info!("Closing consumer for {}", self.pattern);
        self.source.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSource;
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn message(offset: i64) -> RawMessage {
        RawMessage::new("org.chicago.cta.station.austin.arrivals.v1", 0, offset)
            .with_payload(format!("{{\"n\":{offset}}}"))
    }

    fn partition() -> Vec<TopicPartition> {
        vec![TopicPartition::new(
            "org.chicago.cta.station.austin.arrivals.v1",
            0,
        )]
    }

    fn recording_handler(
        seen: &Arc<Mutex<Vec<i64>>>,
    ) -> impl FnMut(&RawMessage) -> anyhow::Result<()> + Send {
        let seen = Arc::clone(seen);
        move |message: &RawMessage| {
            seen.lock().unwrap().push(message.offset);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_subscribe_registers_pattern() {
        let source = ScriptedSource::new();
        let handler = |_: &RawMessage| -> anyhow::Result<()> { Ok(()) };
        let consumer = EventConsumer::new(
            "^org\\.chicago\\.cta\\.station\\..*\\.arrivals\\.v1$",
            source.clone(),
            handler,
            ConsumerOptions::default(),
        )
        .unwrap();

        assert_eq!(
            source.subscribed_pattern().as_deref(),
            Some(consumer.pattern())
        );
        assert!(!consumer.is_assigned());
    }

    #[tokio::test]
    async fn test_empty_pattern_is_rejected() {
        let handler = |_: &RawMessage| -> anyhow::Result<()> { Ok(()) };
        let result = EventConsumer::new(
            "",
            ScriptedSource::new(),
            handler,
            ConsumerOptions::default(),
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_no_handler_calls_without_assignment() {
        let source = ScriptedSource::new();
        source.push_message(message(0));
        source.push_message(message(1));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut consumer = EventConsumer::new(
            "arrivals",
            source.clone(),
            recording_handler(&seen),
            ConsumerOptions::default(),
        )
        .unwrap();

        let summary = consumer.drain().await;
        assert_eq!(summary.handled, 0);
        assert_eq!(summary.end, DrainEnd::Exhausted);
        assert!(seen.lock().unwrap().is_empty());

        assert!(source.assign(partition()));
        let summary = consumer.drain().await;
        assert_eq!(summary.handled, 2);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_messages_before_assignment_are_refused() {
        let source = ScriptedSource::new().deliver_before_assignment();
        source.push_message(message(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut consumer = EventConsumer::new(
            "arrivals",
            source.clone(),
            recording_handler(&seen),
            ConsumerOptions::default(),
        )
        .unwrap();

        let summary = consumer.drain().await;
        assert_eq!(summary.end, DrainEnd::Unassigned);
        assert_eq!(summary.handled, 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handler_failure_is_isolated() {
        let source = ScriptedSource::new();
        for offset in 0..3 {
            source.push_message(message(offset));
        }
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);
        let handler = move |message: &RawMessage| -> anyhow::Result<()> {
            recorded.lock().unwrap().push(message.offset);
            if message.offset == 1 {
                anyhow::bail!("malformed record");
            }
            Ok(())
        };
        let mut consumer =
            EventConsumer::new("arrivals", source.clone(), handler, ConsumerOptions::default())
                .unwrap();
        source.assign(partition());

        let summary = consumer.drain().await;
        assert_eq!(
            summary,
            DrainSummary {
                handled: 2,
                failed: 1,
                end: DrainEnd::Exhausted,
            }
        );
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_poll_error_ends_cycle() {
        let source = ScriptedSource::new();
        source.push_message(message(0));
        source.push_error("broker transport failure");
        source.push_message(message(1));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut consumer = EventConsumer::new(
            "arrivals",
            source.clone(),
            recording_handler(&seen),
            ConsumerOptions::default(),
        )
        .unwrap();
        source.assign(partition());

        let first = consumer.drain().await;
        assert_eq!(first.handled, 1);
        assert_eq!(first.end, DrainEnd::PollError);

        let second = consumer.drain().await;
        assert_eq!(second.handled, 1);
        assert_eq!(second.end, DrainEnd::Exhausted);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_drains_then_sleeps() {
        let source = ScriptedSource::new();
        for offset in 0..3 {
            source.push_message(message(offset));
        }
        let handled_at = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&handled_at);
        let handler = move |_: &RawMessage| -> anyhow::Result<()> {
            recorded.lock().unwrap().push(Instant::now());
            Ok(())
        };
        let mut consumer =
            EventConsumer::new("arrivals", source.clone(), handler, ConsumerOptions::default())
                .unwrap();
        source.assign(partition());

        let start = Instant::now();
        let outcome =
            tokio::time::timeout(Duration::from_millis(2500), consumer.run()).await;
        assert!(outcome.is_err(), "run() must not return");

        let handled_at = handled_at.lock().unwrap().clone();
        assert_eq!(handled_at, vec![start; 3]);

        // three messages and the empty poll that ends the cycle, then one
        // poll per idle interval
        let polls = source.polls();
        assert_eq!(polls.len(), 6);
        assert!(polls[..4].iter().all(|at| *at == start));
        assert_eq!(polls[4], start + Duration::from_secs(1));
        assert_eq!(polls[5], start + Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_arriving_later_are_picked_up_next_cycle() {
        let source = ScriptedSource::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut consumer = EventConsumer::new(
            "arrivals",
            source.clone(),
            recording_handler(&seen),
            ConsumerOptions::default(),
        )
        .unwrap();
        source.assign(partition());

        assert_eq!(consumer.drain().await.handled, 0);
        source.push_message(message(7));
        assert_eq!(consumer.drain().await.handled, 1);
        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_close_releases_source() {
        let source = ScriptedSource::new();
        let handler = |_: &RawMessage| -> anyhow::Result<()> { Ok(()) };
        let mut consumer =
            EventConsumer::new("arrivals", source.clone(), handler, ConsumerOptions::default())
                .unwrap();

        consumer.close();
        assert!(source.is_closed());
    }
}
