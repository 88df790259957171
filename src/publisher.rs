//! Fan-out publisher.
//!
//! Durability and delivery are split: a publish succeeds once the message is
//! in the log, and pushes to subscribers are best-effort. Pushes run
//! concurrently and every outcome is collected; none is retried and none
//! fails the publish.

use crate::error::{DeliveryFailure, Result};
use crate::messages::MessageLog;
use crate::registry::SubscriptionRegistry;
use crate::time::CreatedAt;
use crate::transport::Transport;
use crate::types::{validate_request, Delivery};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

/// Upper bound on push workers per fan-out.
const MAX_PUSH_WORKERS: usize = 32;

/// Outcome of a successful publish.
#[derive(Clone, Debug)]
pub struct PublishReport {
    /// Ordering key assigned to the message.
    pub created_at: CreatedAt,
    /// Number of live subscribers a push was attempted for.
    pub attempted: usize,
    /// Pushes that failed, by connection ID.
    pub failures: Vec<(String, DeliveryFailure)>,
}

impl PublishReport {
    pub fn delivered(&self) -> usize {
        self.attempted - self.failures.len()
    }
}

/// Appends messages and fans them out to live subscribers.
pub struct Publisher {
    log: Arc<MessageLog>,
    registry: Arc<SubscriptionRegistry>,
    transport: Arc<dyn Transport>,
}

impl Publisher {
    pub fn new(
        log: Arc<MessageLog>,
        registry: Arc<SubscriptionRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            log,
            registry,
            transport,
        }
    }

    /// Publish `payload` to `topic`.
    ///
    /// Fails only if the message could not be appended, in which case nothing
    /// is pushed.
    pub fn publish(
        &self,
        topic: &str,
        publisher_connection_id: &str,
        payload: &[u8],
    ) -> Result<PublishReport> {
        validate_request(topic, publisher_connection_id)?;

        let created_at = self.log.append(topic, publisher_connection_id, payload)?;

        let subscribers = match self.registry.list_live(topic) {
            Ok(subscribers) => subscribers,
            Err(e) => {
                tracing::warn!(topic, error = %e, "could not list subscribers");
                Vec::new()
            }
        };

        let frame = Delivery::encode(topic, created_at, payload);
        let failures = fan_out(self.transport.as_ref(), &subscribers, &frame);

        for (connection_id, failure) in &failures {
            tracing::debug!(topic, connection_id, error = %failure, "delivery failed");
        }
        tracing::debug!(
            topic,
            created_at = created_at.0,
            subscribers = subscribers.len(),
            failed = failures.len(),
            "published message"
        );

        Ok(PublishReport {
            created_at,
            attempted: subscribers.len(),
            failures,
        })
    }
}

/// Push `frame` to every recipient concurrently and join.
///
/// Recipients are split across at most [`MAX_PUSH_WORKERS`] scoped workers.
/// Returns the failed pushes. A push that panics fails only its own
/// recipient.
pub(crate) fn fan_out(
    transport: &dyn Transport,
    recipients: &[String],
    frame: &[u8],
) -> Vec<(String, DeliveryFailure)> {
    if recipients.is_empty() {
        return Vec::new();
    }

    let per_worker = recipients.len().div_ceil(MAX_PUSH_WORKERS);

    thread::scope(|scope| {
        let workers: Vec<_> = recipients
            .chunks(per_worker)
            .map(|chunk| (chunk, scope.spawn(move || push_all(transport, chunk, frame))))
            .collect();

        workers
            .into_iter()
            .flat_map(|(chunk, worker)| match worker.join() {
                Ok(failures) => failures,
                // Only reachable if the worker itself fails outside a push.
                Err(_) => chunk
                    .iter()
                    .map(|id| (id.clone(), DeliveryFailure::Panicked(id.clone())))
                    .collect(),
            })
            .collect()
    })
}

fn push_all(
    transport: &dyn Transport,
    recipients: &[String],
    frame: &[u8],
) -> Vec<(String, DeliveryFailure)> {
    recipients
        .iter()
        .filter_map(|id| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| transport.push(id, frame)))
                .unwrap_or_else(|_| Err(DeliveryFailure::Panicked(id.clone())));
            outcome.err().map(|failure| (id.clone(), failure))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records pushes and fails those aimed at IDs starting with "dead".
    #[derive(Default)]
    struct Recorder {
        pushed: Mutex<Vec<String>>,
    }

    impl Transport for Recorder {
        fn push(
            &self,
            connection_id: &str,
            _payload: &[u8],
        ) -> std::result::Result<(), DeliveryFailure> {
            self.pushed.lock().push(connection_id.to_string());
            if connection_id.starts_with("dead") {
                Err(DeliveryFailure::Gone(connection_id.to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct Panicky;

    impl Transport for Panicky {
        fn push(
            &self,
            _connection_id: &str,
            _payload: &[u8],
        ) -> std::result::Result<(), DeliveryFailure> {
            panic!("transport bug");
        }
    }

    #[test]
    fn test_fan_out_reaches_everyone() {
        let transport = Recorder::default();
        let recipients: Vec<String> = (0..100).map(|i| format!("conn-{i}")).collect();

        let failures = fan_out(&transport, &recipients, b"{}");
        assert!(failures.is_empty());

        let mut pushed = transport.pushed.lock().clone();
        pushed.sort();
        let mut expected = recipients.clone();
        expected.sort();
        assert_eq!(pushed, expected);
    }

    #[test]
    fn test_fan_out_collects_failures() {
        let transport = Recorder::default();
        let recipients = vec!["a".to_string(), "dead-1".to_string(), "b".to_string()];

        let failures = fan_out(&transport, &recipients, b"{}");
        assert_eq!(
            failures,
            vec![("dead-1".to_string(), DeliveryFailure::Gone("dead-1".into()))]
        );
        assert_eq!(transport.pushed.lock().len(), 3);
    }

    /// Panics on one ID, records every other push.
    #[derive(Default)]
    struct PanicsOn {
        pushed: Mutex<Vec<String>>,
    }

    impl Transport for PanicsOn {
        fn push(
            &self,
            connection_id: &str,
            _payload: &[u8],
        ) -> std::result::Result<(), DeliveryFailure> {
            if connection_id == "c00" {
                panic!("transport bug");
            }
            self.pushed.lock().push(connection_id.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_panic_fails_only_its_recipient_in_a_shared_chunk() {
        // More recipients than workers, so each worker handles several.
        let recipients: Vec<String> = (0..MAX_PUSH_WORKERS * 2)
            .map(|i| format!("c{i:02}"))
            .collect();
        let transport = PanicsOn::default();

        let failures = fan_out(&transport, &recipients, b"{}");

        assert_eq!(
            failures,
            vec![("c00".to_string(), DeliveryFailure::Panicked("c00".into()))]
        );
        let pushed = transport.pushed.lock();
        assert_eq!(pushed.len(), recipients.len() - 1);
        assert!(pushed.contains(&"c01".to_string()));
    }

    #[test]
    fn test_fan_out_contains_panics() {
        let recipients = vec!["a".to_string(), "b".to_string()];
        let failures = fan_out(&Panicky, &recipients, b"{}");
        assert_eq!(failures.len(), 2);
        assert!(failures
            .iter()
            .all(|(_, f)| matches!(f, DeliveryFailure::Panicked(_))));
    }
}
