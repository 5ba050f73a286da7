use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::OnceCell;
use tokio::time::{sleep, timeout};
use crate::channels::{composer_for, MessageComposer, NotificationChannel, RetryPolicy};
use crate::config::ChannelConfig;
use crate::events::alert::AlertPayload;
use crate::events::record::{AttemptResult, ChannelOutcome, DeliveryAttempt};
use crate::interfaces::transport::{ChannelMessage, DeliveryTransport, TransportError};
use crate::observability::metrics::{CHANNEL_ATTEMPTS, DUPLICATE_DELIVERIES_SUPPRESSED};
use crate::types::ids::{ChannelName, RequestId};
use crate::types::timestamp::Timestamp;

/// Generic channel adapter: composes messages, sends them through a
/// transport with retry/backoff, and deduplicates on request id.
///
/// ## Idempotency
/// The first call for a request id runs the delivery; every later or
/// concurrent call for the same id awaits and returns that same outcome
/// without touching the transport.
///
/// ## Retry
/// An attempt sends every unacknowledged message concurrently, each bounded
/// by `attempt_timeout`. Transient failures and timeouts are retried up to
/// `max_attempts` with exponential backoff. A permanent rejection is not
/// retried. Messages already acknowledged are never resent.
pub struct ChannelAdapter {
    name: ChannelName,
    policy: RetryPolicy,
    composer: Box<dyn MessageComposer>,
    transport: Arc<dyn DeliveryTransport>,
    deliveries: DashMap<RequestId, Arc<OnceCell<ChannelOutcome>>>,
}

struct DeliveryState {
    pending: Vec<ChannelMessage>,
    rejected: Vec<String>,
    last_error: Option<String>,
}

impl ChannelAdapter {
    pub fn new(
        name: ChannelName,
        policy: RetryPolicy,
        composer: Box<dyn MessageComposer>,
        transport: Arc<dyn DeliveryTransport>,
    ) -> Self {
        ChannelAdapter {
            name,
            policy,
            composer,
            transport,
            deliveries: DashMap::new(),
        }
    }

    pub fn from_config(config: &ChannelConfig, transport: Arc<dyn DeliveryTransport>) -> Self {
        Self::new(
            ChannelName::new(config.name.clone()),
            RetryPolicy::from(&config.retry),
            composer_for(&config.kind),
            transport,
        )
    }

    async fn deliver(&self, payload: &AlertPayload) -> ChannelOutcome {
        let mut state = DeliveryState {
            pending: self.composer.compose(&self.name, payload),
            rejected: Vec::new(),
            last_error: None,
        };

        if state.pending.is_empty() {
            tracing::error!("Channel {} has no recipients configured", self.name);
            return ChannelOutcome::from_attempts(
                self.name.clone(),
                vec![self.record_attempt(1, AttemptResult::PermanentFailure("no recipients configured".to_string()))],
            );
        }

        let mut attempts = Vec::new();

        for attempt in 1..=self.policy.max_attempts {
            let result = self.send_pending(&mut state).await;

            let retryable = matches!(result, AttemptResult::TransientFailure(_) | AttemptResult::TimedOut);
            attempts.push(self.record_attempt(attempt, result.clone()));

            if !retryable {
                break;
            }

            if attempt < self.policy.max_attempts {
                let backoff = self.policy.backoff(attempt);
                tracing::warn!(
                    "Channel {} attempt {}/{} failed ({}), retrying {} message(s) in {:?}",
                    self.name,
                    attempt,
                    self.policy.max_attempts,
                    result.label(),
                    state.pending.len(),
                    backoff
                );
                sleep(backoff).await;
            }
        }

        let outcome = ChannelOutcome::from_attempts(self.name.clone(), attempts);
        if outcome.is_delivered() {
            tracing::info!("Channel {} delivered after {} attempt(s)", self.name, outcome.attempts.len());
        } else {
            tracing::error!(
                "Channel {} gave up with {:?} after {} attempt(s)",
                self.name,
                outcome.final_result,
                outcome.attempts.len()
            );
        }
        outcome
    }

    /// One attempt: send every not-yet-acknowledged message once, all at
    /// the same time, each bounded by `attempt_timeout`.
    async fn send_pending(&self, state: &mut DeliveryState) -> AttemptResult {
        let sends = state
            .pending
            .iter()
            .map(|message| timeout(self.policy.attempt_timeout, self.transport.send(message)));
        let results = join_all(sends).await;

        let mut unacknowledged = Vec::new();
        let mut timed_out = false;

        for (message, result) in state.pending.drain(..).zip(results) {
            match result {
                Ok(Ok(receipt)) => {
                    tracing::debug!(
                        "Channel {} acknowledged by {} (receipt {})",
                        self.name,
                        message.recipient,
                        receipt.reference
                    );
                }
                Ok(Err(TransportError::Permanent(reason))) => {
                    tracing::error!(
                        "Channel {} permanently rejected for {}: {}",
                        self.name,
                        message.recipient,
                        reason
                    );
                    state.rejected.push(format!("{}: {}", message.recipient, reason));
                }
                Ok(Err(TransportError::Transient(reason))) => {
                    state.last_error = Some(reason);
                    unacknowledged.push(message);
                }
                Err(_) => {
                    timed_out = true;
                    unacknowledged.push(message);
                }
            }
        }
        state.pending = unacknowledged;

        if !state.pending.is_empty() {
            if timed_out {
                AttemptResult::TimedOut
            } else {
                AttemptResult::TransientFailure(
                    state.last_error.clone().unwrap_or_else(|| "unacknowledged".to_string()),
                )
            }
        } else if !state.rejected.is_empty() {
            AttemptResult::PermanentFailure(state.rejected.join("; "))
        } else {
            AttemptResult::Delivered
        }
    }

    fn record_attempt(&self, attempt: u32, result: AttemptResult) -> DeliveryAttempt {
        CHANNEL_ATTEMPTS
            .with_label_values(&[self.name.as_str(), result.label()])
            .inc();

        DeliveryAttempt {
            attempt,
            at: Timestamp::now(),
            result,
        }
    }
}

#[async_trait]
impl NotificationChannel for ChannelAdapter {
    fn name(&self) -> &ChannelName {
        &self.name
    }

    fn delivery_budget(&self) -> Duration {
        self.policy.delivery_budget()
    }

    async fn attempt_deliver(&self, request_id: RequestId, payload: &AlertPayload) -> ChannelOutcome {
        let cell = self
            .deliveries
            .entry(request_id)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let mut ran_here = false;
        let outcome = cell
            .get_or_init(|| {
                ran_here = true;
                self.deliver(payload)
            })
            .await
            .clone();

        if !ran_here {
            DUPLICATE_DELIVERIES_SUPPRESSED
                .with_label_values(&[self.name.as_str()])
                .inc();
            tracing::warn!(
                "Channel {} already handled {}, returning recorded outcome",
                self.name,
                request_id
            );
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use crate::channels::emergency_services::EmergencyServicesComposer;
    use crate::channels::trusted_contacts::TrustedContactsComposer;
    use crate::config::TrustedContact;
    use crate::events::alert::{AlertRequest, TriggerSource};
    use crate::events::record::FinalResult;
    use crate::interfaces::transport::{DeliveryReceipt, MockDeliveryTransport};

    fn receipt() -> DeliveryReceipt {
        DeliveryReceipt { reference: "ok".to_string() }
    }

    fn call_adapter(transport: MockDeliveryTransport) -> ChannelAdapter {
        ChannelAdapter::new(
            ChannelName::from("call"),
            RetryPolicy::default(),
            Box::new(EmergencyServicesComposer::new("911")),
            Arc::new(transport),
        )
    }

    fn payload() -> AlertPayload {
        AlertRequest::new(TriggerSource::Manual, None).payload()
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_delivery_sends_once() {
        let mut transport = MockDeliveryTransport::new();
        transport.expect_send().times(1).returning(|_| Ok(receipt()));
        let adapter = call_adapter(transport);
        let payload = payload();

        let first = adapter.attempt_deliver(payload.request_id, &payload).await;
        let second = adapter.attempt_deliver(payload.request_id, &payload).await;

        assert_eq!(first.final_result, FinalResult::Delivered);
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_repeat_delivery_sends_once() {
        let mut transport = MockDeliveryTransport::new();
        transport.expect_send().times(1).returning(|_| Ok(receipt()));
        let adapter = Arc::new(call_adapter(transport));
        let payload = payload();

        let (a, b) = tokio::join!(
            adapter.attempt_deliver(payload.request_id, &payload),
            adapter.attempt_deliver(payload.request_id, &payload),
        );
        assert!(a.is_delivered() && b.is_delivered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried_with_backoff() {
        let mut transport = MockDeliveryTransport::new();
        let mut calls = 0;
        transport.expect_send().times(3).returning(move |_| {
            calls += 1;
            if calls < 3 {
                Err(TransportError::Transient("network unreachable".to_string()))
            } else {
                Ok(receipt())
            }
        });
        let adapter = call_adapter(transport);
        let payload = payload();

        let started = tokio::time::Instant::now();
        let outcome = adapter.attempt_deliver(payload.request_id, &payload).await;

        assert_eq!(outcome.final_result, FinalResult::Delivered);
        assert_eq!(outcome.retry_count(), 2);
        // 1s + 2s of backoff
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let mut transport = MockDeliveryTransport::new();
        transport
            .expect_send()
            .times(3)
            .returning(|_| Err(TransportError::Transient("no signal".to_string())));
        let adapter = call_adapter(transport);
        let payload = payload();

        let outcome = adapter.attempt_deliver(payload.request_id, &payload).await;

        assert_eq!(outcome.final_result, FinalResult::Failed);
        assert_eq!(outcome.attempts.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let mut transport = MockDeliveryTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Err(TransportError::Permanent("number not in service".to_string())));
        let adapter = call_adapter(transport);
        let payload = payload();

        let outcome = adapter.attempt_deliver(payload.request_id, &payload).await;

        assert_eq!(outcome.final_result, FinalResult::Failed);
        assert_eq!(outcome.attempts.len(), 1);
    }

    struct HangingTransport;

    #[async_trait]
    impl DeliveryTransport for HangingTransport {
        async fn send(&self, _message: &ChannelMessage) -> Result<DeliveryReceipt, TransportError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_transport_times_out() {
        let adapter = ChannelAdapter::new(
            ChannelName::from("call"),
            RetryPolicy::default(),
            Box::new(EmergencyServicesComposer::new("911")),
            Arc::new(HangingTransport),
        );
        let payload = payload();

        let started = tokio::time::Instant::now();
        let outcome = adapter.attempt_deliver(payload.request_id, &payload).await;

        assert_eq!(outcome.final_result, FinalResult::TimedOut);
        assert_eq!(outcome.attempts.len(), 3);
        assert_eq!(started.elapsed(), adapter.delivery_budget());
    }

    /// Fails the first send to each recipient, records every recipient sent to.
    struct FlakyFirstTransport {
        seen: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DeliveryTransport for FlakyFirstTransport {
        async fn send(&self, message: &ChannelMessage) -> Result<DeliveryReceipt, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut seen = self.seen.lock().unwrap();
            let first_time = !seen.contains(&message.recipient);
            seen.push(message.recipient.clone());
            if first_time && message.recipient == "+15550101" {
                Err(TransportError::Transient("carrier busy".to_string()))
            } else {
                Ok(DeliveryReceipt { reference: message.recipient.clone() })
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_only_resends_unacknowledged_contacts() {
        let transport = Arc::new(FlakyFirstTransport {
            seen: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        });
        let adapter = ChannelAdapter::new(
            ChannelName::from("contacts"),
            RetryPolicy::default(),
            Box::new(TrustedContactsComposer::new(vec![
                TrustedContact { name: "Sam".into(), address: "+15550100".into() },
                TrustedContact { name: "Alex".into(), address: "+15550101".into() },
            ])),
            transport.clone(),
        );
        let payload = payload();

        let outcome = adapter.attempt_deliver(payload.request_id, &payload).await;

        assert!(outcome.is_delivered());
        assert_eq!(outcome.attempts.len(), 2);
        let seen = transport.seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["+15550100", "+15550101", "+15550101"]);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_recipients_is_a_failure() {
        let adapter = ChannelAdapter::new(
            ChannelName::from("contacts"),
            RetryPolicy::default(),
            Box::new(TrustedContactsComposer::new(Vec::new())),
            Arc::new(MockDeliveryTransport::new()),
        );
        let payload = payload();

        let outcome = adapter.attempt_deliver(payload.request_id, &payload).await;
        assert_eq!(outcome.final_result, FinalResult::Failed);
    }
}
