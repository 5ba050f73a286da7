use std::sync::Arc;
use std::time::Duration;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::timeout;
use tracing::Instrument;
use crate::channels::NotificationChannel;
use crate::events::alert::AlertPayload;
use crate::events::record::ChannelOutcome;
use crate::observability::logging::trace_channel_delivery;
use crate::store::AlertRecordStore;

/// Run every channel concurrently and record each outcome as it arrives.
///
/// Each channel gets its own task bounded by its delivery budget plus
/// `grace`. A channel that overruns is recorded as TimedOut and a channel
/// whose task dies is recorded as Failed; neither delays the others.
pub async fn fan_out(
    store: &AlertRecordStore,
    payload: AlertPayload,
    channels: Vec<Arc<dyn NotificationChannel>>,
    grace: Duration,
) -> Vec<ChannelOutcome> {
    let request_id = payload.request_id;
    let payload = Arc::new(payload);

    let mut pending = FuturesUnordered::new();

    // Step 1: start every channel before waiting on any
    for channel in channels {
        let name = channel.name().clone();
        let limit = channel.delivery_budget() + grace;
        let payload = payload.clone();
        let span = trace_channel_delivery(&request_id, &name);

        let handle = tokio::spawn(
            async move {
                match timeout(limit, channel.attempt_deliver(request_id, &payload)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::error!("Channel {} exceeded {:?}, marking TimedOut", channel.name(), limit);
                        ChannelOutcome::timed_out(channel.name().clone())
                    }
                }
            }
            .instrument(span),
        );

        pending.push(async move { (name, handle.await) });
    }

    // Step 2: record outcomes in completion order
    let mut outcomes = Vec::with_capacity(pending.len());
    while let Some((name, joined)) = pending.next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Delivery task for {} on {} died: {}", request_id, name, e);
                ChannelOutcome::crashed(name, format!("delivery task failed: {}", e))
            }
        };

        if let Err(e) = store.record_channel_outcome(request_id, outcome.clone()).await {
            tracing::error!("Failed to record {} outcome for {}: {}", outcome.channel, request_id, e);
        }
        outcomes.push(outcome);
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::event_log::memory_log::MemoryEventLog;
    use crate::events::alert::{AlertRequest, TriggerSource};
    use crate::events::record::{AlertStatus, AttemptResult, DeliveryAttempt, FinalResult};
    use crate::types::ids::{ChannelName, RequestId};
    use crate::types::timestamp::Timestamp;

    struct Scripted {
        name: ChannelName,
        delay: Duration,
        result: Option<AttemptResult>,
    }

    #[async_trait]
    impl NotificationChannel for Scripted {
        fn name(&self) -> &ChannelName {
            &self.name
        }

        fn delivery_budget(&self) -> Duration {
            Duration::from_secs(10)
        }

        async fn attempt_deliver(&self, _request_id: RequestId, _payload: &AlertPayload) -> ChannelOutcome {
            tokio::time::sleep(self.delay).await;
            match &self.result {
                Some(result) => ChannelOutcome::from_attempts(
                    self.name.clone(),
                    vec![DeliveryAttempt { attempt: 1, at: Timestamp::now(), result: result.clone() }],
                ),
                None => panic!("adapter crashed"),
            }
        }
    }

    fn scripted(name: &str, delay_secs: u64, result: Option<AttemptResult>) -> Arc<dyn NotificationChannel> {
        Arc::new(Scripted {
            name: ChannelName::from(name),
            delay: Duration::from_secs(delay_secs),
            result,
        })
    }

    async fn dispatching_store(channels: &[&str]) -> (AlertRecordStore, AlertPayload) {
        let store = AlertRecordStore::open(Arc::new(MemoryEventLog::new()), 16).await.unwrap();
        let request = AlertRequest::new(TriggerSource::Manual, None);
        let payload = request.payload();
        store
            .create(request, channels.iter().map(|c| ChannelName::from(*c)).collect())
            .await
            .unwrap();
        store.transition(payload.request_id, AlertStatus::Dispatching).await.unwrap();
        (store, payload)
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcomes_recorded_in_completion_order() {
        let (store, payload) = dispatching_store(&["slow", "fast"]).await;
        let id = payload.request_id;

        let outcomes = fan_out(
            &store,
            payload,
            vec![
                scripted("slow", 3, Some(AttemptResult::Delivered)),
                scripted("fast", 1, Some(AttemptResult::PermanentFailure("rejected".into()))),
            ],
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(outcomes[0].channel.as_str(), "fast");
        assert_eq!(outcomes[1].channel.as_str(), "slow");

        let record = store.get(id).await.unwrap();
        assert_eq!(record.channel_outcomes.len(), 2);
        assert!(record.outstanding_channels().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrunning_channel_is_timed_out_without_delaying_others() {
        let (store, payload) = dispatching_store(&["stuck", "ok"]).await;

        let started = tokio::time::Instant::now();
        let outcomes = fan_out(
            &store,
            payload,
            vec![
                scripted("stuck", 3600, Some(AttemptResult::Delivered)),
                scripted("ok", 0, Some(AttemptResult::Delivered)),
            ],
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(outcomes[0].final_result, FinalResult::Delivered);
        assert_eq!(outcomes[1].final_result, FinalResult::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_crashed_channel_is_failed() {
        let (store, payload) = dispatching_store(&["broken"]).await;

        let outcomes = fan_out(&store, payload, vec![scripted("broken", 0, None)], Duration::ZERO).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].final_result, FinalResult::Failed);
    }
}
