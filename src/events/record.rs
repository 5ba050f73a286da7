use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::events::alert::AlertRequest;
use crate::types::ids::{ChannelName, RequestId};
use crate::types::timestamp::Timestamp;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertStatus {
    Pending,
    Cancelled,
    Dispatching,
    PartiallyDelivered,
    Delivered,
    Failed,
}

impl AlertStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AlertStatus::Cancelled
                | AlertStatus::PartiallyDelivered
                | AlertStatus::Delivered
                | AlertStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Pending => "pending",
            AlertStatus::Cancelled => "cancelled",
            AlertStatus::Dispatching => "dispatching",
            AlertStatus::PartiallyDelivered => "partially_delivered",
            AlertStatus::Delivered => "delivered",
            AlertStatus::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptResult {
    Delivered,
    TransientFailure(String),
    PermanentFailure(String),
    TimedOut,
}

impl AttemptResult {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptResult::Delivered => "delivered",
            AttemptResult::TransientFailure(_) => "transient_failure",
            AttemptResult::PermanentFailure(_) => "permanent_failure",
            AttemptResult::TimedOut => "timed_out",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub attempt: u32,
    pub at: Timestamp,
    pub result: AttemptResult,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalResult {
    Delivered,
    Failed,
    TimedOut,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOutcome {
    pub channel: ChannelName,
    pub attempts: Vec<DeliveryAttempt>,
    pub final_result: FinalResult,
    pub completed_at: Timestamp,
}

impl ChannelOutcome {
    pub fn from_attempts(channel: ChannelName, attempts: Vec<DeliveryAttempt>) -> Self {
        let final_result = match attempts.last().map(|a| &a.result) {
            Some(AttemptResult::Delivered) => FinalResult::Delivered,
            Some(AttemptResult::TimedOut) => FinalResult::TimedOut,
            _ => FinalResult::Failed,
        };

        ChannelOutcome {
            channel,
            attempts,
            final_result,
            completed_at: Timestamp::now(),
        }
    }

    /// Outcome for a channel whose adapter overran its whole delivery budget.
    pub fn timed_out(channel: ChannelName) -> Self {
        ChannelOutcome {
            channel,
            attempts: vec![DeliveryAttempt {
                attempt: 1,
                at: Timestamp::now(),
                result: AttemptResult::TimedOut,
            }],
            final_result: FinalResult::TimedOut,
            completed_at: Timestamp::now(),
        }
    }

    /// Outcome for a channel whose delivery task died before reporting.
    pub fn crashed(channel: ChannelName, reason: String) -> Self {
        ChannelOutcome {
            channel,
            attempts: vec![DeliveryAttempt {
                attempt: 1,
                at: Timestamp::now(),
                result: AttemptResult::PermanentFailure(reason),
            }],
            final_result: FinalResult::Failed,
            completed_at: Timestamp::now(),
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.final_result == FinalResult::Delivered
    }

    pub fn retry_count(&self) -> u32 {
        self.attempts.len().saturating_sub(1) as u32
    }
}

/// Durable state of one activation, owned by the coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub request_id: RequestId,
    pub request: AlertRequest,
    pub status: AlertStatus,
    /// Channels selected for this activation, fixed at creation.
    pub channels: Vec<ChannelName>,
    pub channel_outcomes: BTreeMap<ChannelName, ChannelOutcome>,
    pub created_at: Timestamp,
    pub finalized_at: Option<Timestamp>,
}

impl AlertRecord {
    pub fn new(request: AlertRequest, channels: Vec<ChannelName>, created_at: Timestamp) -> Self {
        AlertRecord {
            request_id: request.request_id,
            request,
            status: AlertStatus::Pending,
            channels,
            channel_outcomes: BTreeMap::new(),
            created_at,
            finalized_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Channels selected at creation that have no recorded outcome yet.
    pub fn outstanding_channels(&self) -> Vec<ChannelName> {
        self.channels
            .iter()
            .filter(|c| !self.channel_outcomes.contains_key(*c))
            .cloned()
            .collect()
    }

    pub fn delivered_count(&self) -> usize {
        self.channel_outcomes.values().filter(|o| o.is_delivered()).count()
    }
}

/// Overall status for a finished fan-out.
pub fn aggregate_status<'a>(outcomes: impl IntoIterator<Item = &'a ChannelOutcome>) -> AlertStatus {
    let mut total = 0usize;
    let mut delivered = 0usize;

    for outcome in outcomes {
        total += 1;
        if outcome.is_delivered() {
            delivered += 1;
        }
    }

    if total > 0 && delivered == total {
        AlertStatus::Delivered
    } else if delivered > 0 {
        AlertStatus::PartiallyDelivered
    } else {
        AlertStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(channel: &str, results: Vec<AttemptResult>) -> ChannelOutcome {
        let attempts = results
            .into_iter()
            .enumerate()
            .map(|(i, result)| DeliveryAttempt {
                attempt: i as u32 + 1,
                at: Timestamp::now(),
                result,
            })
            .collect();
        ChannelOutcome::from_attempts(ChannelName::from(channel), attempts)
    }

    #[test]
    fn test_final_result_follows_last_attempt() {
        let ok = outcome("sms", vec![AttemptResult::TransientFailure("busy".into()), AttemptResult::Delivered]);
        assert_eq!(ok.final_result, FinalResult::Delivered);
        assert_eq!(ok.retry_count(), 1);

        let slow = outcome("call", vec![AttemptResult::TimedOut]);
        assert_eq!(slow.final_result, FinalResult::TimedOut);

        let bad = outcome("beacon", vec![AttemptResult::PermanentFailure("no route".into())]);
        assert_eq!(bad.final_result, FinalResult::Failed);
    }

    #[test]
    fn test_aggregate_status() {
        let ok = outcome("a", vec![AttemptResult::Delivered]);
        let failed = outcome("b", vec![AttemptResult::PermanentFailure("x".into())]);
        let slow = outcome("c", vec![AttemptResult::TimedOut]);

        assert_eq!(aggregate_status([&ok, &ok.clone()]), AlertStatus::Delivered);
        assert_eq!(aggregate_status([&ok, &failed]), AlertStatus::PartiallyDelivered);
        assert_eq!(aggregate_status([&failed, &slow]), AlertStatus::Failed);
        assert_eq!(aggregate_status(std::iter::empty()), AlertStatus::Failed);
    }
}
