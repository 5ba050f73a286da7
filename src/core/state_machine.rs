use crate::error::{InvariantViolation, Result};
use crate::events::base::{LogEntry, RecordChange};
use crate::events::record::{aggregate_status, AlertRecord, AlertStatus};

/// Legal edges of the alert lifecycle:
///
/// ```text
/// Pending ──► Cancelled
///    │
///    └──► Dispatching ──► Delivered | PartiallyDelivered | Failed
/// ```
pub fn is_legal_transition(from: AlertStatus, to: AlertStatus) -> bool {
    use AlertStatus::*;

    matches!(
        (from, to),
        (Pending, Cancelled)
            | (Pending, Dispatching)
            | (Dispatching, Delivered)
            | (Dispatching, PartiallyDelivered)
            | (Dispatching, Failed)
    )
}

/// Validates and applies log entries to an `AlertRecord`.
///
/// Live writes and log replay both go through `apply`, so a record rebuilt
/// after a restart passed exactly the checks the original writes did.
pub struct StateMachine;

impl StateMachine {
    /// Check `change` against `record` without mutating it.
    pub fn validate(record: &AlertRecord, change: &RecordChange) -> std::result::Result<(), InvariantViolation> {
        let id = record.request_id;

        if record.is_terminal() {
            return Err(InvariantViolation::frozen_record(id, record.status));
        }

        match change {
            RecordChange::Created { .. } => Err(InvariantViolation {
                invariant: "single_record_per_request",
                details: format!("{} already has a record", id),
            }),

            RecordChange::StatusChanged { from, to } => {
                if *from != record.status {
                    return Err(InvariantViolation {
                        invariant: "status_matches_history",
                        details: format!(
                            "{}: change expects {:?} but record is {:?}",
                            id, from, record.status
                        ),
                    });
                }
                // Terminal dispatch outcomes are written through Finalized
                if !matches!(to, AlertStatus::Cancelled | AlertStatus::Dispatching)
                    || !is_legal_transition(*from, *to)
                {
                    return Err(InvariantViolation::illegal_transition(id, *from, *to));
                }
                Ok(())
            }

            RecordChange::ChannelCompleted(outcome) => {
                if record.status != AlertStatus::Dispatching {
                    return Err(InvariantViolation {
                        invariant: "outcomes_only_while_dispatching",
                        details: format!(
                            "{}: outcome for {} arrived in {:?}",
                            id, outcome.channel, record.status
                        ),
                    });
                }
                if !record.channels.contains(&outcome.channel) {
                    return Err(InvariantViolation {
                        invariant: "outcome_for_selected_channel",
                        details: format!("{}: {} was not selected", id, outcome.channel),
                    });
                }
                if record.channel_outcomes.contains_key(&outcome.channel) {
                    return Err(InvariantViolation::channel_already_final(id, &outcome.channel));
                }
                Ok(())
            }

            RecordChange::Finalized { status } => {
                if !is_legal_transition(record.status, *status) || *status == AlertStatus::Cancelled {
                    return Err(InvariantViolation::illegal_transition(id, record.status, *status));
                }
                let outstanding = record.outstanding_channels();
                if !outstanding.is_empty() {
                    return Err(InvariantViolation {
                        invariant: "finalize_after_all_channels",
                        details: format!("{}: channels still open: {:?}", id, outstanding),
                    });
                }
                let expected = aggregate_status(record.channel_outcomes.values());
                if expected != *status {
                    return Err(InvariantViolation {
                        invariant: "status_matches_outcomes",
                        details: format!(
                            "{}: outcomes imply {:?}, finalize asked for {:?}",
                            id, expected, status
                        ),
                    });
                }
                Ok(())
            }
        }
    }

    /// Validate then apply `entry`. On error the record is left untouched.
    pub fn apply(record: &mut AlertRecord, entry: &LogEntry) -> Result<()> {
        Self::validate(record, &entry.change)?;

        match &entry.change {
            RecordChange::Created { .. } => {}
            RecordChange::StatusChanged { to, .. } => {
                record.status = *to;
                if to.is_terminal() {
                    record.finalized_at = Some(entry.timestamp);
                }
            }
            RecordChange::ChannelCompleted(outcome) => {
                record
                    .channel_outcomes
                    .insert(outcome.channel.clone(), outcome.clone());
            }
            RecordChange::Finalized { status } => {
                record.status = *status;
                record.finalized_at = Some(entry.timestamp);
            }
        }

        Ok(())
    }
}
