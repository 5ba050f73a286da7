use crate::error::{Error, InvariantViolation, Result};
use crate::events::record::{aggregate_status, AlertRecord, AlertStatus};

/// Whole-record consistency checks.
///
/// `StateMachine` guards each write; these look at a record as a whole and
/// are run over the store after a restart, before anything is re-driven.
pub struct RecordChecks;

impl RecordChecks {
    /// Every recorded outcome belongs to a channel selected at creation.
    pub fn check_outcomes_for_selected_channels(record: &AlertRecord) -> Result<()> {
        for channel in record.channel_outcomes.keys() {
            if !record.channels.contains(channel) {
                return Err(Error::InvariantViolation(InvariantViolation {
                    invariant: "outcome_for_selected_channel",
                    details: format!(
                        "{} has an outcome for {} which was never selected",
                        record.request_id, channel
                    ),
                }));
            }
        }
        Ok(())
    }

    /// Outcomes exist only once dispatch has started.
    pub fn check_no_outcomes_before_dispatch(record: &AlertRecord) -> Result<()> {
        let undispatched = matches!(record.status, AlertStatus::Pending | AlertStatus::Cancelled);

        if undispatched && !record.channel_outcomes.is_empty() {
            return Err(Error::InvariantViolation(InvariantViolation {
                invariant: "cancel_means_no_delivery",
                details: format!(
                    "{} is {:?} but has {} channel outcome(s)",
                    record.request_id,
                    record.status,
                    record.channel_outcomes.len()
                ),
            }));
        }
        Ok(())
    }

    /// `finalized_at` is set exactly when the record is terminal.
    pub fn check_finalized_timestamp(record: &AlertRecord) -> Result<()> {
        if record.is_terminal() != record.finalized_at.is_some() {
            return Err(Error::InvariantViolation(InvariantViolation {
                invariant: "finalized_iff_terminal",
                details: format!(
                    "{} is {:?} with finalized_at {:?}",
                    record.request_id, record.status, record.finalized_at
                ),
            }));
        }
        Ok(())
    }

    /// A terminal dispatch status agrees with the channel outcomes behind it.
    pub fn check_status_matches_outcomes(record: &AlertRecord) -> Result<()> {
        if !matches!(
            record.status,
            AlertStatus::Delivered | AlertStatus::PartiallyDelivered | AlertStatus::Failed
        ) {
            return Ok(());
        }

        let outstanding = record.outstanding_channels();
        let expected = aggregate_status(record.channel_outcomes.values());

        if !outstanding.is_empty() || expected != record.status {
            return Err(Error::InvariantViolation(InvariantViolation {
                invariant: "status_matches_outcomes",
                details: format!(
                    "{} is {:?}, outcomes imply {:?}, {} channel(s) without outcome",
                    record.request_id,
                    record.status,
                    expected,
                    outstanding.len()
                ),
            }));
        }
        Ok(())
    }

    pub fn check_record(record: &AlertRecord) -> Result<()> {
        Self::check_outcomes_for_selected_channels(record)?;
        Self::check_no_outcomes_before_dispatch(record)?;
        Self::check_finalized_timestamp(record)?;
        Self::check_status_matches_outcomes(record)?;
        Ok(())
    }

    /// Check every record, returning the violations found.
    pub fn check_all<'a>(records: impl IntoIterator<Item = &'a AlertRecord>) -> Vec<Error> {
        records
            .into_iter()
            .filter_map(|record| Self::check_record(record).err())
            .collect()
    }
}
