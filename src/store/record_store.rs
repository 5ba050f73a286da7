use std::sync::Arc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;
use crate::core::state_machine::StateMachine;
use crate::error::{Error, InvariantViolation, Result};
use crate::events::alert::AlertRequest;
use crate::events::base::{LogEntry, RecordChange};
use crate::events::record::{AlertRecord, AlertStatus, ChannelOutcome};
use crate::interfaces::event_log::EventLog;
use crate::observability::metrics::INVARIANT_VIOLATIONS;
use crate::types::ids::{ChannelName, RequestId};

/// Change notification for read-only subscribers such as the UI.
#[derive(Clone, Debug, PartialEq)]
pub struct AlertUpdate {
    pub request_id: RequestId,
    pub sequence: u64,
    pub change: &'static str,
    pub status: AlertStatus,
}

type RecordSlot = Arc<Mutex<AlertRecord>>;

/// AlertRecord Store - owner of alert history.
///
/// ## Write path
/// 1. Lock the record's own mutex (writes to one request are linearizable,
///    different requests never wait on each other's record lock)
/// 2. Validate the change through `StateMachine`
/// 3. Append it to the event log (durable before visible)
/// 4. Apply it to the in-memory record and publish an `AlertUpdate`
///
/// A change that fails validation is logged as an invariant violation and
/// dropped; the record keeps its last valid state.
pub struct AlertRecordStore {
    log: Arc<dyn EventLog>,
    records: DashMap<RequestId, RecordSlot>,
    updates: broadcast::Sender<AlertUpdate>,
}

impl AlertRecordStore {
    /// Rebuild the store from everything in `log`.
    pub async fn open(log: Arc<dyn EventLog>, update_buffer: usize) -> Result<Self> {
        let entries = log.read_all().await?;
        let entry_count = entries.len();

        let records: DashMap<RequestId, RecordSlot> = DashMap::new();
        for entry in entries {
            Self::replay_entry(&records, entry)?;
        }

        tracing::info!(
            "Alert store restored {} records from {} log entries",
            records.len(),
            entry_count
        );

        let (updates, _) = broadcast::channel(update_buffer.max(1));

        Ok(AlertRecordStore {
            log,
            records,
            updates,
        })
    }

    fn replay_entry(records: &DashMap<RequestId, RecordSlot>, entry: LogEntry) -> Result<()> {
        let request_id = entry.request_id;

        if let RecordChange::Created { request, channels } = &entry.change {
            return match records.entry(request_id) {
                Entry::Occupied(_) => Err(Error::CorruptLog {
                    line: entry.sequence as usize,
                    details: format!("second Created entry for {}", request_id),
                }),
                Entry::Vacant(slot) => {
                    let record = AlertRecord::new(request.clone(), channels.clone(), entry.timestamp);
                    slot.insert(Arc::new(Mutex::new(record)));
                    Ok(())
                }
            };
        }

        let slot = records
            .get(&request_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::CorruptLog {
                line: entry.sequence as usize,
                details: format!("{} entry for unknown request {}", entry.change.kind(), request_id),
            })?;

        // Replay runs before the store is shared, so this never waits
        let mut record = slot.try_lock().map_err(|_| Error::CorruptLog {
            line: entry.sequence as usize,
            details: format!("record {} busy during replay", request_id),
        })?;

        StateMachine::apply(&mut record, &entry).map_err(|e| Error::CorruptLog {
            line: entry.sequence as usize,
            details: e.to_string(),
        })
    }

    /// Create the Pending record for a new activation.
    pub async fn create(&self, request: AlertRequest, channels: Vec<ChannelName>) -> Result<AlertRecord> {
        let request_id = request.request_id;
        let entry = LogEntry::new(
            request_id,
            RecordChange::Created {
                request: request.clone(),
                channels: channels.clone(),
            },
        );
        let record = AlertRecord::new(request, channels, entry.timestamp);

        let slot = Arc::new(Mutex::new(record));
        // Nobody else can see the slot yet
        let guard = slot.clone().try_lock_owned().map_err(|_| {
            Error::InvariantViolation(InvariantViolation {
                invariant: "fresh_record_unlocked",
                details: format!("{} locked before insertion", request_id),
            })
        })?;

        match self.records.entry(request_id) {
            Entry::Occupied(_) => return Err(Error::DuplicateRequestId(request_id)),
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
            }
        }

        let sequence = match self.log.append(entry).await {
            Ok(sequence) => sequence,
            Err(e) => {
                drop(guard);
                self.records.remove(&request_id);
                return Err(e);
            }
        };

        let snapshot = guard.clone();
        drop(guard);

        self.publish(request_id, sequence, "created", AlertStatus::Pending);
        Ok(snapshot)
    }

    /// Move a record to `to` (Pending → Cancelled / Dispatching).
    pub async fn transition(&self, request_id: RequestId, to: AlertStatus) -> Result<AlertRecord> {
        self.write(request_id, |record| RecordChange::StatusChanged {
            from: record.status,
            to,
        })
        .await
    }

    /// Record the final outcome of one channel.
    pub async fn record_channel_outcome(&self, request_id: RequestId, outcome: ChannelOutcome) -> Result<AlertRecord> {
        self.write(request_id, move |_| RecordChange::ChannelCompleted(outcome)).await
    }

    /// Write the terminal dispatch status. Allowed exactly once.
    pub async fn finalize(&self, request_id: RequestId, status: AlertStatus) -> Result<AlertRecord> {
        self.write(request_id, |_| RecordChange::Finalized { status }).await
    }

    async fn write<F>(&self, request_id: RequestId, make_change: F) -> Result<AlertRecord>
    where
        F: FnOnce(&AlertRecord) -> RecordChange,
    {
        let slot = self.slot(request_id)?;
        let mut record = slot.lock().await;

        let mut entry = LogEntry::new(request_id, make_change(&record));

        if let Err(violation) = StateMachine::validate(&record, &entry.change) {
            INVARIANT_VIOLATIONS.inc();
            tracing::error!(
                "Invariant violation on {}: {} (record frozen at {:?})",
                request_id,
                violation,
                record.status
            );
            return Err(Error::InvariantViolation(violation));
        }

        entry.sequence = self.log.append(entry.clone()).await?;
        StateMachine::apply(&mut record, &entry)?;

        let snapshot = record.clone();
        drop(record);

        self.publish(request_id, entry.sequence, entry.change.kind(), snapshot.status);
        Ok(snapshot)
    }

    fn slot(&self, request_id: RequestId) -> Result<RecordSlot> {
        self.records
            .get(&request_id)
            .map(|r| r.value().clone())
            .ok_or(Error::UnknownRequest(request_id))
    }

    fn publish(&self, request_id: RequestId, sequence: u64, change: &'static str, status: AlertStatus) {
        // No subscribers is fine
        let _ = self.updates.send(AlertUpdate {
            request_id,
            sequence,
            change,
            status,
        });
    }

    pub async fn get(&self, request_id: RequestId) -> Option<AlertRecord> {
        let slot = self.slot(request_id).ok()?;
        let record = slot.lock().await;
        Some(record.clone())
    }

    pub fn contains(&self, request_id: RequestId) -> bool {
        self.records.contains_key(&request_id)
    }

    /// All records, newest first.
    pub async fn history(&self) -> Vec<AlertRecord> {
        let mut slots: Vec<(RequestId, RecordSlot)> = self
            .records
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect();
        slots.sort_by(|a, b| b.0.cmp(&a.0));

        let mut records = Vec::with_capacity(slots.len());
        for (_, slot) in slots {
            records.push(slot.lock().await.clone());
        }
        records
    }

    /// The `limit` most recent records, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<AlertRecord> {
        let mut history = self.history().await;
        history.truncate(limit);
        history
    }

    /// Records that have not reached a terminal status, oldest first.
    pub async fn non_terminal(&self) -> Vec<AlertRecord> {
        let mut open: Vec<AlertRecord> = self
            .history()
            .await
            .into_iter()
            .filter(|r| !r.is_terminal())
            .collect();
        open.reverse();
        open
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn subscribe(&self) -> BroadcastStream<AlertUpdate> {
        BroadcastStream::new(self.updates.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::file_log::FileEventLog;
    use crate::event_log::memory_log::MemoryEventLog;
    use crate::events::alert::TriggerSource;
    use crate::events::record::{AttemptResult, DeliveryAttempt};
    use crate::types::timestamp::Timestamp;
    use futures::StreamExt;

    async fn memory_store() -> AlertRecordStore {
        AlertRecordStore::open(Arc::new(MemoryEventLog::new()), 16).await.unwrap()
    }

    fn channels() -> Vec<ChannelName> {
        vec![ChannelName::from("call"), ChannelName::from("sms")]
    }

    fn delivered(channel: &str) -> ChannelOutcome {
        ChannelOutcome::from_attempts(
            ChannelName::from(channel),
            vec![DeliveryAttempt { attempt: 1, at: Timestamp::now(), result: AttemptResult::Delivered }],
        )
    }

    #[tokio::test]
    async fn test_duplicate_request_id_is_rejected() {
        let store = memory_store().await;
        let request = AlertRequest::new(TriggerSource::Manual, None);

        store.create(request.clone(), channels()).await.unwrap();
        assert!(matches!(
            store.create(request, channels()).await,
            Err(Error::DuplicateRequestId(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_illegal_write_leaves_record_unchanged() {
        let store = memory_store().await;
        let request = AlertRequest::new(TriggerSource::Manual, None);
        let id = request.request_id;
        store.create(request, channels()).await.unwrap();

        // Outcome before dispatch
        assert!(store.record_channel_outcome(id, delivered("call")).await.is_err());
        // Finalize from Pending
        assert!(store.finalize(id, AlertStatus::Delivered).await.is_err());

        let record = store.get(id).await.unwrap();
        assert_eq!(record.status, AlertStatus::Pending);
        assert!(record.channel_outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_history_is_newest_first() {
        let store = memory_store().await;
        let mut ids = Vec::new();
        for _ in 0..5 {
            let request = AlertRequest::new(TriggerSource::AutoSensor, None);
            ids.push(request.request_id);
            store.create(request, channels()).await.unwrap();
        }

        let recent: Vec<RequestId> = store.recent(3).await.iter().map(|r| r.request_id).collect();
        assert_eq!(recent, vec![ids[4], ids[3], ids[2]]);

        let open: Vec<RequestId> = store.non_terminal().await.iter().map(|r| r.request_id).collect();
        assert_eq!(open, ids);
    }

    #[tokio::test]
    async fn test_subscribers_see_every_change() {
        let store = memory_store().await;
        let mut updates = store.subscribe();

        let request = AlertRequest::new(TriggerSource::Manual, None);
        let id = request.request_id;
        store.create(request, channels()).await.unwrap();
        store.transition(id, AlertStatus::Cancelled).await.unwrap();

        let first = updates.next().await.unwrap().unwrap();
        let second = updates.next().await.unwrap().unwrap();
        assert_eq!((first.change, first.status), ("created", AlertStatus::Pending));
        assert_eq!((second.change, second.status), ("status_changed", AlertStatus::Cancelled));
        assert!(second.sequence > first.sequence);
    }

    #[tokio::test]
    async fn test_history_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.log");

        let request = AlertRequest::new(TriggerSource::Manual, None);
        let id = request.request_id;
        {
            let log = Arc::new(FileEventLog::open(&path).await.unwrap());
            let store = AlertRecordStore::open(log, 16).await.unwrap();
            store.create(request, channels()).await.unwrap();
            store.transition(id, AlertStatus::Dispatching).await.unwrap();
            store.record_channel_outcome(id, delivered("call")).await.unwrap();
            store.record_channel_outcome(id, delivered("sms")).await.unwrap();
            store.finalize(id, AlertStatus::Delivered).await.unwrap();
        }

        let log = Arc::new(FileEventLog::open(&path).await.unwrap());
        let store = AlertRecordStore::open(log, 16).await.unwrap();
        let record = store.get(id).await.unwrap();

        assert_eq!(record.status, AlertStatus::Delivered);
        assert_eq!(record.channel_outcomes.len(), 2);
        assert!(record.finalized_at.is_some());

        // Still frozen after reload
        assert!(store.finalize(id, AlertStatus::Delivered).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_writers_on_distinct_records() {
        let store = Arc::new(memory_store().await);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let request = AlertRequest::new(TriggerSource::Manual, None);
                let id = request.request_id;
                store.create(request, channels()).await.unwrap();
                store.transition(id, AlertStatus::Dispatching).await.unwrap();
                store.record_channel_outcome(id, delivered("call")).await.unwrap();
                store.record_channel_outcome(id, delivered("sms")).await.unwrap();
                store.finalize(id, AlertStatus::Delivered).await.unwrap();
                id
            }));
        }

        for handle in handles {
            let id = handle.await.unwrap();
            let record = store.get(id).await.unwrap();
            assert_eq!(record.status, AlertStatus::Delivered);
            assert_eq!(record.channel_outcomes.len(), 2);
        }
    }
}
