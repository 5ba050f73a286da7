use std::sync::Arc;
use std::time::Duration;
use dashmap::{DashMap, DashSet};
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tokio_stream::wrappers::BroadcastStream;
use tracing::Instrument;
use crate::channels::NotificationChannel;
use crate::config::DispatchConfig;
use crate::core::fanout::fan_out;
use crate::core::gate::CancellationGate;
use crate::error::{Error, Result};
use crate::events::alert::{AlertRequest, TriggerSource};
use crate::events::record::{aggregate_status, AlertRecord, AlertStatus, ChannelOutcome};
use crate::history::{AlertHistory, AlertSummary};
use crate::interfaces::location_provider::LocationProvider;
use crate::invariants::RecordChecks;
use crate::observability::logging::trace_activation;
use crate::observability::metrics::{
    ACTIVATIONS_CANCELLED, ACTIVATIONS_REQUESTED, ALERTS_FINALIZED, CANCELLATIONS_REJECTED,
    DISPATCHES_STARTED, DISPATCH_LATENCY, INVARIANT_VIOLATIONS,
};
use crate::store::{AlertRecordStore, AlertUpdate};
use crate::types::ids::{ChannelName, RequestId};
use crate::types::location::LocationSnapshot;
use crate::utils::TaskSupervisor;

/// Per-activation overrides. The defaults give the normal SOS flow: the
/// configured countdown and every enabled channel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActivationOptions {
    pub countdown: Option<Duration>,
    pub channels: Option<Vec<ChannelName>>,
}

impl ActivationOptions {
    /// Quick action: no countdown.
    pub fn immediate() -> Self {
        ActivationOptions {
            countdown: Some(Duration::ZERO),
            channels: None,
        }
    }

    pub fn with_countdown(mut self, countdown: Duration) -> Self {
        self.countdown = Some(countdown);
        self
    }

    pub fn only<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = Some(channels.into_iter().map(|c| ChannelName::new(c)).collect());
        self
    }
}

/// What the UI shows for one alert.
#[derive(Clone, Debug, PartialEq)]
pub struct AlertView {
    pub record: AlertRecord,
    /// Time left to cancel; `None` once the countdown is over.
    pub countdown_remaining: Option<Duration>,
}

/// A Pending alert still inside its countdown.
struct Activation {
    gate: CancellationGate,
    deadline: Instant,
    wake: Notify,
}

struct Inner {
    config: DispatchConfig,
    store: Arc<AlertRecordStore>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    activations: DashMap<RequestId, Arc<Activation>>,
    /// Cancels that won the gate but whose Cancelled write has not landed.
    unsaved_cancels: DashSet<RequestId>,
    supervisor: TaskSupervisor,
}

/// Alert Coordinator - drives every activation through its lifecycle.
///
/// ## Flow
/// 1. `request_activation` persists a Pending record, arms the countdown on
///    a supervised task and returns the id at once
/// 2. `cancel` and the countdown race on the activation's `CancellationGate`
/// 3. If the countdown wins, the record moves to Dispatching and every
///    selected channel runs concurrently (`fan_out`)
/// 4. `finalize` writes the aggregate terminal status
///
/// Activations never share state beyond the store, so two triggers fired
/// together proceed independently.
#[derive(Clone)]
pub struct AlertCoordinator {
    inner: Arc<Inner>,
}

impl AlertCoordinator {
    pub fn new(
        config: DispatchConfig,
        store: Arc<AlertRecordStore>,
        channels: Vec<Arc<dyn NotificationChannel>>,
    ) -> Result<Self> {
        if channels.is_empty() {
            return Err(Error::NoChannelsConfigured);
        }

        Ok(AlertCoordinator {
            inner: Arc::new(Inner {
                config,
                store,
                channels,
                activations: DashMap::new(),
                unsaved_cancels: DashSet::new(),
                supervisor: TaskSupervisor::new(),
            }),
        })
    }

    pub fn store(&self) -> &Arc<AlertRecordStore> {
        &self.inner.store
    }

    pub fn channel_names(&self) -> Vec<ChannelName> {
        self.inner.channels.iter().map(|c| c.name().clone()).collect()
    }

    /// Start an activation with the configured countdown on every channel.
    pub async fn request_activation(
        &self,
        trigger: TriggerSource,
        location: Option<LocationSnapshot>,
    ) -> Result<RequestId> {
        self.request_activation_with(trigger, location, ActivationOptions::default()).await
    }

    /// Start an activation, snapshotting the provider's last known location.
    pub async fn request_activation_located(
        &self,
        trigger: TriggerSource,
        provider: &dyn LocationProvider,
    ) -> Result<RequestId> {
        let location = provider.last_known().await;
        if location.is_none() {
            tracing::warn!("No location available for {} activation", trigger.as_str());
        }
        self.request_activation(trigger, location).await
    }

    pub async fn request_activation_with(
        &self,
        trigger: TriggerSource,
        location: Option<LocationSnapshot>,
        options: ActivationOptions,
    ) -> Result<RequestId> {
        // Step 1: resolve channels before anything is persisted
        let channels = self.select_channels(options.channels.as_deref())?;
        let countdown = options.countdown.unwrap_or_else(|| self.inner.config.countdown());

        // Step 2: persist the Pending record
        let request = AlertRequest::new(trigger, location);
        let request_id = request.request_id;
        self.inner.store.create(request, channels).await?;
        ACTIVATIONS_REQUESTED.with_label_values(&[trigger.as_str()]).inc();

        // Step 3: arm the countdown
        let activation = Arc::new(Activation {
            gate: CancellationGate::new(),
            deadline: Instant::now() + countdown,
            wake: Notify::new(),
        });
        self.inner.activations.insert(request_id, activation.clone());

        let coordinator = self.clone();
        let span = trace_activation(&request_id, trigger);
        self.inner.supervisor.spawn(
            request_id,
            async move {
                if let Err(e) = coordinator.run_countdown(request_id, activation).await {
                    tracing::error!("Activation {} did not complete: {}", request_id, e);
                }
            }
            .instrument(span),
        );

        tracing::info!(
            "Activation {} requested ({}), dispatch in {:?}",
            request_id,
            trigger.as_str(),
            countdown
        );
        Ok(request_id)
    }

    fn select_channels(&self, requested: Option<&[ChannelName]>) -> Result<Vec<ChannelName>> {
        let Some(requested) = requested else {
            return Ok(self.channel_names());
        };

        if requested.is_empty() {
            return Err(Error::NoChannelsConfigured);
        }

        let mut selected: Vec<ChannelName> = Vec::with_capacity(requested.len());
        for name in requested {
            if self.find_channel(name).is_none() {
                return Err(Error::UnknownChannel(name.to_string()));
            }
            if !selected.contains(name) {
                selected.push(name.clone());
            }
        }
        Ok(selected)
    }

    fn find_channel(&self, name: &ChannelName) -> Option<Arc<dyn NotificationChannel>> {
        self.inner.channels.iter().find(|c| c.name() == name).cloned()
    }

    async fn run_countdown(&self, request_id: RequestId, activation: Arc<Activation>) -> Result<()> {
        tokio::select! {
            _ = sleep_until(activation.deadline) => {}
            _ = activation.wake.notified() => {}
        }

        self.on_countdown_elapsed(request_id).await
    }

    /// Cancel a Pending alert.
    ///
    /// Returns `Ok(true)` if the record is now Cancelled. Returns `Ok(false)`
    /// when the countdown already elapsed or dispatch already started; nothing
    /// already sent is rolled back.
    ///
    /// If the Cancelled write fails the cancel still stands: the alert will
    /// not dispatch, and calling `cancel` again retries the write.
    pub async fn cancel(&self, request_id: RequestId) -> Result<bool> {
        if self.inner.unsaved_cancels.contains(&request_id) {
            return self.save_cancel(request_id).await.map(|_| true);
        }

        let activation = self
            .inner
            .activations
            .get(&request_id)
            .map(|a| a.value().clone());

        let Some(activation) = activation else {
            if self.inner.store.contains(request_id) {
                CANCELLATIONS_REJECTED.inc();
                tracing::warn!("Cancel for {} rejected: countdown no longer running", request_id);
                return Ok(false);
            }
            return Err(Error::UnknownRequest(request_id));
        };

        if Instant::now() >= activation.deadline || !activation.gate.try_cancel() {
            CANCELLATIONS_REJECTED.inc();
            tracing::warn!("Cancel for {} rejected: dispatch already committed", request_id);
            return Ok(false);
        }

        self.inner.unsaved_cancels.insert(request_id);
        self.inner.activations.remove(&request_id);
        activation.wake.notify_one();

        self.save_cancel(request_id).await?;
        Ok(true)
    }

    async fn save_cancel(&self, request_id: RequestId) -> Result<()> {
        if let Err(e) = self.inner.store.transition(request_id, AlertStatus::Cancelled).await {
            tracing::error!("Cancel for {} not saved, alert stays held: {}", request_id, e);
            return Err(e);
        }

        self.inner.unsaved_cancels.remove(&request_id);
        ACTIVATIONS_CANCELLED.inc();
        tracing::info!("Activation {} cancelled before dispatch", request_id);
        Ok(())
    }

    /// Countdown over: commit and dispatch unless cancel got there first.
    pub(crate) async fn on_countdown_elapsed(&self, request_id: RequestId) -> Result<()> {
        let activation = self
            .inner
            .activations
            .get(&request_id)
            .map(|a| a.value().clone());

        let Some(activation) = activation else {
            tracing::debug!("Countdown for {} fired after the activation closed", request_id);
            return Ok(());
        };

        if !activation.gate.try_commit() {
            tracing::info!("Countdown for {} lost the race to cancel", request_id);
            return Ok(());
        }
        self.inner.activations.remove(&request_id);

        let record = self
            .inner
            .store
            .get(request_id)
            .await
            .ok_or(Error::UnknownRequest(request_id))?;

        self.dispatch(record).await.map(|_| ())
    }

    /// Move a committed record to Dispatching (if not already), deliver on
    /// every channel still lacking an outcome, then finalize.
    async fn dispatch(&self, record: AlertRecord) -> Result<AlertRecord> {
        let request_id = record.request_id;
        let started = Instant::now();

        if record.status == AlertStatus::Pending {
            self.inner.store.transition(request_id, AlertStatus::Dispatching).await?;
            DISPATCHES_STARTED.inc();
        }

        let mut outcomes: Vec<ChannelOutcome> = record.channel_outcomes.values().cloned().collect();
        let mut adapters = Vec::new();

        for name in record.outstanding_channels() {
            match self.find_channel(&name) {
                Some(channel) => adapters.push(channel),
                None => {
                    // Selected at creation, gone from config after a restart
                    tracing::error!("Channel {} for {} is no longer configured", name, request_id);
                    let outcome = ChannelOutcome::crashed(name, "channel no longer configured".to_string());
                    self.inner.store.record_channel_outcome(request_id, outcome.clone()).await?;
                    outcomes.push(outcome);
                }
            }
        }

        tracing::info!("Dispatching {} on {} channel(s)", request_id, adapters.len());

        let delivered = fan_out(
            &self.inner.store,
            record.request.payload(),
            adapters,
            self.inner.config.fanout_grace(),
        )
        .await;
        outcomes.extend(delivered);

        let finalized = self.finalize(request_id, &outcomes).await?;
        DISPATCH_LATENCY.observe(started.elapsed().as_secs_f64());
        Ok(finalized)
    }

    /// Write the terminal status implied by `outcomes`.
    pub(crate) async fn finalize(&self, request_id: RequestId, outcomes: &[ChannelOutcome]) -> Result<AlertRecord> {
        let status = aggregate_status(outcomes);
        let record = self.inner.store.finalize(request_id, status).await?;

        ALERTS_FINALIZED.with_label_values(&[status.as_str()]).inc();

        let delivered = outcomes.iter().filter(|o| o.is_delivered()).count();
        if status == AlertStatus::Delivered {
            tracing::info!("Alert {} delivered on all {} channel(s)", request_id, outcomes.len());
        } else {
            tracing::error!(
                "Alert {} finalized as {:?}: {}/{} channel(s) delivered",
                request_id,
                status,
                delivered,
                outcomes.len()
            );
        }

        Ok(record)
    }

    pub async fn status(&self, request_id: RequestId) -> Option<AlertView> {
        let record = self.inner.store.get(request_id).await?;

        let countdown_remaining = if record.status == AlertStatus::Pending {
            self.inner
                .activations
                .get(&request_id)
                .filter(|a| a.gate.is_open())
                .map(|a| a.deadline.saturating_duration_since(Instant::now()))
        } else {
            None
        };

        Some(AlertView {
            record,
            countdown_remaining,
        })
    }

    pub async fn history(&self) -> Vec<AlertRecord> {
        self.inner.store.history().await
    }

    pub async fn recent(&self, limit: usize) -> Vec<AlertRecord> {
        self.inner.store.recent(limit).await
    }

    /// Newest `limit` alerts as list rows.
    pub async fn summaries(&self, limit: usize) -> Vec<AlertSummary> {
        let recent = self.inner.store.recent(limit).await;
        recent.iter().map(AlertSummary::from).collect()
    }

    pub async fn export_csv(&self) -> String {
        AlertHistory::from_records(&self.inner.store.history().await).export_to_csv()
    }

    pub fn subscribe(&self) -> BroadcastStream<AlertUpdate> {
        self.inner.store.subscribe()
    }

    /// Re-drive records left non-terminal by a previous process.
    ///
    /// A Pending record is committed immediately since its countdown died
    /// with the old process. A Dispatching record only runs the channels
    /// that have no recorded outcome. Cancels whose write failed are retried
    /// and never dispatched. Returns the number of records resumed.
    pub async fn recover(&self) -> Result<usize> {
        let unsaved: Vec<RequestId> = self.inner.unsaved_cancels.iter().map(|id| *id).collect();
        for request_id in unsaved {
            // Logged inside; the record stays held either way
            let _ = self.save_cancel(request_id).await;
        }

        let history = self.inner.store.history().await;
        for violation in RecordChecks::check_all(&history) {
            INVARIANT_VIOLATIONS.inc();
            tracing::error!("Restored history is inconsistent: {}", violation);
        }

        let open = self.inner.store.non_terminal().await;
        let mut resumed = 0;

        for record in open {
            let request_id = record.request_id;
            if self.inner.activations.contains_key(&request_id)
                || self.inner.unsaved_cancels.contains(&request_id)
                || self.inner.supervisor.is_running(request_id)
            {
                continue;
            }

            tracing::warn!(
                "Recovering {} from {:?} ({} channel(s) outstanding)",
                request_id,
                record.status,
                record.outstanding_channels().len()
            );

            let coordinator = self.clone();
            let span = trace_activation(&request_id, record.request.trigger);
            self.inner.supervisor.spawn(
                request_id,
                async move {
                    if let Err(e) = coordinator.dispatch(record).await {
                        tracing::error!("Recovery of {} did not complete: {}", request_id, e);
                    }
                }
                .instrument(span),
            );
            resumed += 1;
        }

        if resumed > 0 {
            tracing::info!("Recovered {} unfinished alert(s)", resumed);
        }
        Ok(resumed)
    }

    /// Wait until the activation's task (countdown through finalize) ends.
    pub async fn wait_for(&self, request_id: RequestId) -> Result<()> {
        if !self.inner.store.contains(request_id) {
            return Err(Error::UnknownRequest(request_id));
        }
        self.inner.supervisor.wait_for(request_id).await
    }

    pub fn active_count(&self) -> usize {
        self.inner.supervisor.active_count()
    }

    /// Abort every running activation. Records stay as last written and are
    /// picked up by `recover` on the next start.
    pub async fn shutdown(&self) {
        self.inner.supervisor.shutdown_all().await;
        self.inner.activations.clear();
    }
}
