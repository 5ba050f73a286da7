use std::sync::Arc;
use anyhow::Context;
use resq_dispatch::channels::build_channels;
use resq_dispatch::channels::logging::LoggingTransport;
use resq_dispatch::config::AppConfig;
use resq_dispatch::event_log::file_log::FileEventLog;
use resq_dispatch::event_log::memory_log::MemoryEventLog;
use resq_dispatch::interfaces::event_log::EventLog;
use resq_dispatch::interfaces::location_provider::FixedLocation;
use resq_dispatch::observability::{logging, metrics};
use resq_dispatch::types::location::LocationSnapshot;
use resq_dispatch::{AlertCoordinator, AlertRecordStore, TriggerSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("RESQ_ENV").unwrap_or_else(|_| "development".to_string());
    let config = AppConfig::load(&env).context("loading configuration")?;

    logging::init(&config.logging)?;
    metrics::register_metrics()?;

    let log: Arc<dyn EventLog> = match &config.store.log_path {
        Some(path) => Arc::new(
            FileEventLog::open(path)
                .await
                .with_context(|| format!("opening alert log {}", path.display()))?,
        ),
        None => Arc::new(MemoryEventLog::new()),
    };
    let store = Arc::new(AlertRecordStore::open(log, config.store.update_buffer).await?);

    let channel_configs: Vec<_> = config.enabled_channels().cloned().collect();
    let transport = Arc::new(LoggingTransport::new());
    let channels = build_channels(&channel_configs, transport.clone());

    let coordinator = AlertCoordinator::new(config.dispatch.clone(), store, channels)?;

    let recovered = coordinator.recover().await?;
    if recovered > 0 {
        tracing::warn!("Resumed {} alert(s) left unfinished by the last run", recovered);
    }

    // Demo: one manual SOS with a known location
    let provider = FixedLocation::new(Some(
        LocationSnapshot::new(40.7128, -74.0060)
            .with_accuracy(12.0)
            .with_label("Downtown area"),
    ));
    let request_id = coordinator
        .request_activation_located(TriggerSource::Manual, &provider)
        .await?;

    let mut done = Box::pin(coordinator.wait_for(request_id));
    tokio::select! {
        result = &mut done => result?,
        _ = tokio::signal::ctrl_c() => {
            if coordinator.cancel(request_id).await? {
                tracing::warn!("Interrupted, {} cancelled", request_id);
            }
            done.await?;
        }
    }

    for summary in coordinator.summaries(3).await {
        tracing::info!(
            "{} {} {} {} ({}/{} delivered)",
            summary.timestamp,
            summary.trigger.as_str(),
            summary.status.as_str(),
            summary.location.as_deref().unwrap_or("location unavailable"),
            summary.channels_delivered,
            summary.channels_selected
        );
    }

    tracing::info!("{} message(s) handed to the transport", transport.sent_count());
    tracing::debug!("Metrics:\n{}", metrics::render()?);

    coordinator.shutdown().await;
    Ok(())
}
