use serde::{Deserialize, Serialize};
use crate::events::alert::TriggerSource;
use crate::events::record::{AlertRecord, AlertStatus};
use crate::types::ids::RequestId;
use crate::types::timestamp::Timestamp;

/// One row of the recent-alerts list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub request_id: RequestId,
    pub timestamp: Timestamp,
    pub status: AlertStatus,
    pub trigger: TriggerSource,
    pub location: Option<String>,
    pub channels_delivered: usize,
    pub channels_selected: usize,
}

impl From<&AlertRecord> for AlertSummary {
    fn from(record: &AlertRecord) -> Self {
        AlertSummary {
            request_id: record.request_id,
            timestamp: record.created_at,
            status: record.status,
            trigger: record.request.trigger,
            location: record.request.location.as_ref().map(|l| l.describe()),
            channels_delivered: record.delivered_count(),
            channels_selected: record.channels.len(),
        }
    }
}

/// Read-only view over alert history, newest first.
pub struct AlertHistory {
    entries: Vec<AlertSummary>,
}

impl AlertHistory {
    /// `records` are expected newest first, as the store returns them.
    pub fn from_records(records: &[AlertRecord]) -> Self {
        AlertHistory {
            entries: records.iter().map(AlertSummary::from).collect(),
        }
    }

    pub fn entries(&self) -> &[AlertSummary] {
        &self.entries
    }

    pub fn latest(&self, limit: usize) -> Vec<AlertSummary> {
        self.entries.iter().take(limit).cloned().collect()
    }

    pub fn by_trigger(&self, trigger: TriggerSource) -> Vec<&AlertSummary> {
        self.entries.iter()
            .filter(|e| e.trigger == trigger)
            .collect()
    }

    pub fn export_to_csv(&self) -> String {
        let mut csv = String::from("timestamp,request_id,status,trigger,location,delivered,selected\n");

        for entry in &self.entries {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                entry.timestamp,
                entry.request_id,
                entry.status.as_str(),
                entry.trigger.as_str(),
                csv_field(entry.location.as_deref().unwrap_or("")),
                entry.channels_delivered,
                entry.channels_selected
            ));
        }

        csv
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
