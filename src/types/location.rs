use serde::{Deserialize, Serialize};
use crate::types::timestamp::Timestamp;

/// Coordinate snapshot taken when an alert is requested.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationSnapshot {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: Option<f64>,
    /// Human label shown in history, e.g. "Home" or "Downtown area".
    pub label: Option<String>,
    pub captured_at: Timestamp,
}

impl LocationSnapshot {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        LocationSnapshot {
            latitude,
            longitude,
            accuracy_m: None,
            label: None,
            captured_at: Timestamp::now(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    pub fn coordinates(&self) -> String {
        format!("{:.6},{:.6}", self.latitude, self.longitude)
    }

    /// Label if present, otherwise the raw coordinates.
    pub fn describe(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => self.coordinates(),
        }
    }
}
