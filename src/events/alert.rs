use serde::{Deserialize, Serialize};
use crate::types::ids::RequestId;
use crate::types::location::LocationSnapshot;
use crate::types::timestamp::Timestamp;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerSource {
    Manual,
    AutoSensor,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Manual => "manual",
            TriggerSource::AutoSensor => "auto-sensor",
        }
    }
}

/// A user or sensor SOS trigger. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub request_id: RequestId,
    pub trigger: TriggerSource,
    pub requested_at: Timestamp,
    pub location: Option<LocationSnapshot>,
}

impl AlertRequest {
    pub fn new(trigger: TriggerSource, location: Option<LocationSnapshot>) -> Self {
        AlertRequest {
            request_id: RequestId::new(),
            trigger,
            requested_at: Timestamp::now(),
            location,
        }
    }

    pub fn payload(&self) -> AlertPayload {
        AlertPayload {
            request_id: self.request_id,
            trigger: self.trigger,
            requested_at: self.requested_at,
            location: self.location.clone(),
        }
    }
}

/// What every channel adapter receives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub request_id: RequestId,
    pub trigger: TriggerSource,
    pub requested_at: Timestamp,
    pub location: Option<LocationSnapshot>,
}

impl AlertPayload {
    pub fn location_line(&self) -> String {
        match &self.location {
            Some(location) => match &location.label {
                Some(label) => format!("{} ({})", location.coordinates(), label),
                None => location.coordinates(),
            },
            None => "location unavailable".to_string(),
        }
    }
}
