use serde_json::json;
use crate::channels::MessageComposer;
use crate::events::alert::AlertPayload;
use crate::interfaces::transport::{ChannelMessage, MessageKind};
use crate::types::ids::ChannelName;

/// Posts the coordinate snapshot to a location beacon endpoint.
pub struct LocationBeaconComposer {
    endpoint: String,
}

impl LocationBeaconComposer {
    pub fn new(endpoint: &str) -> Self {
        LocationBeaconComposer {
            endpoint: endpoint.to_string(),
        }
    }
}

impl MessageComposer for LocationBeaconComposer {
    fn compose(&self, channel: &ChannelName, payload: &AlertPayload) -> Vec<ChannelMessage> {
        let body = match &payload.location {
            Some(location) => json!({
                "request_id": payload.request_id.to_string(),
                "latitude": location.latitude,
                "longitude": location.longitude,
                "accuracy_m": location.accuracy_m,
                "captured_at_ms": location.captured_at.physical,
            }),
            // Still beacon so receivers know an alert is live
            None => json!({
                "request_id": payload.request_id.to_string(),
                "location": "unavailable",
            }),
        };

        vec![ChannelMessage {
            request_id: payload.request_id,
            channel: channel.clone(),
            kind: MessageKind::Beacon,
            recipient: self.endpoint.clone(),
            body: body.to_string(),
        }]
    }
}
