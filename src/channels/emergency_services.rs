use crate::channels::MessageComposer;
use crate::events::alert::AlertPayload;
use crate::interfaces::transport::{ChannelMessage, MessageKind};
use crate::types::ids::ChannelName;

/// Places one call to the configured emergency number.
pub struct EmergencyServicesComposer {
    dial_number: String,
}

impl EmergencyServicesComposer {
    pub fn new(dial_number: &str) -> Self {
        EmergencyServicesComposer {
            dial_number: dial_number.to_string(),
        }
    }
}

impl MessageComposer for EmergencyServicesComposer {
    fn compose(&self, channel: &ChannelName, payload: &AlertPayload) -> Vec<ChannelMessage> {
        vec![ChannelMessage {
            request_id: payload.request_id,
            channel: channel.clone(),
            kind: MessageKind::VoiceCall,
            recipient: self.dial_number.clone(),
            body: format!(
                "Emergency SOS ({}) raised at {}. Caller location: {}. Reference {}.",
                payload.trigger.as_str(),
                payload.requested_at,
                payload.location_line(),
                payload.request_id
            ),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::alert::{AlertRequest, TriggerSource};

    #[test]
    fn test_single_call_without_location() {
        let composer = EmergencyServicesComposer::new("911");
        let payload = AlertRequest::new(TriggerSource::AutoSensor, None).payload();

        let messages = composer.compose(&ChannelName::from("call"), &payload);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].recipient, "911");
        assert_eq!(messages[0].kind, MessageKind::VoiceCall);
        assert!(messages[0].body.contains("auto-sensor"));
        assert!(messages[0].body.contains("location unavailable"));
    }
}
