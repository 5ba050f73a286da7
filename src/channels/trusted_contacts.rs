use crate::channels::MessageComposer;
use crate::config::TrustedContact;
use crate::events::alert::AlertPayload;
use crate::interfaces::transport::{ChannelMessage, MessageKind};
use crate::types::ids::ChannelName;

/// One text per trusted contact. The adapter retries only the contacts that
/// have not acknowledged yet.
pub struct TrustedContactsComposer {
    contacts: Vec<TrustedContact>,
}

impl TrustedContactsComposer {
    pub fn new(contacts: Vec<TrustedContact>) -> Self {
        TrustedContactsComposer { contacts }
    }
}

impl MessageComposer for TrustedContactsComposer {
    fn compose(&self, channel: &ChannelName, payload: &AlertPayload) -> Vec<ChannelMessage> {
        self.contacts
            .iter()
            .map(|contact| ChannelMessage {
                request_id: payload.request_id,
                channel: channel.clone(),
                kind: MessageKind::Text,
                recipient: contact.address.clone(),
                body: format!(
                    "{}, this is an emergency alert from someone who listed you as a trusted contact. \
                     Last known location: {}. Sent {} (ref {}).",
                    contact.name,
                    payload.location_line(),
                    payload.requested_at,
                    payload.request_id
                ),
            })
            .collect()
    }
}
