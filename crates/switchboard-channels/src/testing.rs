//! Shared fixtures for unit tests.

use switchboard_core::types::{ChannelId, InboundMessage, PeerId, PeerType, SessionKey};

pub fn sample_message(id: &str) -> InboundMessage {
    let channel = ChannelId::new("test");
    let peer_id = PeerId::new("peer-1");
    InboundMessage {
        id: id.to_string(),
        session_key: SessionKey::build(&channel, "local", PeerType::Dm, &peer_id),
        channel,
        account_id: "local".to_string(),
        peer_id,
        peer_type: PeerType::Dm,
        content: format!("message {id}"),
        attachments: Vec::new(),
        timestamp: chrono::Utc::now(),
        reply_to: None,
        thread_id: None,
        mentions: Vec::new(),
        raw: None,
    }
}
