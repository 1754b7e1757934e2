//! Message formatting for the two kinds of notice the poller sends.

use railwatch_core::types::{Block, Incident, OutboundMessage};

/// Label for the link back to the disruption notice.
const INCIDENT_LINK_LABEL: &str = "View on National Rail";

/// A new incident at `station_code`: short fallback text plus title, summary and link blocks.
pub fn incident_message(station_code: &str, incident: &Incident) -> OutboundMessage {
    OutboundMessage::text(format!("Incident at {station_code}")).with_blocks(vec![
        Block::mrkdwn(format!("*{}*", incident.title)),
        Block::mrkdwn(incident.summary.clone()),
        Block::mrkdwn(format!("<{}|{}>", incident.url, INCIDENT_LINK_LABEL)),
    ])
}

/// All incidents at `station_code` have cleared.
pub fn good_service_message(station_code: &str) -> OutboundMessage {
    OutboundMessage::text(format!(
        "✅ *Good service at {station_code}* (All previous incidents cleared)"
    ))
}
