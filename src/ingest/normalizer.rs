//! Event normalization boundary.
//!
//! Raw transport payloads are loosely typed; everything past this module
//! works with a strict [`MessageEvent`]. Filtering (empty bodies, the
//! status-broadcast pseudo-contact) and the phone heuristics live here as
//! pure functions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Reserved pseudo-contact used by the transport for story posts.
const STATUS_BROADCAST: &str = "status@broadcast";

/// Minimum significant digits for a counterpart address to be usable.
const MIN_PHONE_DIGITS: usize = 5;

/// Raw chat event as delivered by the browser-automation bridge.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RawChatEvent {
    /// Transport message id, unique per message
    #[schema(example = "3EB0F0D7A2B1C9")]
    pub message_id: String,
    /// Sender address, e.g. "994501112233@c.us"
    pub sender: String,
    /// Recipient address; the counterpart for outbound messages
    pub recipient: Option<String>,
    /// Message text
    pub body: String,
    /// True when the account owner sent the message
    #[serde(default)]
    pub from_me: bool,
    /// Contact name when the transport already resolved it
    pub contact_name: Option<String>,
}

/// Message direction relative to the tracked account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Canonical chat event flowing through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub external_id: String,
    pub phone: String,
    pub body: String,
    pub direction: Direction,
    pub display_name_hint: Option<String>,
    /// Assigned from the server clock at ingestion; transport timestamps
    /// are never trusted.
    pub observed_at: DateTime<Utc>,
}

/// Rejections produced by normalization. These drop the event silently;
/// they are expected traffic, not errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidEvent {
    #[error("empty message body")]
    EmptyBody,
    #[error("status broadcast sender")]
    StatusBroadcast,
    #[error("counterpart address '{0}' has fewer than {MIN_PHONE_DIGITS} digits")]
    PhoneTooShort(String),
}

/// Convert a raw transport payload into a canonical [`MessageEvent`].
pub fn normalize(raw: &RawChatEvent, country_code: &str) -> Result<MessageEvent, InvalidEvent> {
    if raw.body.trim().is_empty() {
        return Err(InvalidEvent::EmptyBody);
    }

    // The counterpart is the sender for inbound traffic and the recipient
    // for messages the account owner sent from another device.
    let counterpart = if raw.from_me {
        raw.recipient.as_deref().unwrap_or(&raw.sender)
    } else {
        raw.sender.as_str()
    };

    if counterpart == STATUS_BROADCAST || raw.sender == STATUS_BROADCAST {
        return Err(InvalidEvent::StatusBroadcast);
    }

    let phone = normalize_phone(counterpart, country_code)
        .ok_or_else(|| InvalidEvent::PhoneTooShort(counterpart.to_string()))?;

    let display_name_hint = raw
        .contact_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    Ok(MessageEvent {
        external_id: raw.message_id.clone(),
        phone,
        body: raw.body.clone(),
        direction: if raw.from_me {
            Direction::Outbound
        } else {
            Direction::Inbound
        },
        display_name_hint,
        observed_at: Utc::now(),
    })
}

/// Best-effort phone normalization.
///
/// Strips the transport's domain suffix and all non-digits, then applies
/// the country-code heuristics: a leading zero is replaced by the country
/// code, and a bare 9-digit local number gets it prepended. Returns `None`
/// below the minimum digit count. Store-level validation (8-15 digits)
/// remains authoritative and may still reject the result.
pub fn normalize_phone(address: &str, country_code: &str) -> Option<String> {
    let local_part = address.split('@').next().unwrap_or(address);
    let digits: String = local_part.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() < MIN_PHONE_DIGITS {
        return None;
    }

    if let Some(rest) = digits.strip_prefix('0') {
        return Some(format!("{country_code}{rest}"));
    }

    if digits.len() == 9 {
        return Some(format!("{country_code}{digits}"));
    }

    Some(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(sender: &str, body: &str) -> RawChatEvent {
        RawChatEvent {
            message_id: "m1".to_string(),
            sender: sender.to_string(),
            recipient: None,
            body: body.to_string(),
            from_me: false,
            contact_name: None,
        }
    }

    #[test]
    fn normalizes_inbound_event() {
        let event = normalize(&raw("994501112233@c.us", "Salam, qiymət?"), "994").unwrap();
        assert_eq!(event.phone, "994501112233");
        assert_eq!(event.external_id, "m1");
        assert_eq!(event.direction, Direction::Inbound);
        assert_eq!(event.body, "Salam, qiymət?");
        assert!(event.display_name_hint.is_none());
    }

    #[test]
    fn outbound_uses_recipient_as_counterpart() {
        let mut event = raw("me@c.us", "thanks!");
        event.from_me = true;
        event.recipient = Some("994501112233@c.us".to_string());

        let normalized = normalize(&event, "994").unwrap();
        assert_eq!(normalized.phone, "994501112233");
        assert_eq!(normalized.direction, Direction::Outbound);
    }

    #[test]
    fn drops_empty_and_whitespace_bodies() {
        assert_eq!(
            normalize(&raw("994501112233@c.us", ""), "994"),
            Err(InvalidEvent::EmptyBody)
        );
        assert_eq!(
            normalize(&raw("994501112233@c.us", "   \n"), "994"),
            Err(InvalidEvent::EmptyBody)
        );
    }

    #[test]
    fn drops_status_broadcast() {
        assert_eq!(
            normalize(&raw("status@broadcast", "story"), "994"),
            Err(InvalidEvent::StatusBroadcast)
        );
    }

    #[test]
    fn rejects_short_addresses() {
        assert!(matches!(
            normalize(&raw("123@c.us", "hi"), "994"),
            Err(InvalidEvent::PhoneTooShort(_))
        ));
    }

    #[test]
    fn blank_contact_name_is_not_a_hint() {
        let mut event = raw("994501112233@c.us", "hi");
        event.contact_name = Some("   ".to_string());
        let normalized = normalize(&event, "994").unwrap();
        assert!(normalized.display_name_hint.is_none());
    }

    #[test]
    fn phone_heuristics() {
        // Domain suffix and decoration are stripped.
        assert_eq!(
            normalize_phone("994-50-111-22-33@s.whatsapp.net", "994").as_deref(),
            Some("994501112233")
        );
        // Leading zero becomes the country code.
        assert_eq!(
            normalize_phone("0501112233", "994").as_deref(),
            Some("994501112233")
        );
        // Bare 9-digit local numbers get the country code prefixed.
        assert_eq!(
            normalize_phone("501112233", "994").as_deref(),
            Some("994501112233")
        );
        // Already-international numbers pass through.
        assert_eq!(
            normalize_phone("994501112233", "994").as_deref(),
            Some("994501112233")
        );
        // Too few digits.
        assert_eq!(normalize_phone("1234", "994"), None);
    }
}
