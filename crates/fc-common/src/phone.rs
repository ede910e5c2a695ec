//! E.164 phone normalization and channel-prefix extraction.
//!
//! Grounded on the channel-prefix-stripping + validation logic the provider
//! integration in this system has always used (`whatsapp:+1555…` style
//! addresses), generalized into a typed helper instead of ad-hoc string
//! slicing at each call site.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Messaging medium a provider-prefixed address was submitted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Whatsapp,
    Sms,
    Messenger,
    Voice,
}

impl Channel {
    fn prefix(self) -> &'static str {
        match self {
            Channel::Whatsapp => "whatsapp:",
            Channel::Sms => "sms:",
            Channel::Messenger => "messenger:",
            Channel::Voice => "voice:",
        }
    }

    fn from_prefix(s: &str) -> Option<(Channel, &str)> {
        const CHANNELS: [Channel; 4] = [
            Channel::Whatsapp,
            Channel::Sms,
            Channel::Messenger,
            Channel::Voice,
        ];
        for channel in CHANNELS {
            if let Some(rest) = s.strip_prefix(channel.prefix()) {
                return Some((channel, rest));
            }
        }
        None
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Channel::Whatsapp => "whatsapp",
            Channel::Sms => "sms",
            Channel::Messenger => "messenger",
            Channel::Voice => "voice",
        };
        f.write_str(s)
    }
}

/// A phone number normalized to E.164: `+` followed by 1-15 digits, leading
/// non-zero. This is the canonical identity for a User.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn e164_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+[1-9]\d{1,14}$").expect("static E.164 regex"))
}

/// Validate and wrap an already channel-stripped phone string.
pub fn normalize(raw: &str) -> Option<PhoneNumber> {
    let trimmed = raw.trim();
    if e164_regex().is_match(trimmed) {
        Some(PhoneNumber(trimmed.to_string()))
    } else {
        None
    }
}

/// Strip a known channel prefix (if any) and validate the remainder as
/// E.164. Addresses with no recognized prefix are treated as `Sms`.
///
/// Returns `None` when the remaining digits fail E.164 validation — callers
/// (the webhook ingestor) must acknowledge the provider anyway and simply
/// drop the record, per the durability contract.
pub fn extract_channel_and_phone(raw: &str) -> Option<(Channel, PhoneNumber)> {
    let (channel, rest) = match Channel::from_prefix(raw) {
        Some((channel, rest)) => (channel, rest),
        None => (Channel::Sms, raw),
    };
    normalize(rest).map(|phone| (channel, phone))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bare_e164() {
        assert!(normalize("+14155550001").is_some());
    }

    #[test]
    fn rejects_leading_zero() {
        assert!(normalize("+01234567890").is_none());
    }

    #[test]
    fn rejects_missing_plus() {
        assert!(normalize("14155550001").is_none());
    }

    #[test]
    fn strips_whatsapp_prefix() {
        let (channel, phone) = extract_channel_and_phone("whatsapp:+14155550001").unwrap();
        assert_eq!(channel, Channel::Whatsapp);
        assert_eq!(phone.as_str(), "+14155550001");
    }

    #[test]
    fn defaults_to_sms_without_prefix() {
        let (channel, _) = extract_channel_and_phone("+14155550001").unwrap();
        assert_eq!(channel, Channel::Sms);
    }

    #[test]
    fn rejects_malformed_after_prefix_strip() {
        assert!(extract_channel_and_phone("whatsapp:not-a-number").is_none());
    }
}
