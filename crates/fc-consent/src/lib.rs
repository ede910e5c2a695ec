//! Consent normalization and STOP/START intent detection (§4.6). Pure
//! functions only — the side-effecting transactional update lives in
//! fc-webhook, which owns the InboundEvent-plus-consent-write unit of work.

use std::collections::HashMap;

use chrono::Utc;
use fc_common::ConsentState;

const STOP_WORDS: &[&str] = &[
    "stop",
    "stopall",
    "unsubscribe",
    "cancel",
    "end",
    "quit",
    "opt-out",
];

const START_WORDS: &[&str] = &["start", "subscribe", "join", "yes", "unstop"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Stop,
    Start,
    None,
}

/// Lowercase, trim, and collapse internal whitespace runs to single spaces.
pub fn normalize_body(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Classify an already-normalized body against the STOP/START word lists.
pub fn classify_intent(normalized_body: &str) -> Intent {
    if STOP_WORDS.contains(&normalized_body) {
        Intent::Stop
    } else if START_WORDS.contains(&normalized_body) {
        Intent::Start
    } else {
        Intent::None
    }
}

/// Apply an intent to the current consent state. Returns `None` when no
/// write is needed: a START intent is a no-op unless the user is currently
/// `STOP` (preserves the `OPT_OUT` distinction, §4.6).
pub fn apply_intent(current: ConsentState, intent: Intent) -> Option<ConsentState> {
    match intent {
        Intent::Stop => Some(ConsentState::Stop),
        Intent::Start if current == ConsentState::Stop => Some(ConsentState::OptIn),
        Intent::Start | Intent::None => None,
    }
}

/// WhatsApp profile metadata captured off an inbound webhook, merged into
/// the User attribute map alongside the consent update (SPEC_FULL §4.6).
pub fn profile_attributes(profile_name: Option<&str>, wa_id: Option<&str>) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    if let Some(name) = profile_name.filter(|s| !s.is_empty()) {
        attrs.insert("profile_name".to_string(), name.to_string());
    }
    if let Some(id) = wa_id.filter(|s| !s.is_empty()) {
        attrs.insert("wa_id".to_string(), id.to_string());
    }
    attrs.insert("last_inbound_at".to_string(), Utc::now().to_rfc3339());
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_body("  STOP   now "), "stop now");
        assert_eq!(normalize_body("Stop"), "stop");
    }

    #[test]
    fn detects_stop_words() {
        assert_eq!(classify_intent("stopall"), Intent::Stop);
        assert_eq!(classify_intent("opt-out"), Intent::Stop);
    }

    #[test]
    fn detects_start_words() {
        assert_eq!(classify_intent("yes"), Intent::Start);
    }

    #[test]
    fn unrecognized_body_is_no_intent() {
        assert_eq!(classify_intent("what's the weather"), Intent::None);
    }

    #[test]
    fn stop_intent_always_wins() {
        assert_eq!(apply_intent(ConsentState::OptIn, Intent::Stop), Some(ConsentState::Stop));
        assert_eq!(apply_intent(ConsentState::OptOut, Intent::Stop), Some(ConsentState::Stop));
    }

    #[test]
    fn start_intent_only_clears_stop() {
        assert_eq!(apply_intent(ConsentState::Stop, Intent::Start), Some(ConsentState::OptIn));
        assert_eq!(apply_intent(ConsentState::OptOut, Intent::Start), None);
        assert_eq!(apply_intent(ConsentState::OptIn, Intent::Start), None);
    }

    #[test]
    fn profile_attributes_skip_empty_fields() {
        let attrs = profile_attributes(Some(""), Some("wa-123"));
        assert!(!attrs.contains_key("profile_name"));
        assert_eq!(attrs.get("wa_id").unwrap(), "wa-123");
        assert!(attrs.contains_key("last_inbound_at"));
    }
}
