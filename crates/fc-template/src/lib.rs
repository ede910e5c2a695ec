//! Named-placeholder substitution (§4.4). No conditional syntax, no
//! nesting — a deliberately small grammar so campaign content stays
//! auditable and rendering never runs arbitrary logic.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("missing or empty template attributes: {0:?}")]
pub struct MissingAttributeError(pub Vec<String>);

pub type Result<T> = std::result::Result<T, MissingAttributeError>;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static placeholder regex"))
}

/// Substitute every `{identifier}` occurrence in `content` with the matching
/// entry from `attributes`. An identifier that is absent or maps to an
/// empty string fails the whole render — partially-rendered content is
/// never persisted or sent.
pub fn render(content: &str, attributes: &HashMap<String, String>) -> Result<String> {
    let mut missing = Vec::new();
    for capture in placeholder_regex().captures_iter(content) {
        let name = &capture[1];
        match attributes.get(name) {
            Some(value) if !value.is_empty() => {}
            _ => missing.push(name.to_string()),
        }
    }

    if !missing.is_empty() {
        missing.sort();
        missing.dedup();
        return Err(MissingAttributeError(missing));
    }

    let rendered = placeholder_regex().replace_all(content, |caps: &regex::Captures| {
        attributes.get(&caps[1]).cloned().unwrap_or_default()
    });
    Ok(rendered.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn substitutes_known_placeholders() {
        let rendered = render("Hi {name}, welcome to {city}!", &attrs(&[("name", "Ada"), ("city", "NYC")]))
            .unwrap();
        assert_eq!(rendered, "Hi Ada, welcome to NYC!");
    }

    #[test]
    fn content_without_placeholders_passes_through() {
        let rendered = render("No placeholders here.", &HashMap::new()).unwrap();
        assert_eq!(rendered, "No placeholders here.");
    }

    #[test]
    fn missing_attribute_fails_render() {
        let err = render("Hi {name}", &HashMap::new()).unwrap_err();
        assert_eq!(err.0, vec!["name".to_string()]);
    }

    #[test]
    fn empty_attribute_value_fails_render() {
        let err = render("Hi {name}", &attrs(&[("name", "")])).unwrap_err();
        assert_eq!(err.0, vec!["name".to_string()]);
    }

    #[test]
    fn reports_all_missing_identifiers_deduplicated() {
        let err = render("{a} {b} {a}", &HashMap::new()).unwrap_err();
        assert_eq!(err.0, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn bare_brace_outside_placeholder_grammar_passes_through() {
        let rendered = render("cost: { not a placeholder }", &HashMap::new()).unwrap();
        assert_eq!(rendered, "cost: { not a placeholder }");
    }
}
