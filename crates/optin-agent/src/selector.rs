//! Selector shape parsing and existence checks.
//!
//! The planner may emit four selector shapes: `#id`, `[name='x']`,
//! `input[type='x']` and `…:has-text('x')`. Before execution each shape is
//! checked against the observed HTML so hallucinated selectors are caught
//! without a browser round-trip. Unknown shapes are accepted conservatively
//! (better to try than to skip).

use once_cell::sync::Lazy;
use regex::Regex;

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\[name=['"]([^'"]+)['"]\]"#).expect("valid name regex"));
static TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"input\[type=['"]([^'"]+)['"]\]"#).expect("valid type regex"));
static TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#":has-text\(['"]([^'"]+)['"]\)"#).expect("valid has-text regex"));
static CONTAINS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#":contains\(['"]([^'"]+)['"]\)"#).expect("valid contains regex"));

/// The selector shapes the planner is allowed to emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorShape {
    /// `#someId`
    Id(String),
    /// `[name='x']`
    Name(String),
    /// `input[type='x']`
    InputType(String),
    /// `button:has-text('x')` (also `:contains('x')`)
    HasText(String),
    /// Anything else
    Other,
}

/// Parse a selector into its recognised shape.
#[must_use]
pub fn parse_shape(selector: &str) -> SelectorShape {
    if let Some(id) = selector.strip_prefix('#') {
        // Strip attribute/pseudo suffixes: "#email[type=...]" / "#email:hover"
        let bare: String = id
            .chars()
            .take_while(|c| *c != '[' && *c != ':' && *c != ' ')
            .collect();
        if !bare.is_empty() {
            return SelectorShape::Id(bare);
        }
    }
    if let Some(captures) = TEXT_RE.captures(selector).or_else(|| CONTAINS_RE.captures(selector)) {
        return SelectorShape::HasText(captures[1].to_string());
    }
    if let Some(captures) = NAME_RE.captures(&selector.to_lowercase()) {
        return SelectorShape::Name(captures[1].to_string());
    }
    if let Some(captures) = TYPE_RE.captures(&selector.to_lowercase()) {
        return SelectorShape::InputType(captures[1].to_string());
    }
    SelectorShape::Other
}

/// Whether the selector references an element present in the HTML.
///
/// Unparseable shapes return true: execution will surface the failure if the
/// element really is absent.
#[must_use]
pub fn exists_in_html(selector: &str, html: &str) -> bool {
    if selector.is_empty() || html.is_empty() {
        return false;
    }
    let html_lower = html.to_lowercase();
    match parse_shape(selector) {
        SelectorShape::Id(id) => {
            let id = id.to_lowercase();
            html_lower.contains(&format!("id=\"{id}\"")) || html_lower.contains(&format!("id='{id}'"))
        }
        SelectorShape::Name(name) => {
            html_lower.contains(&format!("name=\"{name}\""))
                || html_lower.contains(&format!("name='{name}'"))
        }
        SelectorShape::InputType(kind) => {
            html_lower.contains(&format!("type=\"{kind}\""))
                || html_lower.contains(&format!("type='{kind}'"))
        }
        SelectorShape::HasText(text) => html_lower.contains(&text.to_lowercase()),
        SelectorShape::Other => true,
    }
}

/// Whether a selector targets a radio button or checkbox. Such clicks can
/// trigger tracking POSTs but are never form submissions.
#[must_use]
pub fn is_radio_or_checkbox_selector(selector: &str) -> bool {
    let lower = selector.to_lowercase();
    [
        "type='radio'",
        "type=\"radio\"",
        "type='checkbox'",
        "type=\"checkbox\"",
        "[type=radio]",
        "[type=checkbox]",
    ]
    .iter()
    .any(|pattern| lower.contains(pattern))
}

/// Rewrite a `:contains('x')` selector into the `:has-text` shape the
/// executor's text strategy understands.
#[must_use]
pub fn normalize_contains(selector: &str) -> String {
    if let Some(captures) = CONTAINS_RE.captures(selector) {
        let text = &captures[1];
        let base = CONTAINS_RE.replace(selector, "").to_string();
        let base = base.trim_end_matches(':').trim();
        if base.is_empty() {
            return format!(":has-text('{text}')");
        }
        return format!("{base}:has-text('{text}')");
    }
    selector.to_string()
}

/// The quoted text inside a `:has-text`/`:contains` selector, if any.
#[must_use]
pub fn text_of(selector: &str) -> Option<String> {
    TEXT_RE
        .captures(selector)
        .or_else(|| CONTAINS_RE.captures(selector))
        .map(|c| c[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = r#"<form id="signup"><input type="email" id="email" name="user_email">
        <button type="submit">Subscribe Now</button></form>"#;

    #[test]
    fn test_parse_shapes() {
        assert_eq!(parse_shape("#email"), SelectorShape::Id("email".into()));
        assert_eq!(
            parse_shape("[name='user_email']"),
            SelectorShape::Name("user_email".into())
        );
        assert_eq!(
            parse_shape("input[type='email']"),
            SelectorShape::InputType("email".into())
        );
        assert_eq!(
            parse_shape("button:has-text('Subscribe')"),
            SelectorShape::HasText("Subscribe".into())
        );
        assert_eq!(
            parse_shape("button:contains(\"Subscribe\")"),
            SelectorShape::HasText("Subscribe".into())
        );
        assert_eq!(parse_shape("div.cta > span"), SelectorShape::Other);
    }

    #[test]
    fn test_exists_in_html() {
        assert!(exists_in_html("#email", HTML));
        assert!(exists_in_html("[name='user_email']", HTML));
        assert!(exists_in_html("input[type='email']", HTML));
        assert!(exists_in_html("button:has-text('Subscribe')", HTML));

        assert!(!exists_in_html("#TojDQFSj7Qgr64InnMYO", HTML));
        assert!(!exists_in_html("[name='phone']", HTML));
        assert!(!exists_in_html("input[type='tel']", HTML));
        assert!(!exists_in_html("button:has-text('Register')", HTML));
    }

    #[test]
    fn test_unknown_shapes_accepted() {
        assert!(exists_in_html("div.widget > button", HTML));
    }

    #[test]
    fn test_empty_inputs_rejected() {
        assert!(!exists_in_html("", HTML));
        assert!(!exists_in_html("#email", ""));
    }

    #[test]
    fn test_radio_checkbox_selector() {
        assert!(is_radio_or_checkbox_selector("input[type='radio']"));
        assert!(is_radio_or_checkbox_selector("input[type=\"checkbox\"]"));
        assert!(!is_radio_or_checkbox_selector("button[type='submit']"));
        assert!(!is_radio_or_checkbox_selector("#email"));
    }

    #[test]
    fn test_normalize_contains() {
        assert_eq!(
            normalize_contains("button:contains('Sign Up')"),
            "button:has-text('Sign Up')"
        );
        assert_eq!(normalize_contains("#plain"), "#plain");
    }

    #[test]
    fn test_text_extraction() {
        assert_eq!(
            text_of("a:has-text('Try Now')").as_deref(),
            Some("Try Now")
        );
        assert_eq!(text_of("#email"), None);
    }
}
