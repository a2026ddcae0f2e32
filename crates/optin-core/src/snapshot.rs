//! Normalised page observations.
//!
//! A [`PageSnapshot`] is an immutable value capture of the live DOM: forms
//! with their inputs and submit buttons, standalone inputs, clickable
//! buttons with CTA scoring, visible text, validation errors, CAPTCHA and
//! overlay state. The browser crate produces snapshots; the classifier,
//! planner and oracle consume them without touching the page again.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of form input, as observed in the DOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// Plain text input (also the fallback for unknown types)
    Text,
    /// `type="email"`
    Email,
    /// `type="tel"`
    Tel,
    /// `type="password"`
    Password,
    /// `type="checkbox"`
    Checkbox,
    /// `type="radio"`
    Radio,
    /// `<select>` dropdown
    Select,
    /// A div/label styled to act as a checkbox (`role="checkbox"` etc.)
    DivCheckbox,
}

impl InputKind {
    /// Map a DOM `type` attribute (or tag marker) to an input kind.
    #[must_use]
    pub fn from_dom_type(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "email" => Self::Email,
            "tel" => Self::Tel,
            "password" => Self::Password,
            "checkbox" => Self::Checkbox,
            "radio" => Self::Radio,
            "select" => Self::Select,
            "div-checkbox" => Self::DivCheckbox,
            _ => Self::Text,
        }
    }

    /// Whether this kind accepts typed text.
    #[must_use]
    pub fn is_fillable_text(self) -> bool {
        matches!(self, Self::Text | Self::Email | Self::Tel | Self::Password)
    }

    /// Whether this kind toggles rather than holds text.
    #[must_use]
    pub fn is_toggle(self) -> bool {
        matches!(self, Self::Checkbox | Self::Radio | Self::DivCheckbox)
    }
}

/// One input element, with its ancestor-form context resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDescriptor {
    /// Input kind
    pub kind: InputKind,
    /// Deterministic selector (id-preferred, then name, then type fallback)
    pub selector: String,
    /// `name` attribute (may be empty)
    pub name: String,
    /// `id` attribute (may be empty)
    pub id: String,
    /// Placeholder text
    pub placeholder: String,
    /// Associated label text (wrapping label or `label[for]`)
    pub label_text: String,
    /// `aria-label` attribute
    pub aria_label: String,
    /// Whether the element itself passed the visibility test
    pub is_visible: bool,
    /// Invisible checkbox/radio retained because a visible label wraps it
    pub is_hidden_sr_only: bool,
    /// Whether a `<label>` ancestor wraps the element
    pub wrapped_in_label: bool,
    /// Checked state for toggles
    pub checked: bool,
    /// `required` attribute
    pub required: bool,
    /// Option values for selects
    pub options: Vec<String>,
    /// Stable id of the ancestor form, if any
    pub form_id_ref: Option<String>,
    /// Resolved submit selector of the ancestor form, if any
    pub form_submit_selector_ref: Option<String>,
}

/// One clickable element (button, submit input, or CTA-looking link).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonDescriptor {
    /// Trimmed visible text (or `value` for inputs)
    pub text: String,
    /// Deterministic selector
    pub selector: String,
    /// `type` attribute or lowercased tag name
    pub kind: String,
    /// Whether the CTA score reached the threshold
    pub is_cta: bool,
    /// Whether the text matches a submit keyword or `type="submit"`
    pub is_likely_submit: bool,
    /// Dial-code / flag dropdown look-alike, never a submit target
    pub is_dial_code: bool,
    /// Stable id of the ancestor form, if any
    pub form_id_ref: Option<String>,
}

/// One form, with its inputs and candidate submit buttons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormDescriptor {
    /// Stable form id (`#id` if present, else positional `form_N`)
    pub id: String,
    /// Selector for the form element itself
    pub selector: String,
    /// `action` attribute
    pub action: String,
    /// `method` attribute
    pub method: String,
    /// Inputs inside the form
    pub inputs: Vec<InputDescriptor>,
    /// Candidate submit buttons inside the form (dial-code buttons excluded)
    pub submit_buttons: Vec<ButtonDescriptor>,
    /// Submit selector resolved by [`resolve_submit_selector`]
    pub submit_selector: Option<String>,
}

/// CAPTCHA kinds the observer can distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptchaKind {
    /// reCAPTCHA v2 anchor checkbox
    RecaptchaV2,
    /// reCAPTCHA image-challenge popup (bframe)
    RecaptchaChallenge,
    /// hCaptcha widget
    Hcaptcha,
    /// Cloudflare Turnstile widget
    Turnstile,
    /// "please complete the captcha" error text with no widget located
    ErrorText,
    /// No CAPTCHA observed
    None,
}

/// CAPTCHA presence as observed on the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaInfo {
    /// A CAPTCHA element or error text exists in the DOM
    pub present: bool,
    /// The widget iframe/container passed the visibility test
    pub visible: bool,
    /// Distinguished kind
    pub kind: CaptchaKind,
    /// `data-sitekey` if one was found
    pub sitekey: Option<String>,
}

impl CaptchaInfo {
    /// No CAPTCHA observed.
    #[must_use]
    pub fn none() -> Self {
        Self {
            present: false,
            visible: false,
            kind: CaptchaKind::None,
            sitekey: None,
        }
    }
}

/// Blocking overlay/modal state, with its content classified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayInfo {
    /// Matched one of the "modal shown" selectors and is rendered
    pub present: bool,
    /// Overlay text contains an explicit success phrase
    pub is_success_text: bool,
    /// Overlay is a post-signup recommendation widget
    pub is_recommendation: bool,
    /// Overlay contains an iframe
    pub has_iframe: bool,
    /// The iframe `src`, if any
    pub iframe_src: Option<String>,
    /// Overlay text or iframe src indicates a CAPTCHA
    pub has_captcha_content: bool,
    /// Overlay text contains error/validation phrases
    pub has_error_text: bool,
    /// Selector for a close affordance inside the overlay, if found
    pub close_selector: Option<String>,
    /// Leading overlay text (lowercased, truncated)
    pub text: String,
}

/// Login-vs-signup affordances observed on the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginIndicators {
    /// "forgot password" style text present
    pub has_forgot_password: bool,
    /// A "remember me" checkbox present
    pub has_remember_me: bool,
    /// A bare sign in / log in button present
    pub has_login_button: bool,
    /// A sign up / register / subscribe button present
    pub has_signup_button: bool,
    /// Form fields reduce to email + password with no name/phone
    pub has_password_only: bool,
}

/// A navigation button that may lead to a signup form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavButton {
    /// Trimmed visible text
    pub text: String,
    /// Selector to click
    pub selector: String,
}

/// Aggregate boolean signals feeding the page classifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageSignals {
    /// A visible email input (by type or naming) exists
    pub has_email_input: bool,
    /// A visible password input exists
    pub has_password_input: bool,
    /// A confirm/repeat password input exists
    pub has_confirm_password_input: bool,
    /// A name-like input exists
    pub has_name_input: bool,
    /// A phone-like input exists
    pub has_phone_input: bool,
    /// Newsletter/mailing-list phrases in the page text
    pub has_newsletter_text: bool,
    /// An email input inside footer/subscribe/newsletter containers
    pub has_footer_email_input: bool,
    /// Signup phrases in the page text
    pub has_signup_text: bool,
    /// Login phrases in the page text
    pub has_login_text: bool,
    /// A terms/privacy/agree checkbox exists
    pub has_terms_checkbox: bool,
    /// ≥ 2 article-structure indicators matched
    pub has_article_structure: bool,
    /// A comment section exists
    pub has_comment_section: bool,
    /// The document title looks like a blog/article title
    pub has_blog_title: bool,
    /// Actual credit-card input fields exist (informational)
    pub has_credit_card_input: bool,
    /// Stripe/Braintree/PayPal payment iframes exist (informational)
    pub has_payment_iframe: bool,
    /// OAuth / social-login affordances exist
    pub has_social_login: bool,
    /// Buttons that may lead to a signup form
    pub navigation_buttons: Vec<NavButton>,
}

/// A normalised, immutable observation of the current page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Current URL
    pub url: String,
    /// Document title
    pub title: String,
    /// Lowercased visible-text prefix (≤ ~3 KB)
    pub visible_text: String,
    /// Forms in document order
    pub forms: Vec<FormDescriptor>,
    /// All observed inputs (including those outside forms)
    pub inputs: Vec<InputDescriptor>,
    /// All observed clickable elements
    pub buttons: Vec<ButtonDescriptor>,
    /// Up to 5 validation error strings scraped from the page
    pub error_messages: Vec<String>,
    /// CAPTCHA state
    pub captcha: CaptchaInfo,
    /// Overlay state, if one is shown
    pub overlay: Option<OverlayInfo>,
    /// Simplified HTML of visible forms (≤ 5 KB), for batch planning
    pub simplified_html: String,
    /// Total `<form>` count in the document (visible or not)
    pub form_count: usize,
    /// Login-page indicators
    pub login: LoginIndicators,
    /// Classifier signals
    pub signals: PageSignals,
}

impl PageSnapshot {
    /// Empty best-effort snapshot used when observation degrades.
    #[must_use]
    pub fn empty(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            visible_text: String::new(),
            forms: Vec::new(),
            inputs: Vec::new(),
            buttons: Vec::new(),
            error_messages: Vec::new(),
            captcha: CaptchaInfo::none(),
            overlay: None,
            simplified_html: String::new(),
            form_count: 0,
            login: LoginIndicators::default(),
            signals: PageSignals::default(),
        }
    }

    /// Whether any visible fillable text input was observed.
    #[must_use]
    pub fn has_fillable_input(&self) -> bool {
        self.inputs
            .iter()
            .any(|i| i.kind.is_fillable_text() && i.is_visible)
    }
}

impl fmt::Display for PageSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} forms, {} inputs, {} buttons)",
            self.url,
            self.forms.len(),
            self.inputs.len(),
            self.buttons.len()
        )
    }
}

// Word groups for the CTA score. Action verbs are matched at word start
// ("try" hits "trying" but not "country").

const ACTION_VERBS: &[&str] = &[
    "try", "get", "start", "begin", "join", "sign", "register", "subscribe", "download", "claim",
    "access", "unlock", "discover", "explore", "learn", "see", "watch", "view", "find", "request",
    "book", "schedule", "contact", "connect", "create", "build", "launch", "activate", "enable",
    "grab", "secure", "reserve", "order", "buy", "shop", "add", "apply", "submit", "send",
];

const URGENCY_WORDS: &[&str] = &[
    "now", "today", "free", "instant", "immediate", "quick", "fast", "easy", "simple", "limited",
    "exclusive", "special", "bonus", "offer", "deal", "save", "discount", "new",
];

const TARGET_WORDS: &[&str] = &[
    "demo",
    "trial",
    "quote",
    "consultation",
    "guide",
    "ebook",
    "report",
    "newsletter",
    "updates",
    "access",
    "account",
    "membership",
    "started",
    "more",
    "info",
    "details",
];

const NEGATIVE_WORDS: &[&str] = &[
    "login", "log in", "signin", "sign in", "cart", "checkout", "forgot", "password", "reset",
    "logout", "log out",
];

/// Keywords whose presence in button text marks a likely submit button.
pub const SUBMIT_KEYWORDS: &[&str] = &[
    "submit",
    "sign up",
    "signup",
    "register",
    "subscribe",
    "join",
    "send",
    "continue",
    "next",
    "get started",
];

/// Score how strongly a button's text reads as a call-to-action.
///
/// Action verbs +2 each (word-prefix match), urgency words +1, target words
/// +1, negative words −3, CTA-ish class names +2, 1–6 words +1, more than 10
/// words −1.
#[must_use]
pub fn cta_score(text: &str, class_name: &str) -> i32 {
    let text_lower = text.to_lowercase();
    let class_lower = class_name.to_lowercase();
    let mut score = 0i32;

    for verb in ACTION_VERBS {
        if word_prefix_match(&text_lower, verb) {
            score += 2;
        }
    }
    for word in URGENCY_WORDS {
        if text_lower.contains(word) {
            score += 1;
        }
    }
    for word in TARGET_WORDS {
        if text_lower.contains(word) {
            score += 1;
        }
    }
    for word in NEGATIVE_WORDS {
        if text_lower.contains(word) {
            score -= 3;
        }
    }

    if class_lower.contains("cta")
        || class_lower.contains("action")
        || class_lower.contains("primary")
        || class_lower.contains("hero")
    {
        score += 2;
    }

    let word_count = text_lower.split_whitespace().count();
    if (1..=6).contains(&word_count) {
        score += 1;
    }
    if word_count > 10 {
        score -= 1;
    }

    score
}

/// Whether the text/class pair classifies as a CTA (score ≥ 2).
#[must_use]
pub fn is_cta(text: &str, class_name: &str) -> bool {
    cta_score(text, class_name) >= 2
}

// Word-boundary prefix match: `needle` must start a word in `haystack`.
fn word_prefix_match(haystack: &str, needle: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let abs = start + pos;
        let at_boundary = abs == 0
            || haystack[..abs]
                .chars()
                .next_back()
                .is_some_and(|c| !c.is_alphanumeric());
        if at_boundary {
            return true;
        }
        start = abs + needle.len();
        if start >= haystack.len() {
            break;
        }
    }
    false
}

/// Whether a button is a dial-code / flag dropdown rather than a real button.
///
/// Matches text containing `+`, purely 1–4 digit text, or anything shorter
/// than 2 characters.
#[must_use]
pub fn is_dial_code_button(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.contains('+') || trimmed.chars().count() < 2 {
        return true;
    }
    let digits_only = trimmed.chars().all(|c| c.is_ascii_digit());
    digits_only && (1..=4).contains(&trimmed.len())
}

/// Whether button text (or an explicit `type="submit"`) marks a submit.
#[must_use]
pub fn is_likely_submit(text: &str, type_attr: &str) -> bool {
    if type_attr.eq_ignore_ascii_case("submit") {
        return true;
    }
    let lower = text.to_lowercase();
    SUBMIT_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Build the deterministic selector for an element.
///
/// Elements with an id use `#id`; otherwise `[name='…']`; otherwise a
/// type/tag fallback.
#[must_use]
pub fn build_selector(id: &str, name: &str, tag: &str, type_attr: &str) -> String {
    if !id.is_empty() {
        return format!("#{id}");
    }
    if !name.is_empty() {
        return format!("[name='{name}']");
    }
    if !type_attr.is_empty() {
        return format!("{tag}[type='{type_attr}']");
    }
    tag.to_string()
}

/// Resolve a form's submit button selector.
///
/// Priority: (i) `input[type=submit]`; (ii) button with submit-keyword text
/// that is not a dial-code button; (iii) explicit `type="submit"` button;
/// (iv) the last non-dial-code button in the form.
#[must_use]
pub fn resolve_submit_selector(form: &FormDescriptor) -> Option<String> {
    // (i) submit inputs surface as kind == "submit" with tag input
    if let Some(btn) = form
        .submit_buttons
        .iter()
        .find(|b| b.kind == "submit" && b.selector.contains("input"))
    {
        return Some(btn.selector.clone());
    }

    // (ii) keyword-text button that is not a dial-code dropdown
    if let Some(btn) = form.submit_buttons.iter().find(|b| {
        !b.is_dial_code
            && SUBMIT_KEYWORDS
                .iter()
                .any(|kw| b.text.to_lowercase().contains(kw))
    }) {
        return Some(btn.selector.clone());
    }

    // (iii) explicit type=submit button
    if let Some(btn) = form.submit_buttons.iter().find(|b| b.kind == "submit") {
        return Some(btn.selector.clone());
    }

    // (iv) last non-dial-code button
    form.submit_buttons
        .iter()
        .rev()
        .find(|b| !b.is_dial_code)
        .map(|b| b.selector.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn button(text: &str, kind: &str, selector: &str) -> ButtonDescriptor {
        ButtonDescriptor {
            text: text.to_string(),
            selector: selector.to_string(),
            kind: kind.to_string(),
            is_cta: false,
            is_likely_submit: is_likely_submit(text, kind),
            is_dial_code: is_dial_code_button(text),
            form_id_ref: Some("form_0".to_string()),
        }
    }

    #[test]
    fn test_cta_scoring_positive() {
        assert!(is_cta("Get Started", ""));
        assert!(is_cta("Try Free Now", ""));
        assert!(is_cta("Request Demo", ""));
        // Class bonus alone is not enough without an action verb
        assert!(is_cta("Offer", "btn-cta"));
    }

    #[test]
    fn test_cta_scoring_negative() {
        assert!(!is_cta("Log In", ""));
        assert!(!is_cta("Forgot password?", ""));
        assert!(!is_cta("About us", ""));
    }

    #[test]
    fn test_cta_word_boundary() {
        // "country" must not match the verb "try"
        assert_eq!(cta_score("Country", ""), 1); // only the short-text bonus
        assert!(!is_cta("Country", ""));
    }

    #[test]
    fn test_dial_code_button_detection() {
        assert!(is_dial_code_button("+92"));
        assert!(is_dial_code_button("44"));
        assert!(is_dial_code_button("1"));
        assert!(is_dial_code_button(""));
        assert!(!is_dial_code_button("Subscribe"));
        assert!(!is_dial_code_button("12345"));
    }

    #[test]
    fn test_build_selector_priority() {
        assert_eq!(build_selector("email", "email", "input", "email"), "#email");
        assert_eq!(
            build_selector("", "phoneNumber", "input", "tel"),
            "[name='phoneNumber']"
        );
        assert_eq!(
            build_selector("", "", "input", "email"),
            "input[type='email']"
        );
        assert_eq!(build_selector("", "", "button", ""), "button");
    }

    #[test]
    fn test_resolve_submit_priority() {
        let mut form = FormDescriptor {
            id: "form_0".to_string(),
            selector: "form:nth-of-type(1)".to_string(),
            action: String::new(),
            method: "post".to_string(),
            inputs: Vec::new(),
            submit_buttons: vec![
                button("+1", "button", "form:nth-of-type(1) button.flag"),
                button("Subscribe", "button", "form:nth-of-type(1) button.sub"),
            ],
            submit_selector: None,
        };
        assert_eq!(
            resolve_submit_selector(&form).as_deref(),
            Some("form:nth-of-type(1) button.sub")
        );

        // input[type=submit] wins over keyword buttons
        form.submit_buttons.insert(
            0,
            button("Go", "submit", "form:nth-of-type(1) input[type='submit']"),
        );
        assert_eq!(
            resolve_submit_selector(&form).as_deref(),
            Some("form:nth-of-type(1) input[type='submit']")
        );
    }

    #[test]
    fn test_resolve_submit_last_button_fallback() {
        let form = FormDescriptor {
            id: "form_0".to_string(),
            selector: "form:nth-of-type(1)".to_string(),
            action: String::new(),
            method: "post".to_string(),
            inputs: Vec::new(),
            submit_buttons: vec![
                button("+44", "button", "form button.dial"),
                button("Okay", "button", "form button.ok"),
            ],
            submit_selector: None,
        };
        // "Okay" matches no keyword but is the last non-dial-code button
        assert_eq!(resolve_submit_selector(&form).as_deref(), Some("form button.ok"));
    }

    #[test]
    fn test_input_kind_mapping() {
        assert_eq!(InputKind::from_dom_type("EMAIL"), InputKind::Email);
        assert_eq!(InputKind::from_dom_type("search"), InputKind::Text);
        assert!(InputKind::Tel.is_fillable_text());
        assert!(InputKind::DivCheckbox.is_toggle());
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = PageSnapshot::empty("https://example.com");
        assert!(!snap.has_fillable_input());
        assert_eq!(snap.form_count, 0);
        assert_eq!(snap.captcha.kind, CaptchaKind::None);
    }
}
