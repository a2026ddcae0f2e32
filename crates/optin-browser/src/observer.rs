//! Page observation.
//!
//! Runs the observation script and post-processes its raw output into a
//! [`PageSnapshot`]: deterministic selectors, CTA scores, per-form submit
//! resolution and cross-references from inputs to their forms.
//!
//! Observation is best-effort: a page torn down mid-query yields an empty
//! snapshot rather than an error, because post-navigation loops recover.

use crate::error::Result;
use crate::page::PageDriver;
use crate::scripts;
use optin_core::snapshot::{
    build_selector, is_cta, is_dial_code_button, is_likely_submit, resolve_submit_selector,
    ButtonDescriptor, CaptchaInfo, CaptchaKind, FormDescriptor, InputDescriptor, InputKind,
    LoginIndicators, NavButton, OverlayInfo, PageSignals, PageSnapshot,
};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawObservation {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    visible_text: String,
    #[serde(default)]
    simplified_html: String,
    #[serde(default)]
    form_count: usize,
    #[serde(default)]
    forms: Vec<RawForm>,
    #[serde(default)]
    inputs: Vec<RawInput>,
    #[serde(default)]
    buttons: Vec<RawButton>,
    #[serde(default)]
    error_messages: Vec<String>,
    #[serde(default)]
    captcha: RawCaptcha,
    #[serde(default)]
    overlay: Option<RawOverlay>,
    #[serde(default)]
    login: RawLogin,
    #[serde(default)]
    signals: RawSignals,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawForm {
    index: usize,
    #[serde(default)]
    id: String,
    #[serde(default)]
    class_name: String,
    #[serde(default)]
    action: String,
    #[serde(default)]
    method: String,
    #[serde(default)]
    inputs: Vec<RawInput>,
    #[serde(default)]
    buttons: Vec<RawButton>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInput {
    #[serde(default)]
    r#type: String,
    #[serde(default)]
    tag: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    placeholder: String,
    #[serde(default)]
    aria_label: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    checked: bool,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    visible: bool,
    #[serde(default)]
    hidden_sr_only: bool,
    #[serde(default)]
    wrapped_in_label: bool,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    form_index: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawButton {
    #[serde(default)]
    text: String,
    #[serde(default)]
    r#type: String,
    #[serde(default)]
    tag: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    class_name: String,
    #[serde(default)]
    form_index: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCaptcha {
    #[serde(default)]
    found: bool,
    #[serde(default)]
    visible: bool,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    sitekey: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOverlay {
    #[serde(default)]
    present: bool,
    #[serde(default)]
    is_success_text: bool,
    #[serde(default)]
    is_recommendation: bool,
    #[serde(default)]
    has_iframe: bool,
    #[serde(default)]
    iframe_src: Option<String>,
    #[serde(default)]
    has_captcha_content: bool,
    #[serde(default)]
    has_error_text: bool,
    #[serde(default)]
    close_selector: Option<String>,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLogin {
    #[serde(default)]
    has_forgot_password: bool,
    #[serde(default)]
    has_remember_me: bool,
    #[serde(default)]
    has_login_button: bool,
    #[serde(default)]
    has_signup_button: bool,
    #[serde(default)]
    has_password_only: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSignals {
    #[serde(default)]
    has_email_input: bool,
    #[serde(default)]
    has_password_input: bool,
    #[serde(default)]
    has_confirm_password_input: bool,
    #[serde(default)]
    has_name_input: bool,
    #[serde(default)]
    has_phone_input: bool,
    #[serde(default)]
    has_newsletter_text: bool,
    #[serde(default)]
    has_footer_email_input: bool,
    #[serde(default)]
    has_signup_text: bool,
    #[serde(default)]
    has_login_text: bool,
    #[serde(default)]
    has_terms_checkbox: bool,
    #[serde(default)]
    has_article_structure: bool,
    #[serde(default)]
    has_comment_section: bool,
    #[serde(default)]
    has_blog_title: bool,
    #[serde(default)]
    has_credit_card_input: bool,
    #[serde(default)]
    has_payment_iframe: bool,
    #[serde(default)]
    has_social_login: bool,
    #[serde(default)]
    navigation_buttons: Vec<RawNavButton>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNavButton {
    #[serde(default)]
    text: String,
    #[serde(default)]
    selector: String,
}

fn stable_form_id(id: &str, index: usize) -> String {
    if id.is_empty() {
        format!("form_{index}")
    } else {
        id.to_string()
    }
}

fn form_selector(id: &str, class_name: &str, index: usize) -> String {
    if !id.is_empty() {
        return format!("#{id}");
    }
    if let Some(first_class) = class_name.split_whitespace().next() {
        return format!("form.{first_class}");
    }
    format!("form:nth-of-type({})", index + 1)
}

fn button_selector(raw: &RawButton) -> String {
    if !raw.id.is_empty() {
        return format!("#{}", raw.id);
    }
    if !raw.name.is_empty() {
        return format!("[name='{}']", raw.name);
    }
    let tag = if raw.tag.is_empty() { "button" } else { &raw.tag };
    if raw.r#type == "submit" && raw.tag == "input" {
        return "input[type='submit']".to_string();
    }
    if raw.text.chars().count() > 1 {
        let text: String = raw.text.chars().take(20).collect();
        return format!("{tag}:has-text('{text}')");
    }
    if let Some(first_class) = raw.class_name.split_whitespace().next() {
        return format!("{tag}.{first_class}");
    }
    tag.to_string()
}

fn convert_button(raw: &RawButton, form_ids: &[String]) -> ButtonDescriptor {
    ButtonDescriptor {
        text: raw.text.clone(),
        selector: button_selector(raw),
        kind: raw.r#type.clone(),
        is_cta: is_cta(&raw.text, &raw.class_name),
        is_likely_submit: is_likely_submit(&raw.text, &raw.r#type),
        is_dial_code: is_dial_code_button(&raw.text),
        form_id_ref: raw.form_index.and_then(|i| form_ids.get(i).cloned()),
    }
}

fn convert_input(raw: &RawInput, form_ids: &[String]) -> InputDescriptor {
    let tag = if raw.tag.is_empty() { "input" } else { &raw.tag };
    InputDescriptor {
        kind: InputKind::from_dom_type(&raw.r#type),
        selector: build_selector(&raw.id, &raw.name, tag, &raw.r#type),
        name: raw.name.clone(),
        id: raw.id.clone(),
        placeholder: raw.placeholder.clone(),
        label_text: raw.label.clone(),
        aria_label: raw.aria_label.clone(),
        is_visible: raw.visible,
        is_hidden_sr_only: raw.hidden_sr_only,
        wrapped_in_label: raw.wrapped_in_label,
        checked: raw.checked,
        required: raw.required,
        options: raw.options.clone(),
        form_id_ref: raw.form_index.and_then(|i| form_ids.get(i).cloned()),
        form_submit_selector_ref: None,
    }
}

fn captcha_kind(raw: &RawCaptcha) -> CaptchaKind {
    match raw.kind.as_deref() {
        Some("recaptcha_v2") => CaptchaKind::RecaptchaV2,
        Some("recaptcha_challenge") => CaptchaKind::RecaptchaChallenge,
        Some("hcaptcha") => CaptchaKind::Hcaptcha,
        Some("turnstile") => CaptchaKind::Turnstile,
        Some("error_text") => CaptchaKind::ErrorText,
        _ => CaptchaKind::None,
    }
}

/// Build a [`PageSnapshot`] from the observation script's raw value.
///
/// Unexpected shapes degrade to an empty snapshot; observation never fails
/// on DOM anomalies.
#[must_use]
pub fn build_snapshot(value: Value) -> PageSnapshot {
    let raw: RawObservation = match serde_json::from_value(value) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!("Observation payload did not deserialize: {e}");
            return PageSnapshot::empty("");
        }
    };

    // Stable form ids are positional for forms without an id attribute, so
    // build the full index-keyed table first.
    let max_index = raw.forms.iter().map(|f| f.index + 1).max().unwrap_or(0);
    let mut form_ids = vec![String::new(); max_index.max(raw.form_count)];
    for form in &raw.forms {
        if form.index < form_ids.len() {
            form_ids[form.index] = stable_form_id(&form.id, form.index);
        }
    }
    for (index, id) in form_ids.iter_mut().enumerate() {
        if id.is_empty() {
            *id = format!("form_{index}");
        }
    }

    let forms: Vec<FormDescriptor> = raw
        .forms
        .iter()
        .map(|form| {
            let submit_buttons: Vec<ButtonDescriptor> = form
                .buttons
                .iter()
                .map(|b| convert_button(b, &form_ids))
                .filter(|b| !b.is_dial_code)
                .collect();
            let mut descriptor = FormDescriptor {
                id: stable_form_id(&form.id, form.index),
                selector: form_selector(&form.id, &form.class_name, form.index),
                action: form.action.clone(),
                method: form.method.clone(),
                inputs: form
                    .inputs
                    .iter()
                    .map(|i| convert_input(i, &form_ids))
                    .collect(),
                submit_buttons,
                submit_selector: None,
            };
            descriptor.submit_selector = resolve_submit_selector(&descriptor);
            descriptor
        })
        .collect();

    let mut inputs: Vec<InputDescriptor> = raw
        .inputs
        .iter()
        .map(|i| convert_input(i, &form_ids))
        .collect();
    for input in &mut inputs {
        if let Some(form_id) = &input.form_id_ref {
            input.form_submit_selector_ref = forms
                .iter()
                .find(|f| &f.id == form_id)
                .and_then(|f| f.submit_selector.clone());
        }
    }

    let buttons: Vec<ButtonDescriptor> = raw
        .buttons
        .iter()
        .map(|b| convert_button(b, &form_ids))
        .collect();

    let captcha = CaptchaInfo {
        present: raw.captcha.found,
        visible: raw.captcha.visible,
        kind: captcha_kind(&raw.captcha),
        sitekey: raw.captcha.sitekey.clone(),
    };

    let overlay = raw.overlay.filter(|o| o.present).map(|o| OverlayInfo {
        present: o.present,
        is_success_text: o.is_success_text,
        is_recommendation: o.is_recommendation,
        has_iframe: o.has_iframe,
        iframe_src: o.iframe_src,
        has_captcha_content: o.has_captcha_content,
        has_error_text: o.has_error_text,
        close_selector: o.close_selector,
        text: o.text,
    });

    PageSnapshot {
        url: raw.url,
        title: raw.title,
        visible_text: raw.visible_text.to_lowercase(),
        forms,
        inputs,
        buttons,
        error_messages: raw.error_messages,
        captcha,
        overlay,
        simplified_html: raw.simplified_html,
        form_count: raw.form_count,
        login: LoginIndicators {
            has_forgot_password: raw.login.has_forgot_password,
            has_remember_me: raw.login.has_remember_me,
            has_login_button: raw.login.has_login_button,
            has_signup_button: raw.login.has_signup_button,
            has_password_only: raw.login.has_password_only,
        },
        signals: PageSignals {
            has_email_input: raw.signals.has_email_input,
            has_password_input: raw.signals.has_password_input,
            has_confirm_password_input: raw.signals.has_confirm_password_input,
            has_name_input: raw.signals.has_name_input,
            has_phone_input: raw.signals.has_phone_input,
            has_newsletter_text: raw.signals.has_newsletter_text,
            has_footer_email_input: raw.signals.has_footer_email_input,
            has_signup_text: raw.signals.has_signup_text,
            has_login_text: raw.signals.has_login_text,
            has_terms_checkbox: raw.signals.has_terms_checkbox,
            has_article_structure: raw.signals.has_article_structure,
            has_comment_section: raw.signals.has_comment_section,
            has_blog_title: raw.signals.has_blog_title,
            has_credit_card_input: raw.signals.has_credit_card_input,
            has_payment_iframe: raw.signals.has_payment_iframe,
            has_social_login: raw.signals.has_social_login,
            navigation_buttons: raw
                .signals
                .navigation_buttons
                .into_iter()
                .map(|b| NavButton {
                    text: b.text,
                    selector: b.selector,
                })
                .collect(),
        },
    }
}

/// Observe the current page.
///
/// A page torn down by navigation yields an empty snapshot; other driver
/// failures propagate.
///
/// # Errors
/// Returns error on evaluation failures other than page teardown.
pub async fn observe(driver: &dyn PageDriver) -> Result<PageSnapshot> {
    match driver.eval_json(crate::scripts::OBSERVE_PAGE).await {
        Ok(value) => Ok(build_snapshot(value)),
        Err(e) if e.is_page_gone() => {
            tracing::debug!("Page gone during observation (expected after submit): {e}");
            let url = driver.current_url().await.unwrap_or_default();
            Ok(PageSnapshot::empty(url))
        }
        Err(e) => Err(e),
    }
}

/// Detect the dial code pre-selected by the page's phone widget.
///
/// # Errors
/// Returns error if the detection script fails outright.
pub async fn detect_country_code(driver: &dyn PageDriver) -> Result<Option<String>> {
    match driver.eval_json(scripts::DETECT_COUNTRY).await {
        Ok(Value::String(code)) if !code.is_empty() => {
            tracing::debug!("Detected country code from page: +{code}");
            Ok(Some(code))
        }
        Ok(_) => Ok(None),
        Err(e) if e.is_page_gone() => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_observation() -> Value {
        json!({
            "title": "Acme Newsletter",
            "url": "https://acme.test/",
            "visibleText": "Sign Up For Our Newsletter",
            "simplifiedHtml": "<form><input type=\"email\" id=\"email\"><button>Subscribe</button></form>",
            "formCount": 1,
            "forms": [{
                "index": 0,
                "id": "",
                "className": "newsletter-form",
                "action": "/subscribe",
                "method": "post",
                "inputs": [{
                    "type": "email", "tag": "input", "name": "email", "id": "email",
                    "placeholder": "Your email", "className": "", "ariaLabel": "",
                    "label": "", "checked": false, "required": true, "visible": true,
                    "hiddenSrOnly": false, "wrappedInLabel": false, "options": [],
                    "formIndex": 0
                }],
                "buttons": [
                    {"text": "+1", "type": "button", "tag": "button", "id": "", "name": "",
                     "className": "flag-dropdown", "visible": true, "formIndex": 0},
                    {"text": "Subscribe", "type": "submit", "tag": "button", "id": "", "name": "",
                     "className": "", "visible": true, "formIndex": 0}
                ]
            }],
            "inputs": [{
                "type": "email", "tag": "input", "name": "email", "id": "email",
                "placeholder": "Your email", "className": "", "ariaLabel": "",
                "label": "", "checked": false, "required": true, "visible": true,
                "hiddenSrOnly": false, "wrappedInLabel": false, "options": [],
                "formIndex": 0
            }],
            "buttons": [
                {"text": "Subscribe", "type": "submit", "tag": "button", "id": "", "name": "",
                 "className": "", "visible": true, "formIndex": 0},
                {"text": "Get Started Now", "type": "link", "tag": "a", "id": "", "name": "",
                 "className": "btn-cta", "visible": true, "formIndex": null}
            ],
            "errorMessages": [],
            "captcha": {"found": false, "visible": false, "kind": null, "sitekey": null},
            "overlay": null,
            "login": {},
            "signals": {"hasEmailInput": true, "hasNewsletterText": true}
        })
    }

    #[test]
    fn test_build_snapshot_basic() {
        let snapshot = build_snapshot(sample_observation());
        assert_eq!(snapshot.url, "https://acme.test/");
        assert_eq!(snapshot.forms.len(), 1);
        assert_eq!(snapshot.form_count, 1);
        // Visible text is lowercased for matching
        assert!(snapshot.visible_text.contains("sign up for our newsletter"));
    }

    #[test]
    fn test_form_ref_and_submit_resolution() {
        let snapshot = build_snapshot(sample_observation());
        let form = &snapshot.forms[0];
        assert_eq!(form.id, "form_0");
        assert_eq!(form.selector, "form.newsletter-form");
        // The dial-code button is excluded; Subscribe wins
        assert_eq!(form.submit_buttons.len(), 1);
        assert_eq!(
            form.submit_selector.as_deref(),
            Some("button:has-text('Subscribe')")
        );

        let input = &snapshot.inputs[0];
        assert_eq!(input.selector, "#email");
        assert_eq!(input.form_id_ref.as_deref(), Some("form_0"));
        assert_eq!(
            input.form_submit_selector_ref.as_deref(),
            Some("button:has-text('Subscribe')")
        );
    }

    #[test]
    fn test_cta_marking() {
        let snapshot = build_snapshot(sample_observation());
        let cta = snapshot
            .buttons
            .iter()
            .find(|b| b.text == "Get Started Now")
            .expect("CTA button present");
        assert!(cta.is_cta);
        assert!(!cta.is_dial_code);
    }

    #[test]
    fn test_malformed_payload_degrades_to_empty() {
        let snapshot = build_snapshot(json!("not an object"));
        assert!(snapshot.forms.is_empty());
        assert!(snapshot.inputs.is_empty());
    }

    #[test]
    fn test_captcha_kind_mapping() {
        let mut value = sample_observation();
        value["captcha"] = json!({
            "found": true, "visible": true, "kind": "hcaptcha", "sitekey": "key-1"
        });
        let snapshot = build_snapshot(value);
        assert!(snapshot.captcha.present);
        assert!(snapshot.captcha.visible);
        assert_eq!(snapshot.captcha.kind, CaptchaKind::Hcaptcha);
        assert_eq!(snapshot.captcha.sitekey.as_deref(), Some("key-1"));
    }

    #[test]
    fn test_overlay_conversion() {
        let mut value = sample_observation();
        value["overlay"] = json!({
            "present": true, "isSuccessText": true, "isRecommendation": false,
            "hasIframe": false, "iframeSrc": null, "hasCaptchaContent": false,
            "hasErrorText": false, "closeSelector": "[data-formkit-close]",
            "text": "thank you for subscribing"
        });
        let snapshot = build_snapshot(value);
        let overlay = snapshot.overlay.expect("overlay present");
        assert!(overlay.is_success_text);
        assert_eq!(overlay.close_selector.as_deref(), Some("[data-formkit-close]"));
    }
}
