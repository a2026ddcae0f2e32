//! Overlay classification and dismissal.
//!
//! Overlays after a submit can be success popups, CAPTCHAs, error dialogs
//! or unrelated modals. Content decides: CAPTCHA and error overlays are
//! never success, success/recommendation text is, and anything else gets a
//! close attempt so the original click can be retried.

use optin_browser::{observer, PageDriver};
use optin_core::OverlayInfo;
use std::time::Duration;
use tokio::time::sleep;

/// Close-button selectors tried in priority order.
const CLOSE_SELECTORS: &[&str] = &[
    "[data-formkit-close]",
    ".formkit-close",
    "[aria-label*='Close']",
    "[aria-label*='close']",
];

/// What the overlay routine concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayOutcome {
    /// No overlay found
    None,
    /// The overlay announces a successful signup
    Success(String),
    /// The overlay contains a CAPTCHA
    NeedsCaptcha,
    /// The overlay shows error/validation text
    HasError(String),
    /// The overlay was closed (or escape was sent); retry the action
    Closed,
}

/// Classify an overlay's content. Pure; drives [`check_and_handle`].
#[must_use]
pub fn classify_overlay(overlay: &OverlayInfo, form_submitted: bool) -> OverlayOutcome {
    if !overlay.present {
        return OverlayOutcome::None;
    }
    if overlay.has_captcha_content {
        return OverlayOutcome::NeedsCaptcha;
    }
    if overlay.has_error_text {
        let snippet: String = overlay.text.chars().take(100).collect();
        return OverlayOutcome::HasError(snippet);
    }
    if overlay.is_success_text {
        let snippet: String = overlay.text.chars().take(100).collect();
        return OverlayOutcome::Success(format!("Success overlay: {snippet}"));
    }
    if overlay.is_recommendation && form_submitted {
        return OverlayOutcome::Success("Post-signup recommendation overlay".to_string());
    }
    // An iframe with no success text could be anything; it never implies
    // success on its own.
    OverlayOutcome::Closed
}

/// Observe the page, classify any overlay, and attempt to close the ones
/// that block without meaning anything.
pub async fn check_and_handle(driver: &dyn PageDriver, form_submitted: bool) -> OverlayOutcome {
    let snapshot = match observer::observe(driver).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::debug!("Overlay check observation failed: {e}");
            return OverlayOutcome::None;
        }
    };
    let Some(overlay) = &snapshot.overlay else {
        return OverlayOutcome::None;
    };

    match classify_overlay(overlay, form_submitted) {
        OverlayOutcome::Closed => {
            // Try the overlay's own close affordance, the known close
            // selectors, then escape.
            let mut candidates: Vec<String> = Vec::new();
            if let Some(own) = &overlay.close_selector {
                candidates.push(own.clone());
            }
            candidates.extend(CLOSE_SELECTORS.iter().map(|s| (*s).to_string()));

            for close_selector in candidates {
                if driver.click(&close_selector).await.is_ok() {
                    tracing::debug!("Closed overlay via {close_selector}");
                    sleep(Duration::from_millis(500)).await;
                    return OverlayOutcome::Closed;
                }
            }
            if driver.press_escape().await.is_ok() {
                sleep(Duration::from_millis(500)).await;
                return OverlayOutcome::Closed;
            }
            OverlayOutcome::None
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlay() -> OverlayInfo {
        OverlayInfo {
            present: true,
            is_success_text: false,
            is_recommendation: false,
            has_iframe: false,
            iframe_src: None,
            has_captcha_content: false,
            has_error_text: false,
            close_selector: None,
            text: String::new(),
        }
    }

    #[test]
    fn test_captcha_overlay_never_success() {
        let mut o = overlay();
        o.has_captcha_content = true;
        o.is_success_text = true; // even with success words, CAPTCHA wins
        assert_eq!(classify_overlay(&o, true), OverlayOutcome::NeedsCaptcha);
    }

    #[test]
    fn test_error_overlay() {
        let mut o = overlay();
        o.has_error_text = true;
        o.text = "something went wrong".to_string();
        assert!(matches!(
            classify_overlay(&o, true),
            OverlayOutcome::HasError(_)
        ));
    }

    #[test]
    fn test_success_text_overlay() {
        let mut o = overlay();
        o.is_success_text = true;
        o.text = "thank you for subscribing".to_string();
        assert!(matches!(
            classify_overlay(&o, false),
            OverlayOutcome::Success(_)
        ));
    }

    #[test]
    fn test_recommendation_needs_submission() {
        let mut o = overlay();
        o.is_recommendation = true;
        assert!(matches!(
            classify_overlay(&o, true),
            OverlayOutcome::Success(_)
        ));
        // Without a submit, a recommendation widget is just a modal
        assert_eq!(classify_overlay(&o, false), OverlayOutcome::Closed);
    }

    #[test]
    fn test_iframe_alone_is_not_success() {
        let mut o = overlay();
        o.has_iframe = true;
        o.iframe_src = Some("https://widget.example/".to_string());
        assert_eq!(classify_overlay(&o, true), OverlayOutcome::Closed);
    }

    #[test]
    fn test_absent_overlay() {
        let mut o = overlay();
        o.present = false;
        assert_eq!(classify_overlay(&o, true), OverlayOutcome::None);
    }
}
