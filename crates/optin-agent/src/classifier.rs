//! Page classification.
//!
//! A pure function from one [`PageSnapshot`] (plus navigation context) to a
//! page class. Only definitively unprocessable pages are rejected here;
//! payment indicators are informational and validated later by the agent,
//! because pricing mentions on free signup pages cause false skips.

use optin_core::{NavButton, PageSnapshot};

/// App store and app-download domains, always skipped.
pub const APP_STORE_DOMAINS: &[&str] = &[
    "play.google.com",
    "market.android.com",
    "apps.apple.com",
    "itunes.apple.com",
    "amazon.com/dp/",
    "amazon.com/gp/product/",
    "amazon.com/gp/mas/",
    "microsoft.com/store/apps",
    "microsoft.com/p/",
    "apps.microsoft.com",
    "galaxystore.samsung.com",
    "apps.samsung.com",
    "appgallery.huawei.com",
    "f-droid.org/packages/",
    "apkpure.com",
    "apkmirror.com",
    "aptoide.com",
];

/// Title fragments identifying app-store pages reached via redirects.
pub const APP_STORE_TITLE_PATTERNS: &[&str] = &[
    "on the app store",
    "on google play",
    "apps on google play",
    "get it on google play",
    "download on the app store",
    "android apps on google play",
    "- google play",
    "- app store",
    "microsoft store",
    "galaxy store",
];

/// How the navigation to this page went.
#[derive(Debug, Clone, Default)]
pub struct NavigationContext {
    /// Parsed load-failure reason when navigation failed
    pub load_error: Option<String>,
}

/// The classifier's verdict for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageClass {
    /// A signup form is present
    Signup {
        /// What convinced the classifier
        reason: String,
    },
    /// Login or account-registration page, skipped
    LoginOnly {
        /// What convinced the classifier
        reason: String,
    },
    /// Blog/article page with no signup form, skipped
    BlogArticle {
        /// What convinced the classifier
        reason: String,
    },
    /// No form and no promising buttons
    LandingNoForm,
    /// No form, but CTA buttons that may reveal one
    LandingWithNav {
        /// Buttons to try, in priority order
        buttons: Vec<NavButton>,
    },
    /// App store page
    AppStore {
        /// Matched domain or title pattern
        matched: String,
    },
    /// The page never loaded
    LoadError {
        /// Parsed failure reason
        reason: String,
    },
}

/// Classification plus the informational payment flags forwarded to the
/// agent loop.
#[derive(Debug, Clone)]
pub struct Classification {
    /// The page class
    pub class: PageClass,
    /// Payment iframes or CC inputs somewhere on the page
    pub has_payment_indicators: bool,
    /// Actual credit-card input fields present
    pub has_credit_card_fields: bool,
}

/// Match a URL against the app-store domain list.
#[must_use]
pub fn is_app_store_url(url: &str) -> Option<&'static str> {
    let lower = url.to_lowercase();
    APP_STORE_DOMAINS
        .iter()
        .find(|domain| lower.contains(*domain))
        .copied()
}

/// Match a document title against the app-store title patterns.
#[must_use]
pub fn is_app_store_title(title: &str) -> Option<&'static str> {
    let lower = title.to_lowercase();
    APP_STORE_TITLE_PATTERNS
        .iter()
        .find(|pattern| lower.contains(*pattern))
        .copied()
}

/// Classify one page snapshot.
#[must_use]
pub fn classify(snapshot: &PageSnapshot, nav: &NavigationContext) -> Classification {
    let signals = &snapshot.signals;
    let payment = Classification {
        class: PageClass::LandingNoForm,
        has_payment_indicators: signals.has_credit_card_input || signals.has_payment_iframe,
        has_credit_card_fields: signals.has_credit_card_input,
    };

    // 1. App store, by URL or title
    if let Some(matched) = is_app_store_url(&snapshot.url) {
        return Classification {
            class: PageClass::AppStore {
                matched: matched.to_string(),
            },
            ..payment
        };
    }
    if let Some(matched) = is_app_store_title(&snapshot.title) {
        return Classification {
            class: PageClass::AppStore {
                matched: matched.to_string(),
            },
            ..payment
        };
    }

    // 2. Load error
    if let Some(reason) = &nav.load_error {
        return Classification {
            class: PageClass::LoadError {
                reason: reason.clone(),
            },
            ..payment
        };
    }

    let login = &snapshot.login;
    let has_signup_indicators = login.has_signup_button
        || signals.has_signup_text
        || signals.has_terms_checkbox
        || signals.has_confirm_password_input
        || signals.has_newsletter_text;
    let has_login_indicators = login.has_login_button
        || login.has_forgot_password
        || login.has_remember_me
        || (signals.has_login_text && !signals.has_signup_text);
    let has_newsletter_form = (signals.has_newsletter_text && signals.has_email_input)
        || signals.has_footer_email_input;

    // 3. Account registration: a visible password with no confirm sibling is
    // login or account creation, not a newsletter
    if signals.has_password_input && !signals.has_confirm_password_input && signals.has_email_input
    {
        return Classification {
            class: PageClass::LoginOnly {
                reason: "Form requires password - account creation, not a newsletter".to_string(),
            },
            ..payment
        };
    }
    if signals.has_password_input && signals.has_social_login {
        return Classification {
            class: PageClass::LoginOnly {
                reason: "OAuth/social login affordances with password field".to_string(),
            },
            ..payment
        };
    }

    // 5. Signup positives (checked before blog so footer newsletters on
    // blogs still process)
    let signup_reason = if signals.has_email_input {
        if has_newsletter_form {
            Some("Found newsletter/subscription signup form".to_string())
        } else if has_signup_indicators && !login.has_forgot_password {
            Some("Found email input with signup indicators".to_string())
        } else if signals.has_name_input || signals.has_phone_input {
            Some("Found email with name/phone inputs".to_string())
        } else if signals.has_password_input && signals.has_confirm_password_input {
            Some("Found registration form with password confirmation".to_string())
        } else if snapshot.form_count > 0 {
            Some("Found email input within form structure".to_string())
        } else {
            None
        }
    } else {
        None
    };

    // 4. Blog/article, demoted when a signup form exists on the same page
    let is_blog = signals.has_article_structure
        || (signals.has_blog_title && !signals.has_email_input)
        || (signals.has_comment_section && !signals.has_email_input);

    if let Some(reason) = signup_reason {
        if is_blog {
            tracing::debug!("Blog page with a signup form - processing anyway");
        }
        return Classification {
            class: PageClass::Signup { reason },
            ..payment
        };
    }

    if is_blog {
        return Classification {
            class: PageClass::BlogArticle {
                reason: "Detected blog/article structure (no signup form found)".to_string(),
            },
            ..payment
        };
    }

    // Login-only page without any signup path
    if signals.has_email_input && signals.has_password_input && has_login_indicators
        && !has_signup_indicators
    {
        return Classification {
            class: PageClass::LoginOnly {
                reason: "Found login form (email + password + login indicators)".to_string(),
            },
            ..payment
        };
    }

    // 6. No form: navigation buttons may still lead to one
    if !signals.navigation_buttons.is_empty() {
        return Classification {
            class: PageClass::LandingWithNav {
                buttons: signals.navigation_buttons.clone(),
            },
            ..payment
        };
    }

    Classification {
        class: PageClass::LandingNoForm,
        ..payment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optin_core::PageSnapshot;

    fn snapshot() -> PageSnapshot {
        PageSnapshot::empty("https://acme.test/")
    }

    #[test]
    fn test_app_store_by_url() {
        let mut snap = snapshot();
        snap.url = "https://play.google.com/store/apps/details?id=com.x".to_string();
        let result = classify(&snap, &NavigationContext::default());
        assert!(matches!(result.class, PageClass::AppStore { .. }));
    }

    #[test]
    fn test_app_store_by_title() {
        let mut snap = snapshot();
        snap.title = "Acme - Apps on Google Play".to_string();
        let result = classify(&snap, &NavigationContext::default());
        assert!(matches!(result.class, PageClass::AppStore { .. }));
    }

    #[test]
    fn test_load_error() {
        let nav = NavigationContext {
            load_error: Some("Domain not found".to_string()),
        };
        let result = classify(&snapshot(), &nav);
        assert!(matches!(result.class, PageClass::LoadError { .. }));
    }

    #[test]
    fn test_newsletter_signup() {
        let mut snap = snapshot();
        snap.signals.has_email_input = true;
        snap.signals.has_newsletter_text = true;
        snap.form_count = 1;
        let result = classify(&snap, &NavigationContext::default());
        assert!(matches!(result.class, PageClass::Signup { .. }));
    }

    #[test]
    fn test_password_without_confirm_is_login_only() {
        let mut snap = snapshot();
        snap.signals.has_email_input = true;
        snap.signals.has_password_input = true;
        snap.signals.has_signup_text = true;
        let result = classify(&snap, &NavigationContext::default());
        assert!(matches!(result.class, PageClass::LoginOnly { .. }));
    }

    #[test]
    fn test_password_with_confirm_is_signup() {
        let mut snap = snapshot();
        snap.signals.has_email_input = true;
        snap.signals.has_password_input = true;
        snap.signals.has_confirm_password_input = true;
        let result = classify(&snap, &NavigationContext::default());
        assert!(matches!(result.class, PageClass::Signup { .. }));
    }

    #[test]
    fn test_blog_without_form() {
        let mut snap = snapshot();
        snap.signals.has_article_structure = true;
        let result = classify(&snap, &NavigationContext::default());
        assert!(matches!(result.class, PageClass::BlogArticle { .. }));
    }

    #[test]
    fn test_blog_with_newsletter_demoted_to_signup() {
        let mut snap = snapshot();
        snap.signals.has_article_structure = true;
        snap.signals.has_email_input = true;
        snap.signals.has_footer_email_input = true;
        let result = classify(&snap, &NavigationContext::default());
        assert!(matches!(result.class, PageClass::Signup { .. }));
    }

    #[test]
    fn test_landing_with_nav() {
        let mut snap = snapshot();
        snap.signals.navigation_buttons = vec![NavButton {
            text: "get started".into(),
            selector: "a.cta".into(),
        }];
        let result = classify(&snap, &NavigationContext::default());
        assert!(matches!(result.class, PageClass::LandingWithNav { .. }));
    }

    #[test]
    fn test_landing_no_form() {
        let result = classify(&snapshot(), &NavigationContext::default());
        assert!(matches!(result.class, PageClass::LandingNoForm));
    }

    #[test]
    fn test_payment_is_informational_not_a_skip() {
        let mut snap = snapshot();
        snap.signals.has_email_input = true;
        snap.signals.has_newsletter_text = true;
        snap.signals.has_credit_card_input = true;
        let result = classify(&snap, &NavigationContext::default());
        assert!(matches!(result.class, PageClass::Signup { .. }));
        assert!(result.has_payment_indicators);
        assert!(result.has_credit_card_fields);
    }
}
