//! In-page JavaScript, kept as named constants.
//!
//! Every script is a self-contained IIFE returning a JSON-compatible value.
//! Post-processing happens in Rust; the scripts only gather raw facts from
//! the live DOM.

/// Stealth patches installed once per page before any navigation.
pub const STEALTH_INIT: &str = r"
(() => {
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
    });
    Object.defineProperty(navigator, 'plugins', {
        get: () => [1, 2, 3, 4, 5],
    });
    Object.defineProperty(navigator, 'languages', {
        get: () => ['en-US', 'en'],
    });
    window.chrome = window.chrome || { runtime: {} };
    if (window.navigator.permissions && window.navigator.permissions.query) {
        const originalQuery = window.navigator.permissions.query.bind(window.navigator.permissions);
        window.navigator.permissions.query = (parameters) => (
            parameters && parameters.name === 'notifications'
                ? Promise.resolve({ state: Notification.permission })
                : originalQuery(parameters)
        );
    }
})();
";

/// The single observation query producing the raw page structure, error
/// messages, CAPTCHA/overlay state, login indicators and classifier signals.
pub const OBSERVE_PAGE: &str = r##"
(() => {
    const isVisible = (el) => {
        if (!el) return false;
        const style = window.getComputedStyle(el);
        return style.display !== 'none' &&
               style.visibility !== 'hidden' &&
               style.opacity !== '0' &&
               el.offsetParent !== null;
    };
    const isRendered = (el) => {
        if (!el) return false;
        const rect = el.getBoundingClientRect();
        const style = window.getComputedStyle(el);
        return rect.width > 0 && rect.height > 0 &&
               style.display !== 'none' &&
               style.visibility !== 'hidden' &&
               parseFloat(style.opacity) > 0;
    };

    const result = {
        title: document.title,
        url: window.location.href,
        visibleText: (document.body ? document.body.innerText : '').substring(0, 3000),
        simplifiedHtml: '',
        formCount: document.querySelectorAll('form').length,
        forms: [],
        inputs: [],
        buttons: [],
        errorMessages: [],
        captcha: { found: false, visible: false, kind: null, sitekey: null },
        overlay: null,
        login: {
            hasForgotPassword: false, hasRememberMe: false,
            hasLoginButton: false, hasSignupButton: false, hasPasswordOnly: false
        },
        signals: {
            hasEmailInput: false, hasPasswordInput: false, hasConfirmPasswordInput: false,
            hasNameInput: false, hasPhoneInput: false, hasNewsletterText: false,
            hasFooterEmailInput: false, hasSignupText: false, hasLoginText: false,
            hasTermsCheckbox: false, hasArticleStructure: false, hasCommentSection: false,
            hasBlogTitle: false, hasCreditCardInput: false, hasPaymentIframe: false,
            hasSocialLogin: false, navigationButtons: []
        }
    };

    // --- simplified HTML: visible forms with hidden traps removed ---
    const cleanHtml = document.createElement('div');
    document.querySelectorAll('form').forEach((form) => {
        if (isVisible(form)) {
            const clone = form.cloneNode(true);
            clone.querySelectorAll('script, style, noscript').forEach(el => el.remove());
            clone.querySelectorAll('[style*="display: none"], [style*="display:none"], [hidden], .hidden, .d-none, .sr-only, .visually-hidden').forEach(el => el.remove());
            cleanHtml.appendChild(clone);
        }
    });
    if (cleanHtml.children.length === 0) {
        const container = document.createElement('div');
        document.querySelectorAll('input:not([type="hidden"]), textarea, button').forEach(el => {
            if (isVisible(el)) container.appendChild(el.cloneNode(true));
        });
        cleanHtml.appendChild(container);
    }
    result.simplifiedHtml = cleanHtml.innerHTML.substring(0, 5000);

    // --- raw element records; selectors are built on the Rust side ---
    const allForms = Array.from(document.querySelectorAll('form'));

    const rawInput = (input, formIndex) => {
        const isSelect = input.tagName === 'SELECT';
        const type = isSelect ? 'select' : (input.type || 'text');
        let label = '';
        let wrapped = false;
        const parentLabel = input.closest('label');
        if (parentLabel) {
            wrapped = true;
            label = (parentLabel.textContent || '').trim();
        } else if (input.id) {
            const forLabel = document.querySelector('label[for="' + input.id + '"]');
            if (forLabel) label = (forLabel.textContent || '').trim();
        }
        const srOnly = (type === 'checkbox' || type === 'radio') &&
            (input.className.includes('sr-only') ||
             input.className.includes('visually-hidden') ||
             !isVisible(input));
        return {
            type: type,
            tag: input.tagName.toLowerCase(),
            name: input.name || '',
            id: input.id || '',
            placeholder: input.placeholder || '',
            className: String(input.className || ''),
            ariaLabel: input.getAttribute('aria-label') || '',
            label: label.substring(0, 120),
            checked: !!input.checked,
            required: !!input.required,
            visible: isVisible(input),
            hiddenSrOnly: srOnly,
            wrappedInLabel: wrapped,
            options: isSelect ? Array.from(input.options).map(o => o.value || o.text).slice(0, 30) : [],
            formIndex: formIndex
        };
    };

    const rawButton = (btn, formIndex) => ({
        text: ((btn.textContent || btn.value || '').trim()).substring(0, 60),
        type: btn.type || btn.tagName.toLowerCase(),
        tag: btn.tagName.toLowerCase(),
        id: btn.id || '',
        name: btn.name || '',
        className: String(btn.className || ''),
        visible: isVisible(btn),
        formIndex: formIndex
    });

    allForms.forEach((form, idx) => {
        if (!isVisible(form)) return;
        const formInfo = {
            index: idx,
            id: form.id || '',
            className: String(form.className || ''),
            action: form.action || '',
            method: form.method || '',
            inputs: [],
            buttons: []
        };
        form.querySelectorAll('input, textarea, select').forEach(input => {
            if (input.type !== 'hidden') formInfo.inputs.push(rawInput(input, idx));
        });
        form.querySelectorAll('button, input[type="submit"], [role="button"]').forEach(btn => {
            formInfo.buttons.push(rawButton(btn, idx));
        });
        result.forms.push(formInfo);
    });

    // Inputs anywhere, including outside forms. Invisible checkboxes/radios
    // survive when a visible label wraps them.
    document.querySelectorAll('input:not([type="hidden"]), textarea, select').forEach(input => {
        const parentLabel = input.closest('label');
        const visibleEnough = isVisible(input) || (parentLabel && isVisible(parentLabel));
        if (!visibleEnough) return;
        const parentForm = input.closest('form');
        const formIndex = parentForm ? allForms.indexOf(parentForm) : null;
        result.inputs.push(rawInput(input, formIndex));
    });

    // Div/span elements acting as checkboxes
    document.querySelectorAll('div[role="checkbox"], div[role="option"], div[class*="option"], div[class*="choice"], label[class*="option"], label[class*="choice"]').forEach(el => {
        if (!isVisible(el)) return;
        result.inputs.push({
            type: 'div-checkbox',
            tag: el.tagName.toLowerCase(),
            name: el.getAttribute('name') || '',
            id: el.id || '',
            placeholder: '',
            className: String(el.className || ''),
            ariaLabel: el.getAttribute('aria-label') || '',
            label: ((el.textContent || '').trim()).substring(0, 120),
            checked: el.getAttribute('aria-checked') === 'true' ||
                     el.classList.contains('checked') || el.classList.contains('selected'),
            required: false,
            visible: true,
            hiddenSrOnly: false,
            wrappedInLabel: false,
            options: [],
            formIndex: null
        });
    });

    // Clickables, including div/span/link buttons
    const clickableSelector = [
        'button', 'input[type="submit"]', 'input[type="button"]',
        'a[role="button"]', 'a[href="#"]', 'div[role="button"]', 'div.btn',
        'div[class*="btn"]', 'div[class*="submit"]', 'a[class*="btn"]',
        'a[class*="button"]', 'a[class*="cta"]', 'a[class*="action"]',
        'span[class*="btn"]', 'span[role="button"]'
    ].join(',');
    document.querySelectorAll(clickableSelector).forEach(btn => {
        const visibleOrSubmit = isVisible(btn) || (btn.tagName === 'INPUT' && btn.type === 'submit');
        if (!visibleOrSubmit) return;
        const parentForm = btn.closest('form');
        result.buttons.push(rawButton(btn, parentForm ? allForms.indexOf(parentForm) : null));
    });
    document.querySelectorAll('a').forEach(link => {
        if (!isVisible(link)) return;
        const text = (link.textContent || '').trim();
        if (text.length <= 2 || text.length >= 50) return;
        if (result.buttons.some(b => b.text === text.substring(0, 60))) return;
        result.buttons.push(rawButton(link, null));
    });

    // --- validation error messages ---
    ['.error', '.error-message', '.field-error', '.validation-error',
     '[class*="error"]', '[class*="invalid"]', '[role="alert"]',
     '.text-danger', '.invalid-feedback'].forEach(sel => {
        try {
            document.querySelectorAll(sel).forEach(el => {
                if (result.errorMessages.length >= 5) return;
                const text = (el.textContent || '').trim();
                if (el.offsetParent !== null && text) {
                    const snippet = text.substring(0, 100);
                    if (!result.errorMessages.includes(snippet)) result.errorMessages.push(snippet);
                }
            });
        } catch (e) {}
    });
    result.errorMessages = result.errorMessages.slice(0, 5);

    // --- CAPTCHA presence; only rendered widgets count as visible ---
    const captcha = result.captcha;
    const sitekeyOf = () => {
        const el = document.querySelector('[data-sitekey]');
        return el ? el.getAttribute('data-sitekey') : null;
    };
    const anchor = document.querySelector('iframe[src*="recaptcha"][src*="anchor"]');
    const gRecaptcha = document.querySelector('.g-recaptcha');
    const hFrame = document.querySelector('iframe[src*="hcaptcha"]');
    const tFrame = document.querySelector('iframe[src*="challenges.cloudflare"]');
    const bFrame = document.querySelector('iframe[src*="recaptcha"][src*="bframe"]');
    if (anchor) {
        captcha.found = true;
        captcha.kind = 'recaptcha_v2';
        captcha.visible = isRendered(anchor);
        captcha.sitekey = sitekeyOf();
    }
    if (!captcha.found && gRecaptcha) {
        const iframe = gRecaptcha.querySelector('iframe');
        captcha.found = true;
        captcha.kind = 'recaptcha_v2';
        captcha.visible = isRendered(gRecaptcha) && iframe !== null && isRendered(iframe);
        captcha.sitekey = gRecaptcha.getAttribute('data-sitekey') || sitekeyOf();
    }
    if (!captcha.found && hFrame) {
        captcha.found = true;
        captcha.kind = 'hcaptcha';
        captcha.visible = isRendered(hFrame);
        captcha.sitekey = sitekeyOf();
    }
    if (!captcha.found && tFrame) {
        captcha.found = true;
        captcha.kind = 'turnstile';
        captcha.visible = isRendered(tFrame);
    }
    if (bFrame && isRendered(bFrame)) {
        captcha.found = true;
        captcha.kind = 'recaptcha_challenge';
        captcha.visible = true;
    }
    const lowerText = result.visibleText.toLowerCase();
    if (!captcha.found && (lowerText.includes('please fill captcha') ||
        lowerText.includes('please complete the captcha') ||
        lowerText.includes('captcha verification required'))) {
        captcha.found = true;
        captcha.kind = 'error_text';
        captcha.visible = true;
    }

    // --- overlay/modal state ---
    const overlaySelectors = [
        '[data-active="true"][class*="overlay"]', '[data-active="true"][class*="modal"]',
        '.formkit-overlay[data-active="true"]', '.seva-overlay[data-active="true"]',
        '[class*="modal"][class*="active"]', '[class*="popup"][class*="show"]',
        '[class*="overlay"][class*="visible"]', '[role="dialog"][aria-hidden="false"]',
        '[role="dialog"]:not([aria-hidden="true"])', '.modal.show', '.modal.in',
        '[data-state="open"]'
    ];
    for (const sel of overlaySelectors) {
        let overlay = null;
        try { overlay = document.querySelector(sel); } catch (e) { continue; }
        if (!overlay || overlay.offsetParent === null || !isRendered(overlay)) continue;

        const text = (overlay.innerText || '').toLowerCase();
        const html = (overlay.innerHTML || '').toLowerCase();
        const iframe = overlay.querySelector('iframe');
        const iframeSrc = iframe ? (iframe.src || '') : '';
        const iframeSrcLower = iframeSrc.toLowerCase();

        const captchaWords = ['captcha', 'recaptcha', 'hcaptcha', 'turnstile',
            'verify you are human', 'robot', 'security check', 'challenge',
            'i am not a robot'];
        const hasCaptchaContent = captchaWords.some(w => text.includes(w) || html.includes(w)) ||
            iframeSrcLower.includes('recaptcha') || iframeSrcLower.includes('hcaptcha') ||
            iframeSrcLower.includes('challenges.cloudflare');

        const errorWords = ['error', 'failed', 'invalid', 'incorrect',
            'please try again', 'something went wrong', 'required field',
            'please fill', 'please enter'];
        const successWords = ['thank you', 'thanks for', 'success', 'confirmed',
            'subscribed', 'welcome', 'check your email', 'check your inbox',
            'verification email sent', 'you are in', 'congratulations',
            'successfully registered', 'successfully subscribed'];
        const recommendationWords = ['recommendation', 'suggest', 'you might also like',
            'other newsletters', 'similar', 'discover more'];

        let closeSelector = null;
        for (const cs of ['[data-formkit-close]', '.formkit-close', '[aria-label*="Close"]',
                          '[aria-label*="close"]', '[class*="close"]']) {
            try {
                const btn = overlay.querySelector(cs);
                if (btn) { closeSelector = cs; break; }
            } catch (e) {}
        }

        result.overlay = {
            present: true,
            isSuccessText: successWords.some(w => text.includes(w)),
            isRecommendation: recommendationWords.some(w => text.includes(w) || iframeSrcLower.includes(w)),
            hasIframe: iframe !== null,
            iframeSrc: iframeSrc || null,
            hasCaptchaContent: hasCaptchaContent,
            hasErrorText: errorWords.some(w => text.includes(w)),
            closeSelector: closeSelector,
            text: text.substring(0, 500)
        };
        break;
    }

    // --- login indicators ---
    const login = result.login;
    login.hasForgotPassword = lowerText.includes('forgot password') ||
        lowerText.includes('reset password') || lowerText.includes('forgot your password');
    document.querySelectorAll('input[type="checkbox"]').forEach(cb => {
        const label = ((cb.closest('label') || {}).textContent || '').toLowerCase();
        const id = (cb.id || '').toLowerCase();
        if (label.includes('remember') || id.includes('remember')) login.hasRememberMe = true;
        if (label.includes('terms') || label.includes('privacy') || label.includes('agree')) {
            result.signals.hasTermsCheckbox = true;
        }
    });
    document.querySelectorAll('button, input[type="submit"], a[role="button"]').forEach(btn => {
        const text = ((btn.textContent || btn.value || '')).toLowerCase().trim();
        if (/^(sign in|log in|login)$/.test(text)) login.hasLoginButton = true;
        if (/^(sign up|signup|register|create account|join|subscribe)$/.test(text)) {
            login.hasSignupButton = true;
        }
    });

    // --- classifier signals ---
    const signals = result.signals;
    let hasEmail = false, hasPassword = false, hasName = false, hasPhone = false;
    document.querySelectorAll('input').forEach(input => {
        const type = (input.type || '').toLowerCase();
        const combined = ((input.name || '') + (input.id || '') + (input.placeholder || '')).toLowerCase();
        if (type === 'email' || combined.includes('email')) hasEmail = true;
        if (type === 'password') {
            hasPassword = true;
            if (combined.includes('confirm') || combined.includes('repeat') || combined.includes('retype')) {
                signals.hasConfirmPasswordInput = true;
            }
        }
        if (combined.includes('name') && !combined.includes('username')) hasName = true;
        if (type === 'tel' || combined.includes('phone') || combined.includes('mobile')) hasPhone = true;
    });
    signals.hasEmailInput = hasEmail;
    signals.hasPasswordInput = hasPassword;
    signals.hasNameInput = hasName;
    signals.hasPhoneInput = hasPhone;
    login.hasPasswordOnly = hasEmail && hasPassword && !hasName && !hasPhone;

    const newsletterWords = ['newsletter', 'subscribe', 'subscription', 'email list',
        'mailing list', 'stay updated', 'stay informed', 'get updates',
        'receive updates', 'sign up to receive', 'sign up for our', 'join our',
        'enter your email'];
    signals.hasNewsletterText = newsletterWords.some(w => lowerText.includes(w));
    signals.hasFooterEmailInput =
        document.querySelectorAll('footer input[type="email"], [class*="footer"] input[type="email"], [class*="bottom"] input[type="email"], [class*="subscribe"] input[type="email"], [class*="newsletter"] input[type="email"]').length > 0 ||
        document.querySelectorAll('footer form, [class*="footer"] form').length > 0;

    const signupWords = ['sign up', 'signup', 'register', 'create account', 'get started',
        'join now', 'join free', 'start free', 'subscribe', 'get access'];
    const loginWords = ['sign in', 'log in', 'login', 'already have an account', 'existing user'];
    signals.hasSignupText = signupWords.some(w => lowerText.includes(w)) || signals.hasNewsletterText;
    signals.hasLoginText = loginWords.some(w => lowerText.includes(w));

    const blogIndicators = [
        document.querySelector('article') !== null,
        document.querySelector('.blog-post, .post-content, .article-content, .entry-content') !== null,
        document.querySelector('.author, .byline, .post-author') !== null,
        document.querySelector('.comment, .comments, #comments, .disqus') !== null,
        document.querySelector('time[datetime], .post-date, .publish-date') !== null,
        lowerText.includes('read more') && lowerText.includes('comments'),
        document.querySelectorAll('article').length > 1
    ];
    signals.hasArticleStructure = blogIndicators.filter(Boolean).length >= 2;
    signals.hasCommentSection = document.querySelector('.comment, .comments, #comments') !== null;
    const blogTitleWords = ['blog', 'article', 'news', 'post', 'read time', 'min read'];
    signals.hasBlogTitle = blogTitleWords.some(w => document.title.toLowerCase().includes(w));

    const paymentInputs = ['input[name*="card"]', 'input[name*="credit"]', 'input[name*="cvv"]',
        'input[name*="cvc"]', 'input[name*="expir"]', 'input[autocomplete="cc-number"]',
        'input[autocomplete="cc-exp"]', 'input[autocomplete="cc-csc"]',
        '[class*="card-number"]', '[class*="credit-card"]'];
    signals.hasCreditCardInput = paymentInputs.some(sel => {
        try { return document.querySelector(sel) !== null; } catch (e) { return false; }
    });
    signals.hasPaymentIframe = ['iframe[src*="stripe"]', 'iframe[src*="braintree"]', 'iframe[src*="paypal"]']
        .some(sel => { try { return document.querySelector(sel) !== null; } catch (e) { return false; } });

    signals.hasSocialLogin = document.querySelector(
        'button[data-provider], [class*="oauth"], [class*="social-login"], a[href*="oauth"], a[href*="auth/google"], a[href*="auth/facebook"]'
    ) !== null ||
        Array.from(document.querySelectorAll('button, a')).some(el => {
            const t = (el.innerText || '').toLowerCase();
            return t.includes('continue with google') || t.includes('continue with facebook') ||
                   t.includes('sign in with google') || t.includes('sign up with google') ||
                   t.includes('sign in with apple');
        });

    const navWords = ['get started', 'start now', 'try free', 'get access', 'claim',
        'download', 'next', 'continue', 'proceed'];
    document.querySelectorAll('button, input[type="submit"], a[role="button"], a.btn, a.button').forEach(btn => {
        if (signals.navigationButtons.length >= 10) return;
        const text = ((btn.textContent || btn.value || '')).toLowerCase().trim();
        if (!navWords.some(w => text.includes(w))) return;
        let selector = '';
        if (btn.id) selector = '#' + btn.id;
        else if (btn.className) {
            const firstClass = String(btn.className).split(' ')[0];
            if (firstClass) selector = btn.tagName.toLowerCase() + '.' + firstClass;
        }
        if (!selector) selector = btn.tagName.toLowerCase() + ':has-text("' + text.substring(0, 20) + '")';
        signals.navigationButtons.push({ text: text.substring(0, 50), selector: selector });
    });

    return result;
})()
"##;

/// Detect the dial code currently selected by the page's phone widget.
/// Returns the bare code string (e.g. "92") or null.
pub const DETECT_COUNTRY: &str = r##"
(() => {
    const countryToDialCode = {
        'united states': '1', 'usa': '1', 'us': '1', 'america': '1', 'canada': '1', 'ca': '1',
        'united kingdom': '44', 'uk': '44', 'gb': '44', 'great britain': '44', 'england': '44',
        'pakistan': '92', 'pk': '92', 'india': '91', 'in': '91', 'australia': '61', 'au': '61',
        'germany': '49', 'de': '49', 'deutschland': '49', 'france': '33', 'fr': '33',
        'italy': '39', 'it': '39', 'spain': '34', 'es': '34', 'brazil': '55', 'br': '55',
        'mexico': '52', 'mx': '52', 'china': '86', 'cn': '86', 'japan': '81', 'jp': '81',
        'south korea': '82', 'korea': '82', 'kr': '82', 'russia': '7', 'ru': '7',
        'uae': '971', 'united arab emirates': '971', 'ae': '971', 'saudi arabia': '966', 'sa': '966',
        'singapore': '65', 'sg': '65', 'hong kong': '852', 'hk': '852',
        'indonesia': '62', 'id': '62', 'malaysia': '60', 'my': '60',
        'philippines': '63', 'ph': '63', 'thailand': '66', 'th': '66', 'vietnam': '84', 'vn': '84',
        'netherlands': '31', 'nl': '31', 'holland': '31', 'belgium': '32', 'be': '32',
        'switzerland': '41', 'ch': '41', 'austria': '43', 'at': '43', 'poland': '48', 'pl': '48',
        'sweden': '46', 'se': '46', 'norway': '47', 'no': '47', 'denmark': '45', 'dk': '45',
        'finland': '358', 'fi': '358', 'ireland': '353', 'ie': '353', 'portugal': '351', 'pt': '351',
        'greece': '30', 'gr': '30', 'turkey': '90', 'tr': '90', 'egypt': '20', 'eg': '20',
        'south africa': '27', 'za': '27', 'nigeria': '234', 'ng': '234', 'kenya': '254', 'ke': '254',
        'israel': '972', 'il': '972', 'new zealand': '64', 'nz': '64', 'argentina': '54', 'ar': '54',
        'chile': '56', 'cl': '56', 'colombia': '57', 'co': '57', 'peru': '51', 'pe': '51',
        'venezuela': '58', 've': '58', 'bangladesh': '880', 'bd': '880',
        'sri lanka': '94', 'lk': '94', 'nepal': '977', 'np': '977'
    };
    const flagToDialCode = {
        '🇺🇸': '1', '🇨🇦': '1', '🇬🇧': '44', '🇵🇰': '92', '🇮🇳': '91', '🇦🇺': '61',
        '🇩🇪': '49', '🇫🇷': '33', '🇮🇹': '39', '🇪🇸': '34', '🇧🇷': '55', '🇲🇽': '52',
        '🇨🇳': '86', '🇯🇵': '81', '🇰🇷': '82', '🇷🇺': '7', '🇦🇪': '971', '🇸🇦': '966',
        '🇸🇬': '65', '🇭🇰': '852', '🇮🇩': '62', '🇲🇾': '60', '🇵🇭': '63', '🇹🇭': '66',
        '🇻🇳': '84', '🇳🇱': '31', '🇧🇪': '32', '🇨🇭': '41', '🇦🇹': '43', '🇵🇱': '48',
        '🇸🇪': '46', '🇳🇴': '47', '🇩🇰': '45', '🇫🇮': '358', '🇮🇪': '353', '🇵🇹': '351',
        '🇬🇷': '30', '🇹🇷': '90', '🇪🇬': '20', '🇿🇦': '27', '🇳🇬': '234', '🇰🇪': '254',
        '🇮🇱': '972', '🇳🇿': '64', '🇦🇷': '54', '🇨🇱': '56', '🇨🇴': '57', '🇵🇪': '51',
        '🇻🇪': '58', '🇧🇩': '880', '🇱🇰': '94', '🇳🇵': '977'
    };
    const knownCodes = new Set(Object.values(countryToDialCode).concat(
        ['36','40','53','65','93','95','98','212','216','218','230','233','255','256',
         '260','263','350','352','354','355','356','357','359','370','371','372','373',
         '374','375','376','380','381','385','386','420','421','501','502','503','504',
         '505','506','507','591','593','595','598','673','675','679','852','853','855',
         '856','886','960','961','962','963','964','965','967','968','970','973','974',
         '975','976','992','993','994','995','996','998']));

    const extractDialCode = (text) => {
        if (!text) return null;
        text = String(text).toLowerCase().trim();
        const dialMatch = text.match(/\+?(\d{1,4})/);
        if (dialMatch && knownCodes.has(dialMatch[1])) return dialMatch[1];
        for (const [flag, code] of Object.entries(flagToDialCode)) {
            if (text.includes(flag)) return code;
        }
        for (const [country, code] of Object.entries(countryToDialCode)) {
            if (text.includes(country)) return code;
        }
        return null;
    };

    const selectors = [
        '.react-tel-input .selected-flag', '.intl-tel-input .selected-flag',
        '.intl-tel-input .iti__selected-flag', '.vue-tel-input .selected-flag',
        '.iti__flag-container .iti__selected-flag', '.flag-dropdown .selected-flag',
        '.phone-input .flag', '.country-code', '.dial-code', '.phone-code',
        '[class*="countryCode"]', '[class*="country-code"]', '[class*="dialCode"]',
        '[class*="dial-code"]', '[class*="selectedCountry"]', '[class*="selected-country"]',
        '[data-dial-code]', '[data-country-code]', '[data-country]',
        '.flag', '[class*="flag"]', '.selected-flag', '[class*="selected-flag"]',
        'select[name*="country"] option:checked', 'select[class*="country"] option:checked',
        'select[name*="code"] option:checked', 'span[class*="code"]', 'div[class*="code"]'
    ];

    for (const selector of selectors) {
        let elements = [];
        try { elements = document.querySelectorAll(selector); } catch (e) { continue; }
        for (const el of elements) {
            const dataDial = el.getAttribute('data-dial-code');
            if (dataDial) return dataDial.replace('+', '');
            const dataCountry = el.getAttribute('data-country-code');
            if (dataCountry && countryToDialCode[dataCountry.toLowerCase()]) {
                return countryToDialCode[dataCountry.toLowerCase()];
            }
            const titleCode = extractDialCode(el.getAttribute('title') || el.getAttribute('aria-label') || '');
            if (titleCode) return titleCode;
            const textCode = extractDialCode(el.textContent);
            if (textCode) return textCode;
            const img = el.querySelector('img');
            if (img) {
                const altCode = extractDialCode(img.getAttribute('alt') || '') ||
                    extractDialCode(img.getAttribute('title') || '');
                if (altCode) return altCode;
                const src = img.getAttribute('src') || '';
                const srcMatch = src.match(/\/([a-z]{2})(?:\.png|\.svg|\.jpg|\.gif|$)/i);
                if (srcMatch && countryToDialCode[srcMatch[1].toLowerCase()]) {
                    return countryToDialCode[srcMatch[1].toLowerCase()];
                }
            }
        }
    }

    // Walk up from phone inputs looking for flag/country context
    const phoneInputs = document.querySelectorAll('input[type="tel"], input[name*="phone"], input[class*="phone"]');
    for (const input of phoneInputs) {
        let parent = input.parentElement;
        for (let i = 0; i < 4 && parent; i++) {
            const flagEl = parent.querySelector('.flag, [class*="flag"], [class*="country"]');
            if (flagEl) {
                const code = extractDialCode(flagEl.getAttribute('title') || flagEl.getAttribute('aria-label') || '') ||
                    extractDialCode(flagEl.textContent);
                if (code) return code;
            }
            const parentCode = extractDialCode((parent.textContent || '').substring(0, 100));
            if (parentCode) return parentCode;
            parent = parent.parentElement;
        }
    }

    // Last resort: any +NN token inside a form
    for (const form of document.querySelectorAll('form')) {
        const matches = (form.textContent || '').match(/\+(\d{1,4})/g);
        if (matches && matches.length > 0) return matches[0].replace('+', '');
    }

    return null;
})()
"##;

/// Content-based unwanted-page probe (cart/checkout/product/login/account
/// registration). URL and title checks happen on the Rust side.
pub const UNWANTED_CONTENT_CHECK: &str = r#"
(() => {
    const title = document.title.toLowerCase();
    const h1s = Array.from(document.querySelectorAll('h1')).map(h => (h.innerText || '').toLowerCase());

    if (title.includes('shopping cart') || title.includes('your cart') || title.includes('checkout')) {
        return { isUnwanted: true, reason: 'Cart/Checkout title detected' };
    }
    if (h1s.some(h => h.includes('shopping cart') || h.includes('your cart') || h.includes('checkout') || h.includes('your bag'))) {
        return { isUnwanted: true, reason: 'Cart/Checkout heading detected' };
    }

    const hasQuantity = document.querySelector('input[name="quantity"], select[name="quantity"], .quantity-selector') !== null;
    const hasAddToCart = Array.from(document.querySelectorAll('button, input[type="submit"], a.btn, button.btn')).some(b => {
        const t = ((b.innerText || b.value || '')).toLowerCase();
        return t.includes('add to cart') || t.includes('add to bag') || t.includes('proceed to checkout');
    });
    if (hasQuantity && hasAddToCart) {
        return { isUnwanted: true, reason: 'Product page detected (Quantity + Add to Cart)' };
    }
    if (window.location.href.includes('/products/') && hasAddToCart) {
        return { isUnwanted: true, reason: 'Product page with Add to Cart detected' };
    }

    if ((title.includes('login') || title.includes('sign in')) && !title.includes('sign up') && !title.includes('register')) {
        const hasLoginBtn = Array.from(document.querySelectorAll('button')).some(b => {
            const t = (b.innerText || '').toLowerCase();
            return t.includes('log in') || t.includes('sign in');
        });
        if (hasLoginBtn) return { isUnwanted: true, reason: 'Login page detected' };
    }

    // Account registration: a visible password field plus account-creation
    // affordances means this is not a simple newsletter form.
    const passwordInputs = document.querySelectorAll('input[type="password"]');
    if (passwordInputs.length > 0) {
        const hasVisiblePassword = Array.from(passwordInputs).some(inp => {
            const style = window.getComputedStyle(inp);
            const rect = inp.getBoundingClientRect();
            return style.display !== 'none' && style.visibility !== 'hidden' &&
                   parseFloat(style.opacity) > 0 && rect.width > 0 && rect.height > 0;
        });
        if (hasVisiblePassword) {
            const accountBtns = Array.from(document.querySelectorAll('button, input[type="submit"]')).filter(b => {
                const t = ((b.innerText || b.value || '')).toLowerCase();
                return t.includes('create account') || t.includes('sign up') || t.includes('register') ||
                       t.includes('get started') || t.includes('create your account') || t.includes('join now');
            });
            const hasSocialLogin = document.querySelector(
                'button[data-provider], [class*="oauth"], [class*="social-login"], a[href*="oauth"], a[href*="auth/google"], a[href*="auth/facebook"]'
            ) !== null;
            const hasSocialText = Array.from(document.querySelectorAll('button, a')).some(el => {
                const t = (el.innerText || '').toLowerCase();
                return t.includes('continue with google') || t.includes('continue with facebook') ||
                       t.includes('sign in with google') || t.includes('sign up with google') ||
                       t.includes('sign in with apple');
            });
            if (accountBtns.length > 0 || hasSocialLogin || hasSocialText) {
                return { isUnwanted: true, reason: 'Account registration form detected (password + create account button)' };
            }
            if (document.querySelector('input[type="email"], input[name*="email"]') !== null) {
                return { isUnwanted: true, reason: 'Login/Registration form detected (email + password fields)' };
            }
        }
    }

    return { isUnwanted: false, reason: '' };
})()
"#;

/// Resolve the ancestor form of an element and its submit button, re-run at
/// fill time because the DOM may have mutated since observation.
/// `__SELECTOR__` is substituted with the JSON-encoded element selector.
pub const ACTIVE_FORM_CONTEXT: &str = r#"
(() => {
    const el = document.querySelector(__SELECTOR__);
    if (!el) return null;
    const form = el.closest('form');
    if (!form) return null;

    const allForms = Array.from(document.querySelectorAll('form'));
    const formIdx = allForms.indexOf(form);
    let formSelector = '';
    if (form.id) formSelector = '#' + form.id;
    else if (form.className) {
        const firstClass = String(form.className).split(' ')[0];
        if (firstClass) formSelector = 'form.' + firstClass;
    }
    if (!formSelector) formSelector = 'form:nth-of-type(' + (formIdx + 1) + ')';

    const isDialCode = (t) => t.includes('+') || /^\+?\d{1,4}$/.test(t) || t.length < 2;
    const submitPatterns = ['submit', 'sign up', 'signup', 'register', 'subscribe',
                            'join', 'send', 'continue', 'next', 'get started'];

    let submitBtn = form.querySelector('input[type="submit"]');
    if (!submitBtn) {
        for (const btn of form.querySelectorAll('button, [role="button"]')) {
            const t = ((btn.textContent || btn.value || '')).toLowerCase().trim();
            if (isDialCode(t)) continue;
            if (submitPatterns.some(p => t.includes(p))) { submitBtn = btn; break; }
        }
    }
    if (!submitBtn) submitBtn = form.querySelector('button[type="submit"]');
    if (!submitBtn) {
        const buttons = form.querySelectorAll('button');
        for (let i = buttons.length - 1; i >= 0; i--) {
            const t = ((buttons[i].textContent || '')).toLowerCase().trim();
            if (!isDialCode(t)) { submitBtn = buttons[i]; break; }
        }
    }

    let submitSelector = null;
    if (submitBtn) {
        const text = ((submitBtn.textContent || submitBtn.value || '')).trim();
        if (submitBtn.id) submitSelector = '#' + submitBtn.id;
        else if (text && text.length > 1) {
            submitSelector = formSelector + " button:has-text('" + text.substring(0, 20) + "')";
        } else {
            submitSelector = formSelector + ' button[type="submit"]';
        }
    }

    return {
        formId: form.id || 'form_' + formIdx,
        formSelector: formSelector,
        submitSelector: submitSelector
    };
})()
"#;

/// Toggle a hidden checkbox through its wrapping label, a `label[for]`, or a
/// forced property write with synthesized events. `__SELECTOR__` and
/// `__CHECKED__` are substituted. Returns the final checked state or null.
pub const FORCE_CHECKBOX: &str = r#"
(() => {
    const el = document.querySelector(__SELECTOR__);
    if (!el) return null;
    const want = __CHECKED__;

    const parentLabel = el.closest('label');
    if (parentLabel) {
        parentLabel.click();
        if (el.checked === want) return el.checked;
    }
    if (el.id) {
        const forLabel = document.querySelector('label[for="' + el.id + '"]');
        if (forLabel) {
            forLabel.click();
            if (el.checked === want) return el.checked;
        }
    }
    el.checked = want;
    el.dispatchEvent(new Event('change', { bubbles: true }));
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('click', { bubbles: true }));
    if (parentLabel) parentLabel.dispatchEvent(new Event('click', { bubbles: true }));
    return el.checked;
})()
"#;

/// Fill an input through the native value setter so framework state updates.
/// `__SELECTOR__` and `__VALUE__` are substituted. Returns the value read
/// back from the element, or null when the element is missing.
pub const NATIVE_FILL: &str = r#"
(() => {
    const el = document.querySelector(__SELECTOR__);
    if (!el) return null;
    el.focus();
    const proto = el.tagName === 'TEXTAREA' ? window.HTMLTextAreaElement.prototype
                                            : window.HTMLInputElement.prototype;
    const setter = Object.getOwnPropertyDescriptor(proto, 'value');
    if (setter && setter.set) setter.set.call(el, __VALUE__);
    else el.value = __VALUE__;
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return el.value;
})()
"#;

/// Select a dropdown option by value, falling back to label match.
/// `__SELECTOR__` and `__VALUE__` are substituted. Returns true on success.
pub const SELECT_OPTION: &str = r#"
(() => {
    const el = document.querySelector(__SELECTOR__);
    if (!el || el.tagName !== 'SELECT') return false;
    const want = __VALUE__;
    for (const opt of el.options) {
        if (opt.value === want) {
            el.value = opt.value;
            el.dispatchEvent(new Event('change', { bubbles: true }));
            return true;
        }
    }
    for (const opt of el.options) {
        if ((opt.text || '').trim() === want) {
            el.value = opt.value;
            el.dispatchEvent(new Event('change', { bubbles: true }));
            return true;
        }
    }
    return false;
})()
"#;

/// Mark the first visible element of the given tag whose text contains the
/// target, so the driver can produce a trusted click on it.
/// `__TAG__` and `__TEXT__` are substituted. Returns true if marked.
pub const MARK_TEXT_TARGET: &str = r#"
(() => {
    document.querySelectorAll('[data-optin-target]').forEach(el => el.removeAttribute('data-optin-target'));
    const want = __TEXT__.toLowerCase();
    for (const el of document.querySelectorAll(__TAG__)) {
        const text = ((el.textContent || el.value || '')).trim().toLowerCase();
        if (!text.includes(want)) continue;
        const style = window.getComputedStyle(el);
        const rect = el.getBoundingClientRect();
        if (style.display === 'none' || style.visibility === 'hidden' || rect.width === 0) continue;
        el.setAttribute('data-optin-target', '1');
        return true;
    }
    return false;
})()
"#;

/// Scroll one viewport down, or to the bottom when near it. Returns the new
/// scroll offset.
pub const SCROLL_STEP: &str = r"
(() => {
    const current = window.pageYOffset || document.documentElement.scrollTop;
    const pageHeight = document.documentElement.scrollHeight;
    const viewport = window.innerHeight;
    const remaining = pageHeight - (current + viewport);
    if (remaining < viewport) {
        window.scrollTo(0, pageHeight);
    } else {
        window.scrollBy(0, viewport);
    }
    return window.pageYOffset || document.documentElement.scrollTop;
})()
";

/// Inject a solved reCAPTCHA token into the hidden response textarea and
/// invoke common callbacks. `__TOKEN__` is substituted.
pub const INJECT_RECAPTCHA_TOKEN: &str = r#"
(() => {
    const token = __TOKEN__;
    const field = document.querySelector('#g-recaptcha-response, [name="g-recaptcha-response"]');
    if (field) {
        field.value = token;
        field.innerHTML = token;
    }
    for (const cb of ['onCaptchaSuccess', 'captchaCallback', 'recaptchaCallback']) {
        if (typeof window[cb] === 'function') {
            try { window[cb](token); } catch (e) {}
        }
    }
    return field !== null;
})()
"#;

/// Inject a solved hCaptcha token. `__TOKEN__` is substituted.
pub const INJECT_HCAPTCHA_TOKEN: &str = r#"
(() => {
    const token = __TOKEN__;
    const field = document.querySelector('[name="h-captcha-response"], [name="g-recaptcha-response"]');
    if (field) field.value = token;
    if (typeof hcaptcha !== 'undefined' && hcaptcha.setResponse) {
        try { hcaptcha.setResponse(token); } catch (e) {}
    }
    return field !== null;
})()
"#;

/// Whether a reCAPTCHA response token is present (post-solve verification).
pub const RECAPTCHA_SOLVED_CHECK: &str = r"
(() => {
    try {
        if (typeof grecaptcha !== 'undefined' && grecaptcha.getResponse) {
            return grecaptcha.getResponse().length > 0;
        }
    } catch (e) {}
    const field = document.querySelector('#g-recaptcha-response, [name=\'g-recaptcha-response\']');
    return field !== null && field.value.length > 0;
})()
";

/// Bounding rectangle of the reCAPTCHA anchor iframe, for the manual
/// checkbox click. Returns null when absent.
pub const RECAPTCHA_ANCHOR_RECT: &str = r#"
(() => {
    const frame = document.querySelector('iframe[src*="recaptcha"][src*="anchor"]');
    if (!frame) return null;
    frame.scrollIntoView({ block: 'center', behavior: 'instant' });
    const rect = frame.getBoundingClientRect();
    return { x: rect.left, y: rect.top, width: rect.width, height: rect.height };
})()
"#;

/// Quote a string for direct substitution into one of the `__…__` script
/// placeholders.
#[must_use]
pub fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes() {
        assert_eq!(js_string("plain"), "\"plain\"");
        assert_eq!(js_string("it's"), "\"it's\"");
        assert_eq!(js_string("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn test_placeholders_present() {
        assert!(NATIVE_FILL.contains("__SELECTOR__"));
        assert!(NATIVE_FILL.contains("__VALUE__"));
        assert!(FORCE_CHECKBOX.contains("__CHECKED__"));
        assert!(MARK_TEXT_TARGET.contains("__TAG__"));
        assert!(INJECT_RECAPTCHA_TOKEN.contains("__TOKEN__"));
        assert!(ACTIVE_FORM_CONTEXT.contains("__SELECTOR__"));
    }

    #[test]
    fn test_scripts_are_iife() {
        for script in [
            OBSERVE_PAGE,
            DETECT_COUNTRY,
            UNWANTED_CONTENT_CHECK,
            SCROLL_STEP,
            RECAPTCHA_SOLVED_CHECK,
        ] {
            let trimmed = script.trim();
            assert!(trimmed.starts_with("(() =>"));
            assert!(trimmed.ends_with(")()"));
        }
    }
}
