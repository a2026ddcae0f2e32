//! Prompt assembly.
//!
//! The three planner operations share fragments (credentials block, error
//! block, blocklist block, active-form block); each fragment is a small
//! function composing string segments with explicit sentinels.

use crate::planner::{BatchContext, StepContext, VerifyContext};
use optin_core::{ButtonDescriptor, Credentials, InputDescriptor};
use std::fmt::Write;

fn credentials_block(credentials: &Credentials, detected_country: Option<&str>) -> String {
    let mut block = format!(
        "CREDENTIALS:\n\
         - First Name: {}\n\
         - Last Name: {}\n\
         - Full Name: {}\n\
         - Email: {}\n\
         - Phone: {} (Country: +{}, Number: {})\n",
        credentials.first_name,
        credentials.last_name,
        credentials.full_name(),
        credentials.email,
        credentials.phone.rendered(),
        credentials.phone.dial_code(),
        credentials.phone.number,
    );
    if let Some(code) = detected_country {
        let _ = write!(
            block,
            "\nDETECTED COUNTRY CODE ON PAGE: +{code}\n\
             The phone field has country code +{code} pre-selected. DO NOT change the \
             country dropdown. For phone use field_type=\"phone\" with \
             use_phone_number_only=true and the system generates a valid number for +{code}.\n"
        );
    }
    block
}

fn blocklist_block(non_existent: &[String]) -> String {
    if non_existent.is_empty() {
        return String::new();
    }
    let mut block = String::from(
        "BLOCKLIST - THESE SELECTORS DO NOT EXIST ON THIS PAGE:\n",
    );
    for selector in non_existent.iter().take(10) {
        let _ = writeln!(block, "  - {selector}");
    }
    block.push_str(
        "Do NOT suggest any selector from the blocklist; each one has been verified absent. \
         Use only selectors that appear in VISIBLE INPUTS below.\n\n",
    );
    block
}

fn failed_hints_block(hints: &[String]) -> String {
    if hints.is_empty() {
        return String::new();
    }
    let mut block = String::from("PREVIOUS FAILURES - DO NOT REPEAT:\n");
    for hint in hints {
        let _ = writeln!(block, "{hint}");
    }
    block.push_str("Try a different approach.\n\n");
    block
}

fn active_form_block(ctx: &StepContext) -> String {
    let Some(active) = &ctx.active_form else {
        return String::new();
    };
    let mut block = format!(
        "ACTIVE FORM CONTEXT:\n\
         You are currently working with form {} ({}).\n",
        active.form_id, active.form_selector
    );
    if let Some(submit) = &active.submit_selector {
        let _ = write!(
            block,
            "SUBMIT BUTTON FOR THIS FORM: {submit}\n\
             Use exactly this selector to submit the form you just filled. This page may \
             have multiple forms; do not click submit buttons belonging to other forms.\n"
        );
    }
    block.push('\n');
    block
}

fn confirmed_form_block(ctx: &StepContext) -> String {
    let Some(reason) = &ctx.signup_form_confirmed else {
        return String::new();
    };
    format!(
        "PRE-ANALYSIS RESULT: the page was analyzed in full (scrolled, all sections) and a \
         signup form WAS found: \"{reason}\".\n\
         Do not answer \"no signup form\" or \"login page\". Your job is to find and fill \
         that form; it may sit in the footer or behind a CTA button. Scroll or click CTAs \
         if you cannot see it yet.\n\n"
    )
}

fn inputs_block(inputs: &[InputDescriptor]) -> String {
    if inputs.is_empty() {
        return "None visible".to_string();
    }
    let mut block = String::new();
    for (i, input) in inputs.iter().enumerate() {
        let mut line = format!(
            "{}. type={}, selector={}",
            i + 1,
            serde_json::to_value(input.kind)
                .ok()
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_else(|| "text".to_string()),
            input.selector
        );
        if !input.placeholder.is_empty() {
            let _ = write!(line, ", placeholder='{}'", input.placeholder);
        }
        if !input.label_text.is_empty() {
            let _ = write!(line, ", label='{}'", input.label_text);
        }
        if input.required {
            line.push_str(", required");
        }
        if input.is_hidden_sr_only {
            line.push_str(", hidden (sr-only; use fill_field with field_type=checkbox)");
        }
        if let Some(form) = &input.form_id_ref {
            let _ = write!(line, ", form={form}");
            if let Some(submit) = &input.form_submit_selector_ref {
                let _ = write!(line, ", submit-with={submit}");
            }
        }
        let _ = writeln!(block, "{line}");
    }
    block
}

fn buttons_block(buttons: &[ButtonDescriptor]) -> String {
    if buttons.is_empty() {
        return "None visible".to_string();
    }
    // CTA buttons first so landing pages lead with the right click
    let mut sorted: Vec<&ButtonDescriptor> = buttons.iter().collect();
    sorted.sort_by_key(|b| (!b.is_cta, b.text.clone()));

    let mut block = String::new();
    for (i, button) in sorted.iter().enumerate() {
        let mut line = format!("{}. text='{}', selector={}", i + 1, button.text, button.selector);
        if button.is_likely_submit {
            line.push_str(" [SUBMIT]");
        }
        if button.is_cta {
            line.push_str(" [CTA - click to reveal a hidden signup form]");
        }
        let _ = writeln!(block, "{line}");
    }
    block
}

fn history_block(ctx: &StepContext) -> String {
    if ctx.history.is_empty() {
        return "None".to_string();
    }
    let mut block = String::new();
    for entry in &ctx.history {
        let status = if entry.success { "SUCCESS" } else { "FAILED" };
        let mut line = format!("{status}: {} on {}", entry.kind, entry.selector);
        if let Some(error) = &entry.error {
            let snippet: String = error.chars().take(100).collect();
            let _ = write!(line, " ({snippet})");
        }
        let _ = writeln!(block, "- {line}");
    }
    block.trim_end().to_string()
}

fn errors_block(errors: &[String]) -> String {
    if errors.is_empty() {
        return "None".to_string();
    }
    errors
        .iter()
        .take(3)
        .map(|e| format!("- {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the stepwise prompt.
#[must_use]
pub fn stepwise_prompt(ctx: &StepContext) -> String {
    let filled_types = if ctx.field_types_filled.is_empty() {
        "None yet".to_string()
    } else {
        ctx.field_types_filled.join(", ")
    };
    let filled_selectors = if ctx.fields_filled.is_empty() {
        "None yet".to_string()
    } else {
        ctx.fields_filled.join(", ")
    };
    let text_sample: String = ctx.page_text_sample.chars().take(400).collect();

    format!(
        "{blocklist}{failed}{confirmed}{active}\
You are an AI agent signing up for an email list. Your goal is to SIGN UP (subscribe or \
create a new entry), never to log in.\n\
\n\
VALID SIGNUP TARGETS: newsletter forms (often in the footer), email subscription forms, \
registration forms with email + name/phone, free trial signups. A lone email input with a \
submit button is a valid signup form.\n\
AVOID: pure login pages (forgot password / remember me), forms with only email + password.\n\
\n\
{credentials}\n\
CURRENT STATE:\n\
- Step: {step}/{max_steps}\n\
- Page URL: {url}\n\
- Checkboxes checked: {checkboxes}{checkbox_warning}\n\
- Success indicator: {success}\n\
\n\
FIELDS ALREADY FILLED (DO NOT REFILL):\n\
- Field types filled: {filled_types}\n\
- Selectors filled: {filled_selectors}\n\
If email/name/phone are already filled, go straight to clicking Submit. Refilling causes loops.\n\
\n\
RECENT ACTIONS:\n{history}\n\
\n\
ERROR MESSAGES ON PAGE:\n{errors}\n\
\n\
VISIBLE INPUTS:\n{inputs}\n\
VISIBLE BUTTONS:\n{buttons}\n\
PAGE TEXT EXCERPT:\n{text_sample}\n\
\n\
ACTION TYPES: fill_field, click, scroll, wait, complete.\n\
\n\
RULES:\n\
1. Use only selectors present in VISIBLE INPUTS / VISIBLE BUTTONS.\n\
2. Never click country code or flag dropdowns; leave them at their default.\n\
3. For phone always use field_type=\"phone\" with use_phone_number_only=true; the system \
synthesises a number matching the detected country. Do not supply a phone value.\n\
4. Fill in order: email, name, phone, required checkboxes, then click Submit.\n\
5. Check at most ONE checkbox, then move on.\n\
6. If an action failed, try a DIFFERENT selector, never the same one again.\n\
7. Never mark complete on step 1.\n\
8. Mark complete ONLY after seeing an explicit success message (\"Thank you\", \
\"Subscribed\", ...) following a submit.\n\
9. After clicking Submit: if the form is unchanged, click Submit again; if new required \
fields appeared, fill them; do not invent close buttons or react to popups that are not \
in the lists above.\n\
10. If no email input is visible, click the most prominent CTA button first, then scroll; \
footer newsletters count.\n\
\n\
Return ONLY valid JSON:\n\
{{\"action\": \"fill_field\" | \"click\" | \"scroll\" | \"wait\" | \"complete\", \
\"selector\": \"#id or [name='x'] or button:has-text('text')\", \
\"field_type\": \"email\" | \"first_name\" | \"last_name\" | \"full_name\" | \"phone\" | \
\"checkbox\" | \"business_name\" | \"website\" | \"message\", \
\"value\": \"value to fill (checkboxes: 'true'; phone: leave empty)\", \
\"use_phone_number_only\": true, \
\"reasoning\": \"brief reason\"}}\n\
\n\
Examples:\n\
{{\"action\": \"fill_field\", \"selector\": \"#email\", \"field_type\": \"email\", \"reasoning\": \"Fill email field\"}}\n\
{{\"action\": \"fill_field\", \"selector\": \"[name='phoneNumber']\", \"field_type\": \"phone\", \"use_phone_number_only\": true, \"reasoning\": \"Fill phone - system generates valid number\"}}\n\
{{\"action\": \"fill_field\", \"selector\": \"#agree\", \"field_type\": \"checkbox\", \"value\": \"true\", \"reasoning\": \"Check agreement box\"}}\n\
{{\"action\": \"click\", \"selector\": \"button:has-text('Subscribe')\", \"reasoning\": \"Submit newsletter subscription\"}}\n\
{{\"action\": \"click\", \"selector\": \"button:has-text('Get Started')\", \"reasoning\": \"Click CTA to reveal signup form\"}}\n\
{{\"action\": \"scroll\", \"reasoning\": \"Scroll down to find signup form in footer\"}}\n\
{{\"action\": \"complete\", \"reasoning\": \"Success message visible after form submission\"}}\n",
        blocklist = blocklist_block(&ctx.non_existent_selectors),
        failed = failed_hints_block(&ctx.failed_selector_hints),
        confirmed = confirmed_form_block(ctx),
        active = active_form_block(ctx),
        credentials = credentials_block(&ctx.credentials, ctx.detected_country_code.as_deref()),
        step = ctx.current_step,
        max_steps = ctx.max_steps,
        url = ctx.page_url,
        checkboxes = ctx.checkboxes_checked,
        checkbox_warning = if ctx.checkboxes_checked > 0 {
            " (do not check more)"
        } else {
            ""
        },
        success = ctx.has_success_indicator,
        history = history_block(ctx),
        errors = errors_block(&ctx.error_messages),
        inputs = inputs_block(&ctx.inputs),
        buttons = buttons_block(&ctx.buttons),
    )
}

/// Build the batch-planning prompt.
#[must_use]
pub fn batch_prompt(ctx: &BatchContext) -> String {
    format!(
        "You are a web automation agent. Analyze this HTML and return actions to sign up \
for an email newsletter.\n\
\n\
CRITICAL: only create actions for elements that ACTUALLY EXIST in the HTML below.\n\
- Do NOT assume fields exist - check the HTML first\n\
- Do NOT hallucinate selectors - only use selectors you can see in the HTML, verbatim\n\
- If only an email field exists, only fill email and click submit\n\
\n\
CREDENTIALS (use ONLY if a matching field exists in the HTML):\n\
- Email: {email}\n\
- First Name: {first} (only if a first_name field exists)\n\
- Last Name: {last} (only if a last_name field exists)\n\
- Full Name: {full} (only if a name/full_name field exists)\n\
- Phone: {phone} (only if a phone/tel field exists)\n\
\n\
PAGE URL: {url}\n\
\n\
HTML:\n{html}\n\
\n\
INSTRUCTIONS:\n\
1. Scan the HTML for actual form fields (<input>, <textarea>, <button>).\n\
2. Only create selectors for elements visible in the HTML above (#id, [name=\"x\"], or \
class selectors).\n\
3. End the plan with a click on the form's submit button, found IN the HTML.\n\
\n\
Return JSON:\n\
{{\"actions\": [\
{{\"action\": \"fill_field\", \"selector\": \"#email\", \"field_type\": \"email\"}}, \
{{\"action\": \"click\", \"selector\": \"#submit\"}}\
], \"reasoning\": \"brief explanation\"}}\n\
\n\
Valid field_type: email, full_name, first_name, last_name, phone, checkbox.\n\
Valid action: fill_field, click, complete.\n\
\n\
If no signup form is found:\n\
{{\"actions\": [{{\"action\": \"complete\", \"reasoning\": \"No signup form\"}}], \"reasoning\": \"No form\"}}\n",
        email = ctx.credentials.email,
        first = ctx.credentials.first_name,
        last = ctx.credentials.last_name,
        full = ctx.credentials.full_name(),
        phone = ctx.credentials.phone.number,
        url = ctx.page_url,
        html = ctx.simplified_html,
    )
}

/// Build the post-submit verification prompt.
#[must_use]
pub fn verify_prompt(ctx: &VerifyContext) -> String {
    let retry = ctx
        .retry_reason
        .as_ref()
        .map(|r| format!("RETRY CONTEXT: a previous follow-up plan was rejected ({r}). Propose different selectors this time.\n\n"))
        .unwrap_or_default();
    let visible: String = ctx.visible_text.chars().take(1500).collect();

    format!(
        "{retry}You are verifying whether a signup form submission succeeded.\n\
\n\
WHAT WAS DONE:\n\
- Fields filled: {fields}\n\
- Actions taken: {actions}\n\
- Network: a POST/PUT request with a 2xx response was observed after submit: {network}\n\
\n\
CURRENT PAGE URL: {url}\n\
\n\
CURRENT PAGE VISIBLE TEXT:\n{visible}\n\
\n\
CURRENT PAGE HTML (simplified):\n{html}\n\
\n\
DECIDE IN THIS ORDER OF PRECEDENCE:\n\
1. Validation or rejection errors (\"required\", \"invalid\", \"Different Address Needed\", \
\"blocked\", \"already subscribed\") OVERRIDE every other signal: status=validation_error.\n\
2. A sales/upsell/pricing page shown after the fields were filled means the lead was \
captured: status=success.\n\
3. Explicit thank-you/confirmation phrases: status=success.\n\
4. A new second-step form asking for more details: status=needs_more_actions, with the \
follow-up actions. Every selector in next_actions must appear verbatim in the HTML above.\n\
5. Otherwise: status=failed.\n\
\n\
Return ONLY valid JSON:\n\
{{\"status\": \"success\" | \"needs_more_actions\" | \"validation_error\" | \"failed\", \
\"confidence\": 0.0-1.0, \
\"reasoning\": \"brief reason\", \
\"next_actions\": [{{\"action\": \"fill_field\", \"selector\": \"#x\", \"field_type\": \"email\"}}]}}\n",
        retry = retry,
        fields = if ctx.fields_filled.is_empty() {
            "none".to_string()
        } else {
            ctx.fields_filled.join(", ")
        },
        actions = if ctx.actions_taken.is_empty() {
            "none".to_string()
        } else {
            ctx.actions_taken.join("; ")
        },
        network = ctx.network_success,
        url = ctx.page_url,
        visible = visible,
        html = ctx.simplified_html,
    )
}
