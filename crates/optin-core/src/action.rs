//! Actions the executor can perform, and the per-step record of them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One atomic step the executor performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Fill a form field (text, email, phone, checkbox, select, …)
    FillField,
    /// Click a button or link
    Click,
    /// Scroll one viewport (or to the bottom when near it)
    Scroll,
    /// Sleep for a fixed duration
    Wait,
    /// Terminal marker, no side effect
    Complete,
}

impl ActionKind {
    /// Parse the planner's action string.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "fill_field" => Some(Self::FillField),
            "click" => Some(Self::Click),
            "scroll" => Some(Self::Scroll),
            "wait" => Some(Self::Wait),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }

    /// Wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FillField => "fill_field",
            Self::Click => "click",
            Self::Scroll => "scroll",
            Self::Wait => "wait",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalised logical field types the credential engine can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Email address
    Email,
    /// First name
    FirstName,
    /// Last name
    LastName,
    /// Full name (also plain "name")
    FullName,
    /// Phone number (national part)
    Phone,
    /// Checkbox / radio toggle
    Checkbox,
    /// Company / organisation name
    BusinessName,
    /// Website URL
    Website,
    /// Free-text message / comment
    Message,
    /// Anything else; resolved to a generic default
    Other,
}

impl FieldType {
    /// Normalise the planner's field_type string, accepting common aliases.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "email" => Self::Email,
            "first_name" | "firstname" => Self::FirstName,
            "last_name" | "lastname" => Self::LastName,
            "full_name" | "fullname" | "name" => Self::FullName,
            "phone" | "phone_number" | "phone_fallback" | "phonefallback" => Self::Phone,
            "checkbox" | "radio" => Self::Checkbox,
            "business_name" | "company" | "company_name" => Self::BusinessName,
            "website" | "url" => Self::Website,
            "message" | "comment" | "notes" => Self::Message,
            _ => Self::Other,
        }
    }

    /// Canonical name, used for refill tracking and persisted outcomes.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::FullName => "full_name",
            Self::Phone => "phone",
            Self::Checkbox => "checkbox",
            Self::BusinessName => "business_name",
            Self::Website => "website",
            Self::Message => "message",
            Self::Other => "other",
        }
    }

    /// User-facing name for humanised error messages.
    #[must_use]
    pub fn friendly_name(self) -> &'static str {
        match self {
            Self::Email => "Email",
            Self::FirstName => "First Name",
            Self::LastName => "Last Name",
            Self::FullName => "Full Name",
            Self::Phone => "Phone Number",
            Self::Checkbox => "Checkbox",
            Self::BusinessName => "Company",
            Self::Website => "Website",
            Self::Message => "Message",
            Self::Other => "form field",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action as planned (by the LLM or a deterministic rescue), before
/// execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedAction {
    /// What to do
    pub kind: ActionKind,
    /// Target selector (absent for scroll/wait/complete)
    #[serde(default)]
    pub selector: Option<String>,
    /// Normalised field type for fills
    #[serde(default)]
    pub field_type: Option<FieldType>,
    /// Value to fill (resolved from credentials before execution)
    #[serde(default)]
    pub value: Option<String>,
    /// Planner asked for a synthesised phone matching the detected country
    #[serde(default)]
    pub use_phone_number_only: bool,
    /// Planner's stated reason
    #[serde(default)]
    pub reasoning: String,
}

impl PlannedAction {
    /// A terminal `complete` action with the given reason.
    #[must_use]
    pub fn complete(reasoning: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Complete,
            selector: None,
            field_type: None,
            value: None,
            use_phone_number_only: false,
            reasoning: reasoning.into(),
        }
    }

    /// A wait action.
    #[must_use]
    pub fn wait(reasoning: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Wait,
            selector: None,
            field_type: None,
            value: None,
            use_phone_number_only: false,
            reasoning: reasoning.into(),
        }
    }

    /// A fill action.
    #[must_use]
    pub fn fill(
        selector: impl Into<String>,
        field_type: FieldType,
        value: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            kind: ActionKind::FillField,
            selector: Some(selector.into()),
            field_type: Some(field_type),
            value: Some(value.into()),
            use_phone_number_only: false,
            reasoning: reasoning.into(),
        }
    }

    /// A click action.
    #[must_use]
    pub fn click(selector: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Click,
            selector: Some(selector.into()),
            field_type: None,
            value: None,
            use_phone_number_only: false,
            reasoning: reasoning.into(),
        }
    }
}

/// The record of one executed action, appended to the agent state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    /// What was attempted
    pub kind: ActionKind,
    /// Target selector, if any
    pub selector: Option<String>,
    /// Value that was filled, if any
    pub value: Option<String>,
    /// Normalised field type for fills
    pub field_type: Option<FieldType>,
    /// Whether execution succeeded
    pub success: bool,
    /// Humanised error when execution failed
    pub error_message: Option<String>,
    /// Planner's stated reason
    pub reasoning: String,
}

impl ActionRecord {
    /// Build a record from a planned action and its execution result.
    #[must_use]
    pub fn from_planned(action: &PlannedAction, success: bool, error: Option<String>) -> Self {
        Self {
            kind: action.kind,
            selector: action.selector.clone(),
            value: action.value.clone(),
            field_type: action.field_type,
            success,
            error_message: error,
            reasoning: action.reasoning.clone(),
        }
    }

    /// Compact pattern string used by the loop guard.
    #[must_use]
    pub fn pattern(&self) -> String {
        let reasoning: String = self.reasoning.chars().take(30).collect();
        format!(
            "{}:{}:{}",
            self.kind,
            self.selector.as_deref().unwrap_or(""),
            reasoning
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_kind_round_trip() {
        for kind in [
            ActionKind::FillField,
            ActionKind::Click,
            ActionKind::Scroll,
            ActionKind::Wait,
            ActionKind::Complete,
        ] {
            assert_eq!(ActionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ActionKind::parse("navigate"), None);
    }

    #[test]
    fn test_field_type_aliases() {
        assert_eq!(FieldType::parse("fullname"), FieldType::FullName);
        assert_eq!(FieldType::parse("name"), FieldType::FullName);
        assert_eq!(FieldType::parse("phone_number"), FieldType::Phone);
        assert_eq!(FieldType::parse("radio"), FieldType::Checkbox);
        assert_eq!(FieldType::parse("company"), FieldType::BusinessName);
        assert_eq!(FieldType::parse("surprise"), FieldType::Other);
    }

    #[test]
    fn test_pattern_truncates_reasoning() {
        let action = PlannedAction::click("#go", "a".repeat(100));
        let record = ActionRecord::from_planned(&action, true, None);
        let pattern = record.pattern();
        assert!(pattern.starts_with("click:#go:"));
        assert!(pattern.len() <= "click:#go:".len() + 30);
    }
}
