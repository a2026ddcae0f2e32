//! Signup credentials and logical field resolution.

use crate::action::FieldType;
use serde::{Deserialize, Serialize};

/// A phone number split into dial code and national part.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Phone {
    /// Dial code, with or without leading `+` (normalised on access)
    #[serde(default)]
    pub country_code: String,
    /// National number, digits only
    #[serde(default)]
    pub number: String,
}

impl Phone {
    /// Dial code without the leading `+`.
    #[must_use]
    pub fn dial_code(&self) -> &str {
        self.country_code.trim_start_matches('+')
    }

    /// Rendered E.164-style string: `+{code}{national}`.
    #[must_use]
    pub fn rendered(&self) -> String {
        format!("+{}{}", self.dial_code(), self.number)
    }
}

/// Immutable per-run signup credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: String,
    /// Email address
    pub email: String,
    /// Phone number
    pub phone: Phone,
}

impl Credentials {
    /// Full name derived from first + last.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Resolve a logical field type to the value to fill.
    ///
    /// Pure and idempotent: repeated calls in one run return the same value.
    /// Phone resolution here returns the configured national number; the
    /// agent substitutes a synthesised number when the page's detected
    /// country differs (see the phone engine).
    #[must_use]
    pub fn resolve(&self, field_type: FieldType) -> String {
        match field_type {
            FieldType::Email => self.email.clone(),
            FieldType::FirstName => self.first_name.clone(),
            FieldType::LastName => self.last_name.clone(),
            FieldType::FullName => self.full_name(),
            FieldType::Phone => self.phone.number.clone(),
            FieldType::Checkbox => "true".to_string(),
            FieldType::BusinessName => "My Business LLC".to_string(),
            FieldType::Website => {
                let first = self.first_name.to_lowercase();
                if first.is_empty() {
                    "https://example.com".to_string()
                } else {
                    format!("https://{first}business.com")
                }
            }
            FieldType::Message => {
                "I'm interested in learning more about your services!".to_string()
            }
            FieldType::Other => "AutoFill".to_string(),
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            phone: Phone {
                country_code: "+1".to_string(),
                number: String::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            email: "jane@example.com".to_string(),
            phone: Phone {
                country_code: "+1".to_string(),
                number: "2025550123".to_string(),
            },
        }
    }

    #[test]
    fn test_resolve_known_fields() {
        let c = creds();
        assert_eq!(c.resolve(FieldType::Email), "jane@example.com");
        assert_eq!(c.resolve(FieldType::FullName), "Jane Doe");
        assert_eq!(c.resolve(FieldType::Phone), "2025550123");
        assert_eq!(c.resolve(FieldType::Checkbox), "true");
    }

    #[test]
    fn test_resolve_defaults_for_unknown_fields() {
        let c = creds();
        assert_eq!(c.resolve(FieldType::BusinessName), "My Business LLC");
        assert_eq!(c.resolve(FieldType::Website), "https://janebusiness.com");
        assert_eq!(c.resolve(FieldType::Other), "AutoFill");
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let c = creds();
        for ft in [FieldType::Email, FieldType::BusinessName, FieldType::Website] {
            assert_eq!(c.resolve(ft), c.resolve(ft));
        }
    }

    #[test]
    fn test_phone_rendering() {
        let phone = Phone {
            country_code: "44".to_string(),
            number: "7700900123".to_string(),
        };
        assert_eq!(phone.dial_code(), "44");
        assert_eq!(phone.rendered(), "+447700900123");
    }
}
