//! Country-aware phone number synthesis.
//!
//! Phone widgets validate the national number against the selected country,
//! so a US-format number fails on a page whose dial code is pre-set to +92.
//! The agent detects the page's country and synthesises a number from that
//! country's mobile plan instead of fighting the dropdown.

use rand::Rng;

/// A country's mobile numbering plan: valid leading prefixes and the number
/// of digits that follow the prefix.
#[derive(Debug, Clone, Copy)]
pub struct PhonePlan {
    /// Dial code without `+`
    pub dial_code: &'static str,
    /// Valid mobile prefixes
    pub prefixes: &'static [&'static str],
    /// Digits after the prefix
    pub suffix_len: usize,
}

const PK_PREFIXES: &[&str] = &["300", "306"];
const IN_PREFIXES: &[&str] = &[
    "70", "72", "73", "74", "75", "76", "77", "78", "79", "80", "81", "82", "83", "84", "85", "86",
    "87", "88", "89", "90", "91", "92", "93", "94", "95", "96", "97", "98", "99",
];
const GB_PREFIXES: &[&str] = &["71", "72", "73", "74", "75", "76", "77", "78", "79"];
const AE_PREFIXES: &[&str] = &["50", "52", "54", "55", "56", "58"];
const SA_PREFIXES: &[&str] = &["50", "53", "54", "55", "56", "57", "58", "59"];
const US_PREFIXES: &[&str] = &[
    "201", "202", "203", "204", "205", "206", "207", "208", "209", "210", "212", "213", "214",
    "215", "216", "217", "218", "219", "310", "312", "313", "314", "315", "316", "317", "318",
    "319", "404", "405", "406", "407", "408", "409", "410", "412", "413", "415", "416", "417",
    "418", "419", "424", "425",
];
const AU_PREFIXES: &[&str] = &[
    "400", "401", "402", "403", "404", "405", "406", "407", "408", "409", "410", "411", "412",
    "413", "414", "415", "416", "417", "418", "419", "420", "421", "422", "423", "424", "425",
    "426", "427", "428", "429",
];
const DE_PREFIXES: &[&str] = &[
    "151", "152", "153", "155", "156", "157", "159", "160", "162", "163", "164", "170", "171",
    "172", "173", "174", "175", "176", "177", "178", "179",
];
const FR_PREFIXES: &[&str] = &["6", "7"];

/// Plans for the countries the agent knows; everything else falls back to
/// the US plan.
pub const PHONE_PLANS: &[PhonePlan] = &[
    PhonePlan {
        dial_code: "92",
        prefixes: PK_PREFIXES,
        suffix_len: 7,
    },
    PhonePlan {
        dial_code: "91",
        prefixes: IN_PREFIXES,
        suffix_len: 8,
    },
    PhonePlan {
        dial_code: "44",
        prefixes: GB_PREFIXES,
        suffix_len: 8,
    },
    PhonePlan {
        dial_code: "971",
        prefixes: AE_PREFIXES,
        suffix_len: 7,
    },
    PhonePlan {
        dial_code: "966",
        prefixes: SA_PREFIXES,
        suffix_len: 7,
    },
    PhonePlan {
        dial_code: "1",
        prefixes: US_PREFIXES,
        suffix_len: 7,
    },
    PhonePlan {
        dial_code: "61",
        prefixes: AU_PREFIXES,
        suffix_len: 6,
    },
    PhonePlan {
        dial_code: "49",
        prefixes: DE_PREFIXES,
        suffix_len: 7,
    },
    PhonePlan {
        dial_code: "33",
        prefixes: FR_PREFIXES,
        suffix_len: 8,
    },
];

/// Look up the plan for a dial code (with or without `+`), falling back to
/// the US plan for unknown codes.
#[must_use]
pub fn plan_for(country_code: &str) -> &'static PhonePlan {
    let code = country_code.trim().trim_start_matches('+');
    PHONE_PLANS
        .iter()
        .find(|p| p.dial_code == code)
        .or_else(|| PHONE_PLANS.iter().find(|p| p.dial_code == "1"))
        .expect("US plan is always present")
}

/// Synthesise a national number valid for the given country.
///
/// Deterministic for a given RNG seed, which keeps tests reproducible.
pub fn generate_phone<R: Rng + ?Sized>(country_code: &str, rng: &mut R) -> String {
    let plan = plan_for(country_code);
    let prefix = plan.prefixes[rng.gen_range(0..plan.prefixes.len())];
    let mut number = String::with_capacity(prefix.len() + plan.suffix_len);
    number.push_str(prefix);
    for _ in 0..plan.suffix_len {
        number.push(char::from(b'0' + rng.gen_range(0..10u8)));
    }
    number
}

/// Whether a national number begins with a valid prefix for the country.
#[must_use]
pub fn matches_plan(country_code: &str, number: &str) -> bool {
    let plan = plan_for(country_code);
    plan.prefixes.iter().any(|p| {
        number.starts_with(p) && number.len() == p.len() + plan.suffix_len
    })
}

/// Pull a `+NN` dial code out of free text (planner reasoning, button text).
#[must_use]
pub fn extract_dial_code(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'+' {
            let digits: String = text[i + 1..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .take(4)
                .collect();
            if !digits.is_empty() {
                return Some(digits);
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generate_matches_plan_for_known_countries() {
        let mut rng = StdRng::seed_from_u64(7);
        for code in ["92", "91", "44", "971", "966", "1", "61", "49", "33"] {
            let number = generate_phone(code, &mut rng);
            assert!(
                matches_plan(code, &number),
                "number {number} does not match plan for +{code}"
            );
        }
    }

    #[test]
    fn test_unknown_country_falls_back_to_us() {
        let mut rng = StdRng::seed_from_u64(7);
        let number = generate_phone("999", &mut rng);
        assert!(matches_plan("1", &number));
        assert_eq!(number.len(), 10);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        assert_eq!(generate_phone("44", &mut a), generate_phone("44", &mut b));
    }

    #[test]
    fn test_plus_prefix_accepted() {
        let mut rng = StdRng::seed_from_u64(3);
        let number = generate_phone("+92", &mut rng);
        assert!(matches_plan("92", &number));
    }

    #[test]
    fn test_extract_dial_code() {
        assert_eq!(extract_dial_code("selected +92 Pakistan").as_deref(), Some("92"));
        assert_eq!(extract_dial_code("use +1").as_deref(), Some("1"));
        assert_eq!(extract_dial_code("no code here"), None);
    }

    #[test]
    fn test_lengths_match_original_plans() {
        // FR: 1-digit prefix + 8 digits = 9; AU: 3 + 6 = 9; GB: 2 + 8 = 10
        let mut rng = StdRng::seed_from_u64(11);
        assert_eq!(generate_phone("33", &mut rng).len(), 9);
        assert_eq!(generate_phone("61", &mut rng).len(), 9);
        assert_eq!(generate_phone("44", &mut rng).len(), 10);
    }
}
