//! Candidate exclusion rules
//!
//! Digit runs that look like calendar years, all-same-digit boilerplate, or
//! ascending sequences are far more likely to come from dates and footer text
//! than from a passcode.

use regex::Regex;
use std::sync::LazyLock;

static EXCLUSIONS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Calendar years 1900-2099
        r"^(19|20)\d{2}$",
        r"^0+$",
        r"^1+$",
        // Ascending sequences
        r"^(123|1234|12345|123456)$",
        // Repeated-digit runs
        r"^(111|222|333|444|555|666|777|888|999|1111|2222|3333|4444|5555|6666|7777|8888|9999)$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// True when a digit run is more plausibly a year, a sequence, or repeated
/// filler than a passcode.
pub fn is_likely_not_otp(code: &str) -> bool {
    EXCLUSIONS.iter().any(|re| re.is_match(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_calendar_years() {
        assert!(is_likely_not_otp("1999"));
        assert!(is_likely_not_otp("2023"));
        assert!(is_likely_not_otp("2099"));
        assert!(!is_likely_not_otp("2150"));
    }

    #[test]
    fn rejects_degenerate_runs() {
        assert!(is_likely_not_otp("0000"));
        assert!(is_likely_not_otp("1111"));
        assert!(is_likely_not_otp("11111111"));
        assert!(is_likely_not_otp("5555"));
    }

    #[test]
    fn rejects_ascending_sequences() {
        assert!(is_likely_not_otp("1234"));
        assert!(is_likely_not_otp("123456"));
    }

    #[test]
    fn accepts_ordinary_codes() {
        assert!(!is_likely_not_otp("483920"));
        assert!(!is_likely_not_otp("8057"));
        assert!(!is_likely_not_otp("12345678"));
    }
}
