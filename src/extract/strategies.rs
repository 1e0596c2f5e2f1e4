//! Extraction strategies
//!
//! Each strategy is a pure `text -> code` heuristic. The registry runs them
//! in priority order and short-circuits on the first hit, so the most
//! specific reading of the text always wins.

use super::filters::is_likely_not_otp;
use regex::Regex;
use std::sync::LazyLock;

/// Labeled patterns, most specific label first. The first capture wins.
///
/// A label-matched value is trusted as-is: the exclusion filter does not
/// apply, since "verification code: 2023" is a code, not a year.
static LABELED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)verification code[:\s]*(\d{4,8})",
        r"(?i)authentication code[:\s]*(\d{4,8})",
        r"(?i)login code[:\s]*(\d{4,8})",
        r"(?i)security code[:\s]*(\d{4,8})",
        r"(?i)OTP[:\s]*(\d{4,8})",
        r"(?i)one.time.password[:\s]*(\d{4,8})",
        r"(?i)code[:\s]*(\d{4,8})",
        r"(?i)passcode[:\s]*(\d{4,8})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// OTP-shaped digit runs: 4-8 digits on word boundaries.
static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{4,8}\b").unwrap());

/// Keywords that mark a line as likely to carry a code.
const LINE_KEYWORDS: &[&str] = &[
    "code",
    "otp",
    "password",
    "verification",
    "authenticate",
    "login",
    "access",
    "security",
    "one-time",
];

/// A single extraction heuristic.
///
/// Strategies are pure: text in, at most one code out. They are evaluated in
/// priority order by the registry and must not keep state between calls.
pub trait CodeStrategy: Send + Sync {
    /// Unique identifier, used in logs.
    fn id(&self) -> &str;

    /// Execution order (lower = earlier).
    fn priority(&self) -> u32 {
        100
    }

    /// Try to pull a code out of the text.
    fn extract(&self, text: &str) -> Option<String>;
}

/// Registry of extraction strategies, evaluated in priority order.
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn CodeStrategy>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn register<S: CodeStrategy + 'static>(&mut self, strategy: S) {
        self.strategies.push(Box::new(strategy));
    }

    /// All strategies sorted by priority.
    pub fn strategies(&self) -> Vec<&dyn CodeStrategy> {
        let mut strategies: Vec<_> = self.strategies.iter().map(|s| s.as_ref()).collect();
        strategies.sort_by_key(|s| s.priority());
        strategies
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Strategy 1: a semantic label ("verification code", "otp", ...) followed by
/// a 4-8 digit group.
pub struct LabeledPattern;

impl CodeStrategy for LabeledPattern {
    fn id(&self) -> &str {
        "labeled-pattern"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn extract(&self, text: &str) -> Option<String> {
        for pattern in LABELED_PATTERNS.iter() {
            if let Some(caps) = pattern.captures(text) {
                if let Some(code) = caps.get(1) {
                    return Some(code.as_str().trim().to_string());
                }
            }
        }
        None
    }
}

/// Strategy 2: digit runs on lines that mention a code-related keyword,
/// filtered through the exclusion rule.
pub struct LineContext;

impl CodeStrategy for LineContext {
    fn id(&self) -> &str {
        "line-context"
    }

    fn priority(&self) -> u32 {
        20
    }

    fn extract(&self, text: &str) -> Option<String> {
        for line in text.lines() {
            let lower = line.to_lowercase();
            if !LINE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                continue;
            }
            for run in DIGIT_RUN.find_iter(line) {
                let candidate = run.as_str();
                if !is_likely_not_otp(candidate) {
                    return Some(candidate.to_string());
                }
            }
        }
        None
    }
}

/// Strategy 3: any digit run in the whole text, filtered through the
/// exclusion rule. Last resort.
pub struct GlobalFallback;

impl CodeStrategy for GlobalFallback {
    fn id(&self) -> &str {
        "global-fallback"
    }

    fn priority(&self) -> u32 {
        30
    }

    fn extract(&self, text: &str) -> Option<String> {
        DIGIT_RUN
            .find_iter(text)
            .map(|run| run.as_str())
            .find(|candidate| !is_likely_not_otp(candidate))
            .map(|candidate| candidate.to_string())
    }
}
