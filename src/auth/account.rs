use std::sync::LazyLock;

use regex::Regex;

use crate::auth::Outcome;

static DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:Infinity|(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?)$")
        .unwrap()
});

static RADIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0(?:[xX][0-9a-fA-F]+|[oO][0-7]+|[bB][01]+)$").unwrap());

// Unicode White_Space minus NEL, plus the byte order mark
fn is_number_whitespace(c: char) -> bool {
    (c.is_whitespace() && c != '\u{85}') || c == '\u{feff}'
}

/// Checks that an account number is present and reads as a number.
///
/// Parsing follows the usual string-to-number conversion: surrounding whitespace is ignored
/// (so a blank string reads as zero), decimal literals may carry a sign, a fraction and an
/// exponent, and `0x`/`0o`/`0b` prefixed literals are accepted.
pub fn is_valid_account_number(account_number: Option<&str>) -> bool {
    let Some(account_number) = account_number else {
        return false;
    };

    if account_number.is_empty() {
        return false;
    }

    let trimmed = account_number.trim_matches(is_number_whitespace);
    trimmed.is_empty() || DECIMAL_RE.is_match(trimmed) || RADIX_RE.is_match(trimmed)
}

/// Decides whether the outcome of a mechanism lets the request through.
pub fn validate(outcome: &Outcome) -> bool {
    match outcome {
        Outcome::Skip => true,
        Outcome::Absent => false,
        Outcome::Candidate(identity) => {
            identity.is_active && is_valid_account_number(identity.account_number.as_deref())
        }
    }
}
