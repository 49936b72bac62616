use std::sync::LazyLock;

use regex::Regex;

/// Dashboard rows render the customer phone as `"(DD) NNNNN-NNNN"` inside a
/// longer order line. Detection only; cleaning is positional below.
static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\d{2,}\)").expect("phone pattern"));

/// Characters taken from the opening parenthesis when cleaning a row line.
/// `"(85) 98164-7142"` is exactly 15 characters.
const PHONE_WINDOW: usize = 15;

const MIN_DIGITS: usize = 8;

/// A customer contact derived from one dashboard row line. Immutable after
/// creation; `raw_digits` is the dedup key, `formatted` is the display form
/// the messaging site uses for chat titles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub raw_digits: String,
    pub formatted: String,
}

impl Contact {
    pub fn from_digits(digits: &str) -> Option<Self> {
        if digits.len() < MIN_DIGITS || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            raw_digits: digits.to_string(),
            formatted: format_digits(digits),
        })
    }
}

/// Formats a digit string into the messaging site's display form:
/// `"+55 <d[0:2]> <d[2:7]>-<d[7:]>"`. Input must be at least 8 digits;
/// anything past index 7 lands after the hyphen unchanged.
pub fn format_digits(digits: &str) -> String {
    format!(
        "+55 {} {}-{}",
        &digits[..2],
        &digits[2..7],
        &digits[7..]
    )
}

/// Extracts a contact from one dashboard row line, or `None` when the line
/// carries no parenthesized phone pattern. Takes a fixed character window
/// from the opening parenthesis and strips it to digits.
pub fn extract_from_line(line: &str) -> Option<Contact> {
    let m = PHONE_PATTERN.find(line)?;
    let digits: String = line[m.start()..]
        .chars()
        .take(PHONE_WINDOW)
        .filter(|c| c.is_ascii_digit())
        .collect();
    Contact::from_digits(&digits)
}
