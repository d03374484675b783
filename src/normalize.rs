//! Prediction normalizer
//!
//! Turns raw model strings into well-formed card fields. A rejected field is
//! not an error, it just means the frame carried no signal for it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::classifier::RawPrediction;

/// Normalized card number: digits only, within the accepted length range
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Candidate(String);

impl Candidate {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last four digits, for logs
    pub fn last4(&self) -> &str {
        &self.0[self.0.len().saturating_sub(4)..]
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Card expiry date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Expiry {
    /// 1-12
    pub month: u8,
    /// Four-digit year
    pub year: u16,
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{:04}", self.month, self.year)
    }
}

/// Normalizer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Shortest accepted card number
    pub min_digits: usize,
    /// Longest accepted card number
    pub max_digits: usize,
    /// Also reject numbers failing the Luhn checksum
    pub require_luhn: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_digits: 13,
            max_digits: 19,
            require_luhn: false,
        }
    }
}

const MAX_NAME_LEN: usize = 26;

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Card number candidate for this prediction, if any
    pub fn normalize(&self, prediction: &RawPrediction) -> Option<Candidate> {
        let raw = prediction.candidate_digits.as_deref()?;
        let digits: String = raw.chars().filter(|c| *c != ' ').collect();

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if !(self.config.min_digits..=self.config.max_digits).contains(&digits.len()) {
            return None;
        }
        if self.config.require_luhn && !luhn_valid(&digits) {
            return None;
        }

        Some(Candidate(digits))
    }

    /// Expiry date for this prediction, if both parts read cleanly
    pub fn normalize_expiry(&self, prediction: &RawPrediction) -> Option<Expiry> {
        let month = parse_digits(prediction.expiry_month.as_deref()?, 1..=2)?;
        let year_text = prediction.expiry_year.as_deref()?.trim();
        let year = parse_digits(year_text, 2..=4)?;

        if !(1..=12).contains(&month) {
            return None;
        }

        let year = match year_text.len() {
            2 => 2000 + year,
            4 => year,
            _ => return None,
        };

        Some(Expiry {
            month: month as u8,
            year: year as u16,
        })
    }

    /// Cardholder name for this prediction, uppercased and trimmed
    pub fn normalize_name(&self, prediction: &RawPrediction) -> Option<String> {
        let name = prediction
            .name
            .as_deref()?
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();

        let allowed = |c: char| c.is_alphabetic() || matches!(c, ' ' | '.' | '-' | '\'');
        let length = name.chars().count();
        if length < 2 || length > MAX_NAME_LEN || !name.chars().all(allowed) {
            return None;
        }

        Some(name)
    }
}

fn parse_digits(text: &str, width: std::ops::RangeInclusive<usize>) -> Option<u32> {
    let text = text.trim();
    if !width.contains(&text.len()) || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Luhn checksum over an ASCII digit string
pub fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, b) in digits.bytes().rev().enumerate() {
        if !b.is_ascii_digit() {
            return false;
        }
        let mut d = u32::from(b - b'0');
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    !digits.is_empty() && sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(raw: &str) -> Option<String> {
        Normalizer::default()
            .normalize(&RawPrediction::digits(raw))
            .map(|c| c.as_str().to_string())
    }

    #[test]
    fn test_accepts_spaced_numbers() {
        assert_eq!(number("4242 4242 4242 4242").as_deref(), Some("4242424242424242"));
        assert_eq!(number("4111111111111111").as_deref(), Some("4111111111111111"));
    }

    #[test]
    fn test_length_range_is_inclusive() {
        assert!(number(&"4".repeat(12)).is_none());
        assert!(number(&"4".repeat(13)).is_some());
        assert!(number(&"4".repeat(19)).is_some());
        assert!(number(&"4".repeat(20)).is_none());
    }

    #[test]
    fn test_rejects_non_digits() {
        assert!(number("4242-4242-4242-4242").is_none());
        assert!(number("4242 4242 4242 424O").is_none());
        assert!(number("").is_none());
        assert!(number("    ").is_none());
        assert!(Normalizer::default().normalize(&RawPrediction::empty()).is_none());
    }

    #[test]
    fn test_luhn_is_opt_in() {
        // Fails checksum
        let raw = RawPrediction::digits("4242424242424241");
        assert!(Normalizer::default().normalize(&raw).is_some());

        let strict = Normalizer::new(NormalizerConfig {
            require_luhn: true,
            ..NormalizerConfig::default()
        });
        assert!(strict.normalize(&raw).is_none());
        assert!(strict.normalize(&RawPrediction::digits("4242424242424242")).is_some());
    }

    #[test]
    fn test_luhn() {
        assert!(luhn_valid("4111111111111111"));
        assert!(luhn_valid("378282246310005"));
        assert!(!luhn_valid("4111111111111112"));
        assert!(!luhn_valid(""));
    }

    #[test]
    fn test_expiry() {
        let normalizer = Normalizer::default();
        let mut raw = RawPrediction::empty();
        raw.expiry_month = Some("4".into());
        raw.expiry_year = Some("29".into());
        assert_eq!(normalizer.normalize_expiry(&raw), Some(Expiry { month: 4, year: 2029 }));

        raw.expiry_year = Some("2031".into());
        assert_eq!(normalizer.normalize_expiry(&raw), Some(Expiry { month: 4, year: 2031 }));

        raw.expiry_month = Some("13".into());
        assert!(normalizer.normalize_expiry(&raw).is_none());

        raw.expiry_month = Some("12".into());
        raw.expiry_year = Some("203".into());
        assert!(normalizer.normalize_expiry(&raw).is_none());

        raw.expiry_year = None;
        assert!(normalizer.normalize_expiry(&raw).is_none());
    }

    #[test]
    fn test_name() {
        let normalizer = Normalizer::default();
        let mut raw = RawPrediction::empty();

        raw.name = Some("  jane   o'neil ".into());
        assert_eq!(normalizer.normalize_name(&raw).as_deref(), Some("JANE O'NEIL"));

        raw.name = Some("J".into());
        assert!(normalizer.normalize_name(&raw).is_none());

        raw.name = Some("VALID THRU 04/29".into());
        assert!(normalizer.normalize_name(&raw).is_none());
    }

    #[test]
    fn test_last4() {
        let candidate = Normalizer::default()
            .normalize(&RawPrediction::digits("4242424242421234"))
            .unwrap();
        assert_eq!(candidate.last4(), "1234");
        assert_eq!(candidate.len(), 16);
    }
}
