//! Heuristic readability signal for transport payloads.
//!
//! A payload is decoded byte-for-byte as ASCII (bytes above 0x7f become
//! U+FFFD) and scored by the fraction of characters that are alphanumeric,
//! whitespace or basic punctuation. This is not a protocol or encryption
//! detector.

/// Default ratio of readable characters a payload must exceed
pub const READABLE_THRESHOLD: f64 = 0.7;

const PUNCTUATION: [char; 6] = [',', '.', '!', '?', ';', ':'];

/// Whitespace is space, `\t`, `\n`, `\v`, `\f`, `\r` and the four
/// information separators U+001C..=U+001F, the set a Unicode-aware regex
/// `\s` matches within ASCII.
fn is_readable_whitespace(c: char) -> bool {
    c.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&c)
}

/// Decode a payload as ASCII, substituting the replacement character for
/// anything outside the 7-bit range. Never fails.
pub fn decode_ascii(payload: &[u8]) -> String {
    payload
        .iter()
        .map(|&b| {
            if b.is_ascii() {
                b as char
            } else {
                char::REPLACEMENT_CHARACTER
            }
        })
        .collect()
}

fn is_readable_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || is_readable_whitespace(c) || PUNCTUATION.contains(&c)
}

/// Fraction of readable characters, `None` for an empty payload
pub fn readable_ratio(payload: &[u8]) -> Option<f64> {
    if payload.is_empty() {
        return None;
    }
    let decoded = decode_ascii(payload);
    let readable = decoded.chars().filter(|&c| is_readable_char(c)).count();
    Some(readable as f64 / payload.len() as f64)
}

/// Readability classifier with a tunable threshold
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    threshold: f64,
}

impl Default for Classifier {
    fn default() -> Self {
        Classifier {
            threshold: READABLE_THRESHOLD,
        }
    }
}

impl Classifier {
    pub fn new(threshold: f64) -> Self {
        Classifier { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_readable(&self, payload: &[u8]) -> bool {
        readable_ratio(payload).map_or(false, |ratio| ratio > self.threshold)
    }
}

/// Classify with the default threshold
pub fn is_readable(payload: &[u8]) -> bool {
    Classifier::default().is_readable(payload)
}
