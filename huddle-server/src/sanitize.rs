//! Repair of almost-valid JSON payloads.
//!
//! Generation services regularly emit literal newlines or tabs inside JSON
//! string values. Those are control characters, which JSON forbids unescaped.
//! The filter tries a strict parse first and only strips control characters
//! (U+0000..=U+001F, U+007F..=U+009F) when that fails. Escape sequences such
//! as `\n` are plain printable characters and survive untouched.

use std::borrow::Cow;

use serde_json::Value;

/// A payload that parsed, possibly after repair.
#[derive(Debug)]
pub struct Repaired<'a> {
    pub text: Cow<'a, str>,
    pub value: Value,
}

impl Repaired<'_> {
    /// Whether control characters had to be stripped.
    pub fn was_repaired(&self) -> bool {
        matches!(self.text, Cow::Owned(_))
    }
}

/// Parse `payload`, stripping control characters and retrying once on failure.
///
/// On a second failure the error from the *first* parse is returned.
pub fn repair(payload: &str) -> Result<Repaired<'_>, serde_json::Error> {
    let original_err = match serde_json::from_str::<Value>(payload) {
        Ok(value) => {
            return Ok(Repaired {
                text: Cow::Borrowed(payload),
                value,
            });
        }
        Err(e) => e,
    };

    let stripped: String = payload.chars().filter(|c| !is_stripped(*c)).collect();
    if stripped.len() == payload.len() {
        return Err(original_err);
    }
    match serde_json::from_str::<Value>(&stripped) {
        Ok(value) => Ok(Repaired {
            text: Cow::Owned(stripped),
            value,
        }),
        Err(_) => Err(original_err),
    }
}

/// The repaired text only, for callers that parse on their own.
pub fn sanitize(payload: &str) -> Result<Cow<'_, str>, serde_json::Error> {
    repair(payload).map(|r| r.text)
}

fn is_stripped(c: char) -> bool {
    matches!(c, '\u{0000}'..='\u{001F}' | '\u{007F}'..='\u{009F}')
}
