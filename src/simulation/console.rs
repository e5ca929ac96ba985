//! Standard streams of the interpreted program
//!
//! - [`Console`]: everything written to `cout`
//! - [`InputStream`]: the `cin` buffer, fed before the run or while it is
//!   blocked waiting for input

use crate::memory::value::Value;
use crate::program::types::ObjectType;
use regex::Regex;
use std::sync::OnceLock;

static INTEGER: OnceLock<Regex> = OnceLock::new();
static FLOATING: OnceLock<Regex> = OnceLock::new();

fn integer_pattern() -> &'static Regex {
    INTEGER.get_or_init(|| Regex::new(r"^[+-]?[0-9]+").unwrap_or_else(|e| panic!("bad pattern: {}", e)))
}

fn floating_pattern() -> &'static Regex {
    FLOATING.get_or_init(|| {
        Regex::new(r"^[+-]?([0-9]+\.?[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?")
            .unwrap_or_else(|e| panic!("bad pattern: {}", e))
    })
}

/// Captured `cout` output
#[derive(Debug, Clone, Default)]
pub struct Console {
    text: String,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Everything written so far
    pub fn output(&self) -> &str {
        &self.text
    }

    /// Output split into lines; a trailing newline does not start a new line
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.text.split('\n').map(|s| s.to_string()).collect();
        if lines.last().is_some_and(|s| s.is_empty()) {
            lines.pop();
        }
        lines
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}

/// The `cin` buffer
///
/// Extraction skips leading whitespace. A failed extraction stores zero and
/// sets the fail flag; once failed, further extractions do nothing.
#[derive(Debug, Clone, Default)]
pub struct InputStream {
    buffer: String,
    failed: bool,
}

impl InputStream {
    pub fn new(initial: &str) -> Self {
        InputStream {
            buffer: initial.to_string(),
            failed: false,
        }
    }

    pub fn add_to_buffer(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// Unread input
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Whether an extraction would find anything besides whitespace
    pub fn has_token(&self) -> bool {
        self.buffer.chars().any(|c| !c.is_whitespace())
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.buffer.trim_start().len();
        self.buffer.drain(..self.buffer.len() - trimmed);
    }

    fn take_match(&mut self, pattern: &Regex) -> Option<String> {
        let end = pattern.find(&self.buffer)?.end();
        Some(self.buffer.drain(..end).collect())
    }

    /// Extract a value of atomic type `ty`. `None` means nothing was stored.
    pub fn extract(&mut self, ty: &ObjectType) -> Option<Value> {
        if self.failed {
            return None;
        }
        self.skip_whitespace();
        let parsed = match ty {
            ObjectType::Char => {
                let c = self.buffer.chars().next()?;
                self.buffer.drain(..c.len_utf8());
                Some(Value::character(c as u8))
            }
            ObjectType::Double => self
                .take_match(floating_pattern())
                .and_then(|text| text.parse::<f64>().ok())
                .map(Value::double),
            ObjectType::Bool | ObjectType::Int => self
                .take_match(integer_pattern())
                .and_then(|text| text.parse::<i64>().ok())
                .map(|n| Value::from_i64(ty.clone(), n)),
            _ => None,
        };
        match parsed {
            Some(value) => Some(value),
            None => {
                self.failed = true;
                ty.is_arithmetic().then(|| Value::from_i64(ty.clone(), 0))
            }
        }
    }

    /// Extract a whitespace-delimited word
    pub fn extract_word(&mut self) -> Option<String> {
        if self.failed {
            return None;
        }
        self.skip_whitespace();
        let end = self
            .buffer
            .find(char::is_whitespace)
            .unwrap_or(self.buffer.len());
        if end == 0 {
            self.failed = true;
            return None;
        }
        Some(self.buffer.drain(..end).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_lines() {
        let mut console = Console::new();
        console.write("a");
        console.write("b\nc\n");
        assert_eq!(console.lines(), vec!["ab".to_string(), "c".to_string()]);
        assert_eq!(console.output(), "ab\nc\n");
    }

    #[test]
    fn test_extracts_integers_and_words() {
        let mut cin = InputStream::new("  42 -7 hello x");
        assert_eq!(cin.extract(&ObjectType::Int).map(|v| v.as_i64()), Some(42));
        assert_eq!(cin.extract(&ObjectType::Int).map(|v| v.as_i64()), Some(-7));
        assert_eq!(cin.extract_word().as_deref(), Some("hello"));
        assert_eq!(cin.extract(&ObjectType::Char).map(|v| v.as_i64()), Some('x' as i64));
        assert!(!cin.has_token());
    }

    #[test]
    fn test_failed_extraction_sets_flag_and_stores_zero() {
        let mut cin = InputStream::new("abc 5");
        let value = cin.extract(&ObjectType::Int).expect("zero is stored on failure");
        assert_eq!(value.as_i64(), 0);
        assert!(cin.is_failed());
        assert!(cin.extract(&ObjectType::Int).is_none());
    }

    #[test]
    fn test_doubles() {
        let mut cin = InputStream::new("2.5 1e3");
        assert_eq!(cin.extract(&ObjectType::Double).map(|v| v.as_f64()), Some(2.5));
        assert_eq!(cin.extract(&ObjectType::Double).map(|v| v.as_f64()), Some(1000.0));
    }
}
