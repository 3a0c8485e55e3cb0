//! Declarative source edits.
//!
//! An edit is a regular expression plus a replacement template, applied to
//! the full text of one file. Being plain data, an edit can be loaded from a
//! manifest, printed, and tested without touching a source tree.

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    /// Regular expression (Rust `regex` syntax).
    pub pattern: String,
    /// Replacement template: `$1`/`${name}` expand capture groups, `$$` is a
    /// literal dollar sign.
    pub replacement: String,
    /// Maximum number of replacements; `None` replaces every match.
    pub count: Option<usize>,
}

impl TextEdit {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
            count: None,
        }
    }

    /// Replace only the first match.
    pub fn once(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            count: Some(1),
            ..Self::new(pattern, replacement)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.count == Some(0) {
            return Err(format!(
                "edit '{}' has count 0; omit count to replace every match",
                self.pattern
            ));
        }
        Regex::new(&self.pattern)
            .map(|_| ())
            .map_err(|e| format!("invalid edit pattern '{}': {}", self.pattern, e))
    }

    /// Apply to `text`.
    ///
    /// A pattern that matches nothing is an error: the upstream source
    /// changed and the edit no longer does what it was written for.
    pub fn apply(&self, text: &str) -> Result<String, String> {
        self.validate()?;
        let re = Regex::new(&self.pattern)
            .map_err(|e| format!("invalid edit pattern '{}': {}", self.pattern, e))?;
        if !re.is_match(text) {
            return Err(format!("pattern '{}' did not match", self.pattern));
        }
        let limit = self.count.unwrap_or(0);
        Ok(re
            .replacen(text, limit, self.replacement.as_str())
            .into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_first_match_only_when_counted() {
        let edit = TextEdit::once("a", "b");
        assert_eq!(edit.apply("aaa").unwrap(), "baa");

        let all = TextEdit::new("a", "b");
        assert_eq!(all.apply("aaa").unwrap(), "bbb");
    }

    #[test]
    fn zero_count_is_rejected() {
        let edit = TextEdit {
            count: Some(0),
            ..TextEdit::new("a", "b")
        };
        assert!(edit.validate().unwrap_err().contains("count 0"));
        assert!(edit.apply("aaa").is_err());
    }

    #[test]
    fn dollar_escape_produces_shell_variables() {
        // libid3tag's configure.ac keeps only the last optimization flag
        let edit = TextEdit::once(r#"optimize="\$1""#, r#"optimize="$$optimize $$1""#);
        let out = edit.apply("    optimize=\"$1\"\n").unwrap();
        assert_eq!(out, "    optimize=\"$optimize $1\"\n");
    }

    #[test]
    fn capture_groups_expand() {
        let edit = TextEdit::new(r"VERSION=(\d+)", "VERSION=${1}0");
        assert_eq!(edit.apply("VERSION=4").unwrap(), "VERSION=40");
    }

    #[test]
    fn unmatched_pattern_is_an_error() {
        let edit = TextEdit::new("not-there", "x");
        assert!(edit.apply("hello").is_err());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let edit = TextEdit::new("(unclosed", "x");
        assert!(edit.validate().is_err());
        assert!(edit.apply("(unclosed").is_err());
    }
}
