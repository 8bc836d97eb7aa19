//! Signature matching for access-log lines.
//!
//! A [`PatternMatcher`] is compiled once per configuration snapshot and is
//! always case-insensitive, whether or not the raw text carries `(?i)`.

use regex::{Regex, RegexBuilder};

/// Pattern used when `LOG_REGEX` is not set.
pub const DEFAULT_PATTERN: &str = "(?i)torrent|peer_id|announce|info_hash";

/// Compiled, case-insensitive log signature.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    regex: Regex,
}

impl PatternMatcher {
    /// Compile `raw` into a matcher.
    ///
    /// An empty pattern is rejected: it would match every line.
    ///
    /// # Errors
    ///
    /// Returns the regex error if `raw` is empty or does not compile.
    pub fn compile(raw: &str) -> Result<Self, regex::Error> {
        if raw.trim().is_empty() {
            return Err(regex::Error::Syntax("empty pattern".to_owned()));
        }
        let regex = RegexBuilder::new(raw).case_insensitive(true).build()?;
        Ok(Self { regex })
    }

    /// Whether `line` contains the signature anywhere.
    pub fn matches(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }

    /// The pattern text this matcher was built from.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}
