//! Trigger phrase matching for speech transcripts.
//!
//! A transcript matches when it contains any configured phrase, ignoring
//! case. Phrases are matched literally; regex metacharacters in a phrase
//! have no special meaning.

use regex::{RegexSet, RegexSetBuilder};

use crate::error::{Error, Result};

/// Case-insensitive substring matcher over a fixed phrase set.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    phrases: Vec<String>,
    set: RegexSet,
}

impl KeywordMatcher {
    /// Compile a matcher for `phrases`.
    ///
    /// Phrases are trimmed and lowercased; matching order follows the order
    /// given here.
    ///
    /// # Errors
    ///
    /// Returns an error if a phrase cannot be compiled.
    pub fn new<S: AsRef<str>>(phrases: &[S]) -> Result<Self> {
        let phrases: Vec<String> = phrases
            .iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .collect();

        let patterns: Vec<String> = phrases.iter().map(|p| regex::escape(p)).collect();
        let set = RegexSetBuilder::new(&patterns)
            .case_insensitive(true)
            .build()
            .map_err(|source| Error::TriggerPhrase {
                phrase: phrases.join(", "),
                source,
            })?;

        Ok(Self { phrases, set })
    }

    /// The first configured phrase contained in `transcript`, if any.
    #[must_use]
    pub fn find<'a>(&'a self, transcript: &str) -> Option<&'a str> {
        self.set
            .matches(transcript)
            .iter()
            .next()
            .map(|idx| self.phrases[idx].as_str())
    }

    /// All configured phrases contained in `transcript`, in configured order.
    #[must_use]
    pub fn find_all(&self, transcript: &str) -> Vec<&str> {
        self.set
            .matches(transcript)
            .iter()
            .map(|idx| self.phrases[idx].as_str())
            .collect()
    }

    /// Whether `transcript` contains any configured phrase.
    #[must_use]
    pub fn is_match(&self, transcript: &str) -> bool {
        self.set.is_match(transcript)
    }

    /// The configured phrases.
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TriggerConfig;

    fn default_matcher() -> KeywordMatcher {
        KeywordMatcher::new(&TriggerConfig::default().keywords).unwrap()
    }

    #[test]
    fn test_case_insensitive_substring() {
        let matcher = default_matcher();
        let found = matcher.find_all("I need HELP now");
        assert!(found.contains(&"help"));
        assert!(found.contains(&"i need help"));
    }

    #[test]
    fn test_no_match() {
        let matcher = default_matcher();
        assert!(matcher.find("call me later").is_none());
        assert!(!matcher.is_match("call me later"));
    }

    #[test]
    fn test_find_returns_first_configured_phrase() {
        let matcher = default_matcher();
        assert_eq!(matcher.find("this is an emergency please"), Some("emergency"));
        // "help me" is configured before "help"
        assert_eq!(matcher.find("somebody help me"), Some("help me"));
    }

    #[test]
    fn test_substring_inside_words() {
        let matcher = default_matcher();
        // "screaming" contains "scream"
        assert_eq!(matcher.find("people SCREAMING outside"), Some("scream"));
    }

    #[test]
    fn test_phrases_are_literal() {
        let matcher = KeywordMatcher::new(&["s.o.s", "code (red)"]).unwrap();
        assert!(matcher.is_match("send S.O.S now"));
        assert!(!matcher.is_match("sxoxs"));
        assert!(matcher.is_match("we have a CODE (RED)"));
    }

    #[test]
    fn test_phrases_normalized() {
        let matcher = KeywordMatcher::new(&["  MayDay "]).unwrap();
        assert_eq!(matcher.phrases(), &["mayday".to_string()]);
        assert!(matcher.is_match("mayday mayday"));
    }
}
