use regex::Regex;

use crate::error::{DevstackError, Result};
use crate::models::MatchRule;

/// Decides whether one line of process output carries a signal.
///
/// The supervisor only sees this trait, so the matching strategy can change
/// without touching its state machine.
pub trait LinePredicate: Send + Sync {
    fn matches(&self, line: &str) -> bool;

    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub enum LineMatcher {
    Contains(String),
    Regex(Regex),
}

impl LineMatcher {
    pub fn compile(rule: &MatchRule) -> Result<Self> {
        match (&rule.contains, &rule.regex) {
            (Some(text), None) => Ok(Self::Contains(text.clone())),
            (None, Some(pattern)) => Regex::new(pattern)
                .map(Self::Regex)
                .map_err(|e| DevstackError::InvalidConfig(format!("bad pattern '{pattern}': {e}"))),
            (Some(_), Some(_)) => Err(DevstackError::InvalidConfig(
                "a match rule takes either `contains` or `regex`, not both".into(),
            )),
            (None, None) => Err(DevstackError::InvalidConfig(
                "a match rule needs `contains` or `regex`".into(),
            )),
        }
    }
}

impl LinePredicate for LineMatcher {
    fn matches(&self, line: &str) -> bool {
        match self {
            Self::Contains(text) => line.contains(text.as_str()),
            Self::Regex(re) => re.is_match(line),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Contains(text) => format!("contains {text:?}"),
            Self::Regex(re) => format!("regex /{}/", re.as_str()),
        }
    }
}
