// ABOUTME: Monotonically increasing numeric build identifier.
// ABOUTME: Parsed from the CLI or the BUILD_NUMBER environment variable.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseBuildTagError {
    #[error("build number cannot be empty")]
    Empty,

    #[error("invalid build number: {0}")]
    NotANumber(String),

    #[error("build number must be greater than zero")]
    Zero,
}

/// The per-run image tag: a bare build number handed down by the CI
/// orchestrator. Each successful run also moves the floating `latest`
/// alias to the image carrying this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuildTag(u64);

impl BuildTag {
    pub fn new(number: u64) -> Result<Self, ParseBuildTagError> {
        if number == 0 {
            return Err(ParseBuildTagError::Zero);
        }
        Ok(Self(number))
    }

    pub fn number(&self) -> u64 {
        self.0
    }
}

impl FromStr for BuildTag {
    type Err = ParseBuildTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseBuildTagError::Empty);
        }
        let number = s
            .parse::<u64>()
            .map_err(|_| ParseBuildTagError::NotANumber(s.to_string()))?;
        Self::new(number)
    }
}

impl fmt::Display for BuildTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
