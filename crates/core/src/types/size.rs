//! Garment size labels.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Size`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SizeError {
    #[error("size cannot be empty")]
    Empty,
    #[error("size must be at most {max} characters")]
    TooLong { max: usize },
    #[error("size may only contain letters and digits: {0}")]
    InvalidCharacter(String),
}

/// A size label such as `M`, `XL` or `42`.
///
/// Sizes come from the product catalog rather than a closed set, so this is
/// an uppercase alphanumeric label. Cart lines are keyed by product and size.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Size(String);

impl Size {
    pub const MAX_LENGTH: usize = 8;

    /// Parse a size label, uppercasing it.
    ///
    /// # Errors
    ///
    /// Returns [`SizeError`] for blank, overlong or non-alphanumeric labels.
    pub fn parse(s: &str) -> Result<Self, SizeError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SizeError::Empty);
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(SizeError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SizeError::InvalidCharacter(s.to_owned()));
        }
        Ok(Self(s.to_ascii_uppercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Medium, the size used when the shopper did not pick one.
impl Default for Size {
    fn default() -> Self {
        Self("M".to_owned())
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Size {
    type Err = SizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Size {
    type Error = SizeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Size> for String {
    fn from(size: Size) -> Self {
        size.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uppercases() {
        assert_eq!(Size::parse(" xl ").map(|s| s.to_string()), Ok("XL".to_owned()));
        assert_eq!(Size::parse("42").map(|s| s.to_string()), Ok("42".to_owned()));
    }

    #[test]
    fn test_parse_rejects() {
        assert_eq!(Size::parse(""), Err(SizeError::Empty));
        assert!(matches!(Size::parse("XXXXXXXXXL"), Err(SizeError::TooLong { .. })));
        assert!(matches!(Size::parse("X-L"), Err(SizeError::InvalidCharacter(_))));
    }

    #[test]
    fn test_default_is_medium() {
        assert_eq!(Size::default().as_str(), "M");
    }
}
