//! Client identifier parsing.
//!
//! The identifier is the trailing segment of the upgrade path. It ends up
//! inside a backend host name, so only ASCII letters and digits are accepted.

use std::fmt;

use thiserror::Error;

/// Longest identifier that still fits a single DNS label.
pub const DNS_LABEL_MAX: usize = 63;

/// Reasons an identifier is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier is {len} characters long, maximum is {max}")]
    TooLong { len: usize, max: usize },

    #[error("identifier contains disallowed character {ch:?} at position {position}")]
    InvalidCharacter { ch: char, position: usize },
}

/// A validated client identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Validate `raw` against the allowed character set and `max_len`.
    pub fn parse(raw: &str, max_len: usize) -> Result<Self, IdentifierError> {
        if raw.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if let Some((position, ch)) = raw.char_indices().find(|(_, c)| !c.is_ascii_alphanumeric()) {
            return Err(IdentifierError::InvalidCharacter { ch, position });
        }
        // All characters are ASCII at this point, so bytes == chars.
        if raw.len() > max_len {
            return Err(IdentifierError::TooLong {
                len: raw.len(),
                max: max_len,
            });
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_alphanumeric() {
        assert_eq!(ClientId::parse("388", 32).unwrap().as_str(), "388");
        assert_eq!(ClientId::parse("Ext42b", 32).unwrap().as_str(), "Ext42b");
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(ClientId::parse("", 32), Err(IdentifierError::Empty));
    }

    #[test]
    fn rejects_disallowed_characters() {
        for raw in ["38-8", "../etc", "a.b", "x y", "evil.com:443", "é1"] {
            assert!(
                matches!(ClientId::parse(raw, 32), Err(IdentifierError::InvalidCharacter { .. })),
                "{raw} should be rejected"
            );
        }
        assert_eq!(
            ClientId::parse("ab@c", 32),
            Err(IdentifierError::InvalidCharacter { ch: '@', position: 2 })
        );
    }

    #[test]
    fn rejects_too_long() {
        let raw = "9".repeat(33);
        assert_eq!(
            ClientId::parse(&raw, 32),
            Err(IdentifierError::TooLong { len: 33, max: 32 })
        );
        assert!(ClientId::parse(&raw[..32], 32).is_ok());
    }
}
