use std::fmt;

use crate::error::UsageError;

/// Validated identity of a monitored session.
///
/// Used as a directory name under the state directory, so only ASCII
/// alphanumerics, `-` and `_` are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: &str) -> Result<Self, UsageError> {
        if id.is_empty() {
            return Err(UsageError::InvalidSessionId {
                id: id.to_string(),
                reason: "must not be empty",
            });
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(UsageError::InvalidSessionId {
                id: id.to_string(),
                reason: "only alphanumeric, '-', and '_' characters are allowed",
            });
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_path_traversal() {
        assert!(SessionId::new("../etc/passwd").is_err());
        assert!(SessionId::new("foo/../bar").is_err());
        assert!(SessionId::new("/etc/passwd").is_err());
        assert!(SessionId::new("foo\\bar").is_err());
        assert!(SessionId::new("foo.bar").is_err());
        assert!(SessionId::new("foo bar").is_err());
        assert!(SessionId::new("").is_err());
    }

    #[test]
    fn test_accepts_valid_ids() {
        assert!(SessionId::new("task123").is_ok());
        assert!(SessionId::new("fix-login_flow").is_ok());
        assert!(SessionId::new("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert_eq!("abc".parse::<SessionId>().unwrap().as_str(), "abc");
    }
}
