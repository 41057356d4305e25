use crate::error::LockError;

/// Which locker family a lease belongs to. Dispatch between the two
/// locker groups is a tagged match on this enum, not virtual dispatch —
/// there are exactly two concrete implementations and neither needs to
/// be swapped at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Key,
    Path,
}

impl LockMode {
    /// Parses the wire-level mode string, case-insensitively.
    pub fn parse(raw: &str) -> Result<Self, LockError> {
        match raw.to_ascii_lowercase().as_str() {
            "key" => Ok(LockMode::Key),
            "path" => Ok(LockMode::Path),
            _ => Err(LockError::InvalidMode(raw.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LockMode::Key => "key",
            LockMode::Path => "path",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(LockMode::parse("KEY"), Ok(LockMode::Key));
        assert_eq!(LockMode::parse("Path"), Ok(LockMode::Path));
    }

    #[test]
    fn rejects_unknown_mode() {
        assert_eq!(
            LockMode::parse("lock"),
            Err(LockError::InvalidMode("lock".to_string()))
        );
    }
}
