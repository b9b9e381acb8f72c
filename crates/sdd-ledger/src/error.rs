//! Error types for the ledger store

use std::fmt;

/// Ledger errors
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed event; nothing was written
    #[error("invalid ledger event: {0}")]
    Validation(String),

    /// Durable write failed; the event was not recorded
    #[error("ledger write failed: {0}")]
    Storage(String),

    /// Store is in safe mode after corruption or a failed write
    #[error("ledger is read-only: {0}")]
    ReadOnly(Diagnostic),

    /// Hash chain or version sequence is broken
    #[error("ledger integrity violation at version {version}")]
    IntegrityViolation { version: u64 },

    /// Ledger file could not be opened or read
    #[error("ledger io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Storage failures and safe mode end all writes until repaired
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::ReadOnly(_) | Self::IntegrityViolation { .. }
        )
    }
}

/// Why the store refuses writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based line in the ledger file, when the problem is tied to one
    pub line: Option<usize>,
    /// Human-readable description
    pub reason: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(line: Option<usize>, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_display() {
        assert_eq!(Diagnostic::new(Some(3), "bad json").to_string(), "line 3: bad json");
        assert_eq!(Diagnostic::new(None, "disk full").to_string(), "disk full");
    }

    #[test]
    fn fatal_classification() {
        assert!(LedgerError::Storage("x".into()).is_fatal());
        assert!(LedgerError::ReadOnly(Diagnostic::new(None, "x")).is_fatal());
        assert!(!LedgerError::Validation("x".into()).is_fatal());
    }
}
