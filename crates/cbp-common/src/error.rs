//! Error types shared across the workspace

use std::error::Error as StdError;
use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised by shared infrastructure (configuration, logging, I/O)
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl CommonError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a logging error
    pub fn logging(msg: impl Into<String>) -> Self {
        Self::Logging(msg.into())
    }
}

/// Follow `source()` links down to the innermost error.
pub fn root_cause<'a>(err: &'a (dyn StdError + 'static)) -> &'a (dyn StdError + 'static) {
    let mut current = err;
    while let Some(next) = current.source() {
        current = next;
    }
    current
}

/// Display text of the innermost error in the chain.
///
/// Wrapper messages are dropped; callers that surface failures to people
/// want the cause that actually explains what went wrong.
pub fn root_cause_message(err: &(dyn StdError + 'static)) -> String {
    root_cause(err).to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[derive(Error, Debug)]
    #[error("outer wrapper")]
    struct Outer {
        #[source]
        inner: Middle,
    }

    #[derive(Error, Debug)]
    #[error("middle wrapper")]
    struct Middle {
        #[source]
        inner: std::io::Error,
    }

    #[test]
    fn test_root_cause_walks_to_innermost() {
        let err = Outer {
            inner: Middle {
                inner: std::io::Error::new(std::io::ErrorKind::Other, "disk unplugged"),
            },
        };

        assert_eq!(root_cause_message(&err), "disk unplugged");
    }

    #[test]
    fn test_root_cause_of_leaf_is_itself() {
        let err = CommonError::config("chunk size must be positive");
        assert_eq!(
            root_cause_message(&err),
            "Configuration error: chunk size must be positive"
        );
    }
}
