use std::io;

use thiserror::Error;

/// Errors from setting up collections and their background sweeper.
///
/// Refused references, refused locks and skipped members are not errors:
/// they are reported as `false` or as a null [`SafePtr`](crate::SafePtr).
///
#[derive(Debug, Error)]
pub enum SafeError {
    #[error("{name} must be greater than zero")]
    ZeroInterval { name: &'static str },

    #[error("automatic deletion is already running for this collection")]
    AutoDeleteActive,

    #[error("failed to spawn the reclamation sweeper thread")]
    SpawnSweeper(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_error_messages() {
        let error = SafeError::ZeroInterval {
            name: "sweep_interval",
        };
        assert_eq!(error.to_string(), "sweep_interval must be greater than zero");

        let error = SafeError::SpawnSweeper(io::Error::other("no threads"));
        assert!(error.source().is_some());
    }
}
