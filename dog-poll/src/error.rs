use thiserror::Error;

/// Result type for poll operations
pub type PollResult<T> = Result<T, PollError>;

/// Errors raised by the polling infrastructure.
///
/// None of these ever reach the delegate: the delegate only learns whether a
/// result arrived. They surface from `start`, `restore`, builder and
/// collaborator calls so hosts can log or react to local failures.
#[derive(Error, Debug)]
pub enum PollError {
    #[error("Failed to stage payload: {source}")]
    Staging {
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Attaching requires an existing session id")]
    MissingSession,

    #[error("Invalid config value for {key}: {value}")]
    InvalidConfig { key: String, value: String },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl PollError {
    /// Create a staging error from an I/O failure
    pub fn staging(source: std::io::Error) -> Self {
        Self::Staging { source }
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create an invalid config error
    pub fn invalid_config<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_error_keeps_source() {
        let err = PollError::staging(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        ));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_invalid_config_message() {
        let err = PollError::invalid_config("ATTEMPTS", "ten");
        assert_eq!(err.to_string(), "Invalid config value for ATTEMPTS: ten");
    }
}
