//! Error types for the controller.

use std::io;
use std::path::PathBuf;

use firewatch_types::Feed;
use thiserror::Error;

/// Configuration problems. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Both feeds were configured on the same port.
    #[error("thermal and imagery ports must differ (both are {0})")]
    DuplicatePorts(u16),

    /// A parameter is outside its accepted range.
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// The config file or environment could not be read.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors surfaced while assembling or running the controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A feed listener could not bind. The controller keeps running without it.
    #[error("{feed} listener failed to bind {addr}: {source}")]
    Bind {
        feed: Feed,
        addr: String,
        #[source]
        source: io::Error,
    },

    /// A log sink could not be opened.
    #[error("failed to open log {}: {source}", path.display())]
    Sink {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors raised while handling one inbound message.
///
/// These never escape the per-message boundary: the trigger is logged and
/// skipped, and the next message is processed normally.
#[derive(Debug, Error)]
pub enum FusionError {
    /// A recognised field carried the wrong JSON type.
    #[error("malformed {feed} message: {source}")]
    Decode {
        feed: Feed,
        #[source]
        source: serde_json::Error,
    },

    /// A log sink rejected the write.
    #[error("failed to write fusion record: {0}")]
    Sink(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_problem() {
        let err = ConfigError::DuplicatePorts(5001);
        assert_eq!(err.to_string(), "thermal and imagery ports must differ (both are 5001)");

        let err = ControllerError::Bind {
            feed: Feed::Imagery,
            addr: "0.0.0.0:5002".to_string(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().starts_with("imagery listener failed to bind 0.0.0.0:5002"));
    }

    #[test]
    fn decode_error_names_the_feed() {
        let source = serde_json::from_str::<u8>("\"x\"").unwrap_err();
        let err = FusionError::Decode {
            feed: Feed::Thermal,
            source,
        };
        assert!(err.to_string().starts_with("malformed thermal message"));
    }
}
