//! Common error types for rootmount.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`RootmountError`].
pub type RootmountResult<T> = Result<T, RootmountError>;

/// Common errors across rootmount.
#[derive(Error, Diagnostic, Debug)]
pub enum RootmountError {
    /// A partition failed root-filesystem qualification.
    #[error("{device} is not a usable root filesystem: {reason}")]
    #[diagnostic(code(rootmount::validation))]
    Validation {
        /// The partition device.
        device: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A mount, swap or crypt activation failed.
    #[error("Activation of {device} failed: {message}")]
    #[diagnostic(code(rootmount::activation))]
    Activation {
        /// The device being activated.
        device: String,
        /// The underlying failure.
        message: String,
    },

    /// The target system's mount tables are missing or inconsistent.
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(rootmount::config),
        help("Check /etc/fstab on the selected root partition")
    )]
    Config {
        /// The error message.
        message: String,
    },

    /// The operator cancelled the operation.
    #[error("Cancelled by operator: {operation}")]
    #[diagnostic(code(rootmount::cancelled))]
    Cancelled {
        /// What was cancelled.
        operation: String,
    },

    /// An external command could not be run.
    #[error("Command `{command}` failed: {message}")]
    #[diagnostic(
        code(rootmount::command),
        help("Make sure the tool is installed and you are running as root")
    )]
    Command {
        /// The command line.
        command: String,
        /// The failure description.
        message: String,
    },

    /// No root partition was selected or found.
    #[error("Root partition not found: {device}")]
    #[diagnostic(code(rootmount::root::not_found))]
    RootNotFound {
        /// The requested device, or a description.
        device: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(rootmount::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(rootmount::serialization))]
    Serialization(String),
}

impl RootmountError {
    /// Shorthand for an activation failure.
    pub fn activation(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Activation {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a configuration failure.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for RootmountError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for RootmountError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = RootmountError::activation("/dev/sda3", "wrong fs type");
        assert_eq!(
            err.to_string(),
            "Activation of /dev/sda3 failed: wrong fs type"
        );
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RootmountError = io_err.into();
        assert!(matches!(err, RootmountError::Io(_)));
    }

    #[test]
    fn error_from_toml() {
        let err: RootmountError = toml::from_str::<toml::Table>("= broken")
            .unwrap_err()
            .into();
        assert!(matches!(err, RootmountError::Serialization(_)));
    }
}
