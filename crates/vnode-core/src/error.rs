//! Error handling for vnode
//!
//! Provides the error taxonomy shared by the settings resolver, the mesh
//! generator, the runtime driver and the node provider.

use std::path::PathBuf;

/// Result type alias for vnode operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for vnode
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Node settings could not be resolved into an effective configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Workload namespace or name missing
    #[error("Invalid workload key: {0}")]
    InvalidKey(String),

    /// Workload not known to this node
    #[error("Not found: {0}")]
    NotFound(String),

    /// The container runtime exited non-zero
    #[error("Runtime failure running `{command}` ({status}):\n{output}")]
    RuntimeFailure {
        command: String,
        status: String,
        output: String,
    },

    /// A generated artifact could not be written
    #[error("Filesystem failure at {}: {source}", path.display())]
    FilesystemFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An external call did not finish before its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a configuration error for a settings field holding a bad quantity
    pub fn invalid_quantity(field: &str, value: &str) -> Self {
        Self::InvalidConfiguration(format!("invalid {} value {:?}", field, value))
    }

    /// Create an invalid key error
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a runtime failure from a finished command
    pub fn runtime_failure(
        command: impl Into<String>,
        status: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self::RuntimeFailure {
            command: command.into(),
            status: status.into(),
            output: output.into(),
        }
    }

    /// Create a filesystem failure for the given path
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FilesystemFailure {
            path: path.into(),
            source,
        }
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Check if this error indicates a client-side problem
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidConfiguration(_) | Error::InvalidKey(_) | Error::NotFound(_)
        )
    }

    /// Get the error category for logging and API responses
    pub fn category(&self) -> &'static str {
        match self {
            Error::InvalidConfiguration(_) => "invalid_configuration",
            Error::InvalidKey(_) => "invalid_key",
            Error::NotFound(_) => "not_found",
            Error::RuntimeFailure { .. } => "runtime_failure",
            Error::FilesystemFailure { .. } => "filesystem_failure",
            Error::Timeout(_) => "timeout",
            Error::Json(_) => "json",
        }
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> u16 {
        match self {
            Error::InvalidConfiguration(_) | Error::InvalidKey(_) | Error::Json(_) => 400,
            Error::NotFound(_) => 404,
            Error::RuntimeFailure { .. } => 502,
            Error::Timeout(_) => 504,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_quantity_names_field_and_value() {
        let err = Error::invalid_quantity("cpu", "not-a-quantity");
        assert!(matches!(err, Error::InvalidConfiguration(_)));
        let msg = err.to_string();
        assert!(msg.contains("cpu"));
        assert!(msg.contains("not-a-quantity"));
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::invalid_key("x").category(), "invalid_key");
        assert_eq!(Error::not_found("x").category(), "not_found");
        assert_eq!(
            Error::runtime_failure("docker run", "exit status: 125", "boom").category(),
            "runtime_failure"
        );
        let json = serde_json::from_str::<u32>("nope").unwrap_err();
        assert_eq!(Error::from(json).category(), "json");
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::not_found("pod").is_client_error());
        assert!(Error::invalid_key("pod").is_client_error());
        assert!(!Error::timeout("docker rm").is_client_error());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(Error::invalid_key("test").to_http_status(), 400);
        assert_eq!(Error::not_found("test").to_http_status(), 404);
        assert_eq!(Error::runtime_failure("c", "s", "o").to_http_status(), 502);
        assert_eq!(Error::timeout("test").to_http_status(), 504);
        let io = std::io::Error::other("disk full");
        assert_eq!(Error::filesystem("/tmp/x", io).to_http_status(), 500);
    }

    #[test]
    fn test_runtime_failure_carries_output() {
        let err = Error::runtime_failure(
            "/usr/bin/docker run",
            "exit status: 125",
            "docker: Error response from daemon",
        );
        let msg = err.to_string();
        assert!(msg.contains("exit status: 125"));
        assert!(msg.contains("Error response from daemon"));
    }

    #[test]
    fn test_filesystem_failure_mentions_path() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::filesystem("/tmp/nodemain/vk-main.conf", io);
        assert!(err.to_string().contains("/tmp/nodemain/vk-main.conf"));
        assert_eq!(err.category(), "filesystem_failure");
    }
}
