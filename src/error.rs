//! Error types for scene-runtime.
//!
//! Errors carry a stable code so callers (and the elements driving them) can
//! react programmatically. A guard dropping a call is *not* an error; that is
//! reported as `None` by the guard itself.

use thiserror::Error;

/// Result type alias for scene-runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// scene-runtime error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Script text could not be compiled. Raised before anything runs.
    #[error("Script compile error: {0}")]
    ScriptCompile(String),

    /// Script failed while running.
    #[error("Script runtime error: {0}")]
    ScriptRuntime(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the error code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            Error::ScriptCompile(_) => "SCRIPT_COMPILE_ERROR",
            Error::ScriptRuntime(_) => "SCRIPT_RUNTIME_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Toml(_) => "TOML_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// Get a sanitized error message safe for external consumers.
    ///
    /// Script errors are user-facing and keep their message. Internal and
    /// I/O errors hide file paths and other details.
    pub fn external_message(&self) -> String {
        match self {
            Error::ScriptCompile(msg) => format!("Script compile error: {}", msg),
            Error::ScriptRuntime(msg) => format!("Script runtime error: {}", msg),
            Error::Config(msg) => format!("Configuration error: {}", msg),

            Error::Internal(_) => "An internal error occurred".to_string(),
            Error::Io(_) => "An I/O error occurred".to_string(),

            Error::Json(_) => "Invalid JSON format".to_string(),
            Error::Toml(_) => "Invalid TOML format".to_string(),
        }
    }

    /// Whether the error happened before any script code ran.
    pub fn is_compile_error(&self) -> bool {
        matches!(self, Error::ScriptCompile(_))
    }

    /// Convert to a JSON response with the sanitized message.
    pub fn to_external_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": self.external_message(),
            }
        })
    }

    /// Convert to a JSON response (includes full error details).
    ///
    /// **Warning**: only use this for local/debug output.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        })
    }
}
