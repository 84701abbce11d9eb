//! Error types for the map viewer.

use thiserror::Error;

/// Result type alias using MapError.
pub type MapResult<T> = Result<T, MapError>;

/// Primary error type for map rendering and caching.
///
/// `Clone` so that one failed render can be reported to every waiting caller.
#[derive(Debug, Clone, Error)]
pub enum MapError {
    // === Grid Errors ===
    #[error("Cell ({x}, {y}) is outside the {x_size}x{y_size} grid")]
    InvalidCellAccess {
        x: i64,
        y: i64,
        x_size: usize,
        y_size: usize,
    },

    // === Request Errors ===
    #[error("Unknown visualization: {0}")]
    UnknownVisualization(String),

    #[error("Unknown palette: {0}")]
    UnknownPalette(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    // === Rendering Errors ===
    #[error("Rendering failed: {0}")]
    RenderFailure(String),

    // === Storage Errors ===
    #[error("Persistence failed: {0}")]
    PersistenceFailure(String),

    // === Startup Errors ===
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl MapError {
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    pub fn render_failure(msg: impl Into<String>) -> Self {
        Self::RenderFailure(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::ConfigurationError(msg.into())
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            MapError::InvalidParameter { .. } | MapError::InvalidCellAccess { .. } => 400,

            MapError::UnknownVisualization(_) | MapError::UnknownPalette(_) => 404,

            _ => 500,
        }
    }
}

impl From<std::io::Error> for MapError {
    fn from(err: std::io::Error) -> Self {
        MapError::InternalError(err.to_string())
    }
}

impl From<serde_json::Error> for MapError {
    fn from(err: serde_json::Error) -> Self {
        MapError::InternalError(format!("JSON error: {}", err))
    }
}

impl From<image::ImageError> for MapError {
    fn from(err: image::ImageError) -> Self {
        MapError::RenderFailure(format!("image error: {}", err))
    }
}
