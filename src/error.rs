use thiserror::Error;

/// Errors surfaced by the display backend.
///
/// A failed call never leaves partially applied render state behind.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DisplayError {
    /// No display yet, or the bitmap is still being decoded.
    #[error("display or bitmap is not ready")]
    NotReady,

    #[error("stale or unknown handle")]
    InvalidHandle,

    #[error("operation not allowed on the screen bitmap")]
    ScreenNotAllowed,

    #[error("destination list is empty")]
    NoDestination,

    /// Multi-target sets must share one size and cannot mix screen and textures.
    #[error("destination bitmaps are incompatible: {0}")]
    DestinationMismatch(String),

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("invalid mesh: {0}")]
    InvalidMesh(&'static str),

    #[error("invalid transform: {0}")]
    InvalidTransform(&'static str),

    /// Null pointer or out-of-range value at the C boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("no texture unit left for shader parameter")]
    TextureUnitsExhausted,

    #[error("unknown shader parameter `{0}`")]
    UnknownParameter(String),

    #[error("shader compilation failed: {0}")]
    ShaderCompile(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, DisplayError>;
