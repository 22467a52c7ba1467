//! display_plugin (staticlib + rlib)
//!
//! Batched 2D sprite renderer for the engine's display plugin slot. The engine
//! links the C ABI in `ffi`; Rust callers use `render::Display` directly.
//!
//! Design rule: keep this file thin.

pub mod error;
mod ffi;
pub mod render;
pub mod util;

pub use error::{DisplayError, Result};
pub use render::Display;

// Export C ABI symbols.
pub use ffi::exports::*;
pub use ffi::types::{CGlyph, CMeshVertex, COrientedBox, CPoint, CShaderParam, CTransform, DisplayPlatform};
