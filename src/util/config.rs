use std::path::Path;

use crate::error::{DisplayError, Result};

/// Default vertex capacity: 16384 quads. Also the ceiling, since quad indices are `u16`.
pub const DEFAULT_VERTEX_CAPACITY: usize = 4 * 16384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Gles,
    /// Headless recording device; no GPU context needed.
    Dummy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayConfig {
    pub smoothing: bool,
    pub depth_buffer: bool,
    pub vsync: bool,
    pub width: u32,
    pub height: u32,
    pub title: String,
    /// Rewrite `gl_TexCoord[0]` / `gl_Color` in user shader code.
    pub shader_compat: bool,
    pub vertex_capacity: usize,
    pub backend: Backend,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            smoothing: true,
            depth_buffer: false,
            vsync: true,
            width: 1024,
            height: 768,
            title: "display".to_string(),
            shader_compat: true,
            vertex_capacity: DEFAULT_VERTEX_CAPACITY,
            backend: if cfg!(feature = "gles") { Backend::Gles } else { Backend::Dummy },
        }
    }
}

impl DisplayConfig {
    /// Reads `path`; a missing or unreadable file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(text) => Self::from_str_lenient(&text),
            Err(err) => {
                log::info!("display config {:?} not read ({}), using defaults", path.as_ref(), err);
                Ok(Self::default())
            }
        }
    }

    /// Parses `key = value` lines. Unknown keys are skipped with a warning.
    pub fn from_str_lenient(text: &str) -> Result<Self> {
        let mut cfg = Self::default();

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.splitn(2, '=');
            let key = parts.next().unwrap_or("").trim().to_ascii_lowercase();
            let value = parts.next().unwrap_or("").trim();

            match key.as_str() {
                "smoothing" => cfg.smoothing = parse_bool(value),
                "depth_buffer" => cfg.depth_buffer = parse_bool(value),
                "vsync" => cfg.vsync = parse_bool(value),
                "shader_compat" => cfg.shader_compat = parse_bool(value),
                "width" => cfg.width = parse_num(&key, value)?,
                "height" => cfg.height = parse_num(&key, value)?,
                "title" => cfg.title = value.to_string(),
                "vertex_capacity" => {
                    let n: usize = parse_num(&key, value)?;
                    cfg.vertex_capacity = (n.min(DEFAULT_VERTEX_CAPACITY) / 4 * 4).max(4);
                }
                "backend" => {
                    cfg.backend = match value.to_ascii_lowercase().as_str() {
                        "gles" => Backend::Gles,
                        "dummy" | "headless" => Backend::Dummy,
                        other => {
                            return Err(DisplayError::InvalidConfig(format!("unknown backend `{other}`")))
                        }
                    }
                }
                _ => log::warn!("display config: ignoring unknown key `{}`", key),
            }
        }

        Ok(cfg)
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on" | "yes")
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| DisplayError::InvalidConfig(format!("`{key}` expects a number, got `{value}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keys_and_comments() {
        let cfg = DisplayConfig::from_str_lenient(
            "# display\nsmoothing = off\nVSYNC=yes\nwidth = 800\nheight=600\ntitle = My Game\nbackend = dummy\n",
        )
        .unwrap();
        assert!(!cfg.smoothing);
        assert!(cfg.vsync);
        assert_eq!((cfg.width, cfg.height), (800, 600));
        assert_eq!(cfg.title, "My Game");
        assert_eq!(cfg.backend, Backend::Dummy);
    }

    #[test]
    fn vertex_capacity_is_whole_quads() {
        let cfg = DisplayConfig::from_str_lenient("vertex_capacity = 10").unwrap();
        assert_eq!(cfg.vertex_capacity, 8);

        let cfg = DisplayConfig::from_str_lenient("vertex_capacity = 1").unwrap();
        assert_eq!(cfg.vertex_capacity, 4);

        let cfg = DisplayConfig::from_str_lenient("vertex_capacity = 1000000").unwrap();
        assert_eq!(cfg.vertex_capacity, DEFAULT_VERTEX_CAPACITY);
    }

    #[test]
    fn bad_number_is_rejected() {
        let err = DisplayConfig::from_str_lenient("width = wide").unwrap_err();
        assert!(matches!(err, DisplayError::InvalidConfig(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = DisplayConfig::load("/nonexistent/display.cfg").unwrap();
        assert_eq!(cfg, DisplayConfig::default());
    }
}
