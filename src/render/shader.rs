//! Shader activation bookkeeping and GLSL ES source assembly.
//!
//! A shader moves `Inactive -> Active -> PendingRemoval -> Inactive`. A stop
//! that arrives while geometry is queued only marks the shader; it still runs
//! against that geometry and leaves the active list after the next flush.

use std::fmt::Write as _;

use indexmap::IndexSet;

use crate::error::{DisplayError, Result};
use crate::render::cache::bitmaps::BitmapId;
use crate::render::cache::shaders::{ParamId, ParamKind, Shader, ShaderId, ShaderParam, TextureSlot, UniformValue};
use crate::render::device::GpuDevice;
use crate::render::Display;

pub const UNIFORM_PROJECTION: &str = "_mProjection_";
pub const UNIFORM_TEXTURE: &str = "_Texture_";

pub const SUFFIX_TOP: &str = "_top";
pub const SUFFIX_LEFT: &str = "_left";
pub const SUFFIX_BOTTOM: &str = "_bottom";
pub const SUFFIX_RIGHT: &str = "_right";

pub const VERTEX_SHADER: &str = "\
attribute vec2 _vPosition_;
attribute mediump vec2 _vTexCoord_;
attribute mediump vec4 _vColor_;
uniform mat4 _mProjection_;
varying mediump vec2 _gl_TexCoord0_;
varying mediump vec4 _Color0_;
void main()
{
  _gl_TexCoord0_ = _vTexCoord_;
  _Color0_ = _vColor_;
  gl_Position = _mProjection_ * vec4(_vPosition_.xy, 0.0, 1.0);
}
";

const FRAGMENT_PREAMBLE: &str = "\
precision mediump float;
varying vec2 _gl_TexCoord0_;
varying vec4 _Color0_;
uniform sampler2D _Texture_;
";

pub const DEFAULT_FRAGMENT_BODY: &str = "\
void main()
{
  gl_FragColor = _Color0_ * texture2D(_Texture_, _gl_TexCoord0_);
}
";

pub const NO_TEXTURE_FRAGMENT_BODY: &str = "\
void main()
{
  gl_FragColor = _Color0_;
}
";

/// Builds a complete fragment shader from user code and its declared params.
///
/// With `compat`, the legacy `gl_TexCoord[0]` and `gl_Color` names are mapped
/// onto the varyings the vertex stage writes.
pub fn fragment_source(code: &str, params: &[ShaderParam], compat: bool) -> String {
    let mut src = String::from(FRAGMENT_PREAMBLE);

    for param in params {
        let array = if param.array_size > 0 { format!("[{}]", param.array_size) } else { String::new() };
        match param.kind {
            ParamKind::Float => {
                let _ = writeln!(src, "uniform float {}{};", param.name, array);
            }
            ParamKind::Vector => {
                let _ = writeln!(src, "uniform vec3 {}{};", param.name, array);
            }
            ParamKind::Texture => {
                let _ = writeln!(src, "uniform sampler2D {}{};", param.name, array);
                for suffix in [SUFFIX_TOP, SUFFIX_LEFT, SUFFIX_BOTTOM, SUFFIX_RIGHT] {
                    let _ = writeln!(src, "uniform float {}{}{};", param.name, suffix, array);
                }
            }
        }
    }

    if compat {
        src.push_str(&code.replace("gl_TexCoord[0]", "_gl_TexCoord0_").replace("gl_Color", "_Color0_"));
    } else {
        src.push_str(code);
    }
    src
}

/// `name` or `name[index]`.
pub fn uniform_name(name: &str, suffix: &str, index: Option<usize>) -> String {
    match index {
        Some(i) => format!("{name}{suffix}[{i}]"),
        None => format!("{name}{suffix}"),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ShaderPhase {
    #[default]
    Inactive,
    Active,
    /// Still in the active list; removed right after the next flush.
    PendingRemoval,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartTransition {
    /// Pending removal is cancelled; the queued batch keeps going.
    Resume,
    /// Flush, then join the active list.
    Activate,
    AlreadyActive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopTransition {
    Ignore,
    /// Nothing is queued, so the shader can leave right away.
    RemoveNow,
    FlushThenRemove,
    Defer,
}

pub fn start_transition(phase: ShaderPhase, use_custom_param: bool) -> StartTransition {
    match phase {
        ShaderPhase::PendingRemoval if !use_custom_param => StartTransition::Resume,
        ShaderPhase::Active if !use_custom_param => StartTransition::AlreadyActive,
        _ => StartTransition::Activate,
    }
}

pub fn stop_transition(phase: ShaderPhase, use_custom_param: bool, batch_empty: bool) -> StopTransition {
    match phase {
        ShaderPhase::Inactive | ShaderPhase::PendingRemoval => StopTransition::Ignore,
        ShaderPhase::Active if batch_empty => StopTransition::RemoveNow,
        ShaderPhase::Active if use_custom_param => StopTransition::FlushThenRemove,
        ShaderPhase::Active => StopTransition::Defer,
    }
}

/// Ordered set of shaders that run against the next flush, in start order.
#[derive(Debug, Default)]
pub struct ActiveShaders {
    list: IndexSet<ShaderId>,
}

impl ActiveShaders {
    pub fn insert(&mut self, id: ShaderId) {
        self.list.insert(id);
    }

    pub fn remove(&mut self, id: ShaderId) -> bool {
        self.list.shift_remove(&id)
    }

    pub fn contains(&self, id: ShaderId) -> bool {
        self.list.contains(&id)
    }

    pub fn ids(&self) -> Vec<ShaderId> {
        self.list.iter().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl<D: GpuDevice> Display<D> {
    /// Compiles `code` with a generated preamble declaring `params`.
    ///
    /// On failure the full compiler diagnostic is logged and no shader is kept.
    pub fn create_shader(&mut self, code: &str, params: Vec<ShaderParam>, use_custom_param: bool) -> Result<ShaderId> {
        let fragment = fragment_source(code, &params, self.config.shader_compat);
        let program = match self.device.compile_program(VERTEX_SHADER, &fragment) {
            Ok(program) => program,
            Err(err) => {
                log::error!("{}\n--- fragment source ---\n{}", err, fragment);
                return Err(err);
            }
        };

        let mut shader = Shader::new(program, use_custom_param);
        shader.projection = self.device.uniform_location(program, UNIFORM_PROJECTION);
        shader.texture = self.device.uniform_location(program, UNIFORM_TEXTURE);
        Ok(self.shaders.insert(shader))
    }

    pub fn delete_shader(&mut self, id: ShaderId) -> Result<()> {
        self.shaders.get(id)?;
        if self.active.contains(id) {
            self.flush()?;
            self.deactivate(id)?;
        }
        let shader = self.shaders.remove(id)?;
        self.device.delete_program(shader.program);
        Ok(())
    }

    pub fn shader_phase(&self, id: ShaderId) -> Result<ShaderPhase> {
        self.shaders.get(id).map(|s| s.phase)
    }

    /// Shaders that will run against the next flush, in start order.
    pub fn active_shaders(&self) -> Vec<ShaderId> {
        self.active.ids()
    }

    pub fn start_shader(&mut self, id: ShaderId) -> Result<()> {
        let shader = self.shaders.get(id)?;
        match start_transition(shader.phase, shader.use_custom_param) {
            StartTransition::AlreadyActive => Ok(()),
            StartTransition::Resume => {
                self.shaders.get_mut(id)?.phase = ShaderPhase::Active;
                Ok(())
            }
            StartTransition::Activate => {
                self.flush()?;
                let shader = self.shaders.get_mut(id)?;
                shader.phase = ShaderPhase::Active;
                let (program, projection) = (shader.program, shader.projection);
                self.active.insert(id);
                self.device.use_program(program);
                if let Some(loc) = projection {
                    self.device.set_uniform_mat4(loc, &self.state.projection.0);
                }
                Ok(())
            }
        }
    }

    /// Stops `id`, or with `None` falls back to the default program when no shader is active.
    pub fn stop_shader(&mut self, id: Option<ShaderId>) -> Result<()> {
        let Some(id) = id else {
            if self.active.is_empty() {
                self.restore_default_program();
            }
            return Ok(());
        };

        let shader = self.shaders.get(id)?;
        match stop_transition(shader.phase, shader.use_custom_param, self.batch.is_empty()) {
            StopTransition::Ignore => Ok(()),
            StopTransition::RemoveNow => self.deactivate(id),
            StopTransition::FlushThenRemove => {
                self.flush()?;
                self.deactivate(id)
            }
            StopTransition::Defer => {
                self.shaders.get_mut(id)?.phase = ShaderPhase::PendingRemoval;
                Ok(())
            }
        }
    }

    fn deactivate(&mut self, id: ShaderId) -> Result<()> {
        let shader = self.shaders.get_mut(id)?;
        shader.phase = ShaderPhase::Inactive;
        shader.clear_texture_bindings();
        self.active.remove(id);
        if self.active.is_empty() {
            self.restore_default_program();
        }
        Ok(())
    }

    /// Resolves a parameter. Texture parameters take a texture slot, with one
    /// unit always left for the batch's own bitmap.
    pub fn parameter_id(&mut self, id: ShaderId, name: &str, index: Option<usize>, is_texture: bool) -> Result<ParamId> {
        let shader = self.shaders.get(id)?;
        let program = shader.program;
        let used_slots = shader.texture_slots.len();

        let Some(location) = self.device.uniform_location(program, &uniform_name(name, "", index)) else {
            log::warn!("shader parameter `{}` not found", uniform_name(name, "", index));
            return Err(DisplayError::UnknownParameter(name.to_string()));
        };
        if !is_texture {
            return Ok(ParamId::Uniform(location));
        }

        if let Some(slot) = shader.texture_slots.iter().position(|s| s.sampler == location) {
            return Ok(ParamId::Texture(slot));
        }
        if used_slots + 1 >= self.caps.texture_units {
            return Err(DisplayError::TextureUnitsExhausted);
        }

        let mut corner = |suffix: &str| self.device.uniform_location(program, &uniform_name(name, suffix, index));
        let slot = TextureSlot {
            sampler: location,
            left: corner(SUFFIX_LEFT),
            top: corner(SUFFIX_TOP),
            right: corner(SUFFIX_RIGHT),
            bottom: corner(SUFFIX_BOTTOM),
            bitmap: None,
        };
        let shader = self.shaders.get_mut(id)?;
        shader.texture_slots.push(slot);
        Ok(ParamId::Texture(shader.texture_slots.len() - 1))
    }

    /// Binds a bitmap to a texture parameter; `None` samples the screen.
    pub fn set_shader_bitmap(&mut self, id: ShaderId, param: ParamId, bitmap: Option<BitmapId>) -> Result<()> {
        let ParamId::Texture(slot) = param else {
            return Err(DisplayError::UnknownParameter(format!("{param:?} is not a texture")));
        };
        let bitmap = bitmap.unwrap_or_else(|| self.bitmaps.screen());
        self.bitmaps.get(bitmap)?;

        let shader = self.shaders.get(id)?;
        let current = shader.texture_slots.get(slot).ok_or(DisplayError::InvalidHandle)?.bitmap;
        if current != Some(bitmap) {
            self.flush_if_running(id)?;
        }
        if let Some(slot) = self.shaders.get_mut(id)?.texture_slots.get_mut(slot) {
            slot.bitmap = Some(bitmap);
        }
        Ok(())
    }

    pub fn set_shader_float(&mut self, id: ShaderId, param: ParamId, value: f32) -> Result<()> {
        self.set_uniform_value(id, param, UniformValue::Float(value))
    }

    pub fn set_shader_vector(&mut self, id: ShaderId, param: ParamId, value: [f32; 3]) -> Result<()> {
        self.set_uniform_value(id, param, UniformValue::Vector(value))
    }

    fn set_uniform_value(&mut self, id: ShaderId, param: ParamId, value: UniformValue) -> Result<()> {
        let ParamId::Uniform(location) = param else {
            return Err(DisplayError::UnknownParameter(format!("{param:?} is a texture")));
        };
        if self.shaders.get(id)?.values.get(&location) != Some(&value) {
            self.flush_if_running(id)?;
        }
        self.shaders.get_mut(id)?.values.insert(location, value);
        Ok(())
    }

    /// Queued geometry must see the old value of a shader that is already running.
    fn flush_if_running(&mut self, id: ShaderId) -> Result<()> {
        if self.active.contains(id) && !self.batch.is_empty() {
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_shader_resumes_without_flush() {
        assert_eq!(start_transition(ShaderPhase::PendingRemoval, false), StartTransition::Resume);
        assert_eq!(start_transition(ShaderPhase::PendingRemoval, true), StartTransition::Activate);
        assert_eq!(start_transition(ShaderPhase::Inactive, false), StartTransition::Activate);
        assert_eq!(start_transition(ShaderPhase::Active, false), StartTransition::AlreadyActive);
    }

    #[test]
    fn stop_defers_only_when_geometry_is_queued() {
        assert_eq!(stop_transition(ShaderPhase::Active, false, true), StopTransition::RemoveNow);
        assert_eq!(stop_transition(ShaderPhase::Active, false, false), StopTransition::Defer);
        assert_eq!(stop_transition(ShaderPhase::Active, true, false), StopTransition::FlushThenRemove);
        assert_eq!(stop_transition(ShaderPhase::Inactive, false, false), StopTransition::Ignore);
        assert_eq!(stop_transition(ShaderPhase::PendingRemoval, false, false), StopTransition::Ignore);
    }

    #[test]
    fn fragment_source_declares_params_and_rewrites_legacy_names() {
        let params = vec![
            ShaderParam::new("time", ParamKind::Float),
            ShaderParam::array("offsets", ParamKind::Vector, 3),
            ShaderParam::new("mask", ParamKind::Texture),
        ];
        let src = fragment_source(
            "void main() { gl_FragColor = gl_Color * texture2D(mask, gl_TexCoord[0].xy); }",
            &params,
            true,
        );
        assert!(src.starts_with("precision mediump float;"));
        assert!(src.contains("uniform float time;"));
        assert!(src.contains("uniform vec3 offsets[3];"));
        assert!(src.contains("uniform sampler2D mask;"));
        assert!(src.contains("uniform float mask_right;"));
        assert!(src.contains("_Color0_ * texture2D(mask, _gl_TexCoord0_.xy)"));
        assert!(!src.contains("gl_TexCoord[0]"));

        let raw = fragment_source("gl_Color", &[], false);
        assert!(raw.ends_with("gl_Color"));
    }

    #[test]
    fn array_uniform_names() {
        assert_eq!(uniform_name("tex", SUFFIX_TOP, None), "tex_top");
        assert_eq!(uniform_name("tex", "", Some(2)), "tex[2]");
    }
}
