use indexmap::IndexMap;

use crate::error::{DisplayError, Result};
use crate::render::cache::bitmaps::BitmapId;
use crate::render::cache::{Slab, SlotKey};
use crate::render::device::{ProgramId, UniformId};
use crate::render::shader::ShaderPhase;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderId(pub(crate) SlotKey);

impl ShaderId {
    pub fn to_raw(self) -> u64 {
        self.0.to_raw()
    }

    pub fn from_raw(raw: u64) -> Option<Self> {
        SlotKey::from_raw(raw).map(Self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Float,
    Vector,
    Texture,
}

/// Declared shader input. `array_size` of 0 means a scalar uniform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderParam {
    pub name: String,
    pub kind: ParamKind,
    pub array_size: usize,
}

impl ShaderParam {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self { name: name.into(), kind, array_size: 0 }
    }

    pub fn array(name: impl Into<String>, kind: ParamKind, size: usize) -> Self {
        Self { name: name.into(), kind, array_size: size }
    }
}

/// Resolved parameter address, as returned by `Display::parameter_id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamId {
    /// Index into the shader's texture slots.
    Texture(usize),
    Uniform(UniformId),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vector([f32; 3]),
}

/// A sampler parameter plus the clip-box corner uniforms that come with it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureSlot {
    pub sampler: UniformId,
    pub left: Option<UniformId>,
    pub top: Option<UniformId>,
    pub right: Option<UniformId>,
    pub bottom: Option<UniformId>,
    pub bitmap: Option<BitmapId>,
}

#[derive(Debug)]
pub struct Shader {
    pub program: ProgramId,
    pub projection: Option<UniformId>,
    pub texture: Option<UniformId>,
    pub texture_slots: Vec<TextureSlot>,
    /// Last value set per uniform, re-uploaded each time the shader runs.
    pub values: IndexMap<UniformId, UniformValue>,
    pub use_custom_param: bool,
    pub phase: ShaderPhase,
}

impl Shader {
    pub fn new(program: ProgramId, use_custom_param: bool) -> Self {
        Self {
            program,
            projection: None,
            texture: None,
            texture_slots: Vec::new(),
            values: IndexMap::new(),
            use_custom_param,
            phase: ShaderPhase::Inactive,
        }
    }

    /// Drops per-activation texture bindings; slot allocations stay valid.
    pub fn clear_texture_bindings(&mut self) {
        for slot in &mut self.texture_slots {
            slot.bitmap = None;
        }
    }

    pub fn references(&self, bitmap: BitmapId) -> bool {
        self.texture_slots.iter().any(|slot| slot.bitmap == Some(bitmap))
    }
}

#[derive(Default)]
pub struct ShaderStore {
    slab: Slab<Shader>,
}

impl ShaderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, shader: Shader) -> ShaderId {
        ShaderId(self.slab.insert(shader))
    }

    pub fn get(&self, id: ShaderId) -> Result<&Shader> {
        self.slab.get(id.0).ok_or(DisplayError::InvalidHandle)
    }

    pub fn get_mut(&mut self, id: ShaderId) -> Result<&mut Shader> {
        self.slab.get_mut(id.0).ok_or(DisplayError::InvalidHandle)
    }

    pub fn remove(&mut self, id: ShaderId) -> Result<Shader> {
        self.slab.remove(id.0).ok_or(DisplayError::InvalidHandle)
    }

    pub fn ids(&self) -> Vec<ShaderId> {
        self.slab.keys().map(ShaderId).collect()
    }

    pub fn len(&self) -> usize {
        self.slab.len()
    }
}
