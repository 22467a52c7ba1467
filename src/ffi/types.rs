use core::ffi::{c_char, c_void};

use crate::error::{DisplayError, Result};
use crate::render::cache::shaders::{ParamId, ParamKind, ShaderParam};
use crate::render::device::UniformId;
use crate::render::draw::{MeshVertex, OrientedBox};
use crate::render::frame::{BlendMode, CharacterMap, DisplayTransform, Glyph, Rgba, Smoothing};

/// Copy a C string into a Rust `String`.
pub fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // Safety: caller promises `ptr` is a valid NUL-terminated string.
    let s = unsafe { std::ffi::CStr::from_ptr(ptr) };
    Some(s.to_string_lossy().into_owned())
}

/// Write a Rust string into a C buffer (NUL-terminated).
/// Returns the number of bytes written (excluding the final NUL).
pub fn write_c_string(out: *mut c_char, cap: usize, s: &str) -> usize {
    if out.is_null() || cap == 0 {
        return 0;
    }
    let n = s.len().min(cap - 1);
    // Safety: caller provided writable memory for `cap` bytes.
    unsafe {
        core::ptr::copy_nonoverlapping(s.as_ptr(), out as *mut u8, n);
        *out.add(n) = 0;
    }
    n
}

/// Callbacks into the platform layer that owns the window and GL context.
///
/// Only read by the `gles` backend. Every callback receives `user_data`.
#[repr(C)]
pub struct DisplayPlatform {
    pub user_data: *mut c_void,
    pub get_proc_address: Option<unsafe extern "C" fn(*mut c_void, *const c_char) -> *const c_void>,
    pub swap_buffers: Option<unsafe extern "C" fn(*mut c_void) -> bool>,
    pub set_swap_interval: Option<unsafe extern "C" fn(*mut c_void, i32) -> bool>,
}

/// C layout of [`DisplayTransform`].
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CTransform {
    pub src_x: f32,
    pub src_y: f32,
    pub dst_x: f32,
    pub dst_y: f32,
    pub repeat_x: f32,
    pub repeat_y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub rotation: f32,
}

impl From<CTransform> for DisplayTransform {
    fn from(t: CTransform) -> Self {
        Self {
            src_x: t.src_x,
            src_y: t.src_y,
            dst_x: t.dst_x,
            dst_y: t.dst_y,
            repeat_x: t.repeat_x,
            repeat_y: t.repeat_y,
            scale_x: t.scale_x,
            scale_y: t.scale_y,
            rotation: t.rotation,
        }
    }
}

/// Borrow `count` items from C; null is only accepted for an empty list.
pub fn slice_arg<'a, T>(ptr: *const T, count: u32, what: &'static str) -> Result<&'a [T]> {
    if count == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(DisplayError::InvalidArgument(what));
    }
    // Safety: caller provides `count` readable items that outlive the call.
    Ok(unsafe { core::slice::from_raw_parts(ptr, count as usize) })
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CPoint {
    pub x: f32,
    pub y: f32,
}

/// Declared shader input. `kind`: 0 float, 1 vec3, 2 texture. `array_size` 0 means scalar.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CShaderParam {
    pub name: *const c_char,
    pub kind: i32,
    pub array_size: u32,
}

impl CShaderParam {
    pub fn to_param(&self) -> Result<ShaderParam> {
        let name = cstr_to_string(self.name).ok_or(DisplayError::InvalidArgument("shader parameter name"))?;
        let kind = match self.kind {
            0 => ParamKind::Float,
            1 => ParamKind::Vector,
            2 => ParamKind::Texture,
            _ => return Err(DisplayError::InvalidArgument("shader parameter kind")),
        };
        Ok(ShaderParam::array(name, kind, self.array_size as usize))
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CGlyph {
    pub codepoint: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
}

pub fn character_map(glyphs: &[CGlyph], character_height: f32) -> Result<CharacterMap> {
    let mut map = CharacterMap::new(character_height);
    for g in glyphs {
        let ch = char::from_u32(g.codepoint).ok_or(DisplayError::InvalidArgument("glyph codepoint"))?;
        map.glyphs.insert(ch, Glyph { x: g.x, y: g.y, width: g.width });
    }
    Ok(map)
}

/// `rgba` packs `r` in the low byte, as everywhere else at the C boundary.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CMeshVertex {
    pub x: f32,
    pub y: f32,
    pub u: f32,
    pub v: f32,
    pub rgba: u32,
}

impl From<CMeshVertex> for MeshVertex {
    fn from(v: CMeshVertex) -> Self {
        Self { x: v.x, y: v.y, u: v.u, v: v.v, color: Rgba::from_u32(v.rgba) }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct COrientedBox {
    pub position: CPoint,
    pub pivot: CPoint,
    pub x: CPoint,
    pub y: CPoint,
}

impl From<COrientedBox> for OrientedBox {
    fn from(b: COrientedBox) -> Self {
        Self {
            position: (b.position.x, b.position.y),
            pivot: (b.pivot.x, b.pivot.y),
            x: (b.x.x, b.x.y),
            y: (b.y.x, b.y.y),
        }
    }
}

const PARAM_TAG_UNIFORM: u64 = 1;
const PARAM_TAG_TEXTURE: u64 = 2;

/// Packs a parameter as `value | tag << 32`; never 0.
pub fn param_to_raw(param: ParamId) -> u64 {
    match param {
        ParamId::Uniform(UniformId(loc)) => loc as u64 | PARAM_TAG_UNIFORM << 32,
        ParamId::Texture(slot) => slot as u64 | PARAM_TAG_TEXTURE << 32,
    }
}

pub fn param_from_raw(raw: u64) -> Result<ParamId> {
    let value = raw as u32;
    match raw >> 32 {
        PARAM_TAG_UNIFORM => Ok(ParamId::Uniform(UniformId(value))),
        PARAM_TAG_TEXTURE => Ok(ParamId::Texture(value as usize)),
        _ => Err(DisplayError::UnknownParameter(format!("raw id {raw:#x}"))),
    }
}

/// 0 none, 1 alpha, 2 multiply, 3 add, 4 premultiplied.
pub fn blend_from_raw(raw: i32) -> Result<BlendMode> {
    match raw {
        0 => Ok(BlendMode::None),
        1 => Ok(BlendMode::Alpha),
        2 => Ok(BlendMode::Multiply),
        3 => Ok(BlendMode::Add),
        4 => Ok(BlendMode::Premultiplied),
        other => Err(DisplayError::InvalidConfig(format!("unknown blend mode {other}"))),
    }
}

/// 0 display default, 1 on, 2 off.
pub fn smoothing_from_raw(raw: i32) -> Smoothing {
    match raw {
        1 => Smoothing::On,
        2 => Smoothing::Off,
        _ => Smoothing::Default,
    }
}

#[cfg(feature = "gles")]
pub(crate) use platform::PlatformSurface;

#[cfg(feature = "gles")]
mod platform {
    use super::DisplayPlatform;
    use crate::error::{DisplayError, Result};
    use crate::render::device::gles::Surface;
    use core::ffi::c_void;

    pub(crate) struct PlatformSurface {
        user_data: *mut c_void,
        swap_buffers: Option<unsafe extern "C" fn(*mut c_void) -> bool>,
        set_swap_interval: Option<unsafe extern "C" fn(*mut c_void, i32) -> bool>,
    }

    impl PlatformSurface {
        pub(crate) fn new(platform: &DisplayPlatform) -> Self {
            Self {
                user_data: platform.user_data,
                swap_buffers: platform.swap_buffers,
                set_swap_interval: platform.set_swap_interval,
            }
        }
    }

    impl Surface for PlatformSurface {
        fn swap_buffers(&mut self) -> Result<()> {
            let Some(swap) = self.swap_buffers else { return Ok(()) };
            // Safety: the platform keeps `user_data` valid while the display lives.
            if unsafe { swap(self.user_data) } {
                Ok(())
            } else {
                Err(DisplayError::Device("buffer swap failed".into()))
            }
        }

        fn set_swap_interval(&mut self, interval: i32) -> Result<()> {
            let Some(set) = self.set_swap_interval else { return Ok(()) };
            if unsafe { set(self.user_data, interval) } {
                Ok(())
            } else {
                Err(DisplayError::Device(format!("swap interval {interval} rejected")))
            }
        }
    }
}
