use core::ffi::c_char;
use std::sync::{Mutex, OnceLock};

use crate::error::{DisplayError, Result};
use crate::ffi::types::{blend_from_raw, cstr_to_string, smoothing_from_raw, write_c_string};
use crate::ffi::types::{character_map, param_from_raw, param_to_raw, slice_arg};
use crate::ffi::types::{CGlyph, CMeshVertex, COrientedBox, CPoint, CShaderParam, CTransform, DisplayPlatform};
use crate::render::device::headless::HeadlessDevice;
use crate::render::device::GpuDevice;
use crate::render::draw::MeshVertex;
use crate::render::frame::Rgba;
use crate::render::{BitmapId, Display, DisplayTransform, ShaderId};
use crate::util::config::{Backend, DisplayConfig};

/// Opaque handle passed to C.
///
/// Design rule: C must treat this as an opaque pointer, and only use it from
/// the thread that owns the GL context.
pub struct DisplayContext {
    display: Display<Box<dyn GpuDevice>>,
}

static LAST_ERROR: OnceLock<Mutex<Option<String>>> = OnceLock::new();

fn set_last_error(msg: String) {
    let lock = LAST_ERROR.get_or_init(|| Mutex::new(None));
    if let Ok(mut guard) = lock.lock() {
        *guard = Some(msg);
    }
}

fn take_last_error() -> Option<String> {
    let lock = LAST_ERROR.get_or_init(|| Mutex::new(None));
    lock.lock().ok().and_then(|mut guard| guard.take())
}

/// Runs `f` on the display behind `ctx`, turning failures into `fail` plus a last error.
fn with_display<T>(
    ctx: *mut DisplayContext,
    fail: T,
    f: impl FnOnce(&mut Display<Box<dyn GpuDevice>>) -> Result<T>,
) -> T {
    if ctx.is_null() {
        set_last_error(DisplayError::NotReady.to_string());
        return fail;
    }
    // Safety: non-null contexts come from `display_create` and are not shared across threads.
    let ctx = unsafe { &mut *ctx };
    match f(&mut ctx.display) {
        Ok(v) => v,
        Err(err) => {
            set_last_error(err.to_string());
            fail
        }
    }
}

fn bitmap(raw: u64) -> Result<BitmapId> {
    BitmapId::from_raw(raw).ok_or(DisplayError::InvalidHandle)
}

fn shader(raw: u64) -> Result<ShaderId> {
    ShaderId::from_raw(raw).ok_or(DisplayError::InvalidHandle)
}

fn transform_arg(transform: *const CTransform) -> DisplayTransform {
    if transform.is_null() {
        DisplayTransform::default()
    } else {
        // Safety: non-null pointer to a caller-owned transform.
        DisplayTransform::from(unsafe { *transform })
    }
}

fn points_arg(points: *const CPoint, count: u32) -> Result<Vec<(f32, f32)>> {
    Ok(slice_arg(points, count, "points")?.iter().map(|p| (p.x, p.y)).collect())
}

fn make_device(config: &DisplayConfig, platform: *const DisplayPlatform) -> Result<Box<dyn GpuDevice>> {
    match config.backend {
        Backend::Dummy => Ok(Box::new(HeadlessDevice::default())),
        #[cfg(feature = "gles")]
        Backend::Gles => {
            use crate::ffi::types::PlatformSurface;
            use crate::render::device::gles::GlesDevice;

            if platform.is_null() {
                return Err(DisplayError::Device("gles backend needs platform callbacks".into()));
            }
            // Safety: caller passes a valid `DisplayPlatform` for the call's duration.
            let platform = unsafe { &*platform };
            let get_proc = platform
                .get_proc_address
                .ok_or_else(|| DisplayError::Device("missing get_proc_address".into()))?;
            let user_data = platform.user_data;
            let loader = |name: &str| match std::ffi::CString::new(name) {
                Ok(name) => unsafe { get_proc(user_data, name.as_ptr()) },
                Err(_) => core::ptr::null(),
            };
            let surface = Box::new(PlatformSurface::new(platform));
            // Safety: the platform made its context current before calling `display_create`.
            let device = unsafe { GlesDevice::from_loader(loader, surface)? };
            Ok(Box::new(device))
        }
        #[cfg(not(feature = "gles"))]
        Backend::Gles => {
            let _ = platform;
            Err(DisplayError::InvalidConfig("built without the gles backend".into()))
        }
    }
}

/// Creates a display from `key = value` config text (null means defaults).
#[no_mangle]
pub extern "C" fn display_create(config_text: *const c_char, platform: *const DisplayPlatform) -> *mut DisplayContext {
    crate::util::logging::init_logger();

    let text = cstr_to_string(config_text).unwrap_or_default();
    let created = DisplayConfig::from_str_lenient(&text).and_then(|config| {
        let device = make_device(&config, platform)?;
        Display::new(device, config)
    });

    match created {
        Ok(display) => Box::into_raw(Box::new(DisplayContext { display })),
        Err(err) => {
            log::error!("display_create failed: {}", err);
            set_last_error(err.to_string());
            core::ptr::null_mut()
        }
    }
}

#[no_mangle]
pub extern "C" fn display_destroy(ctx: *mut DisplayContext) {
    if ctx.is_null() {
        return;
    }
    // Safety: `ctx` came from `display_create` and is not used after this call.
    let ctx = unsafe { Box::from_raw(ctx) };
    if let Err(err) = ctx.display.exit() {
        set_last_error(err.to_string());
    }
}

/// Returns the number of bytes written (excluding the NUL terminator).
#[no_mangle]
pub extern "C" fn display_last_error(out: *mut c_char, cap: usize) -> usize {
    let msg = take_last_error().unwrap_or_default();
    write_c_string(out, cap, &msg)
}

#[no_mangle]
pub extern "C" fn display_screen_bitmap(ctx: *mut DisplayContext) -> u64 {
    with_display(ctx, 0, |d| Ok(d.screen_bitmap().to_raw()))
}

#[no_mangle]
pub extern "C" fn display_create_bitmap(ctx: *mut DisplayContext, width: u32, height: u32) -> u64 {
    with_display(ctx, 0, |d| Ok(d.create_bitmap(width, height)?.to_raw()))
}

#[no_mangle]
pub extern "C" fn display_delete_bitmap(ctx: *mut DisplayContext, bmp: u64) -> bool {
    with_display(ctx, false, |d| d.delete_bitmap(bitmap(bmp)?).map(|_| true))
}

/// `rgba` is packed little-endian: `r` in the low byte.
#[no_mangle]
pub extern "C" fn display_set_bitmap_color(ctx: *mut DisplayContext, bmp: u64, rgba: u32) -> bool {
    with_display(ctx, false, |d| d.set_bitmap_color(bitmap(bmp)?, Rgba::from_u32(rgba)).map(|_| true))
}

#[no_mangle]
pub extern "C" fn display_get_bitmap_color(ctx: *mut DisplayContext, bmp: u64) -> u32 {
    with_display(ctx, 0, |d| Ok(d.bitmap_color(bitmap(bmp)?)?.to_u32()))
}

#[no_mangle]
pub extern "C" fn display_set_bitmap_clipping(
    ctx: *mut DisplayContext,
    bmp: u64,
    tlx: u32,
    tly: u32,
    brx: u32,
    bry: u32,
) -> bool {
    with_display(ctx, false, |d| d.set_bitmap_clipping(bitmap(bmp)?, tlx, tly, brx, bry).map(|_| true))
}

#[no_mangle]
pub extern "C" fn display_set_bitmap_data(ctx: *mut DisplayContext, bmp: u64, data: *const u8, len: usize) -> bool {
    if data.is_null() {
        set_last_error(DisplayError::SizeMismatch { expected: 1, actual: 0 }.to_string());
        return false;
    }
    // Safety: caller provides `len` readable bytes.
    let pixels = unsafe { core::slice::from_raw_parts(data, len) };
    with_display(ctx, false, |d| d.set_bitmap_data(bitmap(bmp)?, pixels).map(|_| true))
}

#[no_mangle]
pub extern "C" fn display_get_bitmap_data(ctx: *mut DisplayContext, bmp: u64, out: *mut u8, len: usize) -> bool {
    if out.is_null() {
        set_last_error(DisplayError::SizeMismatch { expected: 1, actual: 0 }.to_string());
        return false;
    }
    // Safety: caller provides `len` writable bytes.
    let buf = unsafe { core::slice::from_raw_parts_mut(out, len) };
    with_display(ctx, false, |d| d.get_bitmap_data(bitmap(bmp)?, buf).map(|_| true))
}

/// Device texture name, or -1.
#[no_mangle]
pub extern "C" fn display_get_bitmap_id(ctx: *mut DisplayContext, bmp: u64) -> i64 {
    with_display(ctx, -1, |d| Ok(i64::from(d.bitmap_texture_id(bitmap(bmp)?)?)))
}

#[no_mangle]
pub extern "C" fn display_transform_bitmap(
    ctx: *mut DisplayContext,
    bmp: u64,
    transform: *const CTransform,
    smoothing: i32,
    blend: i32,
) -> bool {
    with_display(ctx, false, |d| {
        let transform = transform_arg(transform);
        d.transform_bitmap(bitmap(bmp)?, &transform, smoothing_from_raw(smoothing), blend_from_raw(blend)?)?;
        Ok(true)
    })
}

/// Draws `text` (UTF-8) with glyph rectangles taken from `font`.
#[no_mangle]
pub extern "C" fn display_transform_text(
    ctx: *mut DisplayContext,
    font: u64,
    text: *const c_char,
    glyphs: *const CGlyph,
    glyph_count: u32,
    character_height: f32,
    transform: *const CTransform,
    smoothing: i32,
    blend: i32,
) -> bool {
    with_display(ctx, false, |d| {
        let text = cstr_to_string(text).ok_or(DisplayError::InvalidArgument("text"))?;
        let map = character_map(slice_arg(glyphs, glyph_count, "glyphs")?, character_height)?;
        let transform = transform_arg(transform);
        d.transform_text(bitmap(font)?, &text, &map, &transform, smoothing_from_raw(smoothing), blend_from_raw(blend)?)?;
        Ok(true)
    })
}

/// A null `indices` draws the vertices as one triangle strip.
#[no_mangle]
pub extern "C" fn display_draw_mesh(
    ctx: *mut DisplayContext,
    bmp: u64,
    smoothing: i32,
    blend: i32,
    vertices: *const CMeshVertex,
    vertex_count: u32,
    indices: *const u16,
    index_count: u32,
) -> bool {
    with_display(ctx, false, |d| {
        let vertices: Vec<MeshVertex> =
            slice_arg(vertices, vertex_count, "vertices")?.iter().map(|&v| v.into()).collect();
        let indices = if indices.is_null() { None } else { Some(slice_arg(indices, index_count, "indices")?) };
        d.draw_mesh(bitmap(bmp)?, smoothing_from_raw(smoothing), blend_from_raw(blend)?, &vertices, indices)?;
        Ok(true)
    })
}

#[no_mangle]
pub extern "C" fn display_draw_line(ctx: *mut DisplayContext, x0: f32, y0: f32, x1: f32, y1: f32, rgba: u32) -> bool {
    with_display(ctx, false, |d| d.draw_line((x0, y0), (x1, y1), Rgba::from_u32(rgba)).map(|_| true))
}

#[no_mangle]
pub extern "C" fn display_draw_polyline(ctx: *mut DisplayContext, points: *const CPoint, count: u32, rgba: u32) -> bool {
    with_display(ctx, false, |d| d.draw_polyline(&points_arg(points, count)?, Rgba::from_u32(rgba)).map(|_| true))
}

#[no_mangle]
pub extern "C" fn display_draw_polygon(
    ctx: *mut DisplayContext,
    points: *const CPoint,
    count: u32,
    rgba: u32,
    fill: bool,
) -> bool {
    with_display(ctx, false, |d| d.draw_polygon(&points_arg(points, count)?, Rgba::from_u32(rgba), fill).map(|_| true))
}

#[no_mangle]
pub extern "C" fn display_draw_circle(ctx: *mut DisplayContext, x: f32, y: f32, radius: f32, rgba: u32, fill: bool) -> bool {
    with_display(ctx, false, |d| d.draw_circle((x, y), radius, Rgba::from_u32(rgba), fill).map(|_| true))
}

#[no_mangle]
pub extern "C" fn display_draw_obox(ctx: *mut DisplayContext, obox: *const COrientedBox, rgba: u32, fill: bool) -> bool {
    with_display(ctx, false, |d| {
        if obox.is_null() {
            return Err(DisplayError::InvalidArgument("obox"));
        }
        // Safety: non-null pointer to a caller-owned box.
        let obox = unsafe { *obox };
        d.draw_obox(&obox.into(), Rgba::from_u32(rgba), fill)?;
        Ok(true)
    })
}

#[no_mangle]
pub extern "C" fn display_clear_bitmap(ctx: *mut DisplayContext, bmp: u64, rgba: u32) -> bool {
    with_display(ctx, false, |d| d.clear_bitmap(bitmap(bmp)?, Rgba::from_u32(rgba)).map(|_| true))
}

#[no_mangle]
pub extern "C" fn display_set_blend_mode(ctx: *mut DisplayContext, blend: i32) -> bool {
    with_display(ctx, false, |d| d.set_blend_mode(blend_from_raw(blend)?).map(|_| true))
}

#[no_mangle]
pub extern "C" fn display_set_destination_bitmaps(ctx: *mut DisplayContext, list: *const u64, count: u32) -> bool {
    if list.is_null() || count == 0 {
        set_last_error(DisplayError::NoDestination.to_string());
        return false;
    }
    // Safety: caller provides `count` handles.
    let raw = unsafe { core::slice::from_raw_parts(list, count as usize) };
    with_display(ctx, false, |d| {
        let ids = raw.iter().map(|&r| bitmap(r)).collect::<Result<Vec<_>>>()?;
        d.set_destination_bitmaps(&ids)?;
        Ok(true)
    })
}

/// Returns a shader handle, or 0 when compilation fails.
#[no_mangle]
pub extern "C" fn display_create_shader(
    ctx: *mut DisplayContext,
    code: *const c_char,
    params: *const CShaderParam,
    param_count: u32,
    use_custom_param: bool,
) -> u64 {
    let Some(code) = cstr_to_string(code) else {
        set_last_error(DisplayError::ShaderCompile("no source".into()).to_string());
        return 0;
    };
    with_display(ctx, 0, |d| {
        let params = slice_arg(params, param_count, "shader parameters")?
            .iter()
            .map(CShaderParam::to_param)
            .collect::<Result<Vec<_>>>()?;
        Ok(d.create_shader(&code, params, use_custom_param)?.to_raw())
    })
}

/// Returns a parameter id for the setters below, or 0. `index` below 0 addresses a scalar.
#[no_mangle]
pub extern "C" fn display_get_parameter_id(
    ctx: *mut DisplayContext,
    shd: u64,
    name: *const c_char,
    index: i32,
    is_texture: bool,
) -> u64 {
    with_display(ctx, 0, |d| {
        let name = cstr_to_string(name).ok_or(DisplayError::InvalidArgument("parameter name"))?;
        let index = usize::try_from(index).ok();
        Ok(param_to_raw(d.parameter_id(shader(shd)?, &name, index, is_texture)?))
    })
}

/// `bmp` 0 samples the screen.
#[no_mangle]
pub extern "C" fn display_set_shader_bitmap(ctx: *mut DisplayContext, shd: u64, param: u64, bmp: u64) -> bool {
    with_display(ctx, false, |d| {
        let source = if bmp == 0 { None } else { Some(bitmap(bmp)?) };
        d.set_shader_bitmap(shader(shd)?, param_from_raw(param)?, source)?;
        Ok(true)
    })
}

#[no_mangle]
pub extern "C" fn display_set_shader_float(ctx: *mut DisplayContext, shd: u64, param: u64, value: f32) -> bool {
    with_display(ctx, false, |d| d.set_shader_float(shader(shd)?, param_from_raw(param)?, value).map(|_| true))
}

#[no_mangle]
pub extern "C" fn display_set_shader_vector(
    ctx: *mut DisplayContext,
    shd: u64,
    param: u64,
    x: f32,
    y: f32,
    z: f32,
) -> bool {
    with_display(ctx, false, |d| d.set_shader_vector(shader(shd)?, param_from_raw(param)?, [x, y, z]).map(|_| true))
}

#[no_mangle]
pub extern "C" fn display_delete_shader(ctx: *mut DisplayContext, shd: u64) -> bool {
    with_display(ctx, false, |d| d.delete_shader(shader(shd)?).map(|_| true))
}

#[no_mangle]
pub extern "C" fn display_start_shader(ctx: *mut DisplayContext, shd: u64) -> bool {
    with_display(ctx, false, |d| d.start_shader(shader(shd)?).map(|_| true))
}

/// `0` restores the default program when no shader is running.
#[no_mangle]
pub extern "C" fn display_stop_shader(ctx: *mut DisplayContext, shd: u64) -> bool {
    with_display(ctx, false, |d| {
        let id = if shd == 0 { None } else { Some(shader(shd)?) };
        d.stop_shader(id).map(|_| true)
    })
}

#[no_mangle]
pub extern "C" fn display_swap(ctx: *mut DisplayContext) -> bool {
    with_display(ctx, false, |d| d.swap().map(|_| true))
}

#[no_mangle]
pub extern "C" fn display_set_video_mode(ctx: *mut DisplayContext, width: u32, height: u32) -> bool {
    with_display(ctx, false, |d| d.set_video_mode(width, height).map(|_| true))
}

#[no_mangle]
pub extern "C" fn display_enable_vsync(ctx: *mut DisplayContext, enabled: bool) -> bool {
    with_display(ctx, false, |d| d.enable_vsync(enabled).map(|_| true))
}

#[no_mangle]
pub extern "C" fn display_is_vsync_enabled(ctx: *mut DisplayContext) -> bool {
    with_display(ctx, false, |d| Ok(d.is_vsync_enabled()))
}
