pub mod batch;
pub mod binder;
pub mod cache;
pub mod device;
pub mod draw;
pub mod frame;
pub mod loader;
pub mod shader;
pub mod state;

pub use cache::bitmaps::BitmapId;
pub use cache::shaders::{ParamId, ParamKind, ShaderId, ShaderParam};
pub use frame::{BlendMode, CharacterMap, DisplayTransform, Glyph, Rgba, Smoothing, Vertex};
pub use loader::{DecodedImage, LoadEvent};

use crate::error::{DisplayError, Result};
use crate::render::batch::VertexBatch;
use crate::render::binder::TextureUnitBinder;
use crate::render::cache::bitmaps::{Bitmap, BitmapStore, LoadState};
use crate::render::cache::shaders::{ShaderStore, UniformValue};
use crate::render::device::{Capabilities, GpuDevice, ProgramId, TextureId, UniformId};
use crate::render::frame::{BufferMode, ClipBox, ProjectionMatrix, RectI, Topology};
use crate::render::loader::Loader;
use crate::render::shader::{ActiveShaders, ShaderPhase};
use crate::render::state::RenderState;
use crate::util::config::DisplayConfig;

/// Program compiled at init and its fixed uniforms.
#[derive(Clone, Copy, Debug)]
struct BuiltinProgram {
    program: ProgramId,
    projection: Option<UniformId>,
    texture: Option<UniformId>,
}

/// The display backend: one instance per GPU context, driven from the
/// thread that owns that context.
///
/// Draw calls are appended to a vertex batch. Any change of GPU state that
/// would affect queued geometry flushes the batch first, so the result is
/// always drawn in submission order.
pub struct Display<D: GpuDevice> {
    device: D,
    config: DisplayConfig,
    caps: Capabilities,
    bitmaps: BitmapStore,
    shaders: ShaderStore,
    active: ActiveShaders,
    binder: TextureUnitBinder,
    batch: VertexBatch,
    quad_indices: Vec<u16>,
    state: RenderState,
    default_program: BuiltinProgram,
    no_texture_program: BuiltinProgram,
    loader: Loader,
    vsync: bool,
}

impl<D: GpuDevice> Display<D> {
    pub fn new(mut device: D, config: DisplayConfig) -> Result<Self> {
        let caps = device.capabilities();
        let default_program = Self::build_program(&mut device, shader::DEFAULT_FRAGMENT_BODY)?;
        let no_texture_program = Self::build_program(&mut device, shader::NO_TEXTURE_FRAGMENT_BODY)?;

        let bitmaps = BitmapStore::new(config.width, config.height, config.smoothing);
        let state = RenderState::new(bitmaps.screen(), config.width, config.height);
        let batch = VertexBatch::new(config.vertex_capacity);
        let quad_indices = VertexBatch::quad_indices(batch.capacity());

        device.set_quad_indices(&quad_indices);
        device.bind_screen();
        device.set_viewport(state.viewport);
        device.set_depth_test(config.depth_buffer);

        let mut display = Self {
            device,
            caps,
            bitmaps,
            shaders: ShaderStore::new(),
            active: ActiveShaders::default(),
            binder: TextureUnitBinder::new(caps.texture_units),
            batch,
            quad_indices,
            state,
            default_program,
            no_texture_program,
            loader: Loader::new(),
            vsync: config.vsync,
            config,
        };
        display.restore_default_program();
        display.device.set_vsync(display.vsync)?;

        log::info!(
            "display ready: {}x{} \"{}\", {} texture units, {} draw buffers, {} vertex batch",
            display.config.width,
            display.config.height,
            display.config.title,
            caps.texture_units,
            caps.draw_buffers,
            display.batch.capacity()
        );
        Ok(display)
    }

    fn build_program(device: &mut D, body: &str) -> Result<BuiltinProgram> {
        let fragment = shader::fragment_source(body, &[], false);
        let program = device.compile_program(shader::VERTEX_SHADER, &fragment)?;
        Ok(BuiltinProgram {
            program,
            projection: device.uniform_location(program, shader::UNIFORM_PROJECTION),
            texture: device.uniform_location(program, shader::UNIFORM_TEXTURE),
        })
    }

    /// Flushes, releases every GPU resource and hands the device back.
    pub fn exit(mut self) -> Result<D> {
        self.flush()?;
        for id in self.shaders.ids() {
            if let Ok(shader) = self.shaders.remove(id) {
                self.device.delete_program(shader.program);
            }
        }
        for id in self.bitmaps.ids() {
            if let Some(texture) = self.bitmaps.get_mut(id)?.texture.take() {
                self.device.delete_texture(texture);
            }
        }
        self.device.delete_program(self.default_program.program);
        self.device.delete_program(self.no_texture_program.program);
        log::info!("display closed");
        Ok(self.device)
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    // Bitmaps

    pub fn screen_bitmap(&self) -> BitmapId {
        self.bitmaps.screen()
    }

    pub fn screen_size(&self) -> (u32, u32) {
        self.bitmaps.get(self.bitmaps.screen()).map(|b| (b.width, b.height)).unwrap_or((0, 0))
    }

    pub fn bitmap_size(&self, id: BitmapId) -> Result<(u32, u32)> {
        self.bitmaps.get(id).map(|b| (b.width, b.height))
    }

    pub fn create_bitmap(&mut self, width: u32, height: u32) -> Result<BitmapId> {
        let mut bitmap = Bitmap::new(width, height, self.caps.npot_textures, self.config.smoothing);
        let texture = self.device.create_texture(bitmap.real_width, bitmap.real_height, None, bitmap.smoothing)?;
        bitmap.texture = Some(texture);
        Ok(self.bitmaps.insert(bitmap))
    }

    /// Deletes a bitmap. A bitmap still decoding is deleted once its decode lands.
    pub fn delete_bitmap(&mut self, id: BitmapId) -> Result<()> {
        if self.bitmaps.is_screen(id) {
            return Err(DisplayError::ScreenNotAllowed);
        }
        let bitmap = self.bitmaps.get_mut(id)?;
        if let LoadState::Loading { delete_requested } = &mut bitmap.load {
            *delete_requested = true;
            return Ok(());
        }
        self.release_bitmap(id)
    }

    /// Drops every reference to `id`, then frees its texture.
    fn release_bitmap(&mut self, id: BitmapId) -> Result<()> {
        if self.is_referenced(id) {
            self.flush()?;
        }
        if self.state.last_bitmap == Some(id) {
            self.state.last_bitmap = None;
        }
        self.binder.forget(id);
        for shader_id in self.shaders.ids() {
            let shader = self.shaders.get_mut(shader_id)?;
            for slot in shader.texture_slots.iter_mut().filter(|s| s.bitmap == Some(id)) {
                slot.bitmap = None;
            }
        }
        if self.state.destinations.contains(&id) {
            let screen = self.bitmaps.screen();
            self.set_destination_bitmaps(&[screen])?;
        }

        let bitmap = self.bitmaps.remove(id)?;
        if let Some(texture) = bitmap.texture {
            self.device.delete_texture(texture);
        }
        Ok(())
    }

    /// True when queued geometry samples `id`.
    fn is_referenced(&self, id: BitmapId) -> bool {
        if self.batch.is_empty() {
            return false;
        }
        self.state.last_bitmap == Some(id)
            || self
                .active
                .ids()
                .into_iter()
                .filter_map(|s| self.shaders.get(s).ok())
                .any(|s| s.references(id))
    }

    pub fn set_bitmap_color(&mut self, id: BitmapId, color: Rgba) -> Result<()> {
        self.bitmaps.get_mut(id)?.color = color;
        Ok(())
    }

    pub fn bitmap_color(&self, id: BitmapId) -> Result<Rgba> {
        self.bitmaps.get(id).map(|b| b.color)
    }

    /// Sets the clip box. On the current primary destination this is also the
    /// scissor rectangle, applied (with a flush) only when it changes.
    pub fn set_bitmap_clipping(&mut self, id: BitmapId, tlx: u32, tly: u32, brx: u32, bry: u32) -> Result<()> {
        let bitmap = self.bitmaps.get(id)?;
        if self.state.primary_destination() == Some(id) {
            let is_screen = self.bitmaps.is_screen(id);
            let rect = RenderState::scissor_for(tlx, tly, brx, bry, bitmap.height, is_screen);
            if self.state.scissor_differs(rect) {
                self.flush()?;
                self.device.set_scissor(Some(rect));
                self.state.scissor = Some(rect);
            }
        }
        self.bitmaps.get_mut(id)?.clip = ClipBox::new(tlx as f32, tly as f32, brx as f32, bry as f32);
        Ok(())
    }

    pub fn set_bitmap_data(&mut self, id: BitmapId, pixels: &[u8]) -> Result<()> {
        if self.bitmaps.is_screen(id) {
            return Err(DisplayError::ScreenNotAllowed);
        }
        let bitmap = self.bitmaps.get(id)?;
        if bitmap.is_loading() {
            return Err(DisplayError::NotReady);
        }
        let expected = bitmap.byte_len();
        if pixels.len() != expected {
            return Err(DisplayError::SizeMismatch { expected, actual: pixels.len() });
        }
        let (width, height) = (bitmap.width, bitmap.height);
        let texture = bitmap.texture.ok_or(DisplayError::InvalidHandle)?;

        self.flush()?;
        self.device.update_texture(texture, width, height, pixels)
    }

    /// Reads back the bitmap's logical area as RGBA8.
    pub fn get_bitmap_data(&mut self, id: BitmapId, out: &mut [u8]) -> Result<()> {
        if self.bitmaps.is_screen(id) {
            return Err(DisplayError::ScreenNotAllowed);
        }
        let bitmap = self.bitmaps.get(id)?;
        if bitmap.is_loading() {
            return Err(DisplayError::NotReady);
        }
        let expected = bitmap.byte_len();
        if out.len() != expected {
            return Err(DisplayError::SizeMismatch { expected, actual: out.len() });
        }
        let (width, height) = (bitmap.width, bitmap.height);
        let texture = bitmap.texture.ok_or(DisplayError::InvalidHandle)?;

        self.flush()?;
        let read = self.device.read_texture(texture, width, height, out);
        // Readback goes through its own framebuffer.
        self.rebind_destinations()?;
        read
    }

    /// Clears a bitmap to `color` without disturbing the current destinations.
    /// The screen stands for whatever is bound right now.
    pub fn clear_bitmap(&mut self, id: BitmapId, color: Rgba) -> Result<()> {
        self.bitmaps.get(id)?;
        self.flush()?;
        if self.bitmaps.is_screen(id) {
            self.device.clear(color);
            return Ok(());
        }
        let saved = self.state.destinations.clone();
        self.set_destination_bitmaps(&[id])?;
        self.device.clear(color);
        self.set_destination_bitmaps(&saved)
    }

    /// Device texture name, for interop.
    pub fn bitmap_texture_id(&self, id: BitmapId) -> Result<u32> {
        self.bitmaps.get(id)?.texture.map(|t| t.0).ok_or(DisplayError::InvalidHandle)
    }

    // Render state

    pub fn blend_mode(&self) -> Option<BlendMode> {
        self.state.blend
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) -> Result<()> {
        if self.state.blend_differs(mode) {
            self.flush()?;
            self.device.set_blend(mode);
            self.state.blend = Some(mode);
        }
        Ok(())
    }

    pub fn destinations(&self) -> &[BitmapId] {
        &self.state.destinations
    }

    /// Routes drawing to the screen or to one or more same-sized bitmaps.
    ///
    /// Lists longer than the device's draw-buffer limit are truncated. Invalid
    /// sets fail and leave the previous destinations in place.
    pub fn set_destination_bitmaps(&mut self, list: &[BitmapId]) -> Result<()> {
        if list.is_empty() {
            return Err(DisplayError::NoDestination);
        }
        let list = if list.len() > self.caps.draw_buffers {
            log::warn!(
                "{} destination bitmaps requested, only {} draw buffers available",
                list.len(),
                self.caps.draw_buffers
            );
            &list[..self.caps.draw_buffers.max(1)]
        } else {
            list
        };

        let (width, height, targets) = match self.validate_destinations(list) {
            Ok(v) => v,
            Err(err) => {
                log::warn!("refusing destination set: {}", err);
                return Err(err);
            }
        };

        if self.state.same_destinations(list) {
            return Ok(());
        }

        self.flush()?;
        match &targets {
            Some(textures) => self.device.bind_render_targets(textures)?,
            None => self.device.bind_screen(),
        }
        self.state.destinations = list.to_vec();
        self.state.viewport = RectI { x: 0, y: 0, w: width as i32, h: height as i32 };
        self.device.set_viewport(self.state.viewport);
        self.state.projection = if targets.is_none() {
            ProjectionMatrix::for_screen(width as f32, height as f32)
        } else {
            ProjectionMatrix::for_texture(width as f32, height as f32)
        };
        self.push_projection();
        Ok(())
    }

    /// Returns the shared size and, for off-screen sets, the textures to attach.
    fn validate_destinations(&self, list: &[BitmapId]) -> Result<(u32, u32, Option<Vec<TextureId>>)> {
        let screen = self.bitmaps.screen();
        let first = self.bitmaps.get(list[0])?;
        let (width, height) = (first.width, first.height);

        if list.contains(&screen) {
            if list.len() > 1 {
                return Err(DisplayError::DestinationMismatch("screen mixed with bitmaps".into()));
            }
            return Ok((width, height, None));
        }

        let mut textures = Vec::with_capacity(list.len());
        for &id in list {
            let bitmap = self.bitmaps.get(id)?;
            if (bitmap.width, bitmap.height) != (width, height) {
                return Err(DisplayError::DestinationMismatch(format!(
                    "{}x{} next to {}x{}",
                    bitmap.width, bitmap.height, width, height
                )));
            }
            if bitmap.is_loading() {
                return Err(DisplayError::DestinationMismatch("bitmap is still loading".into()));
            }
            textures.push(bitmap.texture.ok_or(DisplayError::InvalidHandle)?);
        }
        Ok((width, height, Some(textures)))
    }

    fn rebind_destinations(&mut self) -> Result<()> {
        let list = self.state.destinations.clone();
        match self.validate_destinations(&list)? {
            (_, _, Some(textures)) => self.device.bind_render_targets(&textures)?,
            (_, _, None) => self.device.bind_screen(),
        }
        self.device.set_viewport(self.state.viewport);
        Ok(())
    }

    /// Resizes the screen. Viewport and projection follow when the screen is the destination.
    pub fn set_video_mode(&mut self, width: u32, height: u32) -> Result<()> {
        self.flush()?;
        let screen = self.bitmaps.screen();
        let bitmap = self.bitmaps.get_mut(screen)?;
        bitmap.resize(width, height, true);
        // The capture texture is recreated at the new size on demand.
        if let Some(texture) = bitmap.texture.take() {
            self.binder.forget(screen);
            self.device.delete_texture(texture);
        }

        if self.state.primary_destination() == Some(screen) {
            self.state.viewport = RectI { x: 0, y: 0, w: width as i32, h: height as i32 };
            self.device.set_viewport(self.state.viewport);
            self.state.projection = ProjectionMatrix::for_screen(width as f32, height as f32);
            self.push_projection();
            self.state.scissor = None;
            self.device.set_scissor(None);
        }
        self.config.width = width;
        self.config.height = height;
        log::info!("video mode set to {}x{}", width, height);
        Ok(())
    }

    pub fn enable_vsync(&mut self, enabled: bool) -> Result<()> {
        self.device.set_vsync(enabled)?;
        self.vsync = enabled;
        Ok(())
    }

    pub fn is_vsync_enabled(&self) -> bool {
        self.vsync
    }

    /// Flushes the batch and presents the frame.
    pub fn swap(&mut self) -> Result<()> {
        self.flush()?;
        self.device.present()
    }

    // Batching

    pub fn pending_vertices(&self) -> usize {
        self.batch.len()
    }

    pub fn is_resident(&self, id: BitmapId) -> bool {
        self.binder.is_resident(id)
    }

    /// Makes `id` the sampled bitmap with the requested filtering and blending.
    /// Each piece of state that actually changes flushes the batch first.
    pub fn prepare_bitmap(&mut self, id: BitmapId, smoothing: Smoothing, blend: BlendMode) -> Result<()> {
        self.prepare(id, smoothing, blend, BufferMode::Indirect)
    }

    fn prepare(&mut self, id: BitmapId, smoothing: Smoothing, blend: BlendMode, mode: BufferMode) -> Result<()> {
        if self.bitmaps.is_screen(id) {
            return Err(DisplayError::ScreenNotAllowed);
        }
        let bitmap = self.bitmaps.get(id)?;
        let texture = bitmap.texture.ok_or(DisplayError::InvalidHandle)?;
        let current_smoothing = bitmap.smoothing;

        // A stopped shader must not reach geometry drawn after the stop.
        if self.has_pending_shaders() {
            self.flush()?;
        }
        self.set_buffer_mode(mode)?;

        if self.state.last_bitmap != Some(id) {
            self.flush()?;
            let binding = self.binder.bind(id, None);
            if binding.needs_bind {
                self.device.bind_texture(binding.unit, texture);
            }
            self.state.active_unit = binding.unit;
            self.state.last_bitmap = Some(id);
        }

        let smooth = smoothing.resolve(self.config.smoothing);
        if smooth != current_smoothing {
            self.flush()?;
            self.device.set_smoothing(self.state.active_unit, texture, smooth);
            self.bitmaps.get_mut(id)?.smoothing = smooth;
        }

        self.set_blend_mode(blend)
    }

    fn set_buffer_mode(&mut self, mode: BufferMode) -> Result<()> {
        if self.state.buffer_mode != mode {
            self.flush()?;
            if mode == BufferMode::Indirect {
                self.device.set_quad_indices(&self.quad_indices);
            }
            self.state.buffer_mode = mode;
        }
        Ok(())
    }

    fn push_quad(&mut self, quad: [Vertex; 4]) -> Result<()> {
        if !self.batch.has_room_for_quad() {
            log::debug!("vertex batch full ({} vertices), flushing", self.batch.len());
            self.flush()?;
        }
        self.batch.push_quad(quad);
        Ok(())
    }

    /// Submits the queued quads, once per active shader (or once with the
    /// default program), then retires shaders stopped during the batch.
    pub fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        self.device.upload_vertices(self.batch.vertices());
        let count = self.batch.element_count();
        self.run_passes(Topology::TriangleStrip, count)?;
        self.batch.clear();
        self.reap_pending_shaders();
        Ok(())
    }

    /// Issues one indexed draw per active shader against the uploaded vertices.
    fn run_passes(&mut self, topology: Topology, count: usize) -> Result<()> {
        self.state.screen_captured = false;
        if self.active.is_empty() {
            if let Some(texture) = self.default_program.texture {
                self.device.set_uniform_i32(texture, self.state.active_unit as i32);
            }
            self.device.draw_elements(topology, count);
            return Ok(());
        }
        for id in self.active.ids() {
            self.init_shader(id)?;
            self.device.draw_elements(topology, count);
        }
        Ok(())
    }

    /// Loads a shader's program, textures and uniforms for one pass.
    fn init_shader(&mut self, id: ShaderId) -> Result<()> {
        let shader = self.shaders.get(id)?;
        let program = shader.program;
        let projection = shader.projection;
        let sampler = shader.texture;
        let slots = shader.texture_slots.clone();
        let values: Vec<(UniformId, UniformValue)> = shader.values.iter().map(|(k, v)| (*k, *v)).collect();

        self.device.use_program(program);
        if let Some(loc) = projection {
            self.device.set_uniform_mat4(loc, &self.state.projection.0);
        }

        let screen = self.bitmaps.screen();
        for slot in &slots {
            let Some(bitmap_id) = slot.bitmap else { continue };
            let is_screen = bitmap_id == screen;
            let texture = if is_screen { self.screen_texture()? } else {
                self.bitmaps.get(bitmap_id)?.texture.ok_or(DisplayError::InvalidHandle)?
            };

            let binding = self.binder.bind(bitmap_id, Some(self.state.active_unit));
            if binding.needs_bind || is_screen {
                self.device.bind_texture(binding.unit, texture);
            }
            if is_screen && !self.state.screen_captured {
                let (w, h) = self.screen_size();
                self.device.copy_screen_to_texture(texture, w, h);
                self.state.screen_captured = true;
            }
            self.device.set_uniform_i32(slot.sampler, binding.unit as i32);

            let bitmap = self.bitmaps.get(bitmap_id)?;
            let uv = bitmap.uv_rect(0.0);
            for (loc, value) in [(slot.left, uv.u0), (slot.top, uv.v0), (slot.right, uv.u1), (slot.bottom, uv.v1)] {
                if let Some(loc) = loc {
                    self.device.set_uniform_f32(loc, value);
                }
            }
        }

        if let Some(loc) = sampler {
            self.device.set_uniform_i32(loc, self.state.active_unit as i32);
        }
        for (loc, value) in values {
            match value {
                UniformValue::Float(v) => self.device.set_uniform_f32(loc, v),
                UniformValue::Vector(v) => self.device.set_uniform_vec3(loc, v),
            }
        }
        Ok(())
    }

    /// Shadow texture the screen is copied into when a shader samples it.
    fn screen_texture(&mut self) -> Result<TextureId> {
        let screen = self.bitmaps.screen();
        let bitmap = self.bitmaps.get(screen)?;
        if let Some(texture) = bitmap.texture {
            return Ok(texture);
        }
        let texture = self.device.create_texture(bitmap.real_width, bitmap.real_height, None, false)?;
        self.bitmaps.get_mut(screen)?.texture = Some(texture);
        Ok(texture)
    }

    fn has_pending_shaders(&self) -> bool {
        self.active
            .ids()
            .into_iter()
            .filter_map(|id| self.shaders.get(id).ok())
            .any(|s| s.phase == ShaderPhase::PendingRemoval)
    }

    fn reap_pending_shaders(&mut self) {
        let mut removed = false;
        for id in self.active.ids() {
            if let Ok(shader) = self.shaders.get_mut(id) {
                if shader.phase == ShaderPhase::PendingRemoval {
                    shader.phase = ShaderPhase::Inactive;
                    shader.clear_texture_bindings();
                    self.active.remove(id);
                    removed = true;
                }
            }
        }
        if removed && self.active.is_empty() {
            self.restore_default_program();
        }
    }

    fn restore_default_program(&mut self) {
        let program = self.default_program;
        self.device.use_program(program.program);
        if let Some(loc) = program.projection {
            self.device.set_uniform_mat4(loc, &self.state.projection.0);
        }
        if let Some(loc) = program.texture {
            self.device.set_uniform_i32(loc, self.state.active_unit as i32);
        }
    }

    /// Uploads the projection to the program in use. Active shaders get it at their next pass.
    fn push_projection(&mut self) {
        if self.active.is_empty() {
            if let Some(loc) = self.default_program.projection {
                self.device.set_uniform_mat4(loc, &self.state.projection.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::headless::{DeviceCall, HeadlessDevice};

    fn display() -> Display<HeadlessDevice> {
        let config = DisplayConfig { width: 320, height: 200, ..DisplayConfig::default() };
        Display::new(HeadlessDevice::default(), config).unwrap()
    }

    #[test]
    fn init_compiles_builtin_programs_and_binds_screen() {
        let d = display();
        let calls = d.device().calls();
        assert_eq!(calls.iter().filter(|c| matches!(c, DeviceCall::CompileProgram(_))).count(), 2);
        assert!(calls.contains(&DeviceCall::BindScreen));
        assert_eq!(d.screen_size(), (320, 200));
        assert_eq!(d.destinations(), &[d.screen_bitmap()]);
    }

    #[test]
    fn clipping_the_destination_sets_scissor_once() {
        let mut d = display();
        let screen = d.screen_bitmap();
        d.set_bitmap_clipping(screen, 0, 0, 100, 50).unwrap();
        d.set_bitmap_clipping(screen, 0, 0, 100, 50).unwrap();
        let scissors: Vec<_> = d
            .device()
            .calls()
            .iter()
            .filter(|c| matches!(c, DeviceCall::Scissor(_)))
            .cloned()
            .collect();
        assert_eq!(scissors, vec![DeviceCall::Scissor(Some(RectI { x: 0, y: 150, w: 100, h: 50 }))]);
    }

    #[test]
    fn bitmap_data_round_trips_through_the_device() {
        let mut d = display();
        let id = d.create_bitmap(2, 2).unwrap();
        let pixels: Vec<u8> = (0..16).collect();
        d.set_bitmap_data(id, &pixels).unwrap();
        let mut out = vec![0; 16];
        d.get_bitmap_data(id, &mut out).unwrap();
        assert_eq!(out, pixels);

        let err = d.set_bitmap_data(id, &pixels[..8]).unwrap_err();
        assert_eq!(err, DisplayError::SizeMismatch { expected: 16, actual: 8 });
        let screen = d.screen_bitmap();
        assert_eq!(d.set_bitmap_data(screen, &pixels).unwrap_err(), DisplayError::ScreenNotAllowed);
    }

    #[test]
    fn video_mode_updates_screen_and_viewport() {
        let mut d = display();
        d.set_video_mode(640, 480).unwrap();
        assert_eq!(d.screen_size(), (640, 480));
        assert!(d.device().calls().contains(&DeviceCall::Viewport(RectI { x: 0, y: 0, w: 640, h: 480 })));
    }

    #[test]
    fn exit_releases_textures() {
        let mut d = display();
        d.create_bitmap(4, 4).unwrap();
        d.create_bitmap(8, 8).unwrap();
        let device = d.exit().unwrap();
        assert_eq!(device.live_textures(), 0);
    }
}
