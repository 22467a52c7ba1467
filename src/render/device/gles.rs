//! OpenGL ES 3 device on `glow`.
//!
//! The platform owns the EGL surface; it hands us a loader and a [`Surface`]
//! for presentation. Every GL call in the crate lives in this file.

use std::collections::HashMap;
use std::ffi::c_void;

use glow::{HasContext, PixelPackData, PixelUnpackData};

use crate::error::{DisplayError, Result};
use crate::render::device::{Capabilities, GpuDevice, ProgramId, TextureId, UniformId, ATTRIBUTE_NAMES};
use crate::render::device::{ATTRIBUTE_COLOR, ATTRIBUTE_POSITION, ATTRIBUTE_TEXCOORD};
use crate::render::frame::{BlendMode, RectI, Rgba, Topology, Vertex};

const MAX_TEXTURE_UNITS: usize = 32;

/// Presentation side of the platform window.
pub trait Surface {
    fn swap_buffers(&mut self) -> Result<()>;
    fn set_swap_interval(&mut self, interval: i32) -> Result<()>;
}

fn gl_size(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn gl_count(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn topology_mode(topology: Topology) -> u32 {
    match topology {
        Topology::TriangleStrip => glow::TRIANGLE_STRIP,
        Topology::TriangleFan => glow::TRIANGLE_FAN,
        Topology::Triangles => glow::TRIANGLES,
        Topology::Lines => glow::LINES,
        Topology::LineStrip => glow::LINE_STRIP,
        Topology::LineLoop => glow::LINE_LOOP,
    }
}

pub struct GlesDevice {
    gl: glow::Context,
    surface: Box<dyn Surface>,
    caps: Capabilities,
    textures: HashMap<TextureId, glow::Texture>,
    programs: HashMap<ProgramId, glow::Program>,
    uniforms: Vec<glow::UniformLocation>,
    uniform_ids: HashMap<(ProgramId, String), UniformId>,
    next_id: u32,
    vao: glow::VertexArray,
    vbo: glow::Buffer,
    ibo: glow::Buffer,
    target_fbo: glow::Framebuffer,
    read_fbo: glow::Framebuffer,
    /// `None` while the default framebuffer is the target.
    bound_fbo: Option<glow::Framebuffer>,
    attached: usize,
    /// What the renderer bound on each unit, restored after texture uploads.
    unit_textures: Vec<Option<glow::Texture>>,
    active_unit: usize,
    depth_test: bool,
}

impl GlesDevice {
    /// # Safety
    ///
    /// A GLES 3 context must be current on this thread and stay current for
    /// the lifetime of the device.
    pub unsafe fn from_loader<F>(loader: F, surface: Box<dyn Surface>) -> Result<Self>
    where
        F: FnMut(&str) -> *const c_void,
    {
        let gl = unsafe { glow::Context::from_loader_function(loader) };
        unsafe { Self::new(gl, surface) }
    }

    /// # Safety
    ///
    /// See [`GlesDevice::from_loader`].
    pub unsafe fn new(gl: glow::Context, surface: Box<dyn Surface>) -> Result<Self> {
        let device = |e: String| DisplayError::Device(e);
        let (vao, vbo, ibo, target_fbo, read_fbo, caps) = unsafe {
            let vao = gl.create_vertex_array().map_err(device)?;
            let vbo = gl.create_buffer().map_err(device)?;
            let ibo = gl.create_buffer().map_err(device)?;
            let target_fbo = gl.create_framebuffer().map_err(device)?;
            let read_fbo = gl.create_framebuffer().map_err(device)?;

            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ibo));
            let stride = gl_count(std::mem::size_of::<Vertex>());
            gl.enable_vertex_attrib_array(ATTRIBUTE_POSITION);
            gl.vertex_attrib_pointer_f32(ATTRIBUTE_POSITION, 2, glow::FLOAT, false, stride, 0);
            gl.enable_vertex_attrib_array(ATTRIBUTE_TEXCOORD);
            gl.vertex_attrib_pointer_f32(ATTRIBUTE_TEXCOORD, 2, glow::FLOAT, false, stride, 8);
            gl.enable_vertex_attrib_array(ATTRIBUTE_COLOR);
            gl.vertex_attrib_pointer_f32(ATTRIBUTE_COLOR, 4, glow::UNSIGNED_BYTE, true, stride, 16);

            gl.disable(glow::DEPTH_TEST);
            gl.disable(glow::CULL_FACE);
            gl.disable(glow::SCISSOR_TEST);
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);

            let units = gl.get_parameter_i32(glow::MAX_COMBINED_TEXTURE_IMAGE_UNITS).max(1) as usize;
            let draw_buffers = gl.get_parameter_i32(glow::MAX_DRAW_BUFFERS).max(1) as usize;
            let caps = Capabilities {
                texture_units: units.min(MAX_TEXTURE_UNITS),
                draw_buffers,
                npot_textures: true,
            };
            (vao, vbo, ibo, target_fbo, read_fbo, caps)
        };

        log::info!(
            "GLES device: {} texture units, {} draw buffers",
            caps.texture_units,
            caps.draw_buffers
        );

        Ok(Self {
            gl,
            surface,
            caps,
            textures: HashMap::new(),
            programs: HashMap::new(),
            uniforms: Vec::new(),
            uniform_ids: HashMap::new(),
            next_id: 1,
            vao,
            vbo,
            ibo,
            target_fbo,
            read_fbo,
            bound_fbo: None,
            attached: 0,
            unit_textures: vec![None; caps.texture_units],
            active_unit: 0,
            depth_test: false,
        })
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn texture(&self, id: TextureId) -> Option<glow::Texture> {
        self.textures.get(&id).copied()
    }

    fn uniform(&self, id: UniformId) -> Option<&glow::UniformLocation> {
        self.uniforms.get(id.0 as usize)
    }

    /// Puts back the renderer's binding on the active unit.
    fn restore_unit(&self) {
        let tex = self.unit_textures.get(self.active_unit).copied().flatten();
        unsafe { self.gl.bind_texture(glow::TEXTURE_2D, tex) };
    }

    fn select_unit(&mut self, unit: usize, texture: Option<glow::Texture>) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit as u32);
            self.gl.bind_texture(glow::TEXTURE_2D, texture);
        }
        if let Some(slot) = self.unit_textures.get_mut(unit) {
            *slot = texture;
        }
        self.active_unit = unit;
    }

    /// Driver errors are only checked in debug builds, where they are fatal.
    fn gl_check(&self, what: &str) {
        if cfg!(debug_assertions) {
            let err = unsafe { self.gl.get_error() };
            debug_assert!(err == glow::NO_ERROR, "GL error 0x{err:04x} after {what}");
        }
    }

    unsafe fn set_filter(&self, smoothing: bool) {
        let filter = (if smoothing { glow::LINEAR } else { glow::NEAREST }) as i32;
        unsafe {
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, filter);
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, filter);
        }
    }

    unsafe fn compile_stage(&self, kind: u32, source: &str) -> Result<glow::Shader> {
        let gl = &self.gl;
        unsafe {
            let shader = gl.create_shader(kind).map_err(DisplayError::Device)?;
            gl.shader_source(shader, source);
            gl.compile_shader(shader);
            if !gl.get_shader_compile_status(shader) {
                let log = gl.get_shader_info_log(shader);
                gl.delete_shader(shader);
                return Err(DisplayError::ShaderCompile(log));
            }
            Ok(shader)
        }
    }
}

impl GpuDevice for GlesDevice {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn create_texture(&mut self, width: u32, height: u32, pixels: Option<&[u8]>, smoothing: bool) -> Result<TextureId> {
        let gl = &self.gl;
        let texture = unsafe {
            let texture = gl.create_texture().map_err(DisplayError::Device)?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA8 as i32,
                gl_size(width),
                gl_size(height),
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelUnpackData::Slice(pixels),
            );
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
            self.set_filter(smoothing);
            texture
        };
        self.restore_unit();
        self.gl_check("create_texture");

        let id = TextureId(self.next());
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn update_texture(&mut self, texture: TextureId, width: u32, height: u32, pixels: &[u8]) -> Result<()> {
        let tex = self.texture(texture).ok_or(DisplayError::InvalidHandle)?;
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(tex));
            self.gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                0,
                0,
                0,
                gl_size(width),
                gl_size(height),
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelUnpackData::Slice(Some(pixels)),
            );
        }
        self.restore_unit();
        self.gl_check("update_texture");
        Ok(())
    }

    fn read_texture(&mut self, texture: TextureId, width: u32, height: u32, out: &mut [u8]) -> Result<()> {
        let tex = self.texture(texture).ok_or(DisplayError::InvalidHandle)?;
        let gl = &self.gl;
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(self.read_fbo));
            gl.framebuffer_texture_2d(glow::FRAMEBUFFER, glow::COLOR_ATTACHMENT0, glow::TEXTURE_2D, Some(tex), 0);
            if gl.check_framebuffer_status(glow::FRAMEBUFFER) != glow::FRAMEBUFFER_COMPLETE {
                return Err(DisplayError::Device("readback framebuffer incomplete".into()));
            }
            gl.read_pixels(
                0,
                0,
                gl_size(width),
                gl_size(height),
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelPackData::Slice(Some(out)),
            );
        }
        self.gl_check("read_texture");
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Some(tex) = self.textures.remove(&texture) {
            for slot in self.unit_textures.iter_mut().filter(|s| **s == Some(tex)) {
                *slot = None;
            }
            unsafe { self.gl.delete_texture(tex) };
        }
    }

    fn bind_texture(&mut self, unit: usize, texture: TextureId) {
        let tex = self.texture(texture);
        self.select_unit(unit, tex);
    }

    fn set_smoothing(&mut self, unit: usize, texture: TextureId, smoothing: bool) {
        let tex = self.texture(texture);
        self.select_unit(unit, tex);
        unsafe { self.set_filter(smoothing) };
    }

    fn copy_screen_to_texture(&mut self, texture: TextureId, width: u32, height: u32) {
        let tex = self.texture(texture);
        let gl = &self.gl;
        unsafe {
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, None);
            gl.bind_texture(glow::TEXTURE_2D, tex);
            gl.copy_tex_sub_image_2d(glow::TEXTURE_2D, 0, 0, 0, 0, 0, gl_size(width), gl_size(height));
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, self.bound_fbo);
        }
        self.restore_unit();
        self.gl_check("copy_screen_to_texture");
    }

    fn bind_render_targets(&mut self, targets: &[TextureId]) -> Result<()> {
        if targets.len() > self.caps.draw_buffers {
            return Err(DisplayError::Device(format!(
                "{} color attachments requested, {} supported",
                targets.len(),
                self.caps.draw_buffers
            )));
        }
        let gl = &self.gl;
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(self.target_fbo));
            let mut buffers = Vec::with_capacity(targets.len());
            for (i, target) in targets.iter().enumerate() {
                let attachment = glow::COLOR_ATTACHMENT0 + i as u32;
                let tex = self.textures.get(target).copied();
                gl.framebuffer_texture_2d(glow::FRAMEBUFFER, attachment, glow::TEXTURE_2D, tex, 0);
                buffers.push(attachment);
            }
            for i in targets.len()..self.attached {
                let attachment = glow::COLOR_ATTACHMENT0 + i as u32;
                gl.framebuffer_texture_2d(glow::FRAMEBUFFER, attachment, glow::TEXTURE_2D, None, 0);
            }
            gl.draw_buffers(&buffers);

            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            if status != glow::FRAMEBUFFER_COMPLETE {
                gl.bind_framebuffer(glow::FRAMEBUFFER, self.bound_fbo);
                return Err(DisplayError::Device(format!("framebuffer incomplete: 0x{status:04x}")));
            }
        }
        self.attached = targets.len();
        self.bound_fbo = Some(self.target_fbo);
        Ok(())
    }

    fn bind_screen(&mut self) {
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, None) };
        self.bound_fbo = None;
    }

    fn set_viewport(&mut self, rect: RectI) {
        unsafe { self.gl.viewport(rect.x, rect.y, rect.w, rect.h) };
    }

    fn set_scissor(&mut self, rect: Option<RectI>) {
        unsafe {
            match rect {
                Some(r) => {
                    self.gl.enable(glow::SCISSOR_TEST);
                    self.gl.scissor(r.x, r.y, r.w, r.h);
                }
                None => self.gl.disable(glow::SCISSOR_TEST),
            }
        }
    }

    fn set_blend(&mut self, mode: BlendMode) {
        let gl = &self.gl;
        unsafe {
            let (src, dst) = match mode {
                BlendMode::None => {
                    gl.disable(glow::BLEND);
                    return;
                }
                BlendMode::Alpha => (glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA),
                BlendMode::Multiply => (glow::DST_COLOR, glow::ONE_MINUS_SRC_ALPHA),
                BlendMode::Add => (glow::SRC_ALPHA, glow::ONE),
                BlendMode::Premultiplied => (glow::ONE, glow::ONE_MINUS_SRC_ALPHA),
            };
            gl.enable(glow::BLEND);
            gl.blend_func(src, dst);
        }
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
        unsafe {
            if enabled {
                // Sprites all sit at z = 0; later draws at the same depth still pass.
                self.gl.enable(glow::DEPTH_TEST);
                self.gl.depth_func(glow::LEQUAL);
                self.gl.depth_mask(true);
            } else {
                self.gl.disable(glow::DEPTH_TEST);
            }
        }
    }

    fn clear(&mut self, color: Rgba) {
        let [r, g, b, a] = color.to_f32();
        let mut mask = glow::COLOR_BUFFER_BIT;
        unsafe {
            self.gl.clear_color(r, g, b, a);
            if self.depth_test {
                self.gl.clear_depth_f32(1.0);
                mask |= glow::DEPTH_BUFFER_BIT;
            }
            self.gl.clear(mask);
        }
    }

    fn compile_program(&mut self, vertex_src: &str, fragment_src: &str) -> Result<ProgramId> {
        let program = unsafe {
            let vs = self.compile_stage(glow::VERTEX_SHADER, vertex_src)?;
            let fs = match self.compile_stage(glow::FRAGMENT_SHADER, fragment_src) {
                Ok(fs) => fs,
                Err(err) => {
                    self.gl.delete_shader(vs);
                    return Err(err);
                }
            };

            let gl = &self.gl;
            let program = gl.create_program().map_err(DisplayError::Device)?;
            gl.attach_shader(program, vs);
            gl.attach_shader(program, fs);
            for (index, name) in ATTRIBUTE_NAMES {
                gl.bind_attrib_location(program, index, name);
            }
            gl.link_program(program);
            let linked = gl.get_program_link_status(program);
            gl.detach_shader(program, vs);
            gl.detach_shader(program, fs);
            gl.delete_shader(vs);
            gl.delete_shader(fs);
            if !linked {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(DisplayError::ShaderCompile(log));
            }
            program
        };

        let id = ProgramId(self.next());
        self.programs.insert(id, program);
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if let Some(p) = self.programs.remove(&program) {
            unsafe { self.gl.delete_program(p) };
        }
        self.uniform_ids.retain(|(owner, _), _| *owner != program);
    }

    fn use_program(&mut self, program: ProgramId) {
        let p = self.programs.get(&program).copied();
        unsafe { self.gl.use_program(p) };
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformId> {
        if let Some(&id) = self.uniform_ids.get(&(program, name.to_string())) {
            return Some(id);
        }
        let p = *self.programs.get(&program)?;
        let location = unsafe { self.gl.get_uniform_location(p, name) }?;
        let id = UniformId(self.uniforms.len() as u32);
        self.uniforms.push(location);
        self.uniform_ids.insert((program, name.to_string()), id);
        Some(id)
    }

    fn set_uniform_i32(&mut self, location: UniformId, value: i32) {
        unsafe { self.gl.uniform_1_i32(self.uniform(location), value) };
    }

    fn set_uniform_f32(&mut self, location: UniformId, value: f32) {
        unsafe { self.gl.uniform_1_f32(self.uniform(location), value) };
    }

    fn set_uniform_vec3(&mut self, location: UniformId, value: [f32; 3]) {
        unsafe { self.gl.uniform_3_f32(self.uniform(location), value[0], value[1], value[2]) };
    }

    fn set_uniform_mat4(&mut self, location: UniformId, value: &[f32; 16]) {
        unsafe { self.gl.uniform_matrix_4_f32_slice(self.uniform(location), false, value) };
    }

    fn set_quad_indices(&mut self, indices: &[u16]) {
        unsafe {
            self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(self.ibo));
            self.gl
                .buffer_data_u8_slice(glow::ELEMENT_ARRAY_BUFFER, bytemuck::cast_slice(indices), glow::STATIC_DRAW);
        }
    }

    fn upload_vertices(&mut self, vertices: &[Vertex]) {
        unsafe {
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo));
            self.gl
                .buffer_data_u8_slice(glow::ARRAY_BUFFER, bytemuck::cast_slice(vertices), glow::STREAM_DRAW);
        }
    }

    fn upload_indices(&mut self, indices: &[u16]) {
        unsafe {
            self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(self.ibo));
            self.gl
                .buffer_data_u8_slice(glow::ELEMENT_ARRAY_BUFFER, bytemuck::cast_slice(indices), glow::STREAM_DRAW);
        }
    }

    fn draw_elements(&mut self, topology: Topology, count: usize) {
        unsafe {
            self.gl.draw_elements(topology_mode(topology), gl_count(count), glow::UNSIGNED_SHORT, 0);
        }
        self.gl_check("draw_elements");
    }

    fn draw_arrays(&mut self, topology: Topology, count: usize) {
        unsafe { self.gl.draw_arrays(topology_mode(topology), 0, gl_count(count)) };
        self.gl_check("draw_arrays");
    }

    fn set_vsync(&mut self, enabled: bool) -> Result<()> {
        self.surface.set_swap_interval(i32::from(enabled))
    }

    fn present(&mut self) -> Result<()> {
        self.surface.swap_buffers()
    }
}

impl Drop for GlesDevice {
    fn drop(&mut self) {
        unsafe {
            for (_, tex) in self.textures.drain() {
                self.gl.delete_texture(tex);
            }
            for (_, program) in self.programs.drain() {
                self.gl.delete_program(program);
            }
            self.gl.delete_framebuffer(self.target_fbo);
            self.gl.delete_framebuffer(self.read_fbo);
            self.gl.delete_buffer(self.vbo);
            self.gl.delete_buffer(self.ibo);
            self.gl.delete_vertex_array(self.vao);
        }
    }
}
