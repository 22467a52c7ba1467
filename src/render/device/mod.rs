#[cfg(feature = "gles")]
pub mod gles;
pub mod headless;

use crate::error::Result;
use crate::render::frame::{BlendMode, RectI, Rgba, Topology, Vertex};

/// Device-side texture name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniformId(pub u32);

/// Attribute slots every program is linked against.
pub const ATTRIBUTE_POSITION: u32 = 0;
pub const ATTRIBUTE_TEXCOORD: u32 = 1;
pub const ATTRIBUTE_COLOR: u32 = 2;

pub const ATTRIBUTE_NAMES: [(u32, &str); 3] = [
    (ATTRIBUTE_POSITION, "_vPosition_"),
    (ATTRIBUTE_TEXCOORD, "_vTexCoord_"),
    (ATTRIBUTE_COLOR, "_vColor_"),
];

/// Limits queried once at init.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub texture_units: usize,
    pub draw_buffers: usize,
    pub npot_textures: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self { texture_units: 8, draw_buffers: 4, npot_textures: true }
    }
}

/// Graphics API surface used by the renderer.
///
/// Design rule: only `render/device/*` can touch platform APIs. Everything
/// above this trait is batching and bookkeeping.
pub trait GpuDevice {
    fn capabilities(&self) -> Capabilities;

    /// Allocates an RGBA8 texture. `pixels`, when given, is `width * height * 4` bytes.
    fn create_texture(&mut self, width: u32, height: u32, pixels: Option<&[u8]>, smoothing: bool) -> Result<TextureId>;
    fn update_texture(&mut self, texture: TextureId, width: u32, height: u32, pixels: &[u8]) -> Result<()>;
    fn read_texture(&mut self, texture: TextureId, width: u32, height: u32, out: &mut [u8]) -> Result<()>;
    fn delete_texture(&mut self, texture: TextureId);

    /// Makes `unit` active and binds `texture` to it.
    fn bind_texture(&mut self, unit: usize, texture: TextureId);
    /// Changes filtering of the texture bound on `unit`.
    fn set_smoothing(&mut self, unit: usize, texture: TextureId, smoothing: bool);
    /// Copies the lower-left `width x height` of the default framebuffer into `texture`.
    fn copy_screen_to_texture(&mut self, texture: TextureId, width: u32, height: u32);

    fn bind_render_targets(&mut self, targets: &[TextureId]) -> Result<()>;
    fn bind_screen(&mut self);
    fn set_viewport(&mut self, rect: RectI);
    fn set_scissor(&mut self, rect: Option<RectI>);
    fn set_blend(&mut self, mode: BlendMode);
    /// Turns depth testing on or off. `clear` also clears depth while it is on.
    fn set_depth_test(&mut self, enabled: bool);
    fn clear(&mut self, color: Rgba);

    fn compile_program(&mut self, vertex_src: &str, fragment_src: &str) -> Result<ProgramId>;
    fn delete_program(&mut self, program: ProgramId);
    fn use_program(&mut self, program: ProgramId);
    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformId>;
    fn set_uniform_i32(&mut self, location: UniformId, value: i32);
    fn set_uniform_f32(&mut self, location: UniformId, value: f32);
    fn set_uniform_vec3(&mut self, location: UniformId, value: [f32; 3]);
    fn set_uniform_mat4(&mut self, location: UniformId, value: &[f32; 16]);

    /// Installs the static quad index buffer used by indirect (batched) drawing.
    fn set_quad_indices(&mut self, indices: &[u16]);
    fn upload_vertices(&mut self, vertices: &[Vertex]);
    /// Replaces the bound index buffer contents (direct mode).
    fn upload_indices(&mut self, indices: &[u16]);
    fn draw_elements(&mut self, topology: Topology, count: usize);
    fn draw_arrays(&mut self, topology: Topology, count: usize);

    fn set_vsync(&mut self, enabled: bool) -> Result<()>;
    fn present(&mut self) -> Result<()>;
}

impl<D: GpuDevice + ?Sized> GpuDevice for Box<D> {
    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }
    fn create_texture(&mut self, width: u32, height: u32, pixels: Option<&[u8]>, smoothing: bool) -> Result<TextureId> {
        (**self).create_texture(width, height, pixels, smoothing)
    }
    fn update_texture(&mut self, texture: TextureId, width: u32, height: u32, pixels: &[u8]) -> Result<()> {
        (**self).update_texture(texture, width, height, pixels)
    }
    fn read_texture(&mut self, texture: TextureId, width: u32, height: u32, out: &mut [u8]) -> Result<()> {
        (**self).read_texture(texture, width, height, out)
    }
    fn delete_texture(&mut self, texture: TextureId) {
        (**self).delete_texture(texture)
    }
    fn bind_texture(&mut self, unit: usize, texture: TextureId) {
        (**self).bind_texture(unit, texture)
    }
    fn set_smoothing(&mut self, unit: usize, texture: TextureId, smoothing: bool) {
        (**self).set_smoothing(unit, texture, smoothing)
    }
    fn copy_screen_to_texture(&mut self, texture: TextureId, width: u32, height: u32) {
        (**self).copy_screen_to_texture(texture, width, height)
    }
    fn bind_render_targets(&mut self, targets: &[TextureId]) -> Result<()> {
        (**self).bind_render_targets(targets)
    }
    fn bind_screen(&mut self) {
        (**self).bind_screen()
    }
    fn set_viewport(&mut self, rect: RectI) {
        (**self).set_viewport(rect)
    }
    fn set_scissor(&mut self, rect: Option<RectI>) {
        (**self).set_scissor(rect)
    }
    fn set_blend(&mut self, mode: BlendMode) {
        (**self).set_blend(mode)
    }
    fn set_depth_test(&mut self, enabled: bool) {
        (**self).set_depth_test(enabled)
    }
    fn clear(&mut self, color: Rgba) {
        (**self).clear(color)
    }
    fn compile_program(&mut self, vertex_src: &str, fragment_src: &str) -> Result<ProgramId> {
        (**self).compile_program(vertex_src, fragment_src)
    }
    fn delete_program(&mut self, program: ProgramId) {
        (**self).delete_program(program)
    }
    fn use_program(&mut self, program: ProgramId) {
        (**self).use_program(program)
    }
    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformId> {
        (**self).uniform_location(program, name)
    }
    fn set_uniform_i32(&mut self, location: UniformId, value: i32) {
        (**self).set_uniform_i32(location, value)
    }
    fn set_uniform_f32(&mut self, location: UniformId, value: f32) {
        (**self).set_uniform_f32(location, value)
    }
    fn set_uniform_vec3(&mut self, location: UniformId, value: [f32; 3]) {
        (**self).set_uniform_vec3(location, value)
    }
    fn set_uniform_mat4(&mut self, location: UniformId, value: &[f32; 16]) {
        (**self).set_uniform_mat4(location, value)
    }
    fn set_quad_indices(&mut self, indices: &[u16]) {
        (**self).set_quad_indices(indices)
    }
    fn upload_vertices(&mut self, vertices: &[Vertex]) {
        (**self).upload_vertices(vertices)
    }
    fn upload_indices(&mut self, indices: &[u16]) {
        (**self).upload_indices(indices)
    }
    fn draw_elements(&mut self, topology: Topology, count: usize) {
        (**self).draw_elements(topology, count)
    }
    fn draw_arrays(&mut self, topology: Topology, count: usize) {
        (**self).draw_arrays(topology, count)
    }
    fn set_vsync(&mut self, enabled: bool) -> Result<()> {
        (**self).set_vsync(enabled)
    }
    fn present(&mut self) -> Result<()> {
        (**self).present()
    }
}
