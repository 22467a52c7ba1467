use std::collections::HashMap;

use crate::error::{DisplayError, Result};
use crate::render::device::{Capabilities, GpuDevice, ProgramId, TextureId, UniformId};
use crate::render::frame::{BlendMode, RectI, Rgba, Topology, Vertex};

/// Everything the renderer asked the device to do, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceCall {
    CreateTexture { texture: TextureId, width: u32, height: u32 },
    UpdateTexture { texture: TextureId },
    ReadTexture { texture: TextureId },
    DeleteTexture(TextureId),
    BindTexture { unit: usize, texture: TextureId },
    SetSmoothing { unit: usize, texture: TextureId, smoothing: bool },
    CopyScreen { texture: TextureId },
    BindRenderTargets(Vec<TextureId>),
    BindScreen,
    Viewport(RectI),
    Scissor(Option<RectI>),
    Blend(BlendMode),
    DepthTest(bool),
    Clear(Rgba),
    CompileProgram(ProgramId),
    DeleteProgram(ProgramId),
    UseProgram(ProgramId),
    UniformI32 { location: UniformId, value: i32 },
    UniformF32 { location: UniformId, value: f32 },
    UniformVec3 { location: UniformId, value: [f32; 3] },
    UniformMat4 { location: UniformId },
    QuadIndices(usize),
    UploadVertices(Vec<Vertex>),
    UploadIndices(Vec<u16>),
    DrawElements { topology: Topology, count: usize },
    DrawArrays { topology: Topology, count: usize },
    VSync(bool),
    Present,
}

struct ProgramInfo {
    source: String,
    uniforms: HashMap<String, UniformId>,
}

/// Device that keeps texture contents in memory and records every call.
///
/// Backs the `dummy` backend and the renderer tests.
pub struct HeadlessDevice {
    caps: Capabilities,
    calls: Vec<DeviceCall>,
    textures: HashMap<TextureId, Vec<u8>>,
    programs: HashMap<ProgramId, ProgramInfo>,
    next_id: u32,
    /// Fragment sources containing this marker fail to compile.
    pub fail_marker: Option<String>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(Capabilities::default())
    }
}

impl HeadlessDevice {
    pub fn new(caps: Capabilities) -> Self {
        Self {
            caps,
            calls: Vec::new(),
            textures: HashMap::new(),
            programs: HashMap::new(),
            next_id: 1,
            fail_marker: None,
        }
    }

    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<DeviceCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Indexed draw calls recorded so far, one per shader pass per flush.
    pub fn draw_count(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, DeviceCall::DrawElements { .. })).count()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn texture_data(&self, texture: TextureId) -> Option<&[u8]> {
        self.textures.get(&texture).map(Vec::as_slice)
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl GpuDevice for HeadlessDevice {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn create_texture(&mut self, width: u32, height: u32, pixels: Option<&[u8]>, _smoothing: bool) -> Result<TextureId> {
        let texture = TextureId(self.next());
        let len = width as usize * height as usize * 4;
        let data = match pixels {
            Some(p) if p.len() == len => p.to_vec(),
            Some(p) => return Err(DisplayError::SizeMismatch { expected: len, actual: p.len() }),
            None => vec![0; len],
        };
        self.textures.insert(texture, data);
        self.calls.push(DeviceCall::CreateTexture { texture, width, height });
        Ok(texture)
    }

    fn update_texture(&mut self, texture: TextureId, width: u32, height: u32, pixels: &[u8]) -> Result<()> {
        let slot = self
            .textures
            .get_mut(&texture)
            .ok_or_else(|| DisplayError::Device(format!("unknown texture {texture:?}")))?;
        let len = width as usize * height as usize * 4;
        if pixels.len() != len {
            return Err(DisplayError::SizeMismatch { expected: len, actual: pixels.len() });
        }
        *slot = pixels.to_vec();
        self.calls.push(DeviceCall::UpdateTexture { texture });
        Ok(())
    }

    fn read_texture(&mut self, texture: TextureId, _width: u32, _height: u32, out: &mut [u8]) -> Result<()> {
        let data = self
            .textures
            .get(&texture)
            .ok_or_else(|| DisplayError::Device(format!("unknown texture {texture:?}")))?;
        let n = out.len().min(data.len());
        out[..n].copy_from_slice(&data[..n]);
        self.calls.push(DeviceCall::ReadTexture { texture });
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.calls.push(DeviceCall::DeleteTexture(texture));
    }

    fn bind_texture(&mut self, unit: usize, texture: TextureId) {
        self.calls.push(DeviceCall::BindTexture { unit, texture });
    }

    fn set_smoothing(&mut self, unit: usize, texture: TextureId, smoothing: bool) {
        self.calls.push(DeviceCall::SetSmoothing { unit, texture, smoothing });
    }

    fn copy_screen_to_texture(&mut self, texture: TextureId, _width: u32, _height: u32) {
        self.calls.push(DeviceCall::CopyScreen { texture });
    }

    fn bind_render_targets(&mut self, targets: &[TextureId]) -> Result<()> {
        if targets.len() > self.caps.draw_buffers {
            return Err(DisplayError::Device("too many color attachments".into()));
        }
        self.calls.push(DeviceCall::BindRenderTargets(targets.to_vec()));
        Ok(())
    }

    fn bind_screen(&mut self) {
        self.calls.push(DeviceCall::BindScreen);
    }

    fn set_viewport(&mut self, rect: RectI) {
        self.calls.push(DeviceCall::Viewport(rect));
    }

    fn set_scissor(&mut self, rect: Option<RectI>) {
        self.calls.push(DeviceCall::Scissor(rect));
    }

    fn set_blend(&mut self, mode: BlendMode) {
        self.calls.push(DeviceCall::Blend(mode));
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.calls.push(DeviceCall::DepthTest(enabled));
    }

    fn clear(&mut self, color: Rgba) {
        self.calls.push(DeviceCall::Clear(color));
    }

    fn compile_program(&mut self, vertex_src: &str, fragment_src: &str) -> Result<ProgramId> {
        if let Some(marker) = &self.fail_marker {
            if fragment_src.contains(marker.as_str()) {
                return Err(DisplayError::ShaderCompile(format!("0:1: syntax error near `{marker}`")));
            }
        }
        let program = ProgramId(self.next());
        let source = format!("{vertex_src}\n{fragment_src}");
        self.programs.insert(program, ProgramInfo { source, uniforms: HashMap::new() });
        self.calls.push(DeviceCall::CompileProgram(program));
        Ok(program)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.calls.push(DeviceCall::DeleteProgram(program));
    }

    fn use_program(&mut self, program: ProgramId) {
        self.calls.push(DeviceCall::UseProgram(program));
    }

    /// Resolves any name whose base identifier appears in the program source.
    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformId> {
        let base = name.split('[').next().unwrap_or(name);
        if let Some(info) = self.programs.get(&program) {
            if let Some(&loc) = info.uniforms.get(name) {
                return Some(loc);
            }
            if !info.source.contains(base) {
                return None;
            }
        } else {
            return None;
        }
        let loc = UniformId(self.next());
        self.programs.get_mut(&program)?.uniforms.insert(name.to_string(), loc);
        Some(loc)
    }

    fn set_uniform_i32(&mut self, location: UniformId, value: i32) {
        self.calls.push(DeviceCall::UniformI32 { location, value });
    }

    fn set_uniform_f32(&mut self, location: UniformId, value: f32) {
        self.calls.push(DeviceCall::UniformF32 { location, value });
    }

    fn set_uniform_vec3(&mut self, location: UniformId, value: [f32; 3]) {
        self.calls.push(DeviceCall::UniformVec3 { location, value });
    }

    fn set_uniform_mat4(&mut self, location: UniformId, _value: &[f32; 16]) {
        self.calls.push(DeviceCall::UniformMat4 { location });
    }

    fn set_quad_indices(&mut self, indices: &[u16]) {
        self.calls.push(DeviceCall::QuadIndices(indices.len()));
    }

    fn upload_vertices(&mut self, vertices: &[Vertex]) {
        self.calls.push(DeviceCall::UploadVertices(vertices.to_vec()));
    }

    fn upload_indices(&mut self, indices: &[u16]) {
        self.calls.push(DeviceCall::UploadIndices(indices.to_vec()));
    }

    fn draw_elements(&mut self, topology: Topology, count: usize) {
        self.calls.push(DeviceCall::DrawElements { topology, count });
    }

    fn draw_arrays(&mut self, topology: Topology, count: usize) {
        self.calls.push(DeviceCall::DrawArrays { topology, count });
    }

    fn set_vsync(&mut self, enabled: bool) -> Result<()> {
        self.calls.push(DeviceCall::VSync(enabled));
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.calls.push(DeviceCall::Present);
        Ok(())
    }
}
