#![allow(dead_code)]

use display_plugin::render::device::headless::{DeviceCall, HeadlessDevice};
use display_plugin::render::device::{Capabilities, ProgramId};
use display_plugin::render::{BlendMode, Display, Smoothing, Vertex};
use display_plugin::render::BitmapId;
use display_plugin::util::config::{Backend, DisplayConfig, DEFAULT_VERTEX_CAPACITY};

pub const SCREEN_W: u32 = 640;
pub const SCREEN_H: u32 = 480;

pub fn display_with(caps: Capabilities, vertex_capacity: usize) -> Display<HeadlessDevice> {
    let config = DisplayConfig {
        width: SCREEN_W,
        height: SCREEN_H,
        vertex_capacity,
        backend: Backend::Dummy,
        ..DisplayConfig::default()
    };
    Display::new(HeadlessDevice::new(caps), config).unwrap()
}

pub fn display() -> Display<HeadlessDevice> {
    display_with(Capabilities::default(), DEFAULT_VERTEX_CAPACITY)
}

pub fn blit(d: &mut Display<HeadlessDevice>, id: BitmapId, x: f32) {
    d.blit_bitmap(id, x, 0.0, Smoothing::Default, BlendMode::Alpha).unwrap();
}

/// Vertex uploads, one per flush (or immediate draw).
pub fn uploads(d: &Display<HeadlessDevice>) -> Vec<Vec<Vertex>> {
    d.device()
        .calls()
        .iter()
        .filter_map(|c| match c {
            DeviceCall::UploadVertices(v) => Some(v.clone()),
            _ => None,
        })
        .collect()
}

/// The built-in textured program is the first one compiled at init.
pub fn default_program(d: &Display<HeadlessDevice>) -> ProgramId {
    d.device()
        .calls()
        .iter()
        .find_map(|c| match c {
            DeviceCall::CompileProgram(p) => Some(*p),
            _ => None,
        })
        .unwrap()
}

/// Program in use when each indexed draw was issued.
pub fn programs_per_draw(d: &Display<HeadlessDevice>) -> Vec<Option<ProgramId>> {
    let mut current = None;
    let mut out = Vec::new();
    for call in d.device().calls() {
        match call {
            DeviceCall::UseProgram(p) => current = Some(*p),
            DeviceCall::DrawElements { .. } => out.push(current),
            _ => {}
        }
    }
    out
}

pub fn count(d: &Display<HeadlessDevice>, pred: impl Fn(&DeviceCall) -> bool) -> usize {
    d.device().calls().iter().filter(|c| pred(c)).count()
}
