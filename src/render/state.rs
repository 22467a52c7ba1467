use crate::render::cache::bitmaps::BitmapId;
use crate::render::frame::{BlendMode, BufferMode, ProjectionMatrix, RectI};

/// What the GPU currently has set. Every draw-affecting field is only changed
/// after the pending batch has been flushed.
#[derive(Debug)]
pub struct RenderState {
    /// `None` means unknown; the next textured draw re-applies its mode.
    pub blend: Option<BlendMode>,
    pub buffer_mode: BufferMode,
    /// Bitmap on `active_unit`, the one the queued quads sample.
    pub last_bitmap: Option<BitmapId>,
    pub active_unit: usize,
    pub scissor: Option<RectI>,
    pub destinations: Vec<BitmapId>,
    pub projection: ProjectionMatrix,
    pub viewport: RectI,
    /// Screen contents already copied for shader sampling during this flush.
    pub screen_captured: bool,
}

impl RenderState {
    pub fn new(screen: BitmapId, width: u32, height: u32) -> Self {
        Self {
            blend: None,
            buffer_mode: BufferMode::Indirect,
            last_bitmap: None,
            active_unit: 0,
            scissor: None,
            destinations: vec![screen],
            projection: ProjectionMatrix::for_screen(width as f32, height as f32),
            viewport: RectI { x: 0, y: 0, w: width as i32, h: height as i32 },
            screen_captured: false,
        }
    }

    pub fn blend_differs(&self, mode: BlendMode) -> bool {
        self.blend != Some(mode)
    }

    pub fn same_destinations(&self, list: &[BitmapId]) -> bool {
        self.destinations == list
    }

    pub fn primary_destination(&self) -> Option<BitmapId> {
        self.destinations.first().copied()
    }

    pub fn scissor_differs(&self, rect: RectI) -> bool {
        self.scissor != Some(rect)
    }

    /// Scissor rectangle for a clip box on a destination of `height` pixels.
    /// Screen rows count from the bottom; texture targets are already bottom-up.
    pub fn scissor_for(tlx: u32, tly: u32, brx: u32, bry: u32, height: u32, is_screen: bool) -> RectI {
        let y = if is_screen { height as i32 - bry as i32 } else { tly as i32 };
        RectI { x: tlx as i32, y, w: brx as i32 - tlx as i32, h: bry as i32 - tly as i32 }
    }
}
