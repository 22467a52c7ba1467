use crate::error::{DisplayError, Result};
use crate::render::cache::{Slab, SlotKey};
use crate::render::device::TextureId;
use crate::render::frame::{ClipBox, Rgba, TexUvRect};

/// Stable handle to a bitmap. Stale handles fail with `InvalidHandle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BitmapId(pub(crate) SlotKey);

impl BitmapId {
    pub fn to_raw(self) -> u64 {
        self.0.to_raw()
    }

    pub fn from_raw(raw: u64) -> Option<Self> {
        SlotKey::from_raw(raw).map(Self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    Ready,
    /// Backed by a placeholder texture until the decode lands.
    Loading { delete_requested: bool },
}

/// Texture handle plus the CPU-side metadata needed to build vertices.
#[derive(Clone, Debug)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub real_width: u32,
    pub real_height: u32,
    pub recip_real_width: f32,
    pub recip_real_height: f32,
    pub clip: ClipBox,
    pub color: Rgba,
    pub smoothing: bool,
    pub texture: Option<TextureId>,
    pub load: LoadState,
}

impl Bitmap {
    /// `npot` false rounds the allocated size up to powers of two.
    pub fn new(width: u32, height: u32, npot: bool, smoothing: bool) -> Self {
        let mut bitmap = Self {
            width: 0,
            height: 0,
            real_width: 0,
            real_height: 0,
            recip_real_width: 0.0,
            recip_real_height: 0.0,
            clip: ClipBox::default(),
            color: Rgba::WHITE,
            smoothing,
            texture: None,
            load: LoadState::Ready,
        };
        bitmap.resize(width, height, npot);
        bitmap
    }

    /// Resets size, real size and clip box.
    pub fn resize(&mut self, width: u32, height: u32, npot: bool) {
        let round = |n: u32| if npot { n.max(1) } else { n.max(1).next_power_of_two() };
        self.width = width;
        self.height = height;
        self.real_width = round(width);
        self.real_height = round(height);
        self.recip_real_width = 1.0 / self.real_width as f32;
        self.recip_real_height = 1.0 / self.real_height as f32;
        self.clip = ClipBox::full(width, height);
    }

    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    pub fn uv_rect(&self, border: f32) -> TexUvRect {
        TexUvRect::from_clip(&self.clip, self.recip_real_width, self.recip_real_height, border)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.load, LoadState::Loading { .. })
    }
}

/// Bitmap pool. Slot 0 is the screen, which lives as long as the store.
pub struct BitmapStore {
    slab: Slab<Bitmap>,
    screen: BitmapId,
}

impl BitmapStore {
    pub fn new(screen_width: u32, screen_height: u32, smoothing: bool) -> Self {
        let mut slab = Slab::new();
        let screen = BitmapId(slab.insert(Bitmap::new(screen_width, screen_height, true, smoothing)));
        Self { slab, screen }
    }

    pub fn screen(&self) -> BitmapId {
        self.screen
    }

    pub fn is_screen(&self, id: BitmapId) -> bool {
        id == self.screen
    }

    pub fn insert(&mut self, bitmap: Bitmap) -> BitmapId {
        BitmapId(self.slab.insert(bitmap))
    }

    pub fn get(&self, id: BitmapId) -> Result<&Bitmap> {
        self.slab.get(id.0).ok_or(DisplayError::InvalidHandle)
    }

    pub fn get_mut(&mut self, id: BitmapId) -> Result<&mut Bitmap> {
        self.slab.get_mut(id.0).ok_or(DisplayError::InvalidHandle)
    }

    pub fn contains(&self, id: BitmapId) -> bool {
        self.slab.contains(id.0)
    }

    /// Removes a bitmap from the pool. The screen cannot be removed.
    pub fn remove(&mut self, id: BitmapId) -> Result<Bitmap> {
        if self.is_screen(id) {
            return Err(DisplayError::ScreenNotAllowed);
        }
        self.slab.remove(id.0).ok_or(DisplayError::InvalidHandle)
    }

    pub fn ids(&self) -> Vec<BitmapId> {
        self.slab.keys().map(BitmapId).collect()
    }

    /// Number of bitmaps, screen included.
    pub fn len(&self) -> usize {
        self.slab.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pot_rounding_keeps_logical_size() {
        let b = Bitmap::new(100, 60, false, true);
        assert_eq!((b.width, b.height), (100, 60));
        assert_eq!((b.real_width, b.real_height), (128, 64));
        assert_eq!(b.clip, ClipBox::new(0.0, 0.0, 100.0, 60.0));
        assert_eq!(b.byte_len(), 100 * 60 * 4);

        let b = Bitmap::new(100, 60, true, true);
        assert_eq!((b.real_width, b.real_height), (100, 60));
    }

    #[test]
    fn border_fix_keeps_uvs_strictly_inside() {
        let b = Bitmap::new(100, 100, false, true);
        assert_eq!(b.real_width, 128);
        let uv = b.uv_rect(crate::render::frame::BORDER_FIX);
        for c in [uv.u0, uv.v0, uv.u1, uv.v1] {
            assert!(c > 0.0 && c < 1.0, "{c}");
        }
        assert!(uv.u0 < uv.u1 && uv.v0 < uv.v1);
    }

    #[test]
    fn screen_cannot_be_removed() {
        let mut store = BitmapStore::new(320, 200, true);
        let screen = store.screen();
        assert_eq!(store.remove(screen).unwrap_err(), DisplayError::ScreenNotAllowed);
        let id = store.insert(Bitmap::new(8, 8, true, false));
        assert!(store.remove(id).is_ok());
        assert_eq!(store.get(id).unwrap_err(), DisplayError::InvalidHandle);
        assert_eq!(store.len(), 1);
    }
}
