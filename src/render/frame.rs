use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};

/// Inward UV bias, in texels, applied at sprite edges against atlas bleeding.
pub const BORDER_FIX: f32 = 0.1;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::new(255, 255, 255, 255);
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_f32(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a].map(|c| c as f32 / 255.0)
    }

    /// Component-wise product, as the fixed-function tint would do it.
    pub fn modulate(self, other: Rgba) -> Rgba {
        let m = |a: u8, b: u8| ((a as u16 * b as u16 + 127) / 255) as u8;
        Rgba::new(m(self.r, other.r), m(self.g, other.g), m(self.b, other.b), m(self.a, other.a))
    }

    pub fn from_u32(packed: u32) -> Self {
        let [r, g, b, a] = packed.to_le_bytes();
        Self { r, g, b, a }
    }

    pub fn to_u32(self) -> u32 {
        u32::from_le_bytes([self.r, self.g, self.b, self.a])
    }
}

/// Batched vertex layout: position, texture coordinate, packed color.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
    pub u: f32,
    pub v: f32,
    pub rgba: Rgba,
}

impl Vertex {
    pub const fn new(x: f32, y: f32, u: f32, v: f32, rgba: Rgba) -> Self {
        Self { x, y, u, v, rgba }
    }
}

/// 2x3 affine transform: `x' = a*x + c*y + tx`, `y' = b*x + d*y + ty`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix2D {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Default for Matrix2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix2D {
    pub const IDENTITY: Matrix2D = Matrix2D { a: 1.0, b: 0.0, c: 0.0, d: 1.0, tx: 0.0, ty: 0.0 };

    /// Scale and rotate around `pivot` (in source space), then place the pivot at `pos`.
    pub fn from_transform(pos: (f32, f32), scale: (f32, f32), rotation: f32, pivot: (f32, f32)) -> Self {
        let (sin, cos) = if rotation == 0.0 { (0.0, 1.0) } else { rotation.sin_cos() };
        let a = scale.0 * cos;
        let b = scale.0 * sin;
        let c = -scale.1 * sin;
        let d = scale.1 * cos;
        Self {
            a,
            b,
            c,
            d,
            tx: pos.0 - (a * pivot.0 + c * pivot.1),
            ty: pos.1 - (b * pivot.0 + d * pivot.1),
        }
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (self.a * x + self.c * y + self.tx, self.b * x + self.d * y + self.ty)
    }

    pub fn is_identity(&self) -> bool {
        self.is_translation() && approx_eq_f32(self.tx, 0.0) && approx_eq_f32(self.ty, 0.0)
    }

    pub fn is_translation(&self) -> bool {
        approx_eq_f32(self.a, 1.0)
            && approx_eq_f32(self.d, 1.0)
            && approx_eq_f32(self.b, 0.0)
            && approx_eq_f32(self.c, 0.0)
    }
}

/// Placement of a bitmap: pivot in source space, destination, scale, rotation, tiling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayTransform {
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

impl Default for DisplayTransform {
    fn default() -> Self {
        Self {
            src_x: 0.0,
            src_y: 0.0,
            dst_x: 0.0,
            dst_y: 0.0,
            repeat_x: 1.0,
            repeat_y: 1.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
        }
    }
}

impl DisplayTransform {
    pub fn at(x: f32, y: f32) -> Self {
        Self { dst_x: x, dst_y: y, ..Self::default() }
    }

    pub fn matrix(&self) -> Matrix2D {
        Matrix2D::from_transform(
            (self.dst_x, self.dst_y),
            (self.scale_x, self.scale_y),
            self.rotation,
            (self.src_x, self.src_y),
        )
    }

    pub fn is_repeated(&self) -> bool {
        self.repeat_x != 1.0 || self.repeat_y != 1.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendMode {
    None,
    Alpha,
    Multiply,
    Add,
    Premultiplied,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Smoothing {
    #[default]
    Default,
    On,
    Off,
}

impl Smoothing {
    pub fn resolve(self, default: bool) -> bool {
        match self {
            Smoothing::On => true,
            Smoothing::Off => false,
            Smoothing::Default => default,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topology {
    TriangleStrip,
    TriangleFan,
    Triangles,
    Lines,
    LineStrip,
    LineLoop,
}

/// How vertex data reaches the GPU: batched quads with the static quad
/// index buffer, or a mesh uploaded in bulk with its own indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferMode {
    Indirect,
    Direct,
}

/// Sub-rectangle of a bitmap, in logical pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClipBox {
    pub tlx: f32,
    pub tly: f32,
    pub brx: f32,
    pub bry: f32,
}

impl ClipBox {
    pub fn new(tlx: f32, tly: f32, brx: f32, bry: f32) -> Self {
        Self { tlx, tly, brx, bry }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    pub fn width(&self) -> f32 {
        self.brx - self.tlx
    }

    pub fn height(&self) -> f32 {
        self.bry - self.tly
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TexUvRect {
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
}

impl TexUvRect {
    /// UVs of `clip` inset by `border` texels on every side.
    pub fn from_clip(clip: &ClipBox, recip_w: f32, recip_h: f32, border: f32) -> Self {
        Self {
            u0: recip_w * (clip.tlx + border),
            v0: recip_h * (clip.tly + border),
            u1: recip_w * (clip.brx - border),
            v1: recip_h * (clip.bry - border),
        }
    }
}

/// Integer rectangle in destination pixels (viewport, scissor).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RectI {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// Column-major 4x4 projection, ready for `glUniformMatrix4fv`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectionMatrix(pub [f32; 16]);

impl ProjectionMatrix {
    pub fn ortho(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        let mut m = [0.0; 16];
        m[0] = 2.0 / (right - left);
        m[5] = 2.0 / (top - bottom);
        m[10] = -2.0 / (far - near);
        m[12] = -(right + left) / (right - left);
        m[13] = -(top + bottom) / (top - bottom);
        m[14] = -(far + near) / (far - near);
        m[15] = 1.0;
        Self(m)
    }

    /// Screen space: origin top-left, y down.
    pub fn for_screen(width: f32, height: f32) -> Self {
        Self::ortho(0.0, width, height, 0.0, -1.0, 1.0)
    }

    /// Texture targets are addressed bottom-up, so y is flipped relative to the screen.
    pub fn for_texture(width: f32, height: f32) -> Self {
        Self::ortho(0.0, width, 0.0, height, -1.0, 1.0)
    }

    pub fn transform(&self, x: f32, y: f32) -> (f32, f32) {
        let m = &self.0;
        (m[0] * x + m[4] * y + m[12], m[1] * x + m[5] * y + m[13])
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Glyph {
    pub x: f32,
    pub y: f32,
    pub width: f32,
}

/// Font atlas layout: glyph rectangles share one character height.
#[derive(Clone, Debug, Default)]
pub struct CharacterMap {
    pub character_height: f32,
    pub glyphs: HashMap<char, Glyph>,
}

impl CharacterMap {
    pub fn new(character_height: f32) -> Self {
        Self { character_height, glyphs: HashMap::new() }
    }

    pub fn with_glyph(mut self, ch: char, glyph: Glyph) -> Self {
        self.glyphs.insert(ch, glyph);
        self
    }
}

pub(crate) fn approx_eq_f32(a: f32, b: f32) -> bool {
    (a - b).abs() <= 0.0001
}
