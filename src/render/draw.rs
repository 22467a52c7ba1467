//! Vertex generation for bitmaps, text, debug primitives and meshes.
//!
//! Quads and glyphs go through the batch. Primitives and meshes are drawn
//! immediately: they flush what is queued, submit, and leave the batch empty.

use std::f32::consts::TAU;

use earcutr::earcut;

use crate::error::{DisplayError, Result};
use crate::render::cache::bitmaps::BitmapId;
use crate::render::device::GpuDevice;
use crate::render::frame::{
    BlendMode, BufferMode, CharacterMap, DisplayTransform, Matrix2D, Rgba, Smoothing, TexUvRect, Topology, Vertex,
    BORDER_FIX,
};
use crate::render::Display;

pub const CIRCLE_SEGMENTS: usize = 32;

/// Largest vertex count a mesh can address with `u16` indices.
pub const MAX_MESH_VERTICES: usize = u16::MAX as usize + 1;

/// Per-axis tiling limit.
pub const MAX_REPEAT: f32 = 4096.0;

/// Box with its own axes; `x` and `y` are the full edge vectors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrientedBox {
    pub position: (f32, f32),
    pub pivot: (f32, f32),
    pub x: (f32, f32),
    pub y: (f32, f32),
}

impl OrientedBox {
    /// Corners in winding order, starting at the top-left.
    pub fn corners(&self) -> [(f32, f32); 4] {
        let tl = (self.position.0 - self.pivot.0, self.position.1 - self.pivot.1);
        let tr = (tl.0 + self.x.0, tl.1 + self.x.1);
        let br = (tr.0 + self.y.0, tr.1 + self.y.1);
        let bl = (tl.0 + self.y.0, tl.1 + self.y.1);
        [tl, tr, br, bl]
    }
}

/// Mesh vertex; `u`/`v` span the bitmap's clip box as 0..1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshVertex {
    pub x: f32,
    pub y: f32,
    pub u: f32,
    pub v: f32,
    pub color: Rgba,
}

/// Four strip-ordered vertices for the rectangle `(x0, y0)-(x1, y1)` under `m`.
pub fn quad_vertices(m: &Matrix2D, x0: f32, y0: f32, x1: f32, y1: f32, uv: TexUvRect, color: Rgba) -> [Vertex; 4] {
    let corner = |x: f32, y: f32, u: f32, v: f32| {
        let (px, py) = m.apply(x, y);
        Vertex::new(px, py, u, v, color)
    };
    [
        corner(x0, y1, uv.u0, uv.v1),
        corner(x0, y0, uv.u0, uv.v0),
        corner(x1, y1, uv.u1, uv.v1),
        corner(x1, y0, uv.u1, uv.v0),
    ]
}

/// Whole or partial tiles along one axis. `None` when there is nothing to draw.
fn tile_count(repeat: f32) -> Result<Option<u32>> {
    if !repeat.is_finite() || repeat > MAX_REPEAT {
        return Err(DisplayError::InvalidTransform("repeat must be finite and at most 4096"));
    }
    if repeat <= 0.0 {
        return Ok(None);
    }
    Ok(Some(repeat.ceil() as u32))
}

/// Covered share of tile `index`; only the last one can be partial.
fn tile_fraction(repeat: f32, index: u32, tiles: u32) -> f32 {
    if index + 1 < tiles {
        1.0
    } else {
        repeat - index as f32
    }
}

impl<D: GpuDevice> Display<D> {
    /// Queues the bitmap's clip box as one quad, or as a grid of tiles when repeated.
    pub fn transform_bitmap(
        &mut self,
        id: BitmapId,
        transform: &DisplayTransform,
        smoothing: Smoothing,
        blend: BlendMode,
    ) -> Result<()> {
        let tiles = if transform.is_repeated() {
            let (Some(x), Some(y)) = (tile_count(transform.repeat_x)?, tile_count(transform.repeat_y)?) else {
                return Ok(());
            };
            Some((x, y))
        } else {
            None
        };

        self.prepare_bitmap(id, smoothing, blend)?;
        let bitmap = self.bitmaps.get(id)?;
        let m = transform.matrix();
        let clip = bitmap.clip;
        let color = bitmap.color;

        let Some((tiles_x, tiles_y)) = tiles else {
            let quad = quad_vertices(&m, 0.0, 0.0, clip.width(), clip.height(), bitmap.uv_rect(BORDER_FIX), color);
            return self.push_quad(quad);
        };

        let uv = bitmap.uv_rect(0.0);
        let step_x = clip.width() / transform.repeat_x;
        let step_y = clip.height() / transform.repeat_y;

        for row in 0..tiles_y {
            let frac_y = tile_fraction(transform.repeat_y, row, tiles_y);
            let y = step_y * row as f32;
            let v1 = uv.v0 + (uv.v1 - uv.v0) * frac_y;

            for col in 0..tiles_x {
                let frac_x = tile_fraction(transform.repeat_x, col, tiles_x);
                let x = step_x * col as f32;
                let u1 = uv.u0 + (uv.u1 - uv.u0) * frac_x;
                let tile = TexUvRect { u0: uv.u0, v0: uv.v0, u1, v1 };
                self.push_quad(quad_vertices(&m, x, y, x + step_x * frac_x, y + step_y * frac_y, tile, color))?;
            }
        }
        Ok(())
    }

    /// Draws the bitmap untransformed with its top-left at `(x, y)`.
    pub fn blit_bitmap(&mut self, id: BitmapId, x: f32, y: f32, smoothing: Smoothing, blend: BlendMode) -> Result<()> {
        self.transform_bitmap(id, &DisplayTransform::at(x, y), smoothing, blend)
    }

    /// Queues one quad per glyph of `text`, sampling `font`.
    ///
    /// `\r`, `\n` and `\r\n` start a new line. Characters missing from the map
    /// leave a gap one character-height wide.
    pub fn transform_text(
        &mut self,
        font: BitmapId,
        text: &str,
        map: &CharacterMap,
        transform: &DisplayTransform,
        smoothing: Smoothing,
        blend: BlendMode,
    ) -> Result<()> {
        self.prepare_bitmap(font, smoothing, blend)?;
        let bitmap = self.bitmaps.get(font)?;
        let (rw, rh) = (bitmap.recip_real_width, bitmap.recip_real_height);
        let color = bitmap.color;
        let m = transform.matrix();
        let h = map.character_height;

        let (mut x, mut y) = (0.0f32, 0.0f32);
        let mut chars = text.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '\r' | '\n' => {
                    if ch == '\r' && chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    x = 0.0;
                    y += h;
                }
                _ => match map.glyphs.get(&ch) {
                    Some(glyph) => {
                        let w = glyph.width;
                        let uv = TexUvRect {
                            u0: rw * (glyph.x + BORDER_FIX),
                            v0: rh * (glyph.y + BORDER_FIX),
                            u1: rw * (glyph.x + w - BORDER_FIX),
                            v1: rh * (glyph.y + h - BORDER_FIX),
                        };
                        self.push_quad(quad_vertices(&m, x, y, x + w, y + h, uv, color))?;
                        x += w;
                    }
                    None => x += h,
                },
            }
        }
        Ok(())
    }

    pub fn draw_line(&mut self, start: (f32, f32), end: (f32, f32), color: Rgba) -> Result<()> {
        self.draw_primitive(&[start, end], color, Topology::Lines)
    }

    pub fn draw_polyline(&mut self, points: &[(f32, f32)], color: Rgba) -> Result<()> {
        if points.len() < 2 {
            return Ok(());
        }
        self.draw_primitive(points, color, Topology::LineStrip)
    }

    /// Outlines a closed polygon, or fills it (concave outlines included).
    pub fn draw_polygon(&mut self, points: &[(f32, f32)], color: Rgba, fill: bool) -> Result<()> {
        if points.len() < 3 {
            return Ok(());
        }
        if !fill {
            return self.draw_primitive(points, color, Topology::LineLoop);
        }

        let coords: Vec<f64> = points.iter().flat_map(|&(x, y)| [x as f64, y as f64]).collect();
        let indices = earcut(&coords, &[], 2).map_err(|_| DisplayError::InvalidMesh("polygon cannot be triangulated"))?;
        let triangles: Vec<(f32, f32)> = indices.into_iter().map(|i| points[i]).collect();
        if triangles.is_empty() {
            return Ok(());
        }
        self.draw_primitive(&triangles, color, Topology::Triangles)
    }

    pub fn draw_circle(&mut self, center: (f32, f32), radius: f32, color: Rgba, fill: bool) -> Result<()> {
        let points: Vec<(f32, f32)> = (0..CIRCLE_SEGMENTS)
            .map(|i| {
                let (sin, cos) = (TAU * i as f32 / CIRCLE_SEGMENTS as f32).sin_cos();
                (center.0 + radius * cos, center.1 + radius * sin)
            })
            .collect();
        let topology = if fill { Topology::TriangleFan } else { Topology::LineLoop };
        self.draw_primitive(&points, color, topology)
    }

    pub fn draw_obox(&mut self, obox: &OrientedBox, color: Rgba, fill: bool) -> Result<()> {
        let topology = if fill { Topology::TriangleFan } else { Topology::LineLoop };
        self.draw_primitive(&obox.corners(), color, topology)
    }

    /// Untextured immediate draw. Leaves the tracked blend mode unknown.
    fn draw_primitive(&mut self, points: &[(f32, f32)], color: Rgba, topology: Topology) -> Result<()> {
        self.flush()?;

        let program = self.no_texture_program;
        self.device.use_program(program.program);
        if let Some(loc) = program.projection {
            self.device.set_uniform_mat4(loc, &self.state.projection.0);
        }
        self.device.set_blend(if color.a != 255 { BlendMode::Alpha } else { BlendMode::None });
        self.state.blend = None;

        let vertices: Vec<Vertex> = points.iter().map(|&(x, y)| Vertex::new(x, y, 0.0, 0.0, color)).collect();
        self.device.upload_vertices(&vertices);
        self.device.draw_arrays(topology, vertices.len());

        if self.active.is_empty() {
            self.restore_default_program();
        }
        Ok(())
    }

    /// Draws a textured mesh right away, bypassing the quad batch.
    ///
    /// Without `indices` the vertices are drawn as one triangle strip.
    pub fn draw_mesh(
        &mut self,
        id: BitmapId,
        smoothing: Smoothing,
        blend: BlendMode,
        vertices: &[MeshVertex],
        indices: Option<&[u16]>,
    ) -> Result<()> {
        if vertices.len() < 3 {
            return Err(DisplayError::InvalidMesh("fewer than 3 vertices"));
        }
        if vertices.len() > MAX_MESH_VERTICES {
            return Err(DisplayError::InvalidMesh("too many vertices for 16-bit indices"));
        }
        if let Some(indices) = indices {
            if indices.iter().any(|&i| i as usize >= vertices.len()) {
                return Err(DisplayError::InvalidMesh("index out of range"));
            }
        }

        self.prepare(id, smoothing, blend, BufferMode::Direct)?;
        self.flush()?;

        let bitmap = self.bitmaps.get(id)?;
        let clip = bitmap.clip;
        let (rw, rh) = (bitmap.recip_real_width, bitmap.recip_real_height);
        let tint = bitmap.color;
        let span_u = clip.width() - 2.0 * BORDER_FIX;
        let span_v = clip.height() - 2.0 * BORDER_FIX;

        let gpu_vertices: Vec<Vertex> = vertices
            .iter()
            .map(|v| {
                Vertex::new(
                    v.x,
                    v.y,
                    rw * (clip.tlx + BORDER_FIX + v.u * span_u),
                    rh * (clip.tly + BORDER_FIX + v.v * span_v),
                    v.color.modulate(tint),
                )
            })
            .collect();
        self.device.upload_vertices(&gpu_vertices);

        match indices {
            Some(indices) => {
                self.device.upload_indices(indices);
                self.run_passes(Topology::Triangles, indices.len())?;
            }
            None => {
                let sequential: Vec<u16> = (0..gpu_vertices.len()).map(|i| i as u16).collect();
                self.device.upload_indices(&sequential);
                self.run_passes(Topology::TriangleStrip, sequential.len())?;
            }
        }
        self.reap_pending_shaders();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_corners_follow_strip_order() {
        let uv = TexUvRect { u0: 0.0, v0: 0.0, u1: 1.0, v1: 1.0 };
        let q = quad_vertices(&Matrix2D::IDENTITY, 0.0, 0.0, 10.0, 20.0, uv, Rgba::WHITE);
        let pos: Vec<(f32, f32)> = q.iter().map(|v| (v.x, v.y)).collect();
        assert_eq!(pos, vec![(0.0, 20.0), (0.0, 0.0), (10.0, 20.0), (10.0, 0.0)]);
        assert_eq!((q[0].u, q[0].v), (0.0, 1.0));
        assert_eq!((q[3].u, q[3].v), (1.0, 0.0));
    }

    #[test]
    fn tiles_are_counted_per_axis() {
        assert_eq!(tile_count(2.5).unwrap(), Some(3));
        assert_eq!(tile_count(1.0).unwrap(), Some(1));
        assert_eq!(tile_count(0.0).unwrap(), None);
        assert_eq!(tile_fraction(2.5, 1, 3), 1.0);
        assert_eq!(tile_fraction(2.5, 2, 3), 0.5);
        assert_eq!(tile_count(MAX_REPEAT).unwrap(), Some(4096));
    }

    #[test]
    fn unbounded_repeat_is_rejected() {
        for repeat in [f32::INFINITY, f32::NAN, 2.0e7] {
            assert!(matches!(tile_count(repeat), Err(DisplayError::InvalidTransform(_))), "{repeat}");
        }
    }

    #[test]
    fn obox_corners_start_at_top_left() {
        let obox = OrientedBox { position: (10.0, 10.0), pivot: (5.0, 5.0), x: (4.0, 0.0), y: (0.0, 2.0) };
        assert_eq!(obox.corners(), [(5.0, 5.0), (9.0, 5.0), (9.0, 7.0), (5.0, 7.0)]);
    }
}
