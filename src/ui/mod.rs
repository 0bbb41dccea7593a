//! UI draw data handed to the overlay pass
//!
//! Layout and tessellation happen in egui. This module flattens its output into one
//! vertex/index stream plus per-batch clip rectangles, and extracts font-atlas updates.

use bytemuck::{Pod, Zeroable};
use egui::epaint::Primitive;
use egui::{ClippedPrimitive, ImageData, TextureId, TexturesDelta};
use std::ops::Range;

/// Matches egui's vertex: position in points, uv, premultiplied sRGBA color
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UiVertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
    pub color: [u8; 4],
}

impl UiVertex {
    pub const STRIDE: u32 = std::mem::size_of::<UiVertex>() as u32;
}

/// One draw call worth of UI geometry
#[derive(Debug, Clone, PartialEq)]
pub struct UiBatch {
    /// `[min_x, min_y, max_x, max_y]` in points
    pub clip_rect: [f32; 4],
    pub indices: Range<u32>,
    pub base_vertex: i32,
}

impl UiBatch {
    /// Clip rectangle in physical pixels clamped to the target. `None` if nothing is left.
    pub fn scissor(&self, pixels_per_point: f32, width: u32, height: u32) -> Option<[u32; 4]> {
        let clamp = |v: f32, max: u32| (v * pixels_per_point).round().clamp(0.0, max as f32) as u32;
        let x0 = clamp(self.clip_rect[0], width);
        let y0 = clamp(self.clip_rect[1], height);
        let x1 = clamp(self.clip_rect[2], width);
        let y1 = clamp(self.clip_rect[3], height);
        (x1 > x0 && y1 > y0).then(|| [x0, y0, x1 - x0, y1 - y0])
    }
}

/// RGBA8 pixels for the font atlas, either the whole image or a sub-rectangle
#[derive(Debug, Clone, PartialEq)]
pub struct UiTextureUpdate {
    pub pos: Option<[u32; 2]>,
    pub size: [u32; 2],
    pub pixels: Vec<u8>,
}

/// Everything the overlay needs for one frame
#[derive(Debug, Clone)]
pub struct UiFrame {
    pub vertices: Vec<UiVertex>,
    pub indices: Vec<u32>,
    pub batches: Vec<UiBatch>,
    pub pixels_per_point: f32,
    pub font_updates: Vec<UiTextureUpdate>,
}

impl Default for UiFrame {
    fn default() -> Self {
        Self::empty()
    }
}

impl UiFrame {
    pub fn empty() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            batches: Vec::new(),
            pixels_per_point: 1.0,
            font_updates: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Append one batch of geometry with its own clip rectangle
    pub fn push_batch(&mut self, clip_rect: [f32; 4], vertices: &[UiVertex], indices: &[u32]) {
        let base_vertex = self.vertices.len() as i32;
        let first_index = self.indices.len() as u32;
        self.vertices.extend_from_slice(vertices);
        self.indices.extend_from_slice(indices);
        self.batches.push(UiBatch {
            clip_rect,
            indices: first_index..self.indices.len() as u32,
            base_vertex,
        });
    }

    /// Flatten egui's tessellated output. Only the font atlas is supported as a texture;
    /// meshes sampling user textures and paint callbacks are dropped.
    pub fn from_egui(
        primitives: &[ClippedPrimitive],
        textures_delta: &TexturesDelta,
        pixels_per_point: f32,
    ) -> Self {
        let mut frame = Self {
            pixels_per_point,
            ..Self::empty()
        };

        for primitive in primitives {
            match &primitive.primitive {
                Primitive::Mesh(mesh) => {
                    if mesh.texture_id != TextureId::default() {
                        log::debug!("Skipping UI mesh with texture {:?}", mesh.texture_id);
                        continue;
                    }
                    if mesh.indices.is_empty() {
                        continue;
                    }
                    let vertices: Vec<UiVertex> = mesh
                        .vertices
                        .iter()
                        .map(|v| UiVertex {
                            pos: [v.pos.x, v.pos.y],
                            uv: [v.uv.x, v.uv.y],
                            color: v.color.to_array(),
                        })
                        .collect();
                    let rect = primitive.clip_rect;
                    frame.push_batch(
                        [rect.min.x, rect.min.y, rect.max.x, rect.max.y],
                        &vertices,
                        &mesh.indices,
                    );
                }
                Primitive::Callback(_) => {
                    log::debug!("Skipping UI paint callback");
                }
            }
        }

        for (id, delta) in &textures_delta.set {
            if *id != TextureId::default() {
                continue;
            }
            let [w, h] = delta.image.size();
            let pixels: Vec<u8> = match &delta.image {
                ImageData::Color(image) => image.pixels.iter().flat_map(|c| c.to_array()).collect(),
                ImageData::Font(font) => font.srgba_pixels(None).flat_map(|c| c.to_array()).collect(),
            };
            frame.font_updates.push(UiTextureUpdate {
                pos: delta.pos.map(|[x, y]| [x as u32, y as u32]),
                size: [w as u32, h as u32],
                pixels,
            });
        }

        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> [UiVertex; 4] {
        let v = |x: f32, y: f32| UiVertex {
            pos: [x, y],
            uv: [0.0, 0.0],
            color: [255; 4],
        };
        [v(0.0, 0.0), v(10.0, 0.0), v(10.0, 10.0), v(0.0, 10.0)]
    }

    #[test]
    fn test_vertex_stride() {
        assert_eq!(UiVertex::STRIDE, 20);
    }

    #[test]
    fn test_batches_share_one_stream() {
        let mut frame = UiFrame::empty();
        frame.push_batch([0.0, 0.0, 100.0, 100.0], &quad(), &[0, 1, 2, 0, 2, 3]);
        frame.push_batch([0.0, 0.0, 50.0, 50.0], &quad(), &[0, 1, 2]);

        assert_eq!(frame.vertices.len(), 8);
        assert_eq!(frame.batches[0].indices, 0..6);
        assert_eq!(frame.batches[1].indices, 6..9);
        assert_eq!(frame.batches[1].base_vertex, 4);
    }

    #[test]
    fn test_scissor_scales_and_clamps() {
        let batch = UiBatch {
            clip_rect: [10.0, 20.0, 500.0, 30.0],
            indices: 0..3,
            base_vertex: 0,
        };
        assert_eq!(batch.scissor(2.0, 800, 600), Some([20, 40, 780, 20]));
    }

    #[test]
    fn test_scissor_outside_target_is_none() {
        let batch = UiBatch {
            clip_rect: [900.0, 0.0, 1000.0, 10.0],
            indices: 0..3,
            base_vertex: 0,
        };
        assert_eq!(batch.scissor(1.0, 800, 600), None);
    }

    #[test]
    fn test_from_egui_output() {
        let ctx = egui::Context::default();
        let output = ctx.run(egui::RawInput::default(), |ctx| {
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.label("frame stats");
            });
        });
        let primitives = ctx.tessellate(output.shapes, output.pixels_per_point);
        let frame = UiFrame::from_egui(&primitives, &output.textures_delta, output.pixels_per_point);

        assert!(!frame.is_empty());
        assert_eq!(frame.font_updates.len(), 1);
        let update = &frame.font_updates[0];
        assert_eq!(update.pixels.len(), update.size[0] as usize * update.size[1] as usize * 4);
        for batch in &frame.batches {
            assert!(batch.indices.end as usize <= frame.indices.len());
        }
    }
}
