use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use fontdue::layout::{
    CoordinateSystem, GlyphRasterConfig, HorizontalAlign, Layout, LayoutSettings, TextStyle,
    VerticalAlign, WrapStyle,
};
use image::RgbaImage;
use tiny_skia::{Color, Pixmap};

use crate::config::{parse_hex_color, Settings};
use crate::font::FontFace;
use crate::paginate::Page;

/// Turns a page into an image file.
pub trait PageRasterizer {
    fn rasterize_to_file(&mut self, page: &Page<'_>, path: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasStyle {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
    pub background: [u8; 4],
    pub foreground: [u8; 4],
}

impl CanvasStyle {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            width: settings.canvas.width,
            height: settings.canvas.height,
            margin: settings.canvas.margin,
            background: parse_hex_color(&settings.style.background)?,
            foreground: parse_hex_color(&settings.style.foreground)?,
        })
    }
}

#[derive(Debug, Clone)]
struct GlyphBitmap {
    width: usize,
    height: usize,
    bitmap: Vec<u8>,
}

/// Draws page rows left-aligned at the canvas margin, each at the y-offset the paginator chose.
pub struct CanvasRasterizer {
    face: FontFace,
    style: CanvasStyle,
    glyph_cache: HashMap<GlyphRasterConfig, GlyphBitmap>,
}

impl CanvasRasterizer {
    pub fn new(face: FontFace, style: CanvasStyle) -> Self {
        Self {
            face,
            style,
            glyph_cache: HashMap::new(),
        }
    }

    pub fn face(&self) -> &FontFace {
        &self.face
    }

    pub fn render_pixmap(&mut self, page: &Page<'_>) -> Result<Pixmap> {
        let [r, g, b, a] = self.style.background;
        let mut pixmap = Pixmap::new(self.style.width, self.style.height).ok_or_else(|| {
            anyhow!(
                "invalid canvas size {}x{}",
                self.style.width,
                self.style.height
            )
        })?;
        pixmap.fill(Color::from_rgba8(r, g, b, a));

        let x = self.style.margin as f32;
        for row in &page.rows {
            if let Some(text) = row.token.text() {
                self.draw_line(&mut pixmap, x, row.y, text);
            }
        }
        Ok(pixmap)
    }

    fn draw_line(&mut self, pixmap: &mut Pixmap, x: f32, y: f32, text: &str) {
        let width = pixmap.width();
        let height = pixmap.height();
        let color = self.style.foreground;

        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings {
            x,
            y,
            max_width: None,
            max_height: None,
            horizontal_align: HorizontalAlign::Left,
            vertical_align: VerticalAlign::Top,
            line_height: 1.0,
            wrap_style: WrapStyle::Letter,
            wrap_hard_breaks: false,
        });
        layout.append(
            &[self.face.font()],
            &TextStyle::new(text, self.face.size(), 0),
        );

        let frame = pixmap.data_mut();
        for glyph in layout.glyphs() {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let font = self.face.font();
            let glyph_bitmap = self.glyph_cache.entry(glyph.key).or_insert_with(|| {
                let (_, bitmap) = font.rasterize_config(glyph.key);
                GlyphBitmap {
                    width: glyph.width,
                    height: glyph.height,
                    bitmap,
                }
            });

            blend_glyph(
                frame,
                width,
                height,
                glyph.x.round() as i32,
                glyph.y.round() as i32,
                glyph_bitmap,
                color,
            );
        }
    }
}

impl PageRasterizer for CanvasRasterizer {
    fn rasterize_to_file(&mut self, page: &Page<'_>, path: &Path) -> Result<()> {
        let pixmap = self.render_pixmap(page)?;
        let image = RgbaImage::from_raw(pixmap.width(), pixmap.height(), pixmap.take())
            .ok_or_else(|| anyhow!("canvas buffer does not match its dimensions"))?;
        image
            .save(path)
            .with_context(|| format!("failed to write page image {}", path.display()))
    }
}

fn blend_glyph(
    frame: &mut [u8],
    frame_width: u32,
    frame_height: u32,
    x: i32,
    y: i32,
    glyph: &GlyphBitmap,
    color: [u8; 4],
) {
    for row in 0..glyph.height {
        let py = y + row as i32;
        if py < 0 || py >= frame_height as i32 {
            continue;
        }

        for col in 0..glyph.width {
            let px = x + col as i32;
            if px < 0 || px >= frame_width as i32 {
                continue;
            }

            let mask = glyph.bitmap[row * glyph.width + col];
            if mask == 0 {
                continue;
            }

            let alpha = ((u16::from(mask) * u16::from(color[3])) / 255) as u8;
            let idx = ((py as u32 * frame_width + px as u32) * 4) as usize;
            blend_pixel(frame, idx, [color[0], color[1], color[2], alpha]);
        }
    }
}

// The canvas is always opaque, so premultiplied and straight alpha coincide.
fn blend_pixel(frame: &mut [u8], idx: usize, src: [u8; 4]) {
    let alpha = u16::from(src[3]);
    if alpha == 0 {
        return;
    }

    let inv_alpha = 255_u16.saturating_sub(alpha);

    for channel in 0..3 {
        let dst = u16::from(frame[idx + channel]);
        let src_c = u16::from(src[channel]);
        frame[idx + channel] = ((src_c * alpha + dst * inv_alpha + 127) / 255) as u8;
    }
    frame[idx + 3] = 255;
}
