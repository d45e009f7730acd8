//! Top-down text and barcode placement for the print backend.
//!
//! The cursor is a baseline position in PDF user space (origin bottom-left),
//! so "moving down" subtracts.

use crate::barcode::{BarcodeRenderOptions, resolve_barcode_height};
use crate::budget::base_barcode_height_px;
use crate::config::LayoutConfig;
use crate::error::Result;
use crate::label::LabelSpec;
use crate::raster::{BarcodeRasterizer, RasterRequest};
use crate::types::{Color, Pt, Size};
use crate::units;
use log::{debug, warn};

/// Glyph metrics provider. Widths are advance widths at `size`.
pub trait TextMeasurer {
    fn measure(&self, font: &str, text: &str, size: Pt) -> Pt;

    fn space_width(&self, font: &str, size: Pt) -> Pt {
        self.measure(font, " ", size)
    }
}

/// Document page list that accepts positioned text and images.
pub trait PageSink {
    fn begin_page(&mut self, size: Size);

    #[allow(clippy::too_many_arguments)]
    fn draw_text(
        &mut self,
        font: &str,
        size: Pt,
        color: Color,
        x: Pt,
        y: Pt,
        text: &str,
        word_spacing: Pt,
    );

    fn draw_image(&mut self, image: &EmbeddedImage, x: Pt, y: Pt, width: Pt, height: Pt);
}

/// Turns raster bytes into a document image resource.
pub trait ImageEmbedder {
    fn embed_png(&mut self, bytes: &[u8]) -> Result<EmbeddedImage>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedImage {
    pub resource_id: String,
    pub width: u32,
    pub height: u32,
}

/// Extra advance per space that pulls an over-wide space glyph back to
/// `target * size`. Zero unless the space is wider than `threshold * size`;
/// never positive.
pub fn word_spacing_correction(space_width: f64, size: f64, threshold: f64, target: f64) -> f64 {
    if !(space_width.is_finite() && size.is_finite()) || size <= 0.0 {
        return 0.0;
    }
    if space_width / size <= threshold {
        return 0.0;
    }
    let correction = size * target - space_width;
    if correction < 0.0 { correction } else { 0.0 }
}

pub fn count_spaces(text: &str) -> usize {
    text.chars().filter(|ch| *ch == ' ').count()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineLayout {
    pub x: Pt,
    pub width: Pt,
    pub word_spacing: Pt,
}

/// Result of drawing the barcode block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarcodePlacement {
    pub cursor: Pt,
    pub drawn: bool,
}

/// Horizontal frame of one label page plus the measurer used to center lines.
pub struct TextFlow<'a, M: TextMeasurer + ?Sized> {
    measurer: &'a M,
    config: &'a LayoutConfig,
    left: Pt,
    usable_width: Pt,
}

impl<'a, M: TextMeasurer + ?Sized> TextFlow<'a, M> {
    pub fn new(page: Size, measurer: &'a M, config: &'a LayoutConfig) -> Self {
        let padding = Pt::from_mm(config.horizontal_padding_mm);
        let usable_width = (page.width - padding).max(Pt::from_i32(1));
        Self {
            measurer,
            config,
            left: padding / 2,
            usable_width,
        }
    }

    pub fn usable_width(&self) -> Pt {
        self.usable_width
    }

    /// Baseline cursor before the first block: half the vertical padding
    /// below the top edge.
    pub fn top_cursor(&self, page: Size) -> Pt {
        page.height - Pt::from_mm(self.config.vertical_padding_mm / 2.0)
    }

    pub fn gap(&self) -> Pt {
        Pt::from_mm(self.config.gap_mm)
    }

    pub fn layout_line(&self, font: &str, text: &str, size: Pt) -> LineLayout {
        let width = self.measurer.measure(font, text, size);
        let spaces = count_spaces(text);
        let word_spacing = if spaces == 0 {
            Pt::ZERO
        } else {
            let space = self.measurer.space_width(font, size);
            Pt::from_f64(word_spacing_correction(
                space.to_f64(),
                size.to_f64(),
                self.config.space_width_threshold,
                self.config.space_width_target,
            ))
        };
        let width = width + word_spacing * spaces as i32;
        LineLayout {
            x: self.centered_x(width),
            width,
            word_spacing,
        }
    }

    fn centered_x(&self, width: Pt) -> Pt {
        self.left + ((self.usable_width - width) / 2).max(Pt::ZERO)
    }

    /// Draws `lines` centered and returns the cursor after the last baseline.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_text_block<S: PageSink + ?Sized>(
        &self,
        sink: &mut S,
        lines: &[&str],
        font: &str,
        font_px: f64,
        color: Color,
        cursor: Pt,
    ) -> Pt {
        let font_px = if font_px.is_finite() { font_px.max(1.0) } else { 1.0 };
        let size = Pt::from_px(font_px);
        let leading = Pt::from_f64(size.to_f64() * self.config.line_height_ratio) - size;
        let lines: &[&str] = if lines.is_empty() { &[""] } else { lines };

        let mut cursor = cursor;
        for (index, line) in lines.iter().enumerate() {
            cursor -= size;
            let layout = self.layout_line(font, line, size);
            sink.draw_text(font, size, color, layout.x, cursor, line, layout.word_spacing);
            if index + 1 < lines.len() {
                cursor -= leading;
            }
        }
        cursor
    }

    /// Rasterizes, embeds and draws the barcode below `cursor`. Any failure
    /// draws the fallback line instead so the page keeps its layout.
    pub async fn draw_barcode_block<S, R>(
        &self,
        sink: &mut S,
        rasterizer: &R,
        spec: &LabelSpec,
        fallback_font: &str,
        fallback_color: Color,
        cursor: Pt,
    ) -> BarcodePlacement
    where
        S: PageSink + ImageEmbedder + ?Sized,
        R: BarcodeRasterizer + ?Sized,
    {
        let value = spec.barcode_value.as_str();
        if value.is_empty() {
            return self.draw_fallback(sink, fallback_font, fallback_color, cursor, "empty value");
        }

        let height_px = base_barcode_height_px(spec, self.config);
        let width_px = units::pt_to_px(self.usable_width.to_f64()).floor().max(1.0);
        let resolved = resolve_barcode_height(height_px, None, self.config.min_barcode_height_px);
        let scale = self.config.barcode_canvas_scale;
        let request = RasterRequest {
            value: value.to_string(),
            options: BarcodeRenderOptions::for_label(spec, &resolved),
            surface_width: (width_px * scale).floor().max(1.0) as u32,
            surface_height: (resolved.height * scale).floor().max(1.0) as u32,
            scale,
        };

        let raster = match rasterizer.rasterize(&request).await {
            Ok(raster) => raster,
            Err(err) => {
                return self.draw_fallback(
                    sink,
                    fallback_font,
                    fallback_color,
                    cursor,
                    &err.to_string(),
                );
            }
        };
        let image = match sink.embed_png(&raster.png) {
            Ok(image) if image.width > 0 && image.height > 0 => image,
            Ok(image) => {
                let reason = format!("image has no area ({}x{})", image.width, image.height);
                return self.draw_fallback(sink, fallback_font, fallback_color, cursor, &reason);
            }
            Err(err) => {
                return self.draw_fallback(
                    sink,
                    fallback_font,
                    fallback_color,
                    cursor,
                    &err.to_string(),
                );
            }
        };

        let target_width = self.usable_width.to_f64();
        let target_height = units::px_to_pt(resolved.height);
        let fit = (target_width / image.width as f64).min(target_height / image.height as f64);
        let draw_width = Pt::from_f64(image.width as f64 * fit);
        let draw_height = Pt::from_f64(image.height as f64 * fit);
        let x = self.centered_x(draw_width);
        let y = cursor - draw_height;
        sink.draw_image(&image, x, y, draw_width, draw_height);
        debug!(
            "barcode {} drawn {:.2}x{:.2}pt at y={:.2}",
            image.resource_id,
            draw_width.to_f64(),
            draw_height.to_f64(),
            y.to_f64()
        );
        BarcodePlacement {
            cursor: y,
            drawn: true,
        }
    }

    fn draw_fallback<S: PageSink + ?Sized>(
        &self,
        sink: &mut S,
        font: &str,
        color: Color,
        cursor: Pt,
        reason: &str,
    ) -> BarcodePlacement {
        warn!("barcode fallback: {reason}");
        let text = self.config.fallback_text.as_str();
        let cursor = self.draw_text_block(
            sink,
            &[text],
            font,
            self.config.fallback_font_size_px,
            color,
            cursor,
        );
        BarcodePlacement {
            cursor,
            drawn: false,
        }
    }
}
