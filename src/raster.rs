use crate::barcode::BarcodeRenderOptions;
use crate::error::{LabelError, Result};
use base64::Engine;
use log::debug;
use tiny_skia::{Paint, Pixmap, Rect, Transform};

/// One rasterization request. `options.height` is the bar height in CSS
/// pixels; the surface is that size multiplied by `scale` for print sharpness.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterRequest {
    pub value: String,
    pub options: BarcodeRenderOptions,
    pub surface_width: u32,
    pub surface_height: u32,
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RasterImage {
    /// Accepts the `data:image/png;base64,...` form returned by canvas-style
    /// rasterizers.
    pub fn from_data_url(url: &str, width: u32, height: u32) -> Result<Self> {
        let Some(rest) = url.strip_prefix("data:") else {
            return Err(LabelError::Rasterization("not a data url".to_string()));
        };
        let Some((header, payload)) = rest.split_once(',') else {
            return Err(LabelError::Rasterization(
                "data url has no payload".to_string(),
            ));
        };
        if !header.contains("base64") {
            return Err(LabelError::Rasterization(format!(
                "unsupported data url encoding {header:?}"
            )));
        }
        let png = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|err| LabelError::Rasterization(err.to_string()))?;
        Ok(Self { png, width, height })
    }
}

/// Off-screen barcode rasterizer used by the print backend.
#[allow(async_fn_in_trait)]
pub trait BarcodeRasterizer {
    async fn rasterize(&self, request: &RasterRequest) -> Result<RasterImage>;
}

/// External symbol encoder: value + symbology to a run of bar modules
/// (`true` = dark).
pub trait SymbolEncoder {
    fn encode(&self, value: &str, symbology: &str) -> std::result::Result<Vec<bool>, String>;
}

/// Paints encoded modules edge to edge across the requested surface.
pub struct ModuleRasterizer<E> {
    encoder: E,
}

impl<E: SymbolEncoder> ModuleRasterizer<E> {
    pub fn new(encoder: E) -> Self {
        Self { encoder }
    }

    pub fn rasterize_now(&self, request: &RasterRequest) -> Result<RasterImage> {
        let modules = self
            .encoder
            .encode(&request.value, request.options.symbology)
            .map_err(LabelError::Rasterization)?;
        if modules.is_empty() {
            return Err(LabelError::Rasterization(format!(
                "encoder produced no modules for {:?}",
                request.value
            )));
        }
        let width = request.surface_width.max(1);
        let height = request.surface_height.max(1);
        let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
            LabelError::Rasterization(format!("invalid raster size {width}x{height}"))
        })?;
        pixmap.fill(tiny_skia::Color::WHITE);

        let mut paint = Paint::default();
        paint.set_color(tiny_skia::Color::BLACK);
        paint.anti_alias = false;

        let module_width = width as f32 / modules.len() as f32;
        let mut index = 0;
        while index < modules.len() {
            if !modules[index] {
                index += 1;
                continue;
            }
            let start = index;
            while index < modules.len() && modules[index] {
                index += 1;
            }
            let x = start as f32 * module_width;
            let bar_width = (index - start) as f32 * module_width;
            if let Some(rect) = Rect::from_xywh(x, 0.0, bar_width, height as f32) {
                pixmap.fill_rect(rect, &paint, Transform::identity(), None);
            }
        }

        let png = pixmap
            .encode_png()
            .map_err(|err| LabelError::Rasterization(format!("png encode failed: {err}")))?;
        debug!(
            "rasterized {} modules into {width}x{height} for {}",
            modules.len(),
            request.options.symbology
        );
        Ok(RasterImage { png, width, height })
    }
}

impl<E: SymbolEncoder> BarcodeRasterizer for ModuleRasterizer<E> {
    async fn rasterize(&self, request: &RasterRequest) -> Result<RasterImage> {
        self.rasterize_now(request)
    }
}
