use crate::label::LabelSpec;
use log::error;
use serde::Serialize;

/// Final barcode height handed to the symbol renderer, plus the box ceiling
/// the caller clips to in case the renderer ignores the requested height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedBarcodeHeight {
    pub height: f64,
    pub ceiling: f64,
}

pub fn resolve_barcode_height(
    base_height: f64,
    ceiling: Option<f64>,
    min_height: f64,
) -> ResolvedBarcodeHeight {
    let base = if base_height.is_finite() {
        base_height
    } else {
        min_height
    };
    match ceiling.filter(|value| value.is_finite()) {
        Some(ceiling) => {
            let ceiling = ceiling.floor().max(min_height);
            let height = base.min(ceiling).max(min_height).round();
            ResolvedBarcodeHeight { height, ceiling }
        }
        None => {
            let height = base.max(min_height).round();
            ResolvedBarcodeHeight {
                height,
                ceiling: height,
            }
        }
    }
}

/// Options passed to the external symbol renderer. Only symbology and
/// height vary; the human-readable value is always drawn by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct BarcodeRenderOptions {
    pub symbology: &'static str,
    pub height: u32,
    pub display_value: bool,
    pub font_size: f64,
    pub margin: u32,
}

impl BarcodeRenderOptions {
    pub fn for_label(spec: &LabelSpec, resolved: &ResolvedBarcodeHeight) -> Self {
        Self {
            symbology: spec.barcode_type.symbology(),
            height: resolved.height.max(1.0) as u32,
            display_value: false,
            font_size: spec.barcode_font_size,
            margin: 0,
        }
    }
}

/// Opaque barcode symbol generator drawing into a surface the caller owns.
pub trait BarcodeRenderer {
    fn render(&mut self, value: &str, options: &BarcodeRenderOptions) -> Result<(), String>;
}

/// Runs the renderer once. Failure is logged and reported as `false`; the
/// caller swaps in the fallback text.
pub fn render_barcode<R: BarcodeRenderer + ?Sized>(
    renderer: &mut R,
    value: &str,
    options: &BarcodeRenderOptions,
) -> bool {
    match renderer.render(value, options) {
        Ok(()) => true,
        Err(message) => {
            error!(
                "barcode render failed symbology={} value={value:?}: {message}",
                options.symbology
            );
            false
        }
    }
}
