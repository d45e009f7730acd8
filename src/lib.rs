//! Label layout and fit engine: sanitizes label records, budgets vertical
//! space, compresses line heights to fit the on-screen preview and lays the
//! same content out onto PDF pages sized to each label.

mod barcode;
mod block;
mod budget;
mod canvas;
mod compress;
mod config;
mod error;
mod font;
mod label;
mod page_size;
mod pdf;
mod raster;
mod render;
mod schedule;
mod text_flow;
mod trace;
mod types;
mod units;

pub use barcode::{
    BarcodeRenderOptions, BarcodeRenderer, ResolvedBarcodeHeight, render_barcode,
    resolve_barcode_height,
};
pub use block::{Block, BlockKind, build_blocks, split_into_lines};
pub use budget::{BackendMetrics, SpaceBudget, Unit, base_barcode_height_px};
pub use canvas::{Canvas, Command, Document, ImageResource, Page};
pub use compress::{
    Compression, LineHeightBaseline, LineHeightOverride, PreviewMeasurement, TextItemMeasurement,
    compress,
};
pub use config::{LayoutConfig, LayoutConfigBuilder};
pub use error::{LabelError, Result};
pub use font::{
    DEFAULT_FONT, FontMetrics, FontProgramKind, FontRegistry, RegisteredFont, ShapedGlyph,
};
pub use label::{BarcodeType, LabelSpec, RawLabel, sanitize};
pub use page_size::{PageSizeMm, PrintPageSizeManager};
pub use pdf::{document_to_pdf, write_document};
pub use raster::{BarcodeRasterizer, ModuleRasterizer, RasterImage, RasterRequest, SymbolEncoder};
pub use render::{
    BuiltinFonts, FontRole, FontSource, LabelPlacement, LayoutAdjustment, PreviewBlock,
    PreviewFitter, PreviewLayout, PreviewOutcome, PreviewSurface, PrintFonts, PrintJob,
    fit_preview, preview_layout, print_labels,
};
pub use schedule::{AdjustmentScheduler, FrameCallback, FrameScheduler, ImmediateFrames};
pub use text_flow::{
    BarcodePlacement, EmbeddedImage, ImageEmbedder, LineLayout, PageSink, TextFlow, TextMeasurer,
    count_spaces, word_spacing_correction,
};
pub use trace::LayoutTrace;
pub use types::{Color, Pt, Size};
pub use units::{
    MM_PER_INCH, MM_TO_PT, MM_TO_PX, PT_PER_INCH, PX_PER_INCH, PX_TO_PT, mm_to_pt, mm_to_px,
    px_to_mm, px_to_pt, pt_to_px,
};
