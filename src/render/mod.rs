mod print;
mod screen;

pub use print::{
    BuiltinFonts, FontRole, FontSource, LabelPlacement, PrintFonts, PrintJob, print_labels,
};
pub use screen::{
    LayoutAdjustment, PreviewBlock, PreviewFitter, PreviewLayout, PreviewOutcome, PreviewSurface,
    fit_preview, preview_layout,
};
