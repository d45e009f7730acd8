//! Print backend: one page per label, drawn top-down with the text flow.

use crate::block::{Block, build_blocks};
use crate::budget::{BackendMetrics, SpaceBudget};
use crate::canvas::{Canvas, Document};
use crate::config::LayoutConfig;
use crate::error::{LabelError, Result};
use crate::font::{DEFAULT_FONT, FontRegistry};
use crate::label::LabelSpec;
use crate::pdf::document_to_pdf;
use crate::raster::BarcodeRasterizer;
use crate::text_flow::{ImageEmbedder, PageSink, TextFlow};
use crate::trace::LayoutTrace;
use crate::types::Pt;
use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontRole {
    Regular,
    Bold,
}

impl FontRole {
    fn source_name(self) -> &'static str {
        match self {
            FontRole::Regular => "label-regular",
            FontRole::Bold => "label-bold",
        }
    }
}

/// Fetches font program bytes. `Ok(None)` means the role is not provided.
#[allow(async_fn_in_trait)]
pub trait FontSource {
    async fn load(&self, role: FontRole) -> Result<Option<Vec<u8>>>;
}

/// Uses base-14 Helvetica for every role.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinFonts;

impl FontSource for BuiltinFonts {
    async fn load(&self, _role: FontRole) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Font names each role draws with, after registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintFonts {
    pub regular: String,
    pub bold: String,
}

impl PrintFonts {
    /// Loads both roles once. A missing bold face reuses the regular one;
    /// with no bytes at all both roles draw in base-14 Helvetica.
    pub async fn resolve<F: FontSource + ?Sized>(
        source: &F,
        registry: &mut FontRegistry,
    ) -> Result<Self> {
        let regular = load_role(source, registry, FontRole::Regular).await?;
        let bold = load_role(source, registry, FontRole::Bold).await?;
        let fonts = match (regular, bold) {
            (Some(regular), Some(bold)) => Self { regular, bold },
            (Some(regular), None) => Self {
                bold: regular.clone(),
                regular,
            },
            (None, Some(bold)) => Self {
                regular: bold.clone(),
                bold,
            },
            (None, None) => Self {
                regular: DEFAULT_FONT.to_string(),
                bold: DEFAULT_FONT.to_string(),
            },
        };
        debug!("print fonts regular={} bold={}", fonts.regular, fonts.bold);
        Ok(fonts)
    }
}

async fn load_role<F: FontSource + ?Sized>(
    source: &F,
    registry: &mut FontRegistry,
    role: FontRole,
) -> Result<Option<String>> {
    let bytes = source.load(role).await.map_err(|err| match err {
        LabelError::FontLoad(message) => LabelError::FontLoad(message),
        other => LabelError::FontLoad(format!("{role:?}: {other}")),
    })?;
    match bytes {
        Some(bytes) => registry.register_bytes(bytes, role.source_name()).map(Some),
        None => Ok(None),
    }
}

/// Where one label's layout ended on its page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelPlacement {
    pub cursor_y: Pt,
    pub barcode_drawn: bool,
}

/// Print session with fonts already resolved. Labels are drawn strictly in
/// order into one append-only page list.
pub struct PrintJob<'a, R: ?Sized> {
    config: LayoutConfig,
    rasterizer: &'a R,
    registry: FontRegistry,
    fonts: PrintFonts,
    trace: Option<LayoutTrace>,
}

impl<'a, R: BarcodeRasterizer + ?Sized> PrintJob<'a, R> {
    pub async fn new<F: FontSource + ?Sized>(
        config: LayoutConfig,
        rasterizer: &'a R,
        font_source: &F,
    ) -> Result<Self> {
        config.validate()?;
        let mut registry = FontRegistry::new();
        let fonts = PrintFonts::resolve(font_source, &mut registry).await?;
        Ok(Self {
            config,
            rasterizer,
            registry,
            fonts,
            trace: None,
        })
    }

    pub fn with_trace(mut self, trace: LayoutTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn fonts(&self) -> &PrintFonts {
        &self.fonts
    }

    pub fn registry(&self) -> &FontRegistry {
        &self.registry
    }

    /// Starts a page sized to the label and draws its blocks top-down.
    pub async fn render_label<S>(&self, sink: &mut S, spec: &LabelSpec) -> LabelPlacement
    where
        S: PageSink + ImageEmbedder + ?Sized,
    {
        let page = spec.page_size();
        sink.begin_page(page);
        let flow = TextFlow::new(page, &self.registry, &self.config);
        let dark = self.config.dark_ink();
        let bold = self.fonts.bold.as_str();

        if let Some(trace) = &self.trace {
            let budget = SpaceBudget::compute(spec, &BackendMetrics::print(&self.config));
            trace.record("print.budget", &budget);
        }

        let blocks = build_blocks(spec);
        let mut cursor = flow.top_cursor(page);
        let mut barcode_drawn = false;
        for (index, block) in blocks.iter().enumerate() {
            let font_size = block.font_size().unwrap_or(self.config.fallback_font_size_px);
            cursor = match block {
                Block::Name { .. } | Block::BarcodeText { .. } => {
                    flow.draw_text_block(sink, &block.lines(), bold, font_size, dark, cursor)
                }
                Block::SubName { .. } => flow.draw_text_block(
                    sink,
                    &block.lines(),
                    &self.fonts.regular,
                    font_size,
                    self.config.sub_name_ink(),
                    cursor,
                ),
                Block::Barcode { .. } => {
                    let placement = flow
                        .draw_barcode_block(sink, self.rasterizer, spec, bold, dark, cursor)
                        .await;
                    barcode_drawn = placement.drawn;
                    placement.cursor
                }
            };
            if index + 1 < blocks.len() {
                cursor -= flow.gap();
            }
        }

        if let Some(trace) = &self.trace {
            trace.record(
                "print.label",
                &serde_json::json!({
                    "width_mm": spec.width_mm,
                    "height_mm": spec.height_mm,
                    "blocks": blocks.len(),
                    "cursor_y": cursor.to_f64(),
                    "barcode_drawn": barcode_drawn,
                }),
            );
            if !barcode_drawn {
                trace.increment("print.barcode_fallback", 1);
            }
        }
        LabelPlacement {
            cursor_y: cursor,
            barcode_drawn,
        }
    }

    /// Draws every printable label, one page each. `None` when nothing in
    /// `labels` has content.
    pub async fn render_batch(&self, labels: &[LabelSpec]) -> Option<Document> {
        let printable: Vec<&LabelSpec> = labels.iter().filter(|l| l.has_content()).collect();
        if printable.is_empty() {
            return None;
        }
        let mut canvas = Canvas::new();
        for spec in &printable {
            self.render_label(&mut canvas, spec).await;
        }
        if let Some(trace) = &self.trace {
            trace.emit_summary("print.batch");
            trace.flush();
        }
        info!(
            "print batch rendered {} of {} labels",
            printable.len(),
            labels.len()
        );
        Some(canvas.finish())
    }

    pub fn to_pdf(&self, document: &Document) -> Result<Vec<u8>> {
        document_to_pdf(document, Some(&self.registry))
    }

    pub async fn export_pdf(&self, labels: &[LabelSpec]) -> Result<Option<Vec<u8>>> {
        match self.render_batch(labels).await {
            Some(document) => self.to_pdf(&document).map(Some),
            None => Ok(None),
        }
    }
}

/// Resolves fonts and renders `labels` to PDF bytes in one call. Fonts are
/// not fetched when no label is printable.
pub async fn print_labels<R, F>(
    labels: &[LabelSpec],
    config: LayoutConfig,
    rasterizer: &R,
    font_source: &F,
) -> Result<Option<Vec<u8>>>
where
    R: BarcodeRasterizer + ?Sized,
    F: FontSource + ?Sized,
{
    if !labels.iter().any(LabelSpec::has_content) {
        return Ok(None);
    }
    let job = PrintJob::new(config, rasterizer, font_source).await?;
    job.export_pdf(labels).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::raster::{ModuleRasterizer, RasterImage, RasterRequest, SymbolEncoder};
    use crate::trace::tests::SharedBuffer;
    use crate::types::{Color, Size};
    use futures::executor::block_on;
    use std::cell::Cell;

    struct Stripes;

    impl SymbolEncoder for Stripes {
        fn encode(&self, value: &str, _symbology: &str) -> std::result::Result<Vec<bool>, String> {
            if value.chars().all(|ch| ch.is_ascii_digit()) {
                Ok(value.chars().map(|ch| ch != '0').chain([true, false]).collect())
            } else {
                Err(format!("{value:?} is not numeric"))
            }
        }
    }

    struct Unreachable;

    impl BarcodeRasterizer for Unreachable {
        async fn rasterize(&self, _request: &RasterRequest) -> Result<RasterImage> {
            Err(LabelError::Rasterization("no surface".to_string()))
        }
    }

    struct BrokenFonts;

    impl FontSource for BrokenFonts {
        async fn load(&self, _role: FontRole) -> Result<Option<Vec<u8>>> {
            Err(LabelError::Io(std::io::Error::other("connection reset")))
        }
    }

    struct CountingFonts {
        calls: Cell<usize>,
    }

    impl FontSource for CountingFonts {
        async fn load(&self, _role: FontRole) -> Result<Option<Vec<u8>>> {
            self.calls.set(self.calls.get() + 1);
            Ok(None)
        }
    }

    fn label(name: &str, value: &str) -> LabelSpec {
        LabelSpec {
            product_name: name.to_string(),
            sub_product_name: "500 ml".to_string(),
            barcode_value: value.to_string(),
            include_name: true,
            show_text: true,
            ..LabelSpec::default()
        }
    }

    fn strings(document: &Document, page: usize) -> Vec<String> {
        document.pages[page]
            .commands
            .iter()
            .filter_map(|command| match command {
                Command::DrawString { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn blocks_are_drawn_in_order_with_role_inks() {
        let rasterizer = ModuleRasterizer::new(Stripes);
        let job = block_on(PrintJob::new(LayoutConfig::default(), &rasterizer, &BuiltinFonts))
            .expect("job");
        let document = block_on(job.render_batch(&[label("Green Tea", "4006381333931")]))
            .expect("printable");
        assert_eq!(document.pages.len(), 1);
        assert_eq!(document.pages[0].size, Size::from_mm(60.0, 40.0));
        assert_eq!(
            strings(&document, 0),
            vec!["Green Tea", "500 ml", "4006381333931"]
        );
        assert_eq!(
            job.fonts(),
            &PrintFonts {
                regular: DEFAULT_FONT.to_string(),
                bold: DEFAULT_FONT.to_string(),
            }
        );
        let fills: Vec<Color> = document.pages[0]
            .commands
            .iter()
            .filter_map(|command| match command {
                Command::SetFillColor(color) => Some(*color),
                _ => None,
            })
            .collect();
        let dark = LayoutConfig::default().dark_ink();
        assert_eq!(fills, vec![dark, Color::BLACK, dark]);
        assert_eq!(document.images.len(), 1);
    }

    #[test]
    fn cursor_descends_through_every_block() {
        let rasterizer = ModuleRasterizer::new(Stripes);
        let job = block_on(PrintJob::new(LayoutConfig::default(), &rasterizer, &BuiltinFonts))
            .expect("job");
        let mut canvas = Canvas::new();
        let spec = label("Green Tea", "123");
        let placement = block_on(job.render_label(&mut canvas, &spec));
        assert!(placement.barcode_drawn);

        let document = canvas.finish();
        let mut last_y = Pt::from_mm(40.0);
        for command in &document.pages[0].commands {
            let y = match command {
                Command::DrawString { y, .. } => *y,
                Command::DrawImage { y, .. } => *y,
                _ => continue,
            };
            assert!(y < last_y);
            last_y = y;
        }
        assert_eq!(placement.cursor_y, last_y);
        assert!(placement.cursor_y > Pt::ZERO);
    }

    #[test]
    fn rasterizer_failure_keeps_the_page() {
        let job = block_on(PrintJob::new(LayoutConfig::default(), &Unreachable, &BuiltinFonts))
            .expect("job");
        let document = block_on(job.render_batch(&[label("Green Tea", "123")])).expect("page");
        assert_eq!(
            strings(&document, 0),
            vec!["Green Tea", "500 ml", "barcode generation error", "123"]
        );
        assert!(document.images.is_empty());
    }

    #[test]
    fn empty_labels_are_skipped() {
        let rasterizer = ModuleRasterizer::new(Stripes);
        let job = block_on(PrintJob::new(LayoutConfig::default(), &rasterizer, &BuiltinFonts))
            .expect("job");
        let blank = LabelSpec::default();
        assert!(block_on(job.render_batch(&[blank.clone()])).is_none());

        let small = LabelSpec {
            width_mm: 30.0,
            height_mm: 20.0,
            ..label("Oolong", "42")
        };
        let document =
            block_on(job.render_batch(&[blank, label("Green Tea", "1"), small])).expect("pages");
        assert_eq!(document.pages.len(), 2);
        assert_eq!(document.pages[1].size, Size::from_mm(30.0, 20.0));
    }

    #[test]
    fn font_fetch_failure_rejects_the_job() {
        let rasterizer = ModuleRasterizer::new(Stripes);
        let result = block_on(print_labels(
            &[label("Green Tea", "1")],
            LayoutConfig::default(),
            &rasterizer,
            &BrokenFonts,
        ));
        assert!(matches!(result, Err(LabelError::FontLoad(_))));
    }

    #[test]
    fn fonts_are_not_fetched_for_an_empty_batch() {
        let rasterizer = ModuleRasterizer::new(Stripes);
        let fonts = CountingFonts {
            calls: Cell::new(0),
        };
        let result = block_on(print_labels(
            &[LabelSpec::default()],
            LayoutConfig::default(),
            &rasterizer,
            &fonts,
        ))
        .expect("no error");
        assert!(result.is_none());
        assert_eq!(fonts.calls.get(), 0);

        let pdf = block_on(print_labels(
            &[label("Green Tea", "1")],
            LayoutConfig::default(),
            &rasterizer,
            &fonts,
        ))
        .expect("pdf")
        .expect("printable");
        assert_eq!(fonts.calls.get(), 2);
        let parsed = lopdf::Document::load_mem(&pdf).expect("parse pdf");
        assert_eq!(parsed.get_pages().len(), 1);
    }

    #[test]
    fn cyrillic_names_print_with_an_embedded_font() {
        struct SystemFont;
        impl FontSource for SystemFont {
            async fn load(&self, role: FontRole) -> Result<Option<Vec<u8>>> {
                Ok(match role {
                    FontRole::Regular => crate::font::tests::system_font(),
                    FontRole::Bold => None,
                })
            }
        }
        if crate::font::tests::system_font().is_none() {
            return;
        }
        let rasterizer = ModuleRasterizer::new(Stripes);
        let pdf = block_on(print_labels(
            &[label("Иван-чай", "4006381333931")],
            LayoutConfig::default(),
            &rasterizer,
            &SystemFont,
        ))
        .expect("pdf")
        .expect("printable");

        let parsed = lopdf::Document::load_mem(&pdf).expect("parse pdf");
        let page_id = *parsed.get_pages().values().next().expect("page");
        let fonts = parsed.get_page_fonts(page_id).expect("fonts");
        assert_eq!(fonts.len(), 1);
        for font in fonts.values() {
            let subtype = font.get(b"Subtype").and_then(lopdf::Object::as_name).expect("subtype");
            assert_eq!(subtype, b"Type0");
            assert!(font.has(b"ToUnicode"));
        }
        let content = parsed.get_page_content(page_id).expect("content");
        assert!(!content.contains(&b'?'));
        assert!(!content.windows(3).any(|window| window == b"Tj "));
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        struct Garbage;
        impl FontSource for Garbage {
            async fn load(&self, _role: FontRole) -> Result<Option<Vec<u8>>> {
                Ok(Some(vec![0xde, 0xad]))
            }
        }
        let rasterizer = ModuleRasterizer::new(Stripes);
        let result = block_on(PrintJob::new(LayoutConfig::default(), &rasterizer, &Garbage));
        assert!(matches!(result, Err(LabelError::InvalidFont(_))));
    }

    #[test]
    fn batch_is_traced() {
        let rasterizer = ModuleRasterizer::new(Stripes);
        let buffer = SharedBuffer::default();
        let job = block_on(PrintJob::new(LayoutConfig::default(), &rasterizer, &BuiltinFonts))
            .expect("job")
            .with_trace(LayoutTrace::from_writer(buffer.clone()));
        block_on(job.render_batch(&[label("Green Tea", "1"), label("Oolong", "x")]));
        let lines = buffer.lines();
        let kinds: Vec<&str> = lines.iter().filter_map(|l| l["type"].as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "print.budget",
                "print.label",
                "print.budget",
                "print.label",
                "trace.summary"
            ]
        );
        assert_eq!(lines[3]["barcode_drawn"], false);
        assert_eq!(lines[4]["counts"]["print.barcode_fallback"], 1);
    }
}
