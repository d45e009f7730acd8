//! Screen preview driver.
//!
//! The preview box is sized in CSS pixels from the label's millimeters. After
//! the caller has rendered the text nodes, their measured geometry goes
//! through the compressor, the barcode height is resolved against the
//! remaining space and the symbol renderer is invoked with it.

use crate::barcode::{
    BarcodeRenderOptions, BarcodeRenderer, ResolvedBarcodeHeight, render_barcode,
    resolve_barcode_height,
};
use crate::block::{BlockKind, build_blocks};
use crate::budget::{BackendMetrics, SpaceBudget, base_barcode_height_px};
use crate::compress::{
    LineHeightBaseline, LineHeightOverride, PreviewMeasurement, TextItemMeasurement, compress,
};
use crate::config::LayoutConfig;
use crate::error::Result;
use crate::label::LabelSpec;
use crate::trace::LayoutTrace;
use crate::units;
use log::debug;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewBlock {
    pub kind: BlockKind,
    pub lines: Vec<String>,
    /// CSS pixels; `None` for the barcode box.
    pub font_size: Option<f64>,
}

impl PreviewBlock {
    pub fn natural_line_height(&self, config: &LayoutConfig) -> Option<f64> {
        self.font_size.map(|size| size * config.line_height_ratio)
    }
}

/// Static geometry of one preview box, before any measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewLayout {
    pub width_px: f64,
    pub height_px: f64,
    pub padding_top_px: f64,
    pub padding_bottom_px: f64,
    pub padding_horizontal_px: f64,
    pub gap_px: f64,
    pub blocks: Vec<PreviewBlock>,
    /// Barcode height requested before the preview is measured.
    pub requested_barcode_height_px: f64,
}

impl PreviewLayout {
    pub fn text_blocks(&self) -> impl Iterator<Item = &PreviewBlock> {
        self.blocks.iter().filter(|block| block.font_size.is_some())
    }

    /// Measurement a surface without real glyph metrics would report: every
    /// line is exactly `font_size * line_height_ratio` tall.
    pub fn estimated_measurement(&self, config: &LayoutConfig) -> PreviewMeasurement {
        let text_items = self
            .text_blocks()
            .filter_map(|block| {
                let font_size = block.font_size?;
                let line_height = block.natural_line_height(config)?;
                let line_count = block.lines.len().max(1);
                Some(TextItemMeasurement {
                    kind: block.kind,
                    font_size,
                    computed_line_height: Some(line_height),
                    height: line_height * line_count as f64,
                    line_count,
                })
            })
            .collect();
        PreviewMeasurement {
            client_height: self.height_px,
            padding_top: self.padding_top_px,
            padding_bottom: self.padding_bottom_px,
            natural_gap: self.gap_px,
            text_items,
        }
    }
}

pub fn preview_layout(spec: &LabelSpec, config: &LayoutConfig) -> PreviewLayout {
    let padding_vertical = units::mm_to_px(config.vertical_padding_mm / 2.0);
    let blocks = build_blocks(spec)
        .iter()
        .map(|block| PreviewBlock {
            kind: block.kind(),
            lines: block.lines().into_iter().map(str::to_string).collect(),
            font_size: block.font_size(),
        })
        .collect();
    PreviewLayout {
        width_px: units::mm_to_px(spec.width_mm),
        height_px: units::mm_to_px(spec.height_mm),
        padding_top_px: padding_vertical,
        padding_bottom_px: padding_vertical,
        padding_horizontal_px: units::mm_to_px(config.horizontal_padding_mm / 2.0),
        gap_px: units::mm_to_px(config.gap_mm),
        blocks,
        requested_barcode_height_px: base_barcode_height_px(spec, config),
    }
}

/// Presentation changes for one preview node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutAdjustment {
    /// Gap override in pixels; `None` restores the natural gap.
    pub gap: Option<f64>,
    pub line_heights: Vec<LineHeightOverride>,
    pub barcode: ResolvedBarcodeHeight,
}

impl LayoutAdjustment {
    pub fn line_height_for(&self, kind: BlockKind) -> Option<f64> {
        self.line_heights
            .iter()
            .find(|entry| entry.kind == kind)
            .map(|entry| entry.line_height)
    }
}

/// A rendered preview node the fitter can measure and restyle.
pub trait PreviewSurface {
    /// Geometry with every previous override removed.
    fn measure(&mut self) -> Result<PreviewMeasurement>;

    fn apply(&mut self, adjustment: &LayoutAdjustment);
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewOutcome {
    /// `None` when the label has no barcode value; the node keeps its natural
    /// layout.
    pub adjustment: Option<LayoutAdjustment>,
    /// `false` when the value was empty or the renderer failed; the caller
    /// shows the fallback text instead.
    pub barcode_rendered: bool,
}

pub fn fit_preview(
    spec: &LabelSpec,
    measurement: &PreviewMeasurement,
    baseline: &mut LineHeightBaseline,
    config: &LayoutConfig,
) -> Result<LayoutAdjustment> {
    let compression = compress(measurement, baseline, config)?;
    let base = base_barcode_height_px(spec, config);
    let barcode = resolve_barcode_height(
        base,
        Some(compression.ceiling),
        config.min_barcode_height_px,
    );
    debug!(
        "preview barcode base={base} ceiling={} height={}",
        barcode.ceiling, barcode.height
    );
    Ok(LayoutAdjustment {
        gap: compression.gap,
        line_heights: compression.line_heights,
        barcode,
    })
}

/// Fits one preview node. Owns the node's line-height baseline, so keep one
/// fitter per node and call `reset` when the node is rebuilt.
#[derive(Debug)]
pub struct PreviewFitter {
    config: LayoutConfig,
    baseline: LineHeightBaseline,
    trace: Option<LayoutTrace>,
}

impl PreviewFitter {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            baseline: LineHeightBaseline::new(),
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: LayoutTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn baseline(&self) -> &LineHeightBaseline {
        &self.baseline
    }

    pub fn reset(&mut self) {
        self.baseline.clear();
    }

    pub fn fit(
        &mut self,
        spec: &LabelSpec,
        measurement: &PreviewMeasurement,
    ) -> Result<LayoutAdjustment> {
        if let Some(trace) = &self.trace {
            let budget = SpaceBudget::compute(spec, &BackendMetrics::screen(&self.config));
            trace.record("screen.budget", &budget);
        }
        let adjustment = fit_preview(spec, measurement, &mut self.baseline, &self.config)?;
        if let Some(trace) = &self.trace {
            trace.record("screen.adjustment", &adjustment);
        }
        Ok(adjustment)
    }

    /// Measure, fit, apply, then render the barcode at the resolved height.
    /// A label without a barcode value or a failed measurement leaves the
    /// surface untouched.
    pub fn adjust<S, R>(
        &mut self,
        surface: &mut S,
        renderer: &mut R,
        spec: &LabelSpec,
    ) -> Result<PreviewOutcome>
    where
        S: PreviewSurface + ?Sized,
        R: BarcodeRenderer + ?Sized,
    {
        if !spec.has_barcode_value() {
            debug!("preview adjustment skipped: no barcode value");
            return Ok(PreviewOutcome {
                adjustment: None,
                barcode_rendered: false,
            });
        }
        let measurement = surface.measure().inspect_err(|err| {
            debug!("preview adjustment skipped: {err}");
        })?;
        let adjustment = self.fit(spec, &measurement)?;
        surface.apply(&adjustment);

        let options = BarcodeRenderOptions::for_label(spec, &adjustment.barcode);
        let barcode_rendered = render_barcode(renderer, &spec.barcode_value, &options);
        if !barcode_rendered {
            if let Some(trace) = &self.trace {
                trace.increment("screen.barcode_fallback", 1);
            }
        }
        Ok(PreviewOutcome {
            adjustment: Some(adjustment),
            barcode_rendered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LabelError;
    use crate::trace::tests::SharedBuffer;

    fn spec() -> LabelSpec {
        LabelSpec {
            product_name: "Green Tea".to_string(),
            barcode_value: "4006381333931".to_string(),
            include_name: true,
            show_text: true,
            ..LabelSpec::default()
        }
    }

    struct FakeSurface {
        measurement: Result<PreviewMeasurement>,
        applied: Vec<LayoutAdjustment>,
    }

    impl PreviewSurface for FakeSurface {
        fn measure(&mut self) -> Result<PreviewMeasurement> {
            match &self.measurement {
                Ok(measurement) => Ok(measurement.clone()),
                Err(_) => Err(LabelError::MeasurementUnavailable(
                    "node detached".to_string(),
                )),
            }
        }

        fn apply(&mut self, adjustment: &LayoutAdjustment) {
            self.applied.push(adjustment.clone());
        }
    }

    struct Renderer {
        heights: Vec<u32>,
        fail: bool,
    }

    impl BarcodeRenderer for Renderer {
        fn render(
            &mut self,
            _value: &str,
            options: &BarcodeRenderOptions,
        ) -> std::result::Result<(), String> {
            self.heights.push(options.height);
            if self.fail {
                Err("bad checksum".to_string())
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn layout_mirrors_label_millimeters() {
        let config = LayoutConfig::default();
        let layout = preview_layout(&spec(), &config);
        assert!((layout.width_px - units::mm_to_px(60.0)).abs() < 1e-9);
        assert!((layout.height_px - units::mm_to_px(40.0)).abs() < 1e-9);
        assert!((layout.padding_top_px - units::mm_to_px(2.0)).abs() < 1e-9);
        let kinds: Vec<BlockKind> = layout.blocks.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![BlockKind::Name, BlockKind::Barcode, BlockKind::BarcodeText]
        );
        assert_eq!(layout.text_blocks().count(), 2);
    }

    #[test]
    fn measured_ceiling_caps_the_requested_height() {
        let config = LayoutConfig::default();
        let layout = preview_layout(&spec(), &config);
        let mut baseline = LineHeightBaseline::new();
        let adjustment = fit_preview(
            &spec(),
            &layout.estimated_measurement(&config),
            &mut baseline,
            &config,
        )
        .expect("fit");
        assert_eq!(adjustment.gap, None);
        assert!(adjustment.line_heights.is_empty());
        // content 136.06 - text 33.6 - two gaps 9.83
        assert_eq!(adjustment.barcode.ceiling, 92.0);
        assert_eq!(layout.requested_barcode_height_px, 98.0);
        assert_eq!(adjustment.barcode.height, 92.0);
    }

    #[test]
    fn crowded_label_is_capped_by_the_measured_ceiling() {
        let config = LayoutConfig::default();
        let crowded = LabelSpec {
            height_mm: 20.0,
            product_name: "Line one\nLine two\nLine three".to_string(),
            product_font_size: 36.0,
            ..spec()
        };
        let layout = preview_layout(&crowded, &config);
        let mut baseline = LineHeightBaseline::new();
        let adjustment = fit_preview(
            &crowded,
            &layout.estimated_measurement(&config),
            &mut baseline,
            &config,
        )
        .expect("fit");
        assert_eq!(adjustment.gap, Some(0.0));
        assert!(adjustment.line_height_for(BlockKind::Name).is_some());
        assert_eq!(adjustment.line_height_for(BlockKind::Name), Some(15.0));
        assert_eq!(adjustment.line_height_for(BlockKind::BarcodeText), Some(5.0));
        assert_eq!(adjustment.barcode.height, 8.0);
        assert_eq!(adjustment.barcode.ceiling, 10.0);
    }

    #[test]
    fn adjust_applies_then_renders_at_resolved_height() {
        let config = LayoutConfig::default();
        let layout = preview_layout(&spec(), &config);
        let mut surface = FakeSurface {
            measurement: Ok(layout.estimated_measurement(&config)),
            applied: Vec::new(),
        };
        let mut renderer = Renderer {
            heights: Vec::new(),
            fail: false,
        };
        let mut fitter = PreviewFitter::new(config);
        let outcome = fitter
            .adjust(&mut surface, &mut renderer, &spec())
            .expect("adjust");
        assert!(outcome.barcode_rendered);
        let adjustment = outcome.adjustment.expect("adjustment");
        assert_eq!(renderer.heights, vec![adjustment.barcode.height as u32]);
        assert_eq!(surface.applied, vec![adjustment]);
    }

    #[test]
    fn failed_measurement_mutates_nothing() {
        let mut surface = FakeSurface {
            measurement: Err(LabelError::MeasurementUnavailable("detached".to_string())),
            applied: Vec::new(),
        };
        let mut renderer = Renderer {
            heights: Vec::new(),
            fail: false,
        };
        let mut fitter = PreviewFitter::new(LayoutConfig::default());
        let err = fitter
            .adjust(&mut surface, &mut renderer, &spec())
            .unwrap_err();
        assert!(matches!(err, LabelError::MeasurementUnavailable(_)));
        assert!(surface.applied.is_empty());
        assert!(renderer.heights.is_empty());
    }

    #[test]
    fn renderer_failure_is_reported_and_traced() {
        let config = LayoutConfig::default();
        let layout = preview_layout(&spec(), &config);
        let mut surface = FakeSurface {
            measurement: Ok(layout.estimated_measurement(&config)),
            applied: Vec::new(),
        };
        let mut renderer = Renderer {
            heights: Vec::new(),
            fail: true,
        };
        let buffer = SharedBuffer::default();
        let mut fitter =
            PreviewFitter::new(config).with_trace(LayoutTrace::from_writer(buffer.clone()));
        let outcome = fitter
            .adjust(&mut surface, &mut renderer, &spec())
            .expect("adjust");
        assert!(!outcome.barcode_rendered);
        assert_eq!(renderer.heights.len(), 1);
        assert_eq!(surface.applied.len(), 1);

        fitter.trace.as_ref().expect("trace").emit_summary("preview");
        let lines = buffer.lines();
        assert_eq!(lines[0]["type"], "screen.budget");
        assert_eq!(lines[1]["type"], "screen.adjustment");
        assert_eq!(lines[2]["counts"]["screen.barcode_fallback"], 1);
    }

    #[test]
    fn empty_value_leaves_the_preview_untouched() {
        let config = LayoutConfig::default();
        let blank = LabelSpec {
            height_mm: 20.0,
            product_name: "Line one\nLine two\nLine three".to_string(),
            product_font_size: 36.0,
            barcode_value: String::new(),
            ..spec()
        };
        let layout = preview_layout(&blank, &config);
        let mut surface = FakeSurface {
            measurement: Ok(layout.estimated_measurement(&config)),
            applied: Vec::new(),
        };
        let mut renderer = Renderer {
            heights: Vec::new(),
            fail: false,
        };
        let outcome = PreviewFitter::new(config)
            .adjust(&mut surface, &mut renderer, &blank)
            .expect("adjust");
        assert!(!outcome.barcode_rendered);
        assert_eq!(outcome.adjustment, None);
        assert!(surface.applied.is_empty());
        assert!(renderer.heights.is_empty());
    }

    #[test]
    fn reset_forgets_the_baseline() {
        let config = LayoutConfig::default();
        let crowded = LabelSpec {
            height_mm: 20.0,
            product_font_size: 36.0,
            product_name: "A\nB\nC".to_string(),
            ..spec()
        };
        let measurement = preview_layout(&crowded, &config).estimated_measurement(&config);
        let mut fitter = PreviewFitter::new(config);
        fitter.fit(&crowded, &measurement).expect("fit");
        assert!(fitter.baseline().get(BlockKind::Name).is_some());
        fitter.reset();
        assert!(fitter.baseline().get(BlockKind::Name).is_none());
    }
}
