//! Line-height compression for the screen preview.
//!
//! The preview measures its already-rendered text nodes and asks how tall the
//! barcode may be. When the text does not leave the minimum barcode height,
//! the inter-block gap is shrunk first, then every text line height is scaled
//! down by one common ratio. Font sizes are never touched.

use crate::block::BlockKind;
use crate::config::LayoutConfig;
use crate::error::{LabelError, Result};
use log::debug;
use serde::Serialize;
use std::collections::HashMap;

/// Metrics of one rendered text node, taken with all overrides removed.
#[derive(Debug, Clone, PartialEq)]
pub struct TextItemMeasurement {
    pub kind: BlockKind,
    pub font_size: f64,
    /// Resolved line height, `None` when the surface reports `normal`.
    pub computed_line_height: Option<f64>,
    pub height: f64,
    pub line_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewMeasurement {
    pub client_height: f64,
    pub padding_top: f64,
    pub padding_bottom: f64,
    pub natural_gap: f64,
    pub text_items: Vec<TextItemMeasurement>,
}

impl PreviewMeasurement {
    pub fn content_height(&self) -> f64 {
        self.client_height - self.padding_top - self.padding_bottom
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("client_height", self.client_height),
            ("padding_top", self.padding_top),
            ("padding_bottom", self.padding_bottom),
            ("natural_gap", self.natural_gap),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(LabelError::MeasurementUnavailable(format!(
                    "{name} is not finite"
                )));
            }
        }
        if self.content_height() <= 0.0 {
            return Err(LabelError::MeasurementUnavailable(format!(
                "content height {} is not positive",
                self.content_height()
            )));
        }
        for item in &self.text_items {
            if !item.height.is_finite() || !item.font_size.is_finite() {
                return Err(LabelError::MeasurementUnavailable(format!(
                    "{:?} block reported non-finite metrics",
                    item.kind
                )));
            }
        }
        Ok(())
    }
}

/// Natural line heights first observed on one display node.
///
/// Owned by the caller next to the node it describes, so repeated passes
/// compress from the uncompressed value instead of compounding.
#[derive(Debug, Clone, Default)]
pub struct LineHeightBaseline {
    values: HashMap<BlockKind, f64>,
}

impl LineHeightBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: BlockKind) -> Option<f64> {
        self.values.get(&kind).copied()
    }

    /// Forget cached values, e.g. after the node was rebuilt with new fonts.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    fn resolve(&mut self, item: &TextItemMeasurement, line_height_ratio: f64) -> Option<f64> {
        if let Some(cached) = self.get(item.kind).filter(|v| v.is_finite() && *v > 0.0) {
            return Some(cached);
        }
        let observed = match item.computed_line_height {
            Some(value) if value.is_finite() && value > 0.0 => value,
            _ if item.font_size > 0.0 => item.font_size * line_height_ratio,
            _ => item.height,
        };
        if observed.is_finite() && observed > 0.0 {
            self.values.insert(item.kind, observed);
            Some(observed)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineHeightOverride {
    pub kind: BlockKind,
    pub line_height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Compression {
    /// Gap override; `None` restores the natural gap.
    pub gap: Option<f64>,
    pub applied_gap: f64,
    pub line_heights: Vec<LineHeightOverride>,
    pub text_height: f64,
    pub available: f64,
    /// Barcode height ceiling in whole pixels, never below the minimum.
    pub ceiling: f64,
}

pub fn compress(
    measurement: &PreviewMeasurement,
    baseline: &mut LineHeightBaseline,
    config: &LayoutConfig,
) -> Result<Compression> {
    measurement.validate()?;
    let min_height = config.min_barcode_height_px;
    let content_height = measurement.content_height();
    let items = &measurement.text_items;
    let gap_count = items.len() as f64;
    let natural_text_height: f64 = items.iter().map(|item| item.height).sum();

    let initial = content_height - natural_text_height - measurement.natural_gap * gap_count;
    let (gap, applied_gap) = if !items.is_empty() && initial < min_height {
        let spare = (content_height - natural_text_height - min_height).max(0.0);
        let target = (spare / gap_count).floor().max(0.0);
        (Some(target), target)
    } else {
        (None, measurement.natural_gap)
    };

    let mut text_height = natural_text_height;
    let mut available = content_height - text_height - applied_gap * gap_count;
    let mut line_heights = Vec::new();

    if !items.is_empty() && available < min_height {
        let target_text_space = (content_height - applied_gap * gap_count - min_height).max(0.0);
        let ratio = if text_height > 0.0 && target_text_space < text_height {
            Some(target_text_space / text_height)
        } else if target_text_space <= 0.0 {
            Some(0.0)
        } else {
            None
        };
        if let Some(ratio) = ratio {
            let ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.0 };
            let mut compressed_height = 0.0;
            for item in items {
                match compress_item(item, ratio, baseline, config) {
                    Some(line_height) => {
                        line_heights.push(LineHeightOverride {
                            kind: item.kind,
                            line_height,
                        });
                        compressed_height += line_height * item.line_count.max(1) as f64;
                    }
                    None => compressed_height += item.height,
                }
            }
            if !line_heights.is_empty() {
                text_height = compressed_height;
                available = content_height - text_height - applied_gap * gap_count;
            }
            debug!(
                "line-height compression ratio={:.4} text_height={:.2}->{:.2}",
                ratio, natural_text_height, text_height
            );
        }
    }

    let ceiling = available.floor().max(min_height);
    debug!(
        "preview fit content={:.2} gap={:.2} available={:.2} ceiling={}",
        content_height, applied_gap, available, ceiling
    );
    Ok(Compression {
        gap,
        applied_gap,
        line_heights,
        text_height,
        available,
        ceiling,
    })
}

fn compress_item(
    item: &TextItemMeasurement,
    ratio: f64,
    baseline: &mut LineHeightBaseline,
    config: &LayoutConfig,
) -> Option<f64> {
    let base = baseline.resolve(item, config.line_height_ratio)?;
    let minimum = if item.font_size > 0.0 {
        (item.font_size * config.min_line_height_ratio).round().max(1.0)
    } else {
        1.0
    };
    Some((base * ratio).floor().max(minimum))
}
