use crate::error::{LabelError, Result};
use crate::types::Color;
use crate::units;
use serde::Deserialize;

/// Physical constants shared by the screen and print backends.
///
/// Both backends read the same millimeter values so a label measures the same
/// on screen and on paper. Paddings are totals (top + bottom, left + right).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    pub vertical_padding_mm: f64,
    pub horizontal_padding_mm: f64,
    pub gap_mm: f64,
    pub min_barcode_height_px: f64,
    pub line_height_ratio: f64,
    pub barcode_text_reserve_ratio: f64,
    pub min_line_height_ratio: f64,
    pub space_width_threshold: f64,
    pub space_width_target: f64,
    pub barcode_canvas_scale: f64,
    pub fallback_text: String,
    pub fallback_font_size_px: f64,
    pub dark_ink: [u8; 3],
    pub sub_name_ink: [u8; 3],
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            vertical_padding_mm: 4.0,
            horizontal_padding_mm: 6.0,
            gap_mm: 1.3,
            min_barcode_height_px: 8.0,
            line_height_ratio: 1.2,
            barcode_text_reserve_ratio: 1.4,
            min_line_height_ratio: 0.1,
            space_width_threshold: 0.5,
            space_width_target: 0.33,
            barcode_canvas_scale: 2.0,
            fallback_text: "barcode generation error".to_string(),
            fallback_font_size_px: 12.0,
            dark_ink: [17, 24, 39],
            sub_name_ink: [0, 0, 0],
        }
    }
}

impl LayoutConfig {
    pub fn builder() -> LayoutConfigBuilder {
        LayoutConfigBuilder::new()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: LayoutConfig = serde_json::from_str(json)
            .map_err(|err| LabelError::InvalidConfiguration(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn min_barcode_height_pt(&self) -> f64 {
        units::px_to_pt(self.min_barcode_height_px)
    }

    pub fn dark_ink(&self) -> Color {
        let [r, g, b] = self.dark_ink;
        Color::rgb8(r, g, b)
    }

    pub fn sub_name_ink(&self) -> Color {
        let [r, g, b] = self.sub_name_ink;
        Color::rgb8(r, g, b)
    }

    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("vertical_padding_mm", self.vertical_padding_mm),
            ("horizontal_padding_mm", self.horizontal_padding_mm),
            ("gap_mm", self.gap_mm),
            ("barcode_text_reserve_ratio", self.barcode_text_reserve_ratio),
            ("min_line_height_ratio", self.min_line_height_ratio),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(LabelError::InvalidConfiguration(format!(
                    "{name} must be a finite value >= 0 (got {value})"
                )));
            }
        }
        let positive = [
            ("min_barcode_height_px", self.min_barcode_height_px),
            ("line_height_ratio", self.line_height_ratio),
            ("space_width_threshold", self.space_width_threshold),
            ("space_width_target", self.space_width_target),
            ("barcode_canvas_scale", self.barcode_canvas_scale),
            ("fallback_font_size_px", self.fallback_font_size_px),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(LabelError::InvalidConfiguration(format!(
                    "{name} must be a finite value > 0 (got {value})"
                )));
            }
        }
        if self.line_height_ratio < 1.0 {
            return Err(LabelError::InvalidConfiguration(
                "line_height_ratio must be >= 1 so lines never overlap".to_string(),
            ));
        }
        if self.fallback_text.trim().is_empty() {
            return Err(LabelError::InvalidConfiguration(
                "fallback_text must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LayoutConfigBuilder {
    config: LayoutConfig,
}

impl LayoutConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: LayoutConfig::default(),
        }
    }

    pub fn vertical_padding_mm(mut self, value: f64) -> Self {
        self.config.vertical_padding_mm = value;
        self
    }

    pub fn horizontal_padding_mm(mut self, value: f64) -> Self {
        self.config.horizontal_padding_mm = value;
        self
    }

    pub fn gap_mm(mut self, value: f64) -> Self {
        self.config.gap_mm = value;
        self
    }

    pub fn min_barcode_height_px(mut self, value: f64) -> Self {
        self.config.min_barcode_height_px = value;
        self
    }

    pub fn line_height_ratio(mut self, value: f64) -> Self {
        self.config.line_height_ratio = value;
        self
    }

    // Space glyphs wider than `threshold * size` are narrowed toward
    // `target * size` in the print backend.
    pub fn space_width_correction(mut self, threshold: f64, target: f64) -> Self {
        self.config.space_width_threshold = threshold;
        self.config.space_width_target = target;
        self
    }

    pub fn barcode_canvas_scale(mut self, value: f64) -> Self {
        self.config.barcode_canvas_scale = value;
        self
    }

    pub fn fallback_text(mut self, text: impl Into<String>, font_size_px: f64) -> Self {
        self.config.fallback_text = text.into();
        self.config.fallback_font_size_px = font_size_px;
        self
    }

    pub fn build(self) -> Result<LayoutConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for LayoutConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
