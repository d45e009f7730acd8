//! Vertical space budget for one label, independent of the render backend.

use crate::config::LayoutConfig;
use crate::label::LabelSpec;
use crate::units;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// CSS pixels, used by the screen preview.
    Px,
    /// Document points, used by the print backend.
    Pt,
}

impl Unit {
    pub fn from_mm(self, mm: f64) -> f64 {
        match self {
            Unit::Px => units::mm_to_px(mm),
            Unit::Pt => units::mm_to_pt(mm),
        }
    }

    // Font sizes are chosen in CSS pixels on both backends.
    pub fn from_px(self, px: f64) -> f64 {
        match self {
            Unit::Px => px,
            Unit::Pt => units::px_to_pt(px),
        }
    }
}

/// Padding, gap and minimum barcode height converted to one backend's unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackendMetrics {
    pub unit: Unit,
    pub vertical_padding: f64,
    pub gap_spacing: f64,
    pub min_barcode_height: f64,
    pub barcode_text_reserve_ratio: f64,
}

impl BackendMetrics {
    pub fn new(unit: Unit, config: &LayoutConfig) -> Self {
        Self {
            unit,
            vertical_padding: unit.from_mm(config.vertical_padding_mm),
            gap_spacing: unit.from_mm(config.gap_mm),
            min_barcode_height: unit.from_px(config.min_barcode_height_px),
            barcode_text_reserve_ratio: config.barcode_text_reserve_ratio,
        }
    }

    pub fn screen(config: &LayoutConfig) -> Self {
        Self::new(Unit::Px, config)
    }

    pub fn print(config: &LayoutConfig) -> Self {
        Self::new(Unit::Pt, config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpaceBudget {
    pub unit: Unit,
    pub base_height: f64,
    pub vertical_padding: f64,
    pub gap_spacing: f64,
    pub gap_count: usize,
    pub reserved_for_names: f64,
    pub reserved_for_barcode_text: f64,
    /// Residual height left for the barcode, never below the minimum.
    pub available: f64,
    pub min_barcode_height: f64,
}

impl SpaceBudget {
    pub fn compute(spec: &LabelSpec, metrics: &BackendMetrics) -> Self {
        let unit = metrics.unit;
        let base_height = unit.from_mm(spec.height_mm);

        // One gap between name and sub-name, one before the barcode.
        let gap_count = match (spec.include_name, spec.has_sub_name()) {
            (false, _) => 0,
            (true, false) => 1,
            (true, true) => 2,
        };

        // A font-size unit stands in for one single-line block.
        let reserved_for_names = if spec.include_name {
            let sub = if spec.has_sub_name() {
                spec.sub_product_font_size
            } else {
                0.0
            };
            unit.from_px(spec.product_font_size + sub)
        } else {
            0.0
        };
        let reserved_for_barcode_text = if spec.show_text {
            unit.from_px(spec.barcode_font_size * metrics.barcode_text_reserve_ratio)
        } else {
            0.0
        };

        let raw = base_height
            - metrics.vertical_padding
            - reserved_for_names
            - reserved_for_barcode_text
            - gap_count as f64 * metrics.gap_spacing;
        let available = raw.max(metrics.min_barcode_height);

        Self {
            unit,
            base_height,
            vertical_padding: metrics.vertical_padding,
            gap_spacing: metrics.gap_spacing,
            gap_count,
            reserved_for_names,
            reserved_for_barcode_text,
            available,
            min_barcode_height: metrics.min_barcode_height,
        }
    }

    /// Requested barcode height before any backend residual-space ceiling.
    pub fn requested_barcode_height(&self) -> f64 {
        self.available.round().max(self.min_barcode_height)
    }
}

/// Requested barcode height in whole CSS pixels. The print backend derives
/// its point height from this value so both targets rasterize the same bars.
pub fn base_barcode_height_px(spec: &LabelSpec, config: &LayoutConfig) -> f64 {
    SpaceBudget::compute(spec, &BackendMetrics::screen(config)).requested_barcode_height()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(height_mm: f64) -> LabelSpec {
        LabelSpec {
            height_mm,
            product_name: "Tea".to_string(),
            barcode_value: "12345".to_string(),
            product_font_size: 16.0,
            include_name: true,
            show_text: false,
            ..LabelSpec::default()
        }
    }

    #[test]
    fn name_only_label_reserves_one_gap() {
        let config = LayoutConfig::default();
        let metrics = BackendMetrics::screen(&config);
        let budget = SpaceBudget::compute(&label(40.0), &metrics);
        assert_eq!(budget.reserved_for_names, 16.0);
        assert_eq!(budget.gap_count, 1);
        assert_eq!(budget.reserved_for_barcode_text, 0.0);

        let expected = units::mm_to_px(40.0) - units::mm_to_px(4.0) - 16.0 - units::mm_to_px(1.3);
        assert!((budget.available - expected).abs() < 1e-9);
        assert_eq!(budget.requested_barcode_height(), expected.round());
        assert_eq!(base_barcode_height_px(&label(40.0), &config), 115.0);
    }

    #[test]
    fn sub_name_and_text_are_reserved() {
        let config = LayoutConfig::default();
        let mut spec = label(40.0);
        spec.sub_product_name = "500 ml".to_string();
        spec.sub_product_font_size = 14.0;
        spec.show_text = true;
        spec.barcode_font_size = 10.0;
        let budget = SpaceBudget::compute(&spec, &BackendMetrics::screen(&config));
        assert_eq!(budget.gap_count, 2);
        assert_eq!(budget.reserved_for_names, 30.0);
        assert!((budget.reserved_for_barcode_text - 14.0).abs() < 1e-9);
    }

    #[test]
    fn hidden_names_reserve_nothing() {
        let config = LayoutConfig::default();
        let mut spec = label(40.0);
        spec.include_name = false;
        spec.sub_product_name = "ignored".to_string();
        let budget = SpaceBudget::compute(&spec, &BackendMetrics::screen(&config));
        assert_eq!(budget.gap_count, 0);
        assert_eq!(budget.reserved_for_names, 0.0);
    }

    #[test]
    fn crowded_label_floors_at_minimum() {
        let config = LayoutConfig::default();
        let spec = LabelSpec {
            height_mm: 20.0,
            product_name: "A".to_string(),
            sub_product_name: "B".to_string(),
            barcode_value: "1".to_string(),
            product_font_size: 36.0,
            sub_product_font_size: 32.0,
            barcode_font_size: 28.0,
            include_name: true,
            show_text: true,
            ..LabelSpec::default()
        };
        let budget = SpaceBudget::compute(&spec, &BackendMetrics::screen(&config));
        assert_eq!(budget.available, 8.0);
        assert_eq!(budget.requested_barcode_height(), 8.0);
    }

    #[test]
    fn resolved_height_never_below_minimum() {
        let config = LayoutConfig::default();
        for height in [20.0, 25.0, 33.0, 47.0, 60.0] {
            for font in [8.0, 16.0, 24.0, 36.0] {
                for (include_name, show_text) in
                    [(true, true), (true, false), (false, true), (false, false)]
                {
                    let spec = LabelSpec {
                        height_mm: height,
                        product_name: "N".to_string(),
                        sub_product_name: "S".to_string(),
                        product_font_size: font,
                        sub_product_font_size: font.min(32.0),
                        barcode_font_size: font.min(28.0),
                        include_name,
                        show_text,
                        ..LabelSpec::default()
                    };
                    let backends = [
                        BackendMetrics::screen(&config),
                        BackendMetrics::print(&config),
                    ];
                    for metrics in backends {
                        let budget = SpaceBudget::compute(&spec, &metrics);
                        assert!(budget.requested_barcode_height() >= metrics.min_barcode_height);
                    }
                }
            }
        }
    }

    #[test]
    fn print_budget_is_the_screen_budget_in_points() {
        let config = LayoutConfig::default();
        let spec = label(52.0);
        let px = SpaceBudget::compute(&spec, &BackendMetrics::screen(&config));
        let pt = SpaceBudget::compute(&spec, &BackendMetrics::print(&config));
        assert!((units::px_to_pt(px.available) - pt.available).abs() < 1e-9);
    }
}
