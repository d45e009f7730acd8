use crate::types::Size;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BarcodeType {
    #[default]
    Code128,
    Ean13,
    Code39,
    Itf14,
}

impl BarcodeType {
    /// Unknown names map to Code128, matching how stored labels were read.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "ean13" => BarcodeType::Ean13,
            "code39" => BarcodeType::Code39,
            "itf14" => BarcodeType::Itf14,
            _ => BarcodeType::Code128,
        }
    }

    /// Symbology identifier handed to the external symbol renderer.
    pub fn symbology(self) -> &'static str {
        match self {
            BarcodeType::Code128 => "CODE128",
            BarcodeType::Ean13 => "EAN13",
            BarcodeType::Code39 => "CODE39",
            BarcodeType::Itf14 => "ITF14",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct NumericRange {
    min: f64,
    max: f64,
    fallback: f64,
}

const PRODUCT_FONT_RANGE: NumericRange = NumericRange {
    min: 8.0,
    max: 36.0,
    fallback: 16.0,
};
const SUB_PRODUCT_FONT_RANGE: NumericRange = NumericRange {
    min: 8.0,
    max: 32.0,
    fallback: 14.0,
};
const BARCODE_FONT_RANGE: NumericRange = NumericRange {
    min: 8.0,
    max: 28.0,
    fallback: 12.0,
};
const LABEL_WIDTH_RANGE: NumericRange = NumericRange {
    min: 30.0,
    max: 100.0,
    fallback: 60.0,
};
const LABEL_HEIGHT_RANGE: NumericRange = NumericRange {
    min: 20.0,
    max: 60.0,
    fallback: 40.0,
};

/// Label fields as they arrive from a form or a stored label collection.
///
/// Every field is optional and numbers may be non-finite; [`sanitize`] is
/// the single place where ranges and defaults are applied.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawLabel {
    pub product_name: Option<String>,
    pub sub_product_name: Option<String>,
    pub barcode_value: Option<String>,
    pub barcode_type: Option<String>,
    pub product_font_size: Option<f64>,
    pub sub_product_font_size: Option<f64>,
    pub barcode_font_size: Option<f64>,
    pub label_width: Option<f64>,
    pub label_height: Option<f64>,
    pub show_text: Option<bool>,
    pub include_name: Option<bool>,
}

/// One label, validated and clamped. Font sizes are CSS pixels, dimensions
/// are millimeters.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSpec {
    pub width_mm: f64,
    pub height_mm: f64,
    pub product_name: String,
    pub sub_product_name: String,
    pub barcode_value: String,
    pub barcode_type: BarcodeType,
    pub product_font_size: f64,
    pub sub_product_font_size: f64,
    pub barcode_font_size: f64,
    pub include_name: bool,
    pub show_text: bool,
}

impl Default for LabelSpec {
    fn default() -> Self {
        sanitize(RawLabel::default())
    }
}

impl LabelSpec {
    pub fn has_content(&self) -> bool {
        !self.product_name.is_empty()
            || !self.sub_product_name.is_empty()
            || !self.barcode_value.is_empty()
    }

    pub fn has_sub_name(&self) -> bool {
        !self.sub_product_name.is_empty()
    }

    pub fn has_barcode_value(&self) -> bool {
        !self.barcode_value.is_empty()
    }

    pub fn page_size(&self) -> Size {
        Size::from_mm(self.width_mm, self.height_mm)
    }

    pub fn same_size_as(&self, other: &LabelSpec) -> bool {
        self.width_mm == other.width_mm && self.height_mm == other.height_mm
    }
}

pub fn sanitize(raw: RawLabel) -> LabelSpec {
    LabelSpec {
        width_mm: normalize_number(raw.label_width, LABEL_WIDTH_RANGE),
        height_mm: normalize_number(raw.label_height, LABEL_HEIGHT_RANGE),
        product_name: trimmed(raw.product_name),
        sub_product_name: trimmed(raw.sub_product_name),
        barcode_value: trimmed(raw.barcode_value),
        barcode_type: raw
            .barcode_type
            .as_deref()
            .map(BarcodeType::parse)
            .unwrap_or_default(),
        product_font_size: normalize_number(raw.product_font_size, PRODUCT_FONT_RANGE),
        sub_product_font_size: normalize_number(raw.sub_product_font_size, SUB_PRODUCT_FONT_RANGE),
        barcode_font_size: normalize_number(raw.barcode_font_size, BARCODE_FONT_RANGE),
        // Stored labels predating the flags show both blocks.
        include_name: raw.include_name.unwrap_or(true),
        show_text: raw.show_text.unwrap_or(true),
    }
}

fn trimmed(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

// All fallbacks are whole numbers, so accepted values are rounded as well.
fn normalize_number(value: Option<f64>, range: NumericRange) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(range.min, range.max).round(),
        _ => range.fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let spec = sanitize(RawLabel::default());
        assert_eq!(spec.width_mm, 60.0);
        assert_eq!(spec.height_mm, 40.0);
        assert_eq!(spec.product_font_size, 16.0);
        assert_eq!(spec.sub_product_font_size, 14.0);
        assert_eq!(spec.barcode_font_size, 12.0);
        assert_eq!(spec.barcode_type, BarcodeType::Code128);
        assert!(spec.include_name && spec.show_text);
        assert!(!spec.has_content());
    }

    #[test]
    fn out_of_range_values_are_clamped_and_rounded() {
        let spec = sanitize(RawLabel {
            label_width: Some(250.0),
            label_height: Some(10.0),
            product_font_size: Some(40.0),
            sub_product_font_size: Some(12.6),
            barcode_font_size: Some(f64::NAN),
            ..RawLabel::default()
        });
        assert_eq!(spec.width_mm, 100.0);
        assert_eq!(spec.height_mm, 20.0);
        assert_eq!(spec.product_font_size, 36.0);
        assert_eq!(spec.sub_product_font_size, 13.0);
        assert_eq!(spec.barcode_font_size, 12.0);
    }

    #[test]
    fn strings_are_trimmed_and_type_parsed() {
        let spec = sanitize(RawLabel {
            product_name: Some("  Green Tea  ".to_string()),
            sub_product_name: Some("   ".to_string()),
            barcode_value: Some(" 8801234567893\n".to_string()),
            barcode_type: Some("EAN13".to_string()),
            ..RawLabel::default()
        });
        assert_eq!(spec.product_name, "Green Tea");
        assert!(!spec.has_sub_name());
        assert_eq!(spec.barcode_value, "8801234567893");
        assert_eq!(spec.barcode_type, BarcodeType::Ean13);
        assert_eq!(spec.barcode_type.symbology(), "EAN13");
        assert!(spec.has_content());
    }

    #[test]
    fn unknown_barcode_type_falls_back_to_code128() {
        assert_eq!(BarcodeType::parse("qr"), BarcodeType::Code128);
        assert_eq!(BarcodeType::parse("itf14").symbology(), "ITF14");
    }

    #[test]
    fn stored_label_json_is_accepted() {
        let raw: RawLabel = serde_json::from_str(
            r#"{
                "productName": "Oolong",
                "barcodeValue": "ABC-123",
                "barcodeType": "code39",
                "productFontSize": 18,
                "labelWidth": 50,
                "labelHeight": 30,
                "includeName": true,
                "showText": true
            }"#,
        )
        .expect("stored label should parse");
        let spec = sanitize(raw);
        assert_eq!(spec.product_name, "Oolong");
        assert_eq!(spec.barcode_type, BarcodeType::Code39);
        assert_eq!(spec.product_font_size, 18.0);
        assert_eq!(spec.width_mm, 50.0);
        assert!(spec.include_name && spec.show_text);
    }

    #[test]
    fn stored_label_without_flags_shows_every_block() {
        let raw: RawLabel =
            serde_json::from_str(r#"{"productName":"Oolong","barcodeValue":"123"}"#)
                .expect("stored label should parse");
        let spec = sanitize(raw);
        assert!(spec.include_name);
        assert!(spec.show_text);

        let raw: RawLabel = serde_json::from_str(r#"{"includeName":false,"showText":false}"#)
            .expect("stored label should parse");
        let spec = sanitize(raw);
        assert!(!spec.include_name);
        assert!(!spec.show_text);
    }
}
