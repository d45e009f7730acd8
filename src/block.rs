use crate::label::{BarcodeType, LabelSpec};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Name,
    SubName,
    Barcode,
    BarcodeText,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Name {
        lines: Vec<String>,
        font_size: f64,
    },
    SubName {
        lines: Vec<String>,
        font_size: f64,
    },
    Barcode {
        value: String,
        barcode_type: BarcodeType,
    },
    BarcodeText {
        text: String,
        font_size: f64,
    },
}

impl Block {
    pub fn kind(&self) -> BlockKind {
        match self {
            Block::Name { .. } => BlockKind::Name,
            Block::SubName { .. } => BlockKind::SubName,
            Block::Barcode { .. } => BlockKind::Barcode,
            Block::BarcodeText { .. } => BlockKind::BarcodeText,
        }
    }

    /// Font size in CSS pixels, `None` for the barcode block.
    pub fn font_size(&self) -> Option<f64> {
        match self {
            Block::Name { font_size, .. }
            | Block::SubName { font_size, .. }
            | Block::BarcodeText { font_size, .. } => Some(*font_size),
            Block::Barcode { .. } => None,
        }
    }

    pub fn lines(&self) -> Vec<&str> {
        match self {
            Block::Name { lines, .. } | Block::SubName { lines, .. } => {
                lines.iter().map(String::as_str).collect()
            }
            Block::BarcodeText { text, .. } => vec![text.as_str()],
            Block::Barcode { .. } => Vec::new(),
        }
    }
}

/// Blocks in drawing order: name, sub-name, barcode, barcode text.
///
/// The barcode block is always present; an empty value is drawn as the
/// fallback text by the print backend and as an empty box on screen.
pub fn build_blocks(spec: &LabelSpec) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(4);
    if spec.include_name {
        blocks.push(Block::Name {
            lines: split_into_lines(&spec.product_name),
            font_size: spec.product_font_size,
        });
        if spec.has_sub_name() {
            blocks.push(Block::SubName {
                lines: split_into_lines(&spec.sub_product_name),
                font_size: spec.sub_product_font_size,
            });
        }
    }
    blocks.push(Block::Barcode {
        value: spec.barcode_value.clone(),
        barcode_type: spec.barcode_type,
    });
    if spec.show_text && spec.has_barcode_value() {
        blocks.push(Block::BarcodeText {
            text: spec.barcode_value.clone(),
            font_size: spec.barcode_font_size,
        });
    }
    blocks
}

/// Splits on explicit line breaks only; an empty field is one empty line.
pub fn split_into_lines(value: &str) -> Vec<String> {
    if value.is_empty() {
        return vec![String::new()];
    }
    value
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}
