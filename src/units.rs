//! Physical unit conversions shared by the screen and print backends.
//!
//! Screen pixels are CSS pixels at the 96 dpi reference density; document
//! points are PDF points at 72 dpi. Every conversion is a plain linear scale,
//! so NaN and infinities propagate unchanged.

pub const MM_PER_INCH: f64 = 25.4;
pub const PX_PER_INCH: f64 = 96.0;
pub const PT_PER_INCH: f64 = 72.0;

pub const MM_TO_PX: f64 = PX_PER_INCH / MM_PER_INCH;
pub const MM_TO_PT: f64 = PT_PER_INCH / MM_PER_INCH;
pub const PX_TO_PT: f64 = PT_PER_INCH / PX_PER_INCH;

pub fn mm_to_px(mm: f64) -> f64 {
    mm * MM_TO_PX
}

pub fn mm_to_pt(mm: f64) -> f64 {
    mm * MM_TO_PT
}

pub fn px_to_pt(px: f64) -> f64 {
    px * PX_TO_PT
}

pub fn pt_to_px(pt: f64) -> f64 {
    pt / PX_TO_PT
}

pub fn px_to_mm(px: f64) -> f64 {
    px / MM_TO_PX
}
