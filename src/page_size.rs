use crate::label::LabelSpec;
use crate::types::Size;
use log::warn;

/// Physical print page size in millimeters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSizeMm {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl PageSizeMm {
    pub fn size(&self) -> Size {
        Size::from_mm(self.width_mm, self.height_mm)
    }

    /// Print stylesheet rule that pins the page to the label size.
    pub fn print_css(&self) -> String {
        format!(
            "@media print {{\n  @page {{\n    size: {}mm {}mm;\n    margin: 0;\n  }}\n}}",
            self.width_mm, self.height_mm
        )
    }
}

/// Print page size for one print session. A batch with mixed label sizes is
/// printed at the active label's size; the mismatch is warned about once
/// until the sizes agree again or the session is torn down.
#[derive(Debug, Default)]
pub struct PrintPageSizeManager {
    active: Option<PageSizeMm>,
    warned_mismatch: bool,
}

impl PrintPageSizeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<PageSizeMm> {
        self.active
    }

    pub fn has_warned_mismatch(&self) -> bool {
        self.warned_mismatch
    }

    /// Size of the label at `active_index` (clamped into range).
    pub fn page_size_for(
        &mut self,
        labels: &[LabelSpec],
        active_index: usize,
        warn_on_mismatch: bool,
    ) -> Option<PageSizeMm> {
        let target = labels.get(active_index.min(labels.len().checked_sub(1)?))?;
        if !(target.width_mm.is_finite() && target.height_mm.is_finite()) {
            return None;
        }
        let mixed = labels.iter().any(|label| !label.same_size_as(target));
        if !mixed {
            self.warned_mismatch = false;
        } else if warn_on_mismatch && !self.warned_mismatch {
            warn!(
                "labels differ in size; printing every page at {}x{} mm",
                target.width_mm, target.height_mm
            );
            self.warned_mismatch = true;
        }
        Some(PageSizeMm {
            width_mm: target.width_mm,
            height_mm: target.height_mm,
        })
    }

    /// Picks the page size for `labels` and returns the print rule to
    /// install, or tears down and returns `None` when there is nothing to
    /// print.
    pub fn apply(&mut self, labels: &[LabelSpec], active_index: usize) -> Option<String> {
        match self.page_size_for(labels, active_index, true) {
            Some(size) => {
                self.active = Some(size);
                Some(size.print_css())
            }
            None => {
                self.teardown();
                None
            }
        }
    }

    pub fn teardown(&mut self) {
        self.active = None;
        self.warned_mismatch = false;
    }
}
