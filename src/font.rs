use crate::error::{LabelError, Result};
use crate::text_flow::TextMeasurer;
use crate::types::Pt;
use rustybuzz::ttf_parser::GlyphId;
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Name of the base-14 font used when no font bytes were supplied.
pub const DEFAULT_FONT: &str = "Helvetica";

// Helvetica advances in 1/1000 em, used for unregistered names.
const FALLBACK_SPACE_WIDTH: i32 = 278;
const FALLBACK_CHAR_WIDTH: i32 = 556;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TextWidthKey {
    font_index: usize,
    size_milli: i64,
    text: String,
}

#[derive(Debug)]
struct TextWidthCache {
    map: HashMap<TextWidthKey, Pt>,
    order: VecDeque<TextWidthKey>,
    max_entries: usize,
}

impl TextWidthCache {
    fn new(max_entries: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn get(&self, key: &TextWidthKey) -> Option<Pt> {
        self.map.get(key).copied()
    }

    fn insert(&mut self, key: TextWidthKey, value: Pt) {
        if self.map.contains_key(&key) {
            return;
        }
        self.map.insert(key.clone(), value);
        self.order.push_back(key);
        while self.map.len() > self.max_entries {
            match self.order.pop_front() {
                Some(old) => {
                    self.map.remove(&old);
                }
                None => break,
            }
        }
    }
}

/// Fonts registered from raw bytes, addressed by their primary name.
#[derive(Debug)]
pub struct FontRegistry {
    fonts: Vec<RegisteredFont>,
    lookup: HashMap<String, usize>,
    text_width_cache: Mutex<TextWidthCache>,
}

#[derive(Debug)]
pub struct RegisteredFont {
    pub name: String,
    pub data: Vec<u8>,
    pub metrics: FontMetrics,
    pub program_kind: FontProgramKind,
}

/// Outline format of an embedded program; selects `FontFile2` or `FontFile3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontProgramKind {
    TrueType,
    OpenTypeCff,
}

/// One shaped glyph. Advances are in 1/1000 em.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapedGlyph {
    pub glyph_id: u16,
    /// Source text of the cluster, carried by its first glyph only.
    pub text: String,
    /// Advance after shaping (kerning and positioning applied).
    pub advance: i32,
    /// Nominal `hmtx` advance, the width a PDF viewer uses.
    pub width: u16,
}

/// Descriptor metrics in 1/1000 em, plus WinAnsi-range widths used when a
/// face cannot be shaped.
#[derive(Debug)]
pub struct FontMetrics {
    pub first_char: u8,
    pub last_char: u8,
    pub widths: Vec<u16>,
    pub ascent: i16,
    pub descent: i16,
    pub cap_height: i16,
    pub italic_angle: i16,
    pub bbox: (i16, i16, i16, i16),
    pub missing_width: u16,
    pub is_fixed_pitch: bool,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self {
            fonts: Vec::new(),
            lookup: HashMap::new(),
            text_width_cache: Mutex::new(TextWidthCache::new(4_096)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn fonts(&self) -> impl Iterator<Item = &RegisteredFont> {
        self.fonts.iter()
    }

    /// Parses and registers `data`; returns the name to draw with. Bytes
    /// already registered under the same name are not stored twice.
    pub fn register_bytes(&mut self, data: Vec<u8>, source_name: &str) -> Result<String> {
        let face = ttf_parser::Face::parse(&data, 0)
            .map_err(|err| LabelError::InvalidFont(format!("{source_name}: {err}")))?;
        let name = primary_name(&face).unwrap_or_else(|| source_name.to_string());
        let key = normalize_name(&name);
        if self.lookup.contains_key(&key) {
            return Ok(name);
        }
        let metrics = FontMetrics::from_face(&face);
        let program_kind = if face.tables().cff.is_some() {
            FontProgramKind::OpenTypeCff
        } else {
            FontProgramKind::TrueType
        };
        let index = self.fonts.len();
        self.fonts.push(RegisteredFont {
            name: name.clone(),
            data,
            metrics,
            program_kind,
        });
        self.lookup.insert(key, index);
        Ok(name)
    }

    pub fn resolve(&self, name: &str) -> Option<&RegisteredFont> {
        self.lookup
            .get(&normalize_name(name))
            .and_then(|index| self.fonts.get(*index))
    }

    pub fn measure_text_width(&self, name: &str, font_size: Pt, text: &str) -> Pt {
        let Some(index) = self.lookup.get(&normalize_name(name)).copied() else {
            return fallback_width(font_size, text);
        };
        let Some(font) = self.fonts.get(index) else {
            return fallback_width(font_size, text);
        };
        let cache_key = TextWidthKey {
            font_index: index,
            size_milli: font_size.to_milli_i64(),
            text: text.to_string(),
        };
        if let Ok(cache) = self.text_width_cache.lock() {
            if let Some(value) = cache.get(&cache_key) {
                return value;
            }
        }
        // Same glyph run the PDF writer draws, so centering matches output.
        let value = match font.shape(text) {
            Some(glyphs) => {
                let units = glyphs
                    .iter()
                    .fold(0i32, |acc, glyph| acc.saturating_add(glyph.advance));
                if units <= 0 {
                    Pt::ZERO
                } else {
                    font_size.mul_ratio(units, 1000)
                }
            }
            None => font.metrics.measure_text_width(font_size, text),
        };
        if let Ok(mut cache) = self.text_width_cache.lock() {
            cache.insert(cache_key, value);
        }
        value
    }
}

impl RegisteredFont {
    /// Shapes `text` in visual order. `None` for empty text or an unusable
    /// face.
    pub fn shape(&self, text: &str) -> Option<Vec<ShapedGlyph>> {
        let face = HbFace::from_slice(&self.data, 0)?;
        let units_per_em = face.units_per_em().max(1) as f64;
        let to_milli = |value: f64| (value * 1000.0 / units_per_em).round() as i32;

        let mut buffer = UnicodeBuffer::new();
        buffer.set_direction(detect_direction(text));
        buffer.push_str(text);
        let output = rustybuzz::shape(&face, &[], buffer);
        let infos = output.glyph_infos();
        if infos.is_empty() {
            return None;
        }
        let mut starts: Vec<usize> = infos.iter().map(|info| info.cluster as usize).collect();
        starts.sort_unstable();
        starts.dedup();

        let mut previous_cluster = None;
        let glyphs = infos
            .iter()
            .zip(output.glyph_positions())
            .map(|(info, position)| {
                let glyph_id = u16::try_from(info.glyph_id).unwrap_or(0);
                let start = (info.cluster as usize).min(text.len());
                let text = if previous_cluster == Some(info.cluster) {
                    String::new()
                } else {
                    let end = starts
                        .iter()
                        .copied()
                        .find(|next| *next > start)
                        .unwrap_or(text.len())
                        .min(text.len());
                    text.get(start..end).unwrap_or_default().to_string()
                };
                previous_cluster = Some(info.cluster);
                let width = face
                    .glyph_hor_advance(GlyphId(glyph_id))
                    .map(|advance| to_milli(advance as f64))
                    .unwrap_or(self.metrics.missing_width as i32);
                ShapedGlyph {
                    glyph_id,
                    text,
                    advance: to_milli(position.x_advance as f64),
                    width: width.clamp(0, u16::MAX as i32) as u16,
                }
            })
            .collect();
        Some(glyphs)
    }
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TextMeasurer for FontRegistry {
    fn measure(&self, font: &str, text: &str, size: Pt) -> Pt {
        self.measure_text_width(font, size, text)
    }
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> Self {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let first_char = 32u8;
        let last_char = 255u8;
        let widths: Vec<u16> = (first_char..=last_char)
            .map(|code| {
                let advance = char::from_u32(code as u32)
                    .and_then(|ch| face.glyph_index(ch))
                    .and_then(|id| face.glyph_hor_advance(id))
                    .unwrap_or(0);
                let scaled = (advance as f32 * scale).round() as i32;
                scaled.clamp(0, u16::MAX as i32) as u16
            })
            .collect();
        let missing_width = widths.first().copied().unwrap_or(0);
        let ascent = scale_i16(face.ascender(), scale);
        let bbox = face.global_bounding_box();
        Self {
            first_char,
            last_char,
            widths,
            ascent,
            descent: scale_i16(face.descender(), scale),
            cap_height: face
                .capital_height()
                .map(|value| scale_i16(value, scale))
                .unwrap_or(ascent),
            italic_angle: face
                .italic_angle()
                .map(|value| value.round() as i16)
                .unwrap_or(0),
            bbox: (
                scale_i16(bbox.x_min, scale),
                scale_i16(bbox.y_min, scale),
                scale_i16(bbox.x_max, scale),
                scale_i16(bbox.y_max, scale),
            ),
            missing_width,
            is_fixed_pitch: face.is_monospaced(),
        }
    }

    fn advance_for_char(&self, ch: char) -> u16 {
        let code = ch as u32;
        if code < self.first_char as u32 || code > self.last_char as u32 {
            return self.missing_width;
        }
        let idx = (code - self.first_char as u32) as usize;
        self.widths.get(idx).copied().unwrap_or(self.missing_width)
    }

    fn measure_text_width(&self, font_size: Pt, text: &str) -> Pt {
        let total_units = text
            .chars()
            .fold(0i32, |acc, ch| acc.saturating_add(self.advance_for_char(ch) as i32));
        if total_units <= 0 {
            return Pt::ZERO;
        }
        font_size.mul_ratio(total_units, 1000)
    }
}

fn fallback_width(font_size: Pt, text: &str) -> Pt {
    let units = text.chars().fold(0i32, |acc, ch| {
        let advance = if ch == ' ' {
            FALLBACK_SPACE_WIDTH
        } else {
            FALLBACK_CHAR_WIDTH
        };
        acc.saturating_add(advance)
    });
    font_size.mul_ratio(units, 1000)
}

fn detect_direction(text: &str) -> HbDirection {
    let rtl = text.chars().any(|ch| {
        matches!(
            ch as u32,
            0x0590..=0x08FF | 0xFB1D..=0xFDFF | 0xFE70..=0xFEFF | 0x1EE00..=0x1EEFF
        )
    });
    if rtl {
        HbDirection::RightToLeft
    } else {
        HbDirection::LeftToRight
    }
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn primary_name(face: &ttf_parser::Face<'_>) -> Option<String> {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut post = None;
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::POST_SCRIPT_NAME if post.is_none() => post = Some(name),
            name_id::FULL_NAME | name_id::FAMILY if family.is_none() => family = Some(name),
            _ => {}
        }
    }
    post.or(family)
        .map(|name| name.chars().filter(|ch| !ch.is_whitespace()).collect::<String>())
        .filter(|name| !name.is_empty())
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const SYSTEM_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

    /// A TrueType face with Cyrillic coverage, when the host has one.
    pub(crate) fn system_font() -> Option<Vec<u8>> {
        match std::fs::read(SYSTEM_FONT) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                eprintln!("skipping: {SYSTEM_FONT}: {err}");
                None
            }
        }
    }

    #[test]
    fn cyrillic_text_is_measured_from_its_shaped_glyphs() {
        let Some(bytes) = system_font() else {
            return;
        };
        let mut registry = FontRegistry::new();
        let name = registry.register_bytes(bytes, "label-regular").expect("font");
        let font = registry.resolve(&name).expect("registered");
        assert_eq!(font.program_kind, FontProgramKind::TrueType);

        let glyphs = font.shape("Чай чай").expect("shaped");
        assert_eq!(glyphs.len(), 7);
        assert!(glyphs.iter().all(|glyph| glyph.glyph_id != 0));
        assert_eq!(glyphs[0].text, "Ч");
        assert_eq!(glyphs[3].text, " ");

        let units: i32 = glyphs.iter().map(|glyph| glyph.advance).sum();
        let size = Pt::from_i32(12);
        assert_eq!(registry.measure(&name, "Чай чай", size), size.mul_ratio(units, 1000));
        assert!(registry.measure(&name, "Чай", size) > registry.measure(&name, "Ч", size));
    }

    #[test]
    fn unregistered_names_use_helvetica_advances() {
        let registry = FontRegistry::new();
        let size = Pt::from_i32(10);
        assert_eq!(registry.measure(DEFAULT_FONT, "a", size), Pt::from_f64(5.56));
        assert_eq!(registry.space_width(DEFAULT_FONT, size), Pt::from_f64(2.78));
        assert_eq!(registry.measure("Missing", "a b", size), Pt::from_f64(13.9));
        assert_eq!(registry.measure(DEFAULT_FONT, "", size), Pt::ZERO);
    }

    #[test]
    fn helvetica_spaces_are_not_corrected() {
        let registry = FontRegistry::new();
        let size = Pt::from_i32(12);
        let ratio = registry.space_width(DEFAULT_FONT, size).to_f64() / 12.0;
        assert!(ratio < 0.5);
    }

    #[test]
    fn invalid_bytes_are_rejected() {
        let mut registry = FontRegistry::new();
        let err = registry
            .register_bytes(vec![0, 1, 2, 3], "broken.ttf")
            .unwrap_err();
        assert!(matches!(err, LabelError::InvalidFont(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn width_cache_evicts_oldest_entry() {
        let mut cache = TextWidthCache::new(2);
        let key = |text: &str| TextWidthKey {
            font_index: 0,
            size_milli: 12_000,
            text: text.to_string(),
        };
        cache.insert(key("a"), Pt::from_i32(1));
        cache.insert(key("b"), Pt::from_i32(2));
        cache.insert(key("c"), Pt::from_i32(3));
        assert_eq!(cache.get(&key("a")), None);
        assert_eq!(cache.get(&key("c")), Some(Pt::from_i32(3)));
    }

    #[test]
    fn right_to_left_scripts_are_detected() {
        assert_eq!(detect_direction("שלום"), HbDirection::RightToLeft);
        assert_eq!(detect_direction("hello"), HbDirection::LeftToRight);
    }
}
