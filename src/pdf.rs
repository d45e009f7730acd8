use crate::canvas::{Command, Document, ImageResource, Page};
use crate::error::Result;
use crate::font::{DEFAULT_FONT, FontProgramKind, FontRegistry, RegisteredFont, ShapedGlyph};
use crate::types::{Color, Pt, Size};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

const PDF_CATALOG_ID: usize = 1;
const PDF_PAGES_ID: usize = 2;
const PDF_RESOURCES_ID: usize = 3;
const PDF_INFO_ID: usize = 4;

/// Serializes a finished canvas. Fonts that resolve in `registry` are
/// embedded whole as Identity-H composite fonts; every other name is written
/// as a base-14 Type1 reference.
pub fn document_to_pdf(document: &Document, registry: Option<&FontRegistry>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_document(&mut out, document, registry)?;
    Ok(out)
}

/// Streams the PDF into `writer`; returns the number of bytes written.
pub fn write_document<W: Write>(
    writer: &mut W,
    document: &Document,
    registry: Option<&FontRegistry>,
) -> Result<usize> {
    let mut pdf = PdfWriter::new(writer)?;

    // Page content first: embedded fonts list only the glyphs it draws.
    let mut fonts = plan_fonts(document, registry);
    let contents: Vec<String> = document
        .pages
        .iter()
        .map(|page| render_page(page, &mut fonts))
        .collect();

    let mut font_resources = Vec::new();
    for font in fonts.values() {
        let font_id = match &font.program {
            FontProgram::Base14(base) => {
                let id = pdf.alloc_ids(1);
                pdf.write_object(id, &font_object(base))?;
                id
            }
            FontProgram::Embedded { font, glyphs } => pdf.write_composite_font(font, glyphs)?,
        };
        font_resources.push((font.resource.clone(), font_id));
    }

    let mut image_resources = Vec::new();
    for (resource_id, image) in &document.images {
        let smask_id = match &image.alpha {
            Some(alpha) => {
                let id = pdf.alloc_ids(1);
                pdf.write_object(id, &image_smask_object(image, alpha))?;
                Some(id)
            }
            None => None,
        };
        let id = pdf.alloc_ids(1);
        pdf.write_object(id, &image_object(image, smask_id))?;
        image_resources.push((resource_id.clone(), id));
    }

    pdf.write_object(
        PDF_RESOURCES_ID,
        &format!(
            "<< /Font {} /XObject {} >>",
            resource_dict(&font_resources),
            resource_dict(&image_resources)
        ),
    )?;

    let mut page_ids = Vec::with_capacity(document.pages.len());
    for (page, content) in document.pages.iter().zip(&contents) {
        let content_id = pdf.alloc_ids(2);
        let page_id = content_id + 1;
        pdf.write_object(content_id, &stream_object(content))?;
        pdf.write_object(page_id, &page_object(page.size, content_id))?;
        page_ids.push(page_id);
    }

    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");
    pdf.write_object(
        PDF_PAGES_ID,
        &format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids,
            page_ids.len()
        ),
    )?;
    pdf.write_object(PDF_INFO_ID, "<< /Producer (labelfit) >>")?;
    pdf.write_object(
        PDF_CATALOG_ID,
        &format!("<< /Type /Catalog /Pages {PDF_PAGES_ID} 0 R >>"),
    )?;
    let written = pdf.finish()?;
    debug!(
        "pdf written pages={} fonts={} images={} bytes={written}",
        page_ids.len(),
        font_resources.len(),
        image_resources.len()
    );
    Ok(written)
}

struct PageFont<'a> {
    resource: String,
    program: FontProgram<'a>,
}

enum FontProgram<'a> {
    Base14(String),
    Embedded {
        font: &'a RegisteredFont,
        glyphs: BTreeMap<u16, GlyphUse>,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct GlyphUse {
    text: String,
    width: u16,
}

struct PdfWriter<'a, W: Write> {
    writer: &'a mut W,
    offset: usize,
    offsets: Vec<usize>, // index by object id; 0 is the free object.
    next_id: usize,
}

impl<'a, W: Write> PdfWriter<'a, W> {
    fn new(writer: &'a mut W) -> Result<Self> {
        let mut pdf = Self {
            writer,
            offset: 0,
            offsets: vec![0; PDF_INFO_ID + 1],
            next_id: PDF_INFO_ID + 1,
        };
        pdf.write_bytes(b"%PDF-1.7\n")?;
        pdf.write_bytes(b"%\xE2\xE3\xCF\xD3\n")?;
        Ok(pdf)
    }

    fn alloc_ids(&mut self, count: usize) -> usize {
        let start = self.next_id;
        self.next_id += count;
        self.offsets.resize(self.next_id, 0);
        start
    }

    fn write_object(&mut self, obj_id: usize, body: &str) -> Result<()> {
        if let Some(slot) = self.offsets.get_mut(obj_id) {
            *slot = self.offset;
        }
        self.write_bytes(format!("{obj_id} 0 obj\n").as_bytes())?;
        self.write_bytes(body.as_bytes())?;
        self.write_bytes(b"\nendobj\n")
    }

    fn write_composite_font(
        &mut self,
        font: &RegisteredFont,
        glyphs: &BTreeMap<u16, GlyphUse>,
    ) -> Result<usize> {
        let start = self.alloc_ids(5);
        let (file_id, descriptor_id, cid_font_id) = (start, start + 1, start + 2);
        let (to_unicode_id, font_id) = (start + 3, start + 4);
        self.write_object(file_id, &font_file_object(&font.data, font.program_kind))?;
        self.write_object(descriptor_id, &font_descriptor_object(font, file_id))?;
        self.write_object(cid_font_id, &cid_font_object(font, glyphs, descriptor_id))?;
        self.write_object(to_unicode_id, &stream_object(&to_unicode_cmap(glyphs)))?;
        self.write_object(font_id, &type0_font_object(font, cid_font_id, to_unicode_id))?;
        Ok(font_id)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.offset += data.len();
        Ok(())
    }

    fn finish(mut self) -> Result<usize> {
        let total_objects = self.next_id - 1;
        let xref_start = self.offset;
        self.write_bytes(format!("xref\n0 {}\n", total_objects + 1).as_bytes())?;
        self.write_bytes(b"0000000000 65535 f \n")?;
        for id in 1..=total_objects {
            let obj_offset = self.offsets.get(id).copied().unwrap_or(0);
            self.write_bytes(format!("{obj_offset:010} 00000 n \n").as_bytes())?;
        }
        let trailer = format!(
            "trailer\n<< /Size {} /Root {PDF_CATALOG_ID} 0 R /Info {PDF_INFO_ID} 0 R >>\nstartxref\n{xref_start}\n%%EOF",
            total_objects + 1
        );
        self.write_bytes(trailer.as_bytes())?;
        self.writer.flush()?;
        Ok(self.offset)
    }
}

fn plan_fonts<'a>(
    document: &Document,
    registry: Option<&'a FontRegistry>,
) -> BTreeMap<String, PageFont<'a>> {
    collect_used_font_names(document)
        .into_iter()
        .enumerate()
        .map(|(index, name)| {
            let program = match registry.and_then(|registry| registry.resolve(&name)) {
                Some(font) => FontProgram::Embedded {
                    font,
                    glyphs: BTreeMap::new(),
                },
                None if is_base14_font(&name) => FontProgram::Base14(name.clone()),
                None => {
                    warn!("font {name:?} is not registered; substituting {DEFAULT_FONT}");
                    FontProgram::Base14(DEFAULT_FONT.to_string())
                }
            };
            let font = PageFont {
                resource: format!("F{}", index + 1),
                program,
            };
            (name, font)
        })
        .collect()
}

// Canvas elides the initial font switch, so a page starts in Helvetica.
fn collect_used_font_names(document: &Document) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for page in &document.pages {
        let mut current: &str = DEFAULT_FONT;
        for command in &page.commands {
            match command {
                Command::SetFontName(name) => current = name.as_str(),
                Command::DrawString { .. } => {
                    names.insert(current.to_string());
                }
                _ => {}
            }
        }
    }
    names
}

fn render_page(page: &Page, fonts: &mut BTreeMap<String, PageFont<'_>>) -> String {
    let mut out = String::new();
    let mut current: &str = DEFAULT_FONT;
    let mut size = Pt::from_i32(12);
    let mut fill = Color::BLACK;
    out.push_str(&format!("{} rg\n", fmt_color(fill)));
    for command in &page.commands {
        match command {
            Command::SetFillColor(color) => {
                if *color != fill {
                    fill = *color;
                    out.push_str(&format!("{} rg\n", fmt_color(fill)));
                }
            }
            Command::SetFontName(name) => current = name.as_str(),
            Command::SetFontSize(value) => size = *value,
            Command::DrawString {
                x,
                y,
                text,
                word_spacing,
            } => {
                let Some(font) = fonts.get_mut(current) else {
                    continue;
                };
                let shown = match &mut font.program {
                    // Tw only reaches single-byte code 32.
                    FontProgram::Base14(_) => format!(
                        "{} Tw {} {} Td ({}) Tj",
                        fmt_pt(*word_spacing),
                        fmt_pt(*x),
                        fmt_pt(*y),
                        encode_winansi(text)
                    ),
                    FontProgram::Embedded { font: registered, glyphs } => {
                        let run = registered.shape(text).unwrap_or_default();
                        format!(
                            "{} {} Td {} TJ",
                            fmt_pt(*x),
                            fmt_pt(*y),
                            encode_glyph_run(&run, size, *word_spacing, glyphs)
                        )
                    }
                };
                out.push_str(&format!(
                    "BT /{} {} Tf {} ET\n",
                    font.resource,
                    fmt_pt(size),
                    shown
                ));
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                out.push_str(&format!(
                    "q {} 0 0 {} {} {} cm /{} Do Q\n",
                    fmt_pt(*width),
                    fmt_pt(*height),
                    fmt_pt(*x),
                    fmt_pt(*y),
                    resource_id
                ));
            }
        }
    }
    out
}

/// `TJ` array of two-byte glyph ids. Each offset moves the pen from the
/// nominal width to the shaped advance, plus `word_spacing` after spaces.
/// Drawn glyphs are recorded in `used` for the font's widths and
/// ToUnicode map.
fn encode_glyph_run(
    run: &[ShapedGlyph],
    size: Pt,
    word_spacing: Pt,
    used: &mut BTreeMap<u16, GlyphUse>,
) -> String {
    let size = size.to_f64();
    let space_offset = if size > 0.0 {
        -word_spacing.to_f64() * 1000.0 / size
    } else {
        0.0
    };
    let mut out = String::from("[");
    let mut pending = String::new();
    for glyph in run {
        let entry = used.entry(glyph.glyph_id).or_insert_with(|| GlyphUse {
            text: String::new(),
            width: glyph.width,
        });
        if entry.text.is_empty() {
            entry.text.clone_from(&glyph.text);
        }
        pending.push_str(&format!("{:04X}", glyph.glyph_id));

        let mut offset = glyph.width as f64 - glyph.advance as f64;
        if glyph.text == " " {
            offset += space_offset;
        }
        let milli = (offset * 1000.0).round() as i64;
        if milli != 0 {
            out.push_str(&format!("<{pending}>{}", format_milli(milli)));
            pending.clear();
        }
    }
    if !pending.is_empty() {
        out.push_str(&format!("<{pending}>"));
    }
    out.push(']');
    out
}

fn page_object(size: Size, content_id: usize) -> String {
    format!(
        "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources {} 0 R /Contents {} 0 R >>",
        PDF_PAGES_ID,
        fmt_pt(size.width),
        fmt_pt(size.height),
        PDF_RESOURCES_ID,
        content_id
    )
}

fn stream_object(content: &str) -> String {
    format!(
        "<< /Length {} >>\nstream\n{}\nendstream",
        content.len(),
        content
    )
}

fn image_object(image: &ImageResource, smask_id: Option<usize>) -> String {
    let stream_data = encode_stream_data(&image.rgb);
    let smask = smask_id
        .map(|id| format!(" /SMask {id} 0 R"))
        .unwrap_or_default();
    format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceRGB /BitsPerComponent 8 /Length {} /Filter /ASCIIHexDecode{} >>\nstream\n{}\nendstream",
        image.width,
        image.height,
        stream_data.len(),
        smask,
        stream_data
    )
}

fn image_smask_object(image: &ImageResource, alpha: &[u8]) -> String {
    let stream_data = encode_stream_data(alpha);
    format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8 /Length {} /Filter /ASCIIHexDecode >>\nstream\n{}\nendstream",
        image.width,
        image.height,
        stream_data.len(),
        stream_data
    )
}

fn font_object(name: &str) -> String {
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
        sanitize_font_name(name)
    )
}

fn type0_font_object(
    font: &RegisteredFont,
    cid_font_id: usize,
    to_unicode_id: usize,
) -> String {
    format!(
        "<< /Type /Font /Subtype /Type0 /BaseFont /{} /Encoding /Identity-H /DescendantFonts [{} 0 R] /ToUnicode {} 0 R >>",
        sanitize_font_name(&font.name),
        cid_font_id,
        to_unicode_id
    )
}

// Glyph ids double as CIDs; CFF programs carry no CIDToGIDMap.
fn cid_font_object(
    font: &RegisteredFont,
    glyphs: &BTreeMap<u16, GlyphUse>,
    descriptor_id: usize,
) -> String {
    let (subtype, gid_map) = match font.program_kind {
        FontProgramKind::TrueType => ("CIDFontType2", " /CIDToGIDMap /Identity"),
        FontProgramKind::OpenTypeCff => ("CIDFontType0", ""),
    };
    let widths = glyphs
        .iter()
        .map(|(gid, glyph)| format!("{gid} [{}]", glyph.width))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "<< /Type /Font /Subtype /{} /BaseFont /{} /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> /FontDescriptor {} 0 R /DW {} /W [{}]{} >>",
        subtype,
        sanitize_font_name(&font.name),
        descriptor_id,
        font.metrics.missing_width,
        widths,
        gid_map
    )
}

fn font_descriptor_object(font: &RegisteredFont, font_file_id: usize) -> String {
    let metrics = &font.metrics;
    let flags = if metrics.is_fixed_pitch { 5 } else { 4 };
    let font_file_entry = match font.program_kind {
        FontProgramKind::TrueType => "FontFile2",
        FontProgramKind::OpenTypeCff => "FontFile3",
    };
    let (x_min, y_min, x_max, y_max) = metrics.bbox;
    format!(
        "<< /Type /FontDescriptor /FontName /{} /Flags {} /FontBBox [{} {} {} {}] /ItalicAngle {} /Ascent {} /Descent {} /CapHeight {} /StemV 80 /MissingWidth {} /{} {} 0 R >>",
        sanitize_font_name(&font.name),
        flags,
        x_min,
        y_min,
        x_max,
        y_max,
        metrics.italic_angle,
        metrics.ascent,
        metrics.descent,
        metrics.cap_height,
        metrics.missing_width,
        font_file_entry,
        font_file_id
    )
}

fn font_file_object(data: &[u8], kind: FontProgramKind) -> String {
    let stream_data = encode_stream_data(data);
    let subtype = match kind {
        FontProgramKind::TrueType => "",
        FontProgramKind::OpenTypeCff => " /Subtype /OpenType",
    };
    format!(
        "<< /Length {} /Length1 {} /Filter /ASCIIHexDecode{} >>\nstream\n{}\nendstream",
        stream_data.len(),
        data.len(),
        subtype,
        stream_data
    )
}

fn to_unicode_cmap(glyphs: &BTreeMap<u16, GlyphUse>) -> String {
    let entries: Vec<(u16, &str)> = glyphs
        .iter()
        .filter(|(_, glyph)| !glyph.text.is_empty())
        .map(|(gid, glyph)| (*gid, glyph.text.as_str()))
        .collect();

    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n");
    out.push_str("12 dict begin\n");
    out.push_str("begincmap\n");
    out.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n");
    out.push_str("/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");
    for chunk in entries.chunks(100) {
        out.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, text) in chunk {
            let unicode: String = text
                .encode_utf16()
                .map(|unit| format!("{unit:04X}"))
                .collect();
            out.push_str(&format!("<{gid:04X}> <{unicode}>\n"));
        }
        out.push_str("endbfchar\n");
    }
    out.push_str("endcmap\n");
    out.push_str("CMapName currentdict /CMap defineresource pop\n");
    out.push_str("end\nend\n");
    out
}

fn resource_dict(entries: &[(String, usize)]) -> String {
    let entries = entries
        .iter()
        .map(|(resource, id)| format!("/{resource} {id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("<< {entries} >>")
}

fn encode_stream_data(data: &[u8]) -> String {
    let mut hex = ascii_hex_encode(data);
    hex.push('>');
    hex
}

fn ascii_hex_encode(data: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(data.len() * 2 + data.len() / 32);
    for (index, byte) in data.iter().enumerate() {
        let _ = write!(&mut out, "{byte:02X}");
        if index % 32 == 31 {
            out.push('\n');
        }
    }
    out
}

/// Literal string body for a base-14 WinAnsi font. Bytes above ASCII are
/// written as octal escapes; code points outside Latin-1 become `?`.
fn encode_winansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            ' '..='~' => out.push(ch),
            '\u{a0}'..='\u{ff}' => out.push_str(&format!("\\{:03o}", ch as u32)),
            _ => out.push('?'),
        }
    }
    out
}

fn is_base14_font(name: &str) -> bool {
    matches!(
        name.trim().to_ascii_lowercase().as_str(),
        "courier"
            | "courier-bold"
            | "courier-oblique"
            | "courier-boldoblique"
            | "helvetica"
            | "helvetica-bold"
            | "helvetica-oblique"
            | "helvetica-boldoblique"
            | "times-roman"
            | "times-bold"
            | "times-italic"
            | "times-bolditalic"
            | "symbol"
            | "zapfdingbats"
    )
}

fn sanitize_font_name(name: &str) -> String {
    let out: String = name
        .chars()
        .filter_map(|ch| match ch {
            ch if ch.is_ascii_alphanumeric() || ch == '-' => Some(ch),
            ' ' => Some('-'),
            _ => None,
        })
        .collect();
    if out.is_empty() {
        DEFAULT_FONT.to_string()
    } else {
        out
    }
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        return format!("{sign}{int_part}");
    }
    let frac = format!("{frac_part:03}");
    format!("{sign}{int_part}.{}", frac.trim_end_matches('0'))
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn fmt_color(color: Color) -> String {
    let unit = |value: f32| {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        format_milli((value as f64 * 1000.0).round() as i64)
    };
    format!("{} {} {}", unit(color.r), unit(color.g), unit(color.b))
}
