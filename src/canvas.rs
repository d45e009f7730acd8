use crate::error::{LabelError, Result};
use crate::font::DEFAULT_FONT;
use crate::text_flow::{EmbeddedImage, ImageEmbedder, PageSink};
use crate::types::{Color, Pt, Size};
use image::GenericImageView;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// Recorded drawing operation. Coordinates are PDF user space: origin at the
/// bottom-left corner of the page, y growing upward.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetFillColor(Color),
    SetFontName(String),
    SetFontSize(Pt),
    DrawString {
        x: Pt,
        y: Pt,
        text: String,
        // Extra advance added to every U+0020 (PDF `Tw`).
        word_spacing: Pt,
    },
    DrawImage {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct Page {
    pub size: Size,
    pub commands: Vec<Command>,
}

impl Page {
    fn new(size: Size) -> Self {
        Self {
            size,
            commands: Vec::new(),
        }
    }
}

/// Decoded raster ready to be written as an image XObject.
#[derive(Debug, Clone)]
pub struct ImageResource {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    pub alpha: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub pages: Vec<Page>,
    pub images: BTreeMap<String, ImageResource>,
}

#[derive(Debug, Clone)]
struct GraphicsState {
    fill_color: Color,
    font_size: Pt,
    font_name: String,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            font_size: Pt::from_i32(12),
            font_name: DEFAULT_FONT.to_string(),
        }
    }
}

/// Append-only page list; one page per label, each with its own size.
pub struct Canvas {
    pages: Vec<Page>,
    current: Option<Page>,
    current_state: GraphicsState,
    images: BTreeMap<String, ImageResource>,
    image_ids: HashMap<[u8; 32], String>,
}

impl Canvas {
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: None,
            current_state: GraphicsState::default(),
            images: BTreeMap::new(),
            image_ids: HashMap::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len() + usize::from(self.current.is_some())
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.push(Command::SetFillColor(color));
    }

    pub fn set_font_name(&mut self, name: &str) {
        if self.current_state.font_name == name {
            return;
        }
        self.current_state.font_name = name.to_string();
        self.push(Command::SetFontName(name.to_string()));
    }

    pub fn set_font_size(&mut self, size: Pt) {
        if self.current_state.font_size == size {
            return;
        }
        self.current_state.font_size = size;
        self.push(Command::SetFontSize(size));
    }

    pub fn draw_string(&mut self, x: Pt, y: Pt, text: impl Into<String>, word_spacing: Pt) {
        self.push(Command::DrawString {
            x,
            y,
            text: text.into(),
            word_spacing,
        });
    }

    pub fn draw_image(&mut self, x: Pt, y: Pt, width: Pt, height: Pt, resource_id: &str) {
        self.push(Command::DrawImage {
            x,
            y,
            width,
            height,
            resource_id: resource_id.to_string(),
        });
    }

    pub fn finish(mut self) -> Document {
        if let Some(page) = self.current.take() {
            self.pages.push(page);
        }
        Document {
            pages: self.pages,
            images: self.images,
        }
    }

    fn push(&mut self, command: Command) {
        let page = self
            .current
            .get_or_insert_with(|| Page::new(Size::from_mm(0.0, 0.0)));
        page.commands.push(command);
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSink for Canvas {
    fn begin_page(&mut self, size: Size) {
        if let Some(page) = self.current.take() {
            self.pages.push(page);
        }
        self.current = Some(Page::new(size));
        self.current_state = GraphicsState::default();
    }

    fn draw_text(
        &mut self,
        font: &str,
        size: Pt,
        color: Color,
        x: Pt,
        y: Pt,
        text: &str,
        word_spacing: Pt,
    ) {
        self.set_font_name(font);
        self.set_font_size(size);
        self.set_fill_color(color);
        self.draw_string(x, y, text, word_spacing);
    }

    fn draw_image(&mut self, image: &EmbeddedImage, x: Pt, y: Pt, width: Pt, height: Pt) {
        Canvas::draw_image(self, x, y, width, height, &image.resource_id);
    }
}

impl ImageEmbedder for Canvas {
    fn embed_png(&mut self, bytes: &[u8]) -> Result<EmbeddedImage> {
        let digest: [u8; 32] = Sha256::digest(bytes).into();
        if let Some(id) = self.image_ids.get(&digest) {
            if let Some(existing) = self.images.get(id) {
                return Ok(EmbeddedImage {
                    resource_id: id.clone(),
                    width: existing.width,
                    height: existing.height,
                });
            }
        }

        let decoded = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
            .map_err(|err| LabelError::ImageEmbed(err.to_string()))?;
        let (width, height) = decoded.dimensions();
        if width == 0 || height == 0 {
            return Err(LabelError::ImageEmbed(format!(
                "image has no area ({width}x{height})"
            )));
        }
        let rgba = decoded.to_rgba8();
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        let mut has_alpha = false;
        for pixel in rgba.pixels() {
            let [r, g, b, a] = pixel.0;
            if a != 255 {
                has_alpha = true;
            }
            rgb.extend_from_slice(&[r, g, b]);
            alpha.push(a);
        }

        let resource_id = format!("Im{}", self.images.len() + 1);
        self.images.insert(
            resource_id.clone(),
            ImageResource {
                width,
                height,
                rgb,
                alpha: has_alpha.then_some(alpha),
            },
        );
        self.image_ids.insert(digest, resource_id.clone());
        Ok(EmbeddedImage {
            resource_id,
            width,
            height,
        })
    }
}
