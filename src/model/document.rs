//! Document, metadata, image and font assets.

use serde::{Deserialize, Serialize};

use super::node::Block;

/// A parsed book ready for conversion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    /// Stable document identifier; the container id is derived from it.
    pub id: String,
    pub metadata: Metadata,
    /// Sections in reading order.
    pub sections: Vec<Section>,
    pub images: Vec<ImageAsset>,
    /// Embedded fonts, one per family/style/weight variant.
    pub fonts: Vec<FontAsset>,
    /// Id of the cover image, if any.
    pub cover: Option<String>,
}

impl Document {
    /// Create an empty document with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Builder: set the metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Builder: append a section.
    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    /// Builder: append an image asset.
    pub fn with_image(mut self, image: ImageAsset) -> Self {
        self.images.push(image);
        self
    }

    /// Builder: append a font asset.
    pub fn with_font(mut self, font: FontAsset) -> Self {
        self.fonts.push(font);
        self
    }

    /// Look up an image asset by id.
    pub fn image(&self, id: &str) -> Option<&ImageAsset> {
        self.images.iter().find(|img| img.id == id)
    }

    /// Parse a document from its JSON serialization.
    pub fn from_json(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Book metadata (Dublin Core subset).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub title: String,
    pub authors: Vec<String>,
    pub language: Option<String>,
    pub publisher: Option<String>,
    pub description: Option<String>,
    /// Issue date as written in the source (ISO 8601 preferred).
    pub date: Option<String>,
    /// Publisher-assigned identifier (ISBN, UUID, ...).
    pub identifier: Option<String>,
}

impl Metadata {
    /// Create metadata with a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Builder: add an author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    /// Builder: set the language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Builder: set the publisher.
    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }
}

/// One flowable section of the book. Each becomes its own storyline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Section {
    pub id: Option<String>,
    /// Title used for the navigation entry.
    pub title: Option<String>,
    /// Style class applied to the section wrapper.
    pub class: Option<String>,
    pub blocks: Vec<Block>,
}

impl Section {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Builder: append a block.
    pub fn with_block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }
}

/// Supported raster formats for external resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
}

impl ImageFormat {
    /// Detect the format from a media type, falling back to magic bytes.
    pub fn detect(media_type: &str, data: &[u8]) -> Option<Self> {
        match media_type.to_ascii_lowercase().as_str() {
            "image/png" => return Some(ImageFormat::Png),
            "image/jpeg" | "image/jpg" => return Some(ImageFormat::Jpeg),
            "image/gif" => return Some(ImageFormat::Gif),
            _ => {}
        }
        if data.starts_with(b"\x89PNG") {
            Some(ImageFormat::Png)
        } else if data.starts_with(&[0xFF, 0xD8]) {
            Some(ImageFormat::Jpeg)
        } else if data.starts_with(b"GIF8") {
            Some(ImageFormat::Gif)
        } else {
            None
        }
    }
}

/// An embedded image. The decoder is out of scope, so dimensions come from
/// the parser that produced the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageAsset {
    pub id: String,
    pub media_type: String,
    /// Raw bytes; base64 in the JSON form.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ImageAsset {
    pub fn new(id: impl Into<String>, media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            media_type: media_type.into(),
            data,
            width: 0,
            height: 0,
        }
    }

    /// Builder: set pixel dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn format(&self) -> Option<ImageFormat> {
        ImageFormat::detect(&self.media_type, &self.data)
    }
}

/// An embedded font file for one variant of a family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontAsset {
    /// Family name as used by `font-family` in the stylesheets.
    pub family: String,
    /// CSS `font-style` keyword.
    pub style: String,
    /// CSS `font-weight` keyword or number.
    pub weight: String,
    pub media_type: String,
    /// Raw bytes; base64 in the JSON form.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Default for FontAsset {
    fn default() -> Self {
        Self {
            family: String::new(),
            style: "normal".into(),
            weight: "normal".into(),
            media_type: String::new(),
            data: Vec::new(),
        }
    }
}

impl FontAsset {
    pub fn new(family: impl Into<String>, media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            family: family.into(),
            media_type: media_type.into(),
            data,
            ..Self::default()
        }
    }

    /// Builder: set the style and weight keywords.
    pub fn with_variant(mut self, style: impl Into<String>, weight: impl Into<String>) -> Self {
        self.style = style.into();
        self.weight = weight.into();
        self
    }

    /// Whether the media type names a font format.
    pub fn is_font(&self) -> bool {
        let media_type = self.media_type.to_ascii_lowercase();
        media_type.starts_with("font/")
            || media_type.starts_with("application/font-")
            || media_type.starts_with("application/x-font-")
            || media_type == "application/vnd.ms-fontobject"
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.trim())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Block, Inline};

    #[test]
    fn test_document_from_json() {
        let json = r#"{
            "id": "urn:test:1",
            "metadata": { "title": "Test", "authors": ["A. Writer"], "language": "en" },
            "sections": [
                { "title": "One", "blocks": [
                    { "type": "paragraph", "content": [ { "type": "text", "text": "Hello" } ] }
                ] }
            ],
            "images": [ { "id": "cover", "media_type": "image/png", "data": "iVBORw0K", "width": 10, "height": 20 } ]
        }"#;
        let doc = Document::from_json(json).unwrap();
        assert_eq!(doc.id, "urn:test:1");
        assert_eq!(doc.metadata.authors, vec!["A. Writer"]);
        assert_eq!(doc.sections.len(), 1);
        match &doc.sections[0].blocks[0] {
            Block::Paragraph { content, .. } => {
                assert_eq!(content, &vec![Inline::text("Hello")]);
            }
            other => panic!("unexpected block {other:?}"),
        }
        let image = doc.image("cover").unwrap();
        assert_eq!(image.data, b"\x89PNG\r\n");
        assert_eq!(image.format(), Some(ImageFormat::Png));
    }

    #[test]
    fn test_image_format_detection() {
        assert_eq!(
            ImageFormat::detect("image/jpeg", &[]),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            ImageFormat::detect("application/octet-stream", b"GIF89a"),
            Some(ImageFormat::Gif)
        );
        assert_eq!(ImageFormat::detect("image/svg+xml", b"<svg"), None);
    }

    #[test]
    fn test_font_from_json() {
        let json = r#"{
            "id": "urn:test:fonts",
            "fonts": [ { "family": "Literata", "style": "italic", "media_type": "font/ttf", "data": "AAEAAA==" } ]
        }"#;
        let doc = Document::from_json(json).unwrap();
        let font = &doc.fonts[0];
        assert_eq!(font.family, "Literata");
        assert_eq!(font.style, "italic");
        assert_eq!(font.weight, "normal");
        assert_eq!(font.data, [0, 1, 0, 0]);
        assert!(font.is_font());
        assert!(!FontAsset::new("x", "image/png", Vec::new()).is_font());
    }

    #[test]
    fn test_metadata_builder() {
        let meta = Metadata::new("Title")
            .with_author("One")
            .with_author("Two")
            .with_language("de");
        assert_eq!(meta.authors.len(), 2);
        assert_eq!(meta.language.as_deref(), Some("de"));
    }
}
