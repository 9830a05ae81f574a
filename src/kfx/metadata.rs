//! KFX metadata schema - declarative mapping from document metadata to the
//! `$490` book metadata fragment, plus the reading-order fragments `$258`
//! and `$538`.
//!
//! Adding a metadata key only requires a new [`MetadataRule`].

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::kfx::container::alphanumeric_digest;
use crate::kfx::fragment::Fragment;
use crate::kfx::ion::{IonValue, StructBuilder};
use crate::kfx::symbols::{LocalSymbols, sym};
use crate::model::Metadata;

/// Category for KFX metadata entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataCategory {
    /// Book title, author, language, etc.
    KindleTitle,
    /// Creator/audit information
    KindleAudit,
    /// eBook capabilities (selection, nested_span)
    KindleEbook,
    KindleCapability,
}

impl MetadataCategory {
    pub const ALL: [MetadataCategory; 4] = [
        MetadataCategory::KindleTitle,
        MetadataCategory::KindleAudit,
        MetadataCategory::KindleEbook,
        MetadataCategory::KindleCapability,
    ];

    /// Get the KFX category string.
    pub fn as_str(self) -> &'static str {
        match self {
            MetadataCategory::KindleTitle => "kindle_title_metadata",
            MetadataCategory::KindleAudit => "kindle_audit_metadata",
            MetadataCategory::KindleEbook => "kindle_ebook_metadata",
            MetadataCategory::KindleCapability => "kindle_capability_metadata",
        }
    }
}

/// A rule for mapping one metadata key.
#[derive(Debug, Clone)]
pub struct MetadataRule {
    /// The KFX key name (e.g., "title", "author").
    pub key: &'static str,
    pub category: MetadataCategory,
    pub source: MetadataSource,
}

/// Source of a metadata value.
#[derive(Debug, Clone)]
pub enum MetadataSource {
    Static(&'static str),
    Flag(bool),
    Dynamic(MetadataField),
}

/// Values taken from the document or from the generation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    /// Digest of the document id.
    ContentId,
    /// Container id of this generation.
    AssetId,
    /// Stable per publication.
    BookId,
    /// Resource name of the cover image.
    CoverImage,
    Title,
    /// One entry per author.
    Authors,
    Language,
    Publisher,
    Description,
    IssueDate,
    CreatorVersion,
}

impl MetadataField {
    /// Extract the values for this field. Empty strings are dropped.
    fn extract(self, meta: &Metadata, ctx: &MetadataContext<'_>) -> Vec<String> {
        let values: Vec<String> = match self {
            MetadataField::ContentId => vec![ctx.content_id.clone()],
            MetadataField::AssetId => vec![ctx.asset_id.to_string()],
            MetadataField::BookId => vec![ctx.book_id.clone()],
            MetadataField::CoverImage => ctx.cover_resource.map(str::to_string).into_iter().collect(),
            MetadataField::Title => vec![meta.title.clone()],
            MetadataField::Authors => meta.authors.clone(),
            MetadataField::Language => meta.language.clone().into_iter().collect(),
            MetadataField::Publisher => meta.publisher.clone().into_iter().collect(),
            MetadataField::Description => meta.description.clone().into_iter().collect(),
            MetadataField::IssueDate => meta.date.as_deref().map(truncate_to_date).into_iter().collect(),
            MetadataField::CreatorVersion => vec![ctx.creator_version.to_string()],
        };
        values
            .into_iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect()
    }
}

/// Get the KFX metadata schema, in emission order.
pub fn metadata_schema() -> Vec<MetadataRule> {
    use MetadataCategory::*;
    use MetadataField::*;

    let rule = |key, category, source| MetadataRule { key, category, source };
    vec![
        rule("ASIN", KindleTitle, MetadataSource::Dynamic(ContentId)),
        rule("content_id", KindleTitle, MetadataSource::Dynamic(ContentId)),
        rule("asset_id", KindleTitle, MetadataSource::Dynamic(AssetId)),
        rule("book_id", KindleTitle, MetadataSource::Dynamic(BookId)),
        rule("cde_content_type", KindleTitle, MetadataSource::Static("PDOC")),
        rule("cover_image", KindleTitle, MetadataSource::Dynamic(CoverImage)),
        rule("is_sample", KindleTitle, MetadataSource::Flag(false)),
        rule("override_kindle_font", KindleTitle, MetadataSource::Flag(false)),
        rule("title", KindleTitle, MetadataSource::Dynamic(Title)),
        rule("author", KindleTitle, MetadataSource::Dynamic(Authors)),
        rule("language", KindleTitle, MetadataSource::Dynamic(Language)),
        rule("publisher", KindleTitle, MetadataSource::Dynamic(Publisher)),
        rule("description", KindleTitle, MetadataSource::Dynamic(Description)),
        rule("issue_date", KindleTitle, MetadataSource::Dynamic(IssueDate)),
        rule("creator_version", KindleAudit, MetadataSource::Dynamic(CreatorVersion)),
        rule("file_creator", KindleAudit, MetadataSource::Static("kfxgen")),
        rule("selection", KindleEbook, MetadataSource::Static("enabled")),
        rule("nested_span", KindleEbook, MetadataSource::Static("enabled")),
    ]
}

/// Values that only exist once generation is under way.
#[derive(Debug, Clone)]
pub struct MetadataContext<'a> {
    pub content_id: String,
    /// Same as the container id.
    pub asset_id: &'a str,
    pub book_id: String,
    /// Resource name (`rsrcN`), not the source image id.
    pub cover_resource: Option<&'a str>,
    pub creator_version: &'a str,
}

impl<'a> MetadataContext<'a> {
    pub fn new(doc_id: &str, meta: &Metadata, asset_id: &'a str, creator_version: &'a str) -> Self {
        let identifier = meta.identifier.as_deref().filter(|s| !s.trim().is_empty()).unwrap_or(doc_id);
        Self {
            content_id: alphanumeric_digest(doc_id, 32),
            asset_id,
            book_id: generate_book_id(identifier),
            cover_resource: None,
            creator_version,
        }
    }

    pub fn with_cover(mut self, resource: Option<&'a str>) -> Self {
        self.cover_resource = resource;
        self
    }
}

/// Generate a book ID from a publication identifier.
///
/// Stable across exports of the same publication: a version byte followed by
/// 16 bytes of the identifier's SHA-1, URL-safe Base64 without padding
/// (23 characters).
pub fn generate_book_id(identifier: &str) -> String {
    let digest = sha1_smol::Sha1::from(identifier).digest().bytes();
    let mut bytes = vec![0x05u8];
    bytes.extend_from_slice(&digest[..16]);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// KFX expects `YYYY-MM-DD`, not a full timestamp.
fn truncate_to_date(date: &str) -> String {
    let date = date.trim();
    match date.find('T') {
        Some(pos) => date[..pos].to_string(),
        None => date.to_string(),
    }
}

/// Build metadata entries for a category from the schema.
pub fn build_category_entries(
    category: MetadataCategory,
    meta: &Metadata,
    ctx: &MetadataContext<'_>,
) -> Vec<(&'static str, IonValue)> {
    let mut entries = Vec::new();
    for rule in metadata_schema().iter().filter(|r| r.category == category) {
        match &rule.source {
            MetadataSource::Static(s) => entries.push((rule.key, IonValue::String(s.to_string()))),
            MetadataSource::Flag(b) => entries.push((rule.key, IonValue::Bool(*b))),
            MetadataSource::Dynamic(field) => entries.extend(
                field
                    .extract(meta, ctx)
                    .into_iter()
                    .map(|v| (rule.key, IonValue::String(v))),
            ),
        }
    }
    entries
}

/// `{$492: key, $307: value}`
pub fn metadata_entry(key: &str, value: IonValue) -> IonValue {
    StructBuilder::new()
        .string(sym::KEY, key)
        .field(sym::VALUE, value)
        .build()
}

/// Build the `$490` book metadata fragment.
pub fn build_book_metadata(meta: &Metadata, ctx: &MetadataContext<'_>) -> Fragment {
    let categories = MetadataCategory::ALL
        .iter()
        .map(|&category| {
            let entries = build_category_entries(category, meta, ctx)
                .into_iter()
                .map(|(key, value)| metadata_entry(key, value))
                .collect();
            StructBuilder::new()
                .string(sym::CATEGORY, category.as_str())
                .list(sym::METADATA, entries)
                .build()
        })
        .collect();
    Fragment::root(
        sym::BOOK_METADATA,
        StructBuilder::new().list(sym::CATEGORISED_METADATA, categories).build(),
    )
}

/// `[{$178: $351, $170: [sections]}]`
fn reading_orders(sections: &[String], symbols: &mut LocalSymbols) -> IonValue {
    let sections: Vec<IonValue> = sections
        .iter()
        .map(|name| IonValue::Symbol(symbols.get_or_intern(name)))
        .collect();
    let order = StructBuilder::new()
        .symbol(sym::READING_ORDER_NAME, sym::DEFAULT)
        .maybe(sym::SECTIONS, (!sections.is_empty()).then_some(IonValue::List(sections)))
        .build();
    IonValue::List(vec![order])
}

/// Build the `$258` metadata fragment (reading orders).
pub fn build_metadata(sections: &[String], symbols: &mut LocalSymbols) -> Fragment {
    let value = StructBuilder::new()
        .field(sym::READING_ORDERS, reading_orders(sections, symbols))
        .build();
    Fragment::root(sym::METADATA, value)
}

/// Build the `$538` document data fragment. Its reading orders must match
/// `$258`.
pub fn build_document_data(sections: &[String], symbols: &mut LocalSymbols) -> Fragment {
    let value = StructBuilder::new()
        .field(sym::READING_ORDERS, reading_orders(sections, symbols))
        .build();
    Fragment::root(sym::DOCUMENT_DATA, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries_of(value: &IonValue, category: &str) -> Vec<(String, IonValue)> {
        value
            .get(sym::CATEGORISED_METADATA)
            .and_then(IonValue::as_list)
            .unwrap()
            .iter()
            .find(|c| c.get(sym::CATEGORY).and_then(IonValue::as_string) == Some(category))
            .and_then(|c| c.get(sym::METADATA))
            .and_then(IonValue::as_list)
            .unwrap()
            .iter()
            .map(|e| {
                (
                    e.get(sym::KEY).and_then(IonValue::as_string).unwrap().to_string(),
                    e.get(sym::VALUE).unwrap().clone(),
                )
            })
            .collect()
    }

    fn ctx<'a>(meta: &Metadata) -> MetadataContext<'a> {
        MetadataContext::new("urn:test:1", meta, "CR!TESTTESTTESTTESTTESTTESTTEST", "1.2.3")
    }

    #[test]
    fn test_title_entries() {
        let meta = Metadata::new("Test Book")
            .with_author("One")
            .with_author("Two")
            .with_language("en");
        let entries = build_category_entries(MetadataCategory::KindleTitle, &meta, &ctx(&meta));
        let keys: Vec<&str> = entries.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            [
                "ASIN",
                "content_id",
                "asset_id",
                "book_id",
                "cde_content_type",
                "is_sample",
                "override_kindle_font",
                "title",
                "author",
                "author",
                "language"
            ]
        );
        assert!(entries.contains(&("author", IonValue::String("Two".into()))));
        assert!(entries.contains(&("is_sample", IonValue::Bool(false))));
        assert!(entries.contains(&("cde_content_type", IonValue::String("PDOC".into()))));
    }

    #[test]
    fn test_cover_uses_resource_name() {
        let meta = Metadata::new("T");
        let entries = build_category_entries(
            MetadataCategory::KindleTitle,
            &meta,
            &ctx(&meta).with_cover(Some("rsrc1")),
        );
        assert!(entries.contains(&("cover_image", IonValue::String("rsrc1".into()))));
    }

    #[test]
    fn test_issue_date_truncated() {
        let mut meta = Metadata::new("T");
        meta.date = Some("2022-05-26T10:00:00Z".into());
        let entries = build_category_entries(MetadataCategory::KindleTitle, &meta, &ctx(&meta));
        assert!(entries.contains(&("issue_date", IonValue::String("2022-05-26".into()))));
    }

    #[test]
    fn test_book_metadata_categories() {
        let meta = Metadata::new("T");
        let fragment = build_book_metadata(&meta, &ctx(&meta));
        assert!(fragment.is_root());
        let value = fragment.as_ion().unwrap();

        let audit = entries_of(value, "kindle_audit_metadata");
        assert_eq!(audit[0], ("creator_version".into(), IonValue::String("1.2.3".into())));
        assert_eq!(audit[1], ("file_creator".into(), IonValue::String("kfxgen".into())));
        assert_eq!(entries_of(value, "kindle_ebook_metadata").len(), 2);
        assert!(entries_of(value, "kindle_capability_metadata").is_empty());
    }

    #[test]
    fn test_content_id_is_stable() {
        let meta = Metadata::new("T");
        let a = ctx(&meta);
        let b = ctx(&meta);
        assert_eq!(a.content_id, b.content_id);
        assert_eq!(a.content_id.len(), 32);
        assert!(a.content_id.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_generate_book_id() {
        let id = generate_book_id("urn:uuid:12345678-1234-1234-1234-123456789abc");
        assert_eq!(id.len(), 23);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(id, generate_book_id("urn:uuid:12345678-1234-1234-1234-123456789abc"));
        assert_ne!(id, generate_book_id("urn:uuid:other"));
    }

    #[test]
    fn test_identifier_preferred_for_book_id() {
        let mut meta = Metadata::new("T");
        meta.identifier = Some("isbn:123".into());
        assert_eq!(ctx(&meta).book_id, generate_book_id("isbn:123"));
        meta.identifier = Some("  ".into());
        assert_eq!(ctx(&meta).book_id, generate_book_id("urn:test:1"));
    }

    #[test]
    fn test_reading_orders_match() {
        let mut symbols = LocalSymbols::new();
        let sections = vec!["c0".to_string(), "c1".to_string()];
        let metadata = build_metadata(&sections, &mut symbols);
        let data = build_document_data(&sections, &mut symbols);
        assert_eq!(
            metadata.as_ion().unwrap().get(sym::READING_ORDERS),
            data.as_ion().unwrap().get(sym::READING_ORDERS)
        );
        let order = &data
            .as_ion()
            .unwrap()
            .get(sym::READING_ORDERS)
            .and_then(IonValue::as_list)
            .unwrap()[0];
        assert_eq!(order.get(sym::READING_ORDER_NAME).and_then(IonValue::as_symbol), Some(sym::DEFAULT));
        assert_eq!(
            order.get(sym::SECTIONS),
            Some(&IonValue::List(vec![
                IonValue::Symbol(symbols.get("c0").unwrap()),
                IonValue::Symbol(symbols.get("c1").unwrap()),
            ]))
        );
    }
}
