//! End-to-end conversion: documents in, containers out, parsed back.

use std::collections::HashMap;

use kfxgen::kfx::container::{
    ENTITY_ENTRY_SIZE, entity_payload, parse_container_header, parse_container_info, parse_doc_symbols,
    parse_index_table,
};
use kfxgen::kfx::generate::build_container;
use kfxgen::kfx::ion::{IonParser, IonValue};
use kfxgen::kfx::position::{PositionItem, build_position_id_map, total_positions};
use kfxgen::kfx::symbols::{LOCAL_MIN_ID, sym};
use kfxgen::model::{Block, FontAsset, ImageAsset, Inline, Section};
use kfxgen::{CancelFlag, Config, Document, Error, Metadata, generate};

/// 2x3 PNG: signature and IHDR are all the sniffer needs.
fn png() -> Vec<u8> {
    let mut data = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];
    data.extend_from_slice(b"IHDR");
    data.extend_from_slice(&2u32.to_be_bytes());
    data.extend_from_slice(&3u32.to_be_bytes());
    data.extend_from_slice(&[8, 6, 0, 0, 0]);
    data
}

fn sample_doc() -> Document {
    let intro = Section::new()
        .with_title("Introduction")
        .with_block(Block::paragraph(vec![
            Inline::text("See "),
            Inline::link("#details", vec![Inline::text("details")]),
            Inline::text(" or "),
            Inline::link("https://example.com/", vec![Inline::text("the web")]),
            Inline::text("."),
        ]))
        .with_block(Block::Image {
            id: None,
            image: "fig1".into(),
            alt: "Figure".into(),
            class: None,
        });
    let details = Section::new()
        .with_title("Details")
        .with_block(Block::heading(2, vec![Inline::text("Background")]))
        .with_block(Block::Paragraph {
            id: Some("details".into()),
            class: Some("body".into()),
            content: vec![Inline::styled("emphasis", vec![Inline::text("Important")]), Inline::text(" text.")],
        });

    let mut doc = Document::new("urn:test:container")
        .with_metadata(
            Metadata::new("Sample Book")
                .with_author("First Author")
                .with_language("en")
                .with_publisher("Test Press"),
        )
        .with_section(intro)
        .with_section(details)
        .with_image(ImageAsset::new("fig1", "image/png", png()))
        .with_image(ImageAsset::new("cover", "image/png", png()));
    doc.cover = Some("cover".into());
    doc
}

const CSS: &str = "p { text-indent: 1.5em } .body { margin-top: 0.5em } .emphasis { font-style: italic }";

fn fid_of(symbols: &[String], id: u32) -> String {
    if id >= LOCAL_MIN_ID {
        symbols[(id - LOCAL_MIN_ID) as usize].clone()
    } else {
        format!("${id}")
    }
}

// ============================================================================
// Container layout
// ============================================================================

#[test]
fn test_container_parses_back() {
    let config = Config::default();
    let bytes = generate(&sample_doc(), &[CSS], &config, &CancelFlag::new()).unwrap();
    let container = build_container(&sample_doc(), &[CSS], &config).unwrap();

    let header = parse_container_header(&bytes).unwrap();
    assert_eq!(header.version, 2);
    let info = parse_container_info(&bytes, &header).unwrap();
    assert_eq!(info.container_id, container.container_id);
    assert!(info.container_id.starts_with("CR!"));
    assert_eq!(info.container_id.len(), 31);
    assert!(info.format_capabilities.is_some());

    let (offset, length) = info.index.unwrap();
    assert_eq!(length % ENTITY_ENTRY_SIZE, 0);
    let entities = parse_index_table(&bytes[offset..offset + length]);
    let stored = container
        .fragments
        .iter()
        .filter(|f| f.ftype != sym::FORMAT_CAPABILITIES && f.ftype != sym::CONTAINER_INFO)
        .count();
    assert_eq!(entities.len(), stored);

    let (sym_offset, sym_length) = info.doc_symbols.unwrap();
    let symbols = parse_doc_symbols(&bytes[sym_offset..sym_offset + sym_length]).unwrap();

    // Every entity resolves back to a fragment of the same type.
    for entity in &entities {
        let fid = fid_of(&symbols, entity.id);
        assert!(container.fragments.contains(entity.type_id, &fid), "entity {fid}");
        let start = header.header_len + entity.offset as usize;
        let payload = entity_payload(&bytes[start..start + entity.length as usize]);
        if entity.type_id == sym::RAW_MEDIA {
            assert_eq!(payload, png().as_slice());
        } else {
            IonParser::new(payload).parse().unwrap();
        }
    }
}

#[test]
fn test_generation_is_deterministic() {
    let config = Config::default();
    let a = generate(&sample_doc(), &[CSS], &config, &CancelFlag::new()).unwrap();
    let b = generate(&sample_doc(), &[CSS], &config, &CancelFlag::new()).unwrap();
    assert_eq!(a, b);

    let mut other = sample_doc();
    other.id = "urn:test:other".into();
    let c = build_container(&other, &[CSS], &config).unwrap();
    let d = build_container(&sample_doc(), &[CSS], &config).unwrap();
    assert_ne!(c.container_id, d.container_id);
}

#[test]
fn test_anchor_ids_may_match_generated_names() {
    let target = |id: &str, text: &str| Block::Paragraph {
        id: Some(id.into()),
        class: None,
        content: vec![Inline::text(text)],
    };
    let doc = Document::new("urn:test:anchors")
        .with_metadata(Metadata::new("Anchors"))
        .with_section(
            Section::new()
                .with_block(Block::paragraph(vec![
                    Inline::link("#c0", vec![Inline::text("first")]),
                    Inline::link("#ext1", vec![Inline::text("second")]),
                    Inline::link("https://example.com/", vec![Inline::text("web")]),
                ]))
                .with_block(target("c0", "Zero"))
                .with_block(target("ext1", "One")),
        );
    let config = Config::default();

    let container = build_container(&doc, &[], &config).unwrap();
    let anchors: Vec<&str> = container.fragments.of_type(sym::ANCHOR).map(|f| f.fid.as_str()).collect();
    assert_eq!(anchors, ["c0", "ext1", "ext2"]);
    assert!(container.fragments.contains(sym::SECTION, "c0"));

    let bytes = generate(&doc, &[], &config, &CancelFlag::new()).unwrap();
    let header = parse_container_header(&bytes).unwrap();
    let info = parse_container_info(&bytes, &header).unwrap();
    let (offset, length) = info.index.unwrap();
    let entities = parse_index_table(&bytes[offset..offset + length]);
    let (sym_offset, sym_length) = info.doc_symbols.unwrap();
    let symbols = parse_doc_symbols(&bytes[sym_offset..sym_offset + sym_length]).unwrap();
    let c0_types: Vec<u32> = entities
        .iter()
        .filter(|e| fid_of(&symbols, e.id) == "c0")
        .map(|e| e.type_id)
        .collect();
    assert_eq!(c0_types, [sym::SECTION, sym::ANCHOR]);
}

#[test]
fn test_cancelled_document_is_not_converted() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let err = generate(&sample_doc(), &[CSS], &Config::default(), &cancel).unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

// ============================================================================
// Entity map
// ============================================================================

#[test]
fn test_entity_map_lists_every_entity_once() {
    let container = build_container(&sample_doc(), &[CSS], &Config::default()).unwrap();
    let map = container
        .fragments
        .first_of_type(sym::CONTAINER_ENTITY_MAP)
        .and_then(|f| f.as_ion())
        .unwrap();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for listed in map.get(sym::CONTAINER_LIST).and_then(IonValue::as_list).unwrap() {
        for id in listed.get(sym::CONTAINS).and_then(IonValue::as_list).unwrap() {
            let text = container.symbols.text_of(id.as_symbol().unwrap()).into_owned();
            *counts.entry(text).or_default() += 1;
        }
    }

    for fragment in container.fragments.iter() {
        if fragment.is_entity() {
            assert_eq!(counts.get(&fragment.fid), Some(&1), "{}", fragment.fid);
        } else {
            assert!(!counts.contains_key(&fragment.fid), "{} listed", fragment.fid);
        }
    }
}

#[test]
fn test_sections_depend_on_their_images() {
    let container = build_container(&sample_doc(), &[CSS], &Config::default()).unwrap();
    let map = container
        .fragments
        .first_of_type(sym::CONTAINER_ENTITY_MAP)
        .and_then(|f| f.as_ion())
        .unwrap();
    let deps = map.get(sym::ENTITY_DEPENDENCIES).and_then(IonValue::as_list).unwrap();
    let name = |v: &IonValue| container.symbols.text_of(v.as_symbol().unwrap()).into_owned();

    let resource_deps: Vec<(String, Vec<String>)> = deps
        .iter()
        .filter_map(|dep| {
            let optional = dep.get(sym::OPTIONAL_DEPENDENCIES)?.as_list()?;
            Some((name(dep.get(sym::ID)?), optional.iter().map(name).collect()))
        })
        .collect();
    assert_eq!(resource_deps.len(), 2);
    for (resource, media) in &resource_deps {
        assert_eq!(media, &[format!("resource/{resource}")]);
    }

    let section_deps = deps
        .iter()
        .filter(|dep| dep.get(sym::MANDATORY_DEPENDENCIES).is_some())
        .count();
    assert_eq!(section_deps, 2, "cover and introduction sections");
}

// ============================================================================
// Book fragments
// ============================================================================

#[test]
fn test_book_fragments_present() {
    let container = build_container(&sample_doc(), &[CSS], &Config::default()).unwrap();
    let count = |ftype| container.fragments.of_type(ftype).count();
    assert_eq!(count(sym::BOOK_METADATA), 1);
    assert_eq!(count(sym::METADATA), 1);
    assert_eq!(count(sym::DOCUMENT_DATA), 1);
    assert_eq!(count(sym::BOOK_NAVIGATION), 1);
    assert_eq!(count(sym::RESOURCE_PATH), 1);
    assert_eq!(count(sym::FORMAT_CAPABILITIES), 1);
    assert_eq!(count(sym::CONTENT_FEATURES), 1);
    assert_eq!(count(sym::SECTION), 3);
    assert_eq!(count(sym::STORYLINE), 3);
    assert_eq!(count(sym::AUXILIARY_DATA), 3);
    assert_eq!(count(sym::EXTERNAL_RESOURCE), 2);
    assert_eq!(count(sym::RAW_MEDIA), 2);
    assert!(count(sym::ANCHOR) >= 2, "internal and external link anchors");
    assert!(count(sym::STYLE) >= 1);
}

#[test]
fn test_embedded_fonts_follow_images() {
    let doc = sample_doc().with_font(FontAsset::new("Literata", "font/ttf", vec![0, 1, 0, 0]));
    let config = Config::default();
    let container = build_container(&doc, &[CSS], &config).unwrap();
    let fonts: Vec<&str> = container.fragments.of_type(sym::FONT).map(|f| f.fid.as_str()).collect();
    assert_eq!(fonts, ["rsrc3"]);
    assert!(container.fragments.contains(sym::RAW_FONT, "resource/rsrc3"));

    assert!(generate(&doc, &[CSS], &config, &CancelFlag::new()).is_ok());
}

#[test]
fn test_reading_order_follows_sections() {
    let container = build_container(&sample_doc(), &[CSS], &Config::default()).unwrap();
    let data = container
        .fragments
        .first_of_type(sym::DOCUMENT_DATA)
        .and_then(|f| f.as_ion())
        .unwrap();
    let orders = data.get(sym::READING_ORDERS).and_then(IonValue::as_list).unwrap();
    let sections: Vec<String> = orders[0]
        .get(sym::SECTIONS)
        .and_then(IonValue::as_list)
        .unwrap()
        .iter()
        .map(|s| container.symbols.text_of(s.as_symbol().unwrap()).into_owned())
        .collect();
    assert_eq!(sections, ["c0", "c1", "c2"]);
}

#[test]
fn test_json_document_converts() {
    let json = r#"{
        "id": "urn:test:json",
        "metadata": {"title": "From JSON", "authors": ["A. Writer"], "language": "de"},
        "sections": [
            {"title": "Eins", "blocks": [
                {"type": "heading", "level": 1, "content": [{"type": "text", "text": "Eins"}]},
                {"type": "paragraph", "content": [{"type": "text", "text": "Hallo Welt"}]},
                {"type": "empty_line"},
                {"type": "paragraph", "class": "end", "content": [{"type": "text", "text": "Ende"}]}
            ]}
        ]
    }"#;
    let doc = Document::from_json(json).unwrap();
    let bytes = generate(&doc, &[".end { text-align: center }"], &Config::default(), &CancelFlag::new()).unwrap();
    assert_eq!(&bytes[..4], b"CONT");
}

// ============================================================================
// Position ids
// ============================================================================

#[test]
fn test_position_ids_for_text_image_text() {
    let items = vec![
        PositionItem::new(2001, 10, "c0"),
        PositionItem::new(2002, 1, "c0"),
        PositionItem::new(2003, 25, "c0"),
    ];
    let map = build_position_id_map(&items);
    let entries: Vec<(i64, i64)> = map
        .as_list()
        .unwrap()
        .iter()
        .map(|e| {
            (
                e.get(sym::PID).and_then(IonValue::as_int).unwrap(),
                e.get(sym::EID).and_then(IonValue::as_int).unwrap(),
            )
        })
        .collect();
    assert_eq!(entries, [(0, 2001), (10, 2002), (11, 2003), (36, 0)]);
    assert_eq!(total_positions(&items), 36);
}
