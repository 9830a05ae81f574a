//! Book-level fragments built from an [`Assembly`]: navigation, resources,
//! embedded fonts, anchors, format capabilities, content features and
//! auxiliary data.

use crate::kfx::assemble::{Anchor, AnchorTarget, Assembly, NavPoint};
use crate::kfx::fragment::Fragment;
use crate::kfx::ion::{IonValue, StructBuilder};
use crate::kfx::metadata::metadata_entry;
use crate::kfx::position::PositionItem;
use crate::kfx::style::mapping::{font_style_symbol, font_weight_symbol};
use crate::kfx::symbols::{LocalSymbols, sym};
use crate::model::{Document, ImageFormat};

/// Namespace of the reflow content features.
const YJ_CONVERSION: &str = "com.amazon.yjconversion";

/// `{$244: label}`
fn label(text: &str) -> IonValue {
    StructBuilder::new().string(sym::LABEL, text).build()
}

fn target(eid: u32) -> IonValue {
    StructBuilder::new()
        .int(sym::ID, i64::from(eid))
        .int(sym::OFFSET, 0)
        .build()
}

fn nav_unit(fields: IonValue) -> IonValue {
    IonValue::Annotated(vec![sym::NAV_UNIT], Box::new(fields))
}

fn nav_entries(points: &[NavPoint]) -> Vec<IonValue> {
    points
        .iter()
        .map(|point| {
            let children = (!point.children.is_empty()).then(|| IonValue::List(nav_entries(&point.children)));
            nav_unit(
                StructBuilder::new()
                    .field(sym::REPRESENTATION, label(&point.title))
                    .field(sym::TARGET_POSITION, target(point.eid))
                    .maybe(sym::ENTRIES, children)
                    .build(),
            )
        })
        .collect()
}

fn landmark(kind: u32, text: &str, eid: u32) -> IonValue {
    nav_unit(
        StructBuilder::new()
            .symbol(sym::LANDMARK_TYPE, kind)
            .field(sym::REPRESENTATION, label(text))
            .field(sym::TARGET_POSITION, target(eid))
            .build(),
    )
}

fn nav_container(kind: u32, name: &str, entries: Vec<IonValue>, symbols: &mut LocalSymbols) -> IonValue {
    IonValue::Annotated(
        vec![sym::NAV_CONTAINER],
        Box::new(
            StructBuilder::new()
                .symbol(sym::NAV_TYPE, kind)
                .symbol(sym::NAV_CONTAINER_NAME, symbols.get_or_intern(name))
                .list(sym::ENTRIES, entries)
                .build(),
        ),
    )
}

/// Build the `$389` book navigation fragment.
///
/// Always carries the TOC container (possibly empty); the landmarks
/// container is added when there is a cover or a first content position.
pub fn build_navigation(asm: &Assembly, symbols: &mut LocalSymbols) -> Fragment {
    let mut containers = vec![nav_container(sym::TOC, "nav-toc", nav_entries(&asm.toc), symbols)];

    let mut landmarks = Vec::new();
    if let Some((_, eid)) = &asm.cover {
        landmarks.push(landmark(sym::COVER_PAGE, "cover-nav-unit", *eid));
    }
    if let Some(eid) = asm.start_eid {
        landmarks.push(landmark(sym::SRL, "Start", eid));
    }
    if !landmarks.is_empty() {
        containers.push(nav_container(sym::LANDMARKS, "nav-landmarks", landmarks, symbols));
    }

    let reading_order = StructBuilder::new()
        .symbol(sym::READING_ORDER_NAME, sym::DEFAULT)
        .list(sym::NAV_CONTAINERS, containers)
        .build();
    Fragment::root(sym::BOOK_NAVIGATION, IonValue::List(vec![reading_order]))
}

/// Build the `$395` resource path fragment.
pub fn build_resource_path() -> Fragment {
    Fragment::root(sym::RESOURCE_PATH, StructBuilder::new().list(sym::ENTRIES, Vec::new()).build())
}

/// Location of the raw media for resource `name`.
pub fn media_location(name: &str) -> String {
    format!("resource/{name}")
}

/// Get image dimensions from the PNG header or the first JPEG frame.
pub fn sniff_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() >= 24 && data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
        let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
        return Some((width, height));
    }
    if data.len() >= 10 && data.starts_with(b"GIF8") {
        let width = u16::from_le_bytes([data[6], data[7]]);
        let height = u16::from_le_bytes([data[8], data[9]]);
        return Some((u32::from(width), u32::from(height)));
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        let mut pos = 2;
        while pos + 9 < data.len() {
            if data[pos] != 0xFF {
                pos += 1;
                continue;
            }
            let marker = data[pos + 1];
            if marker == 0xD9 {
                break;
            }
            if matches!(marker, 0xC0 | 0xC1 | 0xC2) {
                let height = u16::from_be_bytes([data[pos + 5], data[pos + 6]]);
                let width = u16::from_be_bytes([data[pos + 7], data[pos + 8]]);
                return Some((u32::from(width), u32::from(height)));
            }
            let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 2 + len;
        }
    }
    None
}

/// Build `$164` external resource and `$417` raw media fragments for every
/// image the content references.
///
/// Images in formats the container cannot carry are skipped with a warning.
pub fn build_resources(asm: &Assembly, doc: &Document, symbols: &mut LocalSymbols) -> Vec<Fragment> {
    let mut fragments = Vec::with_capacity(asm.resources.len() * 2);

    for resource in &asm.resources {
        let Some(image) = doc.image(&resource.image_id) else {
            log::warn!("image {:?} not found, resource {} skipped", resource.image_id, resource.name);
            continue;
        };
        let Some(format) = image.format() else {
            log::warn!(
                "image {:?} has unsupported type {:?}, skipped",
                image.id,
                image.media_type
            );
            continue;
        };
        let (format_sym, mime) = match format {
            ImageFormat::Png => (sym::PNG, "image/png"),
            ImageFormat::Jpeg => (sym::JPG, "image/jpeg"),
            ImageFormat::Gif => (sym::GIF, "image/gif"),
        };
        let (width, height) = if image.width > 0 && image.height > 0 {
            (image.width, image.height)
        } else {
            sniff_dimensions(&image.data).unwrap_or((0, 0))
        };

        let location = media_location(&resource.name);
        let value = StructBuilder::new()
            .symbol(sym::RESOURCE_NAME, symbols.get_or_intern(&resource.name))
            .symbol(sym::FORMAT, format_sym)
            .string(sym::MIME, mime)
            .string(sym::LOCATION, location.as_str())
            .maybe(sym::RESOURCE_WIDTH, (width > 0).then(|| IonValue::Int(i64::from(width))))
            .maybe(sym::RESOURCE_HEIGHT, (height > 0).then(|| IonValue::Int(i64::from(height))))
            .build();
        fragments.push(Fragment::new(sym::EXTERNAL_RESOURCE, resource.name.as_str(), value));
        fragments.push(Fragment::raw(sym::RAW_MEDIA, location, image.data.clone()));
    }
    fragments
}

/// Build a `$262` font declaration and its `$418` raw font for every
/// embedded font variant.
///
/// Resource names continue after the image resources. Assets that are not
/// fonts, have no data or repeat a family/style/weight variant are skipped.
pub fn build_fonts(asm: &Assembly, doc: &Document) -> Vec<Fragment> {
    let mut fragments = Vec::with_capacity(doc.fonts.len() * 2);
    let mut seen = Vec::new();

    for font in &doc.fonts {
        let family = font.family.trim().trim_matches(['"', '\'']);
        if family.is_empty() || font.data.is_empty() {
            log::warn!("font {:?} has no family or data, skipped", font.family);
            continue;
        }
        if !font.is_font() {
            log::warn!("font {family:?} has non-font type {:?}, skipped", font.media_type);
            continue;
        }
        let style = font_style_symbol(&font.style);
        let weight = font_weight_symbol(&font.weight);
        let variant = (family.to_lowercase(), style, weight);
        if seen.contains(&variant) {
            log::warn!("font {family:?} variant repeated, skipped");
            continue;
        }
        seen.push(variant);

        let name = format!("rsrc{}", asm.resources.len() + seen.len());
        let location = media_location(&name);
        let value = StructBuilder::new()
            .string(sym::FONT_FAMILY, family)
            .symbol(sym::FONT_STYLE, style)
            .symbol(sym::FONT_WEIGHT, weight)
            .symbol(sym::FONT_STRETCH, sym::NORMAL)
            .string(sym::LOCATION, location.as_str())
            .build();
        fragments.push(Fragment::new(sym::FONT, name, value));
        fragments.push(Fragment::raw(sym::RAW_FONT, location, font.data.clone()));
    }
    fragments
}

/// Build one `$266` anchor fragment per anchor.
pub fn build_anchors(anchors: &[Anchor], symbols: &mut LocalSymbols) -> Vec<Fragment> {
    anchors
        .iter()
        .map(|anchor| {
            let builder = StructBuilder::new().symbol(sym::ANCHOR_NAME, symbols.get_or_intern(&anchor.name));
            let value = match &anchor.target {
                AnchorTarget::Position(eid) => builder
                    .field(sym::POSITION, StructBuilder::new().int(sym::ID, i64::from(*eid)).build())
                    .build(),
                AnchorTarget::Uri(uri) => builder.string(sym::URI, uri.as_str()).build(),
            };
            Fragment::new(sym::ANCHOR, anchor.name.as_str(), value)
        })
        .collect()
}

/// Build the `$593` format capabilities fragment.
pub fn build_format_capabilities() -> Fragment {
    let feature = StructBuilder::new()
        .string(sym::KEY, "kfxgen.textBlock")
        .int(sym::VERSION, 1)
        .build();
    Fragment::root(sym::FORMAT_CAPABILITIES, IonValue::List(vec![feature]))
}

fn content_feature(key: &str, namespace: &str, major: i64) -> IonValue {
    let version = StructBuilder::new()
        .int(sym::MAJOR_VERSION, major)
        .int(sym::MINOR_VERSION, 0)
        .build();
    StructBuilder::new()
        .string(sym::KEY, key)
        .string(sym::NAMESPACE, namespace)
        .field(sym::VERSION_INFO, StructBuilder::new().field(sym::VERSION, version).build())
        .build()
}

/// `reflow-section-size` version for the largest section, in positions.
///
/// Sections up to 4096 positions need version 1; each doubling beyond that
/// adds one.
pub fn reflow_section_size(items: &[PositionItem]) -> i64 {
    let mut per_section: Vec<(&str, usize)> = Vec::new();
    for item in items {
        match per_section.iter_mut().find(|(name, _)| *name == item.section) {
            Some((_, total)) => *total += item.length,
            None => per_section.push((&item.section, item.length)),
        }
    }
    let largest = per_section.iter().map(|&(_, total)| total).max().unwrap_or(0);
    if largest <= 1 {
        return 1;
    }
    let bits = usize::BITS - (largest - 1).leading_zeros();
    i64::from(bits).saturating_sub(11).max(1)
}

/// Build the `$585` content features fragment.
pub fn build_content_features(section_size: i64) -> Fragment {
    let features = vec![
        content_feature("reflow-style", YJ_CONVERSION, 1),
        content_feature("reflow-section-size", YJ_CONVERSION, section_size),
        content_feature("reflow-language-expansion", YJ_CONVERSION, 1),
        content_feature("CanonicalFormat", "SDK.Marker", 1),
    ];
    Fragment::root(sym::CONTENT_FEATURES, StructBuilder::new().list(sym::FEATURES, features).build())
}

/// Build one `$597` auxiliary data fragment per section, marking it as a
/// navigation target.
pub fn build_auxiliary_data(sections: &[String]) -> Vec<Fragment> {
    sections
        .iter()
        .map(|section| {
            let fid = format!("{section}-ad");
            let value = StructBuilder::new()
                .list(
                    sym::METADATA,
                    vec![metadata_entry("IS_TARGET_SECTION", IonValue::Bool(true))],
                )
                .string(sym::KFX_ID, fid.as_str())
                .build();
            Fragment::new(sym::AUXILIARY_DATA, fid, value)
        })
        .collect()
}
