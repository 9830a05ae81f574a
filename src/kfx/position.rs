//! Position maps ($264, $265, $550).
//!
//! Readers address content by position id (PID): a running count of
//! characters, where every non-text element occupies one position. The maps
//! are derived from finished storylines in emission order and are never
//! re-sorted.

use crate::kfx::ion::{IonValue, StructBuilder};
use crate::kfx::storyline::{ContentEntry, ContentKind, MixedPiece, Storyline};
use crate::kfx::symbols::{LocalSymbols, sym};

/// One addressable element and the number of positions it spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionItem {
    pub eid: u32,
    pub length: usize,
    pub section: String,
    /// Inline images of mixed text as `(eid, offset)`.
    pub inline_images: Vec<(u32, usize)>,
}

impl PositionItem {
    pub fn new(eid: u32, length: usize, section: impl Into<String>) -> Self {
        Self {
            eid,
            length,
            section: section.into(),
            inline_images: Vec::new(),
        }
    }

    /// Text holding nothing but inline images.
    fn is_image_only(&self) -> bool {
        !self.inline_images.is_empty()
            && self.length == self.inline_images.len()
            && self.inline_images.iter().all(|&(_, offset)| offset == 0)
    }
}

/// Position items of every storyline: page template first, then entries.
pub fn collect_position_items(storylines: &[Storyline]) -> Vec<PositionItem> {
    let mut items = Vec::new();
    for storyline in storylines {
        items.push(PositionItem::new(storyline.page_template_eid, 1, &storyline.section_name));
        for entry in &storyline.entries {
            collect_entry(entry, &storyline.section_name, &mut items);
        }
    }
    items
}

fn collect_entry(entry: &ContentEntry, section: &str, items: &mut Vec<PositionItem>) {
    if entry.is_mixed() {
        let mut item = PositionItem::new(entry.eid, 0, section);
        for piece in &entry.mixed {
            match piece {
                MixedPiece::Text(text) => item.length += text.chars().count(),
                MixedPiece::Image(image) => {
                    item.inline_images.push((image.eid, item.length));
                    item.length += 1;
                }
            }
        }
        item.length = item.length.max(1);
        items.push(item);
        return;
    }

    match entry.kind {
        kind if kind.is_structural() => {
            items.push(PositionItem::new(entry.eid, 1, section));
            for child in &entry.children {
                collect_entry(child, section, items);
            }
        }
        ContentKind::Image => items.push(PositionItem::new(entry.eid, 1, section)),
        _ => {
            let runes = entry.content.as_ref().map_or(0, |c| c.runes);
            items.push(PositionItem::new(entry.eid, runes, section));
        }
    }
}

/// Build position map fragment value ($264).
///
/// One entry per section listing every EID it contains, inline images
/// included.
pub fn build_position_map(storylines: &[Storyline], symbols: &mut LocalSymbols) -> IonValue {
    let sections = storylines
        .iter()
        .map(|storyline| {
            let eids = storyline
                .eids()
                .into_iter()
                .map(|eid| IonValue::Int(i64::from(eid)))
                .collect();
            StructBuilder::new()
                .symbol(sym::SECTION_NAME, symbols.get_or_intern(&storyline.section_name))
                .list(sym::CONTAINS, eids)
                .build()
        })
        .collect();
    IonValue::List(sections)
}

fn pid_entry(pid: usize, eid: u32) -> IonValue {
    StructBuilder::new()
        .int(sym::PID, pid as i64)
        .int(sym::EID, i64::from(eid))
        .build()
}

fn pid_offset_entry(offset: usize, pid: usize, eid: u32) -> IonValue {
    StructBuilder::new()
        .int(sym::OFFSET, offset as i64)
        .int(sym::PID, pid as i64)
        .int(sym::EID, i64::from(eid))
        .build()
}

/// Build position id map fragment value ($265).
///
/// Each item starts at the running PID. Mixed text additionally gets an
/// entry before and after each inline image so readers can step over it.
/// Terminated by `{pid: total, eid: 0}`.
pub fn build_position_id_map(items: &[PositionItem]) -> IonValue {
    let mut entries = Vec::with_capacity(items.len() + 1);
    let mut pid = 0;

    for item in items {
        if item.is_image_only() {
            entries.push(pid_entry(pid, item.eid));
            for &(image, _) in &item.inline_images {
                entries.push(pid_entry(pid, image));
            }
            pid += 1;
            continue;
        }

        entries.push(pid_entry(pid, item.eid));
        for &(image, offset) in &item.inline_images {
            let image_pid = pid + offset;
            entries.push(pid_offset_entry(offset, image_pid, item.eid));
            entries.push(pid_entry(image_pid, image));
            entries.push(pid_offset_entry(offset + 1, image_pid + 1, item.eid));
        }
        pid += item.length;
    }

    entries.push(pid_entry(pid, 0));
    IonValue::List(entries)
}

/// Total positions covered by `items`.
pub fn total_positions(items: &[PositionItem]) -> usize {
    items
        .iter()
        .map(|item| if item.is_image_only() { 1 } else { item.length })
        .sum()
}

/// Location checkpoints as `(eid, offset)`: one every `stride` positions,
/// plus the last element.
pub fn location_points(items: &[PositionItem], stride: usize) -> Vec<(u32, usize)> {
    let stride = stride.max(1);
    let mut points = Vec::new();
    let mut pid = 0;
    let mut next = 0;

    for item in items {
        let end = pid + item.length;
        while next < end {
            points.push((item.eid, next.saturating_sub(pid)));
            next += stride;
        }
        pid = end;
    }

    match (items.first(), items.iter().rev().find(|i| i.length > 0)) {
        (Some(first), _) if points.is_empty() => points.push((first.eid, 0)),
        (_, Some(last)) if points.last().is_some_and(|&(eid, _)| eid != last.eid) => {
            points.push((last.eid, 0));
        }
        _ => {}
    }
    points
}

/// Build location map fragment value ($550).
pub fn build_location_map(items: &[PositionItem], stride: usize) -> IonValue {
    let locations = location_points(items, stride)
        .into_iter()
        .map(|(eid, offset)| {
            StructBuilder::new()
                .int(sym::ID, i64::from(eid))
                .maybe(sym::OFFSET, (offset > 0).then(|| IonValue::Int(offset as i64)))
                .build()
        })
        .collect();
    let reading_order = StructBuilder::new()
        .symbol(sym::READING_ORDER_NAME, sym::DEFAULT)
        .list(sym::LOCATIONS, locations)
        .build();
    IonValue::List(vec![reading_order])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kfx::storyline::ContentRef;

    fn pids(map: &IonValue) -> Vec<(i64, i64)> {
        map.as_list()
            .unwrap()
            .iter()
            .map(|e| {
                (
                    e.get(sym::PID).and_then(IonValue::as_int).unwrap(),
                    e.get(sym::EID).and_then(IonValue::as_int).unwrap(),
                )
            })
            .collect()
    }

    fn text_entry(eid: u32, runes: usize) -> ContentEntry {
        let mut entry = ContentEntry::new(eid, ContentKind::Text);
        entry.content = Some(ContentRef {
            name: "content_1".into(),
            index: 0,
            runes,
        });
        entry
    }

    #[test]
    fn test_position_ids_accumulate_lengths() {
        let items = vec![
            PositionItem::new(1, 10, "c0"),
            PositionItem::new(2, 1, "c0"),
            PositionItem::new(3, 25, "c0"),
        ];
        let map = build_position_id_map(&items);
        assert_eq!(pids(&map), vec![(0, 1), (10, 2), (11, 3), (36, 0)]);
        assert_eq!(total_positions(&items), 36);
    }

    #[test]
    fn test_collect_items_in_emission_order() {
        let mut wrapper = ContentEntry::new(11, ContentKind::Wrapper);
        wrapper.children.push(text_entry(12, 5));
        wrapper.children.push(ContentEntry::new(13, ContentKind::Image));
        let storyline = Storyline {
            story_name: "l1".into(),
            section_name: "c0".into(),
            page_template_eid: 10,
            entries: vec![wrapper, text_entry(14, 0)],
        };
        let items = collect_position_items(&[storyline]);
        let lengths: Vec<(u32, usize)> = items.iter().map(|i| (i.eid, i.length)).collect();
        assert_eq!(lengths, vec![(10, 1), (11, 1), (12, 5), (13, 1), (14, 0)]);
    }

    #[test]
    fn test_mixed_text_granular_entries() {
        let mut entry = ContentEntry::new(20, ContentKind::Text);
        entry.mixed = vec![
            MixedPiece::Text("abc".into()),
            MixedPiece::Image(ContentEntry::new(21, ContentKind::Image)),
            MixedPiece::Text("de".into()),
        ];
        let mut items = Vec::new();
        collect_entry(&entry, "c0", &mut items);
        assert_eq!(items[0].length, 6);
        assert_eq!(items[0].inline_images, vec![(21, 3)]);

        let map = build_position_id_map(&items);
        assert_eq!(pids(&map), vec![(0, 20), (3, 20), (3, 21), (4, 20), (6, 0)]);
        let offsets: Vec<Option<i64>> = map
            .as_list()
            .unwrap()
            .iter()
            .map(|e| e.get(sym::OFFSET).and_then(IonValue::as_int))
            .collect();
        assert_eq!(offsets, vec![None, Some(3), None, Some(4), None]);
    }

    #[test]
    fn test_image_only_text_shares_pid() {
        let mut entry = ContentEntry::new(30, ContentKind::Text);
        entry.mixed = vec![MixedPiece::Image(ContentEntry::new(31, ContentKind::Image))];
        let mut items = Vec::new();
        collect_entry(&entry, "c0", &mut items);
        items.push(PositionItem::new(32, 4, "c0"));
        let map = build_position_id_map(&items);
        assert_eq!(pids(&map), vec![(0, 30), (0, 31), (1, 32), (5, 0)]);
    }

    #[test]
    fn test_location_points_stride() {
        let items = vec![
            PositionItem::new(1, 1, "c0"),
            PositionItem::new(2, 250, "c0"),
            PositionItem::new(3, 30, "c0"),
        ];
        let points = location_points(&items, 110);
        assert_eq!(points, vec![(1, 0), (2, 109), (2, 219), (3, 0)]);
    }

    #[test]
    fn test_location_points_always_has_first() {
        let items = vec![PositionItem::new(7, 0, "c0")];
        assert_eq!(location_points(&items, 110), vec![(7, 0)]);
        assert!(location_points(&[], 110).is_empty());
    }

    #[test]
    fn test_location_map_shape() {
        let items = vec![PositionItem::new(1, 200, "c0")];
        let map = build_location_map(&items, 110);
        let list = map.as_list().unwrap();
        assert_eq!(list[0].get(sym::READING_ORDER_NAME).and_then(IonValue::as_symbol), Some(sym::DEFAULT));
        let locations = list[0].get(sym::LOCATIONS).and_then(IonValue::as_list).unwrap();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].get(sym::OFFSET), None);
        assert_eq!(locations[1].get(sym::OFFSET).and_then(IonValue::as_int), Some(110));
    }

    #[test]
    fn test_position_map_lists_section_eids() {
        let mut entry = ContentEntry::new(2, ContentKind::Text);
        entry.mixed = vec![MixedPiece::Image(ContentEntry::new(3, ContentKind::Image))];
        let storyline = Storyline {
            story_name: "l1".into(),
            section_name: "c0".into(),
            page_template_eid: 1,
            entries: vec![entry],
        };
        let mut symbols = LocalSymbols::new();
        let map = build_position_map(&[storyline], &mut symbols);
        let section = &map.as_list().unwrap()[0];
        let eids: Vec<i64> = section
            .get(sym::CONTAINS)
            .and_then(IonValue::as_list)
            .unwrap()
            .iter()
            .filter_map(IonValue::as_int)
            .collect();
        assert_eq!(eids, vec![1, 2, 3]);
        assert_eq!(section.get(sym::SECTION_NAME).and_then(IonValue::as_symbol), symbols.get("c0"));
    }
}
