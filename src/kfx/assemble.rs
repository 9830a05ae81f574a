//! Document tree to storylines.
//!
//! Walks every [`Section`] of a [`Document`] and drives one
//! [`StorylineBuilder`] per section. Besides the storylines this collects
//! everything later fragments need: anchor targets, referenced image
//! resources, the table of contents and landmark positions.
//!
//! Footnote bodies are moved out of their sections into a trailing notes
//! storyline so readers can pop them up without breaking the reading flow.

use std::collections::{HashMap, HashSet};

use crate::config::Settings;
use crate::kfx::margins::collapse_storyline;
use crate::kfx::storyline::{
    ContentAccumulator, ContentEntry, ContentKind, EidCounter, EntryStyle, InlineItem, StyleEvent,
    Storyline, StorylineBuilder, TableCellInput, segment_style_events,
};
use crate::kfx::style::registry::empty_line_margin;
use crate::kfx::style::units::Measure;
use crate::kfx::style::{ElementPosition, StyleRegistry, StyleUsage};
use crate::kfx::symbols::sym;
use crate::model::{Block, Document, Inline, Section, TableRow};

/// Title of the generated footnote storyline.
pub const NOTES_TITLE: &str = "Notes";

/// Where an anchor points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorTarget {
    Position(u32),
    Uri(String),
}

/// A `$266` anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub name: String,
    pub target: AnchorTarget,
}

/// An image referenced by content, with its external resource name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub image_id: String,
}

/// Table of contents entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavPoint {
    pub title: String,
    pub eid: u32,
    pub children: Vec<NavPoint>,
}

/// Output of [`assemble`].
#[derive(Debug)]
pub struct Assembly {
    pub storylines: Vec<Storyline>,
    pub content: ContentAccumulator,
    pub anchors: Vec<Anchor>,
    pub resources: Vec<Resource>,
    pub toc: Vec<NavPoint>,
    /// Resource name and EID of the cover image.
    pub cover: Option<(String, u32)>,
    /// First content EID after the cover.
    pub start_eid: Option<u32>,
}

impl Assembly {
    pub fn resource_name(&self, image_id: &str) -> Option<&str> {
        self.resources
            .iter()
            .find(|r| r.image_id == image_id)
            .map(|r| r.name.as_str())
    }
}

/// Build the storylines of `doc`, resolving styles through `styles`.
pub fn assemble(doc: &Document, styles: &mut StyleRegistry<'_>, settings: &Settings) -> Assembly {
    let mut eids = EidCounter::new(settings.first_eid);
    let mut asm = Assembler::new(doc, settings.content_chunk_size);
    let mut storylines = Vec::new();
    let mut toc = Vec::new();

    let mut cover = None;
    if let Some(cover_id) = &doc.cover {
        match doc.image(cover_id) {
            Some(image) => {
                let (story, section) = asm.next_names();
                let mut builder = StorylineBuilder::new(story, section, &mut eids, &mut *styles);
                let resource = asm.resource_for(cover_id);
                let style = builder.styles().block_image_style(nonzero(image.width));
                let eid = builder.add_image(&resource, EntryStyle::Resolved(style), "cover");
                storylines.push(builder.finish());
                cover = Some((resource, eid));
            }
            None => log::warn!("cover image {cover_id:?} not found"),
        }
    }

    let mut start_eid = None;
    for section in &doc.sections {
        let (story, section_name) = asm.next_names();
        let mut builder = StorylineBuilder::new(story, section_name, &mut eids, &mut *styles);
        let headings = asm.section(&mut builder, section);
        let storyline = builder.finish();

        let Some(first) = storyline.eids().get(1).copied() else {
            log::debug!("{}: empty section dropped", storyline.section_name);
            continue;
        };
        start_eid.get_or_insert(first);
        if let Some(id) = &section.id {
            asm.register_anchor(id, first);
        }
        toc.extend(section_toc(section.title.as_deref(), first, headings));
        storylines.push(storyline);
    }

    if !asm.footnotes.is_empty() {
        let (story, section) = asm.next_names();
        let mut builder = StorylineBuilder::new(story, section, &mut eids, &mut *styles);
        // Footnotes nested in footnotes are queued while their parent is built.
        let mut next = 0;
        while let Some(&(id, blocks)) = asm.footnotes.get(next) {
            next += 1;
            builder.start_block(Some("footnote"));
            asm.blocks(&mut builder, blocks, &["footnote".to_string()], &mut Vec::new());
            match builder.end_block() {
                Some(eid) => {
                    asm.register_anchor(id, eid);
                    if let Some(entry) = builder.last_entry_mut() {
                        entry.footnote = true;
                    }
                }
                None => log::warn!("footnote {id:?} has no content"),
            }
        }
        storylines.push(builder.finish());
    }

    if settings.collapse_margins {
        for storyline in &mut storylines {
            collapse_storyline(storyline, styles);
        }
    }

    asm.finish(storylines, toc, cover, start_eid)
}

fn nonzero(value: u32) -> Option<u32> {
    (value > 0).then_some(value)
}

/// Heading recorded for the table of contents.
struct Heading {
    level: u8,
    title: String,
    eid: u32,
}

struct Assembler<'d> {
    doc: &'d Document,
    content: ContentAccumulator,
    section_count: usize,
    footnote_ids: HashSet<&'d str>,
    /// Every element id in the document; generated anchor names avoid them.
    element_ids: HashSet<&'d str>,
    footnotes: Vec<(&'d str, &'d [Block])>,
    anchor_eids: HashMap<String, u32>,
    /// Internal link targets in first-reference order.
    referenced: Vec<String>,
    /// External URL to anchor name.
    external: Vec<(String, String)>,
    resources: Vec<Resource>,
}

/// Inline content of one paragraph, flattened.
#[derive(Default)]
struct InlineRun {
    items: Vec<InlineItem>,
    events: Vec<StyleEvent>,
    runes: usize,
}

impl InlineRun {
    fn push_text(&mut self, text: &str) {
        self.runes += text.chars().count();
        if let Some(InlineItem::Text(last)) = self.items.last_mut() {
            last.push_str(text);
        } else {
            self.items.push(InlineItem::Text(text.to_string()));
        }
    }

    fn has_image(&self) -> bool {
        self.items.iter().any(|i| matches!(i, InlineItem::Image { .. }))
    }

    fn has_text(&self) -> bool {
        self.items
            .iter()
            .any(|i| matches!(i, InlineItem::Text(t) if !t.trim().is_empty()))
    }

    fn text(&self) -> String {
        self.items
            .iter()
            .filter_map(|i| match i {
                InlineItem::Text(t) => Some(t.as_str()),
                InlineItem::Image { .. } => None,
            })
            .collect()
    }
}

/// Inline nesting frame: style class plus inherited link.
#[derive(Clone)]
struct InlineFrame {
    class: String,
    link_to: Option<String>,
    footnote: bool,
}

impl<'d> Assembler<'d> {
    fn new(doc: &'d Document, chunk_size: usize) -> Self {
        let mut footnote_ids = HashSet::new();
        let mut element_ids = HashSet::new();
        for section in &doc.sections {
            element_ids.extend(section.id.as_deref());
            collect_ids(&section.blocks, &mut footnote_ids, &mut element_ids);
        }
        Self {
            doc,
            content: ContentAccumulator::new(chunk_size),
            section_count: 0,
            footnote_ids,
            element_ids,
            footnotes: Vec::new(),
            anchor_eids: HashMap::new(),
            referenced: Vec::new(),
            external: Vec::new(),
            resources: Vec::new(),
        }
    }

    fn next_names(&mut self) -> (String, String) {
        self.section_count += 1;
        (
            format!("l{}", self.section_count),
            format!("c{}", self.section_count - 1),
        )
    }

    fn register_anchor(&mut self, id: &str, eid: u32) {
        if self.anchor_eids.contains_key(id) {
            log::warn!("duplicate anchor id {id:?} ignored");
            return;
        }
        self.anchor_eids.insert(id.to_string(), eid);
    }

    fn resource_for(&mut self, image_id: &str) -> String {
        if let Some(r) = self.resources.iter().find(|r| r.image_id == image_id) {
            return r.name.clone();
        }
        let name = format!("rsrc{}", self.resources.len() + 1);
        self.resources.push(Resource {
            name: name.clone(),
            image_id: image_id.to_string(),
        });
        name
    }

    fn external_anchor(&mut self, url: &str) -> String {
        if let Some((_, name)) = self.external.iter().find(|(u, _)| u == url) {
            return name.clone();
        }
        let mut n = self.external.len() + 1;
        let mut name = format!("ext{n}");
        while self.element_ids.contains(name.as_str()) || self.external.iter().any(|(_, taken)| *taken == name) {
            n += 1;
            name = format!("ext{n}");
        }
        self.external.push((url.to_string(), name.clone()));
        name
    }

    fn section(&mut self, b: &mut StorylineBuilder<'_, '_>, section: &'d Section) -> Vec<Heading> {
        let mut headings = Vec::new();
        let mut context = Vec::new();
        if let Some(class) = &section.class {
            b.start_block(Some(class));
            context.push(class.clone());
        }
        self.blocks(b, &section.blocks, &context, &mut headings);
        if section.class.is_some() {
            b.end_block();
        }
        headings
    }

    fn blocks(
        &mut self,
        b: &mut StorylineBuilder<'_, '_>,
        blocks: &'d [Block],
        context: &[String],
        headings: &mut Vec<Heading>,
    ) {
        for block in blocks {
            self.block(b, block, context, headings);
        }
    }

    fn block(
        &mut self,
        b: &mut StorylineBuilder<'_, '_>,
        block: &'d Block,
        context: &[String],
        headings: &mut Vec<Heading>,
    ) {
        let eid = match block {
            Block::Paragraph { class, content, .. } => {
                let spec = style_spec(context, "p", class.as_deref());
                self.paragraph(b, content, &spec, None)
            }
            Block::Heading {
                level,
                class,
                content,
                ..
            } => {
                let level = (*level).clamp(1, 6);
                let spec = style_spec(context, &format!("h{level}"), class.as_deref());
                let eid = self.paragraph(b, content, &spec, Some(level));
                if let Some(eid) = eid {
                    let title: String = content.iter().map(Inline::plain_text).collect();
                    headings.push(Heading {
                        level,
                        title: title.trim().to_string(),
                        eid,
                    });
                }
                eid
            }
            Block::Image { image, alt, .. } => self.block_image(b, image, alt),
            Block::Container { class, blocks, .. } => {
                let spec = class.as_deref().map(|c| style_spec(context, "div", Some(c)));
                b.start_block(spec.as_deref());
                let mut inner = context.to_vec();
                inner.extend(class.iter().cloned());
                self.blocks(b, blocks, &inner, headings);
                b.end_block()
            }
            Block::Table { class, rows, .. } => Some(self.table(b, rows, context, class.as_deref())),
            Block::Footnote { id, blocks } => {
                self.footnotes.push((id.as_str(), blocks.as_slice()));
                return;
            }
            Block::EmptyLine => {
                let margin = b
                    .styles()
                    .flatten("emptyline")
                    .get(&sym::MARGIN_TOP)
                    .and_then(Measure::from_ion)
                    .map_or(1.0, |m| m.value);
                b.add_empty_line(empty_line_margin(margin));
                return;
            }
        };

        if let (Some(id), Some(eid)) = (block.id(), eid) {
            self.register_anchor(id, eid);
        }
    }

    fn block_image(&mut self, b: &mut StorylineBuilder<'_, '_>, image_id: &str, alt: &str) -> Option<u32> {
        let Some(image) = self.doc.image(image_id) else {
            log::warn!("image {image_id:?} not found, skipped");
            return None;
        };
        let resource = self.resource_for(image_id);
        let style = b.styles().block_image_style(nonzero(image.width));
        Some(b.add_image(&resource, EntryStyle::Resolved(style), alt))
    }

    fn paragraph(
        &mut self,
        b: &mut StorylineBuilder<'_, '_>,
        content: &'d [Inline],
        spec: &str,
        heading_level: Option<u8>,
    ) -> Option<u32> {
        let mut run = InlineRun::default();
        for inline in content {
            self.inline(b, inline, &mut Vec::new(), &mut run);
        }
        let events = self.finish_events(b, &run.events);

        if run.has_image() && !run.has_text() && heading_level.is_none() {
            // Image-only paragraphs place their images as blocks.
            let mut first = None;
            for item in run.items {
                if let InlineItem::Image { resource, alt, .. } = item {
                    let image_id = self
                        .resources
                        .iter()
                        .find(|r| r.name == resource)
                        .map(|r| r.image_id.clone());
                    let width = image_id
                        .as_deref()
                        .and_then(|id| self.doc.image(id))
                        .and_then(|img| nonzero(img.width));
                    let style = b.styles().block_image_style(width);
                    let eid = b.add_image(&resource, EntryStyle::Resolved(style), &alt);
                    first.get_or_insert(eid);
                }
            }
            return first;
        }

        let style = EntryStyle::Deferred(spec.to_string());
        if run.has_image() {
            return Some(b.add_mixed_content(run.items, style, events, heading_level));
        }

        let content = self.content.add(&run.text());
        Some(match heading_level {
            Some(level) => b.add_heading(content, style, events, level),
            None => b.add_content_with_events(ContentKind::Text, content, style, events),
        })
    }

    fn inline(
        &mut self,
        b: &mut StorylineBuilder<'_, '_>,
        inline: &'d Inline,
        stack: &mut Vec<InlineFrame>,
        run: &mut InlineRun,
    ) {
        let (frame, children) = match inline {
            Inline::Text { text } => {
                run.push_text(text);
                return;
            }
            Inline::Image { image, alt } => {
                let Some(asset) = self.doc.image(image) else {
                    log::warn!("inline image {image:?} not found, skipped");
                    return;
                };
                let resource = self.resource_for(image);
                let style = b
                    .styles()
                    .inline_image_style(nonzero(asset.width), nonzero(asset.height));
                run.items.push(InlineItem::Image {
                    resource,
                    style: Some(style),
                    alt: alt.clone(),
                });
                run.runes += 1;
                return;
            }
            Inline::Styled { class, children } => {
                let inherited = stack.iter().rev().find(|f| f.link_to.is_some());
                let frame = InlineFrame {
                    class: class.clone(),
                    link_to: inherited.and_then(|f| f.link_to.clone()),
                    footnote: inherited.is_some_and(|f| f.footnote),
                };
                (frame, children)
            }
            Inline::Link { href, note, children } => {
                let frame = match href.strip_prefix('#') {
                    Some(target) => {
                        let footnote = *note || self.footnote_ids.contains(target);
                        if !self.referenced.iter().any(|r| r == target) {
                            self.referenced.push(target.to_string());
                        }
                        InlineFrame {
                            class: if footnote { "link-footnote" } else { "link-internal" }.to_string(),
                            link_to: Some(target.to_string()),
                            footnote,
                        }
                    }
                    None => InlineFrame {
                        class: "link-external".to_string(),
                        link_to: Some(self.external_anchor(href)),
                        footnote: false,
                    },
                };
                (frame, children)
            }
        };

        let start = run.runes;
        stack.push(frame);
        for child in children {
            self.inline(b, child, stack, run);
        }
        let Some(frame) = stack.pop() else {
            return;
        };
        if run.runes == start {
            return;
        }

        let spec = stack
            .iter()
            .map(|f| f.class.as_str())
            .chain(std::iter::once(frame.class.as_str()))
            .collect::<Vec<_>>()
            .join(" ");
        let style = b.styles().resolve_inline_no_mark(&spec);
        run.events.push(StyleEvent {
            offset: start,
            length: run.runes - start,
            style,
            link_to: frame.link_to,
            footnote: frame.footnote,
        });
    }

    /// Segment nested events and mark the styles that survive.
    fn finish_events(&mut self, b: &mut StorylineBuilder<'_, '_>, events: &[StyleEvent]) -> Vec<StyleEvent> {
        let mut events = events.to_vec();
        events.sort_by_key(|e| e.offset);
        let segmented = segment_style_events(&events);
        for event in &segmented {
            if let Some(style) = &event.style {
                b.styles().mark_usage(style, StyleUsage::INLINE);
            }
        }
        segmented
    }

    fn table(
        &mut self,
        b: &mut StorylineBuilder<'_, '_>,
        rows: &'d [TableRow],
        context: &[String],
        class: Option<&str>,
    ) -> u32 {
        let properties = b.styles().table_element_properties();
        let mut inputs = Vec::with_capacity(rows.len());
        for row in rows {
            let mut cells = Vec::with_capacity(row.cells.len());
            for cell in &row.cells {
                let tag = if cell.header { "th" } else { "td" };
                let mut run = InlineRun::default();
                for inline in &cell.content {
                    self.inline(b, inline, &mut Vec::new(), &mut run);
                }
                if run.has_image() {
                    log::warn!("images inside table cells are not supported, dropped");
                }
                let events = self.finish_events(b, &run.events);
                let spec = style_spec(&[], tag, cell.class.as_deref());
                let text = run.text();
                cells.push(TableCellInput {
                    content: (!text.is_empty()).then(|| self.content.add(&text)),
                    style: b.styles().resolve_no_mark(&spec, ElementPosition::standalone()),
                    events,
                    colspan: cell.colspan,
                    rowspan: cell.rowspan,
                });
            }
            inputs.push(cells);
        }
        let spec = style_spec(context, "table", class);
        b.add_table(EntryStyle::Deferred(spec), properties, inputs)
    }

    fn finish(
        self,
        mut storylines: Vec<Storyline>,
        toc: Vec<NavPoint>,
        cover: Option<(String, u32)>,
        start_eid: Option<u32>,
    ) -> Assembly {
        let mut anchors = Vec::new();
        for target in &self.referenced {
            match self.anchor_eids.get(target) {
                Some(&eid) => anchors.push(Anchor {
                    name: target.clone(),
                    target: AnchorTarget::Position(eid),
                }),
                None => log::warn!("link target {target:?} not found, link dropped"),
            }
        }
        for (url, name) in &self.external {
            anchors.push(Anchor {
                name: name.clone(),
                target: AnchorTarget::Uri(url.clone()),
            });
        }

        let known: HashSet<&str> = anchors.iter().map(|a| a.name.as_str()).collect();
        for storyline in &mut storylines {
            for entry in &mut storyline.entries {
                drop_dangling_links(entry, &known);
            }
        }

        Assembly {
            storylines,
            content: self.content,
            anchors,
            resources: self.resources,
            toc,
            cover,
            start_eid,
        }
    }
}

fn collect_ids<'d>(blocks: &'d [Block], footnotes: &mut HashSet<&'d str>, ids: &mut HashSet<&'d str>) {
    for block in blocks {
        ids.extend(block.id());
        match block {
            Block::Footnote { id, blocks } => {
                footnotes.insert(id.as_str());
                collect_ids(blocks, footnotes, ids);
            }
            Block::Container { blocks, .. } => collect_ids(blocks, footnotes, ids),
            _ => {}
        }
    }
}

fn drop_dangling_links(entry: &mut ContentEntry, known: &HashSet<&str>) {
    for event in &mut entry.events {
        if event.link_to.as_deref().is_some_and(|t| !known.contains(t)) {
            event.link_to = None;
            event.footnote = false;
        }
    }
    for child in &mut entry.children {
        drop_dangling_links(child, known);
    }
}

/// Space-separated style spec: enclosing classes, element tag, own class.
fn style_spec(context: &[String], tag: &str, class: Option<&str>) -> String {
    context
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(tag))
        .chain(class.into_iter().flat_map(str::split_whitespace))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Nest headings by level under an optional section title.
fn section_toc(title: Option<&str>, first_eid: u32, headings: Vec<Heading>) -> Vec<NavPoint> {
    let nested = nest_headings(headings);
    match title {
        Some(title) if !title.trim().is_empty() => vec![NavPoint {
            title: title.trim().to_string(),
            eid: first_eid,
            children: nested,
        }],
        _ => nested,
    }
}

fn nest_headings(headings: Vec<Heading>) -> Vec<NavPoint> {
    // Open path of (level, point); popped into its parent when closed.
    let mut roots: Vec<NavPoint> = Vec::new();
    let mut open: Vec<(u8, NavPoint)> = Vec::new();

    fn close(open: &mut Vec<(u8, NavPoint)>, roots: &mut Vec<NavPoint>) {
        if let Some((_, point)) = open.pop() {
            match open.last_mut() {
                Some((_, parent)) => parent.children.push(point),
                None => roots.push(point),
            }
        }
    }

    for heading in headings.into_iter().filter(|h| !h.title.is_empty()) {
        while open.last().is_some_and(|(level, _)| *level >= heading.level) {
            close(&mut open, &mut roots);
        }
        open.push((
            heading.level,
            NavPoint {
                title: heading.title,
                eid: heading.eid,
                children: Vec::new(),
            },
        ));
    }
    while !open.is_empty() {
        close(&mut open, &mut roots);
    }
    roots
}
