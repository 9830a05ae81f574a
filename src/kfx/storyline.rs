//! Storyline assembly.
//!
//! A [`StorylineBuilder`] collects the content entries of one section. EIDs
//! come from one document-wide [`EidCounter`]. An entry's style is either
//! resolved when the entry is added, or recorded as a [`PendingStyle`] and
//! resolved when the enclosing block closes, once every child's position in
//! the block is known.
//!
//! Text lives in `content_N` fragments built by a [`ContentAccumulator`];
//! entries only reference it by `{name, index}`.

use std::collections::HashSet;

use crate::kfx::fragment::Fragment;
use crate::kfx::ion::{Decimal, IonValue, StructBuilder};
use crate::kfx::style::units::Measure;
use crate::kfx::style::{ElementPosition, PropertyMap, StyleRegistry, StyleUsage};
use crate::kfx::symbols::{LocalSymbols, sym};

// ============================================================================
// EIDs
// ============================================================================

/// Document-wide element id allocator. EIDs are never reused.
#[derive(Debug, Clone)]
pub struct EidCounter {
    next: u32,
}

impl EidCounter {
    pub fn new(first: u32) -> Self {
        Self { next: first }
    }

    pub fn allocate(&mut self) -> u32 {
        let eid = self.next;
        self.next += 1;
        eid
    }

    /// The EID the next allocation returns.
    pub fn peek(&self) -> u32 {
        self.next
    }
}

// ============================================================================
// Content entries
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    /// Block wrapper; written as a text entry with nested content.
    Wrapper,
    /// Table cell.
    Container,
    Image,
    Table,
    TableBody,
    TableRow,
}

impl ContentKind {
    pub fn symbol(self) -> u32 {
        match self {
            ContentKind::Text | ContentKind::Wrapper => sym::TEXT,
            ContentKind::Container => sym::CONTAINER,
            ContentKind::Image => sym::IMAGE,
            ContentKind::Table => sym::TABLE,
            ContentKind::TableBody => sym::BODY,
            ContentKind::TableRow => sym::TABLE_ROW,
        }
    }

    /// Usage recorded for a style attached to this kind of entry.
    pub fn usage(self) -> StyleUsage {
        match self {
            ContentKind::Text => StyleUsage::TEXT,
            ContentKind::Image => StyleUsage::IMAGE,
            _ => StyleUsage::WRAPPER,
        }
    }

    /// Structural entries occupy one position ahead of their children.
    pub fn is_structural(self) -> bool {
        !matches!(self, ContentKind::Text | ContentKind::Image)
    }
}

/// Reference into a `content_N` fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRef {
    pub name: String,
    pub index: usize,
    /// Character count of the referenced text.
    pub runes: usize,
}

impl ContentRef {
    fn to_ion(&self, symbols: &mut LocalSymbols) -> IonValue {
        StructBuilder::new()
            .symbol(sym::NAME, symbols.get_or_intern(&self.name))
            .int(sym::INDEX, self.index as i64)
            .build()
    }
}

/// A ranged inline style (`$142` entry).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleEvent {
    pub offset: usize,
    pub length: usize,
    pub style: Option<String>,
    /// Anchor name the range links to.
    pub link_to: Option<String>,
    /// Footnote reference (`yj.display: yj.note`).
    pub footnote: bool,
}

impl StyleEvent {
    pub fn styled(offset: usize, length: usize, style: impl Into<String>) -> Self {
        Self {
            offset,
            length,
            style: Some(style.into()),
            ..Self::default()
        }
    }

    fn end(&self) -> usize {
        self.offset + self.length
    }

    fn to_ion(&self, symbols: &mut LocalSymbols) -> IonValue {
        let mut event = StructBuilder::new()
            .int(sym::OFFSET, self.offset as i64)
            .int(sym::LENGTH, self.length as i64);
        if let Some(style) = &self.style {
            event = event.symbol(sym::STYLE, symbols.get_or_intern(style));
        }
        if let Some(target) = &self.link_to {
            event = event.symbol(sym::LINK_TO, symbols.get_or_intern(target));
        }
        if self.footnote {
            event = event.symbol(sym::YJ_DISPLAY, sym::YJ_NOTE);
        }
        event.build()
    }
}

/// Turn possibly nested events into non-overlapping ones.
///
/// Every segment between two event boundaries takes the innermost (shortest)
/// event covering it; ties prefer a link, then the longer style name. Gaps
/// stay without an event and adjacent equal segments are joined.
pub fn segment_style_events(events: &[StyleEvent]) -> Vec<StyleEvent> {
    let events: Vec<&StyleEvent> = events.iter().filter(|e| e.length > 0).collect();
    if events.len() <= 1 {
        return events.into_iter().cloned().collect();
    }

    let mut points: Vec<usize> = events
        .iter()
        .flat_map(|e| [e.offset, e.end()])
        .collect();
    points.sort_unstable();
    points.dedup();

    let mut result: Vec<StyleEvent> = Vec::new();
    for window in points.windows(2) {
        let (start, end) = (window[0], window[1]);
        let best = events
            .iter()
            .filter(|e| e.offset <= start && e.end() >= end)
            .min_by(|a, b| {
                a.length
                    .cmp(&b.length)
                    .then_with(|| b.link_to.is_some().cmp(&a.link_to.is_some()))
                    .then_with(|| style_len(b).cmp(&style_len(a)))
            });
        let Some(best) = best else {
            continue;
        };

        if let Some(prev) = result.last_mut()
            && prev.end() == start
            && prev.style == best.style
            && prev.link_to == best.link_to
            && prev.footnote == best.footnote
        {
            prev.length += end - start;
            continue;
        }
        result.push(StyleEvent {
            offset: start,
            length: end - start,
            ..(*best).clone()
        });
    }
    result
}

fn style_len(event: &StyleEvent) -> usize {
    event.style.as_deref().map_or(0, str::len)
}

/// One piece of a mixed text/image paragraph.
#[derive(Debug, Clone, PartialEq)]
pub enum MixedPiece {
    Text(String),
    Image(ContentEntry),
}

/// Input item for [`StorylineBuilder::add_mixed_content`].
#[derive(Debug, Clone, PartialEq)]
pub enum InlineItem {
    Text(String),
    Image {
        resource: String,
        style: Option<String>,
        alt: String,
    },
}

/// One element of a storyline.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentEntry {
    pub eid: u32,
    pub kind: ContentKind,
    pub style: Option<String>,
    pub events: Vec<StyleEvent>,
    pub heading_level: Option<u8>,
    /// First paragraph of a footnote body.
    pub footnote: bool,
    pub content: Option<ContentRef>,
    /// External resource name for images.
    pub resource: Option<String>,
    pub alt_text: String,
    pub render_inline: bool,
    /// Extra element properties (table layout, spans).
    pub properties: Vec<(u32, IonValue)>,
    pub mixed: Vec<MixedPiece>,
    pub children: Vec<ContentEntry>,
}

impl ContentEntry {
    pub fn new(eid: u32, kind: ContentKind) -> Self {
        Self {
            eid,
            kind,
            style: None,
            events: Vec::new(),
            heading_level: None,
            footnote: false,
            content: None,
            resource: None,
            alt_text: String::new(),
            render_inline: false,
            properties: Vec::new(),
            mixed: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn is_mixed(&self) -> bool {
        !self.mixed.is_empty()
    }

    /// Inline images of a mixed entry, in order.
    pub fn inline_images(&self) -> impl Iterator<Item = &ContentEntry> {
        self.mixed.iter().filter_map(|piece| match piece {
            MixedPiece::Image(image) => Some(image),
            MixedPiece::Text(_) => None,
        })
    }

    /// Visit this entry and everything below it in emission order.
    pub fn walk<'e>(&'e self, visit: &mut impl FnMut(&'e ContentEntry)) {
        visit(self);
        for image in self.inline_images() {
            image.walk(visit);
        }
        for child in &self.children {
            child.walk(visit);
        }
    }

    pub fn to_ion(&self, symbols: &mut LocalSymbols) -> IonValue {
        let mut entry = StructBuilder::new()
            .int(sym::ID, i64::from(self.eid))
            .symbol(sym::TYPE, self.kind.symbol());
        if let Some(style) = &self.style {
            entry = entry.symbol(sym::STYLE, symbols.get_or_intern(style));
        }
        if let Some(level) = self.heading_level {
            entry = entry.int(sym::YJ_HEADING_LEVEL, i64::from(level));
        }
        if !self.events.is_empty() {
            let events = self.events.iter().map(|e| e.to_ion(symbols)).collect();
            entry = entry.list(sym::STYLE_EVENTS, events);
        }
        if let Some(resource) = &self.resource {
            entry = entry
                .symbol(sym::RESOURCE_NAME, symbols.get_or_intern(resource))
                .string(sym::ALT_TEXT, self.alt_text.clone());
            if self.render_inline {
                entry = entry.symbol(sym::RENDER, sym::INLINE);
            }
        } else if let Some(content) = &self.content {
            entry = entry.field(sym::CONTENT, content.to_ion(symbols));
        }
        for (symbol, value) in &self.properties {
            entry = entry.field(*symbol, value.clone());
        }
        if self.is_mixed() {
            let pieces = self
                .mixed
                .iter()
                .map(|piece| match piece {
                    MixedPiece::Text(text) => IonValue::String(text.clone()),
                    MixedPiece::Image(image) => image.to_ion(symbols),
                })
                .collect();
            entry = entry.list(sym::CONTENT_LIST, pieces);
        } else if !self.children.is_empty() {
            let children = self.children.iter().map(|c| c.to_ion(symbols)).collect();
            entry = entry.list(sym::CONTENT_LIST, children);
        }
        if self.footnote {
            entry = entry
                .symbol(sym::POSITION, sym::FOOTER)
                .symbol(sym::YJ_CLASSIFICATION, sym::FOOTNOTE);
        }
        entry.build()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// How an added entry gets its style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStyle {
    Unstyled,
    /// Already resolved style name; usage is marked immediately.
    Resolved(String),
    /// Style spec resolved when the enclosing block closes.
    Deferred(String),
}

impl EntryStyle {
    pub fn resolved(name: Option<String>) -> Self {
        name.map_or(EntryStyle::Unstyled, EntryStyle::Resolved)
    }
}

/// A style request waiting for its entry's final position.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingStyle {
    /// Index of the entry in its block.
    pub entry: usize,
    pub spec: String,
    pub usage: StyleUsage,
    /// Margin of an empty line directly before the entry.
    pub empty_line_margin: Option<Decimal>,
    /// An empty line occurred earlier in the block.
    pub after_empty_line: bool,
}

/// Cell input for [`StorylineBuilder::add_table`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableCellInput {
    pub content: Option<ContentRef>,
    pub style: Option<String>,
    pub events: Vec<StyleEvent>,
    pub colspan: Option<u32>,
    pub rowspan: Option<u32>,
}

#[derive(Debug, Default)]
struct BlockFrame {
    eid: u32,
    spec: Option<String>,
    entries: Vec<ContentEntry>,
    pending: Vec<PendingStyle>,
    empty_line: Option<Decimal>,
    seen_empty_line: bool,
}

/// Builds the entries of one section's storyline.
pub struct StorylineBuilder<'b, 'r> {
    story_name: String,
    section_name: String,
    page_template_eid: u32,
    eids: &'b mut EidCounter,
    styles: &'b mut StyleRegistry<'r>,
    /// Open blocks; the first frame is the storyline itself.
    frames: Vec<BlockFrame>,
}

impl<'b, 'r> StorylineBuilder<'b, 'r> {
    /// Start a storyline; the page template takes the next EID.
    pub fn new(
        story_name: impl Into<String>,
        section_name: impl Into<String>,
        eids: &'b mut EidCounter,
        styles: &'b mut StyleRegistry<'r>,
    ) -> Self {
        let page_template_eid = eids.allocate();
        Self {
            story_name: story_name.into(),
            section_name: section_name.into(),
            page_template_eid,
            eids,
            styles,
            frames: vec![BlockFrame::default()],
        }
    }

    pub fn page_template_eid(&self) -> u32 {
        self.page_template_eid
    }

    pub fn styles(&mut self) -> &mut StyleRegistry<'r> {
        &mut *self.styles
    }

    /// Most recently added entry of the innermost open block.
    pub fn last_entry_mut(&mut self) -> Option<&mut ContentEntry> {
        self.frame_mut().entries.last_mut()
    }

    fn frame_mut(&mut self) -> &mut BlockFrame {
        // The root frame is only removed by `finish`, which consumes the builder.
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn push(&mut self, mut entry: ContentEntry, style: EntryStyle) -> u32 {
        let usage = entry.kind.usage();
        let frame = self.frame_mut();
        let empty_line = frame.empty_line.take();
        let after_empty_line = frame.seen_empty_line;
        let index = frame.entries.len();

        match style {
            EntryStyle::Unstyled => {
                if let Some(margin) = empty_line {
                    let mut properties = PropertyMap::new();
                    properties.insert(sym::MARGIN_TOP, Measure::lh(margin.to_f64()).to_ion());
                    let name = self.styles.register_resolved(properties);
                    self.styles.mark_usage(&name, usage);
                    entry.style = Some(name);
                }
            }
            EntryStyle::Resolved(name) => {
                let name = match empty_line {
                    Some(margin) => self.styles.derive_variant(&name, |p| set_lh(p, sym::MARGIN_TOP, margin)),
                    None => name,
                };
                self.styles.mark_usage(&name, usage);
                entry.style = Some(name);
            }
            EntryStyle::Deferred(spec) => {
                self.frame_mut().pending.push(PendingStyle {
                    entry: index,
                    spec,
                    usage,
                    empty_line_margin: empty_line,
                    after_empty_line,
                });
            }
        }

        let eid = entry.eid;
        self.frame_mut().entries.push(entry);
        eid
    }

    /// Add a text (or other referenced) entry.
    pub fn add_content(&mut self, kind: ContentKind, content: ContentRef, style: EntryStyle) -> u32 {
        self.add_content_with_events(kind, content, style, Vec::new())
    }

    pub fn add_content_deferred(&mut self, kind: ContentKind, content: ContentRef, spec: &str) -> u32 {
        self.add_content(kind, content, EntryStyle::Deferred(spec.to_string()))
    }

    pub fn add_content_with_events(
        &mut self,
        kind: ContentKind,
        content: ContentRef,
        style: EntryStyle,
        events: Vec<StyleEvent>,
    ) -> u32 {
        let mut entry = ContentEntry::new(self.eids.allocate(), kind);
        entry.content = Some(content);
        entry.events = events;
        self.push(entry, style)
    }

    pub fn add_heading(
        &mut self,
        content: ContentRef,
        style: EntryStyle,
        events: Vec<StyleEvent>,
        level: u8,
    ) -> u32 {
        let mut entry = ContentEntry::new(self.eids.allocate(), ContentKind::Text);
        entry.content = Some(content);
        entry.events = events;
        entry.heading_level = Some(level);
        self.push(entry, style)
    }

    /// Add a block image referencing an external resource.
    pub fn add_image(&mut self, resource: &str, style: EntryStyle, alt: &str) -> u32 {
        let mut entry = ContentEntry::new(self.eids.allocate(), ContentKind::Image);
        entry.resource = Some(resource.to_string());
        entry.alt_text = alt.to_string();
        self.push(entry, style)
    }

    pub fn add_image_deferred(&mut self, resource: &str, spec: &str, alt: &str) -> u32 {
        self.add_image(resource, EntryStyle::Deferred(spec.to_string()), alt)
    }

    /// Add one text entry mixing strings and inline images.
    ///
    /// Each image gets its own EID after the paragraph's. Event offsets are
    /// relative to the concatenated text, where an image counts as one.
    pub fn add_mixed_content(
        &mut self,
        items: Vec<InlineItem>,
        style: EntryStyle,
        events: Vec<StyleEvent>,
        heading_level: Option<u8>,
    ) -> u32 {
        let mut entry = ContentEntry::new(self.eids.allocate(), ContentKind::Text);
        for item in items {
            let piece = match item {
                InlineItem::Text(text) => MixedPiece::Text(text),
                InlineItem::Image {
                    resource,
                    style,
                    alt,
                } => {
                    let mut image = ContentEntry::new(self.eids.allocate(), ContentKind::Image);
                    image.resource = Some(resource);
                    image.alt_text = alt;
                    image.render_inline = true;
                    if let Some(name) = &style {
                        self.styles.mark_usage(name, StyleUsage::IMAGE);
                    }
                    image.style = style;
                    MixedPiece::Image(image)
                }
            };
            entry.mixed.push(piece);
        }
        entry.events = events;
        entry.heading_level = heading_level;
        self.push(entry, style)
    }

    /// Add a table: table, body, rows, cells and cell text, EIDs in that order.
    pub fn add_table(
        &mut self,
        style: EntryStyle,
        element_properties: PropertyMap,
        rows: Vec<Vec<TableCellInput>>,
    ) -> u32 {
        let mut table = ContentEntry::new(self.eids.allocate(), ContentKind::Table);
        let mut body = ContentEntry::new(self.eids.allocate(), ContentKind::TableBody);

        for row in rows {
            let mut row_entry = ContentEntry::new(self.eids.allocate(), ContentKind::TableRow);
            for cell in row {
                let mut cell_entry = ContentEntry::new(self.eids.allocate(), ContentKind::Container);
                cell_entry.properties.push((sym::LAYOUT, IonValue::Symbol(sym::VERTICAL)));
                if let Some(span) = cell.colspan.filter(|&n| n > 1) {
                    cell_entry.properties.push((sym::TABLE_COLUMN_SPAN, IonValue::Int(i64::from(span))));
                }
                if let Some(span) = cell.rowspan.filter(|&n| n > 1) {
                    cell_entry.properties.push((sym::TABLE_ROW_SPAN, IonValue::Int(i64::from(span))));
                }
                if let Some(content) = cell.content {
                    let mut text = ContentEntry::new(self.eids.allocate(), ContentKind::Text);
                    text.content = Some(content);
                    text.events = cell.events;
                    if let Some(name) = &cell.style {
                        self.styles.mark_usage(name, StyleUsage::TEXT);
                    }
                    text.style = cell.style;
                    cell_entry.children.push(text);
                }
                row_entry.children.push(cell_entry);
            }
            body.children.push(row_entry);
        }

        let mut properties = element_properties;
        properties
            .entry(sym::TABLE_BORDER_COLLAPSE)
            .or_insert(IonValue::Bool(true));
        table.properties.extend(properties);
        table.children.push(body);
        self.push(table, style)
    }

    /// Open a wrapper block. Its own style is resolved when its parent closes.
    pub fn start_block(&mut self, spec: Option<&str>) -> u32 {
        let eid = self.eids.allocate();
        self.frames.push(BlockFrame {
            eid,
            spec: spec.map(str::to_string),
            ..BlockFrame::default()
        });
        eid
    }

    /// Close the innermost block, resolving its pending child styles.
    ///
    /// Returns the block's EID, or `None` when the block was empty and dropped.
    pub fn end_block(&mut self) -> Option<u32> {
        if self.frames.len() < 2 {
            log::warn!("{}: end_block without an open block", self.story_name);
            return None;
        }
        let mut frame = self.frames.pop()?;
        if frame.entries.is_empty() {
            log::debug!("{}: dropping empty block {}", self.story_name, frame.eid);
            return None;
        }
        self.resolve_frame(&mut frame, false);

        let mut wrapper = ContentEntry::new(frame.eid, ContentKind::Wrapper);
        wrapper.children = frame.entries;
        let style = frame.spec.map_or(EntryStyle::Unstyled, EntryStyle::Deferred);
        Some(self.push(wrapper, style))
    }

    /// Record an empty-line spacer; its margin (`lh`) becomes the next
    /// entry's top margin.
    pub fn add_empty_line(&mut self, margin: Decimal) {
        let frame = self.frame_mut();
        frame.empty_line = Some(match frame.empty_line {
            Some(previous) if previous.to_f64() > margin.to_f64() => previous,
            _ => margin,
        });
        frame.seen_empty_line = true;
    }

    fn resolve_frame(&mut self, frame: &mut BlockFrame, root: bool) {
        let count = frame.entries.len();
        for pending in frame.pending.drain(..) {
            let position = if root {
                ElementPosition {
                    empty_line_margin: pending.empty_line_margin,
                    ..ElementPosition::standalone()
                }
            } else {
                ElementPosition {
                    first: pending.entry == 0,
                    last: pending.entry + 1 == count,
                    empty_line_margin: pending.empty_line_margin,
                    keep_margin_bottom: pending.after_empty_line,
                }
            };
            match self.styles.resolve(&pending.spec, position, pending.usage) {
                Some(name) => frame.entries[pending.entry].style = Some(name),
                None => log::warn!("{}: style spec {:?} did not resolve", self.story_name, pending.spec),
            }
        }

        self.adjust_image_runs(&mut frame.entries);

        if let Some(margin) = frame.empty_line.take()
            && let Some(last) = frame.entries.last_mut()
            && let Some(name) = last.style.clone()
        {
            let variant = self.styles.derive_variant(&name, |p| set_lh(p, sym::MARGIN_BOTTOM, margin));
            self.styles.mark_usage(&variant, last.kind.usage());
            last.style = Some(variant);
        }
    }

    /// Consecutive block images keep only the outer margins of the run.
    fn adjust_image_runs(&mut self, entries: &mut [ContentEntry]) {
        let mut i = 0;
        while i < entries.len() {
            if entries[i].kind != ContentKind::Image {
                i += 1;
                continue;
            }
            let start = i;
            while i < entries.len() && entries[i].kind == ContentKind::Image {
                i += 1;
            }
            let run = &mut entries[start..i];
            if run.len() < 2 {
                continue;
            }
            let last = run.len() - 1;
            for (j, image) in run.iter_mut().enumerate() {
                let Some(name) = image.style.clone() else {
                    continue;
                };
                let properties = self.styles.flatten(&name);
                let drop_top = j > 0 && properties.contains_key(&sym::MARGIN_TOP);
                let drop_bottom = j < last && properties.contains_key(&sym::MARGIN_BOTTOM);
                if !drop_top && !drop_bottom {
                    continue;
                }
                let variant = self.styles.derive_variant(&name, |p| {
                    if drop_top {
                        p.remove(&sym::MARGIN_TOP);
                    }
                    if drop_bottom {
                        p.remove(&sym::MARGIN_BOTTOM);
                    }
                });
                self.styles.mark_usage(&variant, StyleUsage::IMAGE);
                image.style = Some(variant);
            }
        }
    }

    /// Close any open blocks and resolve the storyline's own pending styles.
    pub fn finish(mut self) -> Storyline {
        while self.frames.len() > 1 {
            log::warn!("{}: closing unterminated block", self.story_name);
            self.end_block();
        }
        let mut root = self.frames.pop().unwrap_or_default();
        self.resolve_frame(&mut root, true);
        Storyline {
            story_name: self.story_name,
            section_name: self.section_name,
            page_template_eid: self.page_template_eid,
            entries: root.entries,
        }
    }
}

fn set_lh(properties: &mut PropertyMap, symbol: u32, margin: Decimal) {
    properties.insert(symbol, Measure::lh(margin.to_f64()).to_ion());
}

// ============================================================================
// Storyline
// ============================================================================

/// A finished storyline with its section.
#[derive(Debug, Clone, PartialEq)]
pub struct Storyline {
    pub story_name: String,
    pub section_name: String,
    pub page_template_eid: u32,
    pub entries: Vec<ContentEntry>,
}

impl Storyline {
    /// Visit every entry in emission order.
    pub fn walk<'e>(&'e self, mut visit: impl FnMut(&'e ContentEntry)) {
        for entry in &self.entries {
            entry.walk(&mut visit);
        }
    }

    /// Page template EID followed by every entry EID in emission order.
    pub fn eids(&self) -> Vec<u32> {
        let mut eids = vec![self.page_template_eid];
        self.walk(|entry| eids.push(entry.eid));
        eids
    }

    /// Style names referenced by entries and their style events.
    pub fn style_names(&self) -> HashSet<String> {
        let mut names = HashSet::new();
        self.walk(|entry| {
            names.extend(entry.style.iter().cloned());
            names.extend(entry.events.iter().filter_map(|e| e.style.clone()));
        });
        names
    }

    /// Resource names referenced by images.
    pub fn resources(&self) -> Vec<&str> {
        let mut resources = Vec::new();
        self.walk(|entry| {
            if let Some(resource) = entry.resource.as_deref()
                && !resources.contains(&resource)
            {
                resources.push(resource);
            }
        });
        resources
    }

    /// `$259` storyline fragment.
    pub fn storyline_fragment(&self, symbols: &mut LocalSymbols) -> Fragment {
        let entries = self.entries.iter().map(|e| e.to_ion(symbols)).collect();
        let value = StructBuilder::new()
            .symbol(sym::STORY_NAME, symbols.get_or_intern(&self.story_name))
            .list(sym::CONTENT_LIST, entries)
            .build();
        Fragment::new(sym::STORYLINE, self.story_name.clone(), value)
    }

    /// `$260` section fragment with its single page template.
    pub fn section_fragment(&self, symbols: &mut LocalSymbols) -> Fragment {
        let template = StructBuilder::new()
            .int(sym::ID, i64::from(self.page_template_eid))
            .symbol(sym::TYPE, sym::TEXT)
            .symbol(sym::STORY_NAME, symbols.get_or_intern(&self.story_name))
            .build();
        let value = StructBuilder::new()
            .symbol(sym::SECTION_NAME, symbols.get_or_intern(&self.section_name))
            .list(sym::PAGE_TEMPLATES, vec![template])
            .build();
        Fragment::new(sym::SECTION, self.section_name.clone(), value)
    }
}

// ============================================================================
// Text chunks
// ============================================================================

/// Collects paragraph text into `content_N` fragments of bounded size.
///
/// A paragraph is never split; one longer than the limit gets a chunk of its
/// own.
#[derive(Debug)]
pub struct ContentAccumulator {
    limit: usize,
    counter: usize,
    current: Vec<String>,
    current_size: usize,
    finished: Vec<(String, Vec<String>)>,
}

impl ContentAccumulator {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            counter: 1,
            current: Vec::new(),
            current_size: 0,
            finished: Vec::new(),
        }
    }

    fn current_name(&self) -> String {
        format!("content_{}", self.counter)
    }

    /// Append one paragraph and return its reference.
    pub fn add(&mut self, text: &str) -> ContentRef {
        if self.current_size > 0 && self.current_size + text.len() > self.limit {
            self.flush();
        }
        let name = self.current_name();
        let index = self.current.len();
        self.current.push(text.to_string());
        self.current_size += text.len();
        ContentRef {
            name,
            index,
            runes: text.chars().count(),
        }
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            let name = self.current_name();
            self.finished.push((name, std::mem::take(&mut self.current)));
        }
        self.counter += 1;
        self.current_size = 0;
    }

    /// Completed chunks in creation order.
    pub fn finish(mut self) -> Vec<(String, Vec<String>)> {
        if !self.current.is_empty() {
            self.flush();
        }
        self.finished
    }

    /// `$145` fragments: `{name: content_N, $146: [text...]}`.
    pub fn into_fragments(self, symbols: &mut LocalSymbols) -> Vec<Fragment> {
        self.finish()
            .into_iter()
            .map(|(name, texts)| {
                let value = StructBuilder::new()
                    .symbol(sym::NAME, symbols.get_or_intern(&name))
                    .list(sym::CONTENT_LIST, texts.into_iter().map(IonValue::String).collect())
                    .build();
                Fragment::new(sym::CONTENT, name, value)
            })
            .collect()
    }
}
