//! Style registry: named CSS styles, position-aware resolution and
//! deduplication into `$157` fragments.
//!
//! Stylesheet rules are registered under their selector's style name.
//! Content asks for a *style spec* (`"p epigraph epigraph-text"`), which is
//! resolved into a flat property map, coupled (font-size/line-height),
//! deduplicated by value and stored under a generated name (`s1J`, `s1K`...).
//! Only styles with recorded usage reach the output.

use std::collections::{HashMap, HashSet};

use crate::kfx::fragment::Fragment;
use crate::kfx::ion::{Decimal, IonValue};
use crate::kfx::symbols::{LocalSymbols, name_of, sym};

use super::css::Stylesheet;
use super::mapping::{DefaultMappingTable, IgnorableTable, convert_declarations};
use super::merge::{MergeContext, MergeRuleTable, merge_all, merge_all_override, merge_property};
use super::units::{self, Measure};
use super::{ElementPosition, PropertyMap, StyleDef, StyleUsage};

/// Base every resolved style starts from.
pub const BASE_STYLE: &str = "kfx-unknown";

/// Structural wrappers whose margins belong to the wrapper, not its children.
const CONTAINER_CLASSES: &[&str] = &[
    "section",
    "cite",
    "epigraph",
    "poem",
    "stanza",
    "annotation",
    "blockquote",
];

/// Block wrapper names that never inherit from anything.
const BLOCK_STYLE_NAMES: &[&str] = &[
    "section",
    "cite",
    "epigraph",
    "poem",
    "stanza",
    "annotation",
    "blockquote",
    "footnote",
    "image",
    "emptyline",
    "table",
    "tr",
    "td",
    "th",
    "body-title",
    "chapter-title",
    "section-title",
];

/// Suffixes that inherit from a shorter style name.
const INHERITING_SUFFIXES: &[&str] = &["-subtitle", "-first", "-next", "-break"];

const MARGINS: [u32; 4] = [sym::MARGIN_TOP, sym::MARGIN_BOTTOM, sym::MARGIN_LEFT, sym::MARGIN_RIGHT];

const HORIZONTAL_MARGINS: [u32; 2] = [sym::MARGIN_LEFT, sym::MARGIN_RIGHT];

/// Element tags content emits; parts after the tag are the element's own
/// classes.
const ELEMENT_TAGS: &[&str] = &[
    "p", "div", "span", "h1", "h2", "h3", "h4", "h5", "h6", "table", "tr", "td", "th",
];

const VERTICAL_SPACING: [u32; 4] = [sym::MARGIN_TOP, sym::MARGIN_BOTTOM, sym::PADDING_TOP, sym::PADDING_BOTTOM];

/// Properties that live on a table element rather than in its style.
const TABLE_ELEMENT_PROPERTIES: [u32; 3] = [
    sym::TABLE_BORDER_COLLAPSE,
    sym::BORDER_SPACING_HORIZONTAL,
    sym::BORDER_SPACING_VERTICAL,
];

/// First generated name is `s1J` (base-36 55).
const FIRST_GENERATED_INDEX: u32 = 55;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResolveKey {
    spec: String,
    position: ElementPosition,
    inline: bool,
}

/// Owns every style of one document and its usage.
#[derive(Debug)]
pub struct StyleRegistry<'a> {
    rules: &'a MergeRuleTable,
    defaults: &'a DefaultMappingTable,
    ignorable: &'a IgnorableTable,
    styles: HashMap<String, StyleDef>,
    /// Registration order; output follows it.
    order: Vec<String>,
    /// Signature -> generated name.
    by_signature: HashMap<String, String>,
    resolved: HashMap<ResolveKey, String>,
    usage: HashMap<String, StyleUsage>,
    next_index: u32,
}

impl<'a> StyleRegistry<'a> {
    pub fn new(
        rules: &'a MergeRuleTable,
        defaults: &'a DefaultMappingTable,
        ignorable: &'a IgnorableTable,
    ) -> Self {
        let mut registry = Self {
            rules,
            defaults,
            ignorable,
            styles: HashMap::new(),
            order: Vec::new(),
            by_signature: HashMap::new(),
            resolved: HashMap::new(),
            usage: HashMap::new(),
            next_index: FIRST_GENERATED_INDEX,
        };
        registry.register(
            StyleDef::new(BASE_STYLE).with_property(sym::LINE_HEIGHT, Measure::lh(1.0)),
        );
        registry
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Add a style. A same-named style is merged with override semantics.
    pub fn register(&mut self, def: StyleDef) {
        self.resolved.clear();
        match self.styles.get_mut(&def.name) {
            Some(existing) => {
                merge_all_override(&mut existing.properties, &def.properties);
                if def.parent.is_some() {
                    existing.parent = def.parent;
                }
                log::trace!("style {} merged", existing.name);
            }
            None => {
                log::trace!("style {} registered", def.name);
                self.order.push(def.name.clone());
                self.styles.insert(def.name.clone(), def);
            }
        }
    }

    /// Register every supported selector of a stylesheet.
    pub fn register_stylesheet(&mut self, stylesheet: &Stylesheet) {
        for rule in &stylesheet.rules {
            for selector in &rule.selectors {
                let Some(name) = selector.style_name() else {
                    continue;
                };
                let tag = selector.element_tag();
                let declarations = match tag {
                    Some(tag) => self.defaults.apply(tag, &[], &rule.declarations),
                    None => rule.declarations.clone(),
                };
                let properties = convert_declarations(tag.unwrap_or("*"), &declarations, self.ignorable);
                let mut def = StyleDef::new(name);
                def.properties = properties;
                def.parent = selector.parent_name().map(str::to_string);
                self.register(def);
            }
        }
    }

    /// Parse and register stylesheet text.
    pub fn register_css(&mut self, css: &str) {
        self.register_stylesheet(&Stylesheet::parse(css));
    }

    /// Create a missing style from element defaults and an inferred parent.
    fn ensure_style(&mut self, name: &str) {
        if self.styles.contains_key(name) {
            return;
        }
        let parent = self.infer_parent(name);
        log::debug!("auto-creating style {name} (parent {parent:?})");
        let mut def = StyleDef::new(name);
        if self.defaults.has_defaults(name) {
            let declarations = self.defaults.apply(name, &[], &[]);
            def.properties = convert_declarations(name, &declarations, self.ignorable);
        }
        def.parent = parent;
        self.register(def);
    }

    fn infer_parent(&self, name: &str) -> Option<String> {
        if BLOCK_STYLE_NAMES.contains(&name) || self.defaults.has_defaults(name) {
            return None;
        }
        for suffix in INHERITING_SUFFIXES {
            let Some(stem) = name.strip_suffix(suffix) else {
                continue;
            };
            if stem.is_empty() {
                continue;
            }
            if self.styles.contains_key(stem) {
                return Some(stem.to_string());
            }
            let base = &suffix[1..];
            if self.styles.contains_key(base) {
                return Some(base.to_string());
            }
        }
        Some(BASE_STYLE.to_string())
    }

    pub fn get(&self, name: &str) -> Option<&StyleDef> {
        self.styles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.styles.contains_key(name)
    }

    /// Style names in registration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Properties of `name` with its inheritance chain flattened.
    ///
    /// Cycles and missing parents end the chain.
    pub fn flatten(&self, name: &str) -> PropertyMap {
        self.flatten_chain(name, false)
    }

    /// Like [`flatten`](Self::flatten) but without the base style, which
    /// every resolution starts from anyway.
    fn own_properties(&self, name: &str) -> PropertyMap {
        self.flatten_chain(name, name != BASE_STYLE)
    }

    fn flatten_chain(&self, name: &str, skip_base: bool) -> PropertyMap {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = self.styles.get(name);
        while let Some(def) = current {
            if !visited.insert(def.name.as_str()) || (skip_base && def.name == BASE_STYLE) {
                break;
            }
            chain.push(def);
            current = def.parent.as_deref().and_then(|parent| self.styles.get(parent));
        }
        let mut merged = PropertyMap::new();
        for def in chain.iter().rev() {
            merge_all_override(&mut merged, &def.properties);
        }
        merged
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Resolve a style spec at a position, mark its usage and return the
    /// generated name. `None` for an empty spec.
    pub fn resolve(&mut self, spec: &str, position: ElementPosition, usage: StyleUsage) -> Option<String> {
        let name = self.resolve_no_mark(spec, position)?;
        self.mark_usage(&name, usage);
        Some(name)
    }

    /// Resolve without recording usage.
    pub fn resolve_no_mark(&mut self, spec: &str, position: ElementPosition) -> Option<String> {
        let key = ResolveKey {
            spec: spec.to_string(),
            position,
            inline: false,
        };
        if let Some(name) = self.resolved.get(&key) {
            return Some(name.clone());
        }

        let properties = self.resolve_properties(spec, position)?;
        let name = self.register_resolved(properties);
        log::debug!("resolved {spec:?} at {position:?} -> {name}");
        self.resolved.insert(key, name.clone());
        Some(name)
    }

    /// Resolve nested inline span classes, outermost first, without
    /// recording usage.
    pub fn resolve_inline_no_mark(&mut self, spec: &str) -> Option<String> {
        let key = ResolveKey {
            spec: spec.to_string(),
            position: ElementPosition::standalone(),
            inline: true,
        };
        if let Some(name) = self.resolved.get(&key) {
            return Some(name.clone());
        }

        let properties = self.inline_properties(spec)?;
        let name = self.register_resolved(properties);
        log::debug!("resolved inline {spec:?} -> {name}");
        self.resolved.insert(key, name.clone());
        Some(name)
    }

    /// Every span merges through the inline context: vertical margins keep
    /// the larger value, padding accumulates.
    pub fn inline_properties(&mut self, spec: &str) -> Option<PropertyMap> {
        let parts: Vec<&str> = spec.split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }
        let mut merged = self.flatten(BASE_STYLE);
        let mut explicit_line_height = false;
        for part in parts {
            self.ensure_style(part);
            let properties = self.own_properties(part);
            explicit_line_height |= properties.contains_key(&sym::LINE_HEIGHT);
            merge_all(&mut merged, &properties, MergeContext::INLINE, self.rules);
        }
        em_font_size_to_rem(&mut merged);
        couple_line_height(&mut merged, explicit_line_height);
        Some(merged)
    }

    /// Merged, coupled and position-filtered properties for a spec.
    ///
    /// Horizontal margins of the element's own classes (parts after its tag)
    /// accumulate onto the margins the element itself set; a class already
    /// seen earlier in the spec contributes none.
    pub fn resolve_properties(&mut self, spec: &str, position: ElementPosition) -> Option<PropertyMap> {
        let parts: Vec<&str> = spec.split_whitespace().collect();
        let (&head, _) = parts.split_first()?;

        let mut merged = self.flatten(BASE_STYLE);
        let mut fallback_margins = PropertyMap::new();
        let mut explicit_line_height = false;
        let last = parts.len() - 1;
        let tag_index = parts.iter().rposition(|part| ELEMENT_TAGS.contains(part));
        let mut element_margins: HashSet<u32> = HashSet::new();

        for (i, &part) in parts.iter().enumerate() {
            self.ensure_style(part);
            let properties = self.own_properties(part);
            explicit_line_height |= properties.contains_key(&sym::LINE_HEIGHT);
            let container = CONTAINER_CLASSES.contains(&part);

            if i == 0 && container {
                merge_all(&mut merged, &properties, MergeContext::WRAPPER, self.rules);
            } else if i > 0 && container {
                for (symbol, value) in properties.iter().filter(|(s, _)| !MARGINS.contains(s)) {
                    merge_property(&mut merged, *symbol, value, MergeContext::CONTAINER, self.rules);
                }
            } else if i > 0 && i < last {
                for (symbol, value) in &properties {
                    let target = if MARGINS.contains(symbol) {
                        &mut fallback_margins
                    } else {
                        &mut merged
                    };
                    merge_property(target, *symbol, value, MergeContext::CLASS_OVERRIDE, self.rules);
                }
            } else {
                let own_class = tag_index.is_some_and(|tag| i > tag);
                let repeated = parts[..i].contains(&part);
                for (symbol, value) in &properties {
                    let horizontal = HORIZONTAL_MARGINS.contains(symbol);
                    if horizontal && own_class && repeated {
                        continue;
                    }
                    let ctx = if horizontal && own_class && element_margins.contains(symbol) {
                        MergeContext::INLINE.in_same_container()
                    } else {
                        MergeContext::CLASS_OVERRIDE
                    };
                    merge_property(&mut merged, *symbol, value, ctx, self.rules);
                    if horizontal && tag_index.is_some_and(|tag| i >= tag) {
                        element_margins.insert(*symbol);
                    }
                }
            }
        }

        for (symbol, value) in fallback_margins {
            merged.entry(symbol).or_insert(value);
        }

        if head == "table" {
            for symbol in TABLE_ELEMENT_PROPERTIES {
                merged.remove(&symbol);
            }
        }

        em_font_size_to_rem(&mut merged);
        couple_line_height(&mut merged, explicit_line_height);
        filter_by_position(&mut merged, position);
        Some(merged)
    }

    /// Store a resolved property map under a generated name, reusing the
    /// name of a structurally identical map.
    pub fn register_resolved(&mut self, properties: PropertyMap) -> String {
        let signature = signature(&properties);
        if let Some(name) = self.by_signature.get(&signature) {
            return name.clone();
        }
        let name = format!("s{}", to_base36(self.next_index));
        self.next_index += 1;
        self.by_signature.insert(signature, name.clone());
        let mut def = StyleDef::new(name.clone());
        def.properties = properties;
        self.register(def);
        name
    }

    /// Record that content references `name` as `usage`.
    pub fn mark_usage(&mut self, name: &str, usage: StyleUsage) {
        *self.usage.entry(name.to_string()).or_default() |= usage;
    }

    pub fn usage(&self, name: &str) -> StyleUsage {
        self.usage.get(name).copied().unwrap_or_default()
    }

    /// Clone `name` into a variant with adjusted properties.
    ///
    /// The variant is deduplicated like any resolved style; usage is not
    /// copied from `name`.
    pub fn derive_variant(&mut self, name: &str, adjust: impl FnOnce(&mut PropertyMap)) -> String {
        let mut properties = self.flatten(name);
        adjust(&mut properties);
        self.register_resolved(properties)
    }

    /// Drop usage of styles no fragment references any more.
    pub fn retain_referenced(&mut self, referenced: &HashSet<String>) {
        self.usage.retain(|name, _| referenced.contains(name));
    }

    /// Table properties moved from the `table` style onto the table element.
    pub fn table_element_properties(&mut self) -> PropertyMap {
        self.ensure_style("table");
        let mut properties = self.flatten("table");
        properties.retain(|symbol, _| TABLE_ELEMENT_PROPERTIES.contains(symbol));
        properties
    }

    // ------------------------------------------------------------------
    // Image styles
    // ------------------------------------------------------------------

    /// Block image: centered, bounded by content, width as percent of the
    /// reference width (100% when unknown).
    pub fn block_image_style(&mut self, width_px: Option<u32>) -> String {
        let width = width_px.map_or(100.0, |w| units::image_width_percent(f64::from(w)));
        let mut properties = PropertyMap::new();
        properties.insert(sym::BOX_ALIGN, IonValue::Symbol(sym::CENTER));
        properties.insert(sym::SIZING_BOUNDS, IonValue::Symbol(sym::CONTENT_BOUNDS));
        properties.insert(sym::WIDTH, Measure::percent(width).to_ion());
        let name = self.register_resolved(properties);
        self.mark_usage(&name, StyleUsage::IMAGE);
        name
    }

    /// Inline image: baseline centered, pixel size in `em`.
    pub fn inline_image_style(&mut self, width_px: Option<u32>, height_px: Option<u32>) -> String {
        let mut properties = PropertyMap::new();
        properties.insert(sym::BASELINE_STYLE, IonValue::Symbol(sym::CENTER));
        if let Some(width) = width_px {
            properties.insert(sym::WIDTH, Measure::em(f64::from(width) / units::PX_PER_EM).to_ion());
        }
        if let Some(height) = height_px {
            properties.insert(sym::HEIGHT, Measure::em(f64::from(height) / units::PX_PER_EM).to_ion());
        }
        let name = self.register_resolved(properties);
        self.mark_usage(&name, StyleUsage::IMAGE);
        name
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    /// `$157` fragments for every used style, in registration order.
    pub fn build_fragments(&self, symbols: &mut LocalSymbols) -> Vec<Fragment> {
        let mut fragments = Vec::new();
        for name in &self.order {
            let usage = self.usage(name);
            if usage.is_empty() {
                continue;
            }
            let mut properties = self.flatten(name);
            strip_zero_margins(&mut properties);
            em_font_size_to_rem(&mut properties);
            if usage.contains(StyleUsage::TEXT) {
                properties
                    .entry(sym::LINE_HEIGHT)
                    .or_insert_with(|| Measure::lh(1.0).to_ion());
            } else if !properties.contains_key(&sym::BREAK_INSIDE) {
                properties.remove(&sym::LINE_HEIGHT);
            }

            let mut fields = Vec::with_capacity(properties.len() + 1);
            fields.push((sym::STYLE_NAME, IonValue::Symbol(symbols.get_or_intern(name))));
            fields.extend(properties);
            fragments.push(Fragment::new(sym::STYLE, name.clone(), IonValue::Struct(fields)));
        }
        log::debug!("{} of {} styles used", fragments.len(), self.order.len());
        fragments
    }
}

/// Canonical text of a property map; equal maps have equal signatures.
pub fn signature(properties: &PropertyMap) -> String {
    let fields = properties.iter().map(|(k, v)| (*k, v.clone())).collect();
    IonValue::Struct(fields).to_text(&|id| name_of(id).into_owned())
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn em_font_size_to_rem(properties: &mut PropertyMap) {
    if let Some(size) = properties.get(&sym::FONT_SIZE).and_then(Measure::from_ion)
        && size.unit == sym::UNIT_EM
    {
        properties.insert(sym::FONT_SIZE, Measure::rem(size.value).to_ion());
    }
}

/// Keep absolute line spacing when font-size differs from 1rem.
///
/// Below 1rem the line-height stays 1lh and vertical spacing is divided by
/// the font size; from 1rem up the line-height becomes 1.0101lh and spacing
/// is divided by that. An explicit line-height is kept as is.
pub fn couple_line_height(properties: &mut PropertyMap, explicit_line_height: bool) {
    let Some(size) = properties.get(&sym::FONT_SIZE).and_then(Measure::from_ion) else {
        return;
    };
    if size.unit != sym::UNIT_REM || (size.value - 1.0).abs() < 1e-9 || size.value <= 0.0 {
        return;
    }

    let (line_height, divisor) = if size.value < 1.0 {
        (1.0, size.value)
    } else {
        let adjusted = units::adjusted_line_height();
        (adjusted, adjusted)
    };
    if !explicit_line_height {
        properties.insert(
            sym::LINE_HEIGHT,
            Measure {
                value: line_height,
                unit: sym::UNIT_LH,
            }
            .to_ion(),
        );
    }

    for symbol in VERTICAL_SPACING {
        if let Some(spacing) = properties.get(&symbol).and_then(Measure::from_ion)
            && spacing.unit == sym::UNIT_LH
        {
            properties.insert(symbol, Measure::lh(spacing.value / divisor).to_ion());
        }
    }
}

/// First child loses its top margin unless an empty line supplied one;
/// last child loses its bottom margin unless an empty line was seen.
fn filter_by_position(properties: &mut PropertyMap, position: ElementPosition) {
    match position.empty_line_margin {
        Some(margin) => {
            properties.insert(sym::MARGIN_TOP, Measure::lh(margin.to_f64()).to_ion());
        }
        None if position.first => {
            properties.remove(&sym::MARGIN_TOP);
        }
        None => {}
    }
    if position.last && !position.keep_margin_bottom {
        properties.remove(&sym::MARGIN_BOTTOM);
    }
}

fn strip_zero_margins(properties: &mut PropertyMap) {
    properties.retain(|symbol, value| {
        !(MARGINS.contains(symbol) && Measure::from_ion(value).is_some_and(|m| m.is_zero()))
    });
}

/// Empty-line margin as stored in an [`ElementPosition`].
pub fn empty_line_margin(lh: f64) -> Decimal {
    Decimal::from_f64(units::round_significant(lh, units::SIGNIFICANT_DIGITS))
}
