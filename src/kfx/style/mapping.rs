//! CSS declarations to KFX style properties.
//!
//! Three steps per rule:
//! 1. element defaults not covered by an explicit (or shorthand) property
//!    are prepended
//! 2. unknown properties matching an ignorable pattern are dropped quietly
//! 3. every surviving declaration is converted, shorthands expanded
//!
//! Conversion never fails the pipeline: anything that cannot be expressed is
//! logged and dropped.

use serde::{Deserialize, Serialize};

use crate::kfx::ion::IonValue;
use crate::kfx::symbols::sym;

use super::PropertyMap;
use super::css::{CssValue, Declaration, parse_declarations};
use super::units::{self, CssUnit, Length, Measure};

// ============================================================================
// Ignorable patterns
// ============================================================================

fn wildcard() -> String {
    "*".to_string()
}

/// `(tag, property, value, unit)`; `*` matches anything, a trailing `*`
/// matches a prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnorePattern {
    #[serde(default = "wildcard")]
    pub tag: String,
    pub property: String,
    #[serde(default = "wildcard")]
    pub value: String,
    #[serde(default = "wildcard")]
    pub unit: String,
}

impl IgnorePattern {
    pub fn new(tag: &str, property: &str, value: &str, unit: &str) -> Self {
        Self {
            tag: tag.to_string(),
            property: property.to_string(),
            value: value.to_string(),
            unit: unit.to_string(),
        }
    }

    fn field_matches(pattern: &str, actual: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        match pattern.strip_suffix('*') {
            Some(prefix) => actual.starts_with(prefix),
            None => pattern.eq_ignore_ascii_case(actual),
        }
    }

    pub fn matches(&self, tag: &str, decl: &Declaration) -> bool {
        let (value, unit) = value_and_unit(decl);
        Self::field_matches(&self.tag, tag)
            && Self::field_matches(&self.property, &decl.property)
            && Self::field_matches(&self.value, &value)
            && Self::field_matches(&self.unit, unit)
    }
}

/// Text of the first component and its unit, as used by pattern matching.
fn value_and_unit(decl: &Declaration) -> (String, &'static str) {
    match decl.values.first() {
        Some(CssValue::Length(len)) => (len.value.to_string(), len.unit.as_str()),
        Some(CssValue::Ident(ident)) => (ident.clone(), ""),
        Some(CssValue::Str(text)) => (text.clone(), ""),
        Some(CssValue::Other(text)) => (text.clone(), ""),
        _ => (String::new(), ""),
    }
}

/// Properties dropped silently when the converter does not know them.
#[derive(Debug, Clone)]
pub struct IgnorableTable {
    patterns: Vec<IgnorePattern>,
}

impl Default for IgnorableTable {
    fn default() -> Self {
        let properties = [
            "orphans",
            "widows",
            "cursor",
            "-webkit-*",
            "-moz-*",
            "-ms-*",
            "-o-*",
            "-epub-*",
            "adobe-*",
            "list-style*",
            "overflow*",
            "position",
            "z-index",
            "top",
            "bottom",
            "left",
            "right",
            "box-sizing",
            "box-shadow",
            "text-shadow",
            "outline*",
            "content",
            "quotes",
            "counter-*",
            "text-rendering",
            "font-feature-settings",
            "font-kerning",
            "font-display",
            "opacity",
            "transition*",
            "animation*",
            "src",
            "unicode-range",
            "word-wrap",
            "overflow-wrap",
            "word-break",
            "page",
            "size",
            "text-align-last",
            "vertical-align-last",
            "border-radius",
            "border-*-radius",
        ];
        Self {
            patterns: properties
                .iter()
                .map(|p| IgnorePattern::new("*", p, "*", "*"))
                .collect(),
        }
    }
}

impl IgnorableTable {
    pub fn extend(&mut self, patterns: impl IntoIterator<Item = IgnorePattern>) {
        self.patterns.extend(patterns);
    }

    pub fn patterns(&self) -> &[IgnorePattern] {
        &self.patterns
    }

    /// Known and shorthand properties are never ignorable.
    pub fn is_ignorable(&self, tag: &str, decl: &Declaration) -> bool {
        if is_known_property(&decl.property) {
            return false;
        }
        self.patterns.iter().any(|p| p.matches(tag, decl))
    }
}

// ============================================================================
// Default mappings
// ============================================================================

/// Element-intrinsic declarations keyed by `(tag, attribute, value, unit)`.
#[derive(Debug, Clone)]
pub struct DefaultMapping {
    pub tag: String,
    pub attribute: String,
    pub value: String,
    pub unit: String,
    pub declarations: Vec<Declaration>,
}

impl DefaultMapping {
    fn new(tag: &str, declarations: &str) -> Self {
        Self::with_attribute(tag, "*", "*", "*", declarations)
    }

    fn with_attribute(tag: &str, attribute: &str, value: &str, unit: &str, declarations: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attribute: attribute.to_string(),
            value: value.to_string(),
            unit: unit.to_string(),
            declarations: parse_declarations(declarations),
        }
    }

    fn matches(&self, tag: &str, attributes: &[(&str, &str)]) -> bool {
        if self.tag != tag {
            return false;
        }
        if self.attribute == "*" {
            return true;
        }
        attributes.iter().any(|(name, value)| {
            if !name.eq_ignore_ascii_case(&self.attribute) {
                return false;
            }
            let digits_end = value
                .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
                .unwrap_or(value.len());
            let (number, unit) = value.split_at(digits_end);
            let value_ok = self.value == "*"
                || self.value.eq_ignore_ascii_case(value)
                || self.value == number;
            let unit_ok = self.unit == "*" || self.unit.eq_ignore_ascii_case(unit);
            value_ok && unit_ok
        })
    }
}

#[derive(Debug, Clone)]
pub struct DefaultMappingTable {
    entries: Vec<DefaultMapping>,
}

impl Default for DefaultMappingTable {
    fn default() -> Self {
        use DefaultMapping as D;
        let mut entries = vec![
            D::new("p", "margin-top: 1em; margin-bottom: 1em"),
            D::new(
                "h1",
                "font-size: 2em; font-weight: bold; margin-top: 0.67em; margin-bottom: 0.67em; -kfx-layout-hints: treat_as_title",
            ),
            D::new(
                "h2",
                "font-size: 1.5em; font-weight: bold; margin-top: 0.83em; margin-bottom: 0.83em; -kfx-layout-hints: treat_as_title",
            ),
            D::new(
                "h3",
                "font-size: 1.17em; font-weight: bold; margin-top: 1em; margin-bottom: 1em; -kfx-layout-hints: treat_as_title",
            ),
            D::new(
                "h4",
                "font-weight: bold; margin-top: 1.33em; margin-bottom: 1.33em; -kfx-layout-hints: treat_as_title",
            ),
            D::new(
                "h5",
                "font-size: 0.83em; font-weight: bold; margin-top: 1.67em; margin-bottom: 1.67em; -kfx-layout-hints: treat_as_title",
            ),
            D::new(
                "h6",
                "font-size: 0.67em; font-weight: bold; margin-top: 2.33em; margin-bottom: 2.33em; -kfx-layout-hints: treat_as_title",
            ),
            D::new(
                "blockquote",
                "margin-top: 1em; margin-bottom: 1em; margin-left: 40px; margin-right: 40px",
            ),
            D::new("th", "font-weight: bold; text-align: center"),
            D::new("center", "text-align: center"),
            D::new("small", "font-size: smaller"),
            D::new("big", "font-size: larger"),
            D::new("sup", "vertical-align: super"),
            D::new("sub", "vertical-align: sub"),
            D::new("u", "text-decoration: underline"),
            D::with_attribute("td", "align", "center", "*", "text-align: center"),
            D::with_attribute("td", "align", "right", "*", "text-align: right"),
            D::with_attribute("th", "align", "left", "*", "text-align: left"),
        ];
        for tag in ["b", "strong"] {
            entries.push(D::new(tag, "font-weight: bold"));
        }
        for tag in ["i", "em", "emphasis", "cite", "var", "dfn"] {
            entries.push(D::new(tag, "font-style: italic"));
        }
        for tag in ["code", "pre", "tt", "kbd", "samp"] {
            entries.push(D::new(tag, "font-family: monospace"));
        }
        for tag in ["s", "strike", "del", "strikethrough"] {
            entries.push(D::new(tag, "text-decoration: line-through"));
        }
        Self { entries }
    }
}

impl DefaultMappingTable {
    /// Whether any default exists for `tag`.
    pub fn has_defaults(&self, tag: &str) -> bool {
        self.entries.iter().any(|e| e.tag == tag)
    }

    /// Defaults for an element, in table order.
    pub fn defaults_for(&self, tag: &str, attributes: &[(&str, &str)]) -> Vec<&Declaration> {
        self.entries
            .iter()
            .filter(|e| e.matches(tag, attributes))
            .flat_map(|e| e.declarations.iter())
            .collect()
    }

    /// Prepend defaults not covered by any explicit declaration.
    pub fn apply(&self, tag: &str, attributes: &[(&str, &str)], explicit: &[Declaration]) -> Vec<Declaration> {
        let mut out: Vec<Declaration> = self
            .defaults_for(tag, attributes)
            .into_iter()
            .filter(|default| {
                !explicit
                    .iter()
                    .any(|decl| covers(&decl.property, &default.property))
            })
            .cloned()
            .collect();
        out.extend(explicit.iter().cloned());
        out
    }
}

/// Longhands a shorthand expands to.
fn expansions(property: &str) -> &'static [&'static str] {
    match property {
        "margin" => &["margin-top", "margin-right", "margin-bottom", "margin-left"],
        "padding" => &["padding-top", "padding-right", "padding-bottom", "padding-left"],
        "border" => &[
            "border-top",
            "border-right",
            "border-bottom",
            "border-left",
            "border-width",
            "border-style",
            "border-color",
            "border-top-width",
            "border-right-width",
            "border-bottom-width",
            "border-left-width",
            "border-top-style",
            "border-right-style",
            "border-bottom-style",
            "border-left-style",
            "border-top-color",
            "border-right-color",
            "border-bottom-color",
            "border-left-color",
        ],
        "border-top" => &["border-top-width", "border-top-style", "border-top-color"],
        "border-right" => &["border-right-width", "border-right-style", "border-right-color"],
        "border-bottom" => &["border-bottom-width", "border-bottom-style", "border-bottom-color"],
        "border-left" => &["border-left-width", "border-left-style", "border-left-color"],
        "border-width" => &[
            "border-top-width",
            "border-right-width",
            "border-bottom-width",
            "border-left-width",
        ],
        "border-style" => &[
            "border-top-style",
            "border-right-style",
            "border-bottom-style",
            "border-left-style",
        ],
        "border-color" => &[
            "border-top-color",
            "border-right-color",
            "border-bottom-color",
            "border-left-color",
        ],
        "background" => &["background-color"],
        "text-decoration" => &["text-decoration-line"],
        "font" => &["font-style", "font-variant", "font-weight", "font-size", "line-height", "font-family"],
        "page-break-before" => &["break-before"],
        "page-break-after" => &["break-after"],
        "page-break-inside" => &["break-inside"],
        "break-before" => &["page-break-before"],
        "break-after" => &["page-break-after"],
        "break-inside" => &["page-break-inside"],
        _ => &[],
    }
}

/// Whether `property` sets `target`, directly or as a shorthand.
pub fn covers(property: &str, target: &str) -> bool {
    property == target || expansions(property).contains(&target)
}

const KNOWN_PROPERTIES: &[&str] = &[
    "margin-top",
    "margin-bottom",
    "margin-left",
    "margin-right",
    "padding-top",
    "padding-bottom",
    "padding-left",
    "padding-right",
    "text-indent",
    "font-size",
    "font-weight",
    "font-style",
    "font-variant",
    "font-family",
    "line-height",
    "color",
    "background-color",
    "text-align",
    "text-transform",
    "text-decoration-line",
    "vertical-align",
    "letter-spacing",
    "word-spacing",
    "width",
    "height",
    "min-width",
    "min-height",
    "max-width",
    "max-height",
    "float",
    "clear",
    "display",
    "white-space",
    "hyphens",
    "-webkit-hyphens",
    "-epub-hyphens",
    "adobe-hyphenate",
    "direction",
    "writing-mode",
    "border-collapse",
    "border-spacing",
    "-kfx-layout-hints",
    "border-top-width",
    "border-right-width",
    "border-bottom-width",
    "border-left-width",
    "border-top-style",
    "border-right-style",
    "border-bottom-style",
    "border-left-style",
    "border-top-color",
    "border-right-color",
    "border-bottom-color",
    "border-left-color",
];

/// Properties the converter handles, shorthands included.
pub fn is_known_property(property: &str) -> bool {
    KNOWN_PROPERTIES.contains(&property) || !expansions(property).is_empty()
}

// ============================================================================
// Conversion
// ============================================================================

/// Convert a rule's declarations into a property map.
///
/// `tag` is the element the rule applies to (`"*"` for class selectors) and
/// is only used for ignorable-pattern matching.
pub fn convert_declarations(tag: &str, declarations: &[Declaration], ignorable: &IgnorableTable) -> PropertyMap {
    let mut out = PropertyMap::new();
    for decl in declarations {
        if ignorable.is_ignorable(tag, decl) {
            log::debug!("ignoring {}: {:?} for {}", decl.property, decl.values, tag);
            continue;
        }
        if matches!(
            decl.first_ident(),
            Some("inherit" | "initial" | "unset" | "revert")
        ) {
            log::debug!("keyword value dropped for {}", decl.property);
            continue;
        }
        if let Err(reason) = convert_declaration(decl, &mut out) {
            log::warn!("css property {} dropped: {}", decl.property, reason);
        }
    }
    out
}

type Converted = Result<(), String>;

fn convert_declaration(decl: &Declaration, out: &mut PropertyMap) -> Converted {
    let property = decl.property.as_str();
    match property {
        "margin-top" | "margin-bottom" | "margin-left" | "margin-right" => {
            spacing(property, decl.values.first(), out, true)
        }
        "padding-top" | "padding-bottom" | "padding-left" | "padding-right" => {
            spacing(property, decl.values.first(), out, false)
        }
        "margin" | "padding" => {
            let values = lengths_or_auto(&decl.values);
            let [top, right, bottom, left] = box_sides(&values)
                .ok_or_else(|| format!("expected 1-4 values, got {}", values.len()))?;
            let margin = property == "margin";
            for (side, value) in [("top", top), ("right", right), ("bottom", bottom), ("left", left)] {
                let name = format!("{property}-{side}");
                if let Err(reason) = spacing(&name, Some(value), out, margin) {
                    log::warn!("css property {name} dropped: {reason}");
                }
            }
            Ok(())
        }
        "text-indent" => {
            let len = length(decl)?;
            insert_measure(out, sym::TEXT_INDENT, units::text_indent(len), len)
        }
        "font-size" => match decl.single() {
            Some(CssValue::Length(len)) => insert_measure(out, sym::FONT_SIZE, units::font_size(*len), *len),
            Some(CssValue::Ident(keyword)) => {
                let measure = units::font_size_keyword(keyword)
                    .ok_or_else(|| format!("unknown keyword {keyword}"))?;
                out.insert(sym::FONT_SIZE, measure.to_ion());
                Ok(())
            }
            _ => Err(format!("unsupported value {:?}", decl.values)),
        },
        "line-height" => match decl.single() {
            Some(CssValue::Ident(keyword)) if keyword == "normal" => {
                out.insert(sym::LINE_HEIGHT, Measure::lh(1.0).to_ion());
                Ok(())
            }
            Some(CssValue::Length(len)) => insert_measure(out, sym::LINE_HEIGHT, units::line_height(*len), *len),
            _ => Err(format!("unsupported value {:?}", decl.values)),
        },
        "font-weight" => {
            let weight = match decl.single() {
                Some(CssValue::Ident(keyword)) => match keyword.as_str() {
                    "bold" | "bolder" => sym::BOLD,
                    "normal" | "lighter" => sym::NORMAL,
                    other => return Err(format!("unknown weight {other}")),
                },
                Some(CssValue::Length(len)) if len.unit == CssUnit::None => numeric_weight(len.value),
                _ => return Err(format!("unsupported value {:?}", decl.values)),
            };
            out.insert(sym::FONT_WEIGHT, IonValue::Symbol(weight));
            Ok(())
        }
        "font-style" => keyword(decl, out, sym::FONT_STYLE, |k| match k {
            "italic" => Some(sym::ITALIC),
            "oblique" => Some(sym::OBLIQUE),
            "normal" => Some(sym::NORMAL),
            _ => None,
        }),
        "font-variant" => keyword(decl, out, sym::FONT_VARIANT, |k| match k {
            "small-caps" => Some(sym::SMALL_CAPS),
            "normal" => Some(sym::NORMAL),
            _ => None,
        }),
        "font-family" => {
            let family = font_family(&decl.values).ok_or("no family name")?;
            out.insert(sym::FONT_FAMILY, IonValue::String(family));
            Ok(())
        }
        "font" => convert_font_shorthand(decl, out),
        "color" => {
            let color = decl.values.first().and_then(CssValue::as_color).ok_or("not a color")?;
            out.insert(sym::TEXT_COLOR, IonValue::Int(color));
            Ok(())
        }
        "background-color" | "background" => {
            if decl.first_ident() == Some("transparent") || decl.first_ident() == Some("none") {
                return Ok(());
            }
            match decl.values.iter().find_map(CssValue::as_color) {
                Some(color) => {
                    out.insert(sym::FILL_COLOR, IonValue::Int(color));
                    Ok(())
                }
                None if property == "background" => Ok(()),
                None => Err("not a color".into()),
            }
        }
        "text-align" => keyword(decl, out, sym::TEXT_ALIGNMENT, |k| match k {
            "left" | "start" => Some(sym::START),
            "right" | "end" => Some(sym::END),
            "center" => Some(sym::CENTER),
            "justify" => Some(sym::JUSTIFY),
            _ => None,
        }),
        "text-transform" => keyword(decl, out, sym::TEXT_TRANSFORM, |k| match k {
            "uppercase" => Some(sym::UPPERCASE),
            "lowercase" => Some(sym::LOWERCASE),
            "capitalize" => Some(sym::TITLECASE),
            "none" => Some(sym::NONE),
            _ => None,
        }),
        "text-decoration" | "text-decoration-line" => {
            for value in &decl.values {
                match value.as_ident() {
                    Some("underline") => {
                        out.insert(sym::UNDERLINE, IonValue::Symbol(sym::SOLID));
                    }
                    Some("line-through") => {
                        out.insert(sym::STRIKETHROUGH, IonValue::Symbol(sym::SOLID));
                    }
                    Some("overline") => {
                        out.insert(sym::OVERLINE, IonValue::Symbol(sym::SOLID));
                    }
                    _ => {}
                }
            }
            Ok(())
        }
        "vertical-align" => match decl.single() {
            Some(CssValue::Ident(keyword)) => {
                let style = match keyword.as_str() {
                    "super" => sym::SUPERSCRIPT,
                    "sub" => sym::SUBSCRIPT,
                    "top" | "text-top" => sym::TOP,
                    "bottom" | "text-bottom" => sym::BOTTOM,
                    "middle" => sym::CENTER,
                    "baseline" => sym::NORMAL,
                    other => return Err(format!("unknown keyword {other}")),
                };
                out.insert(sym::BASELINE_STYLE, IonValue::Symbol(style));
                Ok(())
            }
            Some(CssValue::Length(len)) => {
                let measure = match len.unit {
                    CssUnit::Percent => Some(Measure::percent(len.value)),
                    _ => len.to_em().map(Measure::em),
                };
                insert_measure(out, sym::BASELINE_SHIFT, measure, *len)
            }
            _ => Err(format!("unsupported value {:?}", decl.values)),
        },
        "letter-spacing" | "word-spacing" => {
            if decl.first_ident() == Some("normal") {
                return Ok(());
            }
            let len = length(decl)?;
            let symbol = if property == "letter-spacing" {
                sym::LETTERSPACING
            } else {
                sym::WORDSPACING
            };
            insert_measure(out, symbol, units::generic_length(len), len)
        }
        "width" | "height" | "min-width" | "min-height" | "max-width" | "max-height" => {
            if matches!(decl.first_ident(), Some("auto" | "none")) {
                return Ok(());
            }
            let len = length(decl)?;
            let symbol = match property {
                "width" => sym::WIDTH,
                "height" => sym::HEIGHT,
                "min-width" => sym::MIN_WIDTH,
                "min-height" => sym::MIN_HEIGHT,
                "max-width" => sym::MAX_WIDTH,
                _ => sym::MAX_HEIGHT,
            };
            insert_measure(out, symbol, units::generic_length(len), len)
        }
        "float" => optional_keyword(decl, out, sym::FLOAT, |k| match k {
            "left" => Some(sym::LEFT),
            "right" => Some(sym::RIGHT),
            _ => None,
        }),
        "clear" => optional_keyword(decl, out, sym::YJ_FLOAT_CLEAR, |k| match k {
            "left" => Some(sym::LEFT),
            "right" => Some(sym::RIGHT),
            "both" => Some(sym::BOTH),
            _ => None,
        }),
        "page-break-before" | "break-before" => keyword(decl, out, sym::BREAK_BEFORE, page_break),
        "page-break-after" | "break-after" => keyword(decl, out, sym::BREAK_AFTER, page_break),
        "page-break-inside" | "break-inside" => keyword(decl, out, sym::BREAK_INSIDE, |k| match k {
            "avoid" | "avoid-page" => Some(sym::AVOID),
            "auto" => Some(sym::AUTO),
            _ => None,
        }),
        "display" => {
            if decl.first_ident() == Some("none") {
                log::debug!("display: none has no KFX equivalent");
            }
            Ok(())
        }
        "white-space" => {
            if decl.first_ident() == Some("nowrap") {
                out.insert(sym::NOBREAK, IonValue::Bool(true));
            }
            Ok(())
        }
        "hyphens" | "-webkit-hyphens" | "-epub-hyphens" | "adobe-hyphenate" => {
            keyword(decl, out, sym::HYPHENS, |k| match k {
                "auto" => Some(sym::AUTO),
                "manual" => Some(sym::MANUAL),
                "none" => Some(sym::NONE),
                _ => None,
            })
        }
        "direction" => keyword(decl, out, sym::DIRECTION, |k| match k {
            "ltr" => Some(sym::LTR),
            "rtl" => Some(sym::RTL),
            _ => None,
        }),
        "writing-mode" => keyword(decl, out, sym::WRITING_MODE, |k| match k {
            "horizontal-tb" => Some(sym::HORIZONTAL_TB),
            _ => None,
        }),
        "border-collapse" => match decl.first_ident() {
            Some("collapse") => {
                out.insert(sym::TABLE_BORDER_COLLAPSE, IonValue::Bool(true));
                Ok(())
            }
            Some("separate") => {
                out.insert(sym::TABLE_BORDER_COLLAPSE, IonValue::Bool(false));
                Ok(())
            }
            _ => Err(format!("unsupported value {:?}", decl.values)),
        },
        "border-spacing" => {
            let lengths: Vec<Length> = decl.values.iter().filter_map(CssValue::as_length).collect();
            let (horizontal, vertical) = match lengths.as_slice() {
                [both] => (*both, *both),
                [h, v] => (*h, *v),
                _ => return Err(format!("unsupported value {:?}", decl.values)),
            };
            insert_measure(out, sym::BORDER_SPACING_HORIZONTAL, units::generic_length(horizontal), horizontal)?;
            insert_measure(out, sym::BORDER_SPACING_VERTICAL, units::generic_length(vertical), vertical)
        }
        "-kfx-layout-hints" => {
            let hints: Vec<IonValue> = decl
                .values
                .iter()
                .filter_map(CssValue::as_ident)
                .filter_map(|hint| match hint {
                    "treat_as_title" | "treat-as-title" => Some(IonValue::Symbol(sym::TREAT_AS_TITLE)),
                    other => {
                        log::warn!("unknown layout hint {other}");
                        None
                    }
                })
                .collect();
            if !hints.is_empty() {
                out.insert(sym::LAYOUT_HINTS, IonValue::List(hints));
            }
            Ok(())
        }
        _ if property.starts_with("border") => convert_border(decl, out),
        _ => Err("unknown property".into()),
    }
}

fn page_break(keyword: &str) -> Option<u32> {
    match keyword {
        "always" | "page" | "left" | "right" => Some(sym::ALWAYS),
        "avoid" | "avoid-page" => Some(sym::AVOID),
        "auto" => Some(sym::AUTO),
        _ => None,
    }
}

/// Weight symbol for a `@font-face` style descriptor; unknown values are normal.
pub fn font_weight_symbol(value: &str) -> u32 {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "bold" | "bolder" => sym::BOLD,
        "normal" | "lighter" | "" => sym::NORMAL,
        other => other.parse::<f64>().map_or(sym::NORMAL, numeric_weight),
    }
}

/// Style symbol for a `@font-face` style descriptor; unknown values are normal.
pub fn font_style_symbol(value: &str) -> u32 {
    match value.trim().to_ascii_lowercase().as_str() {
        "italic" => sym::ITALIC,
        "oblique" => sym::OBLIQUE,
        _ => sym::NORMAL,
    }
}

fn numeric_weight(weight: f64) -> u32 {
    match weight.round() as i64 {
        ..=100 => sym::THIN,
        101..=200 => sym::ULTRA_LIGHT,
        201..=300 => sym::LIGHT,
        301..=400 => sym::NORMAL,
        401..=500 => sym::MEDIUM,
        501..=600 => sym::SEMI_BOLD,
        601..=700 => sym::BOLD,
        701..=800 => sym::ULTRA_BOLD,
        _ => sym::HEAVY,
    }
}

fn length(decl: &Declaration) -> Result<Length, String> {
    decl.single()
        .and_then(CssValue::as_length)
        .ok_or_else(|| format!("expected a length, got {:?}", decl.values))
}

fn insert_measure(out: &mut PropertyMap, symbol: u32, measure: Option<Measure>, source: Length) -> Converted {
    let measure = measure.ok_or_else(|| format!("unit {:?} not convertible", source.unit))?;
    out.insert(symbol, measure.to_ion());
    Ok(())
}

fn keyword(
    decl: &Declaration,
    out: &mut PropertyMap,
    symbol: u32,
    map: impl Fn(&str) -> Option<u32>,
) -> Converted {
    let keyword = decl.first_ident().ok_or("expected a keyword")?;
    let value = map(keyword).ok_or_else(|| format!("unknown keyword {keyword}"))?;
    out.insert(symbol, IonValue::Symbol(value));
    Ok(())
}

/// Like `keyword`, but `none` is accepted and emits nothing.
fn optional_keyword(
    decl: &Declaration,
    out: &mut PropertyMap,
    symbol: u32,
    map: impl Fn(&str) -> Option<u32>,
) -> Converted {
    if decl.first_ident() == Some("none") {
        return Ok(());
    }
    keyword(decl, out, symbol, map)
}

/// Margin or padding longhand.
fn spacing(property: &str, value: Option<&CssValue>, out: &mut PropertyMap, margin: bool) -> Converted {
    let (symbol, vertical) = match property {
        "margin-top" => (sym::MARGIN_TOP, true),
        "margin-bottom" => (sym::MARGIN_BOTTOM, true),
        "margin-left" => (sym::MARGIN_LEFT, false),
        "margin-right" => (sym::MARGIN_RIGHT, false),
        "padding-top" => (sym::PADDING_TOP, true),
        "padding-bottom" => (sym::PADDING_BOTTOM, true),
        "padding-left" => (sym::PADDING_LEFT, false),
        "padding-right" => (sym::PADDING_RIGHT, false),
        _ => return Err("not a spacing property".into()),
    };
    let len = match value {
        Some(CssValue::Ident(auto)) if auto == "auto" && margin => return Ok(()),
        Some(CssValue::Length(len)) => *len,
        other => return Err(format!("unsupported value {other:?}")),
    };
    if len.value < 0.0 {
        return Err(format!("negative value {}{}", len.value, len.unit.as_str()));
    }
    let measure = if vertical {
        units::vertical_spacing(len)
    } else {
        units::horizontal_spacing(len)
    };
    insert_measure(out, symbol, measure, len)
}

/// Lengths and `auto` keywords, the components of a box shorthand.
fn lengths_or_auto(values: &[CssValue]) -> Vec<&CssValue> {
    values
        .iter()
        .filter(|v| matches!(v, CssValue::Length(_)) || v.as_ident() == Some("auto"))
        .collect()
}

/// CSS box shorthand: 1-4 values to top/right/bottom/left.
fn box_sides<T: Copy>(values: &[T]) -> Option<[T; 4]> {
    match *values {
        [all] => Some([all, all, all, all]),
        [vertical, horizontal] => Some([vertical, horizontal, vertical, horizontal]),
        [top, horizontal, bottom] => Some([top, horizontal, bottom, horizontal]),
        [top, right, bottom, left] => Some([top, right, bottom, left]),
        _ => None,
    }
}

fn font_family(values: &[CssValue]) -> Option<String> {
    let mut words = Vec::new();
    for value in values {
        match value {
            CssValue::Str(name) => return Some(name.clone()),
            CssValue::Ident(word) => words.push(word.as_str()),
            CssValue::Comma if !words.is_empty() => break,
            _ => {}
        }
    }
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// `font: [style] [variant] [weight] size[/line-height] family`.
fn convert_font_shorthand(decl: &Declaration, out: &mut PropertyMap) -> Converted {
    let size_index = decl
        .values
        .iter()
        .position(|v| matches!(v, CssValue::Length(len) if len.unit != CssUnit::None))
        .ok_or("font shorthand without a size")?;

    for value in &decl.values[..size_index] {
        match value {
            CssValue::Ident(k) if k == "italic" || k == "oblique" => {
                let style = if k == "italic" { sym::ITALIC } else { sym::OBLIQUE };
                out.insert(sym::FONT_STYLE, IonValue::Symbol(style));
            }
            CssValue::Ident(k) if k == "small-caps" => {
                out.insert(sym::FONT_VARIANT, IonValue::Symbol(sym::SMALL_CAPS));
            }
            CssValue::Ident(k) if k == "bold" || k == "bolder" => {
                out.insert(sym::FONT_WEIGHT, IonValue::Symbol(sym::BOLD));
            }
            CssValue::Length(len) => {
                out.insert(sym::FONT_WEIGHT, IonValue::Symbol(numeric_weight(len.value)));
            }
            _ => {}
        }
    }

    if let Some(CssValue::Length(size)) = decl.values.get(size_index) {
        insert_measure(out, sym::FONT_SIZE, units::font_size(*size), *size)?;
    }
    let mut rest = &decl.values[size_index + 1..];
    if let [CssValue::Slash, CssValue::Length(line), tail @ ..] = rest {
        insert_measure(out, sym::LINE_HEIGHT, units::line_height(*line), *line)?;
        rest = tail;
    }
    if let Some(family) = font_family(rest) {
        out.insert(sym::FONT_FAMILY, IonValue::String(family));
    }
    Ok(())
}

// ============================================================================
// Borders
// ============================================================================

const SIDES: [&str; 4] = ["top", "right", "bottom", "left"];

fn border_symbols(side: &str) -> (u32, u32, u32) {
    match side {
        "top" => (sym::BORDER_WEIGHT_TOP, sym::BORDER_STYLE_TOP, sym::BORDER_COLOR_TOP),
        "right" => (sym::BORDER_WEIGHT_RIGHT, sym::BORDER_STYLE_RIGHT, sym::BORDER_COLOR_RIGHT),
        "bottom" => (sym::BORDER_WEIGHT_BOTTOM, sym::BORDER_STYLE_BOTTOM, sym::BORDER_COLOR_BOTTOM),
        _ => (sym::BORDER_WEIGHT_LEFT, sym::BORDER_STYLE_LEFT, sym::BORDER_COLOR_LEFT),
    }
}

fn border_style(keyword: &str) -> Option<u32> {
    Some(match keyword {
        "none" | "hidden" => sym::NONE,
        "solid" => sym::SOLID,
        "double" => sym::DOUBLE,
        "dashed" => sym::DASHED,
        "dotted" => sym::DOTTED,
        "groove" => sym::GROOVE,
        "ridge" => sym::RIDGE,
        "inset" => sym::INSET,
        "outset" => sym::OUTSET,
        _ => return None,
    })
}

fn border_width(value: &CssValue) -> Option<Measure> {
    match value {
        CssValue::Ident(k) => match k.as_str() {
            "thin" => units::generic_length(Length::px(1.0)),
            "medium" => units::generic_length(Length::px(3.0)),
            "thick" => units::generic_length(Length::px(5.0)),
            _ => None,
        },
        CssValue::Length(len) => units::generic_length(*len),
        _ => None,
    }
}

#[derive(Default)]
struct BorderParts {
    width: Option<Measure>,
    style: Option<u32>,
    color: Option<i64>,
}

fn border_parts(values: &[CssValue]) -> BorderParts {
    let mut parts = BorderParts::default();
    for value in values {
        if let Some(style) = value.as_ident().and_then(border_style) {
            parts.style = Some(style);
        } else if let Some(width) = border_width(value) {
            parts.width = Some(width);
        } else if let Some(color) = value.as_color() {
            parts.color = Some(color);
        }
    }
    parts
}

fn write_border_side(out: &mut PropertyMap, side: &str, parts: &BorderParts) {
    let (weight, style, color) = border_symbols(side);
    if let Some(width) = parts.width {
        out.insert(weight, width.to_ion());
    }
    if let Some(value) = parts.style {
        out.insert(style, IonValue::Symbol(value));
    }
    if let Some(value) = parts.color {
        out.insert(color, IonValue::Int(value));
    }
}

fn convert_border(decl: &Declaration, out: &mut PropertyMap) -> Converted {
    let property = decl.property.as_str();
    let rest = property.strip_prefix("border").unwrap_or(property);

    // border, border-top, ...
    if rest.is_empty() {
        let parts = border_parts(&decl.values);
        for side in SIDES {
            write_border_side(out, side, &parts);
        }
        return Ok(());
    }
    let rest = rest.trim_start_matches('-');
    if let Some(side) = SIDES.iter().find(|s| **s == rest) {
        write_border_side(out, side, &border_parts(&decl.values));
        return Ok(());
    }

    // border-width, border-style, border-color (1-4 values)
    if let Some(aspect) = ["width", "style", "color"].iter().find(|a| **a == rest) {
        let values: Vec<&CssValue> = decl.values.iter().filter(|v| !matches!(v, CssValue::Comma)).collect();
        let sides = box_sides(&values).ok_or("expected 1-4 values")?;
        for (side, value) in SIDES.iter().zip(sides) {
            write_border_aspect(out, side, aspect, value)?;
        }
        return Ok(());
    }

    // border-top-width, ...
    if let Some((side, aspect)) = rest.split_once('-')
        && SIDES.contains(&side)
    {
        let value = decl.values.first().ok_or("missing value")?;
        return write_border_aspect(out, side, aspect, value);
    }
    Err("unknown property".into())
}

fn write_border_aspect(out: &mut PropertyMap, side: &str, aspect: &str, value: &CssValue) -> Converted {
    let (weight, style, color) = border_symbols(side);
    match aspect {
        "width" => {
            let width = border_width(value).ok_or("not a border width")?;
            out.insert(weight, width.to_ion());
        }
        "style" => {
            let keyword = value.as_ident().and_then(border_style).ok_or("not a border style")?;
            out.insert(style, IonValue::Symbol(keyword));
        }
        "color" => {
            let packed = value.as_color().ok_or("not a color")?;
            out.insert(color, IonValue::Int(packed));
        }
        _ => return Err(format!("unknown border aspect {aspect}")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(text: &str) -> PropertyMap {
        convert_declarations("p", &parse_declarations(text), &IgnorableTable::default())
    }

    #[test]
    fn test_margin_top_em() {
        let props = convert("margin-top: 0.67em");
        let m = Measure::from_ion(&props[&sym::MARGIN_TOP]).unwrap();
        assert_eq!(m.unit, sym::UNIT_LH);
        assert_eq!(m.value, 0.558333);
    }

    #[test]
    fn test_font_size_percent() {
        let props = convert("font-size: 140%");
        assert_eq!(props[&sym::FONT_SIZE], Measure::rem(1.25).to_ion());
    }

    #[test]
    fn test_margin_shorthand_expansion() {
        let props = convert("margin: 1.2em 2em");
        assert_eq!(props[&sym::MARGIN_TOP], Measure::lh(1.0).to_ion());
        assert_eq!(props[&sym::MARGIN_BOTTOM], Measure::lh(1.0).to_ion());
        assert_eq!(props[&sym::MARGIN_LEFT], Measure::percent(6.25).to_ion());
        assert_eq!(props[&sym::MARGIN_RIGHT], Measure::percent(6.25).to_ion());
    }

    #[test]
    fn test_margin_auto_and_zero() {
        let props = convert("margin: 0 auto");
        assert_eq!(props[&sym::MARGIN_TOP], Measure::lh(0.0).to_ion());
        assert!(!props.contains_key(&sym::MARGIN_LEFT));
    }

    #[test]
    fn test_negative_margin_dropped() {
        let props = convert("margin-top: -1em; margin-bottom: 1em");
        assert!(!props.contains_key(&sym::MARGIN_TOP));
        assert!(props.contains_key(&sym::MARGIN_BOTTOM));
    }

    #[test]
    fn test_keywords() {
        let props = convert(
            "font-weight: 600; font-style: italic; text-align: left; text-decoration: underline line-through",
        );
        assert_eq!(props[&sym::FONT_WEIGHT], IonValue::Symbol(sym::SEMI_BOLD));
        assert_eq!(props[&sym::FONT_STYLE], IonValue::Symbol(sym::ITALIC));
        assert_eq!(props[&sym::TEXT_ALIGNMENT], IonValue::Symbol(sym::START));
        assert_eq!(props[&sym::UNDERLINE], IonValue::Symbol(sym::SOLID));
        assert_eq!(props[&sym::STRIKETHROUGH], IonValue::Symbol(sym::SOLID));
    }

    #[test]
    fn test_vertical_align() {
        let props = convert("vertical-align: super");
        assert_eq!(props[&sym::BASELINE_STYLE], IonValue::Symbol(sym::SUPERSCRIPT));
        let props = convert("vertical-align: -20%");
        assert_eq!(props[&sym::BASELINE_SHIFT], Measure::percent(-20.0).to_ion());
    }

    #[test]
    fn test_page_breaks() {
        let props = convert("page-break-before: always; break-inside: avoid");
        assert_eq!(props[&sym::BREAK_BEFORE], IonValue::Symbol(sym::ALWAYS));
        assert_eq!(props[&sym::BREAK_INSIDE], IonValue::Symbol(sym::AVOID));
    }

    #[test]
    fn test_border_shorthand() {
        let props = convert("border: 1px solid #000; border-left-style: none");
        assert_eq!(props[&sym::BORDER_STYLE_TOP], IonValue::Symbol(sym::SOLID));
        assert_eq!(props[&sym::BORDER_STYLE_LEFT], IonValue::Symbol(sym::NONE));
        assert_eq!(props[&sym::BORDER_COLOR_RIGHT], IonValue::Int(0xFF000000));
        assert_eq!(
            props[&sym::BORDER_WEIGHT_BOTTOM],
            Measure::new(1.0, sym::UNIT_PX).to_ion()
        );
    }

    #[test]
    fn test_font_shorthand() {
        let props = convert("font: italic bold 12px/1.5 \"Georgia\", serif");
        assert_eq!(props[&sym::FONT_STYLE], IonValue::Symbol(sym::ITALIC));
        assert_eq!(props[&sym::FONT_WEIGHT], IonValue::Symbol(sym::BOLD));
        assert_eq!(props[&sym::FONT_SIZE], Measure::rem(0.75).to_ion());
        assert_eq!(props[&sym::LINE_HEIGHT], Measure::lh(1.5).to_ion());
        assert_eq!(props[&sym::FONT_FAMILY], IonValue::String("Georgia".into()));
    }

    #[test]
    fn test_ignorable_and_unknown() {
        let table = IgnorableTable::default();
        let decls = parse_declarations("orphans: 2; -webkit-hyphens: auto; frobnicate: 1");
        assert!(table.is_ignorable("p", &decls[0]));
        // Known properties are never ignorable even when a pattern matches.
        assert!(!table.is_ignorable("p", &decls[1]));
        assert!(!table.is_ignorable("p", &decls[2]));

        let props = convert_declarations("p", &decls, &table);
        assert_eq!(props.len(), 1);
        assert_eq!(props[&sym::HYPHENS], IonValue::Symbol(sym::AUTO));
    }

    #[test]
    fn test_extra_ignorable_pattern() {
        let mut table = IgnorableTable::default();
        table.extend([IgnorePattern::new("p", "frobnicate", "*", "*")]);
        let decls = parse_declarations("frobnicate: 1");
        assert!(table.is_ignorable("p", &decls[0]));
        assert!(!table.is_ignorable("div", &decls[0]));
    }

    #[test]
    fn test_defaults_not_covered_by_shorthand() {
        let table = DefaultMappingTable::default();
        let explicit = parse_declarations("margin: 0");
        let merged = table.apply("h1", &[], &explicit);
        let names: Vec<&str> = merged.iter().map(|d| d.property.as_str()).collect();
        assert!(names.contains(&"font-size"));
        assert!(names.contains(&"font-weight"));
        assert!(!names.contains(&"margin-top"));
        assert_eq!(names.last(), Some(&"margin"));
    }

    #[test]
    fn test_defaults_with_attribute() {
        let table = DefaultMappingTable::default();
        assert!(table.defaults_for("td", &[]).is_empty());
        let centered = table.defaults_for("td", &[("align", "center")]);
        assert_eq!(centered.len(), 1);
        assert_eq!(centered[0].property, "text-align");
        assert!(table.has_defaults("strong"));
    }

    #[test]
    fn test_heading_defaults_convert() {
        let table = DefaultMappingTable::default();
        let decls = table.apply("h1", &[], &[]);
        let props = convert_declarations("h1", &decls, &IgnorableTable::default());
        assert_eq!(props[&sym::FONT_SIZE], Measure::em(2.0).to_ion());
        assert_eq!(
            props[&sym::LAYOUT_HINTS],
            IonValue::List(vec![IonValue::Symbol(sym::TREAT_AS_TITLE)])
        );
    }

    #[test]
    fn test_covers() {
        assert!(covers("margin", "margin-left"));
        assert!(covers("page-break-before", "break-before"));
        assert!(covers("color", "color"));
        assert!(!covers("padding", "margin-top"));
    }
}
