//! Per-property merge rules.
//!
//! When two property sets combine (selector collision, inheritance, nested
//! inline spans), each symbol is merged on its own. The rule is picked from a
//! table keyed by an 8-field tuple; the most specific row wins.

use std::borrow::Cow;

use crate::kfx::ion::{Decimal, IonValue};
use crate::kfx::symbols::{name_of, sym};

use super::PropertyMap;
use super::units::{Measure, unit_name};

/// How an incoming value combines with an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRule {
    Override,
    OverrideMaximum,
    Cumulative,
    CumulativeInSameContainer,
    Relative,
    HorizontalPosition,
    BaselineStyle,
}

impl MergeRule {
    pub fn name(self) -> &'static str {
        match self {
            MergeRule::Override => "override",
            MergeRule::OverrideMaximum => "override-maximum",
            MergeRule::Cumulative => "cumulative",
            MergeRule::CumulativeInSameContainer => "cumulative-same-container",
            MergeRule::Relative => "relative",
            MergeRule::HorizontalPosition => "horizontal-position",
            MergeRule::BaselineStyle => "baseline-style",
        }
    }

    /// Combine two values. `None` removes the property.
    pub fn apply(self, existing: &IonValue, incoming: &IonValue, ctx: MergeContext) -> Option<IonValue> {
        match self {
            MergeRule::Override => Some(incoming.clone()),
            MergeRule::OverrideMaximum => Some(merge_override_maximum(existing, incoming)),
            MergeRule::Cumulative => Some(merge_cumulative(existing, incoming)),
            MergeRule::CumulativeInSameContainer => {
                if ctx.same_container {
                    Some(merge_cumulative(existing, incoming))
                } else {
                    Some(incoming.clone())
                }
            }
            MergeRule::Relative => Some(merge_relative(existing, incoming)),
            MergeRule::HorizontalPosition => Some(merge_horizontal_position(existing, incoming)),
            MergeRule::BaselineStyle => Some(merge_baseline_style(existing, incoming)),
        }
    }
}

/// Where the incoming properties come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeContext {
    pub allow_writing_mode: bool,
    pub wrapper: bool,
    pub container: bool,
    pub inline: bool,
    /// Both values originate in the same structural container.
    pub same_container: bool,
}

impl MergeContext {
    pub const INLINE: Self = Self {
        allow_writing_mode: true,
        wrapper: false,
        container: false,
        inline: true,
        same_container: false,
    };

    /// Class styles applied over tag defaults: margins override.
    pub const CLASS_OVERRIDE: Self = Self {
        allow_writing_mode: false,
        wrapper: false,
        container: false,
        inline: true,
        same_container: false,
    };

    pub const WRAPPER: Self = Self {
        allow_writing_mode: false,
        wrapper: true,
        container: false,
        inline: false,
        same_container: false,
    };

    pub const CONTAINER: Self = Self {
        allow_writing_mode: false,
        wrapper: false,
        container: true,
        inline: false,
        same_container: false,
    };

    pub fn in_same_container(mut self) -> Self {
        self.same_container = true;
        self
    }
}

// ============================================================================
// Rule table
// ============================================================================

/// One row of the rule-selection table. `"*"` matches anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleKey {
    pub property: Cow<'static, str>,
    pub is_measure: Cow<'static, str>,
    pub existing_unit: Cow<'static, str>,
    pub new_unit: Cow<'static, str>,
    pub allow_writing_mode: Cow<'static, str>,
    pub wrapper: Cow<'static, str>,
    pub container: Cow<'static, str>,
    pub inline: Cow<'static, str>,
}

impl RuleKey {
    /// Build from the eight fields in table order.
    pub fn new(fields: [&'static str; 8]) -> Self {
        let [property, is_measure, existing_unit, new_unit, allow_wm, wrapper, container, inline] =
            fields;
        Self {
            property: property.into(),
            is_measure: is_measure.into(),
            existing_unit: existing_unit.into(),
            new_unit: new_unit.into(),
            allow_writing_mode: allow_wm.into(),
            wrapper: wrapper.into(),
            container: container.into(),
            inline: inline.into(),
        }
    }

    fn fields(&self) -> [&str; 8] {
        [
            &self.property,
            &self.is_measure,
            &self.existing_unit,
            &self.new_unit,
            &self.allow_writing_mode,
            &self.wrapper,
            &self.container,
            &self.inline,
        ]
    }

    /// Match against a concrete key. Returns the number of non-wildcard fields.
    fn specificity_against(&self, actual: &RuleKey) -> Option<usize> {
        let mut specific = 0;
        for (expected, actual) in self.fields().iter().zip(actual.fields()) {
            if *expected == "*" {
                continue;
            }
            if !expected.eq_ignore_ascii_case(actual) {
                return None;
            }
            specific += 1;
        }
        Some(specific)
    }
}

#[derive(Debug, Clone)]
pub struct RuleRow {
    pub key: RuleKey,
    pub rule: MergeRule,
}

/// Rule-selection table, loaded once and shared read-only.
#[derive(Debug, Clone)]
pub struct MergeRuleTable {
    rows: Vec<RuleRow>,
}

impl Default for MergeRuleTable {
    fn default() -> Self {
        use MergeRule::*;
        let mut rows = Vec::new();
        let mut row = |fields: [&'static str; 8], rule: MergeRule| {
            rows.push(RuleRow {
                key: RuleKey::new(fields),
                rule,
            });
        };

        for side in ["margin_top", "margin_bottom", "margin_left", "margin_right"] {
            row([side, "*", "*", "*", "false", "false", "false", "true"], Override);
        }
        row(["margin_top", "*", "*", "*", "true", "*", "*", "true"], OverrideMaximum);
        row(["margin_bottom", "*", "*", "*", "true", "*", "*", "true"], OverrideMaximum);
        row(["margin_top", "*", "*", "*", "*", "*", "true", "*"], Cumulative);
        row(["margin_bottom", "*", "*", "*", "*", "true", "*", "*"], OverrideMaximum);
        row(["margin_left", "*", "*", "*", "true", "*", "*", "true"], CumulativeInSameContainer);
        row(["margin_right", "*", "*", "*", "true", "*", "*", "true"], CumulativeInSameContainer);
        for side in ["padding_top", "padding_bottom", "padding_left", "padding_right"] {
            row([side, "*", "*", "*", "*", "*", "*", "*"], Cumulative);
            row([side, "*", "*", "*", "false", "*", "*", "true"], Override);
        }
        row(["font_size", "true", "*", "em", "*", "*", "*", "*"], Relative);
        row(["font_size", "true", "*", "percent", "*", "*", "*", "*"], Relative);
        row(["baseline_style", "*", "*", "*", "*", "*", "*", "*"], BaselineStyle);
        row(["baseline_shift", "true", "percent", "percent", "*", "*", "*", "*"], Cumulative);
        row(["float", "*", "*", "*", "*", "*", "*", "*"], HorizontalPosition);
        row(["yj.float_clear", "*", "*", "*", "*", "*", "*", "*"], HorizontalPosition);
        row(["*", "*", "*", "*", "*", "*", "*", "*"], Override);

        Self { rows }
    }
}

impl MergeRuleTable {
    pub fn new(rows: Vec<RuleRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[RuleRow] {
        &self.rows
    }

    /// Pick the rule for merging `incoming` into `existing` for `symbol`.
    pub fn select(
        &self,
        symbol: u32,
        existing: &IonValue,
        incoming: &IonValue,
        ctx: MergeContext,
    ) -> MergeRule {
        // Layout hints are always a list union.
        if symbol == sym::LAYOUT_HINTS {
            return MergeRule::Cumulative;
        }

        let actual = actual_key(symbol, existing, incoming, ctx);
        let mut best: Option<(usize, MergeRule)> = None;
        for row in &self.rows {
            if let Some(specific) = row.key.specificity_against(&actual)
                && best.is_none_or(|(current, _)| specific > current)
            {
                best = Some((specific, row.rule));
            }
        }
        best.map_or(MergeRule::Override, |(_, rule)| rule)
    }
}

fn bool_field(value: bool) -> Cow<'static, str> {
    Cow::Borrowed(if value { "true" } else { "false" })
}

/// Concrete key describing one merge.
fn actual_key(symbol: u32, existing: &IonValue, incoming: &IonValue, ctx: MergeContext) -> RuleKey {
    let mut key = RuleKey {
        property: name_of(symbol),
        is_measure: Cow::Borrowed("false"),
        existing_unit: Cow::Borrowed("*"),
        new_unit: Cow::Borrowed("*"),
        allow_writing_mode: bool_field(ctx.allow_writing_mode),
        wrapper: bool_field(ctx.wrapper),
        container: bool_field(ctx.container),
        inline: bool_field(ctx.inline),
    };
    if let Some(existing) = Measure::from_ion(existing) {
        key.is_measure = Cow::Borrowed("true");
        key.existing_unit = Cow::Borrowed(unit_name(existing.unit));
        if let Some(incoming) = Measure::from_ion(incoming) {
            key.new_unit = Cow::Borrowed(unit_name(incoming.unit));
        }
    }
    key
}

// ============================================================================
// Merging property maps
// ============================================================================

/// Merge one property into `dst` using the rule table.
pub fn merge_property(
    dst: &mut PropertyMap,
    symbol: u32,
    incoming: &IonValue,
    ctx: MergeContext,
    rules: &MergeRuleTable,
) {
    let Some(existing) = dst.get(&symbol) else {
        dst.insert(symbol, incoming.clone());
        return;
    };
    let rule = rules.select(symbol, existing, incoming, ctx);
    let merged = rule.apply(existing, incoming, ctx);
    log::trace!(
        "merge {} with {}: {:?} + {:?} -> {:?}",
        name_of(symbol),
        rule.name(),
        existing,
        incoming,
        merged
    );
    match merged {
        Some(value) => {
            dst.insert(symbol, value);
        }
        None => {
            dst.remove(&symbol);
        }
    }
}

/// Merge every property of `src` into `dst` using the rule table.
pub fn merge_all(dst: &mut PropertyMap, src: &PropertyMap, ctx: MergeContext, rules: &MergeRuleTable) {
    for (symbol, value) in src {
        merge_property(dst, *symbol, value, ctx, rules);
    }
}

/// Plain cascade: later values replace earlier ones.
pub fn merge_all_override(dst: &mut PropertyMap, src: &PropertyMap) {
    dst.extend(src.iter().map(|(k, v)| (*k, v.clone())));
}

// ============================================================================
// Rule implementations
// ============================================================================

fn merge_cumulative(existing: &IonValue, incoming: &IonValue) -> IonValue {
    let existing_list = existing.as_list();
    let incoming_list = incoming.as_list();
    if existing_list.is_some() || incoming_list.is_some() {
        return union_lists(existing, incoming);
    }

    if let (Some(e), Some(i)) = (Measure::from_ion(existing), Measure::from_ion(incoming))
        && e.unit == i.unit
    {
        return Measure::new(e.value + i.value, e.unit).to_ion();
    }

    match (existing, incoming) {
        (IonValue::Int(e), IonValue::Int(i)) => IonValue::Int(e + i),
        _ => match (existing.as_f64(), incoming.as_f64()) {
            (Some(e), Some(i)) => IonValue::Decimal(Decimal::from_f64(e + i)),
            _ => incoming.clone(),
        },
    }
}

/// Order-preserving union; a scalar counts as a one-element list.
fn union_lists(existing: &IonValue, incoming: &IonValue) -> IonValue {
    let as_items = |value: &IonValue| -> Vec<IonValue> {
        match value {
            IonValue::List(items) => items.clone(),
            IonValue::Null => Vec::new(),
            other => vec![other.clone()],
        }
    };
    let mut merged: Vec<IonValue> = Vec::new();
    for item in as_items(existing).into_iter().chain(as_items(incoming)) {
        if !merged.contains(&item) {
            merged.push(item);
        }
    }
    IonValue::List(merged)
}

fn merge_relative(existing: &IonValue, incoming: &IonValue) -> IonValue {
    let (Some(e), Some(i)) = (Measure::from_ion(existing), Measure::from_ion(incoming)) else {
        return incoming.clone();
    };
    let scaled = match i.unit {
        sym::UNIT_PERCENT => e.value * i.value / 100.0,
        sym::UNIT_EM => e.value * i.value,
        _ => return incoming.clone(),
    };
    Measure::new(scaled, e.unit).to_ion()
}

fn merge_override_maximum(existing: &IonValue, incoming: &IonValue) -> IonValue {
    if let (Some(e), Some(i)) = (Measure::from_ion(existing), Measure::from_ion(incoming)) {
        if e.unit == i.unit {
            return if i.value >= e.value {
                incoming.clone()
            } else {
                existing.clone()
            };
        }
        return incoming.clone();
    }
    match (existing.as_f64(), incoming.as_f64()) {
        (Some(e), Some(i)) if i < e => existing.clone(),
        _ => incoming.clone(),
    }
}

fn merge_horizontal_position(existing: &IonValue, incoming: &IonValue) -> IonValue {
    match (existing.as_symbol(), incoming.as_symbol()) {
        (Some(e), Some(i)) if e != i => IonValue::Symbol(sym::BOTH),
        _ => incoming.clone(),
    }
}

fn merge_baseline_style(existing: &IonValue, incoming: &IonValue) -> IonValue {
    let is_normal = |v: &IonValue| v.as_symbol() == Some(sym::NORMAL);
    if is_normal(incoming) && !is_normal(existing) {
        existing.clone()
    } else {
        incoming.clone()
    }
}
