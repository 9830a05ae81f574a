//! Style resolution engine.
//!
//! CSS rules are mapped onto KFX style properties, merged per symbol with
//! the rule table, resolved per element position and deduplicated into
//! `$157` style fragments.

pub mod css;
pub mod mapping;
pub mod merge;
pub mod registry;
pub mod units;

use std::collections::BTreeMap;

use crate::kfx::ion::{Decimal, IonValue};

pub use css::{Declaration, Stylesheet};
pub use mapping::{DefaultMappingTable, IgnorableTable, IgnorePattern};
pub use merge::{MergeContext, MergeRule, MergeRuleTable};
pub use registry::StyleRegistry;

/// Style properties keyed by symbol; ordered so signatures are stable.
pub type PropertyMap = BTreeMap<u32, IonValue>;

/// A named style, possibly inheriting from a parent.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleDef {
    pub name: String,
    pub parent: Option<String>,
    pub properties: PropertyMap,
}

impl StyleDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            properties: PropertyMap::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_property(mut self, symbol: u32, value: impl Into<IonValue>) -> Self {
        self.properties.insert(symbol, value.into());
        self
    }
}

/// How a style is used by content. Flags accumulate per style name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StyleUsage(u8);

impl StyleUsage {
    pub const TEXT: Self = Self(1);
    pub const IMAGE: Self = Self(1 << 1);
    pub const WRAPPER: Self = Self(1 << 2);
    pub const INLINE: Self = Self(1 << 3);

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && !other.is_empty()
    }
}

impl std::ops::BitOr for StyleUsage {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for StyleUsage {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Where an element sits inside its parent block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ElementPosition {
    pub first: bool,
    pub last: bool,
    /// An empty-line spacer preceded this element; its margin (in `lh`)
    /// replaces the element's top margin.
    pub empty_line_margin: Option<Decimal>,
    /// An empty line was seen earlier in the block, so the bottom margin of
    /// the last element is kept.
    pub keep_margin_bottom: bool,
}

impl ElementPosition {
    /// Element outside any block: no filtering.
    pub fn standalone() -> Self {
        Self::default()
    }

    /// Position of child `index` among `count` siblings.
    pub fn in_block(index: usize, count: usize) -> Self {
        Self {
            first: index == 0,
            last: index + 1 == count,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_usage_flags() {
        let mut usage = StyleUsage::TEXT;
        usage |= StyleUsage::INLINE;
        assert!(usage.contains(StyleUsage::TEXT));
        assert!(usage.contains(StyleUsage::INLINE));
        assert!(!usage.contains(StyleUsage::IMAGE));
        assert!(!usage.contains(StyleUsage::empty()));
    }

    #[test]
    fn test_element_position_in_block() {
        let first = ElementPosition::in_block(0, 3);
        assert!(first.first && !first.last);
        let last = ElementPosition::in_block(2, 3);
        assert!(!last.first && last.last);
        let only = ElementPosition::in_block(0, 1);
        assert!(only.first && only.last);
    }
}
