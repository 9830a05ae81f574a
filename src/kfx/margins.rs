//! Vertical margin collapsing over a finished storyline.
//!
//! Runs after every style is resolved. Each wrapper is processed top-down:
//! sibling margins collapse into the following element's top margin, a
//! wrapper absorbs its first child's top and its last child's bottom margin,
//! then siblings are collapsed once more so margins pulled up into a wrapper
//! reach whatever follows it. Entries whose margins changed get a style
//! variant; the original style is left untouched.
//!
//! Two margins collapse to the larger when both are positive, to the more
//! negative when both are negative, and to their sum otherwise.

use crate::kfx::storyline::{ContentEntry, ContentKind, Storyline};
use crate::kfx::style::StyleRegistry;
use crate::kfx::style::units::Measure;
use crate::kfx::symbols::sym;

const EPSILON: f64 = 1e-9;

/// Collapse two adjoining margins.
pub fn collapse_values(a: f64, b: f64) -> f64 {
    if a >= 0.0 && b >= 0.0 {
        a.max(b)
    } else if a <= 0.0 && b <= 0.0 {
        a.min(b)
    } else {
        a + b
    }
}

/// Margin state of one entry while collapsing.
#[derive(Debug, Clone, Default, PartialEq)]
struct Node {
    top: Option<f64>,
    bottom: Option<f64>,
    /// Margins as resolved, to detect changes.
    resolved: (Option<f64>, Option<f64>),
    /// Has a style that can carry margins.
    styled: bool,
    wrapper: bool,
    /// Text entry without content; its own margins collapse together.
    empty: bool,
    children: Vec<Node>,
}

impl Node {
    fn build(entry: &ContentEntry, styles: &StyleRegistry<'_>) -> Self {
        let (top, bottom) = entry.style.as_deref().map_or((None, None), |name| {
            let properties = styles.flatten(name);
            let lh = |symbol| {
                properties
                    .get(&symbol)
                    .and_then(Measure::from_ion)
                    .filter(|m| m.unit == sym::UNIT_LH && m.value.abs() > EPSILON)
                    .map(|m| m.value)
            };
            (lh(sym::MARGIN_TOP), lh(sym::MARGIN_BOTTOM))
        });
        let wrapper = entry.kind == ContentKind::Wrapper;
        let children = if wrapper {
            entry.children.iter().map(|child| Node::build(child, styles)).collect()
        } else {
            Vec::new()
        };
        Self {
            top,
            bottom,
            resolved: (top, bottom),
            styled: entry.style.is_some(),
            wrapper,
            empty: entry.kind == ContentKind::Text && entry.content.is_none() && entry.mixed.is_empty(),
            children,
        }
    }

    fn changed(&self) -> bool {
        !same(self.top, self.resolved.0) || !same(self.bottom, self.resolved.1)
    }
}

fn same(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => (a - b).abs() <= EPSILON,
        _ => false,
    }
}

fn merge_into(target: &mut Option<f64>, value: f64) {
    *target = Some(target.map_or(value, |existing| collapse_values(existing, value)));
}

/// Collapse the margins of every entry in `storyline`, replacing the styles
/// of entries whose margins changed. Returns the number of entries restyled.
pub fn collapse_storyline(storyline: &mut Storyline, styles: &mut StyleRegistry<'_>) -> usize {
    let mut root = Node {
        wrapper: true,
        children: storyline.entries.iter().map(|e| Node::build(e, styles)).collect(),
        ..Node::default()
    };
    collapse(&mut root, true);

    let restyled = apply(&mut storyline.entries, &root.children, styles);
    if restyled > 0 {
        log::debug!("{}: collapsed margins on {restyled} entries", storyline.story_name);
    }
    restyled
}

fn collapse(node: &mut Node, root: bool) {
    if node.children.is_empty() {
        return;
    }
    collapse_empty(&mut node.children);
    collapse_siblings(&mut node.children);
    // The storyline itself renders nothing, so its children keep their
    // outer margins.
    if !root && node.styled {
        collapse_first_child(node);
    }
    for child in node.children.iter_mut().filter(|c| c.wrapper) {
        collapse(child, false);
    }
    if !root && node.styled {
        collapse_last_child(node);
    }
    collapse_siblings(&mut node.children);
}

fn collapse_empty(children: &mut [Node]) {
    for child in children.iter_mut().filter(|c| c.empty) {
        if child.top.is_none() && child.bottom.is_none() {
            continue;
        }
        let collapsed = collapse_values(child.top.unwrap_or(0.0), child.bottom.unwrap_or(0.0));
        child.top = None;
        child.bottom = Some(collapsed);
    }
}

fn collapse_siblings(children: &mut [Node]) {
    for i in 1..children.len() {
        let (before, after) = children.split_at_mut(i);
        let curr = &mut before[i - 1];
        let next = &mut after[0];
        if !next.styled {
            continue;
        }
        let Some(bottom) = curr.bottom else {
            continue;
        };
        // Plain siblings collapse only when both carry a margin; a wrapper
        // on either side always takes part.
        if curr.wrapper || next.wrapper || next.top.is_some() {
            merge_into(&mut next.top, bottom);
            curr.bottom = None;
        }
    }
}

fn collapse_first_child(node: &mut Node) {
    let Some(first) = node.children.first_mut() else {
        return;
    };
    if let Some(top) = first.top.take() {
        merge_into(&mut node.top, top);
    }
}

fn collapse_last_child(node: &mut Node) {
    let Some(last) = node.children.last_mut() else {
        return;
    };
    if let Some(bottom) = last.bottom.take() {
        merge_into(&mut node.bottom, bottom);
    }
}

fn apply(entries: &mut [ContentEntry], nodes: &[Node], styles: &mut StyleRegistry<'_>) -> usize {
    let mut restyled = 0;
    for (entry, node) in entries.iter_mut().zip(nodes) {
        if node.wrapper {
            restyled += apply(&mut entry.children, &node.children, styles);
        }
        if !node.changed() {
            continue;
        }
        let Some(name) = entry.style.clone() else {
            continue;
        };
        let usage = styles.usage(&name);
        let variant = styles.derive_variant(&name, |properties| {
            for (symbol, value) in [(sym::MARGIN_TOP, node.top), (sym::MARGIN_BOTTOM, node.bottom)] {
                match value {
                    Some(v) if v.abs() > EPSILON => {
                        properties.insert(symbol, Measure::lh(v).to_ion());
                    }
                    _ => {
                        properties.remove(&symbol);
                    }
                }
            }
        });
        styles.mark_usage(&variant, usage);
        entry.style = Some(variant);
        restyled += 1;
    }
    restyled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kfx::storyline::{ContentAccumulator, EidCounter, StorylineBuilder};
    use crate::kfx::style::{DefaultMappingTable, IgnorableTable, MergeRuleTable, StyleUsage};

    struct Tables {
        rules: MergeRuleTable,
        defaults: DefaultMappingTable,
        ignorable: IgnorableTable,
    }

    fn tables() -> Tables {
        Tables {
            rules: MergeRuleTable::default(),
            defaults: DefaultMappingTable::default(),
            ignorable: IgnorableTable::default(),
        }
    }

    fn margin(styles: &StyleRegistry<'_>, entry: &ContentEntry, symbol: u32) -> Option<f64> {
        let name = entry.style.as_deref()?;
        styles.flatten(name).get(&symbol).and_then(Measure::from_ion).map(|m| m.value)
    }

    #[test]
    fn test_collapse_values() {
        assert_eq!(collapse_values(1.0, 0.5), 1.0);
        assert_eq!(collapse_values(-1.0, -0.5), -1.0);
        assert_eq!(collapse_values(1.0, -0.25), 0.75);
        assert_eq!(collapse_values(0.0, 0.5), 0.5);
    }

    #[test]
    fn test_sibling_margins_collapse_into_next() {
        let t = tables();
        let mut styles = StyleRegistry::new(&t.rules, &t.defaults, &t.ignorable);
        styles.register_css("p { margin-top: 1.2em; margin-bottom: 0.6em }");
        let mut eids = EidCounter::new(1);
        let mut acc = ContentAccumulator::new(8192);

        let mut builder = StorylineBuilder::new("l1", "c0", &mut eids, &mut styles);
        for text in ["a", "b", "c"] {
            let content = acc.add(text);
            builder.add_content_deferred(ContentKind::Text, content, "p");
        }
        let mut storyline = builder.finish();
        assert_eq!(collapse_storyline(&mut storyline, &mut styles), 2);

        let [a, b, c] = &storyline.entries[..] else {
            panic!("expected three entries");
        };
        assert_eq!(margin(&styles, a, sym::MARGIN_TOP), Some(1.0));
        assert_eq!(margin(&styles, a, sym::MARGIN_BOTTOM), None);
        assert_eq!(margin(&styles, b, sym::MARGIN_TOP), Some(1.0));
        assert_eq!(margin(&styles, b, sym::MARGIN_BOTTOM), None);
        assert_eq!(margin(&styles, c, sym::MARGIN_BOTTOM), Some(0.5));
        assert!(styles.usage(a.style.as_deref().unwrap()).contains(StyleUsage::TEXT));
    }

    #[test]
    fn test_wrapper_bottom_moves_to_following_sibling() {
        let t = tables();
        let mut styles = StyleRegistry::new(&t.rules, &t.defaults, &t.ignorable);
        styles.register_css(".epigraph { margin-bottom: 1.2em } p { margin-top: 0.6em }");
        let mut eids = EidCounter::new(1);
        let mut acc = ContentAccumulator::new(8192);

        let mut builder = StorylineBuilder::new("l1", "c0", &mut eids, &mut styles);
        builder.start_block(Some("epigraph"));
        let quote = acc.add("quote");
        builder.add_content_deferred(ContentKind::Text, quote, "epigraph p");
        builder.end_block();
        let after = acc.add("after");
        builder.add_content_deferred(ContentKind::Text, after, "p");
        let mut storyline = builder.finish();
        collapse_storyline(&mut storyline, &mut styles);

        let wrapper = &storyline.entries[0];
        assert_eq!(margin(&styles, wrapper, sym::MARGIN_BOTTOM), None);
        assert_eq!(margin(&styles, &storyline.entries[1], sym::MARGIN_TOP), Some(1.0));
    }

    #[test]
    fn test_wrapper_absorbs_first_child_top() {
        let mut root = Node {
            wrapper: true,
            children: vec![Node {
                top: Some(0.5),
                styled: true,
                wrapper: true,
                children: vec![
                    Node {
                        top: Some(1.5),
                        styled: true,
                        ..Node::default()
                    },
                    Node {
                        bottom: Some(0.25),
                        styled: true,
                        ..Node::default()
                    },
                ],
                ..Node::default()
            }],
            ..Node::default()
        };
        collapse(&mut root, true);

        let wrapper = &root.children[0];
        assert_eq!(wrapper.top, Some(1.5));
        assert_eq!(wrapper.bottom, Some(0.25));
        assert_eq!(wrapper.children[0].top, None);
        assert_eq!(wrapper.children[1].bottom, None);
    }

    #[test]
    fn test_unstyled_wrapper_keeps_child_margins() {
        let mut root = Node {
            wrapper: true,
            children: vec![Node {
                wrapper: true,
                children: vec![Node {
                    top: Some(1.0),
                    styled: true,
                    ..Node::default()
                }],
                ..Node::default()
            }],
            ..Node::default()
        };
        collapse(&mut root, true);
        assert_eq!(root.children[0].children[0].top, Some(1.0));
    }

    #[test]
    fn test_empty_entry_collapses_own_margins() {
        let mut children = vec![Node {
            top: Some(1.0),
            bottom: Some(0.5),
            styled: true,
            empty: true,
            ..Node::default()
        }];
        collapse_empty(&mut children);
        assert_eq!(children[0].top, None);
        assert_eq!(children[0].bottom, Some(1.0));
    }
}
