//! Style resolution scenarios: unit conversion, font-size compression,
//! line-height coupling and deduplication.

use kfxgen::kfx::assemble::assemble;
use kfxgen::model::{Block, Inline, Section};
use kfxgen::{Config, Document};
use kfxgen::kfx::ion::{Decimal, IonValue};
use kfxgen::kfx::style::registry::couple_line_height;
use kfxgen::kfx::style::units::Measure;
use kfxgen::kfx::style::{ElementPosition, PropertyMap, StyleRegistry, StyleUsage};
use kfxgen::kfx::symbols::{LocalSymbols, sym};

fn registry<'a>(config: &'a Config, css: &str) -> StyleRegistry<'a> {
    let mut registry = StyleRegistry::new(&config.merge_rules, &config.defaults, &config.ignorable);
    registry.register_css(css);
    registry
}

fn measure(props: &PropertyMap, symbol: u32) -> Measure {
    Measure::from_ion(&props[&symbol]).unwrap()
}

#[test]
fn test_margin_em_becomes_line_height_units() {
    let config = Config::default();
    let mut reg = registry(&config, ".title { margin-top: 0.67em }");
    let props = reg
        .resolve_properties("title", ElementPosition::standalone())
        .unwrap();
    let margin = measure(&props, sym::MARGIN_TOP);
    assert_eq!(margin.unit, sym::UNIT_LH);
    assert!((margin.value - 0.55833).abs() < 1e-5, "got {}", margin.value);
}

#[test]
fn test_font_size_percent_is_compressed() {
    let config = Config::default();
    let mut reg = registry(&config, ".big { font-size: 140% }");
    let props = reg
        .resolve_properties("big", ElementPosition::standalone())
        .unwrap();
    let size = measure(&props, sym::FONT_SIZE);
    assert_eq!(size.unit, sym::UNIT_REM);
    assert!((size.value - 1.25).abs() < 1e-9);
}

#[test]
fn test_coupling_enlarged_font() {
    let mut props = PropertyMap::new();
    props.insert(sym::FONT_SIZE, Measure::rem(1.25).to_ion());
    props.insert(sym::MARGIN_TOP, Measure::lh(0.55833).to_ion());
    couple_line_height(&mut props, false);

    let line_height = measure(&props, sym::LINE_HEIGHT);
    assert_eq!(line_height.unit, sym::UNIT_LH);
    assert!((line_height.value - 1.0101).abs() < 1e-9);
    let margin = measure(&props, sym::MARGIN_TOP);
    assert!((margin.value - 0.55833 / 1.0101).abs() < 1e-5, "got {}", margin.value);
}

#[test]
fn test_coupling_reduced_font() {
    let mut props = PropertyMap::new();
    props.insert(sym::FONT_SIZE, Measure::rem(0.75).to_ion());
    props.insert(sym::MARGIN_TOP, Measure::lh(0.41667).to_ion());
    couple_line_height(&mut props, false);

    assert_eq!(props[&sym::LINE_HEIGHT], Measure::lh(1.0).to_ion());
    let margin = measure(&props, sym::MARGIN_TOP);
    assert!((margin.value - 0.55556).abs() < 1e-5, "got {}", margin.value);
}

#[test]
fn test_identical_selectors_share_one_style() {
    let config = Config::default();
    let mut reg = registry(
        &config,
        ".note { font-style: italic; margin-left: 2em } .aside { margin-left: 2em; font-style: italic }",
    );
    let note = reg
        .resolve("note", ElementPosition::standalone(), StyleUsage::TEXT)
        .unwrap();
    let aside = reg
        .resolve("aside", ElementPosition::standalone(), StyleUsage::WRAPPER)
        .unwrap();
    assert_eq!(note, aside);
    assert!(reg.usage(&note).contains(StyleUsage::TEXT));
    assert!(reg.usage(&note).contains(StyleUsage::WRAPPER));

    let mut symbols = LocalSymbols::new();
    let fragments = reg.build_fragments(&mut symbols);
    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0].fid, note);
}

#[test]
fn test_style_fragment_names_itself() {
    let config = Config::default();
    let mut reg = registry(&config, ".b { font-weight: bold }");
    let name = reg
        .resolve("b", ElementPosition::standalone(), StyleUsage::INLINE)
        .unwrap();
    let mut symbols = LocalSymbols::new();
    let fragments = reg.build_fragments(&mut symbols);
    let value = fragments[0].as_ion().unwrap();
    let style_name = value.get(sym::STYLE_NAME).and_then(IonValue::as_symbol).unwrap();
    assert_eq!(symbols.text_of(style_name), name);
    assert_eq!(value.get(sym::FONT_WEIGHT), Some(&IonValue::Symbol(sym::BOLD)));
}

#[test]
fn test_decimal_display() {
    assert_eq!(Decimal::new(10101, -4).to_string(), "1.0101");
}

#[test]
fn test_nested_spans_and_own_classes_through_assembly() {
    let config = Config::default();
    let mut styles = registry(
        &config,
        "p { margin-left: 1em } .indent { margin-left: 2em } \
         .outer { margin-top: 1.2em; padding-left: 1em } .inner { margin-top: 0.6em; padding-left: 1em }",
    );
    let content = vec![
        Inline::styled("outer", vec![Inline::text("ab"), Inline::styled("inner", vec![Inline::text("c")])]),
    ];
    let doc = Document::new("urn:test:merge").with_section(Section::new().with_block(Block::Paragraph {
        id: None,
        class: Some("indent".into()),
        content,
    }));
    let assembly = assemble(&doc, &mut styles, &config.settings);

    let entry = &assembly.storylines[0].entries[0];
    let paragraph = styles.flatten(entry.style.as_deref().unwrap());
    assert_eq!(measure(&paragraph, sym::MARGIN_LEFT), Measure::percent(9.375));

    let spans: Vec<(usize, usize)> = entry.events.iter().map(|e| (e.offset, e.length)).collect();
    assert_eq!(spans, [(0, 2), (2, 1)]);
    let inner = styles.flatten(entry.events[1].style.as_deref().unwrap());
    assert_eq!(measure(&inner, sym::MARGIN_TOP), Measure::lh(1.0));
    assert_eq!(measure(&inner, sym::PADDING_LEFT), Measure::percent(6.25));
    let outer = styles.flatten(entry.events[0].style.as_deref().unwrap());
    assert_eq!(measure(&outer, sym::PADDING_LEFT), Measure::percent(3.125));
}
