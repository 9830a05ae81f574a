//! Property tests: rounding idempotence, EID and position-id monotonicity.

use proptest::prelude::*;

use kfxgen::Config;
use kfxgen::kfx::assemble::assemble;
use kfxgen::kfx::ion::IonValue;
use kfxgen::kfx::position::{build_position_id_map, collect_position_items, total_positions};
use kfxgen::kfx::style::StyleRegistry;
use kfxgen::kfx::style::units::{round_decimals, round_significant};
use kfxgen::kfx::symbols::sym;
use kfxgen::model::{Block, Inline, Section};
use kfxgen::{Document, Metadata};

fn inline() -> impl Strategy<Value = Inline> {
    prop_oneof![
        "[a-zA-Z ]{0,30}".prop_map(Inline::text),
        "[a-z ]{1,12}".prop_map(|t| Inline::styled("emphasis", vec![Inline::text(t)])),
    ]
}

fn block() -> impl Strategy<Value = Block> {
    let leaf = prop_oneof![
        prop::collection::vec(inline(), 0..4).prop_map(Block::paragraph),
        (1u8..7, "[a-z ]{1,20}").prop_map(|(level, t)| Block::heading(level, vec![Inline::text(t)])),
        Just(Block::EmptyLine),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        (prop::collection::vec(inner, 0..4), prop::option::of("poem|epigraph|cite")).prop_map(|(blocks, class)| {
            Block::Container {
                id: None,
                class,
                blocks,
            }
        })
    })
}

fn document() -> impl Strategy<Value = Document> {
    prop::collection::vec(prop::collection::vec(block(), 0..6), 1..4).prop_map(|sections| {
        sections.into_iter().enumerate().fold(
            Document::new("urn:prop").with_metadata(Metadata::new("Prop")),
            |doc, (i, blocks)| {
                let mut section = Section::new().with_title(format!("Section {i}"));
                section.blocks = blocks;
                doc.with_section(section)
            },
        )
    })
}

proptest! {
    #[test]
    fn test_round_significant_idempotent(value in -1.0e6f64..1.0e6, digits in 1u32..8) {
        let once = round_significant(value, digits);
        prop_assert_eq!(round_significant(once, digits), once);
    }

    #[test]
    fn test_round_decimals_idempotent(value in -1.0e4f64..1.0e4, decimals in 0u32..7) {
        let once = round_decimals(value, decimals);
        prop_assert_eq!(round_decimals(once, decimals), once);
    }

    #[test]
    fn test_eids_strictly_increase(doc in document()) {
        let config = Config::default();
        let mut styles = StyleRegistry::new(&config.merge_rules, &config.defaults, &config.ignorable);
        let asm = assemble(&doc, &mut styles, &config.settings);

        let eids: Vec<u32> = asm.storylines.iter().flat_map(|s| s.eids()).collect();
        prop_assert!(eids.windows(2).all(|w| w[0] < w[1]), "{:?}", eids);
        prop_assert!(eids.iter().all(|&eid| eid >= config.settings.first_eid));
    }

    #[test]
    fn test_position_ids_monotonic(doc in document()) {
        let config = Config::default();
        let mut styles = StyleRegistry::new(&config.merge_rules, &config.defaults, &config.ignorable);
        let asm = assemble(&doc, &mut styles, &config.settings);
        let items = collect_position_items(&asm.storylines);
        let map = build_position_id_map(&items);

        let entries: Vec<(i64, i64)> = map
            .as_list()
            .unwrap()
            .iter()
            .map(|e| {
                (
                    e.get(sym::PID).and_then(IonValue::as_int).unwrap(),
                    e.get(sym::EID).and_then(IonValue::as_int).unwrap(),
                )
            })
            .collect();
        prop_assert!(entries.windows(2).all(|w| w[0].0 <= w[1].0));
        let (last_pid, last_eid) = *entries.last().unwrap();
        prop_assert_eq!(last_eid, 0);
        prop_assert_eq!(last_pid as usize, total_positions(&items));
        prop_assert_eq!(total_positions(&items), items.iter().map(|i| i.length).sum::<usize>());
    }
}
