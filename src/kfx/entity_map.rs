//! Container entity map ($419) and the dependency graph behind it.
//!
//! Dependencies are found by walking fragment values for symbols that name
//! other entity fragments. The walk is depth bounded: a value nested deeper
//! than [`MAX_DEPTH`] fails the document instead of losing dependencies.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::{Error, Result};
use crate::kfx::fragment::{Fragment, FragmentList};
use crate::kfx::ion::{IonValue, StructBuilder};
use crate::kfx::symbols::{LocalSymbols, sym};

/// Deepest nesting the dependency visitor descends into.
pub const MAX_DEPTH: usize = 256;

/// Dependencies of one fragment, by fragment id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityDependency {
    pub fid: String,
    pub mandatory: Vec<String>,
    pub optional: Vec<String>,
}

/// Collect every symbol id referenced by `value`.
///
/// Fails with [`Error::NestingTooDeep`] (naming `fid`) past [`MAX_DEPTH`].
pub fn referenced_symbols(fid: &str, value: &IonValue, out: &mut BTreeSet<u32>) -> Result<()> {
    if visit(value, 0, out) {
        Ok(())
    } else {
        Err(Error::NestingTooDeep {
            fid: fid.to_string(),
            limit: MAX_DEPTH,
        })
    }
}

/// `false` once the walk passes [`MAX_DEPTH`].
fn visit(value: &IonValue, depth: usize, out: &mut BTreeSet<u32>) -> bool {
    if depth > MAX_DEPTH {
        return false;
    }
    match value {
        IonValue::Symbol(id) => {
            out.insert(*id);
            true
        }
        IonValue::List(items) => items.iter().all(|item| visit(item, depth + 1, out)),
        IonValue::Struct(fields) => fields.iter().all(|(_, field)| visit(field, depth + 1, out)),
        IonValue::Annotated(_, inner) => visit(inner, depth, out),
        IonValue::Null
        | IonValue::Bool(_)
        | IonValue::Int(_)
        | IonValue::Float(_)
        | IonValue::Decimal(_)
        | IonValue::String(_)
        | IonValue::Blob(_) => true,
    }
}

/// Compute the `$253` dependency list.
///
/// * `$164` external resource → `$417` raw media at its `$165` location
///   (optional).
/// * `$260` section → every `$164` its storyline references (mandatory).
pub fn compute_dependencies(fragments: &FragmentList, symbols: &LocalSymbols) -> Result<Vec<EntityDependency>> {
    let mut deps = Vec::new();

    for (ftype, raw_type) in [(sym::EXTERNAL_RESOURCE, sym::RAW_MEDIA), (sym::FONT, sym::RAW_FONT)] {
        for resource in fragments.of_type(ftype) {
            let location = resource
                .as_ion()
                .and_then(|v| v.get(sym::LOCATION))
                .and_then(IonValue::as_string);
            match location {
                Some(location) if fragments.contains(raw_type, location) => {
                    deps.push(EntityDependency {
                        fid: resource.fid.clone(),
                        optional: vec![location.to_string()],
                        ..EntityDependency::default()
                    });
                }
                _ => log::warn!("resource {} has no raw data", resource.fid),
            }
        }
    }

    let resource_ids: HashSet<&str> = fragments
        .of_type(sym::EXTERNAL_RESOURCE)
        .map(|f| f.fid.as_str())
        .collect();
    if resource_ids.is_empty() {
        return Ok(deps);
    }

    for section in fragments.of_type(sym::SECTION) {
        let mut referenced = BTreeSet::new();
        let Some(value) = section.as_ion() else {
            continue;
        };
        referenced_symbols(&section.fid, value, &mut referenced)?;

        // Page templates name their storyline; its entries name the resources.
        let stories: Vec<u32> = referenced.iter().copied().collect();
        for story in stories {
            let text = symbols.text_of(story);
            if let Some(storyline) = fragments.get(sym::STORYLINE, &text)
                && let Some(value) = storyline.as_ion()
            {
                referenced_symbols(&storyline.fid, value, &mut referenced)?;
            }
        }

        let mut mandatory: Vec<String> = referenced
            .iter()
            .map(|&id| symbols.text_of(id).into_owned())
            .filter(|name| resource_ids.contains(name.as_str()))
            .collect();
        mandatory.dedup();
        if !mandatory.is_empty() {
            deps.push(EntityDependency {
                fid: section.fid.clone(),
                mandatory,
                ..EntityDependency::default()
            });
        }
    }
    Ok(deps)
}

/// Build the `$419` value: one container listing every entity fragment,
/// plus the dependency list.
pub fn build_entity_map(
    container_id: &str,
    fragments: &FragmentList,
    deps: &[EntityDependency],
    symbols: &mut LocalSymbols,
) -> Result<IonValue> {
    for dep in deps {
        for fid in std::iter::once(&dep.fid).chain(&dep.mandatory).chain(&dep.optional) {
            if !fragments.contains_id(fid) {
                return Err(Error::MissingEntity(fid.clone()));
            }
        }
    }

    let ids: Vec<IonValue> = fragments
        .iter()
        .filter(|f| f.is_entity())
        .map(|f| IonValue::Symbol(symbols.get_or_intern(&f.fid)))
        .collect();
    let container = StructBuilder::new()
        .string(sym::ID, container_id)
        .list(sym::CONTAINS, ids)
        .build();

    let dep_list: Vec<IonValue> = deps
        .iter()
        .map(|dep| {
            let mut intern = |fids: &[String]| -> Option<IonValue> {
                (!fids.is_empty()).then(|| {
                    IonValue::List(
                        fids.iter()
                            .map(|fid| IonValue::Symbol(symbols.get_or_intern(fid)))
                            .collect(),
                    )
                })
            };
            let mandatory = intern(&dep.mandatory);
            let optional = intern(&dep.optional);
            StructBuilder::new()
                .symbol(sym::ID, symbols.get_or_intern(&dep.fid))
                .maybe(sym::MANDATORY_DEPENDENCIES, mandatory)
                .maybe(sym::OPTIONAL_DEPENDENCIES, optional)
                .build()
        })
        .collect();

    let map = StructBuilder::new()
        .list(sym::CONTAINER_LIST, vec![container])
        .maybe(
            sym::ENTITY_DEPENDENCIES,
            (!dep_list.is_empty()).then_some(IonValue::List(dep_list)),
        )
        .build();

    verify_entity_map(&map, fragments, symbols)?;
    Ok(map)
}

/// Check that every entity fragment is listed exactly once.
///
/// Ids shared by fragments of different types (an anchor named like a
/// section) are listed once per fragment.
pub fn verify_entity_map(map: &IonValue, fragments: &FragmentList, symbols: &LocalSymbols) -> Result<()> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let containers = map
        .get(sym::CONTAINER_LIST)
        .and_then(IonValue::as_list)
        .unwrap_or_default();
    for container in containers {
        let ids = container
            .get(sym::CONTAINS)
            .and_then(IonValue::as_list)
            .unwrap_or_default();
        for id in ids.iter().filter_map(IonValue::as_symbol) {
            *seen.entry(symbols.text_of(id).into_owned()).or_default() += 1;
        }
    }

    let mut expected: HashMap<&str, usize> = HashMap::new();
    for fragment in fragments.iter().filter(|f| f.is_entity()) {
        *expected.entry(fragment.fid.as_str()).or_default() += 1;
    }

    let problems: Vec<String> = fragments
        .iter()
        .filter(|f| f.is_entity() && seen.get(&f.fid) != expected.get(f.fid.as_str()))
        .map(|f| f.fid.clone())
        .collect();
    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::EntityMapIncomplete(problems))
    }
}

/// Wrap the entity map as its root fragment.
pub fn entity_map_fragment(map: IonValue) -> Fragment {
    Fragment::root(sym::CONTAINER_ENTITY_MAP, map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (FragmentList, LocalSymbols) {
        let mut symbols = LocalSymbols::new();
        let mut list = FragmentList::new();
        let story = symbols.get_or_intern("l1");
        let resource = symbols.get_or_intern("rsrc1");
        let section = symbols.get_or_intern("c0");

        list.push(Fragment::raw(sym::RAW_MEDIA, "resource/rsrc1", vec![1, 2, 3]))
            .unwrap();
        list.push(Fragment::new(
            sym::EXTERNAL_RESOURCE,
            "rsrc1",
            StructBuilder::new()
                .symbol(sym::RESOURCE_NAME, resource)
                .string(sym::LOCATION, "resource/rsrc1")
                .build(),
        ))
        .unwrap();
        let image = StructBuilder::new()
            .int(sym::ID, 1001)
            .symbol(sym::TYPE, sym::IMAGE)
            .symbol(sym::RESOURCE_NAME, resource)
            .build();
        list.push(Fragment::new(
            sym::STORYLINE,
            "l1",
            StructBuilder::new()
                .symbol(sym::STORY_NAME, story)
                .list(sym::CONTENT_LIST, vec![image])
                .build(),
        ))
        .unwrap();
        let template = StructBuilder::new()
            .int(sym::ID, 1000)
            .symbol(sym::STORY_NAME, story)
            .build();
        list.push(Fragment::new(
            sym::SECTION,
            "c0",
            StructBuilder::new()
                .symbol(sym::SECTION_NAME, section)
                .list(sym::PAGE_TEMPLATES, vec![template])
                .build(),
        ))
        .unwrap();
        list.push(Fragment::root(sym::METADATA, IonValue::Null)).unwrap();
        (list, symbols)
    }

    #[test]
    fn test_dependencies() {
        let (list, symbols) = sample();
        let deps = compute_dependencies(&list, &symbols).unwrap();
        assert_eq!(
            deps,
            vec![
                EntityDependency {
                    fid: "rsrc1".into(),
                    mandatory: vec![],
                    optional: vec!["resource/rsrc1".into()],
                },
                EntityDependency {
                    fid: "c0".into(),
                    mandatory: vec!["rsrc1".into()],
                    optional: vec![],
                },
            ]
        );
    }

    #[test]
    fn test_font_depends_on_raw_font() {
        let (mut list, symbols) = sample();
        list.push(Fragment::raw(sym::RAW_FONT, "resource/rsrc2", vec![0, 1, 0, 0]))
            .unwrap();
        list.push(Fragment::new(
            sym::FONT,
            "rsrc2",
            StructBuilder::new()
                .string(sym::FONT_FAMILY, "Literata")
                .string(sym::LOCATION, "resource/rsrc2")
                .build(),
        ))
        .unwrap();
        let deps = compute_dependencies(&list, &symbols).unwrap();
        assert!(deps.contains(&EntityDependency {
            fid: "rsrc2".into(),
            mandatory: vec![],
            optional: vec!["resource/rsrc2".into()],
        }));
    }

    #[test]
    fn test_entity_map_lists_each_entity_once() {
        let (list, mut symbols) = sample();
        let deps = compute_dependencies(&list, &symbols).unwrap();
        let map = build_entity_map("CR!TEST", &list, &deps, &mut symbols).unwrap();

        let container = &map.get(sym::CONTAINER_LIST).and_then(IonValue::as_list).unwrap()[0];
        assert_eq!(container.get(sym::ID).and_then(IonValue::as_string), Some("CR!TEST"));
        let ids: Vec<String> = container
            .get(sym::CONTAINS)
            .and_then(IonValue::as_list)
            .unwrap()
            .iter()
            .map(|id| symbols.text_of(id.as_symbol().unwrap()).into_owned())
            .collect();
        assert_eq!(ids, ["resource/rsrc1", "rsrc1", "l1", "c0"]);
        assert_eq!(
            map.get(sym::ENTITY_DEPENDENCIES).and_then(IonValue::as_list).map(<[_]>::len),
            Some(2)
        );
    }

    #[test]
    fn test_missing_dependency_target() {
        let (list, mut symbols) = sample();
        let deps = vec![EntityDependency {
            fid: "c0".into(),
            mandatory: vec!["rsrc9".into()],
            optional: vec![],
        }];
        let err = build_entity_map("CR!X", &list, &deps, &mut symbols).unwrap_err();
        assert!(matches!(err, Error::MissingEntity(ref id) if id == "rsrc9"));
    }

    #[test]
    fn test_verify_detects_missing_entry() {
        let (list, mut symbols) = sample();
        let c0 = symbols.get_or_intern("c0");
        let map = StructBuilder::new()
            .list(
                sym::CONTAINER_LIST,
                vec![StructBuilder::new()
                    .list(sym::CONTAINS, vec![IonValue::Symbol(c0), IonValue::Symbol(c0)])
                    .build()],
            )
            .build();
        match verify_entity_map(&map, &list, &symbols) {
            Err(Error::EntityMapIncomplete(ids)) => {
                assert_eq!(ids, ["resource/rsrc1", "rsrc1", "l1", "c0"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_depth_bound_is_an_error() {
        let mut value = IonValue::Symbol(900);
        for _ in 0..MAX_DEPTH + 8 {
            value = IonValue::List(vec![value]);
        }
        let mut out = BTreeSet::new();
        let err = referenced_symbols("l9", &value, &mut out).unwrap_err();
        assert!(matches!(err, Error::NestingTooDeep { ref fid, limit: MAX_DEPTH } if fid == "l9"));

        let shallow = IonValue::List(vec![IonValue::Symbol(900)]);
        referenced_symbols("l1", &shallow, &mut out).unwrap();
        assert!(out.contains(&900));
    }

    #[test]
    fn test_deeply_nested_image_is_a_dependency() {
        let (mut list, mut symbols) = sample();
        let story = symbols.get_or_intern("l2");
        let resource = symbols.get_or_intern("rsrc1");
        let mut entry = StructBuilder::new()
            .int(sym::ID, 2000)
            .symbol(sym::RESOURCE_NAME, resource)
            .build();
        for eid in 0..40 {
            entry = StructBuilder::new()
                .int(sym::ID, 2001 + eid)
                .list(sym::CONTENT_LIST, vec![entry])
                .build();
        }
        list.push(Fragment::new(
            sym::STORYLINE,
            "l2",
            StructBuilder::new()
                .symbol(sym::STORY_NAME, story)
                .list(sym::CONTENT_LIST, vec![entry])
                .build(),
        ))
        .unwrap();
        let template = StructBuilder::new().int(sym::ID, 1999).symbol(sym::STORY_NAME, story).build();
        let section = symbols.get_or_intern("c1");
        list.push(Fragment::new(
            sym::SECTION,
            "c1",
            StructBuilder::new()
                .symbol(sym::SECTION_NAME, section)
                .list(sym::PAGE_TEMPLATES, vec![template])
                .build(),
        ))
        .unwrap();

        let deps = compute_dependencies(&list, &symbols).unwrap();
        let c1 = deps.iter().find(|d| d.fid == "c1").unwrap();
        assert_eq!(c1.mandatory, ["rsrc1"]);
    }

    #[test]
    fn test_anchor_sharing_section_id() {
        let (mut list, mut symbols) = sample();
        let c0 = symbols.get_or_intern("c0");
        list.push(Fragment::new(
            sym::ANCHOR,
            "c0",
            StructBuilder::new().symbol(sym::ANCHOR_NAME, c0).build(),
        ))
        .unwrap();
        let deps = compute_dependencies(&list, &symbols).unwrap();
        let map = build_entity_map("CR!X", &list, &deps, &mut symbols).unwrap();
        let container = &map.get(sym::CONTAINER_LIST).and_then(IonValue::as_list).unwrap()[0];
        let listed = container.get(sym::CONTAINS).and_then(IonValue::as_list).unwrap();
        assert_eq!(listed.iter().filter(|id| id.as_symbol() == Some(c0)).count(), 2);
    }
}
