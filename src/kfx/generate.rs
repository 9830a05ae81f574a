//! Single-document pipeline: styles, storylines, book fragments, position
//! maps, entity map and container serialization.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::kfx::assemble::{Assembly, assemble};
use crate::kfx::container::{container_id, serialize_container};
use crate::kfx::entity_map::{build_entity_map, compute_dependencies, entity_map_fragment};
use crate::kfx::fragment::{Fragment, FragmentData, FragmentList};
use crate::kfx::fragments::{
    build_anchors, build_auxiliary_data, build_content_features, build_format_capabilities,
    build_fonts, build_navigation, build_resource_path, build_resources, reflow_section_size,
};
use crate::kfx::metadata::{MetadataContext, build_book_metadata, build_document_data, build_metadata};
use crate::kfx::position::{
    build_location_map, build_position_id_map, build_position_map, collect_position_items, total_positions,
};
use crate::kfx::style::StyleRegistry;
use crate::kfx::symbols::{LocalSymbols, name_of, sym};
use crate::model::Document;

/// Cooperative cancellation, checked once before a document starts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A fully built, not yet serialized container.
#[derive(Debug)]
pub struct Container {
    pub container_id: String,
    pub fragments: FragmentList,
    pub symbols: LocalSymbols,
}

impl Container {
    /// Text rendering of every fragment, for debugging.
    pub fn dump(&self) -> String {
        let name = |id: u32| self.symbols.text_of(id).into_owned();
        let mut out = format!("container {}\n", self.container_id);
        out.push_str(&format!("local symbols: {}\n", self.symbols.len()));
        for fragment in &self.fragments {
            out.push_str(&format!("\n{} {}\n", name_of(fragment.ftype), fragment.fid));
            match &fragment.data {
                FragmentData::Ion(value) => out.push_str(&format!("{}\n", value.to_text(&name))),
                FragmentData::Raw(bytes) => out.push_str(&format!("<{} bytes>\n", bytes.len())),
            }
        }
        out
    }
}

/// Serialized container plus its optional debug rendering.
#[derive(Debug, Clone)]
pub struct Output {
    pub bytes: Vec<u8>,
    /// Present when `Settings::debug_dump` is set.
    pub dump: Option<String>,
}

/// Convert one document into KFX container bytes.
pub fn generate(doc: &Document, stylesheets: &[&str], config: &Config, cancel: &CancelFlag) -> Result<Vec<u8>> {
    generate_output(doc, stylesheets, config, cancel).map(|output| output.bytes)
}

/// Like [`generate`], also returning the debug dump when configured.
///
/// A panic inside the pipeline is caught and reported as
/// [`Error::Panicked`].
pub fn generate_output(doc: &Document, stylesheets: &[&str], config: &Config, cancel: &CancelFlag) -> Result<Output> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    panic::catch_unwind(AssertUnwindSafe(|| {
        let mut container = build_container(doc, stylesheets, config)?;
        let dump = config.settings.debug_dump.then(|| container.dump());
        let bytes = serialize_container(
            &container.container_id,
            &container.fragments,
            &mut container.symbols,
            &config.settings,
        )?;
        log::info!(
            "{}: {} fragments, {} bytes",
            display_id(doc),
            container.fragments.len(),
            bytes.len()
        );
        Ok(Output { bytes, dump })
    }))
    .unwrap_or_else(|payload| Err(Error::Panicked(panic_message(payload.as_ref()))))
}

fn display_id(doc: &Document) -> &str {
    if doc.id.is_empty() { "<unnamed>" } else { &doc.id }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run the pipeline up to, but not including, serialization.
pub fn build_container(doc: &Document, stylesheets: &[&str], config: &Config) -> Result<Container> {
    let settings = &config.settings;
    let mut styles = StyleRegistry::new(&config.merge_rules, &config.defaults, &config.ignorable);
    for css in stylesheets {
        styles.register_css(css);
    }

    let asm = assemble(doc, &mut styles, settings);
    let container_id = container_id(&doc.id);
    let mut symbols = LocalSymbols::new();
    let mut fragments = FragmentList::new();

    // Storylines and their sections.
    for storyline in &asm.storylines {
        fragments.push(storyline.storyline_fragment(&mut symbols))?;
        fragments.push(storyline.section_fragment(&mut symbols))?;
    }
    let section_names: Vec<String> = asm.storylines.iter().map(|s| s.section_name.clone()).collect();

    // Book level fragments that read the whole assembly.
    let cover_resource = asm.cover.as_ref().map(|(name, _)| name.as_str());
    let meta_ctx = MetadataContext::new(&doc.id, &doc.metadata, &container_id, &settings.generator_version)
        .with_cover(cover_resource);
    let book_metadata = build_book_metadata(&doc.metadata, &meta_ctx);
    let navigation = build_navigation(&asm, &mut symbols);
    let resources = build_resources(&asm, doc, &mut symbols);
    let fonts = build_fonts(&asm, doc);
    let anchors = build_anchors(&asm.anchors, &mut symbols);

    let Assembly {
        storylines, content, ..
    } = asm;

    fragments.extend(content.into_fragments(&mut symbols))?;

    // Styles still referenced by content.
    let referenced: HashSet<String> = storylines.iter().flat_map(|s| s.style_names()).collect();
    styles.retain_referenced(&referenced);
    fragments.extend(styles.build_fragments(&mut symbols))?;

    fragments.push(book_metadata)?;
    fragments.push(build_metadata(&section_names, &mut symbols))?;
    fragments.push(build_document_data(&section_names, &mut symbols))?;
    fragments.push(navigation)?;
    fragments.push(build_resource_path())?;
    fragments.extend(resources)?;
    fragments.extend(fonts)?;
    fragments.extend(anchors)?;

    // Position maps.
    let items = collect_position_items(&storylines);
    fragments.push(Fragment::root(
        sym::POSITION_MAP,
        build_position_map(&storylines, &mut symbols),
    ))?;
    fragments.push(Fragment::root(sym::POSITION_ID_MAP, build_position_id_map(&items)))?;
    fragments.push(Fragment::root(
        sym::LOCATION_MAP,
        build_location_map(&items, settings.location_stride),
    ))?;

    fragments.push(build_format_capabilities())?;
    fragments.push(build_content_features(reflow_section_size(&items)))?;
    fragments.extend(build_auxiliary_data(&section_names))?;

    // Entity map last: it must see every other fragment.
    let deps = compute_dependencies(&fragments, &symbols)?;
    let map = build_entity_map(&container_id, &fragments, &deps, &mut symbols)?;
    fragments.push(entity_map_fragment(map))?;

    log::debug!(
        "{}: {} sections, {} positions, {} local symbols",
        display_id(doc),
        section_names.len(),
        total_positions(&items),
        symbols.len()
    );

    Ok(Container {
        container_id,
        fragments,
        symbols,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kfx::symbols::{is_allowed_for_book, is_container_fragment};
    use crate::model::{Block, Inline, Metadata, Section};

    fn doc() -> Document {
        Document::new("urn:test:generate")
            .with_metadata(Metadata::new("Title").with_author("Writer"))
            .with_section(
                Section::new()
                    .with_title("One")
                    .with_block(Block::paragraph(vec![Inline::text("Hello world")])),
            )
    }

    #[test]
    fn test_cancelled_before_work() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = generate(&doc(), &[], &Config::default(), &cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_required_fragments_present() {
        let container = build_container(&doc(), &["p { text-indent: 1em }"], &Config::default()).unwrap();
        for ftype in [
            sym::METADATA,
            sym::STORYLINE,
            sym::SECTION,
            sym::POSITION_MAP,
            sym::POSITION_ID_MAP,
            sym::CONTAINER_ENTITY_MAP,
            sym::DOCUMENT_DATA,
            sym::LOCATION_MAP,
        ] {
            assert!(
                container.fragments.first_of_type(ftype).is_some(),
                "missing ${ftype}"
            );
        }
        assert!(
            container
                .fragments
                .iter()
                .all(|f| is_allowed_for_book(f.ftype) || is_container_fragment(f.ftype))
        );
    }

    #[test]
    fn test_generate_produces_container() {
        let bytes = generate(&doc(), &[], &Config::default(), &CancelFlag::new()).unwrap();
        assert_eq!(&bytes[..4], b"CONT");
    }

    #[test]
    fn test_dump_lists_fragments() {
        let mut config = Config::default();
        config.settings.debug_dump = true;
        let output = generate_output(&doc(), &[], &config, &CancelFlag::new()).unwrap();
        let dump = output.dump.unwrap();
        assert!(dump.starts_with("container CR!"));
        assert!(dump.contains("storyline l1"));
        assert!(dump.contains("\"Hello world\""));

        config.settings.debug_dump = false;
        assert!(generate_output(&doc(), &[], &config, &CancelFlag::new()).unwrap().dump.is_none());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
