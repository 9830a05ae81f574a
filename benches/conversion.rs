//! Benchmarks for the KFX generation pipeline.
//!
//! Run with: cargo bench

use criterion::{Criterion, criterion_group, criterion_main};

use kfxgen::kfx::generate::build_container;
use kfxgen::kfx::style::StyleRegistry;
use kfxgen::model::{Block, Inline, Section};
use kfxgen::{CancelFlag, Config, Document, Job, Metadata, convert_batch, generate};

const CSS: &str = "
p { text-indent: 1.5em; margin-top: 0; margin-bottom: 0 }
h1 { font-size: 150%; margin-top: 2em; text-align: center }
.epigraph { margin-left: 20%; font-style: italic }
.emphasis { font-style: italic }
.strong { font-weight: bold }
";

/// A book of `chapters` chapters, each with a heading, an epigraph and
/// forty paragraphs of mixed inline styling.
fn sample_document(chapters: usize) -> Document {
    let paragraph = |i: usize| {
        Block::paragraph(vec![
            Inline::text(format!("Paragraph {i} opens with plain text, ")),
            Inline::styled("emphasis", vec![Inline::text("continues in italics")]),
            Inline::text(" and closes with "),
            Inline::styled("strong", vec![Inline::text("a bold phrase.")]),
        ])
    };

    (0..chapters).fold(
        Document::new("urn:bench:conversion").with_metadata(Metadata::new("Benchmark").with_author("Criterion")),
        |doc, n| {
            let mut section = Section::new()
                .with_title(format!("Chapter {n}"))
                .with_block(Block::heading(1, vec![Inline::text(format!("Chapter {n}"))]))
                .with_block(Block::Container {
                    id: None,
                    class: Some("epigraph".into()),
                    blocks: vec![paragraph(0), paragraph(1)],
                });
            for i in 0..40 {
                section = section.with_block(paragraph(i));
            }
            doc.with_section(section)
        },
    )
}

// ============================================================================
// Pipeline Benchmarks
// ============================================================================

fn bench_register_css(c: &mut Criterion) {
    let config = Config::default();

    c.bench_function("register_css", |b| {
        b.iter(|| {
            let mut registry = StyleRegistry::new(&config.merge_rules, &config.defaults, &config.ignorable);
            registry.register_css(CSS);
            registry
        });
    });
}

fn bench_build_container(c: &mut Criterion) {
    let config = Config::default();
    let doc = sample_document(20);

    c.bench_function("build_container", |b| {
        b.iter(|| build_container(&doc, &[CSS], &config).unwrap());
    });
}

fn bench_generate(c: &mut Criterion) {
    let config = Config::default();
    let doc = sample_document(20);

    c.bench_function("generate", |b| {
        b.iter(|| generate(&doc, &[CSS], &config, &CancelFlag::new()).unwrap());
    });
}

// ============================================================================
// Batch Benchmarks
// ============================================================================

fn bench_convert_batch(c: &mut Criterion) {
    let config = Config::default();
    let jobs: Vec<Job> = (0..8)
        .map(|_| Job::new(sample_document(5)).with_stylesheet(CSS))
        .collect();

    c.bench_function("convert_batch_8", |b| {
        b.iter(|| convert_batch(&jobs, &config));
    });
}

criterion_group!(
    benches,
    // Pipeline
    bench_register_css,
    bench_build_container,
    bench_generate,
    // Batch
    bench_convert_batch,
);
criterion_main!(benches);
