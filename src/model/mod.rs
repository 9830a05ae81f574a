//! Parsed document tree accepted by the generator.
//!
//! The tree is produced by an external parser (EPUB, FB2, HTML, ...) and
//! handed over either as Rust values or as its JSON serialization:
//! - [`Document`] with book [`Metadata`], [`Section`]s, [`ImageAsset`]s and
//!   [`FontAsset`]s
//! - [`Block`] level content (paragraphs, headings, tables, footnotes)
//! - [`Inline`] runs (text, styled spans, links, inline images)

mod document;
mod node;

pub use document::{Document, FontAsset, ImageAsset, ImageFormat, Metadata, Section};
pub use node::{Block, Inline, TableCell, TableRow};
