//! # kfxgen
//!
//! Generates Kindle KFX containers from a parsed document tree and CSS.
//!
//! The input is a [`Document`]: metadata, sections of block content, and
//! image assets, as produced by an external EPUB/FB2/HTML parser. Styles come
//! from one or more CSS stylesheets. The output is a single KFX container:
//! an Ion symbol table, an entity table and one entity per fragment.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kfxgen::{CancelFlag, Config, Document, generate};
//!
//! let json = std::fs::read_to_string("book.json").unwrap();
//! let doc = Document::from_json(&json).unwrap();
//! let css = std::fs::read_to_string("book.css").unwrap();
//!
//! let bytes = generate(&doc, &[&css], &Config::default(), &CancelFlag::new()).unwrap();
//! std::fs::write("book.kfx", bytes).unwrap();
//! ```
//!
//! ## Building documents in code
//!
//! ```
//! use kfxgen::model::{Block, Inline, Section};
//! use kfxgen::{Document, Metadata};
//!
//! let doc = Document::new("urn:uuid:1234")
//!     .with_metadata(Metadata::new("My Book").with_author("Author Name").with_language("en"))
//!     .with_section(
//!         Section::new()
//!             .with_title("Chapter 1")
//!             .with_block(Block::paragraph(vec![Inline::text("Hello")])),
//!     );
//! assert_eq!(doc.sections.len(), 1);
//! ```
//!
//! Many documents can be converted at once with [`convert_batch`]; with the
//! `parallel` feature they run on a rayon pool.

pub mod batch;
pub mod config;
pub mod error;
pub mod kfx;
pub mod model;

pub use batch::{Job, convert_batch, convert_batch_output};
pub use config::{Config, Settings};
pub use error::{Error, Result};
pub use kfx::{CancelFlag, Output, generate, generate_output};
pub use model::{Document, Metadata};
