//! KFX container generation.
//!
//! ## Module structure
//!
//! - `ion` - Amazon Ion binary values, writer and parser
//! - `symbols` - YJ shared symbol table, local symbols, fragment classification
//! - `fragment` - typed fragments and the per-container fragment list
//! - `style` - CSS mapping, merge rules and the style registry
//! - `storyline` - content entries, storylines and text chunks
//! - `assemble` - document tree to storylines, anchors, resources and TOC
//! - `margins` - vertical margin collapsing over finished storylines
//! - `position` - position, position-id and location maps
//! - `metadata` - book metadata, reading orders
//! - `fragments` - navigation, resources, anchors and the smaller book fragments
//! - `entity_map` - dependency graph and `$419` entity map
//! - `container` - binary container writer and header reader
//! - `generate` - the single-document pipeline

pub mod assemble;
pub mod container;
pub mod entity_map;
pub mod fragment;
pub mod fragments;
pub mod generate;
pub mod ion;
pub mod margins;
pub mod metadata;
pub mod position;
pub mod storyline;
pub mod style;
pub mod symbols;

pub use generate::{CancelFlag, Output, generate, generate_output};
