//! ldls: a language server for Linked Data
//!
//! Editing support for RDF documents written in Turtle, TriG and JSON-LD:
//! diagnostics, completion, hover and go-to-definition, enriched with
//! vocabulary data fetched once and cached on disk.
//!
//! # Architecture
//!
//! - [`syntax`]: lenient, span-annotating parsers for each dialect
//! - [`document`]: open documents, their versions and the span index
//! - [`vocab`]: the process-wide vocabulary cache (memory, disk, network)
//! - [`resolver`]: short name and IRI resolution
//! - [`diagnostics`], [`completion`], [`hover`], [`gotodef`]: the analyses
//! - [`backend`]: the tower-lsp server wiring it all together
//!
//! ```ignore
//! use ldls::document::DocumentStore;
//! use ldls::syntax::Dialect;
//!
//! let mut store = DocumentStore::new();
//! let document = store.open(uri, text, 1, Dialect::Turtle);
//! let findings = ldls::diagnostics::diagnose(document, &resolver, &settings);
//! ```

pub mod backend;
pub mod config;
pub mod error;

// Core model
pub mod document;
pub mod resolver;
pub mod syntax;
pub mod vocab;

// LSP feature modules
pub mod completion;
pub mod diagnostics;
pub mod gotodef;
pub mod hover;

// Test utilities (only available in test builds)
#[cfg(test)]
pub mod test_utils;
