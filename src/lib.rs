//! testgen: pytest stubs generated from ReqIF exports, kept in sync with them.
//!
//! The pipeline: [`parser`] reads a ReqIF document into a [`model::SpecForest`],
//! [`sync`] mirrors it onto a tests directory, and [`diff`] compares the
//! [`structure`] derived from the specification with the one found on disk.

pub mod diff;
pub mod ignore;
pub mod model;
pub mod naming;
pub mod parser;
pub mod render;
pub mod settings;
pub mod source;
pub mod structure;
pub mod sync;
pub mod upload;
