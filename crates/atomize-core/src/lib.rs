//! Compiles relational database dumps into typed knowledge-graph atoms.
//!
//! A dump is read three times: once for the schema, once (optionally) to
//! infer how externally supplied reference tables map onto SQL columns, and
//! once to emit every relevant row as nodes and links in chunked `.metta`
//! files. This crate has no CLI or terminal dependencies; progress is
//! reported through [`progress::ProgressObserver`].

pub mod atom;
pub mod config;
pub mod convert;
pub mod ddl;
pub mod diagnostics;
pub mod driver;
pub mod emitter;
pub mod error;
pub mod progress;
pub mod reference;
pub mod report;
pub mod scan;
pub mod schema;
pub mod sink;

pub use convert::{OutputLayout, convert};
pub use driver::{DumpStreamDriver, RunSummary};
pub use error::{Error, Result};
