//! Sheetforge - spreadsheet operation engine
//!
//! This library applies structured operation specs (filter, sort, highlight,
//! subtotal, merge, rename, ...) to uploaded tables and writes the result as
//! a styled Excel workbook, keeping a per-session chain of artifacts so that
//! follow-up requests build on the previous output.
//!
//! # Features
//!
//! - JSON/YAML operation specs validated against an embedded JSON Schema
//! - Row-level data operations with a fixed, documented execution order
//! - Presentation layers (highlights, conditional formats, freeze panes)
//! - Cell styles carried through filters, sorts and subtotal insertion
//! - Multi-file merge and tab renaming
//! - Excel import (calamine) and export (rust_xlsxwriter)
//!
//! # Example
//!
//! ```no_run
//! use sheetforge::core::{Continuation, OperationEngine};
//! use sheetforge::excel::import_uploads;
//! use sheetforge::session::InMemorySessionStore;
//! use sheetforge::{EngineConfig, OperationSpec};
//! use std::path::PathBuf;
//!
//! let engine = OperationEngine::new(EngineConfig::default(), InMemorySessionStore::new());
//! let tables = import_uploads(&[PathBuf::from("sales.xlsx")])?;
//! engine.upload("session-1", tables, None)?;
//!
//! let spec = OperationSpec::from_json_str(r#"{"top_n": 10, "freeze_panes": true}"#)?;
//! let report = engine.apply("session-1", &spec, Continuation::Continue)?;
//! println!("Wrote {:?} ({:?} rows)", report.filename, report.row_counts);
//! # Ok::<(), sheetforge::error::EngineError>(())
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod excel;
pub mod session;
pub mod spec;
pub mod style;
pub mod types;

// Re-export commonly used types
pub use config::EngineConfig;
pub use core::{ApplyReport, ArtifactChain, Continuation, OperationEngine, UploadedTable};
pub use error::{EngineError, EngineResult};
pub use spec::{Operation, OperationSpec};
pub use types::{Artifact, CellValue, Column, Sheet, Table};
