//! Spreadsheet operation engine

pub mod chain;
pub mod data;
pub mod engine;
pub mod merge;
pub mod presentation;
pub mod report;
pub mod router;
pub mod style_store;
pub mod subtotals;

pub use chain::{ArtifactChain, Continuation};
pub use engine::{OperationEngine, UploadedTable};
pub use presentation::{PresentationTransformer, StyleLayer};
pub use report::{AppliedOperation, ApplyReport, SkippedOperation};
