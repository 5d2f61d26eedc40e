//! OperationEngine: the session-facing entry point.
//!
//! `apply` resolves the base artifact from the session's chain, runs each
//! step of the spec (merge, routing, row-level transforms, presentation,
//! renames), writes the new workbook and only then commits it to the chain.
//! Any error before the commit leaves the session exactly as it was.

use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::core::chain::{ArtifactChain, Continuation};
use crate::core::merge::{self, sanitize_sheet_name, unique_name};
use crate::core::presentation::PresentationTransformer;
use crate::core::report::{ApplyReport, Journal};
use crate::core::router::{self, Route};
use crate::core::{data, style_store, subtotals};
use crate::error::{EngineError, EngineResult};
use crate::excel::{read_source_styles, ArtifactExporter, SourceCells};
use crate::session::SessionStore;
use crate::spec::{Category, Operation, OperationSpec, TabRef};
use crate::style::StyleMap;
use crate::types::{Artifact, Sheet, SourceKind, Table};

/// One table handed over at upload time
#[derive(Debug, Clone)]
pub struct UploadedTable {
    /// Sheet name (or file stem) the table came from
    pub name: String,
    pub table: Table,
    /// Worksheet position, when the table was read from a workbook
    pub source: Option<SourceCells>,
}

impl UploadedTable {
    pub fn new(name: impl Into<String>, table: Table) -> Self {
        Self {
            name: name.into(),
            table,
            source: None,
        }
    }

    pub fn with_source(mut self, source: SourceCells) -> Self {
        self.source = Some(source);
        self
    }
}

pub struct OperationEngine<S: SessionStore> {
    config: EngineConfig,
    store: S,
}

impl<S: SessionStore> OperationEngine<S> {
    pub fn new(config: EngineConfig, store: S) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session(&self, session_id: &str) -> Option<Arc<ArtifactChain>> {
        self.store.get(session_id)
    }

    /// Start (or replace) a session with uploaded tables.
    ///
    /// With `source_workbook`, each table read from that workbook has its
    /// cell styles seeded from the worksheet it came from; other tables get
    /// the default header style.
    pub fn upload(
        &self,
        session_id: &str,
        tables: Vec<UploadedTable>,
        source_workbook: Option<&Path>,
    ) -> EngineResult<Arc<Artifact>> {
        let artifact = self.build_upload(session_id, tables, source_workbook)?;
        let chain = ArtifactChain::new(session_id, artifact);
        let upload = Arc::clone(chain.upload());
        self.store.put(session_id, chain);
        Ok(upload)
    }

    /// Upload more tables into an existing session.
    ///
    /// The last generated artifact stays the `Continue` base, so a following
    /// `merge_files` places it ahead of these tables. Starts a session if
    /// there is none.
    pub fn add_upload(
        &self,
        session_id: &str,
        tables: Vec<UploadedTable>,
        source_workbook: Option<&Path>,
    ) -> EngineResult<Arc<Artifact>> {
        let Some(chain) = self.store.get(session_id) else {
            return self.upload(session_id, tables, source_workbook);
        };
        let artifact = self.build_upload(session_id, tables, source_workbook)?;
        let chain = chain.with_new_upload(artifact);
        let upload = Arc::clone(chain.upload());
        self.store.put(session_id, chain);
        Ok(upload)
    }

    fn build_upload(
        &self,
        session_id: &str,
        tables: Vec<UploadedTable>,
        source_workbook: Option<&Path>,
    ) -> EngineResult<Artifact> {
        if tables.is_empty() {
            return Err(EngineError::BaseResolution(
                "an upload needs at least one table".to_string(),
            ));
        }
        for uploaded in &tables {
            uploaded
                .table
                .validate_lengths()
                .map_err(|e| EngineError::Import(format!("{}: {}", uploaded.name, e)))?;
        }

        let mut source_styles = match source_workbook {
            Some(path) => read_source_styles(path)?,
            None => Vec::new(),
        };

        let mut taken = HashSet::new();
        let mut sheets = Vec::with_capacity(tables.len());
        for (idx, uploaded) in tables.into_iter().enumerate() {
            let base_name = Some(sanitize_sheet_name(&uploaded.name))
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| format!("File_{}", idx + 1));
            let name = unique_name(&base_name, &taken);
            taken.insert(name.to_lowercase());

            let seeded = source_workbook
                .and_then(|path| take_styles(&mut source_styles, &uploaded, path));
            let mut sheet = Sheet::new(name, uploaded.table);
            sheet.layout.auto_filter = self.config.auto_filter_by_default;
            if let Some(styles) = seeded {
                sheet.styles = styles;
            }
            style_store::ensure_header_style(&mut sheet);
            sheets.push(sheet);
        }

        let artifact = Artifact::new(sheets, SourceKind::Upload);
        info!(
            session = session_id,
            sheets = artifact.sheets.len(),
            rows = ?artifact.row_counts(),
            "session upload"
        );
        Ok(artifact)
    }

    /// Apply a validated spec to the session's base artifact.
    pub fn apply(
        &self,
        session_id: &str,
        spec: &OperationSpec,
        continuation: Continuation,
    ) -> EngineResult<ApplyReport> {
        let chain = self
            .store
            .get(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        let base = chain.resolve_base(continuation);
        info!(
            session = session_id,
            %continuation,
            base = %base.id,
            operations = ?spec.kinds().iter().map(|k| k.key()).collect::<Vec<_>>(),
            "applying operation spec"
        );

        let mut journal = Journal::new();
        let mut sheets = base.sheets.clone();
        for step in spec.plan() {
            self.run_step(step, &chain, continuation, &mut sheets, &mut journal);
        }
        if sheets.is_empty() {
            return Err(EngineError::BaseResolution(
                "the operations left no sheets to write".to_string(),
            ));
        }

        let mut artifact = Artifact::new(sheets, SourceKind::Generated);
        artifact.produced_by = Some(spec.clone());

        std::fs::create_dir_all(&self.config.output_dir)?;
        let path = self.output_path(spec.filename_stem());
        ArtifactExporter::new(&self.config).export(&artifact, &path)?;
        artifact.file = Some(path);

        let artifact = Arc::new(artifact);
        let report = journal.into_report(&artifact, &continuation.to_string());
        self.store
            .put(session_id, chain.commit(Arc::clone(&artifact), spec.clone(), continuation));

        info!(
            session = session_id,
            artifact = %artifact.id,
            file = ?artifact.file,
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "artifact committed"
        );
        Ok(report)
    }

    /// Drop the session's chain. Returns false if there was none.
    pub fn clear(&self, session_id: &str) -> bool {
        let removed = self.store.delete(session_id);
        debug!(session = session_id, removed, "session cleared");
        removed
    }

    /// Path of a persisted artifact of this session
    pub fn download(&self, session_id: &str, artifact_id: &str) -> EngineResult<PathBuf> {
        let chain = self
            .store
            .get(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        match chain.find(artifact_id) {
            Some(path) if path.exists() => Ok(path.to_path_buf()),
            Some(path) => Err(EngineError::ArtifactNotFound(format!(
                "{} (file {} no longer exists)",
                artifact_id,
                path.display()
            ))),
            None if chain.upload().id == artifact_id => Err(EngineError::ArtifactNotFound(
                format!("{} was never written to disk", artifact_id),
            )),
            None => Err(EngineError::ArtifactNotFound(artifact_id.to_string())),
        }
    }

    //==========================================================================
    // Step execution
    //==========================================================================

    fn run_step(
        &self,
        step: &OperationSpec,
        chain: &ArtifactChain,
        continuation: Continuation,
        sheets: &mut Vec<Sheet>,
        journal: &mut Journal,
    ) {
        if let Some(desired) = step.merge_names() {
            // Continue: the last artifact leads, followed by tables uploaded
            // since. Without a newer upload there is nothing to append.
            let (prefix, inputs) = match (continuation, chain.last_generated()) {
                (Continuation::Continue, Some(last)) => {
                    let inputs = if chain.has_pending_upload() {
                        chain.upload().sheets.clone()
                    } else {
                        Vec::new()
                    };
                    (last.sheets.clone(), inputs)
                }
                _ => (Vec::new(), chain.upload().sheets.clone()),
            };
            let input_count = inputs.len();
            let outcome = merge::merge(prefix, inputs, desired);
            for note in outcome.notes {
                journal.note(note);
            }
            *sheets = outcome.sheets;
            journal.applied(
                "merge_files",
                None,
                format!("merged {} table(s) into {} sheet(s)", input_count, sheets.len()),
            );
        }

        let routed: Vec<&Operation> = step
            .operations
            .iter()
            .filter(|op| op.kind().category() != Category::Structural)
            .collect();
        if !routed.is_empty() {
            match router::route(sheets, &step.scope) {
                Route::Sheets(targets) => {
                    for idx in targets {
                        self.transform_sheet(&mut sheets[idx], &routed, journal);
                    }
                }
                Route::SheetNotFound(name) => {
                    for op in &routed {
                        journal.skipped(
                            op.kind().key(),
                            Some(&name),
                            format!("sheet '{}' not found", name),
                        );
                    }
                }
            }
        }

        for op in &step.operations {
            if let Operation::RenameTabs(renames) = op {
                rename_tabs(sheets, renames, journal);
            }
        }
    }

    fn transform_sheet(&self, sheet: &mut Sheet, ops: &[&Operation], journal: &mut Journal) {
        let mut data_ops: Vec<&Operation> = ops
            .iter()
            .copied()
            .filter(|op| op.kind().data_rank().is_some())
            .collect();
        data_ops.sort_by_key(|op| op.kind().data_rank());
        if !data_ops.is_empty() {
            transform_rows(sheet, &data_ops, journal);
        }

        let mut cosmetic: Vec<&Operation> = ops
            .iter()
            .copied()
            .filter(|op| op.kind().presentation_rank().is_some())
            .collect();
        cosmetic.sort_by_key(|op| op.kind().presentation_rank());

        let presenter = PresentationTransformer::new(&self.config);
        for op in cosmetic {
            let kind = op.kind().key();
            let sheet_name = sheet.name.clone();
            if let Operation::Subtotals(spec) = op {
                match subtotals::apply(sheet, spec) {
                    Ok(groups) => journal.applied(
                        kind,
                        Some(&sheet_name),
                        format!("{} group(s) subtotalled", groups),
                    ),
                    Err(reason) => journal.skipped(kind, Some(&sheet_name), reason),
                }
                continue;
            }
            match presenter.apply(sheet, op) {
                Ok(painted) => {
                    for note in painted.notes {
                        journal.note(format!("{}: {}", sheet_name, note));
                    }
                    for column in painted.missing_columns {
                        journal.skipped(
                            kind,
                            Some(&sheet_name),
                            format!("column '{}' not found", column),
                        );
                    }
                    journal.applied(
                        kind,
                        Some(&sheet_name),
                        format!("{}; {} match(es)", op.describe(), painted.matched),
                    );
                }
                Err(reason) => journal.skipped(kind, Some(&sheet_name), reason),
            }
        }
    }

    fn output_path(&self, stem: Option<&str>) -> PathBuf {
        static UNSAFE: OnceLock<Regex> = OnceLock::new();
        let re = UNSAFE
            .get_or_init(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("valid filename regex"));

        let stem = stem
            .map(|s| re.replace_all(s.trim(), "_").trim_matches('_').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.default_filename.clone());
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let unique = uuid::Uuid::new_v4().simple().to_string();
        self.config
            .output_dir
            .join(format!("{}_{}_{}.xlsx", stem, timestamp, &unique[..8]))
    }
}

/// Run row-level operations in order, tracking each row's base origin so
/// styles and summary markers follow the rows that survive.
fn transform_rows(sheet: &mut Sheet, ops: &[&Operation], journal: &mut Journal) {
    let base_rows = sheet.table.row_count();
    let mut table = sheet.table.clone();
    let mut origin: Vec<usize> = (0..base_rows).collect();
    let mut protected: BTreeSet<usize> = sheet.summary_rows.clone();

    for op in ops {
        let kind = op.kind().key();
        match data::select(&table, op, &protected) {
            Ok(rows) => {
                let before = table.row_count();
                table = table.take_rows(&rows);
                protected = rows
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| protected.contains(*r))
                    .map(|(i, _)| i)
                    .collect();
                origin = rows.iter().map(|&r| origin[r]).collect();
                journal.applied(
                    kind,
                    Some(&sheet.name),
                    format!("{}; {} → {} rows", op.describe(), before, table.row_count()),
                );
            }
            Err(reason) => journal.skipped(kind, Some(&sheet.name), reason),
        }
    }

    let origin: Vec<Option<usize>> = origin.into_iter().map(Some).collect();
    sheet.styles = style_store::carry(&sheet.styles, base_rows, &origin);
    sheet.summary_rows = style_store::carry_summary_rows(&sheet.summary_rows, &origin);
    sheet.table = table;
}

/// Resolve every tab against the current names, then assign, so swaps work.
fn rename_tabs(sheets: &mut [Sheet], renames: &[(TabRef, String)], journal: &mut Journal) {
    let mut targets: Vec<(usize, &str, String)> = Vec::new();
    for (tab, new_name) in renames {
        let idx = match tab {
            TabRef::Index(i) if *i < sheets.len() => Some(*i),
            TabRef::Index(_) => None,
            TabRef::Name(name) => {
                let wanted = name.trim().to_lowercase();
                sheets.iter().position(|s| s.name.to_lowercase() == wanted)
            }
        };
        let Some(idx) = idx else {
            let label = match tab {
                TabRef::Index(i) => format!("sheet_{}", i),
                TabRef::Name(n) => n.clone(),
            };
            journal.skipped("rename_tabs", Some(&label), format!("sheet '{}' not found", label));
            continue;
        };

        let cleaned = sanitize_sheet_name(new_name);
        if cleaned.is_empty() {
            journal.skipped(
                "rename_tabs",
                Some(&sheets[idx].name),
                format!("'{}' is not a usable sheet name", new_name),
            );
            continue;
        }
        if targets.iter().any(|(i, _, _)| *i == idx) {
            journal.skipped(
                "rename_tabs",
                Some(&sheets[idx].name),
                format!("'{}' is already being renamed", sheets[idx].name),
            );
            continue;
        }
        targets.push((idx, new_name.as_str(), cleaned));
    }

    let mut taken: HashSet<String> = sheets
        .iter()
        .enumerate()
        .filter(|(i, _)| !targets.iter().any(|(t, _, _)| t == i))
        .map(|(_, s)| s.name.to_lowercase())
        .collect();
    for (idx, requested, cleaned) in targets {
        let name = unique_name(&cleaned, &taken);
        taken.insert(name.to_lowercase());
        if name != requested {
            warn!(requested = %requested, used = %name, "sheet name adjusted");
        }
        let old = std::mem::replace(&mut sheets[idx].name, name.clone());
        journal.applied("rename_tabs", Some(&old), format!("renamed '{}' to '{}'", old, name));
    }
}

/// Source styles for an uploaded table, in table coordinates.
///
/// Tables read from `workbook` match the worksheet they came from; tables
/// with no recorded position match by name.
fn take_styles(
    styles: &mut Vec<(String, StyleMap)>,
    uploaded: &UploadedTable,
    workbook: &Path,
) -> Option<StyleMap> {
    let wanted = match &uploaded.source {
        Some(source) if source.file != workbook => return None,
        Some(source) => source.sheet.trim().to_lowercase(),
        None => uploaded.name.trim().to_lowercase(),
    };
    let idx = styles.iter().position(|(n, _)| n.trim().to_lowercase() == wanted)?;
    let (_, map) = styles.remove(idx);
    Some(match &uploaded.source {
        Some(source) => source.remap(&map),
        None => map,
    })
}
