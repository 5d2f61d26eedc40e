use crate::config::EngineConfig;
use crate::core::{ApplyReport, Continuation, OperationEngine};
use crate::error::{EngineError, EngineResult};
use crate::excel::{import_uploads, ExcelImporter};
use crate::session::InMemorySessionStore;
use crate::spec::OperationSpec;
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Options shared by `apply` and `chain`
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Where generated workbooks go (engine default if unset)
    pub output_dir: Option<PathBuf>,
    /// Seed cell styles from the first input workbook
    pub source_style: bool,
    /// Print the report as JSON instead of the human summary
    pub json: bool,
}

impl RunOptions {
    fn engine(&self) -> OperationEngine<InMemorySessionStore> {
        let mut config = EngineConfig::default();
        if let Some(dir) = &self.output_dir {
            config = config.with_output_dir(dir.clone());
        }
        OperationEngine::new(config, InMemorySessionStore::new())
    }
}

/// Upload the inputs into a fresh session and return its id
fn start_session(
    engine: &OperationEngine<InMemorySessionStore>,
    inputs: &[PathBuf],
    options: &RunOptions,
) -> EngineResult<String> {
    if inputs.is_empty() {
        return Err(EngineError::Import("at least one input workbook is required".to_string()));
    }
    let tables = import_uploads(inputs)?;
    let session_id = uuid::Uuid::new_v4().to_string();
    let source = options.source_style.then(|| inputs[0].as_path());
    engine.upload(&session_id, tables, source)?;
    Ok(session_id)
}

/// Execute the apply command
pub fn apply(inputs: Vec<PathBuf>, spec_path: PathBuf, options: RunOptions) -> EngineResult<()> {
    let spec = OperationSpec::from_path(&spec_path)?;
    let engine = options.engine();

    if !options.json {
        println!("{}", "📊 Sheetforge - Applying operations".bold().green());
        for input in &inputs {
            println!("   Input: {}", input.display());
        }
        println!("   Spec:  {}\n", spec_path.display());
    }

    let session_id = start_session(&engine, &inputs, &options)?;
    let report = engine.apply(&session_id, &spec, Continuation::Continue)?;
    print_report(&report, &options)
}

/// Execute the chain command: specs in sequence against one session
pub fn chain(
    inputs: Vec<PathBuf>,
    spec_paths: Vec<PathBuf>,
    restart_at: Option<usize>,
    options: RunOptions,
) -> EngineResult<()> {
    if spec_paths.is_empty() {
        return Err(EngineError::SpecValidation("at least one --spec is required".to_string()));
    }
    if let Some(step) = restart_at {
        if step == 0 || step > spec_paths.len() {
            return Err(EngineError::SpecValidation(format!(
                "--restart-at must be between 1 and {}",
                spec_paths.len()
            )));
        }
    }
    let specs = spec_paths
        .iter()
        .map(|p| OperationSpec::from_path(p))
        .collect::<EngineResult<Vec<_>>>()?;

    let engine = options.engine();
    if !options.json {
        println!("{}", "📊 Sheetforge - Chaining operations".bold().green());
        println!("   {} inputs, {} steps\n", inputs.len(), specs.len());
    }
    let session_id = start_session(&engine, &inputs, &options)?;

    let mut reports = Vec::with_capacity(specs.len());
    for (idx, spec) in specs.iter().enumerate() {
        let continuation = if restart_at == Some(idx + 1) {
            Continuation::Restart
        } else {
            Continuation::Continue
        };
        let report = engine.apply(&session_id, spec, continuation)?;
        if !options.json {
            println!(
                "{}",
                format!(
                    "── Step {} ({}) : {}",
                    idx + 1,
                    continuation,
                    spec_paths[idx].display()
                )
                .cyan()
            );
            print_report(&report, &options)?;
        }
        reports.push(report);
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else if let Some(chain) = engine.session(&session_id) {
        println!(
            "{}",
            format!(
                "✅ Chain complete: {} artifacts, {} specs in history",
                chain.downloads().len(),
                chain.history().len()
            )
            .bold()
            .green()
        );
    }
    Ok(())
}

fn print_report(report: &ApplyReport, options: &RunOptions) -> EngineResult<()> {
    if options.json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    for applied in &report.applied {
        let sheet = applied.sheet.as_deref().map(|s| format!(" [{}]", s)).unwrap_or_default();
        println!(
            "   {} {}{}: {}",
            "✔".green(),
            applied.operation.bright_blue(),
            sheet,
            applied.detail
        );
    }
    for skipped in &report.skipped {
        let sheet = skipped.sheet.as_deref().map(|s| format!(" [{}]", s)).unwrap_or_default();
        println!(
            "   {} {}{}: {}",
            "⚠".yellow(),
            skipped.operation.yellow(),
            sheet,
            skipped.reason
        );
    }
    for note in &report.notes {
        println!("   {} {}", "ℹ".cyan(), note);
    }
    if report.applied.is_empty() && report.skipped.is_empty() {
        println!("   {}", "No operations; workbook written unchanged".yellow());
    }

    println!();
    println!("{}", "✅ Workbook written".bold().green());
    if let Some(file) = &report.filename {
        println!("   File: {}", file);
    }
    for (name, rows) in report.sheet_names.iter().zip(&report.row_counts) {
        println!("   📄 {} ({} rows)", name.bright_blue().bold(), rows);
    }
    println!();
    Ok(())
}

/// Execute the validate command
pub fn validate(spec_path: PathBuf) -> EngineResult<()> {
    println!("{}", "✅ Validating operation spec".bold().green());
    println!("   File: {}\n", spec_path.display());

    let spec = match OperationSpec::from_path(&spec_path) {
        Ok(spec) => spec,
        Err(e) => {
            println!("{}", format!("❌ {}", e).bold().red());
            return Err(e);
        }
    };

    if spec.is_empty() {
        println!("{}", "⚠️  Spec has no operations (applying it is a no-op)".yellow());
        return Ok(());
    }

    let steps = spec.plan();
    for (idx, step) in steps.iter().enumerate() {
        if steps.len() > 1 {
            println!("   Step {}", idx + 1);
        }
        for op in &step.operations {
            println!("   {} {}", "•".cyan(), op.describe());
        }
    }
    if let Some(stem) = spec.filename_stem() {
        println!("   Output name: {}", stem.bright_blue());
    }
    println!();
    println!("{}", "✅ Spec is valid".bold().green());
    Ok(())
}

/// Execute the inspect command
pub fn inspect(file: &Path) -> EngineResult<()> {
    println!("{}", "🔍 Sheetforge - Workbook".bold().green());
    println!("   File: {}\n", file.display());

    let sheets = ExcelImporter::new(file).import()?;
    for sheet in &sheets {
        println!(
            "   📄 {} ({} rows, {} columns)",
            sheet.name.bright_blue().bold(),
            sheet.table.row_count(),
            sheet.table.column_count()
        );
        for column in &sheet.table.columns {
            let kind = column
                .values
                .iter()
                .find(|v| !v.is_null())
                .map_or("empty", |v| v.type_name());
            println!("      {} ({})", column.name.cyan(), kind);
        }
    }
    println!();
    Ok(())
}
