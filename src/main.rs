use clap::{Parser, Subcommand};
use sheetforge::cli::{self, RunOptions};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sheetforge")]
#[command(about = "Apply structured operation specs to Excel workbooks")]
#[command(long_about = "Sheetforge - spreadsheet operation engine

Takes uploaded workbooks and a JSON (or YAML) operation spec, applies the
data, presentation and structural operations it names, and writes a new
.xlsx that keeps the source styling.

COMMANDS:
  apply     - Apply one spec to a set of input workbooks
  chain     - Apply several specs in sequence to one session
  validate  - Check a spec without touching any workbook
  inspect   - Show sheets, columns and row counts of a workbook

EXAMPLES:
  sheetforge apply sales.xlsx --spec top10.json
  sheetforge apply jan.xlsx feb.xlsx --spec merge.json --json
  sheetforge chain sales.xlsx --spec filter.json --spec highlight.json
  sheetforge chain sales.xlsx --spec a.json --spec b.json --restart-at 2

Set RUST_LOG=sheetforge=debug for engine traces (written to stderr).")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Directory for generated workbooks
    #[arg(short, long, env = "SHEETFORGE_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Seed cell styles from the first input workbook
    #[arg(long)]
    source_style: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl From<OutputArgs> for RunOptions {
    fn from(args: OutputArgs) -> Self {
        RunOptions {
            output_dir: args.output_dir,
            source_style: args.source_style,
            json: args.json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Apply an operation spec to one or more workbooks.

All inputs are uploaded as one session: every worksheet becomes a sheet
(a single-sheet file in a multi-file upload is named after the file).
The spec is validated against the embedded JSON Schema first.

SPEC EXAMPLE:
  {
    \"filter\": {\"Region\": \"West\"},
    \"sort\": {\"by\": \"Revenue\", \"ascending\": false},
    \"highlight_rows\": {\"column\": \"Revenue\", \"condition\": {\"operator\": \">\", \"value\": 1000}},
    \"freeze_panes\": true,
    \"custom_filename\": \"west_revenue\"
  }")]
    /// Apply an operation spec to input workbooks
    Apply {
        /// Input workbooks (.xlsx)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Operation spec (.json, .yaml or .yml)
        #[arg(short, long)]
        spec: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    #[command(long_about = "Apply several specs in sequence against one session.

Each step continues from the previous generated workbook. With
--restart-at N, step N starts again from the original upload.")]
    /// Apply a sequence of specs, chaining the results
    Chain {
        /// Input workbooks (.xlsx)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Operation specs, applied in order
        #[arg(short, long = "spec", required = true)]
        specs: Vec<PathBuf>,

        /// 1-based step that restarts from the upload
        #[arg(long)]
        restart_at: Option<usize>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Validate an operation spec
    Validate {
        /// Operation spec (.json, .yaml or .yml)
        spec: PathBuf,
    },

    /// Show the sheets and columns of a workbook
    Inspect {
        /// Workbook (.xlsx)
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sheetforge=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            inputs,
            spec,
            output,
        } => cli::apply(inputs, spec, output.into())?,

        Commands::Chain {
            inputs,
            specs,
            restart_at,
            output,
        } => cli::chain(inputs, specs, restart_at, output.into())?,

        Commands::Validate { spec } => cli::validate(spec)?,

        Commands::Inspect { file } => cli::inspect(&file)?,
    }
    Ok(())
}
