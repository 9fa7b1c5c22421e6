use std::ops::Range;
use std::path::{Path, PathBuf};

use ariadne::{Color, Label, Report, ReportKind, Source};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use serde::Serialize;
use tracing::instrument;
use tracing_subscriber::EnvFilter;

use xgfs::codec;
use xgfs::{ConvertOptions, Embedding, InputFormat, ParseDiagnostic, SourceSpan, XgfsError};

#[derive(Parser)]
#[command(
    name = "xgfs",
    about = "Convert graphs to the XGFS binary CSR format"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a graph file into an XGFS artifact
    Convert {
        /// Input graph file
        input: PathBuf,
        /// Output artifact path
        output: PathBuf,
        /// Input format: mat, edgelist, weighted_edgelist or adjlist
        #[arg(long, default_value = "edgelist")]
        format: InputFormat,
        /// Variable holding the sparse matrix in a MAT file
        #[arg(long = "matfile-variable-name")]
        matfile_variable_name: Option<String>,
        /// Mirror every edge
        #[arg(long, conflicts_with = "directed")]
        undirected: bool,
        /// Keep edges as given (default)
        #[arg(long)]
        directed: bool,
        /// Field separator for text formats (default: whitespace)
        #[arg(long)]
        sep: Option<String>,
        /// Also write the row,label node index
        #[arg(long)]
        index: Option<PathBuf>,
        /// Print the conversion summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decode an artifact and report its shape
    Inspect {
        artifact: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print one row of a trained embedding
    Lookup {
        /// Flat little-endian f32 embedding file
        embedding: PathBuf,
        #[arg(long)]
        dims: usize,
        #[arg(long, conflicts_with = "label", required_unless_present = "label")]
        row: Option<usize>,
        /// Node label; needs --index
        #[arg(long, requires = "index")]
        label: Option<String>,
        /// row,label index written by `convert --index`
        #[arg(long)]
        index: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            output,
            format,
            matfile_variable_name,
            undirected,
            directed: _,
            sep,
            index,
            json,
        } => {
            let mut options = ConvertOptions::from_env();
            options.format = format;
            options.undirected = undirected;
            options.separator = sep;
            if let Some(name) = matfile_variable_name {
                options.mat_variable = name;
            }
            cmd_convert(&input, &output, &options, index.as_deref(), json)
        }
        Commands::Inspect { artifact, json } => cmd_inspect(&artifact, json),
        Commands::Lookup {
            embedding,
            dims,
            row,
            label,
            index,
        } => cmd_lookup(&embedding, dims, row, label.as_deref(), index.as_deref()),
    }?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn normalize_span(span: Option<SourceSpan>, source: &str) -> Range<usize> {
    if source.is_empty() {
        return 0..0;
    }
    let len = source.len();
    match span {
        Some(s) => {
            let start = s.start.min(len.saturating_sub(1));
            let end = s.end.max(start.saturating_add(1)).min(len);
            start..end
        }
        None => 0..len,
    }
}

/// Render a record-level failure against the offending input line.
fn render_parse_diagnostic(path: &Path, title: &str, diag: &ParseDiagnostic) {
    let Some(source) = diag.text.as_deref() else {
        return;
    };
    let file_id = match diag.line {
        Some(line) => format!("{}:{}", path.display(), line),
        None => path.display().to_string(),
    };
    let span = normalize_span(diag.span, source);
    let _ = Report::build(ReportKind::Error, file_id.clone(), span.start)
        .with_message(title)
        .with_label(
            Label::new((file_id.clone(), span))
                .with_color(Color::Red)
                .with_message(diag.message.clone()),
        )
        .finish()
        .eprint((file_id, Source::from(source)));
}

fn report_xgfs_error(path: &Path, err: XgfsError) -> color_eyre::Report {
    let title = match &err {
        XgfsError::Format(_) => "format violation",
        XgfsError::IdentityConflict(_) => "identity conflict",
        XgfsError::WeightPolicy(_) => "weight policy violation",
        _ => "conversion failed",
    };
    if let Some(diag) = err.diagnostic() {
        render_parse_diagnostic(path, title, diag);
    }
    eyre!(err).wrap_err(format!("failed to convert {}", path.display()))
}

#[instrument(skip(options), fields(input = %input.display(), output = %output.display(), format = %options.format))]
fn cmd_convert(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
    index: Option<&Path>,
    json: bool,
) -> Result<()> {
    let summary = xgfs::convert_with_index(input, output, index, options)
        .map_err(|e| report_xgfs_error(input, e))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Wrote {} ({} nodes, {} edges, weights {})",
            output.display(),
            summary.nodes,
            summary.edges,
            if summary.weights_stored { "stored" } else { "elided" }
        );
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct InspectReport {
    nodes: usize,
    edges: usize,
    weights_stored: bool,
    max_degree: usize,
    bytes: u64,
}

#[instrument(fields(artifact = %artifact.display()))]
fn cmd_inspect(artifact: &Path, json: bool) -> Result<()> {
    let bytes = std::fs::metadata(artifact)
        .wrap_err_with(|| format!("failed to read artifact: {}", artifact.display()))?
        .len();
    let graph = codec::read_file(artifact)
        .wrap_err_with(|| format!("failed to decode artifact: {}", artifact.display()))?;
    let unweighted_len = (codec::HEADER_LEN + 4 * graph.node_count() + 4 * graph.edge_count()) as u64;
    let report = InspectReport {
        nodes: graph.node_count(),
        edges: graph.edge_count(),
        weights_stored: bytes > unweighted_len,
        max_degree: graph.max_degree(),
        bytes,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("nodes: {}", report.nodes);
        println!("edges: {}", report.edges);
        println!("weights stored: {}", report.weights_stored);
        println!("max degree: {}", report.max_degree);
        println!("bytes: {}", report.bytes);
    }
    Ok(())
}

#[instrument(skip(path, label, index), fields(embedding = %path.display()))]
fn cmd_lookup(
    path: &Path,
    dims: usize,
    row: Option<usize>,
    label: Option<&str>,
    index: Option<&Path>,
) -> Result<()> {
    let mut embedding = Embedding::load(path, dims)
        .wrap_err_with(|| format!("failed to load embedding: {}", path.display()))?;
    if let Some(index_path) = index {
        embedding = embedding
            .with_index(index_path)
            .wrap_err_with(|| format!("failed to load index: {}", index_path.display()))?;
    }

    let values = match (row, label) {
        (Some(row), _) => embedding.row(row).ok_or_else(|| {
            eyre!(
                "row {} out of range for {} embedding rows",
                row,
                embedding.rows()
            )
        })?,
        (None, Some(label)) => embedding
            .get(label)
            .ok_or_else(|| eyre!("label '{}' not found in index", label))?,
        (None, None) => return Err(eyre!("either --row or --label is required")),
    };

    let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    println!("{}", rendered.join(" "));
    Ok(())
}
