//! rdforge - convert tabular data to RDF using a YAML mapping specification

mod logging;

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing::{debug, error, info, warn};

use logging::{init_logging, LateFileWriter};

#[derive(Parser)]
#[command(
    name = "rdforge",
    about = "Convert tabular data to RDF using a YAML mapping specification"
)]
struct Args {
    /// YAML conversion specification file
    spec: PathBuf,

    /// Max number of rows to process (0 = no limit)
    #[arg(short = 'n', long, default_value_t = 0)]
    limit: usize,

    /// Worker pool size (default: available parallelism minus one)
    #[arg(long)]
    workers: Option<usize>,
}

fn main() {
    let args = Args::parse();
    let file_writer = LateFileWriter::new();
    init_logging(file_writer.clone());

    // Configuration errors are reported in full, before any row is read.
    let mut spec = match rdforge_mapping::resolve(&args.spec) {
        Ok(spec) => spec,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    if let Some(workers) = args.workers {
        spec.workers = Some(workers);
    }

    // Warnings are copied to a log file next to the output.
    let stem = spec
        .infile
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "rdforge".to_string());
    let logfile = spec.outdir.join(format!("{}.log", stem));
    match File::create(&logfile) {
        Ok(file) => file_writer.bind(file),
        Err(e) => warn!(path = %logfile.display(), "could not create log file: {e}"),
    }

    info!(
        spec = %args.spec.display(),
        infile = %spec.infile.display(),
        outdir = %spec.outdir.display(),
        columns = spec.columns.len(),
        template = spec.template.is_some(),
        graph = spec.graph.as_deref().unwrap_or("-"),
        "using mapping specification"
    );
    debug!(?spec, "resolved specification");

    let start = Instant::now();
    match rdforge_convert::convert(Arc::new(spec), args.limit) {
        Ok(summary) => {
            info!(
                rows = summary.rows,
                statements = summary.statements,
                files = summary.files.len(),
                secs = format!("{:.1}", start.elapsed().as_secs_f64()),
                "ALL DONE"
            );
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}
