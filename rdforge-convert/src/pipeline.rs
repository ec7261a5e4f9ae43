//! Parallel row pipeline
//!
//! One feeder thread reads rows sequentially from the source file and fans
//! them out over a bounded channel to a fixed pool of worker threads; the
//! coordinator consumes per-row statement sets as they complete (arrival
//! order) and drives the chunked writer. A single worker's fatal error
//! tears the whole pipeline down.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::sync_channel;
use std::sync::{Arc, Mutex};

use csv::StringRecord;
use tracing::{info, warn};

use rdforge_graph::Graph;
use rdforge_mapping::ResolvedSpec;

use crate::error::{ConvertError, ConvertResult};
use crate::row::RowConverter;
use crate::writer::{ChunkWriter, WriteSummary};

/// Totals for one completed conversion run.
#[derive(Debug)]
pub struct ConvertSummary {
    /// Rows whose results were accumulated by the writer
    pub rows: usize,
    /// Statements written across all output files
    pub statements: usize,
    /// Output files, in the order they were written
    pub files: Vec<std::path::PathBuf>,
}

/// Convert the source file described by `spec` into RDF output files.
///
/// `limit`, if positive, stops the run after that many rows have been
/// accumulated by the writer; in-flight rows beyond it are discarded.
pub fn convert(spec: Arc<ResolvedSpec>, limit: usize) -> ConvertResult<ConvertSummary> {
    let mut reader = open_reader(&spec)?;
    let header: Arc<Vec<String>> = Arc::new(
        reader
            .headers()?
            .iter()
            .map(str::to_string)
            .collect(),
    );

    warn_about_unmapped_columns(&spec, &header);

    let workers = worker_count(&spec);
    info!(
        infile = %spec.infile.display(),
        workers,
        limit,
        "starting conversion"
    );

    // Fail fast on missing columns or a broken template before any thread
    // starts; each worker still owns its converter (per-worker caches).
    let converters: Vec<RowConverter> = (0..workers)
        .map(|_| RowConverter::new(Arc::clone(&spec), Arc::clone(&header)))
        .collect::<ConvertResult<_>>()?;

    let (job_tx, job_rx) = sync_channel::<(usize, StringRecord)>(workers * 2);
    let (result_tx, result_rx) = sync_channel::<ConvertResult<(usize, Graph)>>(workers * 2);
    let job_rx = Arc::new(Mutex::new(job_rx));
    let stop = Arc::new(AtomicBool::new(false));

    let mut worker_handles = Vec::with_capacity(workers);
    for (thread_idx, converter) in converters.into_iter().enumerate() {
        let job_rx = Arc::clone(&job_rx);
        let result_tx = result_tx.clone();
        let handle = std::thread::Builder::new()
            .name(format!("row-worker-{}", thread_idx))
            .spawn(move || loop {
                let job = job_rx.lock().expect("job queue poisoned").recv();
                let Ok((idx, record)) = job else {
                    break;
                };
                let result = converter.process_row(&record, idx).map(|g| (idx, g));
                let fatal = result.is_err();
                if result_tx.send(result).is_err() || fatal {
                    break;
                }
            })
            .map_err(|e| ConvertError::Pipeline(format!("spawn worker: {}", e)))?;
        worker_handles.push(handle);
    }

    // Feeder: the only thread that touches the source file. Row reading is
    // strictly sequential; fan-out happens at the channel.
    let feeder_err_tx = result_tx.clone();
    let feeder_stop = Arc::clone(&stop);
    let feeder = std::thread::Builder::new()
        .name("row-feeder".to_string())
        .spawn(move || {
            for (idx, record) in reader.into_records().enumerate() {
                if feeder_stop.load(Ordering::Relaxed) {
                    break;
                }
                match record {
                    Ok(record) => {
                        if job_tx.send((idx, record)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = feeder_err_tx.send(Err(e.into()));
                        break;
                    }
                }
            }
        })
        .map_err(|e| ConvertError::Pipeline(format!("spawn feeder: {}", e)))?;
    drop(result_tx);

    // Coordinator: merge results in arrival order, drive the chunk writer,
    // and enforce the accumulation limit.
    let mut writer = ChunkWriter::new(Arc::clone(&spec));
    let mut accumulated = 0usize;
    let mut failure: Option<ConvertError> = None;

    loop {
        let Ok(result) = result_rx.recv() else {
            break;
        };
        match result.and_then(|(_, graph)| writer.merge_row(graph)) {
            Ok(()) => {
                accumulated += 1;
                if accumulated % 100_000 == 0 {
                    info!(rows = accumulated, "rows accumulated");
                }
                if limit > 0 && accumulated >= limit {
                    break;
                }
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    // Tear down: dropping the result receiver unblocks senders, the stop
    // flag halts the feeder, and exiting workers drop the job receiver.
    stop.store(true, Ordering::Relaxed);
    drop(result_rx);
    for handle in worker_handles {
        let _ = handle.join();
    }
    let _ = feeder.join();

    if let Some(e) = failure {
        return Err(e);
    }

    let WriteSummary { files, statements } = writer.finish()?;
    info!(
        rows = accumulated,
        statements,
        files = files.len(),
        "conversion complete"
    );

    Ok(ConvertSummary {
        rows: accumulated,
        statements,
        files,
    })
}

/// Pool size: explicit setting, else available parallelism minus one.
fn worker_count(spec: &ResolvedSpec) -> usize {
    spec.workers.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2)
            .saturating_sub(1)
            .max(1)
    })
}

/// Open the source file, decoding it when a non-UTF-8 encoding is
/// configured.
fn open_reader(spec: &ResolvedSpec) -> ConvertResult<csv::Reader<Box<dyn Read + Send>>> {
    let encoding = encoding_rs::Encoding::for_label(spec.encoding.as_bytes())
        .ok_or_else(|| ConvertError::UnknownEncoding(spec.encoding.clone()))?;

    let input: Box<dyn Read + Send> = if encoding == encoding_rs::UTF_8 {
        Box::new(std::fs::File::open(&spec.infile)?)
    } else {
        let bytes = std::fs::read(&spec.infile)?;
        let (decoded, _, had_errors) = encoding.decode(&bytes);
        if had_errors {
            warn!(
                infile = %spec.infile.display(),
                encoding = %spec.encoding,
                "input contained byte sequences invalid for its encoding"
            );
        }
        Box::new(std::io::Cursor::new(decoded.into_owned().into_bytes()))
    };

    Ok(csv::ReaderBuilder::new()
        .delimiter(spec.delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(input))
}

fn warn_about_unmapped_columns(spec: &ResolvedSpec, header: &[String]) {
    let mapped = spec.mapped_columns();
    let unmapped: Vec<&str> = header
        .iter()
        .map(String::as_str)
        .filter(|h| !mapped.contains(h))
        .collect();
    if !unmapped.is_empty() {
        warn!(
            file = %spec.infile.display(),
            count = unmapped.len(),
            columns = ?unmapped,
            "input contains unmapped columns"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_name(path: &std::path::Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
    use rdforge_mapping::ColumnRule;
    use rdforge_vocab::{rdf, PrefixTable};
    use std::fs;
    use tempfile::TempDir;

    fn spec_for(dir: &TempDir, csv_body: &str) -> ResolvedSpec {
        let infile = dir.path().join("data.csv");
        fs::write(&infile, csv_body).unwrap();
        let mut prefixes = PrefixTable::new();
        prefixes.bind("ex", "http://example.org/");
        ResolvedSpec {
            infile,
            outdir: dir.path().to_path_buf(),
            encoding: "utf-8".to_string(),
            delimiter: b',',
            graph: None,
            namespace: Some("http://example.org/item/".to_string()),
            identifier: Some("id".to_string()),
            types: vec!["http://example.org/Thing".to_string()],
            columns: vec![],
            template: None,
            functions: None,
            max_graph_size_mb: None,
            size_check_frequency: 1000,
            workers: Some(2),
            strict_values: false,
            prefixes,
        }
    }

    fn parse_output(summary: &ConvertSummary) -> Graph {
        let mut merged = Graph::new();
        for (i, file) in summary.files.iter().enumerate() {
            let text = fs::read_to_string(file).unwrap();
            merged.union(rdforge_turtle::parse(&text, &format!("f{}", i)).unwrap());
        }
        merged
    }

    #[test]
    fn test_three_rows_one_rule() {
        let dir = TempDir::new().unwrap();
        let mut spec = spec_for(&dir, "id,name\n1,Alice\n2,Bob\n3,Carol\n");
        spec.columns = vec![ColumnRule::literal("name", "http://example.org/hasName")];

        let summary = convert(Arc::new(spec), 0).unwrap();
        assert_eq!(summary.rows, 3);
        // 3 subjects x (1 type + 1 name)
        assert_eq!(summary.statements, 6);

        let graph = parse_output(&summary);
        assert_eq!(graph.len(), 6);
        for n in 1..=3 {
            let subject = format!("http://example.org/item/{}", n);
            assert!(graph
                .iter()
                .any(|t| t.s.as_iri() == Some(subject.as_str())
                    && t.p.as_iri() == Some(rdf::TYPE)));
            assert_eq!(
                graph
                    .iter()
                    .filter(|t| t.s.as_iri() == Some(subject.as_str())
                        && t.p.as_iri() == Some("http://example.org/hasName"))
                    .count(),
                1
            );
        }
    }

    #[test]
    fn test_empty_identifier_rows_contribute_nothing() {
        let dir = TempDir::new().unwrap();
        let mut spec = spec_for(&dir, "id,name\n1,Alice\n,Ghost\n2,Bob\n");
        spec.columns = vec![ColumnRule::literal("name", "http://example.org/hasName")];

        let summary = convert(Arc::new(spec), 0).unwrap();
        // All three rows are visited, the empty-identifier row emits nothing
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.statements, 4);
    }

    #[test]
    fn test_limit_stops_accumulation() {
        let dir = TempDir::new().unwrap();
        let body: String = std::iter::once("id,name".to_string())
            .chain((0..100).map(|n| format!("{},name{}", n, n)))
            .collect::<Vec<_>>()
            .join("\n");
        let mut spec = spec_for(&dir, &body);
        spec.types = vec![];
        spec.columns = vec![ColumnRule::literal("name", "http://example.org/hasName")];

        let summary = convert(Arc::new(spec), 5).unwrap();
        assert_eq!(summary.rows, 5);
        assert_eq!(summary.statements, 5);
    }

    #[test]
    fn test_invalid_iri_aborts_run() {
        let dir = TempDir::new().unwrap();
        let mut spec = spec_for(&dir, "id,link\n1,ok\n2,broken value\n3,ok\n");
        spec.types = vec![];
        let mut rule = ColumnRule::literal("link", "http://example.org/seeAlso");
        rule.as_iri = true;
        spec.columns = vec![rule];
        // No namespace on the rule: bare values must be valid IRIs
        let err = convert(Arc::new(spec), 0).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidIri { .. }));
    }

    #[test]
    fn test_template_and_rules_union() {
        let dir = TempDir::new().unwrap();
        let mut spec = spec_for(&dir, "id,name,note\n1,Alice,likes rdf\n");
        spec.types = vec![];
        spec.columns = vec![ColumnRule::literal("name", "http://example.org/hasName")];
        spec.template =
            Some("<http://example.org/item/{id}> ex:note \"{note}\" .".to_string());

        let summary = convert(Arc::new(spec), 0).unwrap();
        assert_eq!(summary.statements, 2);

        let graph = parse_output(&summary);
        assert!(graph.iter().any(|t| t.p.as_iri() == Some("http://example.org/note")));
        assert!(graph
            .iter()
            .any(|t| t.p.as_iri() == Some("http://example.org/hasName")));
    }

    #[test]
    fn test_chunked_run_conserves_statements() {
        let dir = TempDir::new().unwrap();
        let payload = "p".repeat(200);
        let body: String = std::iter::once("id,name".to_string())
            .chain((0..50).map(|n| format!("{},{}{}", n, payload, n)))
            .collect::<Vec<_>>()
            .join("\n");

        let mut chunked = spec_for(&dir, &body);
        chunked.types = vec![];
        chunked.columns = vec![ColumnRule::literal("name", "http://example.org/hasName")];
        chunked.max_graph_size_mb = Some(0.002);
        chunked.size_check_frequency = 4;

        let summary = convert(Arc::new(chunked.clone()), 0).unwrap();
        assert!(summary.files.len() >= 2, "expected at least two chunks");
        assert_eq!(summary.statements, 50);

        // Unchunked run over the same input yields the same statement set
        let outdir2 = TempDir::new().unwrap();
        let mut unchunked = chunked;
        unchunked.max_graph_size_mb = None;
        unchunked.outdir = outdir2.path().to_path_buf();
        let summary2 = convert(Arc::new(unchunked), 0).unwrap();
        assert_eq!(summary2.statements, 50);
        assert_eq!(summary2.files.len(), 1);

        assert_eq!(parse_output(&summary).len(), parse_output(&summary2).len());
    }

    #[test]
    fn test_unknown_encoding_rejected() {
        let dir = TempDir::new().unwrap();
        let mut spec = spec_for(&dir, "id\n1\n");
        spec.encoding = "no-such-encoding".to_string();
        assert!(matches!(
            convert(Arc::new(spec), 0),
            Err(ConvertError::UnknownEncoding(_))
        ));
    }

    #[test]
    fn test_latin1_input_decoded() {
        let dir = TempDir::new().unwrap();
        let mut spec = spec_for(&dir, "placeholder\n");
        // "café" in latin-1
        fs::write(&spec.infile, b"id,name\n1,caf\xe9\n").unwrap();
        spec.encoding = "latin1".to_string();
        spec.types = vec![];
        spec.columns = vec![ColumnRule::literal("name", "http://example.org/hasName")];

        let summary = convert(Arc::new(spec), 0).unwrap();
        let graph = parse_output(&summary);
        assert!(graph
            .iter()
            .any(|t| t.o.as_literal().map(|(l, _, _)| l) == Some("café")));
    }

    #[test]
    fn test_output_filename_from_input_stem() {
        let dir = TempDir::new().unwrap();
        let spec = spec_for(&dir, "id\n1\n");
        let summary = convert(Arc::new(spec), 0).unwrap();
        assert_eq!(file_name(&summary.files[0]), "data.ttl");
    }
}
