//! Chunked output writer
//!
//! Accumulates per-row statement sets and flushes them to numbered output
//! files when the estimated in-memory size crosses the configured
//! threshold. With chunking disabled the accumulator holds the entire run
//! and is serialized exactly once at the end.
//!
//! File naming: `<stem>.<ext>` when the whole run fits in one file,
//! `<stem>-<n>.<ext>` (numbered from 1) once a mid-run flush has occurred.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use rdforge_graph::Graph;
use rdforge_mapping::ResolvedSpec;
use rdforge_turtle::{write_trig, write_turtle};

use crate::error::ConvertResult;

/// Totals for one completed conversion run.
#[derive(Debug)]
pub struct WriteSummary {
    /// Output files, in the order they were written
    pub files: Vec<PathBuf>,
    /// Statements written across all files
    pub statements: usize,
}

/// Accumulates statements and flushes size-bounded chunks.
pub struct ChunkWriter {
    spec: Arc<ResolvedSpec>,
    accumulator: Graph,
    /// Rows merged since the last threshold check
    rows_since_check: usize,
    /// Numbered chunks flushed so far
    chunks_flushed: usize,
    files: Vec<PathBuf>,
    statements_written: usize,
}

impl ChunkWriter {
    /// Create a writer for one run.
    pub fn new(spec: Arc<ResolvedSpec>) -> Self {
        Self {
            spec,
            accumulator: Graph::new(),
            rows_since_check: 0,
            chunks_flushed: 0,
            files: Vec::new(),
            statements_written: 0,
        }
    }

    /// Merge one row's statement set and run the periodic threshold check.
    pub fn merge_row(&mut self, graph: Graph) -> ConvertResult<()> {
        self.accumulator.union(graph);
        self.rows_since_check += 1;

        let Some(max_mb) = self.spec.max_graph_size_mb else {
            return Ok(());
        };
        if self.rows_since_check < self.spec.size_check_frequency {
            return Ok(());
        }
        self.rows_since_check = 0;

        let estimated = self.accumulator.estimated_size_bytes();
        if (estimated as f64) > max_mb * 1024.0 * 1024.0 {
            self.flush_chunk()?;
        }
        Ok(())
    }

    /// Current number of statements in the accumulator.
    pub fn accumulated(&self) -> usize {
        self.accumulator.len()
    }

    /// Flush whatever remains (even below threshold) and return the totals.
    ///
    /// A run that flushed mid-run chunks and has nothing left over does not
    /// produce a trailing empty file.
    pub fn finish(mut self) -> ConvertResult<WriteSummary> {
        if !self.accumulator.is_empty() || self.chunks_flushed == 0 {
            let path = self.chunk_path(None);
            self.write_file(path)?;
        }
        Ok(WriteSummary {
            files: self.files,
            statements: self.statements_written,
        })
    }

    fn flush_chunk(&mut self) -> ConvertResult<()> {
        self.chunks_flushed += 1;
        let path = self.chunk_path(Some(self.chunks_flushed));
        self.write_file(path)
    }

    /// Path for the next output file. `number` is set for mid-run flushes;
    /// the final file is numbered only when earlier chunks exist.
    fn chunk_path(&self, number: Option<usize>) -> PathBuf {
        let stem = self
            .spec
            .infile
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let ext = self.spec.output_extension();

        let name = match number {
            Some(n) => format!("{}-{}.{}", stem, n, ext),
            None if self.chunks_flushed > 0 => {
                format!("{}-{}.{}", stem, self.chunks_flushed + 1, ext)
            }
            None => format!("{}.{}", stem, ext),
        };
        self.spec.outdir.join(name)
    }

    fn write_file(&mut self, path: PathBuf) -> ConvertResult<()> {
        let mut graph = self.accumulator.take();
        let count = graph.len();
        let estimated_mb = graph.estimated_size_bytes() as f64 / (1024.0 * 1024.0);

        let text = match &self.spec.graph {
            Some(graph_iri) => write_trig(&mut graph, &self.spec.prefixes, graph_iri),
            None => write_turtle(&mut graph, &self.spec.prefixes),
        };
        std::fs::write(&path, text)?;

        info!(
            statements = count,
            estimated_mb = format!("{:.2}", estimated_mb),
            path = %path.display(),
            "{} written",
            if self.spec.graph.is_some() { "quads" } else { "triples" },
        );

        self.statements_written += count;
        self.files.push(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdforge_graph::Term;
    use rdforge_vocab::PrefixTable;
    use tempfile::TempDir;

    fn spec_in(dir: &TempDir, max_mb: Option<f64>, check_every: usize) -> Arc<ResolvedSpec> {
        Arc::new(ResolvedSpec {
            infile: dir.path().join("data.csv"),
            outdir: dir.path().to_path_buf(),
            encoding: "utf-8".to_string(),
            delimiter: b',',
            graph: None,
            namespace: None,
            identifier: Some("id".to_string()),
            types: vec![],
            columns: vec![],
            template: None,
            functions: None,
            max_graph_size_mb: max_mb,
            size_check_frequency: check_every,
            workers: None,
            strict_values: false,
            prefixes: PrefixTable::new(),
        })
    }

    fn row_graph(n: usize, payload: &str) -> Graph {
        let mut g = Graph::new();
        g.insert_triple(
            Term::iri(format!("http://example.org/item/{}", n)),
            Term::iri("http://example.org/value"),
            Term::string(payload),
        );
        g
    }

    #[test]
    fn test_single_file_when_chunking_disabled() {
        let dir = TempDir::new().unwrap();
        let mut writer = ChunkWriter::new(spec_in(&dir, None, 2));

        for n in 0..10 {
            writer.merge_row(row_graph(n, "x")).unwrap();
        }
        let summary = writer.finish().unwrap();

        assert_eq!(summary.files.len(), 1);
        assert_eq!(summary.statements, 10);
        assert!(summary.files[0].ends_with("data.ttl"));
        assert!(summary.files[0].exists());
    }

    #[test]
    fn test_chunks_flush_on_threshold() {
        let dir = TempDir::new().unwrap();
        // Threshold of ~1 KB with a check every 2 rows and ~1 KB rows
        let mut writer = ChunkWriter::new(spec_in(&dir, Some(0.001), 2));

        let payload = "y".repeat(512);
        for n in 0..10 {
            writer.merge_row(row_graph(n, &payload)).unwrap();
        }
        let summary = writer.finish().unwrap();

        assert!(summary.files.len() >= 2, "expected chunked output");
        assert_eq!(summary.statements, 10);
        assert!(summary.files[0].ends_with("data-1.ttl"));
        // The final remainder is the next number in sequence
        let last = summary.files.last().unwrap();
        assert!(last
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("data-"));
        for file in &summary.files {
            assert!(file.exists());
        }
    }

    #[test]
    fn test_chunking_conserves_statements() {
        let dir = TempDir::new().unwrap();
        let payload = "z".repeat(256);

        let mut chunked = ChunkWriter::new(spec_in(&dir, Some(0.001), 2));
        let mut unchunked = ChunkWriter::new(spec_in(&dir, None, 2));
        for n in 0..25 {
            chunked.merge_row(row_graph(n, &payload)).unwrap();
            unchunked.merge_row(row_graph(n, &payload)).unwrap();
        }
        let chunked = chunked.finish().unwrap();

        let total_by_parse: usize = chunked
            .files
            .iter()
            .map(|f| {
                let text = std::fs::read_to_string(f).unwrap();
                rdforge_turtle::parse(&text, "").unwrap().len()
            })
            .sum();

        assert_eq!(chunked.statements, 25);
        assert_eq!(total_by_parse, 25);
        assert_eq!(unchunked.accumulated(), 25);
    }

    #[test]
    fn test_trig_output_for_named_graph() {
        let dir = TempDir::new().unwrap();
        let mut spec = (*spec_in(&dir, None, 2)).clone();
        spec.graph = Some("http://example.org/g".to_string());
        let mut writer = ChunkWriter::new(Arc::new(spec));

        writer.merge_row(row_graph(0, "x")).unwrap();
        let summary = writer.finish().unwrap();

        assert!(summary.files[0].ends_with("data.trig"));
        let text = std::fs::read_to_string(&summary.files[0]).unwrap();
        assert!(text.contains("<http://example.org/g> {"));
    }

    #[test]
    fn test_duplicate_statements_merge_once() {
        let dir = TempDir::new().unwrap();
        let mut writer = ChunkWriter::new(spec_in(&dir, None, 2));

        writer.merge_row(row_graph(1, "same")).unwrap();
        writer.merge_row(row_graph(1, "same")).unwrap();
        let summary = writer.finish().unwrap();
        assert_eq!(summary.statements, 1);
    }
}
