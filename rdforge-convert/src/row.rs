//! Row-to-statements mapping
//!
//! Converts one data row into RDF statements under the resolved column
//! rules: subject resolution, rdf:type assertions, and per-column literal or
//! IRI materialization.

use std::sync::Arc;

use csv::StringRecord;
use regex::Regex;
use tracing::error;
use uuid::Uuid;

use rdforge_graph::{is_valid_iri, Graph, Term};
use rdforge_mapping::{ColumnRule, ResolvedSpec};
use rdforge_vocab::{rdf, xsd};

use crate::error::{ConvertError, ConvertResult};
use crate::template::TemplateRenderer;

/// Per-worker row conversion state.
///
/// Each worker builds its own converter: compiled separator regexes and the
/// template registry are worker-local caches, while the spec and header are
/// shared read-only.
#[derive(Debug)]
pub struct RowConverter {
    spec: Arc<ResolvedSpec>,
    id_index: Option<usize>,
    /// Header position of each column rule, aligned with `spec.columns`
    rule_indexes: Vec<usize>,
    /// Compiled separator regex per rule (None for literal separators)
    separators: Vec<Option<Regex>>,
    renderer: Option<TemplateRenderer>,
}

impl RowConverter {
    /// Build a converter for one worker.
    pub fn new(spec: Arc<ResolvedSpec>, header: Arc<Vec<String>>) -> ConvertResult<Self> {
        let id_index = match &spec.identifier {
            Some(name) => Some(column_index(&header, name)?),
            None => None,
        };

        let mut rule_indexes = Vec::with_capacity(spec.columns.len());
        let mut separators = Vec::with_capacity(spec.columns.len());
        for rule in &spec.columns {
            rule_indexes.push(column_index(&header, &rule.column)?);
            separators.push(compile_separator(rule)?);
        }

        let renderer = match &spec.template {
            Some(_) => Some(TemplateRenderer::new(&spec, Arc::clone(&header))?),
            None => None,
        };

        Ok(Self {
            spec,
            id_index,
            rule_indexes,
            separators,
            renderer,
        })
    }

    /// Convert one row into its statement set.
    ///
    /// `row_idx` scopes blank nodes minted by the template so that rows
    /// never share them.
    pub fn process_row(&self, row: &StringRecord, row_idx: usize) -> ConvertResult<Graph> {
        let mut graph = Graph::new();

        match self.id_index {
            Some(idx) => {
                // An empty identifier cell skips the row's entire output;
                // the row still counts as visited.
                if let Some(subject) = self.subject_for_row(row, idx)? {
                    self.map_columns(&subject, row, &mut graph)?;
                    if let Some(renderer) = &self.renderer {
                        graph.union(renderer.render_row(row, row_idx)?);
                    }
                }
            }
            None => {
                if let Some(renderer) = &self.renderer {
                    graph.union(renderer.render_row(row, row_idx)?);
                }
            }
        }

        Ok(graph)
    }

    /// Resolve the subject IRI for a row, or `None` when the identifier
    /// cell is empty.
    fn subject_for_row(&self, row: &StringRecord, idx: usize) -> ConvertResult<Option<Term>> {
        let cell = row.get(idx).unwrap_or("");
        if cell.is_empty() {
            return Ok(None);
        }
        match &self.spec.namespace {
            Some(ns) => Ok(Some(Term::iri(format!("{}{}", ns, cell)))),
            None => {
                let bare = cell.trim_matches(&['<', '>'][..]);
                if !is_valid_iri(bare) {
                    return Err(ConvertError::InvalidIri {
                        value: cell.to_string(),
                        namespace: None,
                    });
                }
                Ok(Some(Term::iri(bare)))
            }
        }
    }

    /// Emit type assertions and column-rule statements for a subject.
    fn map_columns(
        &self,
        subject: &Term,
        row: &StringRecord,
        graph: &mut Graph,
    ) -> ConvertResult<()> {
        for type_iri in &self.spec.types {
            graph.insert_triple(subject.clone(), Term::iri(rdf::TYPE), Term::iri(type_iri));
        }

        for (rule_idx, rule) in self.spec.columns.iter().enumerate() {
            let cell = row.get(self.rule_indexes[rule_idx]).unwrap_or("");
            let values = self.column_values(rule, &self.separators[rule_idx], cell, graph)?;
            for value in values {
                graph.insert_triple(subject.clone(), Term::iri(&rule.predicate), value);
            }
        }

        Ok(())
    }

    /// Convert one cell under one column rule into object terms.
    ///
    /// Statements minted about the values themselves (labels, types of
    /// minted IRIs) go directly into `graph`.
    fn column_values(
        &self,
        rule: &ColumnRule,
        separator: &Option<Regex>,
        cell: &str,
        graph: &mut Graph,
    ) -> ConvertResult<Vec<Term>> {
        let mut values = Vec::new();
        if cell.trim().is_empty() {
            return Ok(values);
        }

        let segments: Vec<&str> = match (&rule.separator, separator) {
            (_, Some(re)) => re.split(cell).collect(),
            (Some(sep), None) => cell.split(sep.as_str()).collect(),
            (None, None) => vec![cell],
        };

        for segment in segments {
            let stripped = segment.trim();
            if stripped.is_empty() {
                continue;
            }

            if rule.as_iri {
                if let Some(iri) = self.mint_iri(rule, segment, stripped, graph)? {
                    values.push(iri);
                }
            } else if let Some(literal) = self.make_literal(rule, stripped)? {
                values.push(literal);
            }
        }

        Ok(values)
    }

    /// Mint an IRI for one value, plus its optional label and type
    /// statements.
    fn mint_iri(
        &self,
        rule: &ColumnRule,
        raw: &str,
        stripped: &str,
        graph: &mut Graph,
    ) -> ConvertResult<Option<Term>> {
        let mut value = stripped.trim_matches(&['<', '>'][..]).to_string();

        let iri = match &rule.namespace {
            None => {
                if !is_valid_iri(&value) {
                    return Err(ConvertError::InvalidIri {
                        value,
                        namespace: None,
                    });
                }
                Term::iri(value)
            }
            Some(ns) => {
                if rule.ignore_case {
                    value = value.to_lowercase();
                }
                if rule.as_uuid {
                    value = name_uuid(&value);
                }
                let minted = format!("{}{}", ns, value);
                if !is_valid_iri(&minted) {
                    return Err(ConvertError::InvalidIri {
                        value,
                        namespace: Some(ns.clone()),
                    });
                }
                Term::iri(minted)
            }
        };

        if let Some(label) = &rule.label {
            graph.insert_triple(
                iri.clone(),
                Term::iri(label),
                Term::typed(raw, &rule.datatype),
            );
        }
        if let Some(type_iri) = &rule.rdf_type {
            graph.insert_triple(iri.clone(), Term::iri(rdf::TYPE), Term::iri(type_iri));
        }

        Ok(Some(iri))
    }

    /// Build a literal for one value, reformatting dates and checking the
    /// datatype cast. Cast failures are logged and skipped unless
    /// `strictValues` is set.
    fn make_literal(&self, rule: &ColumnRule, stripped: &str) -> ConvertResult<Option<Term>> {
        let mut lexical = stripped.to_string();

        if let Some(pattern) = &rule.datestr {
            match reformat_date(stripped, pattern) {
                Ok(formatted) => lexical = formatted,
                Err(reason) => {
                    if self.spec.strict_values {
                        return Err(ConvertError::ValueCast {
                            value: stripped.to_string(),
                            datatype: pattern.clone(),
                            reason,
                        });
                    }
                    error!(value = %stripped, pattern = %pattern, "could not parse date value");
                    return Ok(None);
                }
            }
        }

        if let Err(reason) = check_cast(&lexical, &rule.datatype) {
            if self.spec.strict_values {
                return Err(ConvertError::ValueCast {
                    value: lexical,
                    datatype: rule.datatype.clone(),
                    reason,
                });
            }
            error!(value = %lexical, datatype = %rule.datatype, "could not cast value");
            return Ok(None);
        }

        Ok(Some(Term::typed(lexical, &rule.datatype)))
    }
}

fn column_index(header: &[String], name: &str) -> ConvertResult<usize> {
    header
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| ConvertError::MissingColumn(name.to_string()))
}

fn compile_separator(rule: &ColumnRule) -> ConvertResult<Option<Regex>> {
    match (&rule.separator, rule.regex) {
        (Some(pattern), true) => Regex::new(pattern)
            .map(Some)
            .map_err(|e| ConvertError::InvalidSeparator {
                pattern: pattern.clone(),
                reason: e.to_string(),
            }),
        _ => Ok(None),
    }
}

/// Deterministic name-based UUID for a value: stable across runs, processes,
/// and workers.
pub fn name_uuid(value: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, value.as_bytes()).to_string()
}

/// Parse a value with an strftime pattern and reformat it as a canonical
/// date-time string.
fn reformat_date(value: &str, pattern: &str) -> Result<String, String> {
    use chrono::{NaiveDate, NaiveDateTime};

    if let Ok(dt) = NaiveDateTime::parse_from_str(value, pattern) {
        return Ok(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
    }
    match NaiveDate::parse_from_str(value, pattern) {
        Ok(date) => {
            let midnight = date.and_hms_opt(0, 0, 0).expect("midnight is valid");
            Ok(midnight.format("%Y-%m-%dT%H:%M:%S").to_string())
        }
        Err(e) => Err(e.to_string()),
    }
}

/// Check that a lexical value fits its declared datatype. Only the numeric
/// and boolean XSD types are checked; every other datatype accepts any
/// lexical form.
fn check_cast(value: &str, datatype: &str) -> Result<(), String> {
    match datatype {
        xsd::INTEGER | xsd::LONG | xsd::INT => value
            .parse::<i64>()
            .map(|_| ())
            .map_err(|e| e.to_string()),
        xsd::DECIMAL | xsd::FLOAT | xsd::DOUBLE => value
            .parse::<f64>()
            .map(|_| ())
            .map_err(|e| e.to_string()),
        xsd::BOOLEAN => match value {
            "true" | "false" | "1" | "0" => Ok(()),
            _ => Err("not a boolean".to_string()),
        },
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdforge_vocab::PrefixTable;
    use std::path::PathBuf;

    fn base_spec() -> ResolvedSpec {
        ResolvedSpec {
            infile: PathBuf::from("/data/in.csv"),
            outdir: PathBuf::from("/data"),
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
            workers: None,
            strict_values: false,
            prefixes: PrefixTable::new(),
        }
    }

    fn record(cells: &[&str]) -> StringRecord {
        StringRecord::from(cells.to_vec())
    }

    fn header(names: &[&str]) -> Arc<Vec<String>> {
        Arc::new(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_basic_literal_rule() {
        let mut spec = base_spec();
        spec.columns = vec![ColumnRule::literal("name", "http://example.org/hasName")];
        let converter = RowConverter::new(Arc::new(spec), header(&["id", "name"])).unwrap();

        let graph = converter.process_row(&record(&["1", "Alice"]), 0).unwrap();
        // One type assertion plus one literal
        assert_eq!(graph.len(), 2);

        let name = graph
            .iter()
            .find(|t| t.p.as_iri() == Some("http://example.org/hasName"))
            .unwrap();
        assert_eq!(name.s.as_iri(), Some("http://example.org/item/1"));
        assert_eq!(name.o.as_literal().map(|(l, _, _)| l), Some("Alice"));
    }

    #[test]
    fn test_empty_identifier_skips_row() {
        let mut spec = base_spec();
        spec.columns = vec![ColumnRule::literal("name", "http://example.org/hasName")];
        let converter = RowConverter::new(Arc::new(spec), header(&["id", "name"])).unwrap();

        let graph = converter.process_row(&record(&["", "Alice"]), 0).unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_separator_drops_empty_segments() {
        let mut spec = base_spec();
        let mut rule = ColumnRule::literal("tags", "http://example.org/tag");
        rule.separator = Some(";".to_string());
        spec.columns = vec![rule];
        spec.types = vec![];
        let converter = RowConverter::new(Arc::new(spec), header(&["id", "tags"])).unwrap();

        let graph = converter.process_row(&record(&["1", "a;b;;c"]), 0).unwrap();
        assert_eq!(graph.len(), 3);
        let lexicals: Vec<&str> = graph
            .iter()
            .map(|t| t.o.as_literal().unwrap().0)
            .collect();
        assert_eq!(lexicals, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_regex_separator() {
        let mut spec = base_spec();
        let mut rule = ColumnRule::literal("tags", "http://example.org/tag");
        rule.separator = Some(r"[;|]".to_string());
        rule.regex = true;
        spec.columns = vec![rule];
        spec.types = vec![];
        let converter = RowConverter::new(Arc::new(spec), header(&["id", "tags"])).unwrap();

        let graph = converter.process_row(&record(&["1", "a;b|c"]), 0).unwrap();
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_whitespace_only_values_dropped() {
        let mut spec = base_spec();
        let mut rule = ColumnRule::literal("tags", "http://example.org/tag");
        rule.separator = Some(";".to_string());
        spec.columns = vec![rule];
        spec.types = vec![];
        let converter = RowConverter::new(Arc::new(spec), header(&["id", "tags"])).unwrap();

        let graph = converter.process_row(&record(&["1", "  ;  ; "]), 0).unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_as_iri_with_namespace_label_and_type() {
        let mut spec = base_spec();
        spec.types = vec![];
        let mut rule = ColumnRule::literal("author", "http://example.org/hasAuthor");
        rule.as_iri = true;
        rule.namespace = Some("http://example.org/person/".to_string());
        rule.label = Some("http://www.w3.org/2000/01/rdf-schema#label".to_string());
        rule.rdf_type = Some("http://example.org/Person".to_string());
        spec.columns = vec![rule];
        let converter = RowConverter::new(Arc::new(spec), header(&["id", "author"])).unwrap();

        let graph = converter.process_row(&record(&["1", "smith"]), 0).unwrap();
        // link + label + type
        assert_eq!(graph.len(), 3);
        let minted = Term::iri("http://example.org/person/smith");
        assert!(graph.iter().any(|t| t.o == minted));
        assert!(graph
            .iter()
            .any(|t| t.s == minted && t.p.as_iri() == Some(rdf::TYPE)));
        assert!(graph.iter().any(|t| t.s == minted
            && t.o.as_literal().map(|(l, _, _)| l) == Some("smith")));
    }

    #[test]
    fn test_as_uuid_is_deterministic() {
        let mut spec = base_spec();
        spec.types = vec![];
        let mut rule = ColumnRule::literal("author", "http://example.org/hasAuthor");
        rule.as_iri = true;
        rule.namespace = Some("http://example.org/person/".to_string());
        rule.as_uuid = true;
        rule.ignore_case = true;
        spec.columns = vec![rule];
        let spec = Arc::new(spec);

        let converter = RowConverter::new(Arc::clone(&spec), header(&["id", "author"])).unwrap();
        let g1 = converter.process_row(&record(&["1", "Smith"]), 0).unwrap();
        let g2 = converter.process_row(&record(&["1", "smith"]), 1).unwrap();

        // ignore_case folds both spellings onto the same UUID
        let o1 = g1.iter().next().unwrap().o.clone();
        let o2 = g2.iter().next().unwrap().o.clone();
        assert_eq!(o1, o2);
        assert_eq!(name_uuid("smith"), name_uuid("smith"));
        assert!(o1
            .as_iri()
            .unwrap()
            .starts_with("http://example.org/person/"));
    }

    #[test]
    fn test_bare_iri_value_without_namespace() {
        let mut spec = base_spec();
        spec.types = vec![];
        let mut rule = ColumnRule::literal("link", "http://example.org/seeAlso");
        rule.as_iri = true;
        spec.columns = vec![rule];
        let converter = RowConverter::new(Arc::new(spec), header(&["id", "link"])).unwrap();

        let graph = converter
            .process_row(&record(&["1", "<http://other.org/x>"]), 0)
            .unwrap();
        assert_eq!(
            graph.iter().next().unwrap().o.as_iri(),
            Some("http://other.org/x")
        );

        let err = converter
            .process_row(&record(&["1", "not an iri"]), 0)
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidIri { .. }));
    }

    #[test]
    fn test_date_reformatting() {
        let mut spec = base_spec();
        spec.types = vec![];
        let mut rule = ColumnRule::literal("born", "http://example.org/birthDate");
        rule.datestr = Some("%d.%m.%Y".to_string());
        rule.datatype = xsd::DATE_TIME.to_string();
        spec.columns = vec![rule];
        let converter = RowConverter::new(Arc::new(spec), header(&["id", "born"])).unwrap();

        let graph = converter
            .process_row(&record(&["1", "02.01.2020"]), 0)
            .unwrap();
        assert_eq!(
            graph.iter().next().unwrap().o.as_literal().map(|(l, _, _)| l),
            Some("2020-01-02T00:00:00")
        );
    }

    #[test]
    fn test_bad_date_skipped_not_fatal() {
        let mut spec = base_spec();
        spec.types = vec![];
        let mut rule = ColumnRule::literal("born", "http://example.org/birthDate");
        rule.datestr = Some("%Y-%m-%d".to_string());
        spec.columns = vec![rule];
        let converter = RowConverter::new(Arc::new(spec), header(&["id", "born"])).unwrap();

        let graph = converter
            .process_row(&record(&["1", "not-a-date"]), 0)
            .unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_bad_cast_skipped_unless_strict() {
        let mut spec = base_spec();
        spec.types = vec![];
        let mut rule = ColumnRule::literal("age", "http://example.org/age");
        rule.datatype = xsd::INTEGER.to_string();
        spec.columns = vec![rule.clone()];

        let lax = RowConverter::new(Arc::new(spec.clone()), header(&["id", "age"])).unwrap();
        let graph = lax.process_row(&record(&["1", "not-a-number"]), 0).unwrap();
        assert!(graph.is_empty());

        spec.strict_values = true;
        spec.columns = vec![rule];
        let strict = RowConverter::new(Arc::new(spec), header(&["id", "age"])).unwrap();
        let err = strict
            .process_row(&record(&["1", "not-a-number"]), 0)
            .unwrap_err();
        assert!(matches!(err, ConvertError::ValueCast { .. }));
    }

    #[test]
    fn test_missing_column_fails_at_build() {
        let mut spec = base_spec();
        spec.columns = vec![ColumnRule::literal("ghost", "http://example.org/p")];
        let err = RowConverter::new(Arc::new(spec), header(&["id", "name"])).unwrap_err();
        assert!(matches!(err, ConvertError::MissingColumn(c) if c == "ghost"));
    }

    #[test]
    fn test_subject_without_namespace_must_be_iri() {
        let mut spec = base_spec();
        spec.namespace = None;
        spec.columns = vec![ColumnRule::literal("name", "http://example.org/hasName")];
        let converter = RowConverter::new(Arc::new(spec), header(&["id", "name"])).unwrap();

        let graph = converter
            .process_row(&record(&["<http://example.org/self>", "Alice"]), 0)
            .unwrap();
        assert!(graph
            .iter()
            .all(|t| t.s.as_iri() == Some("http://example.org/self")));

        let err = converter
            .process_row(&record(&["just text", "Alice"]), 0)
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidIri { .. }));
    }

    #[test]
    fn test_short_row_treated_as_empty_cells() {
        let mut spec = base_spec();
        spec.columns = vec![ColumnRule::literal("name", "http://example.org/hasName")];
        let converter = RowConverter::new(Arc::new(spec), header(&["id", "name"])).unwrap();

        // Row has no "name" cell at all
        let graph = converter.process_row(&record(&["1"]), 0).unwrap();
        assert_eq!(graph.len(), 1); // only the type assertion
    }
}
